//! Logging setup and secret redaction
//!
//! Every formatted log line passes through [`sanitize_text`] before it reaches
//! the console or the log file, so API keys never land in the output.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const REDACTED_API_KEY: &str = "[REDACTED_API_KEY]";
pub const REDACTED: &str = "[REDACTED]";

lazy_static! {
    static ref SENSITIVE_PATTERNS: Vec<Regex> = [
        r"(?i)PHIDATA_API_KEY[=:]\s*\S+",
        r"(?i)GROQ_API_KEY[=:]\s*\S+",
        r"(?i)OPENAI_API_KEY[=:]\s*\S+",
        r#"(?i)api[_-]?key["']?\s*[=:]\s*["']?[a-zA-Z0-9_-]{20,}"#,
        r#"(?i)token["']?\s*[=:]\s*["']?[a-zA-Z0-9_-]{20,}"#,
        r"(?i)sk-[a-zA-Z0-9]{20,}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("redaction pattern must compile"))
    .collect();

    static ref QUERY_PATTERNS: Vec<Regex> = [
        r"sk-[a-zA-Z0-9]{20,}",
        r"[a-zA-Z0-9_-]{40,}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("query redaction pattern must compile"))
    .collect();
}

const SENSITIVE_KEYS: &[&str] = &["api_key", "token", "password", "secret", "key"];

/// Replace anything shaped like an API key with a redaction marker
pub fn sanitize_text(text: &str) -> String {
    let mut out = text.to_string();
    for pattern in SENSITIVE_PATTERNS.iter() {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, REDACTED_API_KEY).into_owned();
        }
    }
    out
}

/// Strip key-like tokens from a user query before it is logged
pub fn sanitize_query(query: &str) -> String {
    let mut out = query.to_string();
    for pattern in QUERY_PATTERNS.iter() {
        out = pattern.replace_all(&out, REDACTED).into_owned();
    }
    out
}

/// Redact a context map: sensitive key names lose their value entirely,
/// strings are query-sanitized, nested objects are walked.
pub fn sanitize_context(data: &Map<String, Value>) -> Map<String, Value> {
    data.iter()
        .map(|(key, value)| {
            let lowered = key.to_lowercase();
            let sanitized = if SENSITIVE_KEYS.iter().any(|t| lowered.contains(t)) {
                Value::String(REDACTED.to_string())
            } else {
                match value {
                    Value::Object(inner) => Value::Object(sanitize_context(inner)),
                    Value::String(s) => Value::String(sanitize_query(s)),
                    other => other.clone(),
                }
            };
            (key.clone(), sanitized)
        })
        .collect()
}

//
// ================= Redacting writer =================
//

/// `MakeWriter` adapter that redacts each formatted record
#[derive(Debug, Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
        }
    }
}

/// The fmt layer writes each record with a single `write_all`, so one
/// `write` call sees the whole line.
pub struct RedactingWriter<W> {
    inner: W,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.inner.write_all(sanitize_text(&text).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

//
// ================= Subscriber setup =================
//

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub log_file: Option<PathBuf>,
    pub enable_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            log_file: None,
            enable_console: true,
        }
    }
}

/// Keeps the non-blocking file writer alive; drop it last.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_lowercase()))
}

fn split_log_path(path: &Path) -> (PathBuf, PathBuf) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("financial_agent.log"));
    (dir, file)
}

/// Install the global subscriber. Console and file output are both redacted.
pub fn setup_logging(config: &LoggingConfig) -> LoggingGuard {
    let console = config.enable_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(RedactingMakeWriter::new(io::stdout))
            .with_filter(env_filter(&config.level))
    });

    let (file, guard) = match &config.log_file {
        Some(path) => {
            let (dir, name) = split_log_path(path);
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(RedactingMakeWriter::new(writer))
                .with_filter(env_filter(&config.level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // A subscriber may already be installed (tests, embedding apps).
    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init();

    LoggingGuard { _file: guard }
}

//
// ================= Structured helpers =================
//

/// Log an incoming query without leaking key-like strings
pub fn log_query(agent_name: &str, query: &str, query_id: &str) {
    info!(
        agent = %agent_name,
        query_id = %query_id,
        "Processing query: {}",
        sanitize_query(query)
    );
}

pub fn log_error(
    agent_name: Option<&str>,
    error: &dyn std::error::Error,
    context: Option<&Map<String, Value>>,
) {
    let mut msg = format!("Error occurred: {}", crate::error::error_chain(error));
    if let Some(ctx) = context {
        msg.push_str(&format!(" | Context: {}", Value::Object(sanitize_context(ctx))));
    }
    error!(agent = agent_name.unwrap_or("-"), "{}", msg);
}

pub fn log_response(agent_name: &str, success: bool, query_id: &str, elapsed: Option<Duration>) {
    let status = if success { "SUCCESS" } else { "FAILED" };
    let msg = match elapsed {
        Some(d) => format!("Query {} (execution time: {:.2}s)", status, d.as_secs_f64()),
        None => format!("Query {}", status),
    };

    if success {
        info!(agent = %agent_name, query_id = %query_id, "{}", msg);
    } else {
        warn!(agent = %agent_name, query_id = %query_id, "{}", msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_every_redaction_pattern_compiles() {
        assert_eq!(SENSITIVE_PATTERNS.len(), 6);
        assert_eq!(QUERY_PATTERNS.len(), 2);
    }

    #[test]
    fn test_redacts_env_assignments() {
        let cases = [
            "loaded GROQ_API_KEY=gsk_abc123 from env",
            "OPENAI_API_KEY: sk-shortkey",
            "phidata_api_key=phi-xyz",
        ];
        for c in cases {
            let out = sanitize_text(c);
            assert!(out.contains(REDACTED_API_KEY), "case: {}", c);
            assert!(!out.contains("gsk_abc123"));
            assert!(!out.contains("phi-xyz"));
        }
    }

    #[test]
    fn test_redacts_generic_assignments() {
        let out = sanitize_text(r#"{"api_key": "abcdefghijklmnopqrstuvwx"}"#);
        assert!(out.contains(REDACTED_API_KEY));
        assert!(!out.contains("abcdefghijklmnopqrstuvwx"));

        let out = sanitize_text("Token=ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert_eq!(out, REDACTED_API_KEY);
    }

    #[test]
    fn test_short_values_are_kept() {
        let text = "api_key=short token=tiny";
        assert_eq!(sanitize_text(text), text);
    }

    #[test]
    fn test_redacts_openai_style_keys() {
        let out = sanitize_text("using sk-abcdefghijklmnopqrstuvwxyz123456 now");
        assert_eq!(out, format!("using {} now", REDACTED_API_KEY));
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "What is the current price of AAPL?";
        assert_eq!(sanitize_text(text), text);
        assert_eq!(sanitize_query(text), text);
    }

    #[test]
    fn test_sanitize_query_long_tokens() {
        let long = "a".repeat(45);
        let out = sanitize_query(&format!("check {} please", long));
        assert_eq!(out, "check [REDACTED] please");
    }

    #[test]
    fn test_sanitize_context() {
        let ctx = json!({
            "query": "price of TSLA",
            "groq_api_key": "gsk_live",
            "auth": { "Token": "abc", "user": "me" },
            "attempt": 2,
        });
        let out = sanitize_context(ctx.as_object().unwrap());

        assert_eq!(out["query"], json!("price of TSLA"));
        assert_eq!(out["groq_api_key"], json!(REDACTED));
        assert_eq!(out["auth"]["Token"], json!(REDACTED));
        assert_eq!(out["auth"]["user"], json!("me"));
        assert_eq!(out["attempt"], json!(2));
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_subscriber_output_is_redacted() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(RedactingMakeWriter::new(capture.clone()))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("starting with GROQ_API_KEY=gsk_secretvalue");
            tracing::warn!("fallback key sk-abcdefghijklmnopqrstuvwxyz0123");
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(!output.contains("gsk_secretvalue"));
        assert!(!output.contains("sk-abcdefghijklmnopqrstuvwxyz0123"));
        assert_eq!(output.matches(REDACTED_API_KEY).count(), 2);
    }

    #[test]
    fn test_split_log_path() {
        let (dir, file) = split_log_path(Path::new("financial_agent.log"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(file, PathBuf::from("financial_agent.log"));

        let (dir, file) = split_log_path(Path::new("/var/log/agent.log"));
        assert_eq!(dir, PathBuf::from("/var/log"));
        assert_eq!(file, PathBuf::from("agent.log"));
    }
}
