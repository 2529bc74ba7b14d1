//! Logging helpers for binaries embedding `doc-rag`.
//!
//! All library events use targets under [`TARGET_PREFIX`] (`doc_rag::loader`,
//! `doc_rag::index`, ...), so they can be filtered independently of the host.
//! Index builds, batch ingestion and searches run inside spans; [`layer_to`]
//! prints one line when each of them closes, carrying `time.busy`.

use std::io::{self, IsTerminal};
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::fmt::format::{FmtSpan, Writer};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

use crate::errors::RagError;

pub const TARGET_PREFIX: &str = "doc_rag";

/// Environment variable selecting the [`LogWriter`].
pub const LOG_WRITER_ENV: &str = "DOCQA_LOG_WRITER";

/// Where crate logs go. CLI output stays on stdout, so stderr is the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogWriter {
    #[default]
    Stderr,
    Stdout,
}

impl FromStr for LogWriter {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stderr" | "" => Ok(Self::Stderr),
            "stdout" => Ok(Self::Stdout),
            other => Err(RagError::EnvParse {
                key: LOG_WRITER_ENV.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl LogWriter {
    /// Reads [`LOG_WRITER_ENV`]; unset means stderr.
    pub fn from_env() -> Result<Self, RagError> {
        match std::env::var(LOG_WRITER_ENV) {
            Ok(v) => v.parse(),
            Err(_) => Ok(Self::default()),
        }
    }

    fn is_terminal(self) -> bool {
        match self {
            Self::Stderr => io::stderr().is_terminal(),
            Self::Stdout => io::stdout().is_terminal(),
        }
    }

    fn make_writer(self) -> BoxMakeWriter {
        match self {
            Self::Stderr => BoxMakeWriter::new(io::stderr),
            Self::Stdout => BoxMakeWriter::new(io::stdout),
        }
    }
}

/// RFC 3339 UTC timestamps, e.g. `2025-09-12T10:20:30Z`.
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let s = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        w.write_str(&s)
    }
}

/// Formatting layer for this crate's events and span timings.
///
/// Compact single-line output with target and source location; ANSI colors
/// only when `writer` is a terminal. Compose it with the host's subscriber.
pub fn layer_to<S>(writer: LogWriter) -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let only_this_crate = filter::filter_fn(|meta| meta.target().starts_with(TARGET_PREFIX));

    fmt::layer()
        .with_writer(writer.make_writer())
        .with_ansi(writer.is_terminal())
        .with_span_events(FmtSpan::CLOSE)
        .event_format(
            fmt::format()
                .compact()
                .with_timer(ChronoRfc3339Utc)
                .with_level(true)
                .with_target(true)
                .with_source_location(true),
        )
        .with_filter(only_this_crate)
}

/// `doc_rag=<level>` directive.
pub fn level_directive(level: Level) -> Directive {
    format!("{TARGET_PREFIX}={}", level.as_str().to_lowercase())
        .parse()
        .unwrap_or_else(|_| LevelFilter::from_level(level).into())
}

/// `RUST_LOG` (or `default`) plus a directive setting this crate to `level`.
pub fn env_filter_with_level(default: &str, level: Level) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    base.add_directive(level_directive(level))
}
