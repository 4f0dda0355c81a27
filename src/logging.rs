use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILE_PREFIX: &str = "shizi-backend.log";

/// Outbound HTTP clients are chatty at `debug`; keep them at `warn` unless the
/// filter names them explicitly.
const QUIET_TARGETS: [&str; 3] = ["hyper_util", "reqwest", "h2"];

pub struct FileLogGuard {
    _guard: WorkerGuard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLogSettings {
    pub dir: PathBuf,
    pub prefix: String,
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl LogRotation {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hourly" => Self::Hourly,
            "never" => Self::Never,
            _ => Self::Daily,
        }
    }

    fn into_rotation(self) -> Rotation {
        match self {
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
            Self::Never => Rotation::NEVER,
        }
    }
}

impl FileLogSettings {
    /// `None` unless `ENABLE_FILE_LOGS` is `true` or `1`.
    pub fn from_env() -> Option<Self> {
        let enabled = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        if !enabled {
            return None;
        }

        Some(Self {
            dir: std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()).into(),
            prefix: std::env::var("LOG_FILE_PREFIX")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILE_PREFIX.to_string()),
            rotation: std::env::var("LOG_ROTATION")
                .map(|v| LogRotation::parse(&v))
                .unwrap_or(LogRotation::Daily),
        })
    }
}

fn build_filter(log_level: &str) -> EnvFilter {
    let mut filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    for target in QUIET_TARGETS {
        if log_level.contains(target) {
            continue;
        }
        if let Ok(directive) = format!("{target}=warn").parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Installs the global subscriber. Keep the returned guard alive for the
/// lifetime of the process when file logging is on.
pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let stdout_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(build_filter(log_level))
        .with(stdout_layer);

    let Some(settings) = FileLogSettings::from_env() else {
        registry.init();
        return None;
    };

    if let Err(err) = std::fs::create_dir_all(&settings.dir) {
        eprintln!("failed to create log directory {}: {err}", settings.dir.display());
        registry.init();
        return None;
    }

    let appender = RollingFileAppender::new(
        settings.rotation.into_rotation(),
        &settings.dir,
        &settings.prefix,
    );
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    registry
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    Some(FileLogGuard { _guard: guard })
}
