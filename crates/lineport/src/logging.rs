use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Environment override for the log level. Accepts anything
/// `LevelFilter::from_str` does (`off`, `error`, ... `trace`, or `0`-`5`)
/// and takes precedence over `--log-level`.
pub const LEVEL_ENV: &str = "LINEPORT_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn parse_level(raw: &str) -> Option<LevelFilter> {
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        eprintln!("ignoring invalid {LEVEL_ENV} value {raw:?}");
    }
    parsed
}

fn level_from_env() -> Option<LevelFilter> {
    parse_level(&std::env::var(LEVEL_ENV).ok()?)
}

/// Install the global subscriber: selected format, selected level (or the
/// `LINEPORT_LOG` override), plain output on stderr.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = level_from_env().unwrap_or_else(|| level.into());
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(filter)
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_levels_map_to_filters() {
        assert_eq!(LevelFilter::from(LogLevel::Error), LevelFilter::ERROR);
        assert_eq!(LevelFilter::from(LogLevel::Info), LevelFilter::INFO);
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
    }

    #[test]
    fn env_values_parse_leniently() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level(" WARN "), Some(LevelFilter::WARN));
        assert_eq!(parse_level("off"), Some(LevelFilter::OFF));
        assert_eq!(parse_level("verbose"), None);
    }
}
