use std::env;
use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{Config, LogFormat};

/// Installs the global tracing subscriber, writing to stderr.
pub fn init_tracing(config: &Config) {
    let (level, env_filter) = parse_rust_log(config.logging.level);

    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let format = match resolve_format(config.logging.format) {
        LogFormat::Pretty => format.pretty().boxed(),
        LogFormat::Json => format.json().flatten_event(true).boxed(),
        LogFormat::Simplified | LogFormat::Auto => format.compact().with_ansi(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(level))
        .with(env_filter)
        .init();
}

fn resolve_format(format: LogFormat) -> LogFormat {
    match format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    }
}

/// Determines the effective log level and filter.
///
/// `RUST_LOG` takes precedence over the configured `level`. A plain level applies to the s3bench
/// crates, anything else is used as a literal filter.
pub fn parse_rust_log(level: LevelFilter) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => level,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        s3bench=TRACE,\
        s3bench_service=TRACE,\
        ",
    );

    (level, env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_formats_are_kept() {
        assert_eq!(resolve_format(LogFormat::Json), LogFormat::Json);
        assert_eq!(resolve_format(LogFormat::Pretty), LogFormat::Pretty);
        assert_ne!(resolve_format(LogFormat::Auto), LogFormat::Auto);
    }

    #[test]
    fn rust_log_overrides_level() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("RUST_LOG", "debug");
            let (level, _) = parse_rust_log(LevelFilter::WARN);
            assert_eq!(level, LevelFilter::DEBUG);

            jail.set_env("RUST_LOG", "s3bench_service::worker=trace");
            let (level, filter) = parse_rust_log(LevelFilter::WARN);
            assert_eq!(level, LevelFilter::TRACE);
            assert!(filter.to_string().contains("s3bench_service::worker"));

            Ok(())
        });
    }
}
