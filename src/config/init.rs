use crate::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt};

/// 初始化日志系统
///
/// `RUST_LOG` takes precedence over `override_level`, which takes
/// precedence over the configured level. Output goes to stderr so exported
/// JSON on stdout stays clean.
pub fn init(config: &LoggingConfig, override_level: Option<&str>) {
    let level = override_level.unwrap_or(&config.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .try_init()
        .ok();
}
