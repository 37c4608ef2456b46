//! log4rs setup.
//!
//! Everything logs through the `log` facade. Two rolling files are written under the log
//! directory: `app.log` for everything, and `audit.log` for the `docmap::audit` target that
//! record writes report to.

use log::LevelFilter;
use log4rs::Handle;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const AUDIT_TARGET: &str = "docmap::audit";
pub const QUERY_TARGET: &str = "docmap::query";

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_RETENTION: u32 = 7;

static HANDLE: OnceLock<Handle> = OnceLock::new();

type LogResult = Result<(), Box<dyn std::error::Error>>;

/// Parses `error|warn|info|debug|trace`, defaulting to `info`.
#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?)
}

fn install(config: Config) -> LogResult {
    if let Some(handle) = HANDLE.get() {
        handle.set_config(config);
        return Ok(());
    }
    let handle = log4rs::init_config(config)?;
    // A concurrent first call may have won; its handle stays authoritative.
    let _ = HANDLE.set(handle);
    Ok(())
}

/// Configures process-wide logging. Calling again replaces the active configuration.
///
/// - `dir`: base directory for log files; the current directory when `None`.
/// - `level`: see [`parse_level`].
/// - `retention`: rolled files kept per log (default 7).
///
/// # Errors
/// Returns an error if the directory cannot be created or an appender fails to open.
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<u32>) -> LogResult {
    let base = match dir {
        Some(d) => PathBuf::from(d),
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&base)?;
    let keep = retention.unwrap_or(DEFAULT_RETENTION);
    let lvl = parse_level(level);
    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling(&base, "audit", keep)?)))
        .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, lvl))
        .build(Root::builder().appender("app").build(lvl))?;
    install(config)
}

/// Configures logging from a [`LoggingConfig`](crate::config::LoggingConfig).
///
/// # Errors
/// See [`configure_logging`].
pub fn configure(config: &crate::config::LoggingConfig) -> LogResult {
    configure_logging(config.dir.as_deref(), config.level.as_deref(), config.retention)
}

/// Configures logging from `DOCMAP_LOG_DIR`, `DOCMAP_LOG_LEVEL` and `DOCMAP_LOG_RETENTION`.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> LogResult {
    let dir = std::env::var("DOCMAP_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("DOCMAP_LOG_LEVEL").ok();
    let retention = std::env::var("DOCMAP_LOG_RETENTION").ok().and_then(|s| s.parse::<u32>().ok());
    configure_logging(dir.as_deref(), level.as_deref(), retention)
}

/// Initializes logging from a log4rs YAML file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn init_path(path: &Path) -> LogResult {
    let config = log4rs::config::load_config_file(path, log4rs::config::Deserializers::default())?;
    install(config)
}
