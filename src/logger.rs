use log::LevelFilter;
use log4rs::Handle;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use parking_lot::Mutex;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use crate::config::LogConfig;
use crate::errors::{CatalogError, Result};

/// Target for write and recompute audit lines; routed to `audit.log` only.
pub const AUDIT_TARGET: &str = "libra_catalog::audit";

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

static HANDLE: Mutex<Option<Handle>> = Mutex::new(None);

fn config_err(e: impl Display) -> CatalogError {
    CatalogError::Config(format!("logging: {e}"))
}

#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, name: &str, keep: u32) -> Result<RollingFileAppender> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{name}.{{}}.log")).display()), keep)
        .map_err(config_err)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{name}.log")), Box::new(policy))
        .map_err(config_err)
}

/// Routes the process log to `{dir}/app.log` and audit lines to `{dir}/audit.log`.
///
/// Calling it again replaces the active configuration.
///
/// # Errors
/// `CatalogError::Io` when the directory cannot be created, `Config` when an appender fails.
pub fn configure_logging(cfg: &LogConfig) -> Result<()> {
    let base = match &cfg.dir {
        Some(d) => d.clone(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&base)?;
    let lvl = parse_level(&cfg.level);
    let keep = cfg.retention.max(1);

    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling(&base, "audit", keep)?)))
        .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, lvl))
        .build(Root::builder().appender("app").build(lvl))
        .map_err(config_err)?;

    install(config)
}

// log4rs allows one global logger; later configurations go through its handle.
fn install(config: Config) -> Result<()> {
    let mut slot = HANDLE.lock();
    if let Some(h) = &*slot {
        h.set_config(config);
        return Ok(());
    }
    *slot = Some(log4rs::init_config(config).map_err(config_err)?);
    Ok(())
}

/// Same as [`configure_logging`] over the defaults, with `LIBRA_LOG_DIR`, `LIBRA_LOG_LEVEL`
/// and `LIBRA_LOG_RETENTION` from the process environment.
///
/// # Errors
/// `CatalogError::Config` for a non-numeric retention, otherwise see [`configure_logging`].
pub fn configure_from_env() -> Result<()> {
    configure_from_lookup(|k| std::env::var(k).ok())
}

/// [`configure_from_env`] with the variables read through `lookup`.
///
/// # Errors
/// See [`configure_from_env`].
pub fn configure_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    let mut cfg = LogConfig::default();
    cfg.apply_env(lookup)?;
    configure_logging(&cfg)
}

/// Replaces the built-in layout with a log4rs YAML configuration.
///
/// # Errors
/// `CatalogError::Config` when the file is unreadable or does not describe a valid layout.
pub fn init_file(path: &Path) -> Result<()> {
    let config = log4rs::config::load_config_file(path, log4rs::config::Deserializers::default())
        .map_err(|e| config_err(format!("{}: {e}", path.display())))?;
    install(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_level("warn"), LevelFilter::Warn);
        assert_eq!(parse_level("bogus"), LevelFilter::Info);
    }
}
