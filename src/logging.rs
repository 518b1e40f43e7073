use crate::config::PortSettings;
use simplelog::{
    ColorChoice, CombinedLogger, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};
use std::fs::{self, OpenOptions};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();
static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

fn default_log_dir() -> Result<PathBuf, Error> {
    let home = std::env::var("HOME")
        .map_err(|_| Error::new(ErrorKind::NotFound, "HOME environment variable not set"))?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("midibusrs")
        .join("logs"))
}

/// Logs everything at the configured level to a file, and warnings and
/// worse to stderr. Only the first call installs the logger.
pub fn init_logger(settings: &PortSettings) -> Result<(), Error> {
    let log_dir = match &settings.log_dir {
        Some(dir) => dir.clone(),
        None => default_log_dir()?,
    };
    fs::create_dir_all(&log_dir)?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("midibusrs.log"))?;

    let level = LevelFilter::from_str(&settings.log_level).unwrap_or(LevelFilter::Debug);

    INIT.call_once(|| {
        let loggers: Vec<Box<dyn simplelog::SharedLogger>> = vec![
            WriteLogger::new(level, simplelog::Config::default(), log_file),
            TermLogger::new(
                LevelFilter::Warn,
                simplelog::Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ),
        ];
        if CombinedLogger::init(loggers).is_ok() {
            LOGGER_INITIALIZED.store(true, Ordering::SeqCst);
        }
    });

    if LOGGER_INITIALIZED.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Other, "Logger initialization failed"))
    }
}
