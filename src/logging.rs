use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
    Config,
};

/// HTTP stack crates that are very chatty at debug level
const QUIET_CRATES: &[&str] = &["reqwest", "hyper", "rustls"];

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid logging configuration: {0}")]
    Config(#[from] log4rs::config::runtime::ConfigErrors),
    #[error("A logger was already set")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Build the stderr logging configuration at `level`.
///
/// The HTTP client crates are capped at INFO even when `level` is more verbose.
pub fn logging_config(level: LevelFilter) -> Result<Config, LoggingError> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{h({d(%Y-%m-%d %H:%M:%S)} [{l}] from line {L} in {M})} - {m}{n}",
        )))
        .target(Target::Stderr)
        .build();

    let mut builder =
        Config::builder().appender(Appender::builder().build("stderr", Box::new(stderr)));
    for name in QUIET_CRATES {
        builder = builder.logger(Logger::builder().build(*name, level.min(LevelFilter::Info)));
    }
    let config = builder.build(Root::builder().appender("stderr").build(level))?;
    Ok(config)
}

/// Send log messages at `level` and above to stderr.
pub fn init_logging(level: LevelFilter) -> Result<(), LoggingError> {
    let config = logging_config(level)?;
    log4rs::init_config(config)?;
    Ok(())
}
