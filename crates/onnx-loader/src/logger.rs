use log::{LevelFilter, SetLoggerError};
use log4rs::{
    Config,
    append::console::ConsoleAppender,
    config::{Appender, Root, runtime::ConfigErrors},
    encode::pattern::PatternEncoder,
};

/// Failure to install the console logger.
#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    /// The appender configuration was rejected.
    #[error("invalid logger configuration: {0}")]
    Config(#[from] ConfigErrors),
    /// A logger was already installed.
    #[error(transparent)]
    SetLogger(#[from] SetLoggerError),
}

/// Log to stdout at `level` and report panics through the logger.
pub fn init_log(level: LevelFilter) -> Result<(), LoggerError> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("[{h({l})} - {f}:{L}] {m}{n}")))
        .build();
    let appender = Appender::builder().build("stdout", Box::new(stdout));

    let config = Config::builder()
        .appender(appender)
        .build(Root::builder().appender("stdout").build(level))?;
    log4rs::init_config(config)?;
    update_panic_hook();

    Ok(())
}

fn update_panic_hook() {
    let hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {info}");
        hook(info);
    }));
}
