use std::fs::File;

use simplelog::{ColorChoice, CombinedLogger, SharedLogger, TermLogger, TerminalMode, WriteLogger};

use crate::config::Config;
use crate::error::ProxyError;

/// Installs the terminal sink and, when configured, the file sink.
pub fn init(config: &Config) -> Result<(), ProxyError> {
    let (loggers, file_error) = sinks(config);
    CombinedLogger::init(loggers)?;

    if let (Some(path), Some(e)) = (&config.log_file, file_error) {
        log::warn!("Unable to open log file '{}': {}.", path.display(), e);
    }
    Ok(())
}

fn sinks(config: &Config) -> (Vec<Box<dyn SharedLogger>>, Option<std::io::Error>) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        config.log_level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    let mut file_error = None;
    if let Some(path) = &config.log_file {
        match File::create(path) {
            Ok(file) => loggers.push(WriteLogger::new(config.log_level, simplelog::Config::default(), file)),
            Err(e) => file_error = Some(e),
        }
    }
    (loggers, file_error)
}
