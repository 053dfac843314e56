use std::fs::File;
use std::path::Path;

use log::LevelFilter;
use simplelog::ColorChoice;
use simplelog::CombinedLogger;
use simplelog::ConfigBuilder;
use simplelog::LevelPadding;
use simplelog::TermLogger;
use simplelog::TerminalMode;
use simplelog::WriteLogger;

use crate::error::Error;

fn level_from_verbosity(verbosity: usize) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Sets up terminal logging for binaries and examples driving the
/// core. The core itself only emits through the `log` macros and
/// never touches sinks directly.
pub fn setup_logging(verbosity: usize) -> Result<(), Error> {
    let config = ConfigBuilder::default()
        .set_level_padding(LevelPadding::Right)
        .set_thread_level(LevelFilter::Off)
        .build();
    TermLogger::init(
        level_from_verbosity(verbosity),
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .map_err(|error| Error::InvalidSetup(format!("logger already installed: {}", error)))
}

/// Terminal plus log-file sink.
pub fn setup_logging_with_file(verbosity: usize, log_file: &Path) -> Result<(), Error> {
    let config = ConfigBuilder::default()
        .set_level_padding(LevelPadding::Right)
        .set_thread_level(LevelFilter::Off)
        .build();
    let level = level_from_verbosity(verbosity);
    CombinedLogger::init(vec![
        TermLogger::new(level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, config, File::create(log_file)?),
    ])
    .map_err(|error| Error::InvalidSetup(format!("logger already installed: {}", error)))
}
