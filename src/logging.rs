use std::sync::OnceLock;

use owo_colors::OwoColorize;

/// Used to early-kill debug log formatting work if debug logging is disabled.
pub static DEBUG_ENABLED: OnceLock<bool> = OnceLock::new();

/// Skips the formatting step entirely when debug logging is disabled.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        if *$crate::logging::DEBUG_ENABLED.get().unwrap_or(&false) {
            log::debug!($($arg)*);
        }
    };
}

/// Installs the process-wide logger.
pub fn enable_logger(verbose: bool) {
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}: {}",
                format!(
                    "{}{}",
                    match record.level() {
                        log::Level::Error => "ERROR".red().bold().to_string(),
                        log::Level::Warn => "WARN ".yellow().bold().to_string(),
                        log::Level::Info => "INFO ".green().bold().to_string(),
                        log::Level::Debug => "DEBUG".bright_blue().bold().to_string(),
                        log::Level::Trace => "TRACE".bright_white().bold().to_string(),
                    },
                    if verbose {
                        format!(" [{}]", record.target().split("::").next().unwrap())
                    } else {
                        String::new()
                    }
                    .bright_black()
                ),
                message
            ))
        })
        .level(if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .chain(std::io::stdout())
        .apply()
        .expect("logger installed exactly once");

    DEBUG_ENABLED.set(verbose).expect("logger installed exactly once");
    if verbose {
        log::debug!("verbose logging enabled");
    }
}
