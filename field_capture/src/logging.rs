//! Logger setup for front ends.

use std::fs::File;

/// Environment variable naming a file to write the log to.
pub const LOG_FILE_VAR: &str = "FIELD_CAPTURE_LOG";

/// Initializes `env_logger` from `RUST_LOG`, writing to the file named by
/// `FIELD_CAPTURE_LOG` when set and to stderr otherwise. Calling it twice is
/// harmless.
pub fn init() {
    let mut builder = env_logger::Builder::from_default_env();
    if let Ok(path) = std::env::var(LOG_FILE_VAR) {
        match File::create(&path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Failed to create log file {}: {}", path, e),
        }
    }
    let _ = builder.try_init();
}
