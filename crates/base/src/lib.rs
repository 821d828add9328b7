pub mod logging;

pub use logging::{
    StdoutLogger, default_level, format_timestamp, init_stdout_logger,
    init_stdout_logger_with_level, parse_level,
};

// Re-export log crate so downstream crates can use base::log::*
pub use log;
