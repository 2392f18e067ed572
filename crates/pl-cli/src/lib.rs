//! Support code for the `privlog` command-line tool.

pub mod disclose;
pub mod exit_codes;
pub mod logging;

pub use disclose::{load_escrows, Disclosed, DisclosureKeys};
pub use exit_codes::ExitCode;
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
