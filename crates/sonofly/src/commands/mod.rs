//! Command handlers: bridge CLI args -> hub operations -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod run;
pub mod send;
pub mod util;
