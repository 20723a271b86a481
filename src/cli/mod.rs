//! Command implementations behind the `psync` binary.

pub mod doctor;
pub mod list_cmd;
pub mod run_cmd;
