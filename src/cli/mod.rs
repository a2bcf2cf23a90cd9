//! Subcommands of the `ctester-peer` binary.
//!
//! ## Usage
//!
//! ```bash
//! ctester-peer                 # Play the launch request read from stdin
//! ctester-peer check FILE      # Validate a TOML transaction script
//! ctester-peer config show     # Print effective configuration
//! ```

pub mod check_cmd;
pub mod config_cmd;
pub mod run_cmd;

pub use check_cmd::run_check;
pub use run_cmd::run;
