// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Command-line interface.
//!
//! Argument parsing, console output, and the `analyze` command. The `serve`
//! command hands off to [`crate::server::serve`].

/// Posture analysis command.
pub mod analyze;

/// CLI arguments.
pub mod args;

/// Console output and tracing setup.
pub mod logging;
