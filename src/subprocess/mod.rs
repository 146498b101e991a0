//! Subprocess transport for the Claude CLI
//!
//! Split into command construction ([`CommandBuilder`]), buffered execution
//! ([`SubprocessExecutor::execute`]), streaming execution
//! ([`SubprocessExecutor::execute_streaming`]), and the process registry that
//! tracks in-flight children for shutdown.

pub mod command;
pub mod executor;
pub mod registry;
pub mod streaming;

pub use command::{CommandBuilder, SKIP_PERMISSIONS_FLAG};
pub use executor::{ExecOptions, SubprocessExecutor};
pub use registry::{ProcessGuard, ProcessRegistry};
