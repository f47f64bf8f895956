//! # System Interaction Layer
//!
//! The boundary between the build engine and the operating system.
//!
//! - **`executor`**: spawns the build tool, streams its output and honours
//!   cancellation (`Ctrl+C`).
//! - **`shell`**: platform command lines, i.e. the `cmd.exe` wrapping on Windows and
//!   the rendering of argument vectors for build output.

pub mod executor;
pub mod shell;
