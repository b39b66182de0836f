//! Command-line interface
//!
//! Argument parsing for the `multihop` binary.

pub mod args;

pub use args::{Args, Commands, Verbosity};
