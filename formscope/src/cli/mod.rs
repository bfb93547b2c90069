//! Command-line interface for formscope
//!
//! This module contains CLI argument parsing

pub mod args;

pub use args::Args;
