//! Shared utilities for toolbox.
//!
//! This crate provides common utilities used across the toolbox workspace:
//! - Logging setup with tracing

pub mod log;

pub use log::{LogConfig, LogFormat, LogLevel};
