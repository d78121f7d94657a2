//! # Configuration Modules
//!
//! Settings consumed by the session engine. Loading them from files, the
//! environment or the command line is left to the binaries.

/// Session, timeout and backoff settings with production defaults.
pub mod session_config;
