//! # DeusVM Common
//!
//! Shared utilities for the DeusVM daemon and client.
//!
//! ```rust,ignore
//! use deusvm_common::{init_logging, parse_size};
//!
//! init_logging("info").unwrap();
//! let memory = parse_size("4GB").unwrap();
//! ```

pub mod logging;
pub mod size;

pub use logging::{init_logging, init_logging_json, LogFormat};
pub use size::{format_size, parse_size, SizeError};
