//! prdispatch Core Library
//!
//! Webhook records, provider integration, event dispatch and build
//! submission for the prdispatch pull-request bridge.

pub mod auth;
pub mod builds;
pub mod configure;
pub mod crypto;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod providers;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{DispatchError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
