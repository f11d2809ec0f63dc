//! Domain models for prdispatch.

pub mod provider;
pub mod record;
pub mod task;
pub mod user;

pub use provider::*;
pub use record::*;
pub use task::*;
pub use user::*;
