//! Shared utilities for larder
//!
//! This crate provides:
//! - Key types (ChannelKey, RecordId)
//! - Wall-clock helpers with mock time support
//! - Error types
//! - Variable substitution for message templates
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod subst;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use subst::*;
pub use time::*;
