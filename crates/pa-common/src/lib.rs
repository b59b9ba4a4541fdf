//! Purchase Anomaly common types, IDs, and errors.
//!
//! This crate provides the foundational types shared across pa crates:
//! - User and group identity newtypes
//! - The unified error type with stable codes and categories

pub mod error;
pub mod id;

pub use error::{Error, ErrorCategory, Result};
pub use id::{GroupId, UserId};
