//! `keystone-core`: identity primitives shared by every crate.
//!
//! This crate contains **pure** building blocks (no IO, no async).

pub mod error;
pub mod id;

pub use error::{ErrorKind, InvalidId};
pub use id::{ProjectId, RefreshTokenId, UserId};
