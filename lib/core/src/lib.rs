//! Core types shared by the confplanner crates.
//!
//! This crate provides the error-handling foundation and the strongly-typed
//! identifiers that the authentication layer and the server agree on.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, UserId};
