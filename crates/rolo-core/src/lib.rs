//! Core types and trait definitions for the Rolo contact service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it.

pub mod contact;
pub mod error;
pub mod query;
pub mod store;

pub use error::{Error, ErrorKind, Result};
