//! Core types for waybill.
//!
//! This crate provides the leaf types shared by the `waybill` body, multipart
//! and routing layers.
//!
//! ## Modules
//!
//! - [`error`]: Error taxonomy shared by every waybill component
//! - [`uri`]: URI decomposition and reconstruction
//! - [`query`]: Query-string parsing and serialization

mod error;
pub mod query;
mod uri;

pub use error::*;
pub use uri::*;
