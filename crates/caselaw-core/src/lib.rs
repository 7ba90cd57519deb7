//! caselaw-core
//!
//! Shared configuration, error taxonomy, domain types, the document store and
//! the text-generation capability trait.

pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
