//! IMDb Mirror Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the IMDb mirror workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Types**: [`ImdbId`], the normalized title identifier
//!
//! # Example
//!
//! ```no_run
//! use imdb_common::{ImdbId, Result};
//!
//! fn lookup(raw: &str) -> Result<()> {
//!     let id: ImdbId = raw.parse()?;
//!     println!("normalized id: {}", id);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::ImdbId;
