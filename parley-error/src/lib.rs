//! # parley-error
//!
//! Unified error handling for parley, modelled on OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., SessionNotFound, ProviderUnavailable)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use parley_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::SessionNotFound, "session 'a1b2c3' not found")
//!         .with_operation("runner::run")
//!         .with_context("app", "Parley")
//!         .with_context("user_id", "guest"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All library functions return `Result<T, parley_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using parley Error
pub type Result<T> = std::result::Result<T, Error>;
