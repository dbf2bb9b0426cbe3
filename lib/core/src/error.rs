//! Error handling foundation for confplanner.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Each crate defines its own domain-specific error enums in its own
//! error module, and wraps lower-level reports with `Report::context`
//! as they cross a layer boundary.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
///
/// `C` is the current context of the report, usually a crate's error enum.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
