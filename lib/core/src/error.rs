//! Shared `Result` alias over rootcause reports.
//!
//! Crates keep their own error enums and carry them in `Report<C>`; store
//! failures become the cause of identity failures via `.context()`.

use rootcause::Report;

/// `Result` carrying a rootcause report with context type `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
