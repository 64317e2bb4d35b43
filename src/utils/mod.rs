//!
//! Utility module for the wallet sync engine.
//!
//! Exact amount arithmetic and display helpers used throughout the codebase.
/// Arbitrary-precision native amounts
pub mod amount;
/// Formatting helpers for display and logging
pub mod index;

pub use amount::{AmountParseError, NativeAmount};
pub use index::format_token_amount;
