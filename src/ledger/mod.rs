//! Ledger service integration module
//!
//! This module provides the client contract and wire types for talking to the remote ledger
//! service. The ledger answers four request/response JSON calls: chain height, address
//! activity, transaction detail and spend submission.

/// HTTP client and the `LedgerClient` contract
mod client;
/// Wire types and boundary validation
mod types;

pub use client::{HttpLedgerClient, LedgerClient};
pub use types::*;
