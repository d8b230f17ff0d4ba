//! Bulk account generation with resilient transfer submission.
//!
//! A run picks the first live endpoint, then fans out one pipeline per generated
//! account: fund it from the operator, forward a zero-value transfer, and sweep what
//! remains to a collection address. Completed accounts can optionally be delivered in
//! batches to an operator-owned webhook.

pub mod account;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod input;
pub mod keystore;
pub mod nonce;
pub mod notify;
pub mod pipeline;
pub mod rpc;
pub mod schedule;
pub mod submitter;
