//! Core types and utilities for chatledger.
//!
//! This crate provides the foundational types used throughout the chatledger
//! service:
//!
//! - **Model catalog**: `ModelChoice`, `ModelCatalog`, priced and size-limited
//!   model configurations selectable per request
//! - **Usage**: `TokenUsage`, token counts reported by the completion provider
//! - **Errors**: `LedgerError`
//!
//! # Money
//!
//! All prices and balances are `rust_decimal::Decimal` values, denominated in
//! an abstract currency unit chosen by the operator. Decimal arithmetic is
//! exact; balances round-trip through persistence without drift.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod model;
pub mod usage;

pub use error::{LedgerError, Result};
pub use model::{ModelCatalog, ModelChoice, ModelChoiceConfig};
pub use usage::TokenUsage;
