//! Chatledger HTTP service.
//!
//! This crate ties the quota ledger together: it exposes the chat endpoint
//! that streams completions to clients, and runs every request through the
//! settlement engine so prepaid balances stay consistent no matter how the
//! remote call ends.
//!
//! # Billing modes
//!
//! - **Pre-deduction** (default): reserve the model choice's worst-case price
//!   before calling upstream, refund the unused part once real token usage is
//!   known, refund everything on failure.
//! - **Post-paid**: admit any request while the balance is strictly positive
//!   and debit the actual cost afterwards; a conversation may tip the balance
//!   negative once, after which the user is blocked.
//!
//! Quota is an opt-in overlay: without a model-choice catalog and a quota
//! directory the service simply relays chat traffic.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Axum handlers all return Result-shaped responses already
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod history;
pub mod response;
pub mod routes;
pub mod settlement;
pub mod state;

pub use config::{BillingMode, ConfigError, ServiceConfig};
pub use error::ApiError;
pub use routes::create_router;
pub use settlement::{SettleError, SettlementEngine};
pub use state::AppState;
