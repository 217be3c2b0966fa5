/// Currency-tagged decimal amounts.
pub mod money;

/// Account aggregate: balance, status lifecycle and its invariants.
pub mod account;

/// Transaction records and the movements they describe.
pub mod transaction;

/// Persistence interfaces, plus "in memory" implementations.
pub mod store;

/// Account and transaction services. All balance changes go through
/// [`service::TransactionService`], which runs each of them as one unit of
/// work under per-account locks.
pub mod service;

/// Request objects validated into service calls.
pub mod command;

/// Command processor interface, plus the [`processor::Ledger`] wiring
/// stores, locks and services together.
pub mod processor;

pub mod config;

pub mod telemetry;

/// Ideally, this module should exist in its own crate, as a way to
/// bootstrap the ledger from the command line. It lives here so the
/// integration test can drive it.
pub mod bin_utils;
