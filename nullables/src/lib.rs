//! Nullable infrastructure for deterministic testing.
//!
//! [`NullLedger`] is an in-memory ledger behind the same
//! [`txbot_client::LedgerClient`] trait the HTTP client implements. It:
//! - Enforces account sequences, balances and fees like the real ledger
//! - Can be scripted to return arbitrary outcomes or go offline
//! - Never touches the network
//!
//! Usage: hand an `Arc<NullLedger>` to the orchestrator in place of a
//! `RestLedgerClient` and assert on its state afterwards.

pub mod ledger;

pub use ledger::{NullAccount, NullLedger, ScriptedBroadcast};
