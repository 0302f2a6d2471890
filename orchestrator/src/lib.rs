//! txbot orchestrator: drives a population of transaction-generating workers.
//!
//! The orchestrator is the central coordinator that:
//! - Owns the treasury signer (as a single actor task) and funds worker accounts
//! - Deploys the contracts some worker kinds need
//! - Spawns workers round-robin over the configured kinds
//! - Drains the funding queue, refunding workers that ran dry
//! - Exposes add/kill/list operations for the control surface

pub mod config;
pub mod contracts;
pub mod error;
pub mod funding;
pub mod metrics;
pub mod orchestrator;
pub mod shutdown;
pub mod tracing_spans;
pub mod treasury;
pub mod worker;

pub use config::{HarnessConfig, RetryConfig};
pub use contracts::{ContractArtifact, ContractArtifacts, ContractRegistry};
pub use error::OrchestratorError;
pub use funding::FundingQueue;
pub use metrics::HarnessMetrics;
pub use orchestrator::{kind_for_index, Orchestrator, WorkerInfo};
pub use shutdown::{ShutdownController, StopCause};
pub use treasury::{FundingPolicy, TreasuryHandle};
pub use worker::{WorkerHandle, WorkerParams, WorkerState};
