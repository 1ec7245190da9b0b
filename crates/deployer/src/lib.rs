//! Uniswap V3 deployment orchestrator.
//!
//! Deploys the core and periphery contracts in dependency order, links
//! library addresses into precompiled bytecode, records every address in a
//! per-network registry and then bootstraps pools, mints a position and
//! performs a swap against them.

pub mod artifact;
pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod error;
pub mod linker;
pub mod liquidity;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod rpc;
pub mod submit;

pub use artifact::{ArtifactSet, ContractArtifact};
pub use bootstrap::{BootstrappedPool, PoolBootstrapper, PoolCreation};
pub use commands::{Stage, StageContext, StageReport, StageStatus};
pub use config::DeployerConfig;
pub use error::{DeployerError, DeployerResult, LinkError, PlanError};
pub use linker::{link, LinkReference};
pub use liquidity::{ensure_allowance, AllowanceOutcome, PositionMinter, Swapper};
pub use pipeline::{
    ConfirmationPolicy, ContractDeployer, DeploymentPlan, Outcome, Pipeline, RunMode, RunReport,
};
pub use registry::{AddressRegistry, RegistryStore};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use rpc::RpcLedger;
