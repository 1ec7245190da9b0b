//! Centralized error types for the deployer

use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use thiserror::Error;
use v3_deployer_math::MathError;
use v3_deployer_types::LedgerError;

/// Main deployer error type
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Deployment of {stage} failed after {attempts} attempt(s): {message}")]
    Deployment {
        stage: String,
        attempts: u32,
        message: String,
    },

    #[error("Timed out after {timeout:?} waiting for {confirmations} confirmation(s) of {tx_hash} ({stage})")]
    ConfirmationTimeout {
        stage: String,
        tx_hash: TxHash,
        confirmations: u64,
        timeout: Duration,
    },

    #[error("{stage} was submitted to {address} in {tx_hash} but never confirmed: {source}")]
    Unconfirmed {
        stage: String,
        address: Address,
        tx_hash: TxHash,
        source: Box<DeployerError>,
    },

    #[error("Transaction {tx_hash} reverted: {context}")]
    TransactionReverted { context: String, tx_hash: TxHash },

    #[error("Failed to write registry {path:?}: {message}")]
    RegistryWrite { path: PathBuf, message: String },

    #[error("Registry {path:?} is locked by another run")]
    RegistryLocked { path: PathBuf },

    #[error("Address for {key} not found in registry {path:?}")]
    MissingAddress { key: String, path: PathBuf },

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Bytecode linking errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Missing link library name {symbol}")]
    MissingLinkSymbol { symbol: String },

    #[error("Invalid bytecode linking parameters for {symbol}: window ends at {end} but bytecode has {len} hex digits")]
    BytecodeBounds {
        symbol: String,
        end: usize,
        len: usize,
    },

    #[error("Bytecode has a non-ASCII character at offset {position}")]
    NonAsciiBytecode { position: usize },

    #[error("Link reference for {symbol} spans {length} bytes, expected 20")]
    InvalidLinkLength { symbol: String, length: usize },
}

/// Deployment plan errors, detected before anything is submitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Step {step} depends on {dependency}, which no step or registry entry provides")]
    UnresolvedDependency { step: String, dependency: String },

    #[error("Dependency cycle among steps: {0:?}")]
    Cycle(Vec<String>),

    #[error("Duplicate step key {0}")]
    DuplicateKey(String),

    #[error("No artifact loaded for contract {0}")]
    MissingArtifact(String),
}

impl DeployerError {
    /// Whether the deploy-with-retry wrapper may attempt the stage again
    pub fn is_retryable(&self) -> bool {
        match self {
            DeployerError::Deployment { .. } => true,
            DeployerError::Ledger(err) => {
                matches!(err, LedgerError::Rejected(_) | LedgerError::Transport(_))
            }
            _ => false,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        DeployerError::Config(message.into())
    }

    pub fn artifact(message: impl Into<String>) -> Self {
        DeployerError::Artifact(message.into())
    }
}

impl From<serde_json::Error> for DeployerError {
    fn from(err: serde_json::Error) -> Self {
        DeployerError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for DeployerError {
    fn from(err: config::ConfigError) -> Self {
        DeployerError::Config(err.to_string())
    }
}

/// Result type alias for deployer operations
pub type DeployerResult<T> = Result<T, DeployerError>;
