/// Network and gas constants used across the deployer

// ============================================================================
// Network Constants
// ============================================================================

/// Chain id of a local Hardhat node
pub const HARDHAT_CHAIN_ID: u64 = 31_337;

/// Chain id of a local Ganache / Geth dev node
pub const DEV_CHAIN_ID: u64 = 1_337;

/// Chain ids treated as local/ephemeral when nothing else is configured
pub const DEFAULT_LOCAL_CHAIN_IDS: [u64; 2] = [HARDHAT_CHAIN_ID, DEV_CHAIN_ID];

/// Confirmations required on public networks unless configured otherwise
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 2;

/// Size of an EVM address in bytes
pub const ADDRESS_LENGTH: usize = 20;

// ============================================================================
// Gas Limits
// ============================================================================

/// Gas limit for `createAndInitializePoolIfNecessary`
pub const DEFAULT_CREATE_POOL_GAS: u64 = 5_000_000;

/// Gas limit for a position manager `mint`
pub const DEFAULT_MINT_GAS: u64 = 1_000_000;

/// Gas limit for `exactInputSingle`
pub const DEFAULT_SWAP_GAS: u64 = 300_000;

// ============================================================================
// Timing
// ============================================================================

/// Seconds added to the submission time to form a call deadline
pub const DEADLINE_WINDOW_SECS: u64 = 600;
