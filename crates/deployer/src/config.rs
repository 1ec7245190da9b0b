//! Deployer configuration.
//!
//! Loaded from a TOML file and layered with `DEPLOYER__SECTION__KEY`
//! environment overrides. Every section has defaults matching a local
//! Hardhat node, so an empty file is a valid configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use alloy::primitives::utils::parse_ether;
use alloy::primitives::U256;
use bigdecimal::BigDecimal;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use v3_deployer_math::{encode_sqrt_price_x96, tick_spacing, validate_tick_range};
use v3_deployer_types::{
    DEFAULT_CREATE_POOL_GAS, DEFAULT_LOCAL_CHAIN_IDS, DEFAULT_MINT_GAS,
    DEFAULT_REQUIRED_CONFIRMATIONS, DEFAULT_SWAP_GAS,
};

use crate::error::{DeployerError, DeployerResult};
use crate::retry::RetryPolicy;

/// Contract names of the core deployment, in deployment order
pub const CORE_CONTRACTS: [&str; 6] = [
    "WETH9",
    "UniswapV3Factory",
    "SwapRouter",
    "NFTDescriptor",
    "NonfungibleTokenPositionDescriptor",
    "NonfungiblePositionManager",
];

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    /// Network used when `--network` is not given
    pub default_network: String,

    /// Named RPC targets
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Chain ids treated as ephemeral test chains (no confirmation wait)
    pub local_chain_ids: Vec<u64>,

    /// Environment variable holding the deployer's private key
    pub private_key_env: String,

    /// Directory holding `deployed-addresses-<network>.json`
    pub registry_dir: PathBuf,

    /// Label passed to the position descriptor, encoded as bytes32
    pub native_currency_label: String,

    pub artifacts: ArtifactsConfig,
    pub retry: RetryPolicy,
    pub gas: GasConfig,
    pub tokens: Vec<TokenConfig>,
    pub pools: Vec<PoolConfig>,
    pub position: PositionConfig,
    pub swap: SwapConfig,
    pub logging: LoggingConfig,
}

/// One RPC target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,

    /// Refuse to run when the node reports a different chain id
    pub expected_chain_id: Option<u64>,

    /// Confirmations awaited on non-local chains
    pub required_confirmations: u64,

    /// Upper bound on a single confirmation wait
    pub confirmation_timeout_secs: u64,

    /// Warn when the deployer holds less than this (in ether)
    pub min_balance_eth: String,
}

/// Where compiled artifacts live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub dir: PathBuf,

    /// Contract name -> artifact file relative to `dir`
    pub files: BTreeMap<String, String>,
}

/// Explicit gas limits for calls whose estimate is unreliable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub create_pool: u64,
    pub mint: u64,
    pub swap: u64,
}

/// Test token deployed by the `tokens` stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Registry key, e.g. `TETHER_ADDRESS`
    pub key: String,
    /// Artifact name
    pub contract: String,
    /// Ticker used to refer to the token elsewhere in this file
    pub symbol: String,
    /// Whole tokens minted to the deployer after deployment
    pub mint_amount: String,
}

/// Pool created by the `pools` stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub token_a: String,
    pub token_b: String,
    pub fee: u32,
    /// Relative reserve of `token_a`
    #[serde(default = "default_reserve")]
    pub reserve_a: String,
    /// Relative reserve of `token_b`
    #[serde(default = "default_reserve")]
    pub reserve_b: String,
}

/// Liquidity position minted by the `mint` stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub token_a: String,
    pub token_b: String,
    pub fee: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub amount_a: String,
    pub amount_b: String,
    /// Zero accepts any slippage
    pub amount_a_min: String,
    pub amount_b_min: String,
}

/// Swap performed by the `swap` stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    pub token_in: String,
    pub token_out: String,
    pub fee: u32,
    pub amount_in: String,
    /// Zero accepts any slippage
    pub amount_out_minimum: String,
    /// Raw Q64.96 value, zero for no limit
    pub sqrt_price_limit_x96: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

fn default_reserve() -> String {
    "1".to_string()
}

impl DeployerConfig {
    /// Load `path` (optional) and apply environment overrides
    pub fn load(path: &Path) -> DeployerResult<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix("DEPLOYER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: DeployerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without environment overrides
    pub fn from_toml(content: &str) -> DeployerResult<Self> {
        let config: DeployerConfig =
            toml::from_str(content).map_err(|e| DeployerError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> DeployerResult<()> {
        if self.networks.is_empty() {
            return Err(DeployerError::config("at least one network must be configured"));
        }
        if !self.networks.contains_key(&self.default_network) {
            return Err(DeployerError::config(format!(
                "default_network '{}' is not among the configured networks",
                self.default_network
            )));
        }
        for (name, network) in &self.networks {
            network.validate(name)?;
        }

        if self.private_key_env.is_empty() {
            return Err(DeployerError::config("private_key_env must name an environment variable"));
        }
        if self.native_currency_label.len() > 32 {
            return Err(DeployerError::config("native_currency_label must fit in 32 bytes"));
        }

        self.retry.validate()?;
        self.gas.validate()?;

        for name in CORE_CONTRACTS {
            self.artifact_file(name)?;
        }

        let mut keys = BTreeSet::new();
        let mut symbols = BTreeSet::new();
        for token in &self.tokens {
            if !keys.insert(token.key.as_str()) {
                return Err(DeployerError::config(format!("duplicate token key {}", token.key)));
            }
            if !symbols.insert(token.symbol.as_str()) {
                return Err(DeployerError::config(format!("duplicate token symbol {}", token.symbol)));
            }
            self.artifact_file(&token.contract)?;
            check_amount("tokens.mint_amount", &token.mint_amount)?;
        }

        for pool in &self.pools {
            self.token(&pool.token_a)?;
            self.token(&pool.token_b)?;
            if pool.token_a == pool.token_b {
                return Err(DeployerError::config(format!(
                    "pool {}/{} pairs a token with itself",
                    pool.token_a, pool.token_b
                )));
            }
            tick_spacing(pool.fee)?;
            check_positive("pools.reserve_a", &pool.reserve_a)?;
            check_positive("pools.reserve_b", &pool.reserve_b)?;
            check_pool_price(pool)?;
        }

        self.position.validate(self)?;
        self.swap.validate(self)?;

        Ok(())
    }

    /// Settings for `name`
    pub fn network(&self, name: &str) -> DeployerResult<&NetworkConfig> {
        self.networks
            .get(name)
            .ok_or_else(|| DeployerError::config(format!("unknown network '{}'", name)))
    }

    /// Token entry by symbol
    pub fn token(&self, symbol: &str) -> DeployerResult<&TokenConfig> {
        self.tokens
            .iter()
            .find(|t| t.symbol == symbol)
            .ok_or_else(|| DeployerError::config(format!("unknown token symbol '{}'", symbol)))
    }

    /// Artifact file of `contract`. Map keys may arrive lower-cased from
    /// environment overrides, so an exact match is preferred but not required.
    pub fn artifact_file(&self, contract: &str) -> DeployerResult<&String> {
        self.artifacts
            .files
            .get(contract)
            .or_else(|| {
                self.artifacts
                    .files
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(contract))
                    .map(|(_, file)| file)
            })
            .ok_or_else(|| {
                DeployerError::config(format!("no artifact file configured for {}", contract))
            })
    }

    pub fn is_local_chain(&self, chain_id: u64) -> bool {
        self.local_chain_ids.contains(&chain_id)
    }

    /// Read the deployer key from the configured environment variable
    pub fn private_key(&self) -> DeployerResult<String> {
        std::env::var(&self.private_key_env).map_err(|_| {
            DeployerError::config(format!(
                "environment variable {} holding the deployer private key is not set",
                self.private_key_env
            ))
        })
    }
}

impl NetworkConfig {
    fn validate(&self, name: &str) -> DeployerResult<()> {
        if self.rpc_url.is_empty() {
            return Err(DeployerError::config(format!("networks.{}.rpc_url is empty", name)));
        }
        if self.required_confirmations == 0 {
            return Err(DeployerError::config(format!(
                "networks.{}.required_confirmations must be greater than 0",
                name
            )));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(DeployerError::config(format!(
                "networks.{}.confirmation_timeout_secs must be greater than 0",
                name
            )));
        }
        self.min_balance_wei()?;
        Ok(())
    }

    pub fn min_balance_wei(&self) -> DeployerResult<U256> {
        parse_ether(&self.min_balance_eth)
            .map_err(|e| DeployerError::config(format!("invalid min_balance_eth: {}", e)))
    }
}

impl GasConfig {
    fn validate(&self) -> DeployerResult<()> {
        if self.create_pool == 0 || self.mint == 0 || self.swap == 0 {
            return Err(DeployerError::config("gas limits must be greater than 0"));
        }
        Ok(())
    }
}

impl PositionConfig {
    fn validate(&self, config: &DeployerConfig) -> DeployerResult<()> {
        if config.tokens.is_empty() {
            return Ok(());
        }
        config.token(&self.token_a)?;
        config.token(&self.token_b)?;
        validate_tick_range(self.tick_lower, self.tick_upper, self.fee)?;
        check_amount("position.amount_a", &self.amount_a)?;
        check_amount("position.amount_b", &self.amount_b)?;
        check_amount("position.amount_a_min", &self.amount_a_min)?;
        check_amount("position.amount_b_min", &self.amount_b_min)?;
        Ok(())
    }
}

impl SwapConfig {
    fn validate(&self, config: &DeployerConfig) -> DeployerResult<()> {
        if config.tokens.is_empty() {
            return Ok(());
        }
        config.token(&self.token_in)?;
        config.token(&self.token_out)?;
        tick_spacing(self.fee)?;
        check_amount("swap.amount_in", &self.amount_in)?;
        check_amount("swap.amount_out_minimum", &self.amount_out_minimum)?;
        U256::from_str(&self.sqrt_price_limit_x96)
            .map_err(|e| DeployerError::config(format!("invalid swap.sqrt_price_limit_x96: {}", e)))?;
        Ok(())
    }
}

fn check_amount(field: &str, value: &str) -> DeployerResult<()> {
    match BigDecimal::from_str(value) {
        Ok(amount) if amount >= BigDecimal::from(0) => Ok(()),
        _ => Err(DeployerError::config(format!(
            "{} must be a non-negative decimal, got '{}'",
            field, value
        ))),
    }
}

/// Token order is unknown until deployment, so both orientations must encode
fn check_pool_price(pool: &PoolConfig) -> DeployerResult<()> {
    let parse = |value: &str| {
        BigDecimal::from_str(value)
            .map_err(|e| DeployerError::config(format!("invalid reserve '{}': {}", value, e)))
    };
    let reserve_a = parse(&pool.reserve_a)?;
    let reserve_b = parse(&pool.reserve_b)?;

    for (reserve1, reserve0) in [(&reserve_b, &reserve_a), (&reserve_a, &reserve_b)] {
        encode_sqrt_price_x96(reserve1, reserve0).map_err(|e| {
            DeployerError::config(format!(
                "pool {}/{} ({}) has unusable reserves: {}",
                pool.token_a, pool.token_b, pool.fee, e
            ))
        })?;
    }
    Ok(())
}

fn check_positive(field: &str, value: &str) -> DeployerResult<()> {
    match BigDecimal::from_str(value) {
        Ok(amount) if amount > BigDecimal::from(0) => Ok(()),
        _ => Err(DeployerError::config(format!(
            "{} must be a positive decimal, got '{}'",
            field, value
        ))),
    }
}

impl Default for DeployerConfig {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert("localhost".to_string(), NetworkConfig::default());

        Self {
            default_network: "localhost".to_string(),
            networks,
            local_chain_ids: DEFAULT_LOCAL_CHAIN_IDS.to_vec(),
            private_key_env: "PRIVATE_KEY".to_string(),
            registry_dir: PathBuf::from("."),
            native_currency_label: String::new(),
            artifacts: ArtifactsConfig::default(),
            retry: RetryPolicy::default(),
            gas: GasConfig::default(),
            tokens: default_tokens(),
            pools: default_pools(),
            position: PositionConfig::default(),
            swap: SwapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            expected_chain_id: None,
            required_confirmations: DEFAULT_REQUIRED_CONFIRMATIONS,
            confirmation_timeout_secs: 300,
            min_balance_eth: "0.1".to_string(),
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        let files = CORE_CONTRACTS
            .iter()
            .chain(["Tether", "UsdCoin", "WrappedBitcoin"].iter())
            .map(|name| (name.to_string(), format!("{}.json", name)))
            .collect();

        Self {
            dir: PathBuf::from("artifacts"),
            files,
        }
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            create_pool: DEFAULT_CREATE_POOL_GAS,
            mint: DEFAULT_MINT_GAS,
            swap: DEFAULT_SWAP_GAS,
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            token_a: "USDT".to_string(),
            token_b: "USDC".to_string(),
            fee: 3000,
            tick_lower: -60,
            tick_upper: 60,
            amount_a: "20".to_string(),
            amount_b: "20".to_string(),
            amount_a_min: "0".to_string(),
            amount_b_min: "0".to_string(),
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            token_in: "USDT".to_string(),
            token_out: "USDC".to_string(),
            fee: 500,
            amount_in: "10".to_string(),
            amount_out_minimum: "0".to_string(),
            sqrt_price_limit_x96: "0".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn default_tokens() -> Vec<TokenConfig> {
    [
        ("TETHER_ADDRESS", "Tether", "USDT"),
        ("USDC_ADDRESS", "UsdCoin", "USDC"),
        ("WRAPPED_BITCOIN_ADDRESS", "WrappedBitcoin", "WBTC"),
    ]
    .into_iter()
    .map(|(key, contract, symbol)| TokenConfig {
        key: key.to_string(),
        contract: contract.to_string(),
        symbol: symbol.to_string(),
        mint_amount: "100000".to_string(),
    })
    .collect()
}

fn default_pools() -> Vec<PoolConfig> {
    [500, 3000]
        .into_iter()
        .map(|fee| PoolConfig {
            token_a: "USDT".to_string(),
            token_b: "USDC".to_string(),
            fee,
            reserve_a: default_reserve(),
            reserve_b: default_reserve(),
        })
        .collect()
}
