//! Behaviour of the contracts the simulated chain understands.
//!
//! Only the functions the deployer invokes are implemented. Pools are not
//! priced: the router pays out the input minus the pool fee.

use std::collections::HashMap;

use alloy_primitives::aliases::U24;
use alloy_primitives::{keccak256, Address, U256};
use alloy_sol_types::SolCall;
use v3_deployer_types::contracts::{
    IMintableToken, INonfungiblePositionManager, ISwapRouter, IUniswapV3Factory, IERC20,
};

use crate::constants::{
    CODE_TAG, FACTORY_KIND, POSITION_MANAGER_KIND, ROUTER_KIND, TOKEN_KIND,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Token,
    Factory,
    PositionManager,
    Router,
    /// Deployed but without simulated functions (WETH9, descriptors, ...)
    Opaque,
}

#[derive(Debug, Clone, Default)]
pub struct TokenState {
    pub decimals: u8,
    pub balances: HashMap<Address, U256>,
    pub allowances: HashMap<(Address, Address), U256>,
}

impl TokenState {
    fn balance(&self, owner: Address) -> U256 {
        self.balances.get(&owner).copied().unwrap_or_default()
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances.get(&(owner, spender)).copied().unwrap_or_default()
    }

    /// Move `amount` from `owner` on behalf of `spender`
    fn spend(&mut self, owner: Address, spender: Address, amount: U256) -> Result<(), String> {
        let allowance = self.allowance(owner, spender);
        if allowance < amount {
            return Err(format!(
                "ERC20: insufficient allowance ({} < {})",
                allowance, amount
            ));
        }
        let balance = self.balance(owner);
        if balance < amount {
            return Err(format!("ERC20: transfer amount exceeds balance ({} < {})", balance, amount));
        }
        self.allowances.insert((owner, spender), allowance - amount);
        self.balances.insert(owner, balance - amount);
        Ok(())
    }

    fn credit(&mut self, owner: Address, amount: U256) {
        let balance = self.balance(owner);
        self.balances.insert(owner, balance + amount);
    }
}

#[derive(Debug, Clone)]
enum Contract {
    Token(TokenState),
    Factory,
    PositionManager,
    Router,
    Opaque,
}

/// Contract state of the simulated chain
#[derive(Debug, Clone, Default)]
pub(crate) struct World {
    contracts: HashMap<Address, Contract>,
    /// (token0, token1, fee) -> pool, shared by every factory
    pools: HashMap<(Address, Address, u32), Address>,
    next_position_id: u64,
    pub pools_created: usize,
}

impl World {
    /// Install a contract whose behaviour is chosen by the code tag
    pub fn install(&mut self, address: Address, code: &[u8]) {
        let contract = match code.strip_prefix(&CODE_TAG[..]) {
            Some([TOKEN_KIND, decimals, ..]) => Contract::Token(TokenState {
                decimals: *decimals,
                ..Default::default()
            }),
            Some([FACTORY_KIND, ..]) => Contract::Factory,
            Some([POSITION_MANAGER_KIND, ..]) => Contract::PositionManager,
            Some([ROUTER_KIND, ..]) => Contract::Router,
            _ => Contract::Opaque,
        };
        self.contracts.insert(address, contract);
    }

    pub fn kind(&self, address: Address) -> Option<ContractKind> {
        self.contracts.get(&address).map(|contract| match contract {
            Contract::Token(_) => ContractKind::Token,
            Contract::Factory => ContractKind::Factory,
            Contract::PositionManager => ContractKind::PositionManager,
            Contract::Router => ContractKind::Router,
            Contract::Opaque => ContractKind::Opaque,
        })
    }

    pub fn token(&self, address: Address) -> Option<&TokenState> {
        match self.contracts.get(&address) {
            Some(Contract::Token(token)) => Some(token),
            _ => None,
        }
    }

    pub fn token_mut(&mut self, address: Address) -> Result<&mut TokenState, String> {
        match self.contracts.get_mut(&address) {
            Some(Contract::Token(token)) => Ok(token),
            _ => Err(format!("{} is not a token", address)),
        }
    }

    pub fn pool(&self, token0: Address, token1: Address, fee: u32) -> Option<Address> {
        self.pools.get(&(token0, token1, fee)).copied()
    }

    /// Execute `data` against `to` as `caller`, returning the ABI-encoded output
    pub fn execute(&mut self, caller: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, String> {
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| "calldata shorter than a selector".to_string())?;

        match self.kind(to) {
            Some(ContractKind::Token) => self.token_call(caller, to, selector, data),
            Some(ContractKind::Factory) => self.factory_call(selector, data),
            Some(ContractKind::PositionManager) => self.position_manager_call(caller, to, selector, data),
            Some(ContractKind::Router) => self.router_call(caller, to, selector, data),
            Some(ContractKind::Opaque) => Err(format!("{} does not implement {:02x?}", to, selector)),
            None => Err(format!("no contract at {}", to)),
        }
    }

    fn token_call(
        &mut self,
        caller: Address,
        to: Address,
        selector: [u8; 4],
        data: &[u8],
    ) -> Result<Vec<u8>, String> {
        let token = self.token_mut(to)?;

        if selector == IERC20::approveCall::SELECTOR {
            let call = decode::<IERC20::approveCall>(data)?;
            token.allowances.insert((caller, call.spender), call.amount);
            Ok(IERC20::approveCall::abi_encode_returns(&true))
        } else if selector == IERC20::allowanceCall::SELECTOR {
            let call = decode::<IERC20::allowanceCall>(data)?;
            Ok(IERC20::allowanceCall::abi_encode_returns(&token.allowance(call.owner, call.spender)))
        } else if selector == IERC20::balanceOfCall::SELECTOR {
            let call = decode::<IERC20::balanceOfCall>(data)?;
            Ok(IERC20::balanceOfCall::abi_encode_returns(&token.balance(call.account)))
        } else if selector == IERC20::decimalsCall::SELECTOR {
            Ok(IERC20::decimalsCall::abi_encode_returns(&token.decimals))
        } else if selector == IERC20::symbolCall::SELECTOR {
            Ok(IERC20::symbolCall::abi_encode_returns(&"SIM".to_string()))
        } else if selector == IMintableToken::mintCall::SELECTOR {
            let call = decode::<IMintableToken::mintCall>(data)?;
            token.credit(call.to, call.amount);
            Ok(Vec::new())
        } else {
            Err(format!("token does not implement {:02x?}", selector))
        }
    }

    fn factory_call(&mut self, selector: [u8; 4], data: &[u8]) -> Result<Vec<u8>, String> {
        if selector != IUniswapV3Factory::getPoolCall::SELECTOR {
            return Err(format!("factory does not implement {:02x?}", selector));
        }
        let call = decode::<IUniswapV3Factory::getPoolCall>(data)?;
        let (token0, token1) = if call.tokenA <= call.tokenB {
            (call.tokenA, call.tokenB)
        } else {
            (call.tokenB, call.tokenA)
        };
        let pool = self
            .pool(token0, token1, fee(call.fee))
            .unwrap_or(Address::ZERO);
        Ok(IUniswapV3Factory::getPoolCall::abi_encode_returns(&pool))
    }

    fn position_manager_call(
        &mut self,
        caller: Address,
        manager: Address,
        selector: [u8; 4],
        data: &[u8],
    ) -> Result<Vec<u8>, String> {
        if selector == INonfungiblePositionManager::createAndInitializePoolIfNecessaryCall::SELECTOR {
            let call = decode::<INonfungiblePositionManager::createAndInitializePoolIfNecessaryCall>(data)?;
            if call.token0 >= call.token1 {
                return Err("token0 must sort before token1".to_string());
            }
            let key = (call.token0, call.token1, fee(call.fee));
            let pool = match self.pools.get(&key) {
                Some(pool) => *pool,
                None => {
                    let pool = pool_address(key.0, key.1, key.2);
                    self.pools.insert(key, pool);
                    self.pools_created += 1;
                    pool
                }
            };
            Ok(INonfungiblePositionManager::createAndInitializePoolIfNecessaryCall::abi_encode_returns(&pool))
        } else if selector == INonfungiblePositionManager::mintCall::SELECTOR {
            let params = decode::<INonfungiblePositionManager::mintCall>(data)?.params;
            if self.pool(params.token0, params.token1, fee(params.fee)).is_none() {
                return Err("pool does not exist".to_string());
            }
            if params.tickLower >= params.tickUpper {
                return Err("TLU".to_string());
            }
            let amount0 = params.amount0Desired;
            let amount1 = params.amount1Desired;
            if amount0 < params.amount0Min || amount1 < params.amount1Min {
                return Err("Price slippage check".to_string());
            }

            self.token_mut(params.token0)?.spend(caller, manager, amount0)?;
            self.token_mut(params.token1)?.spend(caller, manager, amount1)?;

            self.next_position_id += 1;
            let liquidity = u128::try_from(amount0.min(amount1)).unwrap_or(u128::MAX);
            Ok(INonfungiblePositionManager::mintCall::abi_encode_returns(
                &INonfungiblePositionManager::mintReturn {
                    tokenId: U256::from(self.next_position_id),
                    liquidity,
                    amount0,
                    amount1,
                },
            ))
        } else {
            Err(format!("position manager does not implement {:02x?}", selector))
        }
    }

    fn router_call(
        &mut self,
        caller: Address,
        router: Address,
        selector: [u8; 4],
        data: &[u8],
    ) -> Result<Vec<u8>, String> {
        if selector != ISwapRouter::exactInputSingleCall::SELECTOR {
            return Err(format!("router does not implement {:02x?}", selector));
        }
        let params = decode::<ISwapRouter::exactInputSingleCall>(data)?.params;
        let fee = fee(params.fee);
        let (token0, token1) = if params.tokenIn <= params.tokenOut {
            (params.tokenIn, params.tokenOut)
        } else {
            (params.tokenOut, params.tokenIn)
        };
        if self.pool(token0, token1, fee).is_none() {
            return Err("pool does not exist".to_string());
        }

        let amount_out =
            params.amountIn * U256::from(1_000_000 - fee) / U256::from(1_000_000u32);
        if amount_out < params.amountOutMinimum {
            return Err("Too little received".to_string());
        }

        self.token_mut(params.tokenIn)?
            .spend(caller, router, params.amountIn)?;
        self.token_mut(params.tokenOut)?
            .credit(params.recipient, amount_out);
        Ok(ISwapRouter::exactInputSingleCall::abi_encode_returns(&amount_out))
    }
}

fn decode<C: SolCall>(data: &[u8]) -> Result<C, String> {
    C::abi_decode(data).map_err(|e| e.to_string())
}

fn fee(fee: U24) -> u32 {
    fee.to::<u32>()
}

/// Deterministic pool address for a key
pub fn pool_address(token0: Address, token1: Address, fee: u32) -> Address {
    let mut preimage = Vec::with_capacity(44);
    preimage.extend_from_slice(token0.as_slice());
    preimage.extend_from_slice(token1.as_slice());
    preimage.extend_from_slice(&fee.to_be_bytes());
    Address::from_slice(&keccak256(preimage)[12..])
}
