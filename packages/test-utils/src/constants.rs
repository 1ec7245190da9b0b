use alloy_primitives::{address, Address};
use v3_deployer_types::HARDHAT_CHAIN_ID;

/// First Hardhat development account
pub const DEPLOYER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

pub const SIMULATED_CHAIN_ID: u64 = HARDHAT_CHAIN_ID;

/// Native balance the deployer starts with (10,000 ether)
pub const INITIAL_BALANCE_WEI: u128 = 10_000 * 1_000_000_000_000_000_000;

// Fixture bytecode starts with `CODE_TAG` followed by one kind byte, which is
// how the simulated chain decides what a deployment behaves like.
pub const CODE_TAG: [u8; 3] = [0x7e, 0x7e, 0x00];
pub const TOKEN_KIND: u8 = 0x01;
pub const FACTORY_KIND: u8 = 0x02;
pub const POSITION_MANAGER_KIND: u8 = 0x03;
pub const ROUTER_KIND: u8 = 0x04;
pub const OPAQUE_KIND: u8 = 0x05;

/// Source file the descriptor library is linked from
pub const NFT_DESCRIPTOR_SOURCE: &str = "contracts/libraries/NFTDescriptor.sol";

/// Hardhat placeholder for the NFTDescriptor library
pub const NFT_DESCRIPTOR_PLACEHOLDER: &str = "__$cea9be979eee3d87fb124d6cbb244bb0b5$__";
