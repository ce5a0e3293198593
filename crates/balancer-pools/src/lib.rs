//! Off-chain engine for Balancer-style liquidity pool math.
//!
//! The crate reproduces, value for value, the integer arithmetic the on-chain
//! pools perform for swaps, joins and exits, so that callers can quote any
//! pool operation without submitting a transaction. Two pool types are
//! supported: constant-weighted pools and stable (low slippage) pools.
//!
//! The layering mirrors the on-chain contracts: [`swap`] holds the
//! fixed-point primitives and the per-pool-type solvers operating entirely in
//! the 18 decimal domain, while [`pools`] owns balances in native token
//! precision, scales amounts in and out of the solver domain, and commits
//! state mutations. [`pool_init`] defines the serializable parameter records
//! pools are constructed from.

pub mod pool_init;
pub mod pools;
pub mod swap;

pub use {
    pool_init::{PoolRecord, StablePoolRecord, TokenRecord, WeightedPoolRecord, WeightedTokenRecord},
    pools::{Pool, PoolError, PoolKind, stable::StablePool, weighted::WeightedPool},
    swap::fixed_point::Bfp,
};
