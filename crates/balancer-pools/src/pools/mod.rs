//! Pool aggregates: owned balances and supply in native token precision,
//! scaled in and out of the 18 decimal solver domain per operation.
//!
//! The two pool types share their bookkeeping by composition (see
//! [`common::CommonPoolState`]) and are dispatched through the explicit
//! [`Pool`] enum tag; there is no virtual dispatch over a common base.
//!
//! Every operation is all-or-nothing: inputs are parsed and validated, the
//! solver runs, results are scaled back, and only then is the balance and
//! supply mutation committed in one step. In query mode the mutation is
//! dropped and the pool is left untouched.

use {
    super::swap::{error::Error, fixed_point::Bfp},
    primitive_types::{H160, H256},
    std::collections::BTreeMap,
    thiserror::Error as ThisError,
};

pub mod common;
pub mod stable;
pub mod weighted;

pub use {stable::StablePool, weighted::WeightedPool};

/// Supported pool kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PoolKind {
    Weighted,
    Stable,
}

/// Error conditions surfaced by pool operations. Math level error codes are
/// regrouped by the condition they represent at this level.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PoolError {
    /// Construction or fee update parameter outside its allowed range. The
    /// pool is left unchanged.
    #[error("configuration error: {0}")]
    Configuration(&'static str),
    /// A join/exit amount map with missing or extra tokens, an unknown token
    /// symbol, or an amount that cannot be parsed.
    #[error("input shape error: {0}")]
    InputShape(String),
    /// A swap above the single-swap balance cap, or a join/exit pushing the
    /// invariant past its growth or shrink cap.
    #[error("ratio exceeded: {0}")]
    RatioExceeded(Error),
    /// An iterative solver exhausted its iteration cap. The outcome is
    /// deterministic in the inputs, so retrying cannot succeed.
    #[error("solver did not converge: {0}")]
    Convergence(Error),
    /// A full withdrawal requested more pool shares than the total supply.
    #[error("BPT in exceeds total supply")]
    SupplyExceeded,
    /// Any other arithmetic failure.
    #[error(transparent)]
    Math(Error),
}

impl From<Error> for PoolError {
    fn from(err: Error) -> Self {
        match err {
            Error::MaxInRatio
            | Error::MaxOutRatio
            | Error::MaxOutBptForTokenIn
            | Error::MinBptInForTokenOut => Self::RatioExceeded(err),
            Error::StableInvariantDidntConverge | Error::StableGetBalanceDidntConverge => {
                Self::Convergence(err)
            }
            _ => Self::Math(err),
        }
    }
}

/// A pool of either supported kind, exposing the common operation set.
///
/// All amounts cross this boundary as decimal strings in the token's native
/// human readable units; conversion into and out of the fixed point domain
/// happens inside.
#[derive(Clone, Debug)]
pub enum Pool {
    Weighted(WeightedPool),
    Stable(StablePool),
}

impl Pool {
    pub fn kind(&self) -> PoolKind {
        match self {
            Self::Weighted(_) => PoolKind::Weighted,
            Self::Stable(_) => PoolKind::Stable,
        }
    }

    pub fn id(&self) -> H256 {
        match self {
            Self::Weighted(pool) => pool.id(),
            Self::Stable(pool) => pool.id(),
        }
    }

    pub fn address(&self) -> H160 {
        match self {
            Self::Weighted(pool) => pool.address(),
            Self::Stable(pool) => pool.address(),
        }
    }

    pub fn bpt_total_supply(&self) -> String {
        match self {
            Self::Weighted(pool) => pool.bpt_total_supply(),
            Self::Stable(pool) => pool.bpt_total_supply(),
        }
    }

    pub fn swap_fee_percentage(&self) -> Bfp {
        match self {
            Self::Weighted(pool) => pool.swap_fee_percentage(),
            Self::Stable(pool) => pool.swap_fee_percentage(),
        }
    }

    pub fn set_swap_fee_percentage(&mut self, swap_fee: &str) -> Result<(), PoolError> {
        match self {
            Self::Weighted(pool) => pool.set_swap_fee_percentage(swap_fee),
            Self::Stable(pool) => pool.set_swap_fee_percentage(swap_fee),
        }
    }

    pub fn query(&self) -> bool {
        match self {
            Self::Weighted(pool) => pool.query(),
            Self::Stable(pool) => pool.query(),
        }
    }

    pub fn set_query(&mut self, query: bool) {
        match self {
            Self::Weighted(pool) => pool.set_query(query),
            Self::Stable(pool) => pool.set_query(query),
        }
    }

    pub fn invariant(&self) -> Result<Bfp, PoolError> {
        match self {
            Self::Weighted(pool) => pool.invariant(),
            Self::Stable(pool) => pool.invariant(),
        }
    }

    pub fn swap_given_in(
        &mut self,
        token_in: &str,
        token_out: &str,
        amount_in: &str,
    ) -> Result<String, PoolError> {
        match self {
            Self::Weighted(pool) => pool.swap_given_in(token_in, token_out, amount_in),
            Self::Stable(pool) => pool.swap_given_in(token_in, token_out, amount_in),
        }
    }

    pub fn swap_given_out(
        &mut self,
        token_in: &str,
        token_out: &str,
        amount_out: &str,
    ) -> Result<String, PoolError> {
        match self {
            Self::Weighted(pool) => pool.swap_given_out(token_in, token_out, amount_out),
            Self::Stable(pool) => pool.swap_given_out(token_in, token_out, amount_out),
        }
    }

    pub fn join_exact_tokens_in_for_bpt_out(
        &mut self,
        amounts_in: &BTreeMap<String, String>,
    ) -> Result<String, PoolError> {
        match self {
            Self::Weighted(pool) => pool.join_exact_tokens_in_for_bpt_out(amounts_in),
            Self::Stable(pool) => pool.join_exact_tokens_in_for_bpt_out(amounts_in),
        }
    }

    pub fn join_token_in_for_exact_bpt_out(
        &mut self,
        token_in: &str,
        bpt_out: &str,
    ) -> Result<String, PoolError> {
        match self {
            Self::Weighted(pool) => pool.join_token_in_for_exact_bpt_out(token_in, bpt_out),
            Self::Stable(pool) => pool.join_token_in_for_exact_bpt_out(token_in, bpt_out),
        }
    }

    pub fn exit_exact_bpt_in_for_token_out(
        &mut self,
        token_out: &str,
        bpt_in: &str,
    ) -> Result<String, PoolError> {
        match self {
            Self::Weighted(pool) => pool.exit_exact_bpt_in_for_token_out(token_out, bpt_in),
            Self::Stable(pool) => pool.exit_exact_bpt_in_for_token_out(token_out, bpt_in),
        }
    }

    pub fn exit_exact_bpt_in_for_tokens_out(
        &mut self,
        bpt_in: &str,
    ) -> Result<Vec<String>, PoolError> {
        match self {
            Self::Weighted(pool) => pool.exit_exact_bpt_in_for_tokens_out(bpt_in),
            Self::Stable(pool) => pool.exit_exact_bpt_in_for_tokens_out(bpt_in),
        }
    }

    pub fn exit_bpt_in_for_exact_tokens_out(
        &mut self,
        amounts_out: &BTreeMap<String, String>,
    ) -> Result<String, PoolError> {
        match self {
            Self::Weighted(pool) => pool.exit_bpt_in_for_exact_tokens_out(amounts_out),
            Self::Stable(pool) => pool.exit_bpt_in_for_exact_tokens_out(amounts_out),
        }
    }
}
