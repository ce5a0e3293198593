//! Pool construction parameter records.
//!
//! Pools are built from plain, serializable records in the shape an external
//! indexer lookup returns them: all numeric values are decimal strings in the
//! token's native human readable units. The engine treats these purely as
//! injected data; fetching them is somebody else's job. The same types double
//! as the immutable snapshots pool accessors return.

use {
    super::pools::{Pool, PoolError, StablePool, WeightedPool},
    crate::swap::fixed_point::Bfp,
    primitive_types::{H160, H256},
    serde::{Deserialize, Serialize},
    serde_with::{DisplayFromStr, serde_as},
};

/// A pool token.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub address: H160,
    pub symbol: String,
    /// Balance in human readable units, e.g. `"1500.25"`.
    pub balance: String,
    pub decimals: u8,
}

/// A pool token of a weighted pool, carrying its normalized weight.
#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeightedTokenRecord {
    pub address: H160,
    pub symbol: String,
    /// Balance in human readable units, e.g. `"1500.25"`.
    pub balance: String,
    pub decimals: u8,
    /// Normalized weight as a decimal string, e.g. `"0.5"`.
    #[serde_as(as = "DisplayFromStr")]
    pub weight: Bfp,
}

/// Construction record for a weighted pool.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeightedPoolRecord {
    pub id: H256,
    pub address: H160,
    pub tokens: Vec<WeightedTokenRecord>,
    pub bpt_total_supply: String,
    pub swap_fee_percentage: String,
    #[serde(default)]
    pub query: bool,
}

/// Construction record for a stable pool.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StablePoolRecord {
    pub id: H256,
    pub address: H160,
    pub tokens: Vec<TokenRecord>,
    pub bpt_total_supply: String,
    pub swap_fee_percentage: String,
    pub amplification_parameter: String,
    #[serde(default)]
    pub query: bool,
}

/// A construction record of either pool kind. Weighted records are told
/// apart from stable ones by their per-token weights (and the absence of an
/// amplification parameter).
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum PoolRecord {
    Weighted(WeightedPoolRecord),
    Stable(StablePoolRecord),
}

impl TryFrom<PoolRecord> for Pool {
    type Error = PoolError;

    fn try_from(record: PoolRecord) -> Result<Self, PoolError> {
        let pool = match record {
            PoolRecord::Weighted(record) => Pool::Weighted(WeightedPool::try_from(record)?),
            PoolRecord::Stable(record) => Pool::Stable(StablePool::try_from(record)?),
        };
        tracing::debug!(id = ?pool.id(), kind = ?pool.kind(), "initialized pool");
        Ok(pool)
    }
}
