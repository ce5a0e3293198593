//! Bookkeeping shared by both pool types: the exclusively owned token list,
//! pool share supply, swap fee and query flag, plus the scaling adapter
//! between native token precision and the 18 decimal solver domain.
//!
//! Amounts cross the pool boundary as decimal strings in human readable
//! units. Going in, a value is converted exactly to an integer in the
//! token's native precision (excess fractional digits truncate toward zero)
//! and then scaled up by `10^(18 - decimals)`. Coming out, results are
//! scaled back down with the rounding direction the caller must never
//! benefit from, and formatted with trailing zeros trimmed.

use {
    super::PoolError,
    crate::swap::{error::Error, fixed_point::Bfp, math::BalU256},
    bigdecimal::BigDecimal,
    num::BigInt,
    number::conversions::{big_decimal_to_u256, u256_to_big_int},
    primitive_types::{H160, H256, U256},
    std::{str::FromStr, sync::LazyLock},
};

static MIN_SWAP_FEE_PERCENTAGE: LazyLock<Bfp> =
    LazyLock::new(|| Bfp::from_wei(U256::exp10(12)));
static MAX_SWAP_FEE_PERCENTAGE: LazyLock<Bfp> =
    LazyLock::new(|| Bfp::from_wei(U256::exp10(17)));

/// Pool share tokens always have 18 decimals.
pub const BPT_DECIMALS: u8 = 18;

/// A pool token: static metadata plus the pool owned balance in native
/// precision.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenState {
    pub address: H160,
    pub symbol: String,
    pub decimals: u8,
    pub(super) balance: U256,
}

impl TokenState {
    pub fn balance(&self) -> U256 {
        self.balance
    }

    fn scaling_factor(&self) -> U256 {
        U256::exp10(usize::from(18 - self.decimals))
    }

    /// The stored balance in the 18 decimal solver domain.
    pub fn upscaled_balance(&self) -> Result<Bfp, Error> {
        self.upscale(self.balance)
    }

    /// Scales a native precision amount up to 18 decimals. This direction is
    /// exact.
    pub fn upscale(&self, amount: U256) -> Result<Bfp, Error> {
        Ok(Bfp::from_wei(amount.bmul(self.scaling_factor())?))
    }

    /// Scales an 18 decimal amount back to native precision, rounding down.
    pub fn downscale_down(&self, amount: Bfp) -> Result<U256, Error> {
        amount.as_uint256().bdiv_down(self.scaling_factor())
    }

    /// Scales an 18 decimal amount back to native precision, rounding up.
    pub fn downscale_up(&self, amount: Bfp) -> Result<U256, Error> {
        amount.as_uint256().bdiv_up(self.scaling_factor())
    }

    pub(super) fn parse_amount(&self, value: &str) -> Result<U256, PoolError> {
        to_native_units(value, self.decimals)
    }

    pub(super) fn format_amount(&self, amount: U256) -> String {
        from_native_units(amount, self.decimals)
    }
}

/// Parses a human readable decimal string into an integer amount in the
/// token's native precision. Fractional digits beyond the token's precision
/// truncate toward zero.
pub fn to_native_units(value: &str, decimals: u8) -> Result<U256, PoolError> {
    let value_decimal = BigDecimal::from_str(value)
        .map_err(|err| PoolError::InputShape(format!("invalid amount {value:?}: {err}")))?;
    if value_decimal < BigDecimal::from(0) {
        return Err(PoolError::InputShape(format!(
            "negative amount {value:?}",
        )));
    }
    let scaled = value_decimal * BigDecimal::new(BigInt::from(1), -i64::from(decimals));
    big_decimal_to_u256(&scaled.with_scale(0))
        .map_err(|err| PoolError::InputShape(format!("amount {value:?} out of range: {err}")))
}

/// Formats a native precision integer amount as a human readable decimal
/// string.
pub fn from_native_units(amount: U256, decimals: u8) -> String {
    BigDecimal::new(u256_to_big_int(&amount), i64::from(decimals))
        .normalized()
        .to_string()
}

/// State common to every pool type. The token list is owned exclusively by
/// the pool; accessors hand out snapshots so external code can never alias
/// internal balances.
#[derive(Clone, Debug)]
pub struct CommonPoolState {
    pub(super) id: H256,
    pub(super) address: H160,
    pub(super) tokens: Vec<TokenState>,
    pub(super) bpt_total_supply: U256,
    pub(super) swap_fee: Bfp,
    pub(super) query: bool,
}

impl CommonPoolState {
    pub fn try_new(
        id: H256,
        address: H160,
        tokens: Vec<TokenState>,
        bpt_total_supply: &str,
        swap_fee_percentage: &str,
        query: bool,
    ) -> Result<Self, PoolError> {
        for token in &tokens {
            if token.decimals > 18 {
                return Err(PoolError::Configuration("INVALID_TOKEN_DECIMALS"));
            }
        }
        // The symbol is the operation level lookup key; a duplicate would
        // silently alias the first match.
        for (i, token) in tokens.iter().enumerate() {
            if tokens[..i].iter().any(|other| other.symbol == token.symbol) {
                return Err(PoolError::Configuration("DUPLICATE_TOKEN"));
            }
        }
        Ok(Self {
            id,
            address,
            tokens,
            bpt_total_supply: to_native_units(bpt_total_supply, BPT_DECIMALS)?,
            swap_fee: validate_swap_fee(swap_fee_percentage)?,
            query,
        })
    }

    pub fn id(&self) -> H256 {
        self.id
    }

    pub fn address(&self) -> H160 {
        self.address
    }

    pub fn tokens(&self) -> &[TokenState] {
        &self.tokens
    }

    pub fn bpt_total_supply(&self) -> String {
        from_native_units(self.bpt_total_supply, BPT_DECIMALS)
    }

    /// The supply in the solver domain; pool shares have 18 decimals, so the
    /// scaling is the identity.
    pub(super) fn upscaled_supply(&self) -> Bfp {
        Bfp::from_wei(self.bpt_total_supply)
    }

    pub fn swap_fee_percentage(&self) -> Bfp {
        self.swap_fee
    }

    pub fn set_swap_fee_percentage(&mut self, swap_fee: &str) -> Result<(), PoolError> {
        self.swap_fee = validate_swap_fee(swap_fee)?;
        Ok(())
    }

    pub fn query(&self) -> bool {
        self.query
    }

    pub fn set_query(&mut self, query: bool) {
        self.query = query;
    }

    pub(super) fn token_index(&self, symbol: &str) -> Result<usize, PoolError> {
        self.tokens
            .iter()
            .position(|token| token.symbol == symbol)
            .ok_or_else(|| PoolError::InputShape(format!("unknown token {symbol:?}")))
    }

    pub(super) fn upscaled_balances(&self) -> Result<Vec<Bfp>, Error> {
        self.tokens
            .iter()
            .map(TokenState::upscaled_balance)
            .collect()
    }

    /// Resolves a symbol keyed amount map against the pool's token set,
    /// returning native precision amounts in canonical token order. The map
    /// must contain exactly the pool's tokens.
    pub(super) fn parse_amount_map(
        &self,
        amounts: &std::collections::BTreeMap<String, String>,
    ) -> Result<Vec<U256>, PoolError> {
        if amounts.len() != self.tokens.len() {
            return Err(PoolError::InputShape(format!(
                "expected amounts for {} tokens, got {}",
                self.tokens.len(),
                amounts.len(),
            )));
        }
        self.tokens
            .iter()
            .map(|token| {
                let value = amounts.get(&token.symbol).ok_or_else(|| {
                    PoolError::InputShape(format!("missing amount for token {:?}", token.symbol))
                })?;
                token.parse_amount(value)
            })
            .collect()
    }
}

fn validate_swap_fee(swap_fee_percentage: &str) -> Result<Bfp, PoolError> {
    let swap_fee = Bfp::from_str(swap_fee_percentage)
        .map_err(|_| PoolError::Configuration("INVALID_SWAP_FEE_PERCENTAGE"))?;
    if swap_fee < *MIN_SWAP_FEE_PERCENTAGE {
        return Err(PoolError::Configuration("MIN_SWAP_FEE_PERCENTAGE"));
    }
    if swap_fee > *MAX_SWAP_FEE_PERCENTAGE {
        return Err(PoolError::Configuration("MAX_SWAP_FEE_PERCENTAGE"));
    }
    Ok(swap_fee)
}
