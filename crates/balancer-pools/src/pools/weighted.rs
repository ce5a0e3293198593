//! Constant-weighted pool aggregate.

use {
    super::{
        PoolError,
        common::{BPT_DECIMALS, CommonPoolState, TokenState, from_native_units, to_native_units},
    },
    crate::{
        pool_init::{WeightedPoolRecord, WeightedTokenRecord},
        swap::{fixed_point::Bfp, math::BalU256, weighted_math},
    },
    itertools::izip,
    primitive_types::{H160, H256, U256},
    std::{collections::BTreeMap, sync::LazyLock},
};

const MIN_TOKENS: usize = 2;
const MAX_TOKENS: usize = 8;

// A minimum normalized weight imposes a maximum weight ratio; the ratios are
// used as exponents and the power function constrains them.
static MIN_WEIGHT: LazyLock<Bfp> = LazyLock::new(|| Bfp::exp10(16));

/// A constant-weighted pool. Token set, order and weights are fixed at
/// construction; only balances, supply, fee and the query flag change over
/// the pool's lifetime.
#[derive(Clone, Debug)]
pub struct WeightedPool {
    common: CommonPoolState,
    weights: Vec<Bfp>,
}

impl TryFrom<WeightedPoolRecord> for WeightedPool {
    type Error = PoolError;

    fn try_from(record: WeightedPoolRecord) -> Result<Self, PoolError> {
        if record.tokens.len() < MIN_TOKENS {
            return Err(PoolError::Configuration("MIN_TOKENS"));
        }
        if record.tokens.len() > MAX_TOKENS {
            return Err(PoolError::Configuration("MAX_TOKENS"));
        }

        let weights = record
            .tokens
            .iter()
            .map(|token| token.weight)
            .collect::<Vec<_>>();
        let mut normalized_sum = Bfp::zero();
        for &weight in &weights {
            if weight < *MIN_WEIGHT {
                return Err(PoolError::Configuration("MIN_WEIGHT"));
            }
            normalized_sum = normalized_sum.add(weight)?;
        }
        if normalized_sum != Bfp::one() {
            return Err(PoolError::Configuration("NORMALIZED_WEIGHT_INVARIANT"));
        }

        let tokens = record
            .tokens
            .into_iter()
            .map(|token| {
                let mut state = TokenState {
                    address: token.address,
                    symbol: token.symbol,
                    decimals: token.decimals,
                    balance: U256::zero(),
                };
                state.balance = to_native_units(&token.balance, state.decimals)?;
                Ok(state)
            })
            .collect::<Result<Vec<_>, PoolError>>()?;

        Ok(Self {
            common: CommonPoolState::try_new(
                record.id,
                record.address,
                tokens,
                &record.bpt_total_supply,
                &record.swap_fee_percentage,
                record.query,
            )?,
            weights,
        })
    }
}

impl WeightedPool {
    pub fn id(&self) -> H256 {
        self.common.id()
    }

    pub fn address(&self) -> H160 {
        self.common.address()
    }

    /// An immutable snapshot of the pool's tokens in canonical order.
    pub fn tokens(&self) -> Vec<WeightedTokenRecord> {
        self.common
            .tokens()
            .iter()
            .zip(&self.weights)
            .map(|(token, &weight)| WeightedTokenRecord {
                address: token.address,
                symbol: token.symbol.clone(),
                balance: token.format_amount(token.balance()),
                decimals: token.decimals,
                weight,
            })
            .collect()
    }

    pub fn bpt_total_supply(&self) -> String {
        self.common.bpt_total_supply()
    }

    pub fn swap_fee_percentage(&self) -> Bfp {
        self.common.swap_fee_percentage()
    }

    pub fn set_swap_fee_percentage(&mut self, swap_fee: &str) -> Result<(), PoolError> {
        self.common.set_swap_fee_percentage(swap_fee)
    }

    pub fn query(&self) -> bool {
        self.common.query()
    }

    pub fn set_query(&mut self, query: bool) {
        self.common.set_query(query);
    }

    /// The current invariant in the 18 decimal domain.
    pub fn invariant(&self) -> Result<Bfp, PoolError> {
        Ok(weighted_math::calc_invariant(
            &self.weights,
            &self.common.upscaled_balances()?,
        )?)
    }

    pub fn swap_given_in(
        &mut self,
        token_in: &str,
        token_out: &str,
        amount_in: &str,
    ) -> Result<String, PoolError> {
        let index_in = self.common.token_index(token_in)?;
        let index_out = self.common.token_index(token_out)?;
        let tokens = self.common.tokens();
        let amount_in = tokens[index_in].parse_amount(amount_in)?;

        let scaled_amount_out = weighted_math::calc_out_given_in(
            tokens[index_in].upscaled_balance()?,
            self.weights[index_in],
            tokens[index_out].upscaled_balance()?,
            self.weights[index_out],
            tokens[index_in].upscale(amount_in)?,
            Some(self.common.swap_fee),
        )?;
        let amount_out = tokens[index_out].downscale_down(scaled_amount_out)?;

        let new_balance_in = tokens[index_in].balance().badd(amount_in)?;
        let new_balance_out = tokens[index_out].balance().bsub(amount_out)?;
        let formatted = tokens[index_out].format_amount(amount_out);
        self.commit_swap(index_in, new_balance_in, index_out, new_balance_out);
        Ok(formatted)
    }

    pub fn swap_given_out(
        &mut self,
        token_in: &str,
        token_out: &str,
        amount_out: &str,
    ) -> Result<String, PoolError> {
        let index_in = self.common.token_index(token_in)?;
        let index_out = self.common.token_index(token_out)?;
        let tokens = self.common.tokens();
        let amount_out = tokens[index_out].parse_amount(amount_out)?;

        let scaled_amount_in = weighted_math::calc_in_given_out(
            tokens[index_in].upscaled_balance()?,
            self.weights[index_in],
            tokens[index_out].upscaled_balance()?,
            self.weights[index_out],
            tokens[index_out].upscale(amount_out)?,
            Some(self.common.swap_fee),
        )?;
        let amount_in = tokens[index_in].downscale_up(scaled_amount_in)?;

        let new_balance_in = tokens[index_in].balance().badd(amount_in)?;
        let new_balance_out = tokens[index_out].balance().bsub(amount_out)?;
        let formatted = tokens[index_in].format_amount(amount_in);
        self.commit_swap(index_in, new_balance_in, index_out, new_balance_out);
        Ok(formatted)
    }

    pub fn join_exact_tokens_in_for_bpt_out(
        &mut self,
        amounts_in: &BTreeMap<String, String>,
    ) -> Result<String, PoolError> {
        let amounts_in = self.common.parse_amount_map(amounts_in)?;
        let scaled_amounts_in = self
            .common
            .tokens()
            .iter()
            .zip(&amounts_in)
            .map(|(token, &amount)| token.upscale(amount))
            .collect::<Result<Vec<_>, _>>()?;

        let scaled_bpt_out = weighted_math::calc_bpt_out_given_exact_tokens_in(
            &self.common.upscaled_balances()?,
            &self.weights,
            &scaled_amounts_in,
            self.common.upscaled_supply(),
            self.common.swap_fee,
        )?;
        // Pool shares have 18 decimals, so downscaling is the identity.
        let bpt_out = scaled_bpt_out.as_uint256();

        let new_balances = izip!(self.common.tokens(), &amounts_in)
            .map(|(token, &amount)| token.balance().badd(amount))
            .collect::<Result<Vec<_>, _>>()?;
        let new_supply = self.common.bpt_total_supply.badd(bpt_out)?;
        self.commit_liquidity(new_balances, new_supply);
        Ok(from_native_units(bpt_out, BPT_DECIMALS))
    }

    pub fn join_token_in_for_exact_bpt_out(
        &mut self,
        token_in: &str,
        bpt_out: &str,
    ) -> Result<String, PoolError> {
        let index_in = self.common.token_index(token_in)?;
        let bpt_out = to_native_units(bpt_out, BPT_DECIMALS)?;
        let token = &self.common.tokens()[index_in];

        let scaled_amount_in = weighted_math::calc_token_in_given_exact_bpt_out(
            token.upscaled_balance()?,
            self.weights[index_in],
            Bfp::from_wei(bpt_out),
            self.common.upscaled_supply(),
            self.common.swap_fee,
        )?;
        let amount_in = token.downscale_up(scaled_amount_in)?;

        let new_balance = token.balance().badd(amount_in)?;
        let new_supply = self.common.bpt_total_supply.badd(bpt_out)?;
        let formatted = token.format_amount(amount_in);
        if !self.common.query() {
            self.common.tokens[index_in].balance = new_balance;
            self.common.bpt_total_supply = new_supply;
            tracing::trace!(id = ?self.common.id(), "committed join");
        }
        Ok(formatted)
    }

    pub fn exit_exact_bpt_in_for_token_out(
        &mut self,
        token_out: &str,
        bpt_in: &str,
    ) -> Result<String, PoolError> {
        let index_out = self.common.token_index(token_out)?;
        let bpt_in = to_native_units(bpt_in, BPT_DECIMALS)?;
        let token = &self.common.tokens()[index_out];

        let scaled_amount_out = weighted_math::calc_token_out_given_exact_bpt_in(
            token.upscaled_balance()?,
            self.weights[index_out],
            Bfp::from_wei(bpt_in),
            self.common.upscaled_supply(),
            self.common.swap_fee,
        )?;
        let amount_out = token.downscale_down(scaled_amount_out)?;

        let new_balance = token.balance().bsub(amount_out)?;
        let new_supply = self.common.bpt_total_supply.bsub(bpt_in)?;
        let formatted = token.format_amount(amount_out);
        if !self.common.query() {
            self.common.tokens[index_out].balance = new_balance;
            self.common.bpt_total_supply = new_supply;
            tracing::trace!(id = ?self.common.id(), "committed exit");
        }
        Ok(formatted)
    }

    pub fn exit_exact_bpt_in_for_tokens_out(
        &mut self,
        bpt_in: &str,
    ) -> Result<Vec<String>, PoolError> {
        let bpt_in = to_native_units(bpt_in, BPT_DECIMALS)?;
        if bpt_in > self.common.bpt_total_supply {
            return Err(PoolError::SupplyExceeded);
        }

        let scaled_amounts_out = weighted_math::calc_tokens_out_given_exact_bpt_in(
            &self.common.upscaled_balances()?,
            Bfp::from_wei(bpt_in),
            self.common.upscaled_supply(),
        )?;
        let amounts_out = izip!(self.common.tokens(), &scaled_amounts_out)
            .map(|(token, &scaled)| token.downscale_down(scaled))
            .collect::<Result<Vec<_>, _>>()?;

        let new_balances = izip!(self.common.tokens(), &amounts_out)
            .map(|(token, &amount)| token.balance().bsub(amount))
            .collect::<Result<Vec<_>, _>>()?;
        let new_supply = self.common.bpt_total_supply.bsub(bpt_in)?;
        let formatted = izip!(self.common.tokens(), &amounts_out)
            .map(|(token, &amount)| token.format_amount(amount))
            .collect();
        self.commit_liquidity(new_balances, new_supply);
        Ok(formatted)
    }

    pub fn exit_bpt_in_for_exact_tokens_out(
        &mut self,
        amounts_out: &BTreeMap<String, String>,
    ) -> Result<String, PoolError> {
        let amounts_out = self.common.parse_amount_map(amounts_out)?;
        let scaled_amounts_out = izip!(self.common.tokens(), &amounts_out)
            .map(|(token, &amount)| token.upscale(amount))
            .collect::<Result<Vec<_>, _>>()?;

        let scaled_bpt_in = weighted_math::calc_bpt_in_given_exact_tokens_out(
            &self.common.upscaled_balances()?,
            &self.weights,
            &scaled_amounts_out,
            self.common.upscaled_supply(),
            self.common.swap_fee,
        )?;
        // Pool shares have 18 decimals, so downscaling is the identity.
        let bpt_in = scaled_bpt_in.as_uint256();

        let new_balances = izip!(self.common.tokens(), &amounts_out)
            .map(|(token, &amount)| token.balance().bsub(amount))
            .collect::<Result<Vec<_>, _>>()?;
        let new_supply = self.common.bpt_total_supply.bsub(bpt_in)?;
        self.commit_liquidity(new_balances, new_supply);
        Ok(from_native_units(bpt_in, BPT_DECIMALS))
    }

    fn commit_swap(
        &mut self,
        index_in: usize,
        new_balance_in: U256,
        index_out: usize,
        new_balance_out: U256,
    ) {
        if self.common.query() {
            return;
        }
        self.common.tokens[index_in].balance = new_balance_in;
        self.common.tokens[index_out].balance = new_balance_out;
        tracing::trace!(id = ?self.common.id(), "committed swap");
    }

    fn commit_liquidity(&mut self, new_balances: Vec<U256>, new_supply: U256) {
        if self.common.query() {
            return;
        }
        for (token, new_balance) in self.common.tokens.iter_mut().zip(new_balances) {
            token.balance = new_balance;
        }
        self.common.bpt_total_supply = new_supply;
        tracing::trace!(id = ?self.common.id(), "committed liquidity change");
    }
}
