//! Unsigned fixed point numbers with exactly 18 decimals and the rounding
//! behavior of the reference pool contracts.
//!
//! Every operation comes in an explicit round-down and round-up variant where
//! the distinction matters. The solvers pick the variant that errs against
//! the trade, which is how the pools guarantee a non-negative fee margin, so
//! a one-unit difference here is a correctness bug rather than noise.

use {
    super::error::Error,
    anyhow::{Context, Result, bail, ensure},
    number::conversions::{big_int_to_u256, u256_to_big_int},
    primitive_types::U256,
    std::{
        fmt::{self, Debug, Display, Formatter},
        str::FromStr,
        sync::LazyLock,
    },
};

mod logexp;

static ONE_18: LazyLock<U256> = LazyLock::new(|| U256::exp10(18));
/// An upper bound on the relative error of [`logexp::pow`], 1e-14 expressed
/// in 18 decimals. Results are widened by this margin in the direction of the
/// requested rounding.
static MAX_POW_RELATIVE_ERROR: LazyLock<Bfp> = LazyLock::new(|| Bfp(U256::from(10_000)));
/// Smallest base allowed for a power with an exponent greater than one.
static MIN_POW_BASE_FREE_EXPONENT: LazyLock<Bfp> =
    LazyLock::new(|| Bfp(U256::from(700_000_000_000_000_000_u128)));

/// Fixed point number in base 10 with 18 decimals, a "Balancer fixed point".
#[derive(Clone, Copy, Default, Eq, PartialEq, PartialOrd, Ord)]
pub struct Bfp(U256);

impl Bfp {
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    pub fn one() -> Self {
        Self(*ONE_18)
    }

    /// 10^`exponent` as a fixed point number, i.e. `exp10(0)` is one wei and
    /// `exp10(18)` is 1.0.
    pub fn exp10(exponent: u8) -> Self {
        Self(U256::exp10(exponent.into()))
    }

    pub fn min_pow_base_free_exponent() -> Self {
        *MIN_POW_BASE_FREE_EXPONENT
    }

    pub fn from_wei(wei: U256) -> Self {
        Self(wei)
    }

    pub fn as_uint256(self) -> U256 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn add(self, other: Self) -> Result<Self, Error> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(Error::AddOverflow)
    }

    /// Subtraction saturating at zero. This intentionally diverges from the
    /// strict [`super::math::BalU256::bsub`]: callers rely on expressions
    /// like `complement`-style differences quietly bottoming out instead of
    /// failing.
    pub fn sub(self, other: Self) -> Self {
        Self(self.0.checked_sub(other.0).unwrap_or_default())
    }

    pub fn mul_down(self, other: Self) -> Result<Self, Error> {
        let product = self.0.checked_mul(other.0).ok_or(Error::MulOverflow)?;
        Ok(Self(product / *ONE_18))
    }

    pub fn mul_up(self, other: Self) -> Result<Self, Error> {
        let product = self.0.checked_mul(other.0).ok_or(Error::MulOverflow)?;
        if product.is_zero() {
            return Ok(Self::zero());
        }
        Ok(Self((product - 1) / *ONE_18 + 1))
    }

    pub fn div_down(self, other: Self) -> Result<Self, Error> {
        if other.0.is_zero() {
            return Err(Error::ZeroDivision);
        }
        if self.0.is_zero() {
            return Ok(Self::zero());
        }
        let inflated = self.0.checked_mul(*ONE_18).ok_or(Error::DivInternal)?;
        Ok(Self(inflated / other.0))
    }

    pub fn div_up(self, other: Self) -> Result<Self, Error> {
        if other.0.is_zero() {
            return Err(Error::ZeroDivision);
        }
        if self.0.is_zero() {
            return Ok(Self::zero());
        }
        let inflated = self.0.checked_mul(*ONE_18).ok_or(Error::DivInternal)?;
        Ok(Self((inflated - 1) / other.0 + 1))
    }

    /// `1 - self`, clamped at zero for values greater than one.
    pub fn complement(self) -> Self {
        if self.0 < *ONE_18 {
            Self(*ONE_18 - self.0)
        } else {
            Self::zero()
        }
    }

    /// `self^exponent`, guaranteed to be at most the infinitely precise
    /// result: the raw power is shrunk by its worst case relative error plus
    /// one wei, clamping at zero.
    pub fn pow_down(self, exponent: Self) -> Result<Self, Error> {
        let raw = self.pow_raw(exponent)?;
        let max_error = raw.mul_up(*MAX_POW_RELATIVE_ERROR)?.add(Self(1.into()))?;
        Ok(raw.sub(max_error))
    }

    /// `self^exponent`, guaranteed to be at least the infinitely precise
    /// result.
    pub fn pow_up(self, exponent: Self) -> Result<Self, Error> {
        let raw = self.pow_raw(exponent)?;
        let max_error = raw.mul_up(*MAX_POW_RELATIVE_ERROR)?.add(Self(1.into()))?;
        raw.add(max_error)
    }

    fn pow_raw(self, exponent: Self) -> Result<Self, Error> {
        let result = logexp::pow(&u256_to_big_int(&self.0), &u256_to_big_int(&exponent.0))?;
        // `pow` yields values no larger than e^130 in 18 decimals, which
        // always fits.
        big_int_to_u256(&result)
            .map(Self)
            .map_err(|_| Error::ProductOutOfBounds)
    }
}

impl Debug for Bfp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Bfp({self})")
    }
}

impl Display for Bfp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:018}", self.0 / *ONE_18, (self.0 % *ONE_18).as_u128())
    }
}

impl FromStr for Bfp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (integer_part, decimal_part) = match s.split_once('.') {
            Some((integer_part, decimal_part)) => (integer_part, decimal_part),
            None => (s, "0"),
        };
        ensure!(
            decimal_part.len() <= 18,
            "fixed point number has more than 18 decimal places",
        );
        if decimal_part.chars().any(|digit| !digit.is_ascii_digit()) {
            bail!("invalid decimal part {decimal_part:?}");
        }
        let units = U256::from_dec_str(integer_part).context("invalid integer part")?;
        let fraction =
            U256::from_dec_str(&format!("{decimal_part:0<18}")).context("invalid decimal part")?;
        let wei = units
            .checked_mul(*ONE_18)
            .and_then(|inflated| inflated.checked_add(fraction))
            .context("fixed point number too large")?;
        Ok(Self(wei))
    }
}
