//! Checked arithmetic on raw, unscaled 256-bit magnitudes.
//!
//! The stable pool solver tracks scale factors by hand (its amplification
//! parameter carries its own precision constant instead of the 18 decimal
//! one), so it needs plain integer operations next to the fixed point layer.
//! Unlike [`super::fixed_point::Bfp::sub`], subtraction here is strict and
//! fails on underflow.

use {super::error::Error, primitive_types::U256};

pub trait BalU256: Sized {
    fn badd(self, other: Self) -> Result<Self, Error>;
    fn bsub(self, other: Self) -> Result<Self, Error>;
    fn bmul(self, other: Self) -> Result<Self, Error>;
    fn bdiv_down(self, other: Self) -> Result<Self, Error>;
    fn bdiv_up(self, other: Self) -> Result<Self, Error>;
    fn bdiv(self, other: Self, round_up: bool) -> Result<Self, Error>;
}

impl BalU256 for U256 {
    fn badd(self, other: Self) -> Result<Self, Error> {
        self.checked_add(other).ok_or(Error::AddOverflow)
    }

    fn bsub(self, other: Self) -> Result<Self, Error> {
        self.checked_sub(other).ok_or(Error::SubOverflow)
    }

    fn bmul(self, other: Self) -> Result<Self, Error> {
        self.checked_mul(other).ok_or(Error::MulOverflow)
    }

    fn bdiv_down(self, other: Self) -> Result<Self, Error> {
        self.checked_div(other).ok_or(Error::ZeroDivision)
    }

    fn bdiv_up(self, other: Self) -> Result<Self, Error> {
        if other.is_zero() {
            return Err(Error::ZeroDivision);
        }
        if self.is_zero() {
            // The ceiling formula below requires a non-zero dividend.
            return Ok(U256::zero());
        }
        Ok((self - 1) / other + 1)
    }

    fn bdiv(self, other: Self, round_up: bool) -> Result<Self, Error> {
        if round_up {
            self.bdiv_up(other)
        } else {
            self.bdiv_down(other)
        }
    }
}
