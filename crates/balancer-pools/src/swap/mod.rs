//! Pool math operating in the canonical 18 decimal fixed point domain.
//!
//! Everything in this module works on amounts that have already been scaled
//! up from native token precision. Rounding directions follow the on-chain
//! libraries exactly: amounts leaving the pool round down, amounts entering
//! the pool round up, so accumulated rounding error never favors the caller.

pub mod error;
pub mod fixed_point;
pub mod math;
pub mod stable_math;
pub mod weighted_math;
