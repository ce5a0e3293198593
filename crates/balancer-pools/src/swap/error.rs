//! Error codes raised by the pool math, named after the revert codes of the
//! reference contracts so failures can be matched against on-chain behavior.

use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum Error {
    #[error("ADD_OVERFLOW")]
    AddOverflow,
    #[error("SUB_OVERFLOW")]
    SubOverflow,
    #[error("MUL_OVERFLOW")]
    MulOverflow,
    #[error("ZERO_DIVISION")]
    ZeroDivision,
    #[error("DIV_INTERNAL")]
    DivInternal,
    #[error("X_OUT_OF_BOUNDS")]
    XOutOfBounds,
    #[error("Y_OUT_OF_BOUNDS")]
    YOutOfBounds,
    #[error("PRODUCT_OUT_OF_BOUNDS")]
    ProductOutOfBounds,
    #[error("INVALID_EXPONENT")]
    InvalidExponent,
    #[error("ZERO_INVARIANT")]
    ZeroInvariant,
    #[error("MAX_IN_RATIO")]
    MaxInRatio,
    #[error("MAX_OUT_RATIO")]
    MaxOutRatio,
    #[error("MAX_OUT_BPT_FOR_TOKEN_IN")]
    MaxOutBptForTokenIn,
    #[error("MIN_BPT_IN_FOR_TOKEN_OUT")]
    MinBptInForTokenOut,
    #[error("STABLE_INVARIANT_DIDNT_CONVERGE")]
    StableInvariantDidntConverge,
    #[error("STABLE_GET_BALANCE_DIDNT_CONVERGE")]
    StableGetBalanceDidntConverge,
}
