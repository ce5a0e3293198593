//! Conversions between the 256-bit integer type used for on-chain amounts and
//! the arbitrary precision number types used everywhere else.

use {
    anyhow::{Context, Result, ensure},
    bigdecimal::BigDecimal,
    num::{BigInt, BigUint, bigint::Sign},
    primitive_types::U256,
};

pub fn u256_to_big_uint(input: &U256) -> BigUint {
    let mut bytes = [0; 32];
    input.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

pub fn u256_to_big_int(input: &U256) -> BigInt {
    BigInt::from_biguint(Sign::Plus, u256_to_big_uint(input))
}

pub fn u256_to_big_decimal(input: &U256) -> BigDecimal {
    BigDecimal::from(u256_to_big_int(input))
}

pub fn big_uint_to_u256(input: &BigUint) -> Result<U256> {
    let bytes = input.to_bytes_be();
    ensure!(bytes.len() <= 32, "too large for U256");
    Ok(U256::from_big_endian(&bytes))
}

pub fn big_int_to_u256(input: &BigInt) -> Result<U256> {
    ensure!(input.sign() != Sign::Minus, "negative");
    big_uint_to_u256(input.magnitude())
}

pub fn big_decimal_to_big_uint(input: &BigDecimal) -> Option<BigUint> {
    if !input.is_integer() {
        return None;
    }
    let (value, exp) = input.as_bigint_and_exponent();
    // A zero or negative exponent means the value is an integer scaled by a
    // power of ten; a positive exponent can still denote an integer (for
    // example `1.0` is stored as 10 * 10^-1), which `with_scale` normalizes.
    let unscaled = if exp == 0 {
        value
    } else {
        input.with_scale(0).as_bigint_and_exponent().0
    };
    unscaled.to_biguint()
}

pub fn big_decimal_to_u256(input: &BigDecimal) -> Result<U256> {
    let uint = big_decimal_to_big_uint(input).context("not an unsigned integer")?;
    big_uint_to_u256(&uint)
}

#[cfg(test)]
mod tests {
    use {super::*, std::str::FromStr};

    #[test]
    fn u256_big_uint_round_trip() {
        for value in [U256::zero(), U256::one(), U256::MAX, U256::exp10(42)] {
            assert_eq!(big_uint_to_u256(&u256_to_big_uint(&value)).unwrap(), value);
        }
    }

    #[test]
    fn big_int_to_u256_rejects_out_of_range() {
        assert!(big_int_to_u256(&BigInt::from(-1)).is_err());
        let too_large = BigInt::from(1) << 256_usize;
        assert!(big_int_to_u256(&too_large).is_err());
    }

    #[test]
    fn big_decimal_to_u256_integers_only() {
        let value = BigDecimal::from_str("1000000000000000000").unwrap();
        assert_eq!(big_decimal_to_u256(&value).unwrap(), U256::exp10(18));

        let trailing_zeros = BigDecimal::from_str("42.000").unwrap();
        assert_eq!(big_decimal_to_u256(&trailing_zeros).unwrap(), 42.into());

        assert!(big_decimal_to_u256(&BigDecimal::from_str("4.2").unwrap()).is_err());
        assert!(big_decimal_to_u256(&BigDecimal::from_str("-42").unwrap()).is_err());
    }

    #[test]
    fn u256_to_big_decimal_is_exact() {
        assert_eq!(
            u256_to_big_decimal(&U256::exp10(18)),
            BigDecimal::from_str("1000000000000000000").unwrap(),
        );
    }
}
