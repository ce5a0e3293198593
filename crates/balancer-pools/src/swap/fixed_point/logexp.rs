//! Natural exponentiation and logarithm with 18 decimal fixed point
//! arguments, ported from the `LogExpMath` library of the reference
//! contracts.
//!
//! `pow` decomposes x^y as exp(y * ln(x)). The decomposition constants below
//! are powers of two of the exponent together with their pre-computed natural
//! exponentials, carried at 20 decimals of precision internally (36 decimals
//! for arguments close to one, where the swap formulas are most sensitive).
//! The relative error of the result stays below 1e-14, the bound the fixed
//! point layer corrects for.
//!
//! Signed arithmetic uses `BigInt`: all intermediate magnitudes are bounded
//! by the argument checks, and integer division on `BigInt` truncates toward
//! zero exactly like the reference implementation's.

use {
    crate::swap::error::Error,
    num::{BigInt, Signed, Zero},
    std::sync::LazyLock,
};

static ONE_18: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(18));
static ONE_20: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(20));
static ONE_36: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10).pow(36));

static MAX_NATURAL_EXPONENT: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(130) * &*ONE_18);
static MIN_NATURAL_EXPONENT: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(-41) * &*ONE_18);

// Bounds of the interval around 1.0 where the logarithm is computed with 36
// decimals instead of 18.
static LN_36_LOWER_BOUND: LazyLock<BigInt> = LazyLock::new(|| &*ONE_18 - BigInt::from(10).pow(17));
static LN_36_UPPER_BOUND: LazyLock<BigInt> = LazyLock::new(|| &*ONE_18 + BigInt::from(10).pow(17));

static TWO_POW_255: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(1) << 255_usize);
static MILD_EXPONENT_BOUND: LazyLock<BigInt> =
    LazyLock::new(|| (BigInt::from(1) << 254_usize) / &*ONE_20);

// 18 decimal constants.
static X0: LazyLock<BigInt> = LazyLock::new(|| "128000000000000000000".parse().unwrap());
/// e^(x0), no decimals.
static A0: LazyLock<BigInt> = LazyLock::new(|| {
    "38877084059945950922200000000000000000000000000000000000"
        .parse()
        .unwrap()
});
static X1: LazyLock<BigInt> = LazyLock::new(|| "64000000000000000000".parse().unwrap());
/// e^(x1), no decimals.
static A1: LazyLock<BigInt> = LazyLock::new(|| "6235149080811616882910000000".parse().unwrap());

// 20 decimal constants.
static X2: LazyLock<BigInt> = LazyLock::new(|| "3200000000000000000000".parse().unwrap());
static A2: LazyLock<BigInt> =
    LazyLock::new(|| "7896296018268069516100000000000000".parse().unwrap());
static X3: LazyLock<BigInt> = LazyLock::new(|| "1600000000000000000000".parse().unwrap());
static A3: LazyLock<BigInt> = LazyLock::new(|| "888611052050787263676000000".parse().unwrap());
static X4: LazyLock<BigInt> = LazyLock::new(|| "800000000000000000000".parse().unwrap());
static A4: LazyLock<BigInt> = LazyLock::new(|| "298095798704172827474000".parse().unwrap());
static X5: LazyLock<BigInt> = LazyLock::new(|| "400000000000000000000".parse().unwrap());
static A5: LazyLock<BigInt> = LazyLock::new(|| "5459815003314423907810".parse().unwrap());
static X6: LazyLock<BigInt> = LazyLock::new(|| "200000000000000000000".parse().unwrap());
static A6: LazyLock<BigInt> = LazyLock::new(|| "738905609893065022723".parse().unwrap());
static X7: LazyLock<BigInt> = LazyLock::new(|| "100000000000000000000".parse().unwrap());
static A7: LazyLock<BigInt> = LazyLock::new(|| "271828182845904523536".parse().unwrap());
static X8: LazyLock<BigInt> = LazyLock::new(|| "50000000000000000000".parse().unwrap());
static A8: LazyLock<BigInt> = LazyLock::new(|| "164872127070012814685".parse().unwrap());
static X9: LazyLock<BigInt> = LazyLock::new(|| "25000000000000000000".parse().unwrap());
static A9: LazyLock<BigInt> = LazyLock::new(|| "128402541668774148407".parse().unwrap());
static X10: LazyLock<BigInt> = LazyLock::new(|| "12500000000000000000".parse().unwrap());
static A10: LazyLock<BigInt> = LazyLock::new(|| "113314845306682631683".parse().unwrap());
static X11: LazyLock<BigInt> = LazyLock::new(|| "6250000000000000000".parse().unwrap());
static A11: LazyLock<BigInt> = LazyLock::new(|| "106449445891785942956".parse().unwrap());

/// Computes x^y with x, y in 18 decimal fixed point. x must fit 255 bits and
/// y must be small enough for y*ln(x) to stay within the natural exponent
/// range.
pub fn pow(x: &BigInt, y: &BigInt) -> Result<BigInt, Error> {
    if y.is_zero() {
        // Everything to the power of zero is one.
        return Ok(ONE_18.clone());
    }
    if x.is_zero() {
        return Ok(BigInt::zero());
    }
    if x >= &*TWO_POW_255 {
        return Err(Error::XOutOfBounds);
    }
    if y >= &*MILD_EXPONENT_BOUND {
        return Err(Error::YOutOfBounds);
    }

    let logx_times_y = if &*LN_36_LOWER_BOUND < x && x < &*LN_36_UPPER_BOUND {
        let ln_36_x = ln_36(x);
        // The 36 decimal logarithm is split into its 18 decimal quotient and
        // remainder before multiplying, keeping the extra precision of the
        // remainder without inflating magnitudes.
        (&ln_36_x / &*ONE_18) * y + ((&ln_36_x % &*ONE_18) * y) / &*ONE_18
    } else {
        ln(x) * y
    };
    let logx_times_y = logx_times_y / &*ONE_18;

    if logx_times_y < *MIN_NATURAL_EXPONENT || logx_times_y > *MAX_NATURAL_EXPONENT {
        return Err(Error::ProductOutOfBounds);
    }
    exp(&logx_times_y)
}

/// Computes e^x for x in 18 decimal fixed point, -41 <= x <= 130.
pub fn exp(x: &BigInt) -> Result<BigInt, Error> {
    if x < &*MIN_NATURAL_EXPONENT || x > &*MAX_NATURAL_EXPONENT {
        return Err(Error::InvalidExponent);
    }
    if x.is_negative() {
        // e^x = 1 / e^(-x); the division loses no more than one wei since
        // the result is smaller than one.
        return Ok(&*ONE_18 * &*ONE_18 / exp(&-x)?);
    }
    let mut x = x.clone();

    // Split off the two 18 decimal factors whose exponentials do not fit 20
    // decimals; they multiply the final result as plain integers.
    let first_an = if x >= *X0 {
        x -= &*X0;
        A0.clone()
    } else if x >= *X1 {
        x -= &*X1;
        A1.clone()
    } else {
        BigInt::from(1)
    };

    // The remaining work happens at 20 decimals.
    x *= BigInt::from(100);
    let mut product = ONE_20.clone();
    for (x_n, a_n) in [
        (&*X2, &*A2),
        (&*X3, &*A3),
        (&*X4, &*A4),
        (&*X5, &*A5),
        (&*X6, &*A6),
        (&*X7, &*A7),
        (&*X8, &*A8),
        (&*X9, &*A9),
    ] {
        if x >= *x_n {
            x -= x_n;
            product = product * a_n / &*ONE_20;
        }
    }

    // Taylor series for the remainder, which is now smaller than x9.
    let mut series_sum = &*ONE_20 + &x;
    let mut term = x.clone();
    for n in 2..=12 {
        term = term * &x / &*ONE_20 / BigInt::from(n);
        series_sum += &term;
    }

    Ok(product * series_sum / &*ONE_20 * first_an / BigInt::from(100))
}

/// Natural logarithm with 18 decimal argument and result. The argument must
/// be positive.
fn ln(a: &BigInt) -> BigInt {
    if a < &*ONE_18 {
        // ln(a) = -ln(1/a) keeps the decomposition below in the a >= 1
        // domain.
        return -ln(&(&*ONE_36 / a));
    }
    let mut a = a.clone();
    let mut sum = BigInt::zero();
    if a >= &*A0 * &*ONE_18 {
        a /= &*A0;
        sum += &*X0;
    }
    if a >= &*A1 * &*ONE_18 {
        a /= &*A1;
        sum += &*X1;
    }

    sum *= BigInt::from(100);
    a *= BigInt::from(100);
    for (x_n, a_n) in [
        (&*X2, &*A2),
        (&*X3, &*A3),
        (&*X4, &*A4),
        (&*X5, &*A5),
        (&*X6, &*A6),
        (&*X7, &*A7),
        (&*X8, &*A8),
        (&*X9, &*A9),
        (&*X10, &*A10),
        (&*X11, &*A11),
    ] {
        if a >= *a_n {
            a = a * &*ONE_20 / a_n;
            sum += x_n;
        }
    }

    // a is now between one and a11; ln(a) = 2 * atanh((a - 1) / (a + 1)).
    let z = (&a - &*ONE_20) * &*ONE_20 / (a + &*ONE_20);
    let z_squared = &z * &z / &*ONE_20;
    let mut num = z.clone();
    let mut series_sum = z;
    for denominator in [3, 5, 7, 9, 11] {
        num = num * &z_squared / &*ONE_20;
        series_sum += &num / BigInt::from(denominator);
    }
    series_sum *= BigInt::from(2);

    (sum + series_sum) / BigInt::from(100)
}

/// High precision (36 decimal) logarithm for 18 decimal arguments close to
/// one, where ln is near zero and the relative error of the 18 decimal
/// version would be too large.
fn ln_36(x: &BigInt) -> BigInt {
    let x = x * &*ONE_18;

    let z = (&x - &*ONE_36) * &*ONE_36 / (x + &*ONE_36);
    let z_squared = &z * &z / &*ONE_36;
    let mut num = z.clone();
    let mut series_sum = z;
    for denominator in [3, 5, 7, 9, 11, 13, 15] {
        num = num * &z_squared / &*ONE_36;
        series_sum += &num / BigInt::from(denominator);
    }

    series_sum * BigInt::from(2)
}
