//! Jacobi symbol over arbitrary precision integers

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::Zero;

/// Lowest 32 bits of `n`, enough to read residues mod 8
fn low_bits(n: &BigUint) -> u32 {
    n.iter_u32_digits().next().unwrap_or(0)
}

/// Compute the Jacobi symbol `(a / n)` for an odd positive modulus `n`.
///
/// Returns `1`, `-1`, or `0`. An even or zero modulus yields `0`.
pub fn jacobi(a: &BigUint, n: &BigUint) -> i8 {
    if n.is_zero() || n.is_even() {
        return 0;
    }

    let mut a = a % n;
    let mut n = n.clone();
    let mut t: i8 = 1;

    while !a.is_zero() {
        let twos = a.trailing_zeros().unwrap_or(0);
        if twos > 0 {
            a >>= twos;
            let r = low_bits(&n) & 7;
            if twos % 2 == 1 && (r == 3 || r == 5) {
                t = -t;
            }
        }

        std::mem::swap(&mut a, &mut n);
        if low_bits(&a) & 3 == 3 && low_bits(&n) & 3 == 3 {
            t = -t;
        }
        a %= &n;
    }

    if n == BigUint::from(1u8) {
        t
    } else {
        0
    }
}
