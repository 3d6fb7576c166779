/// [Szudzik pairing function][szudzik-pairing], wrapping on overflow.
///
/// ```text
/// (a, b) -> if (a<b) then (b^2 + a) else (a^2 + a + b)
/// ```
///
/// Exact (and injective) while both arguments stay below `2^32`; beyond that
/// it degrades into an ordinary hash, which is all the tables need.
///
/// [szudzik-pairing]: http://szudzik.com/ElegantPairing.pdf
pub fn pair(a: u64, b: u64) -> u64 {
    if a < b {
        b.wrapping_mul(b).wrapping_add(a)
    } else {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    }
}

/// Pairing of three values, `pair(pair(a, b), c)` with a final mix so that
/// nested pairs do not cluster in the low bits.
pub fn triple(a: u64, b: u64, c: u64) -> u64 {
    let h = pair(pair(a, b), c);
    // splitmix64 finalizer
    let h = (h ^ (h >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    let h = (h ^ (h >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^ (h >> 31)
}

/// Map a signed value onto the naturals: `x >= 0 -> 2x`, `x < 0 -> 2|x| + 1`.
pub fn fold_sign(value: i32) -> u64 {
    ((value.unsigned_abs() as u64) << 1) | (value < 0) as u64
}

/// Hash used to place keys into the unique and computed tables.
pub trait Fingerprint {
    fn fingerprint(&self) -> u64;
}

impl Fingerprint for (u64, u64) {
    fn fingerprint(&self) -> u64 {
        pair(self.0, self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_small_values() {
        // a\b  0  1  2
        // ------------
        // 0    0  1  4
        // 1    2  3  5
        // 2    6  7  8
        assert_eq!(pair(0, 0), 0);
        assert_eq!(pair(0, 1), 1);
        assert_eq!(pair(1, 0), 2);
        assert_eq!(pair(1, 1), 3);
        assert_eq!(pair(0, 2), 4);
        assert_eq!(pair(1, 2), 5);
        assert_eq!(pair(2, 0), 6);
        assert_eq!(pair(2, 2), 8);
    }

    #[test]
    fn test_pair_does_not_overflow() {
        let _ = pair(u64::MAX, u64::MAX - 1);
        let _ = triple(u64::MAX, 1, u64::MAX);
    }

    #[test]
    fn test_fold_sign() {
        assert_eq!(fold_sign(0), 0);
        assert_eq!(fold_sign(3), 6);
        assert_eq!(fold_sign(-3), 7);
    }
}
