/*!
    Deterministic RNG helpers for reproducible key material in tests
    and benches
*/

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default seed for deterministic tests
pub const DEFAULT_TEST_SEED: u64 = 42;

/// Create a deterministic RNG with the default seed
pub fn test_rng() -> StdRng {
    test_rng_with_seed(DEFAULT_TEST_SEED)
}

/// Create a deterministic RNG with a custom seed
pub fn test_rng_with_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Generate a deterministic vec of random bytes
pub fn deterministic_bytes(len: usize) -> Vec<u8> {
    deterministic_bytes_with_seed(len, DEFAULT_TEST_SEED)
}

/// Generate a deterministic vec of random bytes with custom seed
pub fn deterministic_bytes_with_seed(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = test_rng_with_seed(seed);
    (0..len).map(|_| rng.random()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_are_reproducible() {
        assert_eq!(deterministic_bytes(64), deterministic_bytes(64));
        assert_ne!(
            deterministic_bytes_with_seed(64, 1),
            deterministic_bytes_with_seed(64, 2)
        );
    }
}
