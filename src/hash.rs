use std::hash::{BuildHasherDefault, Hasher};

/// A hasher optimized for types that are represented as a single u64,
/// such as packed identities and type expressions.
#[derive(Default)]
pub struct U64Hasher(u64);

impl Hasher for U64Hasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        use core::convert::TryInto;
        let seed = u64::from_ne_bytes(bytes.try_into().unwrap());
        let max_prime = 11_400_714_819_323_198_549u64;
        self.0 = max_prime.wrapping_mul(seed);
    }
}

/// A build-hasher for maps keyed by packed 64-bit values.
pub type U64HasherBuilder = BuildHasherDefault<U64Hasher>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::Hash;

    #[test]
    fn hashes_u64_keys() {
        let mut a = U64Hasher::default();
        let mut b = U64Hasher::default();
        42u64.hash(&mut a);
        42u64.hash(&mut b);
        assert_eq!(a.finish(), b.finish());
        assert_ne!(a.finish(), 0);
    }
}
