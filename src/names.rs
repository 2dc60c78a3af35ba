//! Fresh identifier generation for emitted interpreters.
//!
//! Every internal role of the emitted interpreter (stack register, scope
//! register, decoder helper, handler table, anti-debug routine, ...) gets
//! one fresh name per emission, so two runs over the same input produce
//! lexically distinct output. Issued names are tracked to reject collisions,
//! and a reserved set protects source identifiers and host intrinsics.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FIRST_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz$_";
const REST_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789$_";

/// Default length of generated identifiers.
pub const DEFAULT_NAME_LEN: usize = 12;

pub struct NameManager {
    rng: StdRng,
    length: usize,
    issued: HashSet<String>,
    reserved: HashSet<String>,
}

impl NameManager {
    pub fn new(length: usize) -> Self {
        Self::with_rng(length, StdRng::from_entropy())
    }

    /// Deterministic variant for tests.
    pub fn with_seed(length: usize, seed: u64) -> Self {
        Self::with_rng(length, StdRng::seed_from_u64(seed))
    }

    fn with_rng(length: usize, rng: StdRng) -> Self {
        Self {
            rng,
            length: length.max(1),
            issued: HashSet::new(),
            reserved: HashSet::new(),
        }
    }

    /// Mark names the generator must never hand out.
    pub fn reserve<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.reserved.insert(name.into());
        }
    }

    /// Produce a fresh identifier, unique within this emission.
    pub fn fresh(&mut self) -> String {
        loop {
            let candidate = self.candidate();
            if self.reserved.contains(&candidate) || self.issued.contains(&candidate) {
                continue;
            }
            self.issued.insert(candidate.clone());
            return candidate;
        }
    }

    fn candidate(&mut self) -> String {
        let mut out = String::with_capacity(self.length);
        let first = FIRST_CHARS[self.rng.gen_range(0..FIRST_CHARS.len())];
        out.push(first as char);
        for _ in 1..self.length {
            let ch = REST_CHARS[self.rng.gen_range(0..REST_CHARS.len())];
            out.push(ch as char);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_within_an_emission() {
        let mut names = NameManager::with_seed(8, 7);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            assert!(seen.insert(names.fresh()), "duplicate name issued");
        }
    }

    #[test]
    fn names_respect_the_identifier_alphabet() {
        let mut names = NameManager::with_seed(10, 99);
        for _ in 0..100 {
            let name = names.fresh();
            assert_eq!(name.len(), 10);
            let mut chars = name.chars();
            let first = chars.next().unwrap();
            assert!(
                first.is_ascii_alphabetic() || first == '$' || first == '_',
                "bad first char in {name}"
            );
            for ch in chars {
                assert!(
                    ch.is_ascii_alphanumeric() || ch == '$' || ch == '_',
                    "bad char in {name}"
                );
            }
        }
    }

    #[test]
    fn reserved_names_are_never_issued() {
        let mut names = NameManager::with_seed(2, 3);
        let reserved: Vec<String> = (0..50).map(|i| format!("r{i}")).collect();
        names.reserve(reserved.iter().cloned());
        for _ in 0..200 {
            let name = names.fresh();
            assert!(!reserved.contains(&name));
        }
    }

    #[test]
    fn two_seeds_disagree() {
        let mut a = NameManager::with_seed(12, 1);
        let mut b = NameManager::with_seed(12, 2);
        assert_ne!(a.fresh(), b.fresh());
    }
}
