//! Deduplicated constant pool.
//!
//! The pool is write-once: entries are appended during lowering (and during
//! jump patching, which inserts displacement constants) and never mutated.
//! Insertion deduplicates by structural key, so inserting the same constant
//! twice yields the same index.
//!
//! Indexes are capped at 254. Operand bytes must never take the value 0xFF,
//! which the padding filter claims for itself.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::CompileError;

/// Highest number of entries a pool may hold.
pub const MAX_POOL_ENTRIES: usize = 255;

/// A single pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    /// Bare numeric literal.
    Number(f64),
    /// Bare boolean literal.
    Bool(bool),
    /// The null literal.
    Null,
    /// String literal. Subject to the string-encoding pass.
    Str(String),
    /// Identifier name: variable, property, or operator spelling.
    Name(String),
    /// Signed jump displacement, filled in by patching.
    Offset(i32),
    /// Parameter name list of a function literal.
    StrList(Vec<String>),
    /// Opaque body source of a function literal.
    Source(String),
    /// A string wrapped by the XOR/base64 encoder.
    Encoded { value: String },
}

impl Const {
    pub fn as_offset(&self) -> Option<i32> {
        match self {
            Const::Offset(d) => Some(*d),
            _ => None,
        }
    }
}

impl Serialize for Const {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Const::Number(n) => serializer.serialize_f64(*n),
            Const::Bool(b) => serializer.serialize_bool(*b),
            Const::Null => serializer.serialize_unit(),
            Const::Str(s) | Const::Name(s) | Const::Source(s) => serializer.serialize_str(s),
            Const::Offset(d) => serializer.serialize_i32(*d),
            Const::StrList(items) => items.serialize(serializer),
            Const::Encoded { value } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("tag", "encoded")?;
                map.serialize_entry("method", "xor")?;
                map.serialize_entry("value", value)?;
                map.end()
            }
        }
    }
}

/// Structural identity used for deduplication. Numbers are keyed by their
/// bit pattern so that -0.0 and 0.0 stay distinct and NaN folds to itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Number(u64),
    Bool(bool),
    Null,
    Str(String),
    Name(String),
    Offset(i32),
    StrList(Vec<String>),
    Source(String),
    Encoded(String),
}

fn key_of(value: &Const) -> ConstKey {
    match value {
        Const::Number(n) => ConstKey::Number(n.to_bits()),
        Const::Bool(b) => ConstKey::Bool(*b),
        Const::Null => ConstKey::Null,
        Const::Str(s) => ConstKey::Str(s.clone()),
        Const::Name(s) => ConstKey::Name(s.clone()),
        Const::Offset(d) => ConstKey::Offset(*d),
        Const::StrList(items) => ConstKey::StrList(items.clone()),
        Const::Source(s) => ConstKey::Source(s.clone()),
        Const::Encoded { value } => ConstKey::Encoded(value.clone()),
    }
}

/// Append-only, deduplicating constant table.
#[derive(Debug, Default, Clone)]
pub struct ConstPool {
    entries: Vec<Const>,
    index: HashMap<ConstKey, u8>,
}

impl ConstPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a constant, returning its index. A structurally equal constant
    /// inserted earlier yields the existing index.
    pub fn insert(&mut self, value: Const) -> Result<u8, CompileError> {
        let key = key_of(&value);
        if let Some(&idx) = self.index.get(&key) {
            return Ok(idx);
        }
        if self.entries.len() >= MAX_POOL_ENTRIES {
            return Err(CompileError::PoolOverflow(self.entries.len() + 1));
        }
        let idx = self.entries.len() as u8;
        self.entries.push(value);
        self.index.insert(key, idx);
        Ok(idx)
    }

    pub fn get(&self, idx: u8) -> Option<&Const> {
        self.entries.get(idx as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Const] {
        &self.entries
    }

    /// Consume the pool, keeping only the ordered entries.
    pub fn into_entries(self) -> Vec<Const> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_inserts_return_the_same_index() {
        let mut pool = ConstPool::new();
        let a = pool.insert(Const::Str("hello".into())).unwrap();
        let b = pool.insert(Const::Number(4.0)).unwrap();
        let c = pool.insert(Const::Str("hello".into())).unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn names_and_strings_do_not_collide() {
        let mut pool = ConstPool::new();
        let s = pool.insert(Const::Str("x".into())).unwrap();
        let n = pool.insert(Const::Name("x".into())).unwrap();
        assert_ne!(s, n);
    }

    #[test]
    fn pool_overflow_is_detected() {
        let mut pool = ConstPool::new();
        for i in 0..MAX_POOL_ENTRIES {
            pool.insert(Const::Number(i as f64)).unwrap();
        }
        let err = pool.insert(Const::Str("one too many".into()));
        assert!(matches!(err, Err(CompileError::PoolOverflow(_))));
        // Highest issued index stays clear of the padding byte.
        assert_eq!(pool.len() - 1, 254);
    }

    #[test]
    fn serializes_bare_and_tagged_forms() {
        let mut pool = ConstPool::new();
        pool.insert(Const::Number(1.5)).unwrap();
        pool.insert(Const::Bool(true)).unwrap();
        pool.insert(Const::Null).unwrap();
        pool.insert(Const::Encoded {
            value: "AAEC".into(),
        })
        .unwrap();
        let json = serde_json::to_string(pool.entries()).unwrap();
        assert_eq!(
            json,
            r#"[1.5,true,null,{"tag":"encoded","method":"xor","value":"AAEC"}]"#
        );
    }

    #[test]
    fn negative_zero_is_kept_distinct() {
        let mut pool = ConstPool::new();
        let a = pool.insert(Const::Number(0.0)).unwrap();
        let b = pool.insert(Const::Number(-0.0)).unwrap();
        assert_ne!(a, b);
    }
}
