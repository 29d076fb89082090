//! Name-uniqueness table for generated procedures

use std::collections::{HashMap, HashSet};

use stubgen_schema::fingerprint::short_digest;

#[derive(Debug, Default, Clone)]
pub struct Scope {
    taken: HashSet<String>,
    hashed: HashMap<String, String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// Reserves `name`, appending `_2`, `_3`, ... on collision.
    pub fn unique(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{}_{}", name, n);
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }

    /// Like [`Scope::unique`], but the same `key` always yields the name it
    /// was first given.
    pub fn hashed_unique(&mut self, key: &str, name: &str) -> String {
        let digest = short_digest(key);
        if let Some(existing) = self.hashed.get(&digest) {
            return existing.clone();
        }
        let assigned = self.unique(name);
        self.hashed.insert(digest, assigned.clone());
        assigned
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_suffixes() {
        let mut scope = Scope::new();
        assert_eq!(scope.unique("decode_address"), "decode_address");
        assert_eq!(scope.unique("decode_address"), "decode_address_2");
        assert_eq!(scope.unique("decode_address"), "decode_address_3");
        assert!(scope.contains("decode_address_2"));
    }

    #[test]
    fn test_hashed_unique_is_stable_per_key() {
        let mut scope = Scope::new();
        let a = scope.hashed_unique("service:Address->grpc:Address", "encode_address_to_address");
        let b = scope.hashed_unique("service:Address->grpc:Address", "ignored");
        let c = scope.hashed_unique("http:Address->grpc:Address", "encode_address_to_address");
        assert_eq!(a, b);
        assert_eq!(c, "encode_address_to_address_2");
    }
}
