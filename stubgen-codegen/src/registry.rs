//! Helper registry
//!
//! One registry lives for exactly one compilation pass. Each
//! `(source, target, direction)` key maps to a single helper plan; the
//! name is reserved before the plan is built so recursive and mutually
//! recursive types resolve to the same helper.

use std::collections::HashMap;
use std::fmt;

use crate::error::{CompileError, Result};
use crate::plan::{ConversionPlan, Direction};
use crate::scope::Scope;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HelperKey {
    pub source: String,
    pub target: String,
    pub direction: Direction,
}

impl fmt::Display for HelperKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}@{}", self.source, self.target, self.direction)
    }
}

#[derive(Debug)]
enum Slot {
    Pending,
    Ready(Box<ConversionPlan>),
}

#[derive(Debug)]
struct Entry {
    key: HelperKey,
    name: String,
    slot: Slot,
}

#[derive(Debug, Default)]
pub struct HelperRegistry {
    entries: Vec<Entry>,
    by_key: HashMap<HelperKey, usize>,
    by_name: HashMap<String, usize>,
    scope: Scope,
}

impl HelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the helper name for `key`, building the plan with `factory`
    /// on first request.
    ///
    /// The factory receives the registry and the reserved name so it can
    /// register nested helpers. If it fails the pass is aborted and the
    /// reserved entry stays pending.
    pub fn get_or_create<F>(&mut self, key: HelperKey, name_hint: &str, factory: F) -> Result<String>
    where
        F: FnOnce(&mut HelperRegistry, &str) -> Result<ConversionPlan>,
    {
        if let Some(&index) = self.by_key.get(&key) {
            return Ok(self.entries[index].name.clone());
        }

        let name = self.scope.hashed_unique(&key.to_string(), name_hint);
        let index = self.entries.len();
        self.entries.push(Entry {
            key: key.clone(),
            name: name.clone(),
            slot: Slot::Pending,
        });
        self.by_key.insert(key.clone(), index);
        self.by_name.insert(name.clone(), index);

        let plan = factory(self, &name)?;
        if plan.init.name != name {
            return Err(CompileError::Invariant(format!(
                "helper for {} built as '{}' but reserved as '{}'",
                key, plan.init.name, name
            )));
        }
        tracing::debug!(helper = %name, key = %key, "registered conversion helper");
        self.entries[index].slot = Slot::Ready(Box::new(plan));
        Ok(name)
    }

    pub fn get(&self, key: &HelperKey) -> Option<&ConversionPlan> {
        self.by_key
            .get(key)
            .and_then(|&i| self.ready(i))
    }

    pub fn by_name(&self, name: &str) -> Option<&ConversionPlan> {
        self.by_name.get(name).and_then(|&i| self.ready(i))
    }

    fn ready(&self, index: usize) -> Option<&ConversionPlan> {
        match &self.entries[index].slot {
            Slot::Ready(plan) => Some(plan),
            Slot::Pending => None,
        }
    }

    /// Completed helpers in reservation order.
    pub fn plans(&self) -> impl Iterator<Item = &ConversionPlan> {
        self.entries.iter().filter_map(|e| match &e.slot {
            Slot::Ready(plan) => Some(plan.as_ref()),
            Slot::Pending => None,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &HelperKey> {
        self.entries.iter().map(|e| &e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name table shared by helpers and top-level plans.
    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::InitProc;
    use stubgen_schema::{RustType, Scalar};

    fn key(src: &str, tgt: &str) -> HelperKey {
        HelperKey {
            source: src.to_string(),
            target: tgt.to_string(),
            direction: Direction::Encode,
        }
    }

    fn plan(name: &str) -> ConversionPlan {
        ConversionPlan {
            source_type: RustType::Scalar(Scalar::I64),
            target_type: RustType::Scalar(Scalar::I32),
            direction: Direction::Encode,
            init: InitProc {
                name: name.to_string(),
                params: Vec::new(),
                returns: RustType::Scalar(Scalar::I32),
                body: Vec::new(),
                result: None,
            },
            validation: None,
            helpers: Vec::new(),
        }
    }

    #[test]
    fn test_factory_runs_once_per_key() {
        let mut registry = HelperRegistry::new();
        let mut calls = 0;
        for _ in 0..3 {
            let name = registry
                .get_or_create(key("a", "b"), "encode_a_to_b", |_, name| {
                    calls += 1;
                    Ok(plan(name))
                })
                .unwrap();
            assert_eq!(name, "encode_a_to_b");
        }
        assert_eq!(calls, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reentrant_factory_sees_reserved_name() {
        let mut registry = HelperRegistry::new();
        let outer = registry
            .get_or_create(key("a", "a"), "encode_a_to_a", |reg, name| {
                let inner = reg.get_or_create(key("a", "a"), "other", |_, n| Ok(plan(n)))?;
                assert_eq!(inner, name);
                Ok(plan(name))
            })
            .unwrap();
        assert_eq!(outer, "encode_a_to_a");
        assert!(registry.by_name("encode_a_to_a").is_some());
    }

    #[test]
    fn test_colliding_hints_get_distinct_names() {
        let mut registry = HelperRegistry::new();
        let a = registry
            .get_or_create(key("svc:A", "pb:A"), "encode_a_to_a", |_, n| Ok(plan(n)))
            .unwrap();
        let b = registry
            .get_or_create(key("http:A", "pb:A"), "encode_a_to_a", |_, n| Ok(plan(n)))
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.plans().count(), 2);
    }
}
