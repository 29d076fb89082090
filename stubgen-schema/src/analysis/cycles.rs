//! Recursion analysis.
//!
//! Two graphs are derived from the named types:
//! - the alias graph, whose edges do not cross an object or union. A cycle
//!   here has no finite representation and is rejected at link time.
//! - the reference graph, with every edge. Types on a cycle here are
//!   recursive and need boxed fields and delegated conversion helpers.

use std::collections::BTreeSet;

use crate::attribute::{AttributeNode, Kind, TypeId};
use crate::schema::{NamedType, Schema};

fn collect_refs(node: &AttributeNode, through_composites: bool, out: &mut Vec<TypeId>) {
    match &node.kind {
        Kind::Primitive(_) => {}
        Kind::Named(id) => out.push(*id),
        Kind::Array(elem) => collect_refs(elem, through_composites, out),
        Kind::Map(key, elem) => {
            collect_refs(key, through_composites, out);
            collect_refs(elem, through_composites, out);
        }
        Kind::Object(fields) if through_composites => {
            for f in fields {
                collect_refs(&f.node, true, out);
            }
        }
        Kind::Union(variants) if through_composites => {
            for v in variants {
                collect_refs(&v.node, true, out);
            }
        }
        Kind::Object(_) | Kind::Union(_) => {}
    }
}

fn edges(types: &[NamedType], through_composites: bool) -> Vec<Vec<TypeId>> {
    types
        .iter()
        .map(|t| {
            let mut out = Vec::new();
            collect_refs(&t.node, through_composites, &mut out);
            out
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

fn dfs(
    at: TypeId,
    graph: &[Vec<TypeId>],
    marks: &mut [Mark],
    stack: &mut Vec<TypeId>,
) -> Option<Vec<TypeId>> {
    marks[at.0] = Mark::Active;
    stack.push(at);
    for &next in &graph[at.0] {
        match marks[next.0] {
            Mark::Active => {
                let start = stack.iter().position(|id| *id == next).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = dfs(next, graph, marks, stack) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }
    stack.pop();
    marks[at.0] = Mark::Done;
    None
}

/// Returns the first alias-only cycle, if any, as a closed path.
pub fn find_unbounded_cycle(types: &[NamedType]) -> Option<Vec<TypeId>> {
    let graph = edges(types, false);
    let mut marks = vec![Mark::Unvisited; types.len()];
    for i in 0..types.len() {
        if marks[i] == Mark::Unvisited {
            if let Some(cycle) = dfs(TypeId(i), &graph, &mut marks, &mut Vec::new()) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Whether `id` can reach itself through any chain of references.
pub fn is_recursive(schema: &Schema, id: TypeId) -> bool {
    let graph = edges(&schema.types, true);
    let mut seen = vec![false; graph.len()];
    let mut pending = graph[id.0].clone();
    while let Some(next) = pending.pop() {
        if next == id {
            return true;
        }
        if !std::mem::replace(&mut seen[next.0], true) {
            pending.extend(graph[next.0].iter().copied());
        }
    }
    false
}

/// Every named type that participates in a reference cycle.
pub fn recursive_types(schema: &Schema) -> BTreeSet<TypeId> {
    schema
        .types()
        .map(|(id, _)| id)
        .filter(|id| is_recursive(schema, *id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::link;
    use crate::parse::parse_schema_content;

    #[test]
    fn test_mutual_recursion_detected() {
        let schema = link(
            &parse_schema_content(
                r#"{ "name": "s", "types": [
                    { "name": "Parent", "type": { "object": [{ "name": "kids", "type": { "array": "Child" } }] } },
                    { "name": "Child", "type": { "object": [{ "name": "parent", "type": "Parent" }] } },
                    { "name": "Leaf", "type": { "object": [{ "name": "v", "type": "string" }] } }
                ] }"#,
            )
            .unwrap(),
        )
        .unwrap();

        let recursive = recursive_types(&schema);
        assert!(recursive.contains(&schema.lookup("Parent").unwrap()));
        assert!(recursive.contains(&schema.lookup("Child").unwrap()));
        assert!(!recursive.contains(&schema.lookup("Leaf").unwrap()));
    }
}
