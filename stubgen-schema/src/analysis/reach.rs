//! Reachability of named types

use std::collections::HashSet;

use crate::attribute::{AttributeNode, Kind, TypeId};
use crate::schema::Schema;

/// Named types reachable from `node`, in first-visit order.
pub fn reachable_types(schema: &Schema, node: &AttributeNode) -> Vec<TypeId> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    visit(schema, node, &mut seen, &mut order);
    order
}

fn visit(schema: &Schema, node: &AttributeNode, seen: &mut HashSet<TypeId>, order: &mut Vec<TypeId>) {
    match &node.kind {
        Kind::Primitive(_) => {}
        Kind::Array(elem) => visit(schema, elem, seen, order),
        Kind::Map(key, elem) => {
            visit(schema, key, seen, order);
            visit(schema, elem, seen, order);
        }
        Kind::Object(fields) => {
            for f in fields {
                visit(schema, &f.node, seen, order);
            }
        }
        Kind::Union(variants) => {
            for v in variants {
                visit(schema, &v.node, seen, order);
            }
        }
        Kind::Named(id) => {
            if seen.insert(*id) {
                order.push(*id);
                visit(schema, &schema.get(*id).node, seen, order);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::link;
    use crate::parse::parse_schema_content;

    #[test]
    fn test_reachable_in_visit_order() {
        let schema = link(
            &parse_schema_content(
                r#"{ "name": "s", "types": [
                    { "name": "Address", "type": { "object": [{ "name": "street", "type": "string" }] } },
                    { "name": "Node", "type": { "object": [{ "name": "next", "type": "Node" }] } },
                    { "name": "Customer", "type": { "object": [
                        { "name": "home", "type": "Address" },
                        { "name": "work", "type": "Address" },
                        { "name": "chain", "type": "Node" }
                    ] } }
                ] }"#,
            )
            .unwrap(),
        )
        .unwrap();
        let customer = schema.get(schema.lookup("Customer").unwrap()).node.clone();
        let names: Vec<&str> = reachable_types(&schema, &customer)
            .into_iter()
            .map(|id| schema.get(id).name.as_str())
            .collect();
        assert_eq!(names, vec!["Address", "Node"]);
    }
}
