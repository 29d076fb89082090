//! Compatibility resolver
//!
//! Proves two attribute trees can be converted into one another and
//! records how, as a [`Resolved`] tree the generator walks. Kinds that
//! differ get one chance at the wrap/unwrap rule: a single-field object on
//! either side may stand in for its field.

use stubgen_schema::{
    AttributeNode, Field, Kind, KindTag, Primitive, RepresentationContext, Schema, TypeId, Variant,
};

use crate::error::{CompileError, FieldPath, Result};

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    /// Nested named composites resolve to [`Shape::Delegate`].
    pub share_named: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { share_named: true }
    }
}

#[derive(Debug, Clone)]
pub struct Resolved<'n> {
    pub source: &'n AttributeNode,
    pub target: &'n AttributeNode,
    pub shape: Shape<'n>,
}

#[derive(Debug, Clone)]
pub enum Shape<'n> {
    /// Both sides carry nothing.
    Empty,
    Primitive {
        source: Primitive,
        target: Primitive,
    },
    Array(Box<Resolved<'n>>),
    Map {
        key: Box<Resolved<'n>>,
        elem: Box<Resolved<'n>>,
    },
    Object {
        fields: Vec<FieldPair<'n>>,
        /// Target-only fields that declare a default.
        defaults: Vec<&'n Field>,
    },
    Union {
        variants: Vec<VariantPair<'n>>,
    },
    /// Converted by the shared helper for this named pair.
    Delegate {
        source: TypeId,
        target: TypeId,
    },
    /// The target is `{ field }` and the source converts into that field.
    Wrap {
        field: &'n Field,
        inner: Box<Resolved<'n>>,
    },
    /// The source is `{ field }` and that field converts into the target.
    Unwrap {
        field: &'n Field,
        inner: Box<Resolved<'n>>,
    },
}

#[derive(Debug, Clone)]
pub struct FieldPair<'n> {
    pub source: &'n Field,
    pub target: &'n Field,
    pub resolved: Resolved<'n>,
}

#[derive(Debug, Clone)]
pub struct VariantPair<'n> {
    pub source: &'n Variant,
    pub target: &'n Variant,
    pub resolved: Resolved<'n>,
}

pub struct Resolver<'s> {
    schema: &'s Schema,
    source_ctx: &'s RepresentationContext,
    target_ctx: &'s RepresentationContext,
    options: ResolveOptions,
    stack: Vec<(TypeId, TypeId)>,
}

impl<'s> Resolver<'s> {
    pub fn new(
        schema: &'s Schema,
        source_ctx: &'s RepresentationContext,
        target_ctx: &'s RepresentationContext,
        options: ResolveOptions,
    ) -> Self {
        Self {
            schema,
            source_ctx,
            target_ctx,
            options,
            stack: Vec::new(),
        }
    }

    /// Resolves a top-level pair. A named pair here is expanded rather than
    /// delegated.
    pub fn resolve<'n>(
        &mut self,
        source: &'n AttributeNode,
        target: &'n AttributeNode,
        path: &FieldPath,
    ) -> Result<Resolved<'n>>
    where
        's: 'n,
    {
        self.resolve_pair(source, target, path, true, true)
    }

    /// Resolves the definitions of a named pair, as the body of its helper.
    pub fn resolve_named(&mut self, source: TypeId, target: TypeId) -> Result<Resolved<'s>> {
        let s = &self.schema.get(source).node;
        let t = &self.schema.get(target).node;
        let path = FieldPath::root(&self.schema.get(source).name);
        self.stack.push((source, target));
        let resolved = self.resolve_pair(s, t, &path, true, true);
        self.stack.pop();
        resolved
    }

    fn resolve_pair<'n>(
        &mut self,
        source: &'n AttributeNode,
        target: &'n AttributeNode,
        path: &FieldPath,
        allow_adjust: bool,
        top: bool,
    ) -> Result<Resolved<'n>>
    where
        's: 'n,
    {
        let schema = self.schema;
        let s_tag = schema.kind_tag(source);
        let t_tag = schema.kind_tag(target);

        if s_tag == t_tag {
            if let (Some(sid), Some(tid)) =
                (schema.named_composite(source), schema.named_composite(target))
            {
                if self.stack.contains(&(sid, tid)) || (!top && self.options.share_named) {
                    return Ok(Resolved {
                        source,
                        target,
                        shape: Shape::Delegate {
                            source: sid,
                            target: tid,
                        },
                    });
                }
                self.stack.push((sid, tid));
                let shape = self.structural(source, target, path);
                self.stack.pop();
                return Ok(Resolved {
                    source,
                    target,
                    shape: shape?,
                });
            }
            let shape = self.structural(source, target, path)?;
            return Ok(Resolved {
                source,
                target,
                shape,
            });
        }

        if allow_adjust {
            if let Some(field) = self.single_field(target).filter(|f| schema.kind_tag(&f.node) == s_tag) {
                let inner = self.resolve_pair(source, &field.node, &path.field(&field.name), false, top)?;
                return Ok(Resolved {
                    source,
                    target,
                    shape: Shape::Wrap {
                        field,
                        inner: Box::new(inner),
                    },
                });
            }
            if let Some(field) = self.single_field(source).filter(|f| schema.kind_tag(&f.node) == t_tag) {
                let inner = self.resolve_pair(&field.node, target, &path.field(&field.name), false, top)?;
                return Ok(Resolved {
                    source,
                    target,
                    shape: Shape::Unwrap {
                        field,
                        inner: Box::new(inner),
                    },
                });
            }
        }

        Err(CompileError::incompatible(
            path,
            format!(
                "{} {} ({}) cannot convert to {} {} ({})",
                self.source_ctx.label,
                schema.describe(source),
                s_tag,
                self.target_ctx.label,
                schema.describe(target),
                t_tag
            ),
        ))
    }

    fn single_field<'n>(&self, node: &'n AttributeNode) -> Option<&'n Field>
    where
        's: 'n,
    {
        match &self.schema.underlying(node).kind {
            Kind::Object(fields) if fields.len() == 1 => fields.first(),
            _ => None,
        }
    }

    /// Same-kind resolution of the underlying nodes.
    fn structural<'n>(
        &mut self,
        source: &'n AttributeNode,
        target: &'n AttributeNode,
        path: &FieldPath,
    ) -> Result<Shape<'n>>
    where
        's: 'n,
    {
        let schema = self.schema;
        let s = schema.underlying(source);
        let t = schema.underlying(target);

        match (&s.kind, &t.kind) {
            (Kind::Primitive(sp), Kind::Primitive(tp)) => {
                if !sp.compatible_with(tp) {
                    return Err(CompileError::incompatible(
                        path,
                        format!("{} is not convertible to {}", sp.name(), tp.name()),
                    ));
                }
                Ok(Shape::Primitive {
                    source: *sp,
                    target: *tp,
                })
            }
            (Kind::Array(se), Kind::Array(te)) => {
                let elem = self.resolve_pair(se, te, &path.elem(), true, false)?;
                Ok(Shape::Array(Box::new(elem)))
            }
            (Kind::Map(sk, se), Kind::Map(tk, te)) => {
                if let Some(p) = schema.underlying(tk).as_primitive() {
                    if !self.target_ctx.scalar(p).is_hashable() {
                        return Err(CompileError::incompatible(
                            &path.key(),
                            format!("{} cannot be a map key", p.name()),
                        ));
                    }
                }
                let key = self.resolve_pair(sk, tk, &path.key(), true, false)?;
                let elem = self.resolve_pair(se, te, &path.value(), true, false)?;
                Ok(Shape::Map {
                    key: Box::new(key),
                    elem: Box::new(elem),
                })
            }
            (Kind::Object(sf), Kind::Object(tf)) => {
                if sf.is_empty() && tf.is_empty() {
                    return Ok(Shape::Empty);
                }
                let mut fields = Vec::new();
                for s_field in sf {
                    if let Some(t_field) = tf.iter().find(|f| f.name == s_field.name) {
                        let resolved = self.resolve_pair(
                            &s_field.node,
                            &t_field.node,
                            &path.field(&s_field.name),
                            true,
                            false,
                        )?;
                        fields.push(FieldPair {
                            source: s_field,
                            target: t_field,
                            resolved,
                        });
                    }
                }
                let defaults = tf
                    .iter()
                    .filter(|f| f.node.default.is_some() && !sf.iter().any(|s| s.name == f.name))
                    .collect();
                Ok(Shape::Object { fields, defaults })
            }
            (Kind::Union(sv), Kind::Union(tv)) => {
                if sv.is_empty() {
                    return Err(CompileError::incompatible(path, "union declares no variants"));
                }
                let mut variants = Vec::with_capacity(sv.len());
                for s_var in sv {
                    let t_var = tv.iter().find(|v| v.name == s_var.name).ok_or_else(|| {
                        CompileError::incompatible(
                            &path.variant(&s_var.name),
                            "variant is not declared on the target union",
                        )
                    })?;
                    let resolved =
                        self.resolve_pair(&s_var.node, &t_var.node, &path.variant(&s_var.name), true, false)?;
                    variants.push(VariantPair {
                        source: s_var,
                        target: t_var,
                        resolved,
                    });
                }
                Ok(Shape::Union { variants })
            }
            _ => Err(CompileError::Invariant(format!(
                "structural resolution of mismatched kinds at {}",
                path
            ))),
        }
    }
}

/// Resolves `source` against `target` with a fresh resolution stack.
pub fn resolve<'n>(
    schema: &'n Schema,
    source: &'n AttributeNode,
    source_ctx: &'n RepresentationContext,
    target: &'n AttributeNode,
    target_ctx: &'n RepresentationContext,
    path: &FieldPath,
    options: ResolveOptions,
) -> Result<Resolved<'n>> {
    Resolver::new(schema, source_ctx, target_ctx, options).resolve(source, target, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stubgen_schema::parse::parse_schema_content;

    fn schema(doc: &str) -> Schema {
        stubgen_schema::link(&parse_schema_content(doc).unwrap()).unwrap()
    }

    fn prim(p: Primitive) -> AttributeNode {
        AttributeNode::primitive(p)
    }

    #[test]
    fn test_integer_widths_are_compatible() {
        let s = schema(r#"{ "name": "s" }"#);
        let ctx = RepresentationContext::service();
        let wire = RepresentationContext::grpc_wire("pb");
        let (a, b) = (prim(Primitive::Int64), prim(Primitive::Int32));
        let r = resolve(&s, &a, &ctx, &b, &wire, &FieldPath::root("v"), ResolveOptions::default())
            .unwrap();
        assert!(matches!(
            r.shape,
            Shape::Primitive {
                source: Primitive::Int64,
                target: Primitive::Int32
            }
        ));
    }

    #[test]
    fn test_wrap_array_into_single_field_object() {
        let s = schema(r#"{ "name": "s" }"#);
        let ctx = RepresentationContext::service();
        let wire = RepresentationContext::grpc_wire("pb");
        let payload = AttributeNode::array(prim(Primitive::String));
        let message = AttributeNode::object(vec![Field::new("field", payload.clone())]);
        let r = resolve(&s, &payload, &ctx, &message, &wire, &FieldPath::root("payload"), ResolveOptions::default())
            .unwrap();
        match r.shape {
            Shape::Wrap { field, inner } => {
                assert_eq!(field.name, "field");
                assert!(matches!(inner.shape, Shape::Array(_)));
            }
            other => panic!("expected wrap, got {:?}", other),
        }

        let back = resolve(&s, &message, &wire, &payload, &ctx, &FieldPath::root("payload"), ResolveOptions::default())
            .unwrap();
        assert!(matches!(back.shape, Shape::Unwrap { .. }));
    }

    #[test]
    fn test_mismatch_after_wrap_is_fatal() {
        let s = schema(r#"{ "name": "s" }"#);
        let ctx = RepresentationContext::service();
        let payload = AttributeNode::array(prim(Primitive::String));
        let message = AttributeNode::object(vec![Field::new(
            "field",
            AttributeNode::array(prim(Primitive::Int)),
        )]);
        let err = resolve(&s, &payload, &ctx, &message, &ctx, &FieldPath::root("payload"), ResolveOptions::default())
            .unwrap_err();
        assert_eq!(err.path().unwrap().as_str(), "payload.field[*]");
    }

    #[test]
    fn test_wrap_requires_matching_kind() {
        let s = schema(r#"{ "name": "s" }"#);
        let ctx = RepresentationContext::service();
        let payload = AttributeNode::array(prim(Primitive::String));
        let message = AttributeNode::object(vec![Field::new("field", prim(Primitive::String))]);
        let err = resolve(&s, &payload, &ctx, &message, &ctx, &FieldPath::root("payload"), ResolveOptions::default())
            .unwrap_err();
        assert_eq!(err.path().unwrap().as_str(), "payload");
    }

    #[test]
    fn test_failure_carries_field_path() {
        let s = schema(r#"{ "name": "s" }"#);
        let ctx = RepresentationContext::service();
        let a = AttributeNode::object(vec![Field::new(
            "items",
            AttributeNode::array(AttributeNode::object(vec![Field::new("street", prim(Primitive::String))])),
        )]);
        let b = AttributeNode::object(vec![Field::new(
            "items",
            AttributeNode::array(AttributeNode::object(vec![Field::new("street", prim(Primitive::Int))])),
        )]);
        let err = resolve(&s, &a, &ctx, &b, &ctx, &FieldPath::root("payload"), ResolveOptions::default())
            .unwrap_err();
        assert_eq!(err.path().unwrap().as_str(), "payload.items[*].street");
    }

    #[test]
    fn test_recursive_named_pair_delegates() {
        let s = schema(
            r#"{ "name": "s", "types": [
                { "name": "Node", "type": { "object": [
                    { "name": "value", "type": "int" },
                    { "name": "next", "type": "Node" }
                ] } }
            ] }"#,
        );
        let ctx = RepresentationContext::service();
        let id = s.lookup("Node").unwrap();
        let mut resolver = Resolver::new(&s, &ctx, &ctx, ResolveOptions { share_named: false });
        let r = resolver.resolve_named(id, id).unwrap();
        let Shape::Object { fields, .. } = r.shape else {
            panic!("expected object");
        };
        let next = fields.iter().find(|f| f.source.name == "next").unwrap();
        assert!(matches!(next.resolved.shape, Shape::Delegate { .. }));
    }

    #[test]
    fn test_empty_objects_are_trivial() {
        let s = schema(r#"{ "name": "s" }"#);
        let ctx = RepresentationContext::service();
        let empty = AttributeNode::object(Vec::new());
        let r = resolve(&s, &empty, &ctx, &empty, &ctx, &FieldPath::root("payload"), ResolveOptions::default())
            .unwrap();
        assert!(matches!(r.shape, Shape::Empty));
    }

    #[test]
    fn test_union_variant_missing_on_target() {
        let s = schema(r#"{ "name": "s" }"#);
        let ctx = RepresentationContext::service();
        let a = AttributeNode::union(vec![
            Variant::new("circle", prim(Primitive::Float64)),
            Variant::new("label", prim(Primitive::String)),
        ]);
        let b = AttributeNode::union(vec![Variant::new("circle", prim(Primitive::Float32))]);
        let err = resolve(&s, &a, &ctx, &b, &ctx, &FieldPath::root("shape"), ResolveOptions::default())
            .unwrap_err();
        assert_eq!(err.path().unwrap().as_str(), "shape<label>");
    }
}
