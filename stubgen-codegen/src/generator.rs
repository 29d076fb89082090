//! Transformation generator
//!
//! Walks a [`Resolved`] tree and emits the statements that build the target
//! value from the source value. Named pairs marked for delegation become
//! calls to helpers registered in the [`HelperRegistry`].

use std::collections::{BTreeSet, HashSet};

use stubgen_schema::utils::{to_pascal_case, to_snake_case};
use stubgen_schema::{
    is_keyword, AttributeNode, Field, Kind, RepresentationContext, RustType, Scalar, Schema,
    TypeId, TypePath,
};

use crate::error::{CompileError, FieldPath, Result};
use crate::fragment::{called_helpers, Arm, Expr, Stmt, Zero};
use crate::plan::{ConversionPlan, Direction, InitProc, Param};
use crate::registry::{HelperKey, HelperRegistry};
use crate::resolver::{FieldPair, ResolveOptions, Resolved, Resolver, Shape, VariantPair};

/// Name of the source parameter of every generated procedure.
pub const SOURCE_PARAM: &str = "v";
pub const RESULT_LOCAL: &str = "res";

/// Extra by-value parameter assigned to a target field after construction.
#[derive(Debug, Clone)]
pub struct ExtraParam {
    pub param: Param,
    pub attribute: String,
}

/// A top-level conversion to build.
#[derive(Debug, Clone)]
pub struct PlanRequest<'n> {
    pub name: String,
    pub source: &'n AttributeNode,
    pub source_hint: String,
    pub target: &'n AttributeNode,
    pub target_hint: String,
    pub path: FieldPath,
    pub extras: Vec<ExtraParam>,
}

/// Converts between one pair of representation contexts.
pub struct Transform<'a> {
    pub schema: &'a Schema,
    pub source_ctx: &'a RepresentationContext,
    pub target_ctx: &'a RepresentationContext,
    pub direction: Direction,
    pub options: ResolveOptions,
    pub helper_prefix: Option<&'a str>,
    /// Named types that take part in a reference cycle.
    pub recursive: &'a BTreeSet<TypeId>,
}

#[derive(Debug, Clone)]
struct Hints {
    source: String,
    target: String,
}

impl Hints {
    fn child(&self, name: &str) -> Self {
        let suffix = to_pascal_case(name);
        Self {
            source: format!("{}{}", self.source, suffix),
            target: format!("{}{}", self.target, suffix),
        }
    }
}

#[derive(Debug, Clone)]
struct Src {
    expr: Expr,
    /// The source place holds `Option<T>`.
    optional: bool,
    /// Zero at the source means the value was never set.
    conflated: bool,
}

impl Src {
    fn bound(name: &str) -> Self {
        Self {
            expr: Expr::bound(name),
            optional: false,
            conflated: false,
        }
    }
}

#[derive(Debug, Clone)]
enum Sink {
    Local(String),
    Place(Expr),
    Push(Expr),
    Return,
}

#[derive(Debug, Clone)]
struct Slot {
    sink: Sink,
    optional: bool,
    boxed: bool,
    force_mut: bool,
}

impl Slot {
    fn bare(sink: Sink) -> Self {
        Self {
            sink,
            optional: false,
            boxed: false,
            force_mut: false,
        }
    }

    fn hold(&self, value: Expr) -> Expr {
        let mut value = value;
        if self.boxed {
            value = value.boxed();
        }
        if self.optional {
            value = value.some();
        }
        value
    }

    fn store(&self, value: Expr) -> Stmt {
        let value = self.hold(value);
        match &self.sink {
            Sink::Local(name) => Stmt::Let {
                name: name.clone(),
                mutable: self.force_mut,
                value,
            },
            Sink::Place(place) => Stmt::Assign {
                place: place.clone(),
                value,
            },
            Sink::Push(target) => Stmt::Push {
                target: target.clone(),
                value,
            },
            Sink::Return => Stmt::Return(value),
        }
    }
}

/// Per-procedure local names.
struct Locals {
    taken: HashSet<String>,
}

impl Locals {
    fn new<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            taken: reserved.into_iter().map(str::to_string).collect(),
        }
    }

    fn fresh(&mut self, base: &str) -> String {
        let base = if is_keyword(base) || base.is_empty() {
            format!("{}_", base)
        } else {
            base.to_string()
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{}{}", base, n);
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

impl<'a> Transform<'a> {
    /// Resolves and generates a top-level plan.
    pub fn plan(&self, registry: &mut HelperRegistry, request: PlanRequest<'_>) -> Result<ConversionPlan> {
        let mut resolver = Resolver::new(self.schema, self.source_ctx, self.target_ctx, self.options);
        let resolved = resolver.resolve(request.source, request.target, &request.path)?;
        let name = registry.scope_mut().unique(&request.name);
        let hints = Hints {
            source: request.source_hint,
            target: request.target_hint,
        };
        self.build_plan(registry, name, &resolved, &hints, request.extras)
    }

    fn build_plan(
        &self,
        registry: &mut HelperRegistry,
        name: String,
        resolved: &Resolved<'_>,
        hints: &Hints,
        extras: Vec<ExtraParam>,
    ) -> Result<ConversionPlan> {
        let source_type = self.source_ctx.rust_type(self.schema, resolved.source, &hints.source);
        let target_type = self.target_ctx.rust_type(self.schema, resolved.target, &hints.target);

        let returns_directly = matches!(resolved.shape, Shape::Union { .. });
        if returns_directly && !extras.is_empty() {
            return Err(CompileError::Invariant(format!(
                "{} cannot take out-of-band parameters: target is a union",
                name
            )));
        }

        let mut locals = Locals::new(
            [SOURCE_PARAM, RESULT_LOCAL]
                .into_iter()
                .chain(extras.iter().map(|e| e.param.name.as_str())),
        );
        let slot = if returns_directly {
            Slot::bare(Sink::Return)
        } else {
            Slot {
                force_mut: !extras.is_empty(),
                ..Slot::bare(Sink::Local(RESULT_LOCAL.to_string()))
            }
        };

        let mut body = Vec::new();
        self.convert(
            registry,
            resolved,
            Src::bound(SOURCE_PARAM),
            &slot,
            hints,
            &mut locals,
            &mut body,
        )?;

        let mut params = vec![Param {
            name: SOURCE_PARAM.to_string(),
            ty: source_type.clone(),
            by_ref: true,
        }];
        for extra in extras {
            body.push(Stmt::Assign {
                place: Expr::local(RESULT_LOCAL).field(self.target_ctx.field_ident(&extra.attribute)),
                value: Expr::local(&extra.param.name),
            });
            params.push(extra.param);
        }

        let helpers = called_helpers(&body);
        Ok(ConversionPlan {
            source_type,
            target_type: target_type.clone(),
            direction: self.direction,
            init: InitProc {
                name,
                params,
                returns: target_type,
                body,
                result: (!returns_directly).then(|| RESULT_LOCAL.to_string()),
            },
            validation: None,
            helpers,
        })
    }

    /// Returns the helper converting named `source` into named `target`,
    /// building it on first use.
    fn delegate(&self, registry: &mut HelperRegistry, source: TypeId, target: TypeId) -> Result<String> {
        let source_name = &self.schema.get(source).name;
        let target_name = &self.schema.get(target).name;
        let key = HelperKey {
            source: format!("{}:{}", self.source_ctx.label, source_name),
            target: format!("{}:{}", self.target_ctx.label, target_name),
            direction: self.direction,
        };
        let prefix = self.helper_prefix.unwrap_or(self.direction.prefix());
        let hint = format!(
            "{}_{}_to_{}",
            prefix,
            to_snake_case(source_name),
            to_snake_case(target_name)
        );
        registry.get_or_create(key, &hint, |registry, name| {
            let mut resolver =
                Resolver::new(self.schema, self.source_ctx, self.target_ctx, self.options);
            let resolved = resolver.resolve_named(source, target)?;
            let hints = Hints {
                source: source_name.clone(),
                target: target_name.clone(),
            };
            self.build_plan(registry, name.to_string(), &resolved, &hints, Vec::new())
        })
    }

    fn target_path(&self, node: &AttributeNode, hint: &str) -> Result<TypePath> {
        match self.target_ctx.rust_type(self.schema, node, hint) {
            RustType::Path(path) => Ok(path),
            other => Err(CompileError::Invariant(format!(
                "expected a named target type for {}, got {}",
                hint, other
            ))),
        }
    }

    fn source_path(&self, node: &AttributeNode, hint: &str) -> Result<TypePath> {
        match self.source_ctx.rust_type(self.schema, node, hint) {
            RustType::Path(path) => Ok(path),
            other => Err(CompileError::Invariant(format!(
                "expected a named source type for {}, got {}",
                hint, other
            ))),
        }
    }

    fn is_boxed(&self, node: &AttributeNode) -> bool {
        self.schema
            .named_composite(node)
            .is_some_and(|id| self.recursive.contains(&id))
    }

    fn holder_type(&self, node: &AttributeNode, hint: &str, slot: &Slot) -> RustType {
        let mut ty = self.target_ctx.rust_type(self.schema, node, hint);
        if slot.boxed {
            ty = RustType::Boxed(Box::new(ty));
        }
        if slot.optional {
            ty = RustType::Option(Box::new(ty));
        }
        ty
    }

    /// A local sink written from inside a conditional must exist on every
    /// path, so it is initialized to its default first.
    fn predeclare(&self, r: &Resolved<'_>, slot: &Slot, hints: &Hints, out: &mut Vec<Stmt>) -> Slot {
        match &slot.sink {
            Sink::Local(name) => {
                out.push(Stmt::Let {
                    name: name.clone(),
                    mutable: true,
                    value: Expr::DefaultOf(self.holder_type(r.target, &hints.target, slot)),
                });
                Slot {
                    sink: Sink::Place(Expr::local(name)),
                    ..slot.clone()
                }
            }
            _ => slot.clone(),
        }
    }

    /// Types declared under a name take nested anonymous type names from
    /// that name, not from the caller's hint.
    fn named_hints(&self, r: &Resolved<'_>, hints: &Hints) -> Hints {
        let name_of = |node: &AttributeNode, fallback: &String| {
            let mut current = node;
            let mut name = None;
            while let Kind::Named(id) = current.kind {
                let named = self.schema.get(id);
                name = Some(&named.name);
                current = &named.node;
            }
            name.unwrap_or(fallback).clone()
        };
        Hints {
            source: name_of(r.source, &hints.source),
            target: name_of(r.target, &hints.target),
        }
    }

    fn zero_test(&self, r: &Resolved<'_>) -> Option<Zero> {
        match &r.shape {
            Shape::Primitive { source, .. } => {
                let scalar = self.source_ctx.scalar(*source);
                (scalar != Scalar::Bool).then_some(Zero::Scalar(scalar))
            }
            Shape::Array(_) | Shape::Map { .. } => Some(Zero::Collection),
            _ => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn convert(
        &self,
        registry: &mut HelperRegistry,
        r: &Resolved<'_>,
        src: Src,
        slot: &Slot,
        hints: &Hints,
        locals: &mut Locals,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        let hints = &self.named_hints(r, hints);
        if src.optional {
            let slot = self.predeclare(r, slot, hints, out);
            let bind = locals.fresh("x");
            let mut body = Vec::new();
            self.convert(registry, r, Src::bound(&bind), &slot, hints, locals, &mut body)?;
            out.push(Stmt::IfSome {
                value: src.expr,
                bind,
                body,
            });
            return Ok(());
        }

        if src.conflated && slot.optional {
            if let Some(zero) = self.zero_test(r) {
                let slot = self.predeclare(r, slot, hints, out);
                let mut body = Vec::new();
                let inner = Src {
                    conflated: false,
                    ..src.clone()
                };
                self.convert(registry, r, inner, &slot, hints, locals, &mut body)?;
                out.push(Stmt::IfZero {
                    value: src.expr,
                    zero,
                    negate: true,
                    body,
                });
                return Ok(());
            }
        }

        match &r.shape {
            Shape::Empty => {
                let ty = self.target_path(r.target, &hints.target)?;
                out.push(slot.store(Expr::Struct {
                    ty,
                    fields: Vec::new(),
                }));
            }
            Shape::Primitive { source, target } => {
                let from = self.source_ctx.scalar(*source);
                let to = self.target_ctx.scalar(*target);
                out.push(slot.store(src.expr.convert(from, to)));
            }
            Shape::Array(elem) => self.convert_array(registry, elem, src, slot, hints, locals, out)?,
            Shape::Map { key, elem } => {
                self.convert_map(registry, key, elem, src, slot, hints, locals, out)?
            }
            Shape::Object { fields, defaults } => {
                self.convert_object(registry, r, fields, defaults, src, slot, hints, locals, out)?
            }
            Shape::Union { variants } => {
                self.convert_union(registry, r, variants, src, slot, hints, locals, out)?
            }
            Shape::Delegate { source, target } => {
                let helper = self.delegate(registry, *source, *target)?;
                out.push(slot.store(Expr::Call {
                    helper,
                    arg: Box::new(src.expr),
                }));
            }
            Shape::Wrap { field, inner } => {
                let tmp = locals.fresh("inner");
                let inner_slot = Slot {
                    optional: self.target_ctx.is_optional(self.schema, &field.node),
                    boxed: self.is_boxed(&field.node),
                    ..Slot::bare(Sink::Local(tmp.clone()))
                };
                let inner_hints = Hints {
                    source: hints.source.clone(),
                    target: hints.child(&field.name).target,
                };
                self.convert(registry, inner, src, &inner_slot, &inner_hints, locals, out)?;
                let ty = self.target_path(r.target, &hints.target)?;
                out.push(slot.store(Expr::Struct {
                    ty,
                    fields: vec![(self.target_ctx.field_ident(&field.name), Expr::local(tmp))],
                }));
            }
            Shape::Unwrap { field, inner } => {
                let node = &field.node;
                let unwrapped = Src {
                    expr: src.expr.field(self.source_ctx.field_ident(&field.name)),
                    optional: self.source_ctx.is_optional(self.schema, node),
                    conflated: self.source_ctx.is_conflated(self.schema, node) && !node.required,
                };
                let inner_hints = Hints {
                    source: hints.child(&field.name).source,
                    target: hints.target.clone(),
                };
                self.convert(registry, inner, unwrapped, slot, &inner_hints, locals, out)?;
            }
        }
        Ok(())
    }

    fn same_scalar(&self, r: &Resolved<'_>) -> bool {
        match r.shape {
            Shape::Primitive { source, target } => {
                self.source_ctx.scalar(source) == self.target_ctx.scalar(target)
            }
            _ => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn convert_array(
        &self,
        registry: &mut HelperRegistry,
        elem: &Resolved<'_>,
        src: Src,
        slot: &Slot,
        hints: &Hints,
        locals: &mut Locals,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        if self.same_scalar(elem) {
            out.push(slot.store(src.expr.cloned()));
            return Ok(());
        }

        let items = locals.fresh("items");
        out.push(Stmt::Let {
            name: items.clone(),
            mutable: true,
            value: Expr::VecWithCapacity(Box::new(src.expr.clone())),
        });
        let bind = locals.fresh("val");
        let mut body = Vec::new();
        self.convert(
            registry,
            elem,
            Src::bound(&bind),
            &Slot::bare(Sink::Push(Expr::local(&items))),
            &hints.child("item"),
            locals,
            &mut body,
        )?;
        out.push(Stmt::ForEach {
            source: src.expr,
            bind,
            body,
        });
        out.push(slot.store(Expr::local(items)));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn convert_map(
        &self,
        registry: &mut HelperRegistry,
        key: &Resolved<'_>,
        elem: &Resolved<'_>,
        src: Src,
        slot: &Slot,
        hints: &Hints,
        locals: &mut Locals,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        if self.same_scalar(key) && self.same_scalar(elem) {
            out.push(slot.store(src.expr.cloned()));
            return Ok(());
        }

        let entries = locals.fresh("entries");
        out.push(Stmt::Let {
            name: entries.clone(),
            mutable: true,
            value: Expr::MapWithCapacity(Box::new(src.expr.clone())),
        });
        let key_bind = locals.fresh("key");
        let val_bind = locals.fresh("val");
        let key_out = locals.fresh("k");
        let val_out = locals.fresh("item");
        let mut body = Vec::new();
        self.convert(
            registry,
            key,
            Src::bound(&key_bind),
            &Slot::bare(Sink::Local(key_out.clone())),
            &hints.child("key"),
            locals,
            &mut body,
        )?;
        self.convert(
            registry,
            elem,
            Src::bound(&val_bind),
            &Slot::bare(Sink::Local(val_out.clone())),
            &hints.child("value"),
            locals,
            &mut body,
        )?;
        body.push(Stmt::Insert {
            target: Expr::local(&entries),
            key: Expr::local(key_out),
            value: Expr::local(val_out),
        });
        out.push(Stmt::ForEachEntry {
            source: src.expr,
            key: key_bind,
            value: val_bind,
            body,
        });
        out.push(slot.store(Expr::local(entries)));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn convert_object(
        &self,
        registry: &mut HelperRegistry,
        r: &Resolved<'_>,
        fields: &[FieldPair<'_>],
        defaults: &[&Field],
        src: Src,
        slot: &Slot,
        hints: &Hints,
        locals: &mut Locals,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        let ty = self.target_path(r.target, &hints.target)?;
        let (obj, direct) = match &slot.sink {
            Sink::Local(name) if !slot.optional && !slot.boxed => (name.clone(), true),
            _ => (locals.fresh(&to_snake_case(ty.name())), false),
        };

        let mut inline = Vec::new();
        let mut post = Vec::new();
        for pair in fields {
            let s_node = &pair.source.node;
            let t_node = &pair.target.node;
            let t_ident = self.target_ctx.field_ident(&pair.target.name);
            let s_expr = src
                .expr
                .clone()
                .field(self.source_ctx.field_ident(&pair.source.name));
            let s_opt = self.source_ctx.is_optional(self.schema, s_node);
            let s_conf = self.source_ctx.is_conflated(self.schema, s_node) && !s_node.required;
            let t_opt = self.target_ctx.is_optional(self.schema, t_node);
            let place = Expr::local(&obj).field(&t_ident);

            match &pair.resolved.shape {
                Shape::Primitive { source, target } => {
                    let field = PrimitiveField {
                        from: self.source_ctx.scalar(*source),
                        to: self.target_ctx.scalar(*target),
                        s_expr,
                        s_opt,
                        s_conf,
                        t_opt,
                        t_conf: self.target_ctx.is_conflated(self.schema, t_node),
                        default: t_node.default.as_ref(),
                        place,
                    };
                    field.emit(t_ident, locals, &mut inline, &mut post);
                }
                Shape::Delegate { source, target } if !s_opt && !s_conf => {
                    let helper = self.delegate(registry, *source, *target)?;
                    let slot = Slot {
                        optional: t_opt,
                        boxed: self.is_boxed(t_node),
                        ..Slot::bare(Sink::Return)
                    };
                    let value = slot.hold(Expr::Call {
                        helper,
                        arg: Box::new(s_expr),
                    });
                    inline.push((t_ident, value));
                }
                _ => {
                    let slot = Slot {
                        optional: t_opt,
                        boxed: self.is_boxed(t_node),
                        ..Slot::bare(Sink::Place(place))
                    };
                    let src = Src {
                        expr: s_expr,
                        optional: s_opt,
                        conflated: s_conf,
                    };
                    self.convert(
                        registry,
                        &pair.resolved,
                        src,
                        &slot,
                        &hints.child(&pair.target.name),
                        locals,
                        &mut post,
                    )?;
                }
            }
        }

        for field in defaults {
            let (Kind::Primitive(p), Some(value)) =
                (&self.schema.underlying(&field.node).kind, field.node.default.as_ref())
            else {
                tracing::warn!(
                    field = %field.name,
                    target = %ty,
                    "default ignored on non-primitive field"
                );
                continue;
            };
            let literal = Expr::Literal {
                value: value.clone(),
                scalar: self.target_ctx.scalar(*p),
            };
            let value = if self.target_ctx.is_optional(self.schema, &field.node) {
                literal.some()
            } else {
                literal
            };
            inline.push((self.target_ctx.field_ident(&field.name), value));
        }

        out.push(Stmt::Let {
            name: obj.clone(),
            mutable: !post.is_empty() || (direct && slot.force_mut),
            value: Expr::Struct { ty, fields: inline },
        });
        out.extend(post);
        if !direct {
            out.push(slot.store(Expr::local(obj)));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn convert_union(
        &self,
        registry: &mut HelperRegistry,
        r: &Resolved<'_>,
        variants: &[VariantPair<'_>],
        src: Src,
        slot: &Slot,
        hints: &Hints,
        locals: &mut Locals,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        let source_ty = self.source_path(r.source, &hints.source)?;
        let target_ty = self.target_path(r.target, &hints.target)?;
        let slot = match &slot.sink {
            Sink::Local(name) => {
                out.push(Stmt::Declare(name.clone()));
                Slot {
                    sink: Sink::Place(Expr::local(name)),
                    ..slot.clone()
                }
            }
            _ => slot.clone(),
        };

        let mut arms = Vec::with_capacity(variants.len());
        for pair in variants {
            let bind = locals.fresh("inner");
            let payload = locals.fresh("payload");
            let mut body = Vec::new();
            self.convert(
                registry,
                &pair.resolved,
                Src::bound(&bind),
                &Slot::bare(Sink::Local(payload.clone())),
                &hints.child(&pair.target.name),
                locals,
                &mut body,
            )?;
            body.push(slot.store(Expr::Variant {
                ty: target_ty.clone(),
                variant: self.target_ctx.type_name(&pair.target.name),
                payload: Box::new(Expr::local(payload)),
            }));
            arms.push(Arm {
                ty: source_ty.clone(),
                variant: self.source_ctx.type_name(&pair.source.name),
                bind,
                body,
            });
        }
        out.push(Stmt::Match {
            value: src.expr,
            arms,
        });
        Ok(())
    }
}

/// Optionality and default reconciliation for one primitive field.
struct PrimitiveField<'v> {
    from: Scalar,
    to: Scalar,
    s_expr: Expr,
    s_opt: bool,
    s_conf: bool,
    t_opt: bool,
    t_conf: bool,
    default: Option<&'v serde_json::Value>,
    place: Expr,
}

impl PrimitiveField<'_> {
    fn literal(&self, value: &serde_json::Value) -> Expr {
        Expr::Literal {
            value: value.clone(),
            scalar: self.to,
        }
    }

    fn emit(
        self,
        ident: String,
        locals: &mut Locals,
        inline: &mut Vec<(String, Expr)>,
        post: &mut Vec<Stmt>,
    ) {
        let (from, to) = (self.from, self.to);
        // Booleans have no usable zero sentinel.
        let zero_checks = to != Scalar::Bool;

        match (self.s_opt, self.t_opt) {
            (false, false) => {
                inline.push((ident, self.s_expr.clone().convert(from, to)));
                if let Some(default) = self.default {
                    if (self.s_conf || self.t_conf) && zero_checks {
                        post.push(Stmt::IfZero {
                            value: self.place.clone(),
                            zero: Zero::Scalar(to),
                            negate: false,
                            body: vec![Stmt::Assign {
                                place: self.place.clone(),
                                value: self.literal(default),
                            }],
                        });
                    }
                }
            }
            (false, true) => {
                let value = self.s_expr.clone().convert(from, to).some();
                if self.s_conf && zero_checks {
                    post.push(Stmt::IfZero {
                        value: self.s_expr.clone(),
                        zero: Zero::Scalar(from),
                        negate: true,
                        body: vec![Stmt::Assign {
                            place: self.place.clone(),
                            value,
                        }],
                    });
                } else {
                    inline.push((ident, value));
                }
            }
            (true, false) => {
                let bind = locals.fresh("x");
                post.push(Stmt::IfSome {
                    value: self.s_expr.clone(),
                    bind: bind.clone(),
                    body: vec![Stmt::Assign {
                        place: self.place.clone(),
                        value: Expr::bound(bind).convert(from, to),
                    }],
                });
                if let Some(default) = self.default {
                    post.push(Stmt::IfNone {
                        value: self.s_expr.clone(),
                        body: vec![Stmt::Assign {
                            place: self.place.clone(),
                            value: self.literal(default),
                        }],
                    });
                }
            }
            (true, true) => {
                if from == to {
                    inline.push((ident, self.s_expr.clone().cloned()));
                } else {
                    let bind = locals.fresh("x");
                    post.push(Stmt::IfSome {
                        value: self.s_expr.clone(),
                        bind: bind.clone(),
                        body: vec![Stmt::Assign {
                            place: self.place.clone(),
                            value: Expr::bound(bind).convert(from, to).some(),
                        }],
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stubgen_schema::analysis::recursive_types;
    use stubgen_schema::parse::parse_schema_content;
    use stubgen_schema::{Primitive, Variant};

    fn schema(doc: &str) -> Schema {
        stubgen_schema::link(&parse_schema_content(doc).unwrap()).unwrap()
    }

    fn plan_between(
        schema: &Schema,
        source: &AttributeNode,
        source_ctx: &RepresentationContext,
        target: &AttributeNode,
        target_ctx: &RepresentationContext,
        registry: &mut HelperRegistry,
    ) -> ConversionPlan {
        let recursive = recursive_types(schema);
        let transform = Transform {
            schema,
            source_ctx,
            target_ctx,
            direction: Direction::Encode,
            options: ResolveOptions::default(),
            helper_prefix: None,
            recursive: &recursive,
        };
        transform
            .plan(
                registry,
                PlanRequest {
                    name: "convert".to_string(),
                    source,
                    source_hint: "Source".to_string(),
                    target,
                    target_hint: "Target".to_string(),
                    path: FieldPath::root("payload"),
                    extras: Vec::new(),
                },
            )
            .expect("plan should build")
    }

    #[test]
    fn test_array_allocates_from_source_length() {
        let s = schema(r#"{ "name": "s" }"#);
        let svc = RepresentationContext::service();
        let wire = RepresentationContext::grpc_wire("pb");
        let source = AttributeNode::array(AttributeNode::primitive(Primitive::Int));
        let target = AttributeNode::array(AttributeNode::primitive(Primitive::Int));
        let plan = plan_between(&s, &source, &svc, &target, &wire, &mut HelperRegistry::new());

        match &plan.init.body[0] {
            Stmt::Let {
                value: Expr::VecWithCapacity(len_of),
                ..
            } => assert_eq!(**len_of, Expr::bound(SOURCE_PARAM)),
            other => panic!("expected presized allocation, got {:?}", other),
        }
        assert!(matches!(plan.init.body[1], Stmt::ForEach { .. }));
    }

    #[test]
    fn test_identical_scalar_array_is_cloned() {
        let s = schema(r#"{ "name": "s" }"#);
        let svc = RepresentationContext::service();
        let node = AttributeNode::array(AttributeNode::primitive(Primitive::String));
        let plan = plan_between(&s, &node, &svc, &node, &svc, &mut HelperRegistry::new());
        assert_eq!(plan.init.body.len(), 1);
        assert!(matches!(
            &plan.init.body[0],
            Stmt::Let { value: Expr::Cloned(_), .. }
        ));
    }

    #[test]
    fn test_union_has_one_arm_per_variant() {
        let s = schema(r#"{ "name": "s" }"#);
        let svc = RepresentationContext::service();
        let node = AttributeNode::union(vec![
            Variant::new("circle", AttributeNode::primitive(Primitive::Float64)),
            Variant::new("label", AttributeNode::primitive(Primitive::String)),
            Variant::new("count", AttributeNode::primitive(Primitive::Int)),
        ]);
        let plan = plan_between(&s, &node, &svc, &node, &svc, &mut HelperRegistry::new());
        assert!(plan.init.result.is_none());
        let Stmt::Match { arms, .. } = &plan.init.body[0] else {
            panic!("expected match");
        };
        let names: Vec<&str> = arms.iter().map(|a| a.variant.as_str()).collect();
        assert_eq!(names, vec!["Circle", "Label", "Count"]);
        for arm in arms {
            assert!(matches!(arm.body.last(), Some(Stmt::Return(Expr::Variant { .. }))));
        }
    }

    #[test]
    fn test_recursive_type_gets_single_boxed_helper() {
        let s = schema(
            r#"{ "name": "s", "types": [
                { "name": "Node", "type": { "object": [
                    { "name": "value", "type": "int", "required": true },
                    { "name": "next", "type": "Node" }
                ] } },
                { "name": "Holder", "type": { "object": [
                    { "name": "head", "type": "Node" },
                    { "name": "tail", "type": "Node" }
                ] } }
            ] }"#,
        );
        let svc = RepresentationContext::service();
        let wire = RepresentationContext::grpc_wire("pb");
        let holder = AttributeNode::named(s.lookup("Holder").unwrap());
        let mut registry = HelperRegistry::new();
        let plan = plan_between(&s, &holder, &svc, &holder, &wire, &mut registry);

        assert_eq!(registry.len(), 1);
        assert_eq!(plan.helpers, vec!["encode_node_to_node"]);
        let helper = registry.by_name("encode_node_to_node").unwrap();
        assert_eq!(helper.helpers, vec!["encode_node_to_node"]);

        let mut boxed_calls = 0;
        crate::fragment::walk(&helper.init.body, &mut |stmt| {
            if let Stmt::Assign {
                value: Expr::Some(inner),
                ..
            } = stmt
            {
                if matches!(**inner, Expr::Boxed(_)) {
                    boxed_calls += 1;
                }
            }
        });
        assert_eq!(boxed_calls, 1);
    }

    #[test]
    fn test_incompatible_pair_aborts_plan() {
        let s = schema(r#"{ "name": "s" }"#);
        let svc = RepresentationContext::service();
        let recursive = BTreeSet::new();
        let transform = Transform {
            schema: &s,
            source_ctx: &svc,
            target_ctx: &svc,
            direction: Direction::Decode,
            options: ResolveOptions::default(),
            helper_prefix: None,
            recursive: &recursive,
        };
        let a = AttributeNode::object(vec![Field::new("id", AttributeNode::primitive(Primitive::String))]);
        let b = AttributeNode::object(vec![Field::new("id", AttributeNode::primitive(Primitive::Boolean))]);
        let err = transform
            .plan(
                &mut HelperRegistry::new(),
                PlanRequest {
                    name: "decode".into(),
                    source: &a,
                    source_hint: "A".into(),
                    target: &b,
                    target_hint: "B".into(),
                    path: FieldPath::root("payload"),
                    extras: Vec::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, CompileError::SchemaIncompatibility { .. }));
    }
}
