//! Type catalog
//!
//! Every struct and enum definition reachable from an endpoint, on either
//! side of a conversion, deduplicated by context and type path.

use std::collections::{BTreeSet, HashMap};

use proc_macro2::{Literal, TokenStream};
use quote::quote;
use stubgen_schema::utils::to_pascal_case;
use stubgen_schema::{AttributeNode, Kind, RepresentationContext, RustType, Schema, TypeId, TypePath};

use crate::lower::{ident, type_tokens};

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub ident: String,
    pub ty: RustType,
    pub tag: Option<u32>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantDef {
    pub name: String,
    pub ty: RustType,
    pub tag: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Struct(Vec<FieldDef>),
    Enum(Vec<VariantDef>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub context: String,
    pub path: TypePath,
    pub doc: Option<String>,
    pub definition: Definition,
}

#[derive(Debug, Default)]
pub struct TypeCatalog {
    entries: Vec<TypeDef>,
    index: HashMap<(String, TypePath), usize>,
}

/// Tags for `count` fields: explicit ones kept, the rest numbered after
/// the highest explicit tag.
pub fn assign_tags(explicit: &[Option<u32>]) -> Vec<u32> {
    let mut next = explicit.iter().flatten().copied().max().unwrap_or(0);
    explicit
        .iter()
        .map(|tag| {
            tag.unwrap_or_else(|| {
                next += 1;
                next
            })
        })
        .collect()
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDef> {
        self.entries.iter()
    }

    pub fn get(&self, context: &str, path: &TypePath) -> Option<&TypeDef> {
        self.index
            .get(&(context.to_string(), path.clone()))
            .map(|&i| &self.entries[i])
    }

    /// Registers the types `node` needs in `ctx`, naming anonymous
    /// composites after `hint`.
    pub fn register(
        &mut self,
        schema: &Schema,
        ctx: &RepresentationContext,
        node: &AttributeNode,
        hint: &str,
        recursive: &BTreeSet<TypeId>,
    ) {
        match &node.kind {
            Kind::Primitive(_) => {}
            Kind::Array(elem) => self.register(schema, ctx, elem, &format!("{}Item", hint), recursive),
            Kind::Map(key, elem) => {
                self.register(schema, ctx, key, &format!("{}Key", hint), recursive);
                self.register(schema, ctx, elem, &format!("{}Value", hint), recursive);
            }
            Kind::Named(id) => {
                let named = schema.get(*id);
                match named.node.kind {
                    Kind::Object(_) | Kind::Union(_) => self.register_composite(
                        schema,
                        ctx,
                        &named.node,
                        &named.name,
                        named.description.clone(),
                        recursive,
                    ),
                    _ => self.register(schema, ctx, &named.node, &named.name, recursive),
                }
            }
            Kind::Object(_) | Kind::Union(_) => {
                self.register_composite(schema, ctx, node, hint, node.description.clone(), recursive)
            }
        }
    }

    fn register_composite(
        &mut self,
        schema: &Schema,
        ctx: &RepresentationContext,
        node: &AttributeNode,
        hint: &str,
        doc: Option<String>,
        recursive: &BTreeSet<TypeId>,
    ) {
        let path = ctx.type_path(hint);
        let key = (ctx.label.clone(), path.clone());
        if self.index.contains_key(&key) {
            return;
        }
        // Placeholder first so self-references stop here.
        let slot = self.entries.len();
        self.index.insert(key, slot);
        self.entries.push(TypeDef {
            context: ctx.label.clone(),
            path,
            doc,
            definition: Definition::Struct(Vec::new()),
        });

        let tagged = ctx.namespace.is_some();
        let boxed = |n: &AttributeNode| schema.named_composite(n).is_some_and(|id| recursive.contains(&id));
        let definition = match &node.kind {
            Kind::Object(fields) => {
                let tags = assign_tags(&fields.iter().map(|f| f.node.wire_tag).collect::<Vec<_>>());
                let mut defs = Vec::with_capacity(fields.len());
                for (field, tag) in fields.iter().zip(tags) {
                    let child = format!("{}{}", hint, to_pascal_case(&field.name));
                    self.register(schema, ctx, &field.node, &child, recursive);
                    defs.push(FieldDef {
                        ident: ctx.field_ident(&field.name),
                        ty: ctx.holder_type(schema, &field.node, &child, boxed(&field.node)),
                        tag: tagged.then_some(tag),
                        doc: field.node.description.clone(),
                    });
                }
                Definition::Struct(defs)
            }
            Kind::Union(variants) => {
                let tags = assign_tags(&variants.iter().map(|v| v.node.wire_tag).collect::<Vec<_>>());
                let mut defs = Vec::with_capacity(variants.len());
                for (variant, tag) in variants.iter().zip(tags) {
                    let child = format!("{}{}", hint, to_pascal_case(&variant.name));
                    self.register(schema, ctx, &variant.node, &child, recursive);
                    defs.push(VariantDef {
                        name: ctx.type_name(&variant.name),
                        ty: ctx.rust_type(schema, &variant.node, &child),
                        tag: tagged.then_some(tag),
                    });
                }
                Definition::Enum(defs)
            }
            _ => return,
        };
        self.entries[slot].definition = definition;
    }

    fn item_tokens(def: &TypeDef) -> TokenStream {
        let name = ident(def.path.name());
        let doc = def.doc.as_ref().map(|d| quote! { #[doc = #d] });
        match &def.definition {
            Definition::Struct(fields) => {
                let fields = fields.iter().map(|f| {
                    let field = ident(&f.ident);
                    let ty = type_tokens(&f.ty);
                    let doc = f.doc.as_ref().map(|d| quote! { #[doc = #d] });
                    let tag = f.tag.map(|t| {
                        let text = format!(" wire tag {}", t);
                        quote! { #[doc = #text] }
                    });
                    quote! {
                        #doc
                        #tag
                        pub #field: #ty,
                    }
                });
                quote! {
                    #doc
                    #[derive(Debug, Clone, Default, PartialEq)]
                    pub struct #name {
                        #(#fields)*
                    }
                }
            }
            Definition::Enum(variants) => {
                let arms = variants.iter().map(|v| {
                    let variant = ident(&v.name);
                    let ty = type_tokens(&v.ty);
                    let tag = v.tag.map(|t| {
                        let text = format!(" wire tag {}", t);
                        quote! { #[doc = #text] }
                    });
                    quote! {
                        #tag
                        #variant(#ty),
                    }
                });
                let default = variants.first().map(|first| {
                    let variant = ident(&first.name);
                    quote! {
                        impl Default for #name {
                            fn default() -> Self {
                                #name::#variant(Default::default())
                            }
                        }
                    }
                });
                quote! {
                    #doc
                    #[derive(Debug, Clone, PartialEq)]
                    pub enum #name {
                        #(#arms)*
                    }
                    #default
                }
            }
        }
    }

    /// Definitions grouped by namespace; namespaced types go in a module
    /// that sees the root items.
    pub fn to_tokens(&self) -> TokenStream {
        let mut root = Vec::new();
        let mut modules: Vec<(String, Vec<TokenStream>)> = Vec::new();
        for def in &self.entries {
            let item = Self::item_tokens(def);
            match def.path.segments.split_last() {
                Some((_, [namespace])) => match modules.iter_mut().find(|(ns, _)| ns == namespace) {
                    Some((_, items)) => items.push(item),
                    None => modules.push((namespace.clone(), vec![item])),
                },
                _ => root.push(item),
            }
        }
        let modules = modules.into_iter().map(|(ns, items)| {
            let ns = ident(&ns);
            quote! {
                pub mod #ns {
                    #[allow(unused_imports)]
                    use super::*;
                    #(#items)*
                }
            }
        });
        quote! {
            #(#root)*
            #(#modules)*
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stubgen_schema::analysis::recursive_types;
    use stubgen_schema::parse::parse_schema_content;

    #[test]
    fn test_assign_tags_after_highest_explicit() {
        assert_eq!(assign_tags(&[None, Some(5), None, Some(2)]), vec![6, 5, 7, 2]);
        assert_eq!(assign_tags(&[None, None]), vec![1, 2]);
    }

    #[test]
    fn test_recursive_types_registered_once_and_boxed() {
        let doc = r#"{ "name": "s", "types": [
            { "name": "Node", "type": { "object": [
                { "name": "value", "type": "int", "required": true },
                { "name": "next", "type": "Node" },
                { "name": "shape", "type": { "union": [
                    { "name": "circle", "type": "float64" },
                    { "name": "label", "type": "string" }
                ] } }
            ] } }
        ] }"#;
        let schema = stubgen_schema::link(&parse_schema_content(doc).unwrap()).unwrap();
        let recursive = recursive_types(&schema);
        let node = AttributeNode::named(schema.lookup("Node").unwrap());
        let wire = RepresentationContext::grpc_wire("pb");
        let mut catalog = TypeCatalog::new();
        catalog.register(&schema, &wire, &node, "Node", &recursive);
        catalog.register(&schema, &wire, &node, "Node", &recursive);
        assert_eq!(catalog.len(), 2);

        let path = wire.type_path("Node");
        let Definition::Struct(fields) = &catalog.get("grpc", &path).unwrap().definition else {
            panic!("expected struct");
        };
        assert_eq!(fields[1].ty.to_string(), "Option<Box<pb::Node>>");
        assert_eq!(fields[0].ty.to_string(), "i32");
        assert_eq!(fields[2].tag, Some(3));

        let file: syn::File = syn::parse2(catalog.to_tokens()).unwrap();
        assert_eq!(file.items.len(), 1);
    }
}
