//! Lowering of the fragment IR to Rust tokens
//!
//! Every borrow and clone decision lives here. Bindings introduced by the
//! IR (`Expr::Bound`) are references, field reads are places behind a
//! reference, and locals are owned values.

use std::str::FromStr;

use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::{format_ident, quote};
use serde_json::Value;
use stubgen_schema::{RustType, Scalar, TypePath};

use crate::error::{CompileError, Result};
use crate::fragment::{Arm, Expr, Stmt, Zero};
use crate::plan::{ConversionPlan, InitProc};

/// Identifier tokens, honoring `r#` raw identifiers.
pub fn ident(name: &str) -> Ident {
    match name.strip_prefix("r#") {
        Some(raw) => Ident::new_raw(raw, Span::call_site()),
        None => format_ident!("{}", name),
    }
}

pub fn path_tokens(path: &TypePath) -> TokenStream {
    let segments = path.segments.iter().map(|s| ident(s));
    quote! { #(#segments)::* }
}

pub fn scalar_tokens(scalar: Scalar) -> TokenStream {
    match scalar {
        Scalar::Bool => quote! { bool },
        Scalar::I32 => quote! { i32 },
        Scalar::I64 => quote! { i64 },
        Scalar::U32 => quote! { u32 },
        Scalar::U64 => quote! { u64 },
        Scalar::F32 => quote! { f32 },
        Scalar::F64 => quote! { f64 },
        Scalar::String => quote! { String },
        Scalar::Bytes => quote! { Vec<u8> },
        Scalar::Json => quote! { serde_json::Value },
    }
}

pub fn type_tokens(ty: &RustType) -> TokenStream {
    match ty {
        RustType::Scalar(s) => scalar_tokens(*s),
        RustType::Path(p) => path_tokens(p),
        RustType::Vec(inner) => {
            let inner = type_tokens(inner);
            quote! { Vec<#inner> }
        }
        RustType::Map(k, v) => {
            let k = type_tokens(k);
            let v = type_tokens(v);
            quote! { std::collections::HashMap<#k, #v> }
        }
        RustType::Option(inner) => {
            let inner = type_tokens(inner);
            quote! { Option<#inner> }
        }
        RustType::Boxed(inner) => {
            let inner = type_tokens(inner);
            quote! { Box<#inner> }
        }
    }
}

/// Literal tokens for a default value of the given scalar.
pub fn literal_tokens(value: &Value, scalar: Scalar) -> Result<TokenStream> {
    let mismatch = || {
        CompileError::Invariant(format!(
            "default {} is not a valid {} literal",
            value,
            scalar.rust_name()
        ))
    };
    let tokens = match scalar {
        Scalar::Bool => {
            let b = value.as_bool().ok_or_else(mismatch)?;
            quote! { #b }
        }
        Scalar::I32 => {
            let n = value.as_i64().and_then(|n| i32::try_from(n).ok()).ok_or_else(mismatch)?;
            let lit = Literal::i32_suffixed(n);
            quote! { #lit }
        }
        Scalar::I64 => {
            let lit = Literal::i64_suffixed(value.as_i64().ok_or_else(mismatch)?);
            quote! { #lit }
        }
        Scalar::U32 => {
            let n = value.as_u64().and_then(|n| u32::try_from(n).ok()).ok_or_else(mismatch)?;
            let lit = Literal::u32_suffixed(n);
            quote! { #lit }
        }
        Scalar::U64 => {
            let lit = Literal::u64_suffixed(value.as_u64().ok_or_else(mismatch)?);
            quote! { #lit }
        }
        Scalar::F32 => {
            let lit = Literal::f32_suffixed(value.as_f64().ok_or_else(mismatch)? as f32);
            quote! { #lit }
        }
        Scalar::F64 => {
            let lit = Literal::f64_suffixed(value.as_f64().ok_or_else(mismatch)?);
            quote! { #lit }
        }
        Scalar::String => {
            let s = value.as_str().ok_or_else(mismatch)?;
            quote! { #s.to_string() }
        }
        Scalar::Bytes => match value {
            Value::String(s) => {
                let lit = Literal::byte_string(s.as_bytes());
                quote! { #lit.to_vec() }
            }
            Value::Array(items) => {
                let bytes = items
                    .iter()
                    .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()).ok_or_else(mismatch))
                    .collect::<Result<Vec<u8>>>()?;
                quote! { vec![#(#bytes),*] }
            }
            _ => return Err(mismatch()),
        },
        Scalar::Json => {
            let inner = TokenStream::from_str(&value.to_string()).map_err(|_| mismatch())?;
            quote! { serde_json::json!(#inner) }
        }
    };
    Ok(tokens)
}

/// Reads the value at `expr` for a copy or a clone.
fn read(expr: &Expr, copy: bool) -> Result<TokenStream> {
    let inner = lower_expr(expr)?;
    Ok(match (expr, copy) {
        (Expr::Bound(_), true) => quote! { *#inner },
        (Expr::Bound(_), false) | (Expr::Field(..), false) => quote! { #inner.clone() },
        _ => inner,
    })
}

/// Borrow of the value at `expr`, for calls and pattern matches.
fn borrow(expr: &Expr) -> Result<TokenStream> {
    let inner = lower_expr(expr)?;
    Ok(match expr {
        Expr::Bound(_) => inner,
        _ => quote! { &#inner },
    })
}

pub fn lower_expr(expr: &Expr) -> Result<TokenStream> {
    let tokens = match expr {
        Expr::Local(name) | Expr::Bound(name) => {
            let name = ident(name);
            quote! { #name }
        }
        Expr::Field(base, field) => {
            let base = lower_expr(base)?;
            let field = ident(field);
            quote! { #base.#field }
        }
        Expr::Convert { value, from, to } => {
            let read = read(value, from.is_copy())?;
            if from == to {
                read
            } else {
                let to = scalar_tokens(*to);
                quote! { #read as #to }
            }
        }
        Expr::Cloned(inner) => {
            let inner = lower_expr(inner)?;
            quote! { #inner.clone() }
        }
        Expr::Some(inner) => {
            let inner = lower_expr(inner)?;
            quote! { Some(#inner) }
        }
        Expr::Boxed(inner) => {
            let inner = lower_expr(inner)?;
            quote! { Box::new(#inner) }
        }
        Expr::Literal { value, scalar } => literal_tokens(value, *scalar)?,
        Expr::DefaultOf(RustType::Option(_)) => quote! { None },
        Expr::DefaultOf(ty) => {
            let ty = type_tokens(ty);
            quote! { <#ty>::default() }
        }
        Expr::Struct { ty, fields } if fields.is_empty() => {
            let ty = path_tokens(ty);
            quote! { <#ty>::default() }
        }
        Expr::Struct { ty, fields } => {
            let ty = path_tokens(ty);
            let names = fields.iter().map(|(name, _)| ident(name));
            let values = fields
                .iter()
                .map(|(_, value)| lower_expr(value))
                .collect::<Result<Vec<_>>>()?;
            quote! {
                #ty {
                    #(#names: #values,)*
                    ..Default::default()
                }
            }
        }
        Expr::Variant {
            ty,
            variant,
            payload,
        } => {
            let ty = path_tokens(ty);
            let variant = ident(variant);
            let payload = lower_expr(payload)?;
            quote! { #ty::#variant(#payload) }
        }
        Expr::Call { helper, arg } => {
            let helper = ident(helper);
            let arg = borrow(arg)?;
            quote! { #helper(#arg) }
        }
        Expr::VecWithCapacity(source) => {
            let source = lower_expr(source)?;
            quote! { Vec::with_capacity(#source.len()) }
        }
        Expr::MapWithCapacity(source) => {
            let source = lower_expr(source)?;
            quote! { std::collections::HashMap::with_capacity(#source.len()) }
        }
    };
    Ok(tokens)
}

fn zero_test(value: &Expr, zero: Zero, negate: bool) -> Result<TokenStream> {
    let tokens = match zero {
        Zero::Scalar(Scalar::Bool) => {
            let v = read(value, true)?;
            if negate {
                quote! { #v }
            } else {
                quote! { !#v }
            }
        }
        Zero::Scalar(s) if s.is_integer() || s.is_float() => {
            let v = read(value, true)?;
            let zero = if s.is_float() {
                Literal::f64_unsuffixed(0.0)
            } else {
                Literal::u8_unsuffixed(0)
            };
            if negate {
                quote! { #v != #zero }
            } else {
                quote! { #v == #zero }
            }
        }
        Zero::Scalar(Scalar::Json) => {
            let v = lower_expr(value)?;
            if negate {
                quote! { !#v.is_null() }
            } else {
                quote! { #v.is_null() }
            }
        }
        Zero::Scalar(_) | Zero::Collection => {
            let v = lower_expr(value)?;
            if negate {
                quote! { !#v.is_empty() }
            } else {
                quote! { #v.is_empty() }
            }
        }
    };
    Ok(tokens)
}

fn lower_block(body: &[Stmt]) -> Result<Vec<TokenStream>> {
    body.iter().map(lower_stmt).collect()
}

fn lower_arm(arm: &Arm) -> Result<TokenStream> {
    let ty = path_tokens(&arm.ty);
    let variant = ident(&arm.variant);
    let bind = ident(&arm.bind);
    let body = lower_block(&arm.body)?;
    Ok(quote! {
        #ty::#variant(#bind) => {
            #(#body)*
        }
    })
}

pub fn lower_stmt(stmt: &Stmt) -> Result<TokenStream> {
    let tokens = match stmt {
        Stmt::Let {
            name,
            mutable,
            value,
        } => {
            let name = ident(name);
            let value = lower_expr(value)?;
            if *mutable {
                quote! { let mut #name = #value; }
            } else {
                quote! { let #name = #value; }
            }
        }
        Stmt::Declare(name) => {
            let name = ident(name);
            quote! { let #name; }
        }
        Stmt::Assign { place, value } => {
            let place = lower_expr(place)?;
            let value = lower_expr(value)?;
            quote! { #place = #value; }
        }
        Stmt::IfSome { value, bind, body } => {
            let value = borrow(value)?;
            let bind = ident(bind);
            let body = lower_block(body)?;
            quote! {
                if let Some(#bind) = #value {
                    #(#body)*
                }
            }
        }
        Stmt::IfNone { value, body } => {
            let value = lower_expr(value)?;
            let body = lower_block(body)?;
            quote! {
                if #value.is_none() {
                    #(#body)*
                }
            }
        }
        Stmt::IfZero {
            value,
            zero,
            negate,
            body,
        } => {
            let test = zero_test(value, *zero, *negate)?;
            let body = lower_block(body)?;
            quote! {
                if #test {
                    #(#body)*
                }
            }
        }
        Stmt::ForEach { source, bind, body } => {
            let source = lower_expr(source)?;
            let bind = ident(bind);
            let body = lower_block(body)?;
            quote! {
                for #bind in #source.iter() {
                    #(#body)*
                }
            }
        }
        Stmt::ForEachEntry {
            source,
            key,
            value,
            body,
        } => {
            let source = lower_expr(source)?;
            let key = ident(key);
            let value = ident(value);
            let body = lower_block(body)?;
            quote! {
                for (#key, #value) in #source.iter() {
                    #(#body)*
                }
            }
        }
        Stmt::Push { target, value } => {
            let target = lower_expr(target)?;
            let value = lower_expr(value)?;
            quote! { #target.push(#value); }
        }
        Stmt::Insert { target, key, value } => {
            let target = lower_expr(target)?;
            let key = lower_expr(key)?;
            let value = lower_expr(value)?;
            quote! { #target.insert(#key, #value); }
        }
        Stmt::Match { value, arms } => {
            let value = borrow(value)?;
            let arms = arms.iter().map(lower_arm).collect::<Result<Vec<_>>>()?;
            quote! {
                match #value {
                    #(#arms)*
                }
            }
        }
        Stmt::Return(value) => {
            let value = lower_expr(value)?;
            quote! { return #value; }
        }
    };
    Ok(tokens)
}

pub fn lower_init(init: &InitProc) -> Result<TokenStream> {
    let name = ident(&init.name);
    let params = init.params.iter().map(|p| {
        let name = ident(&p.name);
        let ty = type_tokens(&p.ty);
        if p.by_ref {
            quote! { #name: &#ty }
        } else {
            quote! { #name: #ty }
        }
    });
    let returns = type_tokens(&init.returns);
    let body = lower_block(&init.body)?;
    let result = init.result.as_deref().map(ident);
    Ok(quote! {
        pub fn #name(#(#params),*) -> #returns {
            #(#body)*
            #result
        }
    })
}

pub fn lower_plan(plan: &ConversionPlan) -> Result<TokenStream> {
    lower_init(&plan.init)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Direction, Param};
    use serde_json::json;

    fn render(expr: &Expr) -> String {
        lower_expr(expr).unwrap().to_string()
    }

    #[test]
    fn test_bound_copy_is_dereferenced_and_cast() {
        let e = Expr::bound("k").convert(Scalar::I32, Scalar::I64);
        assert_eq!(render(&e), "* k as i64");
    }

    #[test]
    fn test_field_string_read_clones() {
        let e = Expr::bound("v").field("name").convert(Scalar::String, Scalar::String);
        assert_eq!(render(&e), "v . name . clone ()");
    }

    #[test]
    fn test_raw_identifier_field() {
        let e = Expr::bound("v").field("r#type");
        assert_eq!(render(&e), "v . r#type");
    }

    #[test]
    fn test_literals_are_suffixed() {
        assert_eq!(literal_tokens(&json!(1), Scalar::I64).unwrap().to_string(), "1i64");
        assert_eq!(
            literal_tokens(&json!("x"), Scalar::String).unwrap().to_string(),
            "\"x\" . to_string ()"
        );
        assert!(literal_tokens(&json!("x"), Scalar::I32).is_err());
        assert!(literal_tokens(&json!(1i64 << 40), Scalar::I32).is_err());
    }

    #[test]
    fn test_lowered_procedure_parses() {
        let init = InitProc {
            name: "decode_thing".into(),
            params: vec![Param {
                name: "v".into(),
                ty: RustType::Path(TypePath {
                    segments: vec!["pb".into(), "Thing".into()],
                }),
                by_ref: true,
            }],
            returns: RustType::Path(TypePath {
                segments: vec!["Thing".into()],
            }),
            body: vec![
                Stmt::Let {
                    name: "res".into(),
                    mutable: true,
                    value: Expr::Struct {
                        ty: TypePath {
                            segments: vec!["Thing".into()],
                        },
                        fields: vec![(
                            "count".into(),
                            Expr::bound("v").field("count").convert(Scalar::I32, Scalar::I64),
                        )],
                    },
                },
                Stmt::IfSome {
                    value: Expr::bound("v").field("label"),
                    bind: "x".into(),
                    body: vec![Stmt::Assign {
                        place: Expr::local("res").field("label"),
                        value: Expr::bound("x").convert(Scalar::String, Scalar::String).some(),
                    }],
                },
            ],
            result: Some("res".into()),
        };
        let plan = ConversionPlan {
            source_type: init.params[0].ty.clone(),
            target_type: init.returns.clone(),
            direction: Direction::Decode,
            init,
            validation: None,
            helpers: Vec::new(),
        };
        let tokens = lower_plan(&plan).unwrap();
        let parsed: syn::ItemFn = syn::parse2(tokens).unwrap();
        assert_eq!(parsed.sig.ident, "decode_thing");
    }
}
