//! Plan evaluator
//!
//! Interprets a [`ConversionPlan`] over dynamic [`Value`]s so tests can check
//! the behavior of generated conversions without compiling them. `Option`
//! and `Box` are transparent: `None` is [`Value::Null`] and `Some(x)` is `x`.
//! A struct field that was never set reads as `Null`.

use std::collections::{BTreeMap, HashMap};

use stubgen_schema::{RustType, Scalar};
use thiserror::Error;

use crate::fragment::{Expr, Stmt, Zero};
use crate::plan::ConversionPlan;
use crate::registry::HelperRegistry;

const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Struct(BTreeMap<String, Value>),
    Variant(String, Box<Value>),
}

impl Value {
    pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Value::Struct(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    pub fn str(s: &str) -> Self {
        Value::Str(s.to_string())
    }

    pub fn variant(name: &str, payload: Value) -> Self {
        Value::Variant(name.to_string(), Box::new(payload))
    }

    /// Field of a struct value; `Null` when unset or not a struct.
    pub fn get(&self, field: &str) -> &Value {
        match self {
            Value::Struct(fields) => fields.get(field).unwrap_or(&Value::Null),
            _ => &Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unbound name `{0}`")]
    Unbound(String),
    #[error("unknown helper `{0}`")]
    UnknownHelper(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("no match arm for variant `{0}`")]
    NoArm(String),
    #[error("procedure `{0}` finished without a value")]
    NoResult(String),
    #[error("call depth exceeded")]
    TooDeep,
}

type Env = HashMap<String, Value>;

fn field_key(name: &str) -> &str {
    name.strip_prefix("r#").unwrap_or(name)
}

pub struct Evaluator<'r> {
    registry: &'r HelperRegistry,
    depth: usize,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r HelperRegistry) -> Self {
        Self { registry, depth: 0 }
    }

    /// Runs `plan` with `input` as the source parameter and `extras` as the
    /// remaining parameters, in order.
    pub fn run(&mut self, plan: &ConversionPlan, input: Value, extras: Vec<Value>) -> Result<Value, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        self.depth += 1;

        let mut env = Env::new();
        let mut args = std::iter::once(input).chain(extras);
        for param in &plan.init.params {
            env.insert(param.name.clone(), args.next().unwrap_or(Value::Null));
        }
        let returned = self.exec(&plan.init.body, &mut env);
        self.depth -= 1;

        if let Some(value) = returned? {
            return Ok(value);
        }
        match &plan.init.result {
            Some(name) => env.remove(name).ok_or_else(|| EvalError::Unbound(name.clone())),
            None => Err(EvalError::NoResult(plan.init.name.clone())),
        }
    }

    fn exec(&mut self, body: &[Stmt], env: &mut Env) -> Result<Option<Value>, EvalError> {
        for stmt in body {
            if let Some(value) = self.exec_stmt(stmt, env)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &mut Env) -> Result<Option<Value>, EvalError> {
        match stmt {
            Stmt::Let { name, value, .. } => {
                let value = self.eval(value, env)?;
                env.insert(name.clone(), value);
            }
            Stmt::Declare(name) => {
                env.insert(name.clone(), Value::Null);
            }
            Stmt::Assign { place, value } => {
                let value = self.eval(value, env)?;
                *place_mut(place, env)? = value;
            }
            Stmt::IfSome { value, bind, body } => {
                let value = self.eval(value, env)?;
                if !value.is_null() {
                    env.insert(bind.clone(), value);
                    return self.exec(body, env);
                }
            }
            Stmt::IfNone { value, body } => {
                if self.eval(value, env)?.is_null() {
                    return self.exec(body, env);
                }
            }
            Stmt::IfZero {
                value,
                zero,
                negate,
                body,
            } => {
                let value = self.eval(value, env)?;
                if is_zero(&value, *zero) != *negate {
                    return self.exec(body, env);
                }
            }
            Stmt::ForEach { source, bind, body } => {
                let Value::List(items) = self.eval(source, env)? else {
                    return Err(EvalError::Type("iterating a non-list".into()));
                };
                for item in items {
                    env.insert(bind.clone(), item);
                    if let Some(value) = self.exec(body, env)? {
                        return Ok(Some(value));
                    }
                }
            }
            Stmt::ForEachEntry {
                source,
                key,
                value,
                body,
            } => {
                let Value::Map(entries) = self.eval(source, env)? else {
                    return Err(EvalError::Type("iterating a non-map".into()));
                };
                for (k, v) in entries {
                    env.insert(key.clone(), k);
                    env.insert(value.clone(), v);
                    if let Some(value) = self.exec(body, env)? {
                        return Ok(Some(value));
                    }
                }
            }
            Stmt::Push { target, value } => {
                let value = self.eval(value, env)?;
                match place_mut(target, env)? {
                    Value::List(items) => items.push(value),
                    _ => return Err(EvalError::Type("push onto a non-list".into())),
                }
            }
            Stmt::Insert { target, key, value } => {
                let key = self.eval(key, env)?;
                let value = self.eval(value, env)?;
                match place_mut(target, env)? {
                    Value::Map(entries) => match entries.iter_mut().find(|(k, _)| *k == key) {
                        Some(entry) => entry.1 = value,
                        None => entries.push((key, value)),
                    },
                    _ => return Err(EvalError::Type("insert into a non-map".into())),
                }
            }
            Stmt::Match { value, arms } => {
                let Value::Variant(name, payload) = self.eval(value, env)? else {
                    return Err(EvalError::Type("match on a non-variant".into()));
                };
                let arm = arms
                    .iter()
                    .find(|arm| arm.variant == name)
                    .ok_or(EvalError::NoArm(name))?;
                env.insert(arm.bind.clone(), *payload);
                return self.exec(&arm.body, env);
            }
            Stmt::Return(value) => return Ok(Some(self.eval(value, env)?)),
        }
        Ok(None)
    }

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, EvalError> {
        let value = match expr {
            Expr::Local(name) | Expr::Bound(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Unbound(name.clone()))?,
            Expr::Field(base, field) => match self.eval(base, env)? {
                Value::Struct(fields) => fields.get(field_key(field)).cloned().unwrap_or(Value::Null),
                other => {
                    return Err(EvalError::Type(format!(
                        "field `{}` read on {:?}",
                        field, other
                    )))
                }
            },
            Expr::Convert { value, to, .. } => convert(self.eval(value, env)?, *to)?,
            Expr::Cloned(inner) | Expr::Some(inner) | Expr::Boxed(inner) => self.eval(inner, env)?,
            Expr::Literal { value, scalar } => literal(value, *scalar)?,
            Expr::DefaultOf(ty) => default_of(ty),
            Expr::Struct { fields, .. } => {
                let mut out = BTreeMap::new();
                for (name, value) in fields {
                    out.insert(field_key(name).to_string(), self.eval(value, env)?);
                }
                Value::Struct(out)
            }
            Expr::Variant {
                variant, payload, ..
            } => Value::Variant(variant.clone(), Box::new(self.eval(payload, env)?)),
            Expr::Call { helper, arg } => {
                let arg = self.eval(arg, env)?;
                let registry = self.registry;
                let plan = registry
                    .by_name(helper)
                    .ok_or_else(|| EvalError::UnknownHelper(helper.clone()))?;
                self.run(plan, arg, Vec::new())?
            }
            Expr::VecWithCapacity(_) => Value::List(Vec::new()),
            Expr::MapWithCapacity(_) => Value::Map(Vec::new()),
        };
        Ok(value)
    }
}

fn place_mut<'e>(expr: &Expr, env: &'e mut Env) -> Result<&'e mut Value, EvalError> {
    match expr {
        Expr::Local(name) | Expr::Bound(name) => env
            .get_mut(name)
            .ok_or_else(|| EvalError::Unbound(name.clone())),
        Expr::Field(base, field) => match place_mut(base, env)? {
            Value::Struct(fields) => Ok(fields
                .entry(field_key(field).to_string())
                .or_insert(Value::Null)),
            other => Err(EvalError::Type(format!("field `{}` written on {:?}", field, other))),
        },
        other => Err(EvalError::Type(format!("{:?} is not a place", other))),
    }
}

fn is_zero(value: &Value, zero: Zero) -> bool {
    match (value, zero) {
        (Value::Null, _) => true,
        (Value::Bool(b), _) => !b,
        (Value::Int(n), _) => *n == 0,
        (Value::Float(f), _) => *f == 0.0,
        (Value::Str(s), _) => s.is_empty(),
        (Value::Bytes(b), _) => b.is_empty(),
        (Value::Json(j), _) => j.is_null(),
        (Value::List(items), _) => items.is_empty(),
        (Value::Map(entries), _) => entries.is_empty(),
        (Value::Struct(_), _) | (Value::Variant(..), _) => false,
    }
}

fn convert(value: Value, to: Scalar) -> Result<Value, EvalError> {
    Ok(match (value, to) {
        (Value::Int(n), Scalar::I32) => Value::Int(n as i32 as i128),
        (Value::Int(n), Scalar::I64) => Value::Int(n as i64 as i128),
        (Value::Int(n), Scalar::U32) => Value::Int(n as u32 as i128),
        (Value::Int(n), Scalar::U64) => Value::Int(n as u64 as i128),
        (Value::Int(n), Scalar::F32) => Value::Float(n as f32 as f64),
        (Value::Int(n), Scalar::F64) => Value::Float(n as f64),
        (Value::Float(f), Scalar::F32) => Value::Float(f as f32 as f64),
        (Value::Float(f), Scalar::F64) => Value::Float(f),
        (Value::Null, to) => {
            return Err(EvalError::Type(format!(
                "read of an unset value as {}",
                to.rust_name()
            )))
        }
        (value, _) => value,
    })
}

fn literal(value: &serde_json::Value, scalar: Scalar) -> Result<Value, EvalError> {
    let mismatch = || EvalError::Type(format!("{} is not a {} literal", value, scalar.rust_name()));
    Ok(match scalar {
        Scalar::Bool => Value::Bool(value.as_bool().ok_or_else(mismatch)?),
        Scalar::I32 | Scalar::I64 => Value::Int(value.as_i64().ok_or_else(mismatch)? as i128),
        Scalar::U32 | Scalar::U64 => Value::Int(value.as_u64().ok_or_else(mismatch)? as i128),
        Scalar::F32 => Value::Float(value.as_f64().ok_or_else(mismatch)? as f32 as f64),
        Scalar::F64 => Value::Float(value.as_f64().ok_or_else(mismatch)?),
        Scalar::String => Value::Str(value.as_str().ok_or_else(mismatch)?.to_string()),
        Scalar::Bytes => Value::Bytes(value.as_str().ok_or_else(mismatch)?.as_bytes().to_vec()),
        Scalar::Json => Value::Json(value.clone()),
    })
}

fn default_of(ty: &RustType) -> Value {
    match ty {
        RustType::Option(_) => Value::Null,
        RustType::Boxed(inner) => default_of(inner),
        RustType::Vec(_) => Value::List(Vec::new()),
        RustType::Map(..) => Value::Map(Vec::new()),
        RustType::Path(_) => Value::Struct(BTreeMap::new()),
        RustType::Scalar(s) => match s {
            Scalar::Bool => Value::Bool(false),
            Scalar::I32 | Scalar::I64 | Scalar::U32 | Scalar::U64 => Value::Int(0),
            Scalar::F32 | Scalar::F64 => Value::Float(0.0),
            Scalar::String => Value::Str(String::new()),
            Scalar::Bytes => Value::Bytes(Vec::new()),
            Scalar::Json => Value::Json(serde_json::Value::Null),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_truncates_to_target_width() {
        let wide = Value::Int(i64::MAX as i128);
        assert_eq!(convert(wide, Scalar::I32).unwrap(), Value::Int(-1));
        assert_eq!(
            convert(Value::Float(0.1), Scalar::F32).unwrap(),
            Value::Float(0.1f32 as f64)
        );
    }

    #[test]
    fn test_unset_values_are_zero() {
        assert!(is_zero(&Value::Null, Zero::Scalar(Scalar::I32)));
        assert!(is_zero(&Value::List(vec![]), Zero::Collection));
        assert!(!is_zero(&Value::str("a"), Zero::Scalar(Scalar::String)));
    }
}
