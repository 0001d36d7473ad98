//! Runtime values.
//!
//! Arrays and objects are shared references: every binding, parameter and
//! array slot holding the same value sees a mutation made through any of
//! them, and strict equality compares identity. Nothing holds a borrow of
//! their contents across a call back into the evaluator.

use super::scope::Scope;
use crate::neutralize::Stub;
use crate::source::ast::{Function, RegexLiteral};
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use thiserror::Error;

pub type Object = IndexMap<String, Value>;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Object>>),
    RegExp(Rc<RegexLiteral>),
    Function(Rc<Callable>),
}

/// `JSON.stringify` met an array or object that contains itself.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("converting circular structure to JSON")]
pub struct CircularJson;

/// Anything that can appear on the left of `(...)`.
pub enum Callable {
    /// A pass-through or prefix stub standing in for an asset helper.
    Stub { name: String, stub: Stub },
    /// Arrow function or `function` with its defining scope.
    Closure { func: Rc<Function>, scope: Rc<Scope> },
    /// Global builtin (`Boolean`, `Object.entries`, `console.log`, ...).
    Builtin(super::builtins::Builtin),
    /// Array or string method bound to its receiver.
    Method {
        method: super::builtins::Method,
        this: Value,
    },
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Stub { name, stub } => write!(f, "[stub {name} ({})]", stub.kind()),
            Callable::Closure { func, .. } => match &func.name {
                Some(name) => write!(f, "[function {name}]"),
                None => write!(f, "[arrow function at {}]", func.span),
            },
            Callable::Builtin(b) => write!(f, "[builtin {b:?}]"),
            Callable::Method { method, .. } => write!(f, "[method {method:?}]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::RegExp(r) => write!(f, "{r}"),
            Value::Function(c) => write!(f, "{c:?}"),
            other => match other.to_json() {
                Ok(Some(json)) => write!(f, "{json}"),
                _ => write!(f, "[circular]"),
            },
        }
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(map: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(map)))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Arrays, objects, regular expressions and functions.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Object(_) | Value::RegExp(_) | Value::Function(_)
        )
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::RegExp(_) | Value::Function(_) => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::RegExp(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    /// `String(value)`.
    pub fn to_js_string(&self) -> String {
        self.js_string_in(&mut Vec::new())
    }

    /// An array that (indirectly) contains itself joins as empty at the
    /// point of recursion.
    fn js_string_in(&self, open: &mut Vec<*const ()>) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => {
                let id = Rc::as_ptr(items).cast::<()>();
                if open.contains(&id) {
                    return String::new();
                }
                open.push(id);
                let joined = items
                    .borrow()
                    .iter()
                    .map(|v| {
                        if v.is_nullish() {
                            String::new()
                        } else {
                            v.js_string_in(open)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                open.pop();
                joined
            }
            Value::Object(_) => "[object Object]".into(),
            Value::RegExp(r) => r.to_string(),
            Value::Function(_) => "function".into(),
        }
    }

    /// `Number(value)`.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_js_string()),
            Value::Object(_) | Value::RegExp(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// `===`
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::RegExp(a), Value::RegExp(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (a, b) if a.is_reference() && b.is_reference() => self.strict_eq(other),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(_), _) | (_, Value::Function(_)) => false,
            (a, _) if a.is_reference() => Value::String(self.to_js_string()).loose_eq(other),
            (_, b) if b.is_reference() => self.loose_eq(&Value::String(other.to_js_string())),
            _ => self.to_number() == other.to_number(),
        }
    }

    /// `Array.includes` equality: strict, except that NaN equals NaN.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_eq(other),
        }
    }

    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert with `JSON.stringify` rules. `Ok(None)` for values it omits
    /// (`undefined` and functions).
    pub fn to_json(&self) -> Result<Option<Json>, CircularJson> {
        self.json_in(&mut Vec::new())
    }

    fn json_in(&self, open: &mut Vec<*const ()>) -> Result<Option<Json>, CircularJson> {
        Ok(Some(match self {
            Value::Undefined | Value::Function(_) => return Ok(None),
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::RegExp(_) => Json::Object(serde_json::Map::new()),
            Value::Array(items) => {
                let id = Rc::as_ptr(items).cast::<()>();
                if open.contains(&id) {
                    return Err(CircularJson);
                }
                open.push(id);
                let mut out = Vec::new();
                for item in items.borrow().iter() {
                    out.push(item.json_in(open)?.unwrap_or(Json::Null));
                }
                open.pop();
                Json::Array(out)
            }
            Value::Object(map) => {
                let id = Rc::as_ptr(map).cast::<()>();
                if open.contains(&id) {
                    return Err(CircularJson);
                }
                open.push(id);
                let mut out = serde_json::Map::new();
                for (key, value) in map.borrow().iter() {
                    if let Some(json) = value.json_in(open)? {
                        out.insert(key.clone(), json);
                    }
                }
                open.pop();
                Json::Object(out)
            }
        }))
    }
}

/// String ordering by UTF-16 code units, as `<` and the default `sort` use.
pub fn compare_strings(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    match t {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts "inf" and "nan", JavaScript does not
        _ if t.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E')) => f64::NAN,
        _ => t.parse().unwrap_or(f64::NAN),
    }
}

/// Numbers serialize exactly as `JSON.stringify` writes them; non-finite
/// numbers become `null`.
fn number_to_json(n: f64) -> Json {
    if !n.is_finite() {
        return Json::Null;
    }
    serde_json::Number::from_str(&number_to_string(n)).map_or(Json::Null, Json::Number)
}

/// `Number.prototype.toString()`: the shortest digits that round-trip,
/// positioned by the ECMAScript rules (plain notation for exponents from
/// -7 to 20, `1e+21` style otherwise).
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if n == 0.0 {
        return "0".into();
    }
    let sign = if n < 0.0 { "-" } else { "" };
    // `{:e}` yields the shortest round-trip digits, e.g. "1.2345e-7"
    let scientific = format!("{:e}", n.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    // position of the decimal point relative to the first digit
    let point = exponent.parse::<i32>().unwrap_or(0) + 1;
    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let (first, rest) = digits.split_at(1);
        let exp = point - 1;
        let exp_sign = if exp < 0 { '-' } else { '+' };
        let fraction = if rest.is_empty() { String::new() } else { format!(".{rest}") };
        format!("{first}{fraction}e{exp_sign}{}", exp.abs())
    };
    format!("{sign}{body}")
}
