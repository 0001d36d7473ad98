//! The small standard library data modules lean on.
//!
//! Globals: `Boolean`, `String`, `Number` (with `isNaN isFinite isInteger
//! parseFloat parseInt`), `parseInt`, `parseFloat`, `isNaN`, `isFinite`,
//! `Array.isArray`, `Array.from`, `Object.keys`, `Object.values`,
//! `Object.entries`, `Object.fromEntries`, `Object.assign`,
//! `JSON.stringify`, `JSON.parse`, `Math.{floor,ceil,round,trunc,abs,min,max}`,
//! `console.{log,info,debug,warn,error}`, `NaN`, `Infinity`.
//!
//! Array methods: `map filter flatMap reduce forEach find findIndex some
//! every includes indexOf join slice concat flat reverse sort push pop shift
//! unshift at toString`, plus `length`. `sort`, `reverse`, `push`, `pop`,
//! `shift` and `unshift` mutate the receiver in place.
//!
//! String methods: `trim trimStart trimEnd startsWith endsWith includes
//! indexOf toLowerCase toUpperCase split replace replaceAll match search
//! slice substring at concat repeat padStart padEnd localeCompare toString`,
//! plus `length`. `split`, `replace`, `replaceAll`, `match` and `search`
//! accept regular expressions; `RegExp` values also have `test`, `source`,
//! `flags` and `global`.
//!
//! String lengths and positions count UTF-16 code units, as in JavaScript.

use super::eval::Evaluator;
use super::scope::Scope;
use super::value::{Callable, Object, Value, compare_strings, number_to_string};
use super::EvalError;
use crate::guard;
use crate::source::ast::{RegexLiteral, Span};
use crate::source::regexp;
use serde::Serialize;
use serde_json::Value as Json;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// Names the global scope defines besides stubs.
pub const BUILTIN_GLOBALS: &[&str] = &[
    "Boolean", "String", "Number", "Array", "Object", "JSON", "Math", "console", "NaN",
    "Infinity", "parseInt", "parseFloat", "isNaN", "isFinite",
];

/// Upper bound on strings built by `repeat`/`padStart`/`padEnd`.
const MAX_STRING_LEN: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Boolean,
    String,
    Number,
    NumberIsNaN,
    NumberIsFinite,
    NumberIsInteger,
    ParseFloat,
    ParseInt,
    IsNaN,
    IsFinite,
    ArrayIsArray,
    ArrayFrom,
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ObjectFromEntries,
    ObjectAssign,
    JsonStringify,
    JsonParse,
    Math(MathFn),
    Console(ConsoleLevel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Floor,
    Ceil,
    Round,
    Trunc,
    Abs,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    // arrays
    Map,
    Filter,
    FlatMap,
    Reduce,
    ForEach,
    Find,
    FindIndex,
    Some,
    Every,
    Join,
    Flat,
    Reverse,
    Sort,
    Push,
    Pop,
    Shift,
    Unshift,
    // shared by arrays and strings
    Includes,
    IndexOf,
    Slice,
    Concat,
    At,
    ToString,
    // strings
    Trim,
    TrimStart,
    TrimEnd,
    StartsWith,
    EndsWith,
    ToLowerCase,
    ToUpperCase,
    Split,
    Replace,
    ReplaceAll,
    Match,
    Search,
    Substring,
    Repeat,
    PadStart,
    PadEnd,
    LocaleCompare,
    // regular expressions
    Test,
}

const ARRAY_METHODS: &[(&str, Method)] = &[
    ("map", Method::Map),
    ("filter", Method::Filter),
    ("flatMap", Method::FlatMap),
    ("reduce", Method::Reduce),
    ("forEach", Method::ForEach),
    ("find", Method::Find),
    ("findIndex", Method::FindIndex),
    ("some", Method::Some),
    ("every", Method::Every),
    ("join", Method::Join),
    ("flat", Method::Flat),
    ("reverse", Method::Reverse),
    ("sort", Method::Sort),
    ("push", Method::Push),
    ("pop", Method::Pop),
    ("shift", Method::Shift),
    ("unshift", Method::Unshift),
    ("includes", Method::Includes),
    ("indexOf", Method::IndexOf),
    ("slice", Method::Slice),
    ("concat", Method::Concat),
    ("at", Method::At),
    ("toString", Method::ToString),
];

const STRING_METHODS: &[(&str, Method)] = &[
    ("trim", Method::Trim),
    ("trimStart", Method::TrimStart),
    ("trimEnd", Method::TrimEnd),
    ("startsWith", Method::StartsWith),
    ("endsWith", Method::EndsWith),
    ("toLowerCase", Method::ToLowerCase),
    ("toUpperCase", Method::ToUpperCase),
    ("split", Method::Split),
    ("replace", Method::Replace),
    ("replaceAll", Method::ReplaceAll),
    ("match", Method::Match),
    ("search", Method::Search),
    ("substring", Method::Substring),
    ("repeat", Method::Repeat),
    ("padStart", Method::PadStart),
    ("padEnd", Method::PadEnd),
    ("localeCompare", Method::LocaleCompare),
    ("includes", Method::Includes),
    ("indexOf", Method::IndexOf),
    ("slice", Method::Slice),
    ("concat", Method::Concat),
    ("at", Method::At),
    ("toString", Method::ToString),
];

const REGEXP_METHODS: &[(&str, Method)] = &[("test", Method::Test), ("toString", Method::ToString)];

impl Method {
    fn lookup(table: &[(&str, Method)], name: &str) -> Option<Method> {
        table.iter().find(|(n, _)| *n == name).map(|(_, m)| *m)
    }

    /// The JavaScript name, for messages.
    pub fn name(self) -> &'static str {
        ARRAY_METHODS
            .iter()
            .chain(STRING_METHODS)
            .chain(REGEXP_METHODS)
            .find(|(_, m)| *m == self)
            .map_or("method", |(n, _)| *n)
    }
}

fn function(builtin: Builtin) -> Value {
    Value::Function(Rc::new(Callable::Builtin(builtin)))
}

fn namespace(entries: &[(&str, Builtin)]) -> Value {
    Value::object(
        entries
            .iter()
            .map(|(name, b)| (name.to_string(), function(*b)))
            .collect(),
    )
}

/// Define the builtin globals in `scope`.
pub fn install(scope: &Scope) {
    scope.initialize("Boolean", function(Builtin::Boolean), false);
    scope.initialize("String", function(Builtin::String), false);
    scope.initialize("Number", function(Builtin::Number), false);
    scope.initialize("parseInt", function(Builtin::ParseInt), false);
    scope.initialize("parseFloat", function(Builtin::ParseFloat), false);
    scope.initialize("isNaN", function(Builtin::IsNaN), false);
    scope.initialize("isFinite", function(Builtin::IsFinite), false);
    scope.initialize("NaN", Value::Number(f64::NAN), false);
    scope.initialize("Infinity", Value::Number(f64::INFINITY), false);
    scope.initialize(
        "Array",
        namespace(&[("isArray", Builtin::ArrayIsArray), ("from", Builtin::ArrayFrom)]),
        false,
    );
    scope.initialize(
        "Object",
        namespace(&[
            ("keys", Builtin::ObjectKeys),
            ("values", Builtin::ObjectValues),
            ("entries", Builtin::ObjectEntries),
            ("fromEntries", Builtin::ObjectFromEntries),
            ("assign", Builtin::ObjectAssign),
        ]),
        false,
    );
    scope.initialize(
        "JSON",
        namespace(&[("stringify", Builtin::JsonStringify), ("parse", Builtin::JsonParse)]),
        false,
    );
    scope.initialize(
        "Math",
        namespace(&[
            ("floor", Builtin::Math(MathFn::Floor)),
            ("ceil", Builtin::Math(MathFn::Ceil)),
            ("round", Builtin::Math(MathFn::Round)),
            ("trunc", Builtin::Math(MathFn::Trunc)),
            ("abs", Builtin::Math(MathFn::Abs)),
            ("min", Builtin::Math(MathFn::Min)),
            ("max", Builtin::Math(MathFn::Max)),
        ]),
        false,
    );
    scope.initialize(
        "console",
        namespace(&[
            ("log", Builtin::Console(ConsoleLevel::Info)),
            ("info", Builtin::Console(ConsoleLevel::Info)),
            ("debug", Builtin::Console(ConsoleLevel::Debug)),
            ("warn", Builtin::Console(ConsoleLevel::Warn)),
            ("error", Builtin::Console(ConsoleLevel::Error)),
        ]),
        false,
    );
}

fn type_error(span: Span, message: impl Into<String>) -> EvalError {
    EvalError::Type {
        span,
        message: message.into(),
    }
}

fn range_error(span: Span, message: impl Into<String>) -> EvalError {
    EvalError::Range {
        span,
        message: message.into(),
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// Property read: `value.key` / `value[key]`.
pub fn get_property(value: &Value, key: &str, span: Span) -> Result<Value, EvalError> {
    Ok(match value {
        Value::Undefined | Value::Null => {
            return Err(type_error(
                span,
                format!(
                    "cannot read properties of {} (reading '{key}')",
                    value.to_js_string()
                ),
            ));
        }
        Value::Object(map) => map.borrow().get(key).cloned().unwrap_or(Value::Undefined),
        Value::Array(items) => {
            if key == "length" {
                Value::Number(items.borrow().len() as f64)
            } else if let Ok(i) = key.parse::<usize>() {
                items.borrow().get(i).cloned().unwrap_or(Value::Undefined)
            } else if let Some(method) = Method::lookup(ARRAY_METHODS, key) {
                bound(method, value)
            } else {
                Value::Undefined
            }
        }
        Value::String(s) => {
            if key == "length" {
                Value::Number(s.encode_utf16().count() as f64)
            } else if let Ok(i) = key.parse::<usize>() {
                code_unit_at(s, i)
            } else if let Some(method) = Method::lookup(STRING_METHODS, key) {
                bound(method, value)
            } else {
                Value::Undefined
            }
        }
        Value::RegExp(re) => match key {
            "source" => Value::string(re.source.as_str()),
            "flags" => Value::string(re.flags.as_str()),
            "global" => Value::Bool(re.global()),
            _ => Method::lookup(REGEXP_METHODS, key).map_or(Value::Undefined, |m| bound(m, value)),
        },
        Value::Bool(_) | Value::Number(_) if key == "toString" => bound(Method::ToString, value),
        Value::Function(f) => match (f.as_ref(), key) {
            (Callable::Builtin(Builtin::Number), "isNaN") => function(Builtin::NumberIsNaN),
            (Callable::Builtin(Builtin::Number), "isFinite") => function(Builtin::NumberIsFinite),
            (Callable::Builtin(Builtin::Number), "isInteger") => function(Builtin::NumberIsInteger),
            (Callable::Builtin(Builtin::Number), "parseFloat") => function(Builtin::ParseFloat),
            (Callable::Builtin(Builtin::Number), "parseInt") => function(Builtin::ParseInt),
            (Callable::Builtin(Builtin::Number), "MAX_SAFE_INTEGER") => {
                Value::Number(9_007_199_254_740_991.0)
            }
            _ => Value::Undefined,
        },
        Value::Bool(_) | Value::Number(_) => Value::Undefined,
    })
}

fn bound(method: Method, this: &Value) -> Value {
    Value::Function(Rc::new(Callable::Method {
        method,
        this: this.clone(),
    }))
}

pub fn call_builtin(
    ev: &mut Evaluator,
    builtin: Builtin,
    args: Vec<Value>,
    span: Span,
) -> Result<Value, EvalError> {
    let first = arg(&args, 0);
    Ok(match builtin {
        Builtin::Boolean => Value::Bool(first.truthy()),
        Builtin::String => Value::String(first.to_js_string()),
        Builtin::Number => Value::Number(first.to_number()),
        Builtin::NumberIsNaN => Value::Bool(matches!(first, Value::Number(n) if n.is_nan())),
        Builtin::NumberIsFinite => Value::Bool(matches!(first, Value::Number(n) if n.is_finite())),
        Builtin::NumberIsInteger => {
            Value::Bool(matches!(first, Value::Number(n) if n.is_finite() && n.trunc() == n))
        }
        Builtin::ParseFloat => Value::Number(parse_float(&first.to_js_string())),
        Builtin::ParseInt => Value::Number(parse_int(&first.to_js_string(), &arg(&args, 1))),
        Builtin::IsNaN => Value::Bool(first.to_number().is_nan()),
        Builtin::IsFinite => Value::Bool(first.to_number().is_finite()),
        Builtin::ArrayIsArray => Value::Bool(matches!(first, Value::Array(_))),
        Builtin::ArrayFrom => {
            let items = match &first {
                Value::Array(items) => items.borrow().clone(),
                Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                Value::Undefined | Value::Null => {
                    return Err(type_error(span, "Array.from expects an iterable"));
                }
                _ => Vec::new(),
            };
            match arg(&args, 1) {
                Value::Undefined => Value::array(items),
                f => {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        out.push(ev.call(&f, vec![item, Value::Number(i as f64)], span)?);
                    }
                    Value::array(out)
                }
            }
        }
        Builtin::ObjectKeys => {
            Value::array(entries(&first, span)?.into_iter().map(|(k, _)| Value::String(k)).collect())
        }
        Builtin::ObjectValues => {
            Value::array(entries(&first, span)?.into_iter().map(|(_, v)| v).collect())
        }
        Builtin::ObjectEntries => Value::array(
            entries(&first, span)?
                .into_iter()
                .map(|(k, v)| Value::array(vec![Value::String(k), v]))
                .collect(),
        ),
        Builtin::ObjectFromEntries => {
            let Value::Array(pairs) = &first else {
                return Err(type_error(span, "Object.fromEntries expects an array of entries"));
            };
            let mut map = Object::new();
            for pair in pairs.borrow().iter() {
                let key = get_property(pair, "0", span)?;
                let value = get_property(pair, "1", span)?;
                map.insert(key.to_js_string(), value);
            }
            Value::object(map)
        }
        Builtin::ObjectAssign => {
            let Value::Object(target) = &first else {
                return Err(type_error(
                    span,
                    format!("Object.assign target must be an object, got {}", first.type_of()),
                ));
            };
            for source in args.iter().skip(1) {
                if !source.is_nullish() {
                    let copied = entries(source, span)?;
                    target.borrow_mut().extend(copied);
                }
            }
            first.clone()
        }
        Builtin::JsonStringify => {
            if !arg(&args, 1).is_nullish() {
                return Err(type_error(span, "JSON.stringify replacers are not supported"));
            }
            match first.to_json() {
                Ok(Some(json)) => Value::String(stringify(&json, &indentation(&arg(&args, 2)))),
                Ok(None) => Value::Undefined,
                Err(circular) => return Err(type_error(span, circular.to_string())),
            }
        }
        Builtin::JsonParse => {
            let text = first.to_js_string();
            let json: Json = serde_json::from_str(&text)
                .map_err(|e| type_error(span, format!("JSON.parse: {e}")))?;
            Value::from_json(&json)
        }
        Builtin::Math(f) => Value::Number(math(f, &args)),
        Builtin::Console(level) => {
            console(ev, level, &args);
            Value::Undefined
        }
    })
}

fn math(f: MathFn, args: &[Value]) -> f64 {
    let x = arg(args, 0).to_number();
    match f {
        MathFn::Floor => x.floor(),
        MathFn::Ceil => x.ceil(),
        // halves round towards +Infinity
        MathFn::Round => (x + 0.5).floor(),
        MathFn::Trunc => x.trunc(),
        MathFn::Abs => x.abs(),
        MathFn::Min | MathFn::Max => {
            let start = if f == MathFn::Min { f64::INFINITY } else { f64::NEG_INFINITY };
            args.iter().map(Value::to_number).fold(start, |acc, n| {
                if acc.is_nan() || n.is_nan() {
                    f64::NAN
                } else if f == MathFn::Min {
                    acc.min(n)
                } else {
                    acc.max(n)
                }
            })
        }
    }
}

/// `space` argument of `JSON.stringify`.
fn indentation(space: &Value) -> String {
    match space {
        Value::Number(n) if *n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    }
}

fn stringify(json: &Json, indent: &str) -> String {
    if indent.is_empty() {
        return json.to_string();
    }
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    match json.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(out).unwrap_or_else(|_| json.to_string()),
        Err(_) => json.to_string(),
    }
}

fn parse_float(text: &str) -> f64 {
    let t = text.trim_start();
    let sign_len = usize::from(t.starts_with(['+', '-']));
    if t[sign_len..].starts_with("Infinity") {
        return if t.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    let bytes = t.as_bytes();
    let mut end = sign_len;
    let (mut digits, mut dot) = (false, false);
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => digits = true,
            b'.' if !dot => dot = true,
            _ => break,
        }
        end += 1;
    }
    if !digits {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut e = end + 1;
        if matches!(bytes.get(e), Some(b'+' | b'-')) {
            e += 1;
        }
        let exponent_start = e;
        while bytes.get(e).is_some_and(u8::is_ascii_digit) {
            e += 1;
        }
        if e > exponent_start {
            end = e;
        }
    }
    t[..end].parse().unwrap_or(f64::NAN)
}

fn parse_int(text: &str, radix: &Value) -> f64 {
    let t = text.trim_start();
    let (negative, mut t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let mut radix = match radix {
        Value::Undefined => 0,
        other => other.to_number() as i64,
    };
    if radix == 0 || radix == 16 {
        if let Some(rest) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
            t = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: Vec<u32> = t.chars().map_while(|c| c.to_digit(radix as u32)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .iter()
        .fold(0.0, |acc, d| acc * radix as f64 + f64::from(*d));
    if negative { -value } else { value }
}

/// Own enumerable entries, as `Object.entries` sees them.
fn entries(value: &Value, span: Span) -> Result<Vec<(String, Value)>, EvalError> {
    Ok(match value {
        Value::Object(map) => map
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::String(s) => s
            .encode_utf16()
            .enumerate()
            .map(|(i, unit)| (i.to_string(), Value::String(String::from_utf16_lossy(&[unit]))))
            .collect(),
        Value::Undefined | Value::Null => {
            return Err(type_error(span, "cannot convert undefined or null to object"));
        }
        _ => Vec::new(),
    })
}

fn console(ev: &Evaluator, level: ConsoleLevel, args: &[Value]) {
    let line = args
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => match v.to_json() {
                Ok(Some(json)) => json.to_string(),
                _ => v.to_js_string(),
            },
            other => other.to_js_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    let source = ev.source_name();
    match level {
        ConsoleLevel::Debug => tracing::debug!(target: "catalog_extract::console", source, "{line}"),
        ConsoleLevel::Info => tracing::info!(target: "catalog_extract::console", source, "{line}"),
        ConsoleLevel::Warn => tracing::warn!(target: "catalog_extract::console", source, "{line}"),
        ConsoleLevel::Error => tracing::error!(target: "catalog_extract::console", source, "{line}"),
    }
}

/// Resolve a relative `start`/`end` argument against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

/// `at(i)`: negative counts from the end; `None` when out of range.
fn at_index(value: &Value, len: usize) -> Option<usize> {
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let i = if n < 0.0 { len as f64 + n } else { n };
    (i >= 0.0 && i < len as f64).then_some(i as usize)
}

pub fn call_method(
    ev: &mut Evaluator,
    method: Method,
    this: &Value,
    args: Vec<Value>,
    span: Span,
) -> Result<Value, EvalError> {
    match this {
        Value::Array(items) => array_method(ev, method, items, args, span),
        Value::String(s) => string_method(ev, method, s, args, span),
        Value::RegExp(re) if method == Method::Test => {
            Ok(Value::Bool(re.regex.is_match(&arg(&args, 0).to_js_string())))
        }
        Value::RegExp(_) | Value::Bool(_) if method == Method::ToString => {
            Ok(Value::String(this.to_js_string()))
        }
        Value::Number(n) if method == Method::ToString => match arg(&args, 0) {
            Value::Undefined => Ok(Value::String(number_to_string(*n))),
            radix if radix.to_number() == 10.0 => Ok(Value::String(number_to_string(*n))),
            _ => Err(range_error(span, "toString radix other than 10 is not supported")),
        },
        other => Err(type_error(
            span,
            format!("{} called on {}", method.name(), other.type_of()),
        )),
    }
}

fn callback(args: &[Value], name: &str, span: Span) -> Result<Value, EvalError> {
    match args.first() {
        Some(f @ Value::Function(_)) => Ok(f.clone()),
        Some(other) => Err(type_error(
            span,
            format!("{} is not a function (argument to {name})", other.to_js_string()),
        )),
        None => Err(type_error(span, format!("undefined is not a function (argument to {name})"))),
    }
}

/// Stable merge sort with a fallible comparator; the first error aborts it.
fn merge_sort<F>(mut items: Vec<Value>, compare: &mut F) -> Result<Vec<Value>, EvalError>
where
    F: FnMut(&Value, &Value) -> Result<Ordering, EvalError>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, compare)?;
    let right = merge_sort(right, compare)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        if compare(b, a)? == Ordering::Less {
            out.extend(right.next());
        } else {
            out.extend(left.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

fn flatten(items: &[Value], depth: f64, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => flatten(&inner.borrow().clone(), depth - 1.0, out),
            other => out.push(other.clone()),
        }
    }
}

fn array_method(
    ev: &mut Evaluator,
    method: Method,
    items: &Rc<RefCell<Vec<Value>>>,
    args: Vec<Value>,
    span: Span,
) -> Result<Value, EvalError> {
    let this = Value::Array(Rc::clone(items));
    let each = |ev: &mut Evaluator, f: &Value, item: &Value, i: usize| {
        ev.call(f, vec![item.clone(), Value::Number(i as f64), this.clone()], span)
    };
    // callbacks may mutate the array; iterate over what it held at the call
    let snapshot = || items.borrow().clone();
    Ok(match method {
        Method::Map => {
            let f = callback(&args, method.name(), span)?;
            let items = snapshot();
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(each(ev, &f, item, i)?);
            }
            Value::array(out)
        }
        Method::Filter => {
            let f = callback(&args, method.name(), span)?;
            let mut out = Vec::new();
            for (i, item) in snapshot().iter().enumerate() {
                if each(ev, &f, item, i)?.truthy() {
                    out.push(item.clone());
                }
            }
            Value::array(out)
        }
        Method::FlatMap => {
            let f = callback(&args, method.name(), span)?;
            let mut out = Vec::new();
            for (i, item) in snapshot().iter().enumerate() {
                match each(ev, &f, item, i)? {
                    Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            Value::array(out)
        }
        Method::Reduce => {
            let f = callback(&args, method.name(), span)?;
            let items = snapshot();
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => {
                        return Err(type_error(span, "reduce of empty array with no initial value"));
                    }
                },
            };
            for (i, item) in iter {
                acc = ev.call(
                    &f,
                    vec![acc, item.clone(), Value::Number(i as f64), this.clone()],
                    span,
                )?;
            }
            acc
        }
        Method::ForEach => {
            let f = callback(&args, method.name(), span)?;
            for (i, item) in snapshot().iter().enumerate() {
                each(ev, &f, item, i)?;
            }
            Value::Undefined
        }
        Method::Find | Method::FindIndex => {
            let f = callback(&args, method.name(), span)?;
            for (i, item) in snapshot().iter().enumerate() {
                if each(ev, &f, item, i)?.truthy() {
                    return Ok(if method == Method::Find {
                        item.clone()
                    } else {
                        Value::Number(i as f64)
                    });
                }
            }
            if method == Method::Find {
                Value::Undefined
            } else {
                Value::Number(-1.0)
            }
        }
        Method::Some => {
            let f = callback(&args, method.name(), span)?;
            for (i, item) in snapshot().iter().enumerate() {
                if each(ev, &f, item, i)?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Value::Bool(false)
        }
        Method::Every => {
            let f = callback(&args, method.name(), span)?;
            for (i, item) in snapshot().iter().enumerate() {
                if !each(ev, &f, item, i)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Value::Bool(true)
        }
        Method::Sort => {
            let compare = match arg(&args, 0) {
                Value::Undefined => None,
                f @ Value::Function(_) => Some(f),
                _ => {
                    return Err(type_error(
                        span,
                        "the comparison function must be either a function or undefined",
                    ));
                }
            };
            // undefined sorts last without reaching the comparator
            let (defined, undefined): (Vec<Value>, Vec<Value>) = snapshot()
                .into_iter()
                .partition(|v| !matches!(v, Value::Undefined));
            let mut sorted = merge_sort(defined, &mut |a: &Value, b: &Value| match &compare {
                Some(f) => {
                    let n = ev.call(f, vec![a.clone(), b.clone()], span)?.to_number();
                    Ok(if n < 0.0 {
                        Ordering::Less
                    } else if n > 0.0 {
                        Ordering::Greater
                    } else {
                        Ordering::Equal
                    })
                }
                None => Ok(compare_strings(&a.to_js_string(), &b.to_js_string())),
            })?;
            sorted.extend(undefined);
            *items.borrow_mut() = sorted;
            Value::Array(Rc::clone(items))
        }
        Method::Reverse => {
            items.borrow_mut().reverse();
            Value::Array(Rc::clone(items))
        }
        Method::Push => {
            let mut items = items.borrow_mut();
            items.extend(args);
            Value::Number(items.len() as f64)
        }
        Method::Pop => items.borrow_mut().pop().unwrap_or(Value::Undefined),
        Method::Shift => {
            let mut items = items.borrow_mut();
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        }
        Method::Unshift => {
            let mut items = items.borrow_mut();
            items.splice(0..0, args);
            Value::Number(items.len() as f64)
        }
        Method::Includes => {
            let needle = arg(&args, 0);
            Value::Bool(items.borrow().iter().any(|v| v.same_value_zero(&needle)))
        }
        Method::IndexOf => {
            let needle = arg(&args, 0);
            Value::Number(
                items
                    .borrow()
                    .iter()
                    .position(|v| v.strict_eq(&needle))
                    .map_or(-1.0, |i| i as f64),
            )
        }
        Method::Join | Method::ToString => {
            let sep = match arg(&args, 0) {
                Value::Undefined => ",".to_string(),
                _ if method == Method::ToString => ",".to_string(),
                other => other.to_js_string(),
            };
            let items = snapshot();
            Value::String(
                items
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_js_string() })
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        Method::At => {
            let items = items.borrow();
            at_index(&arg(&args, 0), items.len())
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Undefined)
        }
        Method::Slice => {
            let items = items.borrow();
            let start = relative_index(&arg(&args, 0), items.len(), 0);
            let end = relative_index(&arg(&args, 1), items.len(), items.len());
            Value::array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
        }
        Method::Concat => {
            let mut out = snapshot();
            for extra in args {
                match extra {
                    Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            Value::array(out)
        }
        Method::Flat => {
            let depth = match arg(&args, 0) {
                Value::Undefined => 1.0,
                other => other.to_number(),
            };
            let mut out = Vec::new();
            flatten(&snapshot(), if depth.is_nan() { 0.0 } else { depth }, &mut out);
            Value::array(out)
        }
        _ => {
            return Err(type_error(
                span,
                format!("{} is not an array method", method.name()),
            ));
        }
    })
}

fn repeat_checked(s: &str, count: f64, span: Span) -> Result<String, EvalError> {
    if !count.is_finite() {
        return Err(range_error(
            span,
            format!("invalid count value: {}", number_to_string(count)),
        ));
    }
    let count = count.trunc() as i64;
    if count > 0 && s.len().saturating_mul(count as usize) > MAX_STRING_LEN {
        return Err(range_error(span, "invalid string length"));
    }
    guard::repeat(s, count).map_err(|e| range_error(span, e.to_string()))
}

/// Filler for `padStart`/`padEnd`, measured in UTF-16 code units.
fn padding(s: &str, args: &[Value], span: Span) -> Result<String, EvalError> {
    let target = arg(args, 0).to_number();
    let fill: Vec<u16> = match arg(args, 1) {
        Value::Undefined => vec![u16::from(b' ')],
        other => other.to_js_string().encode_utf16().collect(),
    };
    let current = s.encode_utf16().count();
    if fill.is_empty() || target.is_nan() || target <= current as f64 {
        return Ok(String::new());
    }
    // also rejects Infinity, which would otherwise saturate to usize::MAX
    if target > MAX_STRING_LEN as f64 {
        return Err(range_error(span, "invalid string length"));
    }
    let needed = (target as usize).checked_sub(current).unwrap_or_default();
    let units: Vec<u16> = fill.iter().copied().cycle().take(needed).collect();
    Ok(String::from_utf16_lossy(&units))
}

/// The code unit at `i` as a one-unit string. Half of a surrogate pair has
/// no `String` form and reads as U+FFFD.
fn code_unit_at(s: &str, i: usize) -> Value {
    s.encode_utf16()
        .nth(i)
        .map_or(Value::Undefined, |unit| Value::String(String::from_utf16_lossy(&[unit])))
}

/// Position of `needle` in `haystack`, in code units, starting at `from`.
fn find_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return needle.is_empty().then_some(haystack.len());
    }
    (from..=haystack.len().saturating_sub(needle.len()))
        .find(|&i| haystack[i..].starts_with(needle))
}

/// UTF-16 offset of a byte offset.
fn units_before(s: &str, byte: usize) -> usize {
    s[..byte].encode_utf16().count()
}

/// A single match: whole span and capture groups, as byte ranges.
struct Found {
    start: usize,
    end: usize,
    groups: Vec<Option<(usize, usize)>>,
}

fn regex_matches(re: &RegexLiteral, s: &str, all: bool) -> Vec<Found> {
    let found = |caps: regex::Captures<'_>| {
        let whole = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
        Found {
            start: whole.0,
            end: whole.1,
            groups: caps
                .iter()
                .skip(1)
                .map(|g| g.map(|m| (m.start(), m.end())))
                .collect(),
        }
    };
    if all {
        re.regex.captures_iter(s).map(found).collect()
    } else {
        re.regex.captures(s).map(found).into_iter().collect()
    }
}

fn text_matches(s: &str, needle: &str, all: bool) -> Vec<Found> {
    let found = |(start, m): (usize, &str)| Found {
        start,
        end: start + m.len(),
        groups: Vec::new(),
    };
    if all {
        s.match_indices(needle).map(found).collect()
    } else {
        s.match_indices(needle).take(1).map(found).collect()
    }
}

/// Expand `$$ $& $` $' $n $nn` in a replacement string.
fn expand_replacement(template: &str, s: &str, m: &Found, out: &mut String) {
    let chars: Vec<char> = template.chars().collect();
    let group = |n: usize| m.groups.get(n.wrapping_sub(1)).copied();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '$' || i + 1 == chars.len() {
            out.push(c);
            i += 1;
            continue;
        }
        match chars[i + 1] {
            '$' => out.push('$'),
            '&' => out.push_str(&s[m.start..m.end]),
            '`' => out.push_str(&s[..m.start]),
            '\'' => out.push_str(&s[m.end..]),
            d if d.is_ascii_digit() => {
                let one = d.to_digit(10).unwrap_or_default() as usize;
                let two = chars
                    .get(i + 2)
                    .and_then(|c| c.to_digit(10))
                    .map(|d2| one * 10 + d2 as usize);
                let (n, used) = match two {
                    Some(n) if group(n).is_some() => (n, 3),
                    _ => (one, 2),
                };
                match group(n) {
                    Some(range) => {
                        if let Some((a, b)) = range {
                            out.push_str(&s[a..b]);
                        }
                    }
                    None => out.extend(&chars[i..i + used]),
                }
                i += used;
                continue;
            }
            other => {
                out.push('$');
                out.push(other);
            }
        }
        i += 2;
    }
}

fn replace_matches(
    ev: &mut Evaluator,
    s: &str,
    found: &[Found],
    replacement: &Value,
    span: Span,
) -> Result<String, EvalError> {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for m in found {
        out.push_str(&s[last..m.start]);
        match replacement {
            Value::Function(_) => {
                let mut args = vec![Value::string(&s[m.start..m.end])];
                args.extend(
                    m.groups
                        .iter()
                        .map(|g| g.map_or(Value::Undefined, |(a, b)| Value::string(&s[a..b]))),
                );
                args.push(Value::Number(units_before(s, m.start) as f64));
                args.push(Value::string(s));
                out.push_str(&ev.call(replacement, args, span)?.to_js_string());
            }
            other => expand_replacement(&other.to_js_string(), s, m, &mut out),
        }
        last = m.end;
    }
    out.push_str(&s[last..]);
    Ok(out)
}

/// The regular expression for `match`/`search`: a string argument is
/// compiled as a pattern.
fn pattern_of(value: &Value, span: Span) -> Result<Rc<RegexLiteral>, EvalError> {
    match value {
        Value::RegExp(re) => Ok(Rc::clone(re)),
        other => {
            let source = match other {
                Value::Undefined => String::new(),
                other => other.to_js_string(),
            };
            regexp::compile(&source, "")
                .map(Rc::new)
                .map_err(|message| type_error(span, message))
        }
    }
}

fn split(s: &str, separator: &Value, limit: &Value) -> Value {
    let limit = match limit {
        Value::Undefined => usize::MAX,
        other => {
            let n = other.to_number();
            if n.is_nan() || n <= 0.0 { 0 } else { n.min(f64::from(u32::MAX)) as usize }
        }
    };
    let mut out: Vec<Value> = match separator {
        Value::Undefined => vec![Value::string(s)],
        Value::RegExp(re) => {
            if s.is_empty() {
                if re.regex.is_match(s) { Vec::new() } else { vec![Value::string(s)] }
            } else {
                let mut out = Vec::new();
                let mut last = 0;
                for m in regex_matches(re, s, true) {
                    // empty matches at the current split point or at the end
                    // do not split
                    if m.start == m.end && (m.start == last || m.start >= s.len()) {
                        continue;
                    }
                    out.push(Value::string(&s[last..m.start]));
                    out.extend(
                        m.groups
                            .iter()
                            .map(|g| g.map_or(Value::Undefined, |(a, b)| Value::string(&s[a..b]))),
                    );
                    last = m.end;
                }
                out.push(Value::string(&s[last..]));
                out
            }
        }
        other => {
            let sep = other.to_js_string();
            if sep.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::string).collect()
            }
        }
    };
    out.truncate(limit);
    Value::array(out)
}

fn string_method(
    ev: &mut Evaluator,
    method: Method,
    s: &str,
    args: Vec<Value>,
    span: Span,
) -> Result<Value, EvalError> {
    let text = |i: usize| arg(&args, i).to_js_string();
    let units = || s.encode_utf16().collect::<Vec<u16>>();
    Ok(match method {
        Method::Trim => Value::string(s.trim()),
        Method::TrimStart => Value::string(s.trim_start()),
        Method::TrimEnd => Value::string(s.trim_end()),
        Method::StartsWith => Value::Bool(s.starts_with(&text(0))),
        Method::EndsWith => Value::Bool(s.ends_with(&text(0))),
        Method::Includes => Value::Bool(s.contains(&text(0))),
        Method::IndexOf => {
            let haystack = units();
            let needle: Vec<u16> = text(0).encode_utf16().collect();
            let from = relative_index(&arg(&args, 1), haystack.len(), 0);
            Value::Number(find_units(&haystack, &needle, from).map_or(-1.0, |i| i as f64))
        }
        Method::ToLowerCase => Value::String(s.to_lowercase()),
        Method::ToUpperCase => Value::String(s.to_uppercase()),
        Method::ToString => Value::string(s),
        Method::LocaleCompare => {
            let other = text(0);
            // case folds first, then code units break ties
            let ordering = compare_strings(&s.to_lowercase(), &other.to_lowercase())
                .then_with(|| compare_strings(s, &other));
            Value::Number(match ordering {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            })
        }
        Method::Split => split(s, &arg(&args, 0), &arg(&args, 1)),
        Method::Replace | Method::ReplaceAll => {
            let found = match arg(&args, 0) {
                Value::RegExp(re) => {
                    if method == Method::ReplaceAll && !re.global() {
                        return Err(type_error(
                            span,
                            "replaceAll must be called with a global RegExp",
                        ));
                    }
                    regex_matches(&re, s, re.global())
                }
                pattern => text_matches(s, &pattern.to_js_string(), method == Method::ReplaceAll),
            };
            Value::String(replace_matches(ev, s, &found, &arg(&args, 1), span)?)
        }
        Method::Match => {
            let re = pattern_of(&arg(&args, 0), span)?;
            let found = regex_matches(&re, s, re.global());
            if found.is_empty() {
                Value::Null
            } else if re.global() {
                Value::array(found.iter().map(|m| Value::string(&s[m.start..m.end])).collect())
            } else {
                let m = &found[0];
                let mut out = vec![Value::string(&s[m.start..m.end])];
                out.extend(
                    m.groups
                        .iter()
                        .map(|g| g.map_or(Value::Undefined, |(a, b)| Value::string(&s[a..b]))),
                );
                Value::array(out)
            }
        }
        Method::Search => {
            let re = pattern_of(&arg(&args, 0), span)?;
            Value::Number(
                re.regex
                    .find(s)
                    .map_or(-1.0, |m| units_before(s, m.start()) as f64),
            )
        }
        Method::Slice => {
            let units = units();
            let start = relative_index(&arg(&args, 0), units.len(), 0);
            let end = relative_index(&arg(&args, 1), units.len(), units.len());
            Value::String(String::from_utf16_lossy(&units[start..end.max(start)]))
        }
        Method::Substring => {
            let units = units();
            let clamp = |v: &Value, default: usize| match v {
                Value::Undefined => default,
                v => {
                    let n = v.to_number();
                    if n.is_nan() || n < 0.0 { 0 } else { n.min(units.len() as f64) as usize }
                }
            };
            let a = clamp(&arg(&args, 0), 0);
            let b = clamp(&arg(&args, 1), units.len());
            Value::String(String::from_utf16_lossy(&units[a.min(b)..a.max(b)]))
        }
        Method::At => {
            let units = units();
            at_index(&arg(&args, 0), units.len())
                .map_or(Value::Undefined, |i| Value::String(String::from_utf16_lossy(&units[i..=i])))
        }
        Method::Concat => {
            let mut out = s.to_string();
            for extra in &args {
                out.push_str(&extra.to_js_string());
            }
            Value::String(out)
        }
        Method::Repeat => Value::String(repeat_checked(s, arg(&args, 0).to_number(), span)?),
        Method::PadStart => Value::String(format!("{}{s}", padding(s, &args, span)?)),
        Method::PadEnd => Value::String(format!("{s}{}", padding(s, &args, span)?)),
        _ => {
            return Err(type_error(
                span,
                format!("{} is not a string method", method.name()),
            ));
        }
    })
}
