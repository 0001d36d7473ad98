//! Asset-helper resolution for declarative (`.json` / `.toml`) sources.
//!
//! Plain data files cannot call functions, so a helper call is written as a
//! one-key object:
//!
//! ```json
//! { "image": { "$call": ["buildAminaUrl", "edge/hero.webp"] } }
//! ```
//!
//! [`resolve`] replaces every such object with the result of the named stub,
//! exactly as the evaluator would for `buildAminaUrl("edge/hero.webp")` in a
//! TypeScript source. Arguments are resolved first, so calls may nest.

use crate::neutralize::{Stub, StubTable};
use serde_json::{Map, Value as Json};
use thiserror::Error;

/// Key marking a helper call in a data file.
pub const CALL_KEY: &str = "$call";

#[derive(Error, Debug, PartialEq)]
pub enum ResolveError {
    #[error("{path}: `$call` must be an array starting with a helper name")]
    Malformed { path: String },
    #[error("{path}: no stub for helper '{name}'")]
    MissingStub { path: String, name: String },
    #[error("{path}: '{name}' is a {kind} stub and cannot be called")]
    NotCallable {
        path: String,
        name: String,
        kind: &'static str,
    },
}

/// The call target and arguments, when `map` is a `$call` object.
fn as_call(map: &Map<String, Json>) -> Option<&Json> {
    if map.len() == 1 {
        map.get(CALL_KEY)
    } else {
        None
    }
}

/// Replace every `$call` object in `value` using `stubs`.
pub fn resolve(value: Json, stubs: &StubTable) -> Result<Json, ResolveError> {
    resolve_at(value, stubs, "$")
}

fn resolve_at(value: Json, stubs: &StubTable, path: &str) -> Result<Json, ResolveError> {
    match value {
        Json::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| resolve_at(item, stubs, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        Json::Object(map) => {
            if let Some(call) = as_call(&map) {
                return call_stub(call.clone(), stubs, path);
            }
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                let resolved = resolve_at(item, stubs, &format!("{path}.{key}"))?;
                out.insert(key, resolved);
            }
            Ok(Json::Object(out))
        }
        other => Ok(other),
    }
}

fn call_stub(call: Json, stubs: &StubTable, path: &str) -> Result<Json, ResolveError> {
    let malformed = || ResolveError::Malformed {
        path: path.to_string(),
    };
    let Json::Array(mut parts) = call else {
        return Err(malformed());
    };
    if parts.is_empty() {
        return Err(malformed());
    }
    let Json::String(name) = parts.remove(0) else {
        return Err(malformed());
    };
    let mut args = Vec::with_capacity(parts.len());
    for (i, arg) in parts.into_iter().enumerate() {
        args.push(resolve_at(arg, stubs, &format!("{path}.{CALL_KEY}[{}]", i + 1))?);
    }
    let first = args.into_iter().next().unwrap_or(Json::Null);
    match stubs.get(&name) {
        Some(Stub::PassThrough) => Ok(first),
        Some(Stub::Prefix { prefix }) => {
            let text = match first {
                Json::String(s) => s,
                other => other.to_string(),
            };
            Ok(Json::String(format!("{prefix}{text}")))
        }
        Some(stub) => Err(ResolveError::NotCallable {
            path: path.to_string(),
            name,
            kind: stub.kind(),
        }),
        None => Err(ResolveError::MissingStub {
            path: path.to_string(),
            name,
        }),
    }
}

/// Helper names called anywhere in `value`, in first-seen order.
pub fn called_helpers(value: &Json) -> Vec<String> {
    let mut names = Vec::new();
    collect_calls(value, &mut names);
    names
}

fn collect_calls(value: &Json, names: &mut Vec<String>) {
    match value {
        Json::Array(items) => items.iter().for_each(|item| collect_calls(item, names)),
        Json::Object(map) => {
            if let Some(Json::Array(parts)) = as_call(map) {
                if let Some(Json::String(name)) = parts.first()
                    && !names.contains(name)
                {
                    names.push(name.clone());
                }
                parts.iter().skip(1).for_each(|arg| collect_calls(arg, names));
            } else {
                map.values().for_each(|item| collect_calls(item, names));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stubs() -> StubTable {
        StubTable::pass_through(["buildAminaUrl"]).with(
            "buildCdnUrl",
            Stub::Prefix {
                prefix: "https://cdn.example/".into(),
            },
        )
    }

    #[test]
    fn replaces_calls_in_nested_records() {
        let data = json!({
            "aminaProducts": [
                {"name": "Edge 5", "image": {"$call": ["buildAminaUrl", "edge/5.webp"]}},
                {"name": "ALF", "gallery": [{"$call": ["buildCdnUrl", "alf.webp"]}]}
            ]
        });
        let out = resolve(data, &stubs()).unwrap();
        assert_eq!(
            out,
            json!({
                "aminaProducts": [
                    {"name": "Edge 5", "image": "edge/5.webp"},
                    {"name": "ALF", "gallery": ["https://cdn.example/alf.webp"]}
                ]
            })
        );
    }

    #[test]
    fn nested_calls_resolve_inside_out() {
        let data = json!({"$call": ["buildCdnUrl", {"$call": ["buildAminaUrl", "x.png"]}]});
        assert_eq!(resolve(data, &stubs()).unwrap(), json!("https://cdn.example/x.png"));
    }

    #[test]
    fn objects_with_extra_keys_are_plain_data() {
        let data = json!({"$call": ["buildAminaUrl", "a"], "note": "kept"});
        assert_eq!(resolve(data.clone(), &stubs()).unwrap(), data);
    }

    #[test]
    fn missing_stub_reports_the_path() {
        let data = json!({"items": [{"image": {"$call": ["buildOtherUrl", "a"]}}]});
        assert_eq!(
            resolve(data, &stubs()).unwrap_err(),
            ResolveError::MissingStub {
                path: "$.items[0].image".into(),
                name: "buildOtherUrl".into(),
            }
        );
    }

    #[test]
    fn malformed_and_uncallable_calls_are_errors() {
        assert!(matches!(
            resolve(json!({"$call": "buildAminaUrl"}), &stubs()),
            Err(ResolveError::Malformed { .. })
        ));
        assert!(matches!(
            resolve(json!({"$call": [1, "a"]}), &stubs()),
            Err(ResolveError::Malformed { .. })
        ));
        let constant = StubTable::new().with("SITE", Stub::Constant { value: json!("x") });
        assert_eq!(
            resolve(json!({"$call": ["SITE"]}), &constant).unwrap_err().to_string(),
            "$: 'SITE' is a constant stub and cannot be called"
        );
    }

    #[test]
    fn lists_called_helpers_once() {
        let data = json!([
            {"a": {"$call": ["buildAminaUrl", "1"]}},
            {"b": {"$call": ["buildCdnUrl", {"$call": ["buildAminaUrl", "2"]}]}}
        ]);
        assert_eq!(called_helpers(&data), vec!["buildAminaUrl", "buildCdnUrl"]);
    }
}
