//! Declarative handler signatures.
//!
//! Rust has no runtime reflection over function parameters, so every
//! handler action declares the parameters it takes as a signature string,
//! written the way the parameters would read in a function header:
//!
//! ```text
//! "name: str, flag: bool = false, limit: int = 10"
//! ```
//!
//! The string is parsed once, when the route is registered. A parameter
//! without a type, with an unknown type, or with a default that does not fit
//! its type is rejected right there, so a bad route never gets bound. At
//! request time the parsed [`Signature`] validates the merged query and path
//! parameters.

use serde::Serialize;
use uuid::Uuid;

use crate::params::{Params, Value};

/// The type of a signature parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Str,
    Int,
    Float,
    Bool,
    Uuid,
}

impl Kind {
    fn from_annotation(annotation: &str) -> Option<Self> {
        match annotation {
            "str" | "path" => Some(Self::Str),
            "int"   => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool"  => Some(Self::Bool),
            "uuid"  => Some(Self::Uuid),
            _ => None,
        }
    }

    /// Coerces `value` into this kind, or returns the `(msg, type)` pair
    /// reported to the client.
    fn coerce(self, value: &Value) -> Result<Value, (&'static str, &'static str)> {
        match (self, value) {
            (Self::Str, Value::Str(_)) => Ok(value.clone()),
            (Self::Str, other) => Ok(Value::Str(other.to_string())),

            (Self::Int, Value::Int(_)) => Ok(value.clone()),
            (Self::Int, Value::Str(s)) => s.trim().parse().map(Value::Int)
                .map_err(|_| ("value is not a valid integer", "type_error.integer")),
            (Self::Int, _) => Err(("value is not a valid integer", "type_error.integer")),

            (Self::Float, Value::Float(_)) => Ok(value.clone()),
            (Self::Float, Value::Int(n)) => Ok(Value::Float(*n as f64)),
            (Self::Float, Value::Str(s)) => s.trim().parse().map(Value::Float)
                .map_err(|_| ("value is not a valid float", "type_error.float")),
            (Self::Float, _) => Err(("value is not a valid float", "type_error.float")),

            (Self::Bool, Value::Bool(_)) => Ok(value.clone()),
            (Self::Bool, Value::Int(0)) => Ok(Value::Bool(false)),
            (Self::Bool, Value::Int(1)) => Ok(Value::Bool(true)),
            (Self::Bool, Value::Str(s)) => parse_bool(s).map(Value::Bool)
                .ok_or(("value could not be parsed to a boolean", "type_error.bool")),
            (Self::Bool, _) => Err(("value could not be parsed to a boolean", "type_error.bool")),

            (Self::Uuid, Value::Uuid(_)) => Ok(value.clone()),
            (Self::Uuid, Value::Str(s)) => Uuid::parse_str(s.trim()).map(Value::Uuid)
                .map_err(|_| ("value is not a valid uuid", "type_error.uuid")),
            (Self::Uuid, _) => Err(("value is not a valid uuid", "type_error.uuid")),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// One declared parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: Kind,
    /// `None` marks the parameter required.
    pub default: Option<Value>,
}

/// A field-level validation failure, serialised into the 400 body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    fn new(name: &str, msg: &str, kind: &str) -> Self {
        Self { loc: vec![name.to_owned()], msg: msg.to_owned(), kind: kind.to_owned() }
    }
}

/// The ordered parameter schema of one handler action.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Signature {
    fields: Vec<Field>,
}

impl Signature {
    /// Parses a signature string. The error is a human-readable reason; the
    /// caller attaches the endpoint name.
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut fields: Vec<Field> = Vec::new();

        for decl in split_params(source) {
            let decl = decl.trim();
            if decl.is_empty() {
                continue;
            }

            let (head, default) = match decl.split_once('=') {
                Some((head, default)) => (head.trim(), Some(default.trim())),
                None => (decl, None),
            };
            let Some((name, annotation)) = head.split_once(':') else {
                return Err(format!("attribute type ({head}) not specified"));
            };
            let (name, annotation) = (name.trim(), annotation.trim());

            if !is_identifier(name) {
                return Err(format!("`{name}` is not a valid parameter name"));
            }
            if fields.iter().any(|f| f.name == name) {
                return Err(format!("parameter `{name}` declared twice"));
            }
            if annotation.is_empty() {
                return Err(format!("attribute type ({name}) not specified"));
            }
            let Some(kind) = Kind::from_annotation(annotation) else {
                return Err(format!("unsupported type `{annotation}` for parameter `{name}`"));
            };
            let default = match default {
                Some(raw) => Some(
                    kind.coerce(&Value::Str(unquote(raw).to_owned()))
                        .map_err(|(msg, _)| format!("default for `{name}`: {msg}"))?,
                ),
                None => None,
            };

            fields.push(Field { name: name.to_owned(), kind, default });
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Builds the argument mapping for one request.
    ///
    /// Query parameters are laid down first and path parameters overlay
    /// them, so a path parameter wins a name collision. Only declared
    /// fields are kept; every error is collected, not just the first.
    pub fn validate(
        &self,
        query: &[(String, String)],
        path_params: &Params,
    ) -> Result<Params, Vec<FieldError>> {
        let mut params = Params::new();
        let mut errors = Vec::new();

        for field in &self.fields {
            let raw = match path_params.value(&field.name) {
                Some(value) => Some(value.clone()),
                None => query.iter().rev()
                    .find(|(k, _)| *k == field.name)
                    .map(|(_, v)| Value::Str(v.clone())),
            };

            match (raw, &field.default) {
                (Some(value), _) => match field.kind.coerce(&value) {
                    Ok(value) => params.insert(field.name.clone(), value),
                    Err((msg, kind)) => errors.push(FieldError::new(&field.name, msg, kind)),
                },
                (None, Some(default)) => params.insert(field.name.clone(), default.clone()),
                (None, None) => errors.push(FieldError::new(
                    &field.name,
                    "field required",
                    "value_error.missing",
                )),
            }
        }

        if errors.is_empty() { Ok(params) } else { Err(errors) }
    }
}

/// Splits on commas that are not inside a quoted default.
fn split_params(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut start = 0;
    for (i, c) in source.char_indices() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            (',', None) => {
                parts.push(&source[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&source[start..]);
    parts
}

fn unquote(raw: &str) -> &str {
    for q in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn parses_required_and_optional() {
        let sig = Signature::parse("name: str, flag: bool = false, tag: str = 'a,b'").unwrap();
        let fields = sig.fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], Field { name: "name".into(), kind: Kind::Str, default: None });
        assert_eq!(fields[1].default, Some(Value::Bool(false)));
        assert_eq!(fields[2].default, Some(Value::Str("a,b".into())));
    }

    #[test]
    fn empty_signature() {
        assert!(Signature::parse("").unwrap().fields().is_empty());
        assert!(Signature::parse("  ").unwrap().fields().is_empty());
    }

    #[test]
    fn rejects_missing_annotation() {
        let err = Signature::parse("param").unwrap_err();
        assert!(err.contains("not specified"), "{err}");
        assert!(Signature::parse("param: = 1").is_err());
    }

    #[test]
    fn rejects_unknown_type_and_bad_default() {
        assert!(Signature::parse("param: HttpView = 1").is_err());
        assert!(Signature::parse("n: int = many").is_err());
        assert!(Signature::parse("a: int, a: str").is_err());
    }

    #[test]
    fn validates_and_coerces_query() {
        let sig = Signature::parse("name: str, flag: bool = false").unwrap();

        let params = sig.validate(&query(&[("name", "Alice")]), &Params::new()).unwrap();
        assert_eq!(params.get::<String>("name").as_deref(), Some("Alice"));
        assert_eq!(params.get::<bool>("flag"), Some(false));

        let params = sig
            .validate(&query(&[("name", "Alice"), ("flag", "1"), ("extra", "x")]), &Params::new())
            .unwrap();
        assert_eq!(params.get::<bool>("flag"), Some(true));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn reports_every_error() {
        let sig = Signature::parse("name: str, n: int").unwrap();
        let errors = sig.validate(&query(&[("n", "x")]), &Params::new()).unwrap_err();
        assert_eq!(
            errors,
            [
                FieldError::new("name", "field required", "value_error.missing"),
                FieldError::new("n", "value is not a valid integer", "type_error.integer"),
            ]
        );
        let body = serde_json::to_value(&errors[0]).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"loc": ["name"], "msg": "field required", "type": "value_error.missing"})
        );
    }

    #[test]
    fn path_params_overlay_query() {
        let sig = Signature::parse("id: int").unwrap();
        let path: Params = [("id", Value::Int(7))].into_iter().collect();
        let params = sig.validate(&query(&[("id", "9")]), &path).unwrap();
        assert_eq!(params.get::<i64>("id"), Some(7));
    }

    #[test]
    fn float_accepts_integer_path_param() {
        let sig = Signature::parse("ratio: float").unwrap();
        let path: Params = [("ratio", Value::Int(2))].into_iter().collect();
        let params = sig.validate(&[], &path).unwrap();
        assert_eq!(params.get::<f64>("ratio"), Some(2.0));
        assert_eq!(params.get::<i64>("ratio"), None);
    }
}
