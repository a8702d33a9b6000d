//! Shape checks applied to request bodies and ids before any store call.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, ServiceError};

static UUID_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

pub const BODY_UNDEFINED: &str = "body was undefined";
pub const ID_NOT_STRING: &str = "id was not a string";
pub const ID_BAD_FORMAT: &str = "id did not match expected format";

/// Decode raw request bytes. An empty (or all-whitespace) body is `None`.
pub fn parse_body(bytes: &[u8]) -> Result<Option<Value>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| ServiceError::bad_request(format!("body was not valid JSON: {e}")))
}

/// The body as a JSON object, or the matching `BadRequest`.
pub fn require_object(body: Option<Value>) -> Result<Map<String, Value>> {
    match body {
        None => Err(ServiceError::bad_request(BODY_UNDEFINED)),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(ServiceError::bad_request(format!(
            "body was not an object, got {}",
            type_name(&other)
        ))),
    }
}

/// Parse an id in canonical lowercase hyphenated UUID form.
pub fn parse_id(raw: &str) -> Result<Uuid> {
    if !UUID_FORMAT.is_match(raw) {
        return Err(ServiceError::bad_request(ID_BAD_FORMAT));
    }
    Uuid::parse_str(raw).map_err(|_| ServiceError::bad_request(ID_BAD_FORMAT))
}

/// Check an `id` carried in a body. When `expected` is given, a well-formed
/// id naming a different record is a `Conflict`.
pub fn check_body_id(body: &Map<String, Value>, expected: Option<Uuid>) -> Result<Option<Uuid>> {
    let Some(raw) = body.get("id") else {
        return Ok(None);
    };
    let Value::String(raw) = raw else {
        return Err(ServiceError::bad_request(ID_NOT_STRING));
    };

    let id = parse_id(raw)?;
    match expected {
        Some(expected) if expected != id => Err(ServiceError::Conflict(format!(
            "body id {id} does not match path id {expected}"
        ))),
        _ => Ok(Some(id)),
    }
}

// ---------------------------------------------------------------------------
// Structural schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// Any finite JSON number.
    Number,
    /// A JSON number with no fractional part.
    Integer,
    Boolean,
    Object,
    StringArray,
    IntegerArray,
    /// An array of ids in canonical UUID form.
    IdArray,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => is_integer(value),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::IntegerArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(is_integer)),
            Self::IdArray => value.as_array().is_some_and(|items| {
                items
                    .iter()
                    .all(|item| item.as_str().is_some_and(|s| UUID_FORMAT.is_match(s)))
            }),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Number => "a number",
            Self::Integer => "an integer",
            Self::Boolean => "a boolean",
            Self::Object => "an object",
            Self::StringArray => "an array of strings",
            Self::IntegerArray => "an array of integers",
            Self::IdArray => "an array of ids",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: true }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: false }
    }
}

/// Every structural violation of `body` against `fields`, in field order
/// followed by unexpected properties.
pub fn violations(body: &Map<String, Value>, fields: &[Field]) -> Vec<String> {
    let mut out = Vec::new();

    for field in fields {
        match body.get(field.name) {
            None if field.required => out.push(format!("{} is required", field.name)),
            None => {}
            Some(value) if !field.kind.accepts(value) => out.push(format!(
                "{} must be {}, got {}",
                field.name,
                field.kind.describe(),
                type_name(value)
            )),
            Some(_) => {}
        }
    }

    let mut unexpected: Vec<&String> = body
        .keys()
        .filter(|key| fields.iter().all(|f| f.name != key.as_str()))
        .collect();
    unexpected.sort();
    out.extend(unexpected.into_iter().map(|key| format!("{key} is not an allowed property")));

    out
}

/// Schema-check `body` then decode it into `T`.
pub fn decode<T: DeserializeOwned>(
    what: &str,
    body: Map<String, Value>,
    fields: &[Field],
) -> Result<T> {
    let found = violations(&body, fields);
    if !found.is_empty() {
        return Err(ServiceError::invalid(format!("{what} failed schema validation"), found));
    }
    serde_json::from_value(Value::Object(body)).map_err(|e| {
        ServiceError::invalid(format!("{what} failed schema validation"), vec![e.to_string()])
    })
}

/// `BadRequest` if `found` is non-empty.
pub fn ensure_valid(what: &str, found: Vec<String>) -> Result<()> {
    if found.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::invalid(format!("{what} is invalid"), found))
    }
}

fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

/// JSON type name of `value` as reported in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const FIELDS: &[Field] = &[
        Field::required("name", FieldKind::String),
        Field::required("targetTemperature", FieldKind::Integer),
        Field::optional("currentTemperature", FieldKind::Number),
        Field::optional("startTime", FieldKind::StringArray),
        Field::optional("trvsAppliedOn", FieldKind::IdArray),
    ];

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn message(err: ServiceError) -> String {
        match err {
            ServiceError::BadRequest { message, .. } => message,
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_is_undefined() {
        assert!(parse_body(b"").unwrap().is_none());
        assert!(parse_body(b"  \n").unwrap().is_none());
        assert_eq!(message(require_object(None).unwrap_err()), BODY_UNDEFINED);
    }

    #[test]
    fn malformed_json_is_bad_request() {
        let err = parse_body(b"{ nope").unwrap_err();
        assert!(message(err).starts_with("body was not valid JSON"));
    }

    #[test]
    fn non_object_body_names_its_type() {
        let body = parse_body(br#""a string""#).unwrap();
        assert_eq!(
            message(require_object(body).unwrap_err()),
            "body was not an object, got string"
        );
        assert_eq!(
            message(require_object(Some(json!([1]))).unwrap_err()),
            "body was not an object, got array"
        );
    }

    #[test]
    fn parse_id_accepts_canonical_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn parse_id_rejects_other_shapes() {
        let upper = Uuid::new_v4().to_string().to_uppercase();
        let simple = Uuid::new_v4().simple().to_string();
        for raw in [upper.as_str(), simple.as_str(), "42", ""] {
            assert_eq!(message(parse_id(raw).unwrap_err()), ID_BAD_FORMAT, "{raw:?}");
        }
    }

    #[test]
    fn body_id_must_be_a_string() {
        let body = object(json!({ "id": 7 }));
        assert_eq!(message(check_body_id(&body, None).unwrap_err()), ID_NOT_STRING);
    }

    #[test]
    fn body_id_mismatch_is_conflict() {
        let body = object(json!({ "id": Uuid::new_v4().to_string() }));
        let err = check_body_id(&body, Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn body_id_matching_path_is_returned() {
        let id = Uuid::new_v4();
        let body = object(json!({ "id": id.to_string() }));
        assert_eq!(check_body_id(&body, Some(id)).unwrap(), Some(id));
        assert_eq!(check_body_id(&Map::new(), Some(id)).unwrap(), None);
    }

    #[test]
    fn violations_reports_every_problem() {
        let body = object(json!({
            "targetTemperature": 20.5,
            "currentTemperature": "warm",
            "startTime": ["06:00", 7],
            "colour": "red",
        }));

        assert_eq!(
            violations(&body, FIELDS),
            vec![
                "name is required",
                "targetTemperature must be an integer, got number",
                "currentTemperature must be a number, got string",
                "startTime must be an array of strings, got array",
                "colour is not an allowed property",
            ]
        );
    }

    #[test]
    fn id_arrays_need_canonical_ids() {
        let good = object(json!({
            "name": "x",
            "targetTemperature": 1,
            "trvsAppliedOn": [Uuid::new_v4().to_string()],
        }));
        assert!(violations(&good, FIELDS).is_empty());

        let bad = object(json!({ "name": "x", "targetTemperature": 1, "trvsAppliedOn": ["nope"] }));
        assert_eq!(
            violations(&bad, FIELDS),
            vec!["trvsAppliedOn must be an array of ids, got array"]
        );
    }

    #[test]
    fn valid_body_has_no_violations() {
        let body = object(json!({ "name": "x", "targetTemperature": 21, "currentTemperature": 20 }));
        assert!(violations(&body, FIELDS).is_empty());
    }

    #[test]
    fn decode_carries_violations() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Probe {
            name: String,
        }

        let err = decode::<Probe>("probe", object(json!({})), FIELDS).unwrap_err();
        match err {
            ServiceError::BadRequest { message, violations } => {
                assert_eq!(message, "probe failed schema validation");
                assert_eq!(violations, vec!["name is required", "targetTemperature is required"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
