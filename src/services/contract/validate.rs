//! Request validation against a matched operation.
//!
//! Every violation is collected (not just the first) so the caller can fix the
//! whole request in one round-trip.

use axum::http::{HeaderMap, header};
use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde_json::Value;

use super::types::{FieldViolation, Operation, ParamLocation, ParamSpec, ScalarKind};

pub fn validate_parameters(
    operation: &Operation,
    path_params: &[(String, String)],
    query: Option<&str>,
    headers: &HeaderMap,
) -> Vec<FieldViolation> {
    let query_pairs: Vec<(String, String)> = query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let mut violations = Vec::new();
    for spec in &operation.parameters {
        let raw = match spec.location {
            ParamLocation::Path => lookup(path_params, &spec.name),
            ParamLocation::Query => lookup(&query_pairs, &spec.name),
            ParamLocation::Header => match headers.get(spec.name.as_str()).map(|v| v.to_str()) {
                Some(Err(_)) => {
                    violations.push(FieldViolation::new(spec.location, spec.name.clone(), "type"));
                    continue;
                }
                Some(Ok(v)) => Some(v),
                None => None,
            },
            ParamLocation::Body => None,
        };

        match raw {
            None if spec.required => violations.push(FieldViolation::new(
                spec.location,
                spec.name.clone(),
                "required",
            )),
            None => {}
            Some(raw) => check_param(spec, raw, &mut violations),
        }
    }
    violations
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn check_param(spec: &ParamSpec, raw: &str, violations: &mut Vec<FieldViolation>) {
    let Some(value) = coerce(spec.kind, raw) else {
        violations.push(FieldViolation::new(spec.location, spec.name.clone(), "type"));
        return;
    };

    for err in spec.validator.iter_errors(&value) {
        violations.push(FieldViolation::new(
            spec.location,
            spec.name.clone(),
            constraint_name(&err.kind),
        ));
    }
}

fn coerce(kind: ScalarKind, raw: &str) -> Option<Value> {
    match kind {
        ScalarKind::String => Some(Value::String(raw.to_string())),
        ScalarKind::Integer => raw.parse::<i64>().ok().map(Value::from),
        ScalarKind::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        ScalarKind::Boolean => match raw {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
    }
}

/// Validate the request body. Operations without a declared JSON body accept
/// any payload untouched.
pub fn validate_body(operation: &Operation, headers: &HeaderMap, body: &[u8]) -> Vec<FieldViolation> {
    let Some(spec) = &operation.body else {
        return Vec::new();
    };

    if body.is_empty() {
        return if spec.required {
            vec![FieldViolation::new(ParamLocation::Body, ROOT, "required")]
        } else {
            Vec::new()
        };
    }

    if !is_json_content_type(headers) {
        return vec![FieldViolation::new(
            ParamLocation::Header,
            header::CONTENT_TYPE.as_str(),
            "mediaType",
        )];
    }

    let instance: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return vec![FieldViolation::new(ParamLocation::Body, ROOT, "json")],
    };

    schema_violations(&spec.validator, &instance)
}

const ROOT: &str = "$";

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mt| {
            let mt = mt.trim().to_ascii_lowercase();
            mt == "application/json" || mt.ends_with("+json")
        })
        .unwrap_or(false)
}

fn schema_violations(validator: &Validator, instance: &Value) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    for err in validator.iter_errors(instance) {
        let base = pointer_to_field(&err.instance_path.to_string());
        match &err.kind {
            ValidationErrorKind::Required { property } => {
                let name = property
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| property.to_string());
                violations.push(FieldViolation::new(
                    ParamLocation::Body,
                    join_field(&base, &name),
                    "required",
                ));
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                for name in unexpected {
                    violations.push(FieldViolation::new(
                        ParamLocation::Body,
                        join_field(&base, name),
                        "additionalProperties",
                    ));
                }
            }
            kind => violations.push(FieldViolation::new(
                ParamLocation::Body,
                if base.is_empty() { ROOT.to_string() } else { base },
                constraint_name(kind),
            )),
        }
    }
    violations
}

/// "/address/city" -> "address.city", "/tags/0" -> "tags.0"
fn pointer_to_field(pointer: &str) -> String {
    pointer
        .split('/')
        .skip(1)
        .map(|seg| seg.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn join_field(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
    }
}

fn constraint_name(kind: &ValidationErrorKind) -> &'static str {
    match kind {
        ValidationErrorKind::Required { .. } => "required",
        ValidationErrorKind::Type { .. } => "type",
        ValidationErrorKind::Enum { .. } => "enum",
        ValidationErrorKind::Constant { .. } => "const",
        ValidationErrorKind::Format { .. } => "format",
        ValidationErrorKind::Pattern { .. } => "pattern",
        ValidationErrorKind::MinLength { .. } => "minLength",
        ValidationErrorKind::MaxLength { .. } => "maxLength",
        ValidationErrorKind::Minimum { .. } => "minimum",
        ValidationErrorKind::Maximum { .. } => "maximum",
        ValidationErrorKind::ExclusiveMinimum { .. } => "exclusiveMinimum",
        ValidationErrorKind::ExclusiveMaximum { .. } => "exclusiveMaximum",
        ValidationErrorKind::MultipleOf { .. } => "multipleOf",
        ValidationErrorKind::MinItems { .. } => "minItems",
        ValidationErrorKind::MaxItems { .. } => "maxItems",
        ValidationErrorKind::UniqueItems { .. } => "uniqueItems",
        ValidationErrorKind::AdditionalProperties { .. } => "additionalProperties",
        _ => "schema",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::contract::RouteContract;
    use axum::http::{HeaderValue, Method};

    const DOC: &str = r#"
openapi: 3.1.0
paths:
  /people:
    get:
      operationId: listPeople
      parameters:
        - { name: page, in: query, schema: { type: integer, minimum: 1 } }
        - { name: limit, in: query, schema: { type: integer, minimum: 1, maximum: 100 } }
        - { name: x-tenant, in: header, required: true, schema: { type: string, minLength: 2 } }
    post:
      operationId: createPerson
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              additionalProperties: false
              required: [name, email, kind]
              properties:
                name: { type: string, minLength: 1 }
                email: { type: string, format: email }
                kind: { type: string, enum: [staff, guest] }
                address:
                  type: object
                  required: [city]
                  properties:
                    city: { type: string }
  /people/{personId}:
    get:
      operationId: getPerson
      parameters:
        - { name: personId, in: path, required: true, schema: { type: string, format: uuid } }
"#;

    fn contract() -> RouteContract {
        RouteContract::from_yaml(DOC).unwrap()
    }

    fn json_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h
    }

    fn fields(violations: &[FieldViolation]) -> Vec<(&str, &'static str)> {
        violations
            .iter()
            .map(|v| (v.field.as_str(), v.constraint))
            .collect()
    }

    #[test]
    fn query_and_header_parameters() {
        let contract = contract();
        let (op, path) = contract.find(&Method::GET, "/people").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-tenant", HeaderValue::from_static("acme"));
        assert!(validate_parameters(op, &path, Some("page=2&limit=50"), &headers).is_empty());

        let v = validate_parameters(op, &path, Some("page=0&limit=101"), &HeaderMap::new());
        assert_eq!(
            fields(&v),
            vec![("page", "minimum"), ("limit", "maximum"), ("x-tenant", "required")]
        );

        let v = validate_parameters(op, &path, Some("page=abc"), &headers);
        assert_eq!(fields(&v), vec![("page", "type")]);
    }

    #[test]
    fn path_parameter_format() {
        let contract = contract();

        let (op, path) = contract.find(&Method::GET, "/people/not-a-uuid").unwrap();
        let v = validate_parameters(op, &path, None, &HeaderMap::new());
        assert_eq!(fields(&v), vec![("personId", "format")]);
        assert_eq!(v[0].location, ParamLocation::Path);

        let (op, path) = contract
            .find(&Method::GET, "/people/6f1c1c3e-8a3b-4a5e-9d49-0a6b7c8d9e0f")
            .unwrap();
        assert!(validate_parameters(op, &path, None, &HeaderMap::new()).is_empty());
    }

    #[test]
    fn body_reports_every_violation() {
        let contract = contract();
        let op = contract.get("createPerson").unwrap();

        let body = br#"{"email":"nope","kind":"admin","address":{},"extra":1}"#;
        let v = validate_body(op, &json_headers(), body);
        let mut got = fields(&v);
        got.sort();

        assert_eq!(
            got,
            vec![
                ("address.city", "required"),
                ("email", "format"),
                ("extra", "additionalProperties"),
                ("kind", "enum"),
                ("name", "required"),
            ]
        );
        assert!(v.iter().all(|x| x.location == ParamLocation::Body));
    }

    #[test]
    fn body_shape_errors() {
        let contract = contract();
        let op = contract.get("createPerson").unwrap();

        assert_eq!(
            fields(&validate_body(op, &json_headers(), b"")),
            vec![("$", "required")]
        );
        assert_eq!(
            fields(&validate_body(op, &json_headers(), b"{not json")),
            vec![("$", "json")]
        );
        assert_eq!(
            fields(&validate_body(op, &json_headers(), b"[]")),
            vec![("$", "type")]
        );
        assert_eq!(
            fields(&validate_body(op, &HeaderMap::new(), b"{}")),
            vec![("content-type", "mediaType")]
        );
    }

    #[test]
    fn valid_body_passes() {
        let contract = contract();
        let op = contract.get("createPerson").unwrap();

        let body = br#"{"name":"Ada","email":"ada@example.com","kind":"staff"}"#;
        assert!(validate_body(op, &json_headers(), body).is_empty());
    }

    #[test]
    fn pointer_conversion() {
        assert_eq!(pointer_to_field(""), "");
        assert_eq!(pointer_to_field("/a/b"), "a.b");
        assert_eq!(pointer_to_field("/a~1b/0"), "a/b.0");
    }
}
