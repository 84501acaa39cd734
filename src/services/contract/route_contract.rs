//! RouteContract: the (method, path template) -> operation table loaded once from
//! the OpenAPI document. Immutable after load and shared behind an `Arc`.

use std::collections::HashSet;

use axum::http::Method;
use jsonschema::{Draft, Validator};
use serde_json::{Map, Value, json};

use super::template::PathTemplate;
use super::types::{BodySpec, ContractError, Operation, ParamLocation, ParamSpec, ScalarKind};

const HTTP_METHODS: [(&str, Method); 8] = [
    ("get", Method::GET),
    ("put", Method::PUT),
    ("post", Method::POST),
    ("delete", Method::DELETE),
    ("options", Method::OPTIONS),
    ("head", Method::HEAD),
    ("patch", Method::PATCH),
    ("trace", Method::TRACE),
];

const MAX_REF_DEPTH: usize = 32;

pub struct RouteContract {
    operations: Vec<Operation>,
}

impl RouteContract {
    pub fn from_yaml(source: &str) -> Result<Self, ContractError> {
        let doc: Value =
            serde_yaml::from_str(source).map_err(|e| ContractError::Parse(e.to_string()))?;
        Self::from_document(&doc)
    }

    pub fn from_document(doc: &Value) -> Result<Self, ContractError> {
        let paths = doc
            .get("paths")
            .and_then(Value::as_object)
            .ok_or(ContractError::MissingPaths)?;

        let schemes: HashSet<String> = doc
            .pointer("/components/securitySchemes")
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        let global_security = doc.get("security");

        let mut templates: Vec<PathTemplate> = Vec::new();
        let mut operation_ids = HashSet::new();
        let mut operations = Vec::new();

        for (raw_path, item) in paths {
            let template = PathTemplate::parse(raw_path)?;
            if let Some(existing) = templates.iter().find(|t| t.collides_with(&template)) {
                return Err(ContractError::TemplateCollision {
                    first: existing.as_str().to_string(),
                    second: raw_path.clone(),
                });
            }
            templates.push(template.clone());

            let item = resolve_refs(doc, item, 0)?;
            let shared_params = item
                .get("parameters")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for (key, method) in HTTP_METHODS.iter() {
                let Some(op) = item.get(*key) else {
                    continue;
                };

                let operation = build_operation(
                    op,
                    OperationSite {
                        method: method.clone(),
                        template: template.clone(),
                        shared_params: &shared_params,
                        global_security,
                        schemes: &schemes,
                    },
                )?;

                if !operation_ids.insert(operation.operation_id.clone()) {
                    return Err(ContractError::DuplicateOperationId(operation.operation_id));
                }
                operations.push(operation);
            }
        }

        Ok(Self { operations })
    }

    /// Find the single operation matching `method` + `path`, with its path parameters.
    pub fn find(&self, method: &Method, path: &str) -> Option<(&Operation, Vec<(String, String)>)> {
        self.operations
            .iter()
            .filter(|op| op.method == *method)
            .find_map(|op| op.template.matches(path).map(|params| (op, params)))
    }

    pub fn get(&self, operation_id: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.operation_id == operation_id)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }
}

struct OperationSite<'a> {
    method: Method,
    template: PathTemplate,
    shared_params: &'a [Value],
    global_security: Option<&'a Value>,
    schemes: &'a HashSet<String>,
}

fn build_operation(op: &Value, site: OperationSite<'_>) -> Result<Operation, ContractError> {
    let operation_id = op
        .get("operationId")
        .and_then(Value::as_str)
        .ok_or_else(|| ContractError::MissingOperationId {
            method: site.method.to_string(),
            path: site.template.as_str().to_string(),
        })?
        .to_string();

    // Operation-level parameters override path-level ones with the same (name, in).
    let mut raw_params: Vec<Value> = site.shared_params.to_vec();
    for param in op.get("parameters").and_then(Value::as_array).into_iter().flatten() {
        let key = param_key(param);
        raw_params.retain(|p| param_key(p) != key);
        raw_params.push(param.clone());
    }

    let mut parameters = Vec::with_capacity(raw_params.len());
    for raw in &raw_params {
        parameters.push(build_param(raw, &operation_id, &site.template)?);
    }

    let body = op
        .get("requestBody")
        .map(|rb| build_body(rb, &operation_id))
        .transpose()?
        .flatten();

    let security_required = requires_auth(
        op.get("security").or(site.global_security),
        site.schemes,
        &operation_id,
    )?;

    Ok(Operation {
        operation_id,
        method: site.method,
        template: site.template,
        parameters,
        body,
        security_required,
    })
}

fn param_key(param: &Value) -> (Option<&str>, Option<&str>) {
    (
        param.get("name").and_then(Value::as_str),
        param.get("in").and_then(Value::as_str),
    )
}

fn build_param(
    raw: &Value,
    operation_id: &str,
    template: &PathTemplate,
) -> Result<ParamSpec, ContractError> {
    let invalid = |reason: &str| ContractError::InvalidSchema {
        location: format!("{operation_id} parameters"),
        reason: reason.to_string(),
    };

    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("parameter without a name"))?
        .to_string();
    let location = raw
        .get("in")
        .and_then(Value::as_str)
        .and_then(ParamLocation::parse)
        .ok_or_else(|| invalid("parameter `in` must be path, query or header"))?;

    if location == ParamLocation::Path && !template.param_names().any(|n| n == name) {
        return Err(ContractError::UnboundPathParameter {
            operation_id: operation_id.to_string(),
            name,
        });
    }

    // Path parameters are always required.
    let required = location == ParamLocation::Path
        || raw.get("required").and_then(Value::as_bool).unwrap_or(false);

    let schema = raw.get("schema").cloned().unwrap_or_else(|| json!({}));
    let kind = match schema.get("type").and_then(Value::as_str) {
        Some("integer") => ScalarKind::Integer,
        Some("number") => ScalarKind::Number,
        Some("boolean") => ScalarKind::Boolean,
        _ => ScalarKind::String,
    };

    // Header names are case-insensitive on the wire.
    let name = if location == ParamLocation::Header {
        name.to_ascii_lowercase()
    } else {
        name
    };

    let validator = compile(&schema, format!("{operation_id} parameter `{name}`"))?;

    Ok(ParamSpec {
        name,
        location,
        required,
        kind,
        validator,
    })
}

fn build_body(raw: &Value, operation_id: &str) -> Result<Option<BodySpec>, ContractError> {
    let required = raw.get("required").and_then(Value::as_bool).unwrap_or(false);
    let Some(content) = raw.get("content").and_then(Value::as_object) else {
        return Ok(None);
    };

    let Some((_, media)) = content
        .iter()
        .find(|(mt, _)| mt.as_str() == "application/json")
        .or_else(|| content.iter().find(|(mt, _)| mt.ends_with("+json")))
    else {
        return Ok(None);
    };

    let schema = media.get("schema").cloned().unwrap_or_else(|| json!({}));
    let validator = compile(&schema, format!("{operation_id} requestBody"))?;

    Ok(Some(BodySpec {
        required,
        validator,
    }))
}

fn requires_auth(
    security: Option<&Value>,
    schemes: &HashSet<String>,
    operation_id: &str,
) -> Result<bool, ContractError> {
    let Some(requirements) = security.and_then(Value::as_array) else {
        return Ok(false);
    };

    let mut required = !requirements.is_empty();
    for requirement in requirements.iter().filter_map(Value::as_object) {
        // `{}` in the list means anonymous access is acceptable.
        if requirement.is_empty() {
            required = false;
        }
        if let Some(scheme) = requirement.keys().find(|s| !schemes.contains(*s)) {
            return Err(ContractError::UnknownSecurityScheme {
                operation_id: operation_id.to_string(),
                scheme: scheme.clone(),
            });
        }
    }
    Ok(required)
}

fn compile(schema: &Value, location: String) -> Result<Validator, ContractError> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .should_validate_formats(true)
        .build(schema)
        .map_err(|e| ContractError::InvalidSchema {
            location,
            reason: e.to_string(),
        })
}

/// Inline every local `$ref` (`#/...`) so compiled schemas are self-contained.
fn resolve_refs(doc: &Value, value: &Value, depth: usize) -> Result<Value, ContractError> {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                if depth >= MAX_REF_DEPTH {
                    return Err(ContractError::RefTooDeep(reference.to_string()));
                }
                let target = reference
                    .strip_prefix('#')
                    .and_then(|pointer| doc.pointer(pointer))
                    .ok_or_else(|| ContractError::UnresolvedRef(reference.to_string()))?;
                return resolve_refs(doc, target, depth + 1);
            }

            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_refs(doc, v, depth)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_refs(doc, v, depth))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}
