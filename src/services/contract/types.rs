use axum::http::Method;
use jsonschema::Validator;
use serde::Serialize;
use thiserror::Error;

use super::template::PathTemplate;

/// Startup-time contract load failures. Any of these aborts the process.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("contract document is not valid YAML/JSON: {0}")]
    Parse(String),
    #[error("contract document has no `paths` object")]
    MissingPaths,
    #[error("invalid path template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: &'static str },
    #[error("path templates `{first}` and `{second}` collide")]
    TemplateCollision { first: String, second: String },
    #[error("operation {method} {path} has no operationId")]
    MissingOperationId { method: String, path: String },
    #[error("duplicate operationId `{0}`")]
    DuplicateOperationId(String),
    #[error("unresolvable $ref `{0}`")]
    UnresolvedRef(String),
    #[error("$ref nesting too deep at `{0}`")]
    RefTooDeep(String),
    #[error("unknown security scheme `{scheme}` on `{operation_id}`")]
    UnknownSecurityScheme {
        operation_id: String,
        scheme: String,
    },
    #[error("invalid schema at {location}: {reason}")]
    InvalidSchema { location: String, reason: String },
    #[error("path parameter `{name}` on `{operation_id}` is not in the template")]
    UnboundPathParameter { operation_id: String, name: String },
    #[error("no handler bound for operation `{0}`")]
    MissingHandler(String),
    #[error("handler `{0}` has no operation in the contract")]
    UnknownHandler(String),
    #[error("handler `{operation_id}` is bound to {bound}, contract declares {declared}")]
    HandlerMismatch {
        operation_id: String,
        bound: String,
        declared: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

impl ParamLocation {
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            _ => None,
        }
    }
}

/// Scalar type a raw parameter string is coerced to before schema validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Integer,
    Number,
    Boolean,
}

/// One violated constraint. Only the field and the constraint keyword are
/// reported, never schema internals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    #[serde(rename = "in")]
    pub location: ParamLocation,
    pub field: String,
    pub constraint: &'static str,
}

impl FieldViolation {
    pub fn new(location: ParamLocation, field: impl Into<String>, constraint: &'static str) -> Self {
        Self {
            location,
            field: field.into(),
            constraint,
        }
    }
}

pub struct ParamSpec {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub kind: ScalarKind,
    pub(crate) validator: Validator,
}

pub struct BodySpec {
    pub required: bool,
    pub(crate) validator: Validator,
}

pub struct Operation {
    pub operation_id: String,
    pub method: Method,
    pub template: PathTemplate,
    pub parameters: Vec<ParamSpec>,
    pub body: Option<BodySpec>,
    pub security_required: bool,
}
