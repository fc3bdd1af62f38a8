use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Names of the capabilities the assistant can reach out of process.
pub mod names {
    pub const LIST_CUSTOMERS: &str = "list_customers";
    pub const GET_CUSTOMER: &str = "get_customer";
    pub const LIST_BONDS: &str = "list_bonds";
    pub const GET_PRODUCT: &str = "get_product";
    pub const SEARCH_MARKET: &str = "search_market";
    pub const READ_FILE: &str = "read_file";
    pub const LIST_FILES: &str = "list_files";
    pub const WRITE_FILE: &str = "write_file";

    pub const ALL: &[&str] = &[
        LIST_CUSTOMERS,
        GET_CUSTOMER,
        LIST_BONDS,
        GET_PRODUCT,
        SEARCH_MARKET,
        READ_FILE,
        LIST_FILES,
        WRITE_FILE,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyClass {
    Read,
    Irreversible,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,
}

impl FieldSpec {
    pub fn required(name: &str, kind: FieldKind, description: &str) -> Self {
        Self { name: name.to_string(), kind, required: true, description: description.to_string() }
    }

    pub fn optional(name: &str, kind: FieldKind, description: &str) -> Self {
        Self { name: name.to_string(), kind, required: false, description: description.to_string() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("unknown field `{field}`")]
    UnknownField { field: String },
    #[error("missing required field `{field}`")]
    MissingField { field: String },
    #[error("field `{field}` must be of type {expected}")]
    WrongType { field: String, expected: &'static str },
}

impl SchemaViolation {
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::NotAnObject => None,
            Self::UnknownField { field }
            | Self::MissingField { field }
            | Self::WrongType { field, .. } => Some(field),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    pub fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Checks a payload locally so that malformed calls never leave the process.
    /// `null` values are treated as absent.
    pub fn validate(&self, payload: &Value) -> Result<(), SchemaViolation> {
        let Some(object) = payload.as_object() else {
            return Err(SchemaViolation::NotAnObject);
        };

        for key in object.keys() {
            if !self.fields.iter().any(|field| &field.name == key) {
                return Err(SchemaViolation::UnknownField { field: key.clone() });
            }
        }

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(SchemaViolation::MissingField { field: field.name.clone() });
                }
                None | Some(Value::Null) => {}
                Some(value) if !field.kind.accepts(value) => {
                    return Err(SchemaViolation::WrongType {
                        field: field.name.clone(),
                        expected: field.kind.as_str(),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(
                field.name.clone(),
                json!({ "type": field.kind.as_str(), "description": field.description }),
            );
        }
        let required: Vec<&str> =
            self.fields.iter().filter(|field| field.required).map(|f| f.name.as_str()).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Opaque reference to where a capability is served.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRef(pub String);

impl EndpointRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub endpoint: Option<EndpointRef>,
    pub input_schema: InputSchema,
    pub idempotency: IdempotencyClass,
}

impl CapabilityDescriptor {
    pub fn new(name: &str, idempotency: IdempotencyClass, input_schema: InputSchema) -> Self {
        Self { name: name.to_string(), endpoint: None, input_schema, idempotency }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(EndpointRef(endpoint.into()));
        self
    }
}

/// Process-wide, read-only set of capability descriptors keyed by name.
#[derive(Clone, Debug, Default)]
pub struct CapabilityRegistry {
    descriptors: BTreeMap<String, Arc<CapabilityDescriptor>>,
}

impl CapabilityRegistry {
    pub fn new(descriptors: Vec<CapabilityDescriptor>) -> Self {
        let descriptors = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.name.clone(), Arc::new(descriptor)))
            .collect();
        Self { descriptors }
    }

    /// Builds the built-in capability set, wiring each one to the endpoint
    /// configured under its name. Capabilities without an entry stay unwired.
    pub fn from_endpoints(endpoints: &BTreeMap<String, String>) -> Self {
        let descriptors = builtin_descriptors()
            .into_iter()
            .map(|descriptor| match endpoints.get(&descriptor.name) {
                Some(endpoint) => descriptor.with_endpoint(endpoint.clone()),
                None => descriptor,
            })
            .collect();
        Self::new(descriptors)
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.descriptors.get(name).map(Arc::as_ref)
    }

    pub fn is_wired(&self, name: &str) -> bool {
        self.get(name).is_some_and(|descriptor| descriptor.endpoint.is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.descriptors.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

pub fn builtin_descriptors() -> Vec<CapabilityDescriptor> {
    use FieldKind::{Integer, String};
    use IdempotencyClass::{Irreversible, Read};

    vec![
        CapabilityDescriptor::new(names::LIST_CUSTOMERS, Read, InputSchema::empty()),
        CapabilityDescriptor::new(
            names::GET_CUSTOMER,
            Read,
            InputSchema::new(vec![FieldSpec::required(
                "customer_id",
                String,
                "customer identifier, e.g. CUST-001",
            )]),
        ),
        CapabilityDescriptor::new(names::LIST_BONDS, Read, InputSchema::empty()),
        CapabilityDescriptor::new(
            names::GET_PRODUCT,
            Read,
            InputSchema::new(vec![FieldSpec::required(
                "product_name",
                String,
                "product slug or display name",
            )]),
        ),
        CapabilityDescriptor::new(
            names::SEARCH_MARKET,
            Read,
            InputSchema::new(vec![FieldSpec::required(
                "product_type",
                String,
                "product type, e.g. government_bond",
            )]),
        ),
        CapabilityDescriptor::new(
            names::READ_FILE,
            Read,
            InputSchema::new(vec![FieldSpec::required("filename", String, "file to read")]),
        ),
        CapabilityDescriptor::new(
            names::LIST_FILES,
            Read,
            InputSchema::new(vec![
                FieldSpec::required("directory", String, "directory or key prefix to list"),
                FieldSpec::optional("limit", Integer, "maximum number of names to return"),
            ]),
        ),
        CapabilityDescriptor::new(
            names::WRITE_FILE,
            Irreversible,
            InputSchema::new(vec![
                FieldSpec::required("key", String, "artifact key"),
                FieldSpec::required("content", String, "artifact content"),
                FieldSpec::optional("content_type", String, "MIME type of the content"),
            ]),
        ),
    ]
}
