use crate::incident::{IncidentDraft, IncidentType};
use serde::Serialize;
use serde_json::{Map, Value};

pub const TITLE_MAX_CHARS: usize = 255;

/// One rejected field of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub code: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            code,
            message: message.into(),
        }
    }
}

/// Checks raw submitted fields against the incident shape.
///
/// Unknown keys are ignored, so a client cannot smuggle `id`, `created_at`
/// or `image` through the payload. Every failing field is reported, not just
/// the first one. The returned draft never carries an image; that comes from
/// the upload stage.
pub fn validate_submission(fields: &Map<String, Value>) -> Result<IncidentDraft, Vec<FieldError>> {
    let mut errors = Vec::new();

    let title = match fields.get("title") {
        None | Some(Value::Null) => {
            errors.push(FieldError::new("title", "invalid_type", "Required"));
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            errors.push(FieldError::new("title", "too_small", "Title is required"));
            None
        }
        Some(Value::String(s)) if s.chars().count() > TITLE_MAX_CHARS => {
            errors.push(FieldError::new("title", "too_big", "Title too long"));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            errors.push(type_mismatch("title", other));
            None
        }
    };

    let incident_type = match fields.get("incident_type") {
        Some(Value::String(s)) => IncidentType::from_label(s),
        _ => None,
    };
    if incident_type.is_none() {
        errors.push(FieldError::new(
            "incident_type",
            "invalid_enum_value",
            "Invalid incident type",
        ));
    }

    let description = optional_string(fields, "description", &mut errors);
    let location = optional_string(fields, "location", &mut errors);

    match (title, incident_type) {
        (Some(title), Some(incident_type)) if errors.is_empty() => Ok(IncidentDraft {
            title,
            description,
            incident_type,
            location,
            image: None,
        }),
        _ => Err(errors),
    }
}

fn optional_string(
    fields: &Map<String, Value>,
    name: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match fields.get(name) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            errors.push(type_mismatch(name, other));
            None
        }
    }
}

fn type_mismatch(field: &str, value: &Value) -> FieldError {
    let received = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    FieldError::new(
        field,
        "invalid_type",
        format!("Expected string, received {}", received),
    )
}
