//! Component manifests and command schemas.

use forge_ecs::entity::ComponentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An entry in a module's component manifest: the human-readable name a
/// module publishes a component under, and the numeric id the store
/// actually indexes by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentManifestEntry {
    pub name: String,
    pub cid: ComponentId,
}

/// A scalar type a command field may take. Coercion between these is
/// limited to widenings within the numeric tower (int -> long -> double).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Long,
    Int,
    Double,
    Float,
    Bool,
    String,
}

impl ScalarType {
    /// Whether `value` either already has this type, or can be widened to
    /// it within the numeric tower (`int` -> `long` -> `double`/`float`).
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ScalarType::Bool => value.is_boolean(),
            ScalarType::String => value.is_string(),
            ScalarType::Int => value.as_i64().map(|v| i32::try_from(v).is_ok()).unwrap_or(false),
            ScalarType::Long => value.is_i64() || value.is_u64(),
            ScalarType::Double | ScalarType::Float => value.is_number(),
        }
    }
}

/// One field in a [`CommandSchema`]: an ordered name + scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandField {
    pub name: String,
    pub ty: ScalarType,
}

/// A module-registered command: a name plus an ordered list of required
/// fields. Payloads are validated against this before being enqueued
/// (`forge-engine`'s `CommandResolver` owns the enqueue-time check; this
/// struct is the schema it checks against).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSchema {
    pub name: String,
    pub fields: Vec<CommandField>,
}

impl CommandSchema {
    /// Validate a payload against this schema: every field must be present
    /// with an acceptable type, and no extra fields are allowed.
    pub fn validate(&self, payload: &serde_json::Map<String, Value>) -> Result<(), String> {
        for field in &self.fields {
            match payload.get(&field.name) {
                Some(v) if field.ty.accepts(v) => {}
                Some(v) => {
                    return Err(format!(
                        "field '{}' has wrong type: expected {:?}, got {v}",
                        field.name, field.ty
                    ))
                }
                None => return Err(format!("missing required field '{}'", field.name)),
            }
        }
        let known: std::collections::HashSet<&str> =
            self.fields.iter().map(|f| f.name.as_str()).collect();
        for key in payload.keys() {
            if !known.contains(key.as_str()) {
                return Err(format!("unknown field '{key}'"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> CommandSchema {
        CommandSchema {
            name: "move".to_owned(),
            fields: vec![
                CommandField { name: "id".to_owned(), ty: ScalarType::Long },
                CommandField { name: "dx".to_owned(), ty: ScalarType::Double },
            ],
        }
    }

    fn payload(obj: Value) -> serde_json::Map<String, Value> {
        obj.as_object().unwrap().clone()
    }

    #[test]
    fn valid_payload_passes() {
        let s = schema();
        assert!(s.validate(&payload(json!({"id": 1, "dx": 1.5}))).is_ok());
    }

    #[test]
    fn missing_field_rejected() {
        let s = schema();
        assert!(s.validate(&payload(json!({"id": 1}))).is_err());
    }

    #[test]
    fn unknown_field_rejected() {
        let s = schema();
        assert!(s
            .validate(&payload(json!({"id": 1, "dx": 1.0, "extra": true})))
            .is_err());
    }

    #[test]
    fn int_widens_to_long() {
        assert!(ScalarType::Long.accepts(&json!(5)));
    }
}
