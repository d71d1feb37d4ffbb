//! The parameter schema for hydraulic / pneumatic cylinder drawings.
//!
//! The schema is an ordered list of parameter names, each with a declared
//! type and a required flag. Order matters twice: the partitioner slices it
//! into batches, and the report lists rows in the same order.
//!
//! Every value is currently declared as a string. Units, symbols and
//! formatting are preserved exactly as drawn, so a numeric type would lose
//! information ("Ø50 mm", "250 BAR").

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The sentinel meaning "declared in the schema but not determinable".
pub const NA: &str = "NA";

/// Free-text reasoning field the oracle must fill for the close-length derivation.
pub const CLOSE_LENGTH_REASONING: &str = "close_length_reasoning";

/// Parameters extracted on every run, in batch order.
pub const IMPORTANT_FEATURES: [&str; 13] = [
    "cylinder_action",
    "bore_diameter",
    "outside_diameter",
    "rod_diameter",
    "stroke_length",
    "close_length",
    "operating_pressure",
    "operating_temperature",
    "mounting",
    "rod_end",
    "fluid",
    "drawing_number",
    "revision",
];

/// Parameters extracted only when the optional batch is enabled.
pub const OPTIONAL_FEATURES: [&str; 10] = [
    "body_material",
    "piston_material",
    "cylinder_configuration",
    "cylinder_style",
    "rated_load",
    "standard",
    "surface_finish",
    "coating_thickness",
    "special_features",
    "concentricity_of_rod_and_tube",
];

/// Declared JSON type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
}

impl ParamType {
    fn json_name(self) -> &'static str {
        match self {
            ParamType::String => "string",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamType,
    pub required: bool,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamType::String,
            required: true,
        }
    }
}

/// A reasoning field injected into a batch's output contract.
///
/// Reasoning fields are not parameters: they never appear as schema keys,
/// but the oracle must fill them so a derived value can be audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningField {
    pub name: String,
    pub description: String,
}

impl ReasoningField {
    /// The reasoning requirement attached to `close_length`.
    pub fn close_length() -> Self {
        Self {
            name: CLOSE_LENGTH_REASONING.to_string(),
            description: "Step-by-step reasoning and justification for the extracted close length \
value. Mention what values were used, whether it was explicitly found or inferred, and how."
                .to_string(),
        }
    }
}

/// Ordered mapping from parameter name to its declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    params: Vec<ParameterSpec>,
}

impl ParameterSchema {
    pub fn new(params: Vec<ParameterSpec>) -> Self {
        Self { params }
    }

    /// The thirteen important cylinder parameters.
    pub fn important() -> Self {
        Self::new(IMPORTANT_FEATURES.iter().map(|n| ParameterSpec::required(*n)).collect())
    }

    /// Important followed by optional parameters.
    pub fn full() -> Self {
        Self::new(
            IMPORTANT_FEATURES
                .iter()
                .chain(OPTIONAL_FEATURES.iter())
                .map(|n| ParameterSpec::required(*n))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Render the JSON schema for a subset of keys plus injected reasoning fields.
    ///
    /// Keys are emitted in the order given. A key not declared in this schema
    /// is rendered as a string; callers are expected to pass declared keys.
    pub fn json_schema_for(&self, keys: &[String], reasoning: &[ReasoningField]) -> Value {
        let mut properties = Map::new();
        let mut required: Vec<Value> = Vec::with_capacity(keys.len() + reasoning.len());

        for key in keys {
            let kind = self.get(key).map(|p| p.kind).unwrap_or_default();
            properties.insert(key.clone(), json!({ "type": kind.json_name() }));
            if self.get(key).map_or(true, |p| p.required) {
                required.push(Value::String(key.clone()));
            }
        }
        for field in reasoning {
            properties.insert(
                field.name.clone(),
                json!({ "type": "string", "description": field.description }),
            );
            required.push(Value::String(field.name.clone()));
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::important()
    }
}

/// Convert a snake_case parameter key to the Title Case label used in reports.
pub fn display_name(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn important_schema_has_thirteen_required_strings() {
        let schema = ParameterSchema::important();
        assert_eq!(schema.len(), 13);
        assert!(schema.names().all(|n| schema.get(n).map(|p| p.required) == Some(true)));
        assert_eq!(schema.names().next(), Some("cylinder_action"));
        assert_eq!(schema.names().last(), Some("revision"));
    }

    #[test]
    fn full_schema_appends_optional() {
        let schema = ParameterSchema::full();
        assert_eq!(schema.len(), 23);
        assert!(schema.contains("concentricity_of_rod_and_tube"));
    }

    #[test]
    fn json_schema_includes_reasoning_field() {
        let schema = ParameterSchema::important();
        let keys = vec!["bore_diameter".to_string(), "close_length".to_string()];
        let rendered = schema.json_schema_for(&keys, &[ReasoningField::close_length()]);

        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["properties"]["bore_diameter"]["type"], "string");
        assert!(rendered["properties"][CLOSE_LENGTH_REASONING]["description"]
            .as_str()
            .unwrap()
            .contains("close length"));
        let required: Vec<&str> = rendered["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["bore_diameter", "close_length", CLOSE_LENGTH_REASONING]);
    }

    #[test]
    fn display_name_title_cases() {
        assert_eq!(display_name("bore_diameter"), "Bore Diameter");
        assert_eq!(display_name("concentricity_of_rod_and_tube"), "Concentricity Of Rod And Tube");
        assert_eq!(display_name("revision"), "Revision");
    }
}
