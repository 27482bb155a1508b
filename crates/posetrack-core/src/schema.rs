use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

use crate::errors::{FieldProblem, SchemaError};
use crate::value::{FieldValue, Metadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Enumerated,
    Nested,
}

impl FieldKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Some(FieldKind::String),
            "integer" | "int" => Some(FieldKind::Integer),
            "enum" | "enumerated" | "categorical" => Some(FieldKind::Enumerated),
            "nested" | "mapping" | "dict" => Some(FieldKind::Nested),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Enumerated => "enumerated string",
            FieldKind::Nested => "nested mapping",
        }
    }

    /// Value a field takes when the sidecar does not provide one.
    pub fn default_value(&self) -> FieldValue {
        match self {
            FieldKind::Nested => FieldValue::empty_mapping(),
            _ => FieldValue::empty_text(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub long_name: String,
    pub description: String,
    pub unit: Option<String>,
    pub allowed_values: Option<Vec<String>>,
    pub term_url: Option<String>,
    default: Option<FieldValue>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            long_name: name.clone(),
            name,
            kind,
            description: String::new(),
            unit: None,
            allowed_values: None,
            term_url: None,
            default: None,
        }
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn default_value(&self) -> FieldValue {
        self.default
            .clone()
            .unwrap_or_else(|| self.kind.default_value())
    }

    /// Coerces a value into this field's representation without checking
    /// enumerations. Nulls become the field's default; empty text reads as "unset".
    pub fn normalize(&self, value: &FieldValue) -> Result<FieldValue, FieldProblem> {
        let mismatch = || FieldProblem::TypeMismatch {
            expected: self.kind,
            found: value.kind_name(),
        };

        if value.is_null() {
            return match &self.default {
                Some(default) if !default.is_null() => self.normalize(default),
                _ => Ok(self.kind.default_value()),
            };
        }

        match self.kind {
            FieldKind::String | FieldKind::Enumerated => value
                .scalar_text()
                .map(FieldValue::Text)
                .ok_or_else(mismatch),
            FieldKind::Integer => match value {
                FieldValue::Integer(_) => Ok(value.clone()),
                FieldValue::Text(text) if text.trim().is_empty() => Ok(FieldValue::empty_text()),
                FieldValue::Text(text) => text
                    .trim()
                    .parse::<i64>()
                    .map(FieldValue::Integer)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            FieldKind::Nested => match value {
                FieldValue::Nested(_) => Ok(value.clone()),
                FieldValue::Text(text) if text.trim().is_empty() => Ok(FieldValue::empty_mapping()),
                _ => Err(mismatch()),
            },
        }
    }

    pub fn check_allowed(&self, value: &FieldValue) -> Result<(), FieldProblem> {
        let (FieldKind::Enumerated, Some(allowed)) = (self.kind, &self.allowed_values) else {
            return Ok(());
        };
        match value {
            FieldValue::Text(text) if !text.is_empty() && !allowed.iter().any(|v| v == text) => {
                Err(FieldProblem::NotAllowed {
                    value: text.clone(),
                    allowed: allowed.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Full write-time check: normalization followed by the enumeration test.
    pub fn validate(&self, value: &FieldValue) -> Result<FieldValue, FieldProblem> {
        let normalized = self.normalize(value)?;
        self.check_allowed(&normalized)?;
        Ok(normalized)
    }

    fn check_invariants(&self) -> Result<(), SchemaError> {
        match (self.kind, &self.allowed_values) {
            (FieldKind::Enumerated, None) => {
                return Err(SchemaError::EnumWithoutValues {
                    field: self.name.clone(),
                })
            }
            (kind, Some(_)) if kind != FieldKind::Enumerated => {
                return Err(SchemaError::AllowedValuesOnNonEnum {
                    field: self.name.clone(),
                    kind,
                })
            }
            _ => {}
        }

        if let Some(default) = &self.default {
            self.validate(default)
                .map_err(|problem| SchemaError::InvalidDefault {
                    field: self.name.clone(),
                    problem,
                })?;
        }
        Ok(())
    }

    fn from_raw(name: String, raw: Option<RawFieldSpec>) -> Result<Self, SchemaError> {
        let raw = raw.unwrap_or_default();
        let kind_str = raw
            .kind
            .ok_or_else(|| SchemaError::MissingType { field: name.clone() })?;
        let kind = FieldKind::parse(&kind_str).ok_or_else(|| SchemaError::UnknownType {
            field: name.clone(),
            kind: kind_str.clone(),
        })?;

        Ok(Self {
            long_name: raw.long_name.unwrap_or_else(|| name.clone()),
            name,
            kind,
            description: raw.description.unwrap_or_default(),
            unit: raw.unit,
            allowed_values: raw
                .allowed_values
                .map(|values| values.into_iter().filter_map(scalar_to_string).collect()),
            term_url: raw.term_url,
            default: raw.default.map(FieldValue::from),
        })
    }
}

/// Ordered, immutable set of field definitions for one project session.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let schema = Self::parse(&text, path)?;
        tracing::debug!(path = %path.display(), fields = schema.len(), "Loaded metadata schema");
        Ok(schema)
    }

    /// Parses schema YAML; `origin` only labels errors.
    pub fn parse(text: &str, origin: impl Into<PathBuf>) -> Result<Self, SchemaError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: SchemaDocument =
            serde_yaml::from_str(text).map_err(|source| SchemaError::Parse {
                path: origin.into(),
                source,
            })?;

        let fields = document
            .0
            .into_iter()
            .map(|(name, raw)| FieldSpec::from_raw(name, raw))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_fields(fields)
    }

    pub fn from_fields(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let mut index = HashMap::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            field.check_invariants()?;
            if index.insert(field.name.clone(), position).is_some() {
                return Err(SchemaError::DuplicateField {
                    field: field.name.clone(),
                });
            }
        }
        Ok(Self { fields, index })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&position| &self.fields[position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every field at its default, in schema order.
    pub fn defaults(&self) -> Metadata {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.default_value()))
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawFieldSpec {
    #[serde(rename = "type")]
    kind: Option<String>,
    long_name: Option<String>,
    description: Option<String>,
    unit: Option<String>,
    allowed_values: Option<Vec<Value>>,
    term_url: Option<String>,
    default: Option<Value>,
}

/// Top-level schema mapping, read entry by entry so repeated names reach
/// `Schema::from_fields` instead of being folded together.
struct SchemaDocument(Vec<(String, Option<RawFieldSpec>)>);

impl<'de> Deserialize<'de> for SchemaDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = SchemaDocument;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of field names to field definitions")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, Option<RawFieldSpec>>()? {
                    entries.push(entry);
                }
                Ok(SchemaDocument(entries))
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
File:
  type: string
  long_name: Video file name
  description: File name of the video, including extension
Species_name:
  type: string
  description: Scientific name of the species
Treatment:
  type: enum
  description: Experimental condition
  allowed_values: [control, venom, sham]
Video_length:
  type: integer
  unit: s
Events:
  type: nested
  description: Frame indices per event tag
"#;

    #[test]
    fn parses_fields_in_order() {
        let schema = Schema::parse(SCHEMA, "inline").expect("parse schema");
        let names: Vec<&str> = schema.field_names().collect();
        assert_eq!(
            names,
            ["File", "Species_name", "Treatment", "Video_length", "Events"]
        );

        let treatment = schema.get("Treatment").expect("treatment field");
        assert_eq!(treatment.kind, FieldKind::Enumerated);
        assert_eq!(
            treatment.allowed_values.as_deref(),
            Some(&["control".to_string(), "venom".into(), "sham".into()][..])
        );
        assert_eq!(schema.get("Video_length").unwrap().unit.as_deref(), Some("s"));
        assert_eq!(schema.get("Species_name").unwrap().long_name, "Species_name");
    }

    #[test]
    fn defaults_follow_kind() {
        let schema = Schema::parse(SCHEMA, "inline").unwrap();
        let defaults = schema.defaults();
        assert_eq!(defaults["Species_name"], FieldValue::empty_text());
        assert_eq!(defaults["Treatment"], FieldValue::empty_text());
        assert_eq!(defaults["Events"], FieldValue::empty_mapping());
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = Schema::parse("File:\n  description: no type here\n", "inline").unwrap_err();
        assert!(matches!(err, SchemaError::MissingType { field } if field == "File"));

        let err = Schema::parse("File:\n", "inline").unwrap_err();
        assert!(matches!(err, SchemaError::MissingType { .. }));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = Schema::parse("File:\n  type: timestamp\n", "inline").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType { kind, .. } if kind == "timestamp"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let fields = vec![
            FieldSpec::new("File", FieldKind::String),
            FieldSpec::new("File", FieldKind::Integer),
        ];
        let err = Schema::from_fields(fields).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { field } if field == "File"));
    }

    #[test]
    fn allowed_values_require_enumerated_kind() {
        let err = Schema::parse(
            "Species_name:\n  type: string\n  allowed_values: [a, b]\n",
            "inline",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::AllowedValuesOnNonEnum { .. }));

        let err = Schema::parse("Treatment:\n  type: enum\n", "inline").unwrap_err();
        assert!(matches!(err, SchemaError::EnumWithoutValues { .. }));
    }

    #[test]
    fn declared_default_must_be_valid() {
        let err = Schema::parse(
            "Treatment:\n  type: enum\n  allowed_values: [control]\n  default: venom\n",
            "inline",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefault { .. }));

        let schema = Schema::parse(
            "Treatment:\n  type: enum\n  allowed_values: [control]\n  default: control\n",
            "inline",
        )
        .unwrap();
        assert_eq!(schema.defaults()["Treatment"], FieldValue::text("control"));
    }

    #[test]
    fn normalization_coerces_scalars() {
        let text = FieldSpec::new("Subject", FieldKind::String);
        assert_eq!(
            text.normalize(&FieldValue::Integer(7)).unwrap(),
            FieldValue::text("7")
        );
        assert!(text.normalize(&FieldValue::empty_mapping()).is_err());

        let int = FieldSpec::new("Video_length", FieldKind::Integer);
        assert_eq!(
            int.normalize(&FieldValue::text(" 42 ")).unwrap(),
            FieldValue::Integer(42)
        );
        assert_eq!(
            int.normalize(&FieldValue::empty_text()).unwrap(),
            FieldValue::empty_text()
        );
        assert!(matches!(
            int.normalize(&FieldValue::text("forty")),
            Err(FieldProblem::TypeMismatch { expected: FieldKind::Integer, found: "text" })
        ));

        let nested = FieldSpec::new("Events", FieldKind::Nested);
        assert_eq!(
            nested.normalize(&FieldValue::empty_text()).unwrap(),
            FieldValue::empty_mapping()
        );
    }

    #[test]
    fn enumeration_flags_values_outside_the_set() {
        let spec = FieldSpec::new("Treatment", FieldKind::Enumerated)
            .with_allowed_values(["control", "venom"]);
        assert!(spec.validate(&FieldValue::text("control")).is_ok());
        assert!(spec.validate(&FieldValue::empty_text()).is_ok());
        assert!(matches!(
            spec.validate(&FieldValue::text("saline")),
            Err(FieldProblem::NotAllowed { value, .. }) if value == "saline"
        ));
    }

    #[test]
    fn null_takes_the_declared_default() {
        let null = FieldValue::from(Value::Null);

        let treatment = FieldSpec::new("Treatment", FieldKind::Enumerated)
            .with_allowed_values(["control", "venom"])
            .with_default("control");
        assert_eq!(treatment.normalize(&null).unwrap(), FieldValue::text("control"));

        let length = FieldSpec::new("Video_length", FieldKind::Integer).with_default("30");
        assert_eq!(length.normalize(&null).unwrap(), FieldValue::Integer(30));

        let subject = FieldSpec::new("Subject", FieldKind::String);
        assert_eq!(subject.normalize(&null).unwrap(), FieldValue::empty_text());
    }
}
