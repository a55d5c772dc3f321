// Copyright 2025 Cowboy AI, LLC.

//! Structural validation of persisted documents against JSON schemas
//!
//! Schemas are the ones `schemars` derives for a serializer's document
//! type. Validation only gates what is read back from storage; serializing
//! is never validated.

use crate::errors::{WorkbenchError, WorkbenchResult};
use schemars::schema::{
    ArrayValidation, InstanceType, NumberValidation, ObjectValidation, RootSchema, Schema,
    SchemaObject, SingleOrVec, StringValidation, SubschemaValidation,
};
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

const MAX_DEPTH: usize = 64;

/// Decides whether a JSON value conforms to a schema
pub trait SchemaValidator: fmt::Debug {
    /// `Ok(())` on success, [`WorkbenchError::SchemaValidation`] listing the problems otherwise
    fn validate(&self, schema: &RootSchema, value: &Value) -> WorkbenchResult<()>;
}

/// Validator for the subset of JSON Schema that `schemars` emits
///
/// Supports types, `enum`, `const`, `$ref` into definitions, `allOf`,
/// `anyOf`, `oneOf`, `not`, numeric bounds, string lengths, array items
/// and bounds, object properties, required keys and additional properties,
/// string `pattern`s, and the `format`s `schemars` derives for integers,
/// dates, times and uuids. Other formats are accepted as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, schema: &RootSchema, value: &Value) -> WorkbenchResult<()> {
        let mut walker = Walker {
            root: schema,
            errors: Vec::new(),
        };
        walker.object(&schema.schema, value, "", 0);
        if walker.errors.is_empty() {
            Ok(())
        } else {
            Err(WorkbenchError::SchemaValidation(walker.errors.join("; ")))
        }
    }
}

struct Walker<'a> {
    root: &'a RootSchema,
    errors: Vec<String>,
}

impl<'a> Walker<'a> {
    fn fail(&mut self, path: &str, message: impl fmt::Display) {
        let at = if path.is_empty() { "/" } else { path };
        self.errors.push(format!("{at}: {message}"));
    }

    fn passes(&self, schema: &Schema, value: &Value, path: &str, depth: usize) -> bool {
        let mut trial = Walker {
            root: self.root,
            errors: Vec::new(),
        };
        trial.schema(schema, value, path, depth);
        trial.errors.is_empty()
    }

    fn schema(&mut self, schema: &Schema, value: &Value, path: &str, depth: usize) {
        match schema {
            Schema::Bool(true) => {}
            Schema::Bool(false) => self.fail(path, "no value is allowed here"),
            Schema::Object(object) => self.object(object, value, path, depth),
        }
    }

    fn object(&mut self, schema: &SchemaObject, value: &Value, path: &str, depth: usize) {
        if depth > MAX_DEPTH {
            self.fail(path, "schema nesting too deep");
            return;
        }

        if let Some(reference) = &schema.reference {
            let name = reference.trim_start_matches("#/definitions/");
            match self.root.definitions.get(name) {
                Some(target) => self.schema(target, value, path, depth + 1),
                None => self.fail(path, format!("unresolvable reference {reference}")),
            }
        }

        if let Some(instance_type) = &schema.instance_type {
            if !matches_instance_type(instance_type, value) {
                self.fail(path, format!("expected {}, found {}", describe(instance_type), kind_of(value)));
                return;
            }
        }

        if let Some(allowed) = &schema.enum_values {
            if !allowed.contains(value) {
                self.fail(path, format!("{value} is not one of the allowed values"));
            }
        }

        if let Some(expected) = &schema.const_value {
            if expected != value {
                self.fail(path, format!("expected constant {expected}"));
            }
        }

        if let Some(format) = &schema.format {
            self.format(format, value, path);
        }

        if let Some(subschemas) = &schema.subschemas {
            self.subschemas(subschemas, value, path, depth);
        }
        if let Some(number) = &schema.number {
            self.number(number, value, path);
        }
        if let Some(string) = &schema.string {
            self.string(string, value, path);
        }
        if let Some(array) = &schema.array {
            self.array(array, value, path, depth);
        }
        if let Some(object) = &schema.object {
            self.properties(object, value, path, depth);
        }
    }

    fn subschemas(&mut self, subschemas: &SubschemaValidation, value: &Value, path: &str, depth: usize) {
        if let Some(all_of) = &subschemas.all_of {
            for schema in all_of {
                self.schema(schema, value, path, depth + 1);
            }
        }
        if let Some(any_of) = &subschemas.any_of {
            if !any_of.iter().any(|schema| self.passes(schema, value, path, depth + 1)) {
                self.fail(path, "value matches none of the anyOf alternatives");
            }
        }
        if let Some(one_of) = &subschemas.one_of {
            let matching = one_of
                .iter()
                .filter(|schema| self.passes(schema, value, path, depth + 1))
                .count();
            if matching != 1 {
                self.fail(path, format!("value matches {matching} oneOf alternatives, expected exactly 1"));
            }
        }
        if let Some(not) = &subschemas.not {
            if self.passes(not, value, path, depth + 1) {
                self.fail(path, "value matches a forbidden schema");
            }
        }
    }

    fn number(&mut self, number: &NumberValidation, value: &Value, path: &str) {
        let Some(n) = value.as_f64() else {
            return;
        };
        if let Some(minimum) = number.minimum {
            if n < minimum {
                self.fail(path, format!("{n} is below the minimum {minimum}"));
            }
        }
        if let Some(maximum) = number.maximum {
            if n > maximum {
                self.fail(path, format!("{n} is above the maximum {maximum}"));
            }
        }
        if let Some(minimum) = number.exclusive_minimum {
            if n <= minimum {
                self.fail(path, format!("{n} must be greater than {minimum}"));
            }
        }
        if let Some(maximum) = number.exclusive_maximum {
            if n >= maximum {
                self.fail(path, format!("{n} must be less than {maximum}"));
            }
        }
        if let Some(step) = number.multiple_of {
            if step != 0.0 && (n / step).fract() != 0.0 {
                self.fail(path, format!("{n} is not a multiple of {step}"));
            }
        }
    }

    fn string(&mut self, string: &StringValidation, value: &Value, path: &str) {
        let Some(s) = value.as_str() else {
            return;
        };
        let length = s.chars().count() as u32;
        if let Some(min) = string.min_length {
            if length < min {
                self.fail(path, format!("string shorter than {min}"));
            }
        }
        if let Some(max) = string.max_length {
            if length > max {
                self.fail(path, format!("string longer than {max}"));
            }
        }
        if let Some(pattern) = &string.pattern {
            match Regex::new(pattern) {
                Ok(regex) if regex.is_match(s) => {}
                Ok(_) => self.fail(path, format!("'{s}' does not match pattern {pattern}")),
                Err(err) => self.fail(path, format!("invalid pattern {pattern}: {err}")),
            }
        }
    }

    fn format(&mut self, format: &str, value: &Value, path: &str) {
        let conforms = match (format, value) {
            (_, Value::Number(_)) => match integer_range(format) {
                Some((min, max)) => value
                    .as_i64()
                    .map(i128::from)
                    .or_else(|| value.as_u64().map(i128::from))
                    .or_else(|| value.as_f64().filter(|n| n.fract() == 0.0).map(|n| n as i128))
                    .is_some_and(|n| (min..=max).contains(&n)),
                None => true,
            },
            ("date-time", Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
            ("date", Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
            ("uuid", Value::String(s)) => uuid::Uuid::parse_str(s).is_ok(),
            _ => true,
        };
        if !conforms {
            self.fail(path, format!("{value} is not a valid {format}"));
        }
    }

    fn array(&mut self, array: &ArrayValidation, value: &Value, path: &str, depth: usize) {
        let Some(elements) = value.as_array() else {
            return;
        };
        let count = elements.len() as u32;
        if let Some(min) = array.min_items {
            if count < min {
                self.fail(path, format!("expected at least {min} items, found {count}"));
            }
        }
        if let Some(max) = array.max_items {
            if count > max {
                self.fail(path, format!("expected at most {max} items, found {count}"));
            }
        }
        if array.unique_items == Some(true) {
            let distinct: HashSet<String> = elements.iter().map(Value::to_string).collect();
            if distinct.len() != elements.len() {
                self.fail(path, "items are not unique");
            }
        }
        match &array.items {
            Some(SingleOrVec::Single(schema)) => {
                for (index, element) in elements.iter().enumerate() {
                    self.schema(schema, element, &format!("{path}/{index}"), depth + 1);
                }
            }
            Some(SingleOrVec::Vec(schemas)) => {
                for (index, element) in elements.iter().enumerate() {
                    let element_path = format!("{path}/{index}");
                    match schemas.get(index) {
                        Some(schema) => self.schema(schema, element, &element_path, depth + 1),
                        None => {
                            if let Some(additional) = &array.additional_items {
                                self.schema(additional, element, &element_path, depth + 1);
                            }
                        }
                    }
                }
            }
            None => {}
        }
    }

    fn properties(&mut self, object: &ObjectValidation, value: &Value, path: &str, depth: usize) {
        let Some(map) = value.as_object() else {
            return;
        };
        for required in &object.required {
            if !map.contains_key(required) {
                self.fail(path, format!("missing required property '{required}'"));
            }
        }
        let count = map.len() as u32;
        if let Some(min) = object.min_properties {
            if count < min {
                self.fail(path, format!("expected at least {min} properties"));
            }
        }
        if let Some(max) = object.max_properties {
            if count > max {
                self.fail(path, format!("expected at most {max} properties"));
            }
        }
        for (key, element) in map {
            let element_path = format!("{path}/{key}");
            match object.properties.get(key) {
                Some(schema) => self.schema(schema, element, &element_path, depth + 1),
                None => {
                    if let Some(additional) = &object.additional_properties {
                        if matches!(additional.as_ref(), Schema::Bool(false)) {
                            self.fail(&element_path, "unexpected property");
                        } else {
                            self.schema(additional, element, &element_path, depth + 1);
                        }
                    }
                }
            }
        }
    }
}

/// Inclusive bounds of the integer formats `schemars` emits
fn integer_range(format: &str) -> Option<(i128, i128)> {
    let range = match format {
        "int8" => (i8::MIN.into(), i8::MAX.into()),
        "int16" => (i16::MIN.into(), i16::MAX.into()),
        "int32" => (i32::MIN.into(), i32::MAX.into()),
        "int64" | "int" => (i64::MIN.into(), i64::MAX.into()),
        "uint8" => (0, u8::MAX.into()),
        "uint16" => (0, u16::MAX.into()),
        "uint32" => (0, u32::MAX.into()),
        "uint64" | "uint" => (0, u64::MAX.into()),
        _ => return None,
    };
    Some(range)
}

fn matches_instance_type(instance_type: &SingleOrVec<InstanceType>, value: &Value) -> bool {
    match instance_type {
        SingleOrVec::Single(single) => matches_single(single, value),
        SingleOrVec::Vec(types) => types.iter().any(|t| matches_single(t, value)),
    }
}

fn matches_single(instance_type: &InstanceType, value: &Value) -> bool {
    match instance_type {
        InstanceType::Null => value.is_null(),
        InstanceType::Boolean => value.is_boolean(),
        InstanceType::Object => value.is_object(),
        InstanceType::Array => value.is_array(),
        InstanceType::Number => value.is_number(),
        InstanceType::String => value.is_string(),
        InstanceType::Integer => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|n| n.fract() == 0.0)
        }
    }
}

fn describe(instance_type: &SingleOrVec<InstanceType>) -> String {
    match instance_type {
        SingleOrVec::Single(single) => format!("{single:?}").to_lowercase(),
        SingleOrVec::Vec(types) => types
            .iter()
            .map(|t| format!("{t:?}").to_lowercase())
            .collect::<Vec<_>>()
            .join(" or "),
    }
}

fn kind_of(value: &Value) -> &'static str {
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
    use super::*;
    use schemars::{schema_for, JsonSchema};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    enum Mode {
        Single,
        Multiple,
    }

    #[derive(Serialize, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct Selection {
        ensemble_ident: Option<String>,
        realizations: Vec<u32>,
        mode: Mode,
        opacity: f64,
    }

    fn validate(value: Value) -> WorkbenchResult<()> {
        JsonSchemaValidator::new().validate(&schema_for!(Selection), &value)
    }

    #[test]
    fn test_valid_document_passes() {
        validate(json!({
            "ensembleIdent": null,
            "realizations": [0, 1, 2],
            "mode": "single",
            "opacity": 0.5
        }))
        .unwrap();
    }

    #[test]
    fn test_wrong_type_fails_with_path() {
        let err = validate(json!({
            "ensembleIdent": "case::iter-0",
            "realizations": [0, "one"],
            "mode": "single",
            "opacity": 1
        }))
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("/realizations/1"), "{message}");
    }

    #[test]
    fn test_missing_required_and_bad_enum() {
        let err = validate(json!({ "mode": "sometimes", "opacity": 1.0 })).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing required property 'realizations'"), "{message}");
        assert!(message.contains("not one of the allowed values"), "{message}");
    }

    #[derive(Serialize, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct WellPick {
        #[schemars(regex(pattern = r"^[A-Z]-\d+$"))]
        well_name: String,
        zone_index: u8,
        picked_at: chrono::DateTime<chrono::Utc>,
        case_uuid: uuid::Uuid,
    }

    fn validate_pick(value: Value) -> WorkbenchResult<()> {
        JsonSchemaValidator::new().validate(&schema_for!(WellPick), &value)
    }

    #[test]
    fn test_pattern_and_formats_are_enforced() {
        validate_pick(json!({
            "wellName": "A-12",
            "zoneIndex": 3,
            "pickedAt": "2024-05-01T12:00:00Z",
            "caseUuid": "67e55044-10b1-426f-9247-bb680e5fe0c8"
        }))
        .unwrap();

        let message = validate_pick(json!({
            "wellName": "a12",
            "zoneIndex": 300,
            "pickedAt": "yesterday",
            "caseUuid": "not-a-uuid"
        }))
        .unwrap_err()
        .to_string();
        assert!(message.contains("/wellName: 'a12' does not match pattern"), "{message}");
        assert!(message.contains("/zoneIndex: 300 is not a valid uint8"), "{message}");
        assert!(message.contains("/pickedAt"), "{message}");
        assert!(message.contains("/caseUuid"), "{message}");
    }

    #[test]
    fn test_not_an_object() {
        assert!(validate(json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_bool_schemas() {
        let mut root = schema_for!(Selection);
        root.schema = SchemaObject::default();
        let validator = JsonSchemaValidator::new();
        validator.validate(&root, &json!("anything")).unwrap();

        let mut object = ObjectValidation::default();
        object.additional_properties = Some(Box::new(Schema::Bool(false)));
        root.schema.object = Some(Box::new(object));
        assert!(validator.validate(&root, &json!({ "x": 1 })).is_err());
        validator.validate(&root, &json!({})).unwrap();
    }
}
