//! Per-conversation slot state.
//!
//! A [`SlotState`] always holds exactly the fixed set of [`SlotField`]s.
//! Extraction can only fill or overwrite fields (never clear them), and
//! `bmi` is only ever written by [`SlotState::derive_bmi`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::DerivedComputationError;

// =============================================================================
// SlotField
// =============================================================================

/// One named fact tracked per conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotField {
    Age,
    Sex,
    Smoker,
    Children,
    Region,
    Height,
    Weight,
    Bmi,
}

impl SlotField {
    /// Every field, in snapshot order.
    pub const ALL: [SlotField; 8] = [
        SlotField::Age,
        SlotField::Sex,
        SlotField::Smoker,
        SlotField::Children,
        SlotField::Region,
        SlotField::Height,
        SlotField::Weight,
        SlotField::Bmi,
    ];

    /// Fields that must be set before a conversation is complete.
    pub const REQUIRED: [SlotField; 6] = [
        SlotField::Age,
        SlotField::Sex,
        SlotField::Smoker,
        SlotField::Children,
        SlotField::Region,
        SlotField::Bmi,
    ];

    /// Wire name of the field.
    pub fn key(self) -> &'static str {
        match self {
            SlotField::Age => "age",
            SlotField::Sex => "sex",
            SlotField::Smoker => "smoker",
            SlotField::Children => "children",
            SlotField::Region => "region",
            SlotField::Height => "height",
            SlotField::Weight => "weight",
            SlotField::Bmi => "bmi",
        }
    }

    /// Parse a wire name, ignoring surrounding whitespace and case.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.key().eq_ignore_ascii_case(key))
    }

    /// Whether the field is computed from other fields instead of extracted.
    pub fn is_derived(self) -> bool {
        matches!(self, SlotField::Bmi)
    }

    /// Whether the field holds a quantity rather than a category.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            SlotField::Age
                | SlotField::Children
                | SlotField::Height
                | SlotField::Weight
                | SlotField::Bmi
        )
    }

    /// Human-readable name used when asking the user for the field.
    pub fn label(self) -> &'static str {
        match self {
            SlotField::Age => "age",
            SlotField::Sex => "sex",
            SlotField::Smoker => "smoking status",
            SlotField::Children => "number of children",
            SlotField::Region => "city or region of residence",
            SlotField::Height => "height in centimeters",
            SlotField::Weight => "weight in kilograms",
            SlotField::Bmi => "body mass index",
        }
    }
}

impl fmt::Display for SlotField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// =============================================================================
// SlotValue
// =============================================================================

/// Scalar value held by a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Number(Number),
    Text(String),
}

impl SlotValue {
    /// Numeric value; integral values are stored as integers.
    ///
    /// Returns `None` for NaN and infinities.
    pub fn number(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        if value.fract() == 0.0 && value.abs() < 1e15 {
            return Some(SlotValue::Number(Number::from(value as i64)));
        }
        Number::from_f64(value).map(SlotValue::Number)
    }

    pub fn text(value: impl Into<String>) -> Self {
        SlotValue::Text(value.into())
    }

    /// Numeric reading of the value.
    ///
    /// Text is accepted when it is a number optionally followed by words,
    /// e.g. `"175"`, `"70 kg"` or `"35 years old."`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SlotValue::Number(n) => n.as_f64(),
            SlotValue::Text(s) => parse_leading_number(s),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SlotValue::Text(s) => Some(s),
            SlotValue::Number(_) => None,
        }
    }

    /// Normalize one value produced by extraction for `field`.
    ///
    /// Returns `None` for anything that counts as "not mentioned": JSON
    /// null, the literal string `"null"`, blank strings, arrays and objects.
    pub fn from_extracted(field: SlotField, raw: &Value) -> Option<Self> {
        let value = match raw {
            Value::Null | Value::Array(_) | Value::Object(_) => return None,
            Value::Bool(b) => SlotValue::text(if *b { "yes" } else { "no" }),
            Value::Number(n) => SlotValue::Number(n.clone()),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                    return None;
                }
                SlotValue::text(trimmed)
            }
        };

        if field.is_numeric() {
            // Keep unparseable text; bmi derivation reports it later.
            return Some(value.as_f64().and_then(SlotValue::number).unwrap_or(value));
        }

        match value {
            SlotValue::Text(s) if matches!(field, SlotField::Sex | SlotField::Smoker) => {
                Some(SlotValue::Text(s.to_lowercase()))
            }
            other => Some(other),
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotValue::Number(n) => write!(f, "{}", n),
            SlotValue::Text(s) => f.write_str(s),
        }
    }
}

fn parse_leading_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+'))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    let (number, rest) = trimmed.split_at(end);
    let suffix = rest.trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    if !suffix.chars().all(|c| c.is_alphabetic() || c.is_whitespace()) {
        return None;
    }
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

// =============================================================================
// ExtractionDelta
// =============================================================================

/// Partial slot update produced by one extraction call.
///
/// Never contains derived fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtractionDelta {
    values: BTreeMap<SlotField, SlotValue>,
}

impl ExtractionDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a delta from a decoded JSON object.
    ///
    /// Unknown keys, derived fields and "not mentioned" values are dropped.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let mut delta = Self::new();
        for (key, raw) in object {
            let Some(field) = SlotField::from_key(key) else {
                continue;
            };
            if let Some(value) = SlotValue::from_extracted(field, raw) {
                delta.insert(field, value);
            }
        }
        delta
    }

    /// Add a value. Derived fields are ignored.
    pub fn insert(&mut self, field: SlotField, value: SlotValue) {
        if !field.is_derived() {
            self.values.insert(field, value);
        }
    }

    pub fn get(&self, field: SlotField) -> Option<&SlotValue> {
        self.values.get(&field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotField, &SlotValue)> {
        self.values.iter().map(|(field, value)| (*field, value))
    }
}

// =============================================================================
// SlotState
// =============================================================================

/// The facts known about one conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SlotState {
    values: BTreeMap<SlotField, Option<SlotValue>>,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            values: SlotField::ALL.into_iter().map(|f| (f, None)).collect(),
        }
    }
}

impl SlotState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: SlotField) -> Option<&SlotValue> {
        self.values.get(&field).and_then(Option::as_ref)
    }

    pub fn is_set(&self, field: SlotField) -> bool {
        self.get(field).is_some()
    }

    /// Overwrite one field.
    pub fn set(&mut self, field: SlotField, value: SlotValue) {
        self.values.insert(field, Some(value));
    }

    /// All fields with their current values, in snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotField, Option<&SlotValue>)> {
        self.values.iter().map(|(field, value)| (*field, value.as_ref()))
    }

    /// Merge an extraction delta (monotonic fill).
    ///
    /// Returns the fields whose value actually changed.
    pub fn apply(&mut self, delta: &ExtractionDelta) -> Vec<SlotField> {
        let mut changed = Vec::new();
        for (field, value) in delta.iter() {
            if field.is_derived() || self.get(field) == Some(value) {
                continue;
            }
            self.set(field, value.clone());
            changed.push(field);
        }
        changed
    }

    /// Recompute `bmi` from `height` (cm) and `weight` (kg).
    ///
    /// On error the previous `bmi` is left untouched.
    pub fn derive_bmi(&mut self) -> Result<f64, DerivedComputationError> {
        let height = self.numeric(SlotField::Height)?;
        let weight = self.numeric(SlotField::Weight)?;
        if height <= 0.0 {
            return Err(DerivedComputationError::NonPositiveHeight(height));
        }

        let meters = height / 100.0;
        let bmi = round2(weight / (meters * meters));
        let value = SlotValue::number(bmi).ok_or(DerivedComputationError::NotFinite)?;
        self.set(SlotField::Bmi, value);
        Ok(bmi)
    }

    /// True once every required field is set.
    pub fn is_complete(&self) -> bool {
        SlotField::REQUIRED.iter().all(|f| self.is_set(*f))
    }

    /// Required fields that are still unset.
    pub fn missing_required(&self) -> Vec<SlotField> {
        SlotField::REQUIRED
            .into_iter()
            .filter(|f| !self.is_set(*f))
            .collect()
    }

    /// Fields to ask the user about.
    ///
    /// Derived fields are replaced by whichever of their inputs are unset.
    pub fn fields_to_ask(&self) -> Vec<SlotField> {
        let mut fields = Vec::new();
        for field in self.missing_required() {
            if field.is_derived() {
                fields.extend(
                    [SlotField::Height, SlotField::Weight]
                        .into_iter()
                        .filter(|f| !self.is_set(*f)),
                );
            } else {
                fields.push(field);
            }
        }
        fields
    }

    fn numeric(&self, field: SlotField) -> Result<f64, DerivedComputationError> {
        let value = self
            .get(field)
            .ok_or(DerivedComputationError::Missing(field.key()))?;
        value
            .as_f64()
            .ok_or_else(|| DerivedComputationError::NonNumeric {
                field: field.key(),
                value: value.to_string(),
            })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// =============================================================================
// Tests
// =============================================================================
