// ── Tri-state desired fields ──
//
// A desired configuration distinguishes three states per field: not
// mentioned, explicitly cleared, explicitly set. Records are ordered maps
// of field name to state, tagged with the field's kind so that cleared
// fields know their canonical empty encoding.

use indexmap::IndexMap;
use proxly_api::encode::{EncodeProfile, decode};
use proxly_api::WireValue;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CoreError;

// ── DesiredField ────────────────────────────────────────────────────

/// One field of a desired configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DesiredField<T> {
    /// Not mentioned: never sent, never compared.
    #[default]
    Unset,
    /// Explicitly emptied: sent with the kind's canonical empty value.
    Cleared,
    /// Explicitly set.
    Value(T),
}

impl<T> DesiredField<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Unset | Self::Cleared => None,
        }
    }

    pub fn as_ref(&self) -> DesiredField<&T> {
        match self {
            Self::Unset => DesiredField::Unset,
            Self::Cleared => DesiredField::Cleared,
            Self::Value(v) => DesiredField::Value(v),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DesiredField<U> {
        match self {
            Self::Unset => DesiredField::Unset,
            Self::Cleared => DesiredField::Cleared,
            Self::Value(v) => DesiredField::Value(f(v)),
        }
    }
}

impl<T> From<Option<T>> for DesiredField<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unset, Self::Value)
    }
}

impl DesiredField<String> {
    /// Command-line convention: absent is unset, an empty string clears.
    pub fn from_input(input: Option<String>) -> Self {
        match input {
            None => Self::Unset,
            Some(s) if s.is_empty() => Self::Cleared,
            Some(s) => Self::Value(s),
        }
    }
}

// ── FieldKind / FieldValue ──────────────────────────────────────────

/// Wire type of a field. Decides the encoding profile, the canonical
/// empty value and how server snapshots are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    /// Comma-joined on the wire; compared as a set.
    List,
    /// Write-only; the server masks it on read.
    Secret,
    /// SSH public keys, stored percent-encoded by the server.
    KeyBlob,
}

/// A concrete field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    List(Vec<String>),
}

impl FieldValue {
    /// The raw (unencoded) wire text.
    pub fn wire_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Boolean(b) => (if *b { "1" } else { "0" }).to_owned(),
            Self::List(items) => items.join(","),
        }
    }
}

impl FieldKind {
    /// Canonical empty value sent for a cleared field.
    pub fn empty(self) -> FieldValue {
        match self {
            Self::Text | Self::Secret | Self::KeyBlob => FieldValue::Text(String::new()),
            Self::Integer => FieldValue::Integer(0),
            Self::Boolean => FieldValue::Boolean(false),
            Self::List => FieldValue::List(Vec::new()),
        }
    }

    pub fn profile(self) -> EncodeProfile {
        match self {
            Self::Secret => EncodeProfile::TokenSecret,
            Self::KeyBlob => EncodeProfile::KeyBlob,
            Self::Text | Self::Integer | Self::Boolean | Self::List => EncodeProfile::Generic,
        }
    }

    pub fn encode(self, value: &FieldValue) -> WireValue {
        WireValue::new(value.wire_text(), self.profile())
    }

    /// Interpret a JSON value (document input or server snapshot) as this kind.
    pub fn parse_json(self, value: &Value) -> Result<FieldValue, String> {
        match (self, value) {
            (Self::Integer, Value::Number(n)) => n
                .as_i64()
                .map(FieldValue::Integer)
                .ok_or_else(|| format!("{n} is not an integer")),
            (Self::Integer, Value::String(s)) => s
                .trim()
                .parse()
                .map(FieldValue::Integer)
                .map_err(|_| format!("'{s}' is not an integer")),
            (Self::Boolean, Value::Bool(b)) => Ok(FieldValue::Boolean(*b)),
            (Self::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(FieldValue::Boolean(false)),
                Some(1) => Ok(FieldValue::Boolean(true)),
                _ => Err(format!("{n} is not a boolean")),
            },
            (Self::Boolean, Value::String(s)) => parse_bool(s).map(FieldValue::Boolean),
            (Self::List, Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    other => Err(format!("list item {other} is not a string")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::List),
            (Self::List, Value::String(s)) => Ok(FieldValue::List(split_list(s))),
            (Self::Text | Self::Secret | Self::KeyBlob, Value::String(s)) => {
                Ok(FieldValue::Text(s.clone()))
            }
            (Self::Text, Value::Number(n)) => Ok(FieldValue::Text(n.to_string())),
            (kind, other) => Err(format!("{other} is not a valid {kind:?} value")),
        }
    }

    /// Whether `desired` already matches the server's current value.
    /// A missing or null current value equals the canonical empty value.
    pub fn matches_current(self, desired: &FieldValue, current: Option<&Value>) -> bool {
        let current = match current.filter(|v| !v.is_null()) {
            None => self.empty(),
            Some(v) => match self.parse_json(v) {
                Ok(parsed) => parsed,
                Err(_) => return false,
            },
        };

        match self {
            // Masked on read: only "empty vs empty" is knowable.
            Self::Secret => desired.wire_text().is_empty() && current.wire_text().is_empty(),
            Self::KeyBlob => {
                let stored = decode(&current.wire_text(), EncodeProfile::KeyBlob);
                key_lines(&String::from_utf8_lossy(&stored)) == key_lines(&desired.wire_text())
            }
            Self::List => {
                let (FieldValue::List(want), FieldValue::List(have)) = (desired, &current) else {
                    return false;
                };
                let mut want = want.clone();
                let mut have = have.clone();
                want.sort();
                want.dedup();
                have.sort();
                have.dedup();
                want == have
            }
            Self::Text | Self::Integer | Self::Boolean => *desired == current,
        }
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("'{other}' is not a boolean")),
    }
}

/// Split a server-side list (`a,b`, `a;b` or space separated).
pub fn split_list(s: &str) -> Vec<String> {
    s.split([',', ';', ' '])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn key_lines(s: &str) -> Vec<&str> {
    s.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

// ── FieldSpec ───────────────────────────────────────────────────────

/// Static description of one field of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Accepted on create only; the server rejects it on update.
    pub create_only: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            create_only: false,
        }
    }

    pub const fn create_only(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            create_only: true,
        }
    }
}

// ── DesiredRecord ───────────────────────────────────────────────────

/// A field's desired state plus its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEntry {
    pub kind: FieldKind,
    pub desired: DesiredField<FieldValue>,
}

impl DesiredEntry {
    /// The wire value to send, or `None` for unset fields.
    pub fn wire(&self) -> Option<WireValue> {
        match &self.desired {
            DesiredField::Unset => None,
            DesiredField::Cleared => Some(self.kind.encode(&self.kind.empty())),
            DesiredField::Value(v) => Some(self.kind.encode(v)),
        }
    }
}

/// Ordered map of field name to desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredRecord {
    fields: IndexMap<String, DesiredEntry>,
}

impl DesiredRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        kind: FieldKind,
        desired: DesiredField<FieldValue>,
    ) -> &mut Self {
        self.fields
            .insert(name.into(), DesiredEntry { kind, desired });
        self
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        desired: DesiredField<FieldValue>,
    ) -> Self {
        self.insert(name, kind, desired);
        self
    }

    pub fn text(self, name: &str, field: DesiredField<String>) -> Self {
        self.with(name, FieldKind::Text, field.map(FieldValue::Text))
    }

    pub fn secret(self, name: &str, field: DesiredField<String>) -> Self {
        self.with(name, FieldKind::Secret, field.map(FieldValue::Text))
    }

    pub fn key_blob(self, name: &str, field: DesiredField<String>) -> Self {
        self.with(name, FieldKind::KeyBlob, field.map(FieldValue::Text))
    }

    pub fn integer(self, name: &str, field: DesiredField<i64>) -> Self {
        self.with(name, FieldKind::Integer, field.map(FieldValue::Integer))
    }

    pub fn boolean(self, name: &str, field: DesiredField<bool>) -> Self {
        self.with(name, FieldKind::Boolean, field.map(FieldValue::Boolean))
    }

    pub fn list(self, name: &str, field: DesiredField<Vec<String>>) -> Self {
        self.with(name, FieldKind::List, field.map(FieldValue::List))
    }

    pub fn get(&self, name: &str) -> Option<&DesiredEntry> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<DesiredEntry> {
        self.fields.shift_remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DesiredEntry)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when no field is `Cleared` or `Value`.
    pub fn is_all_unset(&self) -> bool {
        self.fields.values().all(|e| e.desired.is_unset())
    }

    /// Names of fields that are not `Unset`, in order.
    pub fn explicit_fields(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, e)| !e.desired.is_unset())
            .map(|(k, _)| k)
            .collect()
    }

    /// Overlay `other` on top of this record; explicit entries win.
    pub fn merge(&mut self, other: &Self) {
        for (name, entry) in other.iter() {
            let keep_existing = entry.desired.is_unset() && self.fields.contains_key(name);
            if !keep_existing {
                self.fields.insert(name.to_owned(), entry.clone());
            }
        }
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &DesiredEntry) -> bool) {
        self.fields.retain(|k, v| keep(k, v));
    }

    // ── Typed accessors ─────────────────────────────────────────────

    fn field(&self, name: &str) -> DesiredField<&FieldValue> {
        self.get(name)
            .map_or(DesiredField::Unset, |e| e.desired.as_ref())
    }

    fn mismatch(name: &str, expected: &str) -> CoreError {
        CoreError::ValidationFailed {
            field: Some(name.to_owned()),
            message: format!("field '{name}' must be {expected}"),
        }
    }

    pub fn text_field(&self, name: &str) -> Result<DesiredField<String>, CoreError> {
        match self.field(name) {
            DesiredField::Unset => Ok(DesiredField::Unset),
            DesiredField::Cleared => Ok(DesiredField::Cleared),
            DesiredField::Value(v) => match v {
                FieldValue::Text(s) => Ok(DesiredField::Value(s.clone())),
                FieldValue::Integer(n) => Ok(DesiredField::Value(n.to_string())),
                _ => Err(Self::mismatch(name, "a string")),
            },
        }
    }

    pub fn integer_field(&self, name: &str) -> Result<DesiredField<i64>, CoreError> {
        match self.field(name) {
            DesiredField::Unset => Ok(DesiredField::Unset),
            DesiredField::Cleared => Ok(DesiredField::Cleared),
            DesiredField::Value(FieldValue::Integer(n)) => Ok(DesiredField::Value(*n)),
            DesiredField::Value(_) => Err(Self::mismatch(name, "an integer")),
        }
    }

    pub fn bool_field(&self, name: &str) -> Result<DesiredField<bool>, CoreError> {
        match self.field(name) {
            DesiredField::Unset => Ok(DesiredField::Unset),
            DesiredField::Cleared => Ok(DesiredField::Cleared),
            DesiredField::Value(FieldValue::Boolean(b)) => Ok(DesiredField::Value(*b)),
            DesiredField::Value(_) => Err(Self::mismatch(name, "a boolean")),
        }
    }

    pub fn list_field(&self, name: &str) -> Result<DesiredField<Vec<String>>, CoreError> {
        match self.field(name) {
            DesiredField::Unset => Ok(DesiredField::Unset),
            DesiredField::Cleared => Ok(DesiredField::Cleared),
            DesiredField::Value(FieldValue::List(items)) => Ok(DesiredField::Value(items.clone())),
            DesiredField::Value(FieldValue::Text(s)) => Ok(DesiredField::Value(split_list(s))),
            DesiredField::Value(_) => Err(Self::mismatch(name, "a list")),
        }
    }

    // ── Construction from JSON ──────────────────────────────────────

    /// Build a record from a JSON document: absent keys are unset,
    /// `null` clears, anything else is a value. Unknown keys are rejected.
    pub fn from_document(
        schema: &[FieldSpec],
        document: &Map<String, Value>,
    ) -> Result<Self, CoreError> {
        if let Some(unknown) = document
            .keys()
            .find(|k| !schema.iter().any(|f| f.name == k.as_str()))
        {
            return Err(CoreError::ValidationFailed {
                field: Some(unknown.clone()),
                message: format!("unknown field '{unknown}'"),
            });
        }

        let mut record = Self::new();
        for spec in schema {
            let desired = match document.get(spec.name) {
                None => DesiredField::Unset,
                Some(Value::Null) => DesiredField::Cleared,
                Some(v) => DesiredField::Value(spec.kind.parse_json(v).map_err(|message| {
                    CoreError::ValidationFailed {
                        field: Some(spec.name.to_owned()),
                        message,
                    }
                })?),
            };
            record.insert(spec.name, spec.kind, desired);
        }
        Ok(record)
    }

    /// Build a record mirroring a server snapshot: present fields are
    /// values, everything else is unset. Unparseable fields are skipped.
    pub fn from_snapshot(schema: &[FieldSpec], fields: &Map<String, Value>) -> Self {
        let mut record = Self::new();
        for spec in schema {
            let desired = fields
                .get(spec.name)
                .filter(|v| !v.is_null())
                .and_then(|v| spec.kind.parse_json(v).ok())
                .into();
            record.insert(spec.name, spec.kind, desired);
        }
        record
    }
}
