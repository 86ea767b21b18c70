// ── Config reconciler ──
//
// Decides whether a desired record needs a create, an update with only the
// differing fields, or nothing at all. Pure: the caller fetches the
// snapshot and applies the plan.

use proxly_api::FormBody;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::field::DesiredRecord;

/// Current server-side state of one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub identifier: String,
    pub fields: Map<String, Value>,
}

impl Snapshot {
    pub fn new(identifier: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            identifier: identifier.into(),
            fields,
        }
    }
}

/// What applying a desired record requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationPlan {
    /// Resource is absent: send every explicit field.
    Create(FormBody),
    /// Resource exists: send only the fields that differ.
    Update {
        identifier: String,
        payload: FormBody,
    },
    NoOp,
}

impl ReconciliationPlan {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    pub fn payload(&self) -> Option<&FormBody> {
        match self {
            Self::Create(payload) | Self::Update { payload, .. } => Some(payload),
            Self::NoOp => None,
        }
    }
}

/// Result of deleting a resource. Deleting an absent resource succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteOutcome {
    Deleted,
    DidNotExist,
}

/// Plan the operation that takes `current` to `desired`.
///
/// A record with no explicit field is always `NoOp`, even for an absent
/// resource: an empty create is not a plan.
pub fn plan(desired: &DesiredRecord, current: Option<&Snapshot>) -> ReconciliationPlan {
    if desired.is_all_unset() {
        return ReconciliationPlan::NoOp;
    }

    let Some(current) = current else {
        let payload = desired
            .iter()
            .filter_map(|(name, entry)| entry.wire().map(|w| (name.to_owned(), w)))
            .collect();
        return ReconciliationPlan::Create(payload);
    };

    let mut payload = FormBody::new();
    for (name, entry) in desired.iter() {
        let Some(wire) = entry.wire() else { continue };
        let desired_value = match entry.desired.value() {
            Some(v) => v.clone(),
            None => entry.kind.empty(),
        };
        if !entry
            .kind
            .matches_current(&desired_value, current.fields.get(name))
        {
            payload.push(name, wire);
        }
    }

    if payload.is_empty() {
        ReconciliationPlan::NoOp
    } else {
        ReconciliationPlan::Update {
            identifier: current.identifier.clone(),
            payload,
        }
    }
}
