use crate::error::CoreError;
use crate::field::{DesiredField, DesiredRecord, FieldKind, FieldSpec};

use super::{ResourceConfig, ResourceDescriptor, ResourceKind, Scope, check_ident};

const FIELDS: &[FieldSpec] = &[FieldSpec::new("comment", FieldKind::Text)];

pub(super) fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        kind: ResourceKind::Pool,
        collection: "pools",
        id_field: "poolid",
        fields: FIELDS,
        required_on_create: &[],
        create_at_item: false,
        config_suffix: None,
        async_create: false,
        async_update: false,
        async_delete: false,
    }
}

/// Resource pool grouping guests and storage for permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub poolid: String,
    pub comment: DesiredField<String>,
}

impl ResourceConfig for PoolConfig {
    const KIND: ResourceKind = ResourceKind::Pool;

    fn fields() -> &'static [FieldSpec] {
        FIELDS
    }

    fn identifier(&self) -> String {
        self.poolid.clone()
    }

    fn validate(&self) -> Result<(), CoreError> {
        check_ident("poolid", &self.poolid)
    }

    fn to_desired(&self) -> DesiredRecord {
        DesiredRecord::new().text("comment", self.comment.clone())
    }

    fn from_desired(
        identifier: &str,
        _scope: &Scope,
        record: &DesiredRecord,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            poolid: identifier.to_owned(),
            comment: record.text_field("comment")?,
        })
    }
}
