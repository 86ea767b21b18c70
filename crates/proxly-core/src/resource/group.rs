use crate::error::CoreError;
use crate::field::{DesiredField, DesiredRecord, FieldKind, FieldSpec};

use super::{ResourceConfig, ResourceDescriptor, ResourceKind, Scope, check_ident};

const FIELDS: &[FieldSpec] = &[FieldSpec::new("comment", FieldKind::Text)];

pub(super) fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        kind: ResourceKind::Group,
        collection: "access/groups",
        id_field: "groupid",
        fields: FIELDS,
        required_on_create: &[],
        create_at_item: false,
        config_suffix: None,
        async_create: false,
        async_update: false,
        async_delete: false,
    }
}

/// Access-control group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub groupid: String,
    pub comment: DesiredField<String>,
}

impl ResourceConfig for GroupConfig {
    const KIND: ResourceKind = ResourceKind::Group;

    fn fields() -> &'static [FieldSpec] {
        FIELDS
    }

    fn identifier(&self) -> String {
        self.groupid.clone()
    }

    fn validate(&self) -> Result<(), CoreError> {
        check_ident("groupid", &self.groupid)
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
            groupid: identifier.to_owned(),
            comment: record.text_field("comment")?,
        })
    }
}
