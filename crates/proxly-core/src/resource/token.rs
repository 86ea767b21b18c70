use crate::error::CoreError;
use crate::field::{DesiredField, DesiredRecord, FieldKind, FieldSpec};

use super::{
    ResourceConfig, ResourceDescriptor, ResourceKind, Scope, check_ident, check_userid, invalid,
};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("comment", FieldKind::Text),
    FieldSpec::new("expire", FieldKind::Integer),
    FieldSpec::new("privsep", FieldKind::Boolean),
];

pub(super) fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        kind: ResourceKind::Token,
        collection: "access/users/{user}/token",
        id_field: "tokenid",
        fields: FIELDS,
        required_on_create: &[],
        create_at_item: true,
        config_suffix: None,
        async_create: false,
        async_update: false,
        async_delete: false,
    }
}

/// API token owned by a user. The secret is only returned by create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub userid: String,
    pub tokenid: String,
    pub comment: DesiredField<String>,
    pub expire: DesiredField<i64>,
    /// Privilege separation: the token gets its own ACLs instead of the user's.
    pub privsep: DesiredField<bool>,
}

impl ResourceConfig for TokenConfig {
    const KIND: ResourceKind = ResourceKind::Token;

    fn fields() -> &'static [FieldSpec] {
        FIELDS
    }

    fn identifier(&self) -> String {
        self.tokenid.clone()
    }

    fn scope(&self) -> Scope {
        Scope::user(self.userid.clone())
    }

    fn validate(&self) -> Result<(), CoreError> {
        check_userid("userid", &self.userid)?;
        check_ident("tokenid", &self.tokenid)?;
        if self.expire.value().is_some_and(|e| *e < 0) {
            return Err(invalid("expire", "expire must not be negative"));
        }
        Ok(())
    }

    fn to_desired(&self) -> DesiredRecord {
        DesiredRecord::new()
            .text("comment", self.comment.clone())
            .integer("expire", self.expire.clone())
            .boolean("privsep", self.privsep.clone())
    }

    fn from_desired(
        identifier: &str,
        scope: &Scope,
        record: &DesiredRecord,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            userid: scope.require_user()?.to_owned(),
            tokenid: identifier.to_owned(),
            comment: record.text_field("comment")?,
            expire: record.integer_field("expire")?,
            privsep: record.bool_field("privsep")?,
        })
    }
}
