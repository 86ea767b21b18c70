use crate::error::CoreError;
use crate::field::{DesiredField, DesiredRecord, FieldKind, FieldSpec};

use super::{
    ResourceConfig, ResourceDescriptor, ResourceKind, Scope, check_ident, check_userid, invalid,
};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("email", FieldKind::Text),
    FieldSpec::new("firstname", FieldKind::Text),
    FieldSpec::new("lastname", FieldKind::Text),
    FieldSpec::new("enable", FieldKind::Boolean),
    FieldSpec::new("expire", FieldKind::Integer),
    FieldSpec::new("groups", FieldKind::List),
    FieldSpec::new("comment", FieldKind::Text),
    FieldSpec::create_only("password", FieldKind::Secret),
];

pub(super) fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        kind: ResourceKind::User,
        collection: "access/users",
        id_field: "userid",
        fields: FIELDS,
        required_on_create: &[],
        create_at_item: false,
        config_suffix: None,
        async_create: false,
        async_update: false,
        async_delete: false,
    }
}

/// User account (`name@realm`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    pub userid: String,
    pub email: DesiredField<String>,
    pub firstname: DesiredField<String>,
    pub lastname: DesiredField<String>,
    pub enable: DesiredField<bool>,
    /// Account expiry, seconds since the epoch; 0 never expires.
    pub expire: DesiredField<i64>,
    pub groups: DesiredField<Vec<String>>,
    pub comment: DesiredField<String>,
    /// Initial password (realm `pve` only).
    pub password: DesiredField<String>,
}

impl ResourceConfig for UserConfig {
    const KIND: ResourceKind = ResourceKind::User;

    fn fields() -> &'static [FieldSpec] {
        FIELDS
    }

    fn identifier(&self) -> String {
        self.userid.clone()
    }

    fn validate(&self) -> Result<(), CoreError> {
        check_userid("userid", &self.userid)?;
        if let Some(email) = self.email.value() {
            if !email.contains('@') {
                return Err(invalid("email", format!("'{email}' is not an email address")));
            }
        }
        if self.expire.value().is_some_and(|e| *e < 0) {
            return Err(invalid("expire", "expire must not be negative"));
        }
        if let Some(groups) = self.groups.value() {
            for group in groups {
                check_ident("groups", group)?;
            }
        }
        if self.password.value().is_some_and(|p| p.len() < 8) {
            return Err(invalid("password", "password must be at least 8 characters"));
        }
        Ok(())
    }

    fn to_desired(&self) -> DesiredRecord {
        DesiredRecord::new()
            .text("email", self.email.clone())
            .text("firstname", self.firstname.clone())
            .text("lastname", self.lastname.clone())
            .boolean("enable", self.enable.clone())
            .integer("expire", self.expire.clone())
            .list("groups", self.groups.clone())
            .text("comment", self.comment.clone())
            .secret("password", self.password.clone())
    }

    fn from_desired(
        identifier: &str,
        _scope: &Scope,
        record: &DesiredRecord,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            userid: identifier.to_owned(),
            email: record.text_field("email")?,
            firstname: record.text_field("firstname")?,
            lastname: record.text_field("lastname")?,
            enable: record.bool_field("enable")?,
            expire: record.integer_field("expire")?,
            groups: record.list_field("groups")?,
            comment: record.text_field("comment")?,
            password: record.text_field("password")?,
        })
    }
}
