use crate::error::CoreError;
use crate::field::{DesiredField, DesiredRecord, FieldKind, FieldSpec};

use super::{ResourceConfig, ResourceDescriptor, ResourceKind, Scope, check_ident, invalid};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::create_only("type", FieldKind::Text),
    FieldSpec::new("path", FieldKind::Text),
    FieldSpec::new("content", FieldKind::List),
    FieldSpec::new("nodes", FieldKind::List),
    FieldSpec::new("disable", FieldKind::Boolean),
];

/// Content types a storage may hold.
const CONTENT_TYPES: &[&str] = &[
    "images", "rootdir", "vztmpl", "iso", "backup", "snippets", "import",
];

pub(super) fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        kind: ResourceKind::Storage,
        collection: "storage",
        id_field: "storage",
        fields: FIELDS,
        required_on_create: &["type"],
        create_at_item: false,
        config_suffix: None,
        async_create: false,
        async_update: false,
        async_delete: false,
    }
}

/// Cluster-wide storage definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub storage: String,
    /// Backend type (`dir`, `nfs`, `lvmthin`, ...). Fixed after creation.
    pub storage_type: DesiredField<String>,
    pub path: DesiredField<String>,
    pub content: DesiredField<Vec<String>>,
    /// Nodes the storage is available on; empty means all.
    pub nodes: DesiredField<Vec<String>>,
    pub disable: DesiredField<bool>,
}

impl ResourceConfig for StorageConfig {
    const KIND: ResourceKind = ResourceKind::Storage;

    fn fields() -> &'static [FieldSpec] {
        FIELDS
    }

    fn identifier(&self) -> String {
        self.storage.clone()
    }

    fn validate(&self) -> Result<(), CoreError> {
        check_ident("storage", &self.storage)?;
        if let Some(t) = self.storage_type.value() {
            check_ident("type", t)?;
        }
        if let Some(path) = self.path.value() {
            if !path.starts_with('/') {
                return Err(invalid("path", format!("'{path}' must be an absolute path")));
            }
        }
        if let Some(content) = self.content.value() {
            if let Some(bad) = content.iter().find(|c| !CONTENT_TYPES.contains(&c.as_str())) {
                return Err(invalid(
                    "content",
                    format!("unknown content type '{bad}' (expected one of {})", CONTENT_TYPES.join(", ")),
                ));
            }
        }
        Ok(())
    }

    fn to_desired(&self) -> DesiredRecord {
        DesiredRecord::new()
            .text("type", self.storage_type.clone())
            .text("path", self.path.clone())
            .list("content", self.content.clone())
            .list("nodes", self.nodes.clone())
            .boolean("disable", self.disable.clone())
    }

    fn from_desired(
        identifier: &str,
        _scope: &Scope,
        record: &DesiredRecord,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            storage: identifier.to_owned(),
            storage_type: record.text_field("type")?,
            path: record.text_field("path")?,
            content: record.list_field("content")?,
            nodes: record.list_field("nodes")?,
            disable: record.bool_field("disable")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn storage() -> StorageConfig {
        StorageConfig::from_desired("backup-nfs", &Scope::default(), &DesiredRecord::new()).unwrap()
    }

    #[test]
    fn content_types_are_checked() {
        let mut s = storage();
        s.content = DesiredField::Value(vec!["backup".into(), "iso".into()]);
        assert!(s.validate().is_ok());
        s.content = DesiredField::Value(vec!["movies".into()]);
        assert!(matches!(
            s.validate(),
            Err(CoreError::ValidationFailed { field: Some(ref f), .. }) if f == "content"
        ));
    }

    #[test]
    fn relative_paths_are_rejected() {
        let mut s = storage();
        s.path = DesiredField::Value("mnt/backup".into());
        assert!(s.validate().is_err());
    }
}
