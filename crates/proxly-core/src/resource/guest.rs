// QEMU guests. Create, update and delete all answer with a task handle.

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::allocator::GuestId;
use crate::error::CoreError;
use crate::field::{DesiredField, DesiredRecord, FieldKind, FieldSpec};

use super::{ResourceConfig, ResourceDescriptor, ResourceKind, Scope, invalid};

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", FieldKind::Text),
    FieldSpec::new("memory", FieldKind::Integer),
    FieldSpec::new("cores", FieldKind::Integer),
    FieldSpec::new("sockets", FieldKind::Integer),
    FieldSpec::new("description", FieldKind::Text),
    FieldSpec::new("tags", FieldKind::List),
    FieldSpec::new("onboot", FieldKind::Boolean),
    FieldSpec::new("ciuser", FieldKind::Text),
    FieldSpec::new("cipassword", FieldKind::Secret),
    FieldSpec::new("sshkeys", FieldKind::KeyBlob),
    FieldSpec::create_only("pool", FieldKind::Text),
];

pub(super) fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        kind: ResourceKind::Guest,
        collection: "nodes/{node}/qemu",
        id_field: "vmid",
        fields: FIELDS,
        required_on_create: &[],
        create_at_item: false,
        config_suffix: Some("config"),
        async_create: true,
        async_update: true,
        async_delete: true,
    }
}

/// Power-state and lifecycle actions on a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString, EnumIter, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GuestAction {
    Start,
    Stop,
    Shutdown,
    Reboot,
    Suspend,
    Resume,
}

/// QEMU virtual machine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestConfig {
    pub node: String,
    pub vmid: GuestId,
    pub name: DesiredField<String>,
    /// Memory in MiB.
    pub memory: DesiredField<i64>,
    pub cores: DesiredField<i64>,
    pub sockets: DesiredField<i64>,
    pub description: DesiredField<String>,
    pub tags: DesiredField<Vec<String>>,
    pub onboot: DesiredField<bool>,
    pub ciuser: DesiredField<String>,
    pub cipassword: DesiredField<String>,
    /// Newline-separated OpenSSH public keys.
    pub sshkeys: DesiredField<String>,
    pub pool: DesiredField<String>,
}

impl GuestConfig {
    /// Empty config for `vmid` on `node`: every field unset.
    pub fn new(node: impl Into<String>, vmid: GuestId) -> Self {
        Self {
            node: node.into(),
            vmid,
            name: DesiredField::Unset,
            memory: DesiredField::Unset,
            cores: DesiredField::Unset,
            sockets: DesiredField::Unset,
            description: DesiredField::Unset,
            tags: DesiredField::Unset,
            onboot: DesiredField::Unset,
            ciuser: DesiredField::Unset,
            cipassword: DesiredField::Unset,
            sshkeys: DesiredField::Unset,
            pool: DesiredField::Unset,
        }
    }
}

fn check_range(field: &str, value: &DesiredField<i64>, min: i64, max: i64) -> Result<(), CoreError> {
    match value.value() {
        Some(v) if !(min..=max).contains(v) => Err(invalid(
            field,
            format!("{field} must be between {min} and {max}, got {v}"),
        )),
        _ => Ok(()),
    }
}

/// Guest names are DNS labels joined by dots.
fn check_dns_name(name: &str) -> Result<(), CoreError> {
    let valid = !name.is_empty()
        && name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(())
    } else {
        Err(invalid("name", format!("'{name}' is not a valid DNS name")))
    }
}

impl ResourceConfig for GuestConfig {
    const KIND: ResourceKind = ResourceKind::Guest;

    fn fields() -> &'static [FieldSpec] {
        FIELDS
    }

    fn identifier(&self) -> String {
        self.vmid.to_string()
    }

    fn scope(&self) -> Scope {
        Scope::node(self.node.clone())
    }

    fn validate(&self) -> Result<(), CoreError> {
        if let Some(name) = self.name.value() {
            check_dns_name(name)?;
        }
        check_range("memory", &self.memory, 16, 4 * 1024 * 1024)?;
        check_range("cores", &self.cores, 1, 8192)?;
        check_range("sockets", &self.sockets, 1, 4)?;
        if let Some(keys) = self.sshkeys.value() {
            let bad = keys
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .find(|l| l.split_whitespace().count() < 2);
            if let Some(line) = bad {
                return Err(invalid("sshkeys", format!("'{line}' is not an OpenSSH public key")));
            }
        }
        Ok(())
    }

    fn to_desired(&self) -> DesiredRecord {
        DesiredRecord::new()
            .text("name", self.name.clone())
            .integer("memory", self.memory.clone())
            .integer("cores", self.cores.clone())
            .integer("sockets", self.sockets.clone())
            .text("description", self.description.clone())
            .list("tags", self.tags.clone())
            .boolean("onboot", self.onboot.clone())
            .text("ciuser", self.ciuser.clone())
            .secret("cipassword", self.cipassword.clone())
            .key_blob("sshkeys", self.sshkeys.clone())
            .text("pool", self.pool.clone())
    }

    fn from_desired(
        identifier: &str,
        scope: &Scope,
        record: &DesiredRecord,
    ) -> Result<Self, CoreError> {
        let vmid: GuestId = identifier.parse()?;
        Ok(Self {
            node: scope.require_node()?.to_owned(),
            vmid,
            name: record.text_field("name")?,
            memory: record.integer_field("memory")?,
            cores: record.integer_field("cores")?,
            sockets: record.integer_field("sockets")?,
            description: record.text_field("description")?,
            tags: record.list_field("tags")?,
            onboot: record.bool_field("onboot")?,
            ciuser: record.text_field("ciuser")?,
            cipassword: record.text_field("cipassword")?,
            sshkeys: record.text_field("sshkeys")?,
            pool: record.text_field("pool")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::reconcile::{ReconciliationPlan, Snapshot, plan};

    fn guest() -> GuestConfig {
        GuestConfig::new("pve1", GuestId::new(100).unwrap())
    }

    #[test]
    fn requires_node_and_valid_vmid() {
        let record = DesiredRecord::new();
        assert!(GuestConfig::from_desired("100", &Scope::default(), &record).is_err());
        assert!(GuestConfig::from_desired("42", &Scope::node("pve1"), &record).is_err());
        assert!(GuestConfig::from_desired("abc", &Scope::node("pve1"), &record).is_err());
        assert!(GuestConfig::from_desired("100", &Scope::node("pve1"), &record).is_ok());
    }

    #[test]
    fn validates_name_and_ranges() {
        let mut g = guest();
        g.name = DesiredField::Value("web-01.lab".into());
        g.memory = DesiredField::Value(2048);
        assert!(g.validate().is_ok());

        g.name = DesiredField::Value("web_01".into());
        assert!(g.validate().is_err());

        g.name = DesiredField::Unset;
        g.sockets = DesiredField::Value(9);
        assert!(matches!(
            g.validate(),
            Err(CoreError::ValidationFailed { field: Some(ref f), .. }) if f == "sockets"
        ));
    }

    #[test]
    fn update_encodes_secret_and_key_blob_fields() {
        let mut g = guest();
        g.cipassword = DesiredField::Value("p@ss(1)!".into());
        g.sshkeys = DesiredField::Value("ssh-ed25519 AAAA me@box".into());
        let current = Snapshot::new("100", json!({ "name": "web-01" }).as_object().unwrap().clone());

        let ReconciliationPlan::Update { payload, .. } = plan(&g.to_desired(), Some(&current)) else {
            panic!("expected update");
        };
        assert_eq!(
            payload.to_urlencoded(),
            "cipassword=p%40ss(1)!&sshkeys=ssh-ed25519%2520AAAA%2520me%2540box"
        );
    }

    #[test]
    fn unchanged_key_blob_is_noop() {
        let mut g = guest();
        g.sshkeys = DesiredField::Value("ssh-ed25519 AAAA me@box".into());
        let current = Snapshot::new(
            "100",
            json!({ "sshkeys": "ssh-ed25519%20AAAA%20me%40box%0A" }).as_object().unwrap().clone(),
        );
        assert!(plan(&g.to_desired(), Some(&current)).is_noop());
    }

    #[test]
    fn actions_parse_from_lowercase() {
        assert_eq!("shutdown".parse::<GuestAction>().unwrap(), GuestAction::Shutdown);
        assert_eq!(GuestAction::Resume.as_ref(), "resume");
    }
}
