// ── Managed resource kinds ──
//
// Every kind the client can create, update, read and delete is described
// twice: statically by a `ResourceDescriptor` (paths, id field, schema),
// and as a typed config implementing `ResourceConfig`. `ResourceSpec`
// selects between the typed configs by `ResourceKind`.

mod group;
mod guest;
mod pool;
mod storage;
mod token;
mod user;

use indexmap::IndexMap;
use proxly_api::{Method, segment};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::CoreError;
use crate::field::{DesiredRecord, FieldSpec};

pub use group::GroupConfig;
pub use guest::{GuestAction, GuestConfig};
pub use pool::PoolConfig;
pub use storage::StorageConfig;
pub use token::TokenConfig;
pub use user::UserConfig;

// ── ResourceKind ────────────────────────────────────────────────────

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResourceKind {
    Group,
    User,
    Pool,
    Token,
    Storage,
    Guest,
}

/// Parent objects a kind's paths depend on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Node hosting a guest.
    pub node: Option<String>,
    /// User owning a token.
    pub user: Option<String>,
}

impl Scope {
    pub fn node(node: impl Into<String>) -> Self {
        Self {
            node: Some(node.into()),
            user: None,
        }
    }

    pub fn user(user: impl Into<String>) -> Self {
        Self {
            node: None,
            user: Some(user.into()),
        }
    }

    pub(crate) fn require_node(&self) -> Result<&str, CoreError> {
        self.node.as_deref().ok_or_else(|| CoreError::Config {
            message: "a node is required for guest operations".into(),
        })
    }

    pub(crate) fn require_user(&self) -> Result<&str, CoreError> {
        self.user.as_deref().ok_or_else(|| CoreError::Config {
            message: "a user is required for token operations".into(),
        })
    }
}

// ── ResourceDescriptor ──────────────────────────────────────────────

/// Static facts about one resource kind.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    /// Collection path; `{node}` and `{user}` are filled from the scope.
    pub collection: &'static str,
    /// Field naming the resource in create bodies and listings.
    pub id_field: &'static str,
    pub fields: &'static [FieldSpec],
    /// Fields that must be explicit when creating.
    pub required_on_create: &'static [&'static str],
    /// Create targets the item path (id in the URL) instead of the collection.
    pub create_at_item: bool,
    /// Sub-path of the item holding its editable configuration.
    pub config_suffix: Option<&'static str>,
    pub async_create: bool,
    pub async_update: bool,
    pub async_delete: bool,
}

impl ResourceDescriptor {
    pub fn collection_path(&self, scope: &Scope) -> Result<String, CoreError> {
        let mut path = self.collection.to_owned();
        if path.contains("{node}") {
            path = path.replace("{node}", &segment(scope.require_node()?));
        }
        if path.contains("{user}") {
            path = path.replace("{user}", &segment(scope.require_user()?));
        }
        Ok(path)
    }

    pub fn item_path(&self, identifier: &str, scope: &Scope) -> Result<String, CoreError> {
        Ok(format!(
            "{}/{}",
            self.collection_path(scope)?,
            segment(identifier)
        ))
    }

    /// Path read by `get` and written by `update`.
    pub fn config_path(&self, identifier: &str, scope: &Scope) -> Result<String, CoreError> {
        let item = self.item_path(identifier, scope)?;
        Ok(match self.config_suffix {
            Some(suffix) => format!("{item}/{suffix}"),
            None => item,
        })
    }

    /// Asynchronous updates are POSTed and answer with a task.
    pub fn update_method(&self) -> Method {
        if self.async_update {
            Method::POST
        } else {
            Method::PUT
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ── ResourceRegistry ────────────────────────────────────────────────

/// Maps each kind to its descriptor. Built once and passed down.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    descriptors: IndexMap<ResourceKind, ResourceDescriptor>,
}

impl ResourceRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for kind in ResourceKind::iter() {
            registry.register(builtin_descriptor(kind));
        }
        registry
    }

    pub fn register(&mut self, descriptor: ResourceDescriptor) -> &mut Self {
        self.descriptors.insert(descriptor.kind, descriptor);
        self
    }

    pub fn descriptor(&self, kind: ResourceKind) -> Result<&ResourceDescriptor, CoreError> {
        self.descriptors
            .get(&kind)
            .ok_or_else(|| CoreError::Config {
                message: format!("resource kind '{kind}' is not registered"),
            })
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.descriptors.keys().copied()
    }
}

fn builtin_descriptor(kind: ResourceKind) -> ResourceDescriptor {
    match kind {
        ResourceKind::Group => group::descriptor(),
        ResourceKind::User => user::descriptor(),
        ResourceKind::Pool => pool::descriptor(),
        ResourceKind::Token => token::descriptor(),
        ResourceKind::Storage => storage::descriptor(),
        ResourceKind::Guest => guest::descriptor(),
    }
}

// ── ResourceConfig ──────────────────────────────────────────────────

/// Capability set implemented once per resource kind.
pub trait ResourceConfig: Sized {
    const KIND: ResourceKind;

    /// Field schema shared with the descriptor.
    fn fields() -> &'static [FieldSpec];

    fn kind(&self) -> ResourceKind {
        Self::KIND
    }

    fn identifier(&self) -> String;

    fn scope(&self) -> Scope {
        Scope::default()
    }

    /// Local checks run before anything is sent.
    fn validate(&self) -> Result<(), CoreError>;

    /// The desired record for this config.
    fn to_desired(&self) -> DesiredRecord;

    /// Build from a desired record (command-line flags or a document).
    fn from_desired(
        identifier: &str,
        scope: &Scope,
        record: &DesiredRecord,
    ) -> Result<Self, CoreError>;

    /// Build from a server snapshot.
    fn from_wire(
        identifier: &str,
        scope: &Scope,
        fields: &Map<String, Value>,
    ) -> Result<Self, CoreError> {
        Self::from_desired(
            identifier,
            scope,
            &DesiredRecord::from_snapshot(Self::fields(), fields),
        )
    }
}

// ── ResourceSpec ────────────────────────────────────────────────────

/// A typed config of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    Group(GroupConfig),
    User(UserConfig),
    Pool(PoolConfig),
    Token(TokenConfig),
    Storage(StorageConfig),
    Guest(GuestConfig),
}

macro_rules! dispatch {
    ($spec:expr, $cfg:ident => $body:expr) => {
        match $spec {
            ResourceSpec::Group($cfg) => $body,
            ResourceSpec::User($cfg) => $body,
            ResourceSpec::Pool($cfg) => $body,
            ResourceSpec::Token($cfg) => $body,
            ResourceSpec::Storage($cfg) => $body,
            ResourceSpec::Guest($cfg) => $body,
        }
    };
}

impl ResourceSpec {
    pub fn from_desired(
        kind: ResourceKind,
        identifier: &str,
        scope: &Scope,
        record: &DesiredRecord,
    ) -> Result<Self, CoreError> {
        Ok(match kind {
            ResourceKind::Group => Self::Group(GroupConfig::from_desired(identifier, scope, record)?),
            ResourceKind::User => Self::User(UserConfig::from_desired(identifier, scope, record)?),
            ResourceKind::Pool => Self::Pool(PoolConfig::from_desired(identifier, scope, record)?),
            ResourceKind::Token => Self::Token(TokenConfig::from_desired(identifier, scope, record)?),
            ResourceKind::Storage => {
                Self::Storage(StorageConfig::from_desired(identifier, scope, record)?)
            }
            ResourceKind::Guest => Self::Guest(GuestConfig::from_desired(identifier, scope, record)?),
        })
    }

    pub fn from_wire(
        kind: ResourceKind,
        identifier: &str,
        scope: &Scope,
        fields: &Map<String, Value>,
    ) -> Result<Self, CoreError> {
        Ok(match kind {
            ResourceKind::Group => Self::Group(GroupConfig::from_wire(identifier, scope, fields)?),
            ResourceKind::User => Self::User(UserConfig::from_wire(identifier, scope, fields)?),
            ResourceKind::Pool => Self::Pool(PoolConfig::from_wire(identifier, scope, fields)?),
            ResourceKind::Token => Self::Token(TokenConfig::from_wire(identifier, scope, fields)?),
            ResourceKind::Storage => {
                Self::Storage(StorageConfig::from_wire(identifier, scope, fields)?)
            }
            ResourceKind::Guest => Self::Guest(GuestConfig::from_wire(identifier, scope, fields)?),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        dispatch!(self, c => c.kind())
    }

    pub fn identifier(&self) -> String {
        dispatch!(self, c => c.identifier())
    }

    pub fn scope(&self) -> Scope {
        dispatch!(self, c => c.scope())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        dispatch!(self, c => c.validate())
    }

    pub fn to_desired(&self) -> DesiredRecord {
        dispatch!(self, c => c.to_desired())
    }
}

macro_rules! impl_from_config {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(impl From<$ty> for ResourceSpec {
            fn from(config: $ty) -> Self {
                Self::$variant(config)
            }
        })*
    };
}

impl_from_config!(
    Group(GroupConfig),
    User(UserConfig),
    Pool(PoolConfig),
    Token(TokenConfig),
    Storage(StorageConfig),
    Guest(GuestConfig),
);

// ── Shared validation helpers ───────────────────────────────────────

pub(crate) fn invalid(field: &str, message: impl Into<String>) -> CoreError {
    CoreError::ValidationFailed {
        field: Some(field.to_owned()),
        message: message.into(),
    }
}

/// Identifiers: start with a letter, then letters, digits, `-`, `_` or `.`.
pub(crate) fn check_ident(field: &str, value: &str) -> Result<(), CoreError> {
    let mut chars = value.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid_start && valid_rest && value.len() <= 64 {
        Ok(())
    } else {
        Err(invalid(
            field,
            format!("'{value}' is not a valid {field} (letters, digits, '-', '_', '.')"),
        ))
    }
}

/// User ids carry a realm: `name@realm`.
pub(crate) fn check_userid(field: &str, value: &str) -> Result<(), CoreError> {
    match value.split_once('@') {
        Some((name, realm)) if !name.is_empty() && !realm.is_empty() && !realm.contains('@') => {
            Ok(())
        }
        _ => Err(invalid(field, format!("'{value}' must look like name@realm"))),
    }
}
