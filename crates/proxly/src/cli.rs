//! Clap derive structures for the `proxly` CLI.
//!
//! Defines the command tree, global flags and shared argument groups.
//! Only depends on clap so `build.rs` can include it for man pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// proxly -- declarative CLI for Proxmox VE clusters
#[derive(Debug, Parser)]
#[command(
    name = "proxly",
    version,
    about = "Manage Proxmox VE clusters from the command line",
    long_about = "Create, update and delete Proxmox VE resources through the REST API.\n\n\
        `set` reconciles a resource against the flags you pass: it creates the\n\
        resource when missing and only sends the fields that differ otherwise.\n\
        Pass an empty string (or --clear <field>) to clear a field.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Cluster profile to use
    #[arg(long, short = 'p', env = "PROXLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Cluster URL (overrides profile), e.g. https://pve.example.com:8006
    #[arg(long, short = 'u', env = "PROXLY_URL", global = true)]
    pub url: Option<String>,

    /// User with realm for password login (overrides profile)
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// API token id `user@realm!name` (overrides profile, implies token auth)
    #[arg(long, global = true)]
    pub token_id: Option<String>,

    /// Node for guest and task commands (overrides profile)
    #[arg(long, short = 'n', env = "PROXLY_NODE", global = true)]
    pub node: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "PROXLY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log requests and responses at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "PROXLY_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout and task deadline in seconds [default: 300]
    #[arg(long, env = "PROXLY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// HTTP(S) proxy URL
    #[arg(long, env = "PROXLY_PROXY", global = true)]
    pub proxy: Option<String>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage permission groups
    #[command(alias = "groups")]
    Group(GroupArgs),

    /// Manage users
    #[command(alias = "users")]
    User(UserArgs),

    /// Manage resource pools
    #[command(alias = "pools")]
    Pool(PoolArgs),

    /// Manage API tokens of a user
    #[command(alias = "tokens")]
    Token(TokenArgs),

    /// Manage storage definitions
    #[command(alias = "storages")]
    Storage(StorageArgs),

    /// Manage QEMU guests
    #[command(alias = "vm", alias = "guests")]
    Guest(GuestArgs),

    /// Inspect and control asynchronous tasks
    #[command(alias = "tasks")]
    Task(TaskArgs),

    /// Cluster-wide information
    Cluster(ClusterArgs),

    /// Check credentials by logging in
    Login(LoginArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Arguments ─────────────────────────────────────────────────

/// Where a desired record comes from besides the field flags.
#[derive(Debug, Args)]
pub struct RecordInput {
    /// JSON object of fields: absent keys are left alone, null clears
    #[arg(long, short = 'F', value_name = "PATH")]
    pub from_file: Option<PathBuf>,

    /// Clear a field (repeatable)
    #[arg(long, value_name = "FIELD")]
    pub clear: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  GROUPS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct GroupArgs {
    #[command(subcommand)]
    pub command: GroupCommand,
}

#[derive(Debug, Subcommand)]
pub enum GroupCommand {
    /// List groups
    #[command(alias = "ls")]
    List,

    /// Show a group's configuration
    Get {
        /// Group id
        groupid: String,
    },

    /// Create a group
    Create(GroupMutation),

    /// Update an existing group
    Update(GroupMutation),

    /// Create or update a group to match the given fields
    Set(GroupMutation),

    /// Delete a group
    #[command(alias = "rm")]
    Delete {
        /// Group id
        groupid: String,
    },
}

#[derive(Debug, Args)]
pub struct GroupMutation {
    /// Group id
    pub groupid: String,

    /// Free-form comment
    #[arg(long)]
    pub comment: Option<String>,

    #[command(flatten)]
    pub input: RecordInput,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  USERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// List users
    #[command(alias = "ls")]
    List,

    /// Show a user's configuration
    Get {
        /// User id with realm (name@realm)
        userid: String,
    },

    /// Create a user
    Create(UserMutation),

    /// Update an existing user
    Update(UserMutation),

    /// Create or update a user to match the given fields
    Set(UserMutation),

    /// Delete a user
    #[command(alias = "rm")]
    Delete {
        /// User id with realm (name@realm)
        userid: String,
    },
}

#[derive(Debug, Args)]
pub struct UserMutation {
    /// User id with realm (name@realm)
    pub userid: String,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub firstname: Option<String>,

    #[arg(long)]
    pub lastname: Option<String>,

    /// Account enabled (1/0, true/false)
    #[arg(long)]
    pub enable: Option<String>,

    /// Expiry as epoch seconds, 0 for never
    #[arg(long)]
    pub expire: Option<String>,

    /// Comma-separated group ids
    #[arg(long)]
    pub groups: Option<String>,

    #[arg(long)]
    pub comment: Option<String>,

    /// Initial password (create only; prompts when given as "-")
    #[arg(long)]
    pub password: Option<String>,

    #[command(flatten)]
    pub input: RecordInput,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  POOLS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct PoolArgs {
    #[command(subcommand)]
    pub command: PoolCommand,
}

#[derive(Debug, Subcommand)]
pub enum PoolCommand {
    /// List pools
    #[command(alias = "ls")]
    List,

    /// Show a pool
    Get {
        /// Pool id
        poolid: String,
    },

    /// Create a pool
    Create(PoolMutation),

    /// Update an existing pool
    Update(PoolMutation),

    /// Create or update a pool to match the given fields
    Set(PoolMutation),

    /// Delete a pool
    #[command(alias = "rm")]
    Delete {
        /// Pool id
        poolid: String,
    },
}

#[derive(Debug, Args)]
pub struct PoolMutation {
    /// Pool id
    pub poolid: String,

    #[arg(long)]
    pub comment: Option<String>,

    #[command(flatten)]
    pub input: RecordInput,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TOKENS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct TokenArgs {
    /// Owning user (name@realm)
    #[arg(long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// List a user's tokens
    #[command(alias = "ls")]
    List,

    /// Show a token
    Get {
        /// Token name
        tokenid: String,
    },

    /// Create a token; the secret is printed once
    Create(TokenMutation),

    /// Update an existing token
    Update(TokenMutation),

    /// Create or update a token to match the given fields
    Set(TokenMutation),

    /// Revoke a token
    #[command(alias = "rm")]
    Delete {
        /// Token name
        tokenid: String,
    },
}

#[derive(Debug, Args)]
pub struct TokenMutation {
    /// Token name
    pub tokenid: String,

    #[arg(long)]
    pub comment: Option<String>,

    /// Expiry as epoch seconds, 0 for never
    #[arg(long)]
    pub expire: Option<String>,

    /// Restrict the token to its own ACLs (1/0, true/false)
    #[arg(long)]
    pub privsep: Option<String>,

    #[command(flatten)]
    pub input: RecordInput,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  STORAGE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct StorageArgs {
    #[command(subcommand)]
    pub command: StorageCommand,
}

#[derive(Debug, Subcommand)]
pub enum StorageCommand {
    /// List storage definitions
    #[command(alias = "ls")]
    List,

    /// Show a storage definition
    Get {
        /// Storage id
        storage: String,
    },

    /// Create a storage definition
    Create(StorageMutation),

    /// Update an existing storage definition
    Update(StorageMutation),

    /// Create or update a storage definition to match the given fields
    Set(StorageMutation),

    /// Delete a storage definition
    #[command(alias = "rm")]
    Delete {
        /// Storage id
        storage: String,
    },
}

#[derive(Debug, Args)]
pub struct StorageMutation {
    /// Storage id
    pub storage: String,

    /// Backend type, e.g. dir, nfs, lvmthin (create only)
    #[arg(long = "type")]
    pub storage_type: Option<String>,

    /// Filesystem path (dir backends)
    #[arg(long)]
    pub path: Option<String>,

    /// Comma-separated content types (images,iso,backup,...)
    #[arg(long)]
    pub content: Option<String>,

    /// Comma-separated nodes the storage is available on
    #[arg(long)]
    pub nodes: Option<String>,

    /// Disable the storage (1/0, true/false)
    #[arg(long)]
    pub disable: Option<String>,

    #[command(flatten)]
    pub input: RecordInput,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  GUESTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct GuestArgs {
    #[command(subcommand)]
    pub command: GuestCommand,
}

#[derive(Debug, Subcommand)]
pub enum GuestCommand {
    /// List guests (on --node, or cluster-wide)
    #[command(alias = "ls")]
    List,

    /// Show a guest's configuration
    Get {
        /// Guest id
        vmid: u32,
    },

    /// Create a guest; omit the id to allocate the next free one
    Create(GuestCreate),

    /// Update an existing guest's configuration
    Update(GuestMutation),

    /// Create or update a guest to match the given fields
    Set(GuestMutation),

    /// Delete a guest
    #[command(alias = "rm")]
    Delete {
        /// Guest id
        vmid: u32,
    },

    /// Start a guest
    Start(GuestTarget),

    /// Hard-stop a guest
    Stop(GuestTarget),

    /// Ask the guest OS to shut down
    Shutdown(GuestTarget),

    /// Reboot a guest
    Reboot(GuestTarget),

    /// Suspend a guest
    Suspend(GuestTarget),

    /// Resume a suspended guest
    Resume(GuestTarget),

    /// Clone a guest
    Clone {
        /// Source guest id
        vmid: u32,

        /// Target guest id (next free id when omitted)
        #[arg(long)]
        newid: Option<u32>,

        /// Name of the clone
        #[arg(long)]
        name: Option<String>,

        /// Full copy instead of a linked clone
        #[arg(long)]
        full: bool,
    },

    /// Print the next free guest id
    NextId {
        /// Lowest id to consider
        #[arg(long, default_value = "100")]
        start: u32,
    },

    /// Print the highest guest id in use
    MaxId,

    /// Print the node hosting a guest
    Locate {
        /// Guest id
        vmid: u32,
    },
}

#[derive(Debug, Args)]
pub struct GuestTarget {
    /// Guest id
    pub vmid: u32,
}

/// Guest configuration flags shared by create, update and set.
#[derive(Debug, Args)]
pub struct GuestFields {
    /// Guest name (DNS name)
    #[arg(long)]
    pub name: Option<String>,

    /// Memory in MiB
    #[arg(long)]
    pub memory: Option<String>,

    #[arg(long)]
    pub cores: Option<String>,

    #[arg(long)]
    pub sockets: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Comma-separated tags
    #[arg(long)]
    pub tags: Option<String>,

    /// Start at boot (1/0, true/false)
    #[arg(long)]
    pub onboot: Option<String>,

    /// Cloud-init user
    #[arg(long)]
    pub ciuser: Option<String>,

    /// Cloud-init password (prompts when given as "-")
    #[arg(long)]
    pub cipassword: Option<String>,

    /// File with OpenSSH public keys for cloud-init
    #[arg(long, value_name = "PATH")]
    pub sshkeys: Option<PathBuf>,

    /// Pool to add the guest to (create only)
    #[arg(long)]
    pub pool: Option<String>,

    #[command(flatten)]
    pub input: RecordInput,
}

#[derive(Debug, Args)]
pub struct GuestCreate {
    /// Guest id (next free id when omitted)
    pub vmid: Option<u32>,

    /// Lowest id to consider when allocating
    #[arg(long, default_value = "100", conflicts_with = "vmid")]
    pub start: u32,

    #[command(flatten)]
    pub fields: GuestFields,
}

#[derive(Debug, Args)]
pub struct GuestMutation {
    /// Guest id
    pub vmid: u32,

    #[command(flatten)]
    pub fields: GuestFields,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TASKS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// List recent tasks on a node
    #[command(alias = "ls")]
    List {
        /// Only tasks of this guest
        #[arg(long)]
        vmid: Option<u32>,

        /// Max entries
        #[arg(long, short = 'l', default_value = "50")]
        limit: u32,
    },

    /// Show a task's status
    Status {
        /// Task id (UPID:...)
        upid: String,
    },

    /// Wait for a task to finish
    Wait {
        /// Task id (UPID:...)
        upid: String,
    },

    /// Print a task's log
    Log {
        /// Task id (UPID:...)
        upid: String,

        /// First line to fetch
        #[arg(long, default_value = "0")]
        start: u32,

        /// Max lines
        #[arg(long, short = 'l', default_value = "500")]
        limit: u32,
    },

    /// Stop a running task
    Stop {
        /// Task id (UPID:...)
        upid: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CLUSTER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ClusterArgs {
    #[command(subcommand)]
    pub command: ClusterCommand,
}

#[derive(Debug, Subcommand)]
pub enum ClusterCommand {
    /// List nodes
    Nodes,

    /// Show the API version
    Version,

    /// List cluster resources
    Resources {
        /// Only resources of this type (vm, storage, node, sdn)
        #[arg(long = "type")]
        resource_type: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  LOGIN / CONFIG / COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// One-time code for accounts with two-factor authentication
    #[arg(long)]
    pub otp: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration (secrets redacted)
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key (url, auth_mode, username, token_id, insecure, ...)
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a password or token secret in the system keyring
    SetSecret {
        /// Profile name (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,

        /// Which secret to store (defaults to the profile's auth mode)
        #[arg(long)]
        kind: Option<SecretKindArg>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SecretKindArg {
    Password,
    TokenSecret,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
