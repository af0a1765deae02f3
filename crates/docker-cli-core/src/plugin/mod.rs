//! CLI Plugin Module
//!
//! Discovers `docker-<name>` executables across the plugin search path,
//! validates their self-reported metadata, and runs them as if they were
//! built-in subcommands.
//!
//! - `candidate`: directory scanning and search-path precedence
//! - `metadata`: the `docker-cli-plugin-metadata` protocol
//! - `types`: the registry entry exposed to the rest of the CLI
//! - `manager`: listing, lookup, command stubs and run handles
//! - `exec`: process handles, exit codes and interrupt relay

pub mod candidate;
pub mod exec;
pub mod manager;
pub mod metadata;
pub mod types;

// Re-exports
pub use candidate::{
    candidate_name, default_system_dirs, list_plugin_candidates, Candidates, SearchDirs,
    NAME_PREFIX,
};
pub use exec::{
    ChildProcess, ExecHandle, ExitOutcome, InterruptPolicy, Interrupts, Spawner, StdioMode,
    SystemSpawner,
};
pub use manager::{ClientContext, PluginManager, ORIGINAL_CLI_COMMAND_ENV};
pub use metadata::{
    DiscoveryOptions, MetadataRunner, PluginMetadata, SystemMetadataRunner, METADATA_SUBCOMMAND,
};
pub use types::Plugin;
