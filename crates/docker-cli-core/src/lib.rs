pub mod command;
pub mod config;
pub mod error;
pub mod plugin;

pub use command::{BuiltinNames, Collision, CommandKind, CommandNode, CommandTree, PluginStub};
pub use config::{resolve_config_dir, ConfigFile};
pub use error::{is_not_found, DockerCliError, PluginError, Result};
pub use plugin::{
    ClientContext, DiscoveryOptions, ExecHandle, ExitOutcome, InterruptPolicy, Interrupts,
    Plugin, PluginManager, PluginMetadata, SearchDirs,
};
