//! CLI Plugin Manager
//!
//! Ties candidate scanning and metadata discovery together into the registry
//! API used by the rest of the CLI: listing, lookup, command stubs for help
//! and completion, and execution handles for running a plugin.

use std::ffi::OsString;
use std::path::PathBuf;

use tracing::debug;

use crate::command::{BuiltinNames, Collision, CommandTree};
use crate::error::{DockerCliError, PluginError, Result};
use crate::plugin::candidate::{list_plugin_candidates, SearchDirs};
use crate::plugin::exec::{ExecHandle, InterruptPolicy};
use crate::plugin::metadata::{
    is_valid_plugin_name, parse_metadata, validate_metadata, DiscoveryOptions, MetadataRunner,
    SystemMetadataRunner,
};
use crate::plugin::types::Plugin;

/// Tells the plugin which CLI started it
pub const ORIGINAL_CLI_COMMAND_ENV: &str = "DOCKER_CLI_PLUGIN_ORIGINAL_CLI_COMMAND";

/// CLI state a plugin needs to behave like a built-in command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    /// Path of the running CLI binary
    pub original_cli_command: Option<PathBuf>,
    /// Set when `--config` was passed explicitly
    pub config_dir: Option<PathBuf>,
    /// Set when `--context` was passed explicitly
    pub context: Option<String>,
    /// Set when `--host` was passed explicitly
    pub host: Option<String>,
}

impl ClientContext {
    /// Variables layered over the parent environment for a plugin run
    pub fn plugin_env(&self) -> Vec<(OsString, OsString)> {
        let mut env: Vec<(OsString, OsString)> = Vec::new();
        if let Some(cli) = &self.original_cli_command {
            env.push((ORIGINAL_CLI_COMMAND_ENV.into(), cli.into()));
        }
        if let Some(dir) = &self.config_dir {
            env.push(("DOCKER_CONFIG".into(), dir.into()));
        }
        if let Some(context) = &self.context {
            env.push(("DOCKER_CONTEXT".into(), context.into()));
        }
        if let Some(host) = &self.host {
            env.push(("DOCKER_HOST".into(), host.into()));
        }
        env
    }
}

/// Plugin registry backed by a fresh directory scan on every call
pub struct PluginManager {
    dirs: SearchDirs,
    options: DiscoveryOptions,
    runner: Box<dyn MetadataRunner>,
    context: ClientContext,
    interrupts: InterruptPolicy,
}

impl PluginManager {
    pub fn new(dirs: SearchDirs) -> Self {
        Self {
            dirs,
            options: DiscoveryOptions::from_env(),
            runner: Box::new(SystemMetadataRunner),
            context: ClientContext::default(),
            interrupts: InterruptPolicy::default(),
        }
    }

    pub fn with_options(mut self, options: DiscoveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the metadata runner (for testing)
    pub fn with_runner(mut self, runner: impl MetadataRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn with_context(mut self, context: ClientContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.interrupts = policy;
        self
    }

    pub fn search_dirs(&self) -> &SearchDirs {
        &self.dirs
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    // ========== Registry ==========

    /// All discovered plugins, valid and invalid, sorted by name.
    ///
    /// Only the highest-precedence candidate of each name is resolved.
    /// `root` supplies the built-in commands plugins must not shadow.
    pub fn list_plugins(&self, root: Option<&CommandTree>) -> Result<Vec<Plugin>> {
        let builtins = root.map(CommandTree::builtin_names).unwrap_or_default();
        let candidates = list_plugin_candidates(&self.dirs.ordered())?;

        let mut plugins: Vec<Plugin> = candidates
            .into_iter()
            .map(|(name, paths)| self.new_plugin(name, paths, &builtins))
            .collect();

        plugins.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plugins)
    }

    /// Look up a single plugin.
    ///
    /// Returns `PluginNotFound` only when no candidate exists; a candidate
    /// that fails validation comes back as a `Plugin` carrying its error.
    pub fn get_plugin(&self, name: &str, root: Option<&CommandTree>) -> Result<Plugin> {
        let mut candidates = list_plugin_candidates(&self.dirs.ordered())?;
        let paths = candidates
            .remove(name)
            .ok_or_else(|| DockerCliError::PluginNotFound {
                name: name.to_string(),
            })?;

        let builtins = root.map(CommandTree::builtin_names).unwrap_or_default();
        Ok(self.new_plugin(name.to_string(), paths, &builtins))
    }

    fn new_plugin(&self, name: String, mut paths: Vec<PathBuf>, builtins: &BuiltinNames) -> Plugin {
        let path = paths.remove(0);
        let shadowed_paths = paths;

        let invalid = |err: PluginError, metadata| {
            debug!(plugin = %name, path = %path.display(), error = %err, "invalid plugin");
            Plugin::invalid(
                name.clone(),
                path.clone(),
                shadowed_paths.clone(),
                metadata,
                err,
            )
        };

        if !is_valid_plugin_name(&name) {
            return invalid(PluginError::InvalidName { name: name.clone() }, None);
        }

        match builtins.collision(&name) {
            Some(Collision::Command) => {
                return invalid(PluginError::BuiltinCollision { name: name.clone() }, None)
            }
            Some(Collision::Alias { command }) => {
                return invalid(
                    PluginError::AliasCollision {
                        name: name.clone(),
                        command,
                    },
                    None,
                )
            }
            None => {}
        }

        let stdout = match self.runner.run_metadata(&path, self.options.timeout()) {
            Ok(stdout) => stdout,
            Err(e) => return invalid(e, None),
        };

        let metadata = match parse_metadata(&stdout) {
            Ok(metadata) => metadata,
            Err(e) => return invalid(e, None),
        };

        if let Err(e) = validate_metadata(&name, &metadata, &self.options) {
            return invalid(e, Some(metadata));
        }

        Plugin {
            name,
            path,
            metadata: Some(metadata),
            shadowed_paths,
            err: None,
        }
    }

    // ========== Command stubs ==========

    /// Add a stub command for every valid plugin that does not collide with
    /// a built-in. Stubs already present are left alone.
    pub fn add_plugin_command_stubs(&self, tree: &mut CommandTree) -> Result<()> {
        let builtins = tree.builtin_names();
        let plugins = self.list_plugins(Some(tree))?;

        for plugin in plugins {
            if !plugin.is_valid() || builtins.contains(&plugin.name) {
                continue;
            }
            if tree.find(&plugin.name).is_some() {
                continue;
            }
            debug!(plugin = %plugin.name, "adding plugin command stub");
            tree.push(plugin.to_stub());
        }

        Ok(())
    }

    // ========== Invocation ==========

    /// Build the execution handle for running plugin `name` with `args`
    /// (everything after the plugin name on the command line).
    pub fn plugin_run_command<I, S>(
        &self,
        name: &str,
        args: I,
        root: Option<&CommandTree>,
    ) -> Result<ExecHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let plugin = self.get_plugin(name, root)?;
        if let Some(err) = plugin.err {
            return Err(DockerCliError::InvalidPlugin {
                name: plugin.name,
                source: err,
            });
        }

        let cwd = std::env::current_dir()?;
        Ok(ExecHandle::new(plugin.path)
            .args(args)
            .envs(std::env::vars_os())
            .envs(self.context.plugin_env())
            .current_dir(cwd)
            .interrupt_policy(self.interrupts))
    }
}
