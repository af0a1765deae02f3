//! Command tree model
//!
//! A plain-data view of the CLI's command hierarchy. The binary converts its
//! argument parser into a [`CommandTree`], the plugin manager appends stubs
//! for discovered plugins, and the binary renders the result for help output
//! and shell completion.

use std::collections::HashMap;
use std::path::PathBuf;

/// What a node in the command tree stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// A command implemented by the CLI itself
    Builtin,
    /// A placeholder for an external plugin executable
    PluginStub(PluginStub),
}

/// Typed metadata carried by a plugin stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginStub {
    pub path: PathBuf,
    pub vendor: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    pub name: String,
    pub aliases: Vec<String>,
    pub about: Option<String>,
    pub hidden: bool,
    pub kind: CommandKind,
    pub children: Vec<CommandNode>,
}

impl CommandNode {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            about: None,
            hidden: false,
            kind: CommandKind::Builtin,
            children: Vec::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn with_about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    pub fn with_child(mut self, child: CommandNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_plugin_stub(&self) -> bool {
        matches!(self.kind, CommandKind::PluginStub(_))
    }

    pub fn plugin_stub(&self) -> Option<&PluginStub> {
        match &self.kind {
            CommandKind::PluginStub(stub) => Some(stub),
            CommandKind::Builtin => None,
        }
    }

    fn collect_builtins(&self, names: &mut BuiltinNames) {
        for child in &self.children {
            if child.is_plugin_stub() {
                continue;
            }
            names
                .commands
                .entry(child.name.clone())
                .or_insert_with(|| child.name.clone());
            for alias in &child.aliases {
                names
                    .aliases
                    .entry(alias.clone())
                    .or_insert_with(|| child.name.clone());
            }
            child.collect_builtins(names);
        }
    }
}

/// Root of the command hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTree {
    pub root: CommandNode,
}

impl CommandTree {
    pub fn new(root: CommandNode) -> Self {
        Self { root }
    }

    /// Direct subcommand of the root, matched by name or alias
    pub fn find(&self, name: &str) -> Option<&CommandNode> {
        self.root
            .children
            .iter()
            .find(|c| c.name == name || c.aliases.iter().any(|a| a == name))
    }

    pub fn is_plugin_stub(&self, name: &str) -> bool {
        self.find(name).is_some_and(CommandNode::is_plugin_stub)
    }

    /// Installed plugin stubs, in insertion order
    pub fn plugin_stubs(&self) -> impl Iterator<Item = &CommandNode> {
        self.root.children.iter().filter(|c| c.is_plugin_stub())
    }

    /// Every built-in command name and alias below the root, recursively
    pub fn builtin_names(&self) -> BuiltinNames {
        let mut names = BuiltinNames::default();
        self.root.collect_builtins(&mut names);
        names
    }

    pub(crate) fn push(&mut self, node: CommandNode) {
        self.root.children.push(node);
    }
}

/// Collision set computed from the built-in commands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltinNames {
    /// command name -> itself
    commands: HashMap<String, String>,
    /// alias -> owning command name
    aliases: HashMap<String, String>,
}

/// How a candidate name clashes with the built-in commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collision {
    Command,
    Alias { command: String },
}

impl BuiltinNames {
    pub fn collision(&self, name: &str) -> Option<Collision> {
        if self.commands.contains_key(name) {
            return Some(Collision::Command);
        }
        self.aliases.get(name).map(|command| Collision::Alias {
            command: command.clone(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collision(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.aliases.is_empty()
    }
}
