//! Bridge between the clap command definition and the core command tree

use std::ffi::OsString;

use clap::{value_parser, Arg, ArgMatches, Command};

use docker_cli_core::{CommandNode, CommandTree};

/// Arg id holding everything after a plugin stub's name
pub const PLUGIN_ARGS: &str = "plugin-args";

/// Built-in commands clap adds on its own
const IMPLICIT_BUILTINS: &[&str] = &["help"];

/// Snapshot the clap command hierarchy as a core command tree
pub fn command_tree(cmd: &Command) -> CommandTree {
    let mut root = node(cmd);
    for name in IMPLICIT_BUILTINS {
        if !root.children.iter().any(|c| c.name == *name) {
            root.children.push(CommandNode::builtin(*name));
        }
    }
    CommandTree::new(root)
}

fn node(cmd: &Command) -> CommandNode {
    let mut node = CommandNode::builtin(cmd.get_name()).with_aliases(cmd.get_all_aliases());
    if let Some(about) = cmd.get_about() {
        node = node.with_about(about.to_string());
    }
    for sub in cmd.get_subcommands() {
        node = node.with_child(self::node(sub));
    }
    node
}

/// Attach one clap subcommand per plugin stub so help output and shell
/// completion list plugins next to built-ins
pub fn with_plugin_stubs(mut cmd: Command, tree: &CommandTree) -> Command {
    for stub in tree.plugin_stubs() {
        let mut sub = Command::new(stub.name.clone())
            .hide(stub.hidden)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .arg(
                Arg::new(PLUGIN_ARGS)
                    .num_args(0..)
                    .trailing_var_arg(true)
                    .allow_hyphen_values(true)
                    .value_parser(value_parser!(OsString)),
            );
        if let Some(about) = &stub.about {
            sub = sub.about(about.clone());
        }
        cmd = cmd.subcommand(sub);
    }
    cmd
}

/// Arguments captured by a plugin stub
pub fn plugin_args(matches: &ArgMatches) -> Vec<OsString> {
    matches
        .get_many::<OsString>(PLUGIN_ARGS)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}
