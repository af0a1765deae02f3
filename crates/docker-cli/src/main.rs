use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgMatches, CommandFactory, FromArgMatches};
use clap_complete::generate;
use colored::Colorize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use docker_cli_core::{
    resolve_config_dir, ClientContext, CommandTree, ConfigFile, DockerCliError, InterruptPolicy,
    Interrupts, PluginManager, Result, SearchDirs,
};

mod args;
mod commands;
mod info;

use args::{Cli, Commands, Format, GlobalOptions, Shell, SystemAction};
use info::ClientInfo;

const DEFAULT_CONTEXT: &str = "default";

fn main() -> ExitCode {
    let args: Vec<OsString> = std::env::args_os().collect();
    let globals = GlobalOptions::scan(&args);
    init_tracing(&globals);

    match run(&args, &globals) {
        Ok(code) => exit_code(code),
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            exit_code(e.exit_code())
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(exit_status(code))
}

/// Codes outside 0..=255 cannot be reported faithfully; report plain failure
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn init_tracing(globals: &GlobalOptions) {
    let level = if globals.debug {
        "debug"
    } else {
        globals.log_level.as_filter()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(args: &[OsString], globals: &GlobalOptions) -> Result<i32> {
    let config_dir = resolve_config_dir(globals.config.as_deref())?;
    let config = ConfigFile::load(&config_dir).unwrap_or_else(|e| {
        warn!(error = %e, "ignoring unreadable config file");
        ConfigFile::default()
    });

    let dirs = SearchDirs::new(&config_dir, &config);
    debug!(dirs = ?dirs.ordered(), "plugin search path");

    let manager = PluginManager::new(dirs).with_interrupt_policy(InterruptPolicy {
        forward: !io::stdin().is_terminal(),
        ..Default::default()
    });

    let mut tree = commands::command_tree(&Cli::command());
    // Reported once, by whichever command needs the plugin list
    let scan_error = manager.add_plugin_command_stubs(&mut tree).err();

    let mut cmd = commands::with_plugin_stubs(Cli::command(), &tree);
    let matches = match cmd.try_get_matches_from_mut(args) {
        Ok(matches) => matches,
        Err(e) => {
            e.print()?;
            return Ok(e.exit_code());
        }
    };

    let manager = manager.with_context(client_context(&matches));

    if let Some((name, sub)) = matches.subcommand() {
        if tree.is_plugin_stub(name) {
            return run_plugin(&manager, &tree, name, commands::plugin_args(sub));
        }
    }

    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => {
            e.print()?;
            return Ok(e.exit_code());
        }
    };

    if let Some(e) = scan_error {
        if needs_plugins(cli.command.as_ref()) {
            return Err(e);
        }
        warn!(error = %e, "plugin discovery failed");
    }

    match cli.command {
        Some(Commands::Info { format })
        | Some(Commands::System {
            action: SystemAction::Info { format },
        }) => {
            let context = context_name(cli.context.as_deref(), &config);
            handle_info(&manager, &tree, &context, cli.debug, format)?;
            Ok(0)
        }
        Some(Commands::Version) => {
            handle_version();
            Ok(0)
        }
        Some(Commands::Completion { shell }) => {
            handle_completion(shell, &mut cmd);
            Ok(0)
        }
        Some(Commands::External(external)) => {
            let mut external = external.into_iter();
            let name = external
                .next()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            run_plugin(&manager, &tree, &name, external.collect())
        }
        None => {
            cmd.print_help()?;
            Ok(0)
        }
    }
}

/// Commands that cannot do their job without a successful plugin scan
fn needs_plugins(command: Option<&Commands>) -> bool {
    matches!(
        command,
        Some(Commands::Info { .. } | Commands::System { .. } | Commands::External(_))
    )
}

fn client_context(matches: &ArgMatches) -> ClientContext {
    ClientContext {
        original_cli_command: std::env::current_exe().ok(),
        config_dir: matches.get_one::<PathBuf>("config").cloned(),
        context: matches.get_one::<String>("context").cloned(),
        host: matches.get_one::<String>("host").cloned(),
    }
}

/// Context shown by `info`: flag, then `DOCKER_CONTEXT`, then config file
fn context_name(flag: Option<&str>, config: &ConfigFile) -> String {
    flag.map(str::to_string)
        .or_else(|| std::env::var("DOCKER_CONTEXT").ok().filter(|c| !c.is_empty()))
        .or_else(|| config.current_context.clone())
        .unwrap_or_else(|| DEFAULT_CONTEXT.to_string())
}

fn run_plugin(
    manager: &PluginManager,
    tree: &CommandTree,
    name: &str,
    plugin_args: Vec<OsString>,
) -> Result<i32> {
    let handle = match manager.plugin_run_command(name, plugin_args, Some(tree)) {
        Ok(handle) => handle,
        Err(e) if is_unknown_command(&e) => {
            debug!(error = %e, "no usable plugin");
            eprintln!("docker: '{}' is not a docker command.", name);
            eprintln!("See 'docker --help'");
            return Ok(1);
        }
        Err(e) => return Err(e),
    };

    let interrupts = install_interrupt_handler()?;
    let outcome = handle.run(&interrupts)?;
    debug!(plugin = name, code = outcome.code(), "plugin finished");
    Ok(outcome.code())
}

/// Invalid plugins are reported like unknown commands; `info` shows why
fn is_unknown_command(err: &DockerCliError) -> bool {
    err.is_not_found() || matches!(err, DockerCliError::InvalidPlugin { .. })
}

/// Count Ctrl-C presses instead of dying, so the plugin can clean up first
fn install_interrupt_handler() -> Result<Interrupts> {
    let interrupts = Interrupts::new();
    let counter = interrupts.clone();
    ctrlc::set_handler(move || counter.notify())
        .map_err(|e| DockerCliError::SignalHandler(e.to_string()))?;
    Ok(interrupts)
}

fn handle_info(
    manager: &PluginManager,
    tree: &CommandTree,
    context: &str,
    debug: bool,
    format: Format,
) -> Result<()> {
    let info = ClientInfo::collect(manager, tree, context, debug)?;
    info::handle_info(&info, format)
}

fn handle_version() {
    println!("Client:");
    println!(" Version:           {}", env!("CARGO_PKG_VERSION"));
    println!(
        " OS/Arch:           {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

fn handle_completion(shell: Shell, cmd: &mut clap::Command) {
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, cmd, "docker", &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use docker_cli_core::plugin::MetadataRunner;
    use docker_cli_core::PluginError;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FailingRunner;

    impl MetadataRunner for FailingRunner {
        fn run_metadata(
            &self,
            _path: &Path,
            _timeout: Duration,
        ) -> std::result::Result<Vec<u8>, PluginError> {
            Err(PluginError::ExitStatus {
                status: "exit status: 1".to_string(),
            })
        }
    }

    fn manager_with_broken_plugin(temp: &TempDir) -> PluginManager {
        let plugins = temp.path().join("cli-plugins");
        std::fs::create_dir_all(&plugins).unwrap();
        std::fs::write(plugins.join("docker-broken"), "").unwrap();

        let dirs =
            SearchDirs::new(temp.path(), &ConfigFile::default()).with_system_dirs(Vec::new());
        PluginManager::new(dirs).with_runner(FailingRunner)
    }

    #[test]
    fn test_invalid_plugin_runs_as_unknown_command() {
        let temp = TempDir::new().unwrap();
        let manager = manager_with_broken_plugin(&temp);
        let tree = commands::command_tree(&Cli::command());

        assert_eq!(run_plugin(&manager, &tree, "broken", Vec::new()).unwrap(), 1);
        assert_eq!(run_plugin(&manager, &tree, "missing", Vec::new()).unwrap(), 1);
    }

    #[test]
    fn test_is_unknown_command() {
        assert!(is_unknown_command(&DockerCliError::PluginNotFound {
            name: "x".to_string(),
        }));
        assert!(is_unknown_command(&DockerCliError::InvalidPlugin {
            name: "x".to_string(),
            source: PluginError::MissingSchemaVersion,
        }));
        assert!(!is_unknown_command(&DockerCliError::HomeNotFound));
    }

    #[test]
    fn test_needs_plugins() {
        assert!(needs_plugins(Some(&Commands::Info {
            format: Format::Table,
        })));
        assert!(needs_plugins(Some(&Commands::External(vec!["x".into()]))));
        assert!(!needs_plugins(Some(&Commands::Version)));
        assert!(!needs_plugins(None));
    }

    #[test]
    fn test_context_name_precedence() {
        let config = ConfigFile {
            current_context: Some("from-config".to_string()),
            ..Default::default()
        };
        assert_eq!(context_name(Some("flag"), &config), "flag");

        if std::env::var_os("DOCKER_CONTEXT").is_none() {
            assert_eq!(context_name(None, &config), "from-config");
            assert_eq!(context_name(None, &ConfigFile::default()), "default");
        }
    }

    #[test]
    fn test_exit_status_clamps() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(143), 143);
        assert_eq!(exit_status(300), 1);
        assert_eq!(exit_status(-1), 1);
    }

    #[test]
    fn test_client_context_from_matches() {
        let matches = Cli::command()
            .try_get_matches_from(["docker", "--config", "/cfg", "-H", "tcp://h:2375", "version"])
            .unwrap();
        let context = client_context(&matches);
        assert_eq!(context.config_dir, Some(PathBuf::from("/cfg")));
        assert_eq!(context.host.as_deref(), Some("tcp://h:2375"));
        assert!(context.context.is_none());
    }
}
