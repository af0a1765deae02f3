//! `docker info` client section

use std::io::{self, Write};

use colored::Colorize;
use serde::Serialize;

use docker_cli_core::{CommandTree, Plugin, PluginManager, Result};

use crate::args::Format;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientInfo {
    pub version: String,
    pub context: String,
    pub debug_mode: bool,
    pub plugins: Vec<Plugin>,
}

impl ClientInfo {
    pub fn collect(
        manager: &PluginManager,
        tree: &CommandTree,
        context: &str,
        debug: bool,
    ) -> Result<Self> {
        Ok(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            context: context.to_string(),
            debug_mode: debug,
            plugins: manager.list_plugins(Some(tree))?,
        })
    }

    /// Warnings for plugins that failed validation
    pub fn warnings(&self) -> Vec<String> {
        self.plugins
            .iter()
            .filter_map(|p| {
                p.err.as_ref().map(|e| {
                    format!("Plugin {:?} is not valid: {}", p.path.display().to_string(), e)
                })
            })
            .collect()
    }
}

pub fn handle_info(info: &ClientInfo, format: Format) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match format {
        Format::Json => {
            let json = serde_json::to_string(info).map_err(io::Error::from)?;
            writeln!(out, "{}", json)?;
        }
        Format::Table => {
            render_table(info, &mut out)?;
            for warning in info.warnings() {
                eprintln!("{} {}", "WARNING:".yellow().bold(), warning);
            }
        }
    }

    Ok(())
}

fn render_table(info: &ClientInfo, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Client:")?;
    writeln!(out, " Version:    {}", info.version)?;
    writeln!(out, " Context:    {}", info.context)?;
    writeln!(out, " Debug Mode: {}", info.debug_mode)?;

    let valid: Vec<&Plugin> = info.plugins.iter().filter(|p| p.is_valid()).collect();
    if !valid.is_empty() {
        writeln!(out, " Plugins:")?;
        for plugin in valid {
            write!(out, "  {}: {}", plugin.name, plugin.short_description())?;
            if !plugin.vendor().is_empty() {
                write!(out, " ({})", plugin.vendor())?;
            }
            writeln!(out)?;
            if !plugin.version().is_empty() {
                writeln!(out, "    Version:  {}", plugin.version())?;
            }
            writeln!(out, "    Path:     {}", plugin.path.display())?;
            for shadowed in &plugin.shadowed_paths {
                writeln!(out, "    Shadows:  {}", shadowed.display())?;
            }
        }
    }

    Ok(())
}
