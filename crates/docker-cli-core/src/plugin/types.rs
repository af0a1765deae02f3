//! CLI plugin registry entry

use std::path::PathBuf;

use serde::{Serialize, Serializer};

use crate::command::{CommandKind, CommandNode, PluginStub};
use crate::error::PluginError;
use crate::plugin::metadata::PluginMetadata;

/// A discovered plugin, valid or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Plugin {
    /// Logical name (filename minus the `docker-` prefix)
    pub name: String,
    /// Highest-precedence candidate path
    pub path: PathBuf,
    /// Self-reported metadata, if it could be obtained
    #[serde(flatten)]
    pub metadata: Option<PluginMetadata>,
    /// Lower-precedence candidates hidden by `path`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shadowed_paths: Vec<PathBuf>,
    /// Why the plugin is unusable
    #[serde(
        rename = "Err",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_error"
    )]
    pub err: Option<PluginError>,
}

fn serialize_error<S: Serializer>(
    err: &Option<PluginError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match err {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl Plugin {
    pub(crate) fn invalid(
        name: String,
        path: PathBuf,
        shadowed_paths: Vec<PathBuf>,
        metadata: Option<PluginMetadata>,
        err: PluginError,
    ) -> Self {
        Self {
            name,
            path,
            metadata,
            shadowed_paths,
            err: Some(err),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.err.is_none()
    }

    pub fn short_description(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|m| m.short_description.as_str())
            .unwrap_or_default()
    }

    pub fn vendor(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|m| m.vendor.as_str())
            .unwrap_or_default()
    }

    pub fn version(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|m| m.version.as_str())
            .unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|m| m.url.as_str())
            .unwrap_or_default()
    }

    pub fn is_hidden(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.hidden)
    }

    /// Command-tree stub that stands in for this plugin
    pub fn to_stub(&self) -> CommandNode {
        let about = self.short_description();
        CommandNode {
            name: self.name.clone(),
            aliases: Vec::new(),
            about: (!about.is_empty()).then(|| about.to_string()),
            hidden: self.is_hidden(),
            kind: CommandKind::PluginStub(PluginStub {
                path: self.path.clone(),
                vendor: self.vendor().to_string(),
                version: self.version().to_string(),
            }),
            children: Vec::new(),
        }
    }
}
