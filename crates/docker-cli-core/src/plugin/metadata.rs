//! Plugin metadata discovery
//!
//! Every candidate is asked to describe itself by running it with
//! [`METADATA_SUBCOMMAND`]. The JSON it prints is parsed into
//! [`PluginMetadata`] and checked against [`DiscoveryOptions`].

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PluginError;

/// Argument passed to a candidate to request its metadata
pub const METADATA_SUBCOMMAND: &str = "docker-cli-plugin-metadata";

/// Default bound on a single metadata invocation
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default accepted `SchemaVersion` range
pub const DEFAULT_SCHEMA_REQUIREMENT: &str = ">=0.1.0, <1.0.0";

const DISCOVERY_TIMEOUT_ENV: &str = "DOCKER_CLI_PLUGIN_DISCOVERY_TIMEOUT";
const MAX_METADATA_BYTES: u64 = 1024 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Self-reported plugin descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PluginMetadata {
    /// Metadata schema version (semver)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Plugin name; must match the filename when present
    #[serde(default, skip_serializing)]
    pub name: Option<String>,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default, rename = "URL")]
    pub url: String,
    /// Hide the plugin from help output
    #[serde(default)]
    pub hidden: bool,
}

/// Policy knobs for metadata discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    timeout: Duration,
    schema: VersionReq,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
            schema: default_schema_requirement(),
        }
    }
}

fn default_schema_requirement() -> VersionReq {
    // Constant input, covered by test_default_options
    VersionReq::parse(DEFAULT_SCHEMA_REQUIREMENT).unwrap_or(VersionReq::STAR)
}

impl DiscoveryOptions {
    /// Defaults, with the timeout overridable through the environment
    pub fn from_env() -> Self {
        let options = Self::default();
        match std::env::var(DISCOVERY_TIMEOUT_ENV) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => options.with_timeout(Duration::from_secs(secs)),
                _ => {
                    warn!(value = %raw, "ignoring invalid {}", DISCOVERY_TIMEOUT_ENV);
                    options
                }
            },
            Err(_) => options,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_schema_requirement(
        mut self,
        requirement: &str,
    ) -> std::result::Result<Self, semver::Error> {
        self.schema = VersionReq::parse(requirement)?;
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn schema(&self) -> &VersionReq {
        &self.schema
    }
}

/// Runs a candidate's metadata command and returns its raw stdout
pub trait MetadataRunner {
    fn run_metadata(&self, path: &Path, timeout: Duration) -> Result<Vec<u8>, PluginError>;
}

/// Runs the real executable with a minimal environment
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMetadataRunner;

impl MetadataRunner for SystemMetadataRunner {
    fn run_metadata(&self, path: &Path, timeout: Duration) -> Result<Vec<u8>, PluginError> {
        let mut cmd = Command::new(path);
        cmd.arg(METADATA_SUBCOMMAND);
        cmd.env_clear();
        if let Some(search_path) = std::env::var_os("PATH") {
            cmd.env("PATH", search_path);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| PluginError::Spawn {
            message: e.to_string(),
        })?;

        let reader = child.stdout.take().map(|stdout| {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let mut buf = Vec::new();
                let result = stdout
                    .take(MAX_METADATA_BYTES + 1)
                    .read_to_end(&mut buf)
                    .map(|_| buf);
                let _ = tx.send(result);
            });
            rx
        });

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    debug!(path = %path.display(), "plugin metadata command timed out");
                    return Err(PluginError::Timeout(timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(PluginError::Spawn {
                        message: e.to_string(),
                    });
                }
            }
        };

        if !status.success() {
            return Err(PluginError::ExitStatus {
                status: status.to_string(),
            });
        }

        // A background process can keep the pipe open after the plugin exits
        let remaining = deadline.saturating_duration_since(Instant::now());
        let stdout = match reader {
            Some(rx) => match rx.recv_timeout(remaining) {
                Ok(result) => result.map_err(|e| PluginError::MalformedMetadata {
                    message: e.to_string(),
                })?,
                Err(RecvTimeoutError::Timeout) => {
                    debug!(path = %path.display(), "plugin metadata output still open at deadline");
                    return Err(PluginError::Timeout(timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PluginError::MalformedMetadata {
                        message: "stdout reader panicked".to_string(),
                    })
                }
            },
            None => Vec::new(),
        };

        if stdout.len() as u64 > MAX_METADATA_BYTES {
            return Err(PluginError::MalformedMetadata {
                message: format!("output exceeds {} bytes", MAX_METADATA_BYTES),
            });
        }

        Ok(stdout)
    }
}

/// Parse the metadata command's stdout
pub fn parse_metadata(stdout: &[u8]) -> Result<PluginMetadata, PluginError> {
    serde_json::from_slice(stdout).map_err(|e| PluginError::MalformedMetadata {
        message: e.to_string(),
    })
}

/// Check parsed metadata against the candidate's logical name and the
/// supported schema range
pub fn validate_metadata(
    name: &str,
    metadata: &PluginMetadata,
    options: &DiscoveryOptions,
) -> Result<(), PluginError> {
    let raw = match metadata.schema_version.as_deref().map(str::trim) {
        None | Some("") => return Err(PluginError::MissingSchemaVersion),
        Some(raw) => raw,
    };

    let version = Version::parse(raw).map_err(|e| PluginError::InvalidSchemaVersion {
        version: raw.to_string(),
        message: e.to_string(),
    })?;

    if !options.schema().matches(&version) {
        return Err(PluginError::IncompatibleSchemaVersion {
            version: raw.to_string(),
            supported: options.schema().to_string(),
        });
    }

    if let Some(reported) = metadata.name.as_deref() {
        if reported != name {
            return Err(PluginError::NameMismatch {
                reported: reported.to_string(),
                expected: name.to_string(),
            });
        }
    }

    Ok(())
}

/// Logical names are lowercase ASCII, starting with a letter
pub fn is_valid_plugin_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(schema: Option<&str>) -> PluginMetadata {
        PluginMetadata {
            schema_version: schema.map(str::to_string),
            vendor: "Docker Inc.".to_string(),
            version: "v0.12.0".to_string(),
            short_description: "Docker Buildx".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_options() {
        let options = DiscoveryOptions::default();
        assert_eq!(options.timeout(), Duration::from_secs(10));
        assert!(options.schema().matches(&Version::new(0, 1, 0)));
        assert!(!options.schema().matches(&Version::new(1, 0, 0)));
    }

    #[test]
    fn test_parse_metadata() {
        let json = br#"{
            "SchemaVersion": "0.1.0",
            "Vendor": "Docker Inc.",
            "Version": "v0.12.0",
            "ShortDescription": "Docker Buildx",
            "URL": "https://github.com/docker/buildx"
        }"#;

        let parsed = parse_metadata(json).unwrap();
        assert_eq!(parsed.schema_version.as_deref(), Some("0.1.0"));
        assert_eq!(parsed.url, "https://github.com/docker/buildx");
        assert!(!parsed.hidden);
        assert!(parsed.name.is_none());
    }

    #[test]
    fn test_parse_metadata_rejects_garbage() {
        let err = parse_metadata(b"hello world").unwrap_err();
        assert!(matches!(err, PluginError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_validate_schema_version() {
        let options = DiscoveryOptions::default();

        assert!(validate_metadata("buildx", &metadata(Some("0.1.0")), &options).is_ok());
        assert_eq!(
            validate_metadata("buildx", &metadata(None), &options),
            Err(PluginError::MissingSchemaVersion)
        );
        assert!(matches!(
            validate_metadata("buildx", &metadata(Some("zero")), &options),
            Err(PluginError::InvalidSchemaVersion { .. })
        ));
        assert!(matches!(
            validate_metadata("buildx", &metadata(Some("1.0.0")), &options),
            Err(PluginError::IncompatibleSchemaVersion { .. })
        ));
    }

    #[test]
    fn test_validate_custom_schema_range() {
        let options = DiscoveryOptions::default()
            .with_schema_requirement(">=0.1.0, <2.0.0")
            .unwrap();
        assert!(validate_metadata("buildx", &metadata(Some("1.3.0")), &options).is_ok());
        assert!(DiscoveryOptions::default()
            .with_schema_requirement("not a range")
            .is_err());
    }

    #[test]
    fn test_validate_name_mismatch() {
        let mut meta = metadata(Some("0.1.0"));
        meta.name = Some("compose".to_string());

        let err = validate_metadata("buildx", &meta, &DiscoveryOptions::default()).unwrap_err();
        assert_eq!(
            err,
            PluginError::NameMismatch {
                reported: "compose".to_string(),
                expected: "buildx".to_string(),
            }
        );
    }

    #[test]
    fn test_plugin_name_rules() {
        assert!(is_valid_plugin_name("buildx"));
        assert!(is_valid_plugin_name("compose2"));
        assert!(!is_valid_plugin_name("Compose"));
        assert!(!is_valid_plugin_name("2compose"));
        assert!(!is_valid_plugin_name("my-plugin"));
        assert!(!is_valid_plugin_name(""));
    }

    #[cfg(unix)]
    mod system_runner {
        use super::super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_runs_metadata_subcommand() {
            let temp = TempDir::new().unwrap();
            let path = script(
                temp.path(),
                "docker-hello",
                r#"[ "$1" = "docker-cli-plugin-metadata" ] || exit 3
echo '{"SchemaVersion":"0.1.0","Vendor":"Example"}'"#,
            );

            let out = SystemMetadataRunner
                .run_metadata(&path, Duration::from_secs(5))
                .unwrap();
            let parsed = parse_metadata(&out).unwrap();
            assert_eq!(parsed.vendor, "Example");
        }

        #[test]
        fn test_environment_is_minimal() {
            let temp = TempDir::new().unwrap();
            let path = script(
                temp.path(),
                "docker-env",
                r#"[ -z "$HOME" ] || exit 4
echo '{"SchemaVersion":"0.1.0"}'"#,
            );

            assert!(SystemMetadataRunner
                .run_metadata(&path, Duration::from_secs(5))
                .is_ok());
        }

        #[test]
        fn test_non_zero_exit() {
            let temp = TempDir::new().unwrap();
            let path = script(temp.path(), "docker-fail", "exit 1");

            let err = SystemMetadataRunner
                .run_metadata(&path, Duration::from_secs(5))
                .unwrap_err();
            assert!(matches!(err, PluginError::ExitStatus { .. }));
        }

        #[test]
        fn test_timeout() {
            let temp = TempDir::new().unwrap();
            let path = script(temp.path(), "docker-slow", "exec sleep 5");

            let started = Instant::now();
            let err = SystemMetadataRunner
                .run_metadata(&path, Duration::from_millis(200))
                .unwrap_err();
            assert_eq!(err, PluginError::Timeout(Duration::from_millis(200)));
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn test_timeout_when_background_child_holds_stdout() {
            let temp = TempDir::new().unwrap();
            let path = script(
                temp.path(),
                "docker-forker",
                r#"sleep 5 &
echo '{"SchemaVersion":"0.1.0"}'"#,
            );

            let started = Instant::now();
            let err = SystemMetadataRunner
                .run_metadata(&path, Duration::from_millis(500))
                .unwrap_err();
            assert_eq!(err, PluginError::Timeout(Duration::from_millis(500)));
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn test_missing_binary() {
            let temp = TempDir::new().unwrap();
            let err = SystemMetadataRunner
                .run_metadata(&temp.path().join("docker-gone"), Duration::from_secs(1))
                .unwrap_err();
            assert!(matches!(err, PluginError::Spawn { .. }));
        }
    }
}
