//! Plugin candidate scanning
//!
//! Walks the plugin search directories in precedence order and groups every
//! `docker-<name>` entry by its logical plugin name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::config::ConfigFile;
use crate::error::{DockerCliError, Result};

/// Filename prefix every plugin executable carries
pub const NAME_PREFIX: &str = "docker-";

/// Per-user plugin directory, relative to the config directory
const USER_PLUGIN_DIR: &str = "cli-plugins";

#[cfg(windows)]
const EXE_SUFFIX: &str = ".exe";

/// Logical plugin name -> candidate paths, highest precedence first
pub type Candidates = BTreeMap<String, Vec<PathBuf>>;

/// Plugin search directories, split by origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDirs {
    user: PathBuf,
    extra: Vec<PathBuf>,
    system: Vec<PathBuf>,
}

impl SearchDirs {
    /// Build the search path from the config directory and its config file
    pub fn new(config_dir: &Path, config: &ConfigFile) -> Self {
        Self {
            user: config_dir.join(USER_PLUGIN_DIR),
            extra: config.plugin_extra_dirs(),
            system: default_system_dirs(),
        }
    }

    /// Replace the platform system directories (for testing)
    pub fn with_system_dirs(mut self, system: Vec<PathBuf>) -> Self {
        self.system = system;
        self
    }

    pub fn user_dir(&self) -> &Path {
        &self.user
    }

    /// All directories, highest precedence first: user, extra, system
    pub fn ordered(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::with_capacity(1 + self.extra.len() + self.system.len());
        dirs.push(self.user.clone());
        dirs.extend(self.extra.iter().cloned());
        dirs.extend(self.system.iter().cloned());
        dirs
    }
}

/// System-wide plugin directories for the current platform
pub fn default_system_dirs() -> Vec<PathBuf> {
    #[cfg(windows)]
    {
        ["ProgramData", "ProgramFiles"]
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .map(|base| PathBuf::from(base).join("Docker").join("cli-plugins"))
            .collect()
    }

    #[cfg(not(windows))]
    {
        let mut dirs: Vec<PathBuf> = [
            "/usr/local/lib/docker/cli-plugins",
            "/usr/local/libexec/docker/cli-plugins",
            "/usr/lib/docker/cli-plugins",
            "/usr/libexec/docker/cli-plugins",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();

        if cfg!(target_os = "macos") {
            dirs.push(PathBuf::from(
                "/Applications/Docker.app/Contents/Resources/cli-plugins",
            ));
        }

        dirs
    }
}

/// Logical plugin name for a directory entry, if it follows the convention
pub fn candidate_name(file_name: &str) -> Option<&str> {
    let name = file_name.strip_prefix(NAME_PREFIX)?;

    #[cfg(windows)]
    let name = {
        let split = name.len().checked_sub(EXE_SUFFIX.len())?;
        match (name.get(..split), name.get(split..)) {
            (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(EXE_SUFFIX) => stem,
            _ => return None,
        }
    };

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Scan `dirs` in order and group candidates by logical name.
///
/// Missing directories are skipped. A directory that exists but cannot be
/// listed aborts the scan.
pub fn list_plugin_candidates(dirs: &[PathBuf]) -> Result<Candidates> {
    let mut candidates = Candidates::new();

    for dir in dirs {
        add_candidates_from_dir(&mut candidates, dir)?;
    }

    Ok(candidates)
}

fn add_candidates_from_dir(candidates: &mut Candidates, dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            debug!(path = %dir.display(), "plugin search path is not a directory, skipping");
            return Ok(());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %dir.display(), "plugin directory does not exist, skipping");
            return Ok(());
        }
        Err(e) => {
            return Err(DockerCliError::Scan {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    }

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| DockerCliError::Scan {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;

        // Symlinks are not followed here, so a dangling link still counts
        if entry.file_type().is_dir() {
            continue;
        }

        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(name) = candidate_name(file_name) else {
            continue;
        };

        debug!(plugin = name, path = %entry.path().display(), "found plugin candidate");
        candidates
            .entry(name.to_string())
            .or_default()
            .push(entry.path().to_path_buf());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        path
    }

    fn exe(name: &str) -> String {
        if cfg!(windows) {
            format!("{}.exe", name)
        } else {
            name.to_string()
        }
    }

    #[test]
    fn test_candidate_name() {
        assert_eq!(candidate_name(&exe("docker-buildx")), Some("buildx"));
        assert_eq!(candidate_name(&exe("docker-")), None);
        assert_eq!(candidate_name("buildx"), None);
        assert_eq!(candidate_name("not-docker-buildx"), None);
    }

    #[test]
    fn test_directory_precedence_and_missing_dirs() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let missing = temp.path().join("missing");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        let a_plugin1 = touch(&a, &exe("docker-plugin1"));
        let b_plugin1 = touch(&b, &exe("docker-plugin1"));
        let b_other = touch(&b, &exe("docker-other"));

        let candidates = list_plugin_candidates(&[a, missing, b]).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates["plugin1"], vec![a_plugin1, b_plugin1]);
        assert_eq!(candidates["other"], vec![b_other]);
    }

    #[test]
    fn test_non_matching_entries_excluded() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        touch(dir, "README.md");
        touch(dir, "dockerfoo");
        touch(dir, &exe("docker-"));
        fs::create_dir_all(dir.join(exe("docker-subdir"))).unwrap();
        fs::create_dir_all(dir.join("nested")).unwrap();
        touch(&dir.join("nested"), &exe("docker-deep"));

        let candidates = list_plugin_candidates(&[dir.to_path_buf()]).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_search_path_that_is_a_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        let file = touch(temp.path(), "not-a-dir");

        let candidates = list_plugin_candidates(&[file]).unwrap();
        assert!(candidates.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_and_hardlinks_are_candidates() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let target = touch(dir, "docker-real");
        std::os::unix::fs::symlink(&target, dir.join("docker-soft")).unwrap();
        fs::hard_link(&target, dir.join("docker-hard")).unwrap();
        std::os::unix::fs::symlink(dir.join("nowhere"), dir.join("docker-dangling")).unwrap();

        let candidates = list_plugin_candidates(&[dir.to_path_buf()]).unwrap();

        let names: Vec<&str> = candidates.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["dangling", "hard", "real", "soft"]);
        assert_eq!(candidates["dangling"], vec![dir.join("docker-dangling")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_dir_aborts_scan() {
        use std::os::unix::fs::PermissionsExt;

        // root ignores directory modes
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let temp = TempDir::new().unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        touch(&locked, "docker-hidden");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let result = list_plugin_candidates(&[temp.path().join("missing"), locked.clone()]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        match result {
            Err(DockerCliError::Scan { path, .. }) => assert_eq!(path, locked),
            other => panic!("expected scan error, got {:?}", other),
        }
    }

    #[test]
    fn test_search_dirs_order() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile {
            cli_plugins_extra_dirs: vec!["foo".into(), "bar".into(), "baz".into()],
            ..Default::default()
        };

        let dirs = SearchDirs::new(temp.path(), &config)
            .with_system_dirs(vec![PathBuf::from("/sys1"), PathBuf::from("/sys2")]);

        assert_eq!(
            dirs.ordered(),
            vec![
                temp.path().join("cli-plugins"),
                PathBuf::from("foo"),
                PathBuf::from("bar"),
                PathBuf::from("baz"),
                PathBuf::from("/sys1"),
                PathBuf::from("/sys2"),
            ]
        );
    }

    #[test]
    fn test_default_system_dirs_follow_extra_dirs() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile {
            cli_plugins_extra_dirs: vec!["foo".into()],
            ..Default::default()
        };

        let ordered = SearchDirs::new(temp.path(), &config).ordered();
        assert_eq!(ordered[0], temp.path().join("cli-plugins"));
        assert_eq!(ordered[1], PathBuf::from("foo"));
        assert_eq!(&ordered[2..], default_system_dirs().as_slice());
    }
}
