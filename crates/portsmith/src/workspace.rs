use std::fs;
use std::path::Component;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

// Directory holding portsmith's own bookkeeping under the installed root.
pub const STATE_DIR_NAME: &str = "portsmith";

fn default_root_dir() -> String {
    ".".into()
}

fn default_ports_dir() -> String {
    "ports".into()
}

fn default_conf_dir() -> String {
    "conf".into()
}

fn default_buildtrees_dir() -> String {
    "buildtrees".into()
}

fn default_packages_dir() -> String {
    "packages".into()
}

fn default_installed_dir() -> String {
    "installed".into()
}

fn default_downloads_dir() -> String {
    "downloads".into()
}

fn default_tmp_dir() -> String {
    "tmp".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root_dir: String,
    pub ports_dir: String,
    pub conf_dir: String,
    pub buildtrees_dir: String,
    pub packages_dir: String,
    pub installed_dir: String,
    pub downloads_dir: String,
    pub tmp_dir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            ports_dir: default_ports_dir(),
            conf_dir: default_conf_dir(),
            buildtrees_dir: default_buildtrees_dir(),
            packages_dir: default_packages_dir(),
            installed_dir: default_installed_dir(),
            downloads_dir: default_downloads_dir(),
            tmp_dir: default_tmp_dir(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub ports_dir: PathBuf,
    pub conf_dir: PathBuf,
    pub buildtrees_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub installed_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub tmp_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn platforms_dir(&self) -> PathBuf {
        self.conf_dir.join("platforms")
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.conf_dir.join("projects")
    }

    pub fn port_dir(&self, name: &str, version: &str) -> PathBuf {
        self.ports_dir.join(name).join(version)
    }

    pub fn project_port_dir(&self, project: &str, name: &str, version: &str) -> PathBuf {
        self.projects_dir().join(project).join(name).join(version)
    }

    pub fn tmp_deps_dir(&self) -> PathBuf {
        self.tmp_dir.join("deps")
    }

    pub fn tmp_files_dir(&self) -> PathBuf {
        self.tmp_dir.join("files")
    }

    pub fn trace_dir(&self) -> PathBuf {
        self.installed_dir.join(STATE_DIR_NAME).join("trace")
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.installed_dir.join(STATE_DIR_NAME).join("meta")
    }

    pub fn outdated_meta_dir(&self) -> PathBuf {
        self.meta_dir().join("outdated")
    }

    pub fn remove_under_root(&self, dir: &Path) -> Result<()> {
        safe_remove_dir_all(&self.root, dir)
    }
}

pub fn load_paths(cfg: &WorkspaceConfig, base: &Path) -> Result<WorkspacePaths> {
    let root = resolve_user_path(base, &cfg.root_dir)?;
    Ok(WorkspacePaths {
        ports_dir: resolve_user_dir(&root, &cfg.ports_dir)?,
        conf_dir: resolve_user_dir(&root, &cfg.conf_dir)?,
        buildtrees_dir: resolve_user_dir(&root, &cfg.buildtrees_dir)?,
        packages_dir: resolve_user_dir(&root, &cfg.packages_dir)?,
        installed_dir: resolve_user_dir(&root, &cfg.installed_dir)?,
        downloads_dir: resolve_user_dir(&root, &cfg.downloads_dir)?,
        tmp_dir: resolve_user_dir(&root, &cfg.tmp_dir)?,
        root,
    })
}

// Resolve and create the directories the installer writes into.
pub fn init_dirs(cfg: &WorkspaceConfig, base: &Path) -> Result<WorkspacePaths> {
    let paths = load_paths(cfg, base)?;
    for dir in [
        &paths.buildtrees_dir,
        &paths.packages_dir,
        &paths.installed_dir,
        &paths.downloads_dir,
        &paths.tmp_dir,
    ] {
        fs::create_dir_all(dir)
            .map_err(|e| Error::msg(format!("failed to create {}: {e}", dir.display())))?;
    }
    Ok(paths)
}

fn resolve_user_dir(root: &Path, p: &str) -> Result<PathBuf> {
    let p = p.trim();
    if p.is_empty() {
        return Err(Error::msg("empty workspace dir"));
    }
    if Path::new(p)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(Error::msg(format!(
            "invalid workspace dir '{}' (contains '..')",
            p
        )));
    }
    let pb = PathBuf::from(p);
    Ok(normalize(&if pb.is_absolute() { pb } else { root.join(pb) }))
}

// The workspace root is absolute and free of `.`/`..`, so every derived path is too.
fn resolve_user_path(base: &Path, p: &str) -> Result<PathBuf> {
    let p = p.trim();
    if p.is_empty() {
        return Err(Error::msg("empty workspace path"));
    }
    let pb = PathBuf::from(p);
    let joined = if pb.is_absolute() { pb } else { base.join(pb) };
    if joined.is_absolute() {
        return Ok(normalize(&joined));
    }
    let cwd = std::env::current_dir()
        .map_err(|e| Error::msg(format!("failed to read current dir: {e}")))?;
    Ok(normalize(&cwd.join(joined)))
}

fn normalize(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

pub fn safe_remove_dir_all(root: &Path, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let root_can = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let dir_can = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    if !dir_can.starts_with(&root_can) {
        return Err(Error::msg(format!(
            "refusing to remove '{}' (outside workspace root '{}')",
            dir_can.display(),
            root_can.display()
        )));
    }
    fs::remove_dir_all(&dir_can)
        .map_err(|e| Error::msg(format!("failed to remove dir {}: {e}", dir_can.display())))
}

// Remove `dir` and its parents while they are empty, stopping at `stop`.
pub fn prune_empty_dirs(dir: &Path, stop: &Path) {
    let mut cur = dir.to_path_buf();
    while cur.starts_with(stop) && cur != stop {
        let empty = fs::read_dir(&cur)
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if !empty || fs::remove_dir(&cur).is_err() {
            return;
        }
        match cur.parent() {
            Some(p) => cur = p.to_path_buf(),
            None => return,
        }
    }
}
