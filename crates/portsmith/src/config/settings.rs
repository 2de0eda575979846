use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::config::ConfigDoc;
use crate::error::{Error, Result};
use crate::workspace::{self, WorkspaceConfig, WorkspacePaths};

fn default_project() -> String {
    "default".into()
}

fn default_build_type() -> String {
    "release".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    // Empty means a native build for the current host.
    pub platform: String,
    pub project: String,
    pub build_type: String,
    // 0 = CPU count.
    pub jobs: usize,
    pub dry_run: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            platform: String::new(),
            project: default_project(),
            build_type: default_build_type(),
            jobs: 0,
            dry_run: false,
        }
    }
}

/// Compiler flags appended to CFLAGS/CXXFLAGS for each build type.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct OptimizeFlags {
    pub release: String,
    pub debug: String,
    pub relwithdebinfo: String,
    pub minsizerel: String,
}

impl OptimizeFlags {
    pub fn for_build_type(&self, build_type: &str) -> &str {
        match build_type.to_ascii_lowercase().as_str() {
            "release" => &self.release,
            "debug" => &self.debug,
            "relwithdebinfo" => &self.relwithdebinfo,
            "minsizerel" => &self.minsizerel,
            _ => "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub path: PathBuf,
    pub workspace: WorkspaceConfig,
    pub global: GlobalConfig,
    pub cache: CacheConfig,
    pub optimize: OptimizeFlags,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let doc = crate::config::load(path)?;
        Self::from_doc(&doc)
    }

    pub fn from_doc(doc: &ConfigDoc) -> Result<Self> {
        let global: GlobalConfig = doc.section("global")?;
        let build_type = global.build_type.trim().to_ascii_lowercase();
        if !matches!(
            build_type.as_str(),
            "release" | "debug" | "relwithdebinfo" | "minsizerel"
        ) {
            return Err(Error::msg(format!(
                "unsupported build_type '{}' (expected release, debug, relwithdebinfo or minsizerel)",
                global.build_type
            )));
        }
        if global.project.trim().is_empty() {
            return Err(Error::msg("[global].project is empty"));
        }
        Ok(Self {
            path: doc.path.clone(),
            workspace: doc.section("workspace")?,
            global: GlobalConfig {
                build_type,
                ..global
            },
            cache: doc.section("cache")?,
            optimize: doc.section("optimize")?,
        })
    }

    // Workspace roots are relative to the settings file.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn workspace_paths(&self) -> Result<WorkspacePaths> {
        workspace::init_dirs(&self.workspace, &self.base_dir())
    }

    pub fn jobs(&self) -> usize {
        if self.global.jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.global.jobs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_lowercased_build_type() {
        let doc = ConfigDoc::parse(
            Path::new("/tmp/portsmith.toml"),
            "[global]\nbuild_type = \"Debug\"\n[optimize]\ndebug = \"-g\"\n",
        )
        .expect("parse");
        let s = Settings::from_doc(&doc).expect("settings");
        assert_eq!(s.global.build_type, "debug");
        assert_eq!(s.global.project, "default");
        assert_eq!(s.optimize.for_build_type("DEBUG"), "-g");
        assert!(s.cache.dir.is_none());
    }

    #[test]
    fn rejects_unknown_build_type() {
        let doc = ConfigDoc::parse(
            Path::new("/tmp/portsmith.toml"),
            "[global]\nbuild_type = \"fast\"\n",
        )
        .expect("parse");
        assert!(Settings::from_doc(&doc).is_err());
    }
}
