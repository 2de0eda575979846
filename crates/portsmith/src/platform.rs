use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util;
use crate::workspace::WorkspacePaths;

const NATIVE_TOOL_DIR: &str = "/usr/bin";

/// Host OS as used by recipe overlays and `supported_hosts`.
pub fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Name used for dev/native library folders, e.g. `x86_64-linux`.
pub fn host_name() -> String {
    format!("{}-{}", std::env::consts::ARCH, host_os())
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Toolchain {
    pub name: String,
    pub host: String,
    pub system_name: String,
    pub system_processor: String,
    // Directory holding the compiler binaries.
    pub path: String,
    pub crosstool_prefix: String,
    pub archive: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cxx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranlib: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ld: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objcopy: Option<String>,
}

impl Toolchain {
    pub fn native() -> Self {
        let system_name = match host_os() {
            "linux" => "Linux",
            "darwin" => "Darwin",
            "windows" => "Windows",
            other => other,
        };
        Self {
            name: "gcc".into(),
            host: format!("{}-{}-gnu", std::env::consts::ARCH, host_os()),
            system_name: system_name.into(),
            system_processor: std::env::consts::ARCH.into(),
            path: NATIVE_TOOL_DIR.into(),
            ..Self::default()
        }
    }

    pub fn is_native(&self) -> bool {
        let p = self.path.trim();
        p.is_empty() || p == NATIVE_TOOL_DIR
    }

    // Explicit override, else `<path>/<prefix><default_name>`.
    pub fn tool(&self, explicit: Option<&String>, default_name: &str) -> String {
        if let Some(t) = explicit.map(|s| s.trim()).filter(|s| !s.is_empty()) {
            return t.to_string();
        }
        let file = format!("{}{}", self.crosstool_prefix, default_name);
        if self.path.trim().is_empty() {
            file
        } else {
            Path::new(self.path.trim()).join(file).display().to_string()
        }
    }

    pub fn cc(&self) -> String {
        self.tool(self.cc.as_ref(), "gcc")
    }

    pub fn cxx(&self) -> String {
        self.tool(self.cxx.as_ref(), "g++")
    }

    // (env key, resolved tool path) pairs exported to cross builds.
    pub fn tool_envs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("CC", self.cc()),
            ("CXX", self.cxx()),
            ("AR", self.tool(self.ar.as_ref(), "ar")),
            ("RANLIB", self.tool(self.ranlib.as_ref(), "ranlib")),
            ("LD", self.tool(self.ld.as_ref(), "ld")),
            ("NM", self.tool(self.nm.as_ref(), "nm")),
            ("STRIP", self.tool(self.strip.as_ref(), "strip")),
            ("OBJCOPY", self.tool(self.objcopy.as_ref(), "objcopy")),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RootFs {
    pub path: String,
    pub archive: String,
    pub include_dirs: Vec<String>,
    pub lib_dirs: Vec<String>,
    pub pkg_config_path: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Platform {
    #[serde(skip)]
    pub name: String,
    pub toolchain: Toolchain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rootfs: Option<RootFs>,
}

impl Platform {
    pub fn native() -> Self {
        Self {
            name: host_name(),
            toolchain: Toolchain::native(),
            rootfs: None,
        }
    }

    /// Load `conf/platforms/<name>.toml`; an empty name selects the native host platform.
    pub fn load(ws: &WorkspacePaths, name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Self::native());
        }
        let path = ws.platforms_dir().join(format!("{name}.toml"));
        if !path.is_file() {
            return Err(Error::msg(format!(
                "platform '{}' not found at {}",
                name,
                path.display()
            )));
        }
        let doc = crate::config::load(&path)?;
        let mut platform: Platform = doc.deserialize()?;
        platform.name = name.to_string();
        Ok(platform)
    }

    pub fn rootfs_dir(&self) -> Option<PathBuf> {
        self.rootfs
            .as_ref()
            .map(|r| r.path.trim())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self)
            .map_err(|e| Error::msg(format!("failed to serialize platform {}: {e}", self.name)))
    }

    /// sha256 of the toolchain and rootfs archives; empty when native or undeclared.
    pub fn archive_checksums(&self, ws: &WorkspacePaths) -> Result<(String, String)> {
        let toolchain = if self.toolchain.is_native() {
            String::new()
        } else {
            archive_checksum(ws, &self.toolchain.archive)?
        };
        let rootfs = match &self.rootfs {
            Some(r) => archive_checksum(ws, &r.archive)?,
            None => String::new(),
        };
        Ok((toolchain, rootfs))
    }
}

fn archive_checksum(ws: &WorkspacePaths, archive: &str) -> Result<String> {
    let archive = archive.trim();
    if archive.is_empty() {
        return Ok(String::new());
    }
    let path = if Path::new(archive).is_absolute() {
        PathBuf::from(archive)
    } else {
        ws.downloads_dir.join(archive)
    };
    if !path.is_file() {
        return Err(Error::msg(format!(
            "archive {} not found for checksum",
            path.display()
        )));
    }
    util::sha256_file(&path)
}
