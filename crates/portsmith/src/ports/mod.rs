use std::fmt;
use std::path::{Path, PathBuf};

use crate::buildsystems::BuildSystemKind;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::platform;

pub mod pattern;
pub mod recipe;
pub mod tree;

pub use recipe::{BuildConfig, BuildOverlay, PackageSection, PortRecipe};

pub const RECIPE_FILE: &str = "port.toml";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameVersion {
    pub name: String,
    pub version: String,
}

impl NameVersion {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let mut parts = raw.split('@');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(version), None)
                if !name.trim().is_empty() && !version.trim().is_empty() =>
            {
                Ok(Self {
                    name: name.trim().to_string(),
                    version: version.trim().to_string(),
                })
            }
            _ => Err(Error::msg(format!(
                "invalid port '{raw}' (expected name@version)"
            ))),
        }
    }

    pub fn parse_list(items: &[String]) -> Result<Vec<Self>> {
        items
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| Self::parse(s))
            .collect()
    }
}

impl fmt::Display for NameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Filesystem locations derived for one port resolution.
#[derive(Debug, Clone)]
pub struct PortPaths {
    pub library_folder: String,
    pub package_dir: PathBuf,
    pub installed_dir: PathBuf,
    pub trace_file: PathBuf,
    pub meta_file: PathBuf,
    pub build_dir: PathBuf,
    pub repo_dir: PathBuf,
    pub src_dir: PathBuf,
    pub staging_dir: PathBuf,
}

impl PortPaths {
    fn derive(ctx: &Context, nv: &NameVersion, dev: bool, src_dir: &str) -> Self {
        let lf = ctx.library_folder(dev);
        let ws = &ctx.ws;
        let tree = ws.buildtrees_dir.join(nv.to_string());
        let repo_dir = tree.join("src");
        let src_dir = match src_dir.trim().trim_matches('/') {
            "" => repo_dir.clone(),
            sub => repo_dir.join(sub),
        };
        Self {
            package_dir: ws.packages_dir.join(format!("{nv}@{lf}")),
            installed_dir: ws.installed_dir.join(&lf),
            trace_file: ws.trace_dir().join(format!("{nv}@{lf}.trace")),
            meta_file: ws.meta_dir().join(format!("{nv}@{lf}.meta")),
            build_dir: tree.join(ctx.build_folder(dev)),
            staging_dir: ws.tmp_deps_dir().join(&lf),
            repo_dir,
            src_dir,
            library_folder: lf,
        }
    }

    // `<build-dir-parent>/<build-dir-name>-<step>.log`
    pub fn step_log(&self, step: &str) -> PathBuf {
        let name = self
            .build_dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("build");
        let parent = self.build_dir.parent().unwrap_or(Path::new("."));
        parent.join(format!("{name}-{step}.log"))
    }
}

/// A port resolved against the current platform. Rebuilt from recipe files on every use.
#[derive(Debug, Clone)]
pub struct Port {
    pub id: NameVersion,
    pub dev: bool,
    pub parent: Option<String>,
    pub recipe: PortRecipe,
    pub config: BuildConfig,
    pub kind: BuildSystemKind,
    pub port_dir: PathBuf,
    pub project_port_dir: PathBuf,
    pub paths: PortPaths,
}

pub fn load_recipe(ctx: &Context, nv: &NameVersion) -> Result<PortRecipe> {
    let port_dir = ctx.ws.port_dir(&nv.name, &nv.version);
    let path = port_dir.join(RECIPE_FILE);
    if !path.is_file() {
        return Err(Error::msg(format!(
            "port {nv} not found ({} does not exist)",
            path.display()
        )));
    }
    let overlay = ctx
        .ws
        .project_port_dir(ctx.project(), &nv.name, &nv.version)
        .join(RECIPE_FILE);
    let doc = crate::config::load_overlaid(&path, Some(&overlay))?;
    let recipe: PortRecipe = doc.deserialize()?;
    recipe.validate(&nv.to_string())?;
    Ok(recipe)
}

impl Port {
    pub fn resolve(ctx: &Context, nv: &NameVersion, dev: bool) -> Result<Self> {
        let recipe = load_recipe(ctx, nv)?;
        let platform_name = ctx.platform_name(dev);
        let chosen = recipe
            .build_configs
            .iter()
            .find(|c| pattern::matches(&c.pattern, &platform_name))
            .or_else(|| {
                recipe
                    .build_configs
                    .iter()
                    .find(|c| c.is_unconditional_fallback())
            })
            .cloned()
            .ok_or_else(|| {
                Error::msg(format!(
                    "port {nv}: no build config matches platform '{platform_name}'"
                ))
            })?;
        let os = pattern::target_os(&chosen.pattern, &platform_name);
        let mut config = chosen.resolved_for(os);
        config.build_type = ctx.build_type(dev).to_string();
        let kind = config.kind()?;
        let paths = PortPaths::derive(ctx, nv, dev, &recipe.package.src_dir);
        Ok(Self {
            id: nv.clone(),
            dev,
            parent: None,
            port_dir: ctx.ws.port_dir(&nv.name, &nv.version),
            project_port_dir: ctx
                .ws
                .project_port_dir(ctx.project(), &nv.name, &nv.version),
            recipe,
            config,
            kind,
            paths,
        })
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn url(&self) -> &str {
        let own = self.config.url.trim();
        if own.is_empty() {
            self.recipe.package.url.trim()
        } else {
            own
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.url() == "_"
    }

    // Ports that never produce a package tree carry no fingerprint file and skip the cache.
    pub fn writes_meta(&self) -> bool {
        !self.is_virtual() && self.kind != BuildSystemKind::Nobuild
    }

    pub fn supported_on_host(&self) -> bool {
        let hosts = &self.recipe.package.supported_hosts;
        hosts.is_empty()
            || hosts
                .iter()
                .any(|h| h.trim().eq_ignore_ascii_case(platform::host_os()))
    }

    pub fn dependencies(&self) -> Result<Vec<NameVersion>> {
        NameVersion::parse_list(&self.config.dependencies)
            .map_err(|e| e.context(format!("dependencies of {}", self.id)))
    }

    pub fn dev_dependencies(&self) -> Result<Vec<NameVersion>> {
        NameVersion::parse_list(&self.config.dev_dependencies)
            .map_err(|e| e.context(format!("dev_dependencies of {}", self.id)))
    }

    /// A dev dependency naming this very port while it builds for the host adds nothing.
    pub fn is_self_loop(&self, dev_dep: &NameVersion) -> bool {
        self.dev && *dev_dep == self.id
    }

    pub fn fingerprint_toml(&self) -> Result<String> {
        self.recipe.to_toml_with(&self.config)
    }

    /// Patch files resolve from the project override dir first.
    pub fn patch_path(&self, patch: &str) -> Result<PathBuf> {
        let patch = patch.trim();
        [&self.project_port_dir, &self.port_dir]
            .into_iter()
            .map(|d| d.join(patch))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                Error::msg(format!(
                    "patch '{patch}' of {} not found in {} or {}",
                    self.id,
                    self.project_port_dir.display(),
                    self.port_dir.display()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_version_requires_both_halves() {
        let nv = NameVersion::parse(" zlib@1.3.1 ").expect("parse");
        assert_eq!(nv.to_string(), "zlib@1.3.1");
        for bad in ["zlib", "@1.0", "zlib@", "a@b@c", ""] {
            assert!(NameVersion::parse(bad).is_err(), "{bad} should be rejected");
        }
    }
}
