//! Port installation: dependencies first, then the first tier that yields a package.
//!
//! Tiers for a port with a fingerprint, in order: already installed (recorded fingerprint
//! equals the current one), local package tree, cache entry, build from source. A recorded
//! fingerprint that disagrees with the current one is stale and purged before any tier runs.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::buildsystems::{self, source};
use crate::cache::{self, CacheKey, CacheStore};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::fingerprint::{self, Fingerprint};
use crate::ports::{NameVersion, Port};
use crate::util;

pub mod fixup;
pub mod remove;
pub mod staging;
pub mod trace;

pub use remove::{RemoveOptions, remove};

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub force: bool,
    // With `force`, rebuild dependencies too.
    pub recursive: bool,
    pub store_cache: bool,
    pub cache_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Preinstalled,
    Package,
    Cache,
    Source,
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstallOutcome::Preinstalled => "preinstalled",
            InstallOutcome::Package => "package",
            InstallOutcome::Cache => "cache",
            InstallOutcome::Source => "source",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub port: NameVersion,
    pub dev: bool,
    // The dependent that pulled this port in; `None` for the requested port.
    pub required_by: Option<String>,
    pub outcome: InstallOutcome,
}

/// Top-level `*.meta` files in a package tree are fingerprints, not payload.
pub(crate) fn is_top_level_meta(rel: &Path) -> bool {
    rel.components().count() == 1 && rel.extension().is_some_and(|e| e == "meta")
}

enum Installed {
    Absent,
    Current,
    Stale,
}

pub struct Installer<'a> {
    ctx: &'a Context,
    opts: InstallOptions,
    cache: Option<Box<dyn CacheStore>>,
    active: Vec<(NameVersion, bool)>,
    staged: HashSet<PathBuf>,
    report: Vec<InstallReport>,
}

impl<'a> Installer<'a> {
    pub fn new(ctx: &'a Context, opts: InstallOptions) -> Result<Self> {
        let cache = cache::open(&ctx.settings.cache, &ctx.settings.base_dir())?;
        Ok(Self::with_cache(ctx, opts, cache))
    }

    pub fn with_cache(
        ctx: &'a Context,
        opts: InstallOptions,
        cache: Option<Box<dyn CacheStore>>,
    ) -> Self {
        Self {
            ctx,
            opts,
            cache,
            active: Vec::new(),
            staged: HashSet::new(),
            report: Vec::new(),
        }
    }

    /// Per-port outcomes in completion order (dependencies before dependents).
    pub fn report(&self) -> &[InstallReport] {
        &self.report
    }

    pub fn install(&mut self, nv: &NameVersion, dev: bool) -> Result<InstallOutcome> {
        self.check_cache_gate()?;
        self.staged.clear();
        self.install_port(nv, dev, None, true)
    }

    // Fails before any filesystem mutation when population is requested but not allowed.
    fn check_cache_gate(&self) -> Result<()> {
        if !self.opts.store_cache {
            return Ok(());
        }
        let cfg = &self.ctx.settings.cache;
        if !cfg.is_configured() {
            tracing::debug!("no cache configured, skipping cache population");
            return Ok(());
        }
        if !cfg.writable {
            return Err(Error::msg(
                "cache population requested but [cache].writable is false",
            ));
        }
        cache::check_token(cfg, self.opts.cache_token.as_deref())
    }

    fn install_port(
        &mut self,
        nv: &NameVersion,
        dev: bool,
        parent: Option<&NameVersion>,
        root: bool,
    ) -> Result<InstallOutcome> {
        if self.active.iter().any(|(n, d)| n == nv && *d == dev) {
            return Err(Error::circular_dependency(&self.active, nv));
        }
        let mut port = Port::resolve(self.ctx, nv, dev).map_err(|e| match parent {
            Some(p) => e.context(format!("dependency of {p}")),
            None => e,
        })?;
        if let Some(p) = parent {
            port = port.with_parent(p.to_string());
        }
        if !port.supported_on_host() {
            tracing::info!(port = %nv, "not supported on this host, nothing to do");
            return Ok(InstallOutcome::Preinstalled);
        }

        self.active.push((nv.clone(), dev));
        let res = self.install_resolved(&port, root);
        self.active.pop();
        let outcome = res.map_err(|e| match &port.parent {
            Some(p) => e.context(format!("install {nv} (required by {p})")),
            None => e.context(format!("install {nv}")),
        })?;

        tracing::info!(port = %nv, dev, outcome = %outcome, "installed");
        self.report.push(InstallReport {
            port: nv.clone(),
            dev,
            required_by: port.parent.clone(),
            outcome,
        });
        if !root {
            staging::stage_closure(self.ctx, &port, &mut self.staged)?;
        }
        Ok(outcome)
    }

    fn install_resolved(&mut self, port: &Port, root: bool) -> Result<InstallOutcome> {
        let force = self.opts.force && (root || self.opts.recursive);
        if !port.writes_meta() {
            return self.install_without_meta(port, root, force);
        }

        let fp = fingerprint::generate(self.ctx, port)?;
        if force {
            tracing::info!(port = %port.id, "forced rebuild, purging previous install");
            self.purge(port)?;
        } else {
            match self.installed_state(port, &fp)? {
                Installed::Current => return Ok(InstallOutcome::Preinstalled),
                Installed::Stale => {
                    tracing::warn!(port = %port.id, hash = %fp.hash, "installed port is stale, purging");
                    self.archive_record(port)?;
                    self.purge(port)?;
                }
                Installed::Absent => {}
            }
        }

        if root {
            staging::reset(self.ctx)?;
        }
        self.install_dependencies(port)?;

        if !force && self.install_from_local_package(port, &fp)? {
            return Ok(InstallOutcome::Package);
        }
        if !force && !self.opts.store_cache && self.install_from_cache(port, &fp)? {
            return Ok(InstallOutcome::Cache);
        }
        self.install_from_source(port, &fp)?;
        Ok(InstallOutcome::Source)
    }

    // Virtual and nobuild ports: no fingerprint, no cache. Installed once the trace exists.
    fn install_without_meta(
        &mut self,
        port: &Port,
        root: bool,
        force: bool,
    ) -> Result<InstallOutcome> {
        if root {
            staging::reset(self.ctx)?;
        }
        self.install_dependencies(port)?;
        if !force && port.paths.trace_file.is_file() {
            return Ok(InstallOutcome::Preinstalled);
        }
        buildsystems::run(self.ctx, port)?;
        if self.ctx.exec.dry_run {
            return Ok(InstallOutcome::Source);
        }
        let files = if port.paths.package_dir.is_dir() {
            self.copy_to_installed(port)?
        } else {
            Vec::new()
        };
        trace::write(&port.paths.trace_file, &port.paths.library_folder, &files)?;
        Ok(InstallOutcome::Source)
    }

    fn install_dependencies(&mut self, port: &Port) -> Result<()> {
        for dep in port.dev_dependencies()? {
            if port.is_self_loop(&dep) {
                tracing::debug!(port = %port.id, "skipping dev dependency on itself");
                continue;
            }
            self.install_port(&dep, true, Some(&port.id), false)?;
        }
        for dep in port.dependencies()? {
            self.install_port(&dep, port.dev, Some(&port.id), false)?;
        }
        Ok(())
    }

    fn installed_state(&self, port: &Port, fp: &Fingerprint) -> Result<Installed> {
        let record = &port.paths.meta_file;
        if !record.is_file() {
            if port.paths.trace_file.is_file() {
                return Ok(Installed::Stale);
            }
            return Ok(Installed::Absent);
        }
        if util::read_text(record)? == fp.document {
            Ok(Installed::Current)
        } else {
            Ok(Installed::Stale)
        }
    }

    fn archive_record(&self, port: &Port) -> Result<()> {
        let record = &port.paths.meta_file;
        if !record.is_file() {
            return Ok(());
        }
        let dir = self.ctx.ws.outdated_meta_dir();
        util::ensure_dir(&dir)?;
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let name = record
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("record.meta");
        let dest = dir.join(format!("{stamp}-{name}"));
        fs::rename(record, &dest).map_err(|e| {
            Error::msg(format!(
                "failed to move {} to {}: {e}",
                record.display(),
                dest.display()
            ))
        })
    }

    // Everything a rebuild could pick up from the previous one goes.
    fn purge(&self, port: &Port) -> Result<()> {
        remove::uninstall(self.ctx, port)?;
        self.ctx.ws.remove_under_root(&port.paths.package_dir)?;
        self.reset_build(port)
    }

    fn reset_build(&self, port: &Port) -> Result<()> {
        remove::remove_build_cache(self.ctx, port)?;
        source::reset_checkout(self.ctx, port)
    }

    fn install_from_local_package(&self, port: &Port, fp: &Fingerprint) -> Result<bool> {
        let dir = &port.paths.package_dir;
        if !dir.is_dir() {
            return Ok(false);
        }
        let metas = top_level_metas(dir)?;
        if metas.is_empty() {
            return Err(Error::msg(format!(
                "package {} has no fingerprint file; it is corrupt or was not produced by portsmith, remove it to rebuild",
                dir.display()
            )));
        }
        let expected = dir.join(format!("{}.meta", fp.hash));
        if expected.is_file() && util::read_text(&expected)? == fp.document {
            tracing::info!(port = %port.id, hash = %fp.hash, "installing from local package");
            self.install_from_package(port, fp)?;
            return Ok(true);
        }
        tracing::warn!(port = %port.id, hash = %fp.hash, "local package is stale, removing");
        self.ctx.ws.remove_under_root(dir)?;
        self.reset_build(port)?;
        Ok(false)
    }

    fn cache_key(&self, port: &Port, fp: &Fingerprint) -> CacheKey {
        CacheKey {
            platform: self.ctx.platform_name(port.dev),
            project: self.ctx.project().to_string(),
            build_type: self.ctx.build_type(port.dev).to_string(),
            name_version: port.id.to_string(),
            hash: fp.hash.clone(),
        }
    }

    fn scratch_dir(&self) -> PathBuf {
        self.ctx.ws.tmp_dir.join("cache")
    }

    fn install_from_cache(&self, port: &Port, fp: &Fingerprint) -> Result<bool> {
        let Some(store) = self.cache.as_deref() else {
            return Ok(false);
        };
        let key = self.cache_key(port, fp);
        let dir = &port.paths.package_dir;
        match cache::restore(store, &key, dir, &self.scratch_dir()) {
            Ok(false) => Ok(false),
            Ok(true) => {
                tracing::info!(port = %port.id, cache = %store.describe(), hash = %fp.hash, "restored from cache");
                self.install_from_package(port, fp)?;
                Ok(true)
            }
            Err(e) => {
                let _ = self.ctx.ws.remove_under_root(dir);
                Err(e.context("restore from cache"))
            }
        }
    }

    fn install_from_source(&self, port: &Port, fp: &Fingerprint) -> Result<()> {
        let dir = &port.paths.package_dir;
        self.ctx.ws.remove_under_root(dir)?;
        // Judged before patches touch the checkout.
        let unpublishable = if self.opts.store_cache && self.cache.is_some() {
            publish_blocker(port)?
        } else {
            None
        };
        buildsystems::run(self.ctx, port)?;
        if self.ctx.exec.dry_run {
            return Ok(());
        }
        util::ensure_dir(dir)?;
        util::atomic_write_text(&dir.join(format!("{}.meta", fp.hash)), &fp.document)?;
        self.install_from_package(port, fp)?;

        if self.opts.store_cache
            && let Some(store) = self.cache.as_deref()
        {
            if let Some(reason) = unpublishable {
                tracing::warn!(port = %port.id, reason, "not storing package in cache");
                return Ok(());
            }
            self.check_cache_gate()?;
            let key = self.cache_key(port, fp);
            cache::publish(store, &key, dir, &fp.document, &self.scratch_dir())?;
        }
        Ok(())
    }

    fn copy_to_installed(&self, port: &Port) -> Result<Vec<PathBuf>> {
        let paths = &port.paths;
        let files = util::copy_tree(&paths.package_dir, &paths.installed_dir, is_top_level_meta)?;
        fixup::relocate(
            &paths.installed_dir,
            &files,
            &paths.package_dir,
            &paths.installed_dir,
        )?;
        Ok(files)
    }

    fn install_from_package(&self, port: &Port, fp: &Fingerprint) -> Result<()> {
        let files = self.copy_to_installed(port)?;
        trace::write(&port.paths.trace_file, &port.paths.library_folder, &files)?;
        util::atomic_write_text(&port.paths.meta_file, &fp.document)?;
        tracing::debug!(port = %port.id, files = files.len(), "copied into installed tree");
        Ok(())
    }
}

// Packages the fingerprint cannot fully describe stay out of the shared cache.
fn publish_blocker(port: &Port) -> Result<Option<&'static str>> {
    if port.dev {
        return Ok(Some("host builds are not cached"));
    }
    let repo = &port.paths.repo_dir;
    if !repo.join(".git").exists() {
        return Ok(None);
    }
    if source::is_modified(repo)? {
        return Ok(Some("source repo has local modifications"));
    }
    if source::is_git_url(port.url()) && !source::is_up_to_date(repo)? {
        return Ok(Some("source repo is not up to date with its upstream"));
    }
    Ok(None)
}

fn top_level_metas(dir: &Path) -> Result<Vec<PathBuf>> {
    let rd = fs::read_dir(dir)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", dir.display())))?;
    let mut out = Vec::new();
    for ent in rd {
        let path = ent?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "meta") {
            out.push(path);
        }
    }
    Ok(out)
}
