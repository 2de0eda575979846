//! Binary package cache keyed by platform, project, build type, port and fingerprint hash.
//!
//! Layout under the cache root: `<platform>/<project>/<build_type>/<name@version>/` holding
//! `<hash>.tar.gz` and its sibling `<hash>.meta` (the fingerprint document). An archive is
//! only trusted when its meta exists and hashes back to the key.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::util;

pub mod archive;
pub mod dir;
pub mod http;

pub use dir::DirCache;
pub use http::HttpCache;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    // Local cache root.
    pub dir: Option<String>,
    // Remote HTTP cache root; takes precedence over `dir`.
    pub url: Option<String>,
    pub token: Option<String>,
    // Read the configured token from this environment variable when `token` is unset.
    pub token_env: Option<String>,
    pub writable: bool,
}

fn non_empty(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

impl CacheConfig {
    pub fn is_configured(&self) -> bool {
        non_empty(self.dir.as_deref()).is_some() || non_empty(self.url.as_deref()).is_some()
    }

    pub fn configured_token(&self) -> Option<String> {
        non_empty(self.token.as_deref()).or_else(|| {
            let var = non_empty(self.token_env.as_deref())?;
            non_empty(std::env::var(var).ok().as_deref())
        })
    }
}

/// Writes require the caller's token to equal the configured one.
pub fn check_token(cfg: &CacheConfig, supplied: Option<&str>) -> Result<()> {
    let Some(configured) = cfg.configured_token() else {
        return Err(Error::cache_token_not_configured());
    };
    let Some(supplied) = non_empty(supplied) else {
        return Err(Error::cache_token_not_specified());
    };
    if supplied != configured {
        return Err(Error::cache_token_mismatch());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub platform: String,
    pub project: String,
    pub build_type: String,
    pub name_version: String,
    pub hash: String,
}

impl CacheKey {
    pub fn rel_dir(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.platform, self.project, self.build_type, self.name_version
        )
    }

    pub fn archive_name(&self) -> String {
        format!("{}.tar.gz", self.hash)
    }

    pub fn meta_name(&self) -> String {
        format!("{}.meta", self.hash)
    }
}

pub trait CacheStore {
    fn describe(&self) -> String;

    /// Download the archive and meta of `key` into `archive_out`/`meta_out`. `Ok(false)` is a miss.
    fn fetch(&self, key: &CacheKey, archive_out: &Path, meta_out: &Path) -> Result<bool>;

    fn store(&self, key: &CacheKey, archive: &Path, meta: &str) -> Result<()>;
}

/// Open the configured store; `None` when no cache is configured.
pub fn open(cfg: &CacheConfig, base_dir: &Path) -> Result<Option<Box<dyn CacheStore>>> {
    if let Some(url) = non_empty(cfg.url.as_deref()) {
        return Ok(Some(Box::new(HttpCache::new(&url, cfg.configured_token())?)));
    }
    if let Some(dir) = non_empty(cfg.dir.as_deref()) {
        let p = PathBuf::from(dir);
        let root = if p.is_absolute() { p } else { base_dir.join(p) };
        return Ok(Some(Box::new(DirCache::new(root))));
    }
    Ok(None)
}

/// Restore a cached package tree into `package_dir`. Unverifiable entries count as a miss.
pub fn restore(
    store: &dyn CacheStore,
    key: &CacheKey,
    package_dir: &Path,
    scratch: &Path,
) -> Result<bool> {
    util::ensure_dir(scratch)?;
    let archive_tmp = scratch.join(key.archive_name());
    let meta_tmp = scratch.join(key.meta_name());
    let cleanup = || {
        let _ = fs::remove_file(&archive_tmp);
        let _ = fs::remove_file(&meta_tmp);
    };

    let found = match store.fetch(key, &archive_tmp, &meta_tmp) {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(cache = %store.describe(), port = %key.name_version, error = %e, "cache read failed, treating as miss");
            cleanup();
            return Ok(false);
        }
    };
    if !found {
        cleanup();
        return Ok(false);
    }
    let meta = match fs::read(&meta_tmp) {
        Ok(b) => b,
        Err(_) => {
            tracing::warn!(port = %key.name_version, hash = %key.hash, "cache archive without meta, ignoring");
            cleanup();
            return Ok(false);
        }
    };
    if util::sha256_hex(&meta) != key.hash {
        tracing::warn!(port = %key.name_version, hash = %key.hash, "cache meta does not match its key, ignoring");
        cleanup();
        return Ok(false);
    }

    if package_dir.exists() {
        fs::remove_dir_all(package_dir).map_err(|e| {
            Error::msg(format!("failed to clear {}: {e}", package_dir.display()))
        })?;
    }
    util::ensure_dir(package_dir)?;
    archive::extract(&archive_tmp, package_dir)?;
    let meta_text = String::from_utf8_lossy(&meta).into_owned();
    util::atomic_write_text(&package_dir.join(key.meta_name()), &meta_text)?;
    cleanup();
    Ok(true)
}

/// Archive `package_dir` and push it with its meta.
pub fn publish(
    store: &dyn CacheStore,
    key: &CacheKey,
    package_dir: &Path,
    meta: &str,
    scratch: &Path,
) -> Result<()> {
    util::ensure_dir(scratch)?;
    let archive_tmp = scratch.join(key.archive_name());
    archive::create(package_dir, &archive_tmp)?;
    let res = store.store(key, &archive_tmp, meta);
    let _ = fs::remove_file(&archive_tmp);
    res?;
    tracing::info!(cache = %store.describe(), port = %key.name_version, hash = %key.hash, "package stored in cache");
    Ok(())
}
