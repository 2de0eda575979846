use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{CacheKey, CacheStore};
use crate::error::{Error, Result};
use crate::util;

/// Cache rooted at a local (or mounted) directory. No authorization of its own.
#[derive(Debug, Clone)]
pub struct DirCache {
    root: PathBuf,
}

impl DirCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.rel_dir())
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map(|_| ()).map_err(|e| {
        Error::msg(format!(
            "failed to copy {} -> {}: {e}",
            from.display(),
            to.display()
        ))
    })
}

impl CacheStore for DirCache {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn fetch(&self, key: &CacheKey, archive_out: &Path, meta_out: &Path) -> Result<bool> {
        let dir = self.entry_dir(key);
        let archive = dir.join(key.archive_name());
        if !archive.is_file() {
            return Ok(false);
        }
        copy_file(&archive, archive_out)?;
        let meta = dir.join(key.meta_name());
        if meta.is_file() {
            copy_file(&meta, meta_out)?;
        }
        Ok(true)
    }

    fn store(&self, key: &CacheKey, archive: &Path, meta: &str) -> Result<()> {
        let dir = self.entry_dir(key);
        util::ensure_dir(&dir)?;
        // Meta first: an archive without its meta is never trusted.
        util::atomic_write_text(&dir.join(key.meta_name()), meta)?;
        let dest = dir.join(key.archive_name());
        let tmp = dir.join(format!(".{}.tmp", key.archive_name()));
        copy_file(archive, &tmp)?;
        fs::rename(&tmp, &dest)
            .map_err(|e| Error::msg(format!("failed to move {}: {e}", dest.display())))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cache;

    #[test]
    fn publish_then_restore_verifies_meta() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let pkg = tmp.path().join("pkg");
        fs::create_dir_all(pkg.join("include")).expect("mkdir");
        fs::write(pkg.join("include/bar.h"), "int bar;").expect("header");
        let meta = "# -------- libbar@3.0 --------\n";
        let key = CacheKey {
            platform: "x86_64-linux".into(),
            project: "default".into(),
            build_type: "release".into(),
            name_version: "libbar@3.0".into(),
            hash: util::sha256_hex(meta.as_bytes()),
        };
        let store = DirCache::new(tmp.path().join("cache"));
        cache::publish(&store, &key, &pkg, meta, &tmp.path().join("scratch")).expect("publish");
        assert!(store.entry_dir(&key).join(key.meta_name()).is_file());

        let restored = tmp.path().join("restored");
        let hit = cache::restore(&store, &key, &restored, &tmp.path().join("scratch"))
            .expect("restore");
        assert!(hit);
        assert!(restored.join("include/bar.h").is_file());
        assert_eq!(
            fs::read_to_string(restored.join(key.meta_name())).expect("meta"),
            meta
        );
    }

    #[test]
    fn tampered_meta_is_a_miss() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let pkg = tmp.path().join("pkg");
        fs::create_dir_all(&pkg).expect("mkdir");
        fs::write(pkg.join("f"), "x").expect("file");
        let meta = "meta";
        let key = CacheKey {
            platform: "p".into(),
            project: "default".into(),
            build_type: "release".into(),
            name_version: "a@1".into(),
            hash: util::sha256_hex(meta.as_bytes()),
        };
        let store = DirCache::new(tmp.path().join("cache"));
        cache::publish(&store, &key, &pkg, meta, &tmp.path().join("scratch")).expect("publish");
        fs::write(store.entry_dir(&key).join(key.meta_name()), "other").expect("tamper");

        let restored = tmp.path().join("restored");
        let hit = cache::restore(&store, &key, &restored, &tmp.path().join("scratch"))
            .expect("restore");
        assert!(!hit);
        assert!(!restored.exists());

        fs::remove_file(store.entry_dir(&key).join(key.meta_name())).expect("remove meta");
        let hit = cache::restore(&store, &key, &restored, &tmp.path().join("scratch"))
            .expect("restore");
        assert!(!hit);
    }
}
