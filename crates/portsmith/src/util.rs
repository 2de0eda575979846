use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", p.display())))
}

pub fn write_text(p: &Path, s: &str) -> Result<()> {
    if let Some(parent) = p.parent() {
        ensure_dir(parent)?;
    }
    fs::write(p, s).map_err(|e| Error::msg(format!("failed to write {}: {e}", p.display())))
}

pub fn read_text(p: &Path) -> Result<String> {
    fs::read_to_string(p).map_err(|e| Error::msg(format!("failed to read {}: {e}", p.display())))
}

pub fn atomic_write_text(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let file_name = path.file_name().and_then(|s| s.to_str()).ok_or_else(|| {
        Error::msg(format!(
            "invalid file path for atomic write: {}",
            path.display()
        ))
    })?;
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        file_name,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    fs::write(&tmp, body)
        .map_err(|e| Error::msg(format!("failed to write temp file {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path).map_err(|e| {
        Error::msg(format!(
            "failed to rename {} -> {}: {e}",
            tmp.display(),
            path.display()
        ))
    })
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| Error::msg(format!("failed to open {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src)
        .map_err(|e| Error::msg(format!("failed to read link {}: {e}", src.display())))?;
    if dst.symlink_metadata().is_ok() {
        fs::remove_file(dst)
            .map_err(|e| Error::msg(format!("failed to replace {}: {e}", dst.display())))?;
    }
    std::os::unix::fs::symlink(&target, dst)
        .map_err(|e| Error::msg(format!("failed to link {}: {e}", dst.display())))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| Error::msg(format!("failed to copy {}: {e}", src.display())))
}

/// Copy every entry under `src` into `dst`, returning the relative paths of copied files.
///
/// `skip` is consulted with each relative path; returning true leaves the entry out.
pub fn copy_tree(src: &Path, dst: &Path, skip: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::msg(format!("walk {}: {e}", src.display())))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::msg(format!("strip prefix: {e}")))?
            .to_path_buf();
        if skip(&rel) {
            continue;
        }
        let out = dst.join(&rel);
        let ft = entry.file_type();
        if ft.is_dir() {
            ensure_dir(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            ensure_dir(parent)?;
        }
        if ft.is_symlink() {
            copy_symlink(entry.path(), &out)?;
        } else {
            fs::copy(entry.path(), &out).map_err(|e| {
                Error::msg(format!(
                    "failed to copy {} -> {}: {e}",
                    entry.path().display(),
                    out.display()
                ))
            })?;
            // Copies keep the source mtime.
            if let Ok(meta) = entry.metadata() {
                let mtime = filetime::FileTime::from_last_modification_time(&meta);
                let _ = filetime::set_file_mtime(&out, mtime);
            }
        }
        copied.push(rel);
    }
    Ok(copied)
}

// If `dir` holds exactly one directory and nothing else, hoist its contents up one level.
pub fn flatten_single_child(dir: &Path) -> Result<()> {
    let entries: Vec<_> = fs::read_dir(dir)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", dir.display())))?
        .filter_map(|e| e.ok())
        .collect();
    if entries.is_empty() {
        return Err(Error::msg(format!(
            "no extracted files found under {}",
            dir.display()
        )));
    }
    if entries.len() != 1 || !entries[0].path().is_dir() {
        return Ok(());
    }
    let only = entries[0].path();
    let staging = dir.with_file_name(format!(
        ".{}.flatten",
        dir.file_name().and_then(|s| s.to_str()).unwrap_or("dir")
    ));
    fs::rename(&only, &staging)
        .map_err(|e| Error::msg(format!("failed to move {}: {e}", only.display())))?;
    fs::remove_dir(dir)
        .map_err(|e| Error::msg(format!("failed to remove {}: {e}", dir.display())))?;
    fs::rename(&staging, dir)
        .map_err(|e| Error::msg(format!("failed to move {}: {e}", staging.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_file_matches_bytes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let p = tmp.path().join("a.bin");
        fs::write(&p, b"portsmith").expect("write");
        assert_eq!(sha256_file(&p).expect("hash"), sha256_hex(b"portsmith"));
    }

    #[test]
    fn copy_tree_skips_and_reports_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("lib")).expect("mkdir");
        fs::write(src.join("lib/libz.a"), "z").expect("lib");
        fs::write(src.join("abc.meta"), "m").expect("meta");
        let old = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(src.join("lib/libz.a"), old).expect("mtime");
        let dst = tmp.path().join("dst");
        let copied = copy_tree(&src, &dst, |rel| {
            rel.extension().is_some_and(|e| e == "meta")
        })
        .expect("copy");
        assert_eq!(copied, vec![PathBuf::from("lib/libz.a")]);
        assert!(!dst.join("abc.meta").exists());
        let meta = fs::metadata(dst.join("lib/libz.a")).expect("copied");
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn flatten_hoists_single_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let repo = tmp.path().join("src");
        fs::create_dir_all(repo.join("zlib-1.3")).expect("mkdir");
        fs::write(repo.join("zlib-1.3/CMakeLists.txt"), "x").expect("write");
        flatten_single_child(&repo).expect("flatten");
        assert!(repo.join("CMakeLists.txt").is_file());
    }
}
