use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

fn is_discovery_file(rel: &Path) -> bool {
    rel.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "pc" || e == "cmake")
}

fn rewrite(body: &str, is_pc: bool, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(body.len());
    for line in body.split_inclusive('\n') {
        if is_pc && line.starts_with("prefix=") {
            out.push_str(&format!("prefix={to}"));
            if line.ends_with('\n') {
                out.push('\n');
            }
            continue;
        }
        out.push_str(&line.replace(from, to));
    }
    out
}

/// Point pkg-config and CMake package files that moved from `from` to `to` at their new root.
///
/// `files` are paths relative to `root`. Returns how many files changed.
pub fn relocate(root: &Path, files: &[PathBuf], from: &Path, to: &Path) -> Result<usize> {
    let from = from.display().to_string();
    let to = to.display().to_string();
    let mut changed = 0;
    for rel in files.iter().filter(|r| is_discovery_file(r)) {
        let path = root.join(rel);
        if path.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
            continue;
        }
        let Ok(body) = fs::read_to_string(&path) else {
            continue;
        };
        let is_pc = rel.extension().is_some_and(|e| e == "pc");
        let next = rewrite(&body, is_pc, &from, &to);
        if next != body {
            fs::write(&path, next)
                .map_err(|e| Error::msg(format!("failed to rewrite {}: {e}", path.display())))?;
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pc_prefix_and_cmake_paths_follow_the_copy() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("installed");
        fs::create_dir_all(root.join("lib/pkgconfig")).expect("mkdir");
        fs::create_dir_all(root.join("lib/cmake/bar")).expect("mkdir");
        fs::write(
            root.join("lib/pkgconfig/bar.pc"),
            "prefix=/ws/packages/libbar@3.0@x\nlibdir=${prefix}/lib\nName: bar\n",
        )
        .expect("pc");
        fs::write(
            root.join("lib/cmake/bar/barTargets.cmake"),
            "set(_IMPORT_PREFIX \"/ws/packages/libbar@3.0@x\")\n",
        )
        .expect("cmake");
        fs::write(root.join("lib/libbar.a"), "/ws/packages/libbar@3.0@x").expect("lib");

        let files = vec![
            PathBuf::from("lib/pkgconfig/bar.pc"),
            PathBuf::from("lib/cmake/bar/barTargets.cmake"),
            PathBuf::from("lib/libbar.a"),
        ];
        let n = relocate(
            &root,
            &files,
            Path::new("/ws/packages/libbar@3.0@x"),
            Path::new("/ws/installed/x"),
        )
        .expect("relocate");
        assert_eq!(n, 2);
        let pc = fs::read_to_string(root.join("lib/pkgconfig/bar.pc")).expect("pc");
        assert!(pc.starts_with("prefix=/ws/installed/x\nlibdir=${prefix}/lib\n"));
        let cmake = fs::read_to_string(root.join("lib/cmake/bar/barTargets.cmake")).expect("cmake");
        assert!(cmake.contains("\"/ws/installed/x\""));
        assert_eq!(
            fs::read_to_string(root.join("lib/libbar.a")).expect("lib"),
            "/ws/packages/libbar@3.0@x"
        );
    }
}
