use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::util;

/// One installed path per line, relative to the installed root (`<library-folder>/<file>`).
pub fn write(path: &Path, library_folder: &str, files: &[PathBuf]) -> Result<()> {
    let mut body = String::new();
    for rel in files {
        body.push_str(&format!("{library_folder}/{}\n", rel.display()));
    }
    util::atomic_write_text(path, &body)
}

pub fn read(path: &Path) -> Result<Vec<String>> {
    Ok(util::read_text(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_prefixed_with_library_folder() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let trace = tmp.path().join("zlib@1.3@lf.trace");
        write(
            &trace,
            "x86_64-linux@default@release",
            &[PathBuf::from("include/zlib.h"), PathBuf::from("lib/libz.a")],
        )
        .expect("write");
        assert_eq!(
            read(&trace).expect("read"),
            vec![
                "x86_64-linux@default@release/include/zlib.h".to_string(),
                "x86_64-linux@default@release/lib/libz.a".to_string(),
            ]
        );
    }
}
