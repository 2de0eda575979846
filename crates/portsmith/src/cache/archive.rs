use std::path::Path;

use crate::error::{Error, Result};
use crate::executor;
use crate::util;

/// `tar -czf` the contents of `src_dir`.
pub fn create(src_dir: &Path, archive: &Path) -> Result<()> {
    if !src_dir.is_dir() {
        return Err(Error::msg(format!(
            "cannot archive missing dir {}",
            src_dir.display()
        )));
    }
    if let Some(parent) = archive.parent() {
        util::ensure_dir(parent)?;
    }
    let archive_arg = archive.display().to_string();
    let src_arg = src_dir.display().to_string();
    executor::capture(
        "tar",
        &[
            "-czf",
            &archive_arg,
            "-C",
            &src_arg,
            ".",
        ],
        None,
    )
    .map(|_| ())
}

pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    util::ensure_dir(dest)?;
    let archive_arg = archive.display().to_string();
    let dest_arg = dest.display().to_string();
    executor::capture("tar", &["-xzf", &archive_arg, "-C", &dest_arg], None).map(|_| ())
}
