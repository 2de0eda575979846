use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::error::Result;
use crate::install::{fixup, is_top_level_meta};
use crate::ports::Port;
use crate::util;

/// Remove and recreate `tmp/deps`. Only the root of an install call does this.
pub fn reset(ctx: &Context) -> Result<()> {
    let dir = ctx.ws.tmp_deps_dir();
    if dir.exists() {
        ctx.ws.remove_under_root(&dir)?;
    }
    util::ensure_dir(&dir)
}

/// Copy a port's package tree and its runtime closure into their staging dirs.
///
/// `staged` holds package dirs already copied during this install call.
pub fn stage_closure(ctx: &Context, port: &Port, staged: &mut HashSet<PathBuf>) -> Result<()> {
    if !staged.insert(port.paths.package_dir.clone()) {
        return Ok(());
    }
    stage(port)?;
    for dep in port.dependencies()? {
        let sub = Port::resolve(ctx, &dep, port.dev)?;
        if sub.supported_on_host() {
            stage_closure(ctx, &sub, staged)?;
        }
    }
    Ok(())
}

fn stage(port: &Port) -> Result<()> {
    let src: &Path = &port.paths.package_dir;
    if !src.is_dir() {
        return Ok(());
    }
    let dest = &port.paths.staging_dir;
    let copied = util::copy_tree(src, dest, |rel| {
        is_top_level_meta(rel) || dest.join(rel).symlink_metadata().is_ok()
    })?;
    fixup::relocate(dest, &copied, src, dest)?;
    tracing::debug!(port = %port.id, files = copied.len(), dest = %dest.display(), "staged");
    Ok(())
}
