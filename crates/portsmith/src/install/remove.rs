use std::fs;
use std::path::Path;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::install::trace;
use crate::ports::{NameVersion, Port};
use crate::workspace;

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    // Remove dependencies first.
    pub recursive: bool,
    // Also delete the package tree.
    pub purge: bool,
    // Also delete the build dir and its step logs.
    pub build_cache: bool,
}

pub fn remove(ctx: &Context, nv: &NameVersion, dev: bool, opts: RemoveOptions) -> Result<()> {
    let mut active = Vec::new();
    remove_port(ctx, nv, dev, opts, &mut active)
}

fn remove_port(
    ctx: &Context,
    nv: &NameVersion,
    dev: bool,
    opts: RemoveOptions,
    active: &mut Vec<(NameVersion, bool)>,
) -> Result<()> {
    if active.iter().any(|(n, d)| n == nv && *d == dev) {
        return Ok(());
    }
    let port = Port::resolve(ctx, nv, dev).map_err(|e| e.context(format!("remove {nv}")))?;
    if opts.recursive {
        active.push((nv.clone(), dev));
        for dep in port.dev_dependencies()? {
            if !port.is_self_loop(&dep) {
                remove_port(ctx, &dep, true, opts, active)?;
            }
        }
        for dep in port.dependencies()? {
            remove_port(ctx, &dep, port.dev, opts, active)?;
        }
        active.pop();
    }

    let removed = uninstall(ctx, &port)?;
    if opts.purge {
        ctx.ws.remove_under_root(&port.paths.package_dir)?;
    }
    if opts.build_cache {
        remove_build_cache(ctx, &port)?;
    }
    tracing::info!(port = %nv, dev, files = removed, "removed");
    Ok(())
}

fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::msg(format!(
            "failed to remove {}: {e}",
            path.display()
        ))),
    }
}

// `libz.so` also owns `libz.so.1` and `libz.so.1.3.1` beside it.
fn remove_so_siblings(path: &Path) -> Result<usize> {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str())) else {
        return Ok(0);
    };
    let Some(idx) = name.find(".so") else {
        return Ok(0);
    };
    let stem = &name[..idx + 3];
    let Ok(rd) = fs::read_dir(dir) else {
        return Ok(0);
    };
    let mut n = 0;
    for ent in rd.flatten() {
        let sibling = ent.file_name();
        let Some(sibling) = sibling.to_str() else {
            continue;
        };
        if sibling != name && sibling.starts_with(&format!("{stem}.")) && remove_file(&ent.path())? {
            n += 1;
        }
    }
    Ok(n)
}

/// Delete everything the trace lists, then the trace and the fingerprint record.
pub fn uninstall(ctx: &Context, port: &Port) -> Result<usize> {
    let installed_root = &ctx.ws.installed_dir;
    let mut removed = 0;
    if port.paths.trace_file.is_file() {
        for entry in trace::read(&port.paths.trace_file)? {
            let path = installed_root.join(&entry);
            if !path.starts_with(installed_root) {
                continue;
            }
            if remove_file(&path)? {
                removed += 1;
            }
            removed += remove_so_siblings(&path)?;
            if let Some(parent) = path.parent() {
                workspace::prune_empty_dirs(parent, installed_root);
            }
        }
    }
    remove_file(&port.paths.trace_file)?;
    remove_file(&port.paths.meta_file)?;
    Ok(removed)
}

pub(crate) fn remove_build_cache(ctx: &Context, port: &Port) -> Result<()> {
    let build_dir = &port.paths.build_dir;
    ctx.ws.remove_under_root(build_dir)?;
    let (Some(parent), Some(name)) = (
        build_dir.parent(),
        build_dir.file_name().and_then(|n| n.to_str()),
    ) else {
        return Ok(());
    };
    let Ok(rd) = fs::read_dir(parent) else {
        return Ok(());
    };
    let prefix = format!("{name}-");
    for ent in rd.flatten() {
        let file = ent.file_name();
        let file = file.to_string_lossy();
        if file.starts_with(&prefix) && file.ends_with(".log") {
            remove_file(&ent.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::testing;

    fn installed_port(tw: &testing::TestWorkspace, nv: &str) -> Port {
        testing::write_port(&tw.ctx, nv, &testing::freestyle_recipe(&[], &[]));
        Port::resolve(&tw.ctx, &NameVersion::parse(nv).expect("nv"), false).expect("port")
    }

    #[test]
    fn trace_driven_removal_takes_so_versions_and_prunes_dirs() {
        let tw = testing::workspace("");
        let port = installed_port(&tw, "zlib@1.3");
        let lib = port.paths.installed_dir.join("lib");
        let inc = port.paths.installed_dir.join("include/zlib");
        fs::create_dir_all(&lib).expect("lib");
        fs::create_dir_all(&inc).expect("inc");
        for f in ["libz.so", "libz.so.1", "libz.so.1.3", "libzstd.so"] {
            fs::write(lib.join(f), f).expect("lib file");
        }
        fs::write(inc.join("zlib.h"), "h").expect("header");
        trace::write(
            &port.paths.trace_file,
            &port.paths.library_folder,
            &[PathBuf::from("lib/libz.so"), PathBuf::from("include/zlib/zlib.h")],
        )
        .expect("trace");
        crate::util::ensure_dir(port.paths.meta_file.parent().expect("parent")).expect("meta dir");
        fs::write(&port.paths.meta_file, "meta").expect("record");

        let removed = uninstall(&tw.ctx, &port).expect("uninstall");
        assert_eq!(removed, 4);
        assert!(lib.join("libzstd.so").is_file());
        assert!(!lib.join("libz.so.1.3").exists());
        assert!(!port.paths.installed_dir.join("include").exists());
        assert!(!port.paths.trace_file.exists());
        assert!(!port.paths.meta_file.exists());
    }

    #[test]
    fn build_cache_takes_build_dir_and_step_logs() {
        let tw = testing::workspace("");
        let port = installed_port(&tw, "zlib@1.3");
        fs::create_dir_all(&port.paths.build_dir).expect("build dir");
        let log = port.paths.step_log("configure");
        fs::write(&log, "log").expect("log");
        fs::create_dir_all(&port.paths.package_dir).expect("package dir");

        let opts = RemoveOptions {
            purge: true,
            build_cache: true,
            ..RemoveOptions::default()
        };
        remove(&tw.ctx, &port.id, false, opts).expect("remove");
        assert!(!port.paths.build_dir.exists());
        assert!(!log.exists());
        assert!(!port.paths.package_dir.exists());
    }
}
