use std::fs;
use std::path::{Path, PathBuf};

use crate::buildsystems::BuildContext;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::executor::{self, Step};
use crate::ports::{Port, RECIPE_FILE};
use crate::util;

// Records which patches were applied to the current checkout.
const PATCHED_LIST: &str = "patched.list";

pub fn is_git_url(url: &str) -> bool {
    let url = url.trim();
    url.ends_with(".git") || url.starts_with("git@")
}

fn archive_file_name(port: &Port) -> Result<String> {
    let explicit = port.recipe.package.archive.trim();
    if !explicit.is_empty() {
        return Ok(explicit.to_string());
    }
    port.url()
        .rsplit('/')
        .next()
        .map(|s| s.split('?').next().unwrap_or(s).to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::msg(format!("cannot derive archive name from url of {}", port.id)))
}

/// Local path of the source archive, downloading http(s) archives into `downloads/` first.
pub fn archive_path(ctx: &Context, port: &Port) -> Result<PathBuf> {
    let url = port.url();
    if let Some(local) = url.strip_prefix("file://") {
        let path = PathBuf::from(local);
        if !path.is_file() {
            return Err(Error::msg(format!(
                "source archive {} of {} does not exist",
                path.display(),
                port.id
            )));
        }
        return Ok(path);
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        let dest = ctx.ws.downloads_dir.join(archive_file_name(port)?);
        if !dest.is_file() {
            download(url, &dest)?;
        }
        return Ok(dest);
    }
    let path = PathBuf::from(url);
    if path.is_file() {
        return Ok(path);
    }
    Err(Error::msg(format!(
        "unsupported source url '{url}' for {}",
        port.id
    )))
}

pub fn download(url: &str, dest: &Path) -> Result<()> {
    tracing::info!(url, dest = %dest.display(), "downloading");
    let client = reqwest::blocking::Client::builder()
        .build()
        .map_err(|e| Error::msg(format!("http client: {e}")))?;
    let resp = client
        .get(url)
        .send()
        .map_err(|e| Error::msg(format!("download {url} failed: {e}")))?;
    if !resp.status().is_success() {
        return Err(Error::msg(format!(
            "download {url} failed: HTTP {}",
            resp.status()
        )));
    }
    let bytes = resp
        .bytes()
        .map_err(|e| Error::msg(format!("download {url} failed: {e}")))?;
    if let Some(parent) = dest.parent() {
        util::ensure_dir(parent)?;
    }
    let tmp = dest.with_extension("part");
    fs::write(&tmp, &bytes)
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, dest)
        .map_err(|e| Error::msg(format!("failed to move {}: {e}", dest.display())))
}

/// Clone or extract the port's sources into `dest`.
pub fn fetch(bc: &BuildContext, dest: &Path) -> Result<()> {
    let port = bc.port;
    let url = port.url();
    let marker = patched_list(port);
    if marker.exists() {
        fs::remove_file(&marker)
            .map_err(|e| Error::msg(format!("failed to reset {}: {e}", marker.display())))?;
    }
    if is_git_url(url) {
        if let Some(parent) = dest.parent() {
            util::ensure_dir(parent)?;
        }
        let pkg = &port.recipe.package;
        let mut step = bc
            .step("clone", "git")
            .args(["clone", "--branch", pkg.git_ref.trim()]);
        if pkg.depth > 0 {
            step = step.arg("--depth").arg(pkg.depth.to_string());
        }
        if !pkg.ignore_submodule {
            step = step.arg("--recursive");
        }
        return bc.run(step.arg(url).arg(dest.display().to_string()));
    }

    let archive = archive_path(bc.ctx, port)?;
    extract(bc, &archive, dest)
}

fn extract(bc: &BuildContext, archive: &Path, dest: &Path) -> Result<()> {
    util::ensure_dir(dest)?;
    bc.run(
        bc.step("extract", "tar")
            .arg("-xf")
            .arg(archive.display().to_string())
            .arg("-C")
            .arg(dest.display().to_string()),
    )?;
    if bc.ctx.exec.dry_run {
        return Ok(());
    }
    util::flatten_single_child(dest)
}

/// Commit for git sources, `file:<sha256>` for archives, empty for virtual ports.
///
/// Sources are fetched first when they are not on disk yet.
pub fn content_identity(ctx: &Context, port: &Port) -> Result<String> {
    let url = port.url();
    if port.is_virtual() {
        return Ok(String::new());
    }
    if is_git_url(url) {
        if !port.paths.repo_dir.join(".git").exists() {
            let backend = crate::buildsystems::select(port)?;
            let bc = BuildContext::new(ctx, port, backend.as_ref())?;
            fetch(&bc, &port.paths.repo_dir)?;
        }
        return executor::capture("git", &["rev-parse", "HEAD"], Some(&port.paths.repo_dir));
    }
    let archive = archive_path(ctx, port)?;
    Ok(format!("file:{}", util::sha256_file(&archive)?))
}

fn patched_list(port: &Port) -> PathBuf {
    port.paths
        .repo_dir
        .parent()
        .unwrap_or(Path::new("."))
        .join(PATCHED_LIST)
}

/// Return the checkout to pristine sources and forget applied patches.
///
/// Git checkouts are reset and cleaned in place; extracted archives are deleted so the next
/// fetch unpacks them again.
pub fn reset_checkout(ctx: &Context, port: &Port) -> Result<()> {
    let marker = patched_list(port);
    if marker.exists() {
        fs::remove_file(&marker)
            .map_err(|e| Error::msg(format!("failed to reset {}: {e}", marker.display())))?;
    }
    let repo = &port.paths.repo_dir;
    if !repo.exists() {
        return Ok(());
    }
    if repo.join(".git").exists() {
        executor::capture("git", &["reset", "--hard"], Some(repo))?;
        executor::capture("git", &["clean", "-xfd"], Some(repo))?;
        return Ok(());
    }
    ctx.ws.remove_under_root(repo)
}

/// Uncommitted changes or untracked files in a git checkout.
pub fn is_modified(repo: &Path) -> Result<bool> {
    let status = executor::capture("git", &["status", "--porcelain"], Some(repo))?;
    Ok(!status.is_empty())
}

/// A checkout is up to date when HEAD equals its upstream. Checkouts without an upstream
/// (tags, detached heads) count as up to date.
pub fn is_up_to_date(repo: &Path) -> Result<bool> {
    let Ok(upstream) = executor::capture("git", &["rev-parse", "@{upstream}"], Some(repo)) else {
        return Ok(true);
    };
    let head = executor::capture("git", &["rev-parse", "HEAD"], Some(repo))?;
    Ok(head == upstream)
}

fn already_patched(port: &Port) -> Vec<String> {
    fs::read_to_string(patched_list(port))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Apply recipe patches once per checkout, then copy extra port files into the sources.
pub fn apply_patches(bc: &BuildContext) -> Result<()> {
    let port = bc.port;
    let mut applied = already_patched(port);
    for name in port.config.patches.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        if applied.iter().any(|a| a == name) {
            continue;
        }
        let patch = port.patch_path(name)?;
        let patch_arg = patch.display().to_string();
        let git = bc
            .step("patch", "git")
            .args(["apply", "--whitespace=nowarn", patch_arg.as_str()])
            .cwd(&port.paths.src_dir);
        if let Err(git_err) = bc.run(git) {
            tracing::debug!(port = %port.id, patch = name, error = %git_err, "git apply failed, trying patch -p1");
            let fallback = bc
                .step("patch", "patch")
                .args(["-p1", "-i", patch_arg.as_str()])
                .cwd(&port.paths.src_dir);
            bc.run(fallback)
                .map_err(|e| Error::msg(format!("patch {name}: {e}")))?;
        }
        applied.push(name.to_string());
        util::write_text(&patched_list(port), &(applied.join("\n") + "\n"))?;
    }
    copy_extra_files(port)
}

// Extra files shipped next to the recipe (CMakeLists.txt for sources without one, etc.).
fn copy_extra_files(port: &Port) -> Result<()> {
    if !port.paths.src_dir.is_dir() {
        return Ok(());
    }
    for dir in [&port.port_dir, &port.project_port_dir] {
        if !dir.is_dir() {
            continue;
        }
        let entries = fs::read_dir(dir)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", dir.display())))?;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_patch = path.extension().is_some_and(|e| e == "patch");
            if !path.is_file() || is_patch || name == RECIPE_FILE || name == "README.md" {
                continue;
            }
            let dest = port.paths.src_dir.join(&name);
            if dest.exists() {
                continue;
            }
            fs::copy(&path, &dest).map_err(|e| {
                Error::msg(format!(
                    "failed to copy {} -> {}: {e}",
                    path.display(),
                    dest.display()
                ))
            })?;
        }
    }
    Ok(())
}
