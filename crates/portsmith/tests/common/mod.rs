#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use portsmith::config::Settings;
use portsmith::context::Context;
use portsmith::executor::RecordingSink;
use portsmith::ports::NameVersion;
use tempfile::TempDir;

pub struct Ws {
    pub dir: TempDir,
    pub ctx: Context,
    pub sink: Arc<RecordingSink>,
}

pub fn nv(s: &str) -> NameVersion {
    NameVersion::parse(s).expect("name@version")
}

pub fn workspace(extra_settings: &str) -> Ws {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("portsmith.toml");
    fs::write(&path, format!("[global]\njobs = 2\n{extra_settings}")).expect("settings");
    let settings = Settings::load(&path).expect("load settings");
    let sink = Arc::new(RecordingSink::default());
    let ctx = Context::new(settings, sink.clone()).expect("context");
    Ws { dir, ctx, sink }
}

/// `<root>/<name>.tar.gz` holding `<name>-src/<name>.c`.
pub fn source_archive(root: &Path, name: &str) -> PathBuf {
    let payload = root.join("payload").join(name);
    let content = payload.join(format!("{name}-src"));
    fs::create_dir_all(&content).expect("payload");
    fs::write(content.join(format!("{name}.c")), format!("int {name};\n")).expect("source");
    let archive = root.join(format!("{name}.tar.gz"));
    let status = Command::new("tar")
        .arg("-czf")
        .arg(&archive)
        .arg("-C")
        .arg(&payload)
        .arg(format!("{name}-src"))
        .status()
        .expect("tar");
    assert!(status.success(), "tar failed");
    archive
}

fn toml_list(items: &[&str]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("\"{s}\"")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Custom-backend port whose install drops a header and a pkg-config file into the package.
pub fn write_script_port(
    ctx: &Context,
    port: &str,
    archive: &Path,
    name: &str,
    deps: &[&str],
    options: &[&str],
) {
    let url = format!("file://{}", archive.display());
    write_recipe(ctx, port, &script_recipe(&url, "local", name, deps, options));
}

/// The same script port, cloned from the `main` branch of a git repository.
pub fn write_git_port(ctx: &Context, port: &str, repo: &Path, name: &str) {
    let url = repo.display().to_string();
    write_recipe(ctx, port, &script_recipe(&url, "main", name, &[], &[]));
}

fn write_recipe(ctx: &Context, port: &str, recipe: &str) {
    let id = nv(port);
    let dir = ctx.ws.port_dir(&id.name, &id.version);
    fs::create_dir_all(&dir).expect("port dir");
    fs::write(dir.join("port.toml"), recipe).expect("port.toml");
}

fn script_recipe(url: &str, git_ref: &str, name: &str, deps: &[&str], options: &[&str]) -> String {
    format!(
        r#"[package]
url = "{url}"
ref = "{git_ref}"

[[build_configs]]
pattern = "*"
build_system = "custom"
dependencies = {deps}
options = {options}
custom_configure = ["test -f ${{SRC_DIR}}/{name}.c"]
custom_build = ["cp ${{SRC_DIR}}/{name}.c {name}.o"]
custom_install = [
  "mkdir -p ${{PACKAGE_DIR}}/include ${{PACKAGE_DIR}}/lib/pkgconfig",
  "cp {name}.o ${{PACKAGE_DIR}}/include/{name}.h",
  "echo prefix=${{PACKAGE_DIR}} > ${{PACKAGE_DIR}}/lib/pkgconfig/{name}.pc",
]
"#,
        deps = toml_list(deps),
        options = toml_list(options),
    )
}

pub fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=portsmith", "-c", "user.email=portsmith@localhost"])
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git");
    assert!(status.success(), "git {args:?} failed");
}

/// `<root>/<name>.git`: a work tree with `<name>.c` committed on `main`.
pub fn git_source(root: &Path, name: &str) -> PathBuf {
    let repo = root.join(format!("{name}.git"));
    fs::create_dir_all(&repo).expect("repo dir");
    fs::write(repo.join(format!("{name}.c")), format!("int {name};\n")).expect("source");
    git(&repo, &["init", "-q", "-b", "main"]);
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-q", "-m", "initial"]);
    repo
}

/// Every file under `root` with its length and mtime, for detecting writes.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, u64, std::time::SystemTime)> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.expect("walk");
        let meta = entry.metadata().expect("metadata");
        out.push((
            entry.path().to_path_buf(),
            meta.len(),
            meta.modified().expect("mtime"),
        ));
    }
    out
}
