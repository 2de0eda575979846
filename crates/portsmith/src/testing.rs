// Fixtures shared by unit tests: a throwaway workspace and shell-script ports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::{ConfigDoc, Settings};
use crate::context::Context;
use crate::executor::{self, RecordingSink};
use crate::ports::NameVersion;

pub struct TestWorkspace {
    pub dir: TempDir,
    pub ctx: Context,
    pub sink: Arc<RecordingSink>,
}

impl TestWorkspace {
    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

pub fn workspace(extra_settings: &str) -> TestWorkspace {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("portsmith.toml");
    let raw = if extra_settings.contains("[global]") {
        extra_settings.to_string()
    } else {
        format!("[global]\njobs = 2\n{extra_settings}")
    };
    std::fs::write(&path, &raw).expect("settings");
    let doc = ConfigDoc::parse(&path, &raw).expect("parse settings");
    let settings = Settings::from_doc(&doc).expect("settings");
    let sink = Arc::new(RecordingSink::default());
    let ctx = Context::new(settings, sink.clone()).expect("context");
    TestWorkspace { dir, ctx, sink }
}

pub fn write_port(ctx: &Context, nv: &str, recipe: &str) -> PathBuf {
    let nv = NameVersion::parse(nv).expect("nv");
    let dir = ctx.ws.port_dir(&nv.name, &nv.version);
    std::fs::create_dir_all(&dir).expect("port dir");
    std::fs::write(dir.join("port.toml"), recipe).expect("port.toml");
    dir
}

fn toml_list(items: &[&str]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("\"{s}\"")).collect();
    format!("[{}]", quoted.join(", "))
}

/// A virtual freestyle port that only records its dependencies.
pub fn freestyle_recipe(deps: &[&str], dev_deps: &[&str]) -> String {
    format!(
        "[package]\nurl = \"_\"\n\n[[build_configs]]\npattern = \"*\"\nbuild_system = \"freestyle\"\ndependencies = {}\ndev_dependencies = {}\n",
        toml_list(deps),
        toml_list(dev_deps)
    )
}

/// Context for an existing workspace whose `portsmith.toml` is already written.
pub fn context_at(root: &Path) -> (Context, Arc<RecordingSink>) {
    let settings = Settings::load(&root.join("portsmith.toml")).expect("settings");
    let sink = Arc::new(RecordingSink::default());
    let ctx = Context::new(settings, sink.clone()).expect("context");
    (ctx, sink)
}

/// A gzip tarball holding `<name>-src/<name>.c`, usable as a `file://` source.
pub fn source_archive(root: &Path, name: &str) -> PathBuf {
    let payload = root.join("payload").join(name);
    let content = payload.join(format!("{name}-src"));
    std::fs::create_dir_all(&content).expect("payload");
    std::fs::write(content.join(format!("{name}.c")), format!("int {name};\n")).expect("source");
    let archive = root.join(format!("{name}.tar.gz"));
    executor::capture(
        "tar",
        &[
            "-czf",
            &archive.display().to_string(),
            "-C",
            &payload.display().to_string(),
            &format!("{name}-src"),
        ],
        None,
    )
    .expect("tar");
    archive
}

/// A custom-backend port built from `archive`; install writes a header and a pkg-config file.
pub fn script_recipe(archive: &Path, name: &str, deps: &[&str]) -> String {
    format!(
        r#"[package]
url = "file://{archive}"
ref = "local"

[[build_configs]]
pattern = "*"
build_system = "custom"
dependencies = {deps}
custom_configure = ["test -f ${{SRC_DIR}}/{name}.c"]
custom_build = ["cp ${{SRC_DIR}}/{name}.c {name}.o"]
custom_install = [
  "mkdir -p ${{PACKAGE_DIR}}/include ${{PACKAGE_DIR}}/lib/pkgconfig",
  "echo '#define {upper} 1' > ${{PACKAGE_DIR}}/include/{name}.h",
  "echo prefix=${{PACKAGE_DIR}} > ${{PACKAGE_DIR}}/lib/pkgconfig/{name}.pc",
  "echo Name: {name} >> ${{PACKAGE_DIR}}/lib/pkgconfig/{name}.pc",
]
"#,
        archive = archive.display(),
        deps = toml_list(deps),
        upper = name.to_ascii_uppercase(),
    )
}

/// A stand-in `cmake` in `bin`: configure appends its arguments to `log` and writes the
/// Makefile-generator markers, build and install do nothing.
#[cfg(unix)]
pub fn fake_cmake(bin: &Path, log: &Path) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(bin).expect("bin");
    let script = format!(
        r#"#!/bin/sh
case "$1" in
  --build|--install|--version) exit 0 ;;
esac
args="$*"
build=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-B" ]; then build="$2"; fi
  shift
done
[ -n "$build" ] || exit 0
echo "configure $args" >> "{log}"
mkdir -p "$build"
touch "$build/CMakeCache.txt" "$build/Makefile"
"#,
        log = log.display()
    );
    let path = bin.join("cmake");
    std::fs::write(&path, script).expect("script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
}
