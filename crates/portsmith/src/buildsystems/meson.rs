use std::path::PathBuf;

use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind, recreate_dir};
use crate::error::Result;
use crate::util;

#[derive(Debug, Clone, Copy, Default)]
pub struct Meson;

pub fn meson_build_type(build_type: &str) -> &'static str {
    match build_type.to_ascii_lowercase().as_str() {
        "debug" => "debug",
        "relwithdebinfo" => "debugoptimized",
        "minsizerel" => "minsize",
        _ => "release",
    }
}

fn cross_file_path(bc: &BuildContext) -> PathBuf {
    bc.ctx.ws.tmp_files_dir().join("meson_cross_file.ini")
}

/// Meson machine file describing the target toolchain.
fn write_cross_file(bc: &BuildContext) -> Result<PathBuf> {
    let platform = &bc.ctx.platform;
    let tc = &platform.toolchain;
    let tools = tc.tool_envs();
    let tool = |key: &str| {
        tools
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    let mut body = String::from("[binaries]\n");
    body.push_str(&format!("c = '{}'\n", tool("CC")));
    body.push_str(&format!("cpp = '{}'\n", tool("CXX")));
    body.push_str(&format!("ar = '{}'\n", tool("AR")));
    body.push_str(&format!("strip = '{}'\n", tool("STRIP")));
    body.push_str("pkg-config = 'pkg-config'\n\n");
    body.push_str("[host_machine]\n");
    body.push_str(&format!(
        "system = '{}'\n",
        tc.system_name.to_ascii_lowercase()
    ));
    body.push_str(&format!("cpu_family = '{}'\n", tc.system_processor));
    body.push_str(&format!("cpu = '{}'\n", tc.system_processor));
    body.push_str("endian = 'little'\n");
    if let Some(sysroot) = platform.rootfs_dir() {
        body.push_str(&format!(
            "\n[properties]\nsys_root = '{}'\n",
            sysroot.display()
        ));
    }
    let path = cross_file_path(bc);
    util::atomic_write_text(&path, &body)?;
    Ok(path)
}

impl BuildSystem for Meson {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Meson
    }

    fn required_tools(&self) -> Vec<&'static str> {
        vec!["meson", "ninja"]
    }

    fn configured(&self, bc: &BuildContext) -> bool {
        bc.build_dir().join("build.ninja").is_file()
    }

    fn configure_options(&self, bc: &BuildContext) -> Result<Vec<String>> {
        let cfg = &bc.port.config;
        let mut opts = bc.options.clone();
        if !bc.has_option("--buildtype") {
            opts.push(format!("--buildtype={}", meson_build_type(&cfg.build_type)));
        }
        opts.push("-Dlibdir=lib".into());
        if !bc.has_option("--default-library") {
            let lib = if cfg.wants_shared() { "shared" } else { "static" };
            opts.push(format!("--default-library={lib}"));
        }
        opts.push(format!("--prefix={}", bc.package_dir().display()));
        if bc.cross() {
            opts.push(format!("--cross-file={}", cross_file_path(bc).display()));
        }
        Ok(opts)
    }

    fn configure(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        if bc.cross() {
            write_cross_file(bc)?;
        }
        recreate_dir(bc.ctx, bc.build_dir())?;
        let step = bc
            .step("configure", "meson")
            .arg("setup")
            .arg(bc.build_dir().display().to_string())
            .arg(bc.src_dir().display().to_string())
            .args(options.iter().cloned())
            .cwd(bc.src_dir());
        bc.run(step)
    }

    fn build(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        let step = bc
            .step("build", "meson")
            .args(["compile", "-C"])
            .arg(bc.build_dir().display().to_string())
            .arg("-j")
            .arg(bc.jobs().to_string())
            .args(options.iter().cloned());
        bc.run(step)
    }

    fn install(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        let step = bc
            .step("install", "meson")
            .args(["install", "-C"])
            .arg(bc.build_dir().display().to_string())
            .args(options.iter().cloned());
        bc.run(step)
    }
}
