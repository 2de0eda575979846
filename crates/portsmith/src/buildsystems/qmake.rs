use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind, jobs_arg};
use crate::error::Result;
use crate::util;

/// Qt-style `configure` followed by make.
#[derive(Debug, Clone, Copy, Default)]
pub struct QMake;

impl BuildSystem for QMake {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::QMake
    }

    fn required_tools(&self) -> Vec<&'static str> {
        vec!["make"]
    }

    fn configured(&self, bc: &BuildContext) -> bool {
        bc.build_dir().join("Makefile").is_file()
    }

    fn configure_options(&self, bc: &BuildContext) -> Result<Vec<String>> {
        let mut opts: Vec<String> = bc
            .options
            .iter()
            .filter(|o| bc.cross() || !o.starts_with("-sysroot="))
            .cloned()
            .collect();
        let lib = if bc.port.config.wants_shared() {
            "-shared"
        } else {
            "-static"
        };
        if !opts.iter().any(|o| o == "-shared" || o == "-static") {
            opts.push(lib.into());
        }
        opts.push(format!("--prefix={}", bc.package_dir().display()));
        Ok(opts)
    }

    fn configure(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        util::ensure_dir(bc.build_dir())?;
        let script = bc.src_dir().join("configure");
        let step = bc
            .step("configure", script.display().to_string())
            .args(options.iter().cloned())
            .cwd(bc.build_dir());
        bc.run(step)
    }

    fn build(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        let step = bc
            .step("build", "make")
            .arg(jobs_arg(bc))
            .args(options.iter().cloned())
            .cwd(bc.build_dir());
        bc.run(step)
    }

    fn install(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        let step = bc
            .step("install", "make")
            .arg("install")
            .args(options.iter().cloned())
            .cwd(bc.build_dir());
        bc.run(step)
    }
}
