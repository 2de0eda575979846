use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind, env, jobs_arg};
use crate::context::Context;
use crate::error::Result;
use crate::executor::EnvMap;
use crate::ports::Port;
use crate::util;

// Options that only make sense when cross compiling.
const CROSS_ONLY: [&str; 8] = [
    "--host=",
    "--sysroot=",
    "--arch=",
    "--cross-prefix=",
    "--target-os",
    "--build=",
    "--with-build-python=",
    "--enable-cross-compile",
];

/// Autotools-style `configure && make && make install`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Makefiles;

fn has_configure_script(bc: &BuildContext) -> bool {
    bc.src_dir().join("configure").is_file()
}

impl Makefiles {
    fn autogen(&self, bc: &BuildContext) -> Result<()> {
        if has_configure_script(bc) || !bc.src_dir().join("autogen.sh").is_file() {
            return Ok(());
        }
        let mut step = bc
            .step("autogen", "./autogen.sh")
            .args(bc.port.config.autogen_options.iter().cloned())
            .cwd(bc.src_dir());
        step.env.insert("NOCONFIGURE".into(), "1".into());
        bc.run(step)
    }
}

impl BuildSystem for Makefiles {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Makefiles
    }

    fn required_tools(&self) -> Vec<&'static str> {
        vec!["make"]
    }

    fn tune_env(&self, _ctx: &Context, _port: &Port, env: &mut EnvMap) {
        if crate::platform::host_os() == "linux" {
            env::append_flags(env, "LDFLAGS", "-Wl,-rpath,'$$ORIGIN/../lib'");
        }
    }

    fn configured(&self, bc: &BuildContext) -> bool {
        bc.work_dir().join("Makefile").is_file()
    }

    fn configure_options(&self, bc: &BuildContext) -> Result<Vec<String>> {
        let cfg = &bc.port.config;
        let mut opts: Vec<String> = if bc.cross() {
            bc.options.clone()
        } else {
            bc.options
                .iter()
                .filter(|o| !CROSS_ONLY.iter().any(|c| o.starts_with(c)))
                .cloned()
                .collect()
        };

        if bc.cross() {
            let explicit_target =
                bc.has_option("--arch=") && bc.has_option("--target-os");
            if !bc.has_option("--host=") && !explicit_target {
                opts.push(format!("--host={}", bc.ctx.platform.toolchain.host));
            }
        }

        let switches = cfg.library_switches("--enable-shared", "--enable-static");
        for flag in switches.flags(cfg.wants_shared()) {
            if !opts.contains(&flag) {
                opts.push(flag);
            }
        }
        if !bc.has_option("--prefix=") {
            opts.push(format!("--prefix={}", bc.package_dir().display()));
        }
        Ok(opts)
    }

    fn configure(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        self.autogen(bc)?;
        util::ensure_dir(&bc.work_dir())?;
        if !has_configure_script(bc) {
            return Ok(());
        }
        let script = bc.src_dir().join("configure");
        let step = bc
            .step("configure", script.display().to_string())
            .args(options.iter().cloned())
            .cwd(bc.work_dir());
        bc.run(step)
    }

    fn build(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        let dir = if has_configure_script(bc) {
            bc.work_dir()
        } else {
            bc.src_dir().to_path_buf()
        };
        let step = bc
            .step("build", "make")
            .arg(jobs_arg(bc))
            .args(options.iter().cloned())
            .cwd(dir);
        bc.run(step)
    }

    fn install(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        let step = if has_configure_script(bc) {
            bc.step("install", "make").arg("install").cwd(bc.work_dir())
        } else {
            // Plain Makefiles take the prefix on the command line.
            bc.step("install", "make")
                .arg("install")
                .arg("-C")
                .arg(bc.src_dir().display().to_string())
                .arg(format!("prefix={}", bc.package_dir().display()))
        };
        bc.run(step.args(options.iter().cloned()))
    }
}
