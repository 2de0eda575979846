use std::fs;

use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind, jobs_arg};
use crate::error::{Error, Result};
use crate::util;

/// Boost.Build: `bootstrap.sh` once, then `./b2 ... install` does build and install together.
#[derive(Debug, Clone, Copy, Default)]
pub struct B2;

fn b2_variant(build_type: &str) -> &'static str {
    match build_type.to_ascii_lowercase().as_str() {
        "debug" => "debug",
        "relwithdebinfo" => "profile",
        _ => "release",
    }
}

impl BuildSystem for B2 {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::B2
    }

    fn configured(&self, bc: &BuildContext) -> bool {
        let src = bc.src_dir();
        src.join("b2").is_file() && src.join("project-config.jam").is_file()
    }

    fn configure(&self, bc: &BuildContext, _options: &[String]) -> Result<()> {
        bc.run(
            bc.step("configure", "./bootstrap.sh")
                .cwd(bc.src_dir()),
        )?;
        if !bc.cross() || bc.ctx.exec.dry_run {
            return Ok(());
        }
        // Point the gcc toolset at the cross compiler.
        let jam = bc.src_dir().join("project-config.jam");
        let body = util::read_text(&jam)?;
        let using = format!("using gcc : : {} ;", bc.ctx.platform.toolchain.cxx());
        if !body.contains("using gcc ;") {
            return Err(Error::msg(format!(
                "{} has no 'using gcc ;' line to rewrite",
                jam.display()
            )));
        }
        fs::write(&jam, body.replace("using gcc ;", &using))
            .map_err(|e| Error::msg(format!("failed to write {}: {e}", jam.display())))
    }

    fn build_options(&self, bc: &BuildContext) -> Result<Vec<String>> {
        let cfg = &bc.port.config;
        let link = if cfg.wants_shared() { "shared" } else { "static" };
        let mut opts = vec![
            "toolset=gcc".to_string(),
            "install".to_string(),
            format!("variant={}", b2_variant(&cfg.build_type)),
            format!("--build-dir={}", bc.build_dir().display()),
            format!("link={link}"),
            format!("runtime-link={link}"),
            "--abbreviate-paths".to_string(),
            format!("--prefix={}", bc.package_dir().display()),
        ];
        opts.extend(bc.options.iter().cloned());
        Ok(opts)
    }

    fn build(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        let step = bc
            .step("build", "./b2")
            .args(options.iter().cloned())
            .arg(jobs_arg(bc))
            .cwd(bc.src_dir());
        bc.run(step)
    }

    fn install(&self, _bc: &BuildContext, _options: &[String]) -> Result<()> {
        Ok(())
    }
}
