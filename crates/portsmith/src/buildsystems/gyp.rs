use std::path::Path;

use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind};
use crate::error::Result;
use crate::util;

/// Python-generated builds driven by the project's `build.sh`; outputs land under `dist/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gyp;

// (dist sub-directory, package sub-directory)
const DIST_LAYOUT: [(&str, &str); 3] = [
    ("dist/public", "include"),
    ("dist/Debug/lib", "lib"),
    ("dist/Debug/bin", "bin"),
];

impl BuildSystem for Gyp {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Gyp
    }

    fn required_tools(&self) -> Vec<&'static str> {
        vec!["python3"]
    }

    // The generator runs as part of build.sh every time.
    fn configured(&self, _bc: &BuildContext) -> bool {
        false
    }

    fn configure(&self, _bc: &BuildContext, _options: &[String]) -> Result<()> {
        Ok(())
    }

    fn build(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        let step = bc
            .step("build", "./build.sh")
            .args(options.iter().cloned())
            .cwd(bc.src_dir());
        bc.run(step)
    }

    fn install(&self, bc: &BuildContext, _options: &[String]) -> Result<()> {
        if bc.ctx.exec.dry_run {
            return Ok(());
        }
        // dist/ sits next to the source checkout.
        let root = bc.src_dir().parent().unwrap_or(Path::new("."));
        for (from, to) in DIST_LAYOUT {
            let src = root.join(from);
            if src.is_dir() {
                util::copy_tree(&src, &bc.package_dir().join(to), |_| false)?;
            }
        }
        Ok(())
    }
}
