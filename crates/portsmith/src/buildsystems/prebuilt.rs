use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind, source};
use crate::error::Result;

/// Already-built artifacts: the source archive or repo is the package tree itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prebuilt;

impl BuildSystem for Prebuilt {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Prebuilt
    }

    fn injects_toolchain_env(&self) -> bool {
        false
    }

    fn fetch(&self, bc: &BuildContext) -> Result<()> {
        if bc.port.is_virtual() || bc.package_dir().exists() {
            return Ok(());
        }
        source::fetch(bc, bc.package_dir())
    }

    fn patch(&self, _bc: &BuildContext) -> Result<()> {
        Ok(())
    }

    fn configured(&self, _bc: &BuildContext) -> bool {
        true
    }

    fn configure(&self, _bc: &BuildContext, _options: &[String]) -> Result<()> {
        Ok(())
    }

    fn build(&self, _bc: &BuildContext, _options: &[String]) -> Result<()> {
        Ok(())
    }

    fn install(&self, _bc: &BuildContext, _options: &[String]) -> Result<()> {
        Ok(())
    }
}
