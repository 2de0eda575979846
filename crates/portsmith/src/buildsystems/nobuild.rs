use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind};
use crate::error::Result;

/// Ports that only aggregate dependencies or header-free metadata; every step is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nobuild;

impl BuildSystem for Nobuild {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Nobuild
    }

    fn injects_toolchain_env(&self) -> bool {
        false
    }

    fn fetch(&self, _bc: &BuildContext) -> Result<()> {
        Ok(())
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
