use crate::buildsystems::custom::Custom;
use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind};
use crate::error::Result;
use crate::ports::BuildConfig;

/// Like [`Custom`] but the scripts see the plain environment: no cross tools or staging flags.
#[derive(Debug, Clone, Default)]
pub struct Freestyle {
    scripts: Custom,
}

impl Freestyle {
    pub fn new(cfg: &BuildConfig) -> Self {
        Self {
            scripts: Custom::new(cfg),
        }
    }
}

impl BuildSystem for Freestyle {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Freestyle
    }

    fn injects_toolchain_env(&self) -> bool {
        false
    }

    fn configured(&self, bc: &BuildContext) -> bool {
        self.scripts.configured(bc)
    }

    fn configure(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        self.scripts.configure(bc, options)
    }

    fn build(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        self.scripts.build(bc, options)
    }

    fn install(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        self.scripts.install(bc, options)
    }
}
