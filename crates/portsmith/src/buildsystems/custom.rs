use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind};
use crate::error::Result;
use crate::ports::BuildConfig;
use crate::util;

/// User scripts for configure/build/install, run with the toolchain environment injected.
#[derive(Debug, Clone, Default)]
pub struct Custom {
    configure: Vec<String>,
    build: Vec<String>,
    install: Vec<String>,
}

fn join_scripts(scripts: &[String]) -> Option<String> {
    let parts: Vec<&str> = scripts
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(" && "))
}

impl Custom {
    pub fn new(cfg: &BuildConfig) -> Self {
        Self {
            configure: cfg.custom_configure.clone(),
            build: cfg.custom_build.clone(),
            install: cfg.custom_install.clone(),
        }
    }

    /// Run one script list joined with `&&` in the work dir. Empty lists are a no-op.
    pub fn run_scripts(&self, bc: &BuildContext, step: &str, scripts: &[String]) -> Result<()> {
        let Some(script) = join_scripts(scripts) else {
            return Ok(());
        };
        let script = bc.vars.expand(&script, &bc.env);
        let dir = bc.work_dir();
        util::ensure_dir(&dir)?;
        bc.run(bc.shell(step, &script).cwd(dir))
    }
}

impl BuildSystem for Custom {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Custom
    }

    fn configured(&self, _bc: &BuildContext) -> bool {
        false
    }

    fn configure(&self, bc: &BuildContext, _options: &[String]) -> Result<()> {
        util::ensure_dir(&bc.work_dir())?;
        self.run_scripts(bc, "configure", &self.configure)
    }

    fn build(&self, bc: &BuildContext, _options: &[String]) -> Result<()> {
        self.run_scripts(bc, "build", &self.build)
    }

    fn install(&self, bc: &BuildContext, _options: &[String]) -> Result<()> {
        util::ensure_dir(bc.package_dir())?;
        self.run_scripts(bc, "install", &self.install)
    }
}
