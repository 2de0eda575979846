use std::sync::Arc;

use crate::config::Settings;
use crate::error::Result;
use crate::executor::{ExecCtx, ExecSink};
use crate::platform::{self, Platform};
use crate::workspace::WorkspacePaths;

/// Everything a single invocation resolves once: settings, directories, the target platform.
#[derive(Clone)]
pub struct Context {
    pub settings: Settings,
    pub ws: WorkspacePaths,
    pub platform: Platform,
    pub exec: ExecCtx,
    pub host: String,
}

impl Context {
    pub fn new(settings: Settings, sink: Arc<dyn ExecSink>) -> Result<Self> {
        let ws = settings.workspace_paths()?;
        let platform = Platform::load(&ws, &settings.global.platform)?;
        let exec = ExecCtx::new(settings.global.dry_run, sink);
        Ok(Self {
            settings,
            ws,
            platform,
            exec,
            host: platform::host_name(),
        })
    }

    pub fn project(&self) -> &str {
        &self.settings.global.project
    }

    // Dev ports are always built as release for the host.
    pub fn build_type(&self, dev: bool) -> &str {
        if dev {
            "release"
        } else {
            &self.settings.global.build_type
        }
    }

    pub fn jobs(&self) -> usize {
        self.settings.jobs()
    }

    pub fn dev_platform_name(&self) -> String {
        format!("{}-dev", self.host)
    }

    /// Name the matcher sees when selecting a build config.
    pub fn platform_name(&self, dev: bool) -> String {
        if dev {
            self.dev_platform_name()
        } else {
            self.platform.name.clone()
        }
    }

    pub fn library_folder(&self, dev: bool) -> String {
        if dev {
            self.dev_platform_name()
        } else {
            format!(
                "{}@{}@{}",
                self.platform.name,
                self.project(),
                self.build_type(false)
            )
        }
    }

    pub fn build_folder(&self, dev: bool) -> String {
        if dev {
            self.dev_platform_name()
        } else {
            format!(
                "{}-{}-{}",
                self.platform.name,
                self.project(),
                self.build_type(false)
            )
        }
    }

    pub fn is_cross(&self, dev: bool) -> bool {
        !dev && !self.platform.toolchain.is_native()
    }

    /// Platform description a port of this role is built against.
    pub fn platform_for(&self, dev: bool) -> Platform {
        if dev {
            Platform::native()
        } else {
            self.platform.clone()
        }
    }
}
