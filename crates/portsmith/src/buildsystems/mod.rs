//! Build-system backends and the lifecycle that drives them.
//!
//! Every backend implements [`BuildSystem`]. The lifecycle in [`run`] is the same for all of
//! them: check tools, fetch, patch, configure (unless the backend reports it is already
//! configured), build with a single fix-and-retry, then install into the package dir.
//! Relocating pkg-config and CMake files happens later, when the installer copies the
//! package into staging or the installed tree.

use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::executor::{EnvMap, Step};
use crate::ports::Port;

pub mod b2;
pub mod cmake;
pub mod custom;
pub mod env;
pub mod freestyle;
pub mod gyp;
pub mod makefiles;
pub mod meson;
pub mod ninja;
pub mod nobuild;
pub mod prebuilt;
pub mod qmake;
pub mod source;
pub mod vars;

pub use vars::Vars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildSystemKind {
    CMake,
    Ninja,
    Makefiles,
    B2,
    Meson,
    Gyp,
    QMake,
    Prebuilt,
    Nobuild,
    Custom,
    Freestyle,
}

impl BuildSystemKind {
    pub const ALL: [BuildSystemKind; 11] = [
        Self::CMake,
        Self::Ninja,
        Self::Makefiles,
        Self::B2,
        Self::Meson,
        Self::Gyp,
        Self::QMake,
        Self::Prebuilt,
        Self::Nobuild,
        Self::Custom,
        Self::Freestyle,
    ];

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == raw)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                Error::msg(format!(
                    "unsupported build_system '{raw}' (expected one of: {})",
                    names.join(", ")
                ))
            })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CMake => "cmake",
            Self::Ninja => "ninja",
            Self::Makefiles => "makefiles",
            Self::B2 => "b2",
            Self::Meson => "meson",
            Self::Gyp => "gyp",
            Self::QMake => "qmake",
            Self::Prebuilt => "prebuilt",
            Self::Nobuild => "nobuild",
            Self::Custom => "custom",
            Self::Freestyle => "freestyle",
        }
    }

    /// Tools whose `--version` banner goes into the fingerprint.
    pub fn banner_tools(self) -> &'static [&'static str] {
        match self {
            Self::CMake => &["cmake"],
            Self::Ninja => &["cmake", "ninja"],
            Self::Makefiles | Self::B2 | Self::QMake => &["make"],
            Self::Meson => &["meson", "ninja", "python3"],
            Self::Gyp => &["python3"],
            Self::Prebuilt | Self::Nobuild | Self::Custom | Self::Freestyle => &[],
        }
    }
}

/// Per-lifecycle state handed to every backend call.
pub struct BuildContext<'a> {
    pub ctx: &'a Context,
    pub port: &'a Port,
    pub env: EnvMap,
    pub vars: Vars,
    // Recipe `options` after placeholder expansion.
    pub options: Vec<String>,
}

impl<'a> BuildContext<'a> {
    pub fn new(ctx: &'a Context, port: &'a Port, backend: &dyn BuildSystem) -> Result<Self> {
        let vars = Vars::new(ctx, port);
        let mut env = env::build_env(ctx, port, &vars, backend.injects_toolchain_env())?;
        backend.tune_env(ctx, port, &mut env);
        let options = vars.expand_options(&port.config.options, &env);
        Ok(Self {
            ctx,
            port,
            env,
            vars,
            options,
        })
    }

    pub fn jobs(&self) -> usize {
        self.ctx.jobs()
    }

    pub fn cross(&self) -> bool {
        self.ctx.is_cross(self.port.dev)
    }

    pub fn src_dir(&self) -> &Path {
        &self.port.paths.src_dir
    }

    pub fn build_dir(&self) -> &Path {
        &self.port.paths.build_dir
    }

    pub fn package_dir(&self) -> &Path {
        &self.port.paths.package_dir
    }

    // Where scripts and in-tree builds run.
    pub fn work_dir(&self) -> PathBuf {
        if self.port.config.build_in_source {
            self.port.paths.src_dir.clone()
        } else {
            self.port.paths.build_dir.clone()
        }
    }

    pub fn has_option(&self, prefix: &str) -> bool {
        self.options.iter().any(|o| o.starts_with(prefix))
    }

    /// A step titled `[<step> <port>]` logging to the per-step log file.
    pub fn step(&self, step: &str, program: impl Into<String>) -> Step {
        Step::new(format!("[{step} {}]", self.port.id), program)
            .env(&self.env)
            .log_to(self.port.paths.step_log(step))
    }

    pub fn shell(&self, step: &str, script: &str) -> Step {
        Step::shell(format!("[{step} {}]", self.port.id), script)
            .env(&self.env)
            .log_to(self.port.paths.step_log(step))
    }

    pub fn run(&self, step: Step) -> Result<()> {
        self.ctx.exec.run(step)
    }
}

/// Capabilities a backend offers. Defaults cover the steps most backends share.
pub trait BuildSystem {
    fn kind(&self) -> BuildSystemKind;

    fn required_tools(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn injects_toolchain_env(&self) -> bool {
        true
    }

    fn tune_env(&self, _ctx: &Context, _port: &Port, _env: &mut EnvMap) {}

    fn fetch(&self, bc: &BuildContext) -> Result<()> {
        if bc.port.is_virtual() || bc.port.paths.repo_dir.exists() {
            return Ok(());
        }
        source::fetch(bc, &bc.port.paths.repo_dir)
    }

    fn patch(&self, bc: &BuildContext) -> Result<()> {
        if bc.port.is_virtual() {
            return Ok(());
        }
        source::apply_patches(bc)
    }

    fn configured(&self, bc: &BuildContext) -> bool;

    fn configure_options(&self, bc: &BuildContext) -> Result<Vec<String>> {
        Ok(bc.options.clone())
    }

    fn configure(&self, bc: &BuildContext, options: &[String]) -> Result<()>;

    fn build_options(&self, _bc: &BuildContext) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn build(&self, bc: &BuildContext, options: &[String]) -> Result<()>;

    fn install_options(&self, _bc: &BuildContext) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn install(&self, bc: &BuildContext, options: &[String]) -> Result<()>;
}

pub fn select(port: &Port) -> Result<Box<dyn BuildSystem>> {
    let cfg = &port.config;
    Ok(match port.kind {
        BuildSystemKind::CMake => Box::new(cmake::CMake::new(&cfg.cmake_generator)?),
        BuildSystemKind::Ninja => Box::new(ninja::Ninja::new()),
        BuildSystemKind::Makefiles => Box::new(makefiles::Makefiles),
        BuildSystemKind::B2 => Box::new(b2::B2),
        BuildSystemKind::Meson => Box::new(meson::Meson),
        BuildSystemKind::Gyp => Box::new(gyp::Gyp),
        BuildSystemKind::QMake => Box::new(qmake::QMake),
        BuildSystemKind::Prebuilt => Box::new(prebuilt::Prebuilt),
        BuildSystemKind::Nobuild => Box::new(nobuild::Nobuild),
        BuildSystemKind::Custom => Box::new(custom::Custom::new(cfg)),
        BuildSystemKind::Freestyle => Box::new(freestyle::Freestyle::new(cfg)),
    })
}

/// Drive a port through its full lifecycle with the backend its config selects.
pub fn run(ctx: &Context, port: &Port) -> Result<()> {
    let backend = select(port)?;
    run_with(ctx, port, backend.as_ref())
}

pub fn run_with(ctx: &Context, port: &Port, backend: &dyn BuildSystem) -> Result<()> {
    let nv = &port.id;
    let wrap = |step: &'static str| move |e: Error| e.context(format!("{step} {nv}"));

    let bc = BuildContext::new(ctx, port, backend)?;
    check_tools(&bc, backend).map_err(wrap("check tools"))?;

    tracing::info!(port = %nv, build_system = port.kind.as_str(), "building from source");
    backend.fetch(&bc).map_err(wrap("clone"))?;
    backend.patch(&bc).map_err(wrap("patch"))?;

    if backend.configured(&bc) {
        tracing::debug!(port = %nv, "already configured, skipping configure");
    } else {
        run_hooks(&bc, "pre_configure", &port.config.pre_configure).map_err(wrap("pre_configure"))?;
        let opts = backend.configure_options(&bc).map_err(wrap("configure"))?;
        backend.configure(&bc, &opts).map_err(wrap("configure"))?;
        run_hooks(&bc, "post_configure", &port.config.post_configure)
            .map_err(wrap("post_configure"))?;
    }

    run_hooks(&bc, "pre_build", &port.config.pre_build).map_err(wrap("pre_build"))?;
    let opts = backend.build_options(&bc).map_err(wrap("build"))?;
    if let Err(first) = backend.build(&bc, &opts) {
        if port.config.fix_build.is_empty() {
            return Err(wrap("build")(first));
        }
        tracing::warn!(port = %nv, error = %first, "build failed, running fix_build and retrying");
        run_hooks(&bc, "fix_build", &port.config.fix_build).map_err(wrap("fix_build"))?;
        backend.build(&bc, &opts).map_err(wrap("build"))?;
    }
    run_hooks(&bc, "post_build", &port.config.post_build).map_err(wrap("post_build"))?;

    run_hooks(&bc, "pre_install", &port.config.pre_install).map_err(wrap("pre_install"))?;
    let opts = backend.install_options(&bc).map_err(wrap("install"))?;
    backend.install(&bc, &opts).map_err(wrap("install"))?;
    run_hooks(&bc, "post_install", &port.config.post_install).map_err(wrap("post_install"))?;
    Ok(())
}

fn check_tools(bc: &BuildContext, backend: &dyn BuildSystem) -> Result<()> {
    let declared = bc.port.config.build_tools.iter().map(String::as_str);
    let missing: Vec<&str> = backend
        .required_tools()
        .into_iter()
        .chain(declared)
        .filter(|t| !t.trim().is_empty())
        .filter(|t| find_in_path(t.trim(), &bc.env).is_none())
        .collect();
    if missing.is_empty() || bc.ctx.exec.dry_run {
        return Ok(());
    }
    Err(Error::msg(format!(
        "required tools not found in PATH: {}",
        missing.join(", ")
    )))
}

pub fn find_in_path(tool: &str, env: &EnvMap) -> Option<PathBuf> {
    if tool.contains('/') {
        let p = PathBuf::from(tool);
        return p.is_file().then_some(p);
    }
    let path = env.get("PATH")?;
    std::env::split_paths(path)
        .map(|dir| dir.join(tool))
        .find(|candidate| candidate.is_file())
}

/// Run a hook list with placeholders expanded, each script through the shell in the repo dir.
fn run_hooks(bc: &BuildContext, step: &str, scripts: &[String]) -> Result<()> {
    let cwd = if bc.port.paths.repo_dir.is_dir() {
        bc.port.paths.repo_dir.clone()
    } else {
        bc.work_dir()
    };
    if scripts.iter().all(|s| s.trim().is_empty()) {
        return Ok(());
    }
    crate::util::ensure_dir(&cwd)?;
    let title = format!("[{} {}]", step.replace('_', " "), bc.port.id);
    for (i, script) in scripts.iter().filter(|s| !s.trim().is_empty()).enumerate() {
        let script = bc.vars.expand(script, &bc.env);
        let mut hook = Step::shell(title.clone(), &script)
            .env(&bc.env)
            .log_to(bc.port.paths.step_log(step))
            .cwd(&cwd);
        // One log per hook list.
        if i > 0 {
            hook = hook.append_log();
        }
        bc.run(hook)?;
    }
    Ok(())
}

// Reset a build directory before configuring from scratch.
pub(crate) fn recreate_dir(ctx: &Context, dir: &Path) -> Result<()> {
    if dir.exists() {
        ctx.ws.remove_under_root(dir)?;
    }
    crate::util::ensure_dir(dir)
}

pub(crate) fn jobs_arg(bc: &BuildContext) -> String {
    format!("-j{}", bc.jobs())
}
