use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::executor::EnvMap;
use crate::ports::Port;

// Placeholders that only make sense when cross compiling for the target.
const TARGET_ONLY: [&str; 5] = [
    "HOST",
    "SYSTEM_NAME",
    "SYSTEM_PROCESSOR",
    "SYSROOT",
    "CROSSTOOL_PREFIX",
];

static PLACEHOLDER_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_]+)\}").ok());
static ENV_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$ENV\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

/// Symbolic `${NAME}` values for one port plus `$ENV{NAME}` lookups.
#[derive(Debug, Clone)]
pub struct Vars {
    table: BTreeMap<&'static str, String>,
    dev: bool,
}

impl Vars {
    pub fn new(ctx: &Context, port: &Port) -> Self {
        let p = &port.paths;
        let tc = &ctx.platform.toolchain;
        let sysroot = ctx
            .platform
            .rootfs_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        let mut table = BTreeMap::new();
        table.insert("REPO_DIR", p.repo_dir.display().to_string());
        table.insert("SRC_DIR", p.src_dir.display().to_string());
        table.insert("BUILD_DIR", p.build_dir.display().to_string());
        table.insert("PACKAGE_DIR", p.package_dir.display().to_string());
        table.insert(
            "DEPS_DIR",
            ctx.ws
                .tmp_deps_dir()
                .join(ctx.library_folder(false))
                .display()
                .to_string(),
        );
        table.insert(
            "DEPS_DEV_DIR",
            ctx.ws
                .tmp_deps_dir()
                .join(ctx.dev_platform_name())
                .display()
                .to_string(),
        );
        table.insert("BUILDTREES_DIR", ctx.ws.buildtrees_dir.display().to_string());
        table.insert("SYSROOT", sysroot);
        table.insert("HOST", tc.host.clone());
        table.insert("SYSTEM_NAME", tc.system_name.clone());
        table.insert("SYSTEM_PROCESSOR", tc.system_processor.clone());
        table.insert("CROSSTOOL_PREFIX", tc.crosstool_prefix.clone());
        Self {
            table,
            dev: port.dev,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.table.get(name).map(String::as_str)
    }

    /// Expand placeholders; unknown `${NAME}` stays as written so shell variables survive.
    pub fn expand(&self, input: &str, env: &EnvMap) -> String {
        let mut out = input.to_string();
        if let Some(re) = PLACEHOLDER_RE.as_ref() {
            out = re
                .replace_all(&out, |caps: &regex::Captures| {
                    self.table
                        .get(&caps[1])
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned();
        }
        if let Some(re) = ENV_RE.as_ref() {
            out = re
                .replace_all(&out, |caps: &regex::Captures| {
                    env.get(&caps[1])
                        .cloned()
                        .or_else(|| std::env::var(&caps[1]).ok())
                        .unwrap_or_default()
                })
                .into_owned();
        }
        out
    }

    fn mentions_target_only(input: &str) -> bool {
        PLACEHOLDER_RE.as_ref().is_some_and(|re| {
            re.captures_iter(input)
                .any(|c| TARGET_ONLY.contains(&&c[1]))
        })
    }

    /// Expand a list of options. Host builds drop options that reference target-only values.
    pub fn expand_options(&self, options: &[String], env: &EnvMap) -> Vec<String> {
        options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .filter(|o| !(self.dev && Self::mentions_target_only(o)))
            .map(|o| self.expand(o, env))
            .collect()
    }
}
