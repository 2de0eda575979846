use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::buildsystems::BuildSystemKind;
use crate::error::{Error, Result};

fn default_library_type() -> String {
    "shared".into()
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackageSection {
    pub url: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub archive: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub src_dir: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_hosts: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub ignore_submodule: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub depth: u32,
}

impl PackageSection {
    pub fn is_virtual(&self) -> bool {
        self.url.trim() == "_"
    }
}

/// Per-OS overrides for a build config. A field set here and non-empty replaces the base value.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildOverlay {
    pub build_system: Option<String>,
    pub cmake_generator: Option<String>,
    pub build_tools: Option<Vec<String>>,
    pub library_type: Option<String>,
    pub build_shared: Option<String>,
    pub build_static: Option<String>,
    pub c_standard: Option<String>,
    pub cxx_standard: Option<String>,
    pub envs: Option<Vec<String>>,
    pub patches: Option<Vec<String>>,
    pub build_in_source: Option<bool>,
    pub autogen_options: Option<Vec<String>>,
    pub dependencies: Option<Vec<String>>,
    pub dev_dependencies: Option<Vec<String>>,
    pub pre_configure: Option<Vec<String>>,
    pub post_configure: Option<Vec<String>>,
    pub pre_build: Option<Vec<String>>,
    pub fix_build: Option<Vec<String>>,
    pub post_build: Option<Vec<String>>,
    pub pre_install: Option<Vec<String>>,
    pub post_install: Option<Vec<String>>,
    pub custom_configure: Option<Vec<String>>,
    pub custom_build: Option<Vec<String>>,
    pub custom_install: Option<Vec<String>>,
    pub options: Option<Vec<String>>,
}

fn take_str(slot: &mut String, over: &Option<String>) {
    if let Some(v) = over.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        *slot = v.to_string();
    }
}

fn take_list(slot: &mut Vec<String>, over: &Option<Vec<String>>) {
    if let Some(v) = over.as_ref().filter(|v| !v.is_empty()) {
        *slot = v.clone();
    }
}

impl BuildOverlay {
    pub fn apply(&self, base: &mut BuildConfig) {
        take_str(&mut base.build_system, &self.build_system);
        take_str(&mut base.cmake_generator, &self.cmake_generator);
        take_list(&mut base.build_tools, &self.build_tools);
        take_str(&mut base.library_type, &self.library_type);
        take_str(&mut base.build_shared, &self.build_shared);
        take_str(&mut base.build_static, &self.build_static);
        take_str(&mut base.c_standard, &self.c_standard);
        take_str(&mut base.cxx_standard, &self.cxx_standard);
        take_list(&mut base.envs, &self.envs);
        take_list(&mut base.patches, &self.patches);
        if let Some(v) = self.build_in_source {
            base.build_in_source = v;
        }
        take_list(&mut base.autogen_options, &self.autogen_options);
        take_list(&mut base.dependencies, &self.dependencies);
        take_list(&mut base.dev_dependencies, &self.dev_dependencies);
        take_list(&mut base.pre_configure, &self.pre_configure);
        take_list(&mut base.post_configure, &self.post_configure);
        take_list(&mut base.pre_build, &self.pre_build);
        take_list(&mut base.fix_build, &self.fix_build);
        take_list(&mut base.post_build, &self.post_build);
        take_list(&mut base.pre_install, &self.pre_install);
        take_list(&mut base.post_install, &self.post_install);
        take_list(&mut base.custom_configure, &self.custom_configure);
        take_list(&mut base.custom_build, &self.custom_build);
        take_list(&mut base.custom_install, &self.custom_install);
        take_list(&mut base.options, &self.options);
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pattern: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub build_system: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cmake_generator: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub build_tools: Vec<String>,
    pub library_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build_shared: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build_static: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub c_standard: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cxx_standard: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub build_in_source: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub autogen_options: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dev_dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pre_configure: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_configure: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pre_build: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fix_build: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_build: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pre_install: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_install: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_configure: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_build: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_install: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub overlay: BTreeMap<String, BuildOverlay>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            url: String::new(),
            build_system: String::new(),
            cmake_generator: String::new(),
            build_tools: Vec::new(),
            library_type: default_library_type(),
            build_shared: String::new(),
            build_static: String::new(),
            c_standard: String::new(),
            cxx_standard: String::new(),
            build_type: String::new(),
            envs: Vec::new(),
            patches: Vec::new(),
            build_in_source: false,
            autogen_options: Vec::new(),
            dependencies: Vec::new(),
            dev_dependencies: Vec::new(),
            pre_configure: Vec::new(),
            post_configure: Vec::new(),
            pre_build: Vec::new(),
            fix_build: Vec::new(),
            post_build: Vec::new(),
            pre_install: Vec::new(),
            post_install: Vec::new(),
            custom_configure: Vec::new(),
            custom_build: Vec::new(),
            custom_install: Vec::new(),
            options: Vec::new(),
            overlay: BTreeMap::new(),
        }
    }
}

impl BuildConfig {
    pub fn kind(&self) -> Result<BuildSystemKind> {
        BuildSystemKind::parse(&self.build_system)
    }

    /// Apply the overlay registered for `os` and drop the overlay table.
    pub fn resolved_for(mut self, os: &str) -> Self {
        let overlays = std::mem::take(&mut self.overlay);
        if let Some(over) = overlays.get(os) {
            over.apply(&mut self);
        }
        self
    }

    pub fn is_unconditional_fallback(&self) -> bool {
        matches!(self.build_system.trim(), "prebuilt" | "nobuild")
    }

    /// Shared/static switches as `(enable, disable)` pairs, parsed from `enable|disable`.
    pub fn library_switches(&self, default_shared: &str, default_static: &str) -> LibrarySwitches {
        fn split(raw: &str) -> (String, String) {
            match raw.split_once('|') {
                Some((on, off)) => (on.trim().to_string(), off.trim().to_string()),
                None => (raw.trim().to_string(), String::new()),
            }
        }
        let (mut enable_shared, disable_shared) = split(&self.build_shared);
        let (mut enable_static, disable_static) = split(&self.build_static);
        if enable_shared.is_empty() {
            enable_shared = default_shared.to_string();
        }
        if enable_static.is_empty() {
            enable_static = default_static.to_string();
        }
        LibrarySwitches {
            enable_shared,
            disable_shared,
            enable_static,
            disable_static,
        }
    }

    pub fn wants_shared(&self) -> bool {
        self.library_type.trim().eq_ignore_ascii_case("shared")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySwitches {
    pub enable_shared: String,
    pub disable_shared: String,
    pub enable_static: String,
    pub disable_static: String,
}

impl LibrarySwitches {
    // Flags for the configured library type; "no" suppresses a flag.
    pub fn flags(&self, shared: bool) -> Vec<String> {
        let pick = |s: &str| -> Option<String> {
            let s = s.trim();
            (!s.is_empty() && s != "no").then(|| s.to_string())
        };
        let (shared_flag, static_flag) = if shared {
            (pick(&self.enable_shared), pick(&self.disable_static))
        } else {
            (pick(&self.disable_shared), pick(&self.enable_static))
        };
        shared_flag.into_iter().chain(static_flag).collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortRecipe {
    pub package: PackageSection,
    pub build_configs: Vec<BuildConfig>,
}

impl PortRecipe {
    pub fn validate(&self, nv: &str) -> Result<()> {
        if self.package.url.trim().is_empty() {
            return Err(Error::msg(format!("port {nv}: package.url is empty")));
        }
        if !self.package.is_virtual() && self.package.git_ref.trim().is_empty() {
            return Err(Error::msg(format!("port {nv}: package.ref is empty")));
        }
        if self.build_configs.is_empty() {
            return Err(Error::msg(format!("port {nv}: no build_configs declared")));
        }
        for (idx, cfg) in self.build_configs.iter().enumerate() {
            cfg.kind().map_err(|e| {
                Error::msg(format!("port {nv}: build_configs[{idx}]: {e}"))
            })?;
            for os in cfg.overlay.keys() {
                if !matches!(os.as_str(), "windows" | "linux" | "darwin") {
                    return Err(Error::msg(format!(
                        "port {nv}: build_configs[{idx}] has overlay for unknown os '{os}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serialize with `config` as the only build config, the form used in fingerprints.
    pub fn to_toml_with(&self, config: &BuildConfig) -> Result<String> {
        let view = PortRecipe {
            package: self.package.clone(),
            build_configs: vec![config.clone()],
        };
        toml::to_string(&view).map_err(|e| Error::msg(format!("failed to serialize port: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> PortRecipe {
        toml::from_str(raw).expect("parse recipe")
    }

    #[test]
    fn overlay_for_target_os_wins_when_non_empty() {
        let recipe = parse(
            r#"
[package]
url = "https://example.com/zlib.git"
ref = "v1.3"

[[build_configs]]
pattern = "*"
build_system = "cmake"
options = ["-DZLIB_BUILD_EXAMPLES=OFF"]

[build_configs.overlay.linux]
build_system = "ninja"
options = []
dependencies = ["libbar@3.0"]

[build_configs.overlay.windows]
options = ["-DWIN=ON"]
"#,
        );
        recipe.validate("zlib@1.3").expect("valid");
        let cfg = recipe.build_configs[0].clone().resolved_for("linux");
        assert_eq!(cfg.build_system, "ninja");
        // Empty overlay lists keep the base value.
        assert_eq!(cfg.options, vec!["-DZLIB_BUILD_EXAMPLES=OFF".to_string()]);
        assert_eq!(cfg.dependencies, vec!["libbar@3.0".to_string()]);
        assert!(cfg.overlay.is_empty());
        assert_eq!(cfg.library_type, "shared");
    }

    #[test]
    fn rejects_unknown_build_system() {
        let recipe = parse(
            "[package]\nurl = \"a.git\"\nref = \"main\"\n[[build_configs]]\nbuild_system = \"scons\"\n",
        );
        let err = recipe.validate("a@1").expect_err("invalid");
        assert!(err.to_string().contains("scons"));
    }

    #[test]
    fn virtual_port_needs_no_ref() {
        let recipe =
            parse("[package]\nurl = \"_\"\n[[build_configs]]\nbuild_system = \"nobuild\"\n");
        recipe.validate("meta@1").expect("valid");
    }

    #[test]
    fn library_switch_pairs() {
        let cfg = BuildConfig {
            build_shared: "--enable-shared|--disable-shared".into(),
            build_static: "no".into(),
            ..BuildConfig::default()
        };
        let sw = cfg.library_switches("--enable-shared", "--enable-static");
        assert_eq!(sw.flags(true), vec!["--enable-shared".to_string()]);
        assert_eq!(sw.flags(false), vec!["--disable-shared".to_string()]);
    }

    #[test]
    fn fingerprint_form_keeps_only_one_config() {
        let recipe = parse(
            "[package]\nurl = \"a.git\"\nref = \"main\"\n[[build_configs]]\npattern = \"*linux*\"\nbuild_system = \"cmake\"\n[[build_configs]]\npattern = \"*windows*\"\nbuild_system = \"cmake\"\n",
        );
        let out = recipe
            .to_toml_with(&recipe.build_configs[0])
            .expect("serialize");
        assert!(out.contains("*linux*"));
        assert!(!out.contains("*windows*"));
    }
}
