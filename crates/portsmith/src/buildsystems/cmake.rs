use std::path::PathBuf;

use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind, recreate_dir};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::util;

pub const DEFAULT_GENERATOR: &str = "Unix Makefiles";
const GENERATORS: [&str; 3] = ["Ninja", "Unix Makefiles", "Xcode"];

pub fn cmake_build_type(build_type: &str) -> &'static str {
    match build_type.to_ascii_lowercase().as_str() {
        "debug" => "Debug",
        "relwithdebinfo" => "RelWithDebInfo",
        "minsizerel" => "MinSizeRel",
        _ => "Release",
    }
}

fn on_off(b: bool) -> &'static str {
    if b { "ON" } else { "OFF" }
}

#[derive(Debug, Clone)]
pub struct CMake {
    pub generator: String,
}

impl CMake {
    pub fn new(generator: &str) -> Result<Self> {
        let generator = match generator.trim() {
            "" => DEFAULT_GENERATOR,
            g => g,
        };
        if !GENERATORS.contains(&generator) {
            return Err(Error::msg(format!(
                "unsupported cmake_generator '{generator}' (expected one of: {})",
                GENERATORS.join(", ")
            )));
        }
        Ok(Self {
            generator: generator.to_string(),
        })
    }

    fn multi_config(&self) -> bool {
        self.generator == "Xcode"
    }

    fn markers(&self) -> &'static [&'static str] {
        match self.generator.as_str() {
            "Ninja" => &["CMakeCache.txt", "build.ninja", "rules.ninja"],
            "Xcode" => &["CMakeCache.txt"],
            _ => &["CMakeCache.txt", "Makefile"],
        }
    }
}

pub fn toolchain_file_path(ctx: &Context) -> PathBuf {
    ctx.ws.tmp_files_dir().join("toolchain_file.cmake")
}

/// Describe the target toolchain for CMake cross builds.
pub fn write_toolchain_file(ctx: &Context) -> Result<PathBuf> {
    let tc = &ctx.platform.toolchain;
    let mut body = String::new();
    body.push_str(&format!("set(CMAKE_SYSTEM_NAME \"{}\")\n", tc.system_name));
    body.push_str(&format!(
        "set(CMAKE_SYSTEM_PROCESSOR \"{}\")\n",
        tc.system_processor
    ));
    body.push_str(&format!("set(CMAKE_C_COMPILER \"{}\")\n", tc.cc()));
    body.push_str(&format!("set(CMAKE_CXX_COMPILER \"{}\")\n", tc.cxx()));
    if let Some(sysroot) = ctx.platform.rootfs_dir() {
        body.push_str(&format!("set(CMAKE_SYSROOT \"{}\")\n", sysroot.display()));
    }
    body.push_str("set(CMAKE_FIND_ROOT_PATH_MODE_PROGRAM NEVER)\n");
    body.push_str("set(CMAKE_FIND_ROOT_PATH_MODE_LIBRARY ONLY)\n");
    body.push_str("set(CMAKE_FIND_ROOT_PATH_MODE_INCLUDE ONLY)\n");
    body.push_str("set(CMAKE_FIND_ROOT_PATH_MODE_PACKAGE ONLY)\n");
    let path = toolchain_file_path(ctx);
    util::atomic_write_text(&path, &body)?;
    Ok(path)
}

impl BuildSystem for CMake {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::CMake
    }

    fn required_tools(&self) -> Vec<&'static str> {
        if self.generator == "Ninja" {
            vec!["cmake", "ninja"]
        } else {
            vec!["cmake"]
        }
    }

    fn configured(&self, bc: &BuildContext) -> bool {
        let dir = bc.build_dir();
        self.markers().iter().all(|m| dir.join(m).is_file())
    }

    fn configure_options(&self, bc: &BuildContext) -> Result<Vec<String>> {
        let cfg = &bc.port.config;
        let mut opts = bc.options.clone();

        if bc.port.dev {
            opts.push("-DCMAKE_INSTALL_RPATH=$ORIGIN/../lib".into());
        } else if bc.cross() {
            opts.push(format!(
                "-DCMAKE_TOOLCHAIN_FILE={}",
                toolchain_file_path(bc.ctx).display()
            ));
        }
        opts.push(format!(
            "-DCMAKE_INSTALL_PREFIX={}",
            bc.package_dir().display()
        ));
        if !self.multi_config() && !bc.has_option("-DCMAKE_BUILD_TYPE=") {
            opts.push(format!(
                "-DCMAKE_BUILD_TYPE={}",
                cmake_build_type(&cfg.build_type)
            ));
        }
        if !bc.has_option("-DBUILD_SHARED_LIBS=") {
            opts.push(format!("-DBUILD_SHARED_LIBS={}", on_off(cfg.wants_shared())));
        }
        if !cfg.c_standard.trim().is_empty() {
            opts.push(format!(
                "-DCMAKE_C_STANDARD={}",
                cfg.c_standard.trim().trim_start_matches('c')
            ));
            opts.push("-DCMAKE_C_STANDARD_REQUIRED=ON".into());
        }
        if !cfg.cxx_standard.trim().is_empty() {
            opts.push(format!(
                "-DCMAKE_CXX_STANDARD={}",
                cfg.cxx_standard.trim().trim_start_matches("c++")
            ));
            opts.push("-DCMAKE_CXX_STANDARD_REQUIRED=ON".into());
        }

        let staging = bc.port.paths.staging_dir.display().to_string();
        let mut roots = vec![staging.clone()];
        if bc.cross() {
            if let Some(rootfs) = bc.ctx.platform.rootfs_dir() {
                roots.push(rootfs.display().to_string());
            }
        }
        opts.push(format!("-DCMAKE_FIND_ROOT_PATH={}", roots.join(";")));
        opts.push(format!("-DCMAKE_PREFIX_PATH={staging}"));
        opts.push(format!("-DTMP_DEP_DIR={staging}"));
        Ok(opts)
    }

    fn configure(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        if bc.cross() {
            write_toolchain_file(bc.ctx)?;
        }
        recreate_dir(bc.ctx, bc.build_dir())?;
        let step = bc
            .step("configure", "cmake")
            .args(["-G", self.generator.as_str()])
            .arg("-S")
            .arg(bc.src_dir().display().to_string())
            .arg("-B")
            .arg(bc.build_dir().display().to_string())
            .args(options.iter().cloned())
            .cwd(bc.build_dir());
        bc.run(step)
    }

    fn build(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        let mut step = bc
            .step("build", "cmake")
            .arg("--build")
            .arg(bc.build_dir().display().to_string());
        if self.multi_config() {
            step = step
                .arg("--config")
                .arg(cmake_build_type(&bc.port.config.build_type));
        }
        let step = step
            .arg("--parallel")
            .arg(bc.jobs().to_string())
            .args(options.iter().cloned());
        bc.run(step)
    }

    fn install(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        let mut step = bc
            .step("install", "cmake")
            .arg("--install")
            .arg(bc.build_dir().display().to_string());
        if self.multi_config() {
            step = step
                .arg("--config")
                .arg(cmake_build_type(&bc.port.config.build_type));
        }
        bc.run(step.args(options.iter().cloned()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use super::*;
    use crate::buildsystems;
    use crate::ports::{NameVersion, Port};
    use crate::testing;

    #[test]
    fn second_run_skips_configure_when_markers_exist() {
        let tw = testing::workspace("");
        let bin = tw.root().join("fake-bin");
        let counter = tw.root().join("configure.count");
        testing::fake_cmake(&bin, &counter);
        testing::write_port(
            &tw.ctx,
            "libcm@1.0",
            &format!(
                "[package]\nurl = \"_\"\n[[build_configs]]\nbuild_system = \"cmake\"\nenvs = [\"PATH={}\"]\n",
                bin.display()
            ),
        );
        let port = Port::resolve(&tw.ctx, &NameVersion::parse("libcm@1.0").expect("nv"), false)
            .expect("resolve");

        buildsystems::run(&tw.ctx, &port).expect("first run");
        buildsystems::run(&tw.ctx, &port).expect("second run");

        let configures = fs::read_to_string(&counter).expect("counter");
        assert_eq!(configures.lines().count(), 1);
        let titles = tw.sink.started_titles();
        assert_eq!(
            titles.iter().filter(|t| *t == "[configure libcm@1.0]").count(),
            1
        );
        assert_eq!(titles.iter().filter(|t| *t == "[build libcm@1.0]").count(), 2);
    }

    #[test]
    fn options_carry_prefix_build_type_and_library_policy() {
        let tw = testing::workspace("[global]\nbuild_type = \"debug\"\n");
        testing::write_port(
            &tw.ctx,
            "libcm@1.0",
            "[package]\nurl = \"_\"\n[[build_configs]]\nbuild_system = \"cmake\"\nlibrary_type = \"static\"\ncxx_standard = \"c++17\"\noptions = [\"-DWITH_TESTS=OFF\"]\n",
        );
        let port = Port::resolve(&tw.ctx, &NameVersion::parse("libcm@1.0").expect("nv"), false)
            .expect("resolve");
        let cmake = CMake::new("").expect("cmake");
        let bc = buildsystems::BuildContext::new(&tw.ctx, &port, &cmake).expect("bc");
        let opts = cmake.configure_options(&bc).expect("options");
        assert_eq!(opts[0], "-DWITH_TESTS=OFF");
        assert!(opts.contains(&format!("-DCMAKE_INSTALL_PREFIX={}", port.paths.package_dir.display())));
        assert!(opts.contains(&"-DCMAKE_BUILD_TYPE=Debug".to_string()));
        assert!(opts.contains(&"-DBUILD_SHARED_LIBS=OFF".to_string()));
        assert!(opts.contains(&"-DCMAKE_CXX_STANDARD=17".to_string()));
    }

    #[test]
    fn unknown_generator_is_rejected() {
        assert!(CMake::new("Visual Studio 17 2022").is_err());
        assert_eq!(CMake::new("").expect("default").generator, DEFAULT_GENERATOR);
    }
}
