use std::path::Path;

use crate::buildsystems::Vars;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::executor::{self, EnvMap};
use crate::ports::Port;

const PATH_LIKE: [&str; 6] = [
    "PATH",
    "LD_LIBRARY_PATH",
    "DYLD_LIBRARY_PATH",
    "PKG_CONFIG_PATH",
    "CMAKE_PREFIX_PATH",
    "ACLOCAL_PATH",
];

const FLAG_KEYS: [&str; 5] = ["CFLAGS", "CXXFLAGS", "CPPFLAGS", "LDFLAGS", "ASFLAGS"];

#[cfg(unix)]
const LIST_SEP: &str = ":";
#[cfg(not(unix))]
const LIST_SEP: &str = ";";

pub fn prepend_path(env: &mut EnvMap, key: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    let merged = match env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(existing) if existing.split(LIST_SEP).any(|p| p == value) => existing.to_string(),
        Some(existing) => format!("{value}{LIST_SEP}{existing}"),
        None => value.to_string(),
    };
    env.insert(key.to_string(), merged);
}

pub fn append_flags(env: &mut EnvMap, key: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    let merged = match env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(existing) => format!("{existing} {value}"),
        None => value.to_string(),
    };
    env.insert(key.to_string(), merged);
}

fn parse_env_entry(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(Error::msg(format!(
            "invalid envs entry '{raw}' (expected KEY=VALUE)"
        ))),
    }
}

/// Environment for every child process of one port's lifecycle.
///
/// Starts from a snapshot of the process environment; nothing here touches the process itself.
pub fn build_env(ctx: &Context, port: &Port, vars: &Vars, inject_toolchain: bool) -> Result<EnvMap> {
    let mut env = executor::process_env();

    for raw in port.config.envs.iter().filter(|e| !e.trim().is_empty()) {
        let (key, value) = parse_env_entry(raw)?;
        let value = vars.expand(&value, &env);
        if PATH_LIKE.contains(&key.as_str()) {
            prepend_path(&mut env, &key, &value);
        } else if FLAG_KEYS.contains(&key.as_str()) {
            append_flags(&mut env, &key, &value);
        } else {
            env.insert(key, value);
        }
    }

    let cross = ctx.is_cross(port.dev);
    if inject_toolchain {
        if cross {
            let tc = &ctx.platform.toolchain;
            prepend_path(&mut env, "PATH", tc.path.trim());
            for (key, tool) in tc.tool_envs() {
                env.insert(key.to_string(), tool);
            }
            if let Some(sysroot) = ctx.platform.rootfs_dir() {
                let flag = format!("--sysroot={}", sysroot.display());
                for key in ["CFLAGS", "CXXFLAGS", "LDFLAGS"] {
                    append_flags(&mut env, key, &flag);
                }
            }
        }

        let opt = ctx
            .settings
            .optimize
            .for_build_type(ctx.build_type(port.dev));
        append_flags(&mut env, "CFLAGS", opt);
        append_flags(&mut env, "CXXFLAGS", opt);

        let staging = &port.paths.staging_dir;
        let include = format!("-isystem {}", staging.join("include").display());
        append_flags(&mut env, "CFLAGS", &include);
        append_flags(&mut env, "CXXFLAGS", &include);
        append_flags(
            &mut env,
            "LDFLAGS",
            &format!("-L{}", staging.join("lib").display()),
        );
    }

    set_pkg_config(ctx, port, &mut env, cross);

    let dev_bin = ctx
        .ws
        .tmp_deps_dir()
        .join(ctx.dev_platform_name())
        .join("bin");
    prepend_path(&mut env, "PATH", &dev_bin.display().to_string());
    Ok(env)
}

fn set_pkg_config(ctx: &Context, port: &Port, env: &mut EnvMap, cross: bool) {
    let staging: &Path = &port.paths.staging_dir;
    let mut dirs = vec![
        staging.join("lib").join("pkgconfig"),
        staging.join("share").join("pkgconfig"),
    ];
    if cross {
        if let Some(rootfs) = &ctx.platform.rootfs {
            let root = Path::new(rootfs.path.trim());
            dirs.extend(
                rootfs
                    .pkg_config_path
                    .iter()
                    .map(|p| root.join(p.trim_start_matches('/'))),
            );
        }
    }
    let joined: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
    env.insert("PKG_CONFIG_PATH".into(), joined.join(LIST_SEP));

    // The sysroot prefix would corrupt paths into the staging dir on native builds.
    match ctx.platform.rootfs_dir().filter(|_| cross) {
        Some(sysroot) => {
            env.insert(
                "PKG_CONFIG_SYSROOT_DIR".into(),
                sysroot.display().to_string(),
            );
        }
        None => {
            env.remove("PKG_CONFIG_SYSROOT_DIR");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NameVersion;
    use crate::testing;

    #[test]
    fn path_like_prepends_and_flags_append() {
        let mut env = EnvMap::new();
        env.insert("PATH".into(), "/usr/bin".into());
        env.insert("CFLAGS".into(), "-O2".into());
        prepend_path(&mut env, "PATH", "/opt/tools/bin");
        prepend_path(&mut env, "PATH", "/opt/tools/bin");
        append_flags(&mut env, "CFLAGS", "-fPIC");
        assert_eq!(env["PATH"], format!("/opt/tools/bin{LIST_SEP}/usr/bin"));
        assert_eq!(env["CFLAGS"], "-O2 -fPIC");
    }

    #[test]
    fn recipe_envs_and_staging_reach_the_map() {
        let tw = testing::workspace("[optimize]\nrelease = \"-O3\"\n");
        testing::write_port(
            &tw.ctx,
            "zlib@1.3",
            "[package]\nurl = \"_\"\n[[build_configs]]\nbuild_system = \"custom\"\nenvs = [\"CFLAGS=-DZ_SOLO\", \"ZLIB_MODE=${BUILD_DIR}\"]\n",
        );
        let port = Port::resolve(&tw.ctx, &NameVersion::parse("zlib@1.3").expect("nv"), false)
            .expect("resolve");
        let vars = Vars::new(&tw.ctx, &port);
        let env = build_env(&tw.ctx, &port, &vars, true).expect("env");

        let cflags = &env["CFLAGS"];
        assert!(cflags.contains("-DZ_SOLO"));
        assert!(cflags.contains("-O3"));
        assert!(cflags.contains(&format!("-isystem {}", port.paths.staging_dir.join("include").display())));
        assert_eq!(env["ZLIB_MODE"], port.paths.build_dir.display().to_string());
        assert!(env["PKG_CONFIG_PATH"].starts_with(&port.paths.staging_dir.display().to_string()));
        assert!(env["PATH"].contains(&tw.ctx.dev_platform_name()));
        assert!(!env.contains_key("PKG_CONFIG_SYSROOT_DIR"));
    }

    #[test]
    fn freestyle_env_skips_toolchain_flags() {
        let tw = testing::workspace("[optimize]\nrelease = \"-O3\"\n");
        testing::write_port(&tw.ctx, "tool@1.0", &testing::freestyle_recipe(&[], &[]));
        let port = Port::resolve(&tw.ctx, &NameVersion::parse("tool@1.0").expect("nv"), false)
            .expect("resolve");
        let vars = Vars::new(&tw.ctx, &port);
        let env = build_env(&tw.ctx, &port, &vars, false).expect("env");
        assert!(!env.get("CFLAGS").is_some_and(|f| f.contains("-O3")));
    }
}
