#![cfg(unix)]

mod common;

use std::path::Path;

use common::{git, git_source, nv, source_archive, workspace, write_git_port, write_script_port};
use portsmith::error::ErrorKind;
use portsmith::fingerprint;
use portsmith::install::{InstallOptions, InstallOutcome, Installer};
use portsmith::ports::Port;

fn cache_settings(cache_dir: &Path) -> String {
    format!(
        "[cache]\ndir = \"{}\"\ntoken = \"s3cret\"\nwritable = true\n",
        cache_dir.display()
    )
}

fn populate_opts(token: Option<&str>) -> InstallOptions {
    InstallOptions {
        store_cache: true,
        cache_token: token.map(str::to_string),
        ..InstallOptions::default()
    }
}

fn entries(dir: &Path) -> usize {
    if !dir.exists() {
        return 0;
    }
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

#[test]
fn population_without_matching_token_writes_nothing() {
    let shared = tempfile::tempdir().expect("tempdir");
    let cache_dir = shared.path().join("cache");
    let archive = source_archive(shared.path(), "bar");
    let ws = workspace(&cache_settings(&cache_dir));
    write_script_port(&ws.ctx, "libbar@3.0", &archive, "bar", &[], &[]);

    for (token, kind) in [
        (None, ErrorKind::CacheTokenNotSpecified),
        (Some("wrong"), ErrorKind::CacheTokenMismatch),
    ] {
        let mut installer = Installer::new(&ws.ctx, populate_opts(token)).expect("installer");
        let err = installer
            .install(&nv("libbar@3.0"), false)
            .expect_err("token gate");
        assert_eq!(err.kind(), kind, "{err}");
    }
    assert_eq!(entries(&cache_dir), 0);
    assert!(ws.sink.started_titles().is_empty());
}

#[test]
fn package_built_in_one_workspace_restores_in_another() {
    let shared = tempfile::tempdir().expect("tempdir");
    let cache_dir = shared.path().join("cache");
    let bar = source_archive(shared.path(), "bar");
    let foo = source_archive(shared.path(), "foo");
    let settings = cache_settings(&cache_dir);

    let producer = workspace(&settings);
    write_script_port(&producer.ctx, "libbar@3.0", &bar, "bar", &[], &[]);
    write_script_port(&producer.ctx, "libfoo@1.2", &foo, "foo", &["libbar@3.0"], &[]);
    let mut installer =
        Installer::new(&producer.ctx, populate_opts(Some("s3cret"))).expect("installer");
    assert_eq!(
        installer.install(&nv("libfoo@1.2"), false).expect("populate"),
        InstallOutcome::Source
    );
    // One archive and one meta per port.
    assert_eq!(entries(&cache_dir), 4);
    let platform = producer.ctx.platform_name(false);
    assert!(cache_dir
        .join(&platform)
        .join("default")
        .join("release")
        .join("libbar@3.0")
        .is_dir());

    let consumer = workspace(&settings);
    write_script_port(&consumer.ctx, "libbar@3.0", &bar, "bar", &[], &[]);
    write_script_port(&consumer.ctx, "libfoo@1.2", &foo, "foo", &["libbar@3.0"], &[]);
    let mut installer = Installer::new(&consumer.ctx, InstallOptions::default()).expect("installer");
    assert_eq!(
        installer.install(&nv("libfoo@1.2"), false).expect("restore"),
        InstallOutcome::Cache
    );
    let outcomes: Vec<InstallOutcome> = installer.report().iter().map(|r| r.outcome).collect();
    assert_eq!(outcomes, vec![InstallOutcome::Cache, InstallOutcome::Cache]);
    assert!(consumer.sink.started_titles().is_empty());

    let lf = consumer.ctx.library_folder(false);
    let installed = consumer.ctx.ws.installed_dir.join(&lf);
    assert!(installed.join("include/foo.h").is_file());
    let pc = std::fs::read_to_string(installed.join("lib/pkgconfig/bar.pc")).expect("pc");
    assert_eq!(pc.trim(), format!("prefix={}", installed.display()));
}

#[test]
fn force_and_population_bypass_cached_packages() {
    let shared = tempfile::tempdir().expect("tempdir");
    let cache_dir = shared.path().join("cache");
    let bar = source_archive(shared.path(), "bar");
    let settings = cache_settings(&cache_dir);

    let producer = workspace(&settings);
    write_script_port(&producer.ctx, "libbar@3.0", &bar, "bar", &[], &[]);
    Installer::new(&producer.ctx, populate_opts(Some("s3cret")))
        .expect("installer")
        .install(&nv("libbar@3.0"), false)
        .expect("populate");
    assert_eq!(entries(&cache_dir), 2);

    let forced = InstallOptions {
        force: true,
        ..InstallOptions::default()
    };
    for opts in [forced, populate_opts(Some("s3cret"))] {
        let consumer = workspace(&settings);
        write_script_port(&consumer.ctx, "libbar@3.0", &bar, "bar", &[], &[]);
        let mut installer = Installer::new(&consumer.ctx, opts).expect("installer");
        assert_eq!(
            installer.install(&nv("libbar@3.0"), false).expect("install"),
            InstallOutcome::Source
        );
        assert!(consumer
            .sink
            .started_titles()
            .contains(&"[build libbar@3.0]".to_string()));
    }
}

#[test]
fn host_builds_are_never_published() {
    let shared = tempfile::tempdir().expect("tempdir");
    let cache_dir = shared.path().join("cache");
    let bar = source_archive(shared.path(), "bar");
    let ws = workspace(&cache_settings(&cache_dir));
    write_script_port(&ws.ctx, "libbar@3.0", &bar, "bar", &[], &[]);

    let mut installer = Installer::new(&ws.ctx, populate_opts(Some("s3cret"))).expect("installer");
    assert_eq!(
        installer.install(&nv("libbar@3.0"), true).expect("dev install"),
        InstallOutcome::Source
    );
    assert_eq!(entries(&cache_dir), 0);
}

// Clones the checkout the way a fingerprint does, then hands it to `touch` before installing.
fn install_from_touched_checkout(touch: impl FnOnce(&Path, &Path)) -> usize {
    let shared = tempfile::tempdir().expect("tempdir");
    let cache_dir = shared.path().join("cache");
    let origin = git_source(shared.path(), "bar");
    let ws = workspace(&cache_settings(&cache_dir));
    write_git_port(&ws.ctx, "libbar@3.0", &origin, "bar");

    let port = Port::resolve(&ws.ctx, &nv("libbar@3.0"), false).expect("port");
    fingerprint::generate(&ws.ctx, &port).expect("fingerprint");
    touch(&origin, &port.paths.repo_dir);

    let mut installer = Installer::new(&ws.ctx, populate_opts(Some("s3cret"))).expect("installer");
    assert_eq!(
        installer.install(&nv("libbar@3.0"), false).expect("install"),
        InstallOutcome::Source
    );
    assert!(port.paths.installed_dir.join("include/bar.h").is_file());
    entries(&cache_dir)
}

#[test]
fn clean_checkout_is_published() {
    assert_eq!(install_from_touched_checkout(|_, _| {}), 2);
}

#[test]
fn hand_edited_checkout_is_not_published() {
    let stored = install_from_touched_checkout(|_, checkout| {
        std::fs::write(checkout.join("bar.c"), "int bar = 42;\n").expect("edit");
    });
    assert_eq!(stored, 0);
}

#[test]
fn checkout_behind_upstream_is_not_published() {
    let stored = install_from_touched_checkout(|origin, checkout| {
        std::fs::write(origin.join("bar.c"), "int bar = 2;\n").expect("edit");
        git(origin, &["commit", "-q", "-am", "second"]);
        git(checkout, &["fetch", "-q", "origin"]);
    });
    assert_eq!(stored, 0);
}
