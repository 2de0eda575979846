//! Deterministic description of a port's whole build closure, and its sha256.
//!
//! Layout for the requested port: tool banner, platform, archive checksums; then one block
//! per visited port (recipe with the matched config, content identity, patches) followed by
//! its dev dependencies and runtime dependencies, depth first in declaration order. Every
//! block starts with a divider carrying the breadcrumb from the root.

use crate::buildsystems::source;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::ports::{NameVersion, Port};
use crate::util;

pub mod divider;
pub mod tools;

pub use divider::divider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub document: String,
    pub hash: String,
}

fn push_block(doc: &mut String, crumbs: &[String], body: &str) {
    doc.push_str(&divider(crumbs));
    doc.push_str(body);
    if !body.ends_with('\n') {
        doc.push('\n');
    }
}

fn crumbs_with(crumbs: &[String], last: impl Into<String>) -> Vec<String> {
    let mut out = crumbs.to_vec();
    out.push(last.into());
    out
}

pub fn generate(ctx: &Context, port: &Port) -> Result<Fingerprint> {
    let nv = port.id.to_string();
    let root = vec![nv.clone()];
    let mut doc = String::new();

    push_block(
        &mut doc,
        &crumbs_with(&root, "build_tools"),
        &tools::version_banner(port.kind),
    );

    let platform = ctx.platform_for(port.dev);
    push_block(
        &mut doc,
        &crumbs_with(&root, "platform"),
        &platform.to_toml_string()?,
    );
    let (toolchain, rootfs) = platform
        .archive_checksums(&ctx.ws)
        .map_err(|e| e.context(format!("fingerprint {nv}")))?;
    if !toolchain.is_empty() {
        push_block(&mut doc, &["toolchain_checksum".to_string()], &toolchain);
    }
    if !rootfs.is_empty() {
        push_block(&mut doc, &["rootfs_checksum".to_string()], &rootfs);
    }

    let mut active = vec![(port.id.clone(), port.dev)];
    emit_port(ctx, port, &root, &mut doc, &mut active)?;

    let hash = util::sha256_hex(doc.as_bytes());
    tracing::debug!(port = %nv, hash = %hash, "fingerprint computed");
    Ok(Fingerprint {
        document: doc,
        hash,
    })
}

fn emit_port(
    ctx: &Context,
    port: &Port,
    crumbs: &[String],
    doc: &mut String,
    active: &mut Vec<(NameVersion, bool)>,
) -> Result<()> {
    let nv = &port.id;
    push_block(doc, crumbs, &port.fingerprint_toml()?);

    let identity =
        source::content_identity(ctx, port).map_err(|e| e.context(format!("commit of {nv}")))?;
    push_block(doc, &crumbs_with(crumbs, "commit"), &identity);

    for name in port.config.patches.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let path = port.patch_path(name)?;
        let content = util::read_text(&path)?;
        push_block(doc, &crumbs_with(crumbs, format!("patch: {name}")), &content);
    }

    for dep in port.dev_dependencies()? {
        if port.is_self_loop(&dep) {
            continue;
        }
        let sub = Port::resolve(ctx, &dep, true)
            .map_err(|e| e.context(format!("dev_dependency of {nv}")))?;
        if !sub.supported_on_host() {
            continue;
        }
        descend(ctx, &sub, crumbs_with(crumbs, format!("dev_dependency: {dep}")), doc, active)?;
    }

    for dep in port.dependencies()? {
        let sub = Port::resolve(ctx, &dep, port.dev)
            .map_err(|e| e.context(format!("dependency of {nv}")))?;
        descend(ctx, &sub, crumbs_with(crumbs, format!("dependency: {dep}")), doc, active)?;
    }
    Ok(())
}

fn descend(
    ctx: &Context,
    port: &Port,
    crumbs: Vec<String>,
    doc: &mut String,
    active: &mut Vec<(NameVersion, bool)>,
) -> Result<()> {
    let key = (port.id.clone(), port.dev);
    if active.contains(&key) {
        return Err(Error::circular_dependency(active, &port.id));
    }
    active.push(key);
    let res = emit_port(ctx, port, &crumbs, doc, active);
    active.pop();
    res
}
