use crate::context::Context;
use crate::error::{Error, Result};
use crate::ports::{NameVersion, Port};

/// Render the resolved dependency tree, dev dependencies first, one port per line.
pub fn render(ctx: &Context, nv: &NameVersion, dev: bool) -> Result<String> {
    let mut out = String::new();
    let mut active = Vec::new();
    walk(ctx, nv, dev, 0, "", &mut active, &mut out)?;
    Ok(out)
}

fn walk(
    ctx: &Context,
    nv: &NameVersion,
    dev: bool,
    depth: usize,
    tag: &str,
    active: &mut Vec<(NameVersion, bool)>,
    out: &mut String,
) -> Result<()> {
    if active.iter().any(|(n, d)| n == nv && *d == dev) {
        return Err(Error::circular_dependency(active, nv));
    }
    let port = Port::resolve(ctx, nv, dev)?;
    let note = if port.supported_on_host() {
        ""
    } else {
        " (unsupported host, skipped)"
    };
    out.push_str(&format!(
        "{}{}{} [{}]{}\n",
        "  ".repeat(depth),
        tag,
        nv,
        port.kind.as_str(),
        note
    ));
    if !note.is_empty() {
        return Ok(());
    }

    active.push((nv.clone(), dev));
    for dep in port.dev_dependencies()? {
        if port.is_self_loop(&dep) {
            continue;
        }
        walk(ctx, &dep, true, depth + 1, "dev: ", active, out)?;
    }
    for dep in port.dependencies()? {
        walk(ctx, &dep, port.dev, depth + 1, "", active, out)?;
    }
    active.pop();
    Ok(())
}
