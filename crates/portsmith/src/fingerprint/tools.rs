use crate::buildsystems::BuildSystemKind;
use crate::executor;

/// `portsmith: <version>` followed by the first `--version` line of each backend tool.
///
/// Tools that cannot be executed are left out.
pub fn version_banner(kind: BuildSystemKind) -> String {
    let mut out = format!("portsmith: {}\n", env!("CARGO_PKG_VERSION"));
    for tool in kind.banner_tools() {
        match executor::capture(tool, &["--version"], None) {
            Ok(text) => {
                let first = text.lines().next().unwrap_or_default().trim();
                out.push_str(&format!("{tool}: {first}\n"));
            }
            Err(e) => tracing::debug!(tool, error = %e, "tool version probe skipped"),
        }
    }
    out
}
