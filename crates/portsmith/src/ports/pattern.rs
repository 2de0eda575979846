use crate::platform;

/// Match a build-config pattern against a platform name.
///
/// Empty or `*` matches everything, `*x*` is a substring match, `*x` a suffix match,
/// `x*` a prefix match; anything else must equal the name exactly.
pub fn matches(pattern: &str, platform_name: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    let lead = pattern.starts_with('*');
    let trail = pattern.len() > 1 && pattern.ends_with('*');
    let core = pattern.trim_matches('*');
    match (lead, trail) {
        (true, true) => platform_name.contains(core),
        (true, false) => platform_name.ends_with(core),
        (false, true) => platform_name.starts_with(core),
        (false, false) => platform_name == pattern,
    }
}

fn os_in(name: &str) -> Option<&'static str> {
    let n = name.to_ascii_lowercase();
    if n.contains("windows") {
        Some("windows")
    } else if n.contains("linux") {
        Some("linux")
    } else if n.contains("darwin") || n.contains("macos") {
        Some("darwin")
    } else {
        None
    }
}

/// OS whose overlay applies: named by the pattern, else by the platform, else the host.
pub fn target_os(pattern: &str, platform_name: &str) -> &'static str {
    os_in(pattern)
        .or_else(|| os_in(platform_name))
        .unwrap_or_else(platform::host_os)
}
