pub const CRUMB_SEP: &str = " <<< ";

/// `# -------- a <<< b --------`, skipping empty segments.
pub fn divider<S: AsRef<str>>(segments: &[S]) -> String {
    let crumbs: Vec<&str> = segments
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect();
    format!("# -------- {} --------\n", crumbs.join(CRUMB_SEP))
}
