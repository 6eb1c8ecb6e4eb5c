//! Prefix arithmetic on `/`-separated workspace paths.

/// `path` is `prefix` itself or lies below it. `a/b` is under `a`, `ab` is not.
pub fn is_under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Moves `path` from under `from` to under `to`; `None` when it is not under `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    let from = from.trim_end_matches('/');
    let to = to.trim_end_matches('/');
    if !is_under(path, from) {
        return None;
    }
    let rest = &path[from.len()..];
    Some(format!("{to}{rest}"))
}
