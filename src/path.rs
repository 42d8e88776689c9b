//! Device path parsing.
//!
//! Device paths are sysfs-style, forward-slash separated, with an optional
//! leading slash. An empty path denotes the tree root.

/// Split `path` into its first segment (`head`) and the remainder (`tail`).
///
/// A leading `/` is stripped before splitting. If there is no further `/` in
/// what remains, `tail` is empty. The empty path splits to `("", "")`.
///
/// ```
/// # use devmgrd::path::split;
/// assert_eq!(split("a/b/c"), ("a", "b/c"));
/// assert_eq!(split("/a/b/c"), ("a", "b/c"));
/// assert_eq!(split("a"), ("a", ""));
/// assert_eq!(split(""), ("", ""));
/// ```
pub fn split(path: &str) -> (&str, &str) {
    let path = path.strip_prefix('/').unwrap_or(path);
    match path.split_once('/') {
        Some((head, tail)) => (head, tail),
        None => (path, ""),
    }
}

/// Split `path` into its owned segments, skipping empty components.
///
/// Used where callers need to walk every segment rather than one at a time;
/// `segments("/a/b/c")` and `segments("a/b/c/")` both yield `["a", "b", "c"]`.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Strip a known prefix segment (e.g. `"devices"`) from a devpath, returning
/// the remainder with its separating slash removed.
///
/// Returns `None` if `path`'s first segment isn't `prefix`.
pub fn strip_segment<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let (head, tail) = split(path);
    if head == prefix {
        Some(tail)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_basic() {
        assert_eq!(split("a/b/c"), ("a", "b/c"));
        assert_eq!(split("/a/b/c"), ("a", "b/c"));
    }

    #[test]
    fn splits_single_segment() {
        assert_eq!(split("a"), ("a", ""));
        assert_eq!(split("/a"), ("a", ""));
    }

    #[test]
    fn splits_empty() {
        assert_eq!(split(""), ("", ""));
        assert_eq!(split("/"), ("", ""));
    }

    /// Law 2 from the testable-properties list: for any non-empty path not
    /// equal to "/", head + "/" + tail (dropping the slash when tail is
    /// empty) reconstructs the path with any leading slash stripped.
    #[test]
    fn round_trip_law() {
        for p in ["a/b/c", "/a/b/c", "a", "/a", "devices/platform/foo"] {
            let (head, tail) = split(p);
            let stripped = p.strip_prefix('/').unwrap_or(p);
            let rebuilt = if tail.is_empty() {
                head.to_string()
            } else {
                format!("{head}/{tail}")
            };
            assert_eq!(rebuilt, stripped, "round trip failed for {p:?}");
        }
    }

    #[test]
    fn segments_skip_empty() {
        assert_eq!(segments("/a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(segments("a/b/c/"), vec!["a", "b", "c"]);
        assert_eq!(segments(""), Vec::<&str>::new());
    }

    #[test]
    fn strip_segment_matches() {
        assert_eq!(strip_segment("devices/a/b", "devices"), Some("a/b"));
        assert_eq!(strip_segment("module/foo", "devices"), None);
        assert_eq!(strip_segment("devices", "devices"), Some(""));
    }
}
