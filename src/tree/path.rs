//! Path syntax
//!
//! Paths mirror filesystem paths: a leading `/` starts at the root, `.` is the
//! current node and `..` the parent. Empty segments (`a//b`, trailing `/`) are
//! ignored. Matching of names is case-sensitive.

use super::error::{TreeError, TreeResult};

/// Separator between path segments
pub const SEPARATOR: char = '/';

/// One step of a parsed path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Leading `/`
    Root,
    /// `.`
    Current,
    /// `..`
    Parent,
    /// A child name
    Name(&'a str),
}

/// Split a path into navigation steps
pub fn segments(path: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    if path.starts_with(SEPARATOR) {
        out.push(Segment::Root);
    }
    for part in path.split(SEPARATOR) {
        match part {
            "" => {}
            "." => out.push(Segment::Current),
            ".." => out.push(Segment::Parent),
            name => out.push(Segment::Name(name)),
        }
    }
    out
}

/// Check that `name` can be used as a node name
pub fn validate_name(name: &str) -> TreeResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(SEPARATOR) {
        return Err(TreeError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Join a parent path and a child name into an absolute path
pub fn join(parent: &str, name: &str) -> String {
    if parent.ends_with(SEPARATOR) {
        format!("{}{}", parent, name)
    } else {
        format!("{}{}{}", parent, SEPARATOR, name)
    }
}

/// Lexically normalize a path to its absolute form
///
/// `.` is dropped and `..` removes the previous name (staying at the root).
/// Relative paths are taken from the root.
pub fn normalize(path: &str) -> String {
    let mut names: Vec<&str> = Vec::new();
    for segment in segments(path) {
        match segment {
            Segment::Root => names.clear(),
            Segment::Current => {}
            Segment::Parent => {
                names.pop();
            }
            Segment::Name(name) => names.push(name),
        }
    }
    if names.is_empty() {
        return SEPARATOR.to_string();
    }
    names
        .iter()
        .map(|n| format!("{}{}", SEPARATOR, n))
        .collect()
}

/// Split an absolute path into its parent path and final name
///
/// Returns `None` for the root or for paths that end in `.`/`..`.
pub fn split_last(path: &str) -> Option<(String, &str)> {
    let trimmed = path.trim_end_matches(SEPARATOR);
    let (parent, name) = match trimmed.rfind(SEPARATOR) {
        Some(ix) => (&trimmed[..ix], &trimmed[ix + 1..]),
        None => ("", trimmed),
    };
    if validate_name(name).is_err() {
        return None;
    }
    let parent = if parent.is_empty() && path.starts_with(SEPARATOR) {
        SEPARATOR.to_string()
    } else {
        parent.to_string()
    };
    Some((parent, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments() {
        assert_eq!(
            segments("/a/b"),
            vec![Segment::Root, Segment::Name("a"), Segment::Name("b")]
        );
        assert_eq!(
            segments("../x/./y/"),
            vec![
                Segment::Parent,
                Segment::Name("x"),
                Segment::Current,
                Segment::Name("y")
            ]
        );
        assert_eq!(segments(""), vec![]);
        assert_eq!(segments("/"), vec![Segment::Root]);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("counter").is_ok());
        assert!(validate_name("Counter 2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
    }

    #[test]
    fn test_join_and_split() {
        assert_eq!(join("/", "app"), "/app");
        assert_eq!(join("/app", "counter"), "/app/counter");
        assert_eq!(split_last("/app/counter"), Some(("/app".to_string(), "counter")));
        assert_eq!(split_last("/app"), Some(("/".to_string(), "app")));
        assert_eq!(split_last("/"), None);
        assert_eq!(split_last("/app/.."), None);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/app/./sub/../level"), "/app/level");
        assert_eq!(normalize("/.."), "/");
        assert_eq!(normalize("app//x/"), "/app/x");
        assert_eq!(normalize(""), "/");
    }
}
