// Path parsing and leaf-name validation.
//
// Paths are client-facing only. They are split into segments and resolved to
// inode ids on every call; nothing inside the engine stores them.

use crate::prelude::*;

/// Checks a single path segment.
///
/// Rejected: empty names, `.` and `..`, the path separator, `:`, control
/// characters, leading or trailing whitespace, and names longer than
/// [`MAX_NAME_LENGTH`] bytes.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("empty name")
    } else if name == "." || name == ".." {
        Some("reserved name")
    } else if name.len() > MAX_NAME_LENGTH {
        Some("name too long")
    } else if name.contains(PATH_SEPARATOR) {
        Some("contains a path separator")
    } else if name.contains(':') {
        Some("contains ':'")
    } else if name.chars().any(char::is_control) {
        Some("contains a control character")
    } else if name.starts_with(char::is_whitespace) || name.ends_with(char::is_whitespace) {
        Some("leading or trailing whitespace")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Splits an absolute path into its segments. Repeated and trailing
/// separators are ignored, so `/a//b/` yields `["a", "b"]` and `/` yields
/// nothing.
pub fn split(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with(PATH_SEPARATOR) {
        return Err(Error::InvalidPath {
            path: path.to_string(),
            reason: "path is not absolute",
        });
    }

    let segments: Vec<&str> = path
        .split(PATH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(Error::InvalidPath {
            path: path.to_string(),
            reason: "relative segments are not supported",
        });
    }
    Ok(segments)
}

/// Splits a path into its parent segments and leaf name.
pub fn split_parent(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut segments = split(path)?;
    match segments.pop() {
        Some(leaf) => Ok((segments, leaf)),
        None => Err(Error::InvalidPath {
            path: path.to_string(),
            reason: "the root has no parent",
        }),
    }
}

/// Renders segments back into a normalized absolute path.
pub fn render<S: AsRef<str>>(segments: &[S]) -> String {
    if segments.is_empty() {
        return PATH_SEPARATOR.to_string();
    }
    let mut out = String::new();
    for segment in segments {
        out.push(PATH_SEPARATOR);
        out.push_str(segment.as_ref());
    }
    out
}

pub fn join(parent: &str, name: &str) -> String {
    if parent.ends_with(PATH_SEPARATOR) {
        format!("{parent}{name}")
    } else {
        format!("{parent}{PATH_SEPARATOR}{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["file1", "a+b", "dir 3", "$HOME", "über", ".hidden", "x.y.z"] {
            assert!(validate_name(name).is_ok(), "{name:?} should be valid");
        }
    }

    #[test]
    fn test_rejects_dollar_space() {
        let err = validate_name("$ ").unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
    }

    #[test]
    fn test_rejected_names() {
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        for name in ["", ".", "..", "a/b", "a:b", "tab\there", "nul\0", " lead", "trail ", long.as_str()] {
            assert!(
                matches!(validate_name(name), Err(Error::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_split() {
        assert_eq!(split("/").unwrap(), Vec::<&str>::new());
        assert_eq!(split("/user/a+b/dir1").unwrap(), vec!["user", "a+b", "dir1"]);
        assert_eq!(split("//user//dir2/").unwrap(), vec!["user", "dir2"]);
        assert!(matches!(split("user/dir"), Err(Error::InvalidPath { .. })));
        assert!(matches!(split("/user/../etc"), Err(Error::InvalidPath { .. })));
    }

    #[test]
    fn test_split_parent_and_render() {
        let (parent, leaf) = split_parent("/user/dir3/file3").unwrap();
        assert_eq!(parent, vec!["user", "dir3"]);
        assert_eq!(leaf, "file3");
        assert_eq!(render(&parent), "/user/dir3");
        assert_eq!(render::<&str>(&[]), "/");
        assert!(split_parent("/").is_err());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "user"), "/user");
        assert_eq!(join("/user", "dir1"), "/user/dir1");
    }
}
