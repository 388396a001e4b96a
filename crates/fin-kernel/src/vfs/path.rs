//! Normalized absolute paths.
//!
//! A [`VfsPath`] is a list of plain components. Parsing collapses repeated
//! separators, drops `.` and resolves `..`, so every stored path is already
//! canonical and can be compared, ordered and prefix-matched component-wise.
//! A `..` that would climb above the root is rejected instead of clamped.

use std::fmt;
use std::str::FromStr;

use crate::error::{FsError, FsResult};

/// A normalized, absolute filesystem path.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VfsPath {
    components: Vec<String>,
}

impl VfsPath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and normalize a `/`-separated path.
    ///
    /// Relative input is interpreted from the root; there is no working
    /// directory at this layer.
    pub fn parse(raw: &str) -> FsResult<Self> {
        let mut components: Vec<String> = Vec::new();
        for part in raw.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    if components.pop().is_none() {
                        return Err(FsError::InvalidPath(raw.to_string()));
                    }
                }
                name => {
                    if name.contains('\0') {
                        return Err(FsError::InvalidPath(raw.to_string()));
                    }
                    components.push(name.to_string());
                }
            }
        }
        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Number of components (0 for the root).
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Last component, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Split into parent path and final component, `None` for the root.
    pub fn split_last(&self) -> Option<(VfsPath, &str)> {
        let (last, parent) = self.components.split_last()?;
        Some((
            Self {
                components: parent.to_vec(),
            },
            last.as_str(),
        ))
    }

    /// The first `depth` components as a path.
    pub fn truncated(&self, depth: usize) -> VfsPath {
        Self {
            components: self.components[..depth.min(self.components.len())].to_vec(),
        }
    }

    /// Append a single component.
    pub fn join(&self, name: &str) -> VfsPath {
        let mut components = self.components.clone();
        components.push(name.to_string());
        Self { components }
    }

    /// Append every component of `relative`.
    pub fn concat(&self, relative: &VfsPath) -> VfsPath {
        let mut components = self.components.clone();
        components.extend(relative.components.iter().cloned());
        Self { components }
    }

    /// Component-wise prefix test: `/tmp` is a prefix of `/tmp/a` but not of `/tmpfoo`.
    pub fn starts_with(&self, prefix: &VfsPath) -> bool {
        self.components.starts_with(&prefix.components)
    }

    /// The remainder after `prefix`, if `prefix` is a prefix of `self`.
    pub fn strip_prefix(&self, prefix: &VfsPath) -> Option<VfsPath> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self {
            components: self.components[prefix.components.len()..].to_vec(),
        })
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for VfsPath {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("/", "/")]
    #[case("", "/")]
    #[case("/a/b", "/a/b")]
    #[case("a/b", "/a/b")]
    #[case("//a///b//", "/a/b")]
    #[case("/a/./b/.", "/a/b")]
    #[case("/a/b/../c", "/a/c")]
    #[case("/a/..", "/")]
    fn test_normalization(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(VfsPath::parse(raw).unwrap().to_string(), expected);
    }

    #[rstest]
    #[case("..")]
    #[case("/..")]
    #[case("/a/../..")]
    #[case("/a/../../b")]
    fn test_escaping_root_is_invalid(#[case] raw: &str) {
        assert_eq!(
            VfsPath::parse(raw),
            Err(FsError::InvalidPath(raw.to_string()))
        );
    }

    #[test]
    fn test_prefix_is_component_wise() {
        let tmp = VfsPath::parse("/tmp").unwrap();
        assert!(VfsPath::parse("/tmp/a").unwrap().starts_with(&tmp));
        assert!(VfsPath::parse("/tmp").unwrap().starts_with(&tmp));
        assert!(!VfsPath::parse("/tmpfoo").unwrap().starts_with(&tmp));
        assert!(VfsPath::parse("/anything").unwrap().starts_with(&VfsPath::root()));
    }

    #[test]
    fn test_strip_prefix() {
        let full = VfsPath::parse("/mnt/disk/a/b").unwrap();
        let mount = VfsPath::parse("/mnt/disk").unwrap();
        assert_eq!(full.strip_prefix(&mount).unwrap().to_string(), "/a/b");
        assert!(full.strip_prefix(&VfsPath::parse("/mnt/other").unwrap()).is_none());
        assert!(mount.strip_prefix(&mount).unwrap().is_root());
    }

    #[test]
    fn test_split_last() {
        let path = VfsPath::parse("/a/b/c.txt").unwrap();
        let (parent, name) = path.split_last().unwrap();
        assert_eq!(parent.to_string(), "/a/b");
        assert_eq!(name, "c.txt");
        assert!(VfsPath::root().split_last().is_none());
    }

    proptest! {
        #[test]
        fn prop_parse_is_idempotent(parts in prop::collection::vec("[a-z.]{1,4}", 0..8)) {
            let raw = parts.join("/");
            if let Ok(path) = VfsPath::parse(&raw) {
                let reparsed = VfsPath::parse(&path.to_string()).unwrap();
                prop_assert_eq!(reparsed, path);
            }
        }

        #[test]
        fn prop_normalized_paths_have_no_dot_components(parts in prop::collection::vec("[a-z.]{1,3}", 0..8)) {
            let raw = format!("/{}", parts.join("/"));
            if let Ok(path) = VfsPath::parse(&raw) {
                prop_assert!(path.components().iter().all(|c| c != "." && c != ".." && !c.is_empty()));
            }
        }
    }
}
