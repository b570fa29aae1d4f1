//! Path exclusion for bundle packing.
//!
//! Exclusions are absolute paths of files or directories. A directory
//! exclusion prunes traversal; a file is skipped when it equals an excluded
//! path or lies under an excluded directory.

use std::path::{Path, PathBuf};

/// Set of paths left out of a packed bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    paths: Vec<PathBuf>,
}

impl ExclusionSet {
    /// Creates an empty exclusion set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from optional paths, skipping absent entries.
    pub fn from_optional<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = Option<P>>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().flatten().map(Into::into).collect(),
        }
    }

    /// Adds a path to the set.
    pub fn with(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Returns true if the path is excluded or lies under an excluded directory.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.paths.iter().any(|excluded| path.starts_with(excluded))
    }

    /// Returns true if an excluded path lies strictly under `dir`.
    pub fn has_excluded_under(&self, dir: &Path) -> bool {
        self.paths
            .iter()
            .any(|excluded| excluded != dir && excluded.starts_with(dir))
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_entries_are_skipped() {
        let set = ExclusionSet::from_optional(vec![
            Some("/work/module_1/terraform"),
            None,
            Some("/work/module_1/.terraform/plugins"),
        ]);
        assert_eq!(set.paths().len(), 2);
    }

    #[test]
    fn test_file_and_directory_matching() {
        let set = ExclusionSet::new()
            .with("/work/module_1/terraform")
            .with("/work/module_1/.terraform");

        assert!(set.is_excluded(Path::new("/work/module_1/terraform")));
        assert!(set.is_excluded(Path::new("/work/module_1/.terraform")));
        assert!(set.is_excluded(Path::new(
            "/work/module_1/.terraform/plugins/aws/provider"
        )));
        assert!(!set.is_excluded(Path::new("/work/module_1/main.tf")));
    }

    #[test]
    fn test_prefix_match_is_component_wise() {
        let set = ExclusionSet::new().with("/work/module_1/terraform");
        assert!(!set.is_excluded(Path::new("/work/module_1/terraform.tfstate")));
    }

    #[test]
    fn test_excluded_path_under_directory() {
        let set = ExclusionSet::new().with("/work/module_1/tools/plugins");
        assert!(set.has_excluded_under(Path::new("/work/module_1/tools")));
        assert!(!set.has_excluded_under(Path::new("/work/module_1/tools/plugins")));
        assert!(!set.has_excluded_under(Path::new("/work/module_1/templates")));
    }

    #[test]
    fn test_empty_set_excludes_nothing() {
        let set = ExclusionSet::from_optional(Vec::<Option<PathBuf>>::new());
        assert!(set.is_empty());
        assert!(!set.is_excluded(Path::new("/anything")));
    }
}
