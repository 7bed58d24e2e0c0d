//! reconciliation of desired parameter names against the store
//!
//! Names are compared per base path. A name belongs to a path when it lies below it in the hierarchy, so
//! `/App` covers `/App/Name` but not `/Application/Name`.
use crate::error::Result;
use crate::store::{ParameterStore, SsmClient};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathDiff {
    pub add: BTreeSet<String>,
    pub overwrite: BTreeSet<String>,
    pub remove: BTreeSet<String>,
}

impl PathDiff {
    /// Compare the desired names under `path` with the names that exist there
    pub fn compute(path: &str, desired: &BTreeSet<String>, existing: &BTreeSet<String>) -> Self {
        let desired: BTreeSet<String> = desired
            .iter()
            .filter(|name| is_under(name, path))
            .cloned()
            .collect();

        PathDiff {
            add: desired.difference(existing).cloned().collect(),
            overwrite: desired.intersection(existing).cloned().collect(),
            remove: existing.difference(&desired).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.overwrite.is_empty() && self.remove.is_empty()
    }
}

impl std::fmt::Display for PathDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sections = [
            ("ADD", &self.add),
            ("OVERWRITE", &self.overwrite),
            ("REMOVE", &self.remove),
        ];

        for (index, (title, names)) in sections.into_iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            writeln!(f, "*** PARAMETERS TO {title} ***")?;
            for name in names {
                writeln!(f, "{name}")?;
            }
        }
        Ok(())
    }
}

/// Whether `name` lies below `path`
pub fn is_under(name: &str, path: &str) -> bool {
    name.strip_prefix(path)
        .is_some_and(|rest| rest.starts_with('/'))
}

pub fn diff_path<S: ParameterStore>(
    client: &SsmClient<S>,
    path: &str,
    desired: &BTreeSet<String>,
) -> Result<PathDiff> {
    let existing: BTreeSet<String> = client.names_by_path(path)?.into_iter().collect();
    Ok(PathDiff::compute(path, desired, &existing))
}

/// Union of [diff_path] over all `paths`
///
/// Desired names outside of every path are always added; nothing outside the paths is ever removed.
pub fn diff_paths<S: ParameterStore>(
    client: &SsmClient<S>,
    paths: &[String],
    desired: &BTreeSet<String>,
) -> Result<PathDiff> {
    let mut diff = PathDiff::default();
    for path in paths {
        let path_diff = diff_path(client, path, desired)?;
        diff.add.extend(path_diff.add);
        diff.overwrite.extend(path_diff.overwrite);
        diff.remove.extend(path_diff.remove);
    }

    let outside = desired
        .iter()
        .filter(|name| !paths.iter().any(|path| is_under(name, path)));
    diff.add.extend(outside.cloned());

    Ok(diff)
}

/// Delete every parameter below `paths` that is not desired
///
/// Returns the deleted names.
pub fn flush<S: ParameterStore>(
    client: &mut SsmClient<S>,
    paths: &[String],
    desired: &BTreeSet<String>,
) -> Result<Vec<String>> {
    let mut deleted = vec![];
    for path in paths {
        tracing::info!(%path, "flushing base path");
        let diff = diff_path(client, path, desired)?;
        let remove: Vec<String> = diff.remove.into_iter().collect();
        deleted.extend(client.delete(&remove)?);
    }
    Ok(deleted)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn hierarchy_aware_prefix() {
        assert!(is_under("/App/Name", "/App"));
        assert!(is_under("/App/Nested/Name", "/App"));
        assert!(!is_under("/Application/Name", "/App"));
        assert!(!is_under("/App", "/App"));
        assert!(is_under("/App", ""));
    }

    #[test]
    fn compute() {
        let diff = PathDiff::compute(
            "/a",
            &set(&["/a/new", "/a/kept", "/b/elsewhere"]),
            &set(&["/a/kept", "/a/old"]),
        );

        assert_eq!(
            diff,
            PathDiff {
                add: set(&["/a/new"]),
                overwrite: set(&["/a/kept"]),
                remove: set(&["/a/old"]),
            }
        );
    }

    #[test]
    fn display() {
        let diff = PathDiff {
            add: set(&["/a/x", "/c/z"]),
            overwrite: set(&[]),
            remove: set(&["/a/old"]),
        };

        assert_eq!(
            diff.to_string(),
            "*** PARAMETERS TO ADD ***\n/a/x\n/c/z\n\n*** PARAMETERS TO OVERWRITE ***\n\n*** PARAMETERS TO REMOVE ***\n/a/old\n"
        );
    }
}
