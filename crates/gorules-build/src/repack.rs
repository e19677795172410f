//! Foreign object repacking
//!
//! Object files from pre-built native archives are extracted into the work
//! directory so they can be merged into the package archive.

use crate::archive;
use crate::error::{BuildError, BuildResult};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Extracts object members from native archives, first name wins
#[derive(Debug, Default)]
pub struct ForeignObjects {
    seen: HashSet<String>,
    extracted: Vec<PathBuf>,
}

impl ForeignObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract the `.o` members of every archive in `archives` into `dir`
    pub fn extract_all(archives: &[PathBuf], dir: &Path) -> BuildResult<Vec<PathBuf>> {
        let mut objects = Self::new();
        for archive in archives {
            objects.extract(archive, dir)?;
        }
        Ok(objects.into_paths())
    }

    /// Extract the `.o` members of `archive` not already extracted
    pub fn extract(&mut self, archive: &Path, dir: &Path) -> BuildResult<()> {
        fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;

        for member in archive::read_members(archive)? {
            if !member.name.ends_with(".o") {
                continue;
            }
            let file_name = Path::new(&member.name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| BuildError::archive(archive, format!("bad member name '{}'", member.name)))?;
            if !self.seen.insert(file_name.clone()) {
                warn!(
                    archive = %archive.display(),
                    member = %file_name,
                    "skipping duplicate foreign object"
                );
                continue;
            }

            let out = dir.join(&file_name);
            fs::write(&out, &member.data).map_err(|e| BuildError::io(&out, e))?;
            self.extracted.push(out);
        }

        Ok(())
    }

    /// Extracted object paths in extraction order
    pub fn into_paths(self) -> Vec<PathBuf> {
        self.extracted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{write_archive, Member};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn native_archive(dir: &Path, name: &str, members: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let members: Vec<Member> = members.iter().map(|(n, d)| Member::new(*n, *d)).collect();
        write_archive(&path, &members).unwrap();
        path
    }

    #[test]
    fn test_extracts_only_objects() {
        let dir = TempDir::new().unwrap();
        let lib = native_archive(
            dir.path(),
            "libx.a",
            &[("x.o", "X"), ("README", "r"), ("y.o", "Y")],
        );
        let out = dir.path().join("foreign");

        let objects = ForeignObjects::extract_all(&[lib], &out).unwrap();
        assert_eq!(objects, vec![out.join("x.o"), out.join("y.o")]);
        assert_eq!(fs::read_to_string(out.join("y.o")).unwrap(), "Y");
    }

    #[test]
    fn test_same_archive_twice_contributes_once() {
        let dir = TempDir::new().unwrap();
        let lib = native_archive(dir.path(), "libx.a", &[("x.o", "X")]);
        let out = dir.path().join("foreign");

        let objects = ForeignObjects::extract_all(&[lib.clone(), lib], &out).unwrap();
        assert_eq!(objects, vec![out.join("x.o")]);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let dir = TempDir::new().unwrap();
        let first = native_archive(dir.path(), "liba.a", &[("util.o", "first")]);
        let second = native_archive(dir.path(), "libb.a", &[("util.o", "second"), ("b.o", "B")]);
        let out = dir.path().join("foreign");

        let objects = ForeignObjects::extract_all(&[first, second], &out).unwrap();
        assert_eq!(objects, vec![out.join("util.o"), out.join("b.o")]);
        assert_eq!(fs::read_to_string(out.join("util.o")).unwrap(), "first");
    }

    #[test]
    fn test_missing_archive_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = ForeignObjects::extract_all(&[dir.path().join("nope.a")], dir.path());
        assert!(matches!(result, Err(BuildError::Io { .. })));
    }
}
