//! Archive merge primitive
//!
//! Appends a batch of object files to the already-compiled package archive.
//! Used once for assembled objects and once for repacked foreign objects,
//! always in that order.

use crate::archive;
use crate::error::BuildResult;
use crate::tool::ToolCommand;
use gorules_config::{MergeStrategy, Toolchain};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Appends object batches to an archive
pub struct ArchiveMerger<'a> {
    strategy: MergeStrategy,
    toolchain: &'a Toolchain,
}

impl<'a> ArchiveMerger<'a> {
    pub fn new(strategy: MergeStrategy, toolchain: &'a Toolchain) -> Self {
        Self {
            strategy,
            toolchain,
        }
    }

    /// Append `objects` to `archive`, keeping every prior member
    pub fn append(&self, archive: &Path, objects: &[PathBuf]) -> BuildResult<()> {
        if objects.is_empty() {
            return Ok(());
        }
        debug!(
            archive = %archive.display(),
            count = objects.len(),
            strategy = ?self.strategy,
            "appending objects"
        );

        match self.strategy {
            MergeStrategy::Native => archive::append_files(archive, objects),
            MergeStrategy::Pack => {
                self.pack_command(archive, objects).run()?;
                Ok(())
            }
        }
    }

    /// `go tool pack r <archive> <objects>`
    pub fn pack_command(&self, archive: &Path, objects: &[PathBuf]) -> ToolCommand {
        ToolCommand::go_tool(self.toolchain, "pack")
            .arg("r")
            .path_arg(archive)
            .path_args(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{member_names, write_archive, Member};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_native_merge_batches_accumulate() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("p.a");
        write_archive(&target, &[Member::new("__.PKGDEF", "x")]).unwrap();
        let obj = |name: &str| {
            let path = dir.path().join(name);
            fs::write(&path, name).unwrap();
            path
        };

        let toolchain = Toolchain::new("go", "/goroot");
        let merger = ArchiveMerger::new(MergeStrategy::Native, &toolchain);
        merger.append(&target, &[obj("s0.o"), obj("s1.o")]).unwrap();
        merger.append(&target, &[]).unwrap();
        merger.append(&target, &[obj("c.o")]).unwrap();

        assert_eq!(
            member_names(&target).unwrap(),
            vec!["__.PKGDEF", "s0.o", "s1.o", "c.o"]
        );
    }

    #[test]
    fn test_pack_command_line() {
        let toolchain = Toolchain::new("/go/bin/go", "/go");
        let merger = ArchiveMerger::new(MergeStrategy::Pack, &toolchain);
        let cmd = merger.pack_command(
            Path::new("/out/p.a"),
            &[PathBuf::from("/w/s0.o"), PathBuf::from("/w/s1.o")],
        );
        assert_eq!(cmd.tool_args(), ["r", "/out/p.a", "/w/s0.o", "/w/s1.o"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_pack_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("p.a");
        write_archive(&target, &[]).unwrap();
        let obj = dir.path().join("s0.o");
        fs::write(&obj, "o").unwrap();

        // `false tool pack r ...` exits nonzero
        let toolchain = Toolchain::new("false", "/go");
        let merger = ArchiveMerger::new(MergeStrategy::Pack, &toolchain);
        assert!(merger.append(&target, &[obj]).is_err());
    }
}
