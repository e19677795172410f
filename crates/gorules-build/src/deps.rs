//! Strict dependency checking and import configuration
//!
//! Every import of the filtered Go sources must name a standard library
//! package or a declared direct dependency. The resolved set is turned into
//! the `importcfg` file the compiler and analyzer resolve imports through.

use crate::error::{BuildError, BuildResult, MissingDependencies};
use crate::sources::SourceFile;
use gorules_config::{Dependency, Toolchain};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Imports handled by the compiler itself
pub const PSEUDO_IMPORTS: [&str; 3] = ["C", "unsafe", "runtime/cgo"];

/// Imports of a package split by where they resolve
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedImports {
    /// Standard library imports, first-seen order
    pub std_imports: Vec<String>,
    /// Dependency imports, first-seen order
    pub dep_imports: Vec<String>,
}

/// Check that every import of `files` is standard library or a direct dependency
pub fn check_direct_deps(
    files: &[SourceFile],
    deps: &[Dependency],
    std_packages: &[String],
) -> BuildResult<ResolvedImports> {
    let std_set: HashSet<&str> = std_packages.iter().map(String::as_str).collect();
    let dep_set: HashSet<&str> = deps.iter().map(|d| d.import_path.as_str()).collect();

    let mut resolved = ResolvedImports::default();
    let mut seen = HashSet::new();
    let mut missing = Vec::new();

    for file in files {
        for import in &file.imports {
            let import = import.as_str();
            if PSEUDO_IMPORTS.contains(&import) {
                continue;
            }
            if std_set.contains(import) {
                if seen.insert(import) {
                    resolved.std_imports.push(import.to_string());
                }
            } else if dep_set.contains(import) {
                if seen.insert(import) {
                    resolved.dep_imports.push(import.to_string());
                }
            } else {
                missing.push((file.path.clone(), import.to_string()));
            }
        }
    }

    if !missing.is_empty() {
        return Err(BuildError::MissingDependencies(MissingDependencies {
            missing,
            known: deps.iter().map(|d| d.import_path.clone()).collect(),
        }));
    }

    Ok(resolved)
}

/// Render the compiler import configuration
pub fn render_importcfg(
    toolchain: &Toolchain,
    std_imports: &[String],
    deps: &[Dependency],
) -> String {
    let std_dir = toolchain.std_pkg_dir();
    let mut cfg = String::from("# import config\n");

    for import in std_imports {
        let archive = std_dir.join(format!("{}.a", import));
        let _ = writeln!(cfg, "packagefile {}={}", import, archive.display());
    }
    for dep in deps {
        if dep.import_path != dep.package_path {
            let _ = writeln!(cfg, "importmap {}={}", dep.import_path, dep.package_path);
        }
        let _ = writeln!(
            cfg,
            "packagefile {}={}",
            dep.package_path,
            crate::tool::abs(&dep.archive).display()
        );
    }

    cfg
}

/// Write the import configuration into `dir`
pub fn write_importcfg(
    dir: &Path,
    toolchain: &Toolchain,
    std_imports: &[String],
    deps: &[Dependency],
) -> BuildResult<PathBuf> {
    let path = dir.join("importcfg");
    fs::write(&path, render_importcfg(toolchain, std_imports, deps))
        .map_err(|e| BuildError::io(&path, e))?;
    Ok(path)
}
