//! Coverage instrumentation
//!
//! Selected Go sources are rewritten by `go tool cover` into the work
//! directory and then registered with the coverage data package, so the
//! rewritten file is a drop-in replacement for the input file.

use crate::error::{BuildError, BuildResult};
use crate::header;
use crate::tool::ToolCommand;
use gorules_config::{Coverage, Toolchain};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local name the coverage data package is imported under
const COVERDATA_ALIAS: &str = "_cover_coverdata";

/// Replace every byte outside `[A-Za-z0-9_]` with `_`
pub fn sanitize_identifier(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Counter variable for `src` in the package at `import_path`
///
/// Built from the whole source path without its `.go` extension, so sources
/// sharing a base name in different directories get distinct variables.
pub fn cover_var(import_path: &str, src: &Path) -> String {
    let src = src.to_string_lossy();
    let src = src.strip_suffix(".go").unwrap_or(&src);
    format!(
        "Cover_{}_{}",
        sanitize_identifier(import_path),
        sanitize_identifier(src)
    )
}

/// Name the file is registered under: `<importpath>/<basename>`
pub fn registered_name(import_path: &str, src: &Path) -> String {
    let base = src
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if import_path.is_empty() {
        base
    } else {
        format!("{}/{}", import_path.trim_end_matches('/'), base)
    }
}

/// Instruments the selected sources of one package
pub struct Instrumenter<'a> {
    toolchain: &'a Toolchain,
    coverage: &'a Coverage,
    import_path: &'a str,
    work_dir: &'a Path,
}

impl<'a> Instrumenter<'a> {
    pub fn new(
        toolchain: &'a Toolchain,
        coverage: &'a Coverage,
        import_path: &'a str,
        work_dir: &'a Path,
    ) -> Self {
        Self {
            toolchain,
            coverage,
            import_path,
            work_dir,
        }
    }

    /// Replace every selected source in `srcs` with its instrumented copy,
    /// returning how many were replaced
    pub fn instrument_all(&self, srcs: &mut [PathBuf]) -> BuildResult<usize> {
        let selected: HashSet<&Path> = self.coverage.sources.iter().map(PathBuf::as_path).collect();
        let mut instrumented = 0;
        for (i, src) in srcs.iter_mut().enumerate() {
            if !selected.contains(src.as_path()) {
                continue;
            }
            let out = self.work_dir.join(format!("cover_{}.go", i));
            self.instrument(src, &out)?;
            *src = out;
            instrumented += 1;
        }
        Ok(instrumented)
    }

    /// Rewrite `src` into `out`
    pub fn instrument(&self, src: &Path, out: &Path) -> BuildResult<()> {
        let var = cover_var(self.import_path, src);
        debug!(src = %src.display(), var = %var, "instrumenting for coverage");

        ToolCommand::go_tool(self.toolchain, "cover")
            .args(["-var", var.as_str(), "-mode", self.coverage.mode.name()])
            .arg("-o")
            .path_arg(out)
            .path_arg(src)
            .run()
            .map_err(|e| BuildError::instrumentation(src, e))?;

        let rewritten = fs::read_to_string(out).map_err(|e| BuildError::io(out, e))?;
        let registered = register_coverage(
            &rewritten,
            &var,
            &registered_name(self.import_path, src),
            &self.coverage.coverdata_import,
        )
        .map_err(|reason| BuildError::instrumentation(src, reason))?;
        fs::write(out, registered).map_err(|e| BuildError::io(out, e))
    }
}

/// Add the coverage data import and an `init` registering `var`
///
/// The import goes on the package clause line so line numbers are unchanged.
pub fn register_coverage(
    src: &str,
    var: &str,
    name: &str,
    coverdata_import: &str,
) -> Result<String, String> {
    let header = header::scan(src).map_err(|e| e.to_string())?;

    let mut out = String::with_capacity(src.len() + 256);
    out.push_str(&src[..header.package_end]);
    out.push_str(&format!(
        "; import {} {:?}",
        COVERDATA_ALIAS, coverdata_import
    ));
    out.push_str(&src[header.package_end..]);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!(
        "\nfunc init() {{\n\t{alias}.RegisterFile({name:?},\n\t\t{var}.Count[:],\n\t\t{var}.Pos[:],\n\t\t{var}.NumStmt[:])\n}}\n",
        alias = COVERDATA_ALIAS,
        name = name,
        var = var,
    ));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("example.com/a-b/c", "src/x.go", "Cover_example_com_a_b_c_src_x")]
    #[case("p", "dir/my-file.v2.go", "Cover_p_dir_my_file_v2")]
    #[case("p", "/abs/a.go", "Cover_p__abs_a")]
    #[case("", "a.go", "Cover__a")]
    fn test_cover_var(#[case] import_path: &str, #[case] src: &str, #[case] expected: &str) {
        assert_eq!(cover_var(import_path, Path::new(src)), expected);
    }

    #[test]
    fn test_cover_var_distinguishes_same_base_name() {
        let src = cover_var("example.com/p", Path::new("src/x.go"));
        let generated = cover_var("example.com/p", Path::new("gen/x.go"));
        assert_ne!(src, generated);
    }

    #[test]
    fn test_cover_var_is_deterministic() {
        let a = cover_var("example.com/p", Path::new("/x/y/a.go"));
        let b = cover_var("example.com/p", Path::new("/x/y/a.go"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_registered_name() {
        assert_eq!(
            registered_name("example.com/p", Path::new("src/p/a.go")),
            "example.com/p/a.go"
        );
        assert_eq!(registered_name("", Path::new("a.go")), "a.go");
    }

    #[test]
    fn test_register_coverage_preserves_lines() {
        let src = "//line a.go:1\npackage p\n\nimport \"fmt\"\n\nvar Cover_p_a = struct{}{}\n";
        let out = register_coverage(src, "Cover_p_a", "example.com/p/a.go", "example.com/coverdata")
            .unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[1],
            "package p; import _cover_coverdata \"example.com/coverdata\""
        );
        assert_eq!(lines[3], "import \"fmt\"");
        assert!(out.contains("_cover_coverdata.RegisterFile(\"example.com/p/a.go\","));
        assert!(out.contains("Cover_p_a.NumStmt[:])"));
    }

    #[test]
    fn test_register_coverage_rejects_garbage() {
        assert!(register_coverage("not go", "V", "n", "c").is_err());
    }
}
