//! Source classification
//!
//! Splits the unordered source list of a package into Go, assembly, header
//! and other (C/C++/Objective-C) files, drops files whose build constraints
//! do not match the target, and applies the test package filter.

use crate::constraints::TagSet;
use crate::error::{BuildError, BuildResult};
use crate::header;
use gorules_config::TestFilter;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kind of a source file, inferred from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Go source
    Go,
    /// Go assembly
    Assembly,
    /// C header, visible to assembly
    Header,
    /// C, C++ or Objective-C source
    Other,
}

impl SourceKind {
    /// Kind for a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "go" => Some(Self::Go),
            "s" | "S" => Some(Self::Assembly),
            "h" | "hh" | "hpp" | "hxx" => Some(Self::Header),
            "c" | "cc" | "cpp" | "cxx" | "m" | "mm" => Some(Self::Other),
            _ => None,
        }
    }

    /// Kind for a path
    pub fn of(path: &Path) -> BuildResult<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| BuildError::UnrecognizedExtension(path.to_path_buf()))
    }
}

/// A classified source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
    /// Declared package, Go files only
    pub package: Option<String>,
    /// Import paths, Go files only
    pub imports: Vec<String>,
    /// Whether build constraints match the target
    pub matched: bool,
}

impl SourceFile {
    /// Read and classify one file
    pub fn read(path: &Path, tags: &TagSet) -> BuildResult<Self> {
        let kind = SourceKind::of(path)?;
        let content = fs::read(path).map_err(|e| BuildError::io(path, e))?;
        let content = String::from_utf8_lossy(&content);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let matched = tags.matches_file_name(&file_name)
            && tags
                .matches_header(&content)
                .map_err(|reason| BuildError::source_parse(path, reason))?;

        let (package, imports) = if kind == SourceKind::Go {
            let header =
                header::scan(&content).map_err(|e| BuildError::source_parse(path, e))?;
            let imports = header.import_paths().map(str::to_string).collect();
            (Some(header.package), imports)
        } else {
            (None, Vec::new())
        };

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            package,
            imports,
            matched,
        })
    }

    /// Declared package name, empty for non-Go files
    pub fn package_name(&self) -> &str {
        self.package.as_deref().unwrap_or("")
    }
}

/// Sources of a package split by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedSources {
    pub go: Vec<SourceFile>,
    pub assembly: Vec<SourceFile>,
    pub headers: Vec<SourceFile>,
    pub other: Vec<SourceFile>,
}

impl ClassifiedSources {
    /// Classify `paths`, keeping only files that match the target
    pub fn classify(paths: &[PathBuf], tags: &TagSet) -> BuildResult<Self> {
        let mut sources = Self::default();

        for path in paths {
            let file = SourceFile::read(path, tags)?;
            if !file.matched {
                debug!(path = %path.display(), "skipping source excluded by build constraints");
                continue;
            }
            let list = match file.kind {
                SourceKind::Go => &mut sources.go,
                SourceKind::Assembly => &mut sources.assembly,
                SourceKind::Header => &mut sources.headers,
                SourceKind::Other => &mut sources.other,
            };
            list.push(file);
        }

        Ok(sources)
    }

    /// Restrict Go sources according to the test filter
    pub fn apply_test_filter(&mut self, filter: TestFilter) {
        self.go.retain(|f| filter.keeps(f.package_name()));
    }

    /// Paths of the Go sources
    pub fn go_paths(&self) -> Vec<PathBuf> {
        self.go.iter().map(|f| f.path.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gorules_config::Toolchain;
    use rstest::rstest;
    use tempfile::TempDir;

    fn tags() -> TagSet {
        TagSet::for_toolchain(&Toolchain::new("go", "/goroot"))
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[rstest]
    #[case("a.go", SourceKind::Go)]
    #[case("a.s", SourceKind::Assembly)]
    #[case("a.S", SourceKind::Assembly)]
    #[case("a.h", SourceKind::Header)]
    #[case("a.cc", SourceKind::Other)]
    #[case("a.m", SourceKind::Other)]
    fn test_kind_from_path(#[case] name: &str, #[case] kind: SourceKind) {
        assert_eq!(SourceKind::of(Path::new(name)).unwrap(), kind);
    }

    #[test]
    fn test_unrecognized_extension_names_path() {
        let err = SourceKind::of(Path::new("dir/data.txt")).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized file extension: dir/data.txt");
    }

    #[test]
    fn test_classify_splits_and_filters() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write(&dir, "a.go", "package p\n\nimport \"fmt\"\n"),
            write(&dir, "a_windows.go", "package p\n"),
            write(&dir, "ignored.go", "//go:build ignore\n\npackage main\n"),
            write(&dir, "add_amd64.s", "TEXT ·add(SB),0,$0\n"),
            write(&dir, "defs.h", "#define X 1\n"),
            write(&dir, "impl.c", "int x;\n"),
        ];

        let sources = ClassifiedSources::classify(&paths, &tags()).unwrap();
        assert_eq!(sources.go.len(), 1);
        assert_eq!(sources.go[0].package_name(), "p");
        assert_eq!(sources.go[0].imports, vec!["fmt"]);
        assert_eq!(sources.assembly.len(), 1);
        assert_eq!(sources.headers.len(), 1);
        assert_eq!(sources.other.len(), 1);
    }

    #[test]
    fn test_classify_fails_fast_on_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write(&dir, "a.go", "package p\n"),
            write(&dir, "notes.txt", "hello"),
        ];
        let err = ClassifiedSources::classify(&paths, &tags()).unwrap_err();
        assert!(matches!(err, BuildError::UnrecognizedExtension(p) if p.ends_with("notes.txt")));
    }

    #[rstest]
    #[case(TestFilter::Off, &["a.go", "a_test.go"])]
    #[case(TestFilter::Only, &["a_test.go"])]
    #[case(TestFilter::Exclude, &["a.go"])]
    fn test_test_filter(#[case] filter: TestFilter, #[case] expected: &[&str]) {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write(&dir, "a.go", "package p\n"),
            write(&dir, "a_test.go", "package p_test\n"),
        ];
        let mut sources = ClassifiedSources::classify(&paths, &tags()).unwrap();
        sources.apply_test_filter(filter);

        let names: Vec<String> = sources
            .go
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_filter_may_leave_no_sources() {
        let dir = TempDir::new().unwrap();
        let paths = vec![write(&dir, "a.go", "package p\n")];
        let mut sources = ClassifiedSources::classify(&paths, &tags()).unwrap();
        sources.apply_test_filter(TestFilter::Only);
        assert!(sources.go.is_empty());
    }
}
