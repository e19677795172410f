//! Assembler pipeline
//!
//! Go assembly is processed twice: once up front to generate the symbol ABI
//! descriptor the compiler needs, and once per file after compilation (when
//! the compiler has written `go_asm.h`) to produce objects for the archive.

use crate::error::{BuildError, BuildResult};
use crate::sources::SourceFile;
use crate::tool::{abs, ToolCommand};
use gorules_config::Toolchain;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the header the compiler writes for assembly
pub const ASM_HEADER: &str = "go_asm.h";
/// Name of the symbol ABI descriptor
pub const SYMABIS: &str = "symabis";

const ASM_PATH_FLAGS: [&str; 3] = ["-I", "-o", "-trimpath"];

/// Include directories for assembly, sorted and de-duplicated
pub fn include_dirs(toolchain: &Toolchain, work_dir: &Path, headers: &[SourceFile]) -> Vec<PathBuf> {
    let mut dirs = BTreeSet::new();
    dirs.insert(abs(&toolchain.asm_include_dir()));
    dirs.insert(abs(work_dir));
    for header in headers {
        if let Some(parent) = header.path.parent() {
            dirs.insert(abs(parent));
        }
    }
    dirs.into_iter().collect()
}

/// Files generated for the compiler when a package has assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmArtifacts {
    /// Header the compiler fills in (`-asmhdr`)
    pub asm_header: PathBuf,
    /// Symbol ABI descriptor (`-symabis`)
    pub symabis: PathBuf,
}

/// Runs `go tool asm` for one package
pub struct Assembler<'a> {
    toolchain: &'a Toolchain,
    asm_flags: &'a [String],
    includes: Vec<PathBuf>,
}

impl<'a> Assembler<'a> {
    pub fn new(
        toolchain: &'a Toolchain,
        asm_flags: &'a [String],
        work_dir: &Path,
        headers: &[SourceFile],
    ) -> Self {
        Self {
            toolchain,
            asm_flags,
            includes: include_dirs(toolchain, work_dir, headers),
        }
    }

    pub fn includes(&self) -> &[PathBuf] {
        &self.includes
    }

    fn base_command(&self) -> ToolCommand {
        let mut cmd = ToolCommand::go_tool(self.toolchain, "asm");
        for inc in &self.includes {
            cmd = cmd.arg("-I").path_arg(inc);
        }
        cmd.args([
            "-D".to_string(),
            format!("GOOS_{}", self.toolchain.goos),
            "-D".to_string(),
            format!("GOARCH_{}", self.toolchain.goarch),
        ])
        .args(self.asm_flags.iter().cloned())
        .args(["-trimpath", "."])
    }

    /// `go tool asm -gensymabis` over every assembly source
    pub fn symabis_command(&self, srcs: &[SourceFile], out: &Path) -> ToolCommand {
        self.base_command()
            .arg("-gensymabis")
            .arg("-o")
            .path_arg(out)
            .arg("--")
            .args(srcs.iter().map(|s| s.path.display().to_string()))
            .absolutize(&ASM_PATH_FLAGS)
    }

    /// Create an empty `go_asm.h` and generate the symbol ABI descriptor
    pub fn gen_symabis(&self, srcs: &[SourceFile], work_dir: &Path) -> BuildResult<AsmArtifacts> {
        let asm_header = work_dir.join(ASM_HEADER);
        fs::write(&asm_header, b"").map_err(|e| BuildError::io(&asm_header, e))?;

        let symabis = work_dir.join(SYMABIS);
        self.symabis_command(srcs, &symabis).run()?;

        Ok(AsmArtifacts {
            asm_header,
            symabis,
        })
    }

    /// `go tool asm` for a single source
    pub fn assemble_command(&self, src: &Path, out: &Path) -> ToolCommand {
        self.base_command()
            .arg("-o")
            .path_arg(out)
            .arg("--")
            .path_arg(src)
            .absolutize(&ASM_PATH_FLAGS)
    }

    /// Assemble every source into `s<i>.o` in `work_dir`, in input order
    pub fn assemble_all(&self, srcs: &[SourceFile], work_dir: &Path) -> BuildResult<Vec<PathBuf>> {
        let mut objects = Vec::with_capacity(srcs.len());
        for (i, src) in srcs.iter().enumerate() {
            let out = work_dir.join(format!("s{}.o", i));
            self.assemble_command(&src.path, &out).run()?;
            objects.push(out);
        }
        Ok(objects)
    }
}
