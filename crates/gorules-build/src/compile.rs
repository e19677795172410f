//! Go compiler invocation

use crate::asm::AsmArtifacts;
use crate::error::BuildResult;
use crate::tool::{ToolCommand, PATH_FLAGS};
use gorules_config::Toolchain;
use std::path::{Path, PathBuf};

/// Inputs of one `go tool compile` run
#[derive(Debug, Clone)]
pub struct CompileInputs<'a> {
    /// Package path recorded in the archive (`-p`)
    pub package_path: &'a str,
    pub importcfg: &'a Path,
    /// Present when the package has assembly sources
    pub asm: Option<&'a AsmArtifacts>,
    pub gc_flags: &'a [String],
    pub output: &'a Path,
    pub srcs: &'a [PathBuf],
}

/// Build the compiler command line
pub fn compile_command(toolchain: &Toolchain, inputs: &CompileInputs<'_>) -> ToolCommand {
    let mut cmd = ToolCommand::go_tool(toolchain, "compile")
        .args(["-p", inputs.package_path])
        .arg("-importcfg")
        .path_arg(inputs.importcfg)
        .arg("-pack");

    if let Some(asm) = inputs.asm {
        cmd = cmd
            .arg("-asmhdr")
            .path_arg(&asm.asm_header)
            .arg("-symabis")
            .path_arg(&asm.symabis);
    }

    let mut flags = PATH_FLAGS.to_vec();
    flags.extend(["-asmhdr", "-symabis"]);

    cmd.args(inputs.gc_flags.iter().cloned())
        .arg("-o")
        .path_arg(inputs.output)
        .arg("--")
        .path_args(inputs.srcs)
        .absolutize(&flags)
}

/// Compile the package straight into its archive
pub fn compile(toolchain: &Toolchain, inputs: &CompileInputs<'_>) -> BuildResult<()> {
    compile_command(toolchain, inputs).run()?;
    Ok(())
}
