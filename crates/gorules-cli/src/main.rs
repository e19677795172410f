use anyhow::Result;
use clap::Parser;
use gorules_build::CompileAction;
use gorules_config::{CoverMode, Dependency, MergeStrategy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;

/// Compile one Go package into a single archive.
///
/// Filters the sources for the target platform, checks imports against the
/// declared dependencies, optionally instruments sources for coverage, runs
/// the static analyzer alongside the compiler, assembles `.s` files and
/// repacks objects from native archives into the output.
///
/// Settings come from an optional TOML action file (`--config`); flags
/// override or extend its values.
///
/// EXAMPLES:
///     compilepkg --config action.toml
///     compilepkg -p example.com/p -o p.a --go /usr/local/go/bin/go \
///         --goroot /usr/local/go --src a.go --src b.go
#[derive(Parser, Debug)]
#[command(name = "compilepkg")]
#[command(version)]
pub struct Cli {
    /// TOML action file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Source file (.go, .s, .h, .c, ...); repeatable
    #[arg(long = "src", value_name = "FILE")]
    pub srcs: Vec<PathBuf>,

    /// Go source to instrument for coverage; must also be a --src
    #[arg(long = "cover", value_name = "FILE")]
    pub cover: Vec<PathBuf>,

    /// Direct dependency
    #[arg(long = "arc", value_name = "IMPORTPATH=PACKAGEPATH=FILE[=FACTS]")]
    pub arcs: Vec<Dependency>,

    /// Native archive whose objects are repacked into the output
    #[arg(long = "cgoarc", value_name = "FILE")]
    pub cgo_archives: Vec<PathBuf>,

    /// Import path of the package (defaults to the package path)
    #[arg(long = "importpath")]
    pub import_path: Option<String>,

    /// Package path passed to the compiler
    #[arg(short = 'p', long = "package-path")]
    pub package_path: Option<String>,

    /// Static analyzer binary
    #[arg(long, value_name = "FILE")]
    pub nogo: Option<PathBuf>,

    /// File listing standard library packages, one per line
    #[arg(long = "package-list", value_name = "FILE")]
    pub package_list: Option<PathBuf>,

    /// Coverage mode (set, count, atomic)
    #[arg(long = "cover-mode")]
    pub cover_mode: Option<CoverMode>,

    /// Output archive
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Analysis facts output
    #[arg(short = 'x', long = "facts-output", value_name = "FILE")]
    pub facts_output: Option<PathBuf>,

    /// Test package filter (off, only, exclude)
    #[arg(long = "testfilter")]
    pub test_filter: Option<String>,

    /// Extra compiler flags, whitespace separated; repeatable
    #[arg(long = "gcflags", allow_hyphen_values = true)]
    pub gc_flags: Vec<String>,

    /// Extra assembler flags, whitespace separated; repeatable
    #[arg(long = "asmflags", allow_hyphen_values = true)]
    pub asm_flags: Vec<String>,

    /// Path to the go binary
    #[arg(long, value_name = "FILE")]
    pub go: Option<PathBuf>,

    /// GOROOT of the toolchain
    #[arg(long, value_name = "DIR")]
    pub goroot: Option<PathBuf>,

    /// Target operating system
    #[arg(long)]
    pub goos: Option<String>,

    /// Target architecture
    #[arg(long)]
    pub goarch: Option<String>,

    /// Enable cgo (satisfies the `cgo` build tag)
    #[arg(long)]
    pub cgo: bool,

    /// Standard library install suffix
    #[arg(long = "installsuffix")]
    pub install_suffix: Option<String>,

    /// Extra build tags, comma separated
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Compiler cache directory (GOCACHE)
    #[arg(long, value_name = "DIR")]
    pub gocache: Option<PathBuf>,

    /// Directory the temporary work directory is created in
    #[arg(long = "workdir-root", value_name = "DIR")]
    pub workdir_root: Option<PathBuf>,

    /// How objects are merged into the archive (native, pack)
    #[arg(long)]
    pub merge: Option<MergeStrategy>,

    /// Log every tool invocation
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Print a JSON summary of the produced outputs
    #[arg(long)]
    pub json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format!("{:#}", e).trim_end());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = config::build_configuration(cli)?;
    let outcome = CompileAction::new(&config).run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
