//! The package compile action
//!
//! One [`CompileAction`] turns a package's sources into a single archive:
//!
//! ```text
//! classify -> resolve deps -> [instrument] -> compile || analyze
//!          -> [assemble + merge] -> [repack + merge] -> join analyzer
//! ```
//!
//! The first failing stage ends the action. Intermediate files live in a
//! private work directory that is removed when the action returns, after any
//! still-running analyzer has been stopped.

use crate::analyzer::{analyzer_command, AnalyzerInputs, AnalyzerTask};
use crate::asm::Assembler;
use crate::compile::{compile, CompileInputs};
use crate::constraints::TagSet;
use crate::cover::Instrumenter;
use crate::deps::{check_direct_deps, write_importcfg};
use crate::error::{BuildError, BuildResult};
use crate::merge::ArchiveMerger;
use crate::repack::ForeignObjects;
use crate::sources::{ClassifiedSources, SourceFile, SourceKind};
use crate::tool::abs;
use gorules_config::CompileConfiguration;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info};

/// Placeholder compiled when filtering leaves no Go sources
pub const EMPTY_SOURCE_NAME: &str = "_empty.go";
const EMPTY_SOURCE: &str = "package empty\n";

const WORK_DIR_PREFIX: &str = "gorules_work-";

/// Summary of a successful action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    /// The package archive
    pub archive: PathBuf,
    /// Analyzer facts, when an analyzer ran
    pub facts: Option<PathBuf>,
    /// Go sources compiled, including any placeholder
    pub go_sources: usize,
    pub instrumented: usize,
    pub assembly_objects: usize,
    pub foreign_objects: usize,
    /// Analyzer output of a passing run
    #[serde(skip_serializing_if = "String::is_empty")]
    pub analysis_output: String,
    pub elapsed_ms: u64,
}

/// Compiles one package according to a [`CompileConfiguration`]
pub struct CompileAction<'a> {
    config: &'a CompileConfiguration,
}

impl<'a> CompileAction<'a> {
    pub fn new(config: &'a CompileConfiguration) -> Self {
        Self { config }
    }

    /// Run every stage, producing the archive at the configured output
    pub fn run(&self) -> BuildResult<ActionOutcome> {
        let started = Instant::now();
        let config = self.config;
        config.validate()?;
        let toolchain = &config.toolchain;
        let import_path = config.effective_import_path();
        let output = abs(&config.output);

        info!(package = %config.package_path, output = %output.display(), "compiling package");

        let tags = TagSet::for_toolchain(toolchain);
        let mut sources = ClassifiedSources::classify(&config.sources, &tags)?;
        sources.apply_test_filter(config.test_filter);
        debug!(
            go = sources.go.len(),
            asm = sources.assembly.len(),
            headers = sources.headers.len(),
            test_filter = %config.test_filter,
            "classified sources"
        );

        // Declared before the analyzer so the analyzer is stopped first.
        let work = create_work_dir(toolchain.work_dir_root.as_deref())?;
        let work_dir = work.path();

        if sources.go.is_empty() {
            sources.go.push(empty_placeholder(work_dir)?);
        }

        let resolved = check_direct_deps(&sources.go, &config.dependencies, &config.std_packages)?;
        let importcfg = write_importcfg(
            work_dir,
            toolchain,
            &resolved.std_imports,
            &config.dependencies,
        )?;

        let mut go_srcs = sources.go_paths();
        let mut instrumented = 0;
        if let Some(coverage) = &config.coverage {
            instrumented = Instrumenter::new(toolchain, coverage, import_path, work_dir)
                .instrument_all(&mut go_srcs)?;
        }

        create_parent_dir(&output)?;

        let analyzer = match (&config.analyzer, &config.facts_output) {
            (Some(analyzer), Some(facts_output)) => {
                create_parent_dir(facts_output)?;
                let cmd = analyzer_command(&AnalyzerInputs {
                    binary: &analyzer.binary,
                    package_path: &config.package_path,
                    importcfg: &importcfg,
                    std_imports: &resolved.std_imports,
                    facts: config
                        .dependencies
                        .iter()
                        .filter_map(|d| {
                            d.facts.as_ref().map(|f| (d.import_path.clone(), f.clone()))
                        })
                        .collect(),
                    facts_output,
                    srcs: &go_srcs,
                });
                Some(AnalyzerTask::spawn(
                    cmd,
                    facts_output.clone(),
                    work_dir.join("nogo.out"),
                )?)
            }
            _ => None,
        };

        let assembler = if sources.assembly.is_empty() {
            None
        } else {
            Some(Assembler::new(
                toolchain,
                &config.asm_flags,
                work_dir,
                &sources.headers,
            ))
        };
        let asm_artifacts = match &assembler {
            Some(assembler) => Some(assembler.gen_symabis(&sources.assembly, work_dir)?),
            None => None,
        };

        compile(
            toolchain,
            &CompileInputs {
                package_path: &config.package_path,
                importcfg: &importcfg,
                asm: asm_artifacts.as_ref(),
                gc_flags: &config.gc_flags,
                output: &output,
                srcs: &go_srcs,
            },
        )?;

        let merger = ArchiveMerger::new(config.merge, toolchain);

        let mut assembly_objects = 0;
        if let Some(assembler) = &assembler {
            let objects = assembler.assemble_all(&sources.assembly, work_dir)?;
            merger.append(&output, &objects)?;
            assembly_objects = objects.len();
        }

        let mut foreign_objects = 0;
        if !config.native_archives.is_empty() {
            let objects =
                ForeignObjects::extract_all(&config.native_archives, &work_dir.join("foreign"))?;
            merger.append(&output, &objects)?;
            foreign_objects = objects.len();
        }

        let mut facts = None;
        let mut analysis_output = String::new();
        if let Some(task) = analyzer {
            let result = task.join()?;
            if !result.success {
                return Err(BuildError::Analysis(result.failure_message()));
            }
            facts = Some(result.facts);
            analysis_output = result.output;
        }

        let outcome = ActionOutcome {
            archive: output,
            facts,
            go_sources: go_srcs.len(),
            instrumented,
            assembly_objects,
            foreign_objects,
            analysis_output,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            archive = %outcome.archive.display(),
            elapsed_ms = outcome.elapsed_ms,
            "package compiled"
        );
        Ok(outcome)
    }
}

fn create_work_dir(root: Option<&Path>) -> BuildResult<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(WORK_DIR_PREFIX);
    match root {
        Some(root) => {
            fs::create_dir_all(root).map_err(|e| BuildError::io(root, e))?;
            builder.tempdir_in(root).map_err(|e| BuildError::io(root, e))
        }
        None => builder
            .tempdir()
            .map_err(|e| BuildError::io(std::env::temp_dir(), e)),
    }
}

fn empty_placeholder(work_dir: &Path) -> BuildResult<SourceFile> {
    let path = work_dir.join(EMPTY_SOURCE_NAME);
    fs::write(&path, EMPTY_SOURCE).map_err(|e| BuildError::io(&path, e))?;
    Ok(SourceFile {
        path,
        kind: SourceKind::Go,
        package: Some("empty".to_string()),
        imports: Vec::new(),
        matched: true,
    })
}

fn create_parent_dir(path: &Path) -> BuildResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))
        }
        _ => Ok(()),
    }
}
