//! Go package compile action
//!
//! Builds a single Go package into one archive:
//! - Source classification with build constraints and test filtering
//! - Strict direct-dependency checking and `importcfg` generation
//! - Coverage instrumentation
//! - Static analysis running concurrently with compilation
//! - Go assembly with symbol ABI generation
//! - Repacking of objects from pre-built native archives
//! - Native or `go tool pack` archive merging

pub mod action;
pub mod analyzer;
pub mod archive;
pub mod asm;
pub mod compile;
pub mod constraints;
pub mod cover;
pub mod deps;
pub mod error;
pub mod header;
pub mod merge;
pub mod repack;
pub mod sources;
pub mod tool;

// Re-export main types
pub use action::{ActionOutcome, CompileAction};
pub use analyzer::{AnalysisResult, AnalyzerTask};
pub use archive::Member;
pub use asm::{AsmArtifacts, Assembler};
pub use constraints::TagSet;
pub use cover::Instrumenter;
pub use deps::ResolvedImports;
pub use error::{BuildError, BuildResult, MissingDependencies, ToolError};
pub use merge::ArchiveMerger;
pub use repack::ForeignObjects;
pub use sources::{ClassifiedSources, SourceFile, SourceKind};
pub use tool::ToolCommand;

pub use gorules_config::{CompileConfiguration, Toolchain};
