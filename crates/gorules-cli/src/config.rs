//! Assemble a `CompileConfiguration` from the action file and flags

use crate::Cli;
use anyhow::{anyhow, bail, Context, Result};
use gorules_config::{Analyzer, CompileConfiguration, Coverage, TestFilter, Toolchain};

/// Build the configuration: action file first, then flags on top
pub fn build_configuration(cli: &Cli) -> Result<CompileConfiguration> {
    let mut config = match &cli.config {
        Some(path) => CompileConfiguration::parse_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => from_flags(cli)?,
    };

    apply_overrides(&mut config, cli)?;
    config.resolve_package_list()?;
    Ok(config)
}

fn from_flags(cli: &Cli) -> Result<CompileConfiguration> {
    let package_path = cli
        .package_path
        .clone()
        .ok_or_else(|| anyhow!("-p is required without --config"))?;
    let output = cli
        .output
        .clone()
        .ok_or_else(|| anyhow!("-o is required without --config"))?;
    let go = cli
        .go
        .clone()
        .ok_or_else(|| anyhow!("--go is required without --config"))?;
    let goroot = cli
        .goroot
        .clone()
        .ok_or_else(|| anyhow!("--goroot is required without --config"))?;

    Ok(CompileConfiguration::new(
        package_path,
        output,
        Toolchain::new(go, goroot),
    ))
}

fn apply_overrides(config: &mut CompileConfiguration, cli: &Cli) -> Result<()> {
    if let Some(package_path) = &cli.package_path {
        config.package_path = package_path.clone();
    }
    if let Some(import_path) = &cli.import_path {
        config.import_path = import_path.clone();
    }
    if let Some(output) = &cli.output {
        config.output = output.clone();
    }
    if let Some(facts_output) = &cli.facts_output {
        config.facts_output = Some(facts_output.clone());
    }
    if let Some(package_list) = &cli.package_list {
        config.package_list = Some(package_list.clone());
    }

    config.sources.extend(cli.srcs.iter().cloned());
    config.dependencies.extend(cli.arcs.iter().cloned());
    config.native_archives.extend(cli.cgo_archives.iter().cloned());
    config.gc_flags.extend(split_flags(&cli.gc_flags));
    config.asm_flags.extend(split_flags(&cli.asm_flags));

    if let Some(filter) = &cli.test_filter {
        config.test_filter = filter.parse::<TestFilter>()?;
    }
    if let Some(merge) = cli.merge {
        config.merge = merge;
    }
    if let Some(nogo) = &cli.nogo {
        config.analyzer = Some(Analyzer {
            binary: nogo.clone(),
        });
    }

    if let Some(coverage) = &mut config.coverage {
        if let Some(mode) = cli.cover_mode {
            coverage.mode = mode;
        }
        coverage.sources.extend(cli.cover.iter().cloned());
    } else if let Some(mode) = cli.cover_mode {
        config.coverage = Some(Coverage::new(mode, cli.cover.clone()));
    } else if !cli.cover.is_empty() {
        bail!("--cover requires --cover-mode");
    }

    apply_toolchain_overrides(&mut config.toolchain, cli);
    Ok(())
}

fn apply_toolchain_overrides(toolchain: &mut Toolchain, cli: &Cli) {
    if let Some(go) = &cli.go {
        toolchain.go = go.clone();
    }
    if let Some(goroot) = &cli.goroot {
        toolchain.goroot = goroot.clone();
    }
    if let Some(goos) = &cli.goos {
        toolchain.goos = goos.clone();
    }
    if let Some(goarch) = &cli.goarch {
        toolchain.goarch = goarch.clone();
    }
    if cli.cgo {
        toolchain.cgo_enabled = true;
    }
    if let Some(suffix) = &cli.install_suffix {
        toolchain.install_suffix = Some(suffix.clone());
    }
    toolchain.tags.extend(cli.tags.iter().filter(|t| !t.is_empty()).cloned());
    if let Some(cache) = &cli.gocache {
        toolchain.cache_dir = Some(cache.clone());
    }
    if let Some(root) = &cli.workdir_root {
        toolchain.work_dir_root = Some(root.clone());
    }
}

/// Split each flag group on whitespace
fn split_flags(groups: &[String]) -> Vec<String> {
    groups
        .iter()
        .flat_map(|g| g.split_whitespace().map(str::to_string))
        .collect()
}
