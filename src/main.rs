use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use heatmap_analysis::{
    AnalysisOptions, FrequencyTable, Profile, Scope, analyze_module, analyze_module_parallel,
    write_report,
};
use heatmap_ir::mem::Module;
use heatmap_utils::{Profiler, Stopwatch, init_logging};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    name = "heatmap",
    version,
    about = "Counts struct member accesses reachable from the program entry"
)]
struct Cli {
    /// Module to analyze: .json/.yaml/.yml, or .ll/.bc with the `llvm` feature
    input: PathBuf,

    /// TOML file with analysis options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Option preset: `baseline` or `heatmap`
    #[arg(long)]
    profile: Option<Profile>,

    /// Entry function symbol
    #[arg(long)]
    entry: Option<String>,

    /// Walk every defined function instead of only the entry
    #[arg(long)]
    all_functions: bool,

    /// Enable an analysis feature (argument_uses, global_operands, deduplicate)
    #[arg(long, value_name = "FEATURE")]
    enable: Vec<String>,

    /// Disable an analysis feature
    #[arg(long, value_name = "FEATURE")]
    disable: Vec<String>,

    /// Count an instruction every time it is reached
    #[arg(long)]
    no_dedup: bool,

    /// Walk root functions on a thread pool
    #[arg(long)]
    parallel: bool,

    /// Log per-phase timings
    #[arg(long)]
    timings: bool,
}

impl Cli {
    fn options(&self) -> Result<AnalysisOptions> {
        let mut options = match &self.config {
            Some(path) => heatmap_config::load_options(path)?,
            None => AnalysisOptions::default(),
        };
        if let Some(profile) = self.profile {
            options.apply_profile(profile);
        }
        if let Some(entry) = &self.entry {
            options.entry_symbol = entry.clone();
        }
        if self.all_functions {
            options.scope = Scope::AllFunctions;
        }
        for feature in &self.enable {
            options.set_feature(feature, true)?;
        }
        for feature in &self.disable {
            options.set_feature(feature, false)?;
        }
        if self.no_dedup {
            options.deduplicate = false;
        }
        Ok(options)
    }
}

fn main() -> Result<()> {
    init_logging("heatmap=info");
    let wall = Stopwatch::start_new();
    let cli = Cli::parse();
    let options = cli.options()?;
    debug!(?options, "resolved analysis options");

    let mut profiler = Profiler::new();
    let table = match extension(&cli.input) {
        "json" | "yaml" | "yml" => {
            let module = profiler
                .record_phase("load", || Module::load(&cli.input))
                .with_context(|| format!("failed to load {}", cli.input.display()))?;
            profiler.record_phase("analyze", || {
                if cli.parallel {
                    analyze_module_parallel(&module, &options)
                } else {
                    analyze_module(&module, &options)
                }
            })
        }
        "ll" | "bc" => run_llvm(&cli, &options, &mut profiler)?,
        other => bail!("unsupported input format `{other}`"),
    };

    let mut stderr = io::stderr().lock();
    profiler
        .record_phase("report", || write_report(&table, &mut stderr))
        .context("failed to write report")?;

    if cli.timings {
        profiler.log_summary();
        info!(elapsed_us = wall.elapsed_us(), "wall clock");
    }
    Ok(())
}

fn extension(path: &Path) -> &str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
}

#[cfg(feature = "llvm")]
fn run_llvm(
    cli: &Cli,
    options: &AnalysisOptions,
    profiler: &mut Profiler,
) -> Result<FrequencyTable> {
    use heatmap_llvm::{Context as LlvmContext, LlvmModule, parse_file};
    use tracing::warn;

    if cli.parallel {
        warn!("--parallel is ignored for LLVM input");
    }
    let context = LlvmContext::create();
    let module = profiler.record_phase("load", || parse_file(&context, &cli.input))?;
    let ir = LlvmModule::new(&module);
    Ok(profiler.record_phase("analyze", || analyze_module(&ir, options)))
}

#[cfg(not(feature = "llvm"))]
fn run_llvm(
    cli: &Cli,
    _options: &AnalysisOptions,
    _profiler: &mut Profiler,
) -> Result<FrequencyTable> {
    bail!(
        "{} is LLVM IR; rebuild with `--features llvm` to analyze it",
        cli.input.display()
    )
}
