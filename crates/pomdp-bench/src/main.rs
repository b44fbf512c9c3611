use std::path::PathBuf;

use clap::Parser;

use pomdp_bench::config::{EvaluationConfig, ResolvedOutputs};
use pomdp_bench::logging::init_logging;
use pomdp_bench::runner::EvaluationRunner;
use pomdp_core::KernelInfo;

/// Evaluation harness for QMDP policies.
#[derive(Debug, Parser)]
#[command(
    name = "pomdp-bench",
    author,
    version,
    about = "Deterministic QMDP solve-and-simulate harness"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "bench/tiger.yaml")]
    config: PathBuf,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the number of simulated runs.
    #[arg(long, value_name = "RUNS")]
    runs: Option<usize>,

    /// Override the master RNG seed.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Override the per-run step limit.
    #[arg(long, value_name = "STEPS")]
    max_steps: Option<usize>,

    /// Exit after validating the configuration (nothing is solved or simulated).
    #[arg(long)]
    validate_only: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = EvaluationConfig::from_path(&cli.config)?;

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(runs) = cli.runs {
        config.simulation.runs = runs;
    }

    if let Some(seed) = cli.seed {
        config.simulation.seed = Some(seed);
    }

    if let Some(max_steps) = cli.max_steps {
        config.simulation.max_steps = max_steps;
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let run_id = config.run_id.clone();
    let runs = config.simulation.runs;
    let max_steps = config.simulation.max_steps;

    println!(
        "{} {}: loaded '{run_id}' ({} problem, {runs} run{}, up to {max_steps} steps)",
        KernelInfo::name(),
        KernelInfo::version(),
        config.problem.label(),
        if runs == 1 { "" } else { "s" }
    );

    let _logging_guard = init_logging(&config.logging, &outputs, &run_id)?;
    let runner = EvaluationRunner::new(config, outputs)?;

    if cli.validate_only {
        println!("Validation-only mode: evaluation skipped.");
        return Ok(());
    }

    let summary = runner.run()?;
    println!(
        "Solve: {:?} after {} sweeps (residual {:.3e})",
        summary.solve.status, summary.solve.iterations, summary.solve.residual
    );
    println!(
        "Evaluation complete for '{run_id}': {} rows at {}",
        summary.rows_written,
        summary.jsonl_path.display()
    );
    println!(
        "Mean return {:.3} (95% CI [{:.3}, {:.3}]), mean discounted {:.3}",
        summary.analytics.total_reward.mean,
        summary.analytics.total_reward.ci95.0,
        summary.analytics.total_reward.ci95.1,
        summary.analytics.discounted_reward.mean
    );
    println!("Summary table: {}", summary.summary_path.display());
    if summary.cancelled {
        println!(
            "Cancelled after {} complete run(s); {} partial run(s) left out of the statistics.",
            summary.runs_completed, summary.analytics.partial_runs
        );
    }

    Ok(())
}
