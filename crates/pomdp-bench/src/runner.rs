use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use pomdp_core::model::{ModelError, Pomdp};
use pomdp_core::problems::TigerPomdp;
use pomdp_solver::{
    AlphaVectorPolicy, CancelFlag, QmdpSolver, RunEnd, Simulation, SimulationError,
    SimulationOutcome, SolveReport, SolverError,
};
use rand::{RngCore, SeedableRng, rngs::StdRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

use crate::analytics::{AnalyticsCollector, AnalyticsError, AnalyticsSummary, PolicySnapshot};
use crate::config::{EvaluationConfig, ProblemConfig, ResolvedOutputs};

/// Solves the configured problem once, then simulates the configured number of runs.
pub struct EvaluationRunner {
    config: EvaluationConfig,
    outputs: ResolvedOutputs,
    cancel: Option<CancelFlag>,
}

/// Summary details returned after an evaluation.
#[derive(Debug)]
pub struct RunSummary {
    /// Runs that reached a terminal state or the step limit.
    pub runs_completed: usize,
    /// Includes the cancelled partial run, if any.
    pub rows_written: usize,
    pub cancelled: bool,
    pub solve: SolveReport,
    pub jsonl_path: PathBuf,
    pub summary_path: PathBuf,
    pub analytics: AnalyticsSummary,
}

/// One JSONL row per simulated run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunLogRow {
    pub run_id: String,
    pub run_index: usize,
    pub seed: u64,
    pub steps: usize,
    pub total_reward: f64,
    pub discounted_reward: f64,
    pub end: RunEnd,
    pub actions: BTreeMap<String, usize>,
}

impl EvaluationRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: EvaluationConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        // Surface bad model parameters before any output is touched.
        match &config.problem {
            ProblemConfig::Tiger(tiger) => {
                TigerPomdp::new(*tiger)?;
            }
        }
        Ok(Self {
            config,
            outputs,
            cancel: None,
        })
    }

    /// Stop between runs (and inside the solver) once `flag` is raised.
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        match &self.config.problem {
            ProblemConfig::Tiger(tiger) => {
                let model = TigerPomdp::new(*tiger)?;
                self.evaluate(&model)
            }
        }
    }

    fn evaluate<M>(&self, model: &M) -> Result<RunSummary, RunnerError>
    where
        M: Pomdp,
        M::State: fmt::Display,
        M::Action: fmt::Display + Send + Sync,
    {
        ensure_parent(self.outputs.jsonl.parent())?;
        ensure_parent(self.outputs.summary_md.parent())?;

        let mut solver = QmdpSolver::new(self.config.solver.to_solver_config());
        if let Some(flag) = &self.cancel {
            solver = solver.with_cancel(flag.clone());
        }
        let policy = solver.solve(model)?;
        let report = *policy.report();
        event!(
            Level::INFO,
            run_id = %self.config.run_id,
            problem = self.config.problem.label(),
            status = ?report.status,
            iterations = report.iterations,
            residual = report.residual,
            "policy solved"
        );

        let mut analytics = AnalyticsCollector::new(
            self.config.run_id.clone(),
            self.config.problem.label(),
            self.config.simulation.max_steps,
            snapshot(model, &policy),
        )?;

        let mut writer = BufWriter::new(File::create(&self.outputs.jsonl)?);
        let mut rng = StdRng::seed_from_u64(self.config.simulation.seed.unwrap_or(0));
        let mut rows_written = 0usize;
        let mut cancelled = false;

        for run_index in 0..self.config.simulation.runs {
            if self.is_cancelled() {
                analytics.mark_cancelled();
                cancelled = true;
                break;
            }
            let seed = rng.next_u64();
            let outcome = self.simulate_once(model, &policy, seed)?;
            let row = log_row(&self.config.run_id, run_index, seed, &outcome);

            event!(
                Level::DEBUG,
                run_index,
                seed,
                steps = row.steps,
                total_reward = row.total_reward,
                end = ?row.end,
                "run complete"
            );

            // Cancelled rows are logged but never sampled.
            analytics.record_run(&row);
            serde_json::to_writer(&mut writer, &row)?;
            writer.write_all(b"\n")?;
            rows_written += 1;

            if row.end == RunEnd::Cancelled {
                cancelled = true;
                break;
            }
        }

        writer.flush()?;

        let summary = analytics.finalize()?;
        summary.write_markdown(&self.outputs.summary_md)?;
        event!(
            Level::INFO,
            runs = summary.runs,
            partial_runs = summary.partial_runs,
            mean_total_reward = summary.total_reward.mean,
            mean_discounted_reward = summary.discounted_reward.mean,
            cancelled,
            "evaluation complete"
        );

        Ok(RunSummary {
            runs_completed: summary.runs,
            rows_written,
            cancelled,
            solve: report,
            jsonl_path: self.outputs.jsonl.clone(),
            summary_path: self.outputs.summary_md.clone(),
            analytics: summary,
        })
    }

    fn simulate_once<M>(
        &self,
        model: &M,
        policy: &AlphaVectorPolicy<M::Action>,
        seed: u64,
    ) -> Result<SimulationOutcome<M::State, M::Action, M::Observation>, RunnerError>
    where
        M: Pomdp,
        M::Action: Send + Sync,
    {
        let mut sim = Simulation::new(model, policy, StdRng::seed_from_u64(seed))?
            .max_steps(self.config.simulation.max_steps);
        if let Some(flag) = &self.cancel {
            sim = sim.with_cancel(flag.clone());
        }
        Ok(SimulationOutcome::collect(sim)?)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

fn snapshot<M>(model: &M, policy: &AlphaVectorPolicy<M::Action>) -> PolicySnapshot
where
    M: Pomdp,
    M::State: fmt::Display,
    M::Action: fmt::Display,
{
    PolicySnapshot {
        states: model.states().iter().map(ToString::to_string).collect(),
        alphas: policy
            .actions()
            .iter()
            .zip(policy.value_vectors())
            .map(|(action, alpha)| (action.to_string(), alpha.clone()))
            .collect(),
        report: *policy.report(),
    }
}

fn log_row<S, A: fmt::Display, O>(
    run_id: &str,
    run_index: usize,
    seed: u64,
    outcome: &SimulationOutcome<S, A, O>,
) -> RunLogRow {
    let mut actions = BTreeMap::new();
    for step in &outcome.steps {
        *actions.entry(step.action.to_string()).or_insert(0) += 1;
    }
    RunLogRow {
        run_id: run_id.to_string(),
        run_index,
        seed,
        steps: outcome.len(),
        total_reward: outcome.total_reward,
        discounted_reward: outcome.discounted_reward,
        end: outcome.end,
        actions,
    }
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),
    #[error("simulation error: {0}")]
    Simulation(#[from] SimulationError),
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}
