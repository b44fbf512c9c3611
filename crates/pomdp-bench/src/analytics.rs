use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use pomdp_solver::{RunEnd, SolveReport};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics;
use thiserror::Error;

use crate::runner::RunLogRow;

const CONFIDENCE_LEVEL: f64 = 0.95;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("no runs were recorded and the evaluation was not cancelled")]
    NoRuns,
    #[error("alpha-vector for '{action}' has {found} entries, expected {expected}")]
    AlphaShape {
        action: String,
        expected: usize,
        found: usize,
    },
    #[error("normal quantile unavailable: {0}")]
    Quantile(String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Solved policy in printable form.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySnapshot {
    pub states: Vec<String>,
    /// One `(action, alpha-vector)` row per action, in declared order.
    pub alphas: Vec<(String, Vec<f64>)>,
    pub report: SolveReport,
}

impl PolicySnapshot {
    fn validate(&self) -> Result<(), AnalyticsError> {
        for (action, alpha) in &self.alphas {
            if alpha.len() != self.states.len() {
                return Err(AnalyticsError::AlphaShape {
                    action: action.clone(),
                    expected: self.states.len(),
                    found: alpha.len(),
                });
            }
        }
        Ok(())
    }
}

/// Accumulates per-run rows into summary statistics. Runs cut short by cancellation are
/// counted but kept out of the samples.
pub struct AnalyticsCollector {
    run_id: String,
    problem: String,
    max_steps: usize,
    snapshot: PolicySnapshot,
    totals: Vec<f64>,
    discounted: Vec<f64>,
    steps: Vec<f64>,
    actions: BTreeMap<String, usize>,
    ends: BTreeMap<&'static str, usize>,
    partial_runs: usize,
    cancelled: bool,
}

impl AnalyticsCollector {
    pub fn new(
        run_id: impl Into<String>,
        problem: impl Into<String>,
        max_steps: usize,
        snapshot: PolicySnapshot,
    ) -> Result<Self, AnalyticsError> {
        snapshot.validate()?;
        // Every declared action shows up in the table, even if never chosen.
        let actions = snapshot
            .alphas
            .iter()
            .map(|(action, _)| (action.clone(), 0))
            .collect();
        Ok(Self {
            run_id: run_id.into(),
            problem: problem.into(),
            max_steps,
            snapshot,
            totals: Vec::new(),
            discounted: Vec::new(),
            steps: Vec::new(),
            actions,
            ends: BTreeMap::new(),
            partial_runs: 0,
            cancelled: false,
        })
    }

    pub fn record_run(&mut self, row: &RunLogRow) {
        if row.end == RunEnd::Cancelled {
            self.partial_runs += 1;
            self.cancelled = true;
            return;
        }
        self.totals.push(row.total_reward);
        self.discounted.push(row.discounted_reward);
        self.steps.push(row.steps as f64);
        for (action, count) in &row.actions {
            *self.actions.entry(action.clone()).or_insert(0) += count;
        }
        *self.ends.entry(end_label(row.end)).or_insert(0) += 1;
    }

    /// Note that the evaluation stopped early, even if no run was under way.
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn runs(&self) -> usize {
        self.totals.len()
    }

    pub fn finalize(self) -> Result<AnalyticsSummary, AnalyticsError> {
        if self.totals.is_empty() && !self.cancelled {
            return Err(AnalyticsError::NoRuns);
        }
        let z = normal_quantile(CONFIDENCE_LEVEL)?;
        let total_actions: usize = self.actions.values().sum();

        Ok(AnalyticsSummary {
            run_id: self.run_id,
            problem: self.problem,
            runs: self.totals.len(),
            max_steps: self.max_steps,
            total_reward: SampleStats::from_samples(&self.totals, z),
            discounted_reward: SampleStats::from_samples(&self.discounted, z),
            steps: SampleStats::from_samples(&self.steps, z),
            actions: self
                .actions
                .into_iter()
                .map(|(action, count)| ActionShare {
                    share: if total_actions == 0 {
                        0.0
                    } else {
                        count as f64 / total_actions as f64
                    },
                    action,
                    count,
                })
                .collect(),
            ends: self
                .ends
                .into_iter()
                .map(|(end, count)| (end.to_string(), count))
                .collect(),
            partial_runs: self.partial_runs,
            cancelled: self.cancelled,
            policy: self.snapshot,
        })
    }
}

fn normal_quantile(level: f64) -> Result<f64, AnalyticsError> {
    let normal =
        Normal::new(0.0, 1.0).map_err(|err| AnalyticsError::Quantile(err.to_string()))?;
    Ok(normal.inverse_cdf(0.5 + level / 2.0))
}

fn end_label(end: RunEnd) -> &'static str {
    match end {
        RunEnd::Terminated => "terminated",
        RunEnd::StepLimitReached => "step_limit_reached",
        RunEnd::Cancelled => "cancelled",
    }
}

/// Mean, sample standard deviation and normal-approximation confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleStats {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub ci95: (f64, f64),
}

impl SampleStats {
    fn from_samples(samples: &[f64], z: f64) -> Self {
        if samples.is_empty() {
            return Self {
                n: 0,
                mean: 0.0,
                std_dev: 0.0,
                ci95: (0.0, 0.0),
            };
        }
        let mean = samples.iter().mean();
        if samples.len() == 1 {
            return Self {
                n: 1,
                mean,
                std_dev: 0.0,
                ci95: (mean, mean),
            };
        }
        let std_dev = samples.iter().std_dev();
        let margin = z * std_dev / (samples.len() as f64).sqrt();
        Self {
            n: samples.len(),
            mean,
            std_dev,
            ci95: (mean - margin, mean + margin),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionShare {
    pub action: String,
    pub count: usize,
    pub share: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub run_id: String,
    pub problem: String,
    pub runs: usize,
    pub max_steps: usize,
    pub total_reward: SampleStats,
    pub discounted_reward: SampleStats,
    pub steps: SampleStats,
    pub actions: Vec<ActionShare>,
    pub ends: Vec<(String, usize)>,
    /// Cancelled runs left out of every statistic above.
    pub partial_runs: usize,
    pub cancelled: bool,
    pub policy: PolicySnapshot,
}

impl AnalyticsSummary {
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let report = &self.policy.report;

        let _ = writeln!(out, "# QMDP Evaluation Summary\n");
        let _ = writeln!(
            out,
            "Run `{}` on `{}`: {} runs, up to {} steps each.\n",
            self.run_id, self.problem, self.runs, self.max_steps
        );
        if self.cancelled {
            let _ = writeln!(
                out,
                "Cancelled: {} partial run(s) excluded from the statistics.\n",
                self.partial_runs
            );
        }

        out.push_str("## Solve\n\n");
        out.push_str("| Status | Sweeps | Residual | Elapsed ms |\n");
        out.push_str("|--------|--------|----------|------------|\n");
        let _ = writeln!(
            out,
            "| {:?} | {} | {:.3e} | {:.2} |\n",
            report.status, report.iterations, report.residual, report.elapsed_ms
        );

        out.push_str("## Alpha vectors\n\n");
        out.push_str("| Action |");
        for state in &self.policy.states {
            let _ = write!(out, " {state} |");
        }
        out.push_str("\n|--------|");
        for _ in &self.policy.states {
            out.push_str("------|");
        }
        out.push('\n');
        for (action, alpha) in &self.policy.alphas {
            let _ = write!(out, "| {action} |");
            for value in alpha {
                let _ = write!(out, " {value:.3} |");
            }
            out.push('\n');
        }
        out.push('\n');

        out.push_str("## Returns\n\n");
        out.push_str("| Metric | Mean | Std dev | 95% CI |\n");
        out.push_str("|--------|------|---------|--------|\n");
        for (label, stats) in [
            ("Total reward", &self.total_reward),
            ("Discounted reward", &self.discounted_reward),
            ("Steps", &self.steps),
        ] {
            let _ = writeln!(
                out,
                "| {label} | {:.3} | {:.3} | [{:.3}, {:.3}] |",
                stats.mean, stats.std_dev, stats.ci95.0, stats.ci95.1
            );
        }
        out.push('\n');

        out.push_str("## Actions\n\n");
        out.push_str("| Action | Count | Share |\n");
        out.push_str("|--------|-------|-------|\n");
        for share in &self.actions {
            let _ = writeln!(
                out,
                "| {} | {} | {:.1}% |",
                share.action,
                share.count,
                share.share * 100.0
            );
        }
        out.push('\n');

        out.push_str("## Run endings\n\n");
        out.push_str("| End | Runs |\n");
        out.push_str("|-----|------|\n");
        for (end, count) in &self.ends {
            let _ = writeln!(out, "| {end} | {count} |");
        }

        out
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        fs::write(path.as_ref(), self.to_markdown()).map_err(|e| AnalyticsError::Io {
            context: "writing summary markdown",
            source: e,
        })
    }
}
