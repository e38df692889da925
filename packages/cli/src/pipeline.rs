//! Batch pipeline orchestrator for the allocation toolchain.
//!
//! Chains ingest -> aggregate -> solve -> validate -> write for one run.
//! Every step reads its settings from the [`RunConfig`] passed in; nothing
//! is kept between runs.

use std::path::Path;
use std::time::Instant;

use thiserror::Error;
use ward_patrol_aggregate::{AggregateError, Containment, RiskAggregator, Window};
use ward_patrol_allocation::{AllocationError, solve, split_across_periods, uniform_hours};
use ward_patrol_allocation_models::{
    Allocation, AllocationParams, AllocationSummary, PeriodAllocation, RiskRecord, RiskScores,
    UnitHours,
};
use ward_patrol_ingest::{
    ContainmentColumns, IngestError, read_containment_file, read_records_file, write_containment,
};
use ward_patrol_report::{
    OutputMode, ReportError, summarize, validate_and_format, write_allocations_file,
    write_period_allocations_file, write_summary_file,
};
use ward_patrol_spatial::{
    ContainmentBuild, SpatialError, WardIndex, build_containment, read_boundaries_file,
};

use crate::config::{ConfigError, RunConfig};

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Reading or writing an input table failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Aggregating risk failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Solving the allocation failed.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// Validating or writing the report failed.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// Building containment from boundaries failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of an allocation run.
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    /// Validated rows, sorted by unit code.
    pub rows: Vec<Allocation>,
    /// Run totals.
    pub summary: AllocationSummary,
    /// Records dropped for lack of a containing ward.
    pub dropped_records: usize,
}

/// Where the hours split across periods come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoursSource {
    /// Every ward gets `allocation.monthly_hours`.
    Constant,
    /// Every ward gets its hours from the solver.
    Solver,
}

/// Inputs shared by every run mode.
struct Inputs {
    records: Vec<RiskRecord>,
    containment: Option<Containment>,
    window: Window,
}

impl Inputs {
    fn load(config: &RunConfig) -> Result<Self, PipelineError> {
        let window = config.window.to_window()?;
        let records = read_records_file(config.records_path()?, &config.input.columns)?;
        let containment = config
            .input
            .containment
            .as_deref()
            .map(|path| read_containment_file(path, &config.input.containment_columns))
            .transpose()?;

        Ok(Self {
            records,
            containment,
            window,
        })
    }

    #[allow(clippy::option_if_let_else)]
    fn aggregator(&self, config: &RunConfig) -> RiskAggregator<'_> {
        match &self.containment {
            Some(containment) => {
                RiskAggregator::hierarchical(containment, config.allocation.missing_containment)
            }
            None => RiskAggregator::flat(),
        }
    }

    /// Output mode, stamping appended rows with the configured run id or
    /// the latest period of the window.
    fn output_mode(&self, config: &RunConfig) -> OutputMode {
        if !config.output.append {
            return OutputMode::Overwrite;
        }

        let run_id = config.output.run_id.clone().unwrap_or_else(|| {
            let latest = self.window.resolve(&self.records).map_or_else(
                || self.records.iter().map(|r| &r.period).max().cloned(),
                |periods| periods.into_iter().next_back(),
            );
            latest.map_or_else(|| "all".to_string(), |p| p.to_string())
        });

        OutputMode::Append { run_id }
    }
}

/// Solves and validates an allocation for the given scores.
fn allocate(
    scores: &RiskScores,
    config: &RunConfig,
) -> Result<(UnitHours, Vec<Allocation>, AllocationParams), PipelineError> {
    let budget = config
        .allocation
        .budget_spec()?
        .resolve(scores.len(), config.allocation.cap);
    let params = AllocationParams::new(budget, config.allocation.floor, config.allocation.cap);

    log::info!(
        "Allocating {budget} hours across {} wards (floor {}, cap {})",
        scores.len(),
        params.floor,
        params.cap
    );

    let hours = solve(scores, &params)?;
    let rows = validate_and_format(&hours, &params)?;

    Ok((hours, rows, params))
}

/// Runs aggregation, allocation, validation, and writes the allocation
/// table (and the JSON summary if configured).
///
/// # Errors
///
/// Returns [`PipelineError`] if any step fails. Nothing is written when
/// the allocation is infeasible or fails validation.
pub fn run_allocation(config: &RunConfig) -> Result<AllocationOutcome, PipelineError> {
    let start = Instant::now();

    let inputs = Inputs::load(config)?;
    let aggregation = inputs
        .aggregator(config)
        .aggregate(&inputs.records, &inputs.window)?;

    let (_, rows, params) = allocate(&aggregation.scores, config)?;
    let summary = summarize(&rows, &aggregation.scores, &params);

    if let Some(path) = &config.output.summary {
        write_summary_file(&summary, path)?;
    }
    write_allocations_file(&rows, &config.output.path, &inputs.output_mode(config))?;

    log::info!(
        "Allocation complete in {:.2}s: {} of {} hours across {} wards",
        start.elapsed().as_secs_f64(),
        summary.total_allocated,
        summary.total_budget,
        summary.units
    );

    Ok(AllocationOutcome {
        rows,
        summary,
        dropped_records: aggregation.dropped_records,
    })
}

/// Splits each ward's hours across the periods of the window in proportion
/// to per-period risk and writes the per-period table.
///
/// # Errors
///
/// Returns [`PipelineError`] if any step fails.
pub fn run_split(
    config: &RunConfig,
    source: HoursSource,
) -> Result<Vec<PeriodAllocation>, PipelineError> {
    let start = Instant::now();

    let inputs = Inputs::load(config)?;
    let aggregator = inputs.aggregator(config);
    let per_period = aggregator.aggregate_by_period(&inputs.records, &inputs.window)?;

    let hours = match source {
        HoursSource::Constant => uniform_hours(per_period.keys(), config.allocation.monthly_hours),
        HoursSource::Solver => {
            let aggregation = aggregator.aggregate(&inputs.records, &inputs.window)?;
            allocate(&aggregation.scores, config)?.0
        }
    };

    let rows = split_across_periods(&hours, &per_period)?;
    write_period_allocations_file(&rows, &config.output.periods_path, &inputs.output_mode(config))?;

    log::info!(
        "Per-period split complete in {:.2}s: {} rows",
        start.elapsed().as_secs_f64(),
        rows.len()
    );

    Ok(rows)
}

/// Builds the fine-to-ward lookup from boundary files and writes it as CSV.
///
/// # Errors
///
/// Returns [`PipelineError`] if a boundary file cannot be read or the
/// lookup cannot be written.
pub fn run_containment(
    fine_path: &Path,
    wards_path: &Path,
    code_property: &str,
    output: &Path,
    columns: &ContainmentColumns,
) -> Result<ContainmentBuild, PipelineError> {
    let fine = read_boundaries_file(fine_path, code_property)?;
    let wards = WardIndex::new(read_boundaries_file(wards_path, code_property)?);

    let build = build_containment(&fine, &wards)?;

    let file = std::fs::File::create(output)?;
    write_containment(&build.containment, file, columns)?;
    log::info!("Wrote containment lookup to {}", output.display());

    Ok(build)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ward_patrol_allocation_models::UnitCode;

    use super::*;
    use crate::config::Overrides;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_fixture(dir: &Path) {
        std::fs::write(
            dir.join("records.csv"),
            "lsoa_code,lsoa_name,year_month,burglary_count\n\
             L1,a,2024-01,4\n\
             L2,b,2024-01,6\n\
             L3,c,2024-01,5\n\
             L1,a,2024-02,0\n\
             L3,c,2024-02,0\n\
             L9,z,2024-02,3\n\
             L1,a,2023-12,100\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("lookup.csv"),
            "fine_unit_code,coarse_unit_code\nL1,A\nL2,A\nL3,B\n,C\n",
        )
        .unwrap();
    }

    fn config(dir: &Path) -> RunConfig {
        let mut config = RunConfig::default();
        config.apply_overrides(Overrides {
            records: Some(dir.join("records.csv")),
            containment: Some(dir.join("lookup.csv")),
            unit_column: Some("lsoa_code".to_string()),
            period_column: Some("year_month".to_string()),
            count_column: Some("burglary_count".to_string()),
            latest: Some(2),
            floor: Some(10.0),
            cap: Some(100.0),
            budget_hours: Some(130.0),
            output: Some(dir.join("allocation.csv")),
            periods_output: Some(dir.join("monthly.csv")),
            summary: Some(dir.join("summary.json")),
            ..Overrides::default()
        });
        config
    }

    #[test]
    fn allocates_and_writes_reports() {
        let dir = scratch_dir("ward_patrol_pipeline_allocate_test");
        write_fixture(&dir);

        let outcome = run_allocation(&config(&dir)).unwrap();

        let hours: Vec<(&str, f64)> = outcome
            .rows
            .iter()
            .map(|r| (r.unit_code.as_str(), r.allocated_hours))
            .collect();
        assert_eq!(hours, [("A", 100.0), ("B", 20.0), ("C", 10.0)]);
        assert_eq!(outcome.dropped_records, 1);
        assert!((outcome.summary.objective - 1100.0).abs() < 1e-6);

        let table = std::fs::read_to_string(dir.join("allocation.csv")).unwrap();
        assert_eq!(table, "unit_code,allocated_hours\nA,100.0\nB,20.0\nC,10.0\n");
        assert!(dir.join("summary.json").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn writes_summary_into_new_directory() {
        let dir = scratch_dir("ward_patrol_pipeline_summary_dir_test");
        write_fixture(&dir);

        let mut config = config(&dir);
        config.output.summary = Some(dir.join("out").join("runs").join("summary.json"));
        run_allocation(&config).unwrap();

        assert!(dir.join("out").join("runs").join("summary.json").exists());
        assert!(dir.join("allocation.csv").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn infeasible_budget_writes_nothing() {
        let dir = scratch_dir("ward_patrol_pipeline_infeasible_test");
        write_fixture(&dir);

        let mut config = config(&dir);
        config.allocation.floor = 50.0;

        let err = run_allocation(&config).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Allocation(AllocationError::Infeasible { .. })
        ));
        assert!(!dir.join("allocation.csv").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn appends_rows_stamped_with_latest_period() {
        let dir = scratch_dir("ward_patrol_pipeline_append_test");
        write_fixture(&dir);

        let mut config = config(&dir);
        config.output.append = true;
        config.output.summary = None;
        run_allocation(&config).unwrap();

        let table = std::fs::read_to_string(dir.join("allocation.csv")).unwrap();
        assert!(table.starts_with("run_id,unit_code,allocated_hours\n2024-02,A,"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn splits_constant_hours_across_periods() {
        let dir = scratch_dir("ward_patrol_pipeline_split_test");
        write_fixture(&dir);

        let mut config = config(&dir);
        config.allocation.monthly_hours = 1000.0;

        let rows = run_split(&config, HoursSource::Constant).unwrap();

        let a: Vec<f64> = rows
            .iter()
            .filter(|r| r.unit_code == UnitCode::new("A"))
            .map(|r| r.allocated_hours)
            .collect();
        assert_eq!(a, [1000.0, 0.0]);

        let b: Vec<f64> = rows
            .iter()
            .filter(|r| r.unit_code == UnitCode::new("B"))
            .map(|r| r.allocated_hours)
            .collect();
        assert_eq!(b, [1000.0, 0.0]);

        assert!(rows.iter().all(|r| r.unit_code != UnitCode::new("C")));
        assert!(dir.join("monthly.csv").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn splits_solver_hours_across_periods() {
        let dir = scratch_dir("ward_patrol_pipeline_split_solver_test");
        write_fixture(&dir);

        let rows = run_split(&config(&dir), HoursSource::Solver).unwrap();
        let total_a: f64 = rows
            .iter()
            .filter(|r| r.unit_code == UnitCode::new("A"))
            .map(|r| r.allocated_hours)
            .sum();
        assert!((total_a - 100.0).abs() < 1e-6);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
