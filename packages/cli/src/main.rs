#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the ward patrol allocation tool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ward_patrol_aggregate::MissingContainmentPolicy;
use ward_patrol_cli::config::{Overrides, RunConfig};
use ward_patrol_cli::pipeline::{self, HoursSource};

#[derive(Parser)]
#[command(name = "ward_patrol", about = "Ward patrol-hour allocation tool")]
struct Cli {
    /// TOML run configuration. Flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate the patrol-hour budget across wards by aggregated risk
    Allocate {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Split each ward's hours across the periods of the window by risk
    Split {
        #[command(flatten)]
        run: RunArgs,
        /// Hours per ward to split (default: 3200, i.e. 800 weekly x 4)
        #[arg(long)]
        monthly_hours: Option<f64>,
        /// Take each ward's hours from the solver instead of a constant
        #[arg(long)]
        from_solver: bool,
    },
    /// Build the fine-unit -> ward lookup from `GeoJSON` boundaries
    Containment {
        /// Fine-unit (e.g. LSOA) boundary `FeatureCollection`
        #[arg(long)]
        fine: PathBuf,
        /// Ward boundary `FeatureCollection`
        #[arg(long)]
        wards: PathBuf,
        /// Feature property holding the unit code
        #[arg(long, default_value = "code")]
        code_property: String,
        /// Output lookup CSV
        #[arg(long, default_value = "lsoa_to_ward.csv")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Risk record CSV
    #[arg(long)]
    records: Option<PathBuf>,
    /// Fine-unit -> ward lookup CSV (omit if records are ward-level)
    #[arg(long)]
    containment: Option<PathBuf>,
    /// Unit code column of the record CSV
    #[arg(long)]
    unit_column: Option<String>,
    /// Period column of the record CSV
    #[arg(long)]
    period_column: Option<String>,
    /// Count column of the record CSV
    #[arg(long)]
    count_column: Option<String>,
    /// Use the most recent N periods
    #[arg(long, conflicts_with = "periods")]
    latest: Option<usize>,
    /// Comma-separated list of periods to use (e.g. "2024-01,2024-02")
    #[arg(long, value_delimiter = ',')]
    periods: Option<Vec<String>>,
    /// Minimum hours per ward
    #[arg(long)]
    floor: Option<f64>,
    /// Maximum hours per ward
    #[arg(long)]
    cap: Option<f64>,
    /// Total budget in hours
    #[arg(long, conflicts_with = "budget_fraction")]
    budget: Option<f64>,
    /// Total budget as a fraction of wards x cap (default: 0.75)
    #[arg(long)]
    budget_fraction: Option<f64>,
    /// What to do with records whose unit has no ward: `drop` or `fail`
    #[arg(long)]
    missing_containment: Option<MissingContainmentPolicy>,
    /// Output CSV
    #[arg(long)]
    output: Option<PathBuf>,
    /// JSON summary output
    #[arg(long)]
    summary: Option<PathBuf>,
    /// Append rows stamped with a run id instead of overwriting
    #[arg(long)]
    append: bool,
    /// Run id for appended rows (default: latest period of the window)
    #[arg(long)]
    run_id: Option<String>,
}

impl RunArgs {
    fn into_overrides(self, split_output: bool) -> Overrides {
        let (output, periods_output) = if split_output {
            (None, self.output)
        } else {
            (self.output, None)
        };

        Overrides {
            records: self.records,
            containment: self.containment,
            unit_column: self.unit_column,
            period_column: self.period_column,
            count_column: self.count_column,
            latest: self.latest,
            periods: self.periods,
            floor: self.floor,
            cap: self.cap,
            budget_hours: self.budget,
            budget_cap_fraction: self.budget_fraction,
            missing_containment: self.missing_containment,
            monthly_hours: None,
            output,
            periods_output,
            summary: self.summary,
            append: self.append,
            run_id: self.run_id,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let mut config = RunConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Allocate { run } => {
            config.apply_overrides(run.into_overrides(false));
            let outcome = pipeline::run_allocation(&config)?;

            println!(
                "Allocated {:.1} of {:.1} hours across {} wards -> {}",
                outcome.summary.total_allocated,
                outcome.summary.total_budget,
                outcome.summary.units,
                config.output.path.display()
            );
            if outcome.dropped_records > 0 {
                println!(
                    "Dropped {} records without a containing ward",
                    outcome.dropped_records
                );
            }
        }
        Commands::Split {
            run,
            monthly_hours,
            from_solver,
        } => {
            let mut overrides = run.into_overrides(true);
            overrides.monthly_hours = monthly_hours;
            config.apply_overrides(overrides);

            let source = if from_solver {
                HoursSource::Solver
            } else {
                HoursSource::Constant
            };
            let rows = pipeline::run_split(&config, source)?;

            println!(
                "Wrote {} ({} rows: wards x periods)",
                config.output.periods_path.display(),
                rows.len()
            );
        }
        Commands::Containment {
            fine,
            wards,
            code_property,
            output,
        } => {
            let build = pipeline::run_containment(
                &fine,
                &wards,
                &code_property,
                &output,
                &config.input.containment_columns,
            )?;

            println!(
                "Wrote {} ({} units in {} wards, {} unmatched)",
                output.display(),
                build.containment.len(),
                build.containment.coarse_units().len(),
                build.unmatched.len()
            );
        }
    }

    Ok(())
}
