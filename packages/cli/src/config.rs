//! Run configuration for the allocation pipeline.
//!
//! A run is described by a TOML file whose every section is optional:
//!
//! ```toml
//! [input]
//! records = "data/last3months.csv"
//! containment = "data/lsoa_to_ward.csv"
//!
//! [input.columns]
//! unit = "lsoa_code"
//! period = "year_month"
//! count = "burglary_count"
//!
//! [window]
//! latest = 3
//!
//! [allocation]
//! floor = 100.0
//! cap = 800.0
//! budget_cap_fraction = 0.75
//! missing_containment = "drop"
//!
//! [output]
//! path = "allocation.csv"
//! summary = "allocation_summary.json"
//! append = false
//! ```
//!
//! Command-line flags are applied on top through [`Overrides`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ward_patrol_aggregate::{MissingContainmentPolicy, Window};
use ward_patrol_allocation_models::{
    BudgetSpec, DEFAULT_CAP_HOURS, DEFAULT_FLOOR_HOURS, DEFAULT_MONTHLY_HOURS,
};
use ward_patrol_ingest::{ContainmentColumns, RecordColumns};

/// Errors that can occur while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the config file failed.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path of the config file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`RunConfig`].
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Two mutually exclusive settings were both given.
    #[error("Conflicting settings: {0}")]
    Conflict(String),

    /// A required setting is missing.
    #[error("Missing setting: {0}")]
    Missing(String),
}

/// Full configuration of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Input tables.
    pub input: InputConfig,
    /// Period selection.
    pub window: WindowConfig,
    /// Budget, floor, and cap.
    pub allocation: AllocationConfig,
    /// Output tables.
    pub output: OutputConfig,
}

/// Input tables of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Risk record CSV.
    pub records: Option<PathBuf>,
    /// Fine-to-coarse lookup CSV. Without it records are treated as
    /// already keyed by ward.
    pub containment: Option<PathBuf>,
    /// Column names of the record table.
    pub columns: RecordColumns,
    /// Column names of the lookup table.
    pub containment_columns: ContainmentColumns,
}

/// Period selection of a run. At most one of the fields may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Use the most recent `latest` periods.
    pub latest: Option<usize>,
    /// Use exactly these periods.
    pub periods: Option<Vec<String>>,
}

impl WindowConfig {
    /// Resolves the selection to a [`Window`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Conflict`] if both `latest` and `periods` are
    /// set.
    pub fn to_window(&self) -> Result<Window, ConfigError> {
        match (self.latest, &self.periods) {
            (Some(_), Some(_)) => Err(ConfigError::Conflict(
                "window.latest and window.periods".to_string(),
            )),
            (Some(n), None) => Ok(Window::Latest(n)),
            (None, Some(periods)) => Ok(Window::periods(periods.iter().map(String::as_str))),
            (None, None) => Ok(Window::All),
        }
    }
}

/// Budget, floor, and cap settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Minimum hours per ward.
    pub floor: f64,
    /// Maximum hours per ward.
    pub cap: f64,
    /// Absolute budget in hours.
    pub budget_hours: Option<f64>,
    /// Budget as a fraction of `wards * cap`.
    pub budget_cap_fraction: Option<f64>,
    /// Handling of records whose unit has no ward.
    pub missing_containment: MissingContainmentPolicy,
    /// Hours per ward split across periods when not taken from the solver.
    pub monthly_hours: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            floor: DEFAULT_FLOOR_HOURS,
            cap: DEFAULT_CAP_HOURS,
            budget_hours: None,
            budget_cap_fraction: None,
            missing_containment: MissingContainmentPolicy::default(),
            monthly_hours: DEFAULT_MONTHLY_HOURS,
        }
    }
}

impl AllocationConfig {
    /// Resolves the budget settings to a [`BudgetSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Conflict`] if both an absolute budget and a
    /// cap fraction are set.
    pub fn budget_spec(&self) -> Result<BudgetSpec, ConfigError> {
        match (self.budget_hours, self.budget_cap_fraction) {
            (Some(_), Some(_)) => Err(ConfigError::Conflict(
                "allocation.budget_hours and allocation.budget_cap_fraction".to_string(),
            )),
            (Some(hours), None) => Ok(BudgetSpec::Hours(hours)),
            (None, Some(fraction)) => Ok(BudgetSpec::CapFraction(fraction)),
            (None, None) => Ok(BudgetSpec::default()),
        }
    }
}

/// Output tables of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Ward allocation CSV.
    pub path: PathBuf,
    /// Per-period allocation CSV.
    pub periods_path: PathBuf,
    /// Optional JSON summary.
    pub summary: Option<PathBuf>,
    /// Append rows stamped with a run id instead of overwriting.
    pub append: bool,
    /// Run id for appended rows. Defaults to the latest period of the
    /// window.
    pub run_id: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("allocation.csv"),
            periods_path: PathBuf::from("ward_monthly_allocation.csv"),
            summary: None,
            append: false,
            run_id: None,
        }
    }
}

/// Command-line overrides applied on top of a [`RunConfig`].
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Risk record CSV.
    pub records: Option<PathBuf>,
    /// Fine-to-coarse lookup CSV.
    pub containment: Option<PathBuf>,
    /// Unit code column.
    pub unit_column: Option<String>,
    /// Period column.
    pub period_column: Option<String>,
    /// Count column.
    pub count_column: Option<String>,
    /// Use the most recent `n` periods.
    pub latest: Option<usize>,
    /// Use exactly these periods.
    pub periods: Option<Vec<String>>,
    /// Minimum hours per ward.
    pub floor: Option<f64>,
    /// Maximum hours per ward.
    pub cap: Option<f64>,
    /// Absolute budget.
    pub budget_hours: Option<f64>,
    /// Budget as a fraction of `wards * cap`.
    pub budget_cap_fraction: Option<f64>,
    /// Handling of records without a ward.
    pub missing_containment: Option<MissingContainmentPolicy>,
    /// Hours per ward for the per-period split.
    pub monthly_hours: Option<f64>,
    /// Ward allocation CSV.
    pub output: Option<PathBuf>,
    /// Per-period allocation CSV.
    pub periods_output: Option<PathBuf>,
    /// JSON summary.
    pub summary: Option<PathBuf>,
    /// Append instead of overwrite.
    pub append: bool,
    /// Run id for appended rows.
    pub run_id: Option<String>,
}

impl RunConfig {
    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the text is not a valid config.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(text)?)
    }

    /// Loads a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if given, otherwise starts from defaults.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Applies command-line overrides. A window or budget given on the
    /// command line replaces the configured one entirely.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        let Overrides {
            records,
            containment,
            unit_column,
            period_column,
            count_column,
            latest,
            periods,
            floor,
            cap,
            budget_hours,
            budget_cap_fraction,
            missing_containment,
            monthly_hours,
            output,
            periods_output,
            summary,
            append,
            run_id,
        } = overrides;

        if records.is_some() {
            self.input.records = records;
        }
        if containment.is_some() {
            self.input.containment = containment;
        }
        if let Some(unit) = unit_column {
            self.input.columns.unit = unit;
        }
        if let Some(period) = period_column {
            self.input.columns.period = period;
        }
        if let Some(count) = count_column {
            self.input.columns.count = count;
        }

        if latest.is_some() || periods.is_some() {
            self.window = WindowConfig { latest, periods };
        }

        if let Some(floor) = floor {
            self.allocation.floor = floor;
        }
        if let Some(cap) = cap {
            self.allocation.cap = cap;
        }
        if budget_hours.is_some() || budget_cap_fraction.is_some() {
            self.allocation.budget_hours = budget_hours;
            self.allocation.budget_cap_fraction = budget_cap_fraction;
        }
        if let Some(policy) = missing_containment {
            self.allocation.missing_containment = policy;
        }
        if let Some(hours) = monthly_hours {
            self.allocation.monthly_hours = hours;
        }

        if let Some(path) = output {
            self.output.path = path;
        }
        if let Some(path) = periods_output {
            self.output.periods_path = path;
        }
        if summary.is_some() {
            self.output.summary = summary;
        }
        if append {
            self.output.append = true;
        }
        if run_id.is_some() {
            self.output.run_id = run_id;
        }
    }

    /// Returns the record CSV path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if no record table is configured.
    pub fn records_path(&self) -> Result<&Path, ConfigError> {
        self.input
            .records
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("input.records".to_string()))
    }
}
