use std::fmt;

use anyhow::{self, format_err, Context};
use derive_builder::Builder;
use log;
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::backend::{make_backend, Backend};
use crate::balance::{CostModel, ExecutionSpace, LoadBalance};
use crate::basis::shell::BasisSet;
use crate::drivers::XcTaskDriver;
use crate::grid::{AtomicGridSize, MolecularGrid};
use crate::io::format::{
    log_report, log_stage_title, nice_bool, nice_save_target, xctask_output, Stage, XcTaskOutput,
};
use crate::io::{write_xctask_binary, XcTaskFileType};
use crate::task::partition::PartitionParams;
use crate::task::{Task, TaskSet};

#[cfg(test)]
#[path = "grid_partitioning_tests.rs"]
mod grid_partitioning_tests;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// A structure containing control parameters for grid partitioning and load balancing.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridPartitioningParams {
    /// The size of the atomic grid on every atom.
    #[builder(default)]
    pub grid_size: AtomicGridSize,

    /// Parameters controlling how atomic grids are cut into tasks.
    #[builder(default)]
    pub partition: PartitionParams,

    /// The number of ranks the tasks are distributed over.
    #[builder(default = "1")]
    pub n_ranks: usize,

    /// The number of lanes within every rank: worker threads on the host, streams on a device.
    #[builder(default = "1")]
    pub n_lanes: usize,

    /// The execution space the tasks are processed in.
    #[builder(default)]
    pub execution_space: ExecutionSpace,

    /// The name of the load-balancing strategy, matched case-insensitively.
    #[builder(setter(into), default = "\"Default\".to_string()")]
    pub strategy: String,

    /// The cost model for load balancing. If `None`, the execution space's default is used.
    #[builder(default = "None")]
    pub cost_model: Option<CostModel>,

    /// Boolean indicating if the saved tasks keep their points and weights. Stripped tasks can
    /// be compared against references but not integrated.
    #[builder(default = "true")]
    pub save_points: bool,

    /// Optional name for saving the result as a binary file of type [`XcTaskFileType::Tsk`]. If
    /// `None`, the result will not be saved.
    #[builder(default = "None")]
    pub result_save_name: Option<String>,
}

impl GridPartitioningParams {
    /// Returns a builder to construct a [`GridPartitioningParams`] structure.
    pub fn builder() -> GridPartitioningParamsBuilder {
        GridPartitioningParamsBuilder::default()
    }

    /// Constructs the backend described by these parameters.
    pub fn backend(&self) -> Result<Box<dyn Backend>, anyhow::Error> {
        make_backend(self.execution_space, &self.strategy, self.n_lanes)
            .context("Unable to set up the execution backend")
    }
}

impl Default for GridPartitioningParams {
    fn default() -> Self {
        GridPartitioningParams::builder()
            .build()
            .expect("Unable to construct a default `GridPartitioningParams`.")
    }
}

impl fmt::Display for GridPartitioningParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Atomic grid: {}", self.grid_size)?;
        write!(f, "{}", self.partition)?;
        writeln!(f, "Ranks: {}", self.n_ranks)?;
        writeln!(f, "Lanes per rank: {}", self.n_lanes)?;
        writeln!(f, "Execution space: {}", self.execution_space)?;
        writeln!(f, "Load-balancing strategy: {}", self.strategy)?;
        writeln!(
            f,
            "Cost model: {}",
            self.cost_model
                .map(|model| model.to_string())
                .unwrap_or_else(|| "execution-space default".to_string())
        )?;
        writeln!(
            f,
            "Save grid points with tasks: {}",
            nice_bool(self.save_points)
        )?;
        writeln!(
            f,
            "Save partitioning results to file: {}",
            nice_save_target(self.result_save_name.as_ref(), XcTaskFileType::Tsk)
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure to contain grid-partitioning results.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridPartitioningResult {
    /// The control parameters used to obtain this set of results.
    pub parameters: GridPartitioningParams,

    /// The partitioned tasks.
    pub task_set: TaskSet,

    /// The assignment of the tasks to ranks and lanes.
    pub balance: LoadBalance,
}

impl GridPartitioningResult {
    /// Returns a builder to construct a [`GridPartitioningResult`] structure.
    fn builder() -> GridPartitioningResultBuilder {
        GridPartitioningResultBuilder::default()
    }

    /// Returns the tasks owned by a rank, in task order.
    pub fn local_tasks(&self, rank: usize) -> Vec<&Task> {
        self.balance
            .local_task_indices(rank)
            .into_iter()
            .filter_map(|itask| self.task_set.tasks.get(itask))
            .collect()
    }
}

impl fmt::Display for GridPartitioningResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.task_set)?;
        writeln!(f)?;
        write!(f, "{}", self.balance)?;
        Ok(())
    }
}

// ------
// Driver
// ------

/// A driver for grid partitioning and load balancing.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct GridPartitioningDriver<'a> {
    /// The control parameters for grid partitioning.
    parameters: &'a GridPartitioningParams,

    /// The molecule carrying the grid, with coordinates in Bohr.
    molecule: &'a Molecule,

    /// The basis set the tasks are screened against.
    basis: &'a BasisSet,

    /// The result of the grid partitioning.
    #[builder(setter(skip), default = "None")]
    result: Option<GridPartitioningResult>,
}

impl<'a> GridPartitioningDriverBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or_else(|| "No grid-partitioning parameters found.".to_string())?;
        let mol = self
            .molecule
            .ok_or_else(|| "No molecule found.".to_string())?;
        if mol.n_atoms() == 0 {
            Err("The molecule has no atoms.".to_string())
        } else if params.n_ranks == 0 {
            Err("The number of ranks must be at least 1.".to_string())
        } else {
            Ok(())
        }
    }
}

impl<'a> GridPartitioningDriver<'a> {
    /// Returns a builder to construct a [`GridPartitioningDriver`] structure.
    pub fn builder() -> GridPartitioningDriverBuilder<'a> {
        GridPartitioningDriverBuilder::default()
    }

    /// Executes grid partitioning followed by load balancing.
    fn partition_grid(&mut self) -> Result<(), anyhow::Error> {
        log_stage_title(Stage::GridPartitioning);
        let params = self.parameters;
        params.log_output_display();

        let backend = params.backend()?;
        let grid = MolecularGrid::new(self.molecule, &params.grid_size)?;
        let dist_nearest = self.molecule.nearest_neighbour_distances();
        let mut task_set = backend
            .partition(&grid, &dist_nearest, self.basis, &params.partition)
            .context("Unable to partition the molecular grid")?;
        task_set.check_padding()?;

        let balancer = backend.load_balancer(params.n_ranks, params.cost_model)?;
        let balance = balancer
            .balance(&task_set)
            .context("Unable to balance the partitioned tasks")?;
        log::debug!(
            "Tasks balanced with cost model `{}`.",
            balancer.params().cost_model
        );

        log_report("Partitioned tasks", &task_set);
        log_report("Load balance", &balance);

        if !params.save_points {
            task_set.tasks.iter_mut().for_each(|task| {
                task.strip_points();
            });
        }
        let result = GridPartitioningResult::builder()
            .parameters(params.clone())
            .task_set(task_set)
            .balance(balance)
            .build()?;
        if let Some(name) = params.result_save_name.as_ref() {
            write_xctask_binary(name, XcTaskFileType::Tsk, &result)?;
            xctask_output!(
                "Partitioning results saved as {}.",
                XcTaskFileType::Tsk.path_for(name).display()
            );
            xctask_output!("");
        }
        self.result = Some(result);
        Ok(())
    }
}

impl<'a> XcTaskDriver for GridPartitioningDriver<'a> {
    type Params = GridPartitioningParams;

    type Outcome = GridPartitioningResult;

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.partition_grid()
    }

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No grid-partitioning results found."))
    }
}
