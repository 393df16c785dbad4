//! Execution backends.
//!
//! A backend bundles the execution-space-specific parts of the pipeline: how a grid is
//! partitioned, how compact blocks are moved in and out of global matrices, and how many lanes
//! the load balancer may use. The balancer itself is shared by every backend.

use std::fmt;

use itertools::Itertools;
use log;
use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use rayon::prelude::*;

use crate::balance::{BalanceParams, BalanceStrategy, CostModel, ExecutionSpace, LoadBalancer};
use crate::basis::shell::BasisSet;
use crate::error::XcTaskError;
use crate::grid::MolecularGrid;
use crate::packing;
use crate::submatrix::flatten_cuts;
use crate::task::partition::{assemble, check_atom_count, partition_atom, PartitionParams};
use crate::task::{Task, TaskSet};

#[cfg(test)]
#[path = "backend_tests.rs"]
mod backend_tests;

// =================
// Trait definitions
// =================

/// Trait for execution backends.
pub trait Backend: Send + Sync + fmt::Debug {
    /// The execution space of this backend.
    fn execution_space(&self) -> ExecutionSpace;

    /// The load-balancing strategy of this backend.
    fn strategy(&self) -> BalanceStrategy;

    /// The number of lanes available on every rank.
    fn n_lanes(&self) -> usize;

    /// The cost model used when none is requested explicitly.
    fn default_cost_model(&self) -> CostModel;

    /// Partitions a molecular grid into tasks.
    fn partition(
        &self,
        grid: &MolecularGrid,
        dist_nearest: &[f64],
        basis: &BasisSet,
        params: &PartitionParams,
    ) -> Result<TaskSet, XcTaskError>;

    /// Gathers the compact block of a task out of a global matrix.
    fn gather(&self, task: &Task, global: &ArrayView2<f64>) -> Result<Array2<f64>, XcTaskError>;

    /// Accumulates the compact contribution of a task into a global matrix.
    fn scatter_add(
        &self,
        task: &Task,
        compact: &ArrayView2<f64>,
        global: &mut ArrayViewMut2<f64>,
    ) -> Result<(), XcTaskError>;

    /// Constructs the load balancer for this backend's lanes over `n_ranks` ranks.
    ///
    /// # Arguments
    ///
    /// * `n_ranks` - The number of ranks.
    /// * `cost_model` - The cost model to use, or `None` for [`Self::default_cost_model`].
    fn load_balancer(
        &self,
        n_ranks: usize,
        cost_model: Option<CostModel>,
    ) -> Result<LoadBalancer, XcTaskError> {
        let params = BalanceParams::builder()
            .n_ranks(n_ranks)
            .n_lanes(self.n_lanes())
            .cost_model(cost_model.unwrap_or_else(|| self.default_cost_model()))
            .build()
            .map_err(|err| XcTaskError::Configuration(err.to_string()))?;
        LoadBalancer::new(&params)
    }
}

// ==================
// Struct definitions
// ==================

// -----------
// HostBackend
// -----------

/// A backend running on general-purpose cores. Lanes are worker threads; partitioning is
/// serial and packing works directly on array views.
#[derive(Clone, Debug)]
pub struct HostBackend {
    strategy: BalanceStrategy,
    n_lanes: usize,
}

impl HostBackend {
    /// Creates a host backend with `n_lanes` worker threads per rank.
    pub fn new(strategy: BalanceStrategy, n_lanes: usize) -> Result<Self, XcTaskError> {
        if n_lanes == 0 {
            return Err(XcTaskError::Configuration(
                "a host backend needs at least one worker thread".to_string(),
            ));
        }
        Ok(Self { strategy, n_lanes })
    }
}

impl Backend for HostBackend {
    fn execution_space(&self) -> ExecutionSpace {
        ExecutionSpace::Host
    }

    fn strategy(&self) -> BalanceStrategy {
        self.strategy
    }

    fn n_lanes(&self) -> usize {
        self.n_lanes
    }

    fn default_cost_model(&self) -> CostModel {
        CostModel::PointsTimesFunctions
    }

    fn partition(
        &self,
        grid: &MolecularGrid,
        dist_nearest: &[f64],
        basis: &BasisSet,
        params: &PartitionParams,
    ) -> Result<TaskSet, XcTaskError> {
        crate::task::partition::partition(grid, dist_nearest, basis, params)
    }

    fn gather(&self, task: &Task, global: &ArrayView2<f64>) -> Result<Array2<f64>, XcTaskError> {
        packing::gather(task, global)
    }

    fn scatter_add(
        &self,
        task: &Task,
        compact: &ArrayView2<f64>,
        global: &mut ArrayViewMut2<f64>,
    ) -> Result<(), XcTaskError> {
        packing::scatter_add(task, compact, global)
    }
}

// -------------
// DeviceBackend
// -------------

/// A backend modelled on an accelerator. Lanes are device streams; atoms are partitioned
/// concurrently and packing goes through flat row-major arenas with flattened cuts, the layout
/// batched device kernels consume.
#[derive(Clone, Debug)]
pub struct DeviceBackend {
    strategy: BalanceStrategy,
    n_streams: usize,
}

impl DeviceBackend {
    /// Creates a device backend with `n_streams` streams per rank.
    pub fn new(strategy: BalanceStrategy, n_streams: usize) -> Result<Self, XcTaskError> {
        if n_streams == 0 {
            return Err(XcTaskError::Configuration(
                "a device backend needs at least one stream".to_string(),
            ));
        }
        Ok(Self {
            strategy,
            n_streams,
        })
    }
}

impl Backend for DeviceBackend {
    fn execution_space(&self) -> ExecutionSpace {
        ExecutionSpace::Device
    }

    fn strategy(&self) -> BalanceStrategy {
        self.strategy
    }

    fn n_lanes(&self) -> usize {
        self.n_streams
    }

    fn default_cost_model(&self) -> CostModel {
        CostModel::CollocationAndContraction
    }

    fn partition(
        &self,
        grid: &MolecularGrid,
        dist_nearest: &[f64],
        basis: &BasisSet,
        params: &PartitionParams,
    ) -> Result<TaskSet, XcTaskError> {
        params.validate()?;
        check_atom_count(grid, dist_nearest)?;
        let atom_partitions = grid
            .atomic_grids()
            .par_iter()
            .zip(dist_nearest.par_iter())
            .enumerate()
            .map(|(iatom, (atomic_grid, dist))| {
                partition_atom(iatom, atomic_grid, *dist, basis, params)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assemble(atom_partitions, grid, params.pv))
    }

    fn gather(&self, task: &Task, global: &ArrayView2<f64>) -> Result<Array2<f64>, XcTaskError> {
        let (nrows, ncols) = global.dim();
        let dim = nrows.min(ncols);
        let flat_cuts = flatten_cuts(&task.cuts);
        let compact = match global.as_slice() {
            Some(arena) => packing::gather_strided(&flat_cuts, arena, dim, ncols)?,
            None => {
                let arena = global.iter().copied().collect_vec();
                packing::gather_strided(&flat_cuts, &arena, dim, ncols)?
            }
        };
        Array2::from_shape_vec((task.nbe(), task.nbe()), compact)
            .map_err(|err| XcTaskError::Configuration(err.to_string()))
    }

    fn scatter_add(
        &self,
        task: &Task,
        compact: &ArrayView2<f64>,
        global: &mut ArrayViewMut2<f64>,
    ) -> Result<(), XcTaskError> {
        let (nrows, ncols) = global.dim();
        let dim = nrows.min(ncols);
        let compact = compact.iter().copied().collect_vec();
        let flat_cuts = flatten_cuts(&task.cuts);
        match global.as_slice_mut() {
            Some(arena) => packing::scatter_add_strided(&flat_cuts, &compact, arena, dim, ncols),
            None => {
                log::debug!("Global matrix is not contiguous; staging it through a copy.");
                let mut arena = global.iter().copied().collect_vec();
                packing::scatter_add_strided(&flat_cuts, &compact, &mut arena, dim, ncols)?;
                global
                    .iter_mut()
                    .zip(arena)
                    .for_each(|(g, a)| *g = a);
                Ok(())
            }
        }
    }
}

// =========
// Functions
// =========

/// Selects a backend for an execution space and a strategy name.
///
/// # Arguments
///
/// * `space` - The execution space.
/// * `strategy` - The strategy name, matched case-insensitively.
/// * `n_lanes` - The number of worker threads (host) or streams (device) per rank.
///
/// # Errors
///
/// Errors if the strategy is unknown or there are no lanes.
pub fn make_backend(
    space: ExecutionSpace,
    strategy: &str,
    n_lanes: usize,
) -> Result<Box<dyn Backend>, XcTaskError> {
    let strategy = strategy.parse::<BalanceStrategy>()?;
    let backend: Box<dyn Backend> = match space {
        ExecutionSpace::Host => Box::new(HostBackend::new(strategy, n_lanes)?),
        ExecutionSpace::Device => Box::new(DeviceBackend::new(strategy, n_lanes)?),
    };
    log::debug!("Selected a {space} backend with {n_lanes} lane(s) and the {strategy} strategy.");
    Ok(backend)
}
