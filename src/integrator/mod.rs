//! Lane-parallel integration of exchange quantities over a balanced task set.
//!
//! Every rank owns the tasks the load balancer assigned to it, split into lanes. Lanes run
//! concurrently, each accumulating into a private [`LaneAccumulator`]; lane accumulators are
//! then merged in lane order on one thread, and the per-rank totals are summed across ranks by
//! the communicator.

use std::fmt;

use itertools::Itertools;
use log;
use ndarray::{s, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::backend::Backend;
use crate::balance::LoadBalance;
use crate::basis::shell::BasisSet;
use crate::comm::Communicator;
use crate::error::XcTaskError;
use crate::grid::becke::BeckePartition;
use crate::packing;
use crate::task::{Task, TaskSet};

pub mod collocation;
pub mod kernel;
pub mod lda;

use kernel::{KernelContribution, TaskKernel, XcOperation};


// ==================
// Struct definitions
// ==================

// ---------------
// LaneAccumulator
// ---------------

/// The private accumulator of one lane, in the global basis-function space.
#[derive(Clone, Debug, PartialEq)]
pub struct LaneAccumulator {
    /// The accumulated electron count.
    pub n_electrons: f64,

    /// The accumulated exchange energy.
    pub exc: f64,

    /// The accumulated $`n_{\mathrm{bf}} \times n_{\mathrm{bf}}`$ potential matrix.
    pub vxc: Option<Array2<f64>>,

    /// The accumulated $`n_{\mathrm{bf}} \times 3`$ per-function gradient.
    pub grad: Option<Array2<f64>>,
}

impl LaneAccumulator {
    /// Creates an empty accumulator for an operation over `nbf` basis functions.
    pub fn new(operation: XcOperation, nbf: usize) -> Self {
        Self {
            n_electrons: 0.0,
            exc: 0.0,
            vxc: (operation == XcOperation::ExcVxc).then(|| Array2::zeros((nbf, nbf))),
            grad: (operation == XcOperation::ExcGrad).then(|| Array2::zeros((nbf, 3))),
        }
    }

    /// Scatters the contribution of a task into this accumulator.
    ///
    /// # Errors
    ///
    /// Errors if the contribution lacks a quantity this accumulator collects, or if packing
    /// fails.
    pub fn absorb(
        &mut self,
        backend: &dyn Backend,
        task: &Task,
        contribution: KernelContribution,
    ) -> Result<(), XcTaskError> {
        self.n_electrons += contribution.n_electrons;
        self.exc += contribution.exc;
        if let Some(vxc) = self.vxc.as_mut() {
            let compact = contribution.vxc.ok_or_else(|| {
                XcTaskError::Configuration("kernel returned no potential matrix".to_string())
            })?;
            backend.scatter_add(task, &compact.view(), &mut vxc.view_mut())?;
        }
        if let Some(grad) = self.grad.as_mut() {
            let compact = contribution.grad.ok_or_else(|| {
                XcTaskError::Configuration("kernel returned no gradient".to_string())
            })?;
            packing::scatter_add_rows(task, &compact.view(), &mut grad.view_mut())?;
        }
        Ok(())
    }

    /// Adds another accumulator of the same shape into this one.
    pub fn merge(&mut self, other: &LaneAccumulator) {
        self.n_electrons += other.n_electrons;
        self.exc += other.exc;
        if let (Some(mine), Some(theirs)) = (self.vxc.as_mut(), other.vxc.as_ref()) {
            *mine += theirs;
        }
        if let (Some(mine), Some(theirs)) = (self.grad.as_mut(), other.grad.as_ref()) {
            *mine += theirs;
        }
    }

    /// Packs every accumulated value into one buffer for collective reduction.
    fn to_flat(&self) -> Vec<f64> {
        [self.n_electrons, self.exc]
            .into_iter()
            .chain(self.vxc.iter().flat_map(|vxc| vxc.iter().copied()))
            .chain(self.grad.iter().flat_map(|grad| grad.iter().copied()))
            .collect_vec()
    }

    /// Unpacks a buffer produced by [`Self::to_flat`] on an accumulator of the same shape.
    fn assign_flat(&mut self, flat: &[f64]) {
        self.n_electrons = flat[0];
        self.exc = flat[1];
        let mut rest = flat[2..].iter();
        if let Some(vxc) = self.vxc.as_mut() {
            vxc.iter_mut().zip(rest.by_ref()).for_each(|(v, f)| *v = *f);
        }
        if let Some(grad) = self.grad.as_mut() {
            grad.iter_mut().zip(rest).for_each(|(g, f)| *g = *f);
        }
    }
}

// --------
// XcResult
// --------

/// The integrated quantities of one operation, summed over all ranks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XcResult {
    /// The operation performed.
    pub operation: XcOperation,

    /// The integrated electron count.
    pub n_electrons: f64,

    /// The exchange energy, unless only the density was integrated.
    pub exc: Option<f64>,

    /// The $`n_{\mathrm{bf}} \times n_{\mathrm{bf}}`$ exchange potential matrix.
    pub vxc: Option<Array2<f64>>,

    /// The $`n_{\mathrm{atoms}} \times 3`$ nuclear gradient of the exchange energy.
    pub gradient: Option<Array2<f64>>,
}

impl fmt::Display for XcResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Operation: {}", self.operation)?;
        writeln!(f, "Integrated electrons: {:+.10}", self.n_electrons)?;
        if let Some(exc) = self.exc {
            writeln!(f, "Exchange energy: {exc:+.10} Eh")?;
        }
        if let Some(vxc) = self.vxc.as_ref() {
            writeln!(
                f,
                "Potential matrix: {} × {}, trace {:+.10}",
                vxc.nrows(),
                vxc.ncols(),
                vxc.diag().sum()
            )?;
        }
        if let Some(gradient) = self.gradient.as_ref() {
            writeln!(f, "Nuclear gradient (Eh/bohr):")?;
            writeln!(f, "{:>6} {:>16} {:>16} {:>16}", "Atom", "x", "y", "z")?;
            for (iatom, row) in gradient.axis_iter(Axis(0)).enumerate() {
                writeln!(
                    f,
                    "{iatom:>6} {:>+16.10} {:>+16.10} {:>+16.10}",
                    row[0], row[1], row[2]
                )?;
            }
        }
        Ok(())
    }
}

// ------------
// XcIntegrator
// ------------

/// The integrator of one rank.
pub struct XcIntegrator<'a> {
    backend: &'a dyn Backend,
    kernel: &'a dyn TaskKernel,
    comm: &'a dyn Communicator,
    basis: &'a BasisSet,
    n_atoms: usize,

    /// The tasks of every lane of this rank with their global task indices. Task weights
    /// include Becke partition factors.
    lanes: Vec<Vec<(usize, Task)>>,
}

impl<'a> XcIntegrator<'a> {
    /// Prepares the integrator of the communicator's rank.
    ///
    /// The tasks assigned to this rank are copied and their valid weights multiplied by the
    /// Becke partition factors of their parent atoms. Padding weights stay zero.
    ///
    /// # Errors
    ///
    /// Errors if the assignment does not match the task set, the communicator, or the backend's
    /// lanes, or if a local task has been stripped of its points.
    pub fn new(
        backend: &'a dyn Backend,
        kernel: &'a dyn TaskKernel,
        comm: &'a dyn Communicator,
        mol: &Molecule,
        basis: &'a BasisSet,
        task_set: &TaskSet,
        balance: &LoadBalance,
    ) -> Result<Self, XcTaskError> {
        if balance.assignments.len() != task_set.n_tasks() {
            return Err(XcTaskError::Configuration(format!(
                "{} assignments for {} tasks",
                balance.assignments.len(),
                task_set.n_tasks()
            )));
        }
        if balance.n_ranks() != comm.size() {
            return Err(XcTaskError::Configuration(format!(
                "tasks balanced over {} rank(s) but the communicator has {}",
                balance.n_ranks(),
                comm.size()
            )));
        }
        if balance.n_lanes() != backend.n_lanes() {
            return Err(XcTaskError::Configuration(format!(
                "tasks balanced over {} lane(s) but the backend has {}",
                balance.n_lanes(),
                backend.n_lanes()
            )));
        }

        let n_atoms = mol.n_atoms();
        let becke = BeckePartition::new(&mol.positions());
        let lanes = (0..balance.n_lanes())
            .map(|lane| {
                balance
                    .lane_task_indices(comm.rank(), lane)
                    .into_par_iter()
                    .map(|itask| {
                        partitioned_task(&task_set.tasks[itask], &becke, n_atoms)
                            .map(|task| (itask, task))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!(
            "Rank {} prepared {} task(s) over {} lane(s).",
            comm.rank(),
            lanes.iter().map(|tasks| tasks.len()).sum::<usize>(),
            lanes.len()
        );
        Ok(Self {
            backend,
            kernel,
            comm,
            basis,
            n_atoms,
            lanes,
        })
    }

    /// The number of tasks owned by this rank.
    pub fn n_local_tasks(&self) -> usize {
        self.lanes.iter().map(|tasks| tasks.len()).sum()
    }

    /// Processes the local lanes and merges their accumulators in lane order.
    fn integrate_local(
        &self,
        operation: XcOperation,
        density: &ArrayView2<f64>,
    ) -> Result<LaneAccumulator, XcTaskError> {
        let nbf = self.basis.n_funcs();
        if density.dim() != (nbf, nbf) {
            return Err(XcTaskError::Configuration(format!(
                "density matrix of shape {:?} for {nbf} basis functions",
                density.dim()
            )));
        }
        let lane_accumulators = self
            .lanes
            .par_iter()
            .map(|tasks| self.process_lane(operation, tasks, density))
            .collect::<Result<Vec<_>, _>>()?;
        let mut total = LaneAccumulator::new(operation, nbf);
        lane_accumulators
            .iter()
            .for_each(|accumulator| total.merge(accumulator));
        Ok(total)
    }

    /// Integrates an operation with a global density matrix. Every rank must call this
    /// collectively with the same operation. A rank whose local work fails aborts the
    /// communicator, so that the other ranks fail too instead of waiting for it.
    ///
    /// # Errors
    ///
    /// Errors if the density matrix has the wrong shape, or if packing, a kernel, or the
    /// reduction fails.
    pub fn integrate(
        &self,
        operation: XcOperation,
        density: &ArrayView2<f64>,
    ) -> Result<XcResult, XcTaskError> {
        let mut total = self.integrate_local(operation, density).map_err(|err| {
            self.comm.abort();
            err
        })?;

        let mut flat = total.to_flat();
        self.comm.all_reduce_sum(&mut flat)?;
        total.assign_flat(&flat);

        let gradient = total.grad.as_ref().map(|grad_funcs| {
            let mut gradient = Array2::<f64>::zeros((self.n_atoms, 3));
            for (iatom, (start, end)) in self
                .basis
                .atom_function_ranges(self.n_atoms)
                .into_iter()
                .enumerate()
            {
                gradient
                    .row_mut(iatom)
                    .assign(&grad_funcs.slice(s![start..end, ..]).sum_axis(Axis(0)));
            }
            gradient
        });
        log::debug!(
            "Rank {}: {operation} integrated over {} local task(s).",
            self.comm.rank(),
            self.n_local_tasks()
        );
        Ok(XcResult {
            operation,
            n_electrons: total.n_electrons,
            exc: (operation != XcOperation::IntegrateDen).then_some(total.exc),
            vxc: total.vxc,
            gradient,
        })
    }

    /// Integrates the density, returning the electron count.
    pub fn integrate_den(&self, density: &ArrayView2<f64>) -> Result<f64, XcTaskError> {
        Ok(self
            .integrate(XcOperation::IntegrateDen, density)?
            .n_electrons)
    }

    /// Evaluates the exchange energy and potential matrix.
    pub fn eval_exc_vxc(
        &self,
        density: &ArrayView2<f64>,
    ) -> Result<(f64, Array2<f64>), XcTaskError> {
        let result = self.integrate(XcOperation::ExcVxc, density)?;
        match (result.exc, result.vxc) {
            (Some(exc), Some(vxc)) => Ok((exc, vxc)),
            _ => Err(XcTaskError::Configuration(
                "exchange energy or potential missing".to_string(),
            )),
        }
    }

    /// Evaluates the exchange energy and its nuclear gradient, neglecting weight derivatives.
    pub fn eval_exc_grad(
        &self,
        density: &ArrayView2<f64>,
    ) -> Result<(f64, Array2<f64>), XcTaskError> {
        let result = self.integrate(XcOperation::ExcGrad, density)?;
        match (result.exc, result.gradient) {
            (Some(exc), Some(gradient)) => Ok((exc, gradient)),
            _ => Err(XcTaskError::Configuration(
                "exchange energy or gradient missing".to_string(),
            )),
        }
    }

    fn process_lane(
        &self,
        operation: XcOperation,
        tasks: &[(usize, Task)],
        density: &ArrayView2<f64>,
    ) -> Result<LaneAccumulator, XcTaskError> {
        let mut accumulator = LaneAccumulator::new(operation, self.basis.n_funcs());
        for (itask, task) in tasks.iter() {
            let compact = self
                .backend
                .gather(task, density)
                .map_err(|err| err.with_task(*itask))?;
            let contribution = self
                .kernel
                .evaluate(operation, task, self.basis, &compact)
                .map_err(|err| err.with_task(*itask))?;
            accumulator
                .absorb(self.backend, task, contribution)
                .map_err(|err| err.with_task(*itask))?;
        }
        Ok(accumulator)
    }
}

/// Copies a task with its valid weights multiplied by Becke partition factors.
fn partitioned_task(
    task: &Task,
    becke: &BeckePartition,
    n_atoms: usize,
) -> Result<Task, XcTaskError> {
    if task.is_stripped() {
        return Err(XcTaskError::Configuration(format!(
            "task on atom {} at offset {} has no points to integrate over",
            task.parent, task.range.offset
        )));
    }
    if task.parent >= n_atoms {
        return Err(XcTaskError::Configuration(format!(
            "task parent {} outside a molecule of {n_atoms} atoms",
            task.parent
        )));
    }
    let mut task = task.clone();
    let n_valid = task.n_valid();
    becke.apply(
        task.parent,
        &task.points[..n_valid],
        &mut task.weights[..n_valid],
    );
    Ok(task)
}
