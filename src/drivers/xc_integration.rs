use std::fmt;
use std::thread;

use anyhow::{self, bail, ensure, format_err, Context};
use derive_builder::Builder;
use itertools::Itertools;
use log;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::backend::Backend;
use crate::basis::shell::BasisSet;
use crate::comm::{
    aborted_error, AbortOnPanic, Communicator, LocalWorld, SerialCommunicator,
};
use crate::drivers::grid_partitioning::GridPartitioningResult;
use crate::drivers::XcTaskDriver;
use crate::error::XcTaskError;
use crate::integrator::kernel::{SlaterExchangeKernel, XcOperation};
use crate::integrator::{XcIntegrator, XcResult};
use crate::io::format::{
    log_report, log_stage_title, nice_save_target, xctask_output, xctask_warn, Stage,
    XcTaskOutput,
};
use crate::io::{write_xctask_binary, XcTaskFileType};

#[cfg(test)]
#[path = "xc_integration_tests.rs"]
mod xc_integration_tests;

/// Largest element-wise deviation of the density matrix from symmetry tolerated silently.
const DENSITY_SYMMETRY_THRESHOLD: f64 = 1e-10;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// A structure containing control parameters for exchange integration over partitioned tasks.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XcIntegrationParams {
    /// The quantities to integrate.
    #[builder(default)]
    pub operation: XcOperation,

    /// Optional name for saving the result as a binary file of type [`XcTaskFileType::Int`]. If
    /// `None`, the result will not be saved.
    #[builder(default = "None")]
    pub result_save_name: Option<String>,
}

impl XcIntegrationParams {
    /// Returns a builder to construct a [`XcIntegrationParams`] structure.
    pub fn builder() -> XcIntegrationParamsBuilder {
        XcIntegrationParamsBuilder::default()
    }
}

impl Default for XcIntegrationParams {
    fn default() -> Self {
        XcIntegrationParams::builder()
            .build()
            .expect("Unable to construct a default `XcIntegrationParams`.")
    }
}

impl fmt::Display for XcIntegrationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Operation: {}", self.operation)?;
        writeln!(f, "Functional: Slater exchange")?;
        writeln!(
            f,
            "Save integration results to file: {}",
            nice_save_target(self.result_save_name.as_ref(), XcTaskFileType::Int)
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure to contain exchange-integration results.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
pub struct XcIntegrationResult {
    /// The control parameters used to obtain this set of results.
    pub parameters: XcIntegrationParams,

    /// The number of ranks the integration was distributed over.
    pub n_ranks: usize,

    /// The integrated quantities, identical on every rank.
    pub xc: XcResult,
}

impl XcIntegrationResult {
    /// Returns a builder to construct a [`XcIntegrationResult`] structure.
    fn builder() -> XcIntegrationResultBuilder {
        XcIntegrationResultBuilder::default()
    }
}

impl fmt::Display for XcIntegrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ranks: {}", self.n_ranks)?;
        write!(f, "{}", self.xc)?;
        Ok(())
    }
}

// ------
// Driver
// ------

/// A driver for exchange integration over a partitioned and balanced grid.
///
/// If no communicator is given, every rank of the partitioning is run in-process on its own
/// thread and the (identical) rank results are cross-checked.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct XcIntegrationDriver<'a> {
    /// The control parameters for exchange integration.
    parameters: &'a XcIntegrationParams,

    /// The molecule the grid was built on.
    molecule: &'a Molecule,

    /// The basis set the tasks were screened against.
    basis: &'a BasisSet,

    /// The partitioned and balanced tasks.
    partitioning: &'a GridPartitioningResult,

    /// The $`n_{\mathrm{bf}} \times n_{\mathrm{bf}}`$ density matrix.
    density: &'a Array2<f64>,

    /// The communicator of the calling rank. If `None`, all ranks are run in-process.
    #[builder(default = "None")]
    communicator: Option<&'a dyn Communicator>,

    /// The result of the integration.
    #[builder(setter(skip), default = "None")]
    result: Option<XcIntegrationResult>,
}

impl<'a> XcIntegrationDriverBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let basis = self.basis.ok_or_else(|| "No basis set found.".to_string())?;
        let density = self
            .density
            .ok_or_else(|| "No density matrix found.".to_string())?;
        let nbf = basis.n_funcs();
        if density.dim() != (nbf, nbf) {
            return Err(format!(
                "The density matrix has shape {:?} but the basis set has {nbf} functions.",
                density.dim()
            ));
        }
        match (self.partitioning, self.communicator.flatten()) {
            (Some(partitioning), Some(comm)) if partitioning.balance.n_ranks() != comm.size() => {
                Err(format!(
                    "The tasks are balanced over {} rank(s) but the communicator has {}.",
                    partitioning.balance.n_ranks(),
                    comm.size()
                ))
            }
            (None, _) => Err("No partitioning results found.".to_string()),
            _ => Ok(()),
        }
    }
}

impl<'a> XcIntegrationDriver<'a> {
    /// Returns a builder to construct a [`XcIntegrationDriver`] structure.
    pub fn builder() -> XcIntegrationDriverBuilder<'a> {
        XcIntegrationDriverBuilder::default()
    }

    /// Integrates on one rank. A rank that fails to set up aborts the communicator.
    fn integrate_rank(
        &self,
        backend: &dyn Backend,
        comm: &dyn Communicator,
    ) -> Result<XcResult, XcTaskError> {
        let kernel = SlaterExchangeKernel;
        let integrator = XcIntegrator::new(
            backend,
            &kernel,
            comm,
            self.molecule,
            self.basis,
            &self.partitioning.task_set,
            &self.partitioning.balance,
        )
        .map_err(|err| {
            comm.abort();
            err
        })?;
        log::debug!(
            "Rank {} integrates {} of {} task(s).",
            comm.rank(),
            integrator.n_local_tasks(),
            self.partitioning.task_set.n_tasks()
        );
        integrator.integrate(self.parameters.operation, &self.density.view())
    }

    /// Runs every rank of the partitioning on its own thread and returns the result of rank 0.
    fn integrate_local_world(&self, backend: &dyn Backend) -> Result<XcResult, anyhow::Error> {
        let n_ranks = self.partitioning.balance.n_ranks();
        if n_ranks == 1 {
            return Ok(self.integrate_rank(backend, &SerialCommunicator)?);
        }
        let comms = LocalWorld::create(n_ranks)?;
        let rank_results = thread::scope(|s| {
            let handles = comms
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let _guard = AbortOnPanic(comm);
                        self.integrate_rank(backend, comm)
                    })
                })
                .collect_vec();
            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect_vec()
        });

        // Ranks released by an abort only report that another rank failed, so the failure of
        // the rank that aborted is reported instead.
        let mut failures = rank_results
            .iter()
            .enumerate()
            .filter_map(|(rank, joined)| match joined {
                Ok(Ok(_)) => None,
                Ok(Err(err)) => Some((*err == aborted_error(), rank, err.to_string())),
                Err(_) => Some((false, rank, "the rank thread panicked".to_string())),
            })
            .collect_vec();
        failures.sort();
        if let Some((_, rank, msg)) = failures.first() {
            bail!("Integration failed on rank {rank}: {msg}");
        }

        let rank_results = rank_results
            .into_iter()
            .filter_map(|joined| joined.ok().and_then(Result::ok))
            .collect_vec();
        let (first, rest) = rank_results
            .split_first()
            .ok_or_else(|| format_err!("No rank results found."))?;
        ensure!(
            rest.iter().all(|result| result == first),
            "Ranks disagree on the reduced integration results."
        );
        Ok(first.clone())
    }

    /// Executes exchange integration.
    fn integrate(&mut self) -> Result<(), anyhow::Error> {
        log_stage_title(Stage::ExchangeIntegration);
        let params = self.parameters;
        params.log_output_display();

        let asymmetry = (self.density - &self.density.t())
            .iter()
            .fold(0.0f64, |acc, x| acc.max(x.abs()));
        if asymmetry > DENSITY_SYMMETRY_THRESHOLD {
            xctask_warn!(
                "Density matrix asymmetry {asymmetry:.3e}: only its symmetric part is integrated."
            );
        }

        let backend = self.partitioning.parameters.backend()?;
        if self.partitioning.task_set.tasks.iter().any(|task| task.is_stripped()) {
            bail!("The partitioned tasks were saved without their grid points.");
        }
        let (n_ranks, xc) = match self.communicator {
            Some(comm) => (
                comm.size(),
                self.integrate_rank(backend.as_ref(), comm)
                    .with_context(|| format!("Integration failed on rank {}", comm.rank()))?,
            ),
            None => (
                self.partitioning.balance.n_ranks(),
                self.integrate_local_world(backend.as_ref())?,
            ),
        };

        let result = XcIntegrationResult::builder()
            .parameters(params.clone())
            .n_ranks(n_ranks)
            .xc(xc)
            .build()?;
        log_report("Integrated quantities", &result);

        let is_root = self.communicator.map(|comm| comm.rank() == 0).unwrap_or(true);
        if let (true, Some(name)) = (is_root, params.result_save_name.as_ref()) {
            write_xctask_binary(name, XcTaskFileType::Int, &result)?;
            xctask_output!(
                "Integration results saved as {}.",
                XcTaskFileType::Int.path_for(name).display()
            );
            xctask_output!("");
        }
        self.result = Some(result);
        Ok(())
    }
}

impl<'a> XcTaskDriver for XcIntegrationDriver<'a> {
    type Params = XcIntegrationParams;

    type Outcome = XcIntegrationResult;

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.integrate()
    }

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No exchange-integration results found."))
    }
}
