//! Input configuration for xctask.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{self, bail, ensure, Context};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::basis::shell::BasisSet;
use crate::drivers::grid_partitioning::{
    GridPartitioningDriver, GridPartitioningParams, GridPartitioningResult,
};
use crate::drivers::xc_integration::{XcIntegrationDriver, XcIntegrationParams};
use crate::drivers::XcTaskDriver;
use crate::interfaces::InputHandle;
use crate::io::format::{
    log_report, log_stage_begin, log_stage_end, xctask_error, xctask_output, Stage, XcTaskOutput,
};
use crate::io::{read_xctask_binary, XcTaskFileType};


fn default_tolerance() -> f64 {
    1e-10
}

// ==================
// Struct definitions
// ==================

/// A structure specifying the molecule of a calculation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoleculeInput {
    /// The `xyz` file containing the geometry.
    pub xyz: PathBuf,

    /// Boolean indicating if the coordinates in the `xyz` file are in Bohr rather than Ångström.
    #[serde(default)]
    pub bohr: bool,
}

/// A structure specifying the basis set of a calculation. Exactly one of [`Self::name`] and
/// [`Self::file`] must be given.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasisInput {
    /// The name of a built-in basis set (case-insensitive).
    #[serde(default)]
    pub name: Option<String>,

    /// A YAML basis-set file in the library format.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// The screening tolerance of every shell.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Boolean indicating if shells are Cartesian rather than pure.
    #[serde(default)]
    pub cart: bool,
}

impl BasisInput {
    /// Builds the basis set for a molecule.
    pub fn build(&self, mol: &Molecule) -> Result<BasisSet, anyhow::Error> {
        ensure!(
            self.tolerance > 0.0,
            "The shell screening tolerance must be positive, got {}.",
            self.tolerance
        );
        match (self.name.as_ref(), self.file.as_ref()) {
            (Some(name), None) => BasisSet::from_library(mol, name, self.cart, self.tolerance),
            (None, Some(file)) => BasisSet::from_yaml_file(mol, file, self.cart, self.tolerance),
            _ => bail!("Exactly one of `name` and `file` must be given for the basis set."),
        }
    }
}

/// An enumerated type representing possible input kinds for grid partitioning from a YAML input
/// file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GridPartitioningInputKind {
    /// Variant indicating that the parameters for the grid-partitioning driver will be
    /// specified.
    Parameters(GridPartitioningParams),

    /// Variant indicating that the partitioning results will be read in from an `xctask`
    /// [`XcTaskFileType::Tsk`] binary file. The associated string gives the name of the file
    /// without its `.xctask.tsk` extension.
    FromFile(String),
}

impl Default for GridPartitioningInputKind {
    fn default() -> Self {
        GridPartitioningInputKind::Parameters(GridPartitioningParams::default())
    }
}

/// A structure specifying an exchange integration over the partitioned grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XcIntegrationInput {
    /// The name of an `xctask` [`XcTaskFileType::Mat`] binary file containing the density
    /// matrix, without its `.xctask.mat` extension.
    pub density: String,

    /// The parameters for the integration driver.
    #[serde(default)]
    pub parameters: XcIntegrationParams,
}

/// A structure containing `xctask` input parameters which can be serialised into and
/// deserialised from a YAML input file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// The molecule.
    pub molecule: MoleculeInput,

    /// The basis set.
    pub basis: BasisInput,

    /// Grid partitioning: either its parameters, or the name of a [`XcTaskFileType::Tsk`] file
    /// holding a previous partitioning.
    ///
    /// If not specified, partitioning will be run with default parameters.
    #[serde(default)]
    pub grid_partitioning: GridPartitioningInputKind,

    /// Exchange integration. If `None`, no integration will be performed.
    #[serde(default)]
    pub xc_integration: Option<XcIntegrationInput>,
}

impl Input {
    /// Obtains the partitioning results, either by running the partitioning driver or by
    /// reading them in.
    fn partitioning(
        &self,
        mol: &Molecule,
        basis: &BasisSet,
    ) -> Result<GridPartitioningResult, anyhow::Error> {
        match &self.grid_partitioning {
            GridPartitioningInputKind::Parameters(params) => {
                let mut driver = GridPartitioningDriver::builder()
                    .parameters(params)
                    .molecule(mol)
                    .basis(basis)
                    .build()?;
                driver.run().map_err(|err| {
                    xctask_error!("Grid partitioning has failed with error:");
                    xctask_error!("  {err:#}");
                    err
                })?;
                Ok(driver.result()?.clone())
            }
            GridPartitioningInputKind::FromFile(name) => {
                let result = read_xctask_binary::<GridPartitioningResult, _>(
                    name,
                    XcTaskFileType::Tsk,
                )
                .with_context(|| format!("Unable to read partitioning results `{name}`"))?;
                ensure!(
                    result.task_set.tasks.iter().all(|task| task.parent < mol.n_atoms()),
                    "The partitioning results in `{name}` refer to atoms outside the molecule."
                );
                log_report(
                    &format!(
                        "Grid partitioning results read in from {}",
                        XcTaskFileType::Tsk.path_for(name).display()
                    ),
                    &result,
                );
                Ok(result)
            }
        }
    }
}

impl InputHandle for Input {
    /// Runs the requested calculations.
    fn handle(&self) -> Result<(), anyhow::Error> {
        let mol = Molecule::from_xyz(&self.molecule.xyz, self.molecule.bohr)?;
        let basis = self.basis.build(&mol)?;
        log_report("System", &mol);
        basis.log_output_display();
        xctask_output!("");

        let start = Instant::now();
        log_stage_begin(Stage::GridPartitioning);
        let partitioning = self.partitioning(&mol, &basis)?;
        log_stage_end(Stage::GridPartitioning, start.elapsed());

        if let Some(integration) = self.xc_integration.as_ref() {
            let density =
                read_xctask_binary::<Array2<f64>, _>(&integration.density, XcTaskFileType::Mat)
                    .with_context(|| {
                        format!("Unable to read density matrix `{}`", integration.density)
                    })?;
            let start = Instant::now();
            log_stage_begin(Stage::ExchangeIntegration);
            let mut driver = XcIntegrationDriver::builder()
                .parameters(&integration.parameters)
                .molecule(&mol)
                .basis(&basis)
                .partitioning(&partitioning)
                .density(&density)
                .build()?;
            driver.run().map_err(|err| {
                xctask_error!("Exchange integration has failed with error:");
                xctask_error!("  {err:#}");
                err
            })?;
            log_stage_end(Stage::ExchangeIntegration, start.elapsed());
        }
        Ok(())
    }
}
