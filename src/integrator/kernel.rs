//! Per-task numerical kernels.

use std::fmt;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::basis::shell::BasisSet;
use crate::error::XcTaskError;
use crate::integrator::collocation::collocate;
use crate::integrator::lda::slater_exchange;
use crate::task::Task;

/// An enumerated type for the quantities an integration pass produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XcOperation {
    /// The number of electrons.
    #[default]
    IntegrateDen,

    /// The exchange energy and the exchange potential matrix.
    ExcVxc,

    /// The exchange energy and its nuclear gradient.
    ExcGrad,
}

impl XcOperation {
    /// Checks if this operation needs basis-function derivatives.
    pub fn needs_gradients(&self) -> bool {
        matches!(self, XcOperation::ExcGrad)
    }
}

impl fmt::Display for XcOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XcOperation::IntegrateDen => write!(f, "Electron count"),
            XcOperation::ExcVxc => write!(f, "Exchange energy and potential"),
            XcOperation::ExcGrad => write!(f, "Exchange energy and nuclear gradient"),
        }
    }
}

/// The contribution of one task, in the task's compact basis-function space.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelContribution {
    /// The integrated density.
    pub n_electrons: f64,

    /// The exchange energy. Zero for [`XcOperation::IntegrateDen`].
    pub exc: f64,

    /// The compact $`n_{\mathrm{be}} \times n_{\mathrm{be}}`$ potential matrix, for
    /// [`XcOperation::ExcVxc`].
    pub vxc: Option<Array2<f64>>,

    /// The compact $`n_{\mathrm{be}} \times 3`$ per-function gradient, for
    /// [`XcOperation::ExcGrad`]. Summing the rows of the functions of an atom gives the gradient
    /// with respect to that atom's position.
    pub grad: Option<Array2<f64>>,
}

/// Trait for numerical kernels turning a task and its compact density into a contribution of
/// the same compact shape.
pub trait TaskKernel: Send + Sync {
    /// Evaluates the contribution of a task.
    ///
    /// # Arguments
    ///
    /// * `operation` - The quantities required.
    /// * `task` - The task, whose weights include partitioning factors.
    /// * `basis` - The basis set the task was screened against.
    /// * `density` - The compact $`n_{\mathrm{be}} \times n_{\mathrm{be}}`$ density matrix.
    fn evaluate(
        &self,
        operation: XcOperation,
        task: &Task,
        basis: &BasisSet,
        density: &Array2<f64>,
    ) -> Result<KernelContribution, XcTaskError>;
}

/// The reference kernel: Slater exchange on collocated basis functions.
#[derive(Clone, Copy, Debug, Default)]
pub struct SlaterExchangeKernel;

impl TaskKernel for SlaterExchangeKernel {
    fn evaluate(
        &self,
        operation: XcOperation,
        task: &Task,
        basis: &BasisSet,
        density: &Array2<f64>,
    ) -> Result<KernelContribution, XcTaskError> {
        let nbe = task.nbe();
        if density.dim() != (nbe, nbe) {
            return Err(XcTaskError::Configuration(format!(
                "compact density of shape {:?} for a task with {nbe} significant functions",
                density.dim()
            )));
        }
        let weights = task.valid_weights();
        let collocation = collocate(
            basis,
            task.shell_list(),
            task.valid_points(),
            operation.needs_gradients(),
        )?;
        let phi = &collocation.values;
        let x = phi.dot(density);
        let rho = (phi * &x).sum_axis(Axis(1));
        let n_electrons = weights.iter().zip(rho.iter()).map(|(w, r)| w * r).sum::<f64>();
        if operation == XcOperation::IntegrateDen {
            return Ok(KernelContribution {
                n_electrons,
                exc: 0.0,
                vxc: None,
                grad: None,
            });
        }

        let (e, v): (Vec<f64>, Vec<f64>) = rho.iter().map(|&r| slater_exchange(r)).unzip();
        let exc = weights.iter().zip(e.iter()).map(|(w, e)| w * e).sum::<f64>();
        let wv = Array1::from_iter(weights.iter().zip(v.iter()).map(|(w, v)| w * v));

        let vxc = (operation == XcOperation::ExcVxc).then(|| {
            let scaled = phi * &wv.view().insert_axis(Axis(1));
            let half = phi.t().dot(&scaled);
            (&half + &half.t()) * 0.5
        });

        let grad = match (operation, collocation.gradients.as_ref()) {
            (XcOperation::ExcGrad, Some(gradients)) => {
                let mut grad = Array2::<f64>::zeros((nbe, 3));
                for (k, dphi) in gradients.iter().enumerate() {
                    let column = (dphi * &x).t().dot(&wv) * -2.0;
                    grad.column_mut(k).assign(&column);
                }
                Some(grad)
            }
            _ => None,
        };

        Ok(KernelContribution {
            n_electrons,
            exc,
            vxc,
            grad,
        })
    }
}
