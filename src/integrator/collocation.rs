//! Evaluation of basis functions and their first derivatives on quadrature points.

use itertools::Itertools;
use nalgebra::Point3;
use ndarray::Array2;

use crate::basis::ao::ShellOrder;
use crate::basis::shell::{BasisSet, BasisShellContraction};
use crate::error::XcTaskError;

/// A Cartesian monomial $`x^{l_x} y^{l_y} z^{l_z}`$ with a coefficient.
type Monomial = (f64, (u32, u32, u32));

/// Basis function values, and optionally their gradients, on a set of points.
#[derive(Clone, Debug)]
pub struct Collocation {
    /// The function values, $`n_{\mathrm{pts}} \times n_{\mathrm{be}}`$.
    pub values: Array2<f64>,

    /// The $`x`$, $`y`$, and $`z`$ derivatives, each $`n_{\mathrm{pts}} \times n_{\mathrm{be}}`$.
    pub gradients: Option<[Array2<f64>; 3]>,
}

/// The angular parts of the functions of a shell as sums of Cartesian monomials, in shell order.
///
/// Pure functions up to $`l = 2`$ are unnormalised real solid harmonics; with primitives
/// normalised for the $`x^l`$ component they are normalised.
fn angular_monomials(shell: &BasisShellContraction) -> Result<Vec<Vec<Monomial>>, XcTaskError> {
    match &shell.basis_shell().shell_order {
        ShellOrder::Cart(cart_order) => Ok(cart_order
            .iter()
            .map(|&lxyz| vec![(1.0, lxyz)])
            .collect_vec()),
        ShellOrder::Pure(pure_order) => pure_order
            .iter()
            .map(|&m| solid_harmonic(pure_order.lpure, m))
            .collect::<Result<Vec<_>, _>>(),
    }
}

fn solid_harmonic(l: u32, m: i32) -> Result<Vec<Monomial>, XcTaskError> {
    let sqrt3 = 3.0f64.sqrt();
    let terms = match (l, m) {
        (0, 0) => vec![(1.0, (0, 0, 0))],
        (1, -1) => vec![(1.0, (0, 1, 0))],
        (1, 0) => vec![(1.0, (0, 0, 1))],
        (1, 1) => vec![(1.0, (1, 0, 0))],
        (2, -2) => vec![(sqrt3, (1, 1, 0))],
        (2, -1) => vec![(sqrt3, (0, 1, 1))],
        (2, 0) => vec![(1.0, (0, 0, 2)), (-0.5, (2, 0, 0)), (-0.5, (0, 2, 0))],
        (2, 1) => vec![(sqrt3, (1, 0, 1))],
        (2, 2) => vec![
            (sqrt3 / 2.0, (2, 0, 0)),
            (-sqrt3 / 2.0, (0, 2, 0)),
        ],
        _ => {
            return Err(XcTaskError::Configuration(format!(
                "pure shells with l = {l} cannot be collocated; use Cartesian functions instead"
            )))
        }
    };
    Ok(terms)
}

/// $`x^n`$ and its derivative $`n x^{n-1}`$.
fn power_with_derivative(x: f64, n: u32) -> (f64, f64) {
    match n {
        0 => (1.0, 0.0),
        _ => {
            let n_i32 = n as i32;
            (x.powi(n_i32), f64::from(n) * x.powi(n_i32 - 1))
        }
    }
}

/// Evaluates the functions of the listed shells, in shell order, on a set of points.
///
/// # Arguments
///
/// * `basis` - The basis set.
/// * `shell_list` - The shells to evaluate.
/// * `points` - The quadrature points.
/// * `with_gradients` - Boolean indicating if first derivatives are also required.
///
/// # Errors
///
/// Errors if a pure shell has an angular momentum above two.
pub fn collocate(
    basis: &BasisSet,
    shell_list: &[usize],
    points: &[Point3<f64>],
    with_gradients: bool,
) -> Result<Collocation, XcTaskError> {
    let nbe = shell_list.iter().map(|&ishell| basis[ishell].n_funcs()).sum::<usize>();
    let npts = points.len();
    let mut values = Array2::<f64>::zeros((npts, nbe));
    let mut gradients = with_gradients.then(|| {
        [
            Array2::<f64>::zeros((npts, nbe)),
            Array2::<f64>::zeros((npts, nbe)),
            Array2::<f64>::zeros((npts, nbe)),
        ]
    });

    let mut ibf = 0;
    for &ishell in shell_list.iter() {
        let shell = &basis[ishell];
        let angular = angular_monomials(shell)?;
        for (ipt, point) in points.iter().enumerate() {
            let r = point - shell.cart_origin();
            let r2 = r.norm_squared();
            let (radial, radial_slope) = shell.contraction.primitives.iter().fold(
                (0.0, 0.0),
                |(f, df), &(alpha, c)| {
                    let g = c * (-alpha * r2).exp();
                    (f + g, df - 2.0 * alpha * g)
                },
            );
            for (icomp, terms) in angular.iter().enumerate() {
                let mut a = 0.0;
                let mut da = [0.0; 3];
                for &(coeff, (lx, ly, lz)) in terms.iter() {
                    let (px, dpx) = power_with_derivative(r.x, lx);
                    let (py, dpy) = power_with_derivative(r.y, ly);
                    let (pz, dpz) = power_with_derivative(r.z, lz);
                    a += coeff * px * py * pz;
                    da[0] += coeff * dpx * py * pz;
                    da[1] += coeff * px * dpy * pz;
                    da[2] += coeff * px * py * dpz;
                }
                values[(ipt, ibf + icomp)] = a * radial;
                if let Some(grads) = gradients.as_mut() {
                    for (k, grad) in grads.iter_mut().enumerate() {
                        grad[(ipt, ibf + icomp)] = da[k] * radial + a * r[k] * radial_slope;
                    }
                }
            }
        }
        ibf += shell.n_funcs();
    }
    Ok(Collocation { values, gradients })
}
