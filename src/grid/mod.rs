//! Atom-centred quadrature grids.

use std::fmt;

use anyhow::{self, ensure};
use itertools::Itertools;
use log;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::auxiliary::atom::Atom;
use crate::auxiliary::molecule::Molecule;

pub mod becke;

#[cfg(test)]
#[path = "grid_tests.rs"]
mod grid_tests;

// ==================
// Struct definitions
// ==================

// --------------
// AtomicGridSize
// --------------

/// An enumerated type for the size of the product grid on every atom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomicGridSize {
    /// 75 radial shells and a 12 × 25 angular product grid.
    Fine,

    /// 99 radial shells and a 17 × 34 angular product grid.
    UltraFine,

    /// 175 radial shells and a 22 × 44 angular product grid.
    SuperFine,

    /// Explicit numbers of radial shells, polar ($`\cos\theta`$) nodes, and azimuthal nodes.
    Explicit {
        n_radial: usize,
        n_theta: usize,
        n_phi: usize,
    },
}

impl Default for AtomicGridSize {
    fn default() -> Self {
        AtomicGridSize::UltraFine
    }
}

impl AtomicGridSize {
    /// Returns the numbers of radial shells, polar nodes, and azimuthal nodes.
    pub fn dims(&self) -> (usize, usize, usize) {
        match self {
            AtomicGridSize::Fine => (75, 12, 25),
            AtomicGridSize::UltraFine => (99, 17, 34),
            AtomicGridSize::SuperFine => (175, 22, 44),
            AtomicGridSize::Explicit {
                n_radial,
                n_theta,
                n_phi,
            } => (*n_radial, *n_theta, *n_phi),
        }
    }

    /// The number of points on a single atom.
    pub fn n_points_per_atom(&self) -> usize {
        let (n_radial, n_theta, n_phi) = self.dims();
        n_radial * n_theta * n_phi
    }
}

impl fmt::Display for AtomicGridSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n_radial, n_theta, n_phi) = self.dims();
        let name = match self {
            AtomicGridSize::Fine => "Fine",
            AtomicGridSize::UltraFine => "UltraFine",
            AtomicGridSize::SuperFine => "SuperFine",
            AtomicGridSize::Explicit { .. } => "Explicit",
        };
        write!(
            f,
            "{name} ({n_radial} radial × {} angular)",
            n_theta * n_phi
        )
    }
}

// ----------
// AtomicGrid
// ----------

/// A structure containing the raw quadrature on one atom, before any partitioning of space
/// between atoms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtomicGrid {
    /// The centre of this grid in Bohr.
    pub center: Point3<f64>,

    /// The quadrature points in Bohr.
    pub points: Vec<Point3<f64>>,

    /// The raw quadrature weights.
    pub weights: Vec<f64>,
}

impl AtomicGrid {
    /// Constructs the Mura–Knowles × Gauss–Legendre/uniform product grid on an atom.
    ///
    /// Points are ordered radial shell by radial shell, and within each shell polar node by
    /// polar node.
    ///
    /// # Arguments
    ///
    /// * `atom` - The atom carrying this grid.
    /// * `size` - The size of the grid.
    pub fn new(atom: &Atom, size: &AtomicGridSize) -> Result<Self, anyhow::Error> {
        let (n_radial, n_theta, n_phi) = size.dims();
        ensure!(
            n_radial > 0 && n_theta > 0 && n_phi > 0,
            "Empty atomic grid dimensions ({n_radial}, {n_theta}, {n_phi})."
        );
        let alpha = if atom.is_alkali_like() { 7.0 } else { 5.0 };
        let radial = mura_knowles(n_radial, alpha);
        let angular = product_angular(n_theta, n_phi);

        let (points, weights): (Vec<_>, Vec<_>) = radial
            .iter()
            .cartesian_product(angular.iter())
            .map(|((r, wr), (u, wa))| (atom.coordinates + u * *r, wr * wa))
            .unzip();
        Ok(Self {
            center: atom.coordinates,
            points,
            weights,
        })
    }

    /// The number of points in this grid.
    pub fn n_points(&self) -> usize {
        self.points.len()
    }
}

// -------------
// MolecularGrid
// -------------

/// A structure containing one raw atomic grid per atom of a molecule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MolecularGrid {
    /// The size of every atomic grid.
    size: AtomicGridSize,

    /// The atomic grids, in atom order.
    atomic_grids: Vec<AtomicGrid>,
}

impl MolecularGrid {
    /// Constructs the atomic grids of all atoms in a molecule.
    pub fn new(mol: &Molecule, size: &AtomicGridSize) -> Result<Self, anyhow::Error> {
        let atomic_grids = mol
            .atoms
            .par_iter()
            .map(|atom| AtomicGrid::new(atom, size))
            .collect::<Result<Vec<_>, _>>()?;
        let grid = Self {
            size: *size,
            atomic_grids,
        };
        log::debug!(
            "Molecular grid {} built with {} points over {} atoms.",
            grid.size,
            grid.n_points(),
            grid.n_atoms()
        );
        Ok(grid)
    }

    /// The size of every atomic grid.
    pub fn size(&self) -> &AtomicGridSize {
        &self.size
    }

    /// The atomic grids, in atom order.
    pub fn atomic_grids(&self) -> &[AtomicGrid] {
        &self.atomic_grids
    }

    /// The number of atoms carrying a grid.
    pub fn n_atoms(&self) -> usize {
        self.atomic_grids.len()
    }

    /// The total number of points across all atomic grids.
    pub fn n_points(&self) -> usize {
        self.atomic_grids.iter().map(|grid| grid.n_points()).sum()
    }
}

// =========
// Functions
// =========

/// Mura–Knowles radial quadrature with $`n`$ shells,
///
/// ```math
///     r_i = -\alpha \ln(1 - x_i^3), \qquad x_i = \frac{i}{n + 1},
/// ```
///
/// with weights that include the $`r^2`$ Jacobian. Returns `(r_i, w_i)` pairs.
pub(crate) fn mura_knowles(n: usize, alpha: f64) -> Vec<(f64, f64)> {
    let h = 1.0 / (n as f64 + 1.0);
    (1..=n)
        .map(|i| {
            let x = i as f64 * h;
            let x3 = x.powi(3);
            let r = -alpha * (1.0 - x3).ln();
            let w = h * 3.0 * alpha * x * x / (1.0 - x3) * r * r;
            (r, w)
        })
        .collect_vec()
}

/// Gauss–Legendre nodes and weights on $`[-1, 1]`$, by Newton iteration on $`P_n`$.
pub(crate) fn gauss_legendre(n: usize) -> Vec<(f64, f64)> {
    let nf = n as f64;
    let mut nodes = vec![(0.0, 0.0); n];
    for i in 0..(n + 1) / 2 {
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        for _ in 0..100 {
            let (p, dp) = legendre_with_derivative(n, x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre_with_derivative(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        nodes[i] = (-x, w);
        nodes[n - 1 - i] = (x, w);
    }
    nodes
}

/// Evaluates $`P_n(x)`$ and $`P_n'(x)`$ by the three-term recurrence.
fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let (mut p0, mut p1) = (1.0, x);
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

/// Unit-sphere product quadrature of Gauss–Legendre nodes in $`\cos\theta`$ and uniform nodes
/// in $`\phi`$. The weights sum to $`4\pi`$.
pub(crate) fn product_angular(n_theta: usize, n_phi: usize) -> Vec<(Vector3<f64>, f64)> {
    let dphi = 2.0 * std::f64::consts::PI / n_phi as f64;
    gauss_legendre(n_theta)
        .into_iter()
        .cartesian_product(0..n_phi)
        .map(|((cos_theta, w_theta), j)| {
            let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
            let phi = (j as f64 + 0.5) * dphi;
            (
                Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta),
                w_theta * dphi,
            )
        })
        .collect_vec()
}
