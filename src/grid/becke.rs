//! Becke fuzzy-cell partitioning of space between atoms.

use nalgebra::Point3;
use ndarray::Array2;

/// Number of iterations of the Becke cell function.
const BECKE_ITERATIONS: usize = 3;

/// A structure to compute Becke partition factors for a fixed set of atomic centres.
#[derive(Clone, Debug)]
pub struct BeckePartition {
    /// The atomic centres in Bohr.
    centers: Vec<Point3<f64>>,

    /// The inverse interatomic distances. Diagonal entries are zero.
    inv_dists: Array2<f64>,
}

impl BeckePartition {
    /// Prepares the partitioning for a set of atomic centres.
    pub fn new(centers: &[Point3<f64>]) -> Self {
        let n = centers.len();
        let inv_dists = Array2::from_shape_fn((n, n), |(a, b)| {
            if a == b {
                0.0
            } else {
                1.0 / (centers[a] - centers[b]).norm()
            }
        });
        Self {
            centers: centers.to_vec(),
            inv_dists,
        }
    }

    /// The Becke partition factor $`w_A(\mathbf{r})`$ of atom `parent` at `point`. The factors of
    /// all atoms sum to one at every point.
    pub fn partition_factor(&self, parent: usize, point: &Point3<f64>) -> f64 {
        let n = self.centers.len();
        if n == 1 {
            return 1.0;
        }
        let dists = self
            .centers
            .iter()
            .map(|c| (point - c).norm())
            .collect::<Vec<_>>();
        let cell = |a: usize| -> f64 {
            (0..n)
                .filter(|&b| b != a)
                .map(|b| {
                    let mu = (dists[a] - dists[b]) * self.inv_dists[(a, b)];
                    0.5 * (1.0 - becke_polynomial(mu))
                })
                .product()
        };
        let total = (0..n).map(cell).sum::<f64>();
        if total == 0.0 {
            0.0
        } else {
            cell(parent) / total
        }
    }

    /// Multiplies raw weights by the partition factor of their parent atom.
    pub fn apply(&self, parent: usize, points: &[Point3<f64>], weights: &mut [f64]) {
        points
            .iter()
            .zip(weights.iter_mut())
            .for_each(|(point, w)| *w *= self.partition_factor(parent, point));
    }
}

/// The iterated Becke polynomial $`f_3(\mu)`$ with $`f(\mu) = \tfrac{3}{2}\mu - \tfrac{1}{2}\mu^3`$.
fn becke_polynomial(mu: f64) -> f64 {
    (0..BECKE_ITERATIONS).fold(mu, |m, _| 1.5 * m - 0.5 * m.powi(3))
}
