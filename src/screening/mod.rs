//! Shell screening of point batches.
//!
//! A shell is significant for a batch when the sphere of its cutoff radius around its centre
//! intersects the axis-aligned bounding box of the batch. Every primitive of a shell falls below
//! the shell tolerance outside that sphere, so shells failing this test contribute nothing above
//! the tolerance anywhere in the batch.

use std::fmt;

use itertools::Itertools;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::basis::shell::BasisSet;
use crate::error::XcTaskError;

#[cfg(test)]
#[path = "screening_tests.rs"]
mod screening_tests;

// -----------
// BoundingBox
// -----------

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// The lower corner.
    pub lo: Point3<f64>,

    /// The upper corner.
    pub hi: Point3<f64>,
}

impl BoundingBox {
    /// Computes the bounding box of a set of points, or `None` if there are no points.
    pub fn from_points(points: &[Point3<f64>]) -> Option<Self> {
        let first = points.first()?;
        let (lo, hi) = points
            .iter()
            .skip(1)
            .fold((*first, *first), |(lo, hi), p| {
                (
                    Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
                    Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
                )
            });
        Some(Self { lo, hi })
    }

    /// The centre of this box.
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.lo, &self.hi)
    }

    /// The largest edge length of this box.
    pub fn max_extent(&self) -> f64 {
        (self.hi - self.lo).max()
    }

    /// The distance from a point to this box, zero if the point is inside.
    pub fn distance_to(&self, point: &Point3<f64>) -> f64 {
        (0..3)
            .map(|i| {
                let d = (self.lo[i] - point[i]).max(point[i] - self.hi[i]).max(0.0);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Checks if a sphere intersects this box.
    pub fn intersects_sphere(&self, center: &Point3<f64>, radius: f64) -> bool {
        self.distance_to(center) <= radius
    }
}

// --------------
// ShellScreening
// --------------

/// The result of screening the shells of a basis set against a point batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellScreening {
    /// The significant shells, as strictly increasing global shell indices.
    pub shell_list: Vec<usize>,

    /// For each significant shell, the number of batch points inside its cutoff sphere.
    pub shell_npts: Vec<usize>,

    /// The number of basis functions across the significant shells.
    pub nbe: usize,
}

impl ShellScreening {
    /// Checks if no shell is significant.
    pub fn is_empty(&self) -> bool {
        self.shell_list.is_empty()
    }

    /// Verifies the data-model invariants of this screening result against a basis set: shell
    /// indices in range and strictly increasing, no significant shell without functions, and
    /// `nbe` consistent with the shell function counts.
    pub fn validate(&self, basis: &BasisSet) -> Result<(), XcTaskError> {
        let inconsistency = |shell: Option<usize>, reason: String| {
            XcTaskError::ScreeningInconsistency {
                task: None,
                shell,
                reason,
            }
        };
        if self.shell_npts.len() != self.shell_list.len() {
            return Err(inconsistency(
                None,
                format!(
                    "{} point counts for {} shells",
                    self.shell_npts.len(),
                    self.shell_list.len()
                ),
            ));
        }
        if let Some((a, b)) = self
            .shell_list
            .iter()
            .tuple_windows()
            .find(|(a, b)| a >= b)
        {
            return Err(inconsistency(
                Some(*b),
                format!("shell list not strictly increasing ({a} then {b})"),
            ));
        }
        let mut nbe = 0;
        for &ishell in self.shell_list.iter() {
            if ishell >= basis.n_shells() {
                return Err(inconsistency(
                    Some(ishell),
                    format!("shell index out of range (only {} shells)", basis.n_shells()),
                ));
            }
            let n_funcs = basis[ishell].n_funcs();
            if n_funcs == 0 {
                return Err(inconsistency(
                    Some(ishell),
                    "significant shell without basis functions".to_string(),
                ));
            }
            nbe += n_funcs;
        }
        if nbe != self.nbe {
            return Err(inconsistency(
                None,
                format!("nbe = {} but the shells carry {nbe} functions", self.nbe),
            ));
        }
        if self.nbe > basis.n_funcs() {
            return Err(inconsistency(
                None,
                format!(
                    "nbe = {} exceeds the basis size {}",
                    self.nbe,
                    basis.n_funcs()
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ShellScreening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} shell(s), {} function(s): [{}]",
            self.shell_list.len(),
            self.nbe,
            self.shell_list.iter().join(", ")
        )
    }
}

// =========
// Functions
// =========

/// Screens every shell of a basis set against a batch of points.
///
/// The significance test uses the cutoff radius of each shell, which already encodes the
/// shell's screening tolerance. A shell with a zero cutoff radius, all of whose primitives are
/// below its tolerance, is never significant. The output is sorted by global shell index. An
/// empty batch yields an empty screening.
///
/// # Arguments
///
/// * `points` - The valid points of the batch. Padding points must not be included.
/// * `basis` - The basis set whose shells are screened.
pub fn screen(points: &[Point3<f64>], basis: &BasisSet) -> ShellScreening {
    let Some(bbox) = BoundingBox::from_points(points) else {
        return ShellScreening::default();
    };
    let (shell_list, shell_npts): (Vec<_>, Vec<_>) = basis
        .shells()
        .enumerate()
        .filter(|(_, shell)| {
            shell.cutoff_radius() > 0.0
                && bbox.intersects_sphere(shell.cart_origin(), shell.cutoff_radius())
        })
        .map(|(ishell, shell)| {
            let r2 = shell.cutoff_radius().powi(2);
            let npts = points
                .iter()
                .filter(|p| (*p - shell.cart_origin()).norm_squared() <= r2)
                .count();
            (ishell, npts)
        })
        .unzip();
    let nbe = shell_list.iter().map(|&ishell| basis[ishell].n_funcs()).sum();
    ShellScreening {
        shell_list,
        shell_npts,
        nbe,
    }
}
