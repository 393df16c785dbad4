use approx;
use nalgebra::Point3;

use crate::auxiliary::template_molecules::{gen_h2, gen_water};
use crate::grid::becke::BeckePartition;
use crate::grid::{gauss_legendre, mura_knowles, product_angular, AtomicGridSize, MolecularGrid};

#[test]
fn test_grid_gauss_legendre() {
    for n in [1, 2, 5, 17] {
        let nodes = gauss_legendre(n);
        assert_eq!(nodes.len(), n);
        let wsum = nodes.iter().map(|(_, w)| w).sum::<f64>();
        approx::assert_relative_eq!(wsum, 2.0, epsilon = 1e-13);
        assert!(nodes.windows(2).all(|w| w[0].0 < w[1].0));
    }
    // Exact up to degree 2n - 1.
    let x4 = gauss_legendre(5)
        .iter()
        .map(|(x, w)| w * x.powi(4))
        .sum::<f64>();
    approx::assert_relative_eq!(x4, 0.4, epsilon = 1e-13);
}

#[test]
fn test_grid_angular_and_radial() {
    let angular = product_angular(17, 34);
    assert_eq!(angular.len(), 578);
    let wsum = angular.iter().map(|(_, w)| w).sum::<f64>();
    approx::assert_relative_eq!(wsum, 4.0 * std::f64::consts::PI, epsilon = 1e-12);
    let z2 = angular.iter().map(|(u, w)| w * u[2] * u[2]).sum::<f64>();
    approx::assert_relative_eq!(z2, 4.0 * std::f64::consts::PI / 3.0, epsilon = 1e-12);
    assert!(angular
        .iter()
        .all(|(u, _)| (u.norm() - 1.0).abs() < 1e-12));

    let radial = mura_knowles(99, 5.0);
    let gauss = radial
        .iter()
        .map(|(r, w)| w * (-r * r).exp())
        .sum::<f64>()
        * 4.0
        * std::f64::consts::PI;
    approx::assert_relative_eq!(gauss, std::f64::consts::PI.powf(1.5), epsilon = 1e-10);
}

#[test]
fn test_grid_sizes() {
    assert_eq!(AtomicGridSize::Fine.n_points_per_atom(), 75 * 300);
    assert_eq!(AtomicGridSize::UltraFine.n_points_per_atom(), 99 * 578);
    assert_eq!(AtomicGridSize::default(), AtomicGridSize::UltraFine);
    let explicit = AtomicGridSize::Explicit {
        n_radial: 10,
        n_theta: 4,
        n_phi: 8,
    };
    assert_eq!(explicit.dims(), (10, 4, 8));

    let mol = gen_water();
    let grid = MolecularGrid::new(&mol, &explicit).unwrap();
    assert_eq!(grid.n_atoms(), 3);
    assert_eq!(grid.n_points(), 3 * 320);
    approx::assert_relative_eq!(
        (grid.atomic_grids()[1].center - mol.atoms[1].coordinates).norm(),
        0.0
    );

    let empty = AtomicGridSize::Explicit {
        n_radial: 0,
        n_theta: 4,
        n_phi: 8,
    };
    assert!(MolecularGrid::new(&mol, &empty).is_err());
}

#[test]
fn test_grid_becke_partition_of_unity() {
    let mol = gen_water();
    let becke = BeckePartition::new(&mol.positions());
    for point in [
        Point3::new(0.1, 0.2, 0.3),
        Point3::new(0.0, 1.2, 1.0),
        Point3::new(-3.0, 0.5, 2.0),
        Point3::new(10.0, -4.0, 7.0),
    ] {
        let total = (0..3)
            .map(|a| becke.partition_factor(a, &point))
            .sum::<f64>();
        approx::assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }
    // Close to a nucleus, the factor of that atom dominates.
    assert!(becke.partition_factor(0, &Point3::new(0.0, 0.0, 0.01)) > 0.999);
}

#[test]
fn test_grid_becke_molecular_integration() {
    let mol = gen_h2(1.4);
    let grid = MolecularGrid::new(&mol, &AtomicGridSize::Fine).unwrap();
    let becke = BeckePartition::new(&mol.positions());
    let alpha = 0.8;
    let center = mol.atoms[0].coordinates;
    let integral = grid
        .atomic_grids()
        .iter()
        .enumerate()
        .map(|(iatom, atomic_grid)| {
            let mut weights = atomic_grid.weights.clone();
            becke.apply(iatom, &atomic_grid.points, &mut weights);
            atomic_grid
                .points
                .iter()
                .zip(weights.iter())
                .map(|(p, w)| w * (-alpha * (p - center).norm_squared()).exp())
                .sum::<f64>()
        })
        .sum::<f64>();
    approx::assert_relative_eq!(
        integral,
        (std::f64::consts::PI / alpha).powf(1.5),
        max_relative = 1e-5
    );
}
