use approx;
use itertools::Itertools;
use nalgebra::Point3;

use crate::auxiliary::template_molecules::{gen_benzene, gen_water};
use crate::basis::ao::BasisShell;
use crate::basis::shell::{BasisSet, BasisShellContraction, DEFAULT_SHELL_TOLERANCE};

/// Self-overlap of the $`x^l`$ component of a normalised contracted shell.
fn xl_self_overlap(bsc: &BasisShellContraction) -> f64 {
    let l = bsc.l() as i32;
    let dfact = (1..=(2 * l - 1)).step_by(2).product::<i32>().max(1) as f64;
    bsc.contraction
        .primitives
        .iter()
        .cartesian_product(bsc.contraction.primitives.iter())
        .map(|((ai, ci), (aj, cj))| {
            let p = ai + aj;
            ci * cj * (std::f64::consts::PI / p).powf(1.5) * dfact / (2.0 * p).powi(l)
        })
        .sum()
}

#[test]
fn test_basis_shell_normalisation() {
    let origin = Point3::origin();
    let bsc_s = BasisShellContraction::new(
        BasisShell::standard(0, false),
        &[3.42525091, 0.62391373, 0.16885540],
        &[0.15432897, 0.53532814, 0.44463454],
        origin,
        DEFAULT_SHELL_TOLERANCE,
    )
    .unwrap();
    approx::assert_relative_eq!(xl_self_overlap(&bsc_s), 1.0, epsilon = 1e-12);

    let bsc_p = BasisShellContraction::new(
        BasisShell::standard(1, false),
        &[9.439, 2.002, 0.5456, 0.1517],
        &[0.038109, 0.20948, 0.508557, 0.468842],
        origin,
        DEFAULT_SHELL_TOLERANCE,
    )
    .unwrap();
    approx::assert_relative_eq!(xl_self_overlap(&bsc_p), 1.0, epsilon = 1e-12);

    let bsc_d = BasisShellContraction::new(
        BasisShell::standard(2, true),
        &[0.55],
        &[1.0],
        origin,
        DEFAULT_SHELL_TOLERANCE,
    )
    .unwrap();
    approx::assert_relative_eq!(xl_self_overlap(&bsc_d), 1.0, epsilon = 1e-12);
}

#[test]
fn test_basis_shell_zero_coefficients_dropped() {
    let bsc = BasisShellContraction::new(
        BasisShell::standard(0, false),
        &[13.01, 1.962, 0.4446, 0.122],
        &[0.0, 0.0, 0.0, 1.0],
        Point3::origin(),
        DEFAULT_SHELL_TOLERANCE,
    )
    .unwrap();
    assert_eq!(bsc.contraction_length(), 1);
    approx::assert_relative_eq!(bsc.contraction.primitives[0].0, 0.122);
}

#[test]
fn test_basis_shell_invalid_inputs() {
    let origin = Point3::origin();
    let shell = BasisShell::standard(0, false);
    assert!(BasisShellContraction::new(shell.clone(), &[1.0], &[1.0, 2.0], origin, 1e-10).is_err());
    assert!(BasisShellContraction::new(shell.clone(), &[-1.0], &[1.0], origin, 1e-10).is_err());
    assert!(BasisShellContraction::new(shell.clone(), &[1.0], &[0.0], origin, 1e-10).is_err());
    assert!(BasisShellContraction::new(shell, &[1.0], &[1.0], origin, 0.0).is_err());
}

#[test]
fn test_basis_shell_cutoff_radius() {
    let alpha = 0.55;
    let tol = 1e-10;
    let mut bsc = BasisShellContraction::new(
        BasisShell::standard(2, false),
        &[alpha],
        &[1.0],
        Point3::origin(),
        tol,
    )
    .unwrap();
    let c = (2.0 * alpha / std::f64::consts::PI).powf(0.75) * (4.0 * alpha) / 3.0f64.sqrt();
    approx::assert_relative_eq!(bsc.contraction.primitives[0].1, c, epsilon = 1e-12);
    approx::assert_relative_eq!(
        bsc.cutoff_radius(),
        ((c.ln() - tol.ln()) / alpha).sqrt(),
        epsilon = 1e-12
    );

    // A looser tolerance can only shrink the radius.
    let r_tight = bsc.cutoff_radius();
    bsc.set_tolerance(1e-4);
    assert!(bsc.cutoff_radius() < r_tight);

    // No primitive above the tolerance.
    bsc.set_tolerance(10.0);
    assert_eq!(bsc.cutoff_radius(), 0.0);
}

#[test]
fn test_basis_set_benzene_ccpvdz() {
    let mol = gen_benzene();
    let basis_set = BasisSet::from_library(&mol, "cc-pVDZ", false, DEFAULT_SHELL_TOLERANCE).unwrap();
    assert_eq!(basis_set.n_shells(), 6 * 6 + 6 * 3);
    assert_eq!(basis_set.n_funcs(), 6 * 14 + 6 * 5);
    assert_eq!(basis_set.lmax(), 2);

    let boundaries = basis_set.shell_boundaries();
    assert_eq!(boundaries[0], (0, 1));
    assert_eq!(boundaries[3], (3, 6));
    assert_eq!(boundaries[5], (9, 14));
    assert_eq!(boundaries.last().unwrap().1, basis_set.n_funcs());
    assert!(boundaries.windows(2).all(|w| w[0].1 == w[1].0));

    assert_eq!(basis_set.shell_atom(0), 0);
    assert_eq!(basis_set.shell_atom(6), 1);
    assert_eq!(basis_set.shell_atom(36), 6);

    let ranges = basis_set.atom_function_ranges(mol.n_atoms());
    assert_eq!(ranges[0], (0, 14));
    assert_eq!(ranges[6], (84, 89));
    assert_eq!(ranges[11], (109, 114));
}

#[test]
fn test_basis_set_water_sto3g_cart() {
    let mol = gen_water();
    let mut basis_set = BasisSet::from_library(&mol, "sto-3g", true, 1e-8).unwrap();
    assert_eq!(basis_set.n_shells(), 5);
    assert_eq!(basis_set.n_funcs(), 7);
    assert_eq!(basis_set[2].l(), 1);
    assert_eq!(basis_set[2].n_funcs(), 3);
    approx::assert_relative_eq!(basis_set[0].tolerance(), 1e-8);

    let r_before = basis_set[3].cutoff_radius();
    basis_set.set_tolerance(f64::EPSILON);
    approx::assert_relative_eq!(basis_set[3].tolerance(), f64::EPSILON);
    assert!(basis_set[3].cutoff_radius() > r_before);
}

#[test]
fn test_basis_set_unknown() {
    let mol = gen_benzene();
    assert!(BasisSet::from_library(&mol, "def2-qzvpp", false, 1e-10).is_err());
    let elements = crate::auxiliary::atom::ElementTable::new();
    let mol_ne = crate::auxiliary::molecule::Molecule::from_atoms(&[
        crate::auxiliary::atom::Atom::from_xyz("Ne 0 0 0", &elements, true).unwrap(),
    ]);
    assert!(BasisSet::from_library(&mol_ne, "sto-3g", false, 1e-10).is_err());
}
