use nalgebra::Point3;

use crate::auxiliary::template_molecules::{gen_h2, gen_water};
use crate::basis::ao::BasisShell;
use crate::basis::shell::{BasisSet, BasisShellContraction};
use crate::error::XcTaskError;
use crate::screening::{screen, BoundingBox, ShellScreening};

#[test]
fn test_screening_bounding_box() {
    assert!(BoundingBox::from_points(&[]).is_none());
    let bbox = BoundingBox::from_points(&[
        Point3::new(0.0, 1.0, -1.0),
        Point3::new(2.0, -1.0, 0.5),
        Point3::new(1.0, 0.0, 3.0),
    ])
    .unwrap();
    assert_eq!(bbox.lo, Point3::new(0.0, -1.0, -1.0));
    assert_eq!(bbox.hi, Point3::new(2.0, 1.0, 3.0));
    assert_eq!(bbox.max_extent(), 4.0);
    assert_eq!(bbox.center(), Point3::new(1.0, 0.0, 1.0));
    assert_eq!(bbox.distance_to(&Point3::new(1.0, 0.0, 0.0)), 0.0);
    assert_eq!(bbox.distance_to(&Point3::new(5.0, 0.0, 0.0)), 3.0);
    assert_eq!(bbox.distance_to(&Point3::new(5.0, 5.0, 0.0)), 5.0);
    assert!(bbox.intersects_sphere(&Point3::new(5.0, 0.0, 0.0), 3.0));
    assert!(!bbox.intersects_sphere(&Point3::new(5.0, 0.0, 0.0), 2.9));
}

#[test]
fn test_screening_near_and_far_batches() {
    let mol = gen_h2(1.4);
    let basis = BasisSet::from_library(&mol, "cc-pVDZ", false, 1e-10).unwrap();
    assert_eq!(basis.n_shells(), 6);

    // A batch right on the first nucleus sees every shell of the molecule.
    let near = screen(&[Point3::new(0.0, 0.0, -0.7), Point3::new(0.1, 0.0, -0.6)], &basis);
    assert_eq!(near.shell_list, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(near.nbe, basis.n_funcs());
    assert_eq!(near.shell_npts, vec![2; 6]);
    near.validate(&basis).unwrap();

    // A batch far out behind the first nucleus only sees its most diffuse shell.
    let (r0, r1) = (basis[0].cutoff_radius(), basis[1].cutoff_radius());
    assert!(r0 < r1);
    let far = screen(&[Point3::new(0.0, 0.0, -0.7 - 0.5 * (r0 + r1))], &basis);
    assert_eq!(far.shell_list, vec![1]);
    assert_eq!(far.nbe, 1);
    far.validate(&basis).unwrap();

    // Nothing survives very far away.
    let nothing = screen(&[Point3::new(500.0, 0.0, 0.0)], &basis);
    assert!(nothing.is_empty());
    assert_eq!(nothing.nbe, 0);
    nothing.validate(&basis).unwrap();

    assert!(screen(&[], &basis).is_empty());
}

#[test]
fn test_screening_skips_shells_with_zero_radius() {
    let origin = Point3::origin();
    let s_shell = |tolerance| {
        BasisShellContraction::new(BasisShell::standard(0, false), &[1.0], &[1.0], origin, tolerance)
            .unwrap()
    };
    // No normalised coefficient of a unit-exponent s primitive exceeds a tolerance of 10.
    let basis = BasisSet::new("mixed", vec![vec![s_shell(1e-10), s_shell(10.0), s_shell(1e-6)]]);
    assert_eq!(basis[1].cutoff_radius(), 0.0);
    assert!(basis[0].cutoff_radius() > 0.0 && basis[2].cutoff_radius() > 0.0);

    // A batch sitting exactly on the shell centres.
    let on_centre = screen(&[origin, origin], &basis);
    assert_eq!(on_centre.shell_list, vec![0, 2]);
    assert_eq!(on_centre.shell_npts, vec![2, 2]);
    assert_eq!(on_centre.nbe, 2);
    on_centre.validate(&basis).unwrap();
}

#[test]
fn test_screening_matches_brute_force_per_shell() {
    let mol = gen_water();
    let basis = BasisSet::from_library(&mol, "sto-3g", false, 1e-8).unwrap();
    let points = (0..40)
        .map(|i| {
            let t = f64::from(i) * 0.25;
            Point3::new(1.5 + 0.1 * t, -2.0 + 0.2 * t, 3.0 - 0.05 * t)
        })
        .collect::<Vec<_>>();
    let screening = screen(&points, &basis);
    let bbox = BoundingBox::from_points(&points).unwrap();
    for (ishell, shell) in basis.shells().enumerate() {
        let significant = bbox.distance_to(shell.cart_origin()) <= shell.cutoff_radius();
        assert_eq!(screening.shell_list.contains(&ishell), significant);
    }
    for (ishell, npts) in screening.shell_list.iter().zip(screening.shell_npts.iter()) {
        let shell = &basis[*ishell];
        let expected = points
            .iter()
            .filter(|p| (*p - shell.cart_origin()).norm() <= shell.cutoff_radius())
            .count();
        assert_eq!(*npts, expected);
    }
}

#[test]
fn test_screening_validate_inconsistencies() {
    let mol = gen_water();
    let basis = BasisSet::from_library(&mol, "sto-3g", false, 1e-8).unwrap();

    let unsorted = ShellScreening {
        shell_list: vec![0, 2, 1],
        shell_npts: vec![1, 1, 1],
        nbe: 5,
    };
    assert!(matches!(
        unsorted.validate(&basis),
        Err(XcTaskError::ScreeningInconsistency {
            shell: Some(1),
            ..
        })
    ));

    let duplicated = ShellScreening {
        shell_list: vec![0, 0],
        shell_npts: vec![1, 1],
        nbe: 2,
    };
    assert!(duplicated.validate(&basis).is_err());

    let wrong_nbe = ShellScreening {
        shell_list: vec![0, 2],
        shell_npts: vec![1, 1],
        nbe: 2,
    };
    assert!(wrong_nbe.validate(&basis).is_err());

    let out_of_range = ShellScreening {
        shell_list: vec![0, 5],
        shell_npts: vec![1, 1],
        nbe: 2,
    };
    assert!(matches!(
        out_of_range.validate(&basis),
        Err(XcTaskError::ScreeningInconsistency {
            shell: Some(5),
            ..
        })
    ));

    let ok = ShellScreening {
        shell_list: vec![0, 2, 4],
        shell_npts: vec![3, 2, 1],
        nbe: 5,
    };
    ok.validate(&basis).unwrap();
}
