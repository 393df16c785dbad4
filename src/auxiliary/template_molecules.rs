use nalgebra::Point3;

use crate::auxiliary::atom::{Atom, ElementTable, ANGSTROM_TO_BOHR};
use crate::auxiliary::molecule::Molecule;

/// Builds benzene, a planar twelve-atom ring, in the xy-plane with its centre at the origin.
pub fn gen_benzene() -> Molecule {
    let elements = ElementTable::new();
    let r_cc = 1.397 * ANGSTROM_TO_BOHR;
    let r_ch = r_cc + 1.084 * ANGSTROM_TO_BOHR;
    let mut atoms = Vec::with_capacity(12);
    for (symbol, radius) in [("C", r_cc), ("H", r_ch)] {
        for k in 0..6 {
            let theta = std::f64::consts::FRAC_PI_3 * f64::from(k);
            atoms.push(
                Atom::new_ordinary(
                    symbol,
                    Point3::new(radius * theta.cos(), radius * theta.sin(), 0.0),
                    &elements,
                )
                .expect("Unable to construct a benzene atom."),
            );
        }
    }
    Molecule::from_atoms(&atoms)
}

/// Builds water with the oxygen at the origin.
pub fn gen_water() -> Molecule {
    let elements = ElementTable::new();
    let atoms = [
        ("O", Point3::new(0.0, 0.0, 0.0)),
        ("H", Point3::new(0.0, 1.430_429, 1.107_157)),
        ("H", Point3::new(0.0, -1.430_429, 1.107_157)),
    ]
    .into_iter()
    .map(|(symbol, coords)| {
        Atom::new_ordinary(symbol, coords, &elements).expect("Unable to construct a water atom.")
    })
    .collect::<Vec<_>>();
    Molecule::from_atoms(&atoms)
}

/// Builds a hydrogen molecule along the z-axis with a given bond length in Bohr.
pub fn gen_h2(bond_length: f64) -> Molecule {
    let elements = ElementTable::new();
    let atoms = [
        Point3::new(0.0, 0.0, -0.5 * bond_length),
        Point3::new(0.0, 0.0, 0.5 * bond_length),
    ]
    .into_iter()
    .map(|coords| Atom::new_ordinary("H", coords, &elements).expect("Unable to construct H."))
    .collect::<Vec<_>>();
    Molecule::from_atoms(&atoms)
}
