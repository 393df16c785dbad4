//! Molecular geometries.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{self, ensure, format_err, Context};
use itertools::Itertools;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::auxiliary::atom::{Atom, ElementTable};

#[cfg(test)]
#[path = "molecule_tests.rs"]
mod molecule_tests;

/// A struct containing the atoms constituting a molecule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
    /// The atoms constituting this molecule, in input order.
    pub atoms: Vec<Atom>,
}

impl Molecule {
    /// Constructs a molecule from its atoms.
    pub fn from_atoms(atoms: &[Atom]) -> Self {
        Molecule {
            atoms: atoms.to_vec(),
        }
    }

    /// Parses an `xyz` file to construct a molecule.
    ///
    /// # Arguments
    ///
    /// * `filename` - The `xyz` file to be parsed.
    /// * `bohr` - A boolean indicating if the coordinates in the file are in Bohr rather than
    /// Ångström.
    ///
    /// # Errors
    ///
    /// Errors if the file cannot be read, is malformed, or declares a different number of atoms
    /// than it lists.
    pub fn from_xyz<P: AsRef<Path>>(filename: P, bohr: bool) -> Result<Molecule, anyhow::Error> {
        let filename = filename.as_ref();
        let contents = fs::read_to_string(filename)
            .with_context(|| format!("Unable to read file {}", filename.display()))?;
        Self::from_xyz_str(&contents, bohr)
            .with_context(|| format!("Unable to parse file {}", filename.display()))
    }

    /// Parses the contents of an `xyz` file to construct a molecule.
    pub fn from_xyz_str(contents: &str, bohr: bool) -> Result<Molecule, anyhow::Error> {
        let elements = ElementTable::new();
        let mut lines = contents.lines();
        let n_atoms = lines
            .next()
            .ok_or_else(|| format_err!("Empty xyz contents."))?
            .trim()
            .parse::<usize>()
            .map_err(|err| format_err!("Unable to parse the number of atoms: {err}"))?;
        let atoms = lines
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .map(|line| Atom::from_xyz(line, &elements, bohr))
            .collect::<Result<Vec<_>, _>>()?;
        ensure!(
            atoms.len() == n_atoms,
            "Expected {} atoms, got {} instead.",
            n_atoms,
            atoms.len()
        );
        Ok(Molecule { atoms })
    }

    /// The number of atoms in this molecule.
    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// The atomic positions in Bohr.
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|atom| atom.coordinates).collect_vec()
    }

    /// Calculates the distance from each atom to its nearest neighbour. For an isolated atom,
    /// this distance is [`f64::MAX`].
    pub fn nearest_neighbour_distances(&self) -> Vec<f64> {
        self.atoms
            .iter()
            .enumerate()
            .map(|(i, atom_i)| {
                self.atoms
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, atom_j)| (atom_i.coordinates - atom_j.coordinates).norm())
                    .fold(f64::MAX, f64::min)
            })
            .collect_vec()
    }

    /// Calculates the matrix of interatomic distances, row-major.
    pub fn distance_matrix(&self) -> Vec<Vec<f64>> {
        self.atoms
            .iter()
            .map(|atom_i| {
                self.atoms
                    .iter()
                    .map(|atom_j| (atom_i.coordinates - atom_j.coordinates).norm())
                    .collect_vec()
            })
            .collect_vec()
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Molecule ({} atoms, Bohr):", self.n_atoms())?;
        for atom in self.atoms.iter() {
            writeln!(f, "{atom}")?;
        }
        Ok(())
    }
}
