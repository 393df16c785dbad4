//! Built-in and file-based basis-set libraries.

use std::path::Path;

use anyhow::{self, ensure, format_err, Context};
use indexmap::IndexMap;
use log;
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::basis::ao::BasisShell;
use crate::basis::shell::{BasisSet, BasisShellContraction};
use crate::io::read_xctask_yaml;

const STO_3G: &str = include_str!("library/sto-3g.yml");
const CC_PVDZ: &str = include_str!("library/cc-pvdz.yml");

/// A structure to handle basis set information for a shell.
///
/// Several contractions may share the same exponents: each row of `coefficients` describes one
/// contracted shell, and its angular momentum is taken cyclically from `angular_momentum` (so
/// that `[0, 1]` with two rows describes a combined $`sp`$ shell).
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LibraryElectronShell {
    /// The angular momenta of this shell.
    pub angular_momentum: Vec<u32>,

    /// A vector of primitive exponents.
    pub exponents: Vec<f64>,

    /// A vector of vectors of primitive coefficients, one inner vector per contracted shell.
    pub coefficients: Vec<Vec<f64>>,
}

/// A structure to handle basis set information for an element.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LibraryElement {
    /// A vector of basis set information for the shells in this element.
    pub electron_shells: Vec<LibraryElectronShell>,
}

/// A structure to represent a basis set library for a set of elements.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct BasisLibrary {
    /// Name of the basis set.
    pub name: String,

    /// A map between element symbols and element basis information.
    pub elements: IndexMap<String, LibraryElement>,
}

impl BasisLibrary {
    /// Retrieves a built-in basis set library by name (case-insensitive). Available names are
    /// `STO-3G` and `cc-pVDZ`.
    pub fn builtin(basis_name: &str) -> Result<Self, anyhow::Error> {
        let contents = match basis_name.to_lowercase().as_str() {
            "sto-3g" => STO_3G,
            "cc-pvdz" => CC_PVDZ,
            _ => return Err(format_err!("Unknown built-in basis set `{basis_name}`.")),
        };
        serde_yaml::from_str(contents)
            .with_context(|| format!("Unable to parse built-in basis set `{basis_name}`"))
    }

    /// Reads a basis set library from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        read_xctask_yaml(path)
            .with_context(|| format!("Unable to read basis set file {}", path.display()))
    }

    /// Builds the contracted shells of a single element centred on a given origin.
    fn element_shells(
        &self,
        symbol: &str,
        cart_origin: &nalgebra::Point3<f64>,
        cart: bool,
        tolerance: f64,
    ) -> Result<Vec<BasisShellContraction>, anyhow::Error> {
        let element = self.elements.get(symbol).ok_or_else(|| {
            format_err!(
                "Basis information for element {symbol} not found in `{}`.",
                self.name
            )
        })?;
        element
            .electron_shells
            .iter()
            .flat_map(|shell| {
                shell
                    .angular_momentum
                    .iter()
                    .cycle()
                    .zip(shell.coefficients.iter())
                    .map(|(&l, coeffs)| {
                        ensure!(
                            coeffs.len() == shell.exponents.len(),
                            "Element {symbol} in `{}` has a contraction with {} coefficients \
                            for {} exponents.",
                            self.name,
                            coeffs.len(),
                            shell.exponents.len()
                        );
                        BasisShellContraction::new(
                            BasisShell::standard(l, cart),
                            &shell.exponents,
                            coeffs,
                            *cart_origin,
                            tolerance,
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()
    }

    /// Constructs a [`BasisSet`] for a molecule from this library.
    ///
    /// # Arguments
    ///
    /// * `mol` - The molecule, with coordinates in Bohr.
    /// * `cart` - If `true`, shells are Cartesian with lexicographic order; otherwise they are
    /// pure with increasing-$`m`$ order.
    /// * `tolerance` - The screening tolerance applied to every shell.
    pub fn build_basis_set(
        &self,
        mol: &Molecule,
        cart: bool,
        tolerance: f64,
    ) -> Result<BasisSet, anyhow::Error> {
        let atom_shells = mol
            .atoms
            .iter()
            .map(|atom| {
                self.element_shells(&atom.atomic_symbol, &atom.coordinates, cart, tolerance)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let basis_set = BasisSet::new(&self.name, atom_shells);
        log::debug!(
            "Basis set `{}` built with {} shells and {} functions.",
            basis_set.name(),
            basis_set.n_shells(),
            basis_set.n_funcs()
        );
        Ok(basis_set)
    }
}
