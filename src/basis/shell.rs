//! Contracted Gaussian shells and basis sets.

use std::fmt;
use std::ops::Index;
use std::path::Path;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use factorial::DoubleFactorial;
use itertools::Itertools;
use nalgebra::Point3;

use crate::auxiliary::molecule::Molecule;
use crate::basis::ao::BasisShell;
use crate::basis::library::BasisLibrary;

#[cfg(test)]
#[path = "shell_tests.rs"]
mod shell_tests;

/// Default screening tolerance of a shell.
pub const DEFAULT_SHELL_TOLERANCE: f64 = 1e-10;

/// Contraction coefficients smaller than this are dropped when a shell is built.
const CONTRACTION_COEFF_THRESH: f64 = 1e-16;

// -------------------
// GaussianContraction
// -------------------

/// A structure to handle primitives in a Gaussian contraction.
#[derive(Clone, Builder, Debug, PartialEq)]
pub struct GaussianContraction {
    /// Constituent primitives in the contraction. Each primitive has the form
    /// $`c\exp\left[-\alpha\lvert \mathbf{r} - \mathbf{R} \rvert^2\right]`$ and is characterised
    /// by a tuple of its exponent $`\alpha`$ and coefficient $`c`$, respectively.
    pub primitives: Vec<(f64, f64)>,
}

impl GaussianContraction {
    /// The number of primitive Gaussians in this contraction.
    pub fn contraction_length(&self) -> usize {
        self.primitives.len()
    }
}

// ---------------------
// BasisShellContraction
// ---------------------

/// A structure to handle all shell information needed for screening and collocation.
#[derive(Clone, Builder, Debug)]
pub struct BasisShellContraction {
    /// Basis function ordering information.
    pub basis_shell: BasisShell,

    /// The Gaussian primitives in the contraction of this shell. The coefficients include the
    /// primitive normalisation factors.
    pub contraction: GaussianContraction,

    /// The Cartesian origin $`\mathbf{R}`$ of this shell in Bohr.
    pub cart_origin: Point3<f64>,

    /// The screening tolerance of this shell.
    #[builder(default = "DEFAULT_SHELL_TOLERANCE")]
    tolerance: f64,

    /// The radius beyond which every primitive of this shell falls below [`Self::tolerance`].
    #[builder(setter(skip), default = "0.0")]
    cutoff_radius: f64,
}

impl BasisShellContraction {
    /// Returns a builder to construct a new [`BasisShellContraction`].
    pub fn builder() -> BasisShellContractionBuilder {
        BasisShellContractionBuilder::default()
    }

    /// Constructs a normalised shell from raw exponents and contraction coefficients.
    ///
    /// The primitives are normalised for the $`x^l`$ component and the contraction is then
    /// renormalised to unit self-overlap. Primitives with negligible coefficients are dropped.
    ///
    /// # Arguments
    ///
    /// * `basis_shell` - The angular information of the shell.
    /// * `exponents` - The primitive exponents.
    /// * `coefficients` - The raw contraction coefficients.
    /// * `cart_origin` - The centre of the shell in Bohr.
    /// * `tolerance` - The screening tolerance.
    pub fn new(
        basis_shell: BasisShell,
        exponents: &[f64],
        coefficients: &[f64],
        cart_origin: Point3<f64>,
        tolerance: f64,
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            exponents.len() == coefficients.len(),
            "Mismatched numbers of exponents ({}) and coefficients ({}).",
            exponents.len(),
            coefficients.len()
        );
        ensure!(
            exponents.iter().all(|&a| a > 0.0),
            "Non-positive Gaussian exponent encountered."
        );
        ensure!(tolerance > 0.0, "Non-positive shell tolerance {tolerance:e}.");
        let primitives = exponents
            .iter()
            .zip(coefficients.iter())
            .filter(|(_, c)| c.abs() > CONTRACTION_COEFF_THRESH)
            .map(|(&a, &c)| (a, c))
            .collect_vec();
        ensure!(!primitives.is_empty(), "Shell without primitives.");

        let mut bsc = BasisShellContraction::builder()
            .basis_shell(basis_shell)
            .contraction(GaussianContraction { primitives })
            .cart_origin(cart_origin)
            .tolerance(tolerance)
            .build()
            .map_err(|err| format_err!(err))?;
        bsc.normalise();
        bsc.compute_cutoff_radius();
        Ok(bsc)
    }

    /// The basis function ordering information of this shell.
    pub fn basis_shell(&self) -> &BasisShell {
        &self.basis_shell
    }

    /// The Cartesian origin $`\mathbf{R}`$ of this shell.
    pub fn cart_origin(&self) -> &Point3<f64> {
        &self.cart_origin
    }

    /// The angular momentum of this shell.
    pub fn l(&self) -> u32 {
        self.basis_shell.l
    }

    /// The number of basis functions in this shell.
    pub fn n_funcs(&self) -> usize {
        self.basis_shell.n_funcs()
    }

    /// The number of primitive Gaussians in this shell.
    pub fn contraction_length(&self) -> usize {
        self.contraction.contraction_length()
    }

    /// The screening tolerance of this shell.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// The cutoff radius of this shell.
    pub fn cutoff_radius(&self) -> f64 {
        self.cutoff_radius
    }

    /// Sets the screening tolerance and recomputes the cutoff radius.
    pub fn set_tolerance(&mut self, tolerance: f64) -> &mut Self {
        self.tolerance = tolerance;
        self.compute_cutoff_radius();
        self
    }

    /// Scales the raw contraction to unit self-overlap, then folds the primitive normalisation
    /// factors of the $`x^l`$ component into the coefficients.
    fn normalise(&mut self) {
        let l = self.basis_shell.l;
        let lf = f64::from(l);

        // Overlap between two normalised primitives of the same shell.
        let self_overlap = self
            .contraction
            .primitives
            .iter()
            .cartesian_product(self.contraction.primitives.iter())
            .map(|((ai, ci), (aj, cj))| {
                ci * cj * (2.0 * (ai * aj).sqrt() / (ai + aj)).powf(lf + 1.5)
            })
            .sum::<f64>();
        let scale = 1.0 / self_overlap.sqrt();

        let dfact = if l == 0 {
            1.0
        } else {
            (2 * u64::from(l) - 1)
                .checked_double_factorial()
                .map(|d| d as f64)
                .unwrap_or(f64::INFINITY)
        };
        self.contraction.primitives.iter_mut().for_each(|(a, c)| {
            let norm = (2.0 * *a / std::f64::consts::PI).powf(0.75) * (4.0 * *a).powf(0.5 * lf)
                / dfact.sqrt();
            *c *= scale * norm;
        });
    }

    /// Computes the radius beyond which every primitive falls below the shell tolerance,
    ///
    /// ```math
    ///     r_{\mathrm{cut}} = \max_i \sqrt{\frac{\ln\lvert c_i \rvert - \ln\tau}{\alpha_i}},
    /// ```
    ///
    /// taken over primitives with $`\lvert c_i \rvert > \tau`$.
    fn compute_cutoff_radius(&mut self) {
        let log_tol = self.tolerance.ln();
        self.cutoff_radius = self
            .contraction
            .primitives
            .iter()
            .filter(|(_, c)| c.abs() > self.tolerance)
            .map(|(a, c)| ((c.abs().ln() - log_tol) / a).sqrt())
            .fold(0.0, f64::max);
    }
}

// --------
// BasisSet
// --------

/// A structure to manage the contracted shells of a molecule, in atom order.
#[derive(Clone, Debug)]
pub struct BasisSet {
    /// The name of the basis set.
    name: String,

    /// The contracted shells, ordered by atom and then by the order within each atom.
    shells: Vec<BasisShellContraction>,

    /// The index of the atom each shell is centred on.
    shell_atoms: Vec<usize>,

    /// The starting (inclusive) and ending (exclusive) function indices of each shell.
    shell_boundaries: Vec<(usize, usize)>,
}

impl BasisSet {
    /// Constructs a basis set from shells grouped by atom.
    ///
    /// # Arguments
    ///
    /// * `name` - A name for the basis set.
    /// * `atom_shells` - One vector of shells per atom, in atom order.
    pub fn new(name: &str, atom_shells: Vec<Vec<BasisShellContraction>>) -> Self {
        let shell_atoms = atom_shells
            .iter()
            .enumerate()
            .flat_map(|(iatom, shells)| std::iter::repeat(iatom).take(shells.len()))
            .collect_vec();
        let shells = atom_shells.into_iter().flatten().collect_vec();
        let shell_boundaries = shells
            .iter()
            .scan(0, |acc, shell| {
                let start_index = *acc;
                *acc += shell.n_funcs();
                Some((start_index, *acc))
            })
            .collect_vec();
        Self {
            name: name.to_string(),
            shells,
            shell_atoms,
            shell_boundaries,
        }
    }

    /// Constructs a basis set for a molecule from a built-in library entry.
    ///
    /// # Arguments
    ///
    /// * `mol` - The molecule, with coordinates in Bohr.
    /// * `basis_name` - The name of the built-in basis set (case-insensitive).
    /// * `cart` - If `true`, shells are Cartesian with lexicographic order; otherwise they are
    /// pure with increasing-$`m`$ order.
    /// * `tolerance` - The screening tolerance applied to every shell.
    pub fn from_library(
        mol: &Molecule,
        basis_name: &str,
        cart: bool,
        tolerance: f64,
    ) -> Result<Self, anyhow::Error> {
        let library = BasisLibrary::builtin(basis_name)?;
        library.build_basis_set(mol, cart, tolerance)
    }

    /// Constructs a basis set for a molecule from a YAML basis file in the library format.
    pub fn from_yaml_file<P: AsRef<Path>>(
        mol: &Molecule,
        path: P,
        cart: bool,
        tolerance: f64,
    ) -> Result<Self, anyhow::Error> {
        let library = BasisLibrary::from_yaml_file(path)?;
        library.build_basis_set(mol, cart, tolerance)
    }

    /// The name of this basis set.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of shells in this basis set.
    pub fn n_shells(&self) -> usize {
        self.shells.len()
    }

    /// The number of basis functions in this basis set.
    pub fn n_funcs(&self) -> usize {
        self.shell_boundaries.last().map(|(_, end)| *end).unwrap_or(0)
    }

    /// The maximum angular momentum across all shells.
    pub fn lmax(&self) -> u32 {
        self.shells.iter().map(|shell| shell.l()).max().unwrap_or(0)
    }

    /// An iterator over the shells of this basis set.
    pub fn shells(&self) -> impl Iterator<Item = &BasisShellContraction> + '_ {
        self.shells.iter()
    }

    /// The starting (inclusive) and ending (exclusive) function indices of each shell.
    pub fn shell_boundaries(&self) -> &[(usize, usize)] {
        &self.shell_boundaries
    }

    /// The index of the atom that shell `ishell` is centred on.
    pub fn shell_atom(&self, ishell: usize) -> usize {
        self.shell_atoms[ishell]
    }

    /// The starting (inclusive) and ending (exclusive) function indices of the functions
    /// centred on each atom. Atoms without shells get an empty range.
    pub fn atom_function_ranges(&self, n_atoms: usize) -> Vec<(usize, usize)> {
        (0..n_atoms)
            .map(|iatom| {
                let bounds = self
                    .shell_atoms
                    .iter()
                    .zip(self.shell_boundaries.iter())
                    .filter(|(a, _)| **a == iatom)
                    .map(|(_, b)| *b)
                    .collect_vec();
                match (bounds.first(), bounds.last()) {
                    (Some((start, _)), Some((_, end))) => (*start, *end),
                    _ => (0, 0),
                }
            })
            .collect_vec()
    }

    /// Sets the screening tolerance of every shell.
    pub fn set_tolerance(&mut self, tolerance: f64) -> &mut Self {
        self.shells.iter_mut().for_each(|shell| {
            shell.set_tolerance(tolerance);
        });
        self
    }
}

impl Index<usize> for BasisSet {
    type Output = BasisShellContraction;

    fn index(&self, i: usize) -> &Self::Output {
        &self.shells[i]
    }
}

impl fmt::Display for BasisSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Basis set: {}", self.name)?;
        writeln!(f, "  Shells: {}", self.n_shells())?;
        writeln!(f, "  Functions: {}", self.n_funcs())?;
        writeln!(
            f,
            "  Largest cutoff radius: {:.4} Bohr",
            self.shells
                .iter()
                .map(|shell| shell.cutoff_radius)
                .fold(0.0, f64::max)
        )?;
        Ok(())
    }
}
