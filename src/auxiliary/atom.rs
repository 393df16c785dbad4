//! Atoms and element look-ups.

use std::collections::HashMap;
use std::fmt;

use anyhow::{self, ensure, format_err};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Bohr per Ångström.
pub const ANGSTROM_TO_BOHR: f64 = 1.0 / 0.529_177_210_903;

/// Atomic numbers keyed by element symbol, for every element in [`periodic_table`].
pub struct ElementTable {
    numbers: HashMap<&'static str, u32>,
}

impl Default for ElementTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementTable {
    #[must_use]
    pub fn new() -> Self {
        let numbers = periodic_table::periodic_table()
            .into_iter()
            .map(|element| (element.symbol, element.atomic_number))
            .collect();
        Self { numbers }
    }

    /// The atomic number of `symbol`, which is matched case-sensitively (`He`, not `HE`).
    pub fn atomic_number(&self, symbol: &str) -> Option<u32> {
        self.numbers.get(symbol).copied()
    }
}

/// An atom of the molecule. Coordinates are always held in Bohr.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub atomic_number: u32,

    pub atomic_symbol: String,

    /// The nuclear position in Bohr.
    pub coordinates: Point3<f64>,
}

impl Atom {
    /// Reads one `symbol x y z` record of an `xyz` file. Unless `bohr` is set the coordinates
    /// are in Ångström and are converted.
    ///
    /// # Errors
    ///
    /// Errors if the record does not have exactly four fields, a coordinate is not a number, or
    /// the symbol is not an element.
    pub fn from_xyz(line: &str, elements: &ElementTable, bohr: bool) -> Result<Atom, anyhow::Error> {
        let fields = line.split_whitespace().collect::<Vec<_>>();
        ensure!(fields.len() == 4, "Expected `symbol x y z`, found `{line}`.");
        let unit = if bohr { 1.0 } else { ANGSTROM_TO_BOHR };
        let mut xyz = [0.0; 3];
        for (x, field) in xyz.iter_mut().zip(&fields[1..]) {
            *x = unit
                * field
                    .parse::<f64>()
                    .map_err(|err| format_err!("Bad coordinate `{field}` in `{line}`: {err}"))?;
        }
        Atom::new_ordinary(fields[0], Point3::from(xyz), elements)
    }

    /// # Errors
    ///
    /// Errors if `atomic_symbol` is not an element.
    pub fn new_ordinary(
        atomic_symbol: &str,
        coordinates: Point3<f64>,
        elements: &ElementTable,
    ) -> Result<Atom, anyhow::Error> {
        let atomic_number = elements
            .atomic_number(atomic_symbol)
            .ok_or_else(|| format_err!("Unknown element `{atomic_symbol}`."))?;
        Ok(Atom {
            atomic_number,
            atomic_symbol: atomic_symbol.to_string(),
            coordinates,
        })
    }

    /// Groups 1 and 2 below hydrogen, whose diffuse valence shells call for a wider radial
    /// quadrature.
    pub fn is_alkali_like(&self) -> bool {
        matches!(
            self.atomic_number,
            3 | 4 | 11 | 12 | 19 | 20 | 37 | 38 | 55 | 56 | 87 | 88
        )
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = [self.coordinates.x, self.coordinates.y, self.coordinates.z];
        write!(
            f,
            "{:>3} ({:>3}) {x:+14.8} {y:+14.8} {z:+14.8}",
            self.atomic_symbol, self.atomic_number
        )
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
