//! Angular layouts of basis shells: which functions a shell holds and in which order they occupy
//! consecutive basis-function indices.

use std::collections::HashSet;
use std::fmt;
use std::slice::Iter;

use anyhow::{self, ensure};
use itertools::Itertools;

#[cfg(test)]
#[path = "ao_tests.rs"]
mod ao_tests;

/// Spectroscopic letters for shell degrees.
const SHELL_LETTERS: [char; 8] = ['S', 'P', 'D', 'F', 'G', 'H', 'I', 'K'];

/// Number of Cartesian monomials of total degree `l`.
fn n_cart(l: u32) -> usize {
    let l = l as usize;
    (l + 1) * (l + 2) / 2
}

// ---------
// PureOrder
// ---------

/// Real solid harmonics of a single degree, listed by their $`m`$ values.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PureOrder {
    mls: Vec<i32>,

    /// The degree shared by all listed harmonics.
    pub lpure: u32,
}

impl PureOrder {
    /// Lists the harmonics in the given $`m`$ order.
    ///
    /// # Errors
    ///
    /// Errors if `mls` is empty, repeats a value, or does not cover $`-l \dots l`$ for the
    /// degree implied by its largest $`|m|`$.
    pub fn new(mls: &[i32]) -> Result<Self, anyhow::Error> {
        let lpure = mls.iter().map(|m| m.unsigned_abs()).max().unwrap_or(0);
        ensure!(!mls.is_empty(), "An m ordering needs at least one entry.");
        let distinct = mls.iter().collect::<HashSet<_>>();
        ensure!(
            mls.len() == 2 * lpure as usize + 1 && distinct.len() == mls.len(),
            "The m values [{}] do not span degree {lpure} exactly once.",
            mls.iter().join(", ")
        );
        Ok(Self {
            mls: mls.to_vec(),
            lpure,
        })
    }

    /// $`m = -l, -l + 1, \dots, l`$.
    #[must_use]
    pub fn increasingm(lpure: u32) -> Self {
        let l = lpure as i32;
        Self {
            mls: (-l..=l).collect(),
            lpure,
        }
    }

    pub fn iter(&self) -> Iter<'_, i32> {
        self.mls.iter()
    }

    pub fn ncomps(&self) -> usize {
        self.mls.len()
    }
}

impl fmt::Debug for PureOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pure({})", self.iter().join(", "))
    }
}

// ---------
// CartOrder
// ---------

/// Cartesian monomials $`x^{l_x} y^{l_y} z^{l_z}`$ of a single total degree, listed by their
/// exponent triples.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CartOrder {
    /// The exponent triples $`(l_x, l_y, l_z)`$ in function order.
    pub cart_tuples: Vec<(u32, u32, u32)>,

    /// The total degree $`l_x + l_y + l_z`$ shared by all monomials.
    pub lcart: u32,
}

impl CartOrder {
    /// Lists the monomials in the given exponent order.
    ///
    /// # Errors
    ///
    /// Errors if `cart_tuples` is empty, mixes total degrees, or misses or repeats a monomial.
    pub fn new(cart_tuples: &[(u32, u32, u32)]) -> Result<Self, anyhow::Error> {
        let lcart = match cart_tuples.first() {
            Some((lx, ly, lz)) => lx + ly + lz,
            None => anyhow::bail!("A Cartesian ordering needs at least one entry."),
        };
        let distinct = cart_tuples.iter().collect::<HashSet<_>>();
        ensure!(
            cart_tuples.iter().all(|(lx, ly, lz)| lx + ly + lz == lcart)
                && distinct.len() == cart_tuples.len()
                && cart_tuples.len() == n_cart(lcart),
            "The exponent triples do not span degree {lcart} exactly once."
        );
        Ok(Self {
            cart_tuples: cart_tuples.to_vec(),
            lcart,
        })
    }

    /// Lexicographic order, highest powers of $`x`$ then $`y`$ first:
    /// $`x^l, x^{l-1}y, x^{l-1}z, \dots, z^l`$.
    #[must_use]
    pub fn lex(lcart: u32) -> Self {
        let cart_tuples = (0..=lcart)
            .rev()
            .flat_map(|lx| (0..=lcart - lx).rev().map(move |ly| (lx, ly, lcart - lx - ly)))
            .collect_vec();
        Self { cart_tuples, lcart }
    }

    pub fn iter(&self) -> Iter<'_, (u32, u32, u32)> {
        self.cart_tuples.iter()
    }

    pub fn ncomps(&self) -> usize {
        self.cart_tuples.len()
    }
}

impl fmt::Debug for CartOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cart({})", self.iter().map(monomial_label).join(", "))
    }
}

/// Writes a monomial as repeated coordinate letters, *e.g.* `xxy` for $`(2, 1, 0)`$ and `1`
/// for the constant.
pub(crate) fn monomial_label(&(lx, ly, lz): &(u32, u32, u32)) -> String {
    if lx + ly + lz == 0 {
        return "1".to_string();
    }
    ["x".repeat(lx as usize), "y".repeat(ly as usize), "z".repeat(lz as usize)].concat()
}

// ----------
// ShellOrder
// ----------

/// The kind of angular functions in a shell together with their order.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ShellOrder {
    /// Real solid harmonics.
    Pure(PureOrder),

    /// Cartesian monomials.
    Cart(CartOrder),
}

impl ShellOrder {
    fn degree(&self) -> u32 {
        match self {
            ShellOrder::Pure(pure_order) => pure_order.lpure,
            ShellOrder::Cart(cart_order) => cart_order.lcart,
        }
    }
}

impl fmt::Display for ShellOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellOrder::Pure(pure_order) => write!(f, "Pure ({})", pure_order.iter().join(", ")),
            ShellOrder::Cart(cart_order) => write!(
                f,
                "Cart ({})",
                cart_order.iter().map(monomial_label).join(", ")
            ),
        }
    }
}

// ----------
// BasisShell
// ----------

/// The angular part of a basis shell.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BasisShell {
    /// The shell degree: $`l`$ for solid harmonics, $`l_x + l_y + l_z`$ for monomials.
    pub l: u32,

    pub shell_order: ShellOrder,
}

impl BasisShell {
    /// # Errors
    ///
    /// Errors if `l` differs from the degree of `shell_order`.
    pub fn new(l: u32, shell_order: ShellOrder) -> Result<Self, anyhow::Error> {
        ensure!(
            shell_order.degree() == l,
            "Shell degree {l} does not match the ordering {shell_order}."
        );
        Ok(Self { l, shell_order })
    }

    /// Increasing-$`m`$ solid harmonics, or lexicographic monomials if `cart` is set.
    #[must_use]
    pub fn standard(l: u32, cart: bool) -> Self {
        let shell_order = if cart {
            ShellOrder::Cart(CartOrder::lex(l))
        } else {
            ShellOrder::Pure(PureOrder::increasingm(l))
        };
        Self { l, shell_order }
    }

    pub fn n_funcs(&self) -> usize {
        match &self.shell_order {
            ShellOrder::Pure(pure_order) => pure_order.ncomps(),
            ShellOrder::Cart(cart_order) => cart_order.ncomps(),
        }
    }

    /// The spectroscopic letter of the shell degree, or the degree itself beyond `K`.
    pub fn label(&self) -> String {
        SHELL_LETTERS
            .get(self.l as usize)
            .map_or_else(|| self.l.to_string(), char::to_string)
    }
}
