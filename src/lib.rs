//! # xctask: grid tasks for numerical exchange-correlation integration
//!
//! `xctask` prepares the work of a numerical exchange-correlation integration over
//! atom-centred quadrature grids and carries it out with a reference kernel:
//! - partitioning of every atomic grid into spatially compact batches of points, padded to a
//!   multiple of a vector width,
//! - screening of the basis shells significant for each batch, and the submatrix cuts that map
//!   the significant functions onto contiguous blocks of the global matrices,
//! - greedy cost-based load balancing of the resulting tasks over ranks and lanes,
//! - gathering of compact density blocks and scattering of compact contributions back into
//!   global matrices, on host and device-style backends, and
//! - integration of the electron count, the Slater exchange energy, its potential matrix and
//!   its nuclear gradient, with per-lane accumulators and a cross-rank reduction.
//!
//! ## Examples and usage
//!
//! For most items (structs, enums, functions, and traits), their usages are illustrated in test
//! functions. The `xctask` binary reads a YAML input file describing the molecule, the basis set,
//! the grid partitioning and an optional integration (see [`interfaces::input::Input`]).
//!
//! ## License
//!
//! GNU Lesser General Public License v3.0.

pub mod auxiliary;
pub mod backend;
pub mod balance;
pub mod basis;
pub mod comm;
pub mod drivers;
pub mod error;
pub mod grid;
pub mod integrator;
pub mod interfaces;
pub mod io;
pub mod packing;
pub mod screening;
pub mod submatrix;
pub mod task;
