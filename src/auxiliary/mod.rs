//! Helper items describing molecular geometries.

pub mod atom;
pub mod molecule;
pub mod template_molecules;
