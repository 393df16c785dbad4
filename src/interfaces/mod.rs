//! Interfaces between xctask and its users.

use anyhow;

pub mod cli;
pub mod input;

/// Trait for carrying out the calculations an input describes.
pub trait InputHandle {
    /// Handles the input section and runs appropriate calculations.
    fn handle(&self) -> Result<(), anyhow::Error>;
}
