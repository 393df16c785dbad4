//! Gaussian basis sets.

pub mod ao;
pub mod library;
pub mod shell;
