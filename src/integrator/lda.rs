//! Slater exchange in the local density approximation.

use std::f64::consts::PI;

/// Densities below this are treated as zero.
pub const DENSITY_THRESHOLD: f64 = 1e-14;

/// The Slater exchange constant $`C_x = \tfrac{3}{4}\left(\tfrac{3}{\pi}\right)^{1/3}`$.
pub fn slater_constant() -> f64 {
    0.75 * (3.0 / PI).cbrt()
}

/// The exchange energy density $`e_x = -C_x \rho^{4/3}`$ and potential
/// $`v_x = -\tfrac{4}{3} C_x \rho^{1/3}`$ at density `rho`. Both vanish below
/// [`DENSITY_THRESHOLD`].
pub fn slater_exchange(rho: f64) -> (f64, f64) {
    if rho < DENSITY_THRESHOLD {
        return (0.0, 0.0);
    }
    let cx = slater_constant();
    let rho_13 = rho.cbrt();
    (-cx * rho * rho_13, -4.0 / 3.0 * cx * rho_13)
}
