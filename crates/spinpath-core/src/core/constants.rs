//! Physical constants in the internal unit system (meV, Tesla, Kelvin, ps).

/// Bohr magneton [meV / T].
pub const MU_B: f64 = 0.057883817555;

/// Boltzmann constant [meV / K].
pub const K_B: f64 = 0.08617330350;

/// Gyromagnetic ratio of the electron [rad / (ps * T)].
pub const GAMMA: f64 = 0.1760859644;
