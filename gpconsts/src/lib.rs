use std::f64;

// pi

pub const PI: f64 = f64::consts::PI;
pub const TWOPI: f64 = 2.0 * f64::consts::PI;
pub const FOURPI: f64 = 4.0 * f64::consts::PI;
pub const SQRT_PI: f64 = 1.772_453_850_905_516;
pub const SQRT_FOURPI: f64 = 2.0 * SQRT_PI;

// Y_00 = 1 / sqrt(4 pi)

pub const Y00: f64 = 1.0 / SQRT_FOURPI;

// numerical convergence

pub const EPS7: f64 = 1E-7;
pub const EPS9: f64 = 1E-9;
pub const EPS10: f64 = 1E-10;
pub const EPS12: f64 = 1E-12;
pub const EPS20: f64 = 1E-20;

// Poisson solver

pub const POISSON_MAX_ITER: usize = 200;
pub const POISSON_MAX_EXTRA_LEVELS: usize = 4;
pub const POISSON_DEFAULT_EPS: f64 = 2E-10;
pub const POISSON_DEFAULT_MAXCHARGE: f64 = 1E-6;

// exponent of the reference gaussian used for monopole neutralization (Bohr^-2)

pub const GAUSS_EXPONENT: f64 = 19.0;

// density

pub const CHARGE_TOLERANCE: f64 = EPS7;
pub const MOMENT_SCALE_MIN: f64 = 0.83;
pub const MOMENT_SCALE_MAX: f64 = 1.17;

// smallest number of points per axis on a coarsened grid

pub const MIN_COARSE_POINTS: usize = 4;
