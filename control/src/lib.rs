use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("cannot read control file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown parameter(s): {0:?}")]
    UnknownKeys(Vec<String>),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("line without '=': {0}")]
    Malformed(String),
}

pub type ControlResult<T> = Result<T, ControlError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOrder {
    Laplace(usize), // nn = 1, 2, 3
    Mehrstellen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxMethod {
    GaussSeidel,
    Jacobi,
}

#[derive(Debug, Clone)]
pub struct Control {
    poisson_nn: StencilOrder,
    poisson_relax: RelaxMethod,
    poisson_eps: f64,
    poisson_maxcharge: f64,
    poisson_load_gauss: bool,

    interpolation_nn: usize,

    mix_beta: f64,
    mix_nmaxold: usize,
    mix_metric: String, // none, new
    mix_weight: f64,

    spin_scheme: String, // nonspin, spin
    fixmom: bool,
    width: f64,
    hund: bool,
    charge: f64,
    fixdensity: bool,
    strict_moment_check: bool,

    grid: [usize; 3],
    cell: [f64; 3],
    pbc: [bool; 3],
}

impl Default for Control {
    fn default() -> Self {
        Control {
            poisson_nn: StencilOrder::Laplace(3),
            poisson_relax: RelaxMethod::GaussSeidel,
            poisson_eps: 2.0E-10,
            poisson_maxcharge: 1.0E-6,
            poisson_load_gauss: false,

            interpolation_nn: 3,

            mix_beta: 0.25,
            mix_nmaxold: 3,
            mix_metric: "none".to_string(),
            mix_weight: 50.0,

            spin_scheme: "nonspin".to_string(),
            fixmom: false,
            width: 0.0,
            hund: false,
            charge: 0.0,
            fixdensity: false,
            strict_moment_check: true,

            grid: [32, 32, 32],
            cell: [10.0, 10.0, 10.0],
            pbc: [true, true, true],
        }
    }
}

fn invalid(key: &str, value: &str) -> ControlError {
    ControlError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> ControlResult<T> {
    value.parse::<T>().map_err(|_| invalid(key, value))
}

fn parse_triple<T: std::str::FromStr + Copy>(key: &str, value: &str) -> ControlResult<[T; 3]> {
    let v: Vec<T> = value
        .split_whitespace()
        .map(|x| parse_value::<T>(key, x))
        .collect::<ControlResult<Vec<T>>>()?;

    if v.len() != 3 {
        return Err(invalid(key, value));
    }

    Ok([v[0], v[1], v[2]])
}

impl Control {
    pub fn new() -> Control {
        Control::default()
    }

    pub fn get_poisson_nn(&self) -> StencilOrder {
        self.poisson_nn
    }

    pub fn get_poisson_relax(&self) -> RelaxMethod {
        self.poisson_relax
    }

    pub fn get_poisson_eps(&self) -> f64 {
        self.poisson_eps
    }

    pub fn get_poisson_maxcharge(&self) -> f64 {
        self.poisson_maxcharge
    }

    pub fn get_poisson_load_gauss(&self) -> bool {
        self.poisson_load_gauss
    }

    pub fn get_interpolation_nn(&self) -> usize {
        self.interpolation_nn
    }

    pub fn get_mix_beta(&self) -> f64 {
        self.mix_beta
    }

    pub fn get_mix_nmaxold(&self) -> usize {
        self.mix_nmaxold
    }

    pub fn get_mix_metric(&self) -> &str {
        &self.mix_metric
    }

    pub fn get_mix_weight(&self) -> f64 {
        self.mix_weight
    }

    pub fn is_spin(&self) -> bool {
        self.spin_scheme == "spin"
    }

    pub fn get_nspin(&self) -> usize {
        if self.is_spin() {
            2
        } else {
            1
        }
    }

    pub fn get_fixmom(&self) -> bool {
        self.fixmom
    }

    pub fn get_width(&self) -> f64 {
        self.width
    }

    pub fn get_hund(&self) -> bool {
        self.hund
    }

    pub fn get_charge(&self) -> f64 {
        self.charge
    }

    pub fn get_fixdensity(&self) -> bool {
        self.fixdensity
    }

    pub fn get_strict_moment_check(&self) -> bool {
        self.strict_moment_check
    }

    pub fn get_grid(&self) -> [usize; 3] {
        self.grid
    }

    pub fn get_cell(&self) -> [f64; 3] {
        self.cell
    }

    pub fn get_pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn read_file<P: AsRef<Path>>(&mut self, inpfile: P) -> ControlResult<()> {
        let path = inpfile.as_ref();

        let file = File::open(path).map_err(|e| ControlError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut lines = Vec::new();

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| ControlError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            lines.push(line);
        }

        self.read_lines(lines.iter().map(|s| s.as_str()))
    }

    pub fn read_str(&mut self, text: &str) -> ControlResult<()> {
        self.read_lines(text.lines())
    }

    fn read_lines<'a, I: Iterator<Item = &'a str>>(&mut self, lines: I) -> ControlResult<()> {
        let mut unknown = Vec::new();

        for raw in lines {
            let line = match raw.find('#') {
                Some(i) => &raw[..i],
                None => raw,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let s: Vec<&str> = line.splitn(2, '=').map(|x| x.trim()).collect();

            if s.len() != 2 {
                return Err(ControlError::Malformed(line.to_string()));
            }

            let (key, value) = (s[0], s[1]);

            match key {
                "poisson_nn" => {
                    self.poisson_nn = match value {
                        "M" | "m" => StencilOrder::Mehrstellen,
                        "1" => StencilOrder::Laplace(1),
                        "2" => StencilOrder::Laplace(2),
                        "3" => StencilOrder::Laplace(3),
                        _ => return Err(invalid(key, value)),
                    };
                }

                "poisson_relax" => {
                    self.poisson_relax = match value.to_uppercase().as_str() {
                        "GS" => RelaxMethod::GaussSeidel,
                        "J" => RelaxMethod::Jacobi,
                        _ => return Err(invalid(key, value)),
                    };
                }

                "poisson_eps" => {
                    self.poisson_eps = parse_value(key, value)?;
                }

                "poisson_maxcharge" => {
                    self.poisson_maxcharge = parse_value(key, value)?;
                }

                "poisson_load_gauss" => {
                    self.poisson_load_gauss = parse_value(key, value)?;
                }

                "interpolation_nn" => {
                    let nn: usize = parse_value(key, value)?;
                    if !(1..=3).contains(&nn) {
                        return Err(invalid(key, value));
                    }
                    self.interpolation_nn = nn;
                }

                "mix_beta" => {
                    self.mix_beta = parse_value(key, value)?;
                }

                "mix_nmaxold" => {
                    let n: usize = parse_value(key, value)?;
                    if n == 0 {
                        return Err(invalid(key, value));
                    }
                    self.mix_nmaxold = n;
                }

                "mix_metric" => {
                    let m = value.to_lowercase();
                    if m != "none" && m != "new" {
                        return Err(invalid(key, value));
                    }
                    self.mix_metric = m;
                }

                "mix_weight" => {
                    self.mix_weight = parse_value(key, value)?;
                }

                "spin_scheme" => {
                    let m = value.to_lowercase();
                    if m != "nonspin" && m != "spin" {
                        return Err(invalid(key, value));
                    }
                    self.spin_scheme = m;
                }

                "fixmom" => {
                    self.fixmom = parse_value(key, value)?;
                }

                "width" => {
                    self.width = parse_value(key, value)?;
                }

                "hund" => {
                    self.hund = parse_value(key, value)?;
                }

                "charge" => {
                    self.charge = parse_value(key, value)?;
                }

                "fixdensity" => {
                    self.fixdensity = parse_value(key, value)?;
                }

                "strict_moment_check" => {
                    self.strict_moment_check = parse_value(key, value)?;
                }

                "grid" => {
                    self.grid = parse_triple(key, value)?;
                }

                "cell" => {
                    self.cell = parse_triple(key, value)?;
                }

                "pbc" => {
                    self.pbc = parse_triple(key, value)?;
                }

                _ => {
                    unknown.push(line.to_string());
                }
            }
        }

        if !unknown.is_empty() {
            return Err(ControlError::UnknownKeys(unknown));
        }

        Ok(())
    }

    pub fn display(&self) {
        let nn = match self.poisson_nn {
            StencilOrder::Laplace(n) => n.to_string(),
            StencilOrder::Mehrstellen => "M".to_string(),
        };
        let relax = match self.poisson_relax {
            RelaxMethod::GaussSeidel => "GS",
            RelaxMethod::Jacobi => "J",
        };

        info!(poisson_nn = %nn, poisson_relax = relax, "poisson solver");
        info!(
            poisson_eps = self.poisson_eps,
            poisson_maxcharge = self.poisson_maxcharge,
            poisson_load_gauss = self.poisson_load_gauss,
            "poisson tolerances"
        );
        info!(interpolation_nn = self.interpolation_nn, "density interpolation");
        info!(
            mix_beta = self.mix_beta,
            mix_nmaxold = self.mix_nmaxold,
            mix_metric = %self.mix_metric,
            mix_weight = self.mix_weight,
            "density mixer"
        );
        info!(
            spin_scheme = %self.spin_scheme,
            fixmom = self.fixmom,
            width = self.width,
            hund = self.hund,
            charge = self.charge,
            fixdensity = self.fixdensity,
            strict_moment_check = self.strict_moment_check,
            "density"
        );
        info!(grid = ?self.grid, cell = ?self.cell, pbc = ?self.pbc, "grid");
    }
}
