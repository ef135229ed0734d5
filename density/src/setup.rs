use gpconsts::*;
use special::gaussian_radial_moment;

/// Atomic data the density pipeline needs from a PAW setup.
///
/// Radial functions are given without their angular part; a projector
/// channel `j` of angular momentum `l` contributes `2l + 1` entries to the
/// projector index `i`.
pub trait Setup {
    fn get_symbol(&self) -> &str;

    /// nuclear charge
    fn get_z(&self) -> f64;

    /// number of valence electrons
    fn get_nvalence(&self) -> f64;

    /// number of frozen core electrons
    fn get_ncore(&self) -> f64;

    fn get_l_j(&self) -> &[usize];

    /// reference occupations of the projector channels
    fn get_f_j(&self) -> &[f64];

    /// maximum angular momentum of the compensation charges
    fn get_lmax(&self) -> usize;

    /// `Delta_pL`: packed linear coefficients of the multipole expansion
    fn get_delta_pl(&self) -> &[Vec<f64>];

    /// constant part of the monopole coefficient
    fn get_delta0(&self) -> f64;

    /// radius of the augmentation sphere
    fn get_rcut(&self) -> f64;

    /// exponent of the gaussian compensation charges
    fn get_ghat_exponent(&self) -> f64;

    fn get_phit(&self, j: usize, r: f64) -> f64;

    fn get_phi(&self, j: usize, r: f64) -> f64;

    fn get_nct(&self, r: f64) -> f64;

    fn get_nc(&self, r: f64) -> f64;

    fn get_ni(&self) -> usize {
        self.get_l_j().iter().map(|l| 2 * l + 1).sum()
    }

    fn get_np(&self) -> usize {
        let ni = self.get_ni();
        ni * (ni + 1) / 2
    }

    fn get_nlm(&self) -> usize {
        special::n_lm(self.get_lmax())
    }

    /// Partial-wave channel and magnetic index of each projector index.
    fn get_jlm_i(&self) -> Vec<(usize, usize, usize)> {
        let mut jlm = Vec::with_capacity(self.get_ni());
        for (j, &l) in self.get_l_j().iter().enumerate() {
            for m in 0..2 * l + 1 {
                jlm.push((j, l, l * l + m));
            }
        }
        jlm
    }
}

/// A hydrogen-like one-projector setup with gaussian smooth partial wave
/// and 1s all-electron partial wave.
///
/// `norm` is `<phit|phit>`; the augmentation carries the missing `1 - norm`.
#[derive(Debug, Clone)]
pub struct ModelSetup {
    symbol: String,
    z: f64,
    l_j: Vec<usize>,
    f_j: Vec<f64>,
    delta_pl: Vec<Vec<f64>>,
    delta0: f64,
    norm: f64,
    phit_exponent: f64,
    ghat_exponent: f64,
    rcut: f64,
}

impl ModelSetup {
    pub fn hydrogen(norm: f64) -> ModelSetup {
        assert!(norm > 0.0 && norm <= 1.0, "pseudo norm must be in (0, 1]");

        let z = 1.0;

        ModelSetup {
            symbol: "H".to_string(),
            z,
            l_j: vec![0],
            f_j: vec![1.0],
            delta_pl: vec![vec![(1.0 - norm) * Y00]],
            delta0: -z * Y00,
            norm,
            phit_exponent: 1.0,
            ghat_exponent: 4.0,
            rcut: 1.2,
        }
    }
}

impl Setup for ModelSetup {
    fn get_symbol(&self) -> &str {
        &self.symbol
    }

    fn get_z(&self) -> f64 {
        self.z
    }

    fn get_nvalence(&self) -> f64 {
        self.f_j.iter().sum()
    }

    fn get_ncore(&self) -> f64 {
        0.0
    }

    fn get_l_j(&self) -> &[usize] {
        &self.l_j
    }

    fn get_f_j(&self) -> &[f64] {
        &self.f_j
    }

    fn get_lmax(&self) -> usize {
        0
    }

    fn get_delta_pl(&self) -> &[Vec<f64>] {
        &self.delta_pl
    }

    fn get_delta0(&self) -> f64 {
        self.delta0
    }

    fn get_rcut(&self) -> f64 {
        self.rcut
    }

    fn get_ghat_exponent(&self) -> f64 {
        self.ghat_exponent
    }

    // radial integral of phit^2 r^2 equals norm
    fn get_phit(&self, _j: usize, r: f64) -> f64 {
        let a = self.phit_exponent;
        let c = (self.norm / gaussian_radial_moment(1, 2.0 * a)).sqrt();
        c * (-a * r * r).exp()
    }

    fn get_phi(&self, _j: usize, r: f64) -> f64 {
        2.0 * (-r).exp()
    }

    fn get_nct(&self, _r: f64) -> f64 {
        0.0
    }

    fn get_nc(&self, _r: f64) -> f64 {
        0.0
    }
}

/// Occupations `f_si` of the projector orbitals used for the initial guess.
///
/// A positive `charge` is removed from the outermost channels first, a
/// negative one fills the innermost. With `hund` the orbitals are filled
/// spin up first; otherwise each channel is spread evenly over its `m`
/// values with as much of `magmom` as the channel can carry.
pub fn initial_occupation_numbers(
    setup: &dyn Setup,
    mut magmom: f64,
    hund: bool,
    mut charge: f64,
    nspin: usize,
) -> Vec<Vec<f64>> {
    let l_j = setup.get_l_j();
    let mut f_j = setup.get_f_j().to_vec();

    if charge >= 0.0 {
        for f in f_j.iter_mut().rev() {
            let c = f.min(charge);
            *f -= c;
            charge -= c;
        }
    } else {
        for (f, &l) in f_j.iter_mut().zip(l_j.iter()) {
            let c = (2.0 * (2 * l + 1) as f64 - *f).min(-charge);
            *f += c;
            charge += c;
        }
    }

    let ni = setup.get_ni();
    let mut f_si = vec![vec![0.0; ni]; nspin];

    let mut i = 0;
    for (&f, &l) in f_j.iter().zip(l_j.iter()) {
        let degeneracy = 2 * l + 1;

        if hund && nspin == 2 {
            let nf = f.round() as usize;
            for m in 0..nf.min(degeneracy) {
                f_si[0][i + m] = 1.0;
            }
            for m in 0..nf.saturating_sub(degeneracy).min(degeneracy) {
                f_si[1][i + m] = 1.0;
            }
        } else if nspin == 1 {
            for m in 0..degeneracy {
                f_si[0][i + m] = f / degeneracy as f64;
            }
        } else {
            let maxmom = f.min(2.0 * degeneracy as f64 - f);
            let mag = magmom.max(-maxmom).min(maxmom);
            for m in 0..degeneracy {
                f_si[0][i + m] = 0.5 * (f + mag) / degeneracy as f64;
                f_si[1][i + m] = 0.5 * (f - mag) / degeneracy as f64;
            }
            magmom -= mag;
        }

        i += degeneracy;
    }

    f_si
}

/// Packed diagonal density matrices built from orbital occupations.
pub fn initial_density_matrix(setup: &dyn Setup, f_si: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let ni = setup.get_ni();

    f_si.iter()
        .map(|f_i| {
            let mut d_ii = vec![vec![0.0; ni]; ni];
            for i in 0..ni {
                d_ii[i][i] = f_i[i];
            }
            utility::pack(&d_ii)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hydrogen_setup() {
        let s = ModelSetup::hydrogen(0.8);
        assert_eq!(s.get_ni(), 1);
        assert_eq!(s.get_np(), 1);
        assert_eq!(s.get_nlm(), 1);
        assert_relative_eq!(s.get_delta0() * SQRT_FOURPI, -1.0, epsilon = 1e-14);
        assert_relative_eq!(s.get_delta_pl()[0][0] * SQRT_FOURPI, 0.2, epsilon = 1e-14);

        // radial norms by simple quadrature
        let dr = 1e-3;
        let (mut nt, mut n) = (0.0, 0.0);
        for k in 0..30000 {
            let r = (k as f64 + 0.5) * dr;
            nt += s.get_phit(0, r).powi(2) * r * r * dr;
            n += s.get_phi(0, r).powi(2) * r * r * dr;
        }
        assert_relative_eq!(nt, 0.8, epsilon = 1e-6);
        assert_relative_eq!(n, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_initial_occupations() {
        let s = ModelSetup::hydrogen(0.8);

        let f = initial_occupation_numbers(&s, 0.0, false, 0.0, 1);
        assert_eq!(f, vec![vec![1.0]]);

        let f = initial_occupation_numbers(&s, 1.0, false, 0.0, 2);
        assert_eq!(f, vec![vec![1.0], vec![0.0]]);

        let f = initial_occupation_numbers(&s, 0.0, false, 0.0, 2);
        assert_eq!(f, vec![vec![0.5], vec![0.5]]);

        // moment is capped by what the channel can hold
        let f = initial_occupation_numbers(&s, 3.0, false, 0.0, 2);
        assert_eq!(f, vec![vec![1.0], vec![0.0]]);

        let f = initial_occupation_numbers(&s, 0.0, true, 0.0, 2);
        assert_eq!(f, vec![vec![1.0], vec![0.0]]);

        // cation
        let f = initial_occupation_numbers(&s, 0.0, false, 1.0, 1);
        assert_eq!(f, vec![vec![0.0]]);

        // anion fills the 1s shell
        let f = initial_occupation_numbers(&s, 0.0, false, -1.0, 1);
        assert_eq!(f, vec![vec![2.0]]);
    }

    #[test]
    fn test_initial_density_matrix() {
        let s = ModelSetup::hydrogen(0.8);
        let d = initial_density_matrix(&s, &[vec![0.7], vec![0.3]]);
        assert_eq!(d, vec![vec![0.7], vec![0.3]]);
    }
}
