use crate::setup::Setup;
use gpcomm::Communicator;
use gpconsts::*;
use gpgrid::Array3;
use griddesc::GridDescriptor;
use special::{gaussian_radial_moment, l_of, real_solid_harmonics, real_spherical_harmonics};
use std::fmt;
use std::rc::Rc;

/// One atom: its setup, position and the quantities derived from its
/// density matrix.
pub struct Nucleus {
    setup: Rc<dyn Setup>,
    spos_c: [f64; 3],
    magmom: f64,
    rank: usize,
    q_l: Vec<f64>,
    mom: f64,
    ghat_lg: Vec<Array3<f64>>,
}

impl fmt::Debug for Nucleus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Nucleus")
            .field("symbol", &self.setup.get_symbol())
            .field("spos_c", &self.spos_c)
            .field("magmom", &self.magmom)
            .field("rank", &self.rank)
            .finish()
    }
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

// f(d) at every stored point, with d the displacement from center
fn sample(gd: &GridDescriptor, center: [f64; 3], f: impl Fn([f64; 3]) -> f64) -> Array3<f64> {
    let mut a = gd.zeros();
    let [n0, n1, n2] = gd.get_shape();

    for k in 0..n2 {
        for j in 0..n1 {
            for i in 0..n0 {
                a[[i, j, k]] = f(gd.get_displacement([i, j, k], center));
            }
        }
    }

    a
}

impl Nucleus {
    pub fn new(setup: Rc<dyn Setup>, spos_c: [f64; 3], magmom: f64) -> Nucleus {
        let nlm = setup.get_nlm();

        Nucleus {
            setup,
            spos_c,
            magmom,
            rank: 0,
            q_l: vec![0.0; nlm],
            mom: 0.0,
            ghat_lg: Vec::new(),
        }
    }

    pub fn get_setup(&self) -> &dyn Setup {
        self.setup.as_ref()
    }

    pub fn get_spos(&self) -> [f64; 3] {
        self.spos_c
    }

    pub fn set_spos(&mut self, spos_c: [f64; 3]) {
        self.spos_c = spos_c;
    }

    pub fn get_magmom(&self) -> f64 {
        self.magmom
    }

    /// Rank owning the density matrix of this atom.
    pub fn get_rank(&self) -> usize {
        self.rank
    }

    pub fn get_q_l(&self) -> &[f64] {
        &self.q_l
    }

    pub fn get_mom(&self) -> f64 {
        self.mom
    }

    pub fn get_position(&self, gd: &GridDescriptor) -> [f64; 3] {
        let cell = gd.get_cell();
        [
            self.spos_c[0] * cell[0],
            self.spos_c[1] * cell[1],
            self.spos_c[2] * cell[2],
        ]
    }

    /// Gaussian compensation charges `ghat_L` on the fine grid, normalized
    /// so that `int r^l Y_L ghat_L = 1`. The monopole is renormalized on the
    /// grid to integrate to `sqrt(4 pi)` exactly.
    pub fn initialize_compensation_charges(&mut self, finegd: &GridDescriptor, comm: &dyn Communicator) {
        let center = self.get_position(finegd);
        let alpha = self.setup.get_ghat_exponent();

        self.ghat_lg = (0..self.setup.get_nlm())
            .map(|lm| {
                let l = l_of(lm);
                let c = 1.0 / gaussian_radial_moment(l + 1, alpha);
                sample(finegd, center, |d| {
                    let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
                    c * (-alpha * r2).exp() * real_solid_harmonics(lm, d)
                })
            })
            .collect();

        let q0 = finegd.integrate(&self.ghat_lg[0], comm);
        self.ghat_lg[0].scale(SQRT_FOURPI / q0);
    }

    /// Superposition of occupied pseudo orbitals.
    pub fn add_atomic_density(&self, nt_s: &mut [Array3<f64>], gd: &GridDescriptor, f_si: &[Vec<f64>]) {
        let center = self.get_position(gd);
        let jlm_i = self.setup.get_jlm_i();

        for (nt, f_i) in nt_s.iter_mut().zip(f_si.iter()) {
            let setup = &self.setup;
            let n = sample(gd, center, |d| {
                let r = norm(d);
                jlm_i
                    .iter()
                    .zip(f_i.iter())
                    .map(|(&(j, _, lm), f)| f * (setup.get_phit(j, r) * real_spherical_harmonics(lm, d)).powi(2))
                    .sum()
            });
            nt.add_from(&n);
        }
    }

    /// Smooth core density, shared out evenly between the spin channels.
    pub fn add_smooth_core_density(&self, nct: &mut Array3<f64>, gd: &GridDescriptor, nspin: usize) {
        let center = self.get_position(gd);
        let setup = &self.setup;
        let n = sample(gd, center, |d| setup.get_nct(norm(d)) * Y00 / nspin as f64);
        nct.add_from(&n);
    }

    /// `Q_L = sum_s sum_p D_sp Delta_pL + Delta0 delta_L0`
    pub fn calculate_multipole_moments(&mut self, d_sp: &[Vec<f64>]) {
        let delta_pl = self.setup.get_delta_pl();

        for (lm, q) in self.q_l.iter_mut().enumerate() {
            *q = d_sp
                .iter()
                .map(|d_p| d_p.iter().zip(delta_pl.iter()).map(|(d, dl)| d * dl[lm]).sum::<f64>())
                .sum();
        }

        self.q_l[0] += self.setup.get_delta0();
    }

    pub fn broadcast_multipole_moments(&mut self, comm: &dyn Communicator) {
        comm.broadcast_slice(&mut self.q_l, self.rank);
    }

    pub fn add_compensation_charge(&self, rhot: &mut Array3<f64>) {
        for (q, ghat) in self.q_l.iter().zip(self.ghat_lg.iter()) {
            rhot.axpy(*q, ghat);
        }
    }

    /// Adds `sum_ij D_ij (phi_i phi_j - phit_i phit_j) + (nc - nct)` to
    /// every spin channel of `n_s`.
    pub fn add_density_correction(&self, n_s: &mut [Array3<f64>], d_sp: &[Vec<f64>], gd: &GridDescriptor) {
        let center = self.get_position(gd);
        let jlm_i = self.setup.get_jlm_i();
        let ni = self.setup.get_ni();
        let nspin = n_s.len();
        let setup = &self.setup;

        for (n, d_p) in n_s.iter_mut().zip(d_sp.iter()) {
            let d_ii = utility::unpack2(d_p, ni);

            let dn = sample(gd, center, |d| {
                let r = norm(d);

                let mut v = 0.0;
                for (i1, &(j1, _, lm1)) in jlm_i.iter().enumerate() {
                    let y1 = real_spherical_harmonics(lm1, d);
                    for (i2, &(j2, _, lm2)) in jlm_i.iter().enumerate() {
                        let y2 = real_spherical_harmonics(lm2, d);
                        let pp = setup.get_phi(j1, r) * setup.get_phi(j2, r)
                            - setup.get_phit(j1, r) * setup.get_phit(j2, r);
                        v += d_ii[i1][i2] * pp * y1 * y2;
                    }
                }

                v + (setup.get_nc(r) - setup.get_nct(r)) * Y00 / nspin as f64
            });

            n.add_from(&dn);
        }
    }

    /// Moment from the density matrices plus the pseudo spin density
    /// integrated inside the augmentation sphere.
    pub fn calculate_magnetic_moment(
        &mut self,
        d_sp: &[Vec<f64>],
        spin_density: &Array3<f64>,
        finegd: &GridDescriptor,
        comm: &dyn Communicator,
    ) -> f64 {
        let delta_pl = self.setup.get_delta_pl();

        let mut mom: f64 = d_sp[0]
            .iter()
            .zip(d_sp[1].iter())
            .zip(delta_pl.iter())
            .map(|((up, dn), dl)| (up - dn) * dl[0])
            .sum();
        mom *= SQRT_FOURPI;

        let center = self.get_position(finegd);
        let rcut = self.setup.get_rcut();
        let step = sample(finegd, center, |d| if norm(d) < rcut { 1.0 } else { 0.0 });

        mom += finegd.integrate_product(&step, spin_density, comm);

        self.mom = mom;
        mom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::ModelSetup;
    use approx::assert_relative_eq;
    use gpcomm::SerialComm;

    fn hydrogen() -> Nucleus {
        Nucleus::new(Rc::new(ModelSetup::hydrogen(0.8)), [0.5, 0.5, 0.5], 0.0)
    }

    #[test]
    fn test_multipole_moments() {
        let mut nucleus = hydrogen();
        nucleus.calculate_multipole_moments(&[vec![1.0]]);
        assert_relative_eq!(nucleus.get_q_l()[0] * SQRT_FOURPI, -0.8, epsilon = 1e-14);

        nucleus.calculate_multipole_moments(&[vec![0.5], vec![0.5]]);
        assert_relative_eq!(nucleus.get_q_l()[0] * SQRT_FOURPI, -0.8, epsilon = 1e-14);
    }

    #[test]
    fn test_compensation_charge_integral() {
        let comm = SerialComm::new();
        let finegd = GridDescriptor::new([32, 32, 32], [8.0; 3], [true; 3]).unwrap();

        let mut nucleus = hydrogen();
        nucleus.initialize_compensation_charges(&finegd, &comm);
        nucleus.calculate_multipole_moments(&[vec![1.0]]);

        let mut rhot = finegd.zeros();
        nucleus.add_compensation_charge(&mut rhot);

        assert_relative_eq!(finegd.integrate(&rhot, &comm), -0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_atomic_density_integral() {
        let comm = SerialComm::new();
        let gd = GridDescriptor::new([24, 24, 24], [8.0; 3], [true; 3]).unwrap();

        let nucleus = hydrogen();
        let mut nt_s = gd.zeros_spin(1);
        nucleus.add_atomic_density(&mut nt_s, &gd, &[vec![1.0]]);

        assert_relative_eq!(gd.integrate(&nt_s[0], &comm), 0.8, epsilon = 1e-4);
    }
}
