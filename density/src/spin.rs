use crate::{Density, DensityError, DensityResult};
use gpcomm::Communicator;
use gpconsts::*;
use tracing::{info, warn};

impl Density {
    /// Scale the up and down pseudo densities by `x` and `y` so that the
    /// total charge and the total magnetic moment come out right.
    pub(crate) fn normalize_spin(&mut self, comm: &dyn Communicator) -> DensityResult<()> {
        let mut q_s = [0.0; 2];
        for &a in self.my_atoms.iter() {
            let setup = self.nuclei[a].get_setup();
            let delta_pl = setup.get_delta_pl();

            if let Some(d_sp) = self.d_asp.get(&a) {
                for (q, d_p) in q_s.iter_mut().zip(d_sp.iter()) {
                    *q += 0.5 * setup.get_delta0();
                    *q += d_p.iter().zip(delta_pl.iter()).map(|(d, dl)| d * dl[0]).sum::<f64>();
                }
            }
        }
        comm.sum_slice(&mut q_s);
        let q_s = [SQRT_FOURPI * q_s[0], SQRT_FOURPI * q_s[1]];

        let nt_s = [
            self.gd.integrate(&self.nt_s[0], comm),
            self.gd.integrate(&self.nt_s[1], comm),
        ];

        let magmom: f64 = self.nuclei.iter().map(|n| n.get_magmom()).sum();
        let qtot = self.charge + q_s[0] + q_s[1];

        let mut x = 1.0;
        let mut y = 1.0;

        if nt_s[0].abs() < EPS9 {
            if nt_s[1].abs() > EPS9 {
                y = -qtot / nt_s[1];
            }
        } else if nt_s[1].abs() < EPS9 {
            x = -qtot / nt_s[0];
        } else {
            let a = [[nt_s[0], nt_s[1]], [nt_s[0], -nt_s[1]]];
            let b = [-qtot, -q_s[0] + q_s[1] + magmom];
            if let Some([xs, ys]) = utility::solve_2x2(a, b) {
                x = xs;
                y = ys;
            }
        }

        info!(x, y, "scaling spin densities");

        if self.charge.abs() < EPS9 {
            let plausible = |v: f64| v > MOMENT_SCALE_MIN && v < MOMENT_SCALE_MAX;
            if !plausible(x) || !plausible(y) {
                if self.strict_moment_check {
                    return Err(DensityError::DegenerateMoment { x, y });
                }
                warn!(x, y, "implausible spin scaling factors");
            }
        }

        self.nt_s[0].scale(x);
        self.nt_s[1].scale(y);

        Ok(())
    }
}
