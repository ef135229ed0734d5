use crate::{scale_matrices, Density};
use gpcomm::Communicator;
use gpconsts::*;
use tracing::{info, warn};

impl Density {
    /// Scale the density matrices (or, without augmentation, the pseudo
    /// density) so that `Nt + Q` equals minus the net charge. An empty pseudo
    /// density is left as it is.
    pub(crate) fn normalize_nonspin(&mut self, comm: &dyn Communicator) {
        let mut q = 0.0;
        let mut q0 = 0.0;
        for &a in self.my_atoms.iter() {
            let nucleus = &self.nuclei[a];
            q += nucleus.get_q_l()[0];
            q0 += nucleus.get_setup().get_delta0();
        }
        let q = SQRT_FOURPI * comm.sum_scalar(q);
        let q0 = SQRT_FOURPI * comm.sum_scalar(q0);

        let nt = self.gd.integrate(&self.nt_s[0], comm);

        if (q0 - q).abs() > EPS9 {
            let x = (nt + q0 + self.charge) / (q0 - q);
            info!(x, "scaling atomic density matrices");

            for d_sp in self.d_asp.values_mut() {
                scale_matrices(d_sp, x);
            }
            self.update_multipole_moments(comm);
        } else if nt.abs() < EPS9 {
            warn!(nt, "no pseudo density to scale");
        } else {
            let x = -(self.charge + q) / nt;
            info!(x, "scaling pseudo density");

            self.nt_s[0].scale(x);
        }
    }
}
