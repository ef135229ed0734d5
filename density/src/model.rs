//! Occupied states for model systems built from the first partial wave
//! of every atom.

use crate::{KPoint, Nucleus, Wavefunctions};
use gpcomm::Communicator;
use gpconsts::*;
use griddesc::GridDescriptor;
use special::real_spherical_harmonics;
use std::collections::BTreeMap;
use types::c64;

/// One band per atom holding the atom's first (l = 0) pseudo partial wave.
///
/// Each band is scaled to `<psit|S|psit> = 1` with unit projection on its
/// own atom, where the augmentation adds `sqrt(4 pi) Delta_00,0` to the
/// grid norm. Overlap between different atoms is neglected.
pub fn atomic_orbital_kpoint(
    gd: &GridDescriptor,
    nuclei: &[Nucleus],
    s: usize,
    f_n: &[f64],
    comm: &dyn Communicator,
) -> KPoint {
    assert_eq!(f_n.len(), nuclei.len());

    let [n0, n1, n2] = gd.get_shape();

    let mut psit_n = Vec::with_capacity(nuclei.len());
    let mut p_ani = BTreeMap::new();

    for (a, nucleus) in nuclei.iter().enumerate() {
        let setup = nucleus.get_setup();
        assert_eq!(setup.get_l_j()[0], 0, "first partial wave must be an s wave");

        let center = nucleus.get_position(gd);

        let mut psit = gd.zeros();
        for k in 0..n2 {
            for j in 0..n1 {
                for i in 0..n0 {
                    let d = gd.get_displacement([i, j, k], center);
                    let r = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
                    psit[[i, j, k]] = setup.get_phit(0, r) * real_spherical_harmonics(0, d);
                }
            }
        }

        let target = 1.0 - SQRT_FOURPI * setup.get_delta_pl()[0][0];
        let norm = gd.integrate_product(&psit, &psit, comm);
        psit.scale((target / norm).sqrt());
        psit_n.push(psit);

        let ni = setup.get_ni();
        let mut p_ni = vec![vec![c64::new(0.0, 0.0); ni]; nuclei.len()];
        p_ni[a][0] = c64::new(1.0, 0.0);
        p_ani.insert(a, p_ni);
    }

    KPoint::new(s, f_n.to_vec(), Wavefunctions::Real(psit_n), p_ani)
}
