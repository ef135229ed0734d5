use gpgrid::Array3;
use std::collections::BTreeMap;
use types::c64;

/// Pseudo wavefunctions of one k-point on the coarse grid.
#[derive(Debug, Clone)]
pub enum Wavefunctions {
    /// Gamma-point (real) wavefunctions.
    Real(Vec<Array3<f64>>),
    Complex(Vec<Array3<c64>>),
}

impl Wavefunctions {
    pub fn get_nbands(&self) -> usize {
        match self {
            Wavefunctions::Real(psit_n) => psit_n.len(),
            Wavefunctions::Complex(psit_n) => psit_n.len(),
        }
    }
}

/// Occupied states of one (spin, k-point) pair with their projections
/// `P_ni = <p_i|psit_n>` on every atom.
///
/// The occupations `f_n` already include the k-point weight.
#[derive(Debug, Clone)]
pub struct KPoint {
    s: usize,
    f_n: Vec<f64>,
    psit_n: Wavefunctions,
    p_ani: BTreeMap<usize, Vec<Vec<c64>>>,
}

impl KPoint {
    pub fn new(
        s: usize,
        f_n: Vec<f64>,
        psit_n: Wavefunctions,
        p_ani: BTreeMap<usize, Vec<Vec<c64>>>,
    ) -> KPoint {
        assert_eq!(f_n.len(), psit_n.get_nbands());
        for p_ni in p_ani.values() {
            assert_eq!(p_ni.len(), f_n.len());
        }

        KPoint {
            s,
            f_n,
            psit_n,
            p_ani,
        }
    }

    pub fn get_spin(&self) -> usize {
        self.s
    }

    /// `nt += sum_n f_n |psit_n|^2`
    pub fn add_to_density(&self, nt: &mut Array3<f64>) {
        match &self.psit_n {
            Wavefunctions::Real(psit_n) => {
                for (psit, f) in psit_n.iter().zip(self.f_n.iter()) {
                    assert_eq!(psit.shape(), nt.shape());
                    for (n, p) in nt.as_mut_slice().iter_mut().zip(psit.as_slice().iter()) {
                        *n += f * p * p;
                    }
                }
            }

            Wavefunctions::Complex(psit_n) => {
                for (psit, f) in psit_n.iter().zip(self.f_n.iter()) {
                    assert_eq!(psit.shape(), nt.shape());
                    for (n, p) in nt.as_mut_slice().iter_mut().zip(psit.as_slice().iter()) {
                        *n += f * p.norm_sqr();
                    }
                }
            }
        }
    }

    /// `D_ij += sum_n f_n Re(P_ni^* P_nj)` for one atom.
    pub fn add_to_density_matrix(&self, atom: usize, d_ii: &mut [Vec<f64>]) {
        let p_ni = match self.p_ani.get(&atom) {
            Some(p) => p,
            None => return,
        };

        for (p_i, f) in p_ni.iter().zip(self.f_n.iter()) {
            for (i1, p1) in p_i.iter().enumerate() {
                for (i2, p2) in p_i.iter().enumerate() {
                    d_ii[i1][i2] += f * (p1.conj() * p2).re;
                }
            }
        }
    }
}
