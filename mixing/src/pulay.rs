use fifo::FIFO;
use gpcomm::Communicator;
use gpgrid::Array3;
use griddesc::GridDescriptor;
use stencil::Stencil;
use tracing::debug;

/// Pulay mixing of one density channel and the atomic density matrices
/// that go with it.
///
/// Entry `i` of the residual history belongs to entry `i` of the input
/// history; both are kept most-recent-last.
#[derive(Debug)]
pub struct PulayChannel {
    gd: GridDescriptor,
    beta: f64,
    metric: Option<Stencil>,
    mr: Array3<f64>,

    nt_i: FIFO<Array3<f64>>,
    r_i: FIFO<Array3<f64>>,
    d_i: FIFO<Vec<f64>>,
    dd_i: FIFO<Vec<f64>>,
    a_ii: Vec<Vec<f64>>,

    dnt: Option<f64>,
}

impl PulayChannel {
    pub fn new(gd: &GridDescriptor, beta: f64, nmaxold: usize, metric: Option<Stencil>) -> PulayChannel {
        PulayChannel {
            gd: gd.clone(),
            beta,
            metric,
            mr: gd.zeros(),
            nt_i: FIFO::new(nmaxold),
            r_i: FIFO::new(nmaxold),
            d_i: FIFO::new(nmaxold),
            dd_i: FIFO::new(nmaxold),
            a_ii: Vec::new(),
            dnt: None,
        }
    }

    pub fn reset(&mut self) {
        self.nt_i.clear();
        self.r_i.clear();
        self.d_i.clear();
        self.dd_i.clear();
        self.a_ii.clear();
        self.dnt = None;
    }

    /// `integral |n_out - n_in|` of the last call.
    pub fn get_charge_sloshing(&self) -> Option<f64> {
        self.dnt
    }

    pub fn get_history_len(&self) -> usize {
        self.nt_i.len()
    }

    /// Replace the output density `nt` (and matrices `d`) by the next input.
    /// The first call only records them.
    pub fn mix(&mut self, nt: &mut Array3<f64>, d: &mut Vec<f64>, comm: &dyn Communicator) {
        if let (Some(nt_last), Some(d_last)) = (self.nt_i.last(), self.d_i.last()) {
            assert_eq!(d.len(), d_last.len(), "atomic density matrices changed size");

            let mut r = nt.clone();
            r.substract(nt_last);

            let dd: Vec<f64> = d.iter().zip(d_last.iter()).map(|(x, y)| x - y).collect();

            let dnt = comm.sum_scalar(r.abs_sum()) * self.gd.get_dv();
            self.dnt = Some(dnt);
            debug!(dnt, "charge sloshing");

            let mr = match self.metric.as_mut() {
                Some(m) => {
                    m.apply(&r, &mut self.mr);
                    &self.mr
                }
                None => &r,
            };

            // overlaps of the new residual with the retained old ones
            let n_old_kept = if self.r_i.is_full() {
                self.r_i.len() - 1
            } else {
                self.r_i.len()
            };
            let skip = self.r_i.len() - n_old_kept;

            let mut row: Vec<f64> = self
                .r_i
                .iter()
                .skip(skip)
                .map(|r1| comm.sum_scalar(r1.dot(mr)))
                .collect();
            row.push(comm.sum_scalar(r.dot(mr)));

            let iold = row.len();
            let mut a_ii = vec![vec![0.0; iold]; iold];

            let nprev = self.a_ii.len();
            for i in 0..iold - 1 {
                for j in 0..iold - 1 {
                    a_ii[i][j] = self.a_ii[nprev - (iold - 1) + i][nprev - (iold - 1) + j];
                }
            }
            for i in 0..iold {
                a_ii[i][iold - 1] = row[i];
                a_ii[iold - 1][i] = row[i];
            }
            self.a_ii = a_ii;

            self.r_i.push(r);
            self.dd_i.push(dd);

            let alpha_i = pulay_coefficients(&self.a_ii);

            nt.set_value(0.0);
            for v in d.iter_mut() {
                *v = 0.0;
            }

            assert_eq!(self.nt_i.len(), self.r_i.len());

            for (i, alpha) in alpha_i.iter().enumerate() {
                nt.axpy(*alpha, &self.nt_i[i]);
                nt.axpy(alpha * self.beta, &self.r_i[i]);

                let d_in = &self.d_i[i];
                let dd = &self.dd_i[i];
                for (k, v) in d.iter_mut().enumerate() {
                    *v += alpha * (d_in[k] + self.beta * dd[k]);
                }
            }
        }

        self.nt_i.push(nt.clone());
        self.d_i.push(d.clone());
    }
}

/// `alpha = rowsum(A^-1) / sum(A^-1)`; the latest entry alone when `A` is
/// singular or the normalization vanishes.
pub fn pulay_coefficients(a_ii: &[Vec<f64>]) -> Vec<f64> {
    let n = a_ii.len();

    let mut fallback = vec![0.0; n];
    fallback[n - 1] = 1.0;

    let b_ii = match utility::invert_matrix(a_ii) {
        Some(b) => b,
        None => return fallback,
    };

    let alpha_i: Vec<f64> = b_ii.iter().map(|row| row.iter().sum()).collect();
    let s: f64 = alpha_i.iter().sum();

    if s == 0.0 || !s.is_finite() {
        return fallback;
    }

    alpha_i.iter().map(|a| a / s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpcomm::SerialComm;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_history_is_bounded() {
        let gd = GridDescriptor::new([4, 4, 4], [2.0; 3], [true; 3]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut channel = PulayChannel::new(&gd, 0.3, 3, None);

        for k in 0..6 {
            let mut nt = gd.zeros();
            for v in nt.as_mut_slice().iter_mut() {
                *v = rng.gen_range(0.0..1.0);
            }
            let mut d = vec![rng.gen_range(0.0..1.0)];

            channel.mix(&mut nt, &mut d, &SerialComm);
            assert_eq!(channel.get_history_len(), (k + 1).min(3));
        }
        assert!(channel.get_charge_sloshing().is_some());

        channel.reset();
        assert_eq!(channel.get_history_len(), 0);
        assert_eq!(channel.get_charge_sloshing(), None);
    }

    #[test]
    fn test_singular_overlap_falls_back_to_latest() {
        let a_ii = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        assert_eq!(pulay_coefficients(&a_ii), vec![0.0, 1.0]);

        let alpha_i = pulay_coefficients(&[vec![2.0, 0.0], vec![0.0, 2.0]]);
        assert_eq!(alpha_i, vec![0.5, 0.5]);
    }
}
