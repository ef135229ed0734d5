//! Restriction and interpolation between a grid and its factor-2 coarsening.
//!
//! Both directions are separable products of the same 1D kernel of order
//! `2 * nn`, so that `R = P^T / 8` in 3D and
//! `<R u, v> dv_coarse == <u, P v> dv_fine`.

use gpgrid::Array3;
use griddesc::GridDescriptor;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformerError {
    #[error("unsupported interpolation order nn = {0}")]
    UnsupportedOrder(usize),

    #[error("grids {fine:?} and {coarse:?} are not related by a factor of two")]
    NotNested { fine: [usize; 3], coarse: [usize; 3] },
}

pub type TransformerResult<T> = Result<T, TransformerError>;

// weights for the odd (midpoint) fine points
const INTERP_K2: [f64; 1] = [0.5];
const INTERP_K4: [f64; 2] = [0.5625, -0.0625];
const INTERP_K6: [f64; 3] = [0.5859375, -0.09765625, 0.01171875];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Restrict,
    Interpolate,
}

#[derive(Debug, Clone)]
pub struct Transformer {
    gdin: GridDescriptor,
    gdout: GridDescriptor,
    direction: Direction,
    weights: &'static [f64],
    shapes: [[usize; 3]; 4],
    tmp1: Vec<f64>,
    tmp2: Vec<f64>,
}

fn interpolation_weights(nn: usize) -> TransformerResult<&'static [f64]> {
    match nn {
        1 => Ok(&INTERP_K2),
        2 => Ok(&INTERP_K4),
        3 => Ok(&INTERP_K6),
        _ => Err(TransformerError::UnsupportedOrder(nn)),
    }
}

impl Transformer {
    /// Maps arrays on `gdin` to arrays on `gdout`. The direction follows from
    /// which of the two grids is the finer one.
    pub fn new(gdin: &GridDescriptor, gdout: &GridDescriptor, nn: usize) -> TransformerResult<Transformer> {
        let weights = interpolation_weights(nn)?;

        let nin = gdin.get_n_c();
        let nout = gdout.get_n_c();

        let direction = if (0..3).all(|i| nout[i] == 2 * nin[i]) {
            Direction::Interpolate
        } else if (0..3).all(|i| nin[i] == 2 * nout[i]) {
            Direction::Restrict
        } else {
            return Err(TransformerError::NotNested {
                fine: nin,
                coarse: nout,
            });
        };

        if gdin.get_pbc() != gdout.get_pbc() {
            return Err(TransformerError::NotNested {
                fine: nin,
                coarse: nout,
            });
        }

        let sin = gdin.get_shape();
        let sout = gdout.get_shape();

        // shapes after each 1D pass
        let shapes = [
            sin,
            [sout[0], sin[1], sin[2]],
            [sout[0], sout[1], sin[2]],
            sout,
        ];

        Ok(Transformer {
            gdin: gdin.clone(),
            gdout: gdout.clone(),
            direction,
            weights,
            shapes,
            tmp1: vec![0.0; shapes[1].iter().product()],
            tmp2: vec![0.0; shapes[2].iter().product()],
        })
    }

    pub fn get_direction(&self) -> Direction {
        self.direction
    }

    pub fn apply(&mut self, input: &Array3<f64>, output: &mut Array3<f64>) {
        self.gdin.check_shape(input);
        self.gdout.check_shape(output);

        let nin = self.gdin.get_n_c();
        let pbc = self.gdin.get_pbc();

        let shapes = self.shapes;
        let (direction, weights) = (self.direction, self.weights);

        transform_axis(
            input.as_slice(),
            shapes[0],
            &mut self.tmp1,
            shapes[1],
            0,
            nin[0],
            pbc[0],
            direction,
            weights,
        );
        transform_axis(
            &self.tmp1,
            shapes[1],
            &mut self.tmp2,
            shapes[2],
            1,
            nin[1],
            pbc[1],
            direction,
            weights,
        );
        transform_axis(
            &self.tmp2,
            shapes[2],
            output.as_mut_slice(),
            shapes[3],
            2,
            nin[2],
            pbc[2],
            direction,
            weights,
        );
    }
}

// One separable pass along `axis`. `n_in` is the number of intervals of the
// input grid along that axis.
#[allow(clippy::too_many_arguments)]
fn transform_axis(
    src: &[f64],
    src_shape: [usize; 3],
    dst: &mut [f64],
    dst_shape: [usize; 3],
    axis: usize,
    n_in: usize,
    periodic: bool,
    direction: Direction,
    weights: &[f64],
) {
    let stride = match axis {
        0 => 1,
        1 => src_shape[0],
        _ => src_shape[0] * src_shape[1],
    };

    let beg: isize = if periodic { 0 } else { 1 };
    let n = n_in as isize;

    let mut id = 0;
    for k in 0..dst_shape[2] {
        for j in 0..dst_shape[1] {
            for i in 0..dst_shape[0] {
                let mut idx = [i, j, k];
                let lo = idx[axis] as isize;
                idx[axis] = 0;
                let base = idx[0] + src_shape[0] * (idx[1] + src_shape[1] * idx[2]);

                let get = |g: isize| -> f64 {
                    if periodic {
                        src[base + stride * g.rem_euclid(n) as usize]
                    } else if g < 1 || g > n - 1 {
                        0.0
                    } else {
                        src[base + stride * (g - 1) as usize]
                    }
                };

                let g = lo + beg;

                dst[id] = match direction {
                    Direction::Interpolate => {
                        if g % 2 == 0 {
                            get(g / 2)
                        } else {
                            let c = (g - 1) / 2;
                            weights
                                .iter()
                                .enumerate()
                                .map(|(jw, w)| {
                                    let jw = jw as isize + 1;
                                    w * (get(c - jw + 1) + get(c + jw))
                                })
                                .sum::<f64>()
                        }
                    }

                    Direction::Restrict => {
                        let f = 2 * g;
                        0.5 * get(f)
                            + weights
                                .iter()
                                .enumerate()
                                .map(|(jw, w)| {
                                    let d = 2 * (jw as isize + 1) - 1;
                                    0.5 * w * (get(f - d) + get(f + d))
                                })
                                .sum::<f64>()
                    }
                };

                id += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gpcomm::SerialComm;
    use gpconsts::*;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_array(gd: &GridDescriptor, rng: &mut StdRng) -> Array3<f64> {
        let mut a = gd.zeros();
        for v in a.as_mut_slice().iter_mut() {
            *v = rng.gen_range(-1.0..1.0);
        }
        a
    }

    fn adjoint_mismatch(pbc: [bool; 3], nn: usize, seed: u64) -> f64 {
        let fine = GridDescriptor::new([8, 12, 8], [4.0, 6.0, 5.0], pbc).unwrap();
        let coarse = fine.coarsen().unwrap();

        let mut restrictor = Transformer::new(&fine, &coarse, nn).unwrap();
        let mut interpolator = Transformer::new(&coarse, &fine, nn).unwrap();

        let mut rng = StdRng::seed_from_u64(seed);
        let u = random_array(&fine, &mut rng);
        let v = random_array(&coarse, &mut rng);

        let mut ru = coarse.zeros();
        restrictor.apply(&u, &mut ru);
        let mut pv = fine.zeros();
        interpolator.apply(&v, &mut pv);

        let lhs = coarse.integrate_product(&ru, &v, &SerialComm);
        let rhs = fine.integrate_product(&u, &pv, &SerialComm);

        (lhs - rhs).abs() / rhs.abs().max(1.0)
    }

    #[test]
    fn test_directions() {
        let fine = GridDescriptor::new([8, 8, 8], [4.0; 3], [true; 3]).unwrap();
        let coarse = fine.coarsen().unwrap();

        assert_eq!(
            Transformer::new(&fine, &coarse, 1).unwrap().get_direction(),
            Direction::Restrict
        );
        assert_eq!(
            Transformer::new(&coarse, &fine, 3).unwrap().get_direction(),
            Direction::Interpolate
        );
        assert!(matches!(
            Transformer::new(&fine, &coarse, 4),
            Err(TransformerError::UnsupportedOrder(4))
        ));
        assert!(matches!(
            Transformer::new(&fine, &fine, 1),
            Err(TransformerError::NotNested { .. })
        ));
    }

    #[test]
    fn test_interpolation_reproduces_polynomials() {
        // order 2*nn interpolation is exact for polynomials below that order
        let coarse = GridDescriptor::new([8, 8, 8], [8.0; 3], [false; 3]).unwrap();
        let fine = coarse.refine();

        let mut t = Transformer::new(&coarse, &fine, 2).unwrap();

        // vanishes on the boundary planes
        let f = |r: [f64; 3]| r[0] * (8.0 - r[0]) * r[1] * (8.0 - r[1]) * r[2] * (8.0 - r[2]);

        let mut c = coarse.zeros();
        let s = coarse.get_shape();
        for k in 0..s[2] {
            for j in 0..s[1] {
                for i in 0..s[0] {
                    c[[i, j, k]] = f(coarse.get_position([i, j, k]));
                }
            }
        }

        let mut out = fine.zeros();
        t.apply(&c, &mut out);

        // the outermost fine points would need values beyond the boundary
        let s = fine.get_shape();
        for k in 1..s[2] - 1 {
            for j in 1..s[1] - 1 {
                for i in 1..s[0] - 1 {
                    let exact = f(fine.get_position([i, j, k]));
                    assert_relative_eq!(out[[i, j, k]], exact, epsilon = 1e-9, max_relative = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_restriction_of_constant() {
        let fine = GridDescriptor::new([16, 16, 16], [TWOPI; 3], [true; 3]).unwrap();
        let coarse = fine.coarsen().unwrap();

        for nn in 1..=3 {
            let mut t = Transformer::new(&fine, &coarse, nn).unwrap();
            let mut one = fine.zeros();
            one.set_value(1.0);
            let mut out = coarse.zeros();
            t.apply(&one, &mut out);
            assert_relative_eq!(out[[2, 5, 7]], 1.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_adjoint_fixed_cases() {
        for nn in 1..=3 {
            assert!(adjoint_mismatch([true; 3], nn, 1) < 1e-12);
            assert!(adjoint_mismatch([false; 3], nn, 2) < 1e-12);
            assert!(adjoint_mismatch([true, false, true], nn, 3) < 1e-12);
        }
    }

    proptest! {
        #[test]
        fn prop_restriction_is_adjoint_of_interpolation(
            seed in any::<u64>(),
            nn in 1usize..=3,
            px in any::<bool>(),
            py in any::<bool>(),
            pz in any::<bool>(),
        ) {
            prop_assert!(adjoint_mismatch([px, py, pz], nn, seed) < 1e-12);
        }
    }
}
