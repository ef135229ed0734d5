//! Finite-difference operators on a `GridDescriptor`.
//!
//! A stencil is a list of (offset, coefficient) pairs. Ghost values are
//! written into a padded buffer owned by the stencil, so `apply` and `relax`
//! never allocate.

use control::RelaxMethod;
use gpgrid::Array3;
use griddesc::GridDescriptor;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StencilError {
    #[error("unsupported finite-difference order nn = {0}")]
    UnsupportedOrder(usize),
}

pub type StencilResult<T> = Result<T, StencilError>;

// second-derivative weights for offsets 0, 1, .., nn
const LAPLACE_NN1: [f64; 2] = [-2.0, 1.0];
const LAPLACE_NN2: [f64; 3] = [-5.0 / 2.0, 4.0 / 3.0, -1.0 / 12.0];
const LAPLACE_NN3: [f64; 4] = [-49.0 / 18.0, 3.0 / 2.0, -3.0 / 20.0, 1.0 / 90.0];

#[derive(Debug, Clone)]
pub struct Stencil {
    gd: GridDescriptor,
    offsets: Vec<[isize; 3]>,
    coefs: Vec<f64>,
    diagonal: f64,
    width: [usize; 3],
    padded_shape: [usize; 3],
    padded_offsets: Vec<isize>,
    buf: Vec<f64>,
}

impl Stencil {
    /// Collects duplicate offsets; zero coefficients are dropped except the
    /// center.
    pub fn new(gd: &GridDescriptor, terms: &[([isize; 3], f64)]) -> Stencil {
        let mut offsets: Vec<[isize; 3]> = Vec::new();
        let mut coefs: Vec<f64> = Vec::new();

        for (off, c) in terms.iter() {
            match offsets.iter().position(|o| o == off) {
                Some(i) => coefs[i] += c,
                None => {
                    offsets.push(*off);
                    coefs.push(*c);
                }
            }
        }

        let mut kept_offsets = Vec::new();
        let mut kept_coefs = Vec::new();
        let mut diagonal = 0.0;

        for (off, c) in offsets.into_iter().zip(coefs.into_iter()) {
            if off == [0, 0, 0] {
                diagonal = c;
            }
            if c != 0.0 || off == [0, 0, 0] {
                kept_offsets.push(off);
                kept_coefs.push(c);
            }
        }

        let shape = gd.get_shape();

        let mut width = [0; 3];
        for off in kept_offsets.iter() {
            for i in 0..3 {
                width[i] = width[i].max(off[i].unsigned_abs());
            }
        }

        let padded_shape = [
            shape[0] + 2 * width[0],
            shape[1] + 2 * width[1],
            shape[2] + 2 * width[2],
        ];

        let p0 = padded_shape[0] as isize;
        let p1 = padded_shape[1] as isize;

        let padded_offsets = kept_offsets
            .iter()
            .map(|o| o[0] + p0 * (o[1] + p1 * o[2]))
            .collect();

        Stencil {
            gd: gd.clone(),
            offsets: kept_offsets,
            coefs: kept_coefs,
            diagonal,
            width,
            padded_shape,
            padded_offsets,
            buf: vec![0.0; padded_shape[0] * padded_shape[1] * padded_shape[2]],
        }
    }

    /// `scale` times the central-difference Laplacian using `nn` neighbors
    /// in each direction.
    pub fn laplace(gd: &GridDescriptor, scale: f64, nn: usize) -> StencilResult<Stencil> {
        let w: &[f64] = match nn {
            1 => &LAPLACE_NN1,
            2 => &LAPLACE_NN2,
            3 => &LAPLACE_NN3,
            _ => return Err(StencilError::UnsupportedOrder(nn)),
        };

        let h = gd.get_h();

        let mut terms = Vec::with_capacity(6 * nn + 1);

        let center: f64 = (0..3).map(|i| w[0] * scale / (h[i] * h[i])).sum();
        terms.push(([0, 0, 0], center));

        for i in 0..3 {
            let c = scale / (h[i] * h[i]);
            for (d, wd) in w.iter().enumerate().skip(1) {
                let mut off = [0; 3];
                off[i] = d as isize;
                terms.push((off, c * wd));
                off[i] = -(d as isize);
                terms.push((off, c * wd));
            }
        }

        Ok(Stencil::new(gd, &terms))
    }

    /// Left-hand side of the Mehrstellen discretization: `-scale` times a
    /// fourth-order 19-point Laplacian.
    pub fn mehrstellen_a(gd: &GridDescriptor, scale: f64) -> Stencil {
        let h = gd.get_h();
        let c: Vec<f64> = (0..3).map(|i| scale / (12.0 * h[i] * h[i])).collect();
        let csum: f64 = c.iter().sum();

        let mut terms = vec![([0, 0, 0], 16.0 * csum)];

        for i in 0..3 {
            let face = -10.0 * c[i] + 2.0 * csum;
            let mut off = [0; 3];
            off[i] = 1;
            terms.push((off, face));
            off[i] = -1;
            terms.push((off, face));
        }

        for (j, k) in [(0, 1), (0, 2), (1, 2)].iter() {
            let edge = -(c[*j] + c[*k]);
            for sj in [-1, 1].iter() {
                for sk in [-1, 1].iter() {
                    let mut off = [0; 3];
                    off[*j] = *sj;
                    off[*k] = *sk;
                    terms.push((off, edge));
                }
            }
        }

        Stencil::new(gd, &terms)
    }

    /// Right-hand-side smoother of the Mehrstellen discretization.
    pub fn mehrstellen_b(gd: &GridDescriptor) -> Stencil {
        let mut terms = vec![([0, 0, 0], 0.5)];

        for i in 0..3 {
            let mut off = [0; 3];
            off[i] = 1;
            terms.push((off, 1.0 / 12.0));
            off[i] = -1;
            terms.push((off, 1.0 / 12.0));
        }

        Stencil::new(gd, &terms)
    }

    /// 27-point smoothing metric for density mixing. Coefficients sum to one;
    /// `weight = 1` is the identity.
    pub fn metric(gd: &GridDescriptor, weight: f64) -> Stencil {
        let a = 0.125 * (weight + 7.0) / weight;
        let b = 0.0625 * (weight - 1.0) / weight;
        let c = 0.03125 * (weight - 1.0) / weight;
        let d = 0.015625 * (weight - 1.0) / weight;

        let mut terms = Vec::with_capacity(27);

        for i in -1..=1_isize {
            for j in -1..=1_isize {
                for k in -1..=1_isize {
                    let coef = match i.abs() + j.abs() + k.abs() {
                        0 => a,
                        1 => b,
                        2 => c,
                        _ => d,
                    };
                    terms.push(([i, j, k], coef));
                }
            }
        }

        Stencil::new(gd, &terms)
    }

    pub fn get_diagonal_element(&self) -> f64 {
        self.diagonal
    }

    pub fn get_gd(&self) -> &GridDescriptor {
        &self.gd
    }

    fn padded_index(&self, idx: [usize; 3]) -> usize {
        (idx[0] + self.width[0])
            + self.padded_shape[0]
                * ((idx[1] + self.width[1]) + self.padded_shape[1] * (idx[2] + self.width[2]))
    }

    // Copy `a` into the padded buffer and fill the ghost layers: periodic
    // images along periodic axes, zeros along the others.
    fn fill_halo(&mut self, a: &Array3<f64>) {
        self.gd.check_shape(a);

        let shape = self.gd.get_shape();
        let pbc = self.gd.get_pbc();
        let width = self.width;
        let [p0, p1, p2] = self.padded_shape;

        let src = a.as_slice();

        let source_index = |p: usize, axis: usize| -> Option<usize> {
            let n = shape[axis] as isize;
            let l = p as isize - width[axis] as isize;
            if l >= 0 && l < n {
                Some(l as usize)
            } else if pbc[axis] {
                Some(l.rem_euclid(n) as usize)
            } else {
                None
            }
        };

        let mut ip = 0;
        for k in 0..p2 {
            let sk = source_index(k, 2);
            for j in 0..p1 {
                let sj = source_index(j, 1);
                for i in 0..p0 {
                    let si = source_index(i, 0);
                    self.buf[ip] = match (si, sj, sk) {
                        (Some(si), Some(sj), Some(sk)) => src[si + shape[0] * (sj + shape[1] * sk)],
                        _ => 0.0,
                    };
                    ip += 1;
                }
            }
        }
    }

    /// `output = L input`
    pub fn apply(&mut self, input: &Array3<f64>, output: &mut Array3<f64>) {
        self.gd.check_shape(output);
        self.fill_halo(input);

        let shape = self.gd.get_shape();

        let out = output.as_mut_slice();

        let mut io = 0;
        for k in 0..shape[2] {
            for j in 0..shape[1] {
                let row = self.padded_index([0, j, k]);
                for i in 0..shape[0] {
                    let p = (row + i) as isize;
                    let mut s = 0.0;
                    for (off, c) in self.padded_offsets.iter().zip(self.coefs.iter()) {
                        s += c * self.buf[(p + off) as usize];
                    }
                    out[io] = s;
                    io += 1;
                }
            }
        }
    }

    /// `sweeps` smoothing passes on `L phi = rhs`, updating `phi` in place.
    /// `weight` is only used by weighted Jacobi.
    pub fn relax(
        &mut self,
        method: RelaxMethod,
        phi: &mut Array3<f64>,
        rhs: &Array3<f64>,
        sweeps: usize,
        weight: f64,
    ) {
        self.gd.check_shape(rhs);

        let shape = self.gd.get_shape();
        let c0 = self.diagonal;

        for _ in 0..sweeps {
            self.fill_halo(phi);

            let b = rhs.as_slice();

            match method {
                RelaxMethod::GaussSeidel => {
                    let mut io = 0;
                    for k in 0..shape[2] {
                        for j in 0..shape[1] {
                            let row = self.padded_index([0, j, k]);
                            for i in 0..shape[0] {
                                let p = row + i;
                                let mut s = 0.0;
                                for (off, c) in self.padded_offsets.iter().zip(self.coefs.iter()) {
                                    if *off != 0 {
                                        s += c * self.buf[(p as isize + off) as usize];
                                    }
                                }
                                self.buf[p] = (b[io] - s) / c0;
                                io += 1;
                            }
                        }
                    }

                    let a = phi.as_mut_slice();
                    let mut io = 0;
                    for k in 0..shape[2] {
                        for j in 0..shape[1] {
                            let row = self.padded_index([0, j, k]);
                            a[io..io + shape[0]].copy_from_slice(&self.buf[row..row + shape[0]]);
                            io += shape[0];
                        }
                    }
                }

                RelaxMethod::Jacobi => {
                    let a = phi.as_mut_slice();
                    let mut io = 0;
                    for k in 0..shape[2] {
                        for j in 0..shape[1] {
                            let row = self.padded_index([0, j, k]);
                            for i in 0..shape[0] {
                                let p = (row + i) as isize;
                                let mut s = 0.0;
                                for (off, c) in self.padded_offsets.iter().zip(self.coefs.iter()) {
                                    if *off != 0 {
                                        s += c * self.buf[(p + off) as usize];
                                    }
                                }
                                a[io] = weight * (b[io] - s) / c0 + (1.0 - weight) * a[io];
                                io += 1;
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gpconsts::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn cubic(n: usize, l: f64, pbc: [bool; 3]) -> GridDescriptor {
        GridDescriptor::new([n, n, n], [l, l, l], pbc).unwrap()
    }

    fn fill_cosine(gd: &GridDescriptor, a: &mut Array3<f64>, k: [f64; 3]) {
        let shape = gd.get_shape();
        for iz in 0..shape[2] {
            for iy in 0..shape[1] {
                for ix in 0..shape[0] {
                    let r = gd.get_position([ix, iy, iz]);
                    a[[ix, iy, iz]] = (k[0] * r[0] + k[1] * r[1] + k[2] * r[2]).cos();
                }
            }
        }
    }

    #[test]
    fn test_laplace_of_plane_wave() {
        let l = 8.0;
        let gd = cubic(32, l, [true; 3]);
        let k = [TWOPI / l, 0.0, 2.0 * TWOPI / l];
        let k2 = k[0] * k[0] + k[1] * k[1] + k[2] * k[2];

        let mut f = gd.zeros();
        fill_cosine(&gd, &mut f, k);

        for nn in 1..=3 {
            let mut op = Stencil::laplace(&gd, 1.0, nn).unwrap();
            let mut lf = gd.zeros();
            op.apply(&f, &mut lf);

            let tol = [5e-2, 1e-3, 5e-5][nn - 1];
            for (x, y) in lf.as_slice().iter().zip(f.as_slice().iter()) {
                assert!((x + k2 * y).abs() < tol * k2, "nn = {}", nn);
            }
        }
    }

    #[test]
    fn test_unsupported_order() {
        let gd = cubic(8, 4.0, [true; 3]);
        assert_eq!(
            Stencil::laplace(&gd, 1.0, 4).err(),
            Some(StencilError::UnsupportedOrder(4))
        );
    }

    #[test]
    fn test_diagonal_element() {
        let gd = GridDescriptor::new([8, 8, 16], [4.0, 4.0, 4.0], [true; 3]).unwrap();
        let op = Stencil::laplace(&gd, -1.0, 1).unwrap();
        // h = 0.5, 0.5, 0.25
        assert_relative_eq!(op.get_diagonal_element(), 2.0 * (4.0 + 4.0 + 16.0));
    }

    #[test]
    fn test_mehrstellen_pair() {
        let l = 8.0;
        let gd = cubic(32, l, [true; 3]);
        let k = [TWOPI / l, TWOPI / l, 0.0];
        let k2 = k[0] * k[0] + k[1] * k[1];

        let mut f = gd.zeros();
        fill_cosine(&gd, &mut f, k);

        // A f = B (k^2 f)
        let mut a_op = Stencil::mehrstellen_a(&gd, 1.0);
        let mut b_op = Stencil::mehrstellen_b(&gd);

        let mut af = gd.zeros();
        a_op.apply(&f, &mut af);

        let mut rhs = f.clone();
        rhs.scale(k2);
        let mut bf = gd.zeros();
        b_op.apply(&rhs, &mut bf);

        for (x, y) in af.as_slice().iter().zip(bf.as_slice().iter()) {
            assert!((x - y).abs() < 1e-4 * k2);
        }

        // B preserves a constant
        let mut one = gd.zeros();
        one.set_value(1.0);
        b_op.apply(&one.clone(), &mut one);
        assert_relative_eq!(one[[3, 4, 5]], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_metric_preserves_constants() {
        let gd = cubic(8, 4.0, [true; 3]);
        let mut m = Stencil::metric(&gd, 50.0);

        let mut one = gd.zeros();
        one.set_value(3.0);
        let mut out = gd.zeros();
        m.apply(&one, &mut out);
        assert_relative_eq!(out.max_abs(), 3.0, epsilon = 1e-13);
    }

    #[test]
    fn test_zero_boundary_halo() {
        let gd = cubic(8, 4.0, [false; 3]);
        let mut op = Stencil::laplace(&gd, 1.0, 1).unwrap();
        let mut one = gd.zeros();
        one.set_value(1.0);
        let mut out = gd.zeros();
        op.apply(&one, &mut out);

        // interior points feel nothing, corner points feel three missing neighbors
        assert_relative_eq!(out[[3, 3, 3]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(out[[0, 0, 0]], -3.0 * 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_relax_reduces_residual() {
        let gd = cubic(16, 8.0, [false; 3]);
        let mut rng = StdRng::seed_from_u64(7);

        let mut rhs = gd.zeros();
        for v in rhs.as_mut_slice().iter_mut() {
            *v = rng.gen_range(-1.0..1.0);
        }

        for method in [RelaxMethod::GaussSeidel, RelaxMethod::Jacobi].iter() {
            let mut op = Stencil::laplace(&gd, -1.0, 1).unwrap();
            let mut phi = gd.zeros();
            let mut res = gd.zeros();

            let residual = |op: &mut Stencil, phi: &Array3<f64>, res: &mut Array3<f64>| {
                op.apply(phi, res);
                res.substract(&rhs);
                res.dot(res).sqrt()
            };

            let r0 = residual(&mut op, &phi, &mut res);
            op.relax(*method, &mut phi, &rhs, 10, 2.0 / 3.0);
            let r1 = residual(&mut op, &phi, &mut res);

            assert!(r1 < 0.5 * r0, "{:?}: {} -> {}", method, r0, r1);
        }
    }
}
