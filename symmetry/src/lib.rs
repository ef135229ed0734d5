//! Point-group operations of an orthorhombic cell that map the grid onto
//! itself: axis permutations combined with mirrors.

use gpgrid::Array3;
use griddesc::GridDescriptor;
use tracing::debug;

const PERMUTATIONS: [[usize; 3]; 6] = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

/// `x'_i = sign_i * x_perm[i]` in fractional coordinates (modulo one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymOp {
    perm: [usize; 3],
    sign: [i32; 3],
}

impl SymOp {
    pub fn new(perm: [usize; 3], sign: [i32; 3]) -> SymOp {
        SymOp { perm, sign }
    }

    pub fn identity() -> SymOp {
        SymOp {
            perm: [0, 1, 2],
            sign: [1, 1, 1],
        }
    }

    pub fn inverse(&self) -> SymOp {
        let mut perm = [0; 3];
        let mut sign = [1; 3];
        for i in 0..3 {
            perm[self.perm[i]] = i;
            sign[self.perm[i]] = self.sign[i];
        }
        SymOp { perm, sign }
    }

    pub fn apply_vector(&self, v: [f64; 3]) -> [f64; 3] {
        let mut w = [0.0; 3];
        for i in 0..3 {
            w[i] = self.sign[i] as f64 * v[self.perm[i]];
        }
        w
    }

    pub fn apply_fractional(&self, x: [f64; 3]) -> [f64; 3] {
        let mut y = self.apply_vector(x);
        for v in y.iter_mut() {
            *v = v.rem_euclid(1.0);
        }
        y
    }

    pub fn apply_grid(&self, g: [usize; 3], n_c: [usize; 3]) -> [usize; 3] {
        let mut h = [0; 3];
        for i in 0..3 {
            let src = g[self.perm[i]] as i64;
            h[i] = (self.sign[i] as i64 * src).rem_euclid(n_c[i] as i64) as usize;
        }
        h
    }

    fn is_compatible(&self, gd: &GridDescriptor) -> bool {
        let n_c = gd.get_n_c();
        let cell = gd.get_cell();
        let pbc = gd.get_pbc();

        (0..3).all(|i| {
            let j = self.perm[i];
            n_c[i] == n_c[j] && (cell[i] - cell[j]).abs() < 1e-10 * cell[i] && pbc[i] == pbc[j]
        })
    }
}

fn fractional_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let mut d2 = 0.0;
    for i in 0..3 {
        let mut d = a[i] - b[i];
        d -= d.round();
        d2 += d * d;
    }
    d2.sqrt()
}

// Unit vectors at which the l-block rotation matrices are sampled.
const SAMPLE_DIRECTIONS: [[f64; 3]; 5] = [
    [0.3, 0.5, 0.8],
    [-0.6, 0.2, 0.7],
    [0.1, -0.9, 0.4],
    [0.8, 0.3, -0.5],
    [-0.2, -0.4, -0.9],
];

fn sample_harmonics(l: usize, op: Option<&SymOp>) -> Vec<Vec<f64>> {
    let nm = 2 * l + 1;
    let lm0 = l * l;

    (0..nm)
        .map(|m| {
            SAMPLE_DIRECTIONS[..nm]
                .iter()
                .map(|x| {
                    let x = match op {
                        Some(op) => op.apply_vector(*x),
                        None => *x,
                    };
                    special::real_spherical_harmonics(lm0 + m, x)
                })
                .collect()
        })
        .collect()
}

/// Matrix `M` with `Y_m(S^-1 x) = sum_k M_km Y_k(x)` for the real harmonics
/// of angular momentum `l`; coefficients of a rotated function are `M c`.
pub fn rotation_matrix(op: &SymOp, l: usize) -> Vec<Vec<f64>> {
    let y = sample_harmonics(l, None);
    let ys = sample_harmonics(l, Some(&op.inverse()));

    let y_inv = match utility::invert_matrix(&y) {
        Some(m) => m,
        None => unreachable!("sample directions are not generic for l = {}", l),
    };

    utility::transpose(&utility::matmul(&ys, &y_inv))
}

#[derive(Debug, Clone)]
pub struct Symmetry {
    ops: Vec<SymOp>,
    // ops[s] moves atom a onto atom atom_maps[s][a]
    atom_maps: Vec<Vec<usize>>,
    // rotation_lmm[s][l]
    rotation_lmm: Vec<Vec<Vec<Vec<f64>>>>,
}

impl Symmetry {
    /// Only the identity.
    pub fn none(natoms: usize) -> Symmetry {
        Symmetry::from_ops(vec![SymOp::identity()], vec![(0..natoms).collect()])
    }

    /// All operations compatible with the grid that map every atom onto an
    /// atom with the same `id` (species and magnetic state).
    pub fn new(gd: &GridDescriptor, spos_ac: &[[f64; 3]], ids: &[usize], tolerance: f64) -> Symmetry {
        assert_eq!(spos_ac.len(), ids.len());

        let mut ops = Vec::new();
        let mut atom_maps = Vec::new();

        for perm in PERMUTATIONS.iter() {
            for bits in 0..8 {
                let sign = [
                    if bits & 1 == 0 { 1 } else { -1 },
                    if bits & 2 == 0 { 1 } else { -1 },
                    if bits & 4 == 0 { 1 } else { -1 },
                ];
                let op = SymOp::new(*perm, sign);

                if !op.is_compatible(gd) {
                    continue;
                }

                let mut map = Vec::with_capacity(spos_ac.len());
                for (a, spos) in spos_ac.iter().enumerate() {
                    let moved = op.apply_fractional(*spos);
                    let target = spos_ac
                        .iter()
                        .enumerate()
                        .position(|(b, s)| ids[b] == ids[a] && fractional_distance(*s, moved) < tolerance);
                    match target {
                        Some(b) => map.push(b),
                        None => break,
                    }
                }

                if map.len() == spos_ac.len() {
                    ops.push(op);
                    atom_maps.push(map);
                }
            }
        }

        debug!(nops = ops.len(), "point-group operations");

        Symmetry::from_ops(ops, atom_maps)
    }

    fn from_ops(ops: Vec<SymOp>, atom_maps: Vec<Vec<usize>>) -> Symmetry {
        let rotation_lmm = ops
            .iter()
            .map(|op| (0..=2).map(|l| rotation_matrix(op, l)).collect())
            .collect();

        Symmetry {
            ops,
            atom_maps,
            rotation_lmm,
        }
    }

    pub fn get_nops(&self) -> usize {
        self.ops.len()
    }

    pub fn get_ops(&self) -> &[SymOp] {
        &self.ops
    }

    pub fn get_atom_map(&self, isym: usize) -> &[usize] {
        &self.atom_maps[isym]
    }

    /// Average of `a` over the group.
    pub fn symmetrize(&self, a: &mut Array3<f64>, gd: &GridDescriptor) {
        if self.ops.len() == 1 {
            return;
        }

        gd.check_shape(a);

        let n_c = gd.get_n_c();
        let beg = gd.get_beg();
        let shape = gd.get_shape();

        let src = a.clone();
        let w = 1.0 / self.ops.len() as f64;

        for k in 0..shape[2] {
            for j in 0..shape[1] {
                for i in 0..shape[0] {
                    let g = [i + beg[0], j + beg[1], k + beg[2]];
                    let mut s = 0.0;
                    for op in self.ops.iter() {
                        let h = op.apply_grid(g, n_c);
                        s += src[[h[0] - beg[0], h[1] - beg[1], h[2] - beg[2]]];
                    }
                    a[[i, j, k]] = s * w;
                }
            }
        }
    }

    /// Block-diagonal rotation of the projector space of one atom; `l_j`
    /// lists the angular momentum of each radial projector.
    fn rotation_ii(&self, isym: usize, l_j: &[usize]) -> Vec<Vec<f64>> {
        let ni: usize = l_j.iter().map(|l| 2 * l + 1).sum();
        let mut r = vec![vec![0.0; ni]; ni];

        let mut i0 = 0;
        for &l in l_j.iter() {
            let r_mm = &self.rotation_lmm[isym][l];
            for m1 in 0..2 * l + 1 {
                for m2 in 0..2 * l + 1 {
                    r[i0 + m1][i0 + m2] = r_mm[m1][m2];
                }
            }
            i0 += 2 * l + 1;
        }

        r
    }

    /// Symmetrized packed density matrices of all atoms for one spin.
    pub fn symmetrize_atomic(&self, d_ap: &[Vec<f64>], l_aj: &[Vec<usize>]) -> Vec<Vec<f64>> {
        assert_eq!(d_ap.len(), l_aj.len());

        if self.ops.len() == 1 {
            return d_ap.to_vec();
        }

        let ni_a: Vec<usize> = l_aj
            .iter()
            .map(|l_j| l_j.iter().map(|l| 2 * l + 1).sum())
            .collect();

        let mut acc_aii: Vec<Vec<Vec<f64>>> = ni_a.iter().map(|&ni| vec![vec![0.0; ni]; ni]).collect();

        for isym in 0..self.ops.len() {
            for (b, d_p) in d_ap.iter().enumerate() {
                let a = self.atom_maps[isym][b];

                let r_ii = self.rotation_ii(isym, &l_aj[b]);
                let d_ii = utility::unpack2(d_p, ni_a[b]);

                let rd = utility::matmul(&r_ii, &d_ii);
                let rdr = utility::matmul(&rd, &utility::transpose(&r_ii));

                for i1 in 0..ni_a[a] {
                    for i2 in 0..ni_a[a] {
                        acc_aii[a][i1][i2] += rdr[i1][i2];
                    }
                }
            }
        }

        let w = 1.0 / self.ops.len() as f64;

        acc_aii
            .iter()
            .map(|d_ii| {
                let scaled: Vec<Vec<f64>> = d_ii.iter().map(|row| row.iter().map(|x| x * w).collect()).collect();
                utility::pack(&scaled)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn cubic_grid(pbc: bool) -> GridDescriptor {
        GridDescriptor::new([8, 8, 8], [4.0; 3], [pbc; 3]).unwrap()
    }

    #[test]
    fn test_full_cubic_group() {
        let gd = cubic_grid(true);
        let sym = Symmetry::new(&gd, &[[0.0, 0.0, 0.0]], &[0], 1e-8);
        assert_eq!(sym.get_nops(), 48);

        let gd = GridDescriptor::new([8, 8, 12], [4.0, 4.0, 6.0], [true; 3]).unwrap();
        let sym = Symmetry::new(&gd, &[[0.0, 0.0, 0.0]], &[0], 1e-8);
        assert_eq!(sym.get_nops(), 16);
    }

    #[test]
    fn test_atom_map() {
        let gd = cubic_grid(true);
        // two atoms related by x -> -x
        let spos = [[0.25, 0.0, 0.0], [0.75, 0.0, 0.0]];
        let sym = Symmetry::new(&gd, &spos, &[1, 1], 1e-8);
        assert_eq!(sym.get_nops(), 48);

        let mirror = sym
            .get_ops()
            .iter()
            .position(|op| *op == SymOp::new([0, 1, 2], [-1, 1, 1]))
            .unwrap();
        assert_eq!(sym.get_atom_map(mirror), &[1, 0]);

        // different species break the mirror
        let sym = Symmetry::new(&gd, &spos, &[1, 2], 1e-8);
        assert!(sym.get_ops().iter().all(|op| op.sign[0] == 1));
    }

    #[test]
    fn test_inverse() {
        let op = SymOp::new([1, 2, 0], [-1, 1, -1]);
        let inv = op.inverse();
        let v = [0.1, 0.2, 0.3];
        let w = inv.apply_vector(op.apply_vector(v));
        for i in 0..3 {
            assert_relative_eq!(w[i], v[i]);
        }
    }

    #[test]
    fn test_symmetrize_grid() {
        for pbc in [true, false].iter() {
            let gd = cubic_grid(*pbc);
            let sym = Symmetry::new(&gd, &[[0.5, 0.5, 0.5]], &[0], 1e-8);
            assert_eq!(sym.get_nops(), 48);

            let mut rng = StdRng::seed_from_u64(11);
            let mut a = gd.zeros();
            for v in a.as_mut_slice().iter_mut() {
                *v = rng.gen_range(0.0..1.0);
            }
            let total = a.sum();

            sym.symmetrize(&mut a, &gd);
            assert_relative_eq!(a.sum(), total, epsilon = 1e-10);

            let once = a.clone();
            sym.symmetrize(&mut a, &gd);
            for (x, y) in a.as_slice().iter().zip(once.as_slice().iter()) {
                assert_relative_eq!(x, y, epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn test_rotation_matrices_are_orthogonal() {
        let op = SymOp::new([2, 0, 1], [1, -1, 1]);
        for l in 0..=2 {
            let r = rotation_matrix(&op, l);
            let rrt = utility::matmul(&r, &utility::transpose(&r));
            for i in 0..2 * l + 1 {
                for j in 0..2 * l + 1 {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert_relative_eq!(rrt[i][j], expected, epsilon = 1e-10);
                }
            }
        }

        // p_x rotated by x -> y becomes p_y: ordering is (y, z, x)
        let op = SymOp::new([1, 0, 2], [1, 1, 1]);
        let r = rotation_matrix(&op, 1);
        let c = [0.0, 0.0, 1.0];
        let rotated: Vec<f64> = (0..3).map(|k| (0..3).map(|m| r[k][m] * c[m]).sum()).collect();
        assert_relative_eq!(rotated[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(rotated[2], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_symmetrize_atomic_isotropic() {
        let gd = cubic_grid(true);
        let sym = Symmetry::new(&gd, &[[0.0, 0.0, 0.0]], &[0], 1e-8);

        // one s and one p projector, p_x fully occupied
        let l_j = vec![0, 1];
        let mut d_ii = vec![vec![0.0; 4]; 4];
        d_ii[0][0] = 2.0;
        d_ii[3][3] = 0.9;
        d_ii[0][3] = 0.3;
        d_ii[3][0] = 0.3;

        let d_p = utility::pack(&d_ii);
        let out = sym.symmetrize_atomic(&[d_p], &[l_j]);
        let d = utility::unpack2(&out[0], 4);

        assert_relative_eq!(d[0][0], 2.0, epsilon = 1e-10);
        for i in 1..4 {
            assert_relative_eq!(d[i][i], 0.3, epsilon = 1e-10);
            // s-p coupling is odd under inversion
            assert_relative_eq!(d[0][i], 0.0, epsilon = 1e-10);
        }
    }
}
