// packed storage of symmetric ni x ni matrices: p runs over (i1 <= i2)

pub fn packed_size(ni: usize) -> usize {
    ni * (ni + 1) / 2
}

/// Pack a symmetric matrix, doubling the off-diagonal elements so that
/// sum_p D_p A_p == sum_ij D_ij A_ij for a plainly packed A.
pub fn pack(m: &[Vec<f64>]) -> Vec<f64> {
    let ni = m.len();

    let mut p = Vec::with_capacity(packed_size(ni));

    for i1 in 0..ni {
        for i2 in i1..ni {
            if i1 == i2 {
                p.push(m[i1][i1]);
            } else {
                p.push(m[i1][i2] + m[i2][i1]);
            }
        }
    }

    p
}

/// Inverse of `pack`: off-diagonal packed elements are halved.
pub fn unpack2(p: &[f64], ni: usize) -> Vec<Vec<f64>> {
    assert_eq!(p.len(), packed_size(ni));

    let mut m = vec![vec![0.0; ni]; ni];

    let mut ip = 0;

    for i1 in 0..ni {
        for i2 in i1..ni {
            if i1 == i2 {
                m[i1][i1] = p[ip];
            } else {
                m[i1][i2] = 0.5 * p[ip];
                m[i2][i1] = 0.5 * p[ip];
            }
            ip += 1;
        }
    }

    m
}

/// Gauss-Jordan inversion with partial pivoting. `None` if the matrix is
/// numerically singular.
pub fn invert_matrix(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();

    let mut m: Vec<Vec<f64>> = a.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |s, x| s.max(x.abs()));

    if scale == 0.0 {
        return None;
    }

    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if m[row][col].abs() > m[pivot][col].abs() {
                pivot = row;
            }
        }

        if m[pivot][col].abs() <= f64::EPSILON * scale * n as f64 {
            return None;
        }

        m.swap(col, pivot);
        inv.swap(col, pivot);

        let d = m[col][col];
        for j in 0..n {
            m[col][j] /= d;
            inv[col][j] /= d;
        }

        for row in 0..n {
            if row != col {
                let f = m[row][col];
                if f != 0.0 {
                    for j in 0..n {
                        m[row][j] -= f * m[col][j];
                        inv[row][j] -= f * inv[col][j];
                    }
                }
            }
        }
    }

    Some(inv)
}

/// Solve the 2x2 system a x = b by Cramer's rule.
pub fn solve_2x2(a: [[f64; 2]; 2], b: [f64; 2]) -> Option<[f64; 2]> {
    let det = a[0][0] * a[1][1] - a[0][1] * a[1][0];

    if det == 0.0 || !det.is_finite() {
        return None;
    }

    Some([
        (b[0] * a[1][1] - a[0][1] * b[1]) / det,
        (a[0][0] * b[1] - b[0] * a[1][0]) / det,
    ])
}

pub fn matmul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = a.len();
    let k = b.len();
    let m = if k > 0 { b[0].len() } else { 0 };

    let mut c = vec![vec![0.0; m]; n];

    for i in 0..n {
        assert_eq!(a[i].len(), k);
        for l in 0..k {
            let ail = a[i][l];
            for j in 0..m {
                c[i][j] += ail * b[l][j];
            }
        }
    }

    c
}

pub fn transpose(a: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = a.len();
    let m = if n > 0 { a[0].len() } else { 0 };

    (0..m).map(|j| (0..n).map(|i| a[i][j]).collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pack_unpack2_roundtrip_and_trace() {
        let m = vec![
            vec![1.0, 0.2, -0.3],
            vec![0.2, 2.0, 0.5],
            vec![-0.3, 0.5, 3.0],
        ];

        let p = pack(&m);
        assert_eq!(p.len(), 6);
        assert_relative_eq!(p[1], 0.4);

        let back = unpack2(&p, 3);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(back[i][j], m[i][j]);
            }
        }

        // sum_p D_p A_p == sum_ij D_ij A_ij
        let a = vec![
            vec![0.5, 1.0, 2.0],
            vec![1.0, -1.0, 0.25],
            vec![2.0, 0.25, 4.0],
        ];
        let ap: Vec<f64> = {
            let mut v = vec![];
            for i in 0..3 {
                for j in i..3 {
                    v.push(a[i][j]);
                }
            }
            v
        };
        let full: f64 = (0..3)
            .flat_map(|i| (0..3).map(move |j| (i, j)))
            .map(|(i, j)| m[i][j] * a[i][j])
            .sum();
        let packed: f64 = p.iter().zip(ap.iter()).map(|(x, y)| x * y).sum();
        assert_relative_eq!(packed, full, epsilon = 1e-14);
    }

    #[test]
    fn test_invert_matrix() {
        let a = vec![vec![4.0, 1.0], vec![2.0, 3.0]];
        let inv = invert_matrix(&a).unwrap();
        let id = matmul(&a, &inv);

        assert_relative_eq!(id[0][0], 1.0, epsilon = 1e-14);
        assert_relative_eq!(id[0][1], 0.0, epsilon = 1e-14);
        assert_relative_eq!(id[1][0], 0.0, epsilon = 1e-14);
        assert_relative_eq!(id[1][1], 1.0, epsilon = 1e-14);

        let singular = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(invert_matrix(&singular).is_none());
        assert!(invert_matrix(&[vec![0.0]]).is_none());
    }

    #[test]
    fn test_solve_2x2() {
        let x = solve_2x2([[2.0, 1.0], [1.0, -1.0]], [3.0, 0.0]).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-14);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-14);

        assert!(solve_2x2([[1.0, 1.0], [1.0, 1.0]], [1.0, 2.0]).is_none());
    }

    #[test]
    fn test_transpose() {
        let a = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let t = transpose(&a);
        assert_eq!(t, vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]);
    }
}
