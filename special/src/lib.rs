use gpconsts::*;

pub fn erf(x: f64) -> f64 {
    libm::erf(x)
}

pub fn erfc(x: f64) -> f64 {
    libm::erfc(x)
}

/// Number of (l, m) pairs with l <= lmax.
pub fn n_lm(lmax: usize) -> usize {
    (lmax + 1) * (lmax + 1)
}

/// Angular momentum of the combined index L = l^2 + (m + l).
pub fn l_of(lm: usize) -> usize {
    let mut l = 0;
    while (l + 1) * (l + 1) <= lm {
        l += 1;
    }
    l
}

/// r^l Y_L(r) for the real spherical harmonics with l <= 2.
///
/// Ordering inside each l block: l=1: y, z, x; l=2: xy, yz, 3z^2-r^2, zx, x^2-y^2.
pub fn real_solid_harmonics(lm: usize, v: [f64; 3]) -> f64 {
    let [x, y, z] = v;

    let c1 = (3.0 / FOURPI).sqrt();
    let c2 = 0.5 * (15.0 / PI).sqrt();

    match lm {
        0 => 0.5 / PI.sqrt(),

        1 => c1 * y,
        2 => c1 * z,
        3 => c1 * x,

        4 => c2 * x * y,
        5 => c2 * y * z,
        6 => 0.25 * (5.0 / PI).sqrt() * (2.0 * z * z - x * x - y * y),
        7 => c2 * z * x,
        8 => 0.5 * c2 * (x * x - y * y),

        _ => panic!("real solid harmonics only implemented for l <= 2, got L = {}", lm),
    }
}

/// Y_L(r / |r|); the value at the origin is taken along +z.
pub fn real_spherical_harmonics(lm: usize, v: [f64; 3]) -> f64 {
    let r = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();

    if r < EPS12 {
        return real_spherical_harmonics(lm, [0.0, 0.0, 1.0]);
    }

    real_solid_harmonics(lm, [v[0] / r, v[1] / r, v[2] / r])
}

/// Double factorial (2n-1)!! with (-1)!! = 1.
pub fn double_factorial_odd(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * (2 * k - 1) as f64)
}

/// int_0^inf r^(2n) exp(-a r^2) dr
pub fn gaussian_radial_moment(n: usize, a: f64) -> f64 {
    double_factorial_odd(n) / (2.0_f64.powi(n as i32 + 1) * a.powi(n as i32)) * (PI / a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_erf_limits() {
        assert_relative_eq!(erf(0.0), 0.0);
        assert_relative_eq!(erf(6.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(erf(0.5) + erfc(0.5), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_l_of() {
        assert_eq!(l_of(0), 0);
        assert_eq!(l_of(1), 1);
        assert_eq!(l_of(3), 1);
        assert_eq!(l_of(4), 2);
        assert_eq!(l_of(8), 2);
        assert_eq!(n_lm(2), 9);
    }

    // midpoint rule in (cos theta, phi)
    #[test]
    fn test_spherical_harmonics_orthonormal() {
        let nt = 200;
        let np = 200;
        let nlm = n_lm(2);

        let mut overlap = vec![vec![0.0; nlm]; nlm];

        for it in 0..nt {
            let ct = -1.0 + (it as f64 + 0.5) * 2.0 / nt as f64;
            let st = (1.0 - ct * ct).sqrt();
            for ip in 0..np {
                let phi = (ip as f64 + 0.5) * TWOPI / np as f64;
                let v = [st * phi.cos(), st * phi.sin(), ct];
                let w = 2.0 / nt as f64 * TWOPI / np as f64;
                for l1 in 0..nlm {
                    for l2 in 0..nlm {
                        overlap[l1][l2] +=
                            w * real_spherical_harmonics(l1, v) * real_spherical_harmonics(l2, v);
                    }
                }
            }
        }

        for l1 in 0..nlm {
            for l2 in 0..nlm {
                let expected = if l1 == l2 { 1.0 } else { 0.0 };
                assert!(
                    (overlap[l1][l2] - expected).abs() < 1e-3,
                    "<{}|{}> = {}",
                    l1,
                    l2,
                    overlap[l1][l2]
                );
            }
        }
    }

    #[test]
    fn test_gaussian_radial_moment() {
        // int r^2 exp(-r^2) dr = sqrt(pi) / 4
        assert_relative_eq!(gaussian_radial_moment(1, 1.0), PI.sqrt() / 4.0, epsilon = 1e-14);
        // int exp(-a r^2) dr = sqrt(pi / a) / 2
        assert_relative_eq!(gaussian_radial_moment(0, 2.0), 0.5 * (PI / 2.0).sqrt());
    }
}
