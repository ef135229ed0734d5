use gpcomm::Communicator;
use gpconsts::*;
use gpgrid::Array3;
use griddesc::GridDescriptor;
use special::erf;

/// Unit gaussian charge and its potential, centered in the cell.
///
/// `rho(r) ~ exp(-a r^2)` is scaled so that its grid integral is exactly
/// one; the potential is the analytic `erf(sqrt(a) r) / r`.
#[derive(Debug, Clone)]
pub struct Gaussian {
    center: [f64; 3],
    rho: Array3<f64>,
    pot: Array3<f64>,
}

impl Gaussian {
    pub fn new(gd: &GridDescriptor, comm: &dyn Communicator) -> Gaussian {
        let cell = gd.get_cell();
        Gaussian::with_exponent(gd, GAUSS_EXPONENT, [0.5 * cell[0], 0.5 * cell[1], 0.5 * cell[2]], comm)
    }

    pub fn with_exponent(
        gd: &GridDescriptor,
        a: f64,
        center: [f64; 3],
        comm: &dyn Communicator,
    ) -> Gaussian {
        let mut rho = gd.zeros();
        let mut pot = gd.zeros();

        let sqrt_a = a.sqrt();
        let shape = gd.get_shape();

        for k in 0..shape[2] {
            for j in 0..shape[1] {
                for i in 0..shape[0] {
                    let d = gd.get_displacement([i, j, k], center);
                    let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
                    let r = r2.sqrt();

                    rho[[i, j, k]] = (-a * r2).exp();
                    pot[[i, j, k]] = if r < EPS10 {
                        2.0 * sqrt_a / SQRT_PI
                    } else {
                        erf(sqrt_a * r) / r
                    };
                }
            }
        }

        let norm = gd.integrate(&rho, comm);
        rho.scale(1.0 / norm);

        Gaussian {
            center,
            rho,
            pot,
        }
    }

    pub fn get_center(&self) -> [f64; 3] {
        self.center
    }

    pub fn get_gauss(&self) -> &Array3<f64> {
        &self.rho
    }

    pub fn get_gauss_pot(&self) -> &Array3<f64> {
        &self.pot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gpcomm::SerialComm;

    #[test]
    fn test_gaussian_normalization() {
        let gd = GridDescriptor::new([24, 24, 24], [6.0; 3], [false; 3]).unwrap();
        let g = Gaussian::new(&gd, &SerialComm);

        assert_relative_eq!(gd.integrate(g.get_gauss(), &SerialComm), 1.0, epsilon = 1e-12);

        // the center (3, 3, 3) is the stored point (11, 11, 11)
        assert_relative_eq!(
            g.get_gauss_pot()[[11, 11, 11]],
            2.0 * (19.0_f64 / PI).sqrt(),
            epsilon = 1e-12
        );

        // far from the center the potential is that of a point charge
        let r = gd.get_displacement([0, 11, 11], g.get_center());
        assert_relative_eq!(g.get_gauss_pot()[[0, 11, 11]], 1.0 / r[0].abs(), epsilon = 1e-10);
    }
}
