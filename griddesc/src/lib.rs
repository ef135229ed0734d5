//! Structured real-space grids.
//!
//! A periodic axis with `N` intervals stores the `N` points `0..N`. A
//! non-periodic axis stores the interior points `1..N`; the boundary points
//! `0` and `N` carry the value zero and are never stored.

use gpcomm::Communicator;
use gpconsts::*;
use gpgrid::Array3;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("cannot coarsen axis {axis} with {n} intervals")]
    CannotCoarsen { axis: usize, n: usize },

    #[error("invalid grid: {0}")]
    InvalidShape(String),
}

pub type GridResult<T> = Result<T, GridError>;

#[derive(Debug, Clone, PartialEq)]
pub struct GridDescriptor {
    n_c: [usize; 3],
    cell: [f64; 3],
    pbc: [bool; 3],
    h: [f64; 3],
    dv: f64,
    beg_c: [usize; 3],
    shape: [usize; 3],
}

impl GridDescriptor {
    /// `n_c`: intervals per axis, `cell`: orthorhombic cell lengths in Bohr.
    pub fn new(n_c: [usize; 3], cell: [f64; 3], pbc: [bool; 3]) -> GridResult<GridDescriptor> {
        let mut h = [0.0; 3];
        let mut beg_c = [0; 3];
        let mut shape = [0; 3];

        for i in 0..3 {
            if n_c[i] < 2 {
                return Err(GridError::InvalidShape(format!(
                    "axis {} has {} intervals",
                    i, n_c[i]
                )));
            }

            if !(cell[i] > 0.0) {
                return Err(GridError::InvalidShape(format!(
                    "axis {} has cell length {}",
                    i, cell[i]
                )));
            }

            h[i] = cell[i] / n_c[i] as f64;

            if pbc[i] {
                beg_c[i] = 0;
                shape[i] = n_c[i];
            } else {
                beg_c[i] = 1;
                shape[i] = n_c[i] - 1;
            }
        }

        Ok(GridDescriptor {
            n_c,
            cell,
            pbc,
            h,
            dv: h[0] * h[1] * h[2],
            beg_c,
            shape,
        })
    }

    pub fn get_n_c(&self) -> [usize; 3] {
        self.n_c
    }

    pub fn get_cell(&self) -> [f64; 3] {
        self.cell
    }

    pub fn get_pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn is_periodic(&self) -> bool {
        self.pbc.iter().all(|&p| p)
    }

    pub fn get_h(&self) -> [f64; 3] {
        self.h
    }

    pub fn get_dv(&self) -> f64 {
        self.dv
    }

    /// Global index of the first stored point along each axis.
    pub fn get_beg(&self) -> [usize; 3] {
        self.beg_c
    }

    /// Shape of the stored (local) array.
    pub fn get_shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn get_npoints(&self) -> usize {
        self.shape[0] * self.shape[1] * self.shape[2]
    }

    /// Grid with twice the spacing. Every axis must have an even number of
    /// intervals and keep at least `MIN_COARSE_POINTS` of them.
    pub fn coarsen(&self) -> GridResult<GridDescriptor> {
        let mut n_c = [0; 3];

        for i in 0..3 {
            let n = self.n_c[i];
            if n % 2 != 0 || n / 2 < MIN_COARSE_POINTS {
                return Err(GridError::CannotCoarsen { axis: i, n });
            }
            n_c[i] = n / 2;
        }

        GridDescriptor::new(n_c, self.cell, self.pbc)
    }

    pub fn refine(&self) -> GridDescriptor {
        let n_c = [2 * self.n_c[0], 2 * self.n_c[1], 2 * self.n_c[2]];

        let mut gd = self.clone();
        for i in 0..3 {
            gd.n_c[i] = n_c[i];
            gd.h[i] = self.h[i] * 0.5;
            gd.shape[i] = if self.pbc[i] { n_c[i] } else { n_c[i] - 1 };
        }
        gd.dv = gd.h[0] * gd.h[1] * gd.h[2];

        gd
    }

    pub fn zeros(&self) -> Array3<f64> {
        Array3::<f64>::new(self.shape)
    }

    pub fn zeros_spin(&self, nspin: usize) -> Vec<Array3<f64>> {
        (0..nspin).map(|_| self.zeros()).collect()
    }

    pub fn check_shape(&self, a: &Array3<f64>) {
        assert_eq!(
            a.shape(),
            self.shape,
            "array shape does not match its grid descriptor"
        );
    }

    /// Volume integral, reduced over the communicator.
    pub fn integrate(&self, a: &Array3<f64>, comm: &dyn Communicator) -> f64 {
        self.check_shape(a);

        comm.sum_scalar(a.sum()) * self.dv
    }

    /// `<a|b>` integrated over the cell.
    pub fn integrate_product(&self, a: &Array3<f64>, b: &Array3<f64>, comm: &dyn Communicator) -> f64 {
        self.check_shape(a);
        self.check_shape(b);

        comm.sum_scalar(a.dot(b)) * self.dv
    }

    /// Cartesian position of a stored point.
    pub fn get_position(&self, idx: [usize; 3]) -> [f64; 3] {
        [
            (idx[0] + self.beg_c[0]) as f64 * self.h[0],
            (idx[1] + self.beg_c[1]) as f64 * self.h[1],
            (idx[2] + self.beg_c[2]) as f64 * self.h[2],
        ]
    }

    /// Vector from `center` to a stored point, using the minimum image
    /// along periodic axes.
    pub fn get_displacement(&self, idx: [usize; 3], center: [f64; 3]) -> [f64; 3] {
        let r = self.get_position(idx);

        let mut d = [0.0; 3];
        for i in 0..3 {
            d[i] = r[i] - center[i];
            if self.pbc[i] {
                d[i] -= self.cell[i] * (d[i] / self.cell[i]).round();
            }
        }

        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gpcomm::SerialComm;

    #[test]
    fn test_shapes() {
        let gd = GridDescriptor::new([16, 16, 12], [8.0, 8.0, 6.0], [true, true, false]).unwrap();
        assert_eq!(gd.get_shape(), [16, 16, 11]);
        assert_eq!(gd.get_beg(), [0, 0, 1]);
        assert_relative_eq!(gd.get_dv(), 0.125);

        let gd2 = gd.coarsen().unwrap();
        assert_eq!(gd2.get_n_c(), [8, 8, 6]);
        assert_eq!(gd2.get_shape(), [8, 8, 5]);

        assert_eq!(
            gd2.coarsen(),
            Err(GridError::CannotCoarsen { axis: 2, n: 6 })
        );

        let fine = gd.refine();
        assert_eq!(fine.get_n_c(), [32, 32, 24]);
        assert_eq!(fine.get_shape(), [32, 32, 23]);
        assert_relative_eq!(fine.get_dv(), gd.get_dv() / 8.0);
        assert_eq!(fine.coarsen().unwrap(), gd);
    }

    #[test]
    fn test_invalid() {
        assert!(GridDescriptor::new([1, 8, 8], [1.0, 1.0, 1.0], [true; 3]).is_err());
        assert!(GridDescriptor::new([8, 8, 8], [1.0, 0.0, 1.0], [true; 3]).is_err());
    }

    #[test]
    fn test_integrate() {
        let gd = GridDescriptor::new([8, 8, 8], [4.0, 4.0, 4.0], [true; 3]).unwrap();
        let mut a = gd.zeros();
        a.set_value(2.0);

        assert_relative_eq!(gd.integrate(&a, &SerialComm), 128.0, epsilon = 1e-12);
        assert_relative_eq!(
            gd.integrate_product(&a, &a, &SerialComm),
            256.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_minimum_image_displacement() {
        let gd = GridDescriptor::new([4, 4, 4], [4.0, 4.0, 4.0], [true, true, false]).unwrap();

        let d = gd.get_displacement([3, 0, 0], [0.0, 0.0, 0.0]);
        assert_relative_eq!(d[0], -1.0);
        assert_relative_eq!(d[2], 1.0);
    }
}
