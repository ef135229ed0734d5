use itertools::multizip;
use ndarray_crate::{Array3 as NdArray3, ShapeBuilder, Zip};
use num_traits::Zero;
use std::ops::{Add, Index, IndexMut, Mul, Sub};

/// Dense array over the local points of one grid.
///
/// Memory order is first-index-fastest, so the linear offset of `[i, j, k]`
/// is `i + n0 * (j + n1 * k)`.
#[derive(Debug, Clone)]
pub struct Array3<T> {
    shape: [usize; 3],
    data: NdArray3<T>,
}

impl<T: Default + Clone> Default for Array3<T> {
    fn default() -> Self {
        Self {
            shape: [0, 0, 0],
            data: NdArray3::from_elem((0, 0, 0).f(), T::default()),
        }
    }
}

impl<T> Array3<T>
where
    T: Default + Copy + Zero + Add<Output = T> + Sub<Output = T> + Mul<Output = T>,
{
    pub fn new(shape: [usize; 3]) -> Array3<T> {
        Array3 {
            shape,
            data: NdArray3::from_elem((shape[0], shape[1], shape[2]).f(), T::zero()),
        }
    }

    pub fn from_vec(shape: [usize; 3], data: Vec<T>) -> Array3<T> {
        let nlen = shape[0] * shape[1] * shape[2];
        assert_eq!(data.len(), nlen);

        let mut a = Array3::new(shape);
        a.as_mut_slice().copy_from_slice(&data);

        a
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn sum(&self) -> T {
        let mut s = T::zero();
        for v in self.data.iter() {
            s = s + *v;
        }

        s
    }

    pub fn set_value(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn as_slice(&self) -> &[T] {
        // Arrays are only ever built through `new`, which is contiguous.
        match self.data.as_slice_memory_order() {
            Some(s) => s,
            None => unreachable!("Array3 is always contiguous"),
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self.data.as_slice_memory_order_mut() {
            Some(s) => s,
            None => unreachable!("Array3 is always contiguous"),
        }
    }

    pub fn assign(&mut self, rhs: &Array3<T>) {
        assert_eq!(self.shape, rhs.shape);
        self.data.assign(&rhs.data);
    }

    pub fn add_from(&mut self, rhs: &Array3<T>) {
        assert_eq!(self.shape, rhs.shape);
        Zip::from(self.data.view_mut())
            .and(rhs.data.view())
            .for_each(|d, &s| *d = *d + s);
    }

    pub fn substract(&mut self, rhs: &Array3<T>) {
        assert_eq!(self.shape, rhs.shape);
        Zip::from(self.data.view_mut())
            .and(rhs.data.view())
            .for_each(|d, &s| *d = *d - s);
    }

    pub fn scale(&mut self, factor: T) {
        self.data.map_inplace(|v| *v = *v * factor);
    }

    /// self += a * x
    pub fn axpy(&mut self, a: T, x: &Array3<T>) {
        assert_eq!(self.shape, x.shape);
        for (y, &xv) in multizip((self.as_mut_slice().iter_mut(), x.as_slice().iter())) {
            *y = *y + a * xv;
        }
    }
}

impl Array3<f64> {
    /// Plain (unweighted) dot product over the local points.
    pub fn dot(&self, rhs: &Array3<f64>) -> f64 {
        assert_eq!(self.shape, rhs.shape);
        multizip((self.as_slice().iter(), rhs.as_slice().iter()))
            .map(|(x, y)| x * y)
            .sum()
    }

    pub fn abs_sum(&self) -> f64 {
        self.as_slice().iter().map(|x| x.abs()).sum()
    }

    pub fn max_abs(&self) -> f64 {
        self.as_slice().iter().fold(0.0_f64, |m, x| m.max(x.abs()))
    }
}

impl<T> Index<[usize; 3]> for Array3<T> {
    type Output = T;

    fn index(&self, idx: [usize; 3]) -> &T {
        &self.data[[idx[0], idx[1], idx[2]]]
    }
}

impl<T> IndexMut<[usize; 3]> for Array3<T> {
    fn index_mut(&mut self, idx: [usize; 3]) -> &mut Self::Output {
        &mut self.data[[idx[0], idx[1], idx[2]]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array3_indexing_and_shape_contract() {
        let a = Array3::from_vec([2, 2, 2], vec![0.0f64, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);

        // First-index-fastest memory order.
        assert_eq!(a[[0, 0, 0]], 0.0);
        assert_eq!(a[[1, 0, 0]], 1.0);
        assert_eq!(a[[0, 1, 0]], 2.0);
        assert_eq!(a[[1, 1, 0]], 3.0);
        assert_eq!(a[[0, 0, 1]], 4.0);
        assert_eq!(a[[1, 1, 1]], 7.0);
        assert_eq!(a.shape(), [2, 2, 2]);
        assert_eq!(a.len(), 8);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_array3_arithmetic_helpers() {
        let mut a = Array3::from_vec([2, 2, 1], vec![1.0f64, 2.0, 3.0, 4.0]);
        let b = Array3::from_vec([2, 2, 1], vec![10.0f64, 20.0, 30.0, 40.0]);

        a.add_from(&b);
        assert_eq!(a.as_slice(), &[11.0, 22.0, 33.0, 44.0]);

        a.substract(&b);
        assert_eq!(a.as_slice(), &[1.0, 2.0, 3.0, 4.0]);

        a.axpy(0.5, &b);
        assert_eq!(a.as_slice(), &[6.0, 12.0, 18.0, 24.0]);

        a.scale(0.5);
        assert_eq!(a.as_slice(), &[3.0, 6.0, 9.0, 12.0]);

        assert_eq!(a.dot(&b), 30.0 + 120.0 + 270.0 + 480.0);

        let mut assigned = Array3::new([2, 2, 1]);
        assigned.assign(&b);
        assert_eq!(assigned.as_slice(), b.as_slice());

        assigned.set_value(-5.0);
        assert_eq!(assigned.sum(), -20.0);
        assert_eq!(assigned.abs_sum(), 20.0);
        assert_eq!(assigned.max_abs(), 5.0);
    }

    #[test]
    #[should_panic]
    fn test_array3_shape_mismatch_panics() {
        let mut a = Array3::<f64>::new([2, 2, 2]);
        let b = Array3::<f64>::new([2, 2, 1]);
        a.add_from(&b);
    }
}
