use crate::{DeviceError, Real};

/// Row-major device-resident matrix.
#[derive(Clone, Debug)]
pub struct DeviceMatrix {
    pub data: Vec<Real>,
    pub rows: usize,
    pub cols: usize,
}

impl DeviceMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Host-to-device copy.
    pub fn from_host(data: &[Real], rows: usize, cols: usize) -> Result<Self, DeviceError> {
        if data.len() != rows * cols {
            return Err(DeviceError::len_mismatch("from_host", rows * cols, data.len()));
        }
        Ok(Self {
            data: data.to_vec(),
            rows,
            cols,
        })
    }

    /// Device-to-host copy.
    pub fn to_host(&self) -> Vec<Real> {
        self.data.clone()
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    fn idx(&self, r: usize, c: usize) -> usize {
        r * self.cols + c
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> Real {
        self.data[self.idx(r, c)]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: Real) {
        let i = self.idx(r, c);
        self.data[i] = v;
    }

    pub fn row(&self, r: usize) -> &[Real] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Device-to-device copy.
    pub fn copy_from(&mut self, src: &DeviceMatrix) -> Result<(), DeviceError> {
        if self.dim() != src.dim() {
            return Err(DeviceError::shape_mismatch("copy_from", self.dim(), src.dim()));
        }
        self.data.copy_from_slice(&src.data);
        Ok(())
    }
}

/// Device-resident vector.
#[derive(Clone, Debug)]
pub struct DeviceVector {
    pub data: Vec<Real>,
}

impl DeviceVector {
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    pub fn from_host(data: &[Real]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    pub fn to_host(&self) -> Vec<Real> {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn copy_from(&mut self, src: &DeviceVector) -> Result<(), DeviceError> {
        if self.len() != src.len() {
            return Err(DeviceError::len_mismatch("copy_from", self.len(), src.len()));
        }
        self.data.copy_from_slice(&src.data);
        Ok(())
    }
}

/// Single device-resident value.
#[derive(Clone, Copy, Debug)]
pub struct DeviceScalar {
    pub data: Real,
}

impl DeviceScalar {
    pub fn new(v: Real) -> Self {
        Self { data: v }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceMatrix, DeviceVector};

    #[test]
    fn from_host_rejects_bad_length() {
        assert!(DeviceMatrix::from_host(&[1.0, 2.0, 3.0], 2, 2).is_err());
    }

    #[test]
    fn copy_from_rejects_shape_mismatch() {
        let mut a = DeviceMatrix::zeros(2, 3);
        let b = DeviceMatrix::zeros(3, 2);
        assert!(a.copy_from(&b).is_err());

        let mut x = DeviceVector::zeros(4);
        let y = DeviceVector::zeros(5);
        assert!(x.copy_from(&y).is_err());
    }

    #[test]
    fn row_major_indexing() {
        let m = DeviceMatrix::from_host(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
        assert_eq!(m.get(0, 2), 3.0);
        assert_eq!(m.get(1, 0), 4.0);
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
    }
}
