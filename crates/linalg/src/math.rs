use device::{
    DeviceError, DeviceMatrix, DeviceScalar, DeviceStream, DeviceVector, Real, ScratchBuf,
    ScratchPool,
};
use faer::{MatMut, MatRef, Parallelism};
use rayon::prelude::*;

/// Axis selector for broadcast and batched-reduction operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Rowwise,
    Colwise,
}

/// Per-operand transpose flag for product operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixOp {
    None,
    Transpose,
}

fn op_shape(m: &DeviceMatrix, op: MatrixOp) -> (usize, usize) {
    match op {
        MatrixOp::None => (m.rows, m.cols),
        MatrixOp::Transpose => (m.cols, m.rows),
    }
}

fn mat_view(m: &DeviceMatrix) -> MatRef<'_, Real> {
    faer::mat::from_row_major_slice(&m.data, m.rows, m.cols)
}

fn op_view(m: &DeviceMatrix, op: MatrixOp) -> MatRef<'_, Real> {
    match op {
        MatrixOp::None => mat_view(m),
        MatrixOp::Transpose => mat_view(m).transpose(),
    }
}

fn mat_view_mut(m: &mut DeviceMatrix) -> MatMut<'_, Real> {
    faer::mat::from_row_major_slice_mut(&mut m.data, m.rows, m.cols)
}

fn vec_view(v: &DeviceVector) -> MatRef<'_, Real> {
    faer::mat::from_row_major_slice(&v.data, v.data.len(), 1)
}

fn vec_view_mut(v: &mut DeviceVector) -> MatMut<'_, Real> {
    let len = v.data.len();
    faer::mat::from_row_major_slice_mut(&mut v.data, len, 1)
}

fn dot_slices(x: &[Real], y: &[Real]) -> Real {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// Batched linear algebra over device-resident buffers.
///
/// Owns the execution stream and a pool for call-scoped temporaries; all
/// operations take `&self` and enqueue in submission order.
pub struct DeviceMath {
    stream: DeviceStream,
    pool: ScratchPool,
    parallelism: Parallelism<'static>,
}

impl DeviceMath {
    pub fn new() -> Self {
        Self {
            stream: DeviceStream::new(),
            pool: ScratchPool::new(),
            parallelism: Parallelism::Rayon(0),
        }
    }

    pub fn stream(&self) -> &DeviceStream {
        &self.stream
    }

    /// y = alpha * x + add_factor * y
    pub fn scale_scalar(
        &self,
        y: &mut DeviceScalar,
        alpha: Real,
        x: &DeviceScalar,
        add_factor: Real,
    ) {
        self.stream.enqueue("scale_scalar");
        y.data = alpha * x.data + add_factor * y.data;
    }

    /// y = alpha * x + add_factor * y
    pub fn scale(
        &self,
        y: &mut DeviceVector,
        alpha: Real,
        x: &DeviceVector,
        add_factor: Real,
    ) -> Result<(), DeviceError> {
        if y.len() != x.len() {
            return Err(DeviceError::len_mismatch("scale", y.len(), x.len()));
        }
        self.stream.enqueue("scale");
        for (dst, &src) in y.data.iter_mut().zip(&x.data) {
            *dst = alpha * src + add_factor * *dst;
        }
        Ok(())
    }

    /// B = alpha * A + add_factor * B
    pub fn scale_matrix(
        &self,
        b: &mut DeviceMatrix,
        alpha: Real,
        a: &DeviceMatrix,
        add_factor: Real,
    ) -> Result<(), DeviceError> {
        if b.dim() != a.dim() {
            return Err(DeviceError::shape_mismatch("scale_matrix", b.dim(), a.dim()));
        }
        self.stream.enqueue("scale_matrix");
        for (dst, &src) in b.data.iter_mut().zip(&a.data) {
            *dst = alpha * src + add_factor * *dst;
        }
        Ok(())
    }

    /// y = alpha * y
    pub fn scale_in_place(&self, y: &mut DeviceVector, alpha: Real) {
        self.stream.enqueue("scale_in_place");
        for v in &mut y.data {
            *v *= alpha;
        }
    }

    /// Broadcasts a vector across a matrix with scale and accumulate.
    /// Rowwise writes the vector into every row, Colwise into every column.
    pub fn scale_broadcast(
        &self,
        a: &mut DeviceMatrix,
        alpha: Real,
        x: &DeviceVector,
        op: BatchOp,
        add_factor: Real,
    ) -> Result<(), DeviceError> {
        match op {
            BatchOp::Rowwise => {
                if x.len() != a.cols {
                    return Err(DeviceError::len_mismatch("scale_broadcast", a.cols, x.len()));
                }
                self.stream.enqueue("scale_broadcast");
                let src = &x.data;
                a.data.par_chunks_mut(a.cols).for_each(|row| {
                    for (dst, &v) in row.iter_mut().zip(src) {
                        *dst = alpha * v + add_factor * *dst;
                    }
                });
            }
            BatchOp::Colwise => {
                if x.len() != a.rows {
                    return Err(DeviceError::len_mismatch("scale_broadcast", a.rows, x.len()));
                }
                self.stream.enqueue("scale_broadcast");
                let src = &x.data;
                a.data
                    .par_chunks_mut(a.cols)
                    .enumerate()
                    .for_each(|(r, row)| {
                        let v = src[r];
                        for dst in row {
                            *dst = alpha * v + add_factor * *dst;
                        }
                    });
            }
        }
        Ok(())
    }

    /// y_i = alpha * x + add_factor * y_i
    pub fn scale_broadcast_scalar(
        &self,
        y: &mut DeviceVector,
        alpha: Real,
        x: &DeviceScalar,
        add_factor: Real,
    ) {
        self.stream.enqueue("scale_broadcast_scalar");
        for dst in &mut y.data {
            *dst = alpha * x.data + add_factor * *dst;
        }
    }

    /// Writes `v` along the main diagonal.
    pub fn set_to_diagonals(&self, a: &mut DeviceMatrix, v: Real) {
        self.stream.enqueue("set_to_diagonals");
        for i in 0..a.rows.min(a.cols) {
            a.set(i, i, v);
        }
    }

    /// s = alpha * sum(x) + add_factor * s
    pub fn sum(&self, s: &mut DeviceScalar, alpha: Real, x: &DeviceVector, add_factor: Real) {
        self.stream.enqueue("sum");
        let total: Real = x.data.iter().sum();
        s.data = alpha * total + add_factor * s.data;
    }

    /// s = alpha * sum(A) + add_factor * s
    pub fn sum_matrix(
        &self,
        s: &mut DeviceScalar,
        alpha: Real,
        a: &DeviceMatrix,
        add_factor: Real,
    ) {
        self.stream.enqueue("sum_matrix");
        let total: Real = a.data.iter().sum();
        s.data = alpha * total + add_factor * s.data;
    }

    /// s = trace(A)
    pub fn sum_diagonals(&self, s: &mut DeviceScalar, a: &DeviceMatrix) {
        self.stream.enqueue("sum_diagonals");
        s.data = (0..a.rows.min(a.cols)).map(|i| a.get(i, i)).sum();
    }

    /// Per-row (or per-column) sums: v_i = alpha * sum(op(A) row i).
    /// Colwise materializes a transpose before the row reduction; callers
    /// needing repeated column reductions should pre-transpose once.
    pub fn sum_batched(
        &self,
        v: &mut DeviceVector,
        alpha: Real,
        a: &DeviceMatrix,
        op: BatchOp,
    ) -> Result<(), DeviceError> {
        match op {
            BatchOp::Rowwise => {
                if v.len() != a.rows {
                    return Err(DeviceError::len_mismatch("sum_batched", a.rows, v.len()));
                }
                self.stream.enqueue("sum_batched");
                v.data
                    .par_iter_mut()
                    .zip(a.data.par_chunks(a.cols))
                    .for_each(|(dst, row)| *dst = alpha * row.iter().sum::<Real>());
            }
            BatchOp::Colwise => {
                if v.len() != a.cols {
                    return Err(DeviceError::len_mismatch("sum_batched", a.cols, v.len()));
                }
                let t = self.transposed(a);
                self.stream.enqueue("sum_batched");
                v.data
                    .par_iter_mut()
                    .zip(t.par_chunks(a.rows))
                    .for_each(|(dst, row)| *dst = alpha * row.iter().sum::<Real>());
            }
        }
        Ok(())
    }

    /// z = alpha * x . y + add_factor * z
    pub fn dot(
        &self,
        z: &mut DeviceScalar,
        alpha: Real,
        x: &DeviceVector,
        y: &DeviceVector,
        add_factor: Real,
    ) -> Result<(), DeviceError> {
        if x.len() != y.len() {
            return Err(DeviceError::len_mismatch("dot", x.len(), y.len()));
        }
        self.stream.enqueue("dot");
        z.data = alpha * dot_slices(&x.data, &y.data) + add_factor * z.data;
        Ok(())
    }

    /// Row-by-row inner products of op(A) and op(B):
    /// z_i = alpha * op(A)_i . op(B)_i + add_factor * z_i.
    ///
    /// Transposed operands are materialized into independent scratch
    /// slots, one per operand.
    #[allow(clippy::too_many_arguments)]
    pub fn dot_batched(
        &self,
        z: &mut DeviceVector,
        alpha: Real,
        a: &DeviceMatrix,
        op_a: MatrixOp,
        b: &DeviceMatrix,
        op_b: MatrixOp,
        add_factor: Real,
    ) -> Result<(), DeviceError> {
        let ta = match op_a {
            MatrixOp::Transpose => Some(self.transposed(a)),
            MatrixOp::None => None,
        };
        let tb = match op_b {
            MatrixOp::Transpose => Some(self.transposed(b)),
            MatrixOp::None => None,
        };
        let (a_data, a_dim) = match &ta {
            Some(t) => (&t[..], (a.cols, a.rows)),
            None => (&a.data[..], a.dim()),
        };
        let (b_data, b_dim) = match &tb {
            Some(t) => (&t[..], (b.cols, b.rows)),
            None => (&b.data[..], b.dim()),
        };
        if a_dim != b_dim {
            return Err(DeviceError::shape_mismatch("dot_batched", a_dim, b_dim));
        }
        if z.len() != a_dim.0 {
            return Err(DeviceError::len_mismatch("dot_batched", a_dim.0, z.len()));
        }
        self.stream.enqueue("dot_batched");
        z.data
            .par_iter_mut()
            .zip(a_data.par_chunks(a_dim.1).zip(b_data.par_chunks(b_dim.1)))
            .for_each(|(dst, (ra, rb))| {
                *dst = alpha * dot_slices(ra, rb) + add_factor * *dst;
            });
        Ok(())
    }

    /// Generalized affine product: C = alpha * op(A) * op(B) + add_factor * C.
    /// The mv/vm/mm entry points all lower onto this primitive.
    #[allow(clippy::too_many_arguments)]
    pub fn gemm(
        &self,
        c: &mut DeviceMatrix,
        alpha: Real,
        a: &DeviceMatrix,
        op_a: MatrixOp,
        b: &DeviceMatrix,
        op_b: MatrixOp,
        add_factor: Real,
    ) -> Result<(), DeviceError> {
        let (am, ak) = op_shape(a, op_a);
        let (bk, bn) = op_shape(b, op_b);
        if ak != bk {
            return Err(DeviceError::shape_mismatch("gemm", (am, ak), (bk, bn)));
        }
        if c.dim() != (am, bn) {
            return Err(DeviceError::shape_mismatch("gemm", c.dim(), (am, bn)));
        }
        self.stream.enqueue("gemm");
        let acc = (add_factor != 0.0).then_some(add_factor);
        faer::linalg::matmul::matmul(
            mat_view_mut(c),
            op_view(a, op_a),
            op_view(b, op_b),
            acc,
            alpha,
            self.parallelism,
        );
        Ok(())
    }

    /// y = alpha * op(A) * x + add_factor * y
    pub fn gemv(
        &self,
        y: &mut DeviceVector,
        alpha: Real,
        a: &DeviceMatrix,
        op_a: MatrixOp,
        x: &DeviceVector,
        add_factor: Real,
    ) -> Result<(), DeviceError> {
        let (m, k) = op_shape(a, op_a);
        if x.len() != k {
            return Err(DeviceError::len_mismatch("gemv", k, x.len()));
        }
        if y.len() != m {
            return Err(DeviceError::len_mismatch("gemv", m, y.len()));
        }
        self.stream.enqueue("gemv");
        let acc = (add_factor != 0.0).then_some(add_factor);
        faer::linalg::matmul::matmul(
            vec_view_mut(y),
            op_view(a, op_a),
            vec_view(x),
            acc,
            alpha,
            self.parallelism,
        );
        Ok(())
    }

    /// y = alpha * op(A) * x + add_factor * y
    pub fn mv_product(
        &self,
        y: &mut DeviceVector,
        alpha: Real,
        a: &DeviceMatrix,
        op_a: MatrixOp,
        x: &DeviceVector,
        add_factor: Real,
    ) -> Result<(), DeviceError> {
        self.gemv(y, alpha, a, op_a, x, add_factor)
    }

    /// y = alpha * x * op(A) + add_factor * y, via the flipped gemv.
    pub fn vm_product(
        &self,
        y: &mut DeviceVector,
        alpha: Real,
        x: &DeviceVector,
        a: &DeviceMatrix,
        op_a: MatrixOp,
        add_factor: Real,
    ) -> Result<(), DeviceError> {
        let flipped = match op_a {
            MatrixOp::None => MatrixOp::Transpose,
            MatrixOp::Transpose => MatrixOp::None,
        };
        self.gemv(y, alpha, a, flipped, x, add_factor)
    }

    /// C = alpha * op(A) * op(B) + add_factor * C
    #[allow(clippy::too_many_arguments)]
    pub fn mm_product(
        &self,
        c: &mut DeviceMatrix,
        alpha: Real,
        a: &DeviceMatrix,
        op_a: MatrixOp,
        b: &DeviceMatrix,
        op_b: MatrixOp,
        add_factor: Real,
    ) -> Result<(), DeviceError> {
        self.gemm(c, alpha, a, op_a, b, op_b, add_factor)
    }

    /// z = alpha * y . (A x). The intermediate product lives in scratch;
    /// the bilinear form is never materialized.
    pub fn vmv_product(
        &self,
        z: &mut DeviceScalar,
        alpha: Real,
        y: &DeviceVector,
        a: &DeviceMatrix,
        x: &DeviceVector,
    ) -> Result<(), DeviceError> {
        if x.len() != a.cols {
            return Err(DeviceError::len_mismatch("vmv_product", a.cols, x.len()));
        }
        if y.len() != a.rows {
            return Err(DeviceError::len_mismatch("vmv_product", a.rows, y.len()));
        }
        let mut ax = self.pool.acquire(a.rows);
        self.stream.enqueue("vmv_product");
        faer::linalg::matmul::matmul(
            faer::mat::from_row_major_slice_mut(&mut ax[..], a.rows, 1),
            mat_view(a),
            vec_view(x),
            None,
            1.0,
            self.parallelism,
        );
        z.data = alpha * dot_slices(&ax, &y.data);
        Ok(())
    }

    /// Batched bilinear form over row pairs sharing A:
    /// z_p = alpha * y_p . (A x_p), computed as x A^T into scratch
    /// followed by a batched dot.
    pub fn batched_vmv_product(
        &self,
        z: &mut DeviceVector,
        alpha: Real,
        y: &DeviceMatrix,
        a: &DeviceMatrix,
        x: &DeviceMatrix,
    ) -> Result<(), DeviceError> {
        if x.cols != a.cols {
            return Err(DeviceError::len_mismatch("batched_vmv_product", a.cols, x.cols));
        }
        if y.cols != a.rows {
            return Err(DeviceError::len_mismatch("batched_vmv_product", a.rows, y.cols));
        }
        if y.rows != x.rows {
            return Err(DeviceError::shape_mismatch("batched_vmv_product", y.dim(), x.dim()));
        }
        if z.len() != x.rows {
            return Err(DeviceError::len_mismatch("batched_vmv_product", x.rows, z.len()));
        }
        let mut xat = self.pool.acquire(x.rows * a.rows);
        self.stream.enqueue("batched_vmv_product");
        faer::linalg::matmul::matmul(
            faer::mat::from_row_major_slice_mut(&mut xat[..], x.rows, a.rows),
            mat_view(x),
            mat_view(a).transpose(),
            None,
            1.0,
            self.parallelism,
        );
        z.data
            .par_iter_mut()
            .zip(y.data.par_chunks(y.cols).zip(xat.par_chunks(a.rows)))
            .for_each(|(dst, (ry, rx))| *dst = alpha * dot_slices(ry, rx));
        Ok(())
    }

    /// Chained triple product z = alpha * op(Y) * op(A) * op(X), computed
    /// as two sequential products through a scratch intermediate.
    #[allow(clippy::too_many_arguments)]
    pub fn mmm_product(
        &self,
        z: &mut DeviceMatrix,
        alpha: Real,
        y: &DeviceMatrix,
        op_y: MatrixOp,
        a: &DeviceMatrix,
        op_a: MatrixOp,
        x: &DeviceMatrix,
        op_x: MatrixOp,
    ) -> Result<(), DeviceError> {
        let (ar, ac) = op_shape(a, op_a);
        let (xr, xc) = op_shape(x, op_x);
        let (yr, yc) = op_shape(y, op_y);
        if ac != xr {
            return Err(DeviceError::shape_mismatch("mmm_product", (ar, ac), (xr, xc)));
        }
        if yc != ar {
            return Err(DeviceError::shape_mismatch("mmm_product", (yr, yc), (ar, ac)));
        }
        if z.dim() != (yr, xc) {
            return Err(DeviceError::shape_mismatch("mmm_product", z.dim(), (yr, xc)));
        }
        let mut ax = self.pool.acquire(ar * xc);
        self.stream.enqueue("mmm_product");
        faer::linalg::matmul::matmul(
            faer::mat::from_row_major_slice_mut(&mut ax[..], ar, xc),
            op_view(a, op_a),
            op_view(x, op_x),
            None,
            1.0,
            self.parallelism,
        );
        faer::linalg::matmul::matmul(
            mat_view_mut(z),
            op_view(y, op_y),
            faer::mat::from_row_major_slice(&ax[..], ar, xc),
            None,
            alpha,
            self.parallelism,
        );
        Ok(())
    }

    /// Materializing transpose: dst = src^T.
    pub fn transpose(
        &self,
        dst: &mut DeviceMatrix,
        src: &DeviceMatrix,
    ) -> Result<(), DeviceError> {
        if dst.dim() != (src.cols, src.rows) {
            return Err(DeviceError::shape_mismatch(
                "transpose",
                dst.dim(),
                (src.cols, src.rows),
            ));
        }
        self.stream.enqueue("transpose");
        let cols = src.cols;
        let rows = src.rows;
        let data = &src.data;
        dst.data
            .par_chunks_mut(rows)
            .enumerate()
            .for_each(|(c, out)| {
                for (r, dst) in out.iter_mut().enumerate() {
                    *dst = data[r * cols + c];
                }
            });
        Ok(())
    }

    /// Minimum reduction over a matrix. Not implemented; fails rather
    /// than returning a silent zero.
    pub fn min(&self, _s: &mut DeviceScalar, _a: &DeviceMatrix) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported { op: "min" })
    }

    /// Scratch-backed transpose of `a`, shaped a.cols x a.rows.
    fn transposed(&self, a: &DeviceMatrix) -> ScratchBuf<'_> {
        self.stream.enqueue("transpose");
        let mut t = self.pool.acquire(a.rows * a.cols);
        let cols = a.cols;
        let rows = a.rows;
        let data = &a.data;
        t.par_chunks_mut(rows).enumerate().for_each(|(c, out)| {
            for (r, dst) in out.iter_mut().enumerate() {
                *dst = data[r * cols + c];
            }
        });
        t
    }
}

impl Default for DeviceMath {
    fn default() -> Self {
        Self::new()
    }
}
