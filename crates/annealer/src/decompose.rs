use device::{DeviceError, DeviceMatrix, DeviceScalar, DeviceVector, Real};
use linalg::{BatchOp, DeviceMath};

const SYMMETRY_TOL: Real = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizeDirection {
    Minimize,
    Maximize,
}

impl OptimizeDirection {
    pub fn sign(self) -> Real {
        match self {
            OptimizeDirection::Minimize => 1.0,
            OptimizeDirection::Maximize => -1.0,
        }
    }
}

/// Ising decomposition of a dense coupling matrix: for bits x and spins
/// q = 2x - 1, `x' W' x = h.q + q' J q + c`, where W' is W negated once
/// for Maximize so the engine always minimizes.
pub struct Decomposition {
    pub h: DeviceVector,
    pub j: DeviceMatrix,
    pub c: DeviceScalar,
}

pub fn decompose(
    math: &DeviceMath,
    w: &DeviceMatrix,
    direction: OptimizeDirection,
) -> Result<Decomposition, DeviceError> {
    if w.rows != w.cols {
        return Err(DeviceError::shape_mismatch("decompose", w.dim(), (w.rows, w.rows)));
    }
    check_symmetric(w)?;

    let n = w.rows;
    let mut adjusted = DeviceMatrix::zeros(n, n);
    math.scale_matrix(&mut adjusted, direction.sign(), w, 0.0)?;

    let mut h = DeviceVector::zeros(n);
    math.sum_batched(&mut h, 0.5, &adjusted, BatchOp::Rowwise)?;

    let mut j = DeviceMatrix::zeros(n, n);
    math.scale_matrix(&mut j, 0.25, &adjusted, 0.0)?;
    math.set_to_diagonals(&mut j, 0.0);

    let mut c = DeviceScalar::new(0.0);
    math.sum_matrix(&mut c, 0.25, &adjusted, 0.0);
    let mut trace = DeviceScalar::new(0.0);
    math.sum_diagonals(&mut trace, &adjusted);
    math.scale_scalar(&mut c, 0.25, &trace, 1.0);

    Ok(Decomposition { h, j, c })
}

fn check_symmetric(w: &DeviceMatrix) -> Result<(), DeviceError> {
    let scale = w.data.iter().fold(0.0, |m: Real, v| m.max(v.abs()));
    let tol = SYMMETRY_TOL * (1.0 + scale);
    for r in 0..w.rows {
        for c in (r + 1)..w.cols {
            if (w.get(r, c) - w.get(c, r)).abs() > tol {
                return Err(DeviceError::DimensionMismatch {
                    op: "decompose",
                    lhs: format!("W[{r},{c}] = {}", w.get(r, c)),
                    rhs: format!("W[{c},{r}] = {}", w.get(c, r)),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{decompose, OptimizeDirection};
    use device::{DeviceMatrix, Real};
    use linalg::DeviceMath;
    use rng::RandomStream;

    fn random_symmetric(rs: &mut RandomStream, n: usize) -> DeviceMatrix {
        let raw: Vec<Real> = rs
            .next_floats(n * n)
            .unwrap()
            .into_iter()
            .map(|u| 2.0 * u - 1.0)
            .collect();
        let mut w = DeviceMatrix::zeros(n, n);
        for r in 0..n {
            for c in 0..n {
                w.set(r, c, 0.5 * (raw[r * n + c] + raw[c * n + r]));
            }
        }
        w
    }

    fn quadratic_form(w: &DeviceMatrix, x: &[Real]) -> Real {
        let n = w.rows;
        let mut e = 0.0;
        for i in 0..n {
            for j in 0..n {
                e += x[i] * w.get(i, j) * x[j];
            }
        }
        e
    }

    fn reconstructed(dec: &super::Decomposition, q: &[Real]) -> Real {
        let n = q.len();
        let mut e = dec.c.data;
        for i in 0..n {
            e += dec.h.data[i] * q[i];
            for j in 0..n {
                e += q[i] * dec.j.get(i, j) * q[j];
            }
        }
        e
    }

    #[test]
    fn energy_identity_over_random_problems() {
        let math = DeviceMath::new();
        let mut rs = RandomStream::new();
        rs.seed(31);

        for n in [2, 5, 9] {
            let w = random_symmetric(&mut rs, n);
            let dec = decompose(&math, &w, OptimizeDirection::Minimize).unwrap();

            for _ in 0..8 {
                let x: Vec<Real> = rs
                    .next_floats(n)
                    .unwrap()
                    .into_iter()
                    .map(|u| if u < 0.5 { 0.0 } else { 1.0 })
                    .collect();
                let q: Vec<Real> = x.iter().map(|&b| 2.0 * b - 1.0).collect();
                let want = quadratic_form(&w, &x);
                let got = reconstructed(&dec, &q);
                assert!((want - got).abs() < 1e-9, "n = {n}: {want} vs {got}");
            }
        }
    }

    #[test]
    fn maximize_is_exact_negation() {
        let math = DeviceMath::new();
        let mut rs = RandomStream::new();
        rs.seed(32);

        let w = random_symmetric(&mut rs, 6);
        let min = decompose(&math, &w, OptimizeDirection::Minimize).unwrap();
        let max = decompose(&math, &w, OptimizeDirection::Maximize).unwrap();

        for (a, b) in min.h.data.iter().zip(&max.h.data) {
            assert_eq!(*a, -*b);
        }
        for (a, b) in min.j.data.iter().zip(&max.j.data) {
            assert_eq!(*a, -*b);
        }
        assert_eq!(min.c.data, -max.c.data);

        let x = [1.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let q: Vec<Real> = x.iter().map(|&b| 2.0 * b - 1.0).collect();
        let want = quadratic_form(&w, &x);
        assert!((reconstructed(&max, &q) + want).abs() < 1e-9);
    }

    #[test]
    fn zero_diagonal_invariant() {
        let math = DeviceMath::new();
        let mut rs = RandomStream::new();
        rs.seed(33);

        let mut w = random_symmetric(&mut rs, 5);
        for i in 0..5 {
            w.set(i, i, 3.0);
        }
        let dec = decompose(&math, &w, OptimizeDirection::Minimize).unwrap();
        for i in 0..5 {
            assert_eq!(dec.j.get(i, i), 0.0);
        }
    }

    #[test]
    fn rejects_asymmetric_and_non_square() {
        let math = DeviceMath::new();

        let w = DeviceMatrix::from_host(&[0.0, 1.0, 2.0, 0.0], 2, 2).unwrap();
        assert!(decompose(&math, &w, OptimizeDirection::Minimize).is_err());

        let w = DeviceMatrix::zeros(2, 3);
        assert!(decompose(&math, &w, OptimizeDirection::Minimize).is_err());
    }
}
