use crate::decompose::{decompose, Decomposition, OptimizeDirection};
use crate::error::AnnealError;
use crate::state::SolverState;
use device::{DeviceError, DeviceMatrix, DeviceVector, Real};
use linalg::{BatchOp, DeviceMath, MatrixOp};
use rayon::prelude::*;
use rng::RandomStream;

/// Sweeps worth of draws buffered per random refill.
const RUNS_PER_REFILL: usize = 10;

/// Dense-graph simulated quantum annealer.
///
/// Owns the replica spin matrix and drives one Monte-Carlo sweep per
/// `anneal_one_step` call, with P trotter replicas coupled along an
/// imaginary-time ring.
pub struct DenseGraphAnnealer {
    n: usize,
    m: usize,
    direction: OptimizeDirection,
    state: SolverState,
    rng: RandomStream,
    math: DeviceMath,
    problem: Option<Decomposition>,
    mat_q: Option<DeviceMatrix>,
    q_snap: Option<DeviceMatrix>,
    jq: Option<DeviceMatrix>,
    energies: Option<DeviceVector>,
}

impl DenseGraphAnnealer {
    pub fn new() -> Self {
        Self {
            n: 0,
            m: 0,
            direction: OptimizeDirection::Minimize,
            state: SolverState::default(),
            rng: RandomStream::new(),
            math: DeviceMath::new(),
            problem: None,
            mat_q: None,
            q_snap: None,
            jq: None,
            energies: None,
        }
    }

    pub fn seed(&mut self, seed: u64) {
        self.rng.seed(seed);
        self.state.seeded = true;
        log::debug!("seeded with {seed}");
    }

    /// Decomposes a row-major N x N coupling matrix. Any existing replica
    /// state is invalidated since the problem size may change.
    pub fn set_problem(
        &mut self,
        w: &[Real],
        n: usize,
        direction: OptimizeDirection,
    ) -> Result<(), AnnealError> {
        if n == 0 {
            return Err(DeviceError::invalid("set_problem", "problem size must be at least 1").into());
        }
        let w = DeviceMatrix::from_host(w, n, n)?;
        let dec = decompose(&self.math, &w, direction)?;
        self.problem = Some(dec);
        self.n = n;
        self.direction = direction;
        self.state.problem_set = true;
        self.state.invalidate_replicas();
        self.release_buffers();
        log::debug!("problem set: n = {n}, direction = {direction:?}");
        Ok(())
    }

    /// A changed trotter count invalidates replica state.
    pub fn set_num_trotters(&mut self, m: usize) -> Result<(), AnnealError> {
        if m == 0 {
            return Err(
                DeviceError::invalid("set_num_trotters", "trotter count must be at least 1").into(),
            );
        }
        if self.state.trotters_set && m != self.m {
            self.state.invalidate_replicas();
            self.release_buffers();
        }
        self.m = m;
        self.state.trotters_set = true;
        Ok(())
    }

    /// Allocates the replica spin matrix and sweep scratch, and sizes the
    /// random buffers to several sweeps of draws.
    pub fn init_anneal(&mut self) -> Result<(), AnnealError> {
        if let Some(missing) = self.state.missing_for_init() {
            return Err(AnnealError::NotReady { missing });
        }
        self.mat_q = Some(DeviceMatrix::zeros(self.m, self.n));
        self.q_snap = Some(DeviceMatrix::zeros(self.m, self.n));
        self.jq = Some(DeviceMatrix::zeros(self.m, self.n));
        self.energies = Some(DeviceVector::zeros(self.m));
        self.rng.reserve(self.n * self.m * RUNS_PER_REFILL);
        self.state.initialized = true;
        self.state.spins_ready = false;
        log::debug!("anneal buffers allocated: {} x {}", self.m, self.n);
        Ok(())
    }

    /// Fills every replica with independent random spins.
    pub fn randomize_q(&mut self) -> Result<(), AnnealError> {
        if let Some(missing) = self.state.missing_for_q_set() {
            return Err(AnnealError::NotReady { missing });
        }
        let draws = self.rng.next_floats(self.m * self.n)?;
        let Some(q) = self.mat_q.as_mut() else {
            return Err(AnnealError::NotReady { missing: "initialized" });
        };
        for (dst, u) in q.data.iter_mut().zip(draws) {
            *dst = if u < 0.5 { -1.0 } else { 1.0 };
        }
        self.state.spins_ready = true;
        Ok(())
    }

    /// Broadcasts one bit configuration to every replica.
    pub fn set_x(&mut self, bits: &[u8]) -> Result<(), AnnealError> {
        if let Some(missing) = self.state.missing_for_q_set() {
            return Err(AnnealError::NotReady { missing });
        }
        if bits.len() != self.n {
            return Err(DeviceError::len_mismatch("set_x", self.n, bits.len()).into());
        }
        let spins: Vec<Real> = bits
            .iter()
            .map(|&b| if b == 0 { -1.0 } else { 1.0 })
            .collect();
        let x = DeviceVector::from_host(&spins);
        let Some(q) = self.mat_q.as_mut() else {
            return Err(AnnealError::NotReady { missing: "initialized" });
        };
        self.math.scale_broadcast(q, 1.0, &x, BatchOp::Rowwise, 0.0)?;
        self.state.spins_ready = true;
        Ok(())
    }

    /// One Monte-Carlo sweep of N x P flip attempts at transverse field
    /// `g` and thermal parameter `kt`.
    ///
    /// Every flip decision is a pure function of the pre-sweep spin
    /// matrix: the effective field J q' is recomputed once in batched
    /// form, the ring-neighbor term reads the snapshot, and accepted
    /// flips assign the negated snapshot value. Draws are pulled in bulk
    /// before any state is touched, so a failing call leaves the spins
    /// untouched.
    pub fn anneal_one_step(&mut self, g: Real, kt: Real) -> Result<(), AnnealError> {
        if let Some(missing) = self.state.missing_for_anneal() {
            return Err(AnnealError::NotReady { missing });
        }
        if kt <= 0.0 {
            return Err(DeviceError::invalid("anneal_one_step", "kT must be positive").into());
        }
        if g < 0.0 {
            return Err(DeviceError::invalid(
                "anneal_one_step",
                "transverse field must be non-negative",
            )
            .into());
        }

        let draws = self.m * self.n;
        let positions = self.rng.next_positions(draws, self.n as u32)?;
        let uniforms = self.rng.next_floats(draws)?;

        let (Some(q), Some(snap), Some(jq), Some(dec)) = (
            self.mat_q.as_mut(),
            self.q_snap.as_mut(),
            self.jq.as_mut(),
            self.problem.as_ref(),
        ) else {
            return Err(AnnealError::NotReady { missing: "initialized" });
        };

        snap.copy_from(q)?;
        self.math
            .mm_product(jq, 1.0, snap, MatrixOp::None, &dec.j, MatrixOp::None, 0.0)?;

        let m = self.m;
        let two_div_m = 2.0 / m as Real;
        // ring coupling vanishes at zero transverse field (classical limit)
        let coef = if g > 0.0 {
            (g / (kt * m as Real)).tanh().ln() / kt
        } else {
            0.0
        };

        let snap_ref = &*snap;
        let jq_ref = &*jq;
        let h = &dec.h.data;

        let flips: Vec<(usize, usize, Real)> = (0..draws)
            .into_par_iter()
            .filter_map(|slot| {
                let p = slot % m;
                let x = positions[slot] as usize;
                let qyx = snap_ref.get(p, x);
                let field = h[x] + 2.0 * jq_ref.get(p, x);
                let mut de = -two_div_m * qyx * field;
                let up = if p == 0 { m - 1 } else { p - 1 };
                let down = if p == m - 1 { 0 } else { p + 1 };
                de -= qyx * (snap_ref.get(up, x) + snap_ref.get(down, x)) * coef;
                let threshold = if de < 0.0 { 1.0 } else { (-de / kt).exp() };
                (threshold > uniforms[slot]).then_some((p, x, -qyx))
            })
            .collect();

        log::trace!("sweep accepted {} of {} flip attempts", flips.len(), draws);
        for (p, x, v) in flips {
            q.set(p, x, v);
        }
        Ok(())
    }

    /// Per-replica energies E_p = q_p' J q_p + h.q_p + c, sign-adjusted
    /// to the objective under the caller's W. Spin state is untouched.
    pub fn calculate_e(&mut self) -> Result<(), AnnealError> {
        if let Some(missing) = self.state.missing_for_anneal() {
            return Err(AnnealError::NotReady { missing });
        }
        let (Some(q), Some(e), Some(dec)) = (
            self.mat_q.as_ref(),
            self.energies.as_mut(),
            self.problem.as_ref(),
        ) else {
            return Err(AnnealError::NotReady { missing: "initialized" });
        };
        self.math.batched_vmv_product(e, 1.0, q, &dec.j, q)?;
        self.math.mv_product(e, 1.0, q, MatrixOp::None, &dec.h, 1.0)?;
        self.math.scale_broadcast_scalar(e, 1.0, &dec.c, 1.0);
        if self.direction == OptimizeDirection::Maximize {
            self.math.scale_in_place(e, -1.0);
        }
        Ok(())
    }

    /// Releases replica and scratch state. The engine can be
    /// reinitialized without a fresh problem.
    pub fn fin_anneal(&mut self) -> Result<(), AnnealError> {
        if !self.state.initialized {
            return Err(AnnealError::NotReady { missing: "initialized" });
        }
        self.release_buffers();
        self.state.invalidate_replicas();
        log::debug!("anneal buffers released");
        Ok(())
    }

    /// Energies from the most recent `calculate_e`.
    pub fn get_e(&self) -> Result<Vec<Real>, AnnealError> {
        if let Some(missing) = self.state.missing_for_anneal() {
            return Err(AnnealError::NotReady { missing });
        }
        let Some(e) = self.energies.as_ref() else {
            return Err(AnnealError::NotReady { missing: "initialized" });
        };
        self.math.stream().synchronize();
        Ok(e.to_host())
    }

    /// Current replica spins, one row of ±1 per trotter.
    pub fn get_q(&self) -> Result<Vec<Vec<i8>>, AnnealError> {
        let q = self.readback_q()?;
        Ok(q
            .data
            .chunks(q.cols)
            .map(|row| row.iter().map(|&v| if v < 0.0 { -1 } else { 1 }).collect())
            .collect())
    }

    /// Current replica spins decoded to bit configurations.
    pub fn get_x(&self) -> Result<Vec<Vec<u8>>, AnnealError> {
        let q = self.readback_q()?;
        Ok(q
            .data
            .chunks(q.cols)
            .map(|row| row.iter().map(|&v| u8::from(v >= 0.0)).collect())
            .collect())
    }

    /// The cached decomposition, for inspection.
    pub fn get_hjc(&self) -> Result<(Vec<Real>, Vec<Vec<Real>>, Real), AnnealError> {
        let Some(dec) = self.problem.as_ref() else {
            return Err(AnnealError::NotReady { missing: "problem" });
        };
        self.math.stream().synchronize();
        let j = dec
            .j
            .data
            .chunks(dec.j.cols)
            .map(|row| row.to_vec())
            .collect();
        Ok((dec.h.to_host(), j, dec.c.data))
    }

    pub fn problem_size(&self) -> (usize, usize) {
        (self.n, self.m)
    }

    fn readback_q(&self) -> Result<&DeviceMatrix, AnnealError> {
        if let Some(missing) = self.state.missing_for_anneal() {
            return Err(AnnealError::NotReady { missing });
        }
        let Some(q) = self.mat_q.as_ref() else {
            return Err(AnnealError::NotReady { missing: "initialized" });
        };
        self.math.stream().synchronize();
        Ok(q)
    }

    fn release_buffers(&mut self) {
        self.mat_q = None;
        self.q_snap = None;
        self.jq = None;
        self.energies = None;
    }
}

impl Default for DenseGraphAnnealer {
    fn default() -> Self {
        Self::new()
    }
}
