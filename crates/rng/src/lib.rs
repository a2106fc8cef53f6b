use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Shake256,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RngError {
    #[error("random stream consumed before seeding")]
    NotSeeded,
}

pub const DEFAULT_BATCH: usize = 4096;

/// SHAKE-256 block generator. Same seed, same block sequence.
struct ShakeCore {
    state: [u8; 32],
    block: u64,
}

impl ShakeCore {
    fn new(seed: u64, domain: &[u8]) -> Self {
        let mut state = [0u8; 32];
        shake(&[&seed.to_be_bytes(), domain, b"SQA_INIT"], &mut state);
        Self { state, block: 0 }
    }

    fn fill_words(&mut self, out: &mut [u64]) {
        self.block += 1;

        let state = self.state;
        let block_bytes = self.block.to_be_bytes();
        let mut next_state = self.state;
        shake(&[&state, &block_bytes, b"SQA_STEP"], &mut next_state);
        self.state = next_state;

        let mut bytes = vec![0u8; out.len() * 8];
        shake(&[&self.state, b"SQA_BLOCK"], &mut bytes);
        for (w, chunk) in out.iter_mut().zip(bytes.chunks_exact(8)) {
            *w = word_from_be(chunk);
        }
    }
}

fn word_from_be(bytes: &[u8]) -> u64 {
    let mut w = 0u64;
    for &b in bytes {
        w = (w << 8) | u64::from(b);
    }
    w
}

fn shake(parts: &[&[u8]], out: &mut [u8]) {
    let mut h = Shake256::default();
    for p in parts {
        h.update(p);
    }
    let mut r = h.finalize_xof();
    r.read(out);
}

/// One pre-filled block of raw words, consumed through a cursor.
struct BulkBuffer {
    words: Vec<u64>,
    cursor: usize,
}

impl BulkBuffer {
    fn new() -> Self {
        Self {
            words: Vec::new(),
            cursor: 0,
        }
    }

    fn clear(&mut self) {
        self.words.clear();
        self.cursor = 0;
    }

    /// Refills are always exactly `batch` words, so the word sequence
    /// depends only on the batch size and the total number of draws,
    /// never on how the draws are split across calls.
    fn take(&mut self, core: &mut ShakeCore, count: usize, batch: usize) -> Vec<u64> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            if self.cursor == self.words.len() {
                self.words.resize(batch, 0);
                core.fill_words(&mut self.words);
                self.cursor = 0;
            }
            let take = (count - out.len()).min(self.words.len() - self.cursor);
            out.extend_from_slice(&self.words[self.cursor..self.cursor + take]);
            self.cursor += take;
        }
        out
    }
}

/// Buffered deterministic stream of uniform draws and flip positions.
///
/// The two draw purposes run on independent, domain-separated generators
/// so position draws never perturb acceptance draws.
pub struct RandomStream {
    reals: Option<ShakeCore>,
    positions: Option<ShakeCore>,
    real_buf: BulkBuffer,
    pos_buf: BulkBuffer,
    batch: usize,
}

impl RandomStream {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_BATCH)
    }

    pub fn with_batch_size(batch: usize) -> Self {
        Self {
            reals: None,
            positions: None,
            real_buf: BulkBuffer::new(),
            pos_buf: BulkBuffer::new(),
            batch: batch.max(1),
        }
    }

    /// Resets both generators. Same seed, same future sequences.
    pub fn seed(&mut self, seed: u64) {
        self.reals = Some(ShakeCore::new(seed, b"REAL"));
        self.positions = Some(ShakeCore::new(seed, b"FLIP"));
        self.real_buf.clear();
        self.pos_buf.clear();
    }

    /// Sets the bulk refill granularity. Buffered values stay valid.
    pub fn reserve(&mut self, batch: usize) {
        self.batch = batch.max(1);
    }

    pub fn next_floats(&mut self, count: usize) -> Result<Vec<f64>, RngError> {
        let core = self.reals.as_mut().ok_or(RngError::NotSeeded)?;
        let words = self.real_buf.take(core, count, self.batch);
        Ok(words
            .into_iter()
            .map(|w| w as f64 / u64::MAX as f64)
            .collect())
    }

    /// Uniform positions in `[0, upper)`, scaled from raw words.
    pub fn next_positions(&mut self, count: usize, upper: u32) -> Result<Vec<u32>, RngError> {
        let core = self.positions.as_mut().ok_or(RngError::NotSeeded)?;
        let words = self.pos_buf.take(core, count, self.batch);
        Ok(words
            .into_iter()
            .map(|w| (((w >> 32) * u64::from(upper)) >> 32) as u32)
            .collect())
    }
}

impl Default for RandomStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{RandomStream, RngError};

    #[test]
    fn unseeded_stream_fails() {
        let mut rs = RandomStream::new();
        assert_eq!(rs.next_floats(1), Err(RngError::NotSeeded));
        assert_eq!(rs.next_positions(1, 10), Err(RngError::NotSeeded));
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = RandomStream::new();
        let mut b = RandomStream::new();
        a.seed(7);
        b.seed(7);
        assert_eq!(a.next_floats(100).unwrap(), b.next_floats(100).unwrap());
        assert_eq!(
            a.next_positions(100, 31).unwrap(),
            b.next_positions(100, 31).unwrap()
        );
    }

    #[test]
    fn reseed_restarts_sequence() {
        let mut rs = RandomStream::new();
        rs.seed(3);
        let first = rs.next_floats(16).unwrap();
        rs.seed(3);
        assert_eq!(first, rs.next_floats(16).unwrap());
    }

    #[test]
    fn split_draws_match_bulk_draw() {
        let mut bulk = RandomStream::with_batch_size(8);
        let mut split = RandomStream::with_batch_size(8);
        bulk.seed(11);
        split.seed(11);

        let all = bulk.next_floats(20).unwrap();
        let mut parts = split.next_floats(7).unwrap();
        parts.extend(split.next_floats(5).unwrap());
        parts.extend(split.next_floats(8).unwrap());
        assert_eq!(all, parts);
    }

    #[test]
    fn purposes_are_independent() {
        let mut a = RandomStream::new();
        let mut b = RandomStream::new();
        a.seed(5);
        b.seed(5);

        a.next_floats(200).unwrap();
        assert_eq!(
            a.next_positions(32, 100).unwrap(),
            b.next_positions(32, 100).unwrap()
        );
    }

    #[test]
    fn draws_are_in_range() {
        let mut rs = RandomStream::new();
        rs.seed(9);
        for u in rs.next_floats(1000).unwrap() {
            assert!((0.0..=1.0).contains(&u));
        }
        for p in rs.next_positions(1000, 17).unwrap() {
            assert!(p < 17);
        }
    }
}
