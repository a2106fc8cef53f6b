use crate::Real;
use std::cell::RefCell;
use std::mem;
use std::ops::{Deref, DerefMut};

/// Recycling allocator for call-scoped temporaries. Buffers return to the
/// pool when their guard drops, on every exit path.
pub struct ScratchPool {
    free: RefCell<Vec<Vec<Real>>>,
}

impl ScratchPool {
    pub fn new() -> Self {
        Self {
            free: RefCell::new(Vec::new()),
        }
    }

    pub fn acquire(&self, len: usize) -> ScratchBuf<'_> {
        let mut data = self.free.borrow_mut().pop().unwrap_or_default();
        data.clear();
        data.resize(len, 0.0);
        ScratchBuf { data, pool: self }
    }

    pub fn idle_buffers(&self) -> usize {
        self.free.borrow().len()
    }
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScratchBuf<'a> {
    data: Vec<Real>,
    pool: &'a ScratchPool,
}

impl Deref for ScratchBuf<'_> {
    type Target = [Real];

    fn deref(&self) -> &[Real] {
        &self.data
    }
}

impl DerefMut for ScratchBuf<'_> {
    fn deref_mut(&mut self) -> &mut [Real] {
        &mut self.data
    }
}

impl Drop for ScratchBuf<'_> {
    fn drop(&mut self) {
        self.pool.free.borrow_mut().push(mem::take(&mut self.data));
    }
}

#[cfg(test)]
mod tests {
    use super::ScratchPool;

    #[test]
    fn buffers_return_to_pool_on_drop() {
        let pool = ScratchPool::new();
        {
            let a = pool.acquire(16);
            let b = pool.acquire(8);
            assert_eq!(a.len(), 16);
            assert_eq!(b.len(), 8);
            assert_eq!(pool.idle_buffers(), 0);
        }
        assert_eq!(pool.idle_buffers(), 2);

        let c = pool.acquire(4);
        assert_eq!(c.len(), 4);
        assert!(c.iter().all(|&v| v == 0.0));
        assert_eq!(pool.idle_buffers(), 1);
    }
}
