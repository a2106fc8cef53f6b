use std::cell::Cell;

/// Execution stream. Operations run in submission order; results become
/// observable to the host once `synchronize` returns.
pub struct DeviceStream {
    enqueued: Cell<u64>,
    completed: Cell<u64>,
}

impl DeviceStream {
    pub fn new() -> Self {
        Self {
            enqueued: Cell::new(0),
            completed: Cell::new(0),
        }
    }

    pub fn enqueue(&self, op: &'static str) {
        self.enqueued.set(self.enqueued.get() + 1);
        log::trace!("enqueue {op} (#{})", self.enqueued.get());
    }

    /// Blocks until every submitted operation has completed. On this
    /// backend submission is execution, so this only settles the counters.
    pub fn synchronize(&self) {
        self.completed.set(self.enqueued.get());
    }

    pub fn pending(&self) -> u64 {
        self.enqueued.get() - self.completed.get()
    }
}

impl Default for DeviceStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::DeviceStream;

    #[test]
    fn synchronize_drains_pending() {
        let s = DeviceStream::new();
        s.enqueue("a");
        s.enqueue("b");
        assert_eq!(s.pending(), 2);
        s.synchronize();
        assert_eq!(s.pending(), 0);
    }
}
