/// Hook invoked when an object is returned to its pool, clearing whatever the
/// previous user left behind.
pub trait Reset {
    fn reset(&mut self);
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Free-list pool for hot, frequently recycled objects. `acquire` hands out a
/// reset instance, `release` takes it back; the outstanding count is tracked
/// so unbalanced usage trips in debug builds.
pub struct Pool<T> {
    free: Vec<T>,
    outstanding: usize,
}

impl<T: Default + Reset> Pool<T> {
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            outstanding: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut free = Vec::with_capacity(capacity);
        free.resize_with(capacity, T::default);
        Self {
            free,
            outstanding: 0,
        }
    }

    pub fn acquire(&mut self) -> T {
        self.outstanding += 1;
        self.free.pop().unwrap_or_default()
    }

    pub fn release(&mut self, mut value: T) {
        debug_assert!(self.outstanding > 0, "released more objects than acquired");
        value.reset();
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free.push(value);
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl<T: Default + Reset> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_buffers_come_back_reset() {
        let mut pool: Pool<Vec<u8>> = Pool::new();

        let mut buf = pool.acquire();
        buf.extend_from_slice(b"datagram");
        pool.release(buf);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 8);
    }

    #[test]
    fn outstanding_accounting() {
        let mut pool: Pool<Vec<u8>> = Pool::with_capacity(2);
        assert_eq!(pool.idle(), 2);

        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        assert_eq!(pool.outstanding(), 3);

        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.idle(), 3);
    }
}
