use super::error::{GtpError, Result};
use dashmap::DashSet;
use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out TEIDs from `[base, max)` round-robin, skipping values still in use.
#[derive(Debug)]
pub struct TeidPool {
    counter: AtomicU32,
    base: u32,
    max: u32,
    in_use: DashSet<u32>,
}

impl TeidPool {
    pub fn new() -> Self {
        Self {
            counter: AtomicU32::new(1),
            base: 1,
            max: u32::MAX,
            in_use: DashSet::new(),
        }
    }

    pub fn with_range(base: u32, max: u32) -> Result<Self> {
        if base == 0 {
            return Err(GtpError::malformed("TEID base must be greater than 0"));
        }
        if base >= max {
            return Err(GtpError::malformed("TEID base must be less than max"));
        }
        Ok(Self {
            counter: AtomicU32::new(base),
            base,
            max,
            in_use: DashSet::new(),
        })
    }

    fn next_candidate(&self) -> u32 {
        let (base, max) = (self.base, self.max);
        match self.counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
            Some(if cur + 1 >= max { base } else { cur + 1 })
        }) {
            Ok(prev) | Err(prev) => prev,
        }
    }

    pub fn allocate(&self) -> Result<u32> {
        let span = u64::from(self.max - self.base);
        for _ in 0..span {
            let teid = self.next_candidate();
            if self.in_use.insert(teid) {
                return Ok(teid);
            }
        }
        Err(GtpError::TeidExhausted)
    }

    pub fn release(&self, teid: u32) {
        self.in_use.remove(&teid);
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }
}

impl Default for TeidPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teid_pool_allocation() {
        let pool = TeidPool::new();
        assert_eq!(pool.allocate().unwrap(), 1);
        assert_eq!(pool.allocate().unwrap(), 2);
        assert_eq!(pool.allocate().unwrap(), 3);
        assert_eq!(pool.in_use(), 3);
    }

    #[test]
    fn test_teid_pool_custom_range() {
        let pool = TeidPool::with_range(1000, 2000).unwrap();
        assert_eq!(pool.allocate().unwrap(), 1000);
        assert_eq!(pool.allocate().unwrap(), 1001);

        assert!(TeidPool::with_range(0, 10).is_err());
        assert!(TeidPool::with_range(10, 10).is_err());
    }

    #[test]
    fn test_teid_pool_wrap_skips_live() {
        let pool = TeidPool::with_range(1, 5).unwrap();
        let teids: Vec<u32> = (0..4).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(teids, vec![1, 2, 3, 4]);

        pool.release(3);
        assert_eq!(pool.allocate().unwrap(), 3);
    }

    #[test]
    fn test_teid_pool_exhausted() {
        let pool = TeidPool::with_range(1, 3).unwrap();
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        assert!(matches!(pool.allocate(), Err(GtpError::TeidExhausted)));

        pool.release(1);
        assert_eq!(pool.allocate().unwrap(), 1);
    }
}
