//! Endpoint IDs and the bus owner's dynamic EID pool.
//!
//! ```text
//!   0        NULL (physical addressing, unassigned endpoint)
//!   1..=7    reserved
//!   8..=254  assignable
//!   255      broadcast
//! ```

use core::fmt;
use core::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::EidError;

/// An MCTP endpoint ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Eid(pub u8);

impl Eid {
    pub const NULL: Eid = Eid(0);
    pub const BROADCAST: Eid = Eid(0xFF);
    pub const MIN_ASSIGNABLE: u8 = 8;
    pub const MAX_ASSIGNABLE: u8 = 254;

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn is_broadcast(self) -> bool {
        self.0 == 0xFF
    }

    pub const fn is_reserved(self) -> bool {
        self.0 >= 1 && self.0 <= 7
    }

    /// Whether a bus owner may hand this EID to an endpoint.
    pub const fn is_assignable(self) -> bool {
        self.0 >= Self::MIN_ASSIGNABLE && self.0 <= Self::MAX_ASSIGNABLE
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for Eid {
    fn from(v: u8) -> Self {
        Eid(v)
    }
}

/// Bitset-backed allocator over the configured dynamic range.
#[derive(Debug, Clone)]
pub struct EidPool {
    start: u8,
    end: u8,
    max_pool_size: u8,
    used: [u64; 4],
}

impl EidPool {
    pub fn new(range: RangeInclusive<u8>, max_pool_size: u8) -> Result<Self, EidError> {
        let (start, end) = (*range.start(), *range.end());
        if start > end || !Eid(start).is_assignable() || !Eid(end).is_assignable() {
            return Err(EidError::InvalidRange);
        }
        Ok(Self {
            start,
            end,
            max_pool_size: max_pool_size.max(1),
            used: [0; 4],
        })
    }

    /// Hand out the lowest free EID.
    pub fn allocate(&mut self) -> Result<Eid, EidError> {
        let eid = (self.start..=self.end)
            .find(|&e| !self.bit(e))
            .ok_or(EidError::PoolExhausted)?;
        self.set_bit(eid, true);
        Ok(Eid(eid))
    }

    /// Reserve `count` contiguous EIDs for a bridge and return the first.
    pub fn allocate_block(&mut self, count: u8) -> Result<Eid, EidError> {
        if count == 0 || count > self.max_pool_size {
            return Err(EidError::PoolTooLarge(count));
        }
        let mut run_start = self.start;
        let mut run_len = 0u8;
        for e in self.start..=self.end {
            if self.bit(e) {
                run_len = 0;
                continue;
            }
            if run_len == 0 {
                run_start = e;
            }
            run_len += 1;
            if run_len == count {
                for taken in run_start..=e {
                    self.set_bit(taken, true);
                }
                return Ok(Eid(run_start));
            }
        }
        Err(EidError::PoolExhausted)
    }

    /// Mark a specific EID as used.
    pub fn reserve(&mut self, eid: Eid) -> Result<(), EidError> {
        self.check_range(eid)?;
        if self.bit(eid.0) {
            return Err(EidError::AlreadyAllocated(eid.0));
        }
        self.set_bit(eid.0, true);
        Ok(())
    }

    pub fn release(&mut self, eid: Eid) -> Result<(), EidError> {
        self.check_range(eid)?;
        if !self.bit(eid.0) {
            return Err(EidError::NotAllocated(eid.0));
        }
        self.set_bit(eid.0, false);
        Ok(())
    }

    pub fn is_allocated(&self, eid: Eid) -> bool {
        self.contains(eid) && self.bit(eid.0)
    }

    pub fn contains(&self, eid: Eid) -> bool {
        eid.0 >= self.start && eid.0 <= self.end
    }

    /// Number of free EIDs.
    pub fn available(&self) -> usize {
        (self.start..=self.end).filter(|&e| !self.bit(e)).count()
    }

    /// Total EIDs in range.
    pub fn capacity(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn max_pool_size(&self) -> u8 {
        self.max_pool_size
    }

    fn check_range(&self, eid: Eid) -> Result<(), EidError> {
        if self.contains(eid) {
            Ok(())
        } else {
            Err(EidError::OutOfRange(eid.0))
        }
    }

    fn bit(&self, e: u8) -> bool {
        self.used[usize::from(e / 64)] & (1 << (e % 64)) != 0
    }

    fn set_bit(&mut self, e: u8, on: bool) {
        let word = &mut self.used[usize::from(e / 64)];
        if on {
            *word |= 1 << (e % 64);
        } else {
            *word &= !(1 << (e % 64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eid_classes() {
        assert!(Eid::NULL.is_null());
        assert!(Eid::BROADCAST.is_broadcast());
        assert!(Eid(3).is_reserved());
        assert!(!Eid(3).is_assignable());
        assert!(Eid(8).is_assignable());
        assert!(Eid(254).is_assignable());
        assert!(!Eid(255).is_assignable());
    }

    #[test]
    fn rejects_bad_ranges() {
        assert_eq!(EidPool::new(0..=20, 4).unwrap_err(), EidError::InvalidRange);
        assert_eq!(EidPool::new(8..=255, 4).unwrap_err(), EidError::InvalidRange);
        #[allow(clippy::reversed_empty_ranges)]
        let reversed = 20..=10;
        assert_eq!(EidPool::new(reversed, 4).unwrap_err(), EidError::InvalidRange);
    }

    #[test]
    fn allocates_lowest_first_and_exhausts() {
        let mut pool = EidPool::new(8..=10, 4).unwrap();
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.allocate().unwrap(), Eid(8));
        assert_eq!(pool.allocate().unwrap(), Eid(9));
        assert_eq!(pool.allocate().unwrap(), Eid(10));
        assert_eq!(pool.allocate().unwrap_err(), EidError::PoolExhausted);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn release_makes_eid_reusable() {
        let mut pool = EidPool::new(8..=10, 4).unwrap();
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        pool.release(a).unwrap();
        assert!(!pool.is_allocated(a));
        assert_eq!(pool.allocate().unwrap(), a);
        assert_eq!(pool.release(Eid(10)).unwrap_err(), EidError::NotAllocated(10));
        assert_eq!(pool.release(Eid(50)).unwrap_err(), EidError::OutOfRange(50));
    }

    #[test]
    fn reserve_blocks_allocation() {
        let mut pool = EidPool::new(8..=9, 4).unwrap();
        pool.reserve(Eid(8)).unwrap();
        assert_eq!(pool.reserve(Eid(8)).unwrap_err(), EidError::AlreadyAllocated(8));
        assert_eq!(pool.allocate().unwrap(), Eid(9));
    }

    #[test]
    fn block_allocation_skips_fragmented_runs() {
        let mut pool = EidPool::new(8..=20, 4).unwrap();
        pool.reserve(Eid(10)).unwrap();
        // 8,9 free but too short for 3.
        assert_eq!(pool.allocate_block(3).unwrap(), Eid(11));
        assert!(pool.is_allocated(Eid(13)));
        assert!(!pool.is_allocated(Eid(14)));
        assert_eq!(pool.allocate_block(5).unwrap_err(), EidError::PoolTooLarge(5));
        assert_eq!(pool.allocate_block(0).unwrap_err(), EidError::PoolTooLarge(0));
    }

    #[test]
    fn full_assignable_range() {
        let mut pool = EidPool::new(8..=254, 15).unwrap();
        assert_eq!(pool.capacity(), 247);
        for _ in 0..247 {
            pool.allocate().unwrap();
        }
        assert_eq!(pool.allocate().unwrap_err(), EidError::PoolExhausted);
        assert!(pool.is_allocated(Eid(254)));
    }
}
