//! Message tag allocation for locally originated requests.
//!
//! A tag (0..=7) is held per destination EID from the moment a request
//! goes out until its response arrives or the tag times out. Tags rotate
//! so a late response is unlikely to match a fresh request.

use super::eid::Eid;
use crate::error::AssemblyError;

const TAG_COUNT: u8 = 8;

#[derive(Debug, Clone, Copy)]
struct Held {
    dest: Eid,
    tag: u8,
    since_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TagAllocator {
    held: Vec<Held>,
    next: u8,
    timeout_ms: u64,
}

impl TagAllocator {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            held: Vec::new(),
            next: 0,
            timeout_ms,
        }
    }

    pub fn allocate(&mut self, dest: Eid, now_ms: u64) -> Result<u8, AssemblyError> {
        let tag = (0..TAG_COUNT)
            .map(|i| (self.next + i) % TAG_COUNT)
            .find(|&t| !self.is_held(dest, t))
            .ok_or(AssemblyError::NoFreeTag)?;
        self.held.push(Held {
            dest,
            tag,
            since_ms: now_ms,
        });
        self.next = (tag + 1) % TAG_COUNT;
        Ok(tag)
    }

    /// Release a tag. Returns `false` if it was not held.
    pub fn release(&mut self, dest: Eid, tag: u8) -> bool {
        match self.held.iter().position(|h| h.dest == dest && h.tag == tag) {
            Some(i) => {
                self.held.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn is_held(&self, dest: Eid, tag: u8) -> bool {
        self.held.iter().any(|h| h.dest == dest && h.tag == tag)
    }

    pub fn expire(&mut self, now_ms: u64) -> usize {
        let before = self.held.len();
        let timeout = self.timeout_ms;
        self.held
            .retain(|h| now_ms.saturating_sub(h.since_ms) < timeout);
        before - self.held.len()
    }

    pub fn outstanding(&self, dest: Eid) -> usize {
        self.held.iter().filter(|h| h.dest == dest).count()
    }
}
