//! Container selection under a size ceiling.

use crate::provider::MAX_CONTAINERS;
use resvault_common::{Error, Result};

/// Where the next file goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Append to the container currently being filled.
    Current(u32),
    /// Start a new container; the caller creates it before appending.
    Fresh(u32),
}

impl Slot {
    /// Target container id.
    pub fn data_id(self) -> u32 {
        match self {
            Slot::Current(id) | Slot::Fresh(id) => id,
        }
    }
}

/// Tracks the container being filled and decides when to roll over.
///
/// A file goes into the current container unless the container already
/// holds something and adding the file would take it past the ceiling.
/// Files are never split, so a file larger than the ceiling gets a
/// container to itself.
#[derive(Debug, Clone)]
pub struct Placement {
    ceiling: u64,
    current: Option<(u32, u64)>,
}

impl Placement {
    /// Start with no container open.
    pub fn new(ceiling: u64) -> Self {
        Self {
            ceiling,
            current: None,
        }
    }

    /// Continue filling an existing container.
    pub fn resume(ceiling: u64, data_id: u32, used: u64) -> Self {
        Self {
            ceiling,
            current: Some((data_id, used)),
        }
    }

    /// Container being filled and its byte count.
    pub fn current(&self) -> Option<(u32, u64)> {
        self.current
    }

    /// Choose a slot for a file of `len` bytes without recording it.
    ///
    /// # Errors
    /// - `InvalidInput` if a new container would exceed the container limit
    pub fn plan(&self, len: u64) -> Result<Slot> {
        match self.current {
            None => Ok(Slot::Fresh(0)),
            Some((id, used)) if used == 0 || used.saturating_add(len) <= self.ceiling => {
                Ok(Slot::Current(id))
            }
            Some((id, _)) => {
                let next = id + 1;
                if next >= MAX_CONTAINERS {
                    return Err(Error::InvalidInput(format!(
                        "Cannot place {} bytes: all {} containers are full",
                        len, MAX_CONTAINERS
                    )));
                }
                Ok(Slot::Fresh(next))
            }
        }
    }

    /// Record that `len` bytes were written into `slot`.
    pub fn commit(&mut self, slot: Slot, len: u64) {
        self.current = match (slot, self.current) {
            (Slot::Current(id), Some((cur, used))) if id == cur => Some((id, used + len)),
            (slot, _) => Some((slot.data_id(), len)),
        };
    }
}
