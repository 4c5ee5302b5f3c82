//! Index-addressed table of open-file handles with deferred-delete support.

use crate::error::{FsError, Result};

pub struct OpenFile {
    pub descriptor: usize,
    pub offset: usize,
}

/// Freed slots are reused before the table grows (section 4.8/4.9).
pub struct OpenFileTable {
    slots: Vec<Option<OpenFile>>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        OpenFileTable { slots: Vec::new() }
    }

    pub fn open(&mut self, descriptor: usize) -> usize {
        if let Some(pos) = self.slots.iter().position(Option::is_none) {
            self.slots[pos] = Some(OpenFile { descriptor, offset: 0 });
            pos
        } else {
            self.slots.push(Some(OpenFile { descriptor, offset: 0 }));
            self.slots.len() - 1
        }
    }

    pub fn close(&mut self, fd: usize) -> Result<OpenFile> {
        self.slots
            .get_mut(fd)
            .ok_or(FsError::BadHandle(fd))?
            .take()
            .ok_or(FsError::BadHandle(fd))
    }

    pub fn get(&self, fd: usize) -> Result<&OpenFile> {
        self.slots
            .get(fd)
            .and_then(|slot| slot.as_ref())
            .ok_or(FsError::BadHandle(fd))
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(|slot| slot.as_mut())
            .ok_or(FsError::BadHandle(fd))
    }

    /// How many open handles currently target `descriptor` — used by `close`
    /// to decide whether a deferred unlink can finally free the descriptor.
    pub fn references(&self, descriptor: usize) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Some(o) if o.descriptor == descriptor))
            .count()
    }
}
