//! Per-architecture register file with copy-in/copy-out access.

use crate::error::CoreError;

/// Architecture register identifier.
///
/// Identifiers index into the layout published by the active adapter's
/// descriptor; the set of valid identifiers is closed and finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegId(pub u16);

/// Register storage for the active architecture.
///
/// Values are exchanged by copy as `u64`; adapters mask to the architectural
/// width. No accessor hands out a reference into the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    values: Box<[u64]>,
}

impl RegisterFile {
    /// Allocates a zeroed file for `count` registers.
    #[must_use]
    pub fn new(count: u16) -> Self {
        Self {
            values: vec![0; usize::from(count)].into_boxed_slice(),
        }
    }

    /// Number of registers defined by the active architecture.
    #[must_use]
    pub fn len(&self) -> u16 {
        u16::try_from(self.values.len()).unwrap_or(u16::MAX)
    }

    /// Returns `true` when the architecture defines no registers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads a register value by copy.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRegister`] for identifiers outside the
    /// active architecture's closed set.
    pub fn read(&self, id: RegId) -> Result<u64, CoreError> {
        self.values
            .get(usize::from(id.0))
            .copied()
            .ok_or(CoreError::InvalidRegister(id))
    }

    /// Writes a register value by copy.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRegister`] for identifiers outside the
    /// active architecture's closed set; the file is unchanged on failure.
    pub fn write(&mut self, id: RegId, value: u64) -> Result<(), CoreError> {
        match self.values.get_mut(usize::from(id.0)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CoreError::InvalidRegister(id)),
        }
    }

    /// Resets every register to zero.
    pub fn clear(&mut self) {
        self.values.fill(0);
    }

    // Engine-internal accessors for identifiers validated at construction.
    // Out-of-range identifiers read as zero and ignore writes.
    pub(crate) fn get(&self, id: RegId) -> u64 {
        self.values.get(usize::from(id.0)).copied().unwrap_or(0)
    }

    pub(crate) fn set(&mut self, id: RegId, value: u64) {
        if let Some(slot) = self.values.get_mut(usize::from(id.0)) {
            *slot = value;
        }
    }
}
