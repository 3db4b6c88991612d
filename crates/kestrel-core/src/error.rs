use thiserror::Error;

use crate::mem::Access;
use crate::regs::RegId;

/// Closed error taxonomy for the engine's host-facing surface.
///
/// Configuration and map/register misuse are reported synchronously at the
/// offending call and are never partially applied. Runtime faults surface
/// through [`CoreError::Fault`] when no fault hook resolves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CoreError {
    /// Architecture/mode combination rejected at engine construction.
    #[error("invalid engine configuration: {0}")]
    Configuration(&'static str),
    /// New region intersects an existing mapping.
    #[error("region [{base:#x}, +{size:#x}) overlaps an existing mapping")]
    Overlap {
        /// Requested region base address.
        base: u64,
        /// Requested region size in bytes.
        size: u64,
    },
    /// Base or size violates the page-granularity contract.
    #[error("base {base:#x} or size {size:#x} violates page granularity")]
    Alignment {
        /// Requested region base address.
        base: u64,
        /// Requested region size in bytes.
        size: u64,
    },
    /// Unmap/protect range is not exactly covered by mapped regions.
    #[error("range [{base:#x}, +{size:#x}) is not exactly covered by mapped regions")]
    NotMapped {
        /// Requested range base address.
        base: u64,
        /// Requested range size in bytes.
        size: u64,
    },
    /// Bulk access touched a byte outside every mapped region.
    #[error("address {addr:#x} is not mapped")]
    Unmapped {
        /// First unmapped address in the rejected range.
        addr: u64,
    },
    /// Bulk access lacked the permission the region demands.
    #[error("{access} access at {addr:#x} denied by region permissions")]
    Protection {
        /// First denied address in the rejected range.
        addr: u64,
        /// Access intent that was denied.
        access: Access,
    },
    /// Register identifier is not defined by the active architecture.
    #[error("register {0:?} is not defined by the active architecture")]
    InvalidRegister(RegId),
    /// Execution faulted and no hook resolved the fault.
    #[error("execution faulted: {0}")]
    Fault(FaultReason),
    /// The decode/execute adapter violated its contract.
    #[error("adapter contract violation: {0}")]
    Internal(&'static str),
}

/// Runtime fault record retained for forensic inspection after a faulted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultReason {
    /// Emulated access touched unmapped memory or violated permissions.
    #[error("{access} fault at {addr:#x}")]
    MemoryFault {
        /// Faulting emulated address.
        addr: u64,
        /// Access intent that faulted.
        access: Access,
    },
    /// The adapter rejected the instruction encoding at `pc`.
    #[error("invalid instruction at {pc:#x}")]
    InvalidInstruction {
        /// Program counter of the rejected instruction.
        pc: u64,
    },
}
