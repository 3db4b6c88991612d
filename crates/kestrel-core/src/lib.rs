//! Core emulation engine crate for Kestrel.
//!
//! One [`Engine`] instance owns a permission-checked [`MemoryMap`], a
//! per-architecture [`RegisterFile`], and an ordered hook registry, and
//! drives a pluggable decode/execute adapter ([`Cpu`]) one instruction at a
//! time. Hooks observe and steer execution from defined points in the loop.

/// Emulated address space: permission-tagged regions and the dynamic map.
pub mod mem;
pub use mem::{page_aligned, Access, MemoryMap, Prot, RegionInfo, PAGE_SIZE};

/// Per-architecture register file with copy-in/copy-out access.
pub mod regs;
pub use regs::{RegId, RegisterFile};

/// Decode/execute adapter contract between the engine and an architecture.
pub mod cpu;
pub use cpu::{ArchDescriptor, Bus, Cpu, Endian, ExecFault, Executed, InsnClass, InsnInfo, MemFault};

/// Ordered observer registry dispatched from the execution loop.
pub mod hooks;
pub use hooks::{FaultAction, HookId, HookKind, WriteAction};

/// Closed error taxonomy for the engine's host-facing surface.
pub mod error;
pub use error::{CoreError, FaultReason};

/// Engine lifecycle and the per-step execution loop.
pub mod engine;
pub use engine::{Engine, RunExit, RunLimits, StopReason};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
