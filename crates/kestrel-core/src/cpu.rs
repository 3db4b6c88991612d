//! Decode/execute adapter contract between the engine and an architecture.
//!
//! The engine treats instruction semantics as a pluggable strategy: one
//! adapter per architecture implements [`Cpu`] against the shared memory and
//! register contracts, and the engine drives it one instruction at a time.

use crate::mem::Access;
use crate::regs::RegId;

/// Byte order for instruction fetch and data operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Endian {
    /// Most significant byte first.
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

/// Static description of an adapter's register architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchDescriptor {
    /// Human-readable architecture label.
    pub name: &'static str,
    /// Size of the closed register-identifier set.
    pub register_count: u16,
    /// Identifier of the program counter register.
    pub pc: RegId,
    /// Byte order the adapter decodes and accesses memory with.
    pub endian: Endian,
    /// Upper bound on encoded instruction length, used to size fetch windows.
    pub max_insn_len: u32,
}

/// Control-flow classification of one decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InsnClass {
    /// Falls through to the next sequential instruction.
    Sequential,
    /// Transfers control without linkage.
    Branch,
    /// Transfers control and records a return address.
    Call,
    /// Returns to a previously recorded address.
    Return,
    /// Raises a software interrupt with the given number.
    Trap(u32),
}

impl InsnClass {
    /// Returns `true` when this instruction ends a basic block.
    #[must_use]
    pub const fn ends_block(self) -> bool {
        !matches!(self, Self::Sequential)
    }
}

/// Decode-only result from probing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsnInfo {
    /// Encoded instruction length in bytes.
    pub len: u32,
    /// Control-flow classification.
    pub class: InsnClass,
}

/// Side-effect summary from executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    /// Encoded instruction length in bytes.
    pub len: u32,
    /// Program counter after this instruction's semantics.
    pub next_pc: u64,
    /// Control-flow classification.
    pub class: InsnClass,
}

/// Memory fault raised by a [`Bus`] access on behalf of the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemFault {
    /// Faulting emulated address.
    pub addr: u64,
    /// Access intent that faulted.
    pub access: Access,
}

/// Failure modes an adapter can report from [`Cpu::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecFault {
    /// The byte window does not encode a valid instruction.
    InvalidInstruction,
    /// A guest memory access faulted; forwarded from the [`Bus`].
    Memory(MemFault),
    /// The adapter detected an internal contract violation.
    Internal(&'static str),
}

impl From<MemFault> for ExecFault {
    fn from(fault: MemFault) -> Self {
        Self::Memory(fault)
    }
}

/// Engine-provided view the adapter executes against.
///
/// Memory operations are permission-checked and dispatch the registered
/// memory hooks; register operations exchange values by copy. Identifiers
/// outside the adapter's own descriptor read as zero and ignore writes --
/// an adapter addressing registers it did not declare is in violation of
/// its contract.
pub trait Bus {
    /// Reads guest memory into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`MemFault`] when any byte of the span is unmapped or not
    /// readable; the buffer is untouched on failure.
    fn load(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), MemFault>;

    /// Writes `bytes` to guest memory.
    ///
    /// # Errors
    ///
    /// Returns [`MemFault`] when any byte of the span is unmapped or not
    /// writable; no byte is written on failure.
    fn store(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemFault>;

    /// Reads a register declared by the adapter's descriptor.
    fn reg(&self, id: RegId) -> u64;

    /// Writes a register declared by the adapter's descriptor.
    fn set_reg(&mut self, id: RegId, value: u64);
}

/// One architecture's decode+execute strategy.
///
/// Adapters must treat the supplied byte window as untrusted input and must
/// not read past the instruction length they report. An instruction that
/// faults part-way must leave register state unmodified: perform memory
/// accesses before register writeback so a fault-hook retry of the whole
/// instruction cannot double-apply side effects.
pub trait Cpu {
    /// Returns the adapter's static architecture description.
    fn descriptor(&self) -> ArchDescriptor;

    /// Classifies the instruction at `pc` without executing it.
    ///
    /// Returns `None` when the window does not decode; used by the engine
    /// for code-hook sizing and basic-block discovery.
    fn probe(&self, window: &[u8], pc: u64) -> Option<InsnInfo>;

    /// Decodes and executes one instruction at `pc`.
    ///
    /// The adapter reads and writes registers and guest memory through
    /// `bus` and reports the resulting control flow.
    ///
    /// # Errors
    ///
    /// Returns [`ExecFault::InvalidInstruction`] for undecodable windows,
    /// [`ExecFault::Memory`] for forwarded guest memory faults, and
    /// [`ExecFault::Internal`] for adapter-side contract violations.
    fn execute(&self, bus: &mut dyn Bus, window: &[u8], pc: u64) -> Result<Executed, ExecFault>;
}
