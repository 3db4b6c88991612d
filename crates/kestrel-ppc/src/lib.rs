//! PowerPC-32 adapter crate for the Kestrel engine.
//!
//! Implements the fixed-point subset of the 32-bit PowerPC ISA as a
//! [`kestrel_core::Cpu`] strategy: D-form arithmetic and logic, word/byte
//! loads and stores, the branch family (`b`/`bc`/`bclr`/`bcctr`), compares,
//! `sc`, and `mfspr`/`mtspr` for `lr`/`ctr`/`xer`. Both byte orders are
//! supported at construction.

/// Executor wiring the decoded subset to the engine's bus contract.
pub mod cpu;
pub use cpu::Ppc32;

/// Instruction decoder for the supported PowerPC-32 subset.
pub mod decode;
pub use decode::{decode, Insn};

/// Register identifiers for the PowerPC-32 adapter.
pub mod reg;

#[cfg(test)]
use proptest as _;
