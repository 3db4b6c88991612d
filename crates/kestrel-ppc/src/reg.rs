//! Register identifiers for the PowerPC-32 adapter.

use kestrel_core::RegId;

/// Number of registers the adapter declares (`r0..r31` plus specials).
pub const REGISTER_COUNT: u16 = 37;

/// Program counter.
pub const PC: RegId = RegId(32);
/// Link register.
pub const LR: RegId = RegId(33);
/// Count register.
pub const CTR: RegId = RegId(34);
/// Condition register.
pub const CR: RegId = RegId(35);
/// Fixed-point exception register.
pub const XER: RegId = RegId(36);

/// Returns the identifier of general-purpose register `index` (`0..=31`).
///
/// # Panics
///
/// Panics when `index` is outside the general-purpose register set.
#[must_use]
pub const fn gpr(index: u8) -> RegId {
    assert!(index < 32, "general-purpose registers are r0..r31");
    RegId(index as u16)
}
