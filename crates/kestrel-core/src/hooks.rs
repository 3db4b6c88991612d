//! Ordered observer registry dispatched from the execution loop.
//!
//! Callbacks are closures capturing their own context, stored behind
//! `Rc<RefCell<..>>` so a dispatch pass can snapshot the selected list
//! before invoking anything: removal from inside a callback never affects
//! hooks already selected for the in-flight pass, and additions join at the
//! next step boundary.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::Engine;
use crate::error::FaultReason;

/// Observation points the engine dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum HookKind {
    /// Before each instruction at the current program counter.
    Code,
    /// When control enters the first instruction of a basic block.
    Block,
    /// After a guest data read fetches its value.
    MemRead,
    /// Before a guest data write takes effect.
    MemWrite,
    /// In place of the memory-fault path, offering patch-and-retry.
    MemFault,
    /// In place of the invalid-instruction path, offering patch-and-retry.
    InvalidInsn,
    /// When an executed instruction raises a software interrupt.
    Interrupt,
}

/// Disposition returned by a memory-write hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteAction {
    /// Let the (possibly rewritten) bytes land in guest memory.
    Commit,
    /// Veto the write; guest memory is left untouched.
    Suppress,
}

/// Disposition returned by a fault or invalid-instruction hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultAction {
    /// The hook patched state; retry the faulting step.
    Resume,
    /// Let the fault propagate and terminate the run.
    Propagate,
}

/// Handle identifying one registered hook for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId {
    index: usize,
    serial: u64,
}

pub(crate) type CodeFn = dyn FnMut(&mut Engine, u64, u32);
pub(crate) type MemReadFn = dyn FnMut(&mut Engine, u64, &[u8]);
pub(crate) type MemWriteFn = dyn FnMut(&mut Engine, u64, &mut Vec<u8>) -> WriteAction;
pub(crate) type FaultFn = dyn FnMut(&mut Engine, &FaultReason) -> FaultAction;
pub(crate) type InterruptFn = dyn FnMut(&mut Engine, u32);

/// Type-erased callback slot, cloned by reference for a dispatch pass.
#[derive(Clone)]
pub(crate) enum Callback {
    Code(Rc<RefCell<CodeFn>>),
    Block(Rc<RefCell<CodeFn>>),
    MemRead(Rc<RefCell<MemReadFn>>),
    MemWrite(Rc<RefCell<MemWriteFn>>),
    MemFault(Rc<RefCell<FaultFn>>),
    InvalidInsn(Rc<RefCell<FaultFn>>),
    Interrupt(Rc<RefCell<InterruptFn>>),
}

struct HookEntry {
    serial: u64,
    kind: HookKind,
    start: u64,
    end: u64,
    callback: Callback,
}

impl HookEntry {
    // An inverted range (start > end) matches every address, the engine's
    // convention for "no filter".
    fn matches(&self, kind: HookKind, addr: u64) -> bool {
        self.kind == kind && (self.start > self.end || (self.start..=self.end).contains(&addr))
    }
}

/// Ordered collection of registered hooks, keyed by kind and address range.
///
/// Entries are append-only slots with tombstoned removal, so iteration
/// order is registration order for the engine's ordering guarantee.
#[derive(Default)]
pub(crate) struct HookRegistry {
    entries: Vec<Option<HookEntry>>,
    next_serial: u64,
}

impl HookRegistry {
    pub(crate) const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_serial: 0,
        }
    }

    pub(crate) fn add(&mut self, kind: HookKind, start: u64, end: u64, callback: Callback) -> HookId {
        let serial = self.next_serial;
        self.next_serial += 1;
        let index = self.entries.len();
        self.entries.push(Some(HookEntry {
            serial,
            kind,
            start,
            end,
            callback,
        }));
        HookId { index, serial }
    }

    /// Removes the entry behind `id`; `false` for stale or unknown handles.
    pub(crate) fn remove(&mut self, id: HookId) -> bool {
        match self.entries.get_mut(id.index) {
            Some(slot) if slot.as_ref().is_some_and(|e| e.serial == id.serial) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Snapshots the callbacks matching `kind` at `addr`, in registration order.
    pub(crate) fn select(&self, kind: HookKind, addr: u64) -> Vec<Callback> {
        self.entries
            .iter()
            .flatten()
            .filter(|entry| entry.matches(kind, addr))
            .map(|entry| entry.callback.clone())
            .collect()
    }

    /// Returns `true` when at least one live hook of `kind` is registered.
    pub(crate) fn has(&self, kind: HookKind) -> bool {
        self.entries
            .iter()
            .flatten()
            .any(|entry| entry.kind == kind)
    }
}
