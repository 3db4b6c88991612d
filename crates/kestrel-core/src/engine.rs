//! Engine lifecycle and the per-step execution loop.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::cpu::{ArchDescriptor, Bus, Cpu, ExecFault, InsnClass, MemFault};
use crate::error::{CoreError, FaultReason};
use crate::hooks::{Callback, FaultAction, HookId, HookKind, HookRegistry, WriteAction};
use crate::mem::{Access, MemoryMap, Prot, RegionInfo, PAGE_SIZE};
use crate::regs::{RegId, RegisterFile};

/// Optional bounds on one `run` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunLimits {
    /// Stop after this many retired instructions.
    pub max_insns: Option<u64>,
    /// Stop once this much wall-clock time has elapsed.
    pub timeout: Option<Duration>,
}

impl RunLimits {
    /// No instruction or time bound.
    pub const UNBOUNDED: Self = Self {
        max_insns: None,
        timeout: None,
    };

    /// Bound by retired-instruction count only.
    #[must_use]
    pub const fn insns(count: u64) -> Self {
        Self {
            max_insns: Some(count),
            timeout: None,
        }
    }

    /// Bound by elapsed wall-clock time only.
    #[must_use]
    pub const fn timeout(limit: Duration) -> Self {
        Self {
            max_insns: None,
            timeout: Some(limit),
        }
    }
}

/// Why a successful `run` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StopReason {
    /// Program counter reached the designated end address.
    UntilReached,
    /// The instruction-count limit was exhausted.
    LimitReached,
    /// The wall-clock limit was exhausted.
    TimeoutReached,
    /// A hook requested an explicit stop.
    Stopped,
}

/// Outcome of a successful `run` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RunExit {
    /// Why the run stopped.
    pub reason: StopReason,
    /// Number of instructions retired during this run.
    pub steps: u64,
}

// Per-invocation execution state. Each `run` call, nested ones included,
// owns one frame; hook-visible control requests target the innermost frame.
#[derive(Debug, Clone, Copy)]
struct ExecFrame {
    until: Option<u64>,
    remaining: Option<u64>,
    deadline: Option<Instant>,
    steps: u64,
    stop_requested: bool,
    block_pending: bool,
}

/// One independent emulation instance bound to an architecture adapter.
///
/// The engine exclusively owns its memory map, register file, and hook
/// registry; accessors copy values in and out. Execution is single-threaded
/// and cooperative: hooks run synchronously on the calling thread, and a
/// hook may safely mutate state, manage hooks, request a stop, or invoke a
/// nested `run`.
pub struct Engine {
    cpu: Rc<dyn Cpu>,
    desc: ArchDescriptor,
    mem: MemoryMap,
    regs: RegisterFile,
    hooks: HookRegistry,
    frames: Vec<ExecFrame>,
    last_fault: Option<FaultReason>,
}

impl Engine {
    /// Creates an engine driven by the given architecture adapter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] when the adapter's descriptor is
    /// inconsistent (empty register set, program counter outside the set, or
    /// a zero instruction-length bound).
    pub fn new<C: Cpu + 'static>(cpu: C) -> Result<Self, CoreError> {
        let desc = cpu.descriptor();
        if desc.register_count == 0 {
            return Err(CoreError::Configuration("architecture defines no registers"));
        }
        if desc.pc.0 >= desc.register_count {
            return Err(CoreError::Configuration(
                "program counter outside the register set",
            ));
        }
        if desc.max_insn_len == 0 {
            return Err(CoreError::Configuration(
                "maximum instruction length must be nonzero",
            ));
        }

        debug!(arch = desc.name, "engine created");
        Ok(Self {
            cpu: Rc::new(cpu),
            desc,
            mem: MemoryMap::new(),
            regs: RegisterFile::new(desc.register_count),
            hooks: HookRegistry::new(),
            frames: Vec::new(),
            last_fault: None,
        })
    }

    /// Returns the active architecture description.
    #[must_use]
    pub const fn arch(&self) -> &ArchDescriptor {
        &self.desc
    }

    /// Maps a zero-initialized region; see [`MemoryMap::map`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Alignment`] or [`CoreError::Overlap`].
    pub fn mem_map(&mut self, base: u64, size: u64, prot: Prot) -> Result<(), CoreError> {
        self.mem.map(base, size, prot)
    }

    /// Unmaps an exactly-covered range; see [`MemoryMap::unmap`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Alignment`] or [`CoreError::NotMapped`].
    pub fn mem_unmap(&mut self, base: u64, size: u64) -> Result<(), CoreError> {
        self.mem.unmap(base, size)
    }

    /// Updates permissions on a mapped range; see [`MemoryMap::protect`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Alignment`] or [`CoreError::NotMapped`].
    pub fn mem_protect(&mut self, base: u64, size: u64, prot: Prot) -> Result<(), CoreError> {
        self.mem.protect(base, size, prot)
    }

    /// Bulk-reads guest memory into `buf` without firing hooks.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unmapped`] or [`CoreError::Protection`].
    pub fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), CoreError> {
        self.mem.read(addr, buf)
    }

    /// Bulk-writes `bytes` into guest memory without firing hooks.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unmapped`] or [`CoreError::Protection`].
    pub fn mem_write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), CoreError> {
        self.mem.write(addr, bytes)
    }

    /// Returns copies of all mapped-region descriptors.
    #[must_use]
    pub fn mem_regions(&self) -> Vec<RegionInfo> {
        self.mem.regions()
    }

    /// Reads a register by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRegister`] for undefined identifiers.
    pub fn reg_read(&self, id: RegId) -> Result<u64, CoreError> {
        self.regs.read(id)
    }

    /// Writes a register by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRegister`] for undefined identifiers.
    pub fn reg_write(&mut self, id: RegId, value: u64) -> Result<(), CoreError> {
        self.regs.write(id, value)
    }

    /// Current program counter value.
    #[must_use]
    pub fn pc(&self) -> u64 {
        self.regs.get(self.desc.pc)
    }

    /// Sets the program counter.
    ///
    /// From inside a code hook this acts as a control transfer: the engine
    /// restarts the step at the new address instead of executing the
    /// instruction the hook observed.
    pub fn set_pc(&mut self, value: u64) {
        self.regs.set(self.desc.pc, value);
    }

    /// Registers a per-instruction hook over `[start, end]`.
    ///
    /// An inverted range (`start > end`) observes every address. The hook
    /// receives the instruction address and encoded length.
    pub fn add_code_hook<F>(&mut self, start: u64, end: u64, hook: F) -> HookId
    where
        F: FnMut(&mut Self, u64, u32) + 'static,
    {
        self.hooks.add(
            HookKind::Code,
            start,
            end,
            Callback::Code(Rc::new(RefCell::new(hook))),
        )
    }

    /// Registers a basic-block entry hook over `[start, end]`.
    ///
    /// The hook receives the block address and measured block length.
    pub fn add_block_hook<F>(&mut self, start: u64, end: u64, hook: F) -> HookId
    where
        F: FnMut(&mut Self, u64, u32) + 'static,
    {
        self.hooks.add(
            HookKind::Block,
            start,
            end,
            Callback::Block(Rc::new(RefCell::new(hook))),
        )
    }

    /// Registers a guest data-read hook over `[start, end]`.
    ///
    /// Fires after the value is fetched; the hook observes the bytes read.
    pub fn add_mem_read_hook<F>(&mut self, start: u64, end: u64, hook: F) -> HookId
    where
        F: FnMut(&mut Self, u64, &[u8]) + 'static,
    {
        self.hooks.add(
            HookKind::MemRead,
            start,
            end,
            Callback::MemRead(Rc::new(RefCell::new(hook))),
        )
    }

    /// Registers a guest data-write hook over `[start, end]`.
    ///
    /// Fires before the effect is applied; the hook may rewrite the staged
    /// bytes or veto the write entirely.
    pub fn add_mem_write_hook<F>(&mut self, start: u64, end: u64, hook: F) -> HookId
    where
        F: FnMut(&mut Self, u64, &mut Vec<u8>) -> WriteAction + 'static,
    {
        self.hooks.add(
            HookKind::MemWrite,
            start,
            end,
            Callback::MemWrite(Rc::new(RefCell::new(hook))),
        )
    }

    /// Registers a memory-fault hook over `[start, end]`, filtered on the
    /// faulting address.
    ///
    /// Fires in place of the fault path; returning [`FaultAction::Resume`]
    /// retries the faulting step after the hook patched state.
    pub fn add_mem_fault_hook<F>(&mut self, start: u64, end: u64, hook: F) -> HookId
    where
        F: FnMut(&mut Self, &FaultReason) -> FaultAction + 'static,
    {
        self.hooks.add(
            HookKind::MemFault,
            start,
            end,
            Callback::MemFault(Rc::new(RefCell::new(hook))),
        )
    }

    /// Registers an invalid-instruction hook.
    ///
    /// Fires in place of the fault path; returning [`FaultAction::Resume`]
    /// retries the step, typically after the hook patched the encoding.
    pub fn add_invalid_insn_hook<F>(&mut self, hook: F) -> HookId
    where
        F: FnMut(&mut Self, &FaultReason) -> FaultAction + 'static,
    {
        self.hooks.add(
            HookKind::InvalidInsn,
            1,
            0,
            Callback::InvalidInsn(Rc::new(RefCell::new(hook))),
        )
    }

    /// Registers a software-interrupt hook.
    ///
    /// Fires after an instruction classified as a trap commits, receiving
    /// the trap number.
    pub fn add_interrupt_hook<F>(&mut self, hook: F) -> HookId
    where
        F: FnMut(&mut Self, u32) + 'static,
    {
        self.hooks.add(
            HookKind::Interrupt,
            1,
            0,
            Callback::Interrupt(Rc::new(RefCell::new(hook))),
        )
    }

    /// Removes a registered hook.
    ///
    /// Returns `false` for stale handles. Removal from inside a callback
    /// takes effect for all subsequent steps but never affects hooks already
    /// selected for the in-flight dispatch pass.
    pub fn remove_hook(&mut self, id: HookId) -> bool {
        self.hooks.remove(id)
    }

    /// Requests that the innermost active run stop.
    ///
    /// Level-triggered: the flag is consulted at the next step boundary and
    /// before the next instruction executes; the current step completes its
    /// hook dispatch deterministically. Outside of a run this is a no-op.
    pub fn stop(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.stop_requested = true;
        }
    }

    /// Fault recorded by the most recent faulted `run`, for forensics.
    #[must_use]
    pub const fn last_fault(&self) -> Option<FaultReason> {
        self.last_fault
    }

    /// Executes guest code starting at `start`.
    ///
    /// Runs until the program counter equals `until` (when given), a limit
    /// from `limits` expires, a hook requests a stop, or an unresolved fault
    /// occurs. May be invoked recursively from inside a hook; the nested run
    /// owns its own execution state and restores the outer program counter
    /// on completion.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Fault`] when a runtime fault goes unresolved by
    /// the registered fault hooks (the reason is also retained for
    /// [`Self::last_fault`]), or [`CoreError::Internal`] when the adapter
    /// violates its contract. Limit expiry is a normal stop, not an error.
    pub fn run(
        &mut self,
        start: u64,
        until: Option<u64>,
        limits: RunLimits,
    ) -> Result<RunExit, CoreError> {
        self.last_fault = None;
        let saved_pc = self.pc();
        self.set_pc(start);

        self.frames.push(ExecFrame {
            until,
            remaining: limits.max_insns,
            deadline: limits
                .timeout
                .and_then(|t| Instant::now().checked_add(t)),
            steps: 0,
            stop_requested: false,
            block_pending: true,
        });
        debug!(start, ?until, "run entered");

        let outcome = self.run_loop();
        let frame = self
            .frames
            .pop()
            .ok_or(CoreError::Internal("execution frame stack underflow"))?;

        // A nested run returns control to the interrupted outer step.
        if !self.frames.is_empty() {
            self.set_pc(saved_pc);
        }

        match outcome {
            Ok(reason) => {
                debug!(?reason, steps = frame.steps, "run stopped");
                Ok(RunExit {
                    reason,
                    steps: frame.steps,
                })
            }
            Err(err) => {
                if let CoreError::Fault(reason) = err {
                    self.last_fault = Some(reason);
                }
                debug!(%err, "run faulted");
                Err(err)
            }
        }
    }

    fn run_loop(&mut self) -> Result<StopReason, CoreError> {
        let window_len = usize::try_from(self.desc.max_insn_len).unwrap_or(16);
        let mut window = vec![0_u8; window_len];

        loop {
            if let Some(reason) = self.check_termination()? {
                return Ok(reason);
            }
            let pc = self.pc();
            trace!(pc, "step");

            // Fetch the instruction window, offering fault hooks a retry.
            let fetched = self.mem.fetch_window(pc, &mut window);
            let got = match fetched {
                Ok(got) => got,
                Err(_) => {
                    let fault = FaultReason::MemoryFault {
                        addr: pc,
                        access: Access::Fetch,
                    };
                    if self.dispatch_fault_hooks(HookKind::MemFault, pc, &fault) {
                        continue;
                    }
                    return Err(CoreError::Fault(fault));
                }
            };

            // Block-entry hooks fire once per basic block.
            let block_entry = self.frames.last().is_some_and(|f| f.block_pending);
            let mut hooks_fired = false;
            if block_entry {
                if self.hooks.has(HookKind::Block) {
                    let block_len = self.measure_block(pc);
                    hooks_fired |= self.dispatch_flow_hooks(HookKind::Block, pc, block_len);
                }
                if let Some(frame) = self.frames.last_mut() {
                    frame.block_pending = false;
                }
            }

            // Code hooks fire with the probed instruction length.
            let probed = self.cpu.probe(&window[..got], pc);
            if let Some(info) = probed {
                hooks_fired |= self.dispatch_flow_hooks(HookKind::Code, pc, info.len);
            } else if got < window_len {
                // The window was truncated by an unfetchable boundary; the
                // encoding may simply be incomplete. Report a fetch fault at
                // the first missing byte rather than an invalid instruction.
                let missing = pc.wrapping_add(got as u64);
                let fault = FaultReason::MemoryFault {
                    addr: missing,
                    access: Access::Fetch,
                };
                if self.dispatch_fault_hooks(HookKind::MemFault, missing, &fault) {
                    continue;
                }
                return Err(CoreError::Fault(fault));
            }

            // A stop requested during dispatch means no further instruction
            // executes, this one included.
            if self.frames.last().is_some_and(|f| f.stop_requested) {
                return Ok(StopReason::Stopped);
            }

            // A hook that moved the program counter transferred control;
            // restart the step at the new address.
            if self.pc() != pc {
                if let Some(frame) = self.frames.last_mut() {
                    frame.block_pending = true;
                }
                continue;
            }

            // Hooks may have patched the instruction bytes under us.
            let got = if hooks_fired {
                let refetched = self.mem.fetch_window(pc, &mut window);
                match refetched {
                    Ok(got) => got,
                    Err(_) => {
                        let fault = FaultReason::MemoryFault {
                            addr: pc,
                            access: Access::Fetch,
                        };
                        if self.dispatch_fault_hooks(HookKind::MemFault, pc, &fault) {
                            continue;
                        }
                        return Err(CoreError::Fault(fault));
                    }
                }
            } else {
                got
            };

            // Decode and execute one instruction through the adapter.
            let cpu = Rc::clone(&self.cpu);
            let executed = cpu.execute(self, &window[..got], pc);
            match executed {
                Ok(done) => {
                    if done.len == 0 || u64::from(done.len) > got as u64 {
                        return Err(CoreError::Internal(
                            "adapter reported an impossible instruction length",
                        ));
                    }
                    if done.class == InsnClass::Sequential
                        && done.next_pc != pc.wrapping_add(u64::from(done.len))
                    {
                        return Err(CoreError::Internal(
                            "sequential instruction did not fall through",
                        ));
                    }

                    self.set_pc(done.next_pc);
                    if let InsnClass::Trap(number) = done.class {
                        self.dispatch_interrupt_hooks(number);
                    }

                    if let Some(frame) = self.frames.last_mut() {
                        frame.steps += 1;
                        if let Some(remaining) = frame.remaining.as_mut() {
                            *remaining -= 1;
                        }
                        frame.block_pending = done.class.ends_block();
                    }
                }
                Err(ExecFault::Memory(MemFault { addr, access })) => {
                    let fault = FaultReason::MemoryFault { addr, access };
                    if self.dispatch_fault_hooks(HookKind::MemFault, addr, &fault) {
                        continue;
                    }
                    return Err(CoreError::Fault(fault));
                }
                Err(ExecFault::InvalidInstruction) => {
                    let fault = FaultReason::InvalidInstruction { pc };
                    if self.dispatch_fault_hooks(HookKind::InvalidInsn, pc, &fault) {
                        continue;
                    }
                    return Err(CoreError::Fault(fault));
                }
                Err(ExecFault::Internal(message)) => {
                    return Err(CoreError::Internal(message));
                }
            }
        }
    }

    fn check_termination(&mut self) -> Result<Option<StopReason>, CoreError> {
        let pc = self.pc();
        let frame = self
            .frames
            .last_mut()
            .ok_or(CoreError::Internal("execution frame stack underflow"))?;

        if frame.stop_requested {
            return Ok(Some(StopReason::Stopped));
        }
        if frame.until == Some(pc) {
            return Ok(Some(StopReason::UntilReached));
        }
        if frame.remaining == Some(0) {
            return Ok(Some(StopReason::LimitReached));
        }
        if frame.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(Some(StopReason::TimeoutReached));
        }
        Ok(None)
    }

    // Walks decode-only from `start` until the first block-ending
    // instruction, an undecodable window, or the one-page scan cap.
    fn measure_block(&self, start: u64) -> u32 {
        let window_len = usize::try_from(self.desc.max_insn_len).unwrap_or(16);
        let mut buf = vec![0_u8; window_len];
        let mut len: u64 = 0;

        while len < PAGE_SIZE {
            let cursor = start.wrapping_add(len);
            let Ok(got) = self.mem.fetch_window(cursor, &mut buf) else {
                break;
            };
            let Some(info) = self.cpu.probe(&buf[..got], cursor) else {
                break;
            };
            len += u64::from(info.len);
            if info.class.ends_block() {
                break;
            }
        }
        u32::try_from(len).unwrap_or(u32::MAX)
    }

    // Dispatches code or block hooks; returns true when any callback ran.
    fn dispatch_flow_hooks(&mut self, kind: HookKind, addr: u64, size: u32) -> bool {
        let selected = self.hooks.select(kind, addr);
        let fired = !selected.is_empty();
        for callback in selected {
            match callback {
                Callback::Code(hook) | Callback::Block(hook) => {
                    if let Ok(mut hook) = hook.try_borrow_mut() {
                        (&mut *hook)(self, addr, size);
                    }
                }
                _ => {}
            }
        }
        fired
    }

    // Dispatches fault or invalid-instruction hooks; returns true when any
    // callback resolved the fault and requested a retry.
    fn dispatch_fault_hooks(&mut self, kind: HookKind, addr: u64, fault: &FaultReason) -> bool {
        let selected = self.hooks.select(kind, addr);
        let mut resolved = false;
        for callback in selected {
            match callback {
                Callback::MemFault(hook) | Callback::InvalidInsn(hook) => {
                    if let Ok(mut hook) = hook.try_borrow_mut() {
                        if (&mut *hook)(self, fault) == FaultAction::Resume {
                            resolved = true;
                        }
                    }
                }
                _ => {}
            }
        }
        if resolved {
            trace!(?fault, "fault resolved by hook, retrying step");
        }
        resolved
    }

    fn dispatch_interrupt_hooks(&mut self, number: u32) {
        let selected = self.hooks.select(HookKind::Interrupt, self.pc());
        for callback in selected {
            if let Callback::Interrupt(hook) = callback {
                if let Ok(mut hook) = hook.try_borrow_mut() {
                    (&mut *hook)(self, number);
                }
            }
        }
    }

    fn to_mem_fault(err: &CoreError, fallback_addr: u64, access: Access) -> MemFault {
        match *err {
            CoreError::Unmapped { addr } => MemFault { addr, access },
            CoreError::Protection { addr, access } => MemFault { addr, access },
            _ => MemFault {
                addr: fallback_addr,
                access,
            },
        }
    }
}

// Guest-visible memory and register access for the adapter. Data accesses
// here are the hook-dispatching path; host accessors above bypass hooks.
impl Bus for Engine {
    fn load(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), MemFault> {
        self.mem
            .read(addr, buf)
            .map_err(|err| Self::to_mem_fault(&err, addr, Access::Read))?;

        let selected = self.hooks.select(HookKind::MemRead, addr);
        if !selected.is_empty() {
            let snapshot = buf.to_vec();
            for callback in selected {
                if let Callback::MemRead(hook) = callback {
                    if let Ok(mut hook) = hook.try_borrow_mut() {
                        (&mut *hook)(self, addr, &snapshot);
                    }
                }
            }
        }
        Ok(())
    }

    fn store(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemFault> {
        let selected = self.hooks.select(HookKind::MemWrite, addr);
        if selected.is_empty() {
            return self
                .mem
                .write(addr, bytes)
                .map_err(|err| Self::to_mem_fault(&err, addr, Access::Write));
        }

        let mut staged = bytes.to_vec();
        let mut suppressed = false;
        for callback in selected {
            if let Callback::MemWrite(hook) = callback {
                if let Ok(mut hook) = hook.try_borrow_mut() {
                    if (&mut *hook)(self, addr, &mut staged) == WriteAction::Suppress {
                        suppressed = true;
                    }
                }
            }
        }
        if suppressed {
            return Ok(());
        }
        self.mem
            .write(addr, &staged)
            .map_err(|err| Self::to_mem_fault(&err, addr, Access::Write))
    }

    fn reg(&self, id: RegId) -> u64 {
        self.regs.get(id)
    }

    fn set_reg(&mut self, id: RegId, value: u64) {
        self.regs.set(id, value);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Engine, RunLimits};
    use crate::cpu::{ArchDescriptor, Bus, Cpu, Endian, ExecFault, Executed, InsnInfo};
    use crate::error::CoreError;
    use crate::mem::{Prot, PAGE_SIZE};
    use crate::regs::RegId;

    struct NullCpu {
        desc: ArchDescriptor,
    }

    impl NullCpu {
        const fn with(register_count: u16, pc: u16, max_insn_len: u32) -> Self {
            Self {
                desc: ArchDescriptor {
                    name: "null",
                    register_count,
                    pc: RegId(pc),
                    endian: Endian::Little,
                    max_insn_len,
                },
            }
        }
    }

    impl Cpu for NullCpu {
        fn descriptor(&self) -> ArchDescriptor {
            self.desc
        }

        fn probe(&self, _window: &[u8], _pc: u64) -> Option<InsnInfo> {
            None
        }

        fn execute(
            &self,
            _bus: &mut dyn Bus,
            _window: &[u8],
            _pc: u64,
        ) -> Result<Executed, ExecFault> {
            Err(ExecFault::InvalidInstruction)
        }
    }

    #[test]
    fn construction_rejects_inconsistent_descriptors() {
        assert!(matches!(
            Engine::new(NullCpu::with(0, 0, 4)),
            Err(CoreError::Configuration(_))
        ));
        assert!(matches!(
            Engine::new(NullCpu::with(4, 4, 4)),
            Err(CoreError::Configuration(_))
        ));
        assert!(matches!(
            Engine::new(NullCpu::with(4, 0, 0)),
            Err(CoreError::Configuration(_))
        ));
        assert!(Engine::new(NullCpu::with(4, 3, 4)).is_ok());
    }

    #[test]
    fn stop_outside_a_run_is_a_noop() {
        let mut engine = Engine::new(NullCpu::with(2, 0, 2)).expect("engine");
        engine.stop();
        assert_eq!(engine.last_fault(), None);
    }

    #[test]
    fn run_limit_constructors_cover_each_bound() {
        assert_eq!(RunLimits::UNBOUNDED, RunLimits::default());
        assert_eq!(RunLimits::insns(7).max_insns, Some(7));
        assert_eq!(
            RunLimits::timeout(Duration::from_millis(5)).timeout,
            Some(Duration::from_millis(5))
        );
    }

    #[test]
    fn accessors_copy_values_through_the_engine_surface() {
        let mut engine = Engine::new(NullCpu::with(4, 3, 4)).expect("engine");

        engine.mem_map(0x1000, PAGE_SIZE, Prot::ALL).expect("map");
        engine.mem_write(0x1000, &[1, 2, 3]).expect("write");
        let mut buf = [0; 3];
        engine.mem_read(0x1000, &mut buf).expect("read");
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(engine.mem_regions().len(), 1);

        engine.reg_write(RegId(1), 0xABCD).expect("reg write");
        assert_eq!(engine.reg_read(RegId(1)).expect("reg read"), 0xABCD);
        assert_eq!(
            engine.reg_read(RegId(9)).unwrap_err(),
            CoreError::InvalidRegister(RegId(9))
        );

        engine.set_pc(0x4000);
        assert_eq!(engine.pc(), 0x4000);
        assert_eq!(engine.arch().name, "null");
    }

    #[test]
    fn hook_handles_remove_exactly_once() {
        let mut engine = Engine::new(NullCpu::with(2, 0, 2)).expect("engine");
        let id = engine.add_code_hook(1, 0, |_, _, _| {});
        assert!(engine.remove_hook(id));
        assert!(!engine.remove_hook(id));
    }
}
