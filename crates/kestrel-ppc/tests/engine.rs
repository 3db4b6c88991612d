//! Full-engine integration suite: the PPC32 adapter driven by kestrel-core.

#![allow(clippy::pedantic, clippy::nursery)]

use std::cell::RefCell;
use std::rc::Rc;

use kestrel_core::{
    Access, CoreError, Endian, Engine, FaultAction, FaultReason, Prot, RunLimits, StopReason,
    PAGE_SIZE,
};
use kestrel_ppc::{reg, Ppc32};
use proptest as _;

const BASE: u64 = 0x10000;
const IMAGE_SIZE: u64 = 2 * 1024 * 1024;

fn engine(endian: Endian) -> Engine {
    let mut engine = Engine::new(Ppc32::new(endian)).expect("engine construction");
    engine.mem_map(BASE, IMAGE_SIZE, Prot::ALL).expect("map image");
    engine
}

fn write_words(engine: &mut Engine, addr: u64, endian: Endian, words: &[u32]) {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in words {
        match endian {
            Endian::Big => bytes.extend_from_slice(&word.to_be_bytes()),
            Endian::Little => bytes.extend_from_slice(&word.to_le_bytes()),
        }
    }
    engine.mem_write(addr, &bytes).expect("write code");
}

#[test]
fn sample_payload_builds_the_constant_and_traces_hooks() {
    let mut engine = engine(Endian::Big);
    // lis r3, 0x1234 ; ori r3, r3, 0x5678
    write_words(&mut engine, BASE, Endian::Big, &[0x3C60_1234, 0x6063_5678]);
    engine.reg_write(reg::gpr(3), 0x1234).expect("seed r3");
    engine.reg_write(reg::gpr(6), 0x6789).expect("seed r6");
    engine.reg_write(reg::gpr(26), 0x8877).expect("seed r26");

    let blocks = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&blocks);
    engine.add_block_hook(1, 0, move |_, addr, len| sink.borrow_mut().push((addr, len)));

    let insns = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&insns);
    engine.add_code_hook(BASE, BASE + 7, move |_, addr, len| {
        sink.borrow_mut().push((addr, len));
    });

    let exit = engine
        .run(BASE, Some(BASE + 8), RunLimits::insns(100))
        .expect("run");

    assert_eq!(exit.reason, StopReason::UntilReached);
    assert_eq!(exit.steps, 2);
    assert_eq!(engine.reg_read(reg::gpr(3)).expect("read"), 0x1234_5678);
    assert_eq!(engine.reg_read(reg::gpr(26)).expect("read"), 0x8877);
    assert_eq!(*blocks.borrow(), vec![(BASE, 8)]);
    assert_eq!(*insns.borrow(), vec![(BASE, 4), (BASE + 4, 4)]);
}

#[test]
fn register_addition_matches_the_commented_sample_variant() {
    let mut engine = engine(Endian::Big);
    // add r26, r6, r3
    write_words(&mut engine, BASE, Endian::Big, &[0x7F46_1A14]);
    engine.reg_write(reg::gpr(3), 0x1234).expect("seed r3");
    engine.reg_write(reg::gpr(6), 0x6789).expect("seed r6");

    engine
        .run(BASE, Some(BASE + 4), RunLimits::UNBOUNDED)
        .expect("run");

    assert_eq!(engine.reg_read(reg::gpr(26)).expect("read"), 0x79BD);
}

#[test]
fn little_endian_mode_runs_the_same_program() {
    let mut engine = engine(Endian::Little);
    write_words(
        &mut engine,
        BASE,
        Endian::Little,
        &[0x3C60_1234, 0x6063_5678],
    );

    engine
        .run(BASE, Some(BASE + 8), RunLimits::UNBOUNDED)
        .expect("run");

    assert_eq!(engine.reg_read(reg::gpr(3)).expect("read"), 0x1234_5678);
}

#[test]
fn instruction_limit_stops_between_the_two_sample_instructions() {
    let mut engine = engine(Endian::Big);
    write_words(&mut engine, BASE, Endian::Big, &[0x3C60_1234, 0x6063_5678]);

    let exit = engine
        .run(BASE, None, RunLimits::insns(1))
        .expect("run");

    assert_eq!(exit.reason, StopReason::LimitReached);
    assert_eq!(exit.steps, 1);
    assert_eq!(engine.pc(), BASE + 4);
    assert_eq!(engine.reg_read(reg::gpr(3)).expect("read"), 0x1234_0000);
}

#[test]
fn load_fault_recovery_resumes_past_the_miss() {
    let mut engine = engine(Endian::Big);
    // lwz r4, 0(r1) with r1 pointing far outside the image.
    write_words(&mut engine, BASE, Endian::Big, &[0x8081_0000]);
    engine.reg_write(reg::gpr(1), 0x40_0000).expect("seed r1");

    let calls = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&calls);
    engine.add_mem_fault_hook(1, 0, move |engine, fault| {
        *counter.borrow_mut() += 1;
        assert_eq!(
            *fault,
            FaultReason::MemoryFault {
                addr: 0x40_0000,
                access: Access::Read
            }
        );
        engine
            .mem_map(0x40_0000, PAGE_SIZE, Prot::READ | Prot::WRITE)
            .expect("map faulting page");
        engine
            .mem_write(0x40_0000, &[0xCA, 0xFE, 0xBA, 0xBE])
            .expect("seed value");
        FaultAction::Resume
    });

    engine
        .run(BASE, Some(BASE + 4), RunLimits::UNBOUNDED)
        .expect("run recovers");

    assert_eq!(*calls.borrow(), 1);
    assert_eq!(engine.reg_read(reg::gpr(4)).expect("read"), 0xCAFE_BABE);
}

#[test]
fn call_return_and_trap_walk_their_blocks() {
    let mut engine = engine(Endian::Big);
    write_words(
        &mut engine,
        BASE,
        Endian::Big,
        &[
            0x4800_0011, // bl +16
            0x4400_0002, // sc (reached after blr)
            0x0000_0000,
            0x0000_0000,
            0x3860_002A, // li r3, 42
            0x4E80_0020, // blr
        ],
    );

    let blocks = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&blocks);
    engine.add_block_hook(1, 0, move |_, addr, len| sink.borrow_mut().push((addr, len)));

    let traps = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&traps);
    engine.add_interrupt_hook(move |_, number| sink.borrow_mut().push(number));

    let exit = engine
        .run(BASE, Some(BASE + 8), RunLimits::UNBOUNDED)
        .expect("run");

    // bl, li, blr, sc.
    assert_eq!(exit.steps, 4);
    assert_eq!(engine.reg_read(reg::gpr(3)).expect("read"), 42);
    assert_eq!(engine.reg_read(reg::LR).expect("read"), BASE + 4);
    assert_eq!(*traps.borrow(), vec![0]);
    assert_eq!(
        *blocks.borrow(),
        vec![(BASE, 4), (BASE + 16, 8), (BASE + 4, 4)]
    );
}

#[test]
fn ctr_countdown_loop_retires_the_expected_path() {
    let mut engine = engine(Endian::Big);
    write_words(
        &mut engine,
        BASE,
        Endian::Big,
        &[
            0x3800_0005, // li r0, 5
            0x7C09_03A6, // mtctr r0
            0x3860_0000, // li r3, 0
            0x3863_0001, // addi r3, r3, 1
            0x4200_FFFC, // bdnz -4
        ],
    );

    let exit = engine
        .run(BASE, Some(BASE + 20), RunLimits::UNBOUNDED)
        .expect("run");

    assert_eq!(exit.reason, StopReason::UntilReached);
    assert_eq!(exit.steps, 13);
    assert_eq!(engine.reg_read(reg::gpr(3)).expect("read"), 5);
    assert_eq!(engine.reg_read(reg::CTR).expect("read"), 0);
}

#[test]
fn stop_from_a_hook_halts_between_instructions() {
    let mut engine = engine(Endian::Big);
    write_words(&mut engine, BASE, Endian::Big, &[0x3C60_1234, 0x6063_5678]);

    engine.add_code_hook(BASE + 4, BASE + 4, |engine, _, _| engine.stop());

    let exit = engine
        .run(BASE, Some(BASE + 8), RunLimits::UNBOUNDED)
        .expect("run");

    assert_eq!(exit.reason, StopReason::Stopped);
    assert_eq!(exit.steps, 1);
    assert_eq!(engine.reg_read(reg::gpr(3)).expect("read"), 0x1234_0000);
}

#[test]
fn overlapping_code_hooks_fire_in_registration_order() {
    let mut engine = engine(Endian::Big);
    write_words(&mut engine, BASE, Endian::Big, &[0x3C60_1234, 0x6063_5678]);

    let log = Rc::new(RefCell::new(Vec::new()));
    let first = Rc::clone(&log);
    engine.add_code_hook(BASE, BASE + 0xFFF, move |_, _, _| first.borrow_mut().push(1));
    let second = Rc::clone(&log);
    engine.add_code_hook(1, 0, move |_, _, _| second.borrow_mut().push(2));

    engine
        .run(BASE, Some(BASE + 8), RunLimits::UNBOUNDED)
        .expect("run");

    assert_eq!(*log.borrow(), vec![1, 2, 1, 2]);
}

#[test]
fn revoking_exec_permission_faults_the_fetch() {
    let mut engine = engine(Endian::Big);
    write_words(&mut engine, BASE, Endian::Big, &[0x3C60_1234]);
    engine
        .mem_protect(BASE, PAGE_SIZE, Prot::READ | Prot::WRITE)
        .expect("drop exec");

    let err = engine
        .run(BASE, Some(BASE + 4), RunLimits::UNBOUNDED)
        .unwrap_err();

    assert_eq!(
        err,
        CoreError::Fault(FaultReason::MemoryFault {
            addr: BASE,
            access: Access::Fetch
        })
    );
    assert!(engine.last_fault().is_some());
}
