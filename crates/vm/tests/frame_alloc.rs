//! Heap traffic of call frames, measured with a counting allocator.
//!
//! Frames of up to eight slots live inline; larger frames cost exactly one
//! allocation and one free per call. Counters are per thread so that tests
//! running in parallel do not see each other's allocations.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::rc::Rc;

use elle_common::{CodeBuilder, Program, ProgramBuilder};
use elle_vm::{Completion, Dispatch, RecordingHost, Vm, VmConfig, INLINE_FRAME_SLOTS};

struct Counting;

thread_local! {
    static ALLOCS: Cell<usize> = const { Cell::new(0) };
    static FREES: Cell<usize> = const { Cell::new(0) };
}

fn bump(counter: &'static std::thread::LocalKey<Cell<usize>>) {
    let _ = counter.try_with(|c| c.set(c.get() + 1));
}

unsafe impl GlobalAlloc for Counting {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        bump(&ALLOCS);
        System.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        bump(&ALLOCS);
        System.alloc_zeroed(layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        bump(&ALLOCS);
        bump(&FREES);
        System.realloc(ptr, layout, new_size)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        bump(&FREES);
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: Counting = Counting;

/// Allocations and frees made by `f` on this thread.
fn measure<R>(f: impl FnOnce() -> R) -> (R, usize, usize) {
    let allocs = ALLOCS.with(Cell::get);
    let frees = FREES.with(Cell::get);
    let result = f();
    (
        result,
        ALLOCS.with(Cell::get) - allocs,
        FREES.with(Cell::get) - frees,
    )
}

const SMALL: usize = 1;
const BIG: usize = 2;
const CALLS: usize = 100;

/// `small` fits inline; `big` uses local 8 and does not.
fn frames_program() -> Rc<Program> {
    let mut p = ProgramBuilder::new("frames");
    let mut main = CodeBuilder::new();
    main.push_constant(0).ret();
    let mut small = CodeBuilder::new();
    small.push_constant(3).pop_local(0).push_local(0).ret();
    let mut big = CodeBuilder::new();
    big.push_constant(3).pop_local(8).push_local(8).ret();
    p.function("main", 0, main.finish().unwrap());
    p.function("small", 0, small.finish().unwrap());
    p.function("big", 0, big.finish().unwrap());

    let program = elle_verifier::verify(&p.build().unwrap()).unwrap();
    assert!(program.functions[SMALL].frame_slots() <= INLINE_FRAME_SLOTS);
    assert!(program.functions[BIG].frame_slots() > INLINE_FRAME_SLOTS);
    Rc::new(program)
}

fn call_repeatedly(vm: &mut Vm, id: usize) {
    for _ in 0..CALLS {
        assert_eq!(vm.run_with_args(id, &[]), Ok(Completion::Returned(3)));
    }
}

#[test]
fn one_allocation_per_large_frame() {
    let program = frames_program();
    let configs = [
        VmConfig::interpreted(Dispatch::Switch),
        VmConfig::interpreted(Dispatch::Table),
        VmConfig::tiered(1),
    ];

    for config in configs {
        let mut vm = Vm::new(Rc::clone(&program), config, RecordingHost::new());
        // Grows the call chain and, when tiered, compiles both functions.
        call_repeatedly(&mut vm, SMALL);
        call_repeatedly(&mut vm, BIG);

        let ((), allocs, frees) = measure(|| call_repeatedly(&mut vm, SMALL));
        assert_eq!((allocs, frees), (0, 0), "inline frames under {config:?}");

        let ((), allocs, frees) = measure(|| call_repeatedly(&mut vm, BIG));
        assert_eq!((allocs, frees), (CALLS, CALLS), "heap frames under {config:?}");

        let stats = vm.frame_stats();
        assert_eq!(stats.heap_allocations, 2 * CALLS as u64);
        assert_eq!(stats.heap_releases, 2 * CALLS as u64);
    }
}
