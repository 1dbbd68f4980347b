//! Allocator laws checked over parsed IR: whenever allocation
//! succeeds, the verifier finds nothing, every value that needs a
//! register has one, and no interference edge shares a register.

use std::collections::HashMap;
use std::collections::HashSet;

use hbc_ir::{parse::parse_func, Func, Reg};
use hbc_regalloc::{verify::verify, RegAlloc};
use hbc_target::{RegisterSet, Sizes};
use hbc_xform::{run_stage, Registry, Stage, XformCtx};

fn test_regs() -> RegisterSet {
    RegisterSet::new(
        vec![Reg(1), Reg(2), Reg(3), Reg(4)],
        vec![Reg(5), Reg(6), Reg(7)],
        vec![Reg(8), Reg(9), Reg(10), Reg(11), Reg(12)],
        Reg(14),
        Reg(13),
        Reg(0),
        Reg(15),
        HashMap::new(),
    )
}

const SIZES: Sizes = Sizes {
    word_bytes: 2,
    min_addressable_bits: 16,
};

/// Elaborate and lower, then allocate.
fn prepare_and_allocate(text: &str) -> (Func, RegisterSet) {
    let mut func = parse_func(text).expect("parse");
    let regs = test_regs();
    let registry = Registry::standard();
    let tags = HashSet::new();
    let ctx = XformCtx {
        arg_regs: regs.arg_regs(),
        scratch_reg: regs.scratch,
        sizes: &SIZES,
    };
    for stage in [Stage::Elaboration, Stage::Simplification, Stage::Lowering] {
        run_stage(stage, &mut func, &registry, &tags, &ctx).unwrap();
    }
    func.check_invariants().unwrap();

    let mut ra = RegAlloc::new(&mut func, &regs);
    ra.allocate().unwrap();
    drop(ra);
    (func, regs)
}

fn assert_laws(func: &Func, regs: &RegisterSet) {
    // verifier law
    let errors = verify(func, regs);
    assert!(errors.is_empty(), "verifier found: {errors:?}");

    // every value that needs a register has one
    for blk in func.block_ids() {
        for &id in func.block(blk).instrs() {
            for &v in func.instr(id).defs().iter().chain(func.instr(id).args()) {
                if func.value(v).needs_reg() {
                    assert!(
                        func.value(v).in_reg(),
                        "{v} still has no register after allocation"
                    );
                }
            }
        }
    }
}

#[test]
fn loop_with_accumulator() {
    let text = "\
func t__sum_to(int) int:
.b0(v0:int):
    jump .b1(0, 0)
.b1(v1:int, v2:int):
    v3:bool = less v1, v0
    if v3, .b2, .b3
.b2:
    v4:int = add v2, v1
    v5:int = add v1, 1
    jump .b1(v5, v4)
.b3:
    return v2
";
    let (func, regs) = prepare_and_allocate(text);
    assert_laws(&func, &regs);
}

#[test]
fn diamond_with_merge_params() {
    let text = "\
func t__max(int, int) int:
.b0(v0:int, v1:int):
    v2:bool = less v0, v1
    if v2, .b1, .b2
.b1:
    jump .b3(v1)
.b2:
    jump .b3(v0)
.b3(v3:int):
    return v3
";
    let (func, regs) = prepare_and_allocate(text);
    assert_laws(&func, &regs);
}

#[test]
fn call_in_loop_forces_saved_registers() {
    let text = "\
func t__step(int) int:
.b0(v0:int):
    v1:int = add v0, 1
    return v1

func t__apply(int) int:
.b0(v0:int):
    jump .b1(0)
.b1(v1:int):
    v2:bool = less v1, v0
    if v2, .b2, .b3
.b2:
    v3:int = call t__step, v1
    v4:int = add v1, v3
    jump .b1(v4)
.b3:
    return v1
";
    let prog = hbc_ir::parse::parse_program(text).expect("parse");
    let mut func = prog.func_by_full_name("t__apply").expect("t__apply").clone();

    let regs = test_regs();
    let registry = Registry::standard();
    let tags = HashSet::new();
    let ctx = XformCtx {
        arg_regs: regs.arg_regs(),
        scratch_reg: regs.scratch,
        sizes: &SIZES,
    };
    for stage in [Stage::Elaboration, Stage::Simplification, Stage::Lowering] {
        run_stage(stage, &mut func, &registry, &tags, &ctx).unwrap();
    }
    let mut ra = RegAlloc::new(&mut func, &regs);
    ra.allocate().unwrap();
    drop(ra);
    assert_laws(&func, &regs);

    // the loop counter lives across the call: it must sit in the
    // callee-saved section
    let saved_start = regs.saved_start() as usize;
    let mut found_saved = false;
    for v in func.value_ids() {
        if let Some(r) = func.value(v).reg() {
            if let Some(i) = regs.index_of(r) {
                found_saved |= i + 1 >= saved_start;
            }
        }
    }
    assert!(found_saved, "no value landed in a saved register");
}

#[test]
fn critical_edge_input_is_refused() {
    // b0 branches to b1 and b2; b2 also reachable from b1, so the
    // b0 -> b2 edge is critical
    let text = "\
func t__crit(int) int:
.b0(v0:int):
    v1:bool = less v0, 1
    if v1, .b1, .b2
.b1:
    jump .b2
.b2:
    return v0
";
    let mut func = parse_func(text).expect("parse");
    let regs = test_regs();
    let mut ra = RegAlloc::new(&mut func, &regs);
    assert!(matches!(
        ra.allocate(),
        Err(hbc_regalloc::RegAllocError::CriticalEdges(_))
    ));
}
