//! Symbolic verification of register assignments.
//!
//! Executes the function symbolically, tracking which value occupies
//! each register, deliberately working forward from the entry rather
//! than the way the allocator works, to maximize the chance of
//! catching allocator bugs. Each block is visited once per distinct
//! incoming register state; states are hashed into an explored set so
//! the walk halts.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use hbc_ir::{BlockId, Func, ValueId};
use hbc_target::RegisterSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("no register assigned to a variable: fn {func} blk {block} {value}")]
    NoRegAssigned {
        func: String,
        block: String,
        value: String,
    },

    #[error(
        "attempt to read wrong value from register: {reg} contains {found} but wanted {want}: fn {func} blk {block}"
    )]
    WrongValueInReg {
        func: String,
        block: String,
        reg: String,
        found: String,
        want: String,
    },

    #[error("missing copy of block parameter: fn {func} from blk {from} to blk {to}: arg {arg} def {def}")]
    MissingCopy {
        func: String,
        from: String,
        to: String,
        arg: String,
        def: String,
    },
}

type LiveRegs = Vec<Option<ValueId>>;

fn state_key(blk: BlockId, live: &LiveRegs) -> u64 {
    let mut hasher = DefaultHasher::new();
    blk.hash(&mut hasher);
    live.hash(&mut hasher);
    hasher.finish()
}

fn occupant(slot: Option<ValueId>) -> String {
    match slot {
        Some(v) => v.to_string(),
        None => "<empty>".to_string(),
    }
}

/// Check that every value is in the expected register at every use.
/// All findings are collected and returned together.
pub fn verify(func: &Func, regs: &RegisterSet) -> Vec<VerifyError> {
    let mut errors = Vec::new();
    if func.num_blocks() < 1 {
        return errors;
    }

    let canonical = regs.canonical();
    let nregs = canonical.len();
    let index_of = |v: ValueId| -> Option<usize> {
        func.value(v).reg().and_then(|r| regs.index_of(r))
    };

    // initial state: the entry block's parameter registers
    let entry = func.entry_block().expect("function has blocks");
    let mut first_live: LiveRegs = vec![None; nregs];
    for &def in func.block(entry).defs() {
        if let Some(i) = index_of(def) {
            first_live[i] = Some(def);
        }
    }

    let mut worklist: Vec<(BlockId, LiveRegs)> = vec![(entry, first_live.clone())];
    let mut done: HashSet<u64> = HashSet::new();
    done.insert(state_key(entry, &first_live));

    while let Some((blk, mut live)) = worklist.pop() {
        for &id in func.block(blk).instrs() {
            let instr = func.instr(id);

            for &arg in instr.args() {
                if !func.value(arg).needs_reg() {
                    continue;
                }
                let Some(i) = (match func.value(arg).reg() {
                    Some(r) => regs.index_of(r),
                    None => {
                        errors.push(VerifyError::NoRegAssigned {
                            func: func.full_name.clone(),
                            block: blk.to_string(),
                            value: format!("arg {arg}"),
                        });
                        continue;
                    }
                }) else {
                    // pinned off-palette: not tracked
                    continue;
                };
                if live[i] != Some(arg) {
                    errors.push(VerifyError::WrongValueInReg {
                        func: func.full_name.clone(),
                        block: blk.to_string(),
                        reg: regs.name(canonical[i]),
                        found: occupant(live[i]),
                        want: arg.to_string(),
                    });
                }
            }

            if instr.op.is_call() {
                // arg and temp registers are clobbered by a call
                for slot in live.iter_mut().take(regs.num_caller_saved()) {
                    *slot = None;
                }
            }

            for &def in instr.defs() {
                if !func.value(def).needs_reg() {
                    continue;
                }
                match func.value(def).reg().and_then(|r| regs.index_of(r)) {
                    Some(i) => live[i] = Some(def),
                    None if func.value(def).reg().is_none() => {
                        errors.push(VerifyError::NoRegAssigned {
                            func: func.full_name.clone(),
                            block: blk.to_string(),
                            value: format!("def {def}"),
                        });
                    }
                    None => {}
                }
            }
        }

        let mut arg_offset = 0;
        for s in 0..func.block(blk).num_succs() {
            let succ = func.block(blk).succ(s);
            let offset = arg_offset;
            arg_offset += func.block(succ).num_defs();

            let key = state_key(succ, &live);
            if done.contains(&key) {
                continue;
            }

            let mut succ_live = live.clone();

            // clear argument registers first so a parameter cannot be
            // clobbered by another parameter's old occupant
            for d in 0..func.block(succ).num_defs() {
                let def = func.block(succ).def(d);
                let arg = func.block(blk).arg(offset + d);
                if func.value(def).reg() != func.value(arg).reg() {
                    errors.push(VerifyError::MissingCopy {
                        func: func.full_name.clone(),
                        from: blk.to_string(),
                        to: succ.to_string(),
                        arg: arg.to_string(),
                        def: def.to_string(),
                    });
                    if let Some(i) = index_of(arg) {
                        succ_live[i] = None;
                    }
                }
            }

            for d in 0..func.block(succ).num_defs() {
                let def = func.block(succ).def(d);
                if let Some(i) = index_of(def) {
                    succ_live[i] = Some(def);
                }
            }

            done.insert(key);
            worklist.push((succ, succ_live));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use hbc_ir::{Const, GenOp, Op, Reg, Signature, Type};
    use std::collections::HashMap;

    fn test_regs() -> RegisterSet {
        RegisterSet::new(
            vec![Reg(1), Reg(2)],
            vec![Reg(3), Reg(4)],
            vec![Reg(5), Reg(6)],
            Reg(14),
            Reg(13),
            Reg(0),
            Reg(15),
            HashMap::new(),
        )
    }

    fn reg_value(f: &mut Func, r: Reg) -> ValueId {
        let v = f.new_value(Type::INT);
        f.value_mut(v).set_reg(r);
        v
    }

    #[test]
    fn clean_function_verifies() {
        let mut f = Func::new("f", "t__f", Signature::new(vec![Type::INT], vec![Type::INT]));
        let b0 = f.new_block();
        f.insert_block(-1, b0);
        let p = reg_value(&mut f, Reg(1));
        f.add_block_def(b0, p);
        let cp = f.new_instr(Op::Gen(GenOp::Copy), Some(Type::INT), &[p]);
        f.insert_instr(b0, -1, cp);
        let q = f.instr(cp).def(0);
        f.value_mut(q).set_reg(Reg(1));
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[q]);
        f.insert_instr(b0, -1, ret);

        let regs = test_regs();
        assert!(verify(&f, &regs).is_empty());
    }

    #[test]
    fn missing_assignment_detected() {
        let mut f = Func::new("f", "t__f", Signature::default());
        let b0 = f.new_block();
        f.insert_block(-1, b0);
        let one = f.value_for(Type::UNTYPED_INT, Const::Int(1));
        let cp = f.new_instr(Op::Gen(GenOp::Copy), Some(Type::INT), &[one]);
        f.insert_instr(b0, -1, cp);
        let v = f.instr(cp).def(0);
        // v never gets a register
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[v]);
        f.insert_instr(b0, -1, ret);

        let regs = test_regs();
        let errors = verify(&f, &regs);
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::NoRegAssigned { .. })));
    }

    #[test]
    fn wrong_value_after_clobber_detected() {
        let mut f = Func::new("f", "t__f", Signature::new(vec![Type::INT], vec![]));
        let b0 = f.new_block();
        f.insert_block(-1, b0);
        let p = reg_value(&mut f, Reg(1));
        f.add_block_def(b0, p);
        // another def lands in r1, clobbering p
        let one = f.value_for(Type::UNTYPED_INT, Const::Int(1));
        let cp = f.new_instr(Op::Gen(GenOp::Copy), Some(Type::INT), &[one]);
        f.insert_instr(b0, -1, cp);
        let q = f.instr(cp).def(0);
        f.value_mut(q).set_reg(Reg(1));
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[p]);
        f.insert_instr(b0, -1, ret);

        let regs = test_regs();
        let errors = verify(&f, &regs);
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::WrongValueInReg { .. })));
    }

    #[test]
    fn caller_saved_cleared_by_calls() {
        let mut f = Func::new("f", "t__f", Signature::new(vec![Type::INT], vec![]));
        let b0 = f.new_block();
        f.insert_block(-1, b0);
        // p lives in a temp register across a call
        let p = reg_value(&mut f, Reg(3));
        f.add_block_def(b0, p);
        let callee = f.value_for(Type::Func(vec![], vec![]), Const::Func("t__g".into()));
        let call = f.new_instr(Op::Gen(GenOp::Call), None, &[callee]);
        f.insert_instr(b0, -1, call);
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[p]);
        f.insert_instr(b0, -1, ret);

        let regs = test_regs();
        let errors = verify(&f, &regs);
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::WrongValueInReg { .. })));

        // in a saved register the same shape is fine
        let mut g = Func::new("g", "t__g2", Signature::new(vec![Type::INT], vec![]));
        let gb = g.new_block();
        g.insert_block(-1, gb);
        let q = reg_value(&mut g, Reg(5));
        g.add_block_def(gb, q);
        let callee = g.value_for(Type::Func(vec![], vec![]), Const::Func("t__g".into()));
        let call = g.new_instr(Op::Gen(GenOp::Call), None, &[callee]);
        g.insert_instr(gb, -1, call);
        let ret = g.new_instr(Op::Gen(GenOp::Return), None, &[q]);
        g.insert_instr(gb, -1, ret);
        assert!(verify(&g, &regs).is_empty());
    }

    #[test]
    fn missing_block_param_copy_detected() {
        let mut f = Func::new("f", "t__f", Signature::new(vec![Type::INT], vec![]));
        let b0 = f.new_block();
        let b1 = f.new_block();
        f.insert_block(-1, b0);
        f.insert_block(-1, b1);
        let p = reg_value(&mut f, Reg(1));
        f.add_block_def(b0, p);
        let q = reg_value(&mut f, Reg(2));
        f.add_block_def(b1, q);
        let j = f.new_instr(Op::Gen(GenOp::Jump), None, &[]);
        f.insert_instr(b0, -1, j);
        f.add_succ(b0, b1);
        // the outgoing arg sits in r1 but the param expects r2
        f.insert_arg(b0.into(), -1, p);
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[q]);
        f.insert_instr(b1, -1, ret);

        let regs = test_regs();
        let errors = verify(&f, &regs);
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::MissingCopy { .. })));
    }
}
