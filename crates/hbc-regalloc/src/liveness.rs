//! Live-in / live-out analysis.

use std::collections::HashSet;

use hbc_ir::ValueId;

use crate::{RegAlloc, RegAllocError};

impl<'a> RegAlloc<'a> {
    /// Scan the code from the bottom up to calculate the live-ins and
    /// live-outs of each block.
    ///
    /// A work queue seeded with all blocks in reverse order is
    /// processed to a fixpoint: scanning a block computes its live-in
    /// set from its live-outs, and any change to a predecessor's
    /// live-out set re-enqueues that predecessor. At the fixpoint the
    /// entry block must have no live-ins, otherwise a value is used
    /// that was never defined.
    pub(crate) fn live_in_out_scan(&mut self) -> Result<(), RegAllocError> {
        let num_blocks = self.func.num_blocks();
        let mut work: Vec<usize> = (0..num_blocks).rev().collect();
        let mut in_work = vec![true; num_blocks];

        while let Some(b) = work.first().copied() {
            work.remove(0);
            in_work[b] = false;

            let blk = self.func.block_at(b);
            let block = self.func.block(blk);

            let mut live: HashSet<ValueId> = self.live_outs[b].clone();

            // block args are live just before leaving this block
            for &arg in block.args() {
                if self.func.value(arg).needs_reg() {
                    live.insert(arg);
                }
            }

            for &id in block.instrs().iter().rev() {
                let instr = self.func.instr(id);
                for &def in instr.defs() {
                    live.remove(&def);
                }
                for &use_ in instr.args() {
                    if self.func.value(use_).needs_reg() {
                        live.insert(use_);
                    }
                }
            }

            // block params are defined on entry
            for &def in block.defs() {
                live.remove(&def);
            }

            self.live_ins[b] = live.clone();

            // propagate into predecessors' live-outs
            let preds: Vec<usize> = block
                .preds()
                .iter()
                .map(|&p| self.func.block_index(p))
                .collect();
            for p in preds {
                let mut changed = false;
                for &id in &live {
                    if self.live_outs[p].insert(id) {
                        changed = true;
                    }
                }
                if changed && !in_work[p] {
                    work.push(p);
                    in_work[p] = true;
                }
            }
        }

        if num_blocks > 0 && !self.live_ins[0].is_empty() {
            return Err(RegAllocError::EntryLiveIns(self.func.full_name.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hbc_ir::{Const, Func, GenOp, Op, Reg, Signature, Type};
    use hbc_target::RegisterSet;
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

    #[test]
    fn straight_line_liveness() {
        let mut f = Func::new("f", "t__f", Signature::new(vec![Type::INT], vec![]));
        let b0 = f.new_block();
        let b1 = f.new_block();
        f.insert_block(-1, b0);
        f.insert_block(-1, b1);
        let p = f.new_value(Type::INT);
        f.add_block_def(b0, p);
        let j = f.new_instr(Op::Gen(GenOp::Jump), None, &[]);
        f.insert_instr(b0, -1, j);
        f.add_succ(b0, b1);
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[p]);
        f.insert_instr(b1, -1, ret);

        let regs = test_regs();
        let mut ra = RegAlloc::new(&mut f, &regs);
        ra.live_in_out_scan().unwrap();
        assert!(ra.live_ins(0).is_empty());
        assert!(ra.live_outs(0).contains(&p));
        assert!(ra.live_ins(1).contains(&p));
    }

    #[test]
    fn loop_liveness_reaches_fixpoint() {
        // b0(v) -> b1; b1 uses v and loops to b1 or exits to b2
        let mut f = Func::new("f", "t__f", Signature::new(vec![Type::INT], vec![]));
        let b0 = f.new_block();
        let b1 = f.new_block();
        let b2 = f.new_block();
        let b3 = f.new_block();
        for b in [b0, b1, b2, b3] {
            f.insert_block(-1, b);
        }
        let v = f.new_value(Type::INT);
        f.add_block_def(b0, v);
        let j0 = f.new_instr(Op::Gen(GenOp::Jump), None, &[]);
        f.insert_instr(b0, -1, j0);
        f.add_succ(b0, b1);

        let ten = f.value_for(Type::UNTYPED_INT, Const::Int(10));
        let less = f.new_instr(Op::Gen(GenOp::Less), Some(Type::BOOL), &[v, ten]);
        f.insert_instr(b1, -1, less);
        let cond = f.instr(less).def(0);
        let iff = f.new_instr(Op::Gen(GenOp::If), None, &[cond]);
        f.insert_instr(b1, -1, iff);
        f.add_succ(b1, b2);
        f.add_succ(b1, b3);

        let j2 = f.new_instr(Op::Gen(GenOp::Jump), None, &[]);
        f.insert_instr(b2, -1, j2);
        f.add_succ(b2, b1);

        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[v]);
        f.insert_instr(b3, -1, ret);

        let regs = test_regs();
        let mut ra = RegAlloc::new(&mut f, &regs);
        ra.live_in_out_scan().unwrap();
        // v is live around the whole loop
        for b in 1..=2 {
            assert!(ra.live_ins(b).contains(&v), "v not live into block {b}");
        }
        assert!(ra.live_ins(0).is_empty());
    }

    #[test]
    fn undefined_value_is_entry_live_in() {
        let mut f = Func::new("f", "t__f", Signature::default());
        let b0 = f.new_block();
        f.insert_block(-1, b0);
        let ghost = f.new_value(Type::INT);
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[ghost]);
        f.insert_instr(b0, -1, ret);

        let regs = test_regs();
        let mut ra = RegAlloc::new(&mut f, &regs);
        assert!(matches!(
            ra.live_in_out_scan(),
            Err(RegAllocError::EntryLiveIns(_))
        ));
    }
}
