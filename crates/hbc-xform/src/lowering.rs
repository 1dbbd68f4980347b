//! Lowering: prepare the IR for register allocation.
//!
//! Every block that passes arguments to successors gets one parallel
//! copy feeding those arguments, decoupling register choices across
//! edges. Two-operand targets additionally get clobber copies so the
//! allocator can coalesce the first operand with the result.

use hbc_ir::{FuncCursor, GenOp, Op, UserId};

use crate::{Registry, Stage, Tag, XformCtx, XformDesc, XformError};

pub(crate) fn register(reg: &mut Registry) {
    reg.register(XformDesc::new("copy_block_args", copy_block_args).stage(Stage::Lowering));
    reg.register(
        XformDesc::new("clobber_copies", clobber_copies)
            .stage(Stage::Lowering)
            .tag(Tag::TwoOperand),
    );
}

/// Insert one parallel copy at the end of each block that passes
/// block arguments, and route the arguments through it. Sequential
/// copies here would impose artificial ordering constraints on
/// register choice; the parallel form leaves the allocator free.
fn copy_block_args(cursor: &mut FuncCursor, _ctx: &XformCtx) -> Result<(), XformError> {
    let blk = cursor.block();
    if cursor.instr_index() + 1 != cursor.func_ref().block(blk).num_instrs() {
        return Ok(());
    }
    let num_args = cursor.func_ref().block(blk).num_args();
    if num_args == 0 {
        return Ok(());
    }

    let all_copied = (0..num_args).all(|a| {
        let arg = cursor.func_ref().block(blk).arg(a);
        match cursor.func_ref().value(arg).def() {
            Some(UserId::Instr(d)) => cursor.func_ref().instr(d).op.is_copy(),
            _ => false,
        }
    });
    if all_copied {
        return Ok(());
    }

    let copy = cursor.insert(Op::Gen(GenOp::Copy), None, &[]);
    for a in 0..num_args {
        let arg = cursor.func_ref().block(blk).arg(a);
        let typ = cursor.func_ref().value(arg).typ.clone();
        cursor.func().insert_arg(copy.into(), -1, arg);
        let def = cursor.func().new_value(typ);
        cursor.func().add_def(copy.into(), def);
        cursor.func().replace_arg(blk.into(), a, def);
    }
    Ok(())
}

/// Generic ops that write over their first operand on a two-operand
/// machine.
fn clobbers_first_operand(op: Op) -> bool {
    use GenOp::*;
    matches!(
        op,
        Op::Gen(Add | Sub | Mul | Div | Rem | And | Or | Xor | ShiftLeft | ShiftRight | AndNot
            | Not | Negate)
    )
}

/// Copy the first operand of clobbering ops so the allocator can give
/// the copy and the result the same register.
fn clobber_copies(cursor: &mut FuncCursor, _ctx: &XformCtx) -> Result<(), XformError> {
    let Some(id) = cursor.instr() else { return Ok(()) };
    let instr = cursor.func_ref().instr(id);
    if !clobbers_first_operand(instr.op) || instr.num_args() < 1 {
        return Ok(());
    }

    let arg = instr.arg(0);
    if let Some(UserId::Instr(d)) = cursor.func_ref().value(arg).def() {
        if cursor.func_ref().instr(d).op.is_copy() {
            return Ok(());
        }
    }

    let typ = cursor.func_ref().value(arg).typ.clone();
    let copy = cursor.insert(Op::Gen(GenOp::Copy), Some(typ), &[arg]);
    let def = cursor.func_ref().instr(copy).def(0);
    cursor.func().replace_arg(id.into(), 0, def);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hbc_ir::{Const, Func, Reg, Signature, Type};
    use std::collections::HashSet;

    struct WordSizes;

    impl crate::SizeOracle for WordSizes {
        fn size_of(&self, _typ: &Type) -> u32 {
            2
        }

        fn word_bytes(&self) -> u32 {
            2
        }

        fn min_addressable_bits(&self) -> u32 {
            16
        }
    }

    fn run_lowering(func: &mut Func, tags: &[Tag]) {
        let sizes = WordSizes;
        let ctx = XformCtx {
            arg_regs: &[Reg(1), Reg(2)],
            scratch_reg: Reg(15),
            sizes: &sizes,
        };
        let registry = Registry::standard();
        let tags: HashSet<Tag> = tags.iter().copied().collect();
        crate::run_stage(Stage::Lowering, func, &registry, &tags, &ctx).unwrap();
    }

    #[test]
    fn block_args_route_through_parallel_copy() {
        let mut f = Func::new("f", "t__f", Signature::new(vec![Type::INT], vec![]));
        let b0 = f.new_block();
        let b1 = f.new_block();
        f.insert_block(-1, b0);
        f.insert_block(-1, b1);
        let p = f.new_value(Type::INT);
        f.add_block_def(b0, p);
        let q = f.new_value(Type::INT);
        f.add_block_def(b1, q);
        let j = f.new_instr(Op::Gen(GenOp::Jump), None, &[]);
        f.insert_instr(b0, -1, j);
        f.add_succ(b0, b1);
        f.insert_arg(b0.into(), -1, p);
        let r = f.new_instr(Op::Gen(GenOp::Return), None, &[]);
        f.insert_instr(b1, -1, r);

        run_lowering(&mut f, &[]);

        let instrs = f.block(b0).instrs().to_vec();
        assert_eq!(instrs.len(), 2);
        let copy = f.instr(instrs[0]);
        assert!(copy.op.is_copy());
        assert_eq!(copy.arg(0), p);
        assert_eq!(f.block(b0).arg(0), copy.def(0));
        f.check_invariants().unwrap();
    }

    #[test]
    fn two_operand_targets_get_clobber_copies() {
        let mut f = Func::new(
            "f",
            "t__f",
            Signature::new(vec![Type::INT, Type::INT], vec![]),
        );
        let b0 = f.new_block();
        f.insert_block(-1, b0);
        let a = f.new_value(Type::INT);
        let b = f.new_value(Type::INT);
        f.add_block_def(b0, a);
        f.add_block_def(b0, b);
        let add = f.new_instr(Op::Gen(GenOp::Add), Some(Type::INT), &[a, b]);
        f.insert_instr(b0, -1, add);
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[]);
        f.insert_instr(b0, -1, ret);

        run_lowering(&mut f, &[Tag::TwoOperand]);

        let instrs = f.block(b0).instrs().to_vec();
        assert_eq!(instrs.len(), 3);
        let copy = f.instr(instrs[0]);
        assert!(copy.op.is_copy());
        assert_eq!(copy.arg(0), a);
        assert_eq!(f.instr(add).arg(0), copy.def(0));
        // without the tag nothing changes
        let mut g = Func::new("g", "t__g", Signature::new(vec![], vec![]));
        let gb = g.new_block();
        g.insert_block(-1, gb);
        let c = g.value_for(Type::INT, Const::Int(1));
        let gadd = g.new_instr(Op::Gen(GenOp::Add), Some(Type::INT), &[c, c]);
        g.insert_instr(gb, -1, gadd);
        let gret = g.new_instr(Op::Gen(GenOp::Return), None, &[]);
        g.insert_instr(gb, -1, gret);
        run_lowering(&mut g, &[]);
        assert_eq!(g.block(gb).num_instrs(), 2);
    }
}
