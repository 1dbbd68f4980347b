//! Generic-to-rj32 opcode translation.
//!
//! Registered on the Legalization stage: register assignments are
//! final here, so two-operand constraints are resolved against real
//! registers, inserting fixup moves where coalescing did not line the
//! operands up.

use hbc_ir::{FuncCursor, GenOp, InstrId, Op, Type, UserId, ValueId};
use hbc_xform::{XformCtx, XformError};

use crate::opcodes::Opcode;

pub(crate) fn translate(cursor: &mut FuncCursor, ctx: &XformCtx) -> Result<(), XformError> {
    let Some(id) = cursor.instr() else { return Ok(()) };
    let Op::Gen(gen) = cursor.func_ref().instr(id).op else {
        return Ok(());
    };

    use GenOp::*;
    match gen {
        Return => retarget(cursor, id, Opcode::Return),
        Jump => retarget(cursor, id, Opcode::Jump),
        Load => retarget(cursor, id, Opcode::Load),
        Store => retarget(cursor, id, Opcode::Store),
        Call => retarget(cursor, id, Opcode::Call),
        Add => two_operand(cursor, ctx, id, Opcode::Add),
        Sub => two_operand(cursor, ctx, id, Opcode::Sub),
        Mul => two_operand(cursor, ctx, id, Opcode::Mul),
        And => two_operand(cursor, ctx, id, Opcode::And),
        Or => two_operand(cursor, ctx, id, Opcode::Or),
        Xor => two_operand(cursor, ctx, id, Opcode::Xor),
        ShiftLeft => two_operand(cursor, ctx, id, Opcode::Shl),
        ShiftRight => {
            let opc = if result_is_signed(cursor, id) {
                Opcode::Asr
            } else {
                Opcode::Shr
            };
            two_operand(cursor, ctx, id, opc)
        }
        Not => two_operand(cursor, ctx, id, Opcode::Not),
        Negate => two_operand(cursor, ctx, id, Opcode::Neg),
        If => fuse_branch(cursor, id),
        _ => Ok(()),
    }
}

fn result_is_signed(cursor: &FuncCursor, id: InstrId) -> bool {
    let func = cursor.func_ref();
    func.value(func.instr(id).def(0)).typ.is_signed()
}

fn retarget(cursor: &mut FuncCursor, id: InstrId, opc: Opcode) -> Result<(), XformError> {
    let args = cursor.func_ref().instr(id).args().to_vec();
    cursor.update(opc.op(), None, &args);
    Ok(())
}

/// Copy `value` into the given register just before the cursor.
fn move_into(cursor: &mut FuncCursor, value: ValueId, reg: hbc_ir::Reg) -> ValueId {
    let typ = cursor.func_ref().value(value).typ.clone();
    let cp = cursor.insert(Op::Gen(GenOp::Copy), Some(typ), &[value]);
    let def = cursor.func_ref().instr(cp).def(0);
    cursor.func().value_mut(def).set_reg(reg);
    def
}

/// Convert a binary or unary ALU op to its two-operand form: the
/// destination register must be the first operand's register. The
/// allocator's coalescing makes this free in the common case; when it
/// is not, fix up with moves, parking a second operand that occupies
/// the destination register in the scratch register first.
fn two_operand(
    cursor: &mut FuncCursor,
    ctx: &XformCtx,
    id: InstrId,
    opc: Opcode,
) -> Result<(), XformError> {
    let (num_defs, num_args, commutative) = {
        let instr = cursor.func_ref().instr(id);
        (instr.num_defs(), instr.num_args(), instr.op.is_commutative())
    };
    if num_defs != 1 || num_args == 0 || num_args > 2 {
        return Ok(());
    }

    let def_reg = {
        let func = cursor.func_ref();
        func.value(func.instr(id).def(0))
            .reg()
            .ok_or_else(|| XformError::Rule {
                rule: "rj32_translate",
                message: format!("{opc:?} result has no register in {}", func.full_name),
            })?
    };

    if num_args == 2 {
        let arg1 = cursor.func_ref().instr(id).arg(1);
        if cursor.func_ref().value(arg1).reg() == Some(def_reg) {
            if commutative {
                // operands swap freely
                let arg0 = cursor.func_ref().instr(id).arg(0);
                cursor.func().replace_arg(id.into(), 1, arg0);
                cursor.func().replace_arg(id.into(), 0, arg1);
            } else {
                let parked = move_into(cursor, arg1, ctx.scratch_reg);
                cursor.func().replace_arg(id.into(), 1, parked);
            }
        }
    }

    let arg0 = cursor.func_ref().instr(id).arg(0);
    if cursor.func_ref().value(arg0).reg() != Some(def_reg) {
        let fixed = move_into(cursor, arg0, def_reg);
        cursor.func().replace_arg(id.into(), 0, fixed);
    }

    let args = cursor.func_ref().instr(id).args().to_vec();
    cursor.update(opc.op(), None, &args);
    Ok(())
}

/// Fuse a comparison with its `if` into a conditional branch,
/// dropping the comparison when it has no other uses. Unsigned
/// operand types select the unsigned branch family.
fn fuse_branch(cursor: &mut FuncCursor, id: InstrId) -> Result<(), XformError> {
    let func = cursor.func_ref();
    let cond = func.instr(id).arg(0);
    let Some(UserId::Instr(cmp)) = func.value(cond).def() else {
        return Err(XformError::Rule {
            rule: "rj32_translate",
            message: format!("if without a compare in {}", func.full_name),
        });
    };
    let Op::Gen(cmp_op) = func.instr(cmp).op else {
        return Ok(());
    };

    let operand_typ = &func.value(func.instr(cmp).arg(0)).typ;
    let unsigned = matches!(operand_typ, Type::Basic(b) if b.is_integer() && !b.is_signed());

    use GenOp::*;
    let branch = match (cmp_op, unsigned) {
        (Equal, _) => Opcode::IfEq,
        (NotEqual, _) => Opcode::IfNe,
        (Less, false) => Opcode::IfLt,
        (LessEqual, false) => Opcode::IfLe,
        (Greater, false) => Opcode::IfGt,
        (GreaterEqual, false) => Opcode::IfGe,
        (Less, true) => Opcode::IfUlt,
        (LessEqual, true) => Opcode::IfUle,
        (Greater, true) => Opcode::IfUgt,
        (GreaterEqual, true) => Opcode::IfUge,
        _ => return Ok(()),
    };

    let cmp_args = func.instr(cmp).args().to_vec();
    cursor.update(branch.op(), None, &cmp_args);
    if cursor.func_ref().value(cursor.func_ref().instr(cmp).def(0)).num_uses() == 0 {
        cursor.remove_instr(cmp);
    }
    Ok(())
}
