//! Generic-to-a32 opcode translation. Three-operand, so plain
//! retargeting throughout; only shift-right direction and branch
//! fusion need looking at.

use hbc_ir::{FuncCursor, GenOp, InstrId, Op, Type, UserId};
use hbc_xform::{XformCtx, XformError};

use crate::opcodes::Opcode;

pub(crate) fn translate(cursor: &mut FuncCursor, _ctx: &XformCtx) -> Result<(), XformError> {
    let Some(id) = cursor.instr() else { return Ok(()) };
    let Op::Gen(gen) = cursor.func_ref().instr(id).op else {
        return Ok(());
    };

    use GenOp::*;
    let opc = match gen {
        Return => Opcode::Ret,
        Jump => Opcode::Jump,
        Call => Opcode::Call,
        Load => Opcode::Ldw,
        Store => Opcode::Stw,
        Add => Opcode::Add,
        Sub => Opcode::Sub,
        Mul => Opcode::Mul,
        Div => Opcode::Div,
        Rem => Opcode::Rem,
        And => Opcode::And,
        Or => Opcode::Or,
        Xor => Opcode::Xor,
        ShiftLeft => Opcode::Shl,
        ShiftRight => {
            let func = cursor.func_ref();
            if func.value(func.instr(id).def(0)).typ.is_signed() {
                Opcode::Asr
            } else {
                Opcode::Shr
            }
        }
        Not => Opcode::Not,
        Negate => Opcode::Neg,
        If => return fuse_branch(cursor, id),
        _ => return Ok(()),
    };

    let args = cursor.func_ref().instr(id).args().to_vec();
    cursor.update(opc.op(), None, &args);
    Ok(())
}

fn fuse_branch(cursor: &mut FuncCursor, id: InstrId) -> Result<(), XformError> {
    let func = cursor.func_ref();
    let cond = func.instr(id).arg(0);
    let Some(UserId::Instr(cmp)) = func.value(cond).def() else {
        return Err(XformError::Rule {
            rule: "a32_translate",
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
    if cursor
        .func_ref()
        .value(cursor.func_ref().instr(cmp).def(0))
        .num_uses()
        == 0
    {
        cursor.remove_instr(cmp);
    }
    Ok(())
}
