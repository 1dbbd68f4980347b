//! Simplification: target-guided pattern rewrites on generic IR.

use hbc_ir::{Const, FuncCursor, GenOp, Op, Type, UserId, ValueId};

use crate::{Registry, Stage, Tag, XformCtx, XformDesc, XformError};

pub(crate) fn register(reg: &mut Registry) {
    reg.register(
        XformDesc::new("swap_if_branches", swap_if_branches)
            .stage(Stage::Simplification)
            .on_op(GenOp::If),
    );
    reg.register(
        XformDesc::new("load_offset", load_offset)
            .stage(Stage::Simplification)
            .on_op(GenOp::Load)
            .tag(Tag::LoadStoreOffset),
    );
    reg.register(
        XformDesc::new("store_offset", store_offset)
            .stage(Stage::Simplification)
            .on_op(GenOp::Store)
            .tag(Tag::LoadStoreOffset),
    );
}

/// When the `if`'s false branch is not the next block but the true
/// branch is, negate the condition and swap the successors so the
/// false edge falls through.
fn swap_if_branches(cursor: &mut FuncCursor, _ctx: &XformCtx) -> Result<(), XformError> {
    let id = cursor.instr().expect("cursor on instr");
    let blk = cursor.block();
    let func = cursor.func_ref();
    let block = func.block(blk);
    if block.num_succs() != 2 {
        return Ok(());
    }

    let here = func.block_index(blk);
    let false_next = func.block_index(block.succ(1)) == here + 1;
    if false_next {
        return Ok(());
    }
    let true_next = func.block_index(block.succ(0)) == here + 1;
    if !true_next {
        return Err(XformError::Rule {
            rule: "swap_if_branches",
            message: format!("unable to legalize branch in {}", func.full_name),
        });
    }

    let cond = func.instr(id).arg(0);
    let compare = match func.value(cond).def() {
        Some(UserId::Instr(d)) if func.instr(d).op.is_compare() => Some(d),
        _ => None,
    };

    match compare.and_then(|d| cursor.func_ref().instr(d).op.opposite().map(|op| (d, op))) {
        Some((d, opposite)) => {
            let args = cursor.func_ref().instr(d).args().to_vec();
            cursor.func().update_instr(d, opposite, None, &args);
        }
        None => {
            let typ = cursor.func_ref().value(cond).typ.clone();
            let not = cursor.insert(Op::Gen(GenOp::Not), Some(typ), &[cond]);
            let def = cursor.func_ref().instr(not).def(0);
            cursor.func().replace_arg(id.into(), 0, def);
        }
    }

    cursor.func().swap_succs(blk);
    cursor.set_changed();
    Ok(())
}

/// The add feeding an address operand, if it can be folded away: a
/// single-use `add base, const`.
fn foldable_offset(cursor: &FuncCursor, addr: ValueId) -> Option<hbc_ir::InstrId> {
    let func = cursor.func_ref();
    if func.value(addr).is_const() {
        return None;
    }
    match func.value(addr).def() {
        Some(UserId::Instr(add)) => {
            let instr = func.instr(add);
            if instr.op == Op::Gen(GenOp::Add)
                && instr.num_args() == 2
                && func.value(instr.arg(1)).is_const()
                && func.value(instr.def(0)).num_uses() == 1
            {
                Some(add)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Fold `add base, const` into the following load as `(base, const)`,
/// or materialize an explicit zero offset.
fn load_offset(cursor: &mut FuncCursor, _ctx: &XformCtx) -> Result<(), XformError> {
    let id = cursor.instr().expect("cursor on instr");
    if cursor.func_ref().instr(id).num_args() > 1 {
        return Ok(());
    }

    let addr = cursor.func_ref().instr(id).arg(0);
    match foldable_offset(cursor, addr) {
        Some(add) => {
            let base = cursor.func_ref().instr(add).arg(0);
            let off = cursor.func_ref().instr(add).arg(1);
            cursor.func().replace_arg(id.into(), 0, base);
            cursor.func().insert_arg(id.into(), -1, off);
            cursor.remove_instr(add);
        }
        None => {
            let zero = cursor
                .func()
                .value_for(Type::UNTYPED_INT, Const::Int(0));
            cursor.func().insert_arg(id.into(), 1, zero);
        }
    }
    Ok(())
}

/// Same as [`load_offset`] for stores: `(addr, offset, value)`.
fn store_offset(cursor: &mut FuncCursor, _ctx: &XformCtx) -> Result<(), XformError> {
    let id = cursor.instr().expect("cursor on instr");
    if cursor.func_ref().instr(id).num_args() > 2 {
        return Ok(());
    }

    let addr = cursor.func_ref().instr(id).arg(0);
    match foldable_offset(cursor, addr) {
        Some(add) => {
            let base = cursor.func_ref().instr(add).arg(0);
            let off = cursor.func_ref().instr(add).arg(1);
            cursor.func().replace_arg(id.into(), 0, base);
            cursor.func().insert_arg(id.into(), 1, off);
            cursor.remove_instr(add);
        }
        None => {
            let zero = cursor
                .func()
                .value_for(Type::UNTYPED_INT, Const::Int(0));
            cursor.func().insert_arg(id.into(), 1, zero);
        }
    }
    Ok(())
}
