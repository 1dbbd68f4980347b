//! CleanUp: remove redundant copies, sequentialize parallel copies,
//! drop empty blocks.
//!
//! Copy elimination destroys SSA, so nothing after this stage may
//! rely on single definitions.

use std::collections::HashMap;

use hbc_ir::{Func, FuncCursor, GenOp, Op, Reg, ValueId};

use crate::{Registry, Stage, XformCtx, XformDesc, XformError};

pub(crate) fn register(reg: &mut Registry) {
    reg.register(
        XformDesc::new("copy_elim", copy_elim)
            .stage(Stage::CleanUp)
            .on_op(GenOp::Copy),
    );
    reg.register(
        XformDesc::new("sequentialize_copies", sequentialize_copies)
            .stage(Stage::CleanUp)
            .on_op(GenOp::Copy),
    );
}

/// Drop def/arg pairs of a copy that were coalesced into the same
/// register, and the whole instruction once every pair is gone.
fn copy_elim(cursor: &mut FuncCursor, _ctx: &XformCtx) -> Result<(), XformError> {
    let Some(id) = cursor.instr() else { return Ok(()) };
    if !cursor.func_ref().instr(id).op.is_copy() {
        return Ok(());
    }

    let mut i = 0;
    while i < cursor.func_ref().instr(id).num_defs() {
        let def = cursor.func_ref().instr(id).def(i);
        let arg = cursor.func_ref().instr(id).arg(i);
        let def_reg = cursor.func_ref().value(def).reg();
        let arg_reg = cursor.func_ref().value(arg).reg();
        if def_reg.is_some() && def_reg == arg_reg {
            cursor.func().replace_uses_with(def, arg)?;
            cursor.func().remove_arg_at(id.into(), i);
            cursor.func().remove_def_at(id.into(), i);
            cursor.set_changed();
        } else {
            i += 1;
        }
    }

    if cursor.func_ref().instr(id).num_defs() == 0 {
        cursor.remove();
    }
    Ok(())
}

/// Replace a parallel copy by an equivalent sequence of single
/// copies.
///
/// Algorithm 13 from Boissinot's thesis with Sokolovsky's fixes: a
/// ready list of destination registers whose current occupant is no
/// longer needed, a todo list of pending destinations, and a scratch
/// register to break cycles.
fn sequentialize_copies(cursor: &mut FuncCursor, ctx: &XformCtx) -> Result<(), XformError> {
    let Some(id) = cursor.instr() else { return Ok(()) };
    if !cursor.func_ref().instr(id).op.is_copy() || cursor.func_ref().instr(id).num_args() < 2 {
        return Ok(());
    }

    let pairs: Vec<(ValueId, ValueId)> = {
        let instr = cursor.func_ref().instr(id);
        instr.defs().iter().copied().zip(instr.args().iter().copied()).collect()
    };

    let mut ready: Vec<Reg> = Vec::new();
    let mut todo: Vec<Reg> = Vec::new();
    let mut pred: HashMap<Reg, Reg> = HashMap::new();
    let mut loc: HashMap<Reg, Reg> = HashMap::new();
    // register -> the value currently occupying it
    let mut srcs: HashMap<Reg, ValueId> = HashMap::new();
    let mut dests: HashMap<Reg, ValueId> = HashMap::new();
    let mut handled: Vec<ValueId> = Vec::new();

    let reg_of = |cursor: &FuncCursor, v: ValueId, what: &str| {
        cursor.func_ref().value(v).reg().ok_or_else(|| XformError::Rule {
            rule: "sequentialize_copies",
            message: format!("{what} of parallel copy has no register"),
        })
    };

    // same-register pairs belong to copy elimination; wait for it
    // before emitting anything
    for &(def, arg) in &pairs {
        let def_reg = cursor.func_ref().value(def).reg();
        if def_reg.is_some() && def_reg == cursor.func_ref().value(arg).reg() {
            return Ok(());
        }
    }

    for &(def, arg) in &pairs {
        // constants and stack-slot sources have no register to
        // permute; they become plain copies up front
        if cursor.func_ref().value(arg).reg().is_none() {
            emit_copy(cursor, def, arg)?;
            handled.push(def);
            continue;
        }
        let b = reg_of(cursor, def, "def")?;
        let a = reg_of(cursor, arg, "arg")?;
        if dests.contains_key(&b) {
            return Err(XformError::Rule {
                rule: "sequentialize_copies",
                message: format!("{b} assigned twice in one parallel copy"),
            });
        }
        srcs.insert(a, arg);
        dests.insert(b, def);
        loc.insert(a, a);
        pred.insert(b, a);
        todo.push(b);
    }

    for &(def, arg) in &pairs {
        if cursor.func_ref().value(arg).reg().is_none() {
            continue;
        }
        let b = cursor.func_ref().value(def).reg().unwrap();
        if !loc.contains_key(&b) {
            ready.push(b);
        }
    }

    while let Some(pending) = todo.pop() {
        while let Some(b) = ready.pop() {
            let Some(&a) = pred.get(&b) else { continue };
            let c = loc[&a];
            let dst = dests[&b];
            let src = srcs[&c];
            let new_def = emit_copy(cursor, dst, src)?;
            handled.push(dst);
            srcs.insert(b, new_def);
            loc.insert(a, b);
            if a == c {
                ready.push(a);
            }
        }

        // anything left on todo at this point is part of a cycle:
        // park the occupant of `pending` in the scratch register
        if pending != loc[&pred[&pending]] {
            let occupant = srcs[&pending];
            let typ = cursor.func_ref().value(occupant).typ.clone();
            let cp = cursor.insert(Op::Gen(GenOp::Copy), Some(typ), &[occupant]);
            let tmp = cursor.func_ref().instr(cp).def(0);
            cursor.func().value_mut(tmp).set_reg(ctx.scratch_reg);
            srcs.insert(ctx.scratch_reg, tmp);
            loc.insert(pending, ctx.scratch_reg);
            ready.push(pending);
        }
    }

    for def in handled {
        let i = cursor
            .func_ref()
            .instr(id)
            .defs()
            .iter()
            .position(|&d| d == def)
            .expect("handled def still in copy");
        cursor.func().remove_def_at(id.into(), i);
        cursor.func().remove_arg_at(id.into(), i);
    }
    if cursor.func_ref().instr(id).num_defs() == 0 {
        cursor.remove();
    }
    Ok(())
}

/// Insert a single copy realizing `dst = src` before the parallel
/// copy and re-point the uses of `dst` at it.
fn emit_copy(
    cursor: &mut FuncCursor,
    dst: ValueId,
    src: ValueId,
) -> Result<ValueId, XformError> {
    let typ = cursor.func_ref().value(dst).typ.clone();
    let reg = cursor.func_ref().value(dst).reg().ok_or_else(|| XformError::Rule {
        rule: "sequentialize_copies",
        message: "copy destination has no register".into(),
    })?;
    let cp = cursor.insert(Op::Gen(GenOp::Copy), Some(typ), &[src]);
    let def = cursor.func_ref().instr(cp).def(0);
    cursor.func().value_mut(def).set_reg(reg);
    cursor.func().replace_uses_with(dst, def)?;
    Ok(def)
}

/// Remove blocks that only jump onward: single predecessor, single
/// successor, no parameters. Outgoing arguments migrate to the
/// predecessor's matching slot.
pub fn eliminate_empty_blocks(func: &mut Func) {
    loop {
        let candidate = func.block_ids().find(|&blk| {
            let block = func.block(blk);
            func.block_index(blk) != 0
                && block.num_instrs() == 1
                && block.num_preds() == 1
                && block.num_succs() == 1
                && block.num_defs() == 0
                && block.pred(0) != blk
                && block.succ(0) != blk
                && func.instr(block.control()).op.is_branch()
        });
        let Some(blk) = candidate else { return };

        let pred = func.block(blk).pred(0);
        let slot = func
            .block(pred)
            .succs()
            .iter()
            .position(|&s| s == blk)
            .expect("pred/succ lists out of sync");

        let args = func.block(blk).args().to_vec();
        for &arg in &args {
            func.remove_arg(blk.into(), arg);
        }

        func.unlink_block(blk);

        let offset: usize = (0..slot)
            .map(|s| func.block(func.block(pred).succ(s)).num_defs())
            .sum();
        for (i, &arg) in args.iter().enumerate() {
            func.insert_arg(pred.into(), (offset + i) as isize, arg);
        }
    }
}
