//! Elaboration: materialize the ABI-visible shape of the program.
//!
//! Calls and returns get parallel copies pinning values to argument
//! registers and stack slots; block arguments that are constants get
//! materializing copies; `if` on a non-compare gets an explicit
//! comparison; field and index address computations lower to integer
//! arithmetic.

use hbc_ir::{Const, FuncCursor, GenOp, Op, Type, UserId, ValueId};

use crate::{Registry, Stage, XformCtx, XformDesc, XformError};

pub(crate) fn register(reg: &mut Registry) {
    reg.register(XformDesc::new("param_copy", param_copy).stage(Stage::Elaboration).once());
    reg.register(
        XformDesc::new("call_abi", call_abi)
            .stage(Stage::Elaboration)
            .on_op(GenOp::Call),
    );
    reg.register(
        XformDesc::new("return_copy", return_copy)
            .stage(Stage::Elaboration)
            .on_op(GenOp::Return)
            .once(),
    );
    reg.register(XformDesc::new("copy_block_args", copy_block_args).stage(Stage::Elaboration));
    reg.register(
        XformDesc::new("if_non_compare", if_non_compare)
            .stage(Stage::Elaboration)
            .on_op(GenOp::If),
    );
    reg.register(
        XformDesc::new("field_addrs", field_addrs)
            .stage(Stage::Elaboration)
            .on_op(GenOp::FieldAddr),
    );
    reg.register(
        XformDesc::new("index_addrs", index_addrs)
            .stage(Stage::Elaboration)
            .on_op(GenOp::IndexAddr),
    );
}

/// Pin the entry block's parameters to the incoming argument
/// registers and stack slots, and detach their uses through a
/// parallel copy so the allocator can move them out of the
/// caller-saved registers when they live across calls.
fn param_copy(cursor: &mut FuncCursor, ctx: &XformCtx) -> Result<(), XformError> {
    if cursor.block_index() != 0 {
        return Ok(());
    }
    let Some(entry) = cursor.func_ref().entry_block() else {
        return Ok(());
    };
    let params: Vec<ValueId> = cursor.func_ref().block(entry).defs().to_vec();
    if params.is_empty() {
        return Ok(());
    }
    let pinned = params
        .iter()
        .any(|&p| !matches!(cursor.func_ref().value(p).loc, hbc_ir::Loc::Temp));
    if pinned {
        return Ok(());
    }

    let k = ctx.arg_regs.len();
    let types: Vec<Type> = params
        .iter()
        .map(|&p| cursor.func_ref().value(p).typ.clone())
        .collect();
    for (i, &p) in params.iter().enumerate() {
        if i < k {
            cursor.func().value_mut(p).set_reg(ctx.arg_regs[i]);
        } else {
            cursor.func().value_mut(p).set_param_slot((i - k) as u32);
        }
    }

    // the copy goes at the very head of the entry block, wherever the
    // cursor currently sits
    let copy = cursor
        .func()
        .new_instr(Op::Gen(GenOp::Copy), Some(Type::Tuple(types)), &params);
    cursor.func().insert_instr(entry, 0, copy);
    for (i, &p) in params.iter().enumerate() {
        let def = cursor.func_ref().instr(copy).def(i);
        cursor.func().replace_uses_with(p, def)?;
        // the walk above re-pointed the copy's own argument too
        cursor.func().replace_arg(copy.into(), i, p);
    }
    cursor.set_changed();
    Ok(())
}

fn def_is_copy(cursor: &FuncCursor, value: ValueId) -> bool {
    match cursor.func_ref().value(value).def() {
        Some(UserId::Instr(d)) => cursor.func_ref().instr(d).op.is_copy(),
        _ => false,
    }
}

/// Pin call arguments and results to the calling convention: a
/// parallel copy before the call writes the first K arguments into
/// the argument registers and the rest into outgoing stack slots; a
/// parallel copy after the call reads the results out of the same
/// locations.
fn call_abi(cursor: &mut FuncCursor, ctx: &XformCtx) -> Result<(), XformError> {
    let id = cursor.instr().expect("cursor on instr");
    let func = cursor.func_ref();
    let instr = func.instr(id);

    let callee_typ = func.value(instr.arg(0)).typ.clone();
    let Type::Func(params, results) = callee_typ else {
        return Err(XformError::Rule {
            rule: "call_abi",
            message: format!("call of non-function value in {}", func.full_name),
        });
    };

    // already elaborated when the args read from a copy and the defs
    // feed one
    if instr.num_args() > 1 && def_is_copy(cursor, cursor.func_ref().instr(id).arg(1)) {
        return Ok(());
    }
    let func = cursor.func_ref();
    let instr = func.instr(id);
    if instr.num_defs() > 0 {
        let d0 = instr.def(0);
        if func.value(d0).num_uses() == 1 {
            if let UserId::Instr(u) = func.value(d0).uses()[0] {
                if func.instr(u).op.is_copy() {
                    return Ok(());
                }
            }
        }
    }

    let k = ctx.arg_regs.len();

    if instr.num_args() > 1 {
        let args: Vec<ValueId> = instr.args()[1..].to_vec();
        let copy = cursor.insert(
            Op::Gen(GenOp::Copy),
            Some(Type::Tuple(params.clone())),
            &args,
        );
        for i in 0..args.len() {
            let def = cursor.func_ref().instr(copy).def(i);
            if i < k {
                cursor.func().value_mut(def).set_reg(ctx.arg_regs[i]);
            } else {
                cursor.func().value_mut(def).set_arg_slot((i - k) as u32);
            }
            cursor.func().replace_arg(id.into(), i + 1, def);
        }
    }

    let num_defs = cursor.func_ref().instr(id).num_defs();
    if num_defs > 0 {
        let defs: Vec<ValueId> = cursor.func_ref().instr(id).defs().to_vec();
        let copy = cursor.insert_after(
            Op::Gen(GenOp::Copy),
            Some(Type::Tuple(results.clone())),
            &defs,
        );
        for (i, &call_def) in defs.iter().enumerate() {
            if i < k {
                cursor.func().value_mut(call_def).set_reg(ctx.arg_regs[i]);
            } else {
                cursor
                    .func()
                    .value_mut(call_def)
                    .set_arg_slot((i - k) as u32);
            }
            let copy_def = cursor.func_ref().instr(copy).def(i);
            cursor.func().replace_uses_with(call_def, copy_def)?;
            // the walk above also re-pointed the copy's own argument
            cursor.func().replace_arg(copy.into(), i, call_def);
        }
    }

    Ok(())
}

/// Pin returned values to the result registers and slots through a
/// preceding parallel copy.
fn return_copy(cursor: &mut FuncCursor, ctx: &XformCtx) -> Result<(), XformError> {
    let id = cursor.instr().expect("cursor on instr");
    let num_args = cursor.func_ref().instr(id).num_args();
    if num_args < 1 {
        return Ok(());
    }

    let results = cursor.func_ref().sig.results.clone();
    let args: Vec<ValueId> = cursor.func_ref().instr(id).args().to_vec();
    let copy = cursor.insert(Op::Gen(GenOp::Copy), Some(Type::Tuple(results)), &args);
    let k = ctx.arg_regs.len();
    for i in 0..num_args {
        let def = cursor.func_ref().instr(copy).def(i);
        if i < k {
            cursor.func().value_mut(def).set_reg(ctx.arg_regs[i]);
        } else {
            cursor.func().value_mut(def).set_arg_slot((i - k) as u32);
        }
        cursor.func().replace_arg(id.into(), i, def);
    }
    Ok(())
}

/// Materialize constant block arguments through copies so every
/// outgoing argument is a register value.
fn copy_block_args(cursor: &mut FuncCursor, _ctx: &XformCtx) -> Result<(), XformError> {
    let blk = cursor.block();
    if cursor.instr_index() + 1 != cursor.func_ref().block(blk).num_instrs() {
        return Ok(());
    }

    let num_succs = cursor.func_ref().block(blk).num_succs();
    let mut offset = 0;
    for s in 0..num_succs {
        let succ = cursor.func_ref().block(blk).succ(s);
        let ndefs = cursor.func_ref().block(succ).num_defs();
        for d in 0..ndefs {
            let arg = cursor.func_ref().block(blk).arg(offset + d);
            if !cursor.func_ref().value(arg).needs_reg() {
                let typ = cursor.func_ref().value(arg).typ.clone();
                let cp = cursor.insert(Op::Gen(GenOp::Copy), Some(typ), &[arg]);
                let def = cursor.func_ref().instr(cp).def(0);
                cursor.func().replace_arg(blk.into(), offset + d, def);
            }
        }
        offset += ndefs;
    }
    Ok(())
}

/// Give every `if` a controlling comparison: a bare boolean becomes
/// `equal v, true`.
fn if_non_compare(cursor: &mut FuncCursor, _ctx: &XformCtx) -> Result<(), XformError> {
    let id = cursor.instr().expect("cursor on instr");
    let arg = cursor.func_ref().instr(id).arg(0);
    if let Some(UserId::Instr(d)) = cursor.func_ref().value(arg).def() {
        if cursor.func_ref().instr(d).op.is_compare() {
            return Ok(());
        }
    }
    let typ = cursor.func_ref().value(arg).typ.clone();
    if !typ.is_bool() {
        return Err(XformError::Rule {
            rule: "if_non_compare",
            message: format!("if on non-boolean {typ}"),
        });
    }

    let tru = cursor
        .func()
        .value_for(Type::UNTYPED_BOOL, Const::Bool(true));
    let eq = cursor.insert(Op::Gen(GenOp::Equal), Some(typ), &[arg, tru]);
    let def = cursor.func_ref().instr(eq).def(0);
    cursor.func().replace_arg(id.into(), 0, def);
    cursor.set_changed();
    Ok(())
}

/// `field_addr field, base` becomes `add base, offset`, or collapses
/// to the base pointer when the field sits at offset zero.
fn field_addrs(cursor: &mut FuncCursor, ctx: &XformCtx) -> Result<(), XformError> {
    let id = cursor.instr().expect("cursor on instr");
    let func = cursor.func_ref();
    let instr = func.instr(id);

    let field = func
        .value(instr.arg(0))
        .constant()
        .and_then(Const::as_int)
        .ok_or_else(|| XformError::Rule {
            rule: "field_addrs",
            message: "field index is not an int constant".into(),
        })? as usize;
    let base = instr.arg(1);

    let fields = match &func.value(base).typ {
        Type::Pointer(elem) => match elem.as_ref() {
            Type::Struct(fields) => fields.clone(),
            other => {
                return Err(XformError::Rule {
                    rule: "field_addrs",
                    message: format!("field_addr through non-struct {other}"),
                })
            }
        },
        other => {
            return Err(XformError::Rule {
                rule: "field_addrs",
                message: format!("field_addr of non-pointer {other}"),
            })
        }
    };

    let offsets = ctx.sizes.offsets_of(&fields);
    let offset = offsets[field];
    let field_ptr = Type::pointer_to(fields[field].clone());

    if offset == 0 {
        let def = cursor.func_ref().instr(id).def(0);
        cursor.func().replace_uses_with(def, base)?;
        cursor.remove();
        return Ok(());
    }

    let off = cursor
        .func()
        .value_for(Type::UNTYPED_INT, Const::Int(offset as i64));
    cursor.update(Op::Gen(GenOp::Add), Some(field_ptr), &[base, off]);
    Ok(())
}

/// `index_addr base, index` becomes `mul index, elem_size` followed
/// by `add base, product`.
fn index_addrs(cursor: &mut FuncCursor, ctx: &XformCtx) -> Result<(), XformError> {
    let id = cursor.instr().expect("cursor on instr");
    let func = cursor.func_ref();
    let instr = func.instr(id);
    let def = instr.def(0);

    let elem = match &func.value(def).typ {
        Type::Pointer(elem) => elem.as_ref().clone(),
        other => {
            return Err(XformError::Rule {
                rule: "index_addrs",
                message: format!("index_addr defining non-pointer {other}"),
            })
        }
    };

    let size = ctx.sizes.size_of(&elem);
    let index = instr.arg(1);
    let sizev = cursor
        .func()
        .value_for(Type::UNTYPED_INT, Const::Int(size as i64));
    let mul = cursor.insert(Op::Gen(GenOp::Mul), Some(Type::INT), &[index, sizev]);
    let product = cursor.func_ref().instr(mul).def(0);
    cursor.func().instr_mut(id).op = Op::Gen(GenOp::Add);
    cursor.func().replace_arg(id.into(), 1, product);
    cursor.set_changed();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hbc_ir::{Func, Reg, Signature};
    use std::collections::HashSet;

    struct WordSizes;

    impl crate::SizeOracle for WordSizes {
        fn size_of(&self, typ: &Type) -> u32 {
            match typ {
                Type::Struct(fields) => fields.iter().map(|f| self.size_of(f)).sum(),
                Type::Array(n, elem) => *n as u32 * self.size_of(elem),
                _ => 2,
            }
        }

        fn word_bytes(&self) -> u32 {
            2
        }

        fn min_addressable_bits(&self) -> u32 {
            16
        }
    }

    const ARG_REGS: &[Reg] = &[Reg(1), Reg(2), Reg(3), Reg(4)];

    fn run_elab(func: &mut Func) {
        let sizes = WordSizes;
        let ctx = XformCtx {
            arg_regs: ARG_REGS,
            scratch_reg: Reg(15),
            sizes: &sizes,
        };
        let registry = Registry::standard();
        crate::run_stage(Stage::Elaboration, func, &registry, &HashSet::new(), &ctx).unwrap();
    }

    #[test]
    fn return_gets_pinned_copy() {
        let mut f = Func::new("f", "t__f", Signature::new(vec![], vec![Type::INT]));
        let b0 = f.new_block();
        f.insert_block(-1, b0);
        let c = f.value_for(Type::INT, Const::Int(7));
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[c]);
        f.insert_instr(b0, -1, ret);

        run_elab(&mut f);

        let instrs = f.block(b0).instrs().to_vec();
        assert_eq!(instrs.len(), 2);
        let copy = f.instr(instrs[0]);
        assert!(copy.op.is_copy());
        assert_eq!(f.value(copy.def(0)).reg(), Some(ARG_REGS[0]));
        assert_eq!(f.instr(instrs[1]).arg(0), copy.def(0));
        f.check_invariants().unwrap();
    }

    #[test]
    fn call_gets_arg_and_result_copies() {
        let mut f = Func::new("f", "t__f", Signature::new(vec![], vec![]));
        let b0 = f.new_block();
        f.insert_block(-1, b0);
        let callee = f.value_for(
            Type::Func(vec![Type::INT], vec![Type::INT]),
            Const::Func("t__g".into()),
        );
        let x = f.value_for(Type::INT, Const::Int(3));
        let call = f.new_instr(Op::Gen(GenOp::Call), Some(Type::INT), &[callee, x]);
        f.insert_instr(b0, -1, call);
        let result = f.instr(call).def(0);
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[result]);
        f.insert_instr(b0, -1, ret);

        run_elab(&mut f);

        let instrs = f.block(b0).instrs().to_vec();
        // param copy, call, result copy, return copy, return
        assert_eq!(instrs.len(), 5);
        assert!(f.instr(instrs[0]).op.is_copy());
        assert_eq!(f.instr(instrs[1]).op, Op::Gen(GenOp::Call));
        assert!(f.instr(instrs[2]).op.is_copy());
        // the call's arg now reads from the pinned copy def
        let call_arg = f.instr(instrs[1]).arg(1);
        assert_eq!(f.value(call_arg).reg(), Some(ARG_REGS[0]));
        // the call's def itself is pinned to the first result register
        assert_eq!(f.value(result).reg(), Some(ARG_REGS[0]));
        f.check_invariants().unwrap();
    }

    #[test]
    fn if_on_bare_bool_gets_compare() {
        let mut f = Func::new(
            "f",
            "t__f",
            Signature::new(vec![Type::BOOL], vec![]),
        );
        let b0 = f.new_block();
        let b1 = f.new_block();
        let b2 = f.new_block();
        for b in [b0, b1, b2] {
            f.insert_block(-1, b);
        }
        let p = f.new_value(Type::BOOL);
        f.add_block_def(b0, p);
        let iff = f.new_instr(Op::Gen(GenOp::If), None, &[p]);
        f.insert_instr(b0, -1, iff);
        f.add_succ(b0, b1);
        f.add_succ(b0, b2);
        for b in [b1, b2] {
            let r = f.new_instr(Op::Gen(GenOp::Return), None, &[]);
            f.insert_instr(b, -1, r);
        }

        run_elab(&mut f);

        // param copy, synthesized compare, if
        let instrs = f.block(b0).instrs().to_vec();
        assert_eq!(instrs.len(), 3);
        assert!(f.instr(instrs[0]).op.is_copy());
        assert_eq!(f.value(p).reg(), Some(ARG_REGS[0]));
        assert_eq!(f.instr(instrs[1]).op, Op::Gen(GenOp::Equal));
        assert_eq!(f.instr(instrs[2]).arg(0), f.instr(instrs[1]).def(0));
        f.check_invariants().unwrap();
    }

    #[test]
    fn index_addr_lowers_to_mul_add() {
        let mut f = Func::new(
            "f",
            "t__f",
            Signature::new(vec![Type::pointer_to(Type::array_of(8, Type::INT)), Type::INT], vec![]),
        );
        let b0 = f.new_block();
        f.insert_block(-1, b0);
        let base = f.new_value(Type::pointer_to(Type::array_of(8, Type::INT)));
        let idx = f.new_value(Type::INT);
        f.add_block_def(b0, base);
        f.add_block_def(b0, idx);
        let ia = f.new_instr(
            Op::Gen(GenOp::IndexAddr),
            Some(Type::pointer_to(Type::INT)),
            &[base, idx],
        );
        f.insert_instr(b0, -1, ia);
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[]);
        f.insert_instr(b0, -1, ret);

        run_elab(&mut f);

        // param copy, mul, add, return
        let instrs = f.block(b0).instrs().to_vec();
        assert_eq!(instrs.len(), 4);
        assert!(f.instr(instrs[0]).op.is_copy());
        assert_eq!(f.instr(instrs[1]).op, Op::Gen(GenOp::Mul));
        assert_eq!(f.instr(instrs[2]).op, Op::Gen(GenOp::Add));
        f.check_invariants().unwrap();
    }

    #[test]
    fn field_addr_offset_zero_collapses() {
        let strct = Type::Struct(vec![Type::INT, Type::INT]);
        let mut f = Func::new(
            "f",
            "t__f",
            Signature::new(vec![Type::pointer_to(strct.clone())], vec![]),
        );
        let b0 = f.new_block();
        f.insert_block(-1, b0);
        let base = f.new_value(Type::pointer_to(strct));
        f.add_block_def(b0, base);
        let zero = f.value_for(Type::UNTYPED_INT, Const::Int(0));
        let fa = f.new_instr(
            Op::Gen(GenOp::FieldAddr),
            Some(Type::pointer_to(Type::INT)),
            &[zero, base],
        );
        f.insert_instr(b0, -1, fa);
        let def = f.instr(fa).def(0);
        let store = f.new_instr(Op::Gen(GenOp::Store), None, &[def, base]);
        f.insert_instr(b0, -1, store);
        let ret = f.new_instr(Op::Gen(GenOp::Return), None, &[]);
        f.insert_instr(b0, -1, ret);

        run_elab(&mut f);

        // param copy, store, return: the field_addr collapsed into
        // its base pointer (as routed through the param copy)
        let instrs = f.block(b0).instrs().to_vec();
        assert_eq!(instrs.len(), 3);
        let routed_base = f.instr(instrs[0]).def(0);
        assert_eq!(f.instr(instrs[1]).op, Op::Gen(GenOp::Store));
        assert_eq!(f.instr(instrs[1]).arg(0), routed_base);
        f.check_invariants().unwrap();
    }
}
