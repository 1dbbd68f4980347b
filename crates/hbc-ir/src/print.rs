//! Textual IR output.
//!
//! The renderer here is the canonical serialization: the parser in
//! [`crate::parse`] reads exactly this format, and parse-then-emit is
//! stable after one round trip.

use std::fmt::Write as _;

use crate::entity::{BlockId, ValueId};
use crate::func::Func;
use crate::program::{Global, Program};

/// Render a value reference: constants inline, otherwise `v<id>` with
/// a `_r<reg>` suffix once a register is assigned.
pub fn value_ref(func: &Func, id: ValueId) -> String {
    let val = func.value(id);
    if let Some(con) = val.constant() {
        return con.to_string();
    }
    match val.reg() {
        Some(r) => format!("v{}_{}", id.num(), r),
        None => format!("v{}", id.num()),
    }
}

fn param_def(func: &Func, id: ValueId) -> String {
    format!("{}:{}", value_ref(func, id), func.value(id).typ)
}

fn block_label(func: &Func, blk: BlockId, args: &[ValueId]) -> String {
    if args.is_empty() {
        format!(".{}", blk)
    } else {
        let list = args
            .iter()
            .map(|&a| value_ref(func, a))
            .collect::<Vec<_>>()
            .join(", ");
        format!(".{}({})", blk, list)
    }
}

/// Render one function.
pub fn emit_func(out: &mut String, func: &Func) {
    write!(out, "func {}(", func.full_name).unwrap();
    for (i, t) in func.sig.params.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        write!(out, "{}", t).unwrap();
    }
    out.push(')');
    match func.sig.results.len() {
        0 => {}
        1 => write!(out, " {}", func.sig.results[0]).unwrap(),
        _ => {
            out.push_str(" (");
            for (i, t) in func.sig.results.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                write!(out, "{}", t).unwrap();
            }
            out.push(')');
        }
    }
    out.push_str(":\n");

    for blk in func.block_ids() {
        let block = func.block(blk);
        if block.defs().is_empty() {
            writeln!(out, ".{}:", blk).unwrap();
        } else {
            let params = block
                .defs()
                .iter()
                .map(|&d| param_def(func, d))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, ".{}({}):", blk, params).unwrap();
        }

        for &id in block.instrs() {
            let instr = func.instr(id);
            out.push_str("    ");

            if !instr.defs().is_empty() {
                let defs = instr
                    .defs()
                    .iter()
                    .map(|&d| param_def(func, d))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(out, "{} = ", defs).unwrap();
            }

            write!(out, "{}", instr.op).unwrap();

            let mut first = true;
            for &arg in instr.args() {
                out.push_str(if first { " " } else { ", " });
                first = false;
                out.push_str(&value_ref(func, arg));
            }

            if id == block.control() {
                for (s, &succ) in block.succs().iter().enumerate() {
                    out.push_str(if first { " " } else { ", " });
                    first = false;
                    let range = func.succ_arg_range(blk, s);
                    out.push_str(&block_label(func, succ, &block.args()[range]));
                }
            }

            out.push('\n');
        }
    }
}

fn emit_global(out: &mut String, global: &Global) {
    match &global.value {
        Some(con) => writeln!(out, "var {}:{} = {}", global.full_name, global.typ, con).unwrap(),
        None => writeln!(out, "var {}:{}", global.full_name, global.typ).unwrap(),
    }
}

/// Render a whole program, package by package.
pub fn emit_program(prog: &Program) -> String {
    let mut out = String::new();
    for (p, pkg) in prog.packages().iter().enumerate() {
        if p != 0 {
            out.push('\n');
        }
        writeln!(out, "package {} {:?}", pkg.name, pkg.path).unwrap();
        for td in pkg.typedefs() {
            writeln!(out, "type {}:{}", td.name, td.typ).unwrap();
        }
        for global in pkg.globals() {
            emit_global(&mut out, global);
        }
        for func in pkg.funcs() {
            out.push('\n');
            emit_func(&mut out, func);
        }
    }
    out
}

/// Render a single function to a string, mainly for tests and logs.
pub fn func_string(func: &Func) -> String {
    let mut out = String::new();
    emit_func(&mut out, func);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::con::Const;
    use crate::func::Signature;
    use crate::op::{GenOp, Op, Reg};
    use crate::typ::Type;

    #[test]
    fn renders_defs_args_and_succs() {
        let mut f = Func::new("f", "test__f", Signature::new(vec![], vec![Type::INT]));
        let b0 = f.new_block();
        let b1 = f.new_block();
        f.insert_block(-1, b0);
        f.insert_block(-1, b1);

        let p = f.new_value(Type::INT);
        f.add_block_def(b1, p);

        let one = f.value_for(Type::UNTYPED_INT, Const::Int(1));
        let two = f.value_for(Type::UNTYPED_INT, Const::Int(2));
        let add = f.new_instr(Op::Gen(GenOp::Add), Some(Type::INT), &[one, two]);
        f.insert_instr(b0, -1, add);
        let sum = f.instr(add).def(0);

        let j = f.new_instr(Op::Gen(GenOp::Jump), None, &[]);
        f.insert_instr(b0, -1, j);
        f.add_succ(b0, b1);
        f.insert_arg(b0.into(), -1, sum);

        let r = f.new_instr(Op::Gen(GenOp::Return), None, &[p]);
        f.insert_instr(b1, -1, r);

        let text = func_string(&f);
        assert!(text.starts_with("func test__f() int:\n"));
        assert!(text.contains("= add 1, 2"));
        assert!(text.contains("jump .b1("));
        assert!(text.contains("return "));
    }

    #[test]
    fn register_suffixes() {
        let mut f = Func::new("f", "test__f", Signature::default());
        let v = f.new_value(Type::INT);
        f.value_mut(v).set_reg(Reg(5));
        assert_eq!(value_ref(&f, v), format!("v{}_r5", v.num()));
    }
}
