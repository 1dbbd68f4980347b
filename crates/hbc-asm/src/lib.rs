//! Assembly emission.
//!
//! Walks the functions reachable from the program entry points in
//! call order, rendering each instruction through the target and
//! laying out referenced globals. The output format is pluggable
//! through [`Formatter`]; the provided [`CustomAsm`] formatter
//! produces text for the customasm assembler.

mod customasm;

pub use customasm::CustomAsm;

use std::collections::HashSet;
use std::fmt::Write as _;

use hbc_ir::{Const, Func, Global, Loc, Program, ValueId};
use hbc_target::Target;
use tracing::debug;

/// Output sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Code,
    Data,
    Bss,
}

/// Hooks a formatter provides for one assembler dialect.
pub trait Formatter {
    fn section(&self, section: Section) -> String;
    fn global_label(&self, global: &Global) -> String;
    fn block_label(&self, id: &str) -> String;
    /// An address relative to the current position, in addressable
    /// units.
    fn pc_rel_address(&self, offset_units: u32) -> String;
    fn word(&self, value: &str) -> String;
    fn string(&self, value: &str) -> String;
    fn reserve(&self, bytes: u32) -> String;
    fn comment(&self, comment: &str) -> String;
}

/// Emits a whole program as assembly text.
pub struct Emitter<'a> {
    target: &'a dyn Target,
    fmter: &'a dyn Formatter,
    out: String,
    section: Option<Section>,
    emitted_funcs: HashSet<String>,
    emitted_globals: HashSet<String>,
}

/// Emit everything reachable from the program entry points.
pub fn emit(prog: &mut Program, target: &dyn Target, fmter: &dyn Formatter) -> String {
    let mut emitter = Emitter {
        target,
        fmter,
        out: String::new(),
        section: None,
        emitted_funcs: HashSet::new(),
        emitted_globals: HashSet::new(),
    };
    emitter.program(prog);
    emitter.out
}

impl<'a> Emitter<'a> {
    fn program(&mut self, prog: &mut Program) {
        let entries: Vec<String> = match prog.package_by_name("main") {
            Some(pkg) => ["init", "main"]
                .iter()
                .filter_map(|n| pkg.func_by_name(n))
                .map(|f| f.full_name.clone())
                .collect(),
            None => Vec::new(),
        };

        if entries.is_empty() {
            // no conventional entry points; emit everything in order
            let names: Vec<String> = prog.funcs().map(|f| f.full_name.clone()).collect();
            for name in names {
                self.assemble(prog, &name);
            }
            return;
        }

        for name in entries {
            self.assemble(prog, &name);
        }
    }

    /// Emit a function, the globals it references, and transitively
    /// every function it calls.
    fn assemble(&mut self, prog: &mut Program, entry: &str) {
        let mut todo: Vec<String> = vec![entry.to_string()];
        let mut seen: HashSet<String> = todo.iter().cloned().collect();

        while let Some(name) = todo.pop() {
            if self.emitted_funcs.contains(&name) {
                continue;
            }
            let Some(func) = prog.func_by_full_name(&name) else {
                continue;
            };

            let (funcs, globals) = scan(func);
            for f in funcs {
                if !seen.contains(&f) && !self.emitted_funcs.contains(&f) {
                    seen.insert(f.clone());
                    todo.push(f);
                }
            }

            for gname in globals {
                if self.emitted_globals.insert(gname.clone()) {
                    if let Some(global) = prog.global_by_full_name_mut(&gname) {
                        global.referenced = true;
                    }
                    if let Some(global) = prog.global_by_full_name(&gname) {
                        let text = self.global(global);
                        self.out.push_str(&text);
                    }
                }
            }

            self.emitted_funcs.insert(name.clone());
            let func = prog.func_by_full_name(&name).expect("func disappeared");
            debug!(func = %func.full_name, "emitting");
            let text = self.func(func);
            self.out.push_str(&text);
        }
    }

    fn ensure_section(&mut self, out: &mut String, section: Section) {
        if self.section != Some(section) {
            writeln!(out, "{}", self.fmter.section(section)).unwrap();
            self.section = Some(section);
        }
    }

    fn func(&mut self, func: &Func) -> String {
        let mut out = String::new();
        self.ensure_section(&mut out, Section::Code);

        let params = func
            .sig
            .params
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let results = match func.sig.results.len() {
            0 => String::new(),
            1 => format!(" {}", func.sig.results[0]),
            _ => format!(
                " ({})",
                func.sig
                    .results
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        writeln!(
            out,
            "{}",
            self.fmter
                .comment(&format!("func {}({}){}", func.full_name, params, results))
        )
        .unwrap();
        writeln!(out, "{}:", func.full_name).unwrap();

        for (b, blk) in func.block_ids().enumerate() {
            let block = func.block(blk);
            writeln!(out, "{}:", self.fmter.block_label(&blk.to_string())).unwrap();

            for (i, &id) in block.instrs().iter().enumerate() {
                let instr = func.instr(id);
                let last = i + 1 == block.num_instrs();

                if last && block.num_succs() == 1 {
                    let succ = block.succ(0);
                    if b + 1 < func.num_blocks() && func.block_at(b + 1) == succ {
                        // falls through
                        continue;
                    }
                }

                let defs: Vec<String> = instr
                    .defs()
                    .iter()
                    .map(|&d| self.value_str(func, d))
                    .collect();
                let mut args: Vec<String> = instr
                    .args()
                    .iter()
                    .map(|&a| self.value_str(func, a))
                    .collect();

                if last && block.num_succs() > 0 {
                    args.push(self.fmter.block_label(&block.succ(0).to_string()));
                }

                writeln!(out, "    {}", self.target.render(instr.op, &defs, &args)).unwrap();
            }
        }

        out.push('\n');
        out
    }

    fn value_str(&self, func: &Func, v: ValueId) -> String {
        let value = func.value(v);
        match &value.loc {
            Loc::Reg(r) => self.target.registers().name(*r),
            Loc::Const(c) => match c {
                Const::Bool(true) => "1".to_string(),
                Const::Bool(false) => "0".to_string(),
                Const::Int(n) => n.to_string(),
                Const::Func(name) | Const::Global(name) => name.clone(),
                Const::Nil => "0".to_string(),
                Const::Str(s) => format!("{s:?}"),
            },
            _ => format!("v{}", v.num()),
        }
    }

    fn global(&mut self, global: &Global) -> String {
        let mut out = String::new();
        let sizes = self.target.sizes();
        match &global.value {
            None => {
                self.ensure_section(&mut out, Section::Bss);
                writeln!(out, "{}:", self.fmter.global_label(global)).unwrap();
                let bytes = sizes.size_of(&global.typ);
                writeln!(out, "{}", self.fmter.reserve(bytes)).unwrap();
            }
            Some(Const::Str(s)) => {
                self.ensure_section(&mut out, Section::Data);
                writeln!(out, "{}:", self.fmter.global_label(global)).unwrap();
                // {pointer, length} header, then the character data
                let units_per_word = sizes.word_bytes * 8 / sizes.min_addressable_bits;
                let header = self.fmter.pc_rel_address(2 * units_per_word);
                writeln!(out, "{}", self.fmter.word(&header)).unwrap();
                writeln!(out, "{}", self.fmter.word(&s.chars().count().to_string())).unwrap();
                writeln!(out, "{}", self.fmter.string(s)).unwrap();
            }
            Some(Const::Int(n)) => {
                self.ensure_section(&mut out, Section::Data);
                writeln!(out, "{}:", self.fmter.global_label(global)).unwrap();
                writeln!(out, "{}", self.fmter.word(&n.to_string())).unwrap();
            }
            Some(Const::Bool(b)) => {
                self.ensure_section(&mut out, Section::Data);
                writeln!(out, "{}:", self.fmter.global_label(global)).unwrap();
                writeln!(out, "{}", self.fmter.word(if *b { "1" } else { "0" })).unwrap();
            }
            Some(other) => {
                self.ensure_section(&mut out, Section::Data);
                writeln!(out, "{}:", self.fmter.global_label(global)).unwrap();
                writeln!(
                    out,
                    "{}",
                    self.fmter.comment(&format!("unsupported initializer {other}"))
                )
                .unwrap();
            }
        }
        out.push('\n');
        out
    }
}

/// Collect the function and global names an emitted function
/// references through its constants.
fn scan(func: &Func) -> (Vec<String>, Vec<String>) {
    let mut funcs = Vec::new();
    let mut globals = Vec::new();
    for id in func.instr_ids() {
        for &arg in func.instr(id).args() {
            if let Some(con) = func.value(arg).constant() {
                match con {
                    Const::Func(name) => funcs.push(name.clone()),
                    Const::Global(name) => globals.push(name.clone()),
                    _ => {}
                }
            }
        }
    }
    (funcs, globals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hbc_ir::{Func, GenOp, Op, Package, Reg, Signature, Type};
    use hbc_rj32::Rj32;

    fn reg_value(f: &mut Func, r: u16) -> hbc_ir::ValueId {
        let v = f.new_value(Type::INT);
        f.value_mut(v).set_reg(Reg(r));
        v
    }

    fn build_program() -> Program {
        let mut prog = Program::new();
        let pkg = prog.add_package(Package::new("main", "main")).unwrap();
        prog.add_global(
            pkg,
            Global {
                name: "out".into(),
                full_name: "main__out".into(),
                typ: Type::INT,
                value: None,
                referenced: false,
            },
        )
        .unwrap();

        let mut main = Func::new("main", "main__main", Signature::default());
        let b0 = main.new_block();
        let b1 = main.new_block();
        main.insert_block(-1, b0);
        main.insert_block(-1, b1);
        let v = reg_value(&mut main, 1);
        let one = main.value_for(Type::UNTYPED_INT, Const::Int(1));
        let cp = main.new_instr(Op::Gen(GenOp::Copy), None, &[]);
        main.insert_arg(cp.into(), -1, one);
        main.add_def(cp.into(), v);
        main.insert_instr(b0, -1, cp);
        let j = main.new_instr(Op::Gen(GenOp::Jump), None, &[]);
        main.insert_instr(b0, -1, j);
        main.add_succ(b0, b1);

        let addr = main.value_for(
            Type::pointer_to(Type::INT),
            Const::Global("main__out".into()),
        );
        let zero = main.value_for(Type::UNTYPED_INT, Const::Int(0));
        let st = main.new_instr(hbc_rj32::Opcode::Store.op(), None, &[addr, zero, v]);
        main.insert_instr(b1, -1, st);
        let r = main.new_instr(hbc_rj32::Opcode::Return.op(), None, &[]);
        main.insert_instr(b1, -1, r);

        prog.add_func(pkg, main).unwrap();
        prog
    }

    #[test]
    fn emits_sections_labels_and_fall_through() {
        let mut prog = build_program();
        let target = Rj32::new();
        let fmter = CustomAsm::new(*target.sizes());
        let asm = emit(&mut prog, &target, &fmter);

        assert!(asm.contains("#bank bss"));
        assert!(asm.contains("main__out:"));
        assert!(asm.contains("#res 2"));
        assert!(asm.contains("#bank code"));
        assert!(asm.contains("; func main__main()"));
        assert!(asm.contains("main__main:"));
        assert!(asm.contains(".b0:"));
        assert!(asm.contains("move r1, 1"));
        // the jump to the next block is suppressed
        assert!(!asm.contains("jump .b1"));
        assert!(asm.contains("store [main__out, 0], r1"));
        assert!(asm.contains("    return"));
        // the referenced global got marked
        assert!(prog.global_by_full_name("main__out").unwrap().referenced);
    }
}
