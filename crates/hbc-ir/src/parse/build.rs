//! AST-to-IR build step.
//!
//! Creates program entities from parsed lines, resolving forward
//! references: blocks are pre-created from their headers, values go
//! through placeholder sentinels until defined.

use std::collections::HashMap;
use std::str::FromStr;

use super::{Line, POperand, ParseError, PDef, PInstr};
use crate::con::Const;
use crate::entity::{BlockId, ValueId};
use crate::func::{Func, Signature};
use crate::op::{GenOp, Op};
use crate::program::{Global, Package, Program, TypeDef};
use crate::typ::Type;

#[derive(Debug)]
struct RawFunc {
    line: usize,
    full_name: String,
    params: Vec<Type>,
    results: Vec<Type>,
    blocks: Vec<RawBlock>,
}

#[derive(Debug)]
struct RawBlock {
    line: usize,
    label: u32,
    params: Vec<PDef>,
    instrs: Vec<(usize, PInstr)>,
}

#[derive(Debug)]
struct RawPackage {
    name: String,
    path: String,
    typedefs: Vec<(String, Type)>,
    globals: Vec<(usize, String, Type, Option<Const>)>,
    funcs: Vec<RawFunc>,
}

fn short_name(full: &str) -> String {
    full.rsplit("__").next().unwrap_or(full).to_string()
}

fn group(lines: Vec<(usize, Line)>) -> Result<Vec<RawPackage>, Vec<ParseError>> {
    let mut errors = Vec::new();
    let mut packages: Vec<RawPackage> = Vec::new();

    for (lineno, line) in lines {
        match line {
            Line::Package { name, path } => packages.push(RawPackage {
                name,
                path,
                typedefs: Vec::new(),
                globals: Vec::new(),
                funcs: Vec::new(),
            }),
            other => {
                let Some(pkg) = packages.last_mut() else {
                    // a bare function stream gets an implicit package
                    packages.push(RawPackage {
                        name: "main".into(),
                        path: "main".into(),
                        typedefs: Vec::new(),
                        globals: Vec::new(),
                        funcs: Vec::new(),
                    });
                    match place(packages.last_mut().unwrap(), lineno, other) {
                        Ok(()) => continue,
                        Err(e) => {
                            errors.push(e);
                            continue;
                        }
                    }
                };
                if let Err(e) = place(pkg, lineno, other) {
                    errors.push(e);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(packages)
    } else {
        Err(errors)
    }
}

fn place(pkg: &mut RawPackage, lineno: usize, line: Line) -> Result<(), ParseError> {
    match line {
        Line::Package { .. } => unreachable!(),
        Line::TypeDef { name, typ } => {
            pkg.typedefs.push((name, typ));
            Ok(())
        }
        Line::Global {
            full_name,
            typ,
            value,
        } => {
            pkg.globals.push((lineno, full_name, typ, value));
            Ok(())
        }
        Line::FuncHeader {
            full_name,
            params,
            results,
        } => {
            pkg.funcs.push(RawFunc {
                line: lineno,
                full_name,
                params,
                results,
                blocks: Vec::new(),
            });
            Ok(())
        }
        Line::BlockHeader { label, params } => {
            let func = pkg
                .funcs
                .last_mut()
                .ok_or_else(|| ParseError::new(lineno, "block header outside a function"))?;
            func.blocks.push(RawBlock {
                line: lineno,
                label,
                params,
                instrs: Vec::new(),
            });
            Ok(())
        }
        Line::Instr(instr) => {
            let block = pkg
                .funcs
                .last_mut()
                .and_then(|f| f.blocks.last_mut())
                .ok_or_else(|| ParseError::new(lineno, "instruction outside a block"))?;
            block.instrs.push((lineno, instr));
            Ok(())
        }
    }
}

/// Cross-package context: signatures and global types for resolving
/// named references.
struct Names {
    func_sigs: HashMap<String, (Vec<Type>, Vec<Type>)>,
    global_types: HashMap<String, Type>,
}

fn collect_names(packages: &[RawPackage]) -> Names {
    let mut func_sigs = HashMap::new();
    let mut global_types = HashMap::new();
    for pkg in packages {
        for f in &pkg.funcs {
            func_sigs.insert(f.full_name.clone(), (f.params.clone(), f.results.clone()));
        }
        for (_, name, typ, _) in &pkg.globals {
            global_types.insert(name.clone(), typ.clone());
        }
    }
    Names {
        func_sigs,
        global_types,
    }
}

struct FuncBuilder<'a> {
    func: Func,
    names: &'a Names,
    blocks: HashMap<u32, BlockId>,
    values: HashMap<u32, ValueId>,
    errors: Vec<ParseError>,
}

impl<'a> FuncBuilder<'a> {
    fn build(raw: &RawFunc, names: &'a Names) -> Result<Func, Vec<ParseError>> {
        let sig = Signature::new(raw.params.clone(), raw.results.clone());
        let mut b = FuncBuilder {
            func: Func::new(short_name(&raw.full_name), raw.full_name.clone(), sig),
            names,
            blocks: HashMap::new(),
            values: HashMap::new(),
            errors: Vec::new(),
        };

        // blocks first so branches can reference ahead
        for rb in &raw.blocks {
            let id = b.func.new_block();
            b.func.insert_block(-1, id);
            if b.blocks.insert(rb.label, id).is_some() {
                b.errors
                    .push(ParseError::new(rb.line, format!("duplicate block .b{}", rb.label)));
            }
        }

        for rb in &raw.blocks {
            let blk = b.blocks[&rb.label];
            for p in &rb.params {
                let val = b.define(rb.line, p);
                b.func.add_block_def(blk, val);
            }
            for (lineno, instr) in &rb.instrs {
                b.instr(*lineno, blk, instr);
            }
        }

        let unresolved: Vec<String> = b.func.placeholder_labels().map(String::from).collect();
        for label in unresolved {
            b.errors.push(ParseError::new(
                raw.line,
                format!("undefined value {label} in {}", raw.full_name),
            ));
        }

        if b.errors.is_empty() {
            if let Err(err) = b.func.check_invariants() {
                b.errors.push(ParseError::new(raw.line, err.to_string()));
            }
        }

        if b.errors.is_empty() {
            Ok(b.func)
        } else {
            Err(b.errors)
        }
    }

    /// Create the value for a textual definition and resolve any
    /// pending forward references to it.
    fn define(&mut self, lineno: usize, def: &PDef) -> ValueId {
        let val = self.func.new_value(def.typ.clone());
        if let Some(r) = def.reg {
            self.func.value_mut(val).set_reg(crate::op::Reg(r));
        }
        let label = format!("v{}", def.id);
        if self.func.placeholder_labels().any(|l| l == label) {
            if let Err(err) = self.func.resolve_placeholder(&label, val) {
                self.errors.push(ParseError::new(lineno, err.to_string()));
            }
        }
        if self.values.insert(def.id, val).is_some() {
            self.errors
                .push(ParseError::new(lineno, format!("redefinition of v{}", def.id)));
        }
        val
    }

    fn operand(&mut self, lineno: usize, op: &POperand) -> Option<ValueId> {
        match op {
            POperand::Value { id, .. } => Some(match self.values.get(id) {
                Some(&v) => v,
                None => self.func.placeholder_for(&format!("v{id}")),
            }),
            POperand::Int(v) => Some(self.func.value_for(Type::UNTYPED_INT, Const::Int(*v))),
            POperand::Bool(v) => Some(self.func.value_for(Type::UNTYPED_BOOL, Const::Bool(*v))),
            POperand::Nil => Some(self.func.value_for(Type::Interface, Const::Nil)),
            POperand::Str(s) => Some(self.func.value_for(Type::STR, Const::Str(s.clone()))),
            POperand::Global(name) => match self.names.global_types.get(name) {
                Some(typ) => Some(self.func.value_for(
                    Type::pointer_to(typ.clone()),
                    Const::Global(name.clone()),
                )),
                None => {
                    self.errors
                        .push(ParseError::new(lineno, format!("unknown global ^{name}")));
                    None
                }
            },
            POperand::Ident(name) => match self.names.func_sigs.get(name) {
                Some((params, results)) => Some(self.func.value_for(
                    Type::Func(params.clone(), results.clone()),
                    Const::Func(name.clone()),
                )),
                None => {
                    self.errors
                        .push(ParseError::new(lineno, format!("unknown function {name}")));
                    None
                }
            },
            POperand::BlockRef { .. } => {
                self.errors.push(ParseError::new(
                    lineno,
                    "nested block reference".to_string(),
                ));
                None
            }
        }
    }

    fn instr(&mut self, lineno: usize, blk: BlockId, raw: &PInstr) {
        let op = match GenOp::from_str(&raw.op) {
            Ok(op) => Op::Gen(op),
            Err(_) => {
                self.errors
                    .push(ParseError::new(lineno, format!("unknown opcode {}", raw.op)));
                return;
            }
        };

        let mut args = Vec::new();
        let mut succs: Vec<(u32, Vec<ValueId>)> = Vec::new();
        for operand in &raw.operands {
            if let POperand::BlockRef { label, args: brefs } = operand {
                let mut resolved = Vec::new();
                for a in brefs {
                    if let Some(v) = self.operand(lineno, a) {
                        resolved.push(v);
                    }
                }
                succs.push((*label, resolved));
            } else if let Some(v) = self.operand(lineno, operand) {
                args.push(v);
            }
        }

        let id = self.func.new_instr(op, None, &args);
        self.func.instr_mut(id).pos = crate::instr::Pos(lineno as u32);
        for def in &raw.defs {
            let val = self.define(lineno, def);
            self.func.add_def(id.into(), val);
        }
        self.func.insert_instr(blk, -1, id);

        for (label, block_args) in succs {
            match self.blocks.get(&label) {
                Some(&succ) => {
                    self.func.add_succ(blk, succ);
                    for v in block_args {
                        self.func.insert_arg(blk.into(), -1, v);
                    }
                }
                None => self
                    .errors
                    .push(ParseError::new(lineno, format!("unknown block .b{label}"))),
            }
        }
    }
}

pub(crate) fn build_program(lines: Vec<(usize, Line)>) -> Result<Program, Vec<ParseError>> {
    let packages = group(lines)?;
    let names = collect_names(&packages);

    let mut errors = Vec::new();
    let mut prog = Program::new();
    for raw_pkg in &packages {
        let idx = match prog.add_package(Package::new(&raw_pkg.name, &raw_pkg.path)) {
            Ok(idx) => idx,
            Err(err) => {
                errors.push(ParseError::new(0, err.to_string()));
                continue;
            }
        };
        for (name, typ) in &raw_pkg.typedefs {
            prog.add_typedef(
                idx,
                TypeDef {
                    name: name.clone(),
                    typ: typ.clone(),
                },
            );
        }
        for (lineno, full_name, typ, value) in &raw_pkg.globals {
            let global = Global {
                name: short_name(full_name),
                full_name: full_name.clone(),
                typ: typ.clone(),
                value: value.clone(),
                referenced: false,
            };
            if let Err(err) = prog.add_global(idx, global) {
                errors.push(ParseError::new(*lineno, err.to_string()));
            }
        }
        for raw_func in &raw_pkg.funcs {
            match FuncBuilder::build(raw_func, &names) {
                Ok(func) => {
                    if let Err(err) = prog.add_func(idx, func) {
                        errors.push(ParseError::new(raw_func.line, err.to_string()));
                    }
                }
                Err(errs) => errors.extend(errs),
            }
        }
    }

    if errors.is_empty() {
        Ok(prog)
    } else {
        Err(errors)
    }
}

pub(crate) fn build_single_func(lines: Vec<(usize, Line)>) -> Result<Func, Vec<ParseError>> {
    let packages = group(lines)?;
    let names = collect_names(&packages);
    let funcs: Vec<&RawFunc> = packages.iter().flat_map(|p| p.funcs.iter()).collect();
    match funcs.as_slice() {
        [one] => FuncBuilder::build(one, &names),
        [] => Err(vec![ParseError::new(0, "no function found")]),
        _ => Err(vec![ParseError::new(
            0,
            "expected exactly one function",
        )]),
    }
}
