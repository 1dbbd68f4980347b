//! The contract between the compiler core and a CPU target.
//!
//! A target supplies its register file, a size model, capability
//! tags, target-specific transforms, and per-instruction assembly
//! rendering. The core never hardcodes any of these.

use std::collections::HashMap;

use hbc_ir::{Op, Reg, Type};
use hbc_xform::{SizeOracle, Tag, XformDesc};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown target {0}")]
pub struct TargetUnknown(pub String);

/// A target's register file.
///
/// The canonical allocation order is argument registers, then
/// temporaries, then callee-saved registers; the allocator's palette
/// indexes into this list. Special registers (stack pointer, frame
/// pointer, link, assembler scratch) sit outside the palette.
#[derive(Debug, Clone)]
pub struct RegisterSet {
    arg_regs: Vec<Reg>,
    temp_regs: Vec<Reg>,
    saved_regs: Vec<Reg>,
    canonical: Vec<Reg>,
    pub sp: Reg,
    pub fp: Reg,
    pub link: Reg,
    /// Reserved for parallel-copy cycle breaking; never allocated.
    pub scratch: Reg,
    names: HashMap<Reg, &'static str>,
}

impl RegisterSet {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arg_regs: Vec<Reg>,
        temp_regs: Vec<Reg>,
        saved_regs: Vec<Reg>,
        sp: Reg,
        fp: Reg,
        link: Reg,
        scratch: Reg,
        names: HashMap<Reg, &'static str>,
    ) -> Self {
        let canonical = arg_regs
            .iter()
            .chain(&temp_regs)
            .chain(&saved_regs)
            .copied()
            .collect();
        RegisterSet {
            arg_regs,
            temp_regs,
            saved_regs,
            canonical,
            sp,
            fp,
            link,
            scratch,
            names,
        }
    }

    pub fn arg_regs(&self) -> &[Reg] {
        &self.arg_regs
    }

    pub fn temp_regs(&self) -> &[Reg] {
        &self.temp_regs
    }

    pub fn saved_regs(&self) -> &[Reg] {
        &self.saved_regs
    }

    /// The allocation palette: args ++ temps ++ saved.
    pub fn canonical(&self) -> &[Reg] {
        &self.canonical
    }

    /// 1-based colour at which the callee-saved section begins.
    pub fn saved_start(&self) -> u16 {
        (self.arg_regs.len() + self.temp_regs.len() + 1) as u16
    }

    /// Number of caller-saved palette entries (args + temps).
    pub fn num_caller_saved(&self) -> usize {
        self.arg_regs.len() + self.temp_regs.len()
    }

    pub fn index_of(&self, reg: Reg) -> Option<usize> {
        self.canonical.iter().position(|&r| r == reg)
    }

    /// The target's name for a register, falling back to the neutral
    /// `r<N>` spelling.
    pub fn name(&self, reg: Reg) -> String {
        match self.names.get(&reg) {
            Some(n) => (*n).to_string(),
            None => reg.to_string(),
        }
    }
}

/// The size model: how big types are on this target.
#[derive(Debug, Clone, Copy)]
pub struct Sizes {
    pub word_bytes: u32,
    pub min_addressable_bits: u32,
}

impl Sizes {
    /// Size of a type in bytes. Strings are a two-word
    /// {pointer, length} header; composite sizes are structural.
    pub fn size_of(&self, typ: &Type) -> u32 {
        use hbc_ir::Basic;
        let unit = self.min_addressable_bits / 8;
        match typ {
            Type::Basic(b) => match b {
                Basic::Bool | Basic::UntypedBool => unit.max(1),
                Basic::Int8 | Basic::Uint8 => unit.max(1),
                Basic::Int16 | Basic::Uint16 => unit.max(2),
                Basic::Int32 | Basic::Uint32 => unit.max(4),
                Basic::Int64 | Basic::Uint64 => unit.max(8),
                Basic::Str => self.word_bytes * 2,
                _ => self.word_bytes,
            },
            Type::Pointer(_) | Type::Chan(_) | Type::Func(..) | Type::Interface => self.word_bytes,
            Type::Slice(_) | Type::Map(..) => self.word_bytes * 2,
            Type::Array(n, elem) => *n as u32 * self.size_of(elem),
            Type::Struct(fields) => fields.iter().map(|f| self.size_of(f)).sum(),
            Type::Tuple(parts) => parts.iter().map(|t| self.size_of(t)).sum(),
        }
    }
}

impl SizeOracle for Sizes {
    fn size_of(&self, typ: &Type) -> u32 {
        Sizes::size_of(self, typ)
    }

    fn word_bytes(&self) -> u32 {
        self.word_bytes
    }

    fn min_addressable_bits(&self) -> u32 {
        self.min_addressable_bits
    }
}

/// The shape every supported target provides.
pub trait Target: Sync {
    /// Short identifier, e.g. `rj32`.
    fn name(&self) -> &'static str;

    /// Capability tags enabled for this target.
    fn xform_tags(&self) -> Vec<Tag>;

    /// Target-specific transforms to add to the registry.
    fn xforms(&self) -> Vec<XformDesc>;

    fn registers(&self) -> &RegisterSet;

    fn sizes(&self) -> &Sizes;

    /// Whether binary operations clobber their first operand.
    fn is_two_operand(&self) -> bool;

    /// Assembler dialect identifier.
    fn asm_format(&self) -> &'static str;

    fn emulator_cmd(&self) -> &'static str;

    fn emulator_args(&self) -> Vec<String>;

    /// Render one instruction as an assembly line from its opcode and
    /// pre-rendered def/arg strings.
    fn render(&self, op: Op, defs: &[String], args: &[String]) -> String;
}

/// Name-keyed target registry assembled at startup.
#[derive(Default)]
pub struct Targets {
    targets: Vec<Box<dyn Target>>,
}

impl Targets {
    pub fn new() -> Self {
        Targets::default()
    }

    pub fn register(&mut self, target: Box<dyn Target>) {
        self.targets.push(target);
    }

    pub fn get(&self, name: &str) -> Result<&dyn Target, TargetUnknown> {
        self.targets
            .iter()
            .map(|t| t.as_ref())
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| TargetUnknown(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.targets.iter().map(|t| t.name()).collect()
    }
}
