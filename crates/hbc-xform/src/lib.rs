//! Transformation pass framework.
//!
//! Transforms are plain functions registered in an explicit
//! [`Registry`] assembled at startup — generic ones from this crate,
//! target-specific ones contributed by the target crates. The driver
//! runs the transforms of one stage over a function to a local
//! fixpoint.

mod cleanup;
mod driver;
mod elaboration;
mod lowering;
mod simplification;

pub use cleanup::eliminate_empty_blocks;
pub use driver::run_stage;

use hbc_ir::{FuncCursor, IrError, Op, Reg, Type};
use thiserror::Error;

/// Pipeline stages a transform can be registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Elaboration,
    Simplification,
    Lowering,
    Legalization,
    CleanUp,
}

/// Target capability tags gating transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Loads and stores take a (base, offset) pair.
    LoadStoreOffset,
    /// The target maintains a frame pointer.
    HasFramePointer,
    /// Binary ops clobber their first operand.
    TwoOperand,
}

/// Size oracle the address-lowering transforms consult.
pub trait SizeOracle {
    fn size_of(&self, typ: &Type) -> u32;
    fn word_bytes(&self) -> u32;
    fn min_addressable_bits(&self) -> u32;

    /// Byte offsets of each field of a struct.
    fn offsets_of(&self, fields: &[Type]) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut at = 0;
        for f in fields {
            offsets.push(at);
            at += self.size_of(f);
        }
        offsets
    }
}

/// ABI facts transforms need from the target, as plain data.
pub struct XformCtx<'a> {
    /// Registers used for call arguments and results, in order.
    pub arg_regs: &'a [Reg],
    /// Scratch register reserved for parallel-copy cycle breaking.
    pub scratch_reg: Reg,
    pub sizes: &'a dyn SizeOracle,
}

#[derive(Debug, Error)]
pub enum XformError {
    /// A stage exceeded its fixpoint budget: a rewrite rule keeps
    /// reporting changes.
    #[error("transforms do not terminate: stage {stage:?} on {func}")]
    NonTerminating { stage: Stage, func: String },

    #[error("rule error in {rule}: {message}")]
    Rule { rule: &'static str, message: String },

    #[error(transparent)]
    Ir(#[from] IrError),
}

/// A transform function: invoked with the cursor parked on the
/// instruction under consideration.
pub type XformFn = fn(&mut FuncCursor, &XformCtx) -> Result<(), XformError>;

/// A registered transform.
pub struct XformDesc {
    pub name: &'static str,
    pub stages: Vec<Stage>,
    pub tags: Vec<Tag>,
    /// Invoke only when the current instruction has this opcode.
    pub op: Option<Op>,
    /// Run during at most one sweep over the function per stage.
    pub once: bool,
    pub run: XformFn,
}

impl XformDesc {
    pub fn new(name: &'static str, run: XformFn) -> Self {
        XformDesc {
            name,
            stages: Vec::new(),
            tags: Vec::new(),
            op: None,
            once: false,
            run,
        }
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn on_op(mut self, op: impl Into<Op>) -> Self {
        self.op = Some(op.into());
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

/// The startup-assembled transform registry.
#[derive(Default)]
pub struct Registry {
    descs: Vec<XformDesc>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// The generic transforms plus whatever the caller adds on top.
    pub fn standard() -> Self {
        let mut reg = Registry::new();
        elaboration::register(&mut reg);
        simplification::register(&mut reg);
        lowering::register(&mut reg);
        cleanup::register(&mut reg);
        reg
    }

    pub fn register(&mut self, desc: XformDesc) {
        self.descs.push(desc);
    }

    pub fn extend(&mut self, descs: impl IntoIterator<Item = XformDesc>) {
        self.descs.extend(descs);
    }

    pub fn descs(&self) -> &[XformDesc] {
        &self.descs
    }
}
