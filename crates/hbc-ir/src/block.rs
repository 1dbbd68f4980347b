//! Basic blocks.

use crate::entity::{BlockId, InstrId, ValueId};

/// A basic block.
///
/// The last instruction is the control-flow terminator. The block's
/// `defs` are its parameter values (the explicit substitute for phi
/// nodes); its `args` are the outgoing values passed to successors,
/// laid out as the concatenation of each successor's parameter slots
/// in successor order.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub(crate) instrs: Vec<InstrId>,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: Vec<BlockId>,
    /// Parameter definitions, one value per incoming slot.
    pub(crate) defs: Vec<ValueId>,
    /// Outgoing block arguments across all successors.
    pub(crate) args: Vec<ValueId>,
}

impl Block {
    pub(crate) fn new() -> Self {
        Block::default()
    }

    pub fn instrs(&self) -> &[InstrId] {
        &self.instrs
    }

    pub fn num_instrs(&self) -> usize {
        self.instrs.len()
    }

    pub fn instr(&self, i: usize) -> InstrId {
        self.instrs[i]
    }

    /// The terminator. Panics on an empty block.
    pub fn control(&self) -> InstrId {
        *self.instrs.last().expect("block has no terminator")
    }

    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    pub fn num_preds(&self) -> usize {
        self.preds.len()
    }

    pub fn pred(&self, i: usize) -> BlockId {
        self.preds[i]
    }

    pub fn succs(&self) -> &[BlockId] {
        &self.succs
    }

    pub fn num_succs(&self) -> usize {
        self.succs.len()
    }

    pub fn succ(&self, i: usize) -> BlockId {
        self.succs[i]
    }

    pub fn defs(&self) -> &[ValueId] {
        &self.defs
    }

    pub fn num_defs(&self) -> usize {
        self.defs.len()
    }

    pub fn def(&self, i: usize) -> ValueId {
        self.defs[i]
    }

    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    pub fn arg(&self, i: usize) -> ValueId {
        self.args[i]
    }
}
