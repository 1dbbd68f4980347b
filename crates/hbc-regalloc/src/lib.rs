//! Register allocation by chordal-graph colouring.
//!
//! SSA interference graphs are chordal, so a maximum-cardinality
//! search yields a perfect elimination order and reverse-order greedy
//! colouring is optimal. Move affinities bias the colour choice
//! toward coalescing; values live across calls are restricted to the
//! callee-saved section of the palette.

mod interference;
mod liveness;
pub mod verify;

use std::collections::HashSet;

use hbc_ir::{Func, ValueId};
use hbc_target::RegisterSet;
use thiserror::Error;
use tracing::debug;

use interference::{IGraph, DONT_COLOUR};

#[derive(Debug, Error)]
pub enum RegAllocError {
    #[error("the CFG has critical edges in {0}")]
    CriticalEdges(String),

    #[error("entry block has live in values in {0}")]
    EntryLiveIns(String),

    #[error("too many required registers in {0}")]
    TooManyRequiredRegisters(String),

    #[error("attempt to move pre-coloured {value} to a different register in {func}")]
    PrecolouredConflict { func: String, value: String },
}

/// One register allocation over one function.
pub struct RegAlloc<'a> {
    func: &'a mut Func,
    regs: &'a RegisterSet,
    /// Bias the first operand of value-producing instructions toward
    /// the result register, for two-operand targets.
    coalesce_clobbers: bool,
    live_ins: Vec<HashSet<ValueId>>,
    live_outs: Vec<HashSet<ValueId>>,
    graph: IGraph,
}

impl<'a> RegAlloc<'a> {
    pub fn new(func: &'a mut Func, regs: &'a RegisterSet) -> Self {
        let blocks = func.num_blocks();
        RegAlloc {
            func,
            regs,
            coalesce_clobbers: false,
            live_ins: vec![HashSet::new(); blocks],
            live_outs: vec![HashSet::new(); blocks],
            graph: IGraph::default(),
        }
    }

    pub fn coalesce_clobbers(mut self, enable: bool) -> Self {
        self.coalesce_clobbers = enable;
        self
    }

    /// Verify the structure of the input code. Useful on its own in
    /// tests and fuzzing.
    pub fn check_input(&self) -> Result<(), RegAllocError> {
        if self.func.has_critical_edges() {
            return Err(RegAllocError::CriticalEdges(self.func.full_name.clone()));
        }
        Ok(())
    }

    /// Run the allocator, assigning a register to every value that
    /// needs one.
    pub fn allocate(&mut self) -> Result<(), RegAllocError> {
        self.check_input()?;
        self.live_in_out_scan()?;

        debug!(func = %self.func.full_name, "building interference graph");
        self.build_interference_graph();
        self.precolour();
        self.pick_colours()?;
        self.assign()?;

        Ok(())
    }

    fn assign(&mut self) -> Result<(), RegAllocError> {
        let canonical = self.regs.canonical();
        for node in self.graph.nodes.iter() {
            if node.colour == 0 || node.colour == DONT_COLOUR {
                continue;
            }
            let reg = canonical[(node.colour - 1) as usize];
            let value = self.func.value_mut(node.val);
            if let Some(prev) = value.reg() {
                if prev != reg {
                    return Err(RegAllocError::PrecolouredConflict {
                        func: self.func.full_name.clone(),
                        value: node.val.to_string(),
                    });
                }
            }
            value.set_reg(reg);
        }
        Ok(())
    }

    /// Live-in sets, exposed for diagnostics and tests.
    pub fn live_ins(&self, block_index: usize) -> &HashSet<ValueId> {
        &self.live_ins[block_index]
    }

    pub fn live_outs(&self, block_index: usize) -> &HashSet<ValueId> {
        &self.live_outs[block_index]
    }
}
