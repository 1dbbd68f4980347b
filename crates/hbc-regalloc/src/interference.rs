//! Interference graph construction, elimination order and colouring.

use std::collections::{HashMap, HashSet};

use hbc_ir::{Loc, ValueId};
use itertools::Itertools;
use tracing::trace;

use crate::{RegAlloc, RegAllocError};

pub(crate) type NodeId = u32;

/// Colour of a pre-coloured node whose register sits outside the
/// palette: respected but never allocated.
pub(crate) const DONT_COLOUR: u16 = u16::MAX;

#[derive(Debug, Default)]
pub(crate) struct Node {
    pub val: ValueId,
    pub interferences: Vec<NodeId>,
    pub interferes: HashSet<NodeId>,
    pub moves: Vec<NodeId>,
    pub colour: u16,
    pub order: u16,
    /// Live across a call: must colour from the callee-saved section.
    pub live_across_call: bool,
}

#[derive(Debug, Default)]
pub(crate) struct IGraph {
    pub nodes: Vec<Node>,
    pub val_node: HashMap<ValueId, NodeId>,
    pub max_colour: u16,
}

impl IGraph {
    fn add_node(&mut self, val: ValueId) -> NodeId {
        if let Some(&id) = self.val_node.get(&val) {
            return id;
        }
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            val,
            ..Node::default()
        });
        self.val_node.insert(val, id);
        id
    }

    fn add_edge(&mut self, v1: ValueId, v2: ValueId) {
        let n1 = self.add_node(v1);
        let n2 = self.add_node(v2);
        for (node, neighbour) in [(n1, n2), (n2, n1)] {
            let node = &mut self.nodes[node as usize];
            if node.interferes.insert(neighbour) {
                node.interferences.push(neighbour);
            }
        }
    }

    fn add_move(&mut self, v1: ValueId, v2: ValueId) {
        let n1 = self.add_node(v1);
        let n2 = self.add_node(v2);
        for (node, other) in [(n1, n2), (n2, n1)] {
            let node = &mut self.nodes[node as usize];
            if !node.moves.contains(&other) {
                node.moves.push(other);
            }
        }
    }

    /// Maximum-cardinality search: repeatedly take the unmarked node
    /// with the most marked neighbours. On a chordal graph the result
    /// is a perfect elimination order.
    pub(crate) fn perfect_elimination_order(&mut self) -> Vec<NodeId> {
        let mut marked: HashSet<NodeId> = HashSet::new();
        let mut output = Vec::with_capacity(self.nodes.len());
        let mut unmarked: Vec<NodeId> = (0..self.nodes.len() as NodeId).collect();

        while !unmarked.is_empty() {
            let mut max_i = 0;
            let mut max_card = -1i64;
            for (i, &cand) in unmarked.iter().enumerate() {
                let card = self.nodes[cand as usize]
                    .interferences
                    .iter()
                    .filter(|n| marked.contains(n))
                    .count() as i64;
                if card > max_card {
                    max_i = i;
                    max_card = card;
                }
            }
            let node = unmarked.swap_remove(max_i);
            marked.insert(node);
            self.nodes[node as usize].order = output.len() as u16;
            output.push(node);
        }

        output
    }
}

impl<'a> RegAlloc<'a> {
    /// Walk each block bottom-up, adding interference edges between
    /// simultaneously-live values and move affinities between
    /// copy-related ones.
    pub(crate) fn build_interference_graph(&mut self) {
        self.graph = IGraph::default();

        for b in 0..self.func.num_blocks() {
            let blk = self.func.block_at(b);

            let mut live: HashSet<ValueId> = self.live_outs[b].clone();

            // block args are live immediately before leaving the
            // block, with an implicit move into the successor params
            let mut offset = 0;
            for s in 0..self.func.block(blk).num_succs() {
                let succ = self.func.block(blk).succ(s);
                for d in 0..self.func.block(succ).num_defs() {
                    let def = self.func.block(succ).def(d);
                    let arg = self.func.block(blk).arg(offset + d);
                    if self.func.value(def).needs_reg() && self.func.value(arg).needs_reg() {
                        live.insert(arg);
                        self.graph.add_move(arg, def);
                    }
                }
                offset += self.func.block(succ).num_defs();
            }

            for (&v1, &v2) in live.iter().tuple_combinations() {
                self.graph.add_edge(v1, v2);
            }

            for i in (0..self.func.block(blk).num_instrs()).rev() {
                let id = self.func.block(blk).instr(i);
                let op = self.func.instr(id).op;

                for d in 0..self.func.instr(id).num_defs() {
                    let def = self.func.instr(id).def(d);
                    if !self.func.value(def).needs_reg() {
                        continue;
                    }
                    live.remove(&def);
                    self.graph.add_node(def);
                    for &other in &live {
                        self.graph.add_edge(def, other);
                    }
                    if op.is_copy() && d < self.func.instr(id).num_args() {
                        let arg = self.func.instr(id).arg(d);
                        if self.func.value(arg).needs_reg() {
                            self.graph.add_move(def, arg);
                        }
                    }
                    if self.coalesce_clobbers
                        && !op.is_copy()
                        && !op.is_call()
                        && d == 0
                        && self.func.instr(id).num_args() > 0
                    {
                        let arg = self.func.instr(id).arg(0);
                        if self.func.value(arg).needs_reg() {
                            self.graph.add_move(def, arg);
                        }
                    }
                }

                if op.is_call() {
                    for &v in &live {
                        let n = self.graph.add_node(v);
                        self.graph.nodes[n as usize].live_across_call = true;
                    }
                }

                for u in 0..self.func.instr(id).num_args() {
                    let use_ = self.func.instr(id).arg(u);
                    if self.func.value(use_).needs_reg() {
                        live.insert(use_);
                    }
                }
            }
        }
    }

    /// Give nodes whose values already carry registers their colour:
    /// the palette index when the register is in the canonical list,
    /// `DONT_COLOUR` otherwise.
    pub(crate) fn precolour(&mut self) {
        for node in self.graph.nodes.iter_mut() {
            if let Loc::Reg(r) = self.func.value(node.val).loc {
                node.colour = match self.regs.index_of(r) {
                    Some(i) => (i + 1) as u16,
                    None => DONT_COLOUR,
                };
            }
        }
    }

    /// Colour in reverse perfect elimination order.
    pub(crate) fn pick_colours(&mut self) -> Result<(), RegAllocError> {
        let order = self.graph.perfect_elimination_order();
        let palette = self.regs.canonical().len() as u16;
        let saved_start = self.regs.saved_start();

        for &node in order.iter().rev() {
            self.pick_colour(node, palette, saved_start)?;
        }
        Ok(())
    }

    fn pick_colour(
        &mut self,
        node: NodeId,
        palette: u16,
        saved_start: u16,
    ) -> Result<(), RegAllocError> {
        if self.graph.nodes[node as usize].colour != 0 {
            return Ok(());
        }

        let allowed = |colour: u16, live_across_call: bool| {
            !live_across_call || colour >= saved_start
        };

        let live_across_call = self.graph.nodes[node as usize].live_across_call;

        // biased coalescing: prefer the colour of a move partner
        let moves = self.graph.nodes[node as usize].moves.clone();
        for mv in moves {
            let colour = self.graph.nodes[mv as usize].colour;
            if colour == 0 || colour == DONT_COLOUR || colour > palette {
                continue;
            }
            if !allowed(colour, live_across_call) {
                continue;
            }
            let interferes = self.graph.nodes[node as usize]
                .interferences
                .iter()
                .any(|&nb| self.graph.nodes[nb as usize].colour == colour);
            if !interferes {
                trace!(val = %self.graph.nodes[node as usize].val, colour, "coalesced");
                self.graph.nodes[node as usize].colour = colour;
                return Ok(());
            }
        }

        // first fit in the allowed palette section
        let start = if live_across_call { saved_start } else { 1 };
        for colour in start..=palette {
            let interferes = self.graph.nodes[node as usize]
                .interferences
                .iter()
                .any(|&nb| self.graph.nodes[nb as usize].colour == colour);
            if !interferes {
                self.graph.nodes[node as usize].colour = colour;
                if self.graph.max_colour < colour {
                    self.graph.max_colour = colour;
                }
                return Ok(());
            }
        }

        Err(RegAllocError::TooManyRequiredRegisters(
            self.func.full_name.clone(),
        ))
    }
}
