// This module defines the per-method control-flow graph that every stage after decoding works on.
// ControlFlowGraph owns the basic blocks (keyed by a stable BlockId assigned in address order and
// never reused after pruning), the address-to-block table used to resolve jump targets, the HIR node
// arena with its alias table (merge nodes elided by the phi optimizer are redirected rather than
// removed), the LIR node arena, and the monotonically increasing HIR, LIR, virtual-register and loop
// counters. Once lowering is done the LIR is renumbered in block order, so an instruction id is
// also its position in the linearized method. No counter is process-wide, so methods compile independently. BasicBlock carries its
// tuples, ordered predecessor and successor lists, the exit state of the simulated frame (locals and
// operand stack), its HIR and LIR instruction lists and the flow-analysis flags and counters.

//! Control-flow graph, basic blocks and per-method id counters.

pub mod analysis;
pub mod builder;

use crate::bytecode::descriptor::ValueType;
use crate::bytecode::Tuple;
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::{Register, FIRST_VIRTUAL_REGISTER};
use crate::hir::{FrameSlot, HirId, HirKind, HirNode};
use crate::lir::{LirId, LirNode, LirOp};
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::fmt;

pub use analysis::{FlowAnalyzer, FlowSummary};
pub use builder::GraphBuilder;

/// Stable block identifier, assigned in address order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Flow-analysis flags of a block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockFlags {
    pub is_loop_head: bool,
    pub is_loop_tail: bool,
    /// Reached by the loop-detection walk.
    pub visited: bool,
    /// On the current loop-detection path.
    pub active: bool,
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    /// Instructions in address order.
    pub tuples: Vec<Tuple>,
    /// Predecessors; the order defines merge-node argument positions.
    pub predecessors: Vec<BlockId>,
    /// Successors in edge-creation order.
    pub successors: Vec<BlockId>,
    /// Defining HIR node per local slot at block exit.
    pub locals: Vec<HirId>,
    /// Operand stack at block exit.
    pub stack: Vec<HirId>,
    /// HIR nodes in execution order.
    pub hir: Vec<HirId>,
    /// LIR instructions in execution order.
    pub lir: Vec<LirId>,
    pub flags: BlockFlags,
    /// Index of the loop this block heads.
    pub loop_index: Option<u32>,
    /// Immediate dominator; `None` for the entry block.
    pub dominator: Option<BlockId>,
    /// Predecessors not yet seen by the dominator walk.
    pub ref_count: u32,
    /// Back edges entering this block.
    pub backward_branch_count: u32,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            tuples: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            locals: Vec::new(),
            stack: Vec::new(),
            hir: Vec::new(),
            lir: Vec::new(),
            flags: BlockFlags::default(),
            loop_index: None,
            dominator: None,
            ref_count: 0,
            backward_branch_count: 0,
        }
    }

    /// Address of the first instruction, if the block has any.
    pub fn start_address(&self) -> Option<u32> {
        self.tuples.first().map(|t| t.address)
    }

    /// Exit value of a frame slot.
    pub fn slot_value(&self, slot: FrameSlot) -> Option<HirId> {
        match slot {
            FrameSlot::Local(index) => self.locals.get(index as usize).copied(),
            FrameSlot::Stack(depth) => self.stack.get(depth as usize).copied(),
        }
    }
}

/// Control-flow graph of one method.
#[derive(Debug, Default)]
pub struct ControlFlowGraph<'arena> {
    blocks: BTreeMap<BlockId, BasicBlock>,
    address_to_block: HashMap<u32, BlockId>,
    hir_nodes: Vec<HirNode<'arena>>,
    aliases: HashMap<HirId, HirId>,
    lir_nodes: Vec<LirNode<'arena>>,
    hir_order: Vec<BlockId>,
    next_hir_id: u32,
    next_lir_id: u32,
    next_register_id: u32,
    next_loop_index: u32,
}

impl<'arena> ControlFlowGraph<'arena> {
    pub fn new() -> Self {
        Self {
            next_register_id: FIRST_VIRTUAL_REGISTER,
            ..Self::default()
        }
    }

    // -------- blocks ---------

    /// Add an empty block with the next id.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.keys().next_back().map_or(0, |b| b.0 + 1));
        self.blocks.insert(id, BasicBlock::new(id));
        id
    }

    /// The entry block.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Block ids in address order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.keys().copied().collect()
    }

    /// Blocks in address order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.blocks.values()
    }

    pub fn get_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    /// Block by id.
    ///
    /// # Panics
    /// Panics if the block is not in the graph (never created, or pruned).
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        match self.blocks.get(&id) {
            Some(block) => block,
            None => panic!("{} is not in the graph", id),
        }
    }

    /// Mutable block by id.
    ///
    /// # Panics
    /// Panics if the block is not in the graph (never created, or pruned).
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        match self.blocks.get_mut(&id) {
            Some(block) => block,
            None => panic!("{} is not in the graph", id),
        }
    }

    pub(crate) fn remove_block(&mut self, id: BlockId) -> Option<BasicBlock> {
        let block = self.blocks.remove(&id)?;
        for tuple in &block.tuples {
            self.address_to_block.remove(&tuple.address);
        }
        Some(block)
    }

    /// Record that the instruction at `address` starts `block`.
    pub(crate) fn map_address(&mut self, address: u32, block: BlockId) {
        self.address_to_block.insert(address, block);
    }

    /// Block starting at `address`.
    pub fn block_at(&self, address: u32) -> Option<BlockId> {
        self.address_to_block.get(&address).copied()
    }

    /// Add a control-flow edge. Duplicate edges are ignored.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) -> CompileResult<()> {
        if !self.blocks.contains_key(&to) {
            return Err(CompileError::UnknownBlock { block: to.0 });
        }
        let source = self
            .blocks
            .get_mut(&from)
            .ok_or(CompileError::UnknownBlock { block: from.0 })?;
        if source.successors.contains(&to) {
            return Ok(());
        }
        source.successors.push(to);
        let target = self.block_mut(to);
        if !target.predecessors.contains(&from) {
            target.predecessors.push(from);
        }
        Ok(())
    }

    /// Check that the entry block exists and that every edge and every block in
    /// the HIR order names a block of this graph.
    pub fn validate(&self) -> CompileResult<()> {
        let known = |id: &BlockId| {
            if self.blocks.contains_key(id) {
                Ok(())
            } else {
                Err(CompileError::UnknownBlock { block: id.0 })
            }
        };

        known(&self.entry())?;
        for block in self.blocks.values() {
            block.successors.iter().try_for_each(known)?;
            block.predecessors.iter().try_for_each(known)?;
        }
        self.hir_order.iter().try_for_each(known)
    }

    pub(crate) fn next_loop_index(&mut self) -> u32 {
        let index = self.next_loop_index;
        self.next_loop_index += 1;
        index
    }

    /// Whether `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = Some(b);
        while let Some(block) = current {
            if block == a {
                return true;
            }
            current = self.blocks.get(&block).and_then(|blk| blk.dominator);
        }
        false
    }

    /// Whether the edge `from -> to` closes a loop.
    pub fn is_back_edge(&self, from: BlockId, to: BlockId) -> bool {
        self.blocks.get(&to).is_some_and(|b| b.flags.is_loop_head) && self.dominates(to, from)
    }

    /// Blocks in HIR construction order.
    pub fn hir_order(&self) -> &[BlockId] {
        &self.hir_order
    }

    pub(crate) fn set_hir_order(&mut self, order: Vec<BlockId>) {
        self.hir_order = order;
    }

    // -------- HIR ---------

    /// Append a HIR node to `block`.
    pub fn add_hir(&mut self, block: BlockId, ty: ValueType, kind: HirKind<'arena>) -> HirId {
        self.add_hir_with(block, ty, |_| kind)
    }

    /// Append a HIR node whose contents depend on its own id.
    pub fn add_hir_with(
        &mut self,
        block: BlockId,
        ty: ValueType,
        make: impl FnOnce(HirId) -> HirKind<'arena>,
    ) -> HirId {
        let id = HirId(self.next_hir_id);
        self.next_hir_id += 1;
        let kind = make(id);
        self.hir_nodes.push(HirNode { id, block, ty, kind });
        self.block_mut(block).hir.push(id);
        id
    }

    /// Follow alias redirections to the node that stands for `id`.
    pub fn resolve(&self, id: HirId) -> HirId {
        let mut current = id;
        while let Some(&next) = self.aliases.get(&current) {
            current = next;
        }
        current
    }

    /// Redirect every later lookup of `from` to `to`.
    pub fn alias(&mut self, from: HirId, to: HirId) {
        self.aliases.insert(from, to);
    }

    pub fn is_aliased(&self, id: HirId) -> bool {
        self.aliases.contains_key(&id)
    }

    /// HIR node for `id`, after alias resolution.
    pub fn hir(&self, id: HirId) -> &HirNode<'arena> {
        &self.hir_nodes[self.resolve(id).0 as usize]
    }

    /// HIR node stored under `id`, ignoring aliases.
    pub fn hir_raw(&self, id: HirId) -> &HirNode<'arena> {
        &self.hir_nodes[id.0 as usize]
    }

    pub(crate) fn hir_raw_mut(&mut self, id: HirId) -> &mut HirNode<'arena> {
        &mut self.hir_nodes[id.0 as usize]
    }

    /// All HIR nodes in id order, including elided ones.
    pub fn hir_nodes(&self) -> &[HirNode<'arena>] {
        &self.hir_nodes
    }

    // -------- LIR ---------

    /// Create a LIR node without placing it in a block.
    pub fn new_lir(
        &mut self,
        op: LirOp<'arena>,
        reads: Vec<Register>,
        write: Option<Register>,
    ) -> LirId {
        let id = LirId(self.next_lir_id);
        self.next_lir_id += 1;
        self.lir_nodes.push(LirNode::new(id, op, reads, write));
        id
    }

    /// Create a LIR node at the end of `block`.
    pub fn append_lir(
        &mut self,
        block: BlockId,
        op: LirOp<'arena>,
        reads: Vec<Register>,
        write: Option<Register>,
    ) -> LirId {
        let id = self.new_lir(op, reads, write);
        self.block_mut(block).lir.push(id);
        id
    }

    pub fn lir(&self, id: LirId) -> &LirNode<'arena> {
        &self.lir_nodes[id.0 as usize]
    }

    pub fn lir_mut(&mut self, id: LirId) -> &mut LirNode<'arena> {
        &mut self.lir_nodes[id.0 as usize]
    }

    pub fn lir_nodes(&self) -> &[LirNode<'arena>] {
        &self.lir_nodes
    }

    /// Renumber the placed LIR so ids follow block order and, within a block,
    /// execution order. Instructions no block holds are dropped.
    pub(crate) fn renumber_lir(&mut self) {
        let mut old: Vec<Option<LirNode<'arena>>> =
            std::mem::take(&mut self.lir_nodes).into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(old.len());

        for block in self.blocks.values_mut() {
            for id in &mut block.lir {
                if let Some(mut node) = old.get_mut(id.0 as usize).and_then(Option::take) {
                    let placed = LirId(nodes.len() as u32);
                    node.id = placed;
                    *id = placed;
                    nodes.push(node);
                }
            }
        }

        self.next_lir_id = nodes.len() as u32;
        self.lir_nodes = nodes;
    }

    // -------- registers ---------

    /// Fresh virtual register.
    pub fn new_virtual_register(&mut self) -> Register {
        let reg = Register::from_raw(self.next_register_id);
        self.next_register_id += 1;
        reg
    }

    /// Number of virtual registers created so far.
    pub fn virtual_register_count(&self) -> u32 {
        self.next_register_id - FIRST_VIRTUAL_REGISTER
    }
}
