// This module implements flow analysis over a freshly connected graph, in three strictly ordered
// steps. detect_loops is a depth-first walk from the entry block using `visited` and `active` flags:
// reaching a block that is still on the current path marks it as a loop head, marks the block the
// edge came from as a loop tail, bumps the head's backward_branch_count and gives the head a loop
// index the first time it is reached this way. remove_unreachable_blocks then deletes every block the
// walk never visited and scrubs it from the remaining predecessor lists. compute_dominators finally
// walks the graph again, seeding each block's ref_count with its predecessor count; every visit
// decrements ref_count and narrows the dominator to the nearest common dominator of the old dominator
// and the new predecessor, and the walk only continues into successors once ref_count has dropped to
// backward_branch_count, so all forward predecessors contribute before loop-carried edges are seen.
// Both walks keep their own stack of frames, so the depth of the graph never touches the native stack.

//! Loop detection, pruning and dominators.

use super::{BlockId, ControlFlowGraph};
use crate::core::error::CompileResult;

/// Results of a full analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowSummary {
    pub loop_heads: usize,
    pub pruned_blocks: usize,
}

/// One block on the path of a depth-first walk: the block and the next successor to visit.
struct Frame {
    block: BlockId,
    cursor: usize,
}

/// Runs loop detection, pruning and dominator computation over one graph.
pub struct FlowAnalyzer<'g, 'arena> {
    graph: &'g mut ControlFlowGraph<'arena>,
}

impl<'g, 'arena> FlowAnalyzer<'g, 'arena> {
    pub fn new(graph: &'g mut ControlFlowGraph<'arena>) -> Self {
        Self { graph }
    }

    /// Run every step in order, starting from a clean slate.
    ///
    /// Fails with [`CompileError::UnknownBlock`](crate::CompileError::UnknownBlock) if the
    /// graph has no entry block or an edge names a block that is not in the graph.
    pub fn analyze(&mut self) -> CompileResult<FlowSummary> {
        self.graph.validate()?;
        for id in self.graph.block_ids() {
            let block = self.graph.block_mut(id);
            block.flags = Default::default();
            block.loop_index = None;
            block.backward_branch_count = 0;
        }

        let entry = self.graph.entry();
        self.detect_loops(entry);
        let pruned_blocks = self.remove_unreachable_blocks();
        self.prepare_dominators();
        self.compute_dominators(entry);

        let loop_heads = self.graph.blocks().filter(|b| b.flags.is_loop_head).count();
        log::debug!(
            "Flow analysis: {} blocks, {} loop heads, {} pruned",
            self.graph.block_count(),
            loop_heads,
            pruned_blocks
        );
        Ok(FlowSummary { loop_heads, pruned_blocks })
    }

    /// Depth-first loop detection from `entry`.
    fn detect_loops(&mut self, entry: BlockId) {
        let mut path = Vec::new();
        self.enter_loop_walk(&mut path, entry, None);

        while let Some(frame) = path.last_mut() {
            let block = frame.block;
            match self.graph.block(block).successors.get(frame.cursor).copied() {
                Some(succ) => {
                    frame.cursor += 1;
                    self.enter_loop_walk(&mut path, succ, Some(block));
                }
                None => {
                    path.pop();
                    self.graph.block_mut(block).flags.active = false;
                }
            }
        }
    }

    fn enter_loop_walk(&mut self, path: &mut Vec<Frame>, block: BlockId, pred: Option<BlockId>) {
        let flags = self.graph.block(block).flags;

        if flags.active {
            if self.graph.block(block).loop_index.is_none() {
                let index = self.graph.next_loop_index();
                self.graph.block_mut(block).loop_index = Some(index);
            }
            let head = self.graph.block_mut(block);
            head.flags.is_loop_head = true;
            head.backward_branch_count += 1;
            if let Some(pred) = pred {
                self.graph.block_mut(pred).flags.is_loop_tail = true;
                log::trace!("back edge {} -> {}", pred, block);
            }
            return;
        }
        if flags.visited {
            return;
        }

        let entered = self.graph.block_mut(block);
        entered.flags.visited = true;
        entered.flags.active = true;
        path.push(Frame { block, cursor: 0 });
    }

    /// Delete blocks the loop walk never reached. Returns how many were removed.
    pub fn remove_unreachable_blocks(&mut self) -> usize {
        let dead: Vec<BlockId> = self
            .graph
            .blocks()
            .filter(|b| !b.flags.visited)
            .map(|b| b.id)
            .collect();
        if dead.is_empty() {
            return 0;
        }

        for &id in &dead {
            if let Some(block) = self.graph.remove_block(id) {
                log::warn!(
                    "Pruning unreachable block {} ({} instructions)",
                    id,
                    block.tuples.len()
                );
            }
        }
        for id in self.graph.block_ids() {
            self.graph.block_mut(id).predecessors.retain(|p| !dead.contains(p));
        }
        dead.len()
    }

    fn prepare_dominators(&mut self) {
        for id in self.graph.block_ids() {
            let block = self.graph.block_mut(id);
            block.ref_count = block.predecessors.len() as u32;
            block.dominator = None;
        }
    }

    /// Dominator walk from `entry`.
    ///
    /// Expects `ref_count` to hold the predecessor count of every block.
    fn compute_dominators(&mut self, entry: BlockId) {
        let mut path = Vec::new();
        self.enter_dominator_walk(&mut path, entry, None);

        while let Some(frame) = path.last_mut() {
            let block = frame.block;
            match self.graph.block(block).successors.get(frame.cursor).copied() {
                Some(succ) => {
                    frame.cursor += 1;
                    self.enter_dominator_walk(&mut path, succ, Some(block));
                }
                None => {
                    path.pop();
                }
            }
        }
    }

    fn enter_dominator_walk(&mut self, path: &mut Vec<Frame>, block: BlockId, pred: Option<BlockId>) {
        if let Some(pred) = pred {
            let current = self.graph.block(block).dominator;
            let dominator = match current {
                Some(current) => self.common_dominator(current, pred),
                None => pred,
            };
            let visited = self.graph.block_mut(block);
            visited.ref_count = visited.ref_count.saturating_sub(1);
            visited.dominator = Some(dominator);
        }

        let visited = self.graph.block(block);
        if visited.ref_count != visited.backward_branch_count {
            return;
        }
        log::trace!("{} dominated by {:?}", block, visited.dominator);
        path.push(Frame { block, cursor: 0 });
    }

    /// Nearest block on both dominator chains; each chain includes its start.
    fn common_dominator(&self, a: BlockId, b: BlockId) -> BlockId {
        let mut chain = Vec::new();
        let mut current = Some(a);
        while let Some(block) = current {
            chain.push(block);
            current = self.graph.block(block).dominator;
        }

        let mut current = Some(b);
        while let Some(block) = current {
            if chain.contains(&block) {
                return block;
            }
            current = self.graph.block(block).dominator;
        }
        self.graph.entry()
    }
}
