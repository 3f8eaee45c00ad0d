//! Block building and graph connection.
//!
//! [`GraphBuilder`] marks leaders, cuts the tuple sequence into basic blocks at
//! leader boundaries and links the blocks by looking at each block's last
//! instruction. When address 0 is itself a jump target an empty entry block is
//! placed in front, so the entry block never has predecessors.

use super::{BlockId, ControlFlowGraph};
use crate::bytecode::opcodes::OpcodeCategory;
use crate::bytecode::Tuple;
use crate::core::error::{CompileError, CompileResult};
use hashbrown::HashMap;

/// Builds the block graph of one method from its decoded tuples.
pub struct GraphBuilder {
    tuples: Vec<Tuple>,
}

impl GraphBuilder {
    pub fn new(tuples: Vec<Tuple>) -> Self {
        Self { tuples }
    }

    /// Mark leaders, partition and connect.
    pub fn build<'arena>(mut self) -> CompileResult<ControlFlowGraph<'arena>> {
        if self.tuples.is_empty() {
            return Err(CompileError::BlockLayout {
                reason: "method has no instructions".to_string(),
            });
        }

        let entry_is_target = self.mark_leaders()?;
        let mut graph = ControlFlowGraph::new();
        self.partition(&mut graph, entry_is_target);
        connect(&mut graph)?;

        log::debug!(
            "Built {} blocks from {} instructions{}",
            graph.block_count(),
            graph.blocks().map(|b| b.tuples.len()).sum::<usize>(),
            if entry_is_target { " (synthetic entry)" } else { "" }
        );
        Ok(graph)
    }

    /// Set `is_leader` on every tuple that starts a block. Returns whether
    /// address 0 is a jump target.
    fn mark_leaders(&mut self) -> CompileResult<bool> {
        let index_of: HashMap<u32, usize> =
            self.tuples.iter().enumerate().map(|(i, t)| (t.address, i)).collect();

        let mut leaders = vec![0usize];
        let mut entry_is_target = false;

        for (i, tuple) in self.tuples.iter().enumerate() {
            let category = tuple.category();
            if category.has_targets() {
                for target in tuple.jump_targets() {
                    let index = u32::try_from(target)
                        .ok()
                        .and_then(|address| index_of.get(&address).copied())
                        .ok_or(CompileError::InvalidJumpTarget { address: tuple.address, target })?;
                    entry_is_target |= index == 0;
                    leaders.push(index);
                }
            }
            if category.ends_block() && i + 1 < self.tuples.len() {
                leaders.push(i + 1);
            }
        }

        for index in leaders {
            self.tuples[index].is_leader = true;
        }
        Ok(entry_is_target)
    }

    /// Cut the tuples into blocks; every tuple lands in exactly one block.
    fn partition(self, graph: &mut ControlFlowGraph<'_>, entry_is_target: bool) {
        if entry_is_target {
            graph.add_block();
        }

        let mut current: Option<BlockId> = None;
        for tuple in self.tuples {
            let block = match current {
                Some(block) if !tuple.is_leader => block,
                _ => {
                    let block = graph.add_block();
                    graph.map_address(tuple.address, block);
                    current = Some(block);
                    block
                }
            };
            graph.block_mut(block).tuples.push(tuple);
        }
    }
}

/// Create successor and predecessor edges from each block's last instruction.
pub fn connect(graph: &mut ControlFlowGraph<'_>) -> CompileResult<()> {
    let ids = graph.block_ids();

    for (pos, &id) in ids.iter().enumerate() {
        let next = ids.get(pos + 1).copied();
        let last = graph.block(id).tuples.last().cloned();

        let Some(last) = last else {
            // An empty block only falls through.
            let next = next.ok_or_else(|| CompileError::BlockLayout {
                reason: format!("empty block {} has no successor", id),
            })?;
            graph.add_edge(id, next)?;
            continue;
        };

        let fall_through = || next.ok_or(CompileError::FallThroughPastEnd { address: last.address });

        match last.category() {
            OpcodeCategory::ConditionalBranch => {
                let fall = fall_through()?;
                graph.add_edge(id, fall)?;
                for target in last.jump_targets() {
                    let target = resolve_target(graph, &last, target)?;
                    graph.add_edge(id, target)?;
                }
            }
            OpcodeCategory::Goto | OpcodeCategory::Subroutine | OpcodeCategory::Switch => {
                for target in last.jump_targets() {
                    let target = resolve_target(graph, &last, target)?;
                    graph.add_edge(id, target)?;
                }
            }
            OpcodeCategory::Return | OpcodeCategory::Throw | OpcodeCategory::SubroutineReturn => {}
            OpcodeCategory::Other => {
                let fall = fall_through()?;
                graph.add_edge(id, fall)?;
            }
        }
    }

    Ok(())
}

fn resolve_target(graph: &ControlFlowGraph<'_>, tuple: &Tuple, target: i64) -> CompileResult<BlockId> {
    u32::try_from(target)
        .ok()
        .and_then(|address| graph.block_at(address))
        .ok_or(CompileError::InvalidJumpTarget { address: tuple.address, target })
}
