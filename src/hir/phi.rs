//! Merge-node cleanup.
//!
//! Loop-head merge nodes are created before the loop body is built, so their
//! back-edge arguments start out pointing at the node itself. The optimizer
//! first patches every loop-head argument with the predecessor's exit value
//! for the same frame slot, then removes merges that only ever see one value
//! (besides themselves) by aliasing them to that value. Removal repeats until
//! nothing changes, since dropping one merge can make another trivial.

use super::{HirId, HirKind};
use crate::cfg::{BlockId, ControlFlowGraph};
use crate::core::error::CompileResult;
use crate::core::session::CompilationSession;

/// Counts from one optimizer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhiSummary {
    /// Loop-head arguments rewritten to the predecessor's exit value.
    pub patched: usize,
    /// Merge nodes replaced by an alias.
    pub elided: usize,
}

pub struct PhiOptimizer<'a, 'arena> {
    graph: &'a mut ControlFlowGraph<'arena>,
    session: &'a CompilationSession<'arena>,
}

impl<'a, 'arena> PhiOptimizer<'a, 'arena> {
    pub fn new(graph: &'a mut ControlFlowGraph<'arena>, session: &'a CompilationSession<'arena>) -> Self {
        Self { graph, session }
    }

    pub fn run(&mut self) -> CompileResult<PhiSummary> {
        self.graph.validate()?;
        let patched = self.patch_loop_heads();
        let mut elided = 0;
        loop {
            let round = self.elide_trivial();
            if round == 0 {
                break;
            }
            elided += round;
        }

        log::debug!("Phi optimizer: {} arguments patched, {} merges elided", patched, elided);
        Ok(PhiSummary { patched, elided })
    }

    fn phis_of(&self, block: BlockId) -> Vec<HirId> {
        self.graph
            .block(block)
            .hir
            .iter()
            .copied()
            .filter(|&id| self.graph.hir_raw(id).is_phi())
            .collect()
    }

    /// Point each loop-head argument at its predecessor's exit value.
    fn patch_loop_heads(&mut self) -> usize {
        let mut patched = 0;
        let heads: Vec<BlockId> = self
            .graph
            .hir_order()
            .iter()
            .copied()
            .filter(|&b| self.graph.block(b).flags.is_loop_head)
            .collect();

        for head in heads {
            let preds = self.graph.block(head).predecessors.clone();
            for phi in self.phis_of(head) {
                let HirKind::Phi { slot, args } = &self.graph.hir_raw(phi).kind else {
                    continue;
                };
                let slot = *slot;
                let current: Vec<Option<HirId>> =
                    preds.iter().map(|&p| self.graph.block(p).slot_value(slot)).collect();
                let old_args = args.clone();

                let mut new_args = old_args.clone();
                for (arg, value) in new_args.iter_mut().zip(current) {
                    if let Some(value) = value {
                        if *arg != value {
                            *arg = value;
                            patched += 1;
                        }
                    }
                }

                if new_args != old_args {
                    log::trace!("patched {} in {}: {:?}", phi, head, new_args);
                    if let HirKind::Phi { args, .. } = &mut self.graph.hir_raw_mut(phi).kind {
                        *args = new_args;
                    }
                }
            }
        }
        patched
    }

    /// One elision pass over every block. Returns how many merges were removed.
    fn elide_trivial(&mut self) -> usize {
        let mut elided = 0;
        for block in self.graph.hir_order().to_vec() {
            for phi in self.phis_of(block) {
                let Some(value) = self.single_incoming(phi) else {
                    continue;
                };

                log::trace!("elided {} -> {}", phi, value);
                self.graph.alias(phi, value);
                self.graph.block_mut(block).hir.retain(|&id| id != phi);
                self.session.record_phi_elided();
                elided += 1;
            }
        }
        elided
    }

    /// The one value other than itself that `phi` can take, if there is exactly one.
    fn single_incoming(&self, phi: HirId) -> Option<HirId> {
        let HirKind::Phi { args, .. } = &self.graph.hir_raw(phi).kind else {
            return None;
        };

        let mut value = None;
        for &arg in args {
            let arg = self.graph.resolve(arg);
            if arg == phi {
                continue;
            }
            match value {
                None => value = Some(arg),
                Some(v) if v == arg => {}
                Some(_) => return None,
            }
        }
        value
    }
}
