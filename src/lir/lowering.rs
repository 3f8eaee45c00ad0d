// This module lowers HIR into LIR. Lowering is memoized per HIR node: the first request emits the
// node's instructions into the block that owns the node and records the resulting instruction and
// result register, and every later request returns the recorded pair unchanged. Operands are
// lowered first by an explicit post-order walk over operand edges (merge arguments are not followed,
// which is what breaks loop-carried cycles), so no recursion depth depends on the method size.
// Value nodes get a fresh virtual register; parameters are copied out of their argument register or
// loaded from their incoming stack slot; undefined placeholders and merge nodes get a register with
// no instruction. Calls follow the fixed convention: each argument register is saved into a fresh
// virtual register before being overwritten and restored after the call, arguments past the fourth
// go to outgoing stack slots, and a non-void result is moved out of r0. Merge nodes are resolved
// last by placing one move per argument into the matching predecessor, ahead of its jump. A move
// placed before a conditional branch or switch also runs on the edges that do not lead to the merge.
// The finished instruction lists are renumbered in block order, so ids are program points.

//! HIR to LIR lowering and merge resolution.

use super::calling_convention::{CCAssigner, CCAssignment, FixedAssigner};
use super::{LirId, LirOp};
use crate::bytecode::constant_pool::MemberRef;
use crate::bytecode::descriptor::ValueType;
use crate::cfg::{BlockId, ControlFlowGraph};
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::{Register, RegisterFile};
use crate::core::session::CompilationSession;
use crate::hir::{HirId, HirKind};
use hashbrown::{HashMap, HashSet};

/// Recorded lowering of one HIR node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lowered {
    /// Instruction standing for the node, if it emitted any.
    pub lir: Option<LirId>,
    /// Register holding the node's value, if it has one.
    pub register: Option<Register>,
}

/// A literal placed in the data segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataEntry<'arena> {
    pub label: &'arena str,
    pub value: &'arena str,
}

/// Lowers the HIR of one graph.
pub struct Lowering<'a, 'arena> {
    graph: &'a mut ControlFlowGraph<'arena>,
    session: &'a CompilationSession<'arena>,
    label_prefix: &'arena str,
    lowered: HashMap<HirId, Lowered>,
    data: Vec<DataEntry<'arena>>,
}

impl<'a, 'arena> Lowering<'a, 'arena> {
    pub fn new(
        graph: &'a mut ControlFlowGraph<'arena>,
        session: &'a CompilationSession<'arena>,
        label_prefix: &str,
    ) -> Self {
        Self {
            graph,
            session,
            label_prefix: session.intern_str(label_prefix),
            lowered: HashMap::new(),
            data: Vec::new(),
        }
    }

    /// Lower every block, resolve merges, renumber the placed instructions in
    /// block order and hand back the data segment.
    pub fn run(mut self) -> CompileResult<Vec<DataEntry<'arena>>> {
        self.lower_all()?;
        self.resolve_phis()?;
        self.graph.renumber_lir();
        log::debug!(
            "Lowered to {} LIR instructions, {} virtual registers, {} data entries",
            self.graph.lir_nodes().len(),
            self.graph.virtual_register_count(),
            self.data.len()
        );
        Ok(self.data)
    }

    /// Lower every HIR node still listed in a block, in HIR block order.
    pub fn lower_all(&mut self) -> CompileResult<()> {
        self.graph.validate()?;
        for block in self.graph.hir_order().to_vec() {
            for id in self.graph.block(block).hir.clone() {
                self.lower(id)?;
            }
        }
        Ok(())
    }

    /// Recorded lowering of `id`, if it has been lowered.
    pub fn lowered(&self, id: HirId) -> Option<Lowered> {
        self.lowered.get(&self.graph.resolve(id)).copied()
    }

    pub fn data_entries(&self) -> &[DataEntry<'arena>] {
        &self.data
    }

    /// Lower `id` and, first, every operand it depends on. Lowering a node
    /// again returns the recorded result without emitting anything.
    pub fn lower(&mut self, id: HirId) -> CompileResult<Lowered> {
        let root = self.graph.resolve(id);
        let mut work = vec![(root, false)];

        while let Some((node, expanded)) = work.pop() {
            if self.lowered.contains_key(&node) {
                continue;
            }
            if expanded {
                let lowered = self.emit(node)?;
                self.lowered.insert(node, lowered);
                continue;
            }

            work.push((node, true));
            let hir = self.graph.hir(node);
            if !hir.is_phi() {
                for operand in hir.operands().into_iter().rev() {
                    let operand = self.graph.resolve(operand);
                    if !self.lowered.contains_key(&operand) {
                        work.push((operand, false));
                    }
                }
            }
        }

        self.lowered.get(&root).copied().ok_or_else(|| CompileError::Lowering {
            reason: format!("{} was not lowered", root),
        })
    }

    fn register_of(&self, id: HirId) -> CompileResult<Register> {
        let id = self.graph.resolve(id);
        self.lowered
            .get(&id)
            .and_then(|l| l.register)
            .ok_or_else(|| CompileError::Lowering {
                reason: format!("{} has no result register", id),
            })
    }

    fn value(
        &mut self,
        block: BlockId,
        op: LirOp<'arena>,
        reads: Vec<Register>,
    ) -> Lowered {
        let dst = self.graph.new_virtual_register();
        let lir = self.graph.append_lir(block, op, reads, Some(dst));
        Lowered { lir: Some(lir), register: Some(dst) }
    }

    fn effect(&mut self, block: BlockId, op: LirOp<'arena>, reads: Vec<Register>) -> Lowered {
        let lir = self.graph.append_lir(block, op, reads, None);
        Lowered { lir: Some(lir), register: None }
    }

    /// Emit the instructions of one node whose operands are already lowered.
    fn emit(&mut self, id: HirId) -> CompileResult<Lowered> {
        let node = self.graph.hir(id).clone();
        let block = node.block;

        let lowered = match node.kind {
            HirKind::Param { index } => self.lower_param(block, index)?,
            HirKind::Undefined { .. } | HirKind::Phi { .. } => Lowered {
                lir: None,
                register: Some(self.graph.new_virtual_register()),
            },
            HirKind::IntConstant(value) => self.value(block, LirOp::LoadConstant(value), vec![]),
            HirKind::NullConstant => self.value(block, LirOp::LoadConstant(0), vec![]),
            HirKind::StringConstant(value) => {
                let label = self.data_label(value);
                self.value(block, LirOp::LoadAddress(label), vec![])
            }
            HirKind::Arithmetic { op, lhs, rhs, .. } => {
                let reads = vec![self.register_of(lhs)?, self.register_of(rhs)?];
                self.value(block, LirOp::Binary(op), reads)
            }
            HirKind::Negate { value } => {
                let reads = vec![self.register_of(value)?];
                self.value(block, LirOp::Negate, reads)
            }
            HirKind::GetStatic { field } => self.value(block, LirOp::LoadStatic(field), vec![]),
            HirKind::PutStatic { field, value } => {
                let reads = vec![self.register_of(value)?];
                self.effect(block, LirOp::StoreStatic(field), reads)
            }
            HirKind::ArrayLoad { base, offset } => {
                let reads = vec![self.register_of(base)?, self.register_of(offset)?];
                self.value(block, LirOp::Load, reads)
            }
            HirKind::ArrayStore { base, offset, value } => {
                let reads = vec![
                    self.register_of(base)?,
                    self.register_of(offset)?,
                    self.register_of(value)?,
                ];
                self.effect(block, LirOp::Store, reads)
            }
            HirKind::Invoke { method, args, .. } => self.lower_call(block, method, &args, node.ty)?,
            HirKind::ConditionalJump { condition, lhs, rhs, taken, fallthrough } => {
                let reads = vec![self.register_of(lhs)?, self.register_of(rhs)?];
                self.effect(block, LirOp::Branch { condition, taken, fallthrough }, reads)
            }
            HirKind::Goto { target } => self.effect(block, LirOp::Jump(target), vec![]),
            HirKind::Switch { value, default, cases } => {
                let reads = vec![self.register_of(value)?];
                self.effect(block, LirOp::Switch { default, cases }, reads)
            }
            HirKind::Return { value: Some(value) } => {
                let src = self.register_of(value)?;
                let ret = RegisterFile::RETURN_REGISTER;
                self.graph.append_lir(block, LirOp::Move, vec![src], Some(ret));
                self.effect(block, LirOp::Return, vec![ret])
            }
            HirKind::Return { value: None } => self.effect(block, LirOp::Return, vec![]),
            HirKind::Throw { value } => {
                let reads = vec![self.register_of(value)?];
                self.effect(block, LirOp::Throw, reads)
            }
        };

        if let Some(lir) = lowered.lir {
            log::trace!("{} => {}", id, self.graph.lir(lir));
        }
        Ok(lowered)
    }

    fn lower_param(&mut self, block: BlockId, index: u16) -> CompileResult<Lowered> {
        let location = FixedAssigner::nth_arg(index as usize);
        match (location.reg, location.stack_off) {
            (Some(reg), _) => Ok(self.value(block, LirOp::Move, vec![reg])),
            (None, Some(offset)) => Ok(self.value(block, LirOp::LoadStack(offset), vec![])),
            (None, None) => Err(CompileError::Lowering {
                reason: format!("no location for parameter {}", index),
            }),
        }
    }

    /// Argument setup, call, result move and argument register restores.
    fn lower_call(
        &mut self,
        block: BlockId,
        method: MemberRef<'arena>,
        args: &[HirId],
        ret_ty: ValueType,
    ) -> CompileResult<Lowered> {
        let sources = args
            .iter()
            .map(|&arg| self.register_of(arg))
            .collect::<CompileResult<Vec<_>>>()?;

        let mut cc = FixedAssigner::new();
        let mut saved = Vec::new();
        let mut arg_regs = Vec::new();
        for src in sources {
            let mut arg = CCAssignment::new();
            cc.assign_arg(&mut arg);
            match (arg.reg, arg.stack_off) {
                (Some(reg), _) => {
                    let save = self.graph.new_virtual_register();
                    self.graph.append_lir(block, LirOp::Move, vec![reg], Some(save));
                    self.graph.append_lir(block, LirOp::Move, vec![src], Some(reg));
                    saved.push((reg, save));
                    arg_regs.push(reg);
                }
                (None, Some(offset)) => {
                    self.graph.append_lir(block, LirOp::StoreStack(offset), vec![src], None);
                }
                (None, None) => {
                    return Err(CompileError::Lowering {
                        reason: format!("no location for an argument of {}", method),
                    })
                }
            }
        }

        let mut ret = CCAssignment::new();
        cc.assign_ret(ret_ty, &mut ret);
        let call = self.graph.append_lir(block, LirOp::Call(method), arg_regs, ret.reg);

        let lowered = match ret.reg {
            Some(reg) => {
                let dst = self.graph.new_virtual_register();
                let result = self.graph.append_lir(block, LirOp::Move, vec![reg], Some(dst));
                Lowered { lir: Some(result), register: Some(dst) }
            }
            None => Lowered { lir: Some(call), register: None },
        };

        for (reg, save) in saved {
            self.graph.append_lir(block, LirOp::Move, vec![save], Some(reg));
        }

        self.session.record_call_lowered(&method.to_string());
        Ok(lowered)
    }

    /// Data-segment label for a string literal; equal literals share one entry.
    fn data_label(&mut self, value: &'arena str) -> &'arena str {
        if let Some(entry) = self.data.iter().find(|e| e.value == value) {
            return entry.label;
        }
        let label = format!("{}_str{}", self.label_prefix, self.data.len());
        let label = self.session.intern_str(&label);
        self.data.push(DataEntry { label, value });
        label
    }

    /// Turn every remaining merge node into moves on its incoming edges.
    pub fn resolve_phis(&mut self) -> CompileResult<()> {
        self.graph.validate()?;
        for block in self.graph.hir_order().to_vec() {
            let phis: Vec<HirId> = self
                .graph
                .block(block)
                .hir
                .iter()
                .copied()
                .filter(|&id| self.graph.hir_raw(id).is_phi())
                .collect();
            if phis.is_empty() {
                continue;
            }

            let preds = self.graph.block(block).predecessors.clone();
            let mut moves: Vec<Vec<(Register, Register)>> = vec![Vec::new(); preds.len()];
            for phi in phis {
                let HirKind::Phi { args, .. } = &self.graph.hir_raw(phi).kind else {
                    continue;
                };
                let args = args.clone();
                if args.len() != preds.len() {
                    return Err(CompileError::Lowering {
                        reason: format!(
                            "merge {} has {} arguments but {} has {} predecessors",
                            phi,
                            args.len(),
                            block,
                            preds.len()
                        ),
                    });
                }

                let dst = self.register_of(phi)?;
                for (position, arg) in args.into_iter().enumerate() {
                    self.lower(arg)?;
                    let src = self.register_of(arg)?;
                    if src != dst {
                        moves[position].push((src, dst));
                    }
                }
            }

            for (pred, edge_moves) in preds.into_iter().zip(moves) {
                self.insert_edge_moves(pred, edge_moves);
            }
        }
        Ok(())
    }

    /// Place the moves of one edge at the end of `pred`, ahead of its jump.
    ///
    /// A source that is also the destination of another move on the same edge
    /// is copied to a temporary first, so every move reads its old value.
    fn insert_edge_moves(&mut self, pred: BlockId, moves: Vec<(Register, Register)>) {
        if moves.is_empty() {
            return;
        }

        let destinations: HashSet<Register> = moves.iter().map(|&(_, dst)| dst).collect();
        let mut sequence = Vec::with_capacity(moves.len());
        let mut staged = Vec::with_capacity(moves.len());
        for (src, dst) in moves {
            if destinations.contains(&src) {
                let tmp = self.graph.new_virtual_register();
                sequence.push((src, tmp));
                staged.push((tmp, dst));
            } else {
                staged.push((src, dst));
            }
        }
        sequence.extend(staged);

        let lir = &self.graph.block(pred).lir;
        let mut at = match lir.last() {
            Some(&last) if self.graph.lir(last).is_jump() => lir.len() - 1,
            _ => lir.len(),
        };
        for (src, dst) in sequence {
            let id = self.graph.new_lir(LirOp::Move, vec![src], Some(dst));
            self.graph.block_mut(pred).lir.insert(at, id);
            at += 1;
            self.session.record_phi_move();
            log::trace!("phi move in {}: {} = {}", pred, dst, src);
        }
    }
}
