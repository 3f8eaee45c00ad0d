// This module converts the stack-machine instructions of an analysed graph into HIR. Blocks are
// visited breadth-first from the entry, but a block is only queued once every forward predecessor
// has been built (back edges into loop heads do not count), so a join always sees the exit state of
// all of its non-loop predecessors. The builder simulates the operand stack and a frame of local
// slots, each holding the HirId that currently defines it. The entry block seeds the frame with one
// Param node per formal parameter (the receiver first for instance methods, a placeholder in the
// second slot of long and double parameters) and Undefined placeholders everywhere else. A block with
// one predecessor inherits that predecessor's exit frame; a join creates a Phi per slot whose
// incoming values disagree, and a loop head creates a Phi for every slot, leaving self-referential
// arguments for predecessors that are built later; the block closing such a loop must leave the
// operand stack as deep as it was when the head was entered. Local loads and stores only move ids around.
// Array accesses are desugared into explicit address arithmetic (a 12-byte header and 4-byte
// elements) ahead of a single load or store node. Every non-returning block ends in a control node;
// blocks that simply fall into the next one get an explicit Goto.

//! Bytecode to HIR translation.

use super::{ArithOp, Condition, FrameSlot, HirId, HirKind, InvokeKind};
use crate::bytecode::constant_pool::{ConstantPool, MemberRef, PoolEntry};
use crate::bytecode::descriptor::{parse_field_descriptor, MethodDescriptor, ValueType};
use crate::bytecode::opcodes::*;
use crate::bytecode::Tuple;
use crate::cfg::{BlockId, ControlFlowGraph};
use crate::compiler::MethodInfo;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;

/// Bytes in front of the first array element.
pub const ARRAY_HEADER_SIZE: i32 = 12;
/// Bytes per array element.
pub const ARRAY_ELEMENT_SIZE: i32 = 4;

/// Builds the HIR of one method over its analysed graph.
pub struct HirBuilder<'a, 'arena> {
    graph: &'a mut ControlFlowGraph<'arena>,
    session: &'a CompilationSession<'arena>,
    pool: &'a dyn ConstantPool,
    is_static: bool,
    descriptor: MethodDescriptor,
    /// Local slots per frame.
    frame_size: usize,

    /// Block being translated.
    block: BlockId,
    locals: Vec<HirId>,
    stack: Vec<HirId>,
    built: HashSet<BlockId>,
    /// Operand stack depth on entry, per built block.
    entry_depth: HashMap<BlockId, usize>,
}

impl<'a, 'arena> HirBuilder<'a, 'arena> {
    pub fn new(
        graph: &'a mut ControlFlowGraph<'arena>,
        session: &'a CompilationSession<'arena>,
        pool: &'a dyn ConstantPool,
        method: &MethodInfo<'_>,
    ) -> CompileResult<Self> {
        let descriptor = MethodDescriptor::parse(method.descriptor)?;
        let receiver_slots = if method.is_static { 0 } else { 1 };
        let frame_size =
            (method.max_locals as usize).max(descriptor.param_slots() as usize + receiver_slots);
        let entry = graph.entry();

        Ok(Self {
            graph,
            session,
            pool,
            is_static: method.is_static,
            descriptor,
            frame_size,
            block: entry,
            locals: Vec::with_capacity(frame_size),
            stack: Vec::new(),
            built: HashSet::new(),
            entry_depth: HashMap::new(),
        })
    }

    /// Translate every block and record the visit order on the graph.
    pub fn build(mut self) -> CompileResult<()> {
        self.graph.validate()?;
        let order = self.visit_order()?;
        for &block in &order {
            self.build_block(block)?;
        }

        log::debug!(
            "Built {} HIR nodes over {} blocks",
            self.graph.hir_nodes().len(),
            order.len()
        );
        self.graph.set_hir_order(order);
        Ok(())
    }

    /// Breadth-first order in which a block follows all of its forward predecessors.
    fn visit_order(&self) -> CompileResult<Vec<BlockId>> {
        let graph = &*self.graph;
        let mut pending: HashMap<BlockId, usize> = graph
            .blocks()
            .map(|b| {
                let forward = b.predecessors.iter().filter(|&&p| !graph.is_back_edge(p, b.id)).count();
                (b.id, forward)
            })
            .collect();

        let mut queue = VecDeque::from([graph.entry()]);
        let mut order = Vec::with_capacity(pending.len());
        while let Some(block) = queue.pop_front() {
            order.push(block);
            for &succ in &graph.block(block).successors {
                if graph.is_back_edge(block, succ) {
                    continue;
                }
                if let Some(count) = pending.get_mut(&succ) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        queue.push_back(succ);
                    }
                }
            }
        }

        if order.len() != graph.block_count() {
            return Err(CompileError::BlockLayout {
                reason: format!(
                    "irreducible control flow: {} of {} blocks not reachable along forward edges",
                    graph.block_count() - order.len(),
                    graph.block_count()
                ),
            });
        }
        Ok(order)
    }

    fn build_block(&mut self, block: BlockId) -> CompileResult<()> {
        self.block = block;
        self.enter_block(block)?;
        self.entry_depth.insert(block, self.stack.len());
        log::trace!("HIR for {}", block);

        let tuples = self.graph.block(block).tuples.clone();
        for tuple in &tuples {
            self.translate(tuple)?;
        }

        let terminated = tuples.last().is_some_and(|t| t.category().ends_block());
        if !terminated {
            if let Some(&next) = self.graph.block(block).successors.first() {
                self.emit(ValueType::Void, HirKind::Goto { target: next });
            }
        }

        self.check_back_edges(block)?;
        let exit = self.graph.block_mut(block);
        exit.locals = std::mem::take(&mut self.locals);
        exit.stack = std::mem::take(&mut self.stack);
        self.built.insert(block);
        Ok(())
    }

    // -------- frame state ---------

    fn enter_block(&mut self, block: BlockId) -> CompileResult<()> {
        self.locals.clear();
        self.stack.clear();

        if block == self.graph.entry() {
            self.seed_entry();
            return Ok(());
        }

        let preds = self.graph.block(block).predecessors.clone();
        match preds.as_slice() {
            [] => Err(CompileError::BlockLayout {
                reason: format!("{} has no predecessors", block),
            }),
            [pred] => {
                if !self.built.contains(pred) {
                    return Err(CompileError::BlockLayout {
                        reason: format!("{} entered before its only predecessor {}", block, pred),
                    });
                }
                let pred = self.graph.block(*pred);
                self.locals = pred.locals.clone();
                self.stack = pred.stack.clone();
                Ok(())
            }
            _ => self.merge(block, &preds),
        }
    }

    /// A loop head built before `block` was entered with a known stack depth;
    /// the back edge from `block` must arrive with the same depth.
    fn check_back_edges(&self, block: BlockId) -> CompileResult<()> {
        for succ in &self.graph.block(block).successors {
            let Some(&expected) = self.entry_depth.get(succ) else {
                continue;
            };
            if self.stack.len() != expected {
                return Err(CompileError::StackMismatch {
                    block: succ.0,
                    expected,
                    found: self.stack.len(),
                });
            }
        }
        Ok(())
    }

    fn seed_entry(&mut self) {
        let mut params = Vec::with_capacity(self.descriptor.params.len() + 1);
        if !self.is_static {
            params.push(ValueType::Reference);
        }
        params.extend(self.descriptor.params.iter().copied());

        for (index, ty) in params.into_iter().enumerate() {
            let param = self.emit(ty.stack_type(), HirKind::Param { index: index as u16 });
            self.locals.push(param);
            if ty.slot_size() == 2 {
                self.push_undefined();
            }
        }
        while self.locals.len() < self.frame_size {
            self.push_undefined();
        }
    }

    fn push_undefined(&mut self) {
        let slot = self.locals.len() as u16;
        let id = self.emit(ValueType::Void, HirKind::Undefined { slot });
        self.locals.push(id);
    }

    /// Frame state at a join.
    fn merge(&mut self, block: BlockId, preds: &[BlockId]) -> CompileResult<()> {
        let is_head = self.graph.block(block).flags.is_loop_head;
        let built: Vec<bool> = preds.iter().map(|p| self.built.contains(p)).collect();

        if !is_head && built.contains(&false) {
            return Err(CompileError::BlockLayout {
                reason: format!("join {} entered before all of its predecessors", block),
            });
        }
        let first = built.iter().position(|&b| b).ok_or_else(|| CompileError::BlockLayout {
            reason: format!("loop head {} entered before any predecessor", block),
        })?;

        let depth = self.graph.block(preds[first]).stack.len();
        for (pred, &is_built) in preds.iter().zip(&built) {
            if !is_built {
                continue;
            }
            let found = self.graph.block(*pred).stack.len();
            if found != depth {
                return Err(CompileError::StackMismatch { block: block.0, expected: depth, found });
            }
        }

        let slots: Vec<FrameSlot> = (0..self.frame_size as u16)
            .map(FrameSlot::Local)
            .chain((0..depth as u16).map(FrameSlot::Stack))
            .collect();

        for slot in slots {
            let incoming: Vec<Option<HirId>> = preds
                .iter()
                .zip(&built)
                .map(|(pred, &b)| if b { self.graph.block(*pred).slot_value(slot) } else { None })
                .collect();

            let agreed = match incoming.first() {
                Some(&Some(value)) if !is_head && incoming.iter().all(|v| *v == Some(value)) => {
                    Some(value)
                }
                _ => None,
            };
            let value = match agreed {
                Some(value) => value,
                None => self.make_phi(slot, &incoming),
            };

            match slot {
                FrameSlot::Local(_) => self.locals.push(value),
                FrameSlot::Stack(_) => self.stack.push(value),
            }
        }
        Ok(())
    }

    /// Merge node for `slot`; missing incoming values point back at the node itself.
    fn make_phi(&mut self, slot: FrameSlot, incoming: &[Option<HirId>]) -> HirId {
        let ty = incoming
            .iter()
            .flatten()
            .map(|&id| self.graph.hir(id))
            .find(|node| !matches!(node.kind, HirKind::Undefined { .. }))
            .map_or(ValueType::Void, |node| node.ty);

        self.session.record_phi_created();
        self.emit_with(ty, |me| HirKind::Phi {
            slot,
            args: incoming.iter().map(|arg| arg.unwrap_or(me)).collect(),
        })
    }

    // -------- emission helpers ---------

    fn emit(&mut self, ty: ValueType, kind: HirKind<'arena>) -> HirId {
        self.emit_with(ty, |_| kind)
    }

    fn emit_with(&mut self, ty: ValueType, make: impl FnOnce(HirId) -> HirKind<'arena>) -> HirId {
        let id = self.graph.add_hir_with(self.block, ty, make);
        let node = self.graph.hir_raw(id);
        self.session.record_hir_node(node.kind.name());
        log::trace!("  {}", node);
        id
    }

    fn push(&mut self, id: HirId) {
        self.stack.push(id);
    }

    fn pop(&mut self, tuple: &Tuple) -> CompileResult<HirId> {
        self.stack
            .pop()
            .ok_or(CompileError::StackUnderflow { address: tuple.address })
    }

    fn push_int(&mut self, value: i32) {
        let id = self.emit(ValueType::Int, HirKind::IntConstant(value));
        self.push(id);
    }

    fn load_local(&mut self, tuple: &Tuple, index: u16) -> CompileResult<()> {
        let value = self
            .locals
            .get(index as usize)
            .copied()
            .ok_or(CompileError::InvalidLocal { index, address: tuple.address })?;
        self.push(value);
        Ok(())
    }

    fn store_local(&mut self, tuple: &Tuple, index: u16) -> CompileResult<()> {
        let value = self.pop(tuple)?;
        let slot = self
            .locals
            .get_mut(index as usize)
            .ok_or(CompileError::InvalidLocal { index, address: tuple.address })?;
        *slot = value;
        Ok(())
    }

    fn target_block(&self, tuple: &Tuple, target: i64) -> CompileResult<BlockId> {
        u32::try_from(target)
            .ok()
            .and_then(|address| self.graph.block_at(address))
            .ok_or(CompileError::InvalidJumpTarget { address: tuple.address, target })
    }

    // -------- translation ---------

    fn translate(&mut self, tuple: &Tuple) -> CompileResult<()> {
        let opcode = tuple.effective_opcode();
        let unsupported = CompileError::UnsupportedInstruction { opcode, address: tuple.address };

        match opcode {
            NOP => {}
            ACONST_NULL => {
                let id = self.emit(ValueType::Reference, HirKind::NullConstant);
                self.push(id);
            }
            ICONST_M1..=ICONST_5 => self.push_int(opcode as i32 - ICONST_0 as i32),
            BIPUSH => self.push_int(tuple.i8_operand(0) as i32),
            SIPUSH => self.push_int(tuple.i16_operand(0) as i32),
            LDC => self.load_constant(tuple.u8_operand(0) as u16)?,
            LDC_W => self.load_constant(tuple.u16_operand(0))?,

            ILOAD | ALOAD => self.load_local(tuple, tuple.local_index())?,
            ILOAD_0..=ILOAD_3 => self.load_local(tuple, (opcode - ILOAD_0) as u16)?,
            ALOAD_0..=ALOAD_3 => self.load_local(tuple, (opcode - ALOAD_0) as u16)?,
            ISTORE | ASTORE => self.store_local(tuple, tuple.local_index())?,
            ISTORE_0..=ISTORE_3 => self.store_local(tuple, (opcode - ISTORE_0) as u16)?,
            ASTORE_0..=ASTORE_3 => self.store_local(tuple, (opcode - ASTORE_0) as u16)?,

            IALOAD => self.array_load(tuple, ValueType::Int)?,
            AALOAD => self.array_load(tuple, ValueType::Reference)?,
            IASTORE | AASTORE => self.array_store(tuple)?,

            POP => {
                self.pop(tuple)?;
            }
            DUP => {
                let top = *self
                    .stack
                    .last()
                    .ok_or(CompileError::StackUnderflow { address: tuple.address })?;
                self.push(top);
            }
            SWAP => {
                let a = self.pop(tuple)?;
                let b = self.pop(tuple)?;
                self.push(a);
                self.push(b);
            }

            IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
                let op = ArithOp::from_opcode(opcode).ok_or(unsupported)?;
                let rhs = self.pop(tuple)?;
                let lhs = self.pop(tuple)?;
                let id = self.emit(ValueType::Int, HirKind::Arithmetic { op, opcode, lhs, rhs });
                self.push(id);
            }
            INEG => {
                let value = self.pop(tuple)?;
                let id = self.emit(ValueType::Int, HirKind::Negate { value });
                self.push(id);
            }
            IINC => {
                let index = tuple.local_index();
                self.load_local(tuple, index)?;
                let lhs = self.pop(tuple)?;
                let rhs = self.emit(ValueType::Int, HirKind::IntConstant(tuple.increment()));
                let sum = self.emit(
                    ValueType::Int,
                    HirKind::Arithmetic { op: ArithOp::Add, opcode, lhs, rhs },
                );
                self.push(sum);
                self.store_local(tuple, index)?;
            }

            IFEQ..=IFLE => {
                let lhs = self.pop(tuple)?;
                let rhs = self.emit(ValueType::Int, HirKind::IntConstant(0));
                self.branch(tuple, opcode, lhs, rhs)?;
            }
            IF_ICMPEQ..=IF_ACMPNE => {
                let rhs = self.pop(tuple)?;
                let lhs = self.pop(tuple)?;
                self.branch(tuple, opcode, lhs, rhs)?;
            }
            IFNULL | IFNONNULL => {
                let lhs = self.pop(tuple)?;
                let rhs = self.emit(ValueType::Reference, HirKind::NullConstant);
                self.branch(tuple, opcode, lhs, rhs)?;
            }
            GOTO | GOTO_W => {
                let target = tuple.jump_targets().first().copied().ok_or(unsupported)?;
                let target = self.target_block(tuple, target)?;
                self.emit(ValueType::Void, HirKind::Goto { target });
            }
            TABLESWITCH | LOOKUPSWITCH => self.switch(tuple)?,

            IRETURN | ARETURN => {
                let value = self.pop(tuple)?;
                self.emit(ValueType::Void, HirKind::Return { value: Some(value) });
            }
            RETURN => {
                self.emit(ValueType::Void, HirKind::Return { value: None });
            }
            ATHROW => {
                let value = self.pop(tuple)?;
                self.emit(ValueType::Void, HirKind::Throw { value });
            }

            GETSTATIC => {
                let field = MemberRef::field(self.pool, self.session, tuple.u16_operand(0))?;
                let ty = parse_field_descriptor(field.descriptor)?.stack_type();
                let id = self.emit(ty, HirKind::GetStatic { field });
                self.push(id);
            }
            PUTSTATIC => {
                let field = MemberRef::field(self.pool, self.session, tuple.u16_operand(0))?;
                let value = self.pop(tuple)?;
                self.emit(ValueType::Void, HirKind::PutStatic { field, value });
            }
            INVOKESTATIC => self.invoke(tuple, InvokeKind::Static)?,
            INVOKESPECIAL => self.invoke(tuple, InvokeKind::Special)?,

            _ => return Err(unsupported),
        }
        Ok(())
    }

    fn load_constant(&mut self, index: u16) -> CompileResult<()> {
        let pool = self.pool;
        let id = match pool.lookup(index)? {
            PoolEntry::Integer(value) => self.emit(ValueType::Int, HirKind::IntConstant(*value)),
            PoolEntry::String(value) => {
                let value = self.session.intern_str(value);
                self.emit(ValueType::Reference, HirKind::StringConstant(value))
            }
            _ => {
                return Err(CompileError::UnexpectedConstant {
                    index,
                    expected: "int or string constant",
                })
            }
        };
        self.push(id);
        Ok(())
    }

    /// `base = array + header` and `offset = index * element size`.
    fn element_address(&mut self, opcode: u8, array: HirId, index: HirId) -> (HirId, HirId) {
        let header = self.emit(ValueType::Int, HirKind::IntConstant(ARRAY_HEADER_SIZE));
        let base = self.emit(
            ValueType::Reference,
            HirKind::Arithmetic { op: ArithOp::Add, opcode, lhs: array, rhs: header },
        );
        let scale = self.emit(ValueType::Int, HirKind::IntConstant(ARRAY_ELEMENT_SIZE));
        let offset = self.emit(
            ValueType::Int,
            HirKind::Arithmetic { op: ArithOp::Mul, opcode, lhs: index, rhs: scale },
        );
        (base, offset)
    }

    fn array_load(&mut self, tuple: &Tuple, ty: ValueType) -> CompileResult<()> {
        let index = self.pop(tuple)?;
        let array = self.pop(tuple)?;
        let (base, offset) = self.element_address(tuple.opcode, array, index);
        let id = self.emit(ty, HirKind::ArrayLoad { base, offset });
        self.push(id);
        Ok(())
    }

    fn array_store(&mut self, tuple: &Tuple) -> CompileResult<()> {
        let value = self.pop(tuple)?;
        let index = self.pop(tuple)?;
        let array = self.pop(tuple)?;
        let (base, offset) = self.element_address(tuple.opcode, array, index);
        self.emit(ValueType::Void, HirKind::ArrayStore { base, offset, value });
        Ok(())
    }

    fn branch(&mut self, tuple: &Tuple, opcode: u8, lhs: HirId, rhs: HirId) -> CompileResult<()> {
        let unsupported = CompileError::UnsupportedInstruction { opcode, address: tuple.address };
        let condition = Condition::from_opcode(opcode).ok_or(unsupported.clone())?;
        let target = tuple.jump_targets().first().copied().ok_or(unsupported)?;
        let taken = self.target_block(tuple, target)?;
        let fallthrough = self.target_block(tuple, tuple.next_address() as i64)?;
        self.emit(
            ValueType::Void,
            HirKind::ConditionalJump { condition, lhs, rhs, taken, fallthrough },
        );
        Ok(())
    }

    fn switch(&mut self, tuple: &Tuple) -> CompileResult<()> {
        let value = self.pop(tuple)?;
        let table = tuple.switch_table().ok_or(CompileError::UnsupportedInstruction {
            opcode: tuple.opcode,
            address: tuple.address,
        })?;

        let here = tuple.address as i64;
        let default = self.target_block(tuple, here + table.default as i64)?;
        let cases = table
            .cases
            .iter()
            .map(|&(key, offset)| Ok((key, self.target_block(tuple, here + offset as i64)?)))
            .collect::<CompileResult<Vec<_>>>()?;

        self.emit(ValueType::Void, HirKind::Switch { value, default, cases });
        Ok(())
    }

    fn invoke(&mut self, tuple: &Tuple, kind: InvokeKind) -> CompileResult<()> {
        let method = MemberRef::method(self.pool, self.session, tuple.u16_operand(0))?;
        let descriptor = MethodDescriptor::parse(method.descriptor)?;
        let count = descriptor.arg_count() + usize::from(kind == InvokeKind::Special);
        if self.stack.len() < count {
            return Err(CompileError::StackUnderflow { address: tuple.address });
        }

        let args = self.stack.split_off(self.stack.len() - count);
        let id = self.emit(descriptor.ret.stack_type(), HirKind::Invoke { kind, method, args });
        if descriptor.returns_value() {
            self.push(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{ConstantTable, Decoder, StandardOperandTable};
    use crate::cfg::{FlowAnalyzer, GraphBuilder};
    use bumpalo::Bump;

    fn build<'arena>(
        session: &CompilationSession<'arena>,
        pool: &ConstantTable,
        method: &MethodInfo<'_>,
    ) -> CompileResult<ControlFlowGraph<'arena>> {
        let tuples = Decoder::new(&StandardOperandTable).decode(method.code)?;
        let mut graph = GraphBuilder::new(tuples).build()?;
        FlowAnalyzer::new(&mut graph).analyze()?;
        HirBuilder::new(&mut graph, session, pool, method)?.build()?;
        Ok(graph)
    }

    fn kinds(graph: &ControlFlowGraph<'_>, block: BlockId) -> Vec<&'static str> {
        graph.block(block).hir.iter().map(|&id| graph.hir(id).kind.name()).collect()
    }

    #[test]
    fn test_instance_parameters_seed_the_frame() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let pool = ConstantTable::new();
        let method = MethodInfo {
            owner: "Main",
            name: "f",
            descriptor: "(JI)V",
            is_static: false,
            max_locals: 6,
            code: &[RETURN],
        };

        let graph = build(&session, &pool, &method).unwrap();
        let entry = graph.block(graph.entry());
        assert_eq!(entry.locals.len(), 6);
        assert_eq!(graph.hir(entry.locals[0]).kind, HirKind::Param { index: 0 });
        assert_eq!(graph.hir(entry.locals[0]).ty, ValueType::Reference);
        assert_eq!(graph.hir(entry.locals[1]).kind, HirKind::Param { index: 1 });
        assert_eq!(graph.hir(entry.locals[1]).ty, ValueType::Long);
        assert_eq!(graph.hir(entry.locals[2]).kind, HirKind::Undefined { slot: 2 });
        assert_eq!(graph.hir(entry.locals[3]).kind, HirKind::Param { index: 2 });
        assert_eq!(graph.hir(entry.locals[5]).kind, HirKind::Undefined { slot: 5 });
    }

    #[test]
    fn test_array_access_is_desugared() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let pool = ConstantTable::new();
        let method = MethodInfo {
            owner: "Main",
            name: "get",
            descriptor: "([II)I",
            is_static: true,
            max_locals: 2,
            code: &[ALOAD_0, ILOAD_1, IALOAD, IRETURN],
        };

        let graph = build(&session, &pool, &method).unwrap();
        let entry = graph.entry();
        assert_eq!(
            kinds(&graph, entry),
            vec!["param", "param", "const", "arith", "const", "arith", "aload", "return"]
        );

        let hir = &graph.block(entry).hir;
        assert_eq!(graph.hir(hir[2]).kind, HirKind::IntConstant(ARRAY_HEADER_SIZE));
        match &graph.hir(hir[3]).kind {
            HirKind::Arithmetic { op, lhs, rhs, .. } => {
                assert_eq!(*op, ArithOp::Add);
                assert_eq!((*lhs, *rhs), (hir[0], hir[2]));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(graph.hir(hir[4]).kind, HirKind::IntConstant(ARRAY_ELEMENT_SIZE));
        assert_eq!(graph.hir(hir[6]).kind, HirKind::ArrayLoad { base: hir[3], offset: hir[5] });
    }

    #[test]
    fn test_diamond_join_merges_disagreeing_slots() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let pool = ConstantTable::new();
        // 0: iload_0  1: ifeq +8 -> 9  4: iconst_1  5: istore_1  6: goto +5 -> 11
        // 9: iconst_2  10: istore_1  11: iload_1  12: ireturn
        let code = [
            ILOAD_0, IFEQ, 0x00, 0x08, ICONST_1, ISTORE_1, GOTO, 0x00, 0x05, ICONST_2, ISTORE_1,
            ILOAD_1, IRETURN,
        ];
        let method = MethodInfo {
            owner: "Main",
            name: "pick",
            descriptor: "(I)I",
            is_static: true,
            max_locals: 2,
            code: &code,
        };

        let graph = build(&session, &pool, &method).unwrap();
        let join = graph.block_at(11).unwrap();
        let first = graph.block(join).hir[0];
        match &graph.hir(first).kind {
            HirKind::Phi { slot, args } => {
                assert_eq!(*slot, FrameSlot::Local(1));
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected a merge node, got {:?}", other),
        }
        // local 0 agrees on both paths and needs no merge
        assert_eq!(kinds(&graph, join), vec!["phi", "return"]);
        assert_eq!(session.stats().phis_created, 1);
    }

    #[test]
    fn test_errors() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let pool = ConstantTable::new();
        let mut method = MethodInfo {
            owner: "Main",
            name: "bad",
            descriptor: "()V",
            is_static: true,
            max_locals: 0,
            code: &[IADD, RETURN],
        };
        assert_eq!(
            build(&session, &pool, &method).unwrap_err(),
            CompileError::StackUnderflow { address: 0 }
        );

        method.code = &[ALOAD_0, GETFIELD, 0x00, 0x01, RETURN];
        method.max_locals = 1;
        assert_eq!(
            build(&session, &pool, &method).unwrap_err(),
            CompileError::UnsupportedInstruction { opcode: GETFIELD, address: 1 }
        );

        method.code = &[ILOAD_3, RETURN];
        assert_eq!(
            build(&session, &pool, &method).unwrap_err(),
            CompileError::InvalidLocal { index: 3, address: 0 }
        );

        method.code = &[LDC, 0x07, RETURN];
        assert_eq!(
            build(&session, &pool, &method).unwrap_err(),
            CompileError::MissingConstant { index: 7 }
        );
    }

    #[test]
    fn test_back_edge_with_different_stack_depth() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let pool = ConstantTable::new();
        // 0: nop  1: iconst_1  2: goto -1 -> 1, growing the stack on every iteration
        let method = MethodInfo {
            owner: "Main",
            name: "grow",
            descriptor: "()V",
            is_static: true,
            max_locals: 0,
            code: &[NOP, ICONST_1, GOTO, 0xff, 0xff],
        };
        assert_eq!(
            build(&session, &pool, &method).unwrap_err(),
            CompileError::StackMismatch { block: 1, expected: 0, found: 1 }
        );
    }
}
