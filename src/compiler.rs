// This module drives the whole backend for one method. MethodCompiler runs the stages in their
// required order: decode, build and connect blocks, flow analysis (loops, pruning, dominators), HIR
// building, merge-node cleanup and lowering. Each stage finishes before the next one starts and
// every stage reports into the session statistics. The result is a CompiledMethod that owns the
// method's graph. It gives the register allocator the per-block LIR lists, the virtual register
// count and a substitution hook driven by an IntervalLookup, and gives the assembly emitter the label
// prefix, block labels and the data-segment entries collected during lowering. Listings of the
// block, HIR and LIR views are available for debugging and for the command-line tool.

//! Per-method pipeline driver.

use crate::bytecode::constant_pool::ConstantPool;
use crate::bytecode::opcodes::{OperandTable, StandardOperandTable};
use crate::bytecode::Decoder;
use crate::cfg::{BasicBlock, BlockId, ControlFlowGraph, FlowAnalyzer, GraphBuilder};
use crate::core::error::CompileResult;
use crate::core::session::CompilationSession;
use crate::hir::{HirBuilder, PhiOptimizer};
use crate::lir::{DataEntry, IntervalLookup, LirNode, Lowering};
use std::fmt;

/// One method as delivered by the class-file layer.
#[derive(Debug, Clone, Copy)]
pub struct MethodInfo<'c> {
    /// Internal name of the declaring class.
    pub owner: &'c str,
    pub name: &'c str,
    /// Method descriptor, e.g. `(II)I`.
    pub descriptor: &'c str,
    pub is_static: bool,
    /// Local variable slots, including parameters.
    pub max_locals: u16,
    pub code: &'c [u8],
}

impl MethodInfo<'_> {
    /// Default label prefix: owner and name with every non-alphanumeric byte replaced by `_`.
    pub fn label_prefix(&self) -> String {
        format!("{}_{}", self.owner, self.name)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

/// Compiles methods against one session and constant pool.
pub struct MethodCompiler<'a, 'arena, T: OperandTable = StandardOperandTable> {
    session: &'a CompilationSession<'arena>,
    pool: &'a dyn ConstantPool,
    table: T,
}

impl<'a, 'arena> MethodCompiler<'a, 'arena> {
    pub fn new(session: &'a CompilationSession<'arena>, pool: &'a dyn ConstantPool) -> Self {
        Self { session, pool, table: StandardOperandTable }
    }
}

impl<'a, 'arena, T: OperandTable> MethodCompiler<'a, 'arena, T> {
    /// Use a different operand-length table.
    pub fn with_operand_table<U: OperandTable>(self, table: U) -> MethodCompiler<'a, 'arena, U> {
        MethodCompiler { session: self.session, pool: self.pool, table }
    }

    /// Compile with the default label prefix.
    pub fn compile(&self, method: &MethodInfo<'_>) -> CompileResult<CompiledMethod<'arena>> {
        self.compile_with_prefix(method, &method.label_prefix())
    }

    /// Compile, qualifying labels with `prefix`.
    pub fn compile_with_prefix(
        &self,
        method: &MethodInfo<'_>,
        prefix: &str,
    ) -> CompileResult<CompiledMethod<'arena>> {
        log::debug!(
            "Compiling {}.{}{} ({} bytes)",
            method.owner,
            method.name,
            method.descriptor,
            method.code.len()
        );

        let tuples = Decoder::new(&self.table).decode(method.code)?;
        let mut graph = GraphBuilder::new(tuples).build()?;
        self.session.record_blocks_built(graph.block_count());

        let flow = FlowAnalyzer::new(&mut graph).analyze()?;
        self.session.record_blocks_pruned(flow.pruned_blocks);
        self.session.record_loop_heads(flow.loop_heads);

        HirBuilder::new(&mut graph, self.session, self.pool, method)?.build()?;
        PhiOptimizer::new(&mut graph, self.session).run()?;
        let data = Lowering::new(&mut graph, self.session, prefix).run()?;

        let compiled = CompiledMethod {
            label_prefix: self.session.intern_str(prefix),
            graph,
            data,
        };
        let name = format!("{}.{}{}", method.owner, method.name, method.descriptor);
        self.session.record_method_compiled(&name, compiled.instruction_count());
        Ok(compiled)
    }
}

/// A lowered method, ready for register allocation and emission.
#[derive(Debug)]
pub struct CompiledMethod<'arena> {
    label_prefix: &'arena str,
    graph: ControlFlowGraph<'arena>,
    data: Vec<DataEntry<'arena>>,
}

impl<'arena> CompiledMethod<'arena> {
    pub fn label_prefix(&self) -> &'arena str {
        self.label_prefix
    }

    /// The method's graph, with its HIR and LIR.
    pub fn graph(&self) -> &ControlFlowGraph<'arena> {
        &self.graph
    }

    /// Blocks in address order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.graph.blocks()
    }

    /// LIR of `block` in execution order.
    pub fn instructions(&self, block: BlockId) -> impl Iterator<Item = &LirNode<'arena>> + '_ {
        self.graph
            .get_block(block)
            .into_iter()
            .flat_map(|b| b.lir.iter())
            .map(move |&id| self.graph.lir(id))
    }

    /// Assembly label of a block.
    pub fn block_label(&self, block: BlockId) -> String {
        format!("{}_B{}", self.label_prefix, block.0)
    }

    pub fn virtual_register_count(&self) -> u32 {
        self.graph.virtual_register_count()
    }

    /// Data-segment literals referenced by the code.
    pub fn data_entries(&self) -> &[DataEntry<'arena>] {
        &self.data
    }

    /// LIR instructions placed in blocks.
    pub fn instruction_count(&self) -> usize {
        self.graph.blocks().map(|b| b.lir.len()).sum()
    }

    /// Replace every virtual register the allocator resolves at each instruction.
    ///
    /// The program point handed to `lookup` is the instruction id, which equals
    /// the instruction's position when the blocks are laid out in address order.
    pub fn assign_registers(&mut self, lookup: &impl IntervalLookup) {
        let placed: Vec<_> = self.graph.blocks().flat_map(|b| b.lir.clone()).collect();
        let mut replaced = 0usize;
        for id in placed {
            self.graph.lir_mut(id).replace_registers(|reg| {
                if reg.is_virtual() {
                    if let Some(phys) = lookup.physical_register(reg, id) {
                        replaced += 1;
                        return phys;
                    }
                }
                reg
            });
        }
        log::debug!("Substituted {} register references", replaced);
    }

    /// Blocks with their bytecode.
    pub fn write_blocks(&self, f: &mut impl fmt::Write) -> fmt::Result {
        for block in self.graph.blocks() {
            self.write_block_header(f, block)?;
            for tuple in &block.tuples {
                writeln!(f, "  {}", tuple)?;
            }
        }
        Ok(())
    }

    /// Blocks with their HIR, in HIR order.
    pub fn write_hir(&self, f: &mut impl fmt::Write) -> fmt::Result {
        for &id in self.graph.hir_order() {
            let block = self.graph.block(id);
            self.write_block_header(f, block)?;
            for &node in &block.hir {
                writeln!(f, "  {}", self.graph.hir(node))?;
            }
        }
        Ok(())
    }

    fn write_block_header(&self, f: &mut impl fmt::Write, block: &BasicBlock) -> fmt::Result {
        write!(f, "{}:", self.block_label(block.id))?;
        if !block.predecessors.is_empty() {
            let preds: Vec<String> = block.predecessors.iter().map(|p| p.to_string()).collect();
            write!(f, " ; preds {}", preds.join(", "))?;
        }
        if block.flags.is_loop_head {
            write!(f, " ; loop head")?;
        }
        writeln!(f)
    }
}

impl fmt::Display for CompiledMethod<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.graph.blocks() {
            self.write_block_header(f, block)?;
            for &id in &block.lir {
                writeln!(f, "  {}", self.graph.lir(id))?;
            }
        }
        for entry in &self.data {
            writeln!(f, "{}: .string {:?}", entry.label, entry.value)?;
        }
        Ok(())
    }
}
