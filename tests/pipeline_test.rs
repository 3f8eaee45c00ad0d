// This test suite runs whole methods through the backend and checks the structural guarantees the
// rest of a compiler relies on. The straight-line method iconst_1 iconst_2 iadd ireturn must give one
// block holding two constants, an add and a return, and must lower to three value instructions plus
// the move into the return register and the return itself. A counting loop checks that every decoded
// instruction lands in exactly one block with contiguous address ranges, that successor and
// predecessor lists mirror each other, and that HIR and LIR ids only ever grow. Further cases cover
// static field access, string literals in the data segment, a loop that starts at address 0 (which
// needs an empty entry block), rejection of irreducible control flow, and the register substitution
// hook used by an external allocator. Placed LIR ids must count up in block layout order, a chain of
// sixteen thousand blocks must compile, and a merge move for an edge that leaves a conditional
// branch stays in the branching block.

//! End-to-end pipeline tests.

use bumpalo::Bump;
use stackjit::bytecode::opcodes::*;
use stackjit::bytecode::{Decoder, StandardOperandTable};
use stackjit::hir::ArithOp;
use stackjit::{
    CompilationSession, CompileError, CompiledMethod, ConstantTable, HirKind, LirId, LirOp,
    MethodCompiler, MethodInfo, Register, RegisterFile,
};

fn compile<'arena>(
    session: &CompilationSession<'arena>,
    pool: &ConstantTable,
    method: &MethodInfo<'_>,
) -> CompiledMethod<'arena> {
    MethodCompiler::new(session, pool).compile(method).unwrap()
}

fn static_method<'c>(name: &'c str, descriptor: &'c str, max_locals: u16, code: &'c [u8]) -> MethodInfo<'c> {
    MethodInfo { owner: "Main", name, descriptor, is_static: true, max_locals, code }
}

/// `int sum(int n) { int s = 0; for (int i = 0; i < n; i++) s += i; return s; }`
const SUM_LOOP: [u8; 21] = [
    ICONST_0, ISTORE_1, // 0
    ICONST_0, ISTORE_2, // 2
    ILOAD_2, ILOAD_0, IF_ICMPGE, 0x00, 0x0d, // 4, 5, 6 -> 19
    ILOAD_1, ILOAD_2, IADD, ISTORE_1, // 9
    IINC, 2, 1, // 13
    GOTO, 0xff, 0xf4, // 16 -> 4
    ILOAD_1, IRETURN, // 19
];

#[test]
fn test_straight_line_scenario() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    let method = static_method("three", "()I", 0, &[ICONST_1, ICONST_2, IADD, IRETURN]);
    let compiled = compile(&session, &pool, &method);
    let graph = compiled.graph();

    assert_eq!(graph.block_count(), 1);
    let entry = graph.block(graph.entry());

    let hir: Vec<&HirKind> = entry.hir.iter().map(|&id| &graph.hir(id).kind).collect();
    assert_eq!(hir.len(), 4);
    assert_eq!(*hir[0], HirKind::IntConstant(1));
    assert_eq!(*hir[1], HirKind::IntConstant(2));
    match hir[2] {
        HirKind::Arithmetic { op, opcode, lhs, rhs } => {
            assert_eq!(*op, ArithOp::Add);
            assert_eq!(*opcode, IADD);
            assert_eq!((*lhs, *rhs), (entry.hir[0], entry.hir[1]));
        }
        other => panic!("expected an add, got {:?}", other),
    }
    assert_eq!(*hir[3], HirKind::Return { value: Some(entry.hir[2]) });

    let lir: Vec<_> = compiled.instructions(graph.entry()).collect();
    assert_eq!(lir.len(), 5);
    assert_eq!(lir[0].op, LirOp::LoadConstant(1));
    assert_eq!(lir[1].op, LirOp::LoadConstant(2));
    assert_eq!(lir[2].op, LirOp::Binary(ArithOp::Add));
    assert_eq!(lir[2].reads(), &[lir[0].write().unwrap(), lir[1].write().unwrap()]);
    assert_eq!(lir[3].op, LirOp::Move);
    assert_eq!(lir[3].write(), Some(RegisterFile::RETURN_REGISTER));
    assert_eq!(lir[4].op, LirOp::Return);

    assert_eq!(
        compiled.to_string(),
        "Main_three_B0:\n\
         \x20 l0: v16 = ldi #1\n\
         \x20 l1: v17 = ldi #2\n\
         \x20 l2: v18 = add v16, v17\n\
         \x20 l3: r0 = mov v18\n\
         \x20 l4: ret r0\n"
    );

    let stats = session.stats();
    assert_eq!(stats.methods_compiled, 1);
    assert_eq!(stats.lir_instructions, 5);
    assert_eq!(compiled.virtual_register_count(), 3);
}

#[test]
fn test_partition_is_total_and_contiguous() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    let method = static_method("sum", "(I)I", 3, &SUM_LOOP);
    let compiled = compile(&session, &pool, &method);

    let decoded = Decoder::new(&StandardOperandTable).decode(&SUM_LOOP).unwrap();
    let addresses: Vec<u32> = decoded.iter().map(|t| t.address).collect();
    let partitioned: Vec<u32> = compiled
        .blocks()
        .flat_map(|b| b.tuples.iter().map(|t| t.address))
        .collect();
    assert_eq!(partitioned, addresses);

    let starts: Vec<u32> = compiled.blocks().filter_map(|b| b.start_address()).collect();
    assert_eq!(starts, vec![0, 4, 9, 19]);
    for block in compiled.blocks() {
        assert!(block.tuples[0].is_leader);
        assert!(block.tuples[1..].iter().all(|t| !t.is_leader));
    }
}

#[test]
fn test_edges_are_consistent() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    let method = static_method("sum", "(I)I", 3, &SUM_LOOP);
    let compiled = compile(&session, &pool, &method);
    let graph = compiled.graph();

    for block in graph.blocks() {
        for &succ in &block.successors {
            assert!(graph.block(succ).predecessors.contains(&block.id));
        }
        for &pred in &block.predecessors {
            assert!(graph.block(pred).successors.contains(&block.id));
        }
    }
}

#[test]
fn test_ids_are_strictly_increasing() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    let method = static_method("sum", "(I)I", 3, &SUM_LOOP);
    let compiled = compile(&session, &pool, &method);
    let graph = compiled.graph();

    let hir_ids: Vec<u32> = graph.hir_nodes().iter().map(|n| n.id.0).collect();
    assert!(hir_ids.windows(2).all(|w| w[0] < w[1]));
    let lir_ids: Vec<u32> = graph.lir_nodes().iter().map(|n| n.id.0).collect();
    assert!(lir_ids.windows(2).all(|w| w[0] < w[1]));

    // every instruction is placed exactly once
    let mut placed: Vec<u32> = graph.blocks().flat_map(|b| b.lir.iter().map(|id| id.0)).collect();
    placed.sort_unstable();
    assert_eq!(placed, lir_ids);
}

#[test]
fn test_lir_ids_follow_block_layout() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    let method = static_method("sum", "(I)I", 3, &SUM_LOOP);
    let compiled = compile(&session, &pool, &method);
    let graph = compiled.graph();

    // merge moves added after the loop body was lowered still sit in front of it
    let placed: Vec<u32> = compiled
        .blocks()
        .flat_map(|b| compiled.instructions(b.id))
        .map(|n| n.id.0)
        .collect();
    let expected: Vec<u32> = (0..placed.len() as u32).collect();
    assert_eq!(placed, expected);

    let head = graph.block_at(4).unwrap();
    let entry_last = compiled.instructions(graph.entry()).last().unwrap().id;
    let head_first = compiled.instructions(head).next().unwrap().id;
    assert_eq!(head_first.0, entry_last.0 + 1);
}

#[test]
fn test_long_branch_chain_compiles() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    let mut code = Vec::new();
    for _ in 0..16_000 {
        code.extend_from_slice(&[ILOAD_0, IFEQ, 0x00, 0x03]);
    }
    code.push(RETURN);
    assert_eq!(code.len(), 64_001);

    let method = static_method("chain", "(I)V", 1, &code);
    let compiled = compile(&session, &pool, &method);
    let graph = compiled.graph();
    assert_eq!(graph.block_count(), 16_001);
    assert_eq!(graph.hir_order().len(), 16_001);

    let last = graph.block_at(64_000).unwrap();
    assert_eq!(graph.block(last).dominator, graph.block_at(63_996));
    let ret: Vec<_> = compiled.instructions(last).collect();
    assert_eq!(ret.len(), 1);
    assert_eq!(ret[0].op, LirOp::Return);
    assert_eq!(session.stats().methods_compiled, 1);
}

#[test]
fn test_merge_move_before_conditional_branch_runs_on_both_edges() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    // 0: iconst_1  1: istore_1  2: iload_0  3: ifeq +5 -> 8
    // 6: iconst_2  7: istore_1  8: iload_1  9: ireturn
    let code = [ICONST_1, ISTORE_1, ILOAD_0, IFEQ, 0x00, 0x05, ICONST_2, ISTORE_1, ILOAD_1, IRETURN];
    let method = static_method("choose", "(I)I", 2, &code);
    let compiled = compile(&session, &pool, &method);
    let graph = compiled.graph();

    let other = graph.block_at(6).unwrap();
    let join = graph.block_at(8).unwrap();
    assert_eq!(graph.block_count(), 3);
    assert_eq!(graph.block(join).predecessors, vec![graph.entry(), other]);

    // no block is added on the edge into the join: the move for that edge sits in
    // the entry block, ahead of the branch, and also runs on the way into `other`
    let entry: Vec<_> = compiled.instructions(graph.entry()).collect();
    let branch = entry[entry.len() - 1];
    assert!(matches!(
        branch.op,
        LirOp::Branch { taken, fallthrough, .. } if taken == join && fallthrough == other
    ));
    let edge_move = entry[entry.len() - 2];
    assert!(edge_move.is_move());
    let one = entry.iter().find(|n| n.op == LirOp::LoadConstant(1)).unwrap();
    assert_eq!(edge_move.reads(), &[one.write().unwrap()]);
    let merge_register = edge_move.write().unwrap();

    let fallthrough: Vec<_> = compiled.instructions(other).collect();
    assert_eq!(fallthrough.len(), 3);
    assert_eq!(fallthrough[0].op, LirOp::LoadConstant(2));
    assert!(fallthrough[1].is_move());
    assert_eq!(fallthrough[1].write(), Some(merge_register));
    assert_eq!(fallthrough[2].op, LirOp::Jump(join));

    let ret: Vec<_> = compiled.instructions(join).collect();
    assert_eq!(ret[0].reads(), &[merge_register]);
    assert_eq!(session.stats().phi_moves, 2);
}

#[test]
fn test_static_fields() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut pool = ConstantTable::new();
    pool.field(3, "Main", "counter", "I");
    let code = [GETSTATIC, 0x00, 0x03, ICONST_1, IADD, PUTSTATIC, 0x00, 0x03, RETURN];
    let method = static_method("bump", "()V", 0, &code);
    let compiled = compile(&session, &pool, &method);

    let ops: Vec<LirOp> = compiled
        .instructions(compiled.graph().entry())
        .map(|n| n.op.clone())
        .collect();
    assert!(matches!(ops[0], LirOp::LoadStatic(f) if f.name == "counter"));
    assert_eq!(ops[1], LirOp::LoadConstant(1));
    assert_eq!(ops[2], LirOp::Binary(ArithOp::Add));
    assert!(matches!(ops[3], LirOp::StoreStatic(f) if f.to_string() == "Main.counter:I"));
    assert_eq!(ops[4], LirOp::Return);
}

#[test]
fn test_string_constant_goes_to_data_segment() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut pool = ConstantTable::new();
    pool.string(4, "hi");
    let method = static_method("greet", "()Ljava/lang/String;", 0, &[LDC, 0x04, ARETURN]);
    let compiled = compile(&session, &pool, &method);

    let data = compiled.data_entries();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].label, "Main_greet_str0");
    assert_eq!(data[0].value, "hi");

    let first = compiled.instructions(compiled.graph().entry()).next().unwrap();
    assert_eq!(first.op, LirOp::LoadAddress("Main_greet_str0"));
    assert!(compiled.to_string().contains("Main_greet_str0: .string \"hi\""));
}

#[test]
fn test_loop_at_entry_gets_empty_entry_block() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    // 0: iinc 0 -1  3: iload_0  4: ifgt -4 -> 0  7: return
    let code = [IINC, 0, 0xff, ILOAD_0, IFGT, 0xff, 0xfc, RETURN];
    let method = static_method("countdown", "(I)V", 1, &code);
    let compiled = compile(&session, &pool, &method);
    let graph = compiled.graph();

    let entry = graph.block(graph.entry());
    assert!(entry.tuples.is_empty());
    assert!(entry.predecessors.is_empty());

    let body = graph.block_at(0).unwrap();
    assert_eq!(entry.successors, vec![body]);
    assert!(graph.block(body).flags.is_loop_head);
    assert!(graph.block(body).flags.is_loop_tail);
    assert_eq!(graph.block(body).predecessors, vec![graph.entry(), body]);

    // the entry block jumps into the loop after copying the parameter into the merge register
    let entry_lir: Vec<_> = compiled.instructions(graph.entry()).collect();
    assert_eq!(entry_lir.last().unwrap().op, LirOp::Jump(body));
    let phi_register = entry_lir[entry_lir.len() - 2].write().unwrap();

    // the loop body updates the same register ahead of its conditional branch
    let body_lir: Vec<_> = compiled.instructions(body).collect();
    let branch = body_lir[body_lir.len() - 1];
    assert!(matches!(branch.op, LirOp::Branch { taken, .. } if taken == body));
    let update = body_lir[body_lir.len() - 2];
    assert!(update.is_move());
    assert_eq!(update.write(), Some(phi_register));
}

#[test]
fn test_irreducible_flow_is_rejected() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    // two blocks that branch into each other, both entered from the entry block
    let code = [
        ILOAD_0, IFEQ, 0x00, 0x08, // 0 -> 9
        ILOAD_0, IFNE, 0x00, 0x04, // 4 -> 9
        RETURN, // 8
        ILOAD_0, IFNE, 0xff, 0xfa, // 9 -> 4
        RETURN, // 13
    ];
    let method = static_method("tangle", "(I)V", 1, &code);
    let err = MethodCompiler::new(&session, &pool).compile(&method).unwrap_err();
    assert!(matches!(err, CompileError::BlockLayout { .. }), "got {:?}", err);
}

#[test]
fn test_unknown_opcode_fails_the_method() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    let method = static_method("broken", "()V", 0, &[NOP, 0xfe, RETURN]);
    let err = MethodCompiler::new(&session, &pool).compile(&method).unwrap_err();
    assert_eq!(err, CompileError::UnknownOpcode { opcode: 0xfe, address: 1 });
}

#[test]
fn test_register_substitution() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    let method = static_method("three", "()I", 0, &[ICONST_1, ICONST_2, IADD, IRETURN]);
    let mut compiled = compile(&session, &pool, &method);

    // v16 and v17 get r4 and r5 everywhere; v18 only until the add has executed
    let lookup = |vreg: Register, position: LirId| match vreg.id() {
        16 => Some(Register::physical(4)),
        17 => Some(Register::physical(5)),
        18 if position.0 <= 2 => Some(Register::physical(6)),
        _ => None,
    };
    compiled.assign_registers(&lookup);

    let listing: Vec<String> = compiled
        .instructions(compiled.graph().entry())
        .map(|n| n.to_string())
        .collect();
    assert_eq!(
        listing,
        vec![
            "l0: r4 = ldi #1",
            "l1: r5 = ldi #2",
            "l2: r6 = add r4, r5",
            "l3: r0 = mov v18",
            "l4: ret r0",
        ]
    );
}
