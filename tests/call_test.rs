// This test suite checks that calls and parameters follow the fixed calling convention. The first
// four arguments travel in r0 to r3. Each of those registers is saved into a fresh virtual register
// before the argument is moved in, and is restored from it after the call. Arguments past the fourth
// are stored to outgoing stack slots at four-byte steps, in argument order. A non-void call writes r0
// and the result is moved into a fresh virtual register before the restores run. On the callee side
// parameters are copied out of the argument registers or loaded from the incoming stack slots.
// invokespecial passes the receiver as argument zero.

//! Calling convention tests.

use bumpalo::Bump;
use stackjit::bytecode::opcodes::*;
use stackjit::hir::InvokeKind;
use stackjit::{
    CompilationSession, CompiledMethod, ConstantTable, HirKind, LirNode, LirOp, MethodCompiler, MethodInfo,
    RegisterFile,
};

fn compile<'arena>(
    session: &CompilationSession<'arena>,
    pool: &ConstantTable,
    method: &MethodInfo<'_>,
) -> CompiledMethod<'arena> {
    MethodCompiler::new(session, pool).compile(method).unwrap()
}

fn entry_lir<'c, 'arena>(compiled: &'c CompiledMethod<'arena>) -> Vec<&'c LirNode<'arena>> {
    compiled.instructions(compiled.graph().entry()).collect()
}

#[test]
fn test_six_argument_call() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut pool = ConstantTable::new();
    pool.method(1, "Util", "six", "(IIIIII)I");
    let code = [
        ICONST_0, ICONST_1, ICONST_2, ICONST_3, ICONST_4, ICONST_5,
        INVOKESTATIC, 0x00, 0x01,
        IRETURN,
    ];
    let method = MethodInfo { owner: "Main", name: "f", descriptor: "()I", is_static: true, max_locals: 0, code: &code };
    let compiled = compile(&session, &pool, &method);
    let lir = entry_lir(&compiled);
    let args = RegisterFile::ARGUMENT_REGISTERS;

    // six constants, four save/argument pairs, two stack stores, the call,
    // the result move, four restores, then the return
    assert_eq!(lir.len(), 24);
    let constants: Vec<_> = lir[..6].iter().map(|n| n.write().unwrap()).collect();

    let setup = &lir[6..16];
    for i in 0..4 {
        let save = setup[2 * i];
        let arg = setup[2 * i + 1];
        assert!(save.is_move());
        assert_eq!(save.reads(), &[args[i]]);
        assert!(save.write().unwrap().is_virtual());
        assert!(arg.is_move());
        assert_eq!(arg.reads(), &[constants[i]]);
        assert_eq!(arg.write(), Some(args[i]));
    }
    assert_eq!(setup[8].op, LirOp::StoreStack(0));
    assert_eq!(setup[8].reads(), &[constants[4]]);
    assert_eq!(setup[9].op, LirOp::StoreStack(4));
    assert_eq!(setup[9].reads(), &[constants[5]]);

    let call = lir[16];
    assert!(matches!(call.op, LirOp::Call(m) if m.to_string() == "Util.six:(IIIIII)I"));
    assert_eq!(call.reads(), &args);
    assert_eq!(call.write(), Some(RegisterFile::RETURN_REGISTER));

    let result = lir[17];
    assert!(result.is_move());
    assert_eq!(result.reads(), &[RegisterFile::RETURN_REGISTER]);
    let value = result.write().unwrap();
    assert!(value.is_virtual());

    for i in 0..4 {
        let restore = lir[18 + i];
        assert!(restore.is_move());
        assert_eq!(restore.reads(), &[setup[2 * i].write().unwrap()]);
        assert_eq!(restore.write(), Some(args[i]));
    }

    assert_eq!(lir[22].reads(), &[value]);
    assert_eq!(lir[22].write(), Some(RegisterFile::RETURN_REGISTER));
    assert_eq!(lir[23].op, LirOp::Return);

    assert_eq!(session.stats().calls_lowered, 1);
}

#[test]
fn test_void_call_has_no_result_move() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut pool = ConstantTable::new();
    pool.method(2, "Log", "tick", "(I)V");
    let code = [BIPUSH, 42, INVOKESTATIC, 0x00, 0x02, RETURN];
    let method = MethodInfo { owner: "Main", name: "g", descriptor: "()V", is_static: true, max_locals: 0, code: &code };
    let compiled = compile(&session, &pool, &method);
    let lir = entry_lir(&compiled);

    let ops: Vec<String> = lir.iter().map(|n| n.to_string()).collect();
    assert_eq!(
        ops,
        vec![
            "l0: v16 = ldi #42",
            "l1: v17 = mov r0",
            "l2: r0 = mov v16",
            "l3: call r0, Log.tick:(I)V",
            "l4: r0 = mov v17",
            "l5: ret",
        ]
    );
    assert_eq!(lir[3].write(), None);
}

#[test]
fn test_invokespecial_passes_receiver() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut pool = ConstantTable::new();
    pool.method(2, "Base", "<init>", "()V");
    let code = [ALOAD_0, INVOKESPECIAL, 0x00, 0x02, RETURN];
    let method = MethodInfo { owner: "Main", name: "<init>", descriptor: "()V", is_static: false, max_locals: 1, code: &code };
    let compiled = compile(&session, &pool, &method);
    let graph = compiled.graph();

    let entry = graph.block(graph.entry());
    let invoke = entry
        .hir
        .iter()
        .map(|&id| graph.hir(id))
        .find(|n| matches!(n.kind, HirKind::Invoke { .. }))
        .unwrap();
    let HirKind::Invoke { kind, args, .. } = &invoke.kind else { unreachable!() };
    assert_eq!(*kind, InvokeKind::Special);
    assert_eq!(args.len(), 1);
    assert!(matches!(graph.hir(args[0]).kind, HirKind::Param { index: 0 }));

    let lir = entry_lir(&compiled);
    let receiver = lir[0].write().unwrap();
    let call = lir.iter().find(|n| matches!(n.op, LirOp::Call(_))).unwrap();
    assert_eq!(call.reads(), &[RegisterFile::ARGUMENT_REGISTERS[0]]);
    let arg_move = lir.iter().find(|n| n.write() == Some(RegisterFile::ARGUMENT_REGISTERS[0])).unwrap();
    assert_eq!(arg_move.reads(), &[receiver]);
}

#[test]
fn test_parameters_past_the_fourth_come_from_the_stack() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    let code = [ILOAD, 5, IRETURN];
    let method = MethodInfo { owner: "Main", name: "last", descriptor: "(IIIIII)I", is_static: true, max_locals: 6, code: &code };
    let compiled = compile(&session, &pool, &method);
    let lir = entry_lir(&compiled);

    for (i, node) in lir[..4].iter().enumerate() {
        assert!(node.is_move());
        assert_eq!(node.reads(), &[RegisterFile::ARGUMENT_REGISTERS[i]]);
    }
    assert_eq!(lir[4].op, LirOp::LoadStack(0));
    assert_eq!(lir[5].op, LirOp::LoadStack(4));
    assert!(lir[4].reads().is_empty());

    let sixth = lir[5].write().unwrap();
    assert_eq!(lir[6].reads(), &[sixth]);
    assert_eq!(lir[6].write(), Some(RegisterFile::RETURN_REGISTER));
    assert_eq!(lir[7].op, LirOp::Return);
    assert_eq!(lir.len(), 8);
}

#[test]
fn test_missing_method_constant() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let pool = ConstantTable::new();
    let code = [INVOKESTATIC, 0x00, 0x09, RETURN];
    let method = MethodInfo { owner: "Main", name: "h", descriptor: "()V", is_static: true, max_locals: 0, code: &code };
    let err = MethodCompiler::new(&session, &pool).compile(&method).unwrap_err();
    assert_eq!(err, stackjit::CompileError::MissingConstant { index: 9 });
    assert_eq!(session.stats().methods_compiled, 0);
}
