//! End-to-end behaviour of the mutator pipeline.

use std::sync::{Arc, Mutex};

use stagehand_patch::{
    Delta, MutationContext, Mutator, MutatorRegistry, PatchError, PatchPipeline, delta_mutator,
};

fn append(tag: &'static str, log: Arc<Mutex<Vec<String>>>) -> Mutator {
    Arc::new(move |ctx: &MutationContext<'_>, mut bytes: Vec<u8>| {
        log.lock()
            .unwrap()
            .push(format!("{}:{}:{tag}", ctx.package, ctx.target));
        bytes.extend_from_slice(tag.as_bytes());
        Ok(bytes)
    })
}

fn small_module() -> Vec<u8> {
    let mut module = wasm_encoder::Module::new();
    let mut types = wasm_encoder::TypeSection::new();
    types.ty().function([wasm_encoder::ValType::I32], [wasm_encoder::ValType::I32]);
    module.section(&types);
    let mut functions = wasm_encoder::FunctionSection::new();
    functions.function(0);
    module.section(&functions);
    let mut exports = wasm_encoder::ExportSection::new();
    exports.export("double", wasm_encoder::ExportKind::Func, 0);
    module.section(&exports);
    let mut code = wasm_encoder::CodeSection::new();
    let mut f = wasm_encoder::Function::new([]);
    f.instruction(&wasm_encoder::Instruction::LocalGet(0));
    f.instruction(&wasm_encoder::Instruction::LocalGet(0));
    f.instruction(&wasm_encoder::Instruction::I32Add);
    f.instruction(&wasm_encoder::Instruction::End);
    code.function(&f);
    module.section(&code);
    module.finish()
}

#[test]
fn chain_runs_in_slot_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = MutatorRegistry::new();
    registry.register("Game.wasm", "base", append("1", Arc::clone(&log)));
    registry.register("Game.wasm", "addon", append("2", Arc::clone(&log)));
    // A later contribution from `base` joins its existing slot.
    registry.register("Game.wasm", "base", append("3", Arc::clone(&log)));
    registry.register("Other.wasm", "addon", append("x", Arc::clone(&log)));

    let slots: Vec<_> = registry
        .slots("Game.wasm")
        .iter()
        .map(|s| (s.package().to_owned(), s.len()))
        .collect();
    assert_eq!(slots, [("base".to_owned(), 2), ("addon".to_owned(), 1)]);

    let pipeline = PatchPipeline::new(registry);
    let patched = pipeline.apply("Game.wasm", b"bin:".to_vec()).unwrap();
    assert_eq!(patched.bytes, b"bin:132");
    assert!(patched.companions.is_empty());
    assert_eq!(
        *log.lock().unwrap(),
        ["base:Game.wasm:1", "base:Game.wasm:3", "addon:Game.wasm:2"]
    );
}

#[test]
fn untouched_targets_pass_through() {
    let pipeline = PatchPipeline::new(MutatorRegistry::new());
    assert!(!pipeline.has_target("Game.wasm"));
    let patched = pipeline.apply("Game.wasm", b"same".to_vec()).unwrap();
    assert_eq!(patched.bytes, b"same");
}

#[test]
fn failures_name_target_and_package() {
    let mut registry = MutatorRegistry::new();
    registry.register(
        "Game.wasm",
        "broken",
        Arc::new(|_: &MutationContext<'_>, _: Vec<u8>| {
            Err(PatchError::OutOfBounds("nope".into()))
        }),
    );

    let err = PatchPipeline::new(registry)
        .apply("Game.wasm", Vec::new())
        .unwrap_err();
    match err {
        PatchError::Mutator {
            target, package, ..
        } => {
            assert_eq!(target, "Game.wasm");
            assert_eq!(package, "broken");
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn delta_then_hooks() {
    let original = small_module();
    let mut patched_module = original.clone();
    // Append a custom section so the delta has real work to do.
    let mut extra = wasm_encoder::Module::new();
    extra.section(&wasm_encoder::CustomSection {
        name: "patched-by".into(),
        data: b"addon".as_slice().into(),
    });
    patched_module.extend_from_slice(&extra.finish()[8..]);

    let delta = Delta::between(&original, &patched_module);
    let mut registry = MutatorRegistry::new();
    registry.register("Game.wasm", "addon", delta_mutator(delta));
    registry.request_hooks("Game.wasm", "addon");
    registry.request_hooks("Game.wasm", "other");

    let pipeline = PatchPipeline::new(registry);
    assert!(pipeline.has_target("Game.wasm"));
    let patched = pipeline.apply("Game.wasm", original).unwrap();
    assert_eq!(patched.bytes, patched_module);

    // Two requests still produce one companion.
    assert_eq!(patched.companions.len(), 1);
    let companion = &patched.companions[0];
    assert_eq!(companion.name, "Game.hooks.wasm");
    wasmparser::Validator::new()
        .validate_all(&companion.bytes)
        .unwrap();
}

#[test]
fn delta_for_another_binary_fails() {
    let delta = Delta::between(b"expected source", b"result");
    let mut registry = MutatorRegistry::new();
    registry.register("Game.wasm", "addon", delta_mutator(delta));

    let err = PatchPipeline::new(registry)
        .apply("Game.wasm", b"different source".to_vec())
        .unwrap_err();
    assert!(err.to_string().contains("mismatch"), "got: {err}");
}

/// A payload for `source` declaring `output_len` and one copy of `copy_len`.
fn oversized_payload(source: &[u8], output_len: u64, copy_len: u64) -> Vec<u8> {
    let mut payload = b"SHD1".to_vec();
    payload.extend_from_slice(blake3::hash(source).as_bytes());
    payload.extend_from_slice(&output_len.to_le_bytes());
    payload.push(0x01);
    payload.extend_from_slice(&0u64.to_le_bytes());
    payload.extend_from_slice(&copy_len.to_le_bytes());
    payload
}

#[test]
fn huge_declared_output_is_an_error_not_a_panic() {
    let source = small_module();

    // More output than the ops could ever produce.
    let mut bare = oversized_payload(&source, u64::MAX, 4);
    bare.truncate(44);
    assert!(matches!(Delta::parse(&bare), Err(PatchError::OutOfBounds(_))));

    for len in [u64::MAX, 1 << 40] {
        let delta = Delta::parse(&oversized_payload(&source, len, len)).unwrap();
        assert!(matches!(delta.apply(&source), Err(PatchError::OutOfBounds(_))));

        let mut registry = MutatorRegistry::new();
        registry.register("Game.wasm", "addon", delta_mutator(delta));
        let err = PatchPipeline::new(registry)
            .apply("Game.wasm", source.clone())
            .unwrap_err();
        assert!(err.to_string().contains("out of bounds"), "got: {err}");
    }
}
