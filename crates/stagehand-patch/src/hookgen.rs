//! Hook companion generation.
//!
//! For a target module, build a companion module that imports every exported
//! function of the target (import module name = target name) and re-exports
//! each one as `hook:<name>` through a trampoline. The host loads the
//! companion right after the target and links the imports to the target's
//! exports; interception code then replaces or wraps the trampolines.

use crate::{PatchError, PatchResult};

/// Prefix of every generated export.
pub const HOOK_EXPORT_PREFIX: &str = "hook:";

/// File name of the companion generated for `target`.
///
/// `Foo.wasm` becomes `Foo.hooks.wasm`; a name without an extension gets the
/// suffix appended.
#[must_use]
pub fn companion_name(target: &str) -> String {
    let stem = match target.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => target,
    };
    format!("{stem}.hooks.wasm")
}

/// A function signature lifted out of the target.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Signature {
    params: Vec<wasm_encoder::ValType>,
    results: Vec<wasm_encoder::ValType>,
}

/// An exported function of the target.
#[derive(Debug)]
struct ExportedFunc {
    name: String,
    signature: Signature,
}

/// Generate the hook companion for `target_bytes`.
///
/// # Errors
///
/// Returns `PatchError::HookGeneration` if the target cannot be parsed or an
/// export refers to a function or type that does not exist.
pub fn generate_hooks(target: &str, target_bytes: &[u8]) -> PatchResult<Vec<u8>> {
    let exports = gather_exports(target, target_bytes)?;
    let fail = |message: &str| PatchError::HookGeneration {
        target: target.to_owned(),
        message: message.to_owned(),
    };
    let count = u32::try_from(exports.len()).map_err(|_| fail("too many exports"))?;

    let mut module = wasm_encoder::Module::new();

    let mut types = wasm_encoder::TypeSection::new();
    for func in &exports {
        types.ty().function(
            func.signature.params.iter().copied(),
            func.signature.results.iter().copied(),
        );
    }
    module.section(&types);

    let mut imports = wasm_encoder::ImportSection::new();
    for (index, func) in (0u32..).zip(&exports) {
        imports.import(target, &func.name, wasm_encoder::EntityType::Function(index));
    }
    module.section(&imports);

    let mut functions = wasm_encoder::FunctionSection::new();
    for index in 0..count {
        functions.function(index);
    }
    module.section(&functions);

    let mut export_section = wasm_encoder::ExportSection::new();
    for (index, func) in (0u32..).zip(&exports) {
        let trampoline = count
            .checked_add(index)
            .ok_or_else(|| fail("function index overflow"))?;
        export_section.export(
            &format!("{HOOK_EXPORT_PREFIX}{}", func.name),
            wasm_encoder::ExportKind::Func,
            trampoline,
        );
    }
    module.section(&export_section);

    let mut code = wasm_encoder::CodeSection::new();
    for (index, func) in (0u32..).zip(&exports) {
        let mut body = wasm_encoder::Function::new([]);
        let params =
            u32::try_from(func.signature.params.len()).map_err(|_| fail("too many parameters"))?;
        for local in 0..params {
            body.instruction(&wasm_encoder::Instruction::LocalGet(local));
        }
        body.instruction(&wasm_encoder::Instruction::Call(index));
        body.instruction(&wasm_encoder::Instruction::End);
        code.function(&body);
    }
    module.section(&code);

    Ok(module.finish())
}

/// Collect every exported function of the target with its signature, in
/// export order.
fn gather_exports(target: &str, wasm_bytes: &[u8]) -> PatchResult<Vec<ExportedFunc>> {
    let fail = |message: String| PatchError::HookGeneration {
        target: target.to_owned(),
        message,
    };

    // Type index -> signature; `None` for non-function types.
    let mut types: Vec<Option<Signature>> = Vec::new();
    // Function index -> type index, imports first.
    let mut funcs: Vec<u32> = Vec::new();
    let mut exported: Vec<(String, u32)> = Vec::new();

    for payload in wasmparser::Parser::new(0).parse_all(wasm_bytes) {
        let payload = payload.map_err(|e| fail(format!("failed to parse WASM: {e}")))?;

        match payload {
            wasmparser::Payload::TypeSection(reader) => {
                for recgroup in reader {
                    let recgroup =
                        recgroup.map_err(|e| fail(format!("failed to read type: {e}")))?;
                    for sub_ty in recgroup.types() {
                        types.push(match &sub_ty.composite_type.inner {
                            wasmparser::CompositeInnerType::Func(func_type) => Some(Signature {
                                params: func_type.params().iter().map(|v| convert_val_type(*v)).collect(),
                                results: func_type.results().iter().map(|v| convert_val_type(*v)).collect(),
                            }),
                            _ => None,
                        });
                    }
                }
            },
            wasmparser::Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import.map_err(|e| fail(format!("failed to read import: {e}")))?;
                    if let wasmparser::TypeRef::Func(type_index) = import.ty {
                        funcs.push(type_index);
                    }
                }
            },
            wasmparser::Payload::FunctionSection(reader) => {
                for type_index in reader {
                    funcs.push(type_index.map_err(|e| fail(format!("failed to read function: {e}")))?);
                }
            },
            wasmparser::Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.map_err(|e| fail(format!("failed to read export: {e}")))?;
                    if export.kind == wasmparser::ExternalKind::Func {
                        exported.push((export.name.to_owned(), export.index));
                    }
                }
            },
            _ => {},
        }
    }

    exported
        .into_iter()
        .map(|(name, func_index)| {
            let type_index = usize::try_from(func_index)
                .ok()
                .and_then(|i| funcs.get(i))
                .ok_or_else(|| fail(format!("export {name} refers to missing function {func_index}")))?;
            let signature = usize::try_from(*type_index)
                .ok()
                .and_then(|i| types.get(i))
                .and_then(Clone::clone)
                .ok_or_else(|| fail(format!("export {name} has no function type {type_index}")))?;
            Ok(ExportedFunc { name, signature })
        })
        .collect()
}

/// Re-encodes a hook parameter or result type for the generated import.
///
/// Hooks exchange plain numbers and opaque references, so any typed reference
/// is declared as `funcref` or `externref`.
fn convert_val_type(ty: wasmparser::ValType) -> wasm_encoder::ValType {
    use wasm_encoder::ValType as Out;
    use wasmparser::ValType as In;

    match ty {
        In::I32 => Out::I32,
        In::I64 => Out::I64,
        In::F32 => Out::F32,
        In::F64 => Out::F64,
        In::V128 => Out::V128,
        In::Ref(r) if r.is_func_ref() => Out::FUNCREF,
        In::Ref(_) => Out::EXTERNREF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Module exporting `add(i32, i32) -> i32`, `tick()` and a memory.
    fn build_target() -> Vec<u8> {
        let mut module = wasm_encoder::Module::new();

        let mut types = wasm_encoder::TypeSection::new();
        types.ty().function(
            [wasm_encoder::ValType::I32, wasm_encoder::ValType::I32],
            [wasm_encoder::ValType::I32],
        );
        types.ty().function([], []);
        module.section(&types);

        let mut functions = wasm_encoder::FunctionSection::new();
        functions.function(0);
        functions.function(1);
        module.section(&functions);

        let mut memories = wasm_encoder::MemorySection::new();
        memories.memory(wasm_encoder::MemoryType {
            minimum: 1,
            maximum: None,
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        module.section(&memories);

        let mut exports = wasm_encoder::ExportSection::new();
        exports.export("add", wasm_encoder::ExportKind::Func, 0);
        exports.export("tick", wasm_encoder::ExportKind::Func, 1);
        exports.export("memory", wasm_encoder::ExportKind::Memory, 0);
        module.section(&exports);

        let mut code = wasm_encoder::CodeSection::new();
        let mut f = wasm_encoder::Function::new([]);
        f.instruction(&wasm_encoder::Instruction::LocalGet(0));
        f.instruction(&wasm_encoder::Instruction::LocalGet(1));
        f.instruction(&wasm_encoder::Instruction::I32Add);
        f.instruction(&wasm_encoder::Instruction::End);
        code.function(&f);
        let mut f = wasm_encoder::Function::new([]);
        f.instruction(&wasm_encoder::Instruction::End);
        code.function(&f);
        module.section(&code);

        module.finish()
    }

    #[test]
    fn companion_exports_one_hook_per_function() {
        let hooks = generate_hooks("Game.wasm", &build_target()).unwrap();
        wasmparser::Validator::new().validate_all(&hooks).unwrap();

        let mut imports = Vec::new();
        let mut exports = Vec::new();
        for payload in wasmparser::Parser::new(0).parse_all(&hooks) {
            match payload.unwrap() {
                wasmparser::Payload::ImportSection(reader) => {
                    for import in reader {
                        let import = import.unwrap();
                        imports.push(format!("{}::{}", import.module, import.name));
                    }
                },
                wasmparser::Payload::ExportSection(reader) => {
                    for export in reader {
                        exports.push(export.unwrap().name.to_string());
                    }
                },
                _ => {},
            }
        }

        assert_eq!(imports, ["Game.wasm::add", "Game.wasm::tick"]);
        assert_eq!(exports, ["hook:add", "hook:tick"]);
    }

    #[test]
    fn imported_functions_count_towards_indices() {
        let mut module = wasm_encoder::Module::new();
        let mut types = wasm_encoder::TypeSection::new();
        types.ty().function([wasm_encoder::ValType::I64], []);
        types.ty().function([], [wasm_encoder::ValType::F64]);
        module.section(&types);
        let mut imports = wasm_encoder::ImportSection::new();
        imports.import("env", "log", wasm_encoder::EntityType::Function(0));
        module.section(&imports);
        let mut functions = wasm_encoder::FunctionSection::new();
        functions.function(1);
        module.section(&functions);
        let mut exports = wasm_encoder::ExportSection::new();
        exports.export("log", wasm_encoder::ExportKind::Func, 0);
        exports.export("pi", wasm_encoder::ExportKind::Func, 1);
        module.section(&exports);
        let mut code = wasm_encoder::CodeSection::new();
        let mut f = wasm_encoder::Function::new([]);
        f.instruction(&wasm_encoder::Instruction::F64Const(3.0));
        f.instruction(&wasm_encoder::Instruction::End);
        code.function(&f);
        module.section(&code);

        let hooks = generate_hooks("lib", &module.finish()).unwrap();
        wasmparser::Validator::new().validate_all(&hooks).unwrap();
    }

    #[test]
    fn garbage_is_rejected() {
        let err = generate_hooks("Broken.wasm", b"not wasm").unwrap_err();
        assert!(matches!(err, PatchError::HookGeneration { .. }));
        assert!(err.to_string().contains("Broken.wasm"));
    }

    #[test]
    fn hook_types_keep_numbers_and_collapse_references() {
        use wasmparser::{RefType, ValType};

        assert_eq!(convert_val_type(ValType::I64), wasm_encoder::ValType::I64);
        assert_eq!(convert_val_type(ValType::V128), wasm_encoder::ValType::V128);
        assert_eq!(
            convert_val_type(ValType::Ref(RefType::FUNCREF)),
            wasm_encoder::ValType::FUNCREF
        );
        assert_eq!(
            convert_val_type(ValType::Ref(RefType::EXTERNREF)),
            wasm_encoder::ValType::EXTERNREF
        );
    }

    #[test]
    fn companion_names() {
        assert_eq!(companion_name("Game.wasm"), "Game.hooks.wasm");
        assert_eq!(companion_name("core.v2.wasm"), "core.v2.hooks.wasm");
        assert_eq!(companion_name("plain"), "plain.hooks.wasm");
        assert_eq!(companion_name(".hidden"), ".hidden.hooks.wasm");
    }
}
