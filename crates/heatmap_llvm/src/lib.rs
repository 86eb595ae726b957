//! [`IrModule`] over LLVM modules.
//!
//! Modules are parsed with inkwell; the per-instruction queries go through
//! the LLVM C API because inkwell does not expose GEP source element types,
//! constant expression opcodes or use lists in a stable way.

#![cfg(feature = "llvm")]

use std::borrow::Cow;
use std::ffi::CStr;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use heatmap_ir::{AddressChain, InstKind, IrModule, TypeKind};
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use llvm_sys::core::{
    LLVMConstIntGetZExtValue, LLVMCountStructElementTypes, LLVMGetCalledValue,
    LLVMGetConstOpcode, LLVMGetElementType, LLVMGetFirstBasicBlock, LLVMGetFirstFunction,
    LLVMGetFirstInstruction, LLVMGetFirstUse, LLVMGetGEPSourceElementType,
    LLVMGetInstructionOpcode, LLVMGetNextBasicBlock, LLVMGetNextFunction,
    LLVMGetNextInstruction, LLVMGetNextUse, LLVMGetNumArgOperands, LLVMGetNumOperands,
    LLVMGetOperand, LLVMGetStructName, LLVMGetTypeKind, LLVMGetUser, LLVMGetValueName2,
    LLVMGlobalGetValueType, LLVMIsAConstantExpr, LLVMIsAConstantInt, LLVMIsAFunction,
    LLVMIsAGlobalValue, LLVMIsAInstruction, LLVMIsDeclaration, LLVMStructGetTypeAtIndex,
};
use llvm_sys::prelude::{LLVMModuleRef, LLVMTypeRef, LLVMValueRef};
use llvm_sys::{LLVMOpcode, LLVMTypeKind};
use thiserror::Error;
use tracing::debug;

pub use inkwell::context::Context;

#[derive(Debug, Error)]
pub enum LlvmError {
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to parse {name}: {message}")]
    Parse { name: String, message: String },
}

/// Parses textual IR (`.ll`) or bitcode (`.bc`, chosen by extension).
pub fn parse_file<'ctx>(context: &'ctx Context, path: &Path) -> Result<Module<'ctx>, LlvmError> {
    let buffer = MemoryBuffer::create_from_file(path).map_err(|err| LlvmError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let name = path.display().to_string();
    let parsed = if path.extension().and_then(|ext| ext.to_str()) == Some("bc") {
        Module::parse_bitcode_from_buffer(&buffer, context)
    } else {
        context.create_module_from_ir(buffer)
    };
    let module = parsed.map_err(|err| LlvmError::Parse {
        name: name.clone(),
        message: err.to_string(),
    })?;
    debug!(module = %name, "parsed LLVM module");
    Ok(module)
}

/// Parses textual IR held in memory.
pub fn parse_ir_str<'ctx>(
    context: &'ctx Context,
    source: &str,
    name: &str,
) -> Result<Module<'ctx>, LlvmError> {
    let buffer = MemoryBuffer::create_from_memory_range_copy(source.as_bytes(), name);
    context
        .create_module_from_ir(buffer)
        .map_err(|err| LlvmError::Parse {
            name: name.to_string(),
            message: err.to_string(),
        })
}

/// Raw LLVM value handle (function, instruction or operand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueHandle(LLVMValueRef);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(LLVMTypeRef);

/// Read-only view of a parsed module.
///
/// Every handle produced here points into the borrowed module and is only
/// dereferenced while that borrow is alive.
pub struct LlvmModule<'a, 'ctx> {
    raw: LLVMModuleRef,
    _module: PhantomData<&'a Module<'ctx>>,
}

impl<'a, 'ctx> LlvmModule<'a, 'ctx> {
    pub fn new(module: &'a Module<'ctx>) -> Self {
        Self {
            raw: module.as_mut_ptr(),
            _module: PhantomData,
        }
    }

    fn operand(&self, value: LLVMValueRef, index: u32) -> Option<ValueHandle> {
        // SAFETY: `value` is a live user from this module; the index is
        // bounds-checked against its operand count.
        unsafe {
            let count = LLVMGetNumOperands(value);
            if count < 0 || index >= count as u32 {
                return None;
            }
            let operand = LLVMGetOperand(value, index);
            (!operand.is_null()).then_some(ValueHandle(operand))
        }
    }

    fn gep_chain(&self, gep: LLVMValueRef) -> Option<AddressChain<TypeHandle, ValueHandle>> {
        // SAFETY: `gep` is a GEP instruction or GEP constant expression.
        let source = unsafe { LLVMGetGEPSourceElementType(gep) };
        if source.is_null() {
            return None;
        }
        // SAFETY: `gep` is a live user value.
        let count = unsafe { LLVMGetNumOperands(gep) }.max(0) as u32;
        let indices = (1..count)
            .filter_map(|index| self.operand(gep, index))
            .collect();
        Some(AddressChain::new(TypeHandle(source), indices))
    }
}

impl IrModule for LlvmModule<'_, '_> {
    type Function = ValueHandle;
    type Inst = ValueHandle;
    type Value = ValueHandle;
    type Type = TypeHandle;

    fn functions(&self) -> Vec<ValueHandle> {
        let mut functions = Vec::new();
        // SAFETY: iterates the function list of a live module.
        unsafe {
            let mut function = LLVMGetFirstFunction(self.raw);
            while !function.is_null() {
                functions.push(ValueHandle(function));
                function = LLVMGetNextFunction(function);
            }
        }
        functions
    }

    fn function_name(&self, function: ValueHandle) -> Cow<'_, str> {
        let mut len = 0usize;
        // SAFETY: LLVM returns a pointer/length pair owned by the value.
        unsafe {
            let ptr = LLVMGetValueName2(function.0, &mut len);
            if ptr.is_null() {
                return Cow::Borrowed("");
            }
            let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len);
            Cow::Owned(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    fn has_body(&self, function: ValueHandle) -> bool {
        // SAFETY: `function` is a global of the live module.
        unsafe { LLVMIsDeclaration(function.0) == 0 }
    }

    fn instructions(&self, function: ValueHandle) -> Vec<ValueHandle> {
        let mut insts = Vec::new();
        // SAFETY: walks blocks and instructions of a live function.
        unsafe {
            let mut block = LLVMGetFirstBasicBlock(function.0);
            while !block.is_null() {
                let mut inst = LLVMGetFirstInstruction(block);
                while !inst.is_null() {
                    insts.push(ValueHandle(inst));
                    inst = LLVMGetNextInstruction(inst);
                }
                block = LLVMGetNextBasicBlock(block);
            }
        }
        insts
    }

    fn inst_kind(&self, inst: ValueHandle) -> InstKind {
        // SAFETY: handles passed here come from `instructions` or `users`.
        match unsafe { LLVMGetInstructionOpcode(inst.0) } {
            LLVMOpcode::LLVMGetElementPtr => InstKind::AddressComputation,
            LLVMOpcode::LLVMLoad => InstKind::Load,
            LLVMOpcode::LLVMStore => InstKind::Store,
            LLVMOpcode::LLVMCall => InstKind::Call,
            _ => InstKind::Other,
        }
    }

    fn address_chain(&self, inst: ValueHandle) -> Option<AddressChain<TypeHandle, ValueHandle>> {
        if self.inst_kind(inst) != InstKind::AddressComputation {
            return None;
        }
        self.gep_chain(inst.0)
    }

    fn memory_address(&self, inst: ValueHandle) -> Option<ValueHandle> {
        match self.inst_kind(inst) {
            InstKind::Load => self.operand(inst.0, 0),
            InstKind::Store => self.operand(inst.0, 1),
            _ => None,
        }
    }

    fn constant_address_chain(
        &self,
        value: ValueHandle,
    ) -> Option<AddressChain<TypeHandle, ValueHandle>> {
        // SAFETY: the opcode is only read after the constant-expression check.
        let is_gep = unsafe {
            !LLVMIsAConstantExpr(value.0).is_null()
                && LLVMGetConstOpcode(value.0) == LLVMOpcode::LLVMGetElementPtr
        };
        if !is_gep {
            return None;
        }
        self.gep_chain(value.0)
    }

    fn direct_callee(&self, inst: ValueHandle) -> Option<ValueHandle> {
        if self.inst_kind(inst) != InstKind::Call {
            return None;
        }
        // SAFETY: `inst` was just checked to be a call instruction.
        unsafe {
            let callee = LLVMGetCalledValue(inst.0);
            if callee.is_null() || LLVMIsAFunction(callee).is_null() {
                return None;
            }
            Some(ValueHandle(callee))
        }
    }

    fn call_arguments(&self, inst: ValueHandle) -> Vec<ValueHandle> {
        if self.inst_kind(inst) != InstKind::Call {
            return Vec::new();
        }
        // SAFETY: `inst` was just checked to be a call instruction.
        let count = unsafe { LLVMGetNumArgOperands(inst.0) };
        (0..count)
            .filter_map(|index| self.operand(inst.0, index))
            .collect()
    }

    fn users(&self, value: ValueHandle) -> Vec<ValueHandle> {
        let mut users = Vec::new();
        // SAFETY: walks the use list of a live value.
        unsafe {
            let mut use_ref = LLVMGetFirstUse(value.0);
            while !use_ref.is_null() {
                let user = LLVMGetUser(use_ref);
                if !LLVMIsAInstruction(user).is_null() {
                    users.push(ValueHandle(user));
                }
                use_ref = LLVMGetNextUse(use_ref);
            }
        }
        users
    }

    fn constant_index(&self, value: ValueHandle) -> Option<u64> {
        // SAFETY: the value is read only after the `ConstantInt` check.
        unsafe {
            if LLVMIsAConstantInt(value.0).is_null() {
                return None;
            }
            Some(LLVMConstIntGetZExtValue(value.0))
        }
    }

    fn global_value_type(&self, value: ValueHandle) -> Option<TypeHandle> {
        // SAFETY: the value type is read only after the `GlobalValue` check.
        unsafe {
            if LLVMIsAGlobalValue(value.0).is_null() {
                return None;
            }
            let ty = LLVMGlobalGetValueType(value.0);
            (!ty.is_null()).then_some(TypeHandle(ty))
        }
    }

    fn type_kind(&self, ty: TypeHandle) -> TypeKind {
        // SAFETY: type handles are owned by the module's context.
        match unsafe { LLVMGetTypeKind(ty.0) } {
            LLVMTypeKind::LLVMStructTypeKind => TypeKind::Struct,
            LLVMTypeKind::LLVMPointerTypeKind => TypeKind::Pointer,
            LLVMTypeKind::LLVMArrayTypeKind => TypeKind::Array,
            LLVMTypeKind::LLVMVectorTypeKind | LLVMTypeKind::LLVMScalableVectorTypeKind => {
                TypeKind::Vector
            }
            _ => TypeKind::Other,
        }
    }

    fn struct_name(&self, ty: TypeHandle) -> Option<Cow<'_, str>> {
        if self.type_kind(ty) != TypeKind::Struct {
            return None;
        }
        // SAFETY: literal structs return null; named ones a NUL-terminated
        // string owned by the type.
        let name = unsafe {
            let ptr = LLVMGetStructName(ty.0);
            if ptr.is_null() {
                return None;
            }
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        };
        (!name.is_empty()).then_some(Cow::Owned(name))
    }

    fn element_type(&self, ty: TypeHandle) -> Option<TypeHandle> {
        // Pointers are opaque: there is no element type to descend into.
        match self.type_kind(ty) {
            TypeKind::Array | TypeKind::Vector => {
                // SAFETY: `ty` is an array or vector type.
                let element = unsafe { LLVMGetElementType(ty.0) };
                (!element.is_null()).then_some(TypeHandle(element))
            }
            _ => None,
        }
    }

    fn field_type(&self, ty: TypeHandle, index: u64) -> Option<TypeHandle> {
        if self.type_kind(ty) != TypeKind::Struct {
            return None;
        }
        let index = u32::try_from(index).ok()?;
        // SAFETY: `ty` is a struct type and `index` is bounds-checked.
        unsafe {
            if index >= LLVMCountStructElementTypes(ty.0) {
                return None;
            }
            let field = LLVMStructGetTypeAtIndex(ty.0, index);
            (!field.is_null()).then_some(TypeHandle(field))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
%struct.Inner = type { i32, i32 }
%struct.Outer = type { i32, %struct.Inner }

@g = global %struct.Outer zeroinitializer

define void @touch(ptr %q) {
entry:
  %f = getelementptr %struct.Outer, ptr %q, i64 0, i32 0
  store i32 7, ptr %f
  ret void
}

define i32 @main(ptr %p) {
entry:
  %a = getelementptr inbounds %struct.Outer, ptr %p, i64 0, i32 1, i32 1
  %v = load i32, ptr %a
  %w = load i32, ptr getelementptr inbounds (%struct.Outer, ptr @g, i64 0, i32 1)
  store i32 %v, ptr getelementptr inbounds (%struct.Outer, ptr @g, i64 0, i32 1, i32 1)
  call void @touch(ptr %p)
  ret i32 %w
}
"#;

    #[test]
    fn test_functions_and_instructions() {
        let context = Context::create();
        let module = parse_ir_str(&context, SAMPLE, "sample").unwrap();
        let ir = LlvmModule::new(&module);

        let main = ir.find_function("main").unwrap();
        assert!(ir.has_body(main));
        let kinds: Vec<InstKind> = ir
            .instructions(main)
            .into_iter()
            .map(|inst| ir.inst_kind(inst))
            .collect();
        assert_eq!(
            kinds,
            vec![
                InstKind::AddressComputation,
                InstKind::Load,
                InstKind::Load,
                InstKind::Store,
                InstKind::Call,
                InstKind::Other,
            ]
        );
    }

    #[test]
    fn test_gep_chain_and_types() {
        let context = Context::create();
        let module = parse_ir_str(&context, SAMPLE, "sample").unwrap();
        let ir = LlvmModule::new(&module);

        let main = ir.find_function("main").unwrap();
        let gep = ir.instructions(main)[0];
        let chain = ir.address_chain(gep).unwrap();
        assert_eq!(ir.struct_name(chain.source_type).as_deref(), Some("struct.Outer"));
        let indices: Vec<Option<u64>> = chain
            .indices
            .iter()
            .map(|index| ir.constant_index(*index))
            .collect();
        assert_eq!(indices, vec![Some(0), Some(1), Some(1)]);

        let inner = ir.field_type(chain.source_type, 1).unwrap();
        assert_eq!(ir.struct_name(inner).as_deref(), Some("struct.Inner"));
        assert_eq!(ir.field_type(chain.source_type, 9), None);
    }

    #[test]
    fn test_constant_gep_operands_and_calls() {
        let context = Context::create();
        let module = parse_ir_str(&context, SAMPLE, "sample").unwrap();
        let ir = LlvmModule::new(&module);

        let main = ir.find_function("main").unwrap();
        let insts = ir.instructions(main);
        let const_load = insts[2];
        let address = ir.memory_address(const_load).unwrap();
        let chain = ir.constant_address_chain(address).unwrap();
        assert_eq!(chain.indices.len(), 2);

        let call = insts[4];
        let touch = ir.direct_callee(call).unwrap();
        assert_eq!(ir.function_name(touch), "touch");
        let args = ir.call_arguments(call);
        assert_eq!(args.len(), 1);
        assert_eq!(ir.users(args[0]).len(), 2);
    }

    #[test]
    fn test_parse_error() {
        let context = Context::create();
        let err = parse_ir_str(&context, "define broken", "bad").unwrap_err();
        assert!(matches!(err, LlvmError::Parse { .. }));
    }
}
