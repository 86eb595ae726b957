//! Owned, arena-backed IR model.
//!
//! Used for tests and for modules exported by tools that do not link LLVM.
//! Every object lives in a flat vector on [`Module`] and is addressed by a
//! `u32` id. Use lists are derived data: they are rebuilt by
//! [`ModuleBuilder::finish`] and after deserialization.

mod builder;

pub use builder::{BlockRef, ModuleBuilder};

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{AddressChain, InstKind, IrError, IrModule, TypeKind};

macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    )*};
}

define_id!(
    /// Index into [`Module::types`].
    TypeId,
    /// Index into [`Module::globals`].
    GlobalId,
    /// Index into [`Module::functions`].
    FunctionId,
    /// Index into [`Module::instructions`].
    InstId,
    /// Index into [`Module::constants`].
    ConstId,
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDef {
    Void,
    Int {
        bits: u32,
    },
    Float {
        bits: u32,
    },
    /// `pointee: None` is an opaque pointer.
    Pointer {
        #[serde(default)]
        pointee: Option<TypeId>,
    },
    Array {
        element: TypeId,
        len: u64,
    },
    Vector {
        element: TypeId,
        len: u32,
    },
    Struct {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        fields: Vec<TypeId>,
    },
}

/// An operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    ConstInt(u64),
    Global(GlobalId),
    Argument { function: FunctionId, index: u32 },
    /// Result of an instruction.
    Inst(InstId),
    /// A constant address computation expression.
    Const(ConstId),
}

impl Value {
    #[inline]
    pub fn int(value: u64) -> Self {
        Value::ConstInt(value)
    }
}

impl From<InstId> for Value {
    fn from(id: InstId) -> Self {
        Value::Inst(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub value_type: TypeId,
    /// Integer initializer of a constant global. Index operands that refer
    /// to the global fold to this value.
    #[serde(default)]
    pub initializer: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: u32,
    /// Empty for declarations.
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callee {
    Direct(FunctionId),
    Indirect(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Gep {
        source_type: TypeId,
        base: Value,
        indices: Vec<Value>,
    },
    Load {
        ty: TypeId,
        address: Value,
    },
    Store {
        value: Value,
        address: Value,
    },
    Call {
        callee: Callee,
        #[serde(default)]
        args: Vec<Value>,
    },
    Other {
        opcode: String,
        #[serde(default)]
        operands: Vec<Value>,
    },
}

impl Instruction {
    /// Every value operand, in operand order.
    pub fn operands(&self) -> Vec<Value> {
        match self {
            Instruction::Gep { base, indices, .. } => {
                let mut operands = Vec::with_capacity(indices.len() + 1);
                operands.push(*base);
                operands.extend(indices.iter().copied());
                operands
            }
            Instruction::Load { address, .. } => vec![*address],
            Instruction::Store { value, address } => vec![*value, *address],
            Instruction::Call { callee, args } => {
                let mut operands = args.clone();
                if let Callee::Indirect(target) = callee {
                    operands.push(*target);
                }
                operands
            }
            Instruction::Other { operands, .. } => operands.clone(),
        }
    }
}

/// Constant address computation, usable as a load/store address operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstGep {
    pub source_type: TypeId,
    pub base: Value,
    pub indices: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub globals: Vec<Global>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub constants: Vec<ConstGep>,
    #[serde(skip)]
    uses: AHashMap<Value, Vec<InstId>>,
}

impl Module {
    pub fn from_json_str(source: &str) -> Result<Self, IrError> {
        let module: Module = serde_json::from_str(source)?;
        module.into_checked()
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, IrError> {
        let module: Module = serde_yaml::from_str(source)?;
        module.into_checked()
    }

    /// Loads a module, choosing the format from the file extension.
    pub fn load(path: &Path) -> Result<Self, IrError> {
        let source = fs::read_to_string(path).map_err(|source| IrError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            Some("yaml" | "yml") => Self::from_yaml_str(&source),
            other => Err(IrError::UnsupportedFormat(other.unwrap_or("").to_string())),
        }
    }

    fn into_checked(mut self) -> Result<Self, IrError> {
        self.validate()?;
        self.rebuild_uses();
        Ok(self)
    }

    /// Checks that every id refers to an existing object.
    pub fn validate(&self) -> Result<(), IrError> {
        for ty in &self.types {
            match ty {
                TypeDef::Pointer { pointee: Some(id) } => self.check_type(*id)?,
                TypeDef::Array { element, .. } | TypeDef::Vector { element, .. } => {
                    self.check_type(*element)?
                }
                TypeDef::Struct { fields, .. } => {
                    for field in fields {
                        self.check_type(*field)?;
                    }
                }
                _ => {}
            }
        }
        for global in &self.globals {
            self.check_type(global.value_type)?;
        }
        for constant in &self.constants {
            self.check_type(constant.source_type)?;
            self.check_value(constant.base)?;
            for index in &constant.indices {
                self.check_value(*index)?;
            }
        }
        for inst in &self.instructions {
            match inst {
                Instruction::Gep { source_type, .. } | Instruction::Load { ty: source_type, .. } => {
                    self.check_type(*source_type)?
                }
                Instruction::Call {
                    callee: Callee::Direct(function),
                    ..
                } => self.check_function(*function)?,
                _ => {}
            }
            for operand in inst.operands() {
                self.check_value(operand)?;
            }
        }
        for function in &self.functions {
            for block in &function.blocks {
                for inst in &block.insts {
                    if inst.index() >= self.instructions.len() {
                        return Err(dangling("instruction", inst.0));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_type(&self, id: TypeId) -> Result<(), IrError> {
        if id.index() < self.types.len() {
            Ok(())
        } else {
            Err(dangling("type", id.0))
        }
    }

    fn check_function(&self, id: FunctionId) -> Result<(), IrError> {
        if id.index() < self.functions.len() {
            Ok(())
        } else {
            Err(dangling("function", id.0))
        }
    }

    fn check_value(&self, value: Value) -> Result<(), IrError> {
        match value {
            Value::ConstInt(_) => Ok(()),
            Value::Global(id) if id.index() < self.globals.len() => Ok(()),
            Value::Global(id) => Err(dangling("global", id.0)),
            Value::Argument { function, index } => {
                let params = self
                    .function(function)
                    .ok_or_else(|| dangling("function", function.0))?
                    .params;
                if index < params {
                    Ok(())
                } else {
                    Err(dangling("argument", index))
                }
            }
            Value::Inst(id) if id.index() < self.instructions.len() => Ok(()),
            Value::Inst(id) => Err(dangling("instruction", id.0)),
            Value::Const(id) if id.index() < self.constants.len() => Ok(()),
            Value::Const(id) => Err(dangling("constant", id.0)),
        }
    }

    pub(crate) fn rebuild_uses(&mut self) {
        let mut uses: AHashMap<Value, Vec<InstId>> = AHashMap::new();
        for function in &self.functions {
            for block in &function.blocks {
                for &id in &block.insts {
                    let Some(inst) = self.instructions.get(id.index()) else {
                        continue;
                    };
                    // Integer constants are uniqued and carry no use list.
                    for operand in inst.operands() {
                        if matches!(operand, Value::ConstInt(_)) {
                            continue;
                        }
                        let users = uses.entry(operand).or_default();
                        if users.last() != Some(&id) {
                            users.push(id);
                        }
                    }
                }
            }
        }
        self.uses = uses;
    }

    pub fn ty(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(id.index())
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub fn instruction(&self, id: InstId) -> Option<&Instruction> {
        self.instructions.get(id.index())
    }

    fn chain_of(
        &self,
        source_type: TypeId,
        indices: &[Value],
    ) -> AddressChain<TypeId, Value> {
        AddressChain::new(source_type, indices.to_vec())
    }
}

fn dangling(kind: &'static str, id: u32) -> IrError {
    IrError::DanglingReference { kind, id }
}

impl IrModule for Module {
    type Function = FunctionId;
    type Inst = InstId;
    type Value = Value;
    type Type = TypeId;

    fn functions(&self) -> Vec<FunctionId> {
        (0..self.functions.len() as u32).map(FunctionId).collect()
    }

    fn function_name(&self, function: FunctionId) -> Cow<'_, str> {
        self.function(function)
            .map_or(Cow::Borrowed(""), |f| Cow::Borrowed(f.name.as_str()))
    }

    fn has_body(&self, function: FunctionId) -> bool {
        self.function(function).is_some_and(|f| !f.blocks.is_empty())
    }

    fn instructions(&self, function: FunctionId) -> Vec<InstId> {
        self.function(function)
            .map(|f| {
                f.blocks
                    .iter()
                    .flat_map(|block| block.insts.iter().copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn inst_kind(&self, inst: InstId) -> InstKind {
        match self.instruction(inst) {
            Some(Instruction::Gep { .. }) => InstKind::AddressComputation,
            Some(Instruction::Load { .. }) => InstKind::Load,
            Some(Instruction::Store { .. }) => InstKind::Store,
            Some(Instruction::Call { .. }) => InstKind::Call,
            Some(Instruction::Other { .. }) | None => InstKind::Other,
        }
    }

    fn address_chain(&self, inst: InstId) -> Option<AddressChain<TypeId, Value>> {
        match self.instruction(inst)? {
            Instruction::Gep {
                source_type,
                indices,
                ..
            } => Some(self.chain_of(*source_type, indices)),
            _ => None,
        }
    }

    fn memory_address(&self, inst: InstId) -> Option<Value> {
        match self.instruction(inst)? {
            Instruction::Load { address, .. } | Instruction::Store { address, .. } => {
                Some(*address)
            }
            _ => None,
        }
    }

    fn constant_address_chain(&self, value: Value) -> Option<AddressChain<TypeId, Value>> {
        let Value::Const(id) = value else {
            return None;
        };
        let constant = self.constants.get(id.index())?;
        Some(self.chain_of(constant.source_type, &constant.indices))
    }

    fn direct_callee(&self, inst: InstId) -> Option<FunctionId> {
        match self.instruction(inst)? {
            Instruction::Call {
                callee: Callee::Direct(function),
                ..
            } => Some(*function),
            _ => None,
        }
    }

    fn call_arguments(&self, inst: InstId) -> Vec<Value> {
        match self.instruction(inst) {
            Some(Instruction::Call { args, .. }) => args.clone(),
            _ => Vec::new(),
        }
    }

    fn users(&self, value: Value) -> Vec<InstId> {
        self.uses.get(&value).cloned().unwrap_or_default()
    }

    fn constant_index(&self, value: Value) -> Option<u64> {
        match value {
            Value::ConstInt(n) => Some(n),
            Value::Global(id) => self.globals.get(id.index())?.initializer,
            _ => None,
        }
    }

    fn global_value_type(&self, value: Value) -> Option<TypeId> {
        match value {
            Value::Global(id) => self.globals.get(id.index()).map(|g| g.value_type),
            _ => None,
        }
    }

    fn type_kind(&self, ty: TypeId) -> TypeKind {
        match self.ty(ty) {
            Some(TypeDef::Struct { .. }) => TypeKind::Struct,
            Some(TypeDef::Pointer { .. }) => TypeKind::Pointer,
            Some(TypeDef::Array { .. }) => TypeKind::Array,
            Some(TypeDef::Vector { .. }) => TypeKind::Vector,
            _ => TypeKind::Other,
        }
    }

    fn struct_name(&self, ty: TypeId) -> Option<Cow<'_, str>> {
        match self.ty(ty)? {
            TypeDef::Struct {
                name: Some(name), ..
            } if !name.is_empty() => Some(Cow::Borrowed(name.as_str())),
            _ => None,
        }
    }

    fn element_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.ty(ty)? {
            TypeDef::Pointer { pointee } => *pointee,
            TypeDef::Array { element, .. } | TypeDef::Vector { element, .. } => Some(*element),
            _ => None,
        }
    }

    fn field_type(&self, ty: TypeId, index: u64) -> Option<TypeId> {
        match self.ty(ty)? {
            TypeDef::Struct { fields, .. } => {
                let index = usize::try_from(index).ok()?;
                fields.get(index).copied()
            }
            _ => None,
        }
    }
}
