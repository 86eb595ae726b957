use super::{
    Block, Callee, ConstGep, ConstId, Function, FunctionId, Global, GlobalId, InstId, Instruction,
    Module, TypeDef, TypeId, Value,
};

/// A block inside a function under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub function: FunctionId,
    pub index: usize,
}

/// Incremental constructor for [`Module`].
///
/// Instructions are appended to the block they are created in, so program
/// order is creation order.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_type(&mut self, def: TypeDef) -> TypeId {
        let id = TypeId(self.module.types.len() as u32);
        self.module.types.push(def);
        id
    }

    pub fn int_type(&mut self, bits: u32) -> TypeId {
        self.push_type(TypeDef::Int { bits })
    }

    pub fn float_type(&mut self, bits: u32) -> TypeId {
        self.push_type(TypeDef::Float { bits })
    }

    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        self.push_type(TypeDef::Pointer {
            pointee: Some(pointee),
        })
    }

    pub fn opaque_pointer(&mut self) -> TypeId {
        self.push_type(TypeDef::Pointer { pointee: None })
    }

    pub fn array_of(&mut self, element: TypeId, len: u64) -> TypeId {
        self.push_type(TypeDef::Array { element, len })
    }

    pub fn vector_of(&mut self, element: TypeId, len: u32) -> TypeId {
        self.push_type(TypeDef::Vector { element, len })
    }

    pub fn named_struct(&mut self, name: &str, fields: Vec<TypeId>) -> TypeId {
        self.push_type(TypeDef::Struct {
            name: Some(name.to_string()),
            fields,
        })
    }

    pub fn literal_struct(&mut self, fields: Vec<TypeId>) -> TypeId {
        self.push_type(TypeDef::Struct { name: None, fields })
    }

    /// Declares a named struct whose body is filled in later, for
    /// self-referential types.
    pub fn opaque_struct(&mut self, name: &str) -> TypeId {
        self.named_struct(name, Vec::new())
    }

    pub fn set_struct_body(&mut self, ty: TypeId, body: Vec<TypeId>) {
        if let Some(TypeDef::Struct { fields, .. }) = self.module.types.get_mut(ty.index()) {
            *fields = body;
        }
    }

    pub fn global(&mut self, name: &str, value_type: TypeId) -> Value {
        self.push_global(Global {
            name: name.to_string(),
            value_type,
            initializer: None,
        })
    }

    pub fn constant_global(&mut self, name: &str, value_type: TypeId, initializer: u64) -> Value {
        self.push_global(Global {
            name: name.to_string(),
            value_type,
            initializer: Some(initializer),
        })
    }

    fn push_global(&mut self, global: Global) -> Value {
        let id = GlobalId(self.module.globals.len() as u32);
        self.module.globals.push(global);
        Value::Global(id)
    }

    /// Defines a function with one empty entry block.
    pub fn function(&mut self, name: &str, params: u32) -> (FunctionId, BlockRef) {
        let id = self.push_function(name, params);
        let entry = self.append_block(id, Some("entry"));
        (id, entry)
    }

    /// Declares an external function without a body.
    pub fn declare_function(&mut self, name: &str, params: u32) -> FunctionId {
        self.push_function(name, params)
    }

    fn push_function(&mut self, name: &str, params: u32) -> FunctionId {
        let id = FunctionId(self.module.functions.len() as u32);
        self.module.functions.push(Function {
            name: name.to_string(),
            params,
            blocks: Vec::new(),
        });
        id
    }

    pub fn append_block(&mut self, function: FunctionId, label: Option<&str>) -> BlockRef {
        let blocks = &mut self.module.functions[function.index()].blocks;
        blocks.push(Block {
            label: label.map(str::to_string),
            insts: Vec::new(),
        });
        BlockRef {
            function,
            index: blocks.len() - 1,
        }
    }

    pub fn argument(&self, function: FunctionId, index: u32) -> Value {
        Value::Argument { function, index }
    }

    fn push_inst(&mut self, block: BlockRef, inst: Instruction) -> InstId {
        let id = InstId(self.module.instructions.len() as u32);
        self.module.instructions.push(inst);
        self.module.functions[block.function.index()].blocks[block.index]
            .insts
            .push(id);
        id
    }

    pub fn gep(
        &mut self,
        block: BlockRef,
        source_type: TypeId,
        base: Value,
        indices: Vec<Value>,
    ) -> InstId {
        self.push_inst(
            block,
            Instruction::Gep {
                source_type,
                base,
                indices,
            },
        )
    }

    /// Constant address expression; not placed in any block.
    pub fn const_gep(&mut self, source_type: TypeId, base: Value, indices: Vec<Value>) -> Value {
        let id = ConstId(self.module.constants.len() as u32);
        self.module.constants.push(ConstGep {
            source_type,
            base,
            indices,
        });
        Value::Const(id)
    }

    pub fn load(&mut self, block: BlockRef, ty: TypeId, address: Value) -> InstId {
        self.push_inst(block, Instruction::Load { ty, address })
    }

    pub fn store(&mut self, block: BlockRef, value: Value, address: Value) -> InstId {
        self.push_inst(block, Instruction::Store { value, address })
    }

    pub fn call(&mut self, block: BlockRef, callee: FunctionId, args: Vec<Value>) -> InstId {
        self.push_inst(
            block,
            Instruction::Call {
                callee: Callee::Direct(callee),
                args,
            },
        )
    }

    pub fn call_indirect(&mut self, block: BlockRef, target: Value, args: Vec<Value>) -> InstId {
        self.push_inst(
            block,
            Instruction::Call {
                callee: Callee::Indirect(target),
                args,
            },
        )
    }

    pub fn other(&mut self, block: BlockRef, opcode: &str, operands: Vec<Value>) -> InstId {
        self.push_inst(
            block,
            Instruction::Other {
                opcode: opcode.to_string(),
                operands,
            },
        )
    }

    pub fn finish(mut self) -> Module {
        self.module.rebuild_uses();
        self.module
    }
}
