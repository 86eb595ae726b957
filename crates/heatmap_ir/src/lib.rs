//! Read-only query interface over a compiled module's IR.
//!
//! The analysis never talks to a concrete toolchain object model directly.
//! Everything it needs (functions, instructions, operands, types) goes through
//! [`IrModule`], which is implemented by the owned model in [`mem`] and by the
//! LLVM adapter in `heatmap_llvm`.

pub mod error;
pub mod mem;

pub use error::IrError;

use std::borrow::Cow;
use std::hash::Hash;

/// Coarse type categories the type cursor cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Struct,
    Pointer,
    Array,
    Vector,
    Other,
}

impl TypeKind {
    /// Pointer, array and vector types hold exactly one contained type.
    #[inline]
    pub fn is_single_contained(self) -> bool {
        matches!(self, TypeKind::Pointer | TypeKind::Array | TypeKind::Vector)
    }
}

/// Instruction categories relevant to member access detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstKind {
    /// Address computation (`getelementptr` in LLVM terms).
    AddressComputation,
    Load,
    Store,
    Call,
    Other,
}

/// A base type plus the index operands applied to it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressChain<T, V> {
    pub source_type: T,
    pub indices: Vec<V>,
}

impl<T, V> AddressChain<T, V> {
    pub fn new(source_type: T, indices: Vec<V>) -> Self {
        Self {
            source_type,
            indices,
        }
    }
}

/// Capability interface over a host-owned module.
///
/// Handles are cheap copies; the implementation owns the underlying objects.
/// Every query is side-effect free. Queries that do not apply to the given
/// handle return `None` or an empty vector rather than failing.
pub trait IrModule {
    type Function: Copy + Eq + Hash;
    type Inst: Copy + Eq + Hash;
    type Value: Copy;
    type Type: Copy;

    /// Functions in definition order, declarations included.
    fn functions(&self) -> Vec<Self::Function>;

    fn function_name(&self, function: Self::Function) -> Cow<'_, str>;

    /// `false` for external declarations.
    fn has_body(&self, function: Self::Function) -> bool;

    /// Instructions of every block, blocks in layout order and instructions in
    /// program order.
    fn instructions(&self, function: Self::Function) -> Vec<Self::Inst>;

    fn inst_kind(&self, inst: Self::Inst) -> InstKind;

    /// Source type and index list of an address computation instruction.
    fn address_chain(&self, inst: Self::Inst) -> Option<AddressChain<Self::Type, Self::Value>>;

    /// Address operand of a load, destination address of a store.
    fn memory_address(&self, inst: Self::Inst) -> Option<Self::Value>;

    /// Interprets a constant address computation expression as a chain.
    fn constant_address_chain(
        &self,
        value: Self::Value,
    ) -> Option<AddressChain<Self::Type, Self::Value>>;

    /// Statically resolvable callee of a call instruction.
    fn direct_callee(&self, inst: Self::Inst) -> Option<Self::Function>;

    fn call_arguments(&self, inst: Self::Inst) -> Vec<Self::Value>;

    /// Instructions that use `value` as an operand, anywhere in the module.
    fn users(&self, value: Self::Value) -> Vec<Self::Inst>;

    /// Zero-extended value of a compile-time constant integer operand.
    fn constant_index(&self, value: Self::Value) -> Option<u64>;

    /// Declared type of the global `value` refers to.
    fn global_value_type(&self, value: Self::Value) -> Option<Self::Type>;

    fn type_kind(&self, ty: Self::Type) -> TypeKind;

    /// Name of a named structure type; `None` for literal structs and
    /// non-struct types.
    fn struct_name(&self, ty: Self::Type) -> Option<Cow<'_, str>>;

    /// Sole contained type of a pointer, array or vector type.
    fn element_type(&self, ty: Self::Type) -> Option<Self::Type>;

    /// Type of field `index` of a structure type.
    fn field_type(&self, ty: Self::Type, index: u64) -> Option<Self::Type>;

    fn find_function(&self, name: &str) -> Option<Self::Function> {
        self.functions()
            .into_iter()
            .find(|function| self.function_name(*function) == name)
    }
}
