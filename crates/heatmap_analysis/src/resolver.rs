//! Type cursor walk over an address computation chain.

use heatmap_ir::{AddressChain, IrModule, TypeKind};
use tracing::trace;

use crate::access::{AccessOrigin, AccessSink, FieldAccess};

/// Attributes each step of an address chain to the aggregate it indexes.
///
/// The first index dereferences the base pointer and is never attributed.
/// Every later index is checked against the *current* type: a named struct
/// yields one event, then the cursor moves to the element type (pointer,
/// array, vector) or to the indexed field (everything else). Stepping
/// through a pointer, array or vector ignores the index value.
pub struct Resolver<'a, M: IrModule> {
    ir: &'a M,
    attribute_global_operands: bool,
}

impl<'a, M: IrModule> Resolver<'a, M> {
    pub fn new(ir: &'a M, attribute_global_operands: bool) -> Self {
        Self {
            ir,
            attribute_global_operands,
        }
    }

    /// Feeds one event per attributable step into `sink`; returns how many
    /// were produced.
    pub fn resolve<S: AccessSink + ?Sized>(
        &self,
        chain: &AddressChain<M::Type, M::Value>,
        origin: AccessOrigin,
        sink: &mut S,
    ) -> usize {
        let mut produced = 0;
        let mut cursor = Some(chain.source_type);

        for operand in chain.indices.iter().skip(1) {
            let Some(ty) = cursor else {
                trace!("type cursor left the aggregate, dropping rest of chain");
                break;
            };
            let Some(index) = self.ir.constant_index(*operand) else {
                trace!("non-constant index, dropping rest of chain");
                break;
            };

            if let Some(name) = self.named_struct(ty) {
                sink.record(&FieldAccess::new(name, index, origin));
                produced += 1;
            }

            if self.attribute_global_operands {
                if let Some(name) = self
                    .ir
                    .global_value_type(*operand)
                    .and_then(|global_ty| self.named_struct(global_ty))
                {
                    sink.record(&FieldAccess::new(name, index, origin));
                    produced += 1;
                }
            }

            cursor = if self.ir.type_kind(ty).is_single_contained() {
                self.ir.element_type(ty)
            } else {
                self.ir.field_type(ty, index)
            };
        }

        produced
    }

    pub fn events(
        &self,
        chain: &AddressChain<M::Type, M::Value>,
        origin: AccessOrigin,
    ) -> Vec<FieldAccess> {
        let mut events = Vec::new();
        self.resolve(chain, origin, &mut events);
        events
    }

    fn named_struct(&self, ty: M::Type) -> Option<String> {
        if self.ir.type_kind(ty) != TypeKind::Struct {
            return None;
        }
        self.ir.struct_name(ty).map(|name| name.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatmap_ir::mem::{ModuleBuilder, TypeId, Value};

    fn pairs(events: &[FieldAccess]) -> Vec<(&str, u64)> {
        events
            .iter()
            .map(|e| (e.structure.as_str(), e.field))
            .collect()
    }

    fn chain(source: TypeId, indices: &[u64]) -> AddressChain<TypeId, Value> {
        AddressChain::new(source, indices.iter().copied().map(Value::int).collect())
    }

    #[test]
    fn test_first_index_never_attributed() {
        let mut b = ModuleBuilder::new();
        let i32t = b.int_type(32);
        let point = b.named_struct("Point", vec![i32t, i32t]);
        let module = b.finish();

        let resolver = Resolver::new(&module, true);
        assert!(resolver
            .events(&chain(point, &[1]), AccessOrigin::AddressComputation)
            .is_empty());
        assert!(resolver
            .events(&chain(point, &[]), AccessOrigin::AddressComputation)
            .is_empty());
    }

    #[test]
    fn test_nested_struct_uses_current_cursor() {
        let mut b = ModuleBuilder::new();
        let i32t = b.int_type(32);
        let inner = b.named_struct("Inner", vec![i32t, i32t]);
        let outer = b.named_struct("Outer", vec![i32t, inner]);
        let module = b.finish();

        let events = Resolver::new(&module, false)
            .events(&chain(outer, &[0, 1, 1]), AccessOrigin::AddressComputation);
        assert_eq!(pairs(&events), vec![("Outer", 1), ("Inner", 1)]);
    }

    #[test]
    fn test_array_descent_ignores_index_value() {
        let mut b = ModuleBuilder::new();
        let i32t = b.int_type(32);
        let middle = b.named_struct("Middle", vec![i32t, i32t]);
        let arr = b.array_of(middle, 8);
        let outer = b.named_struct("Outer", vec![i32t, arr]);
        let module = b.finish();
        let resolver = Resolver::new(&module, false);

        for slot in [0, 2, 7, 1000] {
            let events = resolver.events(&chain(outer, &[0, 1, slot, 0]), AccessOrigin::Load);
            assert_eq!(pairs(&events), vec![("Outer", 1), ("Middle", 0)]);
        }
    }

    #[test]
    fn test_vector_and_pointer_descent() {
        let mut b = ModuleBuilder::new();
        let f32t = b.float_type(32);
        let lanes = b.vector_of(f32t, 4);
        let pair = b.named_struct("Pair", vec![f32t, f32t]);
        let ptr = b.pointer_to(pair);
        let holder = b.named_struct("Holder", vec![lanes, ptr]);
        let module = b.finish();
        let resolver = Resolver::new(&module, false);

        let through_vector = resolver.events(&chain(holder, &[0, 0, 3]), AccessOrigin::Store);
        assert_eq!(pairs(&through_vector), vec![("Holder", 0)]);

        let through_pointer =
            resolver.events(&chain(holder, &[0, 1, 0, 1]), AccessOrigin::Store);
        assert_eq!(pairs(&through_pointer), vec![("Holder", 1), ("Pair", 1)]);
    }

    #[test]
    fn test_unnamed_struct_suppressed_but_cursor_advances() {
        let mut b = ModuleBuilder::new();
        let i8t = b.int_type(8);
        let named = b.named_struct("Leaf", vec![i8t, i8t, i8t]);
        let anon = b.literal_struct(vec![i8t, named]);
        let module = b.finish();

        let events = Resolver::new(&module, true)
            .events(&chain(anon, &[0, 1, 2]), AccessOrigin::AddressComputation);
        assert_eq!(pairs(&events), vec![("Leaf", 2)]);
    }

    #[test]
    fn test_non_constant_index_keeps_prefix() {
        let mut b = ModuleBuilder::new();
        let i32t = b.int_type(32);
        let inner = b.named_struct("Inner", vec![i32t, i32t]);
        let arr = b.array_of(inner, 4);
        let outer = b.named_struct("Outer", vec![i32t, arr]);
        let (main, entry) = b.function("main", 1);
        let arg = b.argument(main, 0);
        let dynamic = b.other(entry, "add", vec![arg, Value::int(1)]);
        let module = b.finish();

        let chain = AddressChain::new(
            outer,
            vec![
                Value::int(0),
                Value::int(1),
                Value::Inst(dynamic),
                Value::int(1),
            ],
        );
        let events = Resolver::new(&module, false).events(&chain, AccessOrigin::Load);
        assert_eq!(pairs(&events), vec![("Outer", 1)]);
    }

    #[test]
    fn test_global_operand_attribution() {
        let mut b = ModuleBuilder::new();
        let i32t = b.int_type(32);
        let config = b.named_struct("Config", vec![i32t, i32t, i32t]);
        let table = b.named_struct("Table", vec![i32t, i32t, i32t]);
        let settings = b.constant_global("settings", config, 2);
        let module = b.finish();

        let chain = AddressChain::new(table, vec![Value::int(0), settings]);

        let plain = Resolver::new(&module, false).events(&chain, AccessOrigin::Load);
        assert_eq!(pairs(&plain), vec![("Table", 2)]);

        let rich = Resolver::new(&module, true).events(&chain, AccessOrigin::Load);
        assert_eq!(pairs(&rich), vec![("Table", 2), ("Config", 2)]);
    }

    #[test]
    fn test_out_of_range_field_stops_quietly() {
        let mut b = ModuleBuilder::new();
        let i32t = b.int_type(32);
        let small = b.named_struct("Small", vec![i32t]);
        let module = b.finish();

        let events = Resolver::new(&module, false)
            .events(&chain(small, &[0, 5, 0]), AccessOrigin::AddressComputation);
        assert_eq!(pairs(&events), vec![("Small", 5)]);
    }

    #[test]
    fn test_opaque_pointer_field_ends_chain() {
        let mut b = ModuleBuilder::new();
        let i32t = b.int_type(32);
        let ptr = b.opaque_pointer();
        let node = b.named_struct("Node", vec![ptr, i32t]);
        let module = b.finish();

        let events = Resolver::new(&module, false)
            .events(&chain(node, &[0, 0, 1]), AccessOrigin::Load);
        assert_eq!(pairs(&events), vec![("Node", 0)]);
    }
}
