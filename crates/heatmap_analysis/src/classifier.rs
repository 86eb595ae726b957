use heatmap_ir::{AddressChain, InstKind, IrModule};

use crate::access::AccessOrigin;

/// An address chain found on an instruction, with how it was found.
pub struct ClassifiedChain<M: IrModule> {
    pub origin: AccessOrigin,
    pub chain: AddressChain<M::Type, M::Value>,
}

/// Extracts every structure-field address computation carried by `inst`.
///
/// Three independent rules apply:
/// 1. an address computation instruction contributes its own chain;
/// 2. a load whose address operand is a constant address expression
///    contributes that expression's chain;
/// 3. likewise for the destination address of a store.
pub fn classify<M: IrModule>(ir: &M, inst: M::Inst) -> Vec<ClassifiedChain<M>> {
    let kind = ir.inst_kind(inst);
    let mut found = Vec::new();

    if kind == InstKind::AddressComputation {
        if let Some(chain) = ir.address_chain(inst) {
            found.push(ClassifiedChain {
                origin: AccessOrigin::AddressComputation,
                chain,
            });
        }
    }

    if kind == InstKind::Load {
        if let Some(chain) = constant_chain(ir, inst) {
            found.push(ClassifiedChain {
                origin: AccessOrigin::Load,
                chain,
            });
        }
    }

    if kind == InstKind::Store {
        if let Some(chain) = constant_chain(ir, inst) {
            found.push(ClassifiedChain {
                origin: AccessOrigin::Store,
                chain,
            });
        }
    }

    found
}

fn constant_chain<M: IrModule>(
    ir: &M,
    inst: M::Inst,
) -> Option<AddressChain<M::Type, M::Value>> {
    let address = ir.memory_address(inst)?;
    ir.constant_address_chain(address)
}
