//! Bounded reachability walk from a top-level function.

use ahash::AHashSet;
use heatmap_config::AnalysisOptions;
use heatmap_ir::{InstKind, IrModule};
use tracing::{debug, trace};

use crate::access::AccessSink;
use crate::classifier::classify;
use crate::resolver::Resolver;

/// Visits a function's instructions plus, at every call site, the body of a
/// direct callee (one level, no further) and optionally the users of each
/// call argument. Indirect calls are ignored.
pub struct Walker<'a, M: IrModule> {
    ir: &'a M,
    resolver: Resolver<'a, M>,
    traverse_argument_uses: bool,
    deduplicate: bool,
    visited: AHashSet<M::Inst>,
}

impl<'a, M: IrModule> Walker<'a, M> {
    pub fn new(ir: &'a M, options: &AnalysisOptions) -> Self {
        Self {
            ir,
            resolver: Resolver::new(ir, options.attribute_global_operands),
            traverse_argument_uses: options.traverse_argument_uses,
            deduplicate: options.deduplicate,
            visited: AHashSet::new(),
        }
    }

    /// Walks `function` and returns the number of attribution events.
    ///
    /// With de-duplication on, an instruction reached both directly and
    /// through a call extension is classified once per walk.
    pub fn walk<S: AccessSink + ?Sized>(&mut self, function: M::Function, sink: &mut S) -> usize {
        self.visited.clear();
        let mut events = 0;

        for inst in self.ir.instructions(function) {
            events += self.visit(inst, sink);

            if self.ir.inst_kind(inst) != InstKind::Call {
                continue;
            }

            if let Some(callee) = self.ir.direct_callee(inst) {
                debug!(callee = %self.ir.function_name(callee), "walking direct callee");
                for callee_inst in self.ir.instructions(callee) {
                    events += self.visit(callee_inst, sink);
                }
            }

            if self.traverse_argument_uses {
                for arg in self.ir.call_arguments(inst) {
                    if self.is_integer_constant(arg) {
                        continue;
                    }
                    for user in self.ir.users(arg) {
                        events += self.visit(user, sink);
                    }
                }
            }
        }

        events
    }

    /// Integer constants are uniqued, so their use lists span unrelated
    /// functions and say nothing about the callee's data.
    fn is_integer_constant(&self, value: M::Value) -> bool {
        self.ir.constant_index(value).is_some() && self.ir.global_value_type(value).is_none()
    }

    fn visit<S: AccessSink + ?Sized>(&mut self, inst: M::Inst, sink: &mut S) -> usize {
        if self.deduplicate && !self.visited.insert(inst) {
            return 0;
        }
        let mut events = 0;
        for found in classify(self.ir, inst) {
            let produced = self.resolver.resolve(&found.chain, found.origin, sink);
            trace!(origin = %found.origin, produced, "resolved address chain");
            events += produced;
        }
        events
    }
}
