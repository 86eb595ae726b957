//! Host-facing lifecycle: one hook per defined function, one at the end of
//! the compilation unit.

use std::io;

use heatmap_config::AnalysisOptions;
use heatmap_ir::IrModule;
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::report;
use crate::table::FrequencyTable;
use crate::walker::Walker;

/// Accumulates member accesses across the per-function hooks of one unit.
pub struct HeatmapPass<'m, M: IrModule> {
    ir: &'m M,
    options: AnalysisOptions,
    walker: Walker<'m, M>,
    table: FrequencyTable,
    walked: usize,
}

impl<'m, M: IrModule> HeatmapPass<'m, M> {
    pub fn new(ir: &'m M, options: AnalysisOptions) -> Self {
        let walker = Walker::new(ir, &options);
        Self {
            ir,
            options,
            walker,
            table: FrequencyTable::new(),
            walked: 0,
        }
    }

    /// Whether `function` is walked at the top level.
    pub fn is_root(&self, function: M::Function) -> bool {
        is_root(self.ir, &self.options, function)
    }

    /// Per-function hook. Returns `true` if the function was walked; the IR
    /// is never modified.
    pub fn run_on_function(&mut self, function: M::Function) -> bool {
        if !self.is_root(function) {
            trace!(function = %self.ir.function_name(function), "not a root, skipping");
            return false;
        }
        let events = self.walker.walk(function, &mut self.table);
        self.walked += 1;
        debug!(
            function = %self.ir.function_name(function),
            events,
            "walked function"
        );
        true
    }

    /// End-of-unit hook: renders the report.
    pub fn finalize(&self) -> String {
        info!(
            roots = self.walked,
            structures = self.table.structures().len(),
            accesses = self.table.total_accesses(),
            "member access analysis finished"
        );
        report::render(&self.table)
    }

    pub fn write_report<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.finalize().as_bytes())?;
        out.flush()
    }

    pub fn table(&self) -> &FrequencyTable {
        &self.table
    }

    pub fn into_table(self) -> FrequencyTable {
        self.table
    }

    /// Number of functions walked at the top level so far.
    pub fn walked(&self) -> usize {
        self.walked
    }
}

fn is_root<M: IrModule>(ir: &M, options: &AnalysisOptions, function: M::Function) -> bool {
    if !ir.has_body(function) {
        return false;
    }
    options.walks_all_functions() || ir.function_name(function) == options.entry_symbol
}

/// Drives the per-function hook over every defined function in module
/// order, as a host toolchain would.
pub fn analyze_module<M: IrModule>(ir: &M, options: &AnalysisOptions) -> FrequencyTable {
    let mut pass = HeatmapPass::new(ir, options.clone());
    for function in ir.functions() {
        if ir.has_body(function) {
            pass.run_on_function(function);
        }
    }
    if pass.walked() == 0 {
        warn_no_roots(options);
    }
    pass.into_table()
}

fn warn_no_roots(options: &AnalysisOptions) {
    warn!(entry = %options.entry_symbol, "no function matched the entry symbol");
}

/// Like [`analyze_module`], but walks root functions on the rayon pool.
/// Each worker fills its own table; the partial tables are summed at the end.
pub fn analyze_module_parallel<M>(ir: &M, options: &AnalysisOptions) -> FrequencyTable
where
    M: IrModule + Sync,
    M::Function: Send + Sync,
    M::Inst: Send,
{
    let roots: Vec<M::Function> = ir
        .functions()
        .into_iter()
        .filter(|function| is_root(ir, options, *function))
        .collect();
    if roots.is_empty() {
        warn_no_roots(options);
    }
    debug!(roots = roots.len(), "walking roots in parallel");

    roots
        .par_iter()
        .fold(
            || (Walker::new(ir, options), FrequencyTable::new()),
            |(mut walker, mut table), function| {
                walker.walk(*function, &mut table);
                (walker, table)
            },
        )
        .map(|(_, table)| table)
        .reduce(FrequencyTable::new, FrequencyTable::merged)
}
