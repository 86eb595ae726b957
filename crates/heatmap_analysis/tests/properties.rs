use heatmap_analysis::{
    AccessOrigin, AnalysisOptions, FieldAccess, FrequencyTable, HeatmapPass, Resolver,
    analyze_module, render,
};
use heatmap_ir::mem::{Module, ModuleBuilder, TypeId, Value};
use heatmap_ir::{AddressChain, IrModule};
use proptest::prelude::*;

struct Fixture {
    module: Module,
    outer: TypeId,
    middle: TypeId,
}

/// `Outer { int a; Middle field[4]; }`, `Middle { int count; int pad; }`,
/// with `main` reading `p->field[2].count` `reads` times.
fn scenario(reads: usize) -> Fixture {
    let mut b = ModuleBuilder::new();
    let i32t = b.int_type(32);
    let middle = b.named_struct("Middle", vec![i32t, i32t]);
    let arr = b.array_of(middle, 4);
    let outer = b.named_struct("Outer", vec![i32t, arr]);
    let (main, entry) = b.function("main", 1);
    let p = b.argument(main, 0);
    for _ in 0..reads {
        let addr = b.gep(
            entry,
            outer,
            p,
            vec![Value::int(0), Value::int(1), Value::int(2), Value::int(0)],
        );
        b.load(entry, i32t, addr.into());
    }
    Fixture {
        module: b.finish(),
        outer,
        middle,
    }
}

#[test]
fn scenario_single_read() {
    let fixture = scenario(1);
    let table = analyze_module(&fixture.module, &AnalysisOptions::default());
    assert_eq!(table.count("Outer", 1), 1);
    assert_eq!(table.count("Middle", 0), 1);
    assert_eq!(table.total_accesses(), 2);

    let report = render(&table);
    assert!(report.starts_with("Member access heatmap:\n"));
    assert!(report.contains("Outer:\n1: 1\n"));
    assert!(report.contains("Middle:\n0: 1\n"));
}

#[test]
fn scenario_second_read_doubles_counts() {
    let fixture = scenario(2);
    let table = analyze_module(&fixture.module, &AnalysisOptions::default());
    assert_eq!(table.count("Outer", 1), 2);
    assert_eq!(table.count("Middle", 0), 2);
    assert_eq!(
        render(&table),
        "Member access heatmap:\nMiddle:\n0: 2\nOuter:\n1: 2\n"
    );
}

#[test]
fn base_dereference_alone_is_not_attributed() {
    let fixture = scenario(0);
    for base in [fixture.outer, fixture.middle] {
        for index in [0, 1, 3] {
            let chain = AddressChain::new(base, vec![Value::int(index)]);
            let events = Resolver::new(&fixture.module, true)
                .events(&chain, AccessOrigin::AddressComputation);
            assert!(events.is_empty());
        }
    }
}

#[test]
fn nested_struct_attributed_to_inner_type() {
    let mut b = ModuleBuilder::new();
    let i32t = b.int_type(32);
    let inner = b.named_struct("Inner", vec![i32t, i32t]);
    let outer = b.named_struct("Outer", vec![i32t, inner]);
    let module = b.finish();

    let chain = AddressChain::new(outer, vec![Value::int(0), Value::int(1), Value::int(1)]);
    let events = Resolver::new(&module, true).events(&chain, AccessOrigin::AddressComputation);
    assert_eq!(
        events,
        vec![
            FieldAccess::new("Outer", 1, AccessOrigin::AddressComputation),
            FieldAccess::new("Inner", 1, AccessOrigin::AddressComputation),
        ]
    );
}

#[test]
fn unnamed_aggregate_never_reported() {
    let mut b = ModuleBuilder::new();
    let i16t = b.int_type(16);
    let named = b.named_struct("Named", vec![i16t, i16t]);
    let anon = b.literal_struct(vec![named, i16t]);
    let (main, entry) = b.function("main", 1);
    let p = b.argument(main, 0);
    b.gep(
        entry,
        anon,
        p,
        vec![Value::int(0), Value::int(0), Value::int(1)],
    );
    b.gep(entry, anon, p, vec![Value::int(0), Value::int(1)]);
    let module = b.finish();

    let table = analyze_module(&module, &AnalysisOptions::default());
    assert_eq!(table.structures(), vec!["Named"]);
    assert_eq!(table.count("Named", 1), 1);
}

#[test]
fn unreachable_function_contributes_nothing() {
    let mut b = ModuleBuilder::new();
    let i32t = b.int_type(32);
    let s = b.named_struct("S", vec![i32t, i32t, i32t]);
    let (orphan, orphan_entry) = b.function("orphan", 1);
    let q = b.argument(orphan, 0);
    for field in 0..3 {
        b.gep(orphan_entry, s, q, vec![Value::int(0), Value::int(field)]);
    }
    let (_main, entry) = b.function("main", 0);
    b.other(entry, "ret", vec![]);
    let module = b.finish();

    let mut pass = HeatmapPass::new(&module, AnalysisOptions::default());
    for function in module.functions() {
        pass.run_on_function(function);
    }
    assert!(pass.table().is_empty());
    assert_eq!(pass.finalize(), "Member access heatmap:\n");
}

#[test]
fn constant_address_loads_and_stores_on_globals() {
    let mut b = ModuleBuilder::new();
    let i64t = b.int_type(64);
    let stats = b.named_struct("struct.Stats", vec![i64t, i64t, i64t]);
    let global = b.global("g_stats", stats);
    let hits = b.const_gep(stats, global, vec![Value::int(0), Value::int(0)]);
    let misses = b.const_gep(stats, global, vec![Value::int(0), Value::int(2)]);
    let (_main, entry) = b.function("main", 0);
    let current = b.load(entry, i64t, hits);
    b.store(entry, current.into(), hits);
    b.store(entry, Value::int(0), misses);
    let module = b.finish();

    let table = analyze_module(&module, &AnalysisOptions::baseline());
    assert_eq!(table.count("struct.Stats", 0), 2);
    assert_eq!(table.count("struct.Stats", 2), 1);
}

#[test]
fn argument_use_chain_reaches_accesses_outside_entry() {
    // `main` passes %obj to an external function. The only access to %obj
    // sits in `logger`, which is never called, and is found through the
    // use list of the call argument.
    let mut b = ModuleBuilder::new();
    let i32t = b.int_type(32);
    let s = b.named_struct("Session", vec![i32t, i32t, i32t]);
    let sink = b.declare_function("sink", 1);
    let (_main, entry) = b.function("main", 0);
    let obj = b.other(entry, "alloca", vec![]);
    b.call(entry, sink, vec![obj.into()]);
    let (_logger, logger_entry) = b.function("logger", 0);
    b.gep(
        logger_entry,
        s,
        obj.into(),
        vec![Value::int(0), Value::int(2)],
    );
    let module = b.finish();

    let baseline = analyze_module(&module, &AnalysisOptions::baseline());
    assert!(baseline.is_empty());

    let heatmap = analyze_module(&module, &AnalysisOptions::heatmap());
    assert_eq!(heatmap.count("Session", 2), 1);
}

#[test]
fn constant_call_argument_does_not_leak_other_functions() {
    let mut b = ModuleBuilder::new();
    let i32t = b.int_type(32);
    let s = b.named_struct("S", vec![i32t, i32t, i32t]);
    let (orphan, orphan_entry) = b.function("orphan", 1);
    let q = b.argument(orphan, 0);
    b.gep(orphan_entry, s, q, vec![Value::int(0), Value::int(2)]);
    let puts = b.declare_function("puts", 1);
    let (_main, entry) = b.function("main", 0);
    b.call(entry, puts, vec![Value::int(0)]);
    let module = b.finish();

    for options in [AnalysisOptions::default(), AnalysisOptions::heatmap()] {
        let table = analyze_module(&module, &options);
        assert!(table.is_empty(), "unexpected counts: {table:?}");
    }
}

proptest! {
    #[test]
    fn counts_never_decrease(ops in proptest::collection::vec((0usize..4, 0u64..6), 1..200)) {
        let names = ["A", "B", "C", "D"];
        let mut table = FrequencyTable::new();
        for (name, field) in ops {
            let before = table.clone();
            table.increment(names[name], field);
            for structure in before.structures() {
                for (field, count) in before.fields(structure).unwrap() {
                    prop_assert!(table.count(structure, *field) >= *count);
                }
            }
            prop_assert_eq!(table.total_accesses(), before.total_accesses() + 1);
        }
    }

    #[test]
    fn merge_equals_sequential_increments(
        left in proptest::collection::vec((0usize..3, 0u64..4), 0..60),
        right in proptest::collection::vec((0usize..3, 0u64..4), 0..60),
    ) {
        let names = ["X", "Y", "Z"];
        let mut a = FrequencyTable::new();
        let mut b = FrequencyTable::new();
        let mut all = FrequencyTable::new();
        for (name, field) in &left {
            a.increment(names[*name], *field);
            all.increment(names[*name], *field);
        }
        for (name, field) in &right {
            b.increment(names[*name], *field);
            all.increment(names[*name], *field);
        }
        prop_assert_eq!(a.merged(b), all);
    }

    #[test]
    fn array_index_value_never_selects_type(slot in any::<u64>()) {
        let fixture = scenario(0);
        let chain = AddressChain::new(
            fixture.outer,
            vec![Value::int(0), Value::int(1), Value::int(slot), Value::int(1)],
        );
        let events = Resolver::new(&fixture.module, false)
            .events(&chain, AccessOrigin::Load);
        let pairs: Vec<(String, u64)> =
            events.into_iter().map(|e| (e.structure, e.field)).collect();
        prop_assert_eq!(
            pairs,
            vec![("Outer".to_string(), 1), ("Middle".to_string(), 1)]
        );
    }
}

#[test]
fn demo_module_report() {
    let module = Module::from_json_str(include_str!("../../../demos/nested.json")).unwrap();
    let table = analyze_module(&module, &AnalysisOptions::default());
    assert_eq!(
        render(&table),
        "Member access heatmap:\nMiddle:\n0: 1\n1: 1\nOuter:\n0: 1\n1: 2\n"
    );
}
