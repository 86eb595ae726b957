use std::fmt::Write as _;
use std::io;

use crate::table::FrequencyTable;

pub const REPORT_HEADER: &str = "Member access heatmap:";

/// Renders the table as text.
///
/// Structures appear in ascending name order, fields in ascending index
/// order:
///
/// ```text
/// Member access heatmap:
/// Middle:
/// 0: 2
/// Outer:
/// 1: 2
/// ```
pub fn render(table: &FrequencyTable) -> String {
    let mut out = String::new();
    out.push_str(REPORT_HEADER);
    out.push('\n');
    for name in table.structures() {
        let Some(fields) = table.fields(name) else {
            continue;
        };
        if fields.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{name}:");
        for (field, count) in fields {
            let _ = writeln!(out, "{field}: {count}");
        }
    }
    out
}

pub fn write_report<W: io::Write>(table: &FrequencyTable, out: &mut W) -> io::Result<()> {
    out.write_all(render(table).as_bytes())?;
    out.flush()
}
