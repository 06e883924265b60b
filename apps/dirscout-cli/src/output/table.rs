//! Coverage summary table

use dirscout_aad::{CoverageSet, OBJECT_TYPES};

const TYPE_COLUMN: &str = "Object type";
const STATUS_COLUMN: &str = "Collected";

/// Render one row per registered type with whether it produced records.
pub fn render_coverage(coverage: &CoverageSet) -> String {
    let width = OBJECT_TYPES
        .iter()
        .map(|d| d.type_name.len())
        .chain(std::iter::once(TYPE_COLUMN.len()))
        .max()
        .unwrap_or(TYPE_COLUMN.len());

    let mut out = String::new();
    out.push_str(&format!("{:<width$}  {}\n", TYPE_COLUMN, STATUS_COLUMN));
    out.push_str(&format!(
        "{}  {}\n",
        "-".repeat(width),
        "-".repeat(STATUS_COLUMN.len())
    ));
    for descriptor in &OBJECT_TYPES {
        let status = if coverage.contains(descriptor.type_name) {
            "yes"
        } else {
            "no"
        };
        out.push_str(&format!("{:<width$}  {}\n", descriptor.type_name, status));
    }
    out
}
