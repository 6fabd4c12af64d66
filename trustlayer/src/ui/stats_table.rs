//! Table rendering for `trustlayer stats`.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use std::collections::BTreeMap;

use trustlayer_core::audit::EntityTotals;

pub fn render_stats_table(entities: &BTreeMap<String, EntityTotals>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Entity Type", "Total", "Exchanges"]);
    for (entity, totals) in entities {
        table.add_row(vec![
            Cell::new(entity),
            Cell::new(totals.total).set_alignment(CellAlignment::Right),
            Cell::new(totals.exchanges).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
