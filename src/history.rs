use chrono_tz::Tz;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{CellAlignment, ContentArrangement, Table};
use std::collections::BTreeSet;

use crate::sightings::Sighting;

const NONE: &str = "N/A";

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| NONE.to_string())
}

/// Sighting table for the `history` command, timestamps in `tz`
pub fn render_history(sightings: &[Sighting], tz: Tz) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Time", "Hex", "Flight", "Altitude", "Speed", "Operator", "Type",
        ]);

    for sighting in sightings {
        table.add_row(vec![
            sighting
                .observed_at_utc()
                .with_timezone(&tz)
                .format("%Y-%m-%d %H:%M:%S %Z")
                .to_string(),
            sighting.hex_code.clone(),
            or_na(sighting.flight_number.as_deref()),
            or_na(sighting.altitude.map(|ft| format!("{ft} ft"))),
            or_na(sighting.ground_speed.map(|kt| format!("{kt} kt"))),
            or_na(sighting.operator.as_deref()),
            or_na(sighting.aircraft_type.as_deref()),
        ]);
    }

    for index in [3, 4] {
        if let Some(column) = table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }

    table.to_string()
}

/// `Total sightings: N` / `Unique aircraft: M` footer
pub fn summary_lines(sightings: &[Sighting]) -> String {
    let unique: BTreeSet<&str> = sightings.iter().map(|s| s.hex_code.as_str()).collect();
    format!(
        "Total sightings: {}\nUnique aircraft: {}",
        sightings.len(),
        unique.len()
    )
}
