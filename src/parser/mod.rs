pub mod numeric;
pub mod panel;
pub mod rules;

use crate::db::CountryRecord;
use numeric::coerce_opt;
use rules::{Field, RawFields};

/// Three-step pipeline: html → panel → canonical fields → record.
pub fn process_document(name: &str, html: &str, neighbors: Vec<String>) -> CountryRecord {
    let panel = panel::locate_panel(html);
    if panel.is_empty() {
        tracing::debug!(country = %name, "No infobox found");
    } else {
        tracing::debug!(country = %name, rows = panel.len(), "Located infobox");
    }
    let fields = rules::normalize(&panel);
    build_record(name, &fields, neighbors)
}

pub fn build_record(name: &str, fields: &RawFields, neighbors: Vec<String>) -> CountryRecord {
    let text = |f: Field| fields.get(f).unwrap_or_default().to_string();
    CountryRecord {
        name: name.to_string(),
        capital: text(Field::Capital),
        population: coerce_opt(fields.get(Field::Population)),
        density: coerce_opt(fields.get(Field::Density)),
        area: coerce_opt(fields.get(Field::Area)),
        gdp_per_capita: coerce_opt(fields.get(Field::GdpPerCapita)),
        official_languages: text(Field::OfficialLanguages),
        time_zones: text(Field::TimeZones),
        government: text(Field::Government),
        neighbors,
    }
}

// ── Tests ──
