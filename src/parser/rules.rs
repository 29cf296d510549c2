//! Label classification for infobox rows.
//!
//! Labels drift between documents and edits ("2023 estimate", "2011 census",
//! "• Total"), so they are matched by substring. Each row is claimed by the
//! first rule in [`RULES`] whose trigger matches its label.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;

use super::numeric::coerce;
use super::panel::Panel;

const SQ_MI_TO_KM2: f64 = 2.58999;

static AREA_FIGURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\d.,]+)\s*(sq\s*mi|km2|km²)?").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Capital,
    TimeZones,
    Government,
    OfficialLanguages,
    Population,
    Density,
    GdpPerCapita,
    Area,
}

pub struct Rule {
    pub field: Field,
    pub trigger: fn(&str) -> bool,
    pub transform: fn(&str) -> String,
    /// Only the first non-empty value is kept.
    pub write_once: bool,
}

pub const RULES: &[Rule] = &[
    Rule {
        field: Field::Capital,
        trigger: capital_label,
        transform: capital_value,
        write_once: false,
    },
    Rule {
        field: Field::TimeZones,
        trigger: time_zone_label,
        transform: verbatim,
        write_once: false,
    },
    Rule {
        field: Field::Government,
        trigger: government_label,
        transform: government_value,
        write_once: false,
    },
    Rule {
        field: Field::OfficialLanguages,
        trigger: language_label,
        transform: language_value,
        write_once: false,
    },
    Rule {
        field: Field::Population,
        trigger: population_label,
        transform: population_value,
        write_once: false,
    },
    Rule {
        field: Field::Density,
        trigger: density_label,
        transform: density_value,
        write_once: false,
    },
    Rule {
        field: Field::GdpPerCapita,
        trigger: gdp_label,
        transform: gdp_value,
        write_once: false,
    },
    Rule {
        field: Field::Area,
        trigger: area_label,
        transform: area_value,
        write_once: true,
    },
];

/// Normalizer output: one cleaned text value per canonical field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    pub capital: Option<String>,
    pub time_zones: Option<String>,
    pub government: Option<String>,
    pub official_languages: Option<String>,
    pub population: Option<String>,
    pub density: Option<String>,
    pub gdp_per_capita: Option<String>,
    pub area: Option<String>,
}

impl RawFields {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Capital => self.capital.as_deref(),
            Field::TimeZones => self.time_zones.as_deref(),
            Field::Government => self.government.as_deref(),
            Field::OfficialLanguages => self.official_languages.as_deref(),
            Field::Population => self.population.as_deref(),
            Field::Density => self.density.as_deref(),
            Field::GdpPerCapita => self.gdp_per_capita.as_deref(),
            Field::Area => self.area.as_deref(),
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Capital => &mut self.capital,
            Field::TimeZones => &mut self.time_zones,
            Field::Government => &mut self.government,
            Field::OfficialLanguages => &mut self.official_languages,
            Field::Population => &mut self.population,
            Field::Density => &mut self.density,
            Field::GdpPerCapita => &mut self.gdp_per_capita,
            Field::Area => &mut self.area,
        }
    }
}

pub fn classify(label: &str) -> Option<&'static Rule> {
    RULES.iter().find(|rule| (rule.trigger)(label))
}

/// Walk the panel in order and fill canonical fields. Later rows overwrite
/// earlier ones except for write-once fields.
pub fn normalize(panel: &Panel) -> RawFields {
    let mut fields = RawFields::default();
    for (label, value) in panel.iter() {
        let Some(rule) = classify(label) else {
            continue;
        };
        let slot = fields.slot_mut(rule.field);
        if rule.write_once && slot.as_deref().is_some_and(|v| !v.is_empty()) {
            continue;
        }
        *slot = Some((rule.transform)(value));
    }
    fields
}

// ── Triggers ──

fn capital_label(label: &str) -> bool {
    label.contains("Capital") || label.contains("Largest city")
}

fn time_zone_label(label: &str) -> bool {
    label.contains("Time zone")
}

fn government_label(label: &str) -> bool {
    label.contains("Government")
}

fn language_label(label: &str) -> bool {
    label.to_lowercase().contains("language")
}

fn population_label(label: &str) -> bool {
    label.contains("estimate")
        || label.contains("census")
        || (label.contains("Population") && !label.contains("rank"))
}

fn density_label(label: &str) -> bool {
    label.contains("Density") || label.contains("density")
}

fn gdp_label(label: &str) -> bool {
    label.contains("capita")
}

fn area_label(label: &str) -> bool {
    label.contains("Total") || (label.contains("Area") && !label.contains("rank"))
}

// ── Transforms ──

fn verbatim(value: &str) -> String {
    value.to_string()
}

/// Coordinates and footnote numbers follow the city name without a separator.
fn capital_value(value: &str) -> String {
    truncate_at(value, |c| c.is_numeric()).trim_end().to_string()
}

fn government_value(value: &str) -> String {
    remove_first_bracketed(value)
}

/// "DutchFrenchGerman" -> "Dutch, French, German".
fn language_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for (i, c) in value.chars().enumerate() {
        if i != 0 && c.is_uppercase() {
            out.push_str(", ");
        }
        out.push(c);
    }
    remove_first_bracketed(&out)
}

fn population_value(value: &str) -> String {
    truncate_at(value, |c| c == '[' || c == '(' || c.is_whitespace()).to_string()
}

/// Keeps the per-km² figure, dropping the "/sq mi" alternate.
fn density_value(value: &str) -> String {
    truncate_at(value, |c| c == '/').to_string()
}

fn gdp_value(value: &str) -> String {
    truncate_at(value, |c| c == '[' || c == '(' || c.is_whitespace()).replace('$', "")
}

/// Leading figure in km². A figure given in square miles is converted.
fn area_value(value: &str) -> String {
    let head = truncate_at(value, |c| c == '[').trim();
    let Some(caps) = AREA_FIGURE_RE.captures(head) else {
        return truncate_at(head, char::is_whitespace).replace("km2", "");
    };
    let figure = &caps[1];
    match caps.get(2) {
        Some(unit) if unit.as_str().starts_with("sq") => {
            let sq_mi = coerce(figure).to_f64().unwrap_or(0.0);
            (sq_mi * SQ_MI_TO_KM2).to_string()
        }
        _ => figure.to_string(),
    }
}

fn truncate_at(value: &str, stop: impl Fn(char) -> bool) -> &str {
    value.find(stop).map_or(value, |i| &value[..i])
}

/// Drop the first `[...]` span, e.g. a footnote marker. An unclosed `[` is kept.
fn remove_first_bracketed(value: &str) -> String {
    let Some(open) = value.find('[') else {
        return value.to_string();
    };
    let Some(close) = value[open..].find(']').map(|i| open + i) else {
        return value.to_string();
    };
    format!("{}{}", &value[..open], &value[close + 1..])
}
