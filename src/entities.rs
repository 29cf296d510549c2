//! Entity list: which countries the pipeline scrapes, in order.
//!
//! Built once from the ISO 3166 code table and kept as a flat file with one
//! name per line.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::fetch::{Fetched, Source};

const TRAILING_MARKER: &str = "– See";
const HAIR_SPACE: char = '\u{200A}';
const NBSP: char = '\u{00A0}';

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table.wikitable").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TH_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Download the code table and extract cleaned names.
pub fn build_entity_list(source: &dyn Source, url: &str) -> Result<Vec<String>> {
    info!(%url, "Fetching entity reference table");
    match source.fetch_page(url)? {
        Fetched::Document(html) => Ok(parse_entity_table(&html)),
        Fetched::NotFound => bail!("Entity reference table not found at {}", url),
    }
}

/// Rows with a header cell are skipped. The first column is the primary
/// candidate; the second replaces it when cleanup leaves a no-break space.
pub fn parse_entity_table(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Some(table) = doc.select(&TABLE_SEL).next() else {
        return Vec::new();
    };
    table
        .select(&ROW_SEL)
        .skip(1)
        .filter(|row| row.select(&TH_SEL).next().is_none())
        .filter_map(|row| {
            let cells: Vec<ElementRef> = row.select(&TD_SEL).collect();
            let primary = cell_text(cells.first()?);
            let alternate = cells.get(1).map(cell_text).unwrap_or_default();
            let name = choose_name(&primary, &alternate);
            if name.is_empty() {
                debug!(?primary, "Skipping row without a usable name");
                return None;
            }
            Some(name)
        })
        .collect()
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

pub fn choose_name(primary: &str, alternate: &str) -> String {
    let cleaned = clean_name(primary);
    if cleaned.contains(NBSP) {
        alternate.trim().to_string()
    } else {
        cleaned
    }
}

/// Drop the first `(...)` and `[...]` spans, anything from "– See" on, and
/// hair spaces.
pub fn clean_name(raw: &str) -> String {
    let name = remove_between(raw, '(', ')');
    let name = remove_between(&name, '[', ']');
    let name = match name.find(TRAILING_MARKER) {
        Some(i) => &name[..i],
        None => name.as_str(),
    };
    name.replace(HAIR_SPACE, "").trim().to_string()
}

/// Remove from the first `open` to the first `close` after it, inclusive.
fn remove_between(text: &str, open: char, close: char) -> String {
    let Some(start) = text.find(open) else {
        return text.to_string();
    };
    match text[start..].find(close) {
        Some(len) => format!("{}{}", &text[..start], &text[start + len + close.len_utf8()..]),
        None => text.to_string(),
    }
}

pub fn write_entity_list(path: &Path, names: &[String]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let mut body = names.join("\n");
    body.push('\n');
    fs::write(path, body).with_context(|| format!("Failed to write {:?}", path))
}

pub fn read_entity_list(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}. Run 'init' first", path))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_parenthesized_and_bracketed() {
        assert_eq!(clean_name("Bolivia (Plurinational State of)"), "Bolivia");
        assert_eq!(clean_name("Åland Islands [b]"), "Åland Islands");
        assert_eq!(clean_name("Iran (Islamic Republic of) [d]"), "Iran");
    }

    #[test]
    fn only_first_span_removed() {
        assert_eq!(clean_name("A (x) B (y)"), "A  B (y)");
    }

    #[test]
    fn truncates_at_marker() {
        assert_eq!(clean_name("Kosovo – See Kosovo"), "Kosovo");
    }

    #[test]
    fn strips_hair_space() {
        assert_eq!(clean_name("Congo\u{200A}[c]"), "Congo");
    }

    #[test]
    fn unmatched_bracket_untouched() {
        assert_eq!(clean_name("Odd ) name ("), "Odd ) name (");
    }

    #[test]
    fn nbsp_falls_back_to_alternate() {
        assert_eq!(choose_name("Taiwan,\u{a0}Province of China", " Taiwan "), "Taiwan");
        assert_eq!(choose_name("Chad", "Republic of Chad"), "Chad");
    }

    #[test]
    fn parses_code_table() {
        let html = std::fs::read_to_string("tests/fixtures/iso_codes.html").unwrap();
        assert_eq!(
            parse_entity_table(&html),
            vec!["Afghanistan", "Åland Islands", "Bolivia", "Congo", "Kosovo", "Taiwan"]
        );
    }

    #[test]
    fn list_file_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/countries.txt");
        let names = vec!["Chad".to_string(), "Côte d'Ivoire".to_string()];
        write_entity_list(&path, &names).unwrap();
        assert_eq!(read_entity_list(&path).unwrap(), names);
    }

    #[test]
    fn blank_lines_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("countries.txt");
        std::fs::write(&path, "Chad\n\n  Mali  \n").unwrap();
        assert_eq!(read_entity_list(&path).unwrap(), vec!["Chad", "Mali"]);
    }

    #[test]
    fn missing_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_entity_list(&dir.path().join("absent.txt")).is_err());
    }
}
