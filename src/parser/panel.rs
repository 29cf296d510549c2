use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

/// Candidate panel classes, most specific first.
const PANEL_CANDIDATES: &[&str] = &[
    "table.infobox.ib-country.vcard",
    "table.infobox.ib-pol-div.vcard",
    "table.infobox",
];

static PANEL_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    PANEL_CANDIDATES
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static LABEL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th.infobox-label").unwrap());
static DATA_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td.infobox-data").unwrap());

/// Label/value pairs from an infobox, in document order.
#[derive(Debug, Clone, Default)]
pub struct Panel {
    entries: Vec<(String, String)>,
}

impl Panel {
    /// Repeated labels keep their first value.
    pub fn from_pairs<I, L, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, V)>,
        L: Into<String>,
        V: Into<String>,
    {
        let mut seen = HashSet::new();
        let entries = pairs
            .into_iter()
            .map(|(l, v)| (l.into(), v.into()))
            .filter(|(l, _)| seen.insert(l.clone()))
            .collect();
        Panel { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the first infobox matching the candidate list and read its rows.
/// A document without any infobox yields an empty panel.
pub fn locate_panel(html: &str) -> Panel {
    let doc = Html::parse_document(html);
    let Some(table) = PANEL_SELECTORS
        .iter()
        .find_map(|sel| doc.select(sel).next())
    else {
        return Panel::default();
    };
    Panel::from_pairs(table.select(&ROW_SEL).filter_map(read_row))
}

fn read_row(row: ElementRef) -> Option<(String, String)> {
    let label = row.select(&LABEL_SEL).next()?;
    let value = row.select(&DATA_SEL).next()?;
    Some((element_text(label), element_text(value)))
}

/// Concatenated text nodes, trimmed. No separator is inserted between nodes.
fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn country_infobox_rows() {
        let panel = locate_panel(&fixture("germany"));
        let labels: Vec<&str> = panel.iter().map(|(l, _)| l).collect();
        assert!(labels.contains(&"Capitaland largest city"));
        assert!(labels.contains(&"Official languages"));
        assert!(labels.contains(&"Time zone"));
    }

    #[test]
    fn country_infobox_preferred_over_generic() {
        let html = r#"
            <table class="infobox"><tr><th class="infobox-label">Generic</th><td class="infobox-data">x</td></tr></table>
            <table class="infobox ib-country vcard"><tr><th class="infobox-label">Specific</th><td class="infobox-data">y</td></tr></table>
        "#;
        let panel = locate_panel(html);
        assert_eq!(panel.iter().collect::<Vec<_>>(), vec![("Specific", "y")]);
    }

    #[test]
    fn subdivision_infobox_fallback() {
        let html = r#"
            <table class="infobox ib-pol-div vcard">
              <tr><th class="infobox-label">Capital</th><td class="infobox-data">Nuuk</td></tr>
            </table>
        "#;
        let panel = locate_panel(html);
        assert_eq!(panel.len(), 1);
    }

    #[test]
    fn no_infobox_is_empty() {
        let panel = locate_panel("<html><body><p>Nothing here</p></body></html>");
        assert!(panel.is_empty());
    }

    #[test]
    fn rows_without_label_or_data_skipped() {
        let html = r#"
            <table class="infobox">
              <tr><th class="infobox-header">Area</th></tr>
              <tr><th class="infobox-label">• Total</th><td class="infobox-data">10 km2</td></tr>
              <tr><td class="infobox-data">orphan</td></tr>
            </table>
        "#;
        let panel = locate_panel(html);
        assert_eq!(panel.iter().collect::<Vec<_>>(), vec![("• Total", "10 km2")]);
    }

    #[test]
    fn duplicate_labels_keep_first() {
        let panel = Panel::from_pairs([("• Total", "1"), ("• Total", "2")]);
        assert_eq!(panel.iter().collect::<Vec<_>>(), vec![("• Total", "1")]);
    }

    #[test]
    fn text_nodes_concatenated() {
        let html = r#"
            <table class="infobox">
              <tr><th class="infobox-label">Official languages</th>
                  <td class="infobox-data"><a>English</a><br><a>French</a></td></tr>
            </table>
        "#;
        let panel = locate_panel(html);
        assert_eq!(
            panel.iter().next(),
            Some(("Official languages", "EnglishFrench"))
        );
    }
}
