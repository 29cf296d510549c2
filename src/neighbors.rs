use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::fetch::{Fetched, Source};

/// Column holding the neighbor names in the land-borders table.
const NEIGHBORS_COLUMN: usize = 5;

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table.wikitable").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static FOOTNOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[[^\]]*\]$").unwrap());

/// Country name → neighbor names, loaded once per run and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct NeighborMap {
    map: HashMap<String, Vec<String>>,
}

impl NeighborMap {
    /// Fetch and parse the reference table. Failure leaves every lookup empty.
    pub fn load(source: &dyn Source, url: &str) -> Self {
        match source.fetch_page(url) {
            Ok(Fetched::Document(html)) => {
                let map = Self::parse(&html);
                if map.is_empty() {
                    warn!(%url, "Land-border table had no rows");
                } else {
                    info!(countries = map.len(), "Loaded land-border table");
                }
                map
            }
            Ok(Fetched::NotFound) => {
                warn!(%url, "Land-border table not found, neighbors will be empty");
                Self::default()
            }
            Err(e) => {
                warn!(error = %e, "Could not load land-border table, neighbors will be empty");
                Self::default()
            }
        }
    }

    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let Some(table) = doc.select(&TABLE_SEL).next() else {
            return Self::default();
        };
        let map = table
            .select(&ROW_SEL)
            .skip(1)
            .filter_map(read_row)
            .collect();
        NeighborMap { map }
    }

    /// Entities missing from the table have no neighbors.
    pub fn neighbors_of(&self, country: &str) -> &[String] {
        self.map.get(country).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn read_row(row: ElementRef) -> Option<(String, Vec<String>)> {
    let cells: Vec<ElementRef> = row.select(&CELL_SEL).collect();
    let first = cells.first()?;
    let name = first
        .select(&LINK_SEL)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();
    if name.is_empty() {
        return None;
    }
    let neighbors = cells
        .get(NEIGHBORS_COLUMN)
        .map(|cell| neighbor_names(*cell))
        .unwrap_or_default();
    Some((name, neighbors))
}

fn neighbor_names(cell: ElementRef) -> Vec<String> {
    cell.text()
        .flat_map(|t| t.split('\n'))
        .map(str::trim)
        .filter(|t| !t.is_empty() && !FOOTNOTE_RE.is_match(t))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use reqwest::StatusCode;

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/land_borders.html").unwrap()
    }

    #[test]
    fn parses_neighbor_lists() {
        let map = NeighborMap::parse(&fixture());
        assert_eq!(map.len(), 4);
        assert_eq!(map.neighbors_of("Andorra"), ["France", "Spain"]);
        assert_eq!(
            map.neighbors_of("Germany"),
            ["Austria", "Belgium", "Czech Republic", "Denmark", "France"]
        );
    }

    #[test]
    fn island_has_no_neighbors() {
        let map = NeighborMap::parse(&fixture());
        assert!(map.neighbors_of("Iceland").is_empty());
    }

    #[test]
    fn unknown_country_is_empty() {
        let map = NeighborMap::parse(&fixture());
        assert!(map.neighbors_of("Atlantis").is_empty());
    }

    #[test]
    fn footnote_markers_dropped() {
        let map = NeighborMap::parse(&fixture());
        assert_eq!(map.neighbors_of("Vatican City"), ["Italy"]);
    }

    struct Failing;

    impl Source for Failing {
        fn document_url(&self, name: &str) -> String {
            name.to_string()
        }

        fn fetch_page(&self, url: &str) -> Result<Fetched, FetchError> {
            Err(FetchError::Status {
                url: url.to_string(),
                status: StatusCode::BAD_GATEWAY,
            })
        }
    }

    #[test]
    fn load_failure_degrades_to_empty() {
        let map = NeighborMap::load(&Failing, "borders");
        assert!(map.is_empty());
    }
}
