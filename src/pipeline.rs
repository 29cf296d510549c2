use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::db::{self, CountryRecord};
use crate::fetch::{FetchError, Fetched, Source};
use crate::neighbors::NeighborMap;
use crate::parser;

/// Counts reported after a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub stored: usize,
    pub not_found: usize,
    pub failed: usize,
}

enum Extracted {
    Found(CountryRecord),
    Missing(CountryRecord),
}

/// Fetch and normalize one entity. Only transport-level failures are errors.
fn extract_one(
    source: &dyn Source,
    neighbors: &NeighborMap,
    name: &str,
) -> Result<Extracted, FetchError> {
    match source.fetch_document(name)? {
        Fetched::Document(html) => {
            let record =
                parser::process_document(name, &html, neighbors.neighbors_of(name).to_vec());
            Ok(Extracted::Found(record))
        }
        Fetched::NotFound => Ok(Extracted::Missing(CountryRecord::empty(name))),
    }
}

/// Scrape, normalize and store every entity in `names`.
///
/// With `jobs > 1` a chunk of entities is fetched and parsed on a rayon pool;
/// rows are still written on this thread, in input order, one commit each.
/// A failing entity is logged and skipped.
pub fn run(
    conn: &Connection,
    source: &dyn Source,
    neighbors: &NeighborMap,
    names: &[String],
    jobs: usize,
) -> Result<RunStats> {
    let jobs = jobs.max(1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
    let chunk_size = if jobs == 1 { 1 } else { jobs * 4 };

    let pb = ProgressBar::new(names.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {msg}")?
            .progress_chars("=> "),
    );

    let mut stats = RunStats {
        total: names.len(),
        ..RunStats::default()
    };

    for chunk in names.chunks(chunk_size) {
        let results: Vec<_> = if jobs == 1 {
            chunk
                .iter()
                .map(|name| extract_one(source, neighbors, name))
                .collect()
        } else {
            pool.install(|| {
                chunk
                    .par_iter()
                    .map(|name| extract_one(source, neighbors, name))
                    .collect()
            })
        };

        for (name, result) in chunk.iter().zip(results) {
            pb.set_message(name.clone());
            let (record, found) = match result {
                Ok(Extracted::Found(record)) => (record, true),
                Ok(Extracted::Missing(record)) => (record, false),
                Err(e) => {
                    warn!(country = %name, error = %e, "Fetch failed, skipping");
                    stats.failed += 1;
                    pb.inc(1);
                    continue;
                }
            };

            match db::upsert_country(conn, &record) {
                Ok(()) if found => {
                    info!(country = %name, "Stored");
                    stats.stored += 1;
                }
                Ok(()) => {
                    info!(country = %name, "No document found, stored name only");
                    stats.not_found += 1;
                }
                Err(e) => {
                    error!(country = %name, error = %format!("{e:#}"), "Failed to store");
                    stats.failed += 1;
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    info!(
        total = stats.total,
        stored = stats.stored,
        not_found = stats.not_found,
        failed = stats.failed,
        "Pipeline finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use reqwest::StatusCode;
    use rust_decimal::Decimal;

    use super::*;
    use crate::fetch::document_url;

    const BASE: &str = "https://wiki.test/wiki";

    enum Page {
        Html(String),
        Missing,
        Down,
    }

    struct FakeWiki {
        pages: HashMap<String, Page>,
    }

    impl FakeWiki {
        fn new() -> Self {
            FakeWiki {
                pages: HashMap::new(),
            }
        }

        fn with(mut self, name: &str, page: Page) -> Self {
            self.pages.insert(document_url(BASE, name), page);
            self
        }
    }

    impl Source for FakeWiki {
        fn document_url(&self, name: &str) -> String {
            document_url(BASE, name)
        }

        fn fetch_page(&self, url: &str) -> Result<Fetched, FetchError> {
            match self.pages.get(url) {
                Some(Page::Html(html)) => Ok(Fetched::Document(html.clone())),
                Some(Page::Missing) | None => Ok(Fetched::NotFound),
                Some(Page::Down) => Err(FetchError::Status {
                    url: url.to_string(),
                    status: StatusCode::SERVICE_UNAVAILABLE,
                }),
            }
        }
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::register_functions(&conn).unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn borders() -> NeighborMap {
        NeighborMap::parse(&fixture("land_borders"))
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mixed_outcomes_do_not_stop_the_run() {
        let conn = memory_db();
        let wiki = FakeWiki::new()
            .with("Ruritania", Page::Down)
            .with("Germany", Page::Html(fixture("germany")))
            .with("Atlantis", Page::Missing);

        let stats = run(
            &conn,
            &wiki,
            &borders(),
            &names(&["Ruritania", "Germany", "Atlantis"]),
            1,
        )
        .unwrap();

        assert_eq!(
            stats,
            RunStats {
                total: 3,
                stored: 1,
                not_found: 1,
                failed: 1
            }
        );

        let rows = db::lookup_by_name(&conn, "").unwrap();
        let stored: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(stored, vec!["Germany", "Atlantis"]);

        let germany = &rows[0];
        assert_eq!(germany.capital, "Berlin");
        assert_eq!(germany.population, Decimal::from(83_190_556));
        assert!(germany.density > Decimal::from(232) && germany.density < Decimal::from(233));
        assert_eq!(
            germany.neighbors,
            "Austria, Belgium, Czech Republic, Denmark, France"
        );

        let atlantis = &rows[1];
        assert_eq!(atlantis.capital, "");
        assert_eq!(atlantis.population, Decimal::ZERO);
        assert_eq!(atlantis.neighbors, "");
    }

    #[test]
    fn parallel_extraction_keeps_input_order() {
        let conn = memory_db();
        let list: Vec<String> = (0..15).map(|i| format!("Country {i:02}")).collect();
        let mut wiki = FakeWiki::new();
        for name in &list {
            wiki = wiki.with(name, Page::Html(fixture("greenland")));
        }

        let stats = run(&conn, &wiki, &NeighborMap::default(), &list, 4).unwrap();
        assert_eq!(stats.stored, 15);

        let stored: Vec<String> = db::lookup_by_name(&conn, "Country")
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(stored, list);
    }

    #[test]
    fn rerun_updates_rows() {
        let conn = memory_db();
        let list = names(&["Germany"]);
        let missing = FakeWiki::new();
        run(&conn, &missing, &borders(), &list, 1).unwrap();
        let present = FakeWiki::new().with("Germany", Page::Html(fixture("germany")));
        run(&conn, &present, &borders(), &list, 1).unwrap();

        let rows = db::lookup_by_name(&conn, "Germany").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].capital, "Berlin");
    }
}
