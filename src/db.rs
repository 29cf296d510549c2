use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::config::DbConfig;

const TOP_N: usize = 10;

pub fn connect(config: &DbConfig) -> Result<Connection> {
    if let Some(dir) = config.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(&config.path)
        .with_context(|| format!("Failed to open {:?}", config.path))?;
    conn.busy_timeout(config.busy_timeout())?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    register_functions(&conn)?;
    Ok(conn)
}

/// Connection for the query side; writes are rejected by SQLite itself.
pub fn connect_read_only(config: &DbConfig) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        &config.path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open {:?} read-only", config.path))?;
    conn.busy_timeout(config.busy_timeout())?;
    register_functions(&conn)?;
    Ok(conn)
}

/// `casefold(text)`: Unicode lowercase. SQLite's own `LIKE` only folds ASCII.
pub fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )
    .context("Failed to register casefold")?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS countries (
            name               TEXT PRIMARY KEY,
            capital            TEXT NOT NULL DEFAULT '',
            population         NUMERIC NOT NULL DEFAULT 0,
            density            NUMERIC NOT NULL DEFAULT 0,
            area               NUMERIC NOT NULL DEFAULT 0,
            gdp_per_capita     NUMERIC NOT NULL DEFAULT 0,
            official_languages TEXT NOT NULL DEFAULT '',
            time_zones         TEXT NOT NULL DEFAULT '',
            government         TEXT NOT NULL DEFAULT '',
            neighbors          TEXT NOT NULL DEFAULT ''
        );
        ",
    )?;
    Ok(())
}

// ── Writing ──

/// One normalized entity, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryRecord {
    pub name: String,
    pub capital: String,
    pub population: Decimal,
    pub density: Decimal,
    pub area: Decimal,
    pub gdp_per_capita: Decimal,
    pub official_languages: String,
    pub time_zones: String,
    pub government: String,
    pub neighbors: Vec<String>,
}

impl CountryRecord {
    /// Row stored for an entity whose document does not exist.
    pub fn empty(name: &str) -> Self {
        CountryRecord {
            name: name.to_string(),
            capital: String::new(),
            population: Decimal::ZERO,
            density: Decimal::ZERO,
            area: Decimal::ZERO,
            gdp_per_capita: Decimal::ZERO,
            official_languages: String::new(),
            time_zones: String::new(),
            government: String::new(),
            neighbors: Vec::new(),
        }
    }

    /// Density as stored: population / area whenever both are known,
    /// otherwise whatever the document stated.
    pub fn stored_density(&self) -> Decimal {
        if self.population.is_zero() || self.area.is_zero() {
            return self.density;
        }
        self.population
            .checked_div(self.area)
            .unwrap_or(self.density)
    }
}

/// Insert or update by name. Each call commits on its own.
pub fn upsert_country(conn: &Connection, r: &CountryRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO countries
         (name, capital, population, density, area, gdp_per_capita,
          official_languages, time_zones, government, neighbors)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(name) DO UPDATE SET
            capital = excluded.capital,
            population = excluded.population,
            density = excluded.density,
            area = excluded.area,
            gdp_per_capita = excluded.gdp_per_capita,
            official_languages = excluded.official_languages,
            time_zones = excluded.time_zones,
            government = excluded.government,
            neighbors = excluded.neighbors",
        rusqlite::params![
            r.name,
            r.capital,
            r.population.to_string(),
            r.stored_density().to_string(),
            r.area.to_string(),
            r.gdp_per_capita.to_string(),
            r.official_languages,
            r.time_zones,
            r.government,
            r.neighbors.join(", "),
        ],
    )
    .with_context(|| format!("Failed to store {}", r.name))?;
    Ok(())
}

// ── Reading ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Population,
    Density,
    Area,
    GdpPerCapita,
}

impl Metric {
    pub fn column(self) -> &'static str {
        match self {
            Metric::Population => "population",
            Metric::Density => "density",
            Metric::Area => "area",
            Metric::GdpPerCapita => "gdp_per_capita",
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "population" => Ok(Metric::Population),
            "density" => Ok(Metric::Density),
            "area" => Ok(Metric::Area),
            "gdp" | "gdp_per_capita" => Ok(Metric::GdpPerCapita),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryRow {
    pub name: String,
    pub capital: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub population: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub density: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub area: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub gdp_per_capita: Decimal,
    pub official_languages: String,
    pub time_zones: String,
    pub government: String,
    pub neighbors: String,
}

/// `{"name": ..., "<metric>": ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub name: String,
    pub metric: Metric,
    pub value: Decimal,
}

impl Serialize for RankedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry(self.metric.column(), &self.value.to_f64().unwrap_or(0.0))?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameRow {
    pub name: String,
}

/// SQLite may hand NUMERIC columns back as integer, real or text.
fn decimal_at(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let value = match row.get_ref(idx)? {
        ValueRef::Integer(i) => Decimal::from(i),
        ValueRef::Real(f) => Decimal::from_f64(f).unwrap_or(Decimal::ZERO),
        ValueRef::Text(t) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(Decimal::ZERO),
        ValueRef::Null | ValueRef::Blob(_) => Decimal::ZERO,
    };
    Ok(value)
}

/// Case-folded substring pattern for `casefold(col) LIKE ... ESCAPE '\'`.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub fn lookup_by_name(conn: &Connection, query: &str) -> Result<Vec<CountryRow>> {
    let mut stmt = conn.prepare(
        "SELECT name, capital, population, density, area, gdp_per_capita,
                official_languages, time_zones, government, neighbors
         FROM countries
         WHERE casefold(name) LIKE ?1 ESCAPE '\\'
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([like_pattern(query)], |row| {
            Ok(CountryRow {
                name: row.get(0)?,
                capital: row.get(1)?,
                population: decimal_at(row, 2)?,
                density: decimal_at(row, 3)?,
                area: decimal_at(row, 4)?,
                gdp_per_capita: decimal_at(row, 5)?,
                official_languages: row.get(6)?,
                time_zones: row.get(7)?,
                government: row.get(8)?,
                neighbors: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Top ten by `metric`, descending; ties keep storage order.
pub fn top_by(conn: &Connection, metric: Metric) -> Result<Vec<RankedRow>> {
    let sql = format!(
        "SELECT name, {col} FROM countries ORDER BY {col} DESC, rowid LIMIT {limit}",
        col = metric.column(),
        limit = TOP_N
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RankedRow {
                name: row.get(0)?,
                metric,
                value: decimal_at(row, 1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn by_language(conn: &Connection, language: &str) -> Result<Vec<NameRow>> {
    names_where(conn, "official_languages", language)
}

pub fn by_time_zone(conn: &Connection, zone: &str) -> Result<Vec<NameRow>> {
    names_where(conn, "time_zones", zone)
}

fn names_where(conn: &Connection, column: &str, query: &str) -> Result<Vec<NameRow>> {
    let sql = format!(
        "SELECT name FROM countries WHERE casefold({}) LIKE ?1 ESCAPE '\\' ORDER BY rowid",
        column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([like_pattern(query)], |row| Ok(NameRow { name: row.get(0)? }))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Read-only entry point for the HTTP layer. Opens a connection per call.
#[derive(Debug, Clone)]
pub struct QueryFacade {
    config: DbConfig,
}

impl QueryFacade {
    pub fn new(config: DbConfig) -> Self {
        QueryFacade { config }
    }

    fn conn(&self) -> Result<Connection> {
        connect_read_only(&self.config)
    }

    pub fn lookup_by_name(&self, query: &str) -> Result<Vec<CountryRow>> {
        lookup_by_name(&self.conn()?, query)
    }

    pub fn top_by(&self, metric: Metric) -> Result<Vec<RankedRow>> {
        top_by(&self.conn()?, metric)
    }

    pub fn by_language(&self, language: &str) -> Result<Vec<NameRow>> {
        by_language(&self.conn()?, language)
    }

    pub fn by_time_zone(&self, zone: &str) -> Result<Vec<NameRow>> {
        by_time_zone(&self.conn()?, zone)
    }
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub no_population: usize,
    pub no_area: usize,
    pub no_capital: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        total: count("SELECT COUNT(*) FROM countries")?,
        no_population: count("SELECT COUNT(*) FROM countries WHERE population = 0")?,
        no_area: count("SELECT COUNT(*) FROM countries WHERE area = 0")?,
        no_capital: count("SELECT COUNT(*) FROM countries WHERE capital = ''")?,
    })
}

// ── Tests ──
