//! `<asset>.csv` price files with a `date,price` header and ISO dates.

use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::{EngineError, EngineResult, InMemoryPriceSource, PriceSeries};

#[derive(Debug, Deserialize)]
struct PriceRecord {
    date: NaiveDate,
    price: f64,
}

pub fn read_price_csv<R: Read>(reader: R) -> EngineResult<PriceSeries> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut pairs = Vec::new();
    for (line, record) in rdr.deserialize::<PriceRecord>().enumerate() {
        let record = record.map_err(|e| {
            EngineError::DataSource(format!("row {}: {e}", line + 2))
        })?;
        pairs.push((record.date, record.price));
    }
    if pairs.is_empty() {
        return Err(EngineError::DataSource("no price rows".to_string()));
    }
    PriceSeries::from_pairs(pairs)
}

pub fn load_price_dir(dir: &Path) -> EngineResult<InMemoryPriceSource> {
    let entries = fs::read_dir(dir).map_err(|e| {
        EngineError::DataSource(format!("cannot read data directory {}: {e}", dir.display()))
    })?;

    let mut source = InMemoryPriceSource::new();
    for entry in entries {
        let path = entry
            .map_err(|e| EngineError::DataSource(e.to_string()))?
            .path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
            continue;
        }
        let Some(asset) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };

        let file = fs::File::open(&path).map_err(|e| {
            EngineError::DataSource(format!("cannot open {}: {e}", path.display()))
        })?;
        let series = read_price_csv(file).map_err(|e| match e {
            EngineError::DataSource(reason) => {
                EngineError::DataSource(format!("{}: {reason}", path.display()))
            }
            other => other,
        })?;
        debug!(asset, points = series.len(), "price history loaded");
        source.insert(asset, series);
    }

    let mut assets: Vec<&str> = source.assets().collect();
    assets.sort_unstable();
    info!(dir = %dir.display(), ?assets, "price directory loaded");
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PriceSource;

    #[test]
    fn parses_rows_in_any_order() {
        let csv = "date,price\n2020-02-01,101.5\n2020-01-01,100\n";
        let series = read_price_csv(csv.as_bytes()).expect("valid csv");
        assert_eq!(series.len(), 2);
        assert_eq!(
            series.points()[0].date,
            NaiveDate::from_ymd_opt(2020, 1, 1).expect("date")
        );
        assert!((series.points()[1].price - 101.5).abs() < 1e-12);
    }

    #[test]
    fn reports_the_bad_row() {
        let csv = "date,price\n2020-01-01,100\n2020-13-01,101\n";
        let err = read_price_csv(csv.as_bytes()).expect_err("bad month");
        assert!(matches!(err, EngineError::DataSource(_)));
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn header_only_file_is_rejected() {
        let err = read_price_csv("date,price\n".as_bytes()).expect_err("empty");
        assert!(err.to_string().contains("no price rows"));
    }

    #[test]
    fn loads_csv_files_keyed_by_stem() {
        let dir = std::env::temp_dir().join(format!("swp-prices-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        fs::write(dir.join("gold.csv"), "date,price\n2020-01-01,10\n2020-02-01,11\n")
            .expect("write gold");
        fs::write(dir.join("notes.txt"), "ignored").expect("write notes");

        let source = load_price_dir(&dir).expect("directory loads");
        let gold = source.series("gold").expect("gold present");
        assert_eq!(gold.len(), 2);
        assert_eq!(source.assets().collect::<Vec<_>>(), vec!["gold"]);
        assert!(matches!(
            source.series("notes"),
            Err(EngineError::UnknownAsset(_))
        ));

        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn missing_directory_is_a_data_error() {
        let err = load_price_dir(Path::new("/definitely/not/here")).expect_err("missing dir");
        assert!(matches!(err, EngineError::DataSource(_)));
    }
}
