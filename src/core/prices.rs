use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use super::error::{EngineError, EngineResult};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Accepts samples in any order; rejects duplicate dates and
    /// non-positive prices.
    pub fn new(mut points: Vec<PricePoint>) -> EngineResult<Self> {
        points.sort_by_key(|p| p.date);
        for pair in points.windows(2) {
            if pair[0].date == pair[1].date {
                return Err(EngineError::DataSource(format!(
                    "duplicate price sample for {}",
                    pair[0].date
                )));
            }
        }
        if let Some(bad) = points
            .iter()
            .find(|p| !p.price.is_finite() || p.price <= 0.0)
        {
            return Err(EngineError::DataSource(format!(
                "price on {} must be finite and > 0, got {}",
                bad.date, bad.price
            )));
        }
        Ok(Self { points })
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> EngineResult<Self> {
        Self::new(
            pairs
                .into_iter()
                .map(|(date, price)| PricePoint { date, price })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    weights: BTreeMap<String, f64>,
}

impl Portfolio {
    pub fn new(weights: BTreeMap<String, f64>) -> EngineResult<Self> {
        if weights.is_empty() {
            return Err(EngineError::invalid("portfolio", "weights must not be empty"));
        }
        if let Some((name, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(EngineError::invalid(
                "portfolio",
                format!("weight for '{name}' must be finite and >= 0, got {w}"),
            ));
        }
        let total: f64 = weights.values().sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::invalid(
                "portfolio",
                format!("weights must sum to 1, got {total}"),
            ));
        }
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }
}

pub trait PriceSource {
    fn series(&self, asset: &str) -> EngineResult<PriceSeries>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceSource {
    series: HashMap<String, PriceSeries>,
}

impl InMemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: impl Into<String>, series: PriceSeries) {
        self.series.insert(asset.into(), series);
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

impl PriceSource for InMemoryPriceSource {
    fn series(&self, asset: &str) -> EngineResult<PriceSeries> {
        self.series
            .get(asset)
            .cloned()
            .ok_or_else(|| EngineError::UnknownAsset(asset.to_string()))
    }
}

/// Inner join on date of the weighted asset series.
pub fn compose_portfolio_series(
    portfolio: &Portfolio,
    source: &impl PriceSource,
) -> EngineResult<PriceSeries> {
    let mut composite: Option<BTreeMap<NaiveDate, f64>> = None;

    for (asset, weight) in portfolio.weights() {
        let series = source.series(asset)?;
        let weighted = series.points().iter().map(|p| (p.date, p.price * weight));
        composite = Some(match composite {
            None => weighted.collect(),
            Some(acc) => {
                let by_date: HashMap<NaiveDate, f64> = weighted.collect();
                acc.into_iter()
                    .filter_map(|(date, value)| by_date.get(&date).map(|v| (date, value + v)))
                    .collect()
            }
        });
    }

    let merged = composite.unwrap_or_default();
    if merged.is_empty() {
        return Err(EngineError::InsufficientData(
            "portfolio assets share no common dates".to_string(),
        ));
    }
    PriceSeries::from_pairs(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn portfolio(pairs: &[(&str, f64)]) -> Portfolio {
        Portfolio::new(pairs.iter().map(|(n, w)| (n.to_string(), *w)).collect())
            .expect("valid portfolio")
    }

    #[test]
    fn series_is_sorted_and_rejects_duplicates() {
        let series = PriceSeries::from_pairs([(date(2020, 2, 1), 11.0), (date(2020, 1, 1), 10.0)])
            .expect("valid series");
        assert_eq!(series.points()[0].date, date(2020, 1, 1));

        let err = PriceSeries::from_pairs([(date(2020, 1, 1), 10.0), (date(2020, 1, 1), 11.0)])
            .expect_err("duplicate dates");
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn series_rejects_non_positive_prices() {
        let err = PriceSeries::from_pairs([(date(2020, 1, 1), 0.0)]).expect_err("zero price");
        assert!(matches!(err, EngineError::DataSource(_)));
    }

    #[test]
    fn portfolio_weights_must_sum_to_one() {
        let weights: BTreeMap<String, f64> =
            [("a".to_string(), 0.6), ("b".to_string(), 0.3)].into_iter().collect();
        let err = Portfolio::new(weights).expect_err("0.9 total");
        assert!(err.to_string().contains("sum to 1"));
    }

    #[test]
    fn composite_is_weighted_inner_join_by_date() {
        let mut source = InMemoryPriceSource::new();
        source.insert(
            "equity",
            PriceSeries::from_pairs([
                (date(2020, 1, 1), 100.0),
                (date(2020, 2, 1), 110.0),
                (date(2020, 3, 1), 120.0),
            ])
            .expect("valid"),
        );
        source.insert(
            "gold",
            PriceSeries::from_pairs([
                (date(2020, 2, 1), 50.0),
                (date(2020, 3, 1), 60.0),
                (date(2020, 4, 1), 70.0),
            ])
            .expect("valid"),
        );

        let composite =
            compose_portfolio_series(&portfolio(&[("equity", 0.5), ("gold", 0.5)]), &source)
                .expect("composite");
        let points = composite.points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, date(2020, 2, 1));
        assert!((points[0].price - 80.0).abs() < 1e-9);
        assert!((points[1].price - 90.0).abs() < 1e-9);
    }

    #[test]
    fn composite_reports_unknown_assets() {
        let source = InMemoryPriceSource::new();
        let err = compose_portfolio_series(&portfolio(&[("debt", 1.0)]), &source)
            .expect_err("missing asset");
        assert_eq!(err, EngineError::UnknownAsset("debt".to_string()));
    }
}
