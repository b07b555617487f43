//! # Market Data
//!
//! $$
//! P \in \mathbb{R}_{>0}^{T \times N}, \qquad R_{t,i} = \frac{P_{t,i}}{P_{t-1,i}} - 1
//! $$
//!
//! Input and intermediate containers shared by every engine: aligned price rows, return
//! matrices, weight vectors and dated time-series points.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use serde::de::MapAccess;
use serde::de::Visitor;
use serde::ser::SerializeMap;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::error::Error;
use crate::error::Result;

/// One trading date with a price per symbol; `None` marks a missing quote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
  pub date: NaiveDate,
  pub prices: Vec<Option<f64>>,
}

impl PriceRow {
  pub fn new(date: NaiveDate, prices: Vec<Option<f64>>) -> Self {
    Self { date, prices }
  }

  /// Row with every price present.
  pub fn dense(date: NaiveDate, prices: &[f64]) -> Self {
    Self {
      date,
      prices: prices.iter().copied().map(Some).collect(),
    }
  }

  fn is_complete(&self) -> bool {
    self.prices.iter().all(Option::is_some)
  }
}

/// Chronological price table, one column per symbol.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceMatrix {
  symbols: Vec<String>,
  rows: Vec<PriceRow>,
}

impl PriceMatrix {
  /// Build a validated price matrix.
  ///
  /// Fails with [`Error::DataUnavailable`] when there are no symbols or no rows and with
  /// [`Error::InvalidInput`] for duplicate symbols, ragged rows, non-increasing dates or a
  /// present price that is not finite and positive.
  pub fn new(symbols: Vec<String>, rows: Vec<PriceRow>) -> Result<Self> {
    if symbols.is_empty() {
      return Err(Error::DataUnavailable("price matrix has no symbols".into()));
    }
    if rows.is_empty() {
      return Err(Error::DataUnavailable("price matrix has no rows".into()));
    }
    ensure_unique(&symbols)?;

    for (t, row) in rows.iter().enumerate() {
      if row.prices.len() != symbols.len() {
        return Err(Error::invalid(format!(
          "row {} ({}) has {} prices for {} symbols",
          t,
          row.date,
          row.prices.len(),
          symbols.len()
        )));
      }
      if t > 0 && row.date <= rows[t - 1].date {
        return Err(Error::invalid(format!(
          "dates must be strictly increasing: {} follows {}",
          row.date,
          rows[t - 1].date
        )));
      }
      for (i, p) in row.prices.iter().enumerate() {
        if let Some(p) = p {
          if !(p.is_finite() && *p > 0.0) {
            return Err(Error::invalid(format!(
              "price for {} on {} must be finite and positive, got {}",
              symbols[i], row.date, p
            )));
          }
        }
      }
    }

    Ok(Self { symbols, rows })
  }

  /// Build from fully populated per-symbol price columns.
  pub fn from_columns(
    symbols: Vec<String>,
    dates: Vec<NaiveDate>,
    columns: &[Vec<f64>],
  ) -> Result<Self> {
    if columns.len() != symbols.len() {
      return Err(Error::invalid(format!(
        "{} price columns for {} symbols",
        columns.len(),
        symbols.len()
      )));
    }
    if let Some(col) = columns.iter().find(|c| c.len() != dates.len()) {
      return Err(Error::invalid(format!(
        "price column has {} values for {} dates",
        col.len(),
        dates.len()
      )));
    }

    let rows = dates
      .iter()
      .enumerate()
      .map(|(t, &date)| PriceRow::new(date, columns.iter().map(|c| Some(c[t])).collect()))
      .collect();

    Self::new(symbols, rows)
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn rows(&self) -> &[PriceRow] {
    &self.rows
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  /// Rows with every price present, as dates plus a dense `T x N` array.
  pub fn dense(&self) -> (Vec<NaiveDate>, Array2<f64>) {
    let complete: Vec<&PriceRow> = self.rows.iter().filter(|r| r.is_complete()).collect();
    let mut values = Array2::<f64>::zeros((complete.len(), self.symbols.len()));
    for (t, row) in complete.iter().enumerate() {
      for (i, p) in row.prices.iter().enumerate() {
        values[[t, i]] = p.unwrap_or(f64::NAN);
      }
    }
    (complete.iter().map(|r| r.date).collect(), values)
  }
}

impl<'de> Deserialize<'de> for PriceMatrix {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    #[derive(Deserialize)]
    struct Raw {
      symbols: Vec<String>,
      rows: Vec<PriceRow>,
    }

    let raw = Raw::deserialize(deserializer)?;
    PriceMatrix::new(raw.symbols, raw.rows).map_err(serde::de::Error::custom)
  }
}

/// Simple returns between consecutive aligned price rows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReturnMatrix {
  dates: Vec<NaiveDate>,
  symbols: Vec<String>,
  values: Array2<f64>,
}

impl ReturnMatrix {
  /// Build a validated return matrix with one row per date and one column per symbol.
  pub fn new(dates: Vec<NaiveDate>, symbols: Vec<String>, values: Array2<f64>) -> Result<Self> {
    ensure_unique(&symbols)?;
    if values.nrows() != dates.len() || values.ncols() != symbols.len() {
      return Err(Error::invalid(format!(
        "return values are {}x{} for {} dates and {} symbols",
        values.nrows(),
        values.ncols(),
        dates.len(),
        symbols.len()
      )));
    }
    if dates.windows(2).any(|w| w[1] <= w[0]) {
      return Err(Error::invalid("return dates must be strictly increasing"));
    }
    if values.iter().any(|v| !v.is_finite()) {
      return Err(Error::invalid("return values must be finite"));
    }
    Ok(Self {
      dates,
      symbols,
      values,
    })
  }

  /// Build from per-symbol return columns.
  pub fn from_columns(
    symbols: Vec<String>,
    dates: Vec<NaiveDate>,
    columns: &[Vec<f64>],
  ) -> Result<Self> {
    if columns.len() != symbols.len() {
      return Err(Error::invalid(format!(
        "{} return columns for {} symbols",
        columns.len(),
        symbols.len()
      )));
    }
    let mut values = Array2::<f64>::zeros((dates.len(), symbols.len()));
    for (i, col) in columns.iter().enumerate() {
      if col.len() != dates.len() {
        return Err(Error::invalid(format!(
          "return column for {} has {} values for {} dates",
          symbols[i],
          col.len(),
          dates.len()
        )));
      }
      for (t, &r) in col.iter().enumerate() {
        values[[t, i]] = r;
      }
    }
    Self::new(dates, symbols, values)
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn nrows(&self) -> usize {
    self.values.nrows()
  }

  pub fn ncols(&self) -> usize {
    self.values.ncols()
  }

  pub fn is_empty(&self) -> bool {
    self.values.nrows() == 0
  }

  pub fn column(&self, i: usize) -> ArrayView1<'_, f64> {
    self.values.column(i)
  }

  /// `R_t = sum_i w_i r_{t,i}` for weights already ordered like the columns.
  pub fn portfolio_returns(&self, weights: &[f64]) -> Array1<f64> {
    let w = ArrayView1::from(weights);
    self.values.dot(&w)
  }

  /// Equal-weight portfolio return series.
  pub fn equal_weight_returns(&self) -> Array1<f64> {
    self
      .values
      .mean_axis(Axis(1))
      .unwrap_or_else(|| Array1::zeros(self.values.nrows()))
  }
}

impl<'de> Deserialize<'de> for ReturnMatrix {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    #[derive(Deserialize)]
    struct Raw {
      dates: Vec<NaiveDate>,
      symbols: Vec<String>,
      values: Array2<f64>,
    }

    let raw = Raw::deserialize(deserializer)?;
    ReturnMatrix::new(raw.dates, raw.symbols, raw.values).map_err(serde::de::Error::custom)
  }
}

/// Per-symbol allocation weights.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightVector {
  symbols: Vec<String>,
  weights: Vec<f64>,
}

impl WeightVector {
  pub fn new(symbols: Vec<String>, weights: Vec<f64>) -> Result<Self> {
    if symbols.len() != weights.len() {
      return Err(Error::invalid(format!(
        "{} weights for {} symbols",
        weights.len(),
        symbols.len()
      )));
    }
    ensure_unique(&symbols)?;
    Ok(Self { symbols, weights })
  }

  /// `1/N` on every symbol.
  pub fn equal(symbols: Vec<String>) -> Result<Self> {
    let n = symbols.len().max(1) as f64;
    let weights = vec![1.0 / n; symbols.len()];
    Self::new(symbols, weights)
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn weights(&self) -> &[f64] {
    &self.weights
  }

  pub fn len(&self) -> usize {
    self.weights.len()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  pub fn get(&self, symbol: &str) -> Option<f64> {
    self
      .symbols
      .iter()
      .position(|s| s == symbol)
      .map(|i| self.weights[i])
  }

  pub fn sum(&self) -> f64 {
    self.weights.iter().sum()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .symbols
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }

  /// Weights re-ordered to `symbols`; the two symbol sets must be identical.
  pub fn aligned_to(&self, symbols: &[String]) -> Result<Vec<f64>> {
    if symbols.len() != self.symbols.len() {
      return Err(Error::invalid(format!(
        "weights cover {} symbols but returns cover {}",
        self.symbols.len(),
        symbols.len()
      )));
    }
    symbols
      .iter()
      .map(|s| {
        self
          .get(s)
          .ok_or_else(|| Error::invalid(format!("no weight supplied for symbol {s}")))
      })
      .collect()
  }
}

impl Serialize for WeightVector {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.weights.len()))?;
    for (symbol, weight) in self.iter() {
      map.serialize_entry(symbol, &weight)?;
    }
    map.end()
  }
}

impl<'de> Deserialize<'de> for WeightVector {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    struct WeightVisitor;

    impl<'de> Visitor<'de> for WeightVisitor {
      type Value = WeightVector;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of symbol to weight")
      }

      fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut symbols = Vec::new();
        let mut weights = Vec::new();
        while let Some((symbol, weight)) = access.next_entry::<String, f64>()? {
          symbols.push(symbol);
          weights.push(weight);
        }
        WeightVector::new(symbols, weights).map_err(serde::de::Error::custom)
      }
    }

    deserializer.deserialize_map(WeightVisitor)
  }
}

/// A dated value in an output time series.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
  pub date: NaiveDate,
  pub value: f64,
}

pub(crate) fn time_series(dates: &[NaiveDate], values: &[f64]) -> Vec<TimePoint> {
  dates
    .iter()
    .zip(values.iter())
    .map(|(&date, &value)| TimePoint { date, value })
    .collect()
}

fn ensure_unique(symbols: &[String]) -> Result<()> {
  let mut seen = HashSet::with_capacity(symbols.len());
  for s in symbols {
    if !seen.insert(s.as_str()) {
      return Err(Error::invalid(format!("duplicate symbol {s}")));
    }
  }
  Ok(())
}
