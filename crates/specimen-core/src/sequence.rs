//! Named sequence series and their human-readable rendering.
//!
//! Allocation itself is the store's job (an atomic counter row advanced
//! inside the caller's transaction). This module only names the series and
//! renders allocated integers, which is pure.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Series {
  LabSampleCode,
  ReportNumber,
  OrderNumber,
  ParameterCatalog,
}

impl Series {
  /// Name of the backing counter row.
  pub fn counter_name(self) -> &'static str {
    match self {
      Self::LabSampleCode => "lab_sample_code",
      Self::ReportNumber => "REPORT_NO",
      Self::OrderNumber => "ORDER_NO",
      Self::ParameterCatalog => "PARAMETER_CATALOG_NO",
    }
  }

  fn prefix(self) -> &'static str {
    match self {
      Self::LabSampleCode => "BML",
      Self::ReportNumber => "RPT",
      Self::OrderNumber => "LOA",
      Self::ParameterCatalog => "PRM",
    }
  }

  /// Minimum digit count; larger values simply grow wider.
  fn width(self) -> usize {
    match self {
      Self::LabSampleCode => 3,
      Self::ReportNumber | Self::OrderNumber => 5,
      Self::ParameterCatalog => 4,
    }
  }

  /// Series minted only as a side effect of a workflow step.
  pub fn is_workflow_owned(self) -> bool { !matches!(self, Self::ParameterCatalog) }

  /// Render an allocated value, e.g. `Series::LabSampleCode.render(7)` is
  /// `BML-007`.
  pub fn render(self, value: i64) -> String {
    format!("{}-{:0width$}", self.prefix(), value, width = self.width())
  }
}

/// A value taken from a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
  pub series:    Series,
  pub value:     i64,
  pub formatted: String,
}

impl Allocation {
  pub fn new(series: Series, value: i64) -> Self {
    Self { series, value, formatted: series.render(value) }
  }
}
