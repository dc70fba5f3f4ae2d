//! Quality-control evaluator.
//!
//! A control defines a target, a tolerance (one standard deviation) and an
//! ordered list of Westgard-style rules. Each new reading is scored as
//! `z = (value - target) / tolerance` and every rule is evaluated against
//! that score plus an explicit window of prior scores for the same sample
//! and control. The run status is the most severe status among the rules
//! that fired.
//!
//! Evaluation is a pure function of its inputs: no clock, no randomness.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{BlockReason, Error, Result};

// ─── Verdicts ────────────────────────────────────────────────────────────────

/// Ordered by severity: `Pass < Warning < Fail`.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QcStatus {
  #[default]
  Pass,
  Warning,
  Fail,
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// A single control rule. Parsed from and rendered as its conventional name.
///
/// | Name   | Meaning                                                   |
/// |--------|-----------------------------------------------------------|
/// | `1-Ks` | this run beyond ±K (warning when K ≤ 2, fail otherwise)   |
/// | `N-Ks` | last N runs beyond K on the same side (N ≥ 2; fail)       |
/// | `R-Ks` | range of the last two runs spans at least K (fail)        |
/// | `Nx`   | last N runs on the same side of the target (fail)         |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QcRule {
  Threshold { limit: f64 },
  Consecutive { runs: usize, limit: f64 },
  Range { span: f64 },
  SameSide { runs: usize },
}

impl QcRule {
  /// How many scores (current included) the rule inspects.
  pub fn window(&self) -> usize {
    match self {
      Self::Threshold { .. } => 1,
      Self::Consecutive { runs, .. } | Self::SameSide { runs } => *runs,
      Self::Range { .. } => 2,
    }
  }

  pub fn severity(&self) -> QcStatus {
    match self {
      Self::Threshold { limit } if *limit <= 2.0 => QcStatus::Warning,
      _ => QcStatus::Fail,
    }
  }

  /// `scores` is oldest first and ends with the run under evaluation.
  /// Pattern rules never fire on fewer scores than their window.
  pub fn fires(&self, scores: &[f64]) -> bool {
    let window = self.window();
    if scores.len() < window {
      return false;
    }
    let recent = &scores[scores.len() - window..];
    match *self {
      Self::Threshold { limit } => recent[0].abs() >= limit,
      Self::Consecutive { limit, .. } => {
        recent.iter().all(|z| *z >= limit) || recent.iter().all(|z| *z <= -limit)
      }
      Self::Range { span } => {
        let max = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = recent.iter().copied().fold(f64::INFINITY, f64::min);
        max - min >= span
      }
      Self::SameSide { .. } => {
        recent.iter().all(|z| *z > 0.0) || recent.iter().all(|z| *z < 0.0)
      }
    }
  }
}

impl fmt::Display for QcRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Threshold { limit } => write!(f, "1-{limit}s"),
      Self::Consecutive { runs, limit } => write!(f, "{runs}-{limit}s"),
      Self::Range { span } => write!(f, "R-{span}s"),
      Self::SameSide { runs } => write!(f, "{runs}x"),
    }
  }
}

impl FromStr for QcRule {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid =
      || Error::validation(BlockReason::InvalidValue, format!("unknown QC rule {s:?}"));
    let name = s.trim();

    if let Some(runs) = name.strip_suffix(['x', 'X']) {
      let runs: usize = runs.parse().map_err(|_| invalid())?;
      if runs < 2 {
        return Err(invalid());
      }
      return Ok(Self::SameSide { runs });
    }

    let body = name.strip_suffix('s').ok_or_else(invalid)?;
    let (head, limit) = body.split_once('-').ok_or_else(invalid)?;
    let limit: f64 = limit.parse().map_err(|_| invalid())?;
    if !limit.is_finite() || limit <= 0.0 {
      return Err(invalid());
    }

    if head.eq_ignore_ascii_case("r") {
      return Ok(Self::Range { span: limit });
    }
    match head.parse::<usize>().map_err(|_| invalid())? {
      0 => Err(invalid()),
      1 => Ok(Self::Threshold { limit }),
      runs => Ok(Self::Consecutive { runs, limit }),
    }
  }
}

impl TryFrom<String> for QcRule {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<QcRule> for String {
  fn from(rule: QcRule) -> Self { rule.to_string() }
}

/// The number of scores, current run included, the rule set needs.
pub fn history_window(rules: &[QcRule]) -> usize {
  rules.iter().map(QcRule::window).max().unwrap_or(1)
}

// ─── Controls and runs ───────────────────────────────────────────────────────

/// Reference definition scoped to a parameter and optionally a method.
/// Immutable once created apart from deactivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcControl {
  pub qc_control_id: Uuid,
  pub parameter_id:  Uuid,
  pub method_id:     Option<Uuid>,
  pub name:          String,
  pub target:        f64,
  pub tolerance:     f64,
  pub rules:         Vec<QcRule>,
  pub active:        bool,
  pub created_by:    Uuid,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`crate::store::LabStore::create_qc_control`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewQcControl {
  pub parameter_id: Uuid,
  pub method_id:    Option<Uuid>,
  pub name:         String,
  pub target:       f64,
  pub tolerance:    f64,
  pub rules:        Vec<String>,
}

impl NewQcControl {
  /// Validate the definition and parse its rule names.
  pub fn parse_rules(&self) -> Result<Vec<QcRule>> {
    if self.name.trim().is_empty() || self.rules.is_empty() {
      return Err(Error::validation(
        BlockReason::MissingFields,
        "a QC control needs a name and at least one rule",
      ));
    }
    if !self.target.is_finite() {
      return Err(Error::validation(BlockReason::InvalidValue, "target must be finite"));
    }
    if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
      return Err(Error::validation(
        BlockReason::InvalidValue,
        "tolerance must be a positive number",
      ));
    }
    self.rules.iter().map(|r| r.parse()).collect()
  }
}

/// One observed control value, scored at insertion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcRun {
  pub run_id:         Uuid,
  pub sample_id:      Uuid,
  pub qc_control_id:  Uuid,
  pub value:          f64,
  pub z_score:        f64,
  pub violated_rules: Vec<String>,
  pub status:         QcStatus,
  pub recorded_by:    Uuid,
  pub recorded_at:    DateTime<Utc>,
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcEvaluation {
  pub z_score:        f64,
  pub violated_rules: Vec<String>,
  pub status:         QcStatus,
}

/// Score `value` against `control`.
///
/// `history` holds prior z-scores for the same sample and control, oldest
/// first. Only the last `history_window(rules) - 1` entries are consulted.
pub fn evaluate_run(
  control: &QcControl,
  value: f64,
  history: &[f64],
) -> Result<QcEvaluation> {
  if !value.is_finite() {
    return Err(Error::validation(BlockReason::InvalidValue, "QC value must be finite"));
  }
  if !control.tolerance.is_finite() || control.tolerance <= 0.0 {
    return Err(Error::validation(
      BlockReason::InvalidValue,
      format!("QC control {} has no usable tolerance", control.qc_control_id),
    ));
  }

  let z_score = (value - control.target) / control.tolerance;

  let keep = history_window(&control.rules).saturating_sub(1);
  let mut scores: Vec<f64> = history[history.len().saturating_sub(keep)..].to_vec();
  scores.push(z_score);

  let mut status = QcStatus::Pass;
  let mut violated_rules = Vec::new();
  for rule in &control.rules {
    if rule.fires(&scores) {
      status = status.max(rule.severity());
      violated_rules.push(rule.to_string());
    }
  }

  Ok(QcEvaluation { z_score, violated_rules, status })
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcCounts {
  pub pass:    usize,
  pub warning: usize,
  pub fail:    usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcSummary {
  /// The worst status among all runs in scope; `pass` when there are none.
  pub status: QcStatus,
  pub counts: QcCounts,
}

pub fn summarize<'a>(runs: impl IntoIterator<Item = &'a QcRun>) -> QcSummary {
  runs.into_iter().fold(QcSummary::default(), |mut acc, run| {
    match run.status {
      QcStatus::Pass => acc.counts.pass += 1,
      QcStatus::Warning => acc.counts.warning += 1,
      QcStatus::Fail => acc.counts.fail += 1,
    }
    acc.status = acc.status.max(run.status);
    acc
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn control(rules: &[&str]) -> QcControl {
    QcControl {
      qc_control_id: Uuid::nil(),
      parameter_id:  Uuid::nil(),
      method_id:     None,
      name:          "level 1".into(),
      target:        0.0,
      tolerance:     1.0,
      rules:         rules.iter().map(|r| r.parse().unwrap()).collect(),
      active:        true,
      created_by:    Uuid::nil(),
      created_at:    DateTime::<Utc>::UNIX_EPOCH,
    }
  }

  fn run(status: QcStatus) -> QcRun {
    QcRun {
      run_id: Uuid::new_v4(),
      sample_id: Uuid::nil(),
      qc_control_id: Uuid::nil(),
      value: 0.0,
      z_score: 0.0,
      violated_rules: vec![],
      status,
      recorded_by: Uuid::nil(),
      recorded_at: DateTime::<Utc>::UNIX_EPOCH,
    }
  }

  const WESTGARD: &[&str] = &["1-2s", "1-3s", "2-2s", "R-4s", "4-1s", "10x"];

  #[test]
  fn rule_names_parse_and_render() {
    for name in ["1-2s", "1-3s", "1-2.5s", "2-2s", "R-4s", "4-1s", "10x"] {
      let rule: QcRule = name.parse().unwrap();
      assert_eq!(rule.to_string(), name);
    }
    assert_eq!("R-4s".parse::<QcRule>().unwrap(), QcRule::Range { span: 4.0 });
    for bad in ["", "3s", "0-2s", "1-0s", "x", "1x", "1-2", "Q-4s"] {
      assert!(bad.parse::<QcRule>().is_err(), "{bad:?} should not parse");
    }
  }

  #[test]
  fn three_sigma_fails() {
    let eval = evaluate_run(&control(WESTGARD), 4.0, &[]).unwrap();
    assert_eq!(eval.z_score, 4.0);
    assert_eq!(eval.status, QcStatus::Fail);
    assert_eq!(eval.violated_rules, vec!["1-2s", "1-3s"]);
  }

  #[test]
  fn two_sigma_warns() {
    let eval = evaluate_run(&control(WESTGARD), -2.4, &[]).unwrap();
    assert_eq!(eval.status, QcStatus::Warning);
    assert_eq!(eval.violated_rules, vec!["1-2s"]);
  }

  #[test]
  fn within_one_sigma_passes() {
    let eval = evaluate_run(&control(WESTGARD), 0.5, &[0.2, -0.3]).unwrap();
    assert_eq!(eval.status, QcStatus::Pass);
    assert!(eval.violated_rules.is_empty());
  }

  #[test]
  fn pattern_rule_escalates_below_two_sigma() {
    // Four consecutive runs beyond +1s, none beyond 2s.
    let eval = evaluate_run(&control(WESTGARD), 1.5, &[1.2, 1.8, 1.1]).unwrap();
    assert_eq!(eval.status, QcStatus::Fail);
    assert_eq!(eval.violated_rules, vec!["4-1s"]);
  }

  #[test]
  fn range_rule_spans_two_runs() {
    let eval = evaluate_run(&control(&["R-4s"]), -2.1, &[2.0]).unwrap();
    assert_eq!(eval.status, QcStatus::Fail);

    let eval = evaluate_run(&control(&["R-4s"]), -1.9, &[1.9]).unwrap();
    assert_eq!(eval.status, QcStatus::Pass);
  }

  #[test]
  fn history_outside_the_window_is_ignored() {
    // 2-2s only looks at the previous score; the older one is out of window.
    let eval = evaluate_run(&control(&["2-2s"]), 2.2, &[2.5, 0.0]).unwrap();
    assert_eq!(eval.status, QcStatus::Pass);

    let eval = evaluate_run(&control(&["2-2s"]), 2.2, &[0.0, 2.5]).unwrap();
    assert_eq!(eval.status, QcStatus::Fail);
  }

  #[test]
  fn evaluation_is_deterministic() {
    let c = control(WESTGARD);
    let history = [0.4, -1.2, 1.7, 2.1];
    let a = evaluate_run(&c, 1.3, &history).unwrap();
    let b = evaluate_run(&c, 1.3, &history).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn rejects_unusable_input() {
    let mut c = control(WESTGARD);
    assert!(evaluate_run(&c, f64::NAN, &[]).is_err());
    c.tolerance = 0.0;
    assert!(evaluate_run(&c, 1.0, &[]).is_err());
  }

  #[test]
  fn summary_reports_worst_status() {
    let runs = [run(QcStatus::Pass), run(QcStatus::Warning), run(QcStatus::Pass)];
    let summary = summarize(&runs);
    assert_eq!(summary.status, QcStatus::Warning);
    assert_eq!(summary.counts, QcCounts { pass: 2, warning: 1, fail: 0 });

    let runs = [run(QcStatus::Fail), run(QcStatus::Warning)];
    assert_eq!(summarize(&runs).status, QcStatus::Fail);
    assert_eq!(summarize(&Vec::<QcRun>::new()).status, QcStatus::Pass);
  }

  #[test]
  fn control_definition_is_validated() {
    let mut input = NewQcControl {
      parameter_id: Uuid::nil(),
      method_id:    None,
      name:         "glucose L1".into(),
      target:       5.5,
      tolerance:    0.2,
      rules:        vec!["1-2s".into(), "1-3s".into()],
    };
    assert_eq!(input.parse_rules().unwrap().len(), 2);

    input.tolerance = -1.0;
    assert!(input.parse_rules().is_err());

    input.tolerance = 0.2;
    input.rules.push("7-ish".into());
    assert!(input.parse_rules().is_err());
  }
}
