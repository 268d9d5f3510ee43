//! Contract enforcement.

use crate::contract::{Contract, Rule};
use crate::geometry::{check_geometry, within_extent};
use crate::subject::{FieldValue, Validatable};
use chrono::{DateTime, Utc};
use marine_risk_types::{FeatureName, FeatureValue};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Violation key used for records left unchecked when the deadline passes.
pub const TIMEOUT_KEY: &str = "timeout";

/// A value that failed a contract, with the rule it broke.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation<T> {
    pub record: T,
    pub rule: String,
    pub reason: String,
}

/// Validation statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationStats {
    pub checked: u64,
    pub passed: u64,
    pub failed: u64,
    /// Violation counts keyed by rule.
    pub by_rule: BTreeMap<String, u64>,
}

impl ValidationStats {
    pub fn violation_rate(&self) -> f64 {
        match self.checked {
            0 => 0.0,
            n => self.failed as f64 / n as f64,
        }
    }

    pub fn merge(&mut self, other: &ValidationStats) {
        self.checked += other.checked;
        self.passed += other.passed;
        self.failed += other.failed;
        for (rule, count) in &other.by_rule {
            *self.by_rule.entry(rule.clone()).or_insert(0) += count;
        }
    }

    fn record(&mut self, rule: Option<&str>) {
        self.checked += 1;
        match rule {
            None => self.passed += 1,
            Some(rule) => {
                self.failed += 1;
                *self.by_rule.entry(rule.to_string()).or_insert(0) += 1;
            }
        }
    }
}

/// Valid subset and violations of one validation pass.
#[derive(Debug, Clone)]
pub struct ValidationOutcome<T> {
    pub valid: Vec<T>,
    pub violations: Vec<Violation<T>>,
    pub timed_out: bool,
    pub stats: ValidationStats,
}

/// Cross-record state for rules that look at more than one value.
#[derive(Debug, Default)]
pub struct RuleState {
    last_track_end: HashMap<String, DateTime<Utc>>,
}

/// Applies contracts with a bounded per-batch time budget.
#[derive(Debug, Clone)]
pub struct Validator {
    timeout: Duration,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl Validator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Split `records` into those that satisfy `contract` and violations.
    /// Processing never stops on a bad record; when the time budget runs out,
    /// the remaining records are reported as timeout violations.
    pub fn validate<T, I>(&self, records: I, contract: &Contract) -> ValidationOutcome<T>
    where
        T: Validatable,
        I: IntoIterator<Item = T>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut state = RuleState::default();
        let mut outcome = ValidationOutcome {
            valid: Vec::new(),
            violations: Vec::new(),
            timed_out: false,
            stats: ValidationStats::default(),
        };

        for record in records {
            if !outcome.timed_out && Instant::now() >= deadline {
                warn!(
                    contract = %contract.name,
                    timeout_secs = self.timeout.as_secs(),
                    "validation timed out; remaining records marked as violations"
                );
                outcome.timed_out = true;
            }
            if outcome.timed_out {
                outcome.stats.record(Some(TIMEOUT_KEY));
                outcome.violations.push(Violation {
                    record,
                    rule: TIMEOUT_KEY.into(),
                    reason: "not validated before the batch deadline".into(),
                });
                continue;
            }

            match self.check(&record, contract, &mut state) {
                Ok(()) => {
                    outcome.stats.record(None);
                    outcome.valid.push(record);
                }
                Err((rule, reason)) => {
                    outcome.stats.record(Some(&rule));
                    outcome.violations.push(Violation { record, rule, reason });
                }
            }
        }

        log_summary(&contract.name, &outcome.stats);
        outcome
    }

    /// Check a single value. Returns the first broken rule's key and reason.
    pub fn check<T: Validatable>(
        &self,
        record: &T,
        contract: &Contract,
        state: &mut RuleState,
    ) -> Result<(), (String, String)> {
        for rule in &contract.rules {
            if let Err(reason) = apply_rule(rule, record, state) {
                return Err((rule.key(), format!("{}: {reason}", record.label())));
            }
        }
        // Only accepted segments advance the track clock.
        if let Some(span) = record.track_span() {
            if contract.rules.contains(&Rule::TimeOrdered) {
                state
                    .last_track_end
                    .insert(span.track_id.to_string(), span.end);
            }
        }
        Ok(())
    }
}

fn log_summary(contract: &str, stats: &ValidationStats) {
    if stats.failed == 0 {
        info!(contract, checked = stats.checked, "validation passed");
        return;
    }
    warn!(
        contract,
        checked = stats.checked,
        failed = stats.failed,
        rate = stats.violation_rate(),
        "validation found violations"
    );
    for (rule, count) in &stats.by_rule {
        info!(contract, rule = %rule, count, "violations by rule");
    }
}

fn apply_rule<T: Validatable>(rule: &Rule, record: &T, state: &RuleState) -> Result<(), String> {
    match rule {
        Rule::Required { field } => match record.field(field) {
            Some(FieldValue::Missing) => Err(format!("{field} is missing")),
            _ => Ok(()),
        },
        Rule::Range { field, min, max } => match record.field(field) {
            Some(FieldValue::Number(v)) => {
                if v.is_nan() {
                    return Err(format!("{field} is NaN"));
                }
                if let Some(lo) = min {
                    if v < *lo {
                        return Err(format!("{field} = {v} below {lo}"));
                    }
                }
                if let Some(hi) = max {
                    if v > *hi {
                        return Err(format!("{field} = {v} above {hi}"));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        },
        Rule::Finite { field } => match record.field(field) {
            Some(FieldValue::Number(v)) if !v.is_finite() => Err(format!("{field} is not finite")),
            _ => Ok(()),
        },
        Rule::TimeOrdered => match record.track_span() {
            Some(span) => {
                if span.start > span.end {
                    return Err(format!("segment ends before it starts ({} > {})", span.start, span.end));
                }
                match state.last_track_end.get(span.track_id) {
                    Some(prev_end) if span.start < *prev_end => Err(format!(
                        "track {} goes back in time ({} < {})",
                        span.track_id, span.start, prev_end
                    )),
                    _ => Ok(()),
                }
            }
            None => Ok(()),
        },
        Rule::ValidGeometry => match record.geometry() {
            Some(geometry) => check_geometry(geometry),
            None => Ok(()),
        },
        Rule::WithinExtent { extent } => match record.geometry() {
            Some(geometry) if !within_extent(geometry, extent) => {
                Err(format!("geometry outside extent {extent}"))
            }
            _ => Ok(()),
        },
        Rule::FeaturesPresent => match record.feature_values() {
            Some(values) => {
                for name in FeatureName::ALL {
                    match values.iter().find(|(n, _)| *n == name) {
                        None => return Err(format!("feature {name} is absent")),
                        Some((_, FeatureValue::Observed(v))) if !v.is_finite() => {
                            return Err(format!("feature {name} is not finite"))
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            None => Ok(()),
        },
    }
}
