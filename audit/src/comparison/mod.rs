// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Free & Fair
// See LICENSE.md for details

//! Ballot-comparison audit: Stark's super-simple simultaneous single-ballot
//! risk-limiting audit.
//!
//! Each sampled ballot's hand interpretation is compared against its
//! cast-vote-record interpretation. Discrepancies are classified by
//! directional magnitude (1- or 2-vote overstatements and understatements)
//! and the closed-form stopping bound is recomputed from the observed counts.
//! The running signal is the number of further error-free ballots that must
//! be examined before the outcome can be certified at the risk limit.

use std::collections::BTreeMap;

use election::{
    Ballot, CandidateSet, Choice, Contestant, ContestResult, ElectionFacts, EstimatorOptions,
    StratumTally, WinProbabilityEstimator,
};

use crate::engine::{AuditEngine, AuditStatus};
use crate::error::AuditError;
use crate::params::{format_percentage, required, Parameter, ParameterValue};


/// Pseudo-count weight on the diagonal (reported == actual) entries of each
/// comparison stratum.
const DIAGONAL_PSEUDOCOUNT: u64 = 5;

/// Observed discrepancy counts. Monotonically non-decreasing within one run;
/// reset on every `init`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscrepancyCounters {
    /// 1-vote overstatements.
    pub o1: u64,
    /// 2-vote overstatements.
    pub o2: u64,
    /// 1-vote understatements.
    pub u1: u64,
    /// 2-vote understatements.
    pub u2: u64,
}

/// Directional magnitude of one classified discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Discrepancy {
    Overstatement1,
    Overstatement2,
    Understatement1,
    Understatement2,
}

impl DiscrepancyCounters {
    fn bump(&mut self, discrepancy: Discrepancy) {
        match discrepancy {
            Discrepancy::Overstatement1 => self.o1 += 1,
            Discrepancy::Overstatement2 => self.o2 += 1,
            Discrepancy::Understatement1 => self.u1 += 1,
            Discrepancy::Understatement2 => self.u2 += 1,
        }
    }
}

/// Classification-relevant kind of a ballot mark. Write-ins count as valid
/// losers; only undervotes and overvotes are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkKind {
    Winner,
    ValidLoser,
    Invalid,
}

fn mark_kind(candidates: &CandidateSet, choice: &Choice) -> MarkKind {
    if candidates.is_winner(choice) {
        MarkKind::Winner
    } else if choice.is_invalid() {
        MarkKind::Invalid
    } else {
        MarkKind::ValidLoser
    }
}

/// The discrepancy decision table, indexed by (reported kind, actual kind).
/// Equal interpretations are short-circuited before classification, so the
/// (Winner, Winner) cell is unreachable. `None` marks the unclassifiable
/// cells: the ballot is logged and the stopping count is left alone.
fn classify(reported: MarkKind, actual: MarkKind, two_candidate: bool) -> Option<Discrepancy> {
    match (reported, actual) {
        (MarkKind::Invalid, MarkKind::Winner) => Some(Discrepancy::Understatement1),
        (MarkKind::Invalid, MarkKind::ValidLoser) => Some(Discrepancy::Overstatement1),
        (MarkKind::Winner, MarkKind::Invalid) => Some(Discrepancy::Overstatement1),
        (MarkKind::Winner, MarkKind::ValidLoser) => Some(Discrepancy::Overstatement2),
        (MarkKind::ValidLoser, MarkKind::Winner) => {
            if two_candidate {
                Some(Discrepancy::Understatement2)
            } else {
                Some(Discrepancy::Understatement1)
            }
        }
        (MarkKind::ValidLoser, MarkKind::ValidLoser) => Some(Discrepancy::Overstatement1),
        (MarkKind::Invalid, MarkKind::Invalid)
        | (MarkKind::ValidLoser, MarkKind::Invalid)
        | (MarkKind::Winner, MarkKind::Winner) => None,
    }
}

/// All per-run state, seeded by `init` and discarded on the next `init`.
struct ComparisonState {
    candidates: CandidateSet,
    diluted_margin: f64,
    /// Error-free ballots still to examine before the outcome is certified.
    stopping_count: i64,
    counters: DiscrepancyCounters,
    /// Contingency table: reported choice to actual choice to count.
    table: BTreeMap<Choice, BTreeMap<Choice, u64>>,
    /// Actual-vote counts per real contestant, in reported-result order.
    cached: Vec<(Contestant, u64)>,
    /// Cast-vote-record tally per reported choice, the stratum sizes.
    reported_tallies: BTreeMap<Choice, u64>,
    status: AuditStatus,
    upset_prob: Option<f64>,
}

/**
 * Comparison audit engine implementing the super-simple method.
 *
 * The initial stopping count comes from Stark's closed-form bound driven by
 * the configured *expected* discrepancy rates. From then on:
 *
 * - a ballot whose hand interpretation matches its cast-vote record
 *   decrements the count by exactly one,
 * - a classified discrepancy recomputes the count from the bound with the
 *   *observed* o1/o2/u1/u2 counts in place of the expected rates,
 * - an unclassifiable ballot is logged and changes nothing.
 *
 * The run is `Verified` once the count reaches zero; this method has no
 * full-recount state.
 */
pub struct ComparisonAudit {
    risk_limit: f64,
    inflator: f64,
    o1_expected: f64,
    o2_expected: f64,
    u1_expected: f64,
    u2_expected: f64,
    estimator: Box<dyn WinProbabilityEstimator>,
    state: Option<ComparisonState>,
}

impl ComparisonAudit {
    /// Create an engine with the starting tunables from Stark's paper.
    pub fn new(estimator: Box<dyn WinProbabilityEstimator>) -> Self {
        Self {
            risk_limit: 0.05,
            inflator: 1.03905,
            o1_expected: 0.001,
            o2_expected: 0.0001,
            u1_expected: 0.001,
            u2_expected: 0.0001,
            estimator,
            state: None,
        }
    }

    /// The current stopping count, if the engine has been initialized.
    pub fn stopping_count(&self) -> Option<i64> {
        self.state.as_ref().map(|s| s.stopping_count)
    }

    /// The observed discrepancy counters, if the engine has been initialized.
    pub fn discrepancies(&self) -> Option<DiscrepancyCounters> {
        self.state.as_ref().map(|s| s.counters)
    }
}

/// Stark's bound with the observed discrepancy counts in place of the
/// expected rates.
fn observed_stopping_bound(
    risk_limit: f64,
    gamma: f64,
    diluted_margin: f64,
    counters: &DiscrepancyCounters,
) -> i64 {
    let log_sum = risk_limit.ln()
        + counters.o1 as f64 * (1.0 - 1.0 / (2.0 * gamma)).ln()
        + counters.o2 as f64 * (1.0 - 1.0 / gamma).ln()
        + counters.u1 as f64 * (1.0 + 1.0 / (2.0 * gamma)).ln()
        + counters.u2 as f64 * (1.0 + 1.0 / gamma).ln();
    (-2.0 * gamma * log_sum / diluted_margin).ceil() as i64
}

impl AuditEngine for ComparisonAudit {
    fn name(&self) -> &'static str {
        "Comparison RLA"
    }

    fn init(&mut self, facts: &ElectionFacts) -> Result<(), AuditError> {
        if facts.results.len() < 2 {
            return Err(AuditError::DegenerateMargin(
                "at least two contestants are required".to_string(),
            ));
        }
        if facts.ballot_count == 0 {
            return Err(AuditError::DegenerateMargin(
                "ballot count is zero".to_string(),
            ));
        }
        let candidates = CandidateSet::from_results(&facts.results).ok_or_else(|| {
            AuditError::DegenerateMargin("no reported results".to_string())
        })?;

        let mut sorted: Vec<&ContestResult> = facts.results.iter().collect();
        sorted.sort_by(|a, b| b.share.total_cmp(&a.share));
        let margin_votes = sorted[0].votes as i64 - sorted[1].votes as i64;
        if margin_votes <= 0 {
            return Err(AuditError::DegenerateMargin(format!(
                "reported winner leads the runner-up by {margin_votes} votes"
            )));
        }
        let diluted_margin = margin_votes as f64 / facts.ballot_count as f64;

        let gamma = self.inflator;
        let expected_term = self.o1_expected * (1.0 - 1.0 / (2.0 * gamma)).ln()
            + self.o2_expected * (1.0 - 1.0 / gamma).ln()
            + self.u1_expected * (1.0 + 1.0 / (2.0 * gamma)).ln()
            + self.u2_expected * (1.0 + 1.0 / gamma).ln();
        let denominator = diluted_margin + 2.0 * gamma * expected_term;
        if denominator <= 0.0 {
            return Err(AuditError::DegenerateMargin(format!(
                "stopping bound denominator {denominator} is not positive"
            )));
        }
        let stopping_count = (-2.0 * gamma * self.risk_limit.ln() / denominator).ceil() as i64;

        let cached = facts
            .results
            .iter()
            .map(|r| (r.contestant.clone(), 0u64))
            .collect();

        log::info!(
            "comparison init: winner {}, margin {margin_votes} of {} ballots \
             (diluted {diluted_margin}), risk limit {}, initial stopping count {stopping_count}",
            candidates.winner().name,
            facts.ballot_count,
            self.risk_limit
        );

        self.state = Some(ComparisonState {
            candidates,
            diluted_margin,
            stopping_count,
            counters: DiscrepancyCounters::default(),
            table: BTreeMap::new(),
            cached,
            reported_tallies: facts.reported_tallies.clone(),
            status: AuditStatus::InProgress,
            upset_prob: None,
        });
        Ok(())
    }

    fn compute(&mut self, ballot: &Ballot) -> Result<(), AuditError> {
        let risk_limit = self.risk_limit;
        let gamma = self.inflator;
        let state = self.state.as_mut().ok_or(AuditError::NotInitialized)?;

        let reported = ballot.reported_value();
        let actual = ballot.actual_value();
        *state
            .table
            .entry(reported.clone())
            .or_default()
            .entry(actual.clone())
            .or_insert(0) += 1;

        if actual == reported {
            // One more error-free ballot; no bound recomputation needed.
            state.stopping_count -= 1;
        } else {
            let two_candidate = state.candidates.contestant_count() == 2;
            let reported_kind = mark_kind(&state.candidates, reported);
            let actual_kind = mark_kind(&state.candidates, actual);
            match classify(reported_kind, actual_kind, two_candidate) {
                Some(discrepancy) => {
                    state.counters.bump(discrepancy);
                    state.stopping_count = observed_stopping_bound(
                        risk_limit,
                        gamma,
                        state.diluted_margin,
                        &state.counters,
                    );
                    log::debug!(
                        "discrepancy {discrepancy:?} (reported {reported}, actual {actual}): \
                         o1={} o2={} u1={} u2={}, stopping count {}",
                        state.counters.o1,
                        state.counters.o2,
                        state.counters.u1,
                        state.counters.u2,
                        state.stopping_count
                    );
                }
                None => {
                    log::warn!(
                        "unclassifiable ballot left the stopping count unchanged: \
                         reported {reported}, actual {actual}"
                    );
                }
            }
        }

        if let Some(contestant) = actual.contestant() {
            for entry in state.cached.iter_mut() {
                if &entry.0 == contestant {
                    entry.1 += 1;
                    break;
                }
            }
        }

        if state.status == AuditStatus::InProgress && state.stopping_count <= 0 {
            state.status = AuditStatus::Verified;
            log::info!("comparison audit verified the reported outcome");
        }
        Ok(())
    }

    fn update_reported_ballots(
        &mut self,
        ballots: &[Ballot],
        facts: &ElectionFacts,
    ) -> Result<(), AuditError> {
        self.init(facts)?;
        for ballot in ballots {
            self.compute(ballot)?;
        }
        Ok(())
    }

    fn recompute(
        &mut self,
        ballots: &[Ballot],
        facts: &ElectionFacts,
    ) -> Result<Option<usize>, AuditError> {
        self.init(facts)?;
        for (index, ballot) in ballots.iter().enumerate() {
            self.compute(ballot)?;
            if self.status() == AuditStatus::Verified {
                return Ok(Some(index));
            }
        }
        self.refresh_upset_probability(&EstimatorOptions::default())?;
        Ok(None)
    }

    fn refresh_upset_probability(
        &mut self,
        options: &EstimatorOptions,
    ) -> Result<(), AuditError> {
        let (strata, choices) = {
            let state = self.state.as_ref().ok_or(AuditError::NotInitialized)?;
            let choices = state.candidates.choices().to_vec();
            let strata: Vec<StratumTally> = state
                .reported_tallies
                .iter()
                .map(|(reported, size)| {
                    let row = state.table.get(reported);
                    let sample_tally: Vec<u64> = choices
                        .iter()
                        .map(|actual| row.and_then(|r| r.get(actual)).copied().unwrap_or(0))
                        .collect();
                    let pseudocounts: Vec<u64> = choices
                        .iter()
                        .map(|actual| {
                            if actual == reported {
                                DIAGONAL_PSEUDOCOUNT
                            } else {
                                1
                            }
                        })
                        .collect();
                    StratumTally {
                        sample_tally,
                        pseudocounts,
                        size: *size,
                    }
                })
                .collect();
            (strata, choices)
        };
        if strata.is_empty() {
            return Err(election::EstimationError(
                "no reported-choice strata were supplied at init".to_string(),
            )
            .into());
        }

        let probs = self.estimator.compute_win_probs(
            &strata,
            options.seed,
            options.num_trials,
            &choices,
            options.n_winners,
        )?;
        if probs.len() != choices.len() {
            return Err(election::EstimationError(format!(
                "estimator returned {} probabilities for {} candidates",
                probs.len(),
                choices.len()
            ))
            .into());
        }

        if let Some(state) = self.state.as_mut() {
            state.upset_prob = Some(1.0 - probs[0]);
        }
        Ok(())
    }

    fn progress(&self, final_: bool) -> String {
        let Some(state) = self.state.as_ref() else {
            return "Audit not initialized".to_string();
        };
        let mut out = String::new();
        if final_ {
            let upset = match state.upset_prob {
                Some(p) => p.to_string(),
                None => "not computed".to_string(),
            };
            out.push_str(&format!(
                "{} correct ballots left; upset probability = {upset}\n",
                state.stopping_count
            ));
        }
        for actual in state.candidates.choices() {
            for reported in state.candidates.choices() {
                let count = state
                    .table
                    .get(reported)
                    .and_then(|row| row.get(actual))
                    .copied()
                    .unwrap_or(0);
                if count != 0 {
                    out.push_str(&format!(
                        "Actual votes for {actual} reported in CVR for {reported}: {count}\n"
                    ));
                }
            }
        }
        out
    }

    fn status(&self) -> AuditStatus {
        self.state
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(AuditStatus::InProgress)
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::new("Risk Limit", format_percentage(self.risk_limit)),
            Parameter::new("Error Inflation Factor", self.inflator.to_string()),
            Parameter::new(
                "Expected 1-vote Overstatement Rate",
                self.o1_expected.to_string(),
            ),
            Parameter::new(
                "Expected 2-vote Overstatement Rate",
                self.o2_expected.to_string(),
            ),
            Parameter::new(
                "Expected 1-vote Understatement Rate",
                self.u1_expected.to_string(),
            ),
            Parameter::new(
                "Expected 2-vote Understatement Rate",
                self.u2_expected.to_string(),
            ),
        ]
    }

    fn set_parameters(&mut self, values: &[ParameterValue]) -> Result<(), AuditError> {
        let risk_limit = required(values, 0, "Risk Limit")?.as_rate("Risk Limit")?;
        if !(0.0..1.0).contains(&risk_limit) || risk_limit == 0.0 {
            return Err(AuditError::Parameter {
                label: "Risk Limit".to_string(),
                reason: format!("{risk_limit} is not in (0, 1)"),
            });
        }
        let inflator = required(values, 1, "Error Inflation Factor")?
            .as_number("Error Inflation Factor")?;
        if inflator <= 1.0 {
            return Err(AuditError::Parameter {
                label: "Error Inflation Factor".to_string(),
                reason: format!("{inflator} must exceed 1"),
            });
        }
        let labels = [
            "Expected 1-vote Overstatement Rate",
            "Expected 2-vote Overstatement Rate",
            "Expected 1-vote Understatement Rate",
            "Expected 2-vote Understatement Rate",
        ];
        let mut rates = [0.0; 4];
        for (slot, (offset, label)) in rates.iter_mut().zip(labels.into_iter().enumerate()) {
            let rate = required(values, offset + 2, label)?.as_number(label)?;
            if rate < 0.0 {
                return Err(AuditError::Parameter {
                    label: label.to_string(),
                    reason: format!("{rate} is negative"),
                });
            }
            *slot = rate;
        }

        self.risk_limit = risk_limit;
        self.inflator = inflator;
        [
            self.o1_expected,
            self.o2_expected,
            self.u1_expected,
            self.u2_expected,
        ] = rates;
        Ok(())
    }

    fn current_result(&self) -> Vec<ContestResult> {
        let Some(state) = self.state.as_ref() else {
            return Vec::new();
        };
        let total: u64 = state.cached.iter().map(|(_, count)| count).sum();
        state
            .cached
            .iter()
            .map(|(contestant, count)| {
                let share = if total == 0 {
                    0.0
                } else {
                    *count as f64 / total as f64
                };
                ContestResult::new(contestant.clone(), share, *count)
            })
            .collect()
    }

    fn upset_probability(&self) -> Option<f64> {
        self.state.as_ref().and_then(|s| s.upset_prob)
    }
}
