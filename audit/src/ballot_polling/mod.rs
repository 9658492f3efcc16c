// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Free & Fair
// See LICENSE.md for details

//! Ballot-polling audit: the BRAVO sequential likelihood-ratio test.
//!
//! BRAVO (Lindeman/Stark) specializes Wald's sequential probability ratio
//! test to election outcomes. Only the hand interpretation of each sampled
//! ballot is used; no cast-vote record is consulted. For each reported loser
//! a running likelihood ratio compares the hypothesis that the reported
//! winner truly beat that loser against the null hypothesis of a tie.

use std::collections::BTreeMap;

use election::{
    Ballot, CandidateSet, Choice, Contestant, ContestResult, ElectionFacts, EstimatorOptions,
    StratumTally, WinProbabilityEstimator,
};

use crate::engine::{AuditEngine, AuditStatus};
use crate::error::AuditError;
use crate::params::{format_percentage, required, Parameter, ParameterValue};

#[cfg(test)]
mod tests;

/// Pseudo-count weight on the no-error bucket of the single polling stratum.
const NO_ERROR_PSEUDOCOUNT: u64 = 50;

/// Which form of the BRAVO statistic to maintain.
///
/// `PerLoser` is the canonical general form and subsumes any number of
/// contestants. `TwoCandidate` is the historical simplified form kept for
/// two-candidate contests: a single ratio driven by the fixed margin
/// `winner_share - tolerance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BravoMode {
    PerLoser,
    TwoCandidate,
}

/// The running BRAVO statistic, shaped by [`BravoMode`].
#[derive(Debug, Clone, PartialEq)]
pub enum BravoStatistic {
    /// One likelihood ratio per reported loser, keyed by loser.
    PerLoser(BTreeMap<Contestant, f64>),
    /// The simplified single ratio of the two-candidate form.
    TwoCandidate(f64),
}

/// All per-run state, seeded by `init` and discarded on the next `init`.
struct BravoState {
    candidates: CandidateSet,
    /// Expected fraction of winner-or-loser votes going to the winner under
    /// the null hypothesis, per loser: `s_w / (s_w + s_l)`.
    s_wl: BTreeMap<Contestant, f64>,
    statistic: BravoStatistic,
    /// Fixed margin of the two-candidate form: `winner_share - tolerance`.
    margin: f64,
    /// Observed count per actual choice, the contingency table of this method.
    tally: BTreeMap<Choice, u64>,
    /// Actual-vote counts per real contestant, in reported-result order.
    cached: Vec<(Contestant, u64)>,
    ballot_count: u64,
    status: AuditStatus,
    upset_prob: Option<f64>,
}

impl BravoState {
    fn refresh_status(&mut self, tolerance: f64) {
        if self.status.is_terminal() {
            return;
        }
        let upper = 1.0 / tolerance;
        let (all_confirmed, any_rejected) = match &self.statistic {
            BravoStatistic::TwoCandidate(t) => (*t >= upper, *t <= tolerance),
            BravoStatistic::PerLoser(map) => (
                map.values().all(|t| *t >= upper),
                map.values().any(|t| *t <= tolerance),
            ),
        };
        if all_confirmed {
            self.status = AuditStatus::Verified;
        } else if any_rejected {
            self.status = AuditStatus::FullRecountRequired;
        }
    }
}

/**
 * BRAVO ballot-polling audit engine.
 *
 * Ballots are classified by their hand-interpreted value only:
 *
 * - a vote for the reported winner multiplies every loser's ratio by
 *   `2 * s_wl`,
 * - a vote for loser `l` multiplies that loser's ratio by `2 * (1 - s_wl)`,
 * - invalid votes and write-ins leave the statistic unchanged (logged, not
 *   an error).
 *
 * The run is `Verified` once every ratio reaches `1 / tolerance`, and a full
 * hand count is required once any ratio falls to `tolerance`.
 */
pub struct BallotPollingAudit {
    tolerance: f64,
    mode: BravoMode,
    estimator: Box<dyn WinProbabilityEstimator>,
    state: Option<BravoState>,
}

impl BallotPollingAudit {
    /// Create an engine maintaining the canonical per-loser statistic.
    pub fn new(estimator: Box<dyn WinProbabilityEstimator>) -> Self {
        Self::with_mode(estimator, BravoMode::PerLoser)
    }

    /// Create an engine with an explicit statistic form.
    pub fn with_mode(estimator: Box<dyn WinProbabilityEstimator>, mode: BravoMode) -> Self {
        Self {
            tolerance: 0.01,
            mode,
            estimator,
            state: None,
        }
    }

    /// The running statistic, if the engine has been initialized.
    pub fn statistic(&self) -> Option<&BravoStatistic> {
        self.state.as_ref().map(|s| &s.statistic)
    }

    fn render_statistic(state: &BravoState) -> String {
        match &state.statistic {
            BravoStatistic::TwoCandidate(t) => format!("T = {t:.4}"),
            BravoStatistic::PerLoser(map) => {
                let parts: Vec<String> = state
                    .candidates
                    .losers()
                    .iter()
                    .filter_map(|loser| {
                        map.get(loser).map(|t| format!("T[{}] = {t:.4}", loser.name))
                    })
                    .collect();
                parts.join(", ")
            }
        }
    }

    fn render_tally(state: &BravoState) -> String {
        let parts: Vec<String> = state
            .candidates
            .choices()
            .iter()
            .map(|choice| {
                let count = state.tally.get(choice).copied().unwrap_or(0);
                format!("{choice}={count}")
            })
            .collect();
        format!("Current results: {}", parts.join(", "))
    }
}

impl AuditEngine for BallotPollingAudit {
    fn name(&self) -> &'static str {
        "Ballot Polling Audit"
    }

    fn init(&mut self, facts: &ElectionFacts) -> Result<(), AuditError> {
        if facts.results.len() < 2 {
            return Err(AuditError::DegenerateMargin(
                "at least two contestants are required".to_string(),
            ));
        }
        let candidates = CandidateSet::from_results(&facts.results).ok_or_else(|| {
            AuditError::DegenerateMargin("no reported results".to_string())
        })?;

        let winner_share = facts
            .results
            .iter()
            .filter(|r| &r.contestant == candidates.winner())
            .map(|r| r.share)
            .next()
            .unwrap_or(0.0);
        if winner_share <= 0.0 {
            return Err(AuditError::DegenerateMargin(
                "reported winner has no vote share".to_string(),
            ));
        }

        let margin = winner_share - self.tolerance;
        if self.mode == BravoMode::TwoCandidate && margin <= 0.0 {
            return Err(AuditError::DegenerateMargin(format!(
                "winner share {winner_share} does not exceed the tolerance {}",
                self.tolerance
            )));
        }

        let s_wl: BTreeMap<Contestant, f64> = facts
            .results
            .iter()
            .filter(|r| &r.contestant != candidates.winner())
            .map(|r| (r.contestant.clone(), winner_share / (r.share + winner_share)))
            .collect();

        let statistic = match self.mode {
            BravoMode::PerLoser => BravoStatistic::PerLoser(
                candidates
                    .losers()
                    .iter()
                    .map(|loser| (loser.clone(), 1.0))
                    .collect(),
            ),
            BravoMode::TwoCandidate => BravoStatistic::TwoCandidate(1.0),
        };

        let cached = facts
            .results
            .iter()
            .map(|r| (r.contestant.clone(), 0u64))
            .collect();

        log::info!(
            "ballot polling init: winner {} (share {winner_share}), {} losers, {} ballots",
            candidates.winner().name,
            candidates.losers().len(),
            facts.ballot_count
        );

        self.state = Some(BravoState {
            candidates,
            s_wl,
            statistic,
            margin,
            tally: BTreeMap::new(),
            cached,
            ballot_count: facts.ballot_count,
            status: AuditStatus::InProgress,
            upset_prob: None,
        });
        Ok(())
    }

    fn compute(&mut self, ballot: &Ballot) -> Result<(), AuditError> {
        let tolerance = self.tolerance;
        let state = self.state.as_mut().ok_or(AuditError::NotInitialized)?;

        let actual = ballot.actual_value();
        *state.tally.entry(actual.clone()).or_insert(0) += 1;

        if state.candidates.is_winner(actual) {
            match &mut state.statistic {
                BravoStatistic::PerLoser(map) => {
                    for (loser, t) in map.iter_mut() {
                        if let Some(s_wl) = state.s_wl.get(loser) {
                            *t = 2.0 * *t * s_wl;
                        }
                    }
                }
                BravoStatistic::TwoCandidate(t) => {
                    *t *= state.margin / 0.5;
                }
            }
        } else if let Some(contestant) = actual.contestant() {
            match &mut state.statistic {
                BravoStatistic::PerLoser(map) => {
                    if let (Some(t), Some(s_wl)) =
                        (map.get_mut(contestant), state.s_wl.get(contestant))
                    {
                        *t = 2.0 * *t * (1.0 - s_wl);
                    } else {
                        log::debug!("vote for unlisted contestant {contestant} leaves T unchanged");
                    }
                }
                BravoStatistic::TwoCandidate(t) => {
                    if state.candidates.losers().first() == Some(contestant) {
                        *t *= (1.0 - state.margin) / 0.5;
                    } else {
                        log::debug!("vote for {contestant} leaves the two-candidate T unchanged");
                    }
                }
            }
        } else {
            // Undervotes, overvotes and write-ins carry no evidence about the
            // winner-versus-loser hypotheses.
            log::debug!("T not updated, ballot value {actual} is not a contestant vote");
        }

        if let Some(contestant) = actual.contestant() {
            for entry in state.cached.iter_mut() {
                if &entry.0 == contestant {
                    entry.1 += 1;
                    break;
                }
            }
        }

        state.refresh_status(tolerance);
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
        for ballot in ballots {
            self.compute(ballot)?;
        }
        self.refresh_upset_probability(&EstimatorOptions::default())?;
        Ok(None)
    }

    fn refresh_upset_probability(
        &mut self,
        options: &EstimatorOptions,
    ) -> Result<(), AuditError> {
        let (stratum, choices) = {
            let state = self.state.as_ref().ok_or(AuditError::NotInitialized)?;
            let choices = state.candidates.choices().to_vec();
            let sample_tally: Vec<u64> = choices
                .iter()
                .map(|c| state.tally.get(c).copied().unwrap_or(0))
                .collect();
            // A polling audit has one stratum over the whole contest; the
            // no-error bucket is the reported winner's entry.
            let pseudocounts: Vec<u64> = (0..choices.len())
                .map(|i| if i == 0 { NO_ERROR_PSEUDOCOUNT } else { 1 })
                .collect();
            let stratum = StratumTally {
                sample_tally,
                pseudocounts,
                size: state.ballot_count,
            };
            (stratum, choices)
        };

        let probs = self.estimator.compute_win_probs(
            &[stratum],
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
        let mut out = Self::render_statistic(state);
        if final_ {
            let upset = match state.upset_prob {
                Some(p) => p.to_string(),
                None => "not computed".to_string(),
            };
            out.push_str(&format!("; upset probability = {upset}"));
        }
        if matches!(state.statistic, BravoStatistic::PerLoser(_)) {
            out.push('\n');
            out.push_str(&Self::render_tally(state));
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
        vec![Parameter::new("Tolerance", format_percentage(self.tolerance))]
    }

    fn set_parameters(&mut self, values: &[ParameterValue]) -> Result<(), AuditError> {
        let tolerance = required(values, 0, "Tolerance")?.as_rate("Tolerance")?;
        if !(0.0..1.0).contains(&tolerance) || tolerance == 0.0 {
            return Err(AuditError::Parameter {
                label: "Tolerance".to_string(),
                reason: format!("{tolerance} is not in (0, 1)"),
            });
        }
        self.tolerance = tolerance;
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
