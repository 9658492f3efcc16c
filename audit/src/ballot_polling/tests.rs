// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Free & Fair
// See LICENSE.md for details

//! Ballot-polling audit tests.

use std::cell::RefCell;
use std::rc::Rc;

use rand::seq::SliceRandom;
use rand::SeedableRng;

use election::{
    Ballot, Choice, Contestant, ContestResult, ElectionFacts, EstimationError, EstimatorOptions,
    StratumTally, WinProbabilityEstimator,
};

use super::{BallotPollingAudit, BravoMode, BravoStatistic};
use crate::engine::{AuditEngine, AuditMethod, AuditStatus};
use crate::error::AuditError;
use crate::params::ParameterValue;

struct StubEstimator {
    winner_prob: f64,
}

impl WinProbabilityEstimator for StubEstimator {
    fn compute_win_probs(
        &self,
        _strata: &[StratumTally],
        _seed: u64,
        _num_trials: u32,
        candidates: &[Choice],
        _n_winners: usize,
    ) -> Result<Vec<f64>, EstimationError> {
        let spread = (1.0 - self.winner_prob) / (candidates.len() - 1) as f64;
        Ok((0..candidates.len())
            .map(|i| if i == 0 { self.winner_prob } else { spread })
            .collect())
    }
}

struct FailingEstimator;

impl WinProbabilityEstimator for FailingEstimator {
    fn compute_win_probs(
        &self,
        _strata: &[StratumTally],
        _seed: u64,
        _num_trials: u32,
        _candidates: &[Choice],
        _n_winners: usize,
    ) -> Result<Vec<f64>, EstimationError> {
        Err(EstimationError("sampler unavailable".to_string()))
    }
}

#[derive(Clone, Default)]
struct RecordingEstimator {
    calls: Rc<RefCell<Vec<(Vec<StratumTally>, u64, u32, usize)>>>,
}

impl WinProbabilityEstimator for RecordingEstimator {
    fn compute_win_probs(
        &self,
        strata: &[StratumTally],
        seed: u64,
        num_trials: u32,
        candidates: &[Choice],
        n_winners: usize,
    ) -> Result<Vec<f64>, EstimationError> {
        self.calls
            .borrow_mut()
            .push((strata.to_vec(), seed, num_trials, n_winners));
        Ok(vec![1.0 / candidates.len() as f64; candidates.len()])
    }
}

fn adams() -> Contestant {
    Contestant::new(1, "Adams")
}

fn bell() -> Contestant {
    Contestant::new(2, "Bell")
}

fn cruz() -> Contestant {
    Contestant::new(3, "Cruz")
}

fn vote(contestant: Contestant) -> Choice {
    Choice::Candidate(contestant)
}

fn matching(choice: Choice) -> Ballot {
    Ballot::new(choice.clone(), choice)
}

fn two_candidate_facts() -> ElectionFacts {
    ElectionFacts::new(
        vec![
            ContestResult::new(adams(), 0.5263, 5263),
            ContestResult::new(bell(), 0.4737, 4737),
        ],
        10_000,
    )
}

fn three_candidate_facts() -> ElectionFacts {
    ElectionFacts::new(
        vec![
            ContestResult::new(adams(), 0.45, 4500),
            ContestResult::new(bell(), 0.35, 3500),
            ContestResult::new(cruz(), 0.20, 2000),
        ],
        10_000,
    )
}

fn polling(mode: BravoMode) -> BallotPollingAudit {
    BallotPollingAudit::with_mode(Box::new(StubEstimator { winner_prob: 0.9 }), mode)
}

/// The sample behind the two-candidate reference scenario: 51 winner votes,
/// 48 runner-up votes and one undervote.
fn two_candidate_sample() -> Vec<Ballot> {
    let mut ballots = Vec::new();
    for _ in 0..51 {
        ballots.push(matching(vote(adams())));
    }
    for _ in 0..48 {
        ballots.push(matching(vote(bell())));
    }
    ballots.push(matching(Choice::Undervote));
    ballots
}

fn loser_t(audit: &BallotPollingAudit, loser: &Contestant) -> f64 {
    match audit.statistic() {
        Some(BravoStatistic::PerLoser(map)) => map[loser],
        other => panic!("expected per-loser statistic, got {other:?}"),
    }
}

#[test]
fn name_and_initial_status() {
    let audit = polling(BravoMode::PerLoser);
    assert_eq!(audit.name(), "Ballot Polling Audit");
    assert_eq!(audit.status(), AuditStatus::InProgress);
    assert_eq!(audit.progress(false), "Audit not initialized");
}

#[test]
fn compute_before_init_is_an_error() {
    let mut audit = polling(BravoMode::PerLoser);
    let err = audit.compute(&matching(vote(adams()))).unwrap_err();
    assert!(matches!(err, AuditError::NotInitialized));
}

#[test]
fn two_candidate_statistic_starts_at_one() {
    let mut audit = polling(BravoMode::TwoCandidate);
    audit.init(&two_candidate_facts()).unwrap();
    assert_eq!(audit.progress(false), "T = 1.0000");
}

#[test]
fn two_candidate_reference_scenario() {
    let facts = two_candidate_facts();
    let mut ballots = two_candidate_sample();

    let mut audit = polling(BravoMode::TwoCandidate);
    audit.set_parameters(&[ParameterValue::Number(1.0)]).unwrap();
    audit.recompute(&ballots, &facts).unwrap();
    assert_eq!(audit.progress(false), "T = 1.0462");

    // Re-interpret five runner-up ballots as write-ins; their factors drop
    // out of the product and the ratio moves toward the winner.
    for ballot in &mut ballots[51..56] {
        ballot.set_actual_value(Choice::WriteIn);
    }
    audit.recompute(&ballots, &facts).unwrap();
    assert_eq!(audit.progress(false), "T = 1.2348");
}

#[test]
fn per_loser_updates_follow_the_sprt() {
    let mut audit = polling(BravoMode::PerLoser);
    audit.init(&three_candidate_facts()).unwrap();
    let sequence = [
        vote(adams()),
        vote(adams()),
        vote(bell()),
        Choice::Undervote,
        vote(cruz()),
        vote(adams()),
    ];
    for choice in sequence {
        audit.compute(&matching(choice)).unwrap();
    }
    // s_wl is 0.5625 against Bell and 0.45/0.65 against Cruz; three winner
    // votes, one Bell vote and one Cruz vote land exactly here.
    assert!((loser_t(&audit, &bell()) - 1.245849609375).abs() < 1e-12);
    assert!((loser_t(&audit, &cruz()) - 1.6335562480305308).abs() < 1e-12);
}

#[test]
fn winner_votes_increase_every_ratio_monotonically() {
    let mut audit = polling(BravoMode::PerLoser);
    audit.init(&three_candidate_facts()).unwrap();
    let mut last = (1.0, 1.0);
    for _ in 0..30 {
        audit.compute(&matching(vote(adams()))).unwrap();
        let next = (loser_t(&audit, &bell()), loser_t(&audit, &cruz()));
        assert!(next.0 > last.0);
        assert!(next.1 > last.1);
        last = next;
    }
}

#[test]
fn invalid_and_write_in_ballots_leave_the_statistic_unchanged() {
    let mut audit = polling(BravoMode::PerLoser);
    audit.init(&three_candidate_facts()).unwrap();
    for choice in [Choice::Overvote, Choice::Undervote, Choice::WriteIn] {
        audit.compute(&matching(choice)).unwrap();
    }
    assert_eq!(loser_t(&audit, &bell()), 1.0);
    assert_eq!(loser_t(&audit, &cruz()), 1.0);
    // The ballots still land in the contingency tally.
    assert!(audit
        .progress(false)
        .contains("overvote=1, undervote=1, Write-in=1"));
}

#[test]
fn all_ratios_past_the_threshold_verify_the_outcome() {
    let mut audit = polling(BravoMode::PerLoser);
    audit.init(&three_candidate_facts()).unwrap();
    for _ in 0..200 {
        audit.compute(&matching(vote(adams()))).unwrap();
        if audit.status() == AuditStatus::Verified {
            break;
        }
    }
    assert_eq!(audit.status(), AuditStatus::Verified);

    // Terminal states latch: later loser votes cannot regress the status.
    for _ in 0..50 {
        audit.compute(&matching(vote(bell()))).unwrap();
    }
    assert_eq!(audit.status(), AuditStatus::Verified);
}

#[test]
fn a_collapsed_ratio_requires_a_full_hand_count() {
    let mut audit = polling(BravoMode::PerLoser);
    audit.init(&three_candidate_facts()).unwrap();
    for _ in 0..200 {
        audit.compute(&matching(vote(bell()))).unwrap();
        if audit.status() == AuditStatus::FullRecountRequired {
            break;
        }
    }
    assert_eq!(audit.status(), AuditStatus::FullRecountRequired);
}

#[test]
fn recompute_is_deterministic_over_a_shuffled_sample() {
    let facts = three_candidate_facts();
    let mut ballots = Vec::new();
    for _ in 0..40 {
        ballots.push(matching(vote(adams())));
    }
    for _ in 0..30 {
        ballots.push(matching(vote(bell())));
    }
    for _ in 0..20 {
        ballots.push(matching(vote(cruz())));
    }
    for _ in 0..10 {
        ballots.push(matching(Choice::Undervote));
    }
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    ballots.shuffle(&mut rng);

    let mut first = polling(BravoMode::PerLoser);
    first.recompute(&ballots, &facts).unwrap();
    let mut second = polling(BravoMode::PerLoser);
    second.recompute(&ballots, &facts).unwrap();

    assert_eq!(first.statistic(), second.statistic());
    assert_eq!(first.progress(true), second.progress(true));
}

#[test]
fn parameter_round_trip_reproduces_the_trajectory() {
    let facts = three_candidate_facts();
    let ballots: Vec<Ballot> = (0..25).map(|_| matching(vote(adams()))).collect();

    let mut reference = polling(BravoMode::PerLoser);
    reference
        .set_parameters(&[ParameterValue::Number(2.5)])
        .unwrap();
    assert_eq!(reference.parameters()[0].value, "2.50%");
    reference.update_reported_ballots(&ballots, &facts).unwrap();

    let mut round_tripped = polling(BravoMode::PerLoser);
    let echoed: Vec<ParameterValue> = reference
        .parameters()
        .iter()
        .map(|p| ParameterValue::Text(p.value.clone()))
        .collect();
    round_tripped.set_parameters(&echoed).unwrap();
    round_tripped
        .update_reported_ballots(&ballots, &facts)
        .unwrap();

    assert_eq!(reference.statistic(), round_tripped.statistic());
    assert_eq!(reference.progress(false), round_tripped.progress(false));
}

#[test]
fn malformed_tolerance_is_rejected() {
    let mut audit = polling(BravoMode::PerLoser);
    let err = audit
        .set_parameters(&[ParameterValue::Text("one percent".to_string())])
        .unwrap_err();
    assert!(matches!(err, AuditError::Parameter { .. }));
    let err = audit.set_parameters(&[]).unwrap_err();
    assert!(matches!(err, AuditError::Parameter { .. }));
}

#[test]
fn recompute_refreshes_the_upset_probability() {
    let facts = three_candidate_facts();
    let ballots: Vec<Ballot> = (0..10).map(|_| matching(vote(adams()))).collect();
    let mut audit = polling(BravoMode::PerLoser);
    audit.recompute(&ballots, &facts).unwrap();
    let upset = audit.upset_probability().unwrap();
    assert!((upset - 0.1).abs() < 1e-9);
    assert!(audit.progress(true).contains("upset probability = 0.0"));
}

#[test]
fn estimator_failure_leaves_the_statistic_intact() {
    let facts = three_candidate_facts();
    let ballots: Vec<Ballot> = (0..10).map(|_| matching(vote(adams()))).collect();
    let mut audit =
        BallotPollingAudit::with_mode(Box::new(FailingEstimator), BravoMode::PerLoser);

    let err = audit.recompute(&ballots, &facts).unwrap_err();
    assert!(matches!(err, AuditError::Estimation(_)));
    // The replay itself succeeded before the estimator call.
    assert!(loser_t(&audit, &bell()) > 1.0);
    assert_eq!(audit.upset_probability(), None);

    // The estimator is not consulted for a reported-ballot update at all.
    audit.update_reported_ballots(&ballots, &facts).unwrap();
    assert_eq!(audit.upset_probability(), None);
}

#[test]
fn polling_builds_one_stratum_with_a_weighted_winner_bucket() {
    let recorder = RecordingEstimator::default();
    let calls = recorder.calls.clone();
    let mut audit = BallotPollingAudit::with_mode(Box::new(recorder), BravoMode::PerLoser);
    audit.init(&three_candidate_facts()).unwrap();
    audit.compute(&matching(vote(adams()))).unwrap();
    audit.compute(&matching(vote(cruz()))).unwrap();
    audit
        .refresh_upset_probability(&EstimatorOptions::default())
        .unwrap();

    let calls = calls.borrow();
    let (strata, seed, num_trials, n_winners) = &calls[0];
    assert_eq!(strata.len(), 1);
    assert_eq!(strata[0].sample_tally, vec![1, 0, 1, 0, 0, 0]);
    assert_eq!(strata[0].pseudocounts, vec![50, 1, 1, 1, 1, 1]);
    assert_eq!(strata[0].size, 10_000);
    assert_eq!((*seed, *num_trials, *n_winners), (1, 10_000, 1));
}

#[test]
fn current_result_normalizes_observed_tallies() {
    let mut audit = polling(BravoMode::PerLoser);
    audit.init(&three_candidate_facts()).unwrap();
    for choice in [vote(adams()), vote(adams()), vote(bell())] {
        audit.compute(&matching(choice)).unwrap();
    }
    let result = audit.current_result();
    assert_eq!(result.len(), 3);
    assert_eq!(result[0].contestant, adams());
    assert!((result[0].share - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(result[0].votes, 2);
    assert!((result[1].share - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(result[2].share, 0.0);
}

#[test]
fn degenerate_contests_fail_at_init() {
    let mut audit = polling(BravoMode::PerLoser);
    let single = ElectionFacts::new(vec![ContestResult::new(adams(), 1.0, 10_000)], 10_000);
    assert!(matches!(
        audit.init(&single),
        Err(AuditError::DegenerateMargin(_))
    ));

    // In the two-candidate form the fixed margin must stay positive.
    let mut audit = polling(BravoMode::TwoCandidate);
    audit.set_parameters(&[ParameterValue::Number(60.0)]).unwrap();
    assert!(matches!(
        audit.init(&two_candidate_facts()),
        Err(AuditError::DegenerateMargin(_))
    ));
}

#[test]
fn dispatches_through_the_engine_enum() {
    let mut method = AuditMethod::from(polling(BravoMode::PerLoser));
    assert_eq!(method.name(), "Ballot Polling Audit");
    method.init(&three_candidate_facts()).unwrap();
    method.compute(&matching(vote(adams()))).unwrap();
    assert_eq!(method.status(), AuditStatus::InProgress);
    assert_eq!(method.parameters()[0].label, "Tolerance");
}
