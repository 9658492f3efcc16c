// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Free & Fair
// See LICENSE.md for details

//! The lifecycle contract shared by both audit algorithms.

use enum_dispatch::enum_dispatch;
use strum::Display;

use election::{Ballot, ContestResult, ElectionFacts, EstimatorOptions};

use crate::ballot_polling::BallotPollingAudit;
use crate::comparison::ComparisonAudit;
use crate::error::AuditError;
use crate::params::{Parameter, ParameterValue};

/// Discrete status of one audit run.
///
/// Transitions are one-directional within a run: once a terminal state is
/// reached, further ballots never move the status back to `InProgress`. Only
/// `init` restarts the machine. The comparison audit uses `InProgress` and
/// `Verified` only; ballot polling uses all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AuditStatus {
    #[strum(serialize = "In Progress")]
    InProgress,
    #[strum(serialize = "Election Results Verified")]
    Verified,
    #[strum(serialize = "Full Hand Count Required")]
    FullRecountRequired,
}

impl AuditStatus {
    /// True for `Verified` and `FullRecountRequired`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuditStatus::InProgress)
    }
}

/**
 * Lifecycle contract implemented by both audit algorithms.
 *
 * An engine instance owns all statistic and counter state for one audit run.
 * The caller seeds it with [`init`][AuditEngine::init], streams ballots
 * through [`compute`][AuditEngine::compute] (or bulk-replays via
 * [`recompute`][AuditEngine::recompute]) and polls
 * [`status`][AuditEngine::status] and [`progress`][AuditEngine::progress]
 * for the running signal.
 *
 * `compute` is a strict left fold: each statistic update depends on the prior
 * value, so bulk operations are sequential replays and are never performed in
 * parallel.
 */
#[enum_dispatch]
pub trait AuditEngine {
    /// Human-readable name of the audit method.
    fn name(&self) -> &'static str;

    /// (Re)seed all per-run state from fresh reported results.
    ///
    /// Determines the reported winner and the ordered candidate set, zeroes
    /// every counter and tally, recomputes derived thresholds and restarts
    /// the status machine. Callable repeatedly; each call is a full reset.
    ///
    /// # Errors
    ///
    /// - `DegenerateMargin` when the reported results admit no detectable
    ///   margin for the algorithm's stopping rule.
    fn init(&mut self, facts: &ElectionFacts) -> Result<(), AuditError>;

    /// Ingest exactly one hand-examined ballot: update the contingency table,
    /// the algorithm statistic, the cached actual-vote tallies and the status.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` when called before [`init`][AuditEngine::init].
    fn compute(&mut self, ballot: &Ballot) -> Result<(), AuditError>;

    /// Re-`init` and replay `compute` over a full ballot list without
    /// refreshing the win-probability estimate. Used when a fresh batch of
    /// ballots is drawn but the probabilistic projection is deferred.
    fn update_reported_ballots(
        &mut self,
        ballots: &[Ballot],
        facts: &ElectionFacts,
    ) -> Result<(), AuditError>;

    /// Re-`init` and replay `compute` over the full ballot list.
    ///
    /// The comparison audit stops at the first ballot whose ingestion makes
    /// the status terminal and returns that ballot's index as the stopping
    /// point; ballot polling always replays the whole list. When the replay
    /// runs to completion the win-probability estimate is refreshed once.
    fn recompute(
        &mut self,
        ballots: &[Ballot],
        facts: &ElectionFacts,
    ) -> Result<Option<usize>, AuditError>;

    /// Invoke the external estimator and store the upset probability. On
    /// error the last-known statistic values are left intact.
    fn refresh_upset_probability(
        &mut self,
        options: &EstimatorOptions,
    ) -> Result<(), AuditError>;

    /// Human-readable snapshot of the running statistic and contingency
    /// table. With `final_` the upset probability is included. The embedded
    /// values match the internal state exactly.
    fn progress(&self, final_: bool) -> String;

    /// Current status of the run. `InProgress` before `init`.
    fn status(&self) -> AuditStatus;

    /// The algorithm's tunable inputs as an ordered list of (label, value)
    /// pairs. Percentages render with two decimal places.
    fn parameters(&self) -> Vec<Parameter>;

    /// Accept tunable inputs in the order reported by
    /// [`parameters`][AuditEngine::parameters]. Values may be raw numbers or
    /// percentage-suffixed strings.
    ///
    /// # Errors
    ///
    /// - `Parameter` for missing or unparseable values; nothing is silently
    ///   defaulted.
    fn set_parameters(&mut self, values: &[ParameterValue]) -> Result<(), AuditError>;

    /// The cached actual-vote tallies normalized into a result set: each
    /// contestant's observed share is its tally over the total tallied. An
    /// empty sample yields zero shares.
    fn current_result(&self) -> Vec<ContestResult>;

    /// The most recently computed upset probability, if any.
    fn upset_probability(&self) -> Option<f64>;
}

/// The two audit methods behind one dispatching enum. Each variant carries
/// its own statistic shape; there is no shared mutable base state.
#[enum_dispatch(AuditEngine)]
pub enum AuditMethod {
    BallotPolling(BallotPollingAudit),
    Comparison(ComparisonAudit),
}
