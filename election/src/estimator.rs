// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Free & Fair
// See LICENSE.md for details

//! Contract for the external Bayesian win-probability estimator.
//!
//! The estimator runs seeded Monte-Carlo trials over Dirichlet posteriors and
//! may be arbitrarily expensive; the audit engine therefore invokes it only
//! on explicit refresh or at the end of a bulk replay, never per ballot. The
//! trait keeps the sampler's nondeterminism isolated from the deterministic
//! sequential-test core and lets tests substitute a stub.

use thiserror::Error;

use crate::contest::Choice;

/// Failure of a win-probability estimation run. A failed refresh leaves the
/// audit's last-known statistic values intact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("win probability estimation failed: {0}")]
pub struct EstimationError(pub String);

/// One stratum of observed counts. `sample_tally` and `pseudocounts` are
/// aligned with the candidate list passed to
/// [`WinProbabilityEstimator::compute_win_probs`]; `size` is the total number
/// of ballots the stratum covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StratumTally {
    pub sample_tally: Vec<u64>,
    pub pseudocounts: Vec<u64>,
    pub size: u64,
}

/// Inputs for one estimation run. The defaults mirror the reference tool:
/// seed 1, 10 000 trials, a single winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatorOptions {
    pub seed: u64,
    pub num_trials: u32,
    pub n_winners: usize,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            seed: 1,
            num_trials: 10_000,
            n_winners: 1,
        }
    }
}

/// External Monte-Carlo estimator of each candidate's probability of winning
/// given the ballots examined so far.
pub trait WinProbabilityEstimator {
    /// Estimate per-candidate win probabilities.
    ///
    /// # Parameters
    ///
    /// - `strata`: observed tallies and Dirichlet pseudo-counts, one entry per
    ///   stratum, all aligned with `candidates`
    /// - `seed`: seed for the trial RNG
    /// - `num_trials`: number of Monte-Carlo trials
    /// - `candidates`: the ordered candidate universe
    /// - `n_winners`: number of winners the contest elects
    ///
    /// Returns one probability per candidate, in `candidates` order, summing
    /// to approximately `n_winners`.
    fn compute_win_probs(
        &self,
        strata: &[StratumTally],
        seed: u64,
        num_trials: u32,
        candidates: &[Choice],
        n_winners: usize,
    ) -> Result<Vec<f64>, EstimationError>;
}
