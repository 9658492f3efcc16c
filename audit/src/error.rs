// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Free & Fair
// See LICENSE.md for details

//! Error type for the audit engine.

use thiserror::Error;

use election::EstimationError;

/**
 * Error type for the audit engine.
 *
 * Invalid or unclassifiable ballots are deliberately not represented here:
 * they are logged and skipped for statistic updates, and the audit continues.
 */
#[derive(Error, Debug)]
pub enum AuditError {
    /// Malformed parameter input, such as an unparseable percentage string.
    /// Parameters are never silently defaulted.
    #[error("invalid value for parameter {label}: {reason}")]
    Parameter { label: String, reason: String },

    /// The reported results admit no detectable margin: fewer than two
    /// contestants, a zero ballot count, a non-positive diluted margin, or a
    /// non-positive stopping-count denominator.
    #[error("degenerate reported margin: {0}")]
    DegenerateMargin(String),

    /// A lifecycle operation was invoked before `init` seeded the run state.
    #[error("audit engine used before init")]
    NotInitialized,

    /// The external win-probability estimator failed. The deterministic
    /// sequential-test state is left untouched.
    #[error("{0}")]
    Estimation(#[from] EstimationError),
}
