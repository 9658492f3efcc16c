// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Free & Fair
// See LICENSE.md for details

//! Audit statistics engine for risk-limiting audits.
//!
//! Two sequential-testing algorithms share one lifecycle contract: a
//! ballot-polling audit (the BRAVO sequential likelihood-ratio test of
//! Lindeman and Stark) and a ballot-comparison audit (Stark's super-simple
//! simultaneous single-ballot method). Ballots are ingested one at a time in
//! caller order; each ingestion is a strict left fold over the running
//! statistic, so replays are deterministic and never parallelized.
//!
//! The engine owns all per-run statistic state exclusively. Election facts
//! are borrowed read-only, and the Bayesian win-probability estimator is a
//! pluggable collaborator behind
//! [`election::WinProbabilityEstimator`].

pub mod ballot_polling;
pub mod comparison;
pub mod engine;
pub mod error;
pub mod params;

pub use ballot_polling::{BallotPollingAudit, BravoMode, BravoStatistic};
pub use comparison::{ComparisonAudit, DiscrepancyCounters};
pub use engine::{AuditEngine, AuditMethod, AuditStatus};
pub use error::AuditError;
pub use params::{Parameter, ParameterValue};
