// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Free & Fair
// See LICENSE.md for details

//! Election data model consumed by the risk-limiting audit engine.
//!
//! This crate defines the read-only facts an audit operates on (contestants,
//! choices, ballots and reported contest results) together with the contract
//! for the external win-probability estimator. The audit engine itself lives
//! in the `audit` crate and never mutates any of these types, with the single
//! exception of [`contest::Ballot::set_actual_value`], which models a ballot
//! re-interpretation performed by the election data source.

pub mod contest;
pub mod estimator;

pub use contest::{Ballot, CandidateSet, Choice, Contestant, ContestResult, ElectionFacts};
pub use estimator::{EstimationError, EstimatorOptions, StratumTally, WinProbabilityEstimator};
