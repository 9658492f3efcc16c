// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Free & Fair
// See LICENSE.md for details

//! Contestants, choices, ballots and reported contest results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A real contestant in the contest under audit.
///
/// Identity is the full `(id, name)` pair; two contestants with the same id
/// but different names are considered distinct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Contestant {
    pub id: u32,
    pub name: String,
}

impl Contestant {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Contestant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/**
 * A single interpretation of a ballot: either a vote for a real contestant,
 * one of the two invalid-vote markers, or the write-in pseudo-candidate.
 *
 * `Overvote` and `Undervote` are distinguished identifiers rather than
 * ordinary candidates: they can never win and sequential-test statistics are
 * not updated for them. `WriteIn` is a countable pseudo-candidate that
 * participates in tallies but carries no reported vote share.
 */
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Choice {
    Candidate(Contestant),
    Overvote,
    Undervote,
    WriteIn,
}

impl Choice {
    /// True for the two invalid-vote markers.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Choice::Overvote | Choice::Undervote)
    }

    /// The underlying contestant, if this is a vote for a real contestant.
    pub fn contestant(&self) -> Option<&Contestant> {
        match self {
            Choice::Candidate(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Candidate(c) => write!(f, "{}", c.name),
            Choice::Overvote => write!(f, "overvote"),
            Choice::Undervote => write!(f, "undervote"),
            Choice::WriteIn => write!(f, "Write-in"),
        }
    }
}

/// Reported outcome for one contestant: vote share in `[0, 1]` and the raw
/// vote count. Shares across a contest, including the overvote, undervote and
/// write-in buckets, sum to at most 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestResult {
    pub contestant: Contestant,
    pub share: f64,
    pub votes: u64,
}

impl ContestResult {
    pub fn new(contestant: Contestant, share: f64, votes: u64) -> Self {
        Self {
            contestant,
            share,
            votes,
        }
    }
}

/// One audited ballot: the interpretation recorded at tabulation time and the
/// interpretation produced by hand examination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    reported: Choice,
    actual: Choice,
}

impl Ballot {
    pub fn new(reported: Choice, actual: Choice) -> Self {
        Self { reported, actual }
    }

    pub fn reported_value(&self) -> &Choice {
        &self.reported
    }

    pub fn actual_value(&self) -> &Choice {
        &self.actual
    }

    /// Replace the hand interpretation. Only the election data source calls
    /// this, when a ballot is re-examined; the audit engine never does.
    pub fn set_actual_value(&mut self, actual: Choice) {
        self.actual = actual;
    }
}

/**
 * The ordered candidate universe for one audit run.
 *
 * Real contestants are ordered by descending reported share, followed by the
 * three pseudo-candidates in the fixed order overvote, undervote, Write-in.
 * The order is established once per `init` and never changes for the life of
 * the run; contingency tables and estimator tally vectors are all aligned
 * with it.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSet {
    winner: Contestant,
    losers: Vec<Contestant>,
    choices: Vec<Choice>,
}

impl CandidateSet {
    /// Build the candidate set from reported results. Returns `None` when the
    /// result list is empty.
    pub fn from_results(results: &[ContestResult]) -> Option<Self> {
        let mut sorted: Vec<&ContestResult> = results.iter().collect();
        sorted.sort_by(|a, b| b.share.total_cmp(&a.share));

        let winner = sorted.first()?.contestant.clone();
        let losers: Vec<Contestant> = sorted[1..].iter().map(|r| r.contestant.clone()).collect();

        let mut choices: Vec<Choice> = sorted
            .iter()
            .map(|r| Choice::Candidate(r.contestant.clone()))
            .collect();
        choices.extend([Choice::Overvote, Choice::Undervote, Choice::WriteIn]);

        Some(Self {
            winner,
            losers,
            choices,
        })
    }

    /// The reported winner (highest share).
    pub fn winner(&self) -> &Contestant {
        &self.winner
    }

    /// Real contestants other than the winner, by descending share.
    pub fn losers(&self) -> &[Contestant] {
        &self.losers
    }

    /// All choices in canonical order, pseudo-candidates last.
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    /// Number of real contestants in the contest.
    pub fn contestant_count(&self) -> usize {
        self.losers.len() + 1
    }

    /// True when `choice` is a vote for the reported winner.
    pub fn is_winner(&self, choice: &Choice) -> bool {
        choice.contestant() == Some(&self.winner)
    }
}

/// Read-only election facts handed to `init`: the reported results, the total
/// ballot count and, for comparison audits, the cast-vote-record tally per
/// reported choice (the stratum sizes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionFacts {
    pub results: Vec<ContestResult>,
    pub ballot_count: u64,
    pub reported_tallies: BTreeMap<Choice, u64>,
}

impl ElectionFacts {
    pub fn new(results: Vec<ContestResult>, ballot_count: u64) -> Self {
        Self {
            results,
            ballot_count,
            reported_tallies: BTreeMap::new(),
        }
    }

    pub fn with_reported_tallies(mut self, tallies: BTreeMap<Choice, u64>) -> Self {
        self.reported_tallies = tallies;
        self
    }
}
