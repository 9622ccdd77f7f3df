//! Decision policy: turns scored candidates into one outcome.

use crate::config::MatchingPolicy;
use crate::matching::scorer::ScoredCandidate;
use crate::models::MatchResult;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub outcome: MatchResult,
    /// Best candidate after ranking, present whenever there was one.
    /// Only a `Matched` decision may be applied.
    pub top: Option<ScoredCandidate>,
    /// Score of the runner-up, for audit notes.
    pub runner_up_total: Option<i32>,
}

impl Decision {
    /// The charge to apply, only for `Matched`.
    pub fn chosen(&self) -> Option<&ScoredCandidate> {
        match self.outcome {
            MatchResult::Matched => self.top.as_ref(),
            _ => None,
        }
    }
}

/// Highest total first; ties go to the earlier due date, then the lower charge id.
pub fn rank(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.charge.due_date.cmp(&b.charge.due_date))
            .then_with(|| a.charge.charge_id.cmp(&b.charge.charge_id))
    });
}

pub fn decide(policy: &MatchingPolicy, mut candidates: Vec<ScoredCandidate>) -> Decision {
    rank(&mut candidates);
    let runner_up_total = candidates.get(1).map(|c| c.total);
    let Some(top) = candidates.into_iter().next() else {
        return Decision {
            outcome: MatchResult::NoMatch,
            top: None,
            runner_up_total: None,
        };
    };

    let outcome = if top.total < policy.auto_match_threshold {
        MatchResult::Skipped
    } else {
        match runner_up_total.map(|second| (top.total - second).cmp(&policy.tie_margin)) {
            Some(Ordering::Less) => MatchResult::MultipleCandidates,
            _ => MatchResult::Matched,
        }
    };

    Decision {
        outcome,
        top: Some(top),
        runner_up_total,
    }
}
