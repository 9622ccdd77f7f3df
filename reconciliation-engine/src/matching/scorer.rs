//! Multi-factor confidence scoring of a (transaction, charge) pair.
//!
//! Each factor is scored independently against its configured weight; the
//! sum is capped at 100. The result is a heuristic, not a probability.

use crate::config::MatchingPolicy;
use crate::matching::text::{
    best_token_similarity, name_tokens, normalize_iban, normalize_text, similarity,
};
use crate::models::{BankTransaction, Charge, ChargeCandidate, PayerProfile, ScoreFactors};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// Share of the name weight earned by the family name alone.
const LAST_NAME_SHARE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub charge: Charge,
    pub payer: PayerProfile,
    pub factors: ScoreFactors,
    pub total: i32,
}

/// Score one candidate. Pure and deterministic.
pub fn score(
    policy: &MatchingPolicy,
    transaction: &BankTransaction,
    candidate: &ChargeCandidate,
) -> ScoredCandidate {
    let charge = &candidate.charge;
    let payer = &candidate.payer;
    let factors = ScoreFactors {
        iban: iban_points(
            policy,
            transaction.counterparty_iban.as_deref(),
            payer.iban.as_deref(),
        ),
        name: name_points(policy, transaction, payer),
        amount: amount_points(policy, transaction.amount, charge.outstanding()),
        date: date_points(policy, transaction.booking_date, charge.due_date),
        purpose: purpose_points(policy, transaction.purpose.as_deref(), candidate),
    };

    ScoredCandidate {
        charge: charge.clone(),
        payer: payer.clone(),
        total: factors.total(),
        factors,
    }
}

pub fn score_all(
    policy: &MatchingPolicy,
    transaction: &BankTransaction,
    candidates: &[ChargeCandidate],
) -> Vec<ScoredCandidate> {
    candidates
        .iter()
        .map(|candidate| score(policy, transaction, candidate))
        .collect()
}

fn iban_points(
    policy: &MatchingPolicy,
    counterparty: Option<&str>,
    on_file: Option<&str>,
) -> i32 {
    match (counterparty.map(normalize_iban), on_file.map(normalize_iban)) {
        (Some(a), Some(b)) if !a.is_empty() && a == b => policy.weights.iban,
        _ => 0,
    }
}

/// Mean similarity of `wanted` tokens found in `present`; tokens below the
/// threshold contribute nothing.
fn token_overlap(wanted: &[String], present: &[String], threshold: f64) -> f64 {
    if wanted.is_empty() {
        return 0.0;
    }
    let sum: f64 = wanted
        .iter()
        .map(|token| {
            let best = best_token_similarity(token, present);
            if best >= threshold {
                best
            } else {
                0.0
            }
        })
        .sum();
    sum / wanted.len() as f64
}

fn name_ratio(policy: &MatchingPolicy, text: &str, payer: &PayerProfile) -> f64 {
    let present = name_tokens(text);
    if present.is_empty() {
        return 0.0;
    }
    let threshold = policy.name_token_similarity;
    let last = token_overlap(&name_tokens(&payer.last_name), &present, threshold);
    let first_tokens = payer
        .first_name
        .as_deref()
        .map(name_tokens)
        .unwrap_or_default();

    let by_tokens = if first_tokens.is_empty() {
        last
    } else {
        let first = token_overlap(&first_tokens, &present, threshold);
        LAST_NAME_SHARE * last + (1.0 - LAST_NAME_SHARE) * first
    };

    let whole = similarity(&normalize_text(text), &normalize_text(&payer.full_name()));
    if whole >= threshold {
        by_tokens.max(whole)
    } else {
        by_tokens
    }
}

fn name_points(
    policy: &MatchingPolicy,
    transaction: &BankTransaction,
    payer: &PayerProfile,
) -> i32 {
    let from_counterparty = transaction
        .counterparty_name
        .as_deref()
        .map(|name| name_ratio(policy, name, payer))
        .unwrap_or(0.0);
    // A name in the purpose line is weaker evidence than the account holder.
    let from_purpose = transaction
        .purpose
        .as_deref()
        .map(|purpose| name_ratio(policy, purpose, payer) * LAST_NAME_SHARE)
        .unwrap_or(0.0);

    let ratio = from_counterparty.max(from_purpose).clamp(0.0, 1.0);
    (ratio * f64::from(policy.weights.name) + 1e-9).floor() as i32
}

fn amount_points(policy: &MatchingPolicy, amount: Decimal, outstanding: Decimal) -> i32 {
    if outstanding <= Decimal::ZERO {
        return 0;
    }
    let weight = policy.weights.amount;
    let diff = (amount - outstanding).abs();
    if diff <= policy.amount_tolerance {
        return weight;
    }

    let band = outstanding * policy.amount_band_percent / Decimal::ONE_HUNDRED;
    if diff >= band {
        return 0;
    }
    (Decimal::from(weight) * (Decimal::ONE - diff / band))
        .floor()
        .to_i32()
        .unwrap_or(0)
}

fn date_points(policy: &MatchingPolicy, booking_date: NaiveDate, due_date: NaiveDate) -> i32 {
    let weight = i64::from(policy.weights.date);
    // Positive when the payment was booked after the due date.
    let offset = (booking_date - due_date).num_days();
    let distance = offset.abs();
    if distance <= policy.on_time_days {
        return weight as i32;
    }

    let limit = if offset > 0 {
        policy.max_days_late
    } else {
        policy.max_days_early
    };
    if distance >= limit || limit <= policy.on_time_days {
        return 0;
    }
    (weight * (limit - distance) / (limit - policy.on_time_days)) as i32
}

fn contains_token_run(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

fn purpose_points(
    policy: &MatchingPolicy,
    purpose: Option<&str>,
    candidate: &ChargeCandidate,
) -> i32 {
    let Some(purpose) = purpose.map(normalize_text).filter(|p| !p.is_empty()) else {
        return 0;
    };
    let compact_purpose = purpose.replace(' ', "");

    let tenant_id = candidate.payer.tenant_id.to_string();
    let identifiers = [
        candidate.charge.reference.as_deref(),
        candidate.payer.lease_reference.as_deref(),
        candidate.payer.unit_label.as_deref(),
        Some(tenant_id.as_str()),
    ];

    let referenced = identifiers.into_iter().flatten().any(|raw| {
        let ident = normalize_text(raw);
        if ident.chars().count() < 2 {
            return false;
        }
        let compact = ident.replace(' ', "");
        contains_token_run(&purpose, &ident)
            || (compact.len() >= 6 && compact_purpose.contains(&compact))
    });
    if referenced {
        return policy.weights.purpose;
    }

    let keyword = policy
        .rent_keywords
        .iter()
        .map(|k| normalize_text(k))
        .any(|k| contains_token_run(&purpose, &k));
    if keyword {
        policy.rent_keyword_points.min(policy.weights.purpose)
    } else {
        0
    }
}
