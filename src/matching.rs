use uuid::Uuid;

use crate::config::{DynamicTopN, MatchingWeights, PremiumPreference};
use crate::entities::{LevelTier, ScoreStatus};

pub const PEAK_BONUS: f64 = 0.3;
pub const PEAK_BONUS_MIN_SCORE: i64 = 80;
pub const MAX_DISTANCE_FLOOR_KM: f64 = 1.0;
pub const RELIABILITY_PENALTY_SATURATION: f64 = 10.0;

/// A driver under consideration for a trip, with everything the ranking
/// formula needs already loaded.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub driver_id: Uuid,
    pub score: i64,
    pub status: ScoreStatus,
    pub tier: LevelTier,
    pub distance_km: f64,
    pub penalties_30d: i64,
    /// None when the pickup is not inside a premium zone.
    pub premium_eligible: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct MatchingContext {
    pub weights: MatchingWeights,
    pub premium: PremiumPreference,
    pub top_n: DynamicTopN,
    pub is_peak: bool,
    pub in_premium_zone: bool,
    pub passenger_restricted: bool,
    pub max_distance_km: f64,
}

#[derive(Clone, Debug)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub composite: f64,
}

fn status_bonus(status: ScoreStatus) -> f64 {
    match status {
        ScoreStatus::None => 1.0,
        ScoreStatus::Warning => 0.5,
        _ => 0.2,
    }
}

pub fn composite_score(candidate: &Candidate, ctx: &MatchingContext) -> f64 {
    let w = &ctx.weights;

    let score_norm = (candidate.score as f64 / 100.0).clamp(0.0, 1.0);

    let max_distance = ctx.max_distance_km.max(MAX_DISTANCE_FLOOR_KM);
    let distance_score = 1.0 - (candidate.distance_km / max_distance).min(1.0);

    let reliability =
        1.0 - (candidate.penalties_30d as f64 / RELIABILITY_PENALTY_SATURATION).min(1.0);

    let peak = if ctx.is_peak && candidate.score >= PEAK_BONUS_MIN_SCORE {
        PEAK_BONUS
    } else {
        0.0
    };

    let zone = if ctx.in_premium_zone {
        match candidate.premium_eligible {
            Some(true) => {
                ctx.premium.base_bonus + ctx.premium.eligible_additive_bonus.for_tier(candidate.tier)
            }
            _ => -ctx.premium.ineligible_penalty,
        }
    } else {
        0.0
    };

    let mut composite = w.w_score * score_norm
        + w.w_distance * distance_score
        + w.w_reliability * reliability
        + w.w_status * status_bonus(candidate.status)
        + w.w_peak * peak
        + w.w_zone * zone
        + w.w_tier * w.tier_bonus.for_tier(candidate.tier);

    if candidate.status == ScoreStatus::Limited {
        composite -= w.limited_penalty;
    }

    composite
}

/// How many drivers to notify, widened at peak and in premium zones, narrowed
/// for restricted passengers, and always kept inside the configured bounds.
pub fn dynamic_top_n(ctx: &MatchingContext) -> usize {
    let cfg = &ctx.top_n;

    let mut n = cfg.base;
    if ctx.is_peak {
        n += cfg.peak_add;
    }
    if ctx.in_premium_zone {
        n += cfg.premium_zone_add;
    }
    if ctx.passenger_restricted {
        n = n.min(cfg.restricted_passenger_cap);
    }

    n.clamp(cfg.min, cfg.max)
}

fn sort_ranked(ranked: &mut [RankedCandidate]) {
    ranked.sort_by(|a, b| {
        b.composite
            .partial_cmp(&a.composite)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.candidate.score.cmp(&a.candidate.score))
            .then_with(|| a.candidate.driver_id.cmp(&b.candidate.driver_id))
    });
}

/// Ranks candidates and selects who gets notified. Blocked drivers never make
/// the list; Limited drivers are capped to a share of the slots; a couple of
/// slots are reserved for the highest tiers when they are available at all.
pub fn rank_candidates(candidates: Vec<Candidate>, ctx: &MatchingContext) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .filter(|c| c.status != ScoreStatus::Blocked)
        .map(|candidate| {
            let composite = composite_score(&candidate, ctx);
            RankedCandidate { candidate, composite }
        })
        .collect();

    sort_ranked(&mut ranked);

    let n = dynamic_top_n(ctx);
    let limited_cap = (n as f64 * ctx.top_n.limited_max_share).ceil() as usize;

    let mut selected: Vec<RankedCandidate> = Vec::with_capacity(n);
    let mut overflow: Vec<RankedCandidate> = Vec::new();
    let mut limited_taken = 0usize;

    for rc in ranked {
        if selected.len() >= n {
            overflow.push(rc);
            continue;
        }
        if rc.candidate.status == ScoreStatus::Limited {
            if limited_taken >= limited_cap {
                overflow.push(rc);
                continue;
            }
            limited_taken += 1;
        }
        selected.push(rc);
    }

    reserve_high_tiers(&mut selected, &mut overflow, ctx, limited_cap);
    sort_ranked(&mut selected);
    selected
}

/// Swaps the weakest Bronze or Limited selections for the strongest Diamond
/// and Gold candidates left outside, up to the configured reserve counts.
fn reserve_high_tiers(
    selected: &mut Vec<RankedCandidate>,
    overflow: &mut Vec<RankedCandidate>,
    ctx: &MatchingContext,
    limited_cap: usize,
) {
    for (tier, reserve) in [
        (LevelTier::Diamond, ctx.top_n.reserve_diamond),
        (LevelTier::Gold, ctx.top_n.reserve_gold),
    ] {
        loop {
            let have = selected
                .iter()
                .filter(|rc| rc.candidate.tier == tier)
                .count();
            if have >= reserve {
                break;
            }

            let incoming_idx = overflow
                .iter()
                .enumerate()
                .filter(|(_, rc)| rc.candidate.tier == tier)
                .max_by(|(_, a), (_, b)| {
                    a.composite
                        .partial_cmp(&b.composite)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i);
            let incoming_idx = match incoming_idx {
                Some(i) => i,
                None => break,
            };

            let victim_idx = selected
                .iter()
                .enumerate()
                .filter(|(_, rc)| {
                    (rc.candidate.tier == LevelTier::Bronze
                        || rc.candidate.status == ScoreStatus::Limited)
                        && rc.candidate.tier < tier
                })
                .min_by(|(_, a), (_, b)| {
                    a.composite
                        .partial_cmp(&b.composite)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i);
            let victim_idx = match victim_idx {
                Some(i) => i,
                None => break,
            };

            // the swap must not push Limited drivers over their cap
            let incoming_limited = overflow[incoming_idx].candidate.status == ScoreStatus::Limited;
            let victim_limited = selected[victim_idx].candidate.status == ScoreStatus::Limited;
            if incoming_limited && !victim_limited {
                let limited_now = selected
                    .iter()
                    .filter(|rc| rc.candidate.status == ScoreStatus::Limited)
                    .count();
                if limited_now >= limited_cap {
                    break;
                }
            }

            let incoming = overflow.remove(incoming_idx);
            let victim = std::mem::replace(&mut selected[victim_idx], incoming);
            overflow.push(victim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MatchingContext {
        MatchingContext {
            weights: MatchingWeights::default(),
            premium: PremiumPreference::default(),
            top_n: DynamicTopN::default(),
            is_peak: false,
            in_premium_zone: false,
            passenger_restricted: false,
            max_distance_km: 5.0,
        }
    }

    fn candidate(score: i64, status: ScoreStatus) -> Candidate {
        Candidate {
            driver_id: Uuid::new_v4(),
            score,
            status,
            tier: LevelTier::Silver,
            distance_km: 2.0,
            penalties_30d: 0,
            premium_eligible: None,
        }
    }

    #[test]
    fn blocked_drivers_are_never_ranked() {
        let blocked = candidate(95, ScoreStatus::Blocked);
        let ok = candidate(50, ScoreStatus::Warning);

        let ranked = rank_candidates(vec![blocked.clone(), ok.clone()], &ctx());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate.driver_id, ok.driver_id);
    }

    #[test]
    fn higher_score_outranks_lower_all_else_equal() {
        let strong = candidate(99, ScoreStatus::None);
        let weak = Candidate {
            score: 20,
            status: ScoreStatus::None,
            ..strong.clone()
        };
        let weak = Candidate {
            driver_id: Uuid::new_v4(),
            ..weak
        };

        let ranked = rank_candidates(vec![weak.clone(), strong.clone()], &ctx());
        assert_eq!(ranked[0].candidate.driver_id, strong.driver_id);
        assert_eq!(ranked[1].candidate.driver_id, weak.driver_id);
    }

    #[test]
    fn closer_driver_scores_higher() {
        let base = candidate(80, ScoreStatus::None);
        let near = Candidate {
            distance_km: 0.5,
            ..base.clone()
        };
        let far = Candidate {
            distance_km: 4.5,
            ..base
        };

        let c = ctx();
        assert!(composite_score(&near, &c) > composite_score(&far, &c));
    }

    #[test]
    fn peak_bonus_requires_high_score() {
        let mut c = ctx();
        c.is_peak = true;

        let high = candidate(85, ScoreStatus::None);
        let mid = Candidate {
            score: 79,
            ..high.clone()
        };

        let without_peak = ctx();
        let high_delta = composite_score(&high, &c) - composite_score(&high, &without_peak);
        let mid_delta = composite_score(&mid, &c) - composite_score(&mid, &without_peak);

        assert!(high_delta > 0.0);
        assert_eq!(mid_delta, 0.0);
    }

    #[test]
    fn premium_zone_rewards_eligible_and_penalizes_the_rest() {
        let mut c = ctx();
        c.in_premium_zone = true;

        let eligible = Candidate {
            premium_eligible: Some(true),
            ..candidate(85, ScoreStatus::None)
        };
        let ineligible = Candidate {
            driver_id: Uuid::new_v4(),
            premium_eligible: Some(false),
            ..eligible.clone()
        };

        assert!(composite_score(&eligible, &c) > composite_score(&ineligible, &c));

        let neutral = ctx();
        assert!(composite_score(&ineligible, &c) < composite_score(&ineligible, &neutral));
    }

    #[test]
    fn top_n_widens_at_peak_and_narrows_for_restricted_passengers() {
        let mut c = ctx();
        assert_eq!(dynamic_top_n(&c), 15);

        c.is_peak = true;
        c.in_premium_zone = true;
        assert_eq!(dynamic_top_n(&c), 23);

        c.passenger_restricted = true;
        assert_eq!(dynamic_top_n(&c), 10);
    }

    #[test]
    fn limited_drivers_are_capped_to_a_share_of_slots() {
        let mut c = ctx();
        c.top_n.base = 10;
        c.top_n.min = 1;

        let mut pool = Vec::new();
        for _ in 0..10 {
            pool.push(candidate(90, ScoreStatus::Limited));
        }
        for _ in 0..10 {
            pool.push(candidate(40, ScoreStatus::Warning));
        }

        let ranked = rank_candidates(pool, &c);
        assert_eq!(ranked.len(), 10);

        let limited = ranked
            .iter()
            .filter(|rc| rc.candidate.status == ScoreStatus::Limited)
            .count();
        // ceil(10 * 0.30) = 3
        assert_eq!(limited, 3);
    }

    #[test]
    fn high_tiers_displace_weak_bronze_selections() {
        let mut c = ctx();
        c.top_n.base = 3;
        c.top_n.min = 1;
        c.top_n.reserve_gold = 1;
        c.top_n.reserve_diamond = 0;

        let bronze = |score| Candidate {
            tier: LevelTier::Bronze,
            ..candidate(score, ScoreStatus::None)
        };
        let gold = Candidate {
            tier: LevelTier::Gold,
            ..candidate(30, ScoreStatus::None)
        };

        let ranked = rank_candidates(vec![bronze(90), bronze(85), bronze(80), gold.clone()], &c);
        assert_eq!(ranked.len(), 3);
        assert!(ranked
            .iter()
            .any(|rc| rc.candidate.driver_id == gold.driver_id));
        // the weakest bronze was the one displaced
        assert!(ranked.iter().all(|rc| rc.candidate.score != 80
            || rc.candidate.driver_id == gold.driver_id));
    }
}
