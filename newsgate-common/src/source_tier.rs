//! Source-tier scoring for the classifier's priority score (spec §4.4 step 3).

/// Fixed table keyed by host substring. Checked in declaration order; the
/// first matching substring wins. Unknown hosts score 0.5.
const TIERS: &[(&str, f64)] = &[
    ("admin.ch", 3.0),
    ("finma.ch", 3.0),
    ("seco.admin.ch", 3.0),
    ("snb.ch", 3.0),
    ("finews.ch", 2.0),
    ("cash.ch", 2.0),
    ("fuw.ch", 2.0),
    ("moneycab.com", 2.0),
    ("nzz.ch", 1.0),
    ("srf.ch", 1.0),
    ("tagesanzeiger.ch", 1.0),
    ("bluewin.ch", 1.0),
    ("watson.ch", 1.0),
];

pub fn source_tier_score(host: &str) -> f64 {
    let lower = host.to_lowercase();
    TIERS
        .iter()
        .find(|(substr, _)| lower.contains(substr))
        .map(|(_, score)| *score)
        .unwrap_or(0.5)
}

/// Freshness decay: 1.0 at 0 days old, -0.1 per day, floored at 0.1.
pub fn freshness_decay(age_days: i64) -> f64 {
    (1.0 - 0.1 * age_days as f64).max(0.1)
}

/// Full priority score for a candidate (spec §4.4 step 3).
pub fn priority_score(host: &str, age_days: i64, url_path: &str, query: &str) -> f64 {
    let mut score = source_tier_score(host) + freshness_decay(age_days);
    if url_path.contains("/artikel/") || url_path.contains("/news/") {
        score += 0.3;
    }
    if !query.is_empty() && query.split('&').all(|p| !p.trim().is_empty()) && query.len() < 40 {
        score += 0.2;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_government_host_scores_highest() {
        assert_eq!(source_tier_score("www.admin.ch"), 3.0);
    }

    #[test]
    fn unknown_host_scores_default() {
        assert_eq!(source_tier_score("example.com"), 0.5);
    }

    #[test]
    fn freshness_decay_floors_at_point_one() {
        assert_eq!(freshness_decay(0), 1.0);
        assert!((freshness_decay(5) - 0.5).abs() < 1e-9);
        assert_eq!(freshness_decay(100), 0.1);
    }

    #[test]
    fn priority_score_rewards_artikel_path() {
        let with_path = priority_score("nzz.ch", 0, "/artikel/123", "");
        let without_path = priority_score("nzz.ch", 0, "/other/123", "");
        assert!(with_path > without_path);
    }
}
