//! URL normalization and stable content-addressable hashing (C1).

use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use url::Url;

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
    "gclid",
    "fbclid",
    "dclid",
    "gbraid",
    "wbraid",
];

/// Lowercase the whole URL, strip the fragment, drop tracking query
/// parameters (the fixed set above plus any key prefixed `WT.`), and
/// re-encode the remaining parameters in sorted-key order.
///
/// Falls back to a plain lowercase-and-trim of the input if the URL cannot
/// be parsed at all (callers treat an unparsable URL as its own normalized
/// form so hashing is still defined and idempotent).
pub fn normalize_url(raw_url: &str) -> String {
    let lowered = raw_url.to_lowercase();
    let Ok(mut parsed) = Url::parse(&lowered) else {
        return lowered.trim().to_string();
    };

    let mut kept: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, v) in parsed.query_pairs() {
        let key = k.into_owned();
        if TRACKING_PARAMS.contains(&key.as_str()) || key.starts_with("wt.") {
            continue;
        }
        kept.entry(key).or_default().push(v.into_owned());
    }

    parsed.set_fragment(None);
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let mut pairs = url::form_urlencoded::Serializer::new(String::new());
        for (k, values) in &kept {
            for v in values {
                pairs.append_pair(k, v);
            }
        }
        parsed.set_query(Some(&pairs.finish()));
    }

    parsed.to_string()
}

/// `url_hash = SHA1(normalize_url(raw_url))`, hex-encoded.
pub fn url_hash(raw_url: &str) -> String {
    let normalized = normalize_url(raw_url);
    let mut hasher = Sha1::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

fn word_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\w+").expect("static regex"))
}

/// Tokenize a title into its lowercased `\w+` word tokens.
fn title_tokens(title: &str) -> std::collections::HashSet<String> {
    let lowered = title.to_lowercase();
    word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Jaccard similarity over word tokens of two lowercased titles.
/// Two empty token sets are defined as fully similar (1.0); one empty and
/// one non-empty set are defined as fully dissimilar (0.0).
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let set_a = title_tokens(a);
    let set_b = title_tokens(b);
    jaccard(&set_a, &set_b)
}

fn jaccard(a: &std::collections::HashSet<String>, b: &std::collections::HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
