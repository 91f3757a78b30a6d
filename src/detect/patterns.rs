//! Fixed regex families and denylists shared by the classifier, the roll
//! detector, and the validator.

use regex::Regex;
use std::sync::LazyLock;

/// Known host-read sponsor brands.
pub static SPONSOR_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)betterhelp|athletic\s*greens|ag1|squarespace|nordvpn|",
        r"expressvpn|hellofresh|audible|masterclass|ziprecruiter|",
        r"raycon|manscaped|stamps\.com|indeed|linkedin|",
        r"casper|helix|brooklinen|bombas|calm|headspace|",
        r"better\s*help|honey|simplisafe|wix|shopify|",
        r"bluechew|roman|hims|keeps|factor|noom|",
        r"magic\s*spoon|athletic\s*brewing|liquid\s*iv",
    ))
    .expect("sponsor regex")
});

/// Promo-code / call-to-action phrasing that marks ad copy.
pub static AD_SIGNAL_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)promo\s*code|use\s+code\s+\w+|\.com/\w+|",
        r"percent\s+off|free\s+(trial|shipping)|",
        r"link\s+in\s+(the\s+)?(show\s+)?notes|",
        r"sponsored\s+by|brought\s+to\s+you|",
        r"check\s+(them\s+)?out\s+at|visit\s+\w+\.com|",
        r"download\s+(the\s+)?app|sign\s+up\s+(today|now)",
    ))
    .expect("ad signal regex")
});

/// Reasons that indicate the LLM decided a span is NOT an ad.
pub static NOT_AD_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)not\s+an?\s+(ad|advertisement|sponsor|promo|commercial)|",
        r"(episode|show|regular|actual)\s+content|",
        r"this\s+is\s+(not|n't)\s+|",
        r"does\s+not\s+appear\s+to\s+be|",
        r"no\s+(ad|advertisement|sponsor)|",
        r"false\s+positive",
    ))
    .expect("not-ad regex")
});

/// Transition phrases that open a sponsor read; used to pull an ad's start
/// boundary back onto the actual lead-in.
pub static TRANSITION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)brought\s+to\s+you\s+by",
        r"(?i)this\s+episode\s+is\s+sponsored\s+by",
        r"(?i)support\s+for\s+this\s+(show|podcast)\s+comes\s+from",
        r"(?i)sponsored\s+by",
        r"(?i)today'?s\s+sponsor",
        r"(?i)a\s+word\s+from\s+our\s+sponsors?",
        r"(?i)take\s+a\s+(quick\s+)?break",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("transition regex"))
    .collect()
});

/// Show-start phrases (pre-roll detector searches forward for these).
pub static SHOW_START_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)welcome (back )?(to|everyone)",
        r"(?i)(i'm|i am)\s+\w+[.,]\s+(and\s+)?(i'm|i am)",
        r"(?i)hello and welcome",
        r"(?i)hey (everyone|guys|folks|there)",
        r"(?i)(this is|you're listening to)\s+",
        r"(?i)episode\s+\d+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("show-start regex"))
    .collect()
});

/// Sign-off phrases (post-roll detector searches backward for these).
pub static SIGNOFF_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)see you next (week|time|episode)",
        r"(?i)(thanks?|thank you)\s+(for\s+)?(tuning in|listening|watching|joining)",
        r"(?i)until next (week|time)",
        r"(?i)bye[\s-]*bye",
        r"(?i)that'?s (all|it) for (today|this (week|episode)|now)",
        r"(?i)take care\b",
        r"(?i)catch you (next|later|soon)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("sign-off regex"))
    .collect()
});

/// Ad indicators: URLs, phone numbers, promo phrasing. The roll detector
/// requires at least two distinct families to match.
pub static AD_INDICATOR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\w+\.(com|org|edu|net|io)\b",
        r"(?i)\w+\.(com|org|edu|net|io)\s+slash\s+",
        r"1-\d{3}",
        r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b",
        r"(?i)(visit|go to|head to|check out)\s+(us\s+at\s+)?\w+\.",
        r"(?i)(sign up|try it|get started|apply|subscribe)\s+(now|today|at|for free)",
        r"(?i)(use|with)\s+(code|promo)",
        r"(?i)free trial",
        r"(?i)(sponsored|brought to you|presented)\s+by",
        r"(?i)advertising inquiries",
        r"(?i)privacy\s+(&|and)\s+opt.out",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("ad indicator regex"))
    .collect()
});

/// `href` domains in an episode description, e.g. `betterhelp.com/promo`.
pub static HREF_DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href=["']?(?:https?://)?(?:www\.)?([a-z0-9-]+)\.(?:com|io|co|net|org)"#)
        .expect("href domain regex")
});

/// Domains that appear in descriptions but are never sponsors.
pub const NON_SPONSOR_DOMAINS: &[&str] = &[
    "redcircle",
    "twitter",
    "instagram",
    "youtube",
    "facebook",
    "apple",
    "spotify",
];

/// Vague reasons that earn a confidence penalty.
pub const VAGUE_REASONS: &[&str] = &[
    "advertisement",
    "ad detected",
    "sponsor",
    "promotional content",
    "possible ad",
    "likely ad",
    "advertisement segment",
];

/// Sponsor values that indicate extraction failure or garbage data.
pub const INVALID_SPONSOR_VALUES: &[&str] = &[
    "none",
    "unknown",
    "null",
    "n/a",
    "na",
    "",
    "no",
    "yes",
    "ad",
    "ads",
    "sponsor",
    "sponsors",
    "advertisement",
    "advertisements",
    "multiple",
    "various",
    "detected",
    "advertisement detected",
    "host read",
    "host-read",
    "mid-roll",
    "pre-roll",
    "post-roll",
];

/// Common English words a sponsor-capture regex must never return.
pub const INVALID_SPONSOR_CAPTURE_WORDS: &[&str] = &[
    "not",
    "no",
    "this",
    "that",
    "the",
    "a",
    "an",
    "another",
    "consistent",
    "possible",
    "potential",
    "likely",
    "seems",
    "is",
    "was",
    "are",
    "were",
    "with",
    "from",
    "for",
    "by",
    "clear",
    "any",
    "some",
    "host",
    "their",
    "its",
    "our",
];

/// Ordered field names checked for the sponsor/advertiser name.
pub const SPONSOR_PRIORITY_FIELDS: &[&str] = &[
    "sponsor_name",
    "advertiser",
    "sponsor",
    "brand",
    "company",
    "product",
    "name",
];

/// Alternate field names the LLM uses for start/end timestamps.
pub const START_FIELD_ALIASES: &[&str] = &[
    "start",
    "start_time",
    "start_timestamp",
    "ad_start_timestamp",
    "start_seconds",
    "start_time_seconds",
];

pub const END_FIELD_ALIASES: &[&str] = &[
    "end",
    "end_time",
    "end_timestamp",
    "ad_end_timestamp",
    "end_seconds",
    "end_time_seconds",
];

/// True if `value` is a junk sponsor name.
pub fn is_invalid_sponsor(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    INVALID_SPONSOR_VALUES.contains(&lower.as_str())
        || lower
            .split_whitespace()
            .next()
            .is_some_and(|w| INVALID_SPONSOR_CAPTURE_WORDS.contains(&w))
}

/// Count distinct ad-indicator families matching `text`.
pub fn count_ad_indicators(text: &str) -> usize {
    AD_INDICATOR_PATTERNS
        .iter()
        .filter(|p| p.is_match(text))
        .count()
}
