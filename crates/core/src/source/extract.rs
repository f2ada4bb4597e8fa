//! Heuristic cause-of-death extraction from free text.
//!
//! Every phrase pattern that matches contributes its weight to the cause it
//! captured; weights combine by noisy-or so repeated, independent mentions
//! raise confidence without ever reaching certainty.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::CauseCandidate;

/// Ceiling for any heuristic score.
pub const MAX_HEURISTIC_SCORE: f64 = 0.95;

const MAX_CAUSE_WORDS: usize = 8;

struct Pattern {
    regex: Regex,
    weight: f64,
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    const CAUSE: &str = r"(?P<cause>[^.,;:!?()\n]{3,120})";
    [
        (format!(r"(?i)\bcause of death (?:was|is|has been|had been)\s+(?:(?:listed|given|ruled|determined) as\s+)?{CAUSE}"), 0.75),
        (format!(r"(?i)\bdeath was (?:caused by|due to|attributed to|the result of)\s+{CAUSE}"), 0.7),
        (format!(r"(?i)\bdied (?:of|from)\s+{CAUSE}"), 0.6),
        (format!(r"(?i)\bsuccumbed to\s+{CAUSE}"), 0.55),
        (format!(r"(?i)\bcomplications (?:of|from|related to)\s+{CAUSE}"), 0.45),
        (format!(r"(?i)\bafter an? (?:long |brief |short |lengthy |years-long |private )?(?:battle|fight|struggle) (?:with|against)\s+{CAUSE}"), 0.5),
    ]
    .into_iter()
    .filter_map(|(pattern, weight)| Regex::new(&pattern).ok().map(|regex| Pattern { regex, weight }))
    .collect()
});

/// Words that end the cause phrase.
const BOUNDARIES: &[&str] = &[
    " at ", " in ", " on ", " after ", " while ", " aged ", " age ", " surrounded ",
    " and was ", " and is ", " and had ", " said ", " according ", " last ", " earlier ",
    " this ", " who ", " which ", " that ", " when ", " since ", " following ", " before ",
];

const LEADING_NOISE: &[&str] = &[
    "a ", "an ", "the ", "his ", "her ", "their ", "what was described as ", "what appeared to be ",
];

const NON_CAUSES: &[&str] = &[
    "unknown", "undisclosed", "unspecified", "unrevealed", "it", "this", "that", "him", "her",
];

/// Extract ranked cause candidates from `text`.
///
/// When `subject` is given, only sentences that mention the subject's
/// surname, or continue with a pronoun, are considered.
pub fn extract_causes(text: &str, subject: Option<&str>) -> Vec<CauseCandidate> {
    let surname = subject
        .and_then(|name| name.split_whitespace().last())
        .map(|s| s.to_lowercase());

    let mut scores: HashMap<String, (f64, usize, String)> = HashMap::new();
    let mut order = 0usize;

    for sentence in split_sentences(text) {
        if let Some(surname) = &surname {
            if !about_subject(sentence, surname) {
                continue;
            }
        }
        for pattern in PATTERNS.iter() {
            for caps in pattern.regex.captures_iter(sentence) {
                let Some(raw) = caps.name("cause") else {
                    continue;
                };
                let prefix_complications = caps
                    .get(0)
                    .map(|m| m.as_str().to_lowercase().starts_with("complications"))
                    .unwrap_or(false);
                let Some(mut cause) = normalize_cause(raw.as_str()) else {
                    continue;
                };
                if prefix_complications {
                    cause = format!("complications of {}", cause);
                }
                let cause = canonical_complications(&cause);
                let entry = scores.entry(cause).or_insert_with(|| {
                    order += 1;
                    (0.0, order, sentence.trim().to_string())
                });
                entry.0 = 1.0 - (1.0 - entry.0) * (1.0 - pattern.weight);
            }
        }
    }

    let mut ranked: Vec<(String, f64, usize, String)> = scores
        .into_iter()
        .map(|(cause, (score, order, evidence))| (cause, score.min(MAX_HEURISTIC_SCORE), order, evidence))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.2.cmp(&b.2))
    });

    ranked
        .into_iter()
        .map(|(cause, score, _, evidence)| CauseCandidate::new(cause, score).with_evidence(evidence))
        .collect()
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\n', '.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
}

fn about_subject(sentence: &str, surname: &str) -> bool {
    let lower = sentence.trim_start().to_lowercase();
    lower.contains(surname)
        || ["he ", "she ", "they ", "his ", "her "]
            .iter()
            .any(|p| lower.starts_with(p))
}

/// Cut a captured phrase down to the cause itself.
fn normalize_cause(raw: &str) -> Option<String> {
    let mut cause = format!(" {} ", raw.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" "));
    for boundary in BOUNDARIES {
        if let Some(idx) = cause.find(boundary) {
            cause.truncate(idx);
            cause.push(' ');
        }
    }
    let mut cause = cause.trim().to_string();

    loop {
        let before = cause.len();
        for noise in LEADING_NOISE {
            if let Some(rest) = cause.strip_prefix(noise) {
                cause = rest.to_string();
            }
        }
        if cause.len() == before {
            break;
        }
    }

    let cause = cause.trim_matches(|c: char| !c.is_alphanumeric()).to_string();
    let words = cause.split_whitespace().count();
    if cause.len() < 3 || words == 0 || words > MAX_CAUSE_WORDS {
        return None;
    }
    if NON_CAUSES.iter().any(|n| cause == *n || cause.starts_with(&format!("{} ", n))) {
        return None;
    }
    if !cause.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    Some(cause)
}

fn canonical_complications(cause: &str) -> String {
    for prefix in ["complications from ", "complications related to "] {
        if let Some(rest) = cause.strip_prefix(prefix) {
            return format!("complications of {}", rest);
        }
    }
    cause.to_string()
}

static SCRIPT_STYLE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>").ok());
static BLOCK_BREAK: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)<(?:br|/p|/div|/li|/h[1-6]|/tr|/article)[^>]*>").ok());
static TAG: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").ok());

/// Reduce an HTML document to readable text, one block per line.
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();
    if let Some(re) = SCRIPT_STYLE.as_ref() {
        text = re.replace_all(&text, " ").into_owned();
    }
    if let Some(re) = BLOCK_BREAK.as_ref() {
        text = re.replace_all(&text, "\n").into_owned();
    }
    if let Some(re) = TAG.as_ref() {
        text = re.replace_all(&text, " ").into_owned();
    }
    let text = decode_entities(&text);

    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&rsquo;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_died_of_with_trailing_location() {
        let causes = extract_causes("He died of pancreatic cancer at his home in Malibu.", None);
        assert_eq!(causes.len(), 1);
        assert_eq!(causes[0].cause, "pancreatic cancer");
        assert!((causes[0].score - 0.6).abs() < 1e-9);
        assert!(causes[0].evidence.as_deref().unwrap().contains("Malibu"));
    }

    #[test]
    fn test_repeated_mentions_combine() {
        let causes = extract_causes(
            "She died of heart failure. Her cause of death was heart failure, her son said.",
            None,
        );
        assert_eq!(causes[0].cause, "heart failure");
        // 1 - (1 - 0.6) * (1 - 0.75)
        assert!((causes[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_capped() {
        let text = "He died of a stroke. He died of a stroke. His cause of death was a stroke. \
                    His death was caused by a stroke. He succumbed to a stroke.";
        let causes = extract_causes(text, None);
        assert_eq!(causes[0].cause, "stroke");
        assert_eq!(causes[0].score, MAX_HEURISTIC_SCORE);
    }

    #[test]
    fn test_complications_are_normalized() {
        let causes = extract_causes("She died from complications from pneumonia on Monday.", None);
        assert_eq!(causes[0].cause, "complications of pneumonia");
        // both "died from" and "complications from" point at the same cause
        assert!(causes[0].score > 0.6);
    }

    #[test]
    fn test_competing_causes_are_ranked() {
        let causes = extract_causes(
            "Reports said he died of a heart attack. The coroner said his death was caused by an overdose. \
             The cause of death was an overdose.",
            None,
        );
        assert_eq!(causes[0].cause, "overdose");
        assert_eq!(causes[1].cause, "heart attack");
        assert!(causes[0].score > causes[1].score);
    }

    #[test]
    fn test_undisclosed_causes_are_ignored() {
        assert!(extract_causes("He died of undisclosed causes.", None).is_empty());
        assert!(extract_causes("No details were released.", None).is_empty());
    }

    #[test]
    fn test_subject_filter() {
        let text = "Smith's co-star died of lung cancer in 2010\nJane Smith died of a stroke.";
        let causes = extract_causes(text, Some("Jane Smith"));
        assert_eq!(causes.len(), 2);

        let causes = extract_causes("The neighbour Bob Jones died of lung cancer.", Some("Jane Smith"));
        assert!(causes.is_empty());
    }

    #[test]
    fn test_html_to_text() {
        let html = r#"<html><head><style>p { color: red }</style><script>var x = "died of";</script></head>
            <body><h1>Obituary</h1><p>Jane Doe&nbsp;died of <b>heart failure</b>.</p><p>Tom &amp; Jerry</p></body></html>"#;
        let text = html_to_text(html);
        assert!(!text.contains("color"));
        assert!(!text.contains("var x"));
        assert!(text.contains("Jane Doe died of heart failure ."));
        assert!(text.contains("Tom & Jerry"));
        assert!(text.lines().any(|l| l == "Obituary"));
    }
}
