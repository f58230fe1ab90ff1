use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

static LEXICON: Lazy<HashMap<String, f64>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, f64>>(raw).expect("valid sentiment lexicon")
});

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)[\w']+").expect("token regex"));

/// Normalization constant for the compound score (approximates the max
/// expected raw sum).
const ALPHA: f64 = 15.0;
const BOOST: f64 = 0.293;
const CAPS_BOOST: f64 = 0.733;
const NEGATION_SCALAR: f64 = -0.74;
const EXCLAMATION_BOOST: f64 = 0.292;

/// Maps text to a compound sentiment score in `[-1, 1]`.
///
/// Implementations are expected to be pure. An `Err` only fails the one item
/// being scored; the ingestion loop skips it and moves on.
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> anyhow::Result<f64>;
}

/// Lexicon based compound scorer (valence lexicon + negation, boosters,
/// ALL-CAPS emphasis and exclamation marks).
#[derive(Debug, Clone, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }

    /// Raw valence sum before normalization.
    pub fn valence_sum(&self, text: &str) -> f64 {
        let tokens: Vec<&str> = RE_TOKEN.find_iter(text).map(|m| m.as_str()).collect();
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let caps_differential = has_caps_differential(&tokens);

        let mut sum = 0.0f64;
        for i in 0..tokens.len() {
            let Some(&base) = LEXICON.get(lowered[i].as_str()) else {
                continue;
            };
            let mut v = base;

            if caps_differential && is_shouting(tokens[i]) {
                v += CAPS_BOOST * base.signum();
            }

            // Boosters/dampeners in the three preceding tokens, decaying with distance.
            for (k, decay) in [(1usize, 1.0f64), (2, 0.95), (3, 0.9)] {
                if i < k {
                    break;
                }
                if let Some(scalar) = booster_scalar(&lowered[i - k]) {
                    v += scalar * decay * base.signum();
                }
            }

            let negated = (1..=3).any(|k| i >= k && is_negator(&lowered[i - k]));
            if negated {
                v *= NEGATION_SCALAR;
            }

            sum += v;
        }

        let bangs = text.chars().filter(|c| *c == '!').count().min(4) as f64;
        let emphasis = bangs * EXCLAMATION_BOOST;
        if sum > 0.0 {
            sum += emphasis;
        } else if sum < 0.0 {
            sum -= emphasis;
        }
        sum
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> anyhow::Result<f64> {
        Ok(normalize(self.valence_sum(text)))
    }
}

/// Squash a raw valence sum into `[-1, 1]`.
pub fn normalize(sum: f64) -> f64 {
    (sum / (sum * sum + ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Coarse label used when displaying a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

impl Polarity {
    pub fn from_score(score: f64) -> Self {
        if score > 0.05 {
            Polarity::Positive
        } else if score < -0.05 {
            Polarity::Negative
        } else {
            Polarity::Neutral
        }
    }
}

fn is_shouting(tok: &str) -> bool {
    tok.chars().filter(|c| c.is_alphabetic()).count() > 1
        && tok.chars().all(|c| !c.is_lowercase())
}

/// Emphasis only counts when the text mixes cased and ALL-CAPS words.
fn has_caps_differential(tokens: &[&str]) -> bool {
    let shouting = tokens.iter().filter(|t| is_shouting(t)).count();
    shouting > 0 && shouting < tokens.len()
}

fn booster_scalar(tok: &str) -> Option<f64> {
    match tok {
        "very" | "really" | "extremely" | "super" | "so" | "totally" | "absolutely"
        | "incredibly" | "hugely" | "insanely" | "most" | "fucking" => Some(BOOST),
        "slightly" | "barely" | "somewhat" | "kinda" | "kind" | "sort" | "marginally"
        | "hardly" => Some(-BOOST),
        _ => None,
    }
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not" | "no" | "never" | "nothing" | "nobody" | "none" | "neither" | "nor"
            | "cannot" | "without"
    ) || tok.ends_with("n't")
}
