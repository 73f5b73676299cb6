//! Pure query-complexity assessment: `assess(query) -> Complexity`. No I/O,
//! no model calls — keyword and structural heuristics only, so it's cheap
//! enough to run on every query before a model is ever chosen.
//!
//! Scores live on a `[0, 10]` scale (spec §4.E): `< 3.0` is fast, `3.0-7.0`
//! is balanced, `> 7.0` is powerful.

use orc_kernel::complexity::{Complexity, Indicator};
use orc_kernel::model::Tier;

const SIMPLE_KEYWORDS: &[&str] = &[
    "what is", "who is", "when is", "define", "hello", "thanks", "what are", "list",
];
const MODERATE_KEYWORDS: &[&str] = &[
    "explain", "compare", "how does", "why does", "summarize", "describe", "analyze",
];
const COMPLEX_KEYWORDS: &[&str] = &[
    "architecture", "algorithm", "distributed", "concurrency", "optimize", "optimization",
    "proof", "theorem", "consensus", "asynchronous", "consistency", "throughput", "latency",
    "scalability", "recursion", "design a system",
];

const ENUMERATION_MARKERS: &[&str] = &["1.", "2.", "3.", "step 1", "firstly", "- "];
const CONDITIONAL_MARKERS: &[&str] = &["if ", "unless ", "when... then", "in case"];

/// `-1` if any simple-vocabulary keyword matches, saturated: multiple hits
/// don't stack further (spec §4.E: "simple / moderate / complex
/// vocabularies contribute -1 / +1 / +3 respectively, saturated").
fn simple_keyword_indicator(lower: &str) -> Indicator {
    let contribution = if SIMPLE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        -1.0
    } else {
        0.0
    };
    Indicator {
        name: "simple_keywords".to_string(),
        contribution,
    }
}

fn moderate_keyword_indicator(lower: &str) -> Indicator {
    let contribution = if MODERATE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        1.0
    } else {
        0.0
    };
    Indicator {
        name: "moderate_keywords".to_string(),
        contribution,
    }
}

fn complex_keyword_indicator(lower: &str) -> Indicator {
    let contribution = if COMPLEX_KEYWORDS.iter().any(|k| lower.contains(k)) {
        3.0
    } else {
        0.0
    };
    Indicator {
        name: "complex_keywords".to_string(),
        contribution,
    }
}

fn length_indicator(query: &str) -> Indicator {
    let words = query.split_whitespace().count();
    let contribution = match words {
        0..=15 => 0.0,
        16..=40 => 1.0,
        41..=100 => 2.0,
        _ => 3.0,
    };
    Indicator {
        name: "length".to_string(),
        contribution,
    }
}

fn sentence_count_indicator(query: &str) -> Indicator {
    let sentences = query
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();
    let contribution = if sentences >= 3 { 1.0 } else { 0.0 };
    Indicator {
        name: "sentence_count".to_string(),
        contribution,
    }
}

fn enumeration_indicator(lower: &str) -> Indicator {
    let contribution = if ENUMERATION_MARKERS.iter().any(|m| lower.contains(m)) {
        1.5
    } else {
        0.0
    };
    Indicator {
        name: "enumeration".to_string(),
        contribution,
    }
}

fn conditional_indicator(lower: &str) -> Indicator {
    let contribution = if CONDITIONAL_MARKERS.iter().any(|m| lower.contains(m)) {
        1.0
    } else {
        0.0
    };
    Indicator {
        name: "conditional".to_string(),
        contribution,
    }
}

fn code_content_indicator(query: &str) -> Indicator {
    let contribution = if query.contains("```") || query.contains("fn ") || query.contains("def ")
    {
        1.5
    } else {
        0.0
    };
    Indicator {
        name: "code_content".to_string(),
        contribution,
    }
}

fn multi_part_question_indicator(query: &str) -> Indicator {
    let marks = query.matches('?').count();
    let contribution = if marks >= 2 { 1.0 } else { 0.0 };
    Indicator {
        name: "multi_part_question".to_string(),
        contribution,
    }
}

fn tier_for_score(score: f64) -> Tier {
    if score < 3.0 {
        Tier::Fast
    } else if score <= 7.0 {
        Tier::Balanced
    } else {
        Tier::Powerful
    }
}

/// Assess a query's complexity from its text alone. Same input always
/// produces the same `{tier, score}` (spec §8 property 2: determinism) —
/// there is no hidden clock, randomness, or external state here.
pub fn assess(query: &str) -> Complexity {
    let lower = query.to_ascii_lowercase();
    let indicators = vec![
        simple_keyword_indicator(&lower),
        moderate_keyword_indicator(&lower),
        complex_keyword_indicator(&lower),
        length_indicator(query),
        sentence_count_indicator(query),
        enumeration_indicator(&lower),
        conditional_indicator(&lower),
        code_content_indicator(query),
        multi_part_question_indicator(query),
    ];
    let score = indicators
        .iter()
        .map(|i| i.contribution)
        .sum::<f64>()
        .clamp(0.0, 10.0);
    let tier = tier_for_score(score);
    let reasoning = format!(
        "score {:.2} from indicators [{}] -> tier {}",
        score,
        indicators
            .iter()
            .filter(|i| i.contribution != 0.0)
            .map(|i| format!("{}={:.2}", i.name, i.contribution))
            .collect::<Vec<_>>()
            .join(", "),
        tier
    );
    Complexity {
        tier,
        score,
        reasoning,
        indicators,
    }
}

/// A caller-forced tier short-circuits assessment entirely (spec §4.E):
/// `reasoning = "user forced"`, `score = 0`, regardless of which tier was
/// forced.
pub fn forced(tier: Tier) -> Complexity {
    Complexity {
        tier,
        score: 0.0,
        reasoning: "user forced".to_string(),
        indicators: Vec::new(),
    }
}
