use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// String similarity used to compare natural-language questions.
///
/// Every metric is symmetric, ranges over `[0, 1]` and scores identical
/// (normalized) questions as `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Levenshtein,
    JaroWinkler,
    SorensenDice,
}

impl SimilarityMetric {
    pub fn score(&self, a: &str, b: &str) -> f64 {
        self.score_normalized(&normalize_question(a), &normalize_question(b))
    }

    /// Scores two already-normalized questions.
    pub fn score_normalized(&self, a: &str, b: &str) -> f64 {
        let s = match self {
            SimilarityMetric::Levenshtein => strsim::normalized_levenshtein(a, b),
            SimilarityMetric::JaroWinkler => strsim::jaro_winkler(a, b),
            SimilarityMetric::SorensenDice => strsim::sorensen_dice(a, b),
        };
        s.clamp(0.0, 1.0)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Levenshtein => "levenshtein",
            SimilarityMetric::JaroWinkler => "jaro_winkler",
            SimilarityMetric::SorensenDice => "sorensen_dice",
        }
    }
}

/// Lowercases, collapses whitespace and drops trailing sentence punctuation.
pub fn normalize_question(s: &str) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', '?', '!'])
        .trim_end()
        .to_lowercase()
}

pub fn question_hash(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(normalize_question(s).as_bytes());
    hex::encode(h.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SimilarityMetric; 3] = [
        SimilarityMetric::Levenshtein,
        SimilarityMetric::JaroWinkler,
        SimilarityMetric::SorensenDice,
    ];

    #[test]
    fn normalization_ignores_case_spacing_and_punctuation() {
        assert_eq!(normalize_question("  List   all USERS. "), "list all users");
        assert_eq!(normalize_question("how many orders?!"), "how many orders");
        assert_eq!(question_hash("List all users."), question_hash("list all users"));
    }

    #[test]
    fn identical_questions_score_one() {
        for m in ALL {
            assert!((m.score("List all users.", "list all users") - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn scores_are_symmetric_and_bounded() {
        let a = "show me all orders over 100";
        let b = "show all orders above 100 dollars";
        for m in ALL {
            let ab = m.score(a, b);
            let ba = m.score(b, a);
            assert!((ab - ba).abs() < 1e-9, "{} not symmetric", m.as_str());
            assert!((0.0..=1.0).contains(&ab));
            assert!(ab < 1.0);
        }
    }

    #[test]
    fn unrelated_questions_score_low() {
        let s = SimilarityMetric::Levenshtein.score("List all users.", "sales by product");
        assert!(s < 0.5, "score was {}", s);
    }
}
