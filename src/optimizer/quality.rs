//! Heuristic reusability score for upstream output.

const BASE_SCORE: f64 = 0.5;
const SUBSTANTIAL_LENGTH: usize = 200;
const DETAILED_LENGTH: usize = 500;

/// Estimate how reusable an analysis is, in [0, 1]
///
/// Longer and structured (paragraphs or lists) answers score higher; an empty
/// answer scores lowest.
pub fn estimate_quality(output: &str) -> f64 {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return (BASE_SCORE - 0.3).clamp(0.0, 1.0);
    }

    let length = trimmed.chars().count();
    let mut score = BASE_SCORE;
    if length >= SUBSTANTIAL_LENGTH {
        score += 0.2;
    }
    if length >= DETAILED_LENGTH {
        score += 0.1;
    }
    if has_structure(trimmed) {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

fn has_structure(text: &str) -> bool {
    if text.contains("\n\n") {
        return true;
    }
    text.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("- ")
            || line.starts_with("* ")
            || line
                .split_once(". ")
                .is_some_and(|(prefix, _)| !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_output_scores_lowest() {
        assert!((estimate_quality("") - 0.2).abs() < 1e-9);
        assert!((estimate_quality("   \n") - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_short_plain_output_scores_base() {
        assert!((estimate_quality("Use a smaller instance.") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_long_structured_output_scores_highest() {
        let mut text = String::from("Summary of findings.\n\n");
        text.push_str(&"- reduce instance size to save cost\n".repeat(20));
        assert!((estimate_quality(&text) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_numbered_list_counts_as_structure() {
        let text = "1. Move to reserved instances\n2. Remove idle volumes";
        assert!((estimate_quality(text) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_length_tiers() {
        assert!((estimate_quality(&"a".repeat(200)) - 0.7).abs() < 1e-9);
        assert!((estimate_quality(&"a".repeat(500)) - 0.8).abs() < 1e-9);
    }
}
