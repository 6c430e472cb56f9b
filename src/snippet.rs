//! Snippet synthesis: bounded, sentence-complete caption lead-ins.
//!
//! [`synthesize`] packs whole sentences into a character budget and only
//! falls back to a hard cut when not even the first sentence fits.
//! [`clean_snippet`] strips the login/subscribe boilerplate that feeds tend to
//! scrape along with the teaser text.

use unicode_segmentation::UnicodeSegmentation;

/// Appended to a hard-truncated snippet.
pub const ELLIPSIS: &str = "...";

/// Phrases that mark a sentence as site chrome rather than news text.
pub const BOILERPLATE_PHRASES: [&str; 5] = [
    "Already have an account?",
    "Log in here",
    "Sign up",
    "Click here",
    "Subscribe",
];

/// Words that end in a period without ending the sentence.
const ABBREVIATIONS: [&str; 37] = [
    "Mr", "Mrs", "Ms", "Dr", "Prof", "Sr", "Jr", "St", "Mt", "Gov", "Sen", "Rep", "Pres", "Gen",
    "Adm", "Col", "Maj", "Capt", "Lt", "Sgt", "Cpl", "Rev", "Hon", "Atty", "Supt", "Jan", "Feb",
    "Apr", "Aug", "Sept", "Oct", "Nov", "Dec", "vs", "approx", "Ft", "No",
];

/// Whether a sentence-bound segment stops on an abbreviation ("Gov.") or an
/// initialism ("U.S.", "F.") rather than a real sentence end.
fn ends_with_abbreviation(segment: &str) -> bool {
    let Some(word) = segment.split_whitespace().last() else {
        return false;
    };
    let Some(stem) = word.strip_suffix('.') else {
        return false;
    };
    let stem = stem.trim_start_matches(|c: char| !c.is_alphanumeric());
    ABBREVIATIONS.contains(&stem) || is_initialism(stem)
}

/// Single capitals joined by dots: "U.S" or "F", but not the pronoun "I".
fn is_initialism(stem: &str) -> bool {
    stem != "I"
        && stem.split('.').all(|part| {
            let mut chars = part.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if c.is_uppercase())
        })
}

/// Split text into trimmed, non-empty sentences.
///
/// Unicode sentence boundaries, except that a boundary right after an
/// abbreviation or initialism is ignored, so "Dr. Fauci testified." stays
/// one sentence.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, segment) in text.split_sentence_bound_indices() {
        let begin = *start.get_or_insert(idx);
        if ends_with_abbreviation(segment) {
            continue;
        }
        out.push(text[begin..idx + segment.len()].trim());
        start = None;
    }
    if let Some(begin) = start {
        out.push(text[begin..].trim());
    }
    out.retain(|s| !s.is_empty());
    out
}

/// Build a snippet of at most `max_length` characters from whole sentences.
///
/// Each accepted sentence costs its length plus one separator. If no sentence
/// fits and the text is longer than the budget, the first `max_length`
/// characters are returned followed by [`ELLIPSIS`].
pub fn synthesize(text: &str, max_length: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut picked = Vec::new();
    let mut total = 0usize;
    for sentence in sentences(text) {
        let cost = sentence.chars().count() + 1;
        if total + cost > max_length {
            break;
        }
        picked.push(sentence);
        total += cost;
    }

    if picked.is_empty() && text.chars().count() > max_length {
        let mut cut: String = text.chars().take(max_length).collect();
        cut.push_str(ELLIPSIS);
        return cut;
    }

    picked.join(" ").trim().to_string()
}

/// Remove boilerplate prompts from a feed snippet.
///
/// Within each line, sentences containing a [`BOILERPLATE_PHRASES`] entry are
/// dropped, so a line made only of prompts disappears entirely. Surviving text
/// is rejoined with single spaces.
pub fn clean_snippet(snippet: &str) -> String {
    snippet
        .lines()
        .flat_map(sentences)
        .filter(|sentence| !BOILERPLATE_PHRASES.iter().any(|p| sentence.contains(p)))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_empty() {
        assert_eq!(synthesize("", 280), "");
    }

    #[test]
    fn test_synthesize_keeps_whole_sentences() {
        let text = "First sentence here. Second one follows. Third is long enough to overflow.";
        // "First sentence here." = 20 (+1), "Second one follows." = 19 (+1)
        assert_eq!(synthesize(text, 41), "First sentence here. Second one follows.");
        assert_eq!(synthesize(text, 40), "First sentence here.");
    }

    #[test]
    fn test_synthesize_stops_at_first_overflow() {
        // The short third sentence would fit but accumulation stops at the second.
        let text = "Short one. This second sentence is definitely too long for the budget. Ok.";
        assert_eq!(synthesize(text, 20), "Short one.");
    }

    #[test]
    fn test_synthesize_hard_truncation() {
        let text = "a".repeat(500);
        let out = synthesize(&text, 280);
        assert_eq!(out.chars().count(), 280 + ELLIPSIS.len());
        assert!(out.ends_with(ELLIPSIS));
        assert!(out.starts_with(&"a".repeat(280)));
    }

    #[test]
    fn test_synthesize_short_text_unchanged() {
        assert_eq!(synthesize("Just one.", 280), "Just one.");
    }

    #[test]
    fn test_synthesize_counts_characters_not_bytes() {
        let text = "Café à Paris. Über alles.";
        assert_eq!(synthesize(text, 14), "Café à Paris.");
    }

    #[test]
    fn test_synthesize_respects_bound() {
        let text = "One two three. Four five six seven. Eight nine ten eleven twelve. Thirteen.";
        for max in 0..text.len() + 5 {
            let out = synthesize(text, max);
            if out.ends_with(ELLIPSIS) {
                assert_eq!(out.chars().count(), max + ELLIPSIS.len());
            } else {
                assert!(out.chars().count() <= max, "max={max} out={out:?}");
            }
        }
    }

    #[test]
    fn test_sentences_keep_titles_attached() {
        assert_eq!(
            sentences("Dr. Fauci testified. Mr. Smith agreed."),
            vec!["Dr. Fauci testified.", "Mr. Smith agreed."]
        );
    }

    #[test]
    fn test_sentences_keep_initialisms_attached() {
        assert_eq!(
            sentences("U.S. President Biden spoke today. Markets rose."),
            vec!["U.S. President Biden spoke today.", "Markets rose."]
        );
        assert_eq!(
            sentences("John F. Kennedy was elected. I agree. It passed."),
            vec!["John F. Kennedy was elected.", "I agree.", "It passed."]
        );
    }

    #[test]
    fn test_sentences_trailing_abbreviation() {
        assert_eq!(sentences("Talks resume in Sept."), vec!["Talks resume in Sept."]);
        assert_eq!(sentences("Stocks fell. Bonds rose."), vec!["Stocks fell.", "Bonds rose."]);
    }

    #[test]
    fn test_synthesize_never_emits_bare_abbreviation() {
        let text = "Gov. Newsom signed the bill on Friday. Critics objected.";
        assert_eq!(synthesize(text, 20), "Gov. Newsom signed t...");
        assert_eq!(synthesize(text, 45), "Gov. Newsom signed the bill on Friday.");

        let text = "U.S. President Biden spoke today. Markets rose.";
        assert_eq!(synthesize(text, 12), "U.S. Preside...");
        assert_eq!(synthesize(text, 40), "U.S. President Biden spoke today.");
    }

    #[test]
    fn test_clean_keeps_abbreviated_sentence_whole() {
        assert_eq!(
            clean_snippet("Sen. Warren objected. Subscribe now."),
            "Sen. Warren objected."
        );
    }

    #[test]
    fn test_clean_drops_prompt_lines() {
        let snippet = "Markets rallied on Friday.\nAlready have an account? Log in here\nSign up for alerts";
        assert_eq!(clean_snippet(snippet), "Markets rallied on Friday.");
    }

    #[test]
    fn test_clean_drops_prompt_sentence_within_line() {
        assert_eq!(clean_snippet("Hello world. Subscribe now."), "Hello world.");
    }

    #[test]
    fn test_clean_joins_lines_with_spaces() {
        assert_eq!(clean_snippet("Line one.\nLine two."), "Line one. Line two.");
    }

    #[test]
    fn test_clean_all_boilerplate_is_empty() {
        assert_eq!(clean_snippet("Click here to Subscribe"), "");
    }
}
