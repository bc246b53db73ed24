//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded up.
//! Counts characters rather than bytes so accented Spanish text is not
//! over-charged.

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate tokens for several fragments estimated independently.
pub fn estimate_sections<'a, I>(sections: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    sections.into_iter().map(estimate_tokens).sum()
}

/// Longest prefix of whole sentences of `text` that fits in `max_tokens`.
///
/// A sentence ends at `.`, `!`, `?` or a newline followed by whitespace or
/// end of text. Returns `None` when not even the first sentence fits;
/// content is never cut mid-sentence.
pub fn truncate_at_sentence(text: &str, max_tokens: usize) -> Option<String> {
    if estimate_tokens(text) <= max_tokens {
        return Some(text.to_string());
    }

    let mut best: Option<&str> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        let terminal = matches!(c, '.' | '!' | '?' | '\n');
        if !terminal {
            continue;
        }
        let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
        if !at_boundary {
            continue;
        }
        let candidate = text[..idx + c.len_utf8()].trim_end();
        if candidate.is_empty() {
            continue;
        }
        if estimate_tokens(candidate) > max_tokens {
            break;
        }
        best = Some(candidate);
    }
    best.map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn accented_characters_count_once() {
        // 4 chars, 6 bytes
        assert_eq!(estimate_tokens("niño"), 1);
    }

    #[test]
    fn sections_are_estimated_independently() {
        assert_eq!(estimate_sections(["hello", "world"]), 4);
    }

    #[test]
    fn fitting_text_is_returned_whole() {
        assert_eq!(truncate_at_sentence("Short one.", 10).as_deref(), Some("Short one."));
    }

    #[test]
    fn truncates_on_sentence_boundary() {
        let text = "First sentence here. Second sentence is much longer than the first.";
        // "First sentence here." = 20 chars = 5 tokens
        assert_eq!(truncate_at_sentence(text, 6).as_deref(), Some("First sentence here."));
    }

    #[test]
    fn decimals_are_not_sentence_boundaries() {
        let text = "Pi is 3.14 roughly. Then more words follow after that.";
        let cut = truncate_at_sentence(text, 5).unwrap();
        assert_eq!(cut, "Pi is 3.14 roughly.");
    }

    #[test]
    fn none_when_first_sentence_too_long() {
        let text = "This single sentence is definitely too long for the budget. Tail.";
        assert_eq!(truncate_at_sentence(text, 3), None);
    }
}
