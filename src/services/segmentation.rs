use crate::services::llm_provider::{strip_code_fence, LLMError};

/// Separators used when the model is unavailable: 、，；。 space and newline.
pub const FALLBACK_SEPARATORS: [char; 6] = ['、', '，', '；', '。', ' ', '\n'];

/// CJK unified ideographs as matched by the lesson filter (U+4E00..=U+9FA5).
pub fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

pub fn contains_cjk(s: &str) -> bool {
    s.chars().any(is_cjk_ideograph)
}

/// A word may enter the pool only if it is non-empty after trimming and has
/// at least one ideograph.
pub fn is_valid_word(s: &str) -> bool {
    let trimmed = s.trim();
    !trimmed.is_empty() && contains_cjk(trimmed)
}

pub fn filter_words<I, S>(candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .filter(|s| is_valid_word(s.as_ref()))
        .map(|s| s.as_ref().trim().to_string())
        .collect()
}

pub fn fallback_split(text: &str) -> Vec<String> {
    filter_words(text.split(FALLBACK_SEPARATORS.as_slice()))
}

pub fn parse_segments(raw: &str) -> Result<Vec<String>, LLMError> {
    let segments: Vec<String> = serde_json::from_str(strip_code_fence(raw))?;
    Ok(filter_words(segments))
}
