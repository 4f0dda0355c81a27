//! `#q=<text>` fragments that let a lesson be reopened from a shared link.

const QUERY_KEY: &str = "q";

/// Extracts and decodes the `q` parameter from a location fragment such as
/// `#q=%E6%89%93%E6%8E%83`. Returns `None` when absent or blank.
pub fn parse_fragment(fragment: &str) -> Option<String> {
    let params = fragment.trim().trim_start_matches('#');

    params
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == QUERY_KEY)
        .map(|(_, value)| decode_component(value))
        .filter(|text| !text.trim().is_empty())
}

pub fn build_fragment(text: &str) -> String {
    format!("{QUERY_KEY}={}", urlencoding::encode(text))
}

/// Full page URL whose fragment reopens `text`; this is what the share QR encodes.
pub fn share_url(base_url: &str, text: &str) -> String {
    format!("{}/#{}", base_url.trim_end_matches('/'), build_fragment(text))
}

fn decode_component(value: &str) -> String {
    let spaced = value.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
