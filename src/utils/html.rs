// src/utils/html.rs

/// Strips scripts, frames and event-handler attributes from examiner-authored
/// text, keeping ammonia's default whitelist of formatting tags.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
