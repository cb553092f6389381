//! Reply formatting with mIRC colour codes

use crate::search::SearchEntry;
use searchbot_core::utils::string::{clip, normalize_whitespace};

const COLOR: char = '\x03';
const RESET: char = '\x0F';

const GREEN: &str = "03";
const BLUE: &str = "12";
const GRAY: &str = "14";

const MAX_TITLE: usize = 100;
const MAX_URL: usize = 100;
const MAX_DESCRIPTION: usize = 200;

/// One result line: `<rank>. <title> | <url> | <description>`.
///
/// Control characters in upstream text are flattened to spaces, so an entry
/// cannot inject its own colours or break the line. The description segment
/// is left out when nothing remains of it after cleaning.
pub fn format_entry(rank: usize, entry: &SearchEntry) -> String {
    let url = entry.url.trim();

    let mut title = normalize_whitespace(&entry.title);
    if title.is_empty() {
        title = "No title".to_string();
    }

    let description = if url.is_empty() {
        normalize_whitespace(&entry.description)
    } else {
        normalize_whitespace(&entry.description.replace(url, ""))
    };

    let title = clip(&title, MAX_TITLE);
    let url = clip(&normalize_whitespace(url), MAX_URL);
    let description = clip(&description, MAX_DESCRIPTION);

    let mut line = format!(
        "{}. {}{}{}{} | {}{}{}{}",
        rank, COLOR, GREEN, title, RESET, COLOR, BLUE, url, RESET
    );

    if !description.is_empty() {
        line.push_str(&format!(" | {}{}{}{}", COLOR, GRAY, description, RESET));
    }

    line
}

/// Footer crediting the search provider
pub fn attribution(name: &str, url: &str) -> String {
    format!(
        "{c}{gray}Search results powered by {name} {c}{blue}{url}{c}{gray} - Privacy-focused metasearch{reset}",
        c = COLOR,
        gray = GRAY,
        blue = BLUE,
        name = name,
        url = url,
        reset = RESET
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, url: &str, description: &str) -> SearchEntry {
        SearchEntry {
            title: title.to_string(),
            url: url.to_string(),
            description: description.to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn test_full_line() {
        let line = format_entry(1, &entry("Rust", "https://www.rust-lang.org/", "A language empowering everyone"));
        assert_eq!(
            line,
            "1. \x0303Rust\x0F | \x0312https://www.rust-lang.org/\x0F | \x0314A language empowering everyone\x0F"
        );
    }

    #[test]
    fn test_empty_description_drops_segment() {
        let line = format_entry(2, &entry("Rust", "https://rust.example", "  https://rust.example  "));
        assert_eq!(line, "2. \x0303Rust\x0F | \x0312https://rust.example\x0F");
    }

    #[test]
    fn test_cleaning_and_clipping() {
        let long_title = "t".repeat(150);
        let long_desc = format!("see https://x.example\r\n\x03{}", "d ".repeat(150));
        let line = format_entry(3, &entry(&long_title, "https://x.example", &long_desc));

        assert!(line.contains(&format!("{}...", "t".repeat(97))));
        assert!(!line.contains('\r') && !line.contains('\n'));
        // Exactly the colour codes we put there
        assert_eq!(line.matches('\x03').count(), 3);

        let desc = line.rsplit(" | \x0314").next().unwrap().trim_end_matches('\x0F');
        assert!(desc.starts_with("see d d"));
        assert_eq!(desc.chars().count(), 200);
        assert!(desc.ends_with("..."));
    }

    #[test]
    fn test_missing_title() {
        let line = format_entry(4, &entry("", "https://x.example", ""));
        assert!(line.starts_with("4. \x0303No title\x0F"));
    }

    #[test]
    fn test_attribution() {
        let footer = attribution("Hearch", "https://hearch.co/");
        assert!(footer.contains("Hearch"));
        assert!(footer.contains("https://hearch.co/"));
        assert!(footer.ends_with('\x0F'));
    }
}
