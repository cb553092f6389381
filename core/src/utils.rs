//! Utility functions and helpers

/// String utilities
pub mod string {
    /// Check if a string is a valid IRC channel name
    pub fn is_valid_channel_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if "#&+!".contains(first) => {}
            _ => return false,
        }

        name.len() <= 50 && !name.contains([' ', ',', '\x07', '\r', '\n', '\0'])
    }

    /// Check if a string is a valid IRC nickname
    pub fn is_valid_nickname(nick: &str) -> bool {
        let mut chars = nick.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return false,
        };

        if !(first.is_ascii_alphabetic() || is_special(first)) {
            return false;
        }

        chars.all(|c| c.is_ascii_alphanumeric() || is_special(c) || c == '-')
    }

    fn is_special(c: char) -> bool {
        "[]\\`_^{|}".contains(c)
    }

    /// Truncate to at most `max_bytes` bytes without splitting a UTF-8 sequence
    pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
        if s.len() <= max_bytes {
            return s;
        }

        let mut end = max_bytes;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }

    /// Clip to `max_chars` characters, marking the cut with "..."
    pub fn clip(s: &str, max_chars: usize) -> String {
        if s.chars().count() <= max_chars {
            return s.to_string();
        }

        let keep = max_chars.saturating_sub(3);
        let mut clipped: String = s.chars().take(keep).collect();
        clipped.push_str("...");
        clipped
    }

    /// Collapse every run of whitespace or control characters into one space
    pub fn normalize_whitespace(s: &str) -> String {
        s.split(|c: char| c.is_whitespace() || c.is_control())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Split text into chunks of at most `max_bytes`, preferring to break at spaces
    pub fn split_message(text: &str, max_bytes: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut rest = text.trim();

        while !rest.is_empty() {
            if rest.len() <= max_bytes {
                chunks.push(rest.to_string());
                break;
            }

            let window = truncate_bytes(rest, max_bytes);
            let split_at = if rest[window.len()..].starts_with(' ') {
                window.len()
            } else {
                match window.rfind(' ') {
                    Some(pos) if pos > 0 => pos,
                    _ => window.len(),
                }
            };

            // A single character wider than the limit still has to move forward
            let split_at = if split_at == 0 {
                rest.chars().next().map(char::len_utf8).unwrap_or(rest.len())
            } else {
                split_at
            };

            chunks.push(rest[..split_at].to_string());
            rest = rest[split_at..].trim_start();
        }

        chunks
    }
}

/// RFC 1459 case mapping
pub mod casemap {
    /// Lowercase a single character with the RFC 1459 mapping
    #[inline]
    pub const fn irc_lower_char(c: char) -> char {
        match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            'A'..='Z' => (c as u8 + 32) as char,
            _ => c,
        }
    }

    /// Lowercase a string with the RFC 1459 mapping
    pub fn irc_to_lower(s: &str) -> String {
        s.chars().map(irc_lower_char).collect()
    }
}
