//! Parsers for model output and streamed response bodies

/// Splits a byte stream into complete lines
///
/// Partial lines stay buffered until their newline arrives; `\r\n` endings
/// are normalised.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Remaining bytes that never saw a newline
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer).trim_end().to_string();
        self.buffer.clear();
        Some(rest)
    }
}

/// Payload of an SSE `data:` line, if this is one
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// First balanced `{...}` in `text`
///
/// Braces inside string literals (including escaped quotes) do not count
/// towards nesting.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match ch {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Standalone runs of 1 to 3 ASCII digits
///
/// A run counts only when it is not glued to other word characters, so
/// "v2" or "1234" yield nothing.
fn standalone_numbers(text: &str) -> impl Iterator<Item = u32> + '_ {
    let bytes = text.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let before_ok = start == 0 || !is_word(bytes[start - 1]);
        let after_ok = i == bytes.len() || !is_word(bytes[i]);
        if before_ok && after_ok && i - start <= 3 {
            if let Ok(n) = text[start..i].parse() {
                found.push(n);
            }
        }
    }
    found.into_iter()
}

/// First standalone 1 to 3 digit number in a model reply
pub fn first_score(text: &str) -> Option<u32> {
    standalone_numbers(text).next()
}

/// Every standalone 1 to 3 digit number, in order
pub fn all_scores(text: &str) -> Vec<u32> {
    standalone_numbers(text).collect()
}
