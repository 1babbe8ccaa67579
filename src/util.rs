use std::time::SystemTime;

/// Milliseconds from `start` to `end`, zero when `end` is not after `start`
pub fn time_diff_ms(start: SystemTime, end: SystemTime) -> u64 {
    end.duration_since(start).unwrap_or_default().as_millis() as u64
}

/// Number of whitespace-delimited words
pub fn word_count(chars: &[char]) -> usize {
    let mut count = 0;
    let mut in_word = false;

    for c in chars {
        match (c.is_whitespace(), in_word) {
            (true, _) => in_word = false,
            (false, false) => {
                in_word = true;
                count += 1;
            }
            (false, true) => {}
        }
    }

    count
}

/// First `n` chars of `text`, clamped to its length
pub fn char_prefix(text: &str, n: usize) -> Vec<char> {
    text.chars().take(n).collect()
}

/// Line breaks as `'\n'`, whatever the source platform used
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
