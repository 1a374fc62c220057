//! Formatting helpers shared by the tool views.

use std::collections::HashSet;
use std::hash::Hash;

/// Checkbox-style filter over a fixed set of kinds. Everything starts enabled.
#[derive(Clone, Debug)]
pub struct KindFilter<K: 'static> {
    all: &'static [K],
    enabled: HashSet<K>,
}

impl<K: Copy + Eq + Hash> KindFilter<K> {
    pub fn all(kinds: &'static [K]) -> Self {
        Self {
            all: kinds,
            enabled: kinds.iter().copied().collect(),
        }
    }

    pub fn set(&mut self, kind: K, enabled: bool) {
        if enabled {
            self.enabled.insert(kind);
        } else {
            self.enabled.remove(&kind);
        }
    }

    pub fn allows(&self, kind: K) -> bool {
        self.enabled.contains(&kind)
    }

    /// Enabled kinds in declaration order.
    pub fn enabled(&self) -> Vec<K> {
        self.all
            .iter()
            .copied()
            .filter(|kind| self.enabled.contains(kind))
            .collect()
    }

    pub fn reset(&mut self) {
        self.enabled = self.all.iter().copied().collect();
    }
}

/// `HH:MM:SS` (UTC) of a millisecond epoch timestamp.
pub fn format_clock(timestamp_ms: u64) -> String {
    let secs = (timestamp_ms / 1000) % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Cut `text` to `limit` characters, marking the cut with `...`.
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn format_ms(value: Option<i64>) -> String {
    match value {
        Some(ms) if ms > 0 => format!("{ms}ms"),
        _ => "--".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Color {
        Red,
        Blue,
    }

    const COLORS: [Color; 2] = [Color::Red, Color::Blue];

    #[test]
    fn filter_keeps_declaration_order() {
        let mut filter = KindFilter::all(&COLORS);
        filter.set(Color::Red, false);
        assert!(!filter.allows(Color::Red));
        assert_eq!(filter.enabled(), vec![Color::Blue]);
        filter.reset();
        assert_eq!(filter.enabled(), vec![Color::Red, Color::Blue]);
    }

    #[test]
    fn clock_wraps_at_midnight() {
        assert_eq!(format_clock(0), "00:00:00");
        assert_eq!(format_clock(86_400_000 + 3_723_000), "01:02:03");
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(truncate("ééé", 2), "éé...");
    }

    #[test]
    fn missing_or_negative_timings_render_as_dashes() {
        assert_eq!(format_ms(Some(120)), "120ms");
        assert_eq!(format_ms(Some(-5)), "--");
        assert_eq!(format_ms(None), "--");
    }
}
