//! Normalized-fingerprint deduplication.
//!
//! The upstream game-chat feed is read by redundant listeners and may deliver
//! the identical line more than once. Lines are normalized (formatting and
//! prefix noise stripped) and compared against an insertion-ordered window of
//! the most recent fingerprints.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::Mutex;
use tracing::debug;

/// `§x` style color/formatting control sequences.
static FORMATTING_CODES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"§\w").expect("static regex is valid"));

/// Bracketed rank/role prefixes such as `[VIP] ` or `[MVP+] `.
static BRACKETED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]\s*").expect("static regex is valid"));

/// Leading channel label, e.g. `Guild > `.
static CHANNEL_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Guild\s?>?\s?").expect("static regex is valid"));

/// Decorative glyphs some clients inject around names and ranks.
static DECORATIVE_GLYPHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[♲⚒♻♾✨★☆♠♣♥♦✓✔•·●○◉◎¤©®™☑❌➤➔→←↑↓↔↕]").expect("static regex is valid")
});

/// Strip color codes, rank prefixes, the channel label, and decorative
/// glyphs from a raw guild-chat line.
pub fn clean_message(raw: &str) -> String {
    let text = BRACKETED_PREFIX.replace_all(raw, "");
    let text = FORMATTING_CODES.replace_all(&text, "");
    let text = CHANNEL_LABEL.replace(&text, "");
    let text = DECORATIVE_GLYPHS.replace_all(&text, "");
    text.trim().to_string()
}

/// Comparison key for the recency window: cleaned, whitespace-collapsed,
/// case-folded.
///
/// A guild line carries a `sender: body` shape. When no delimiter survives
/// cleaning, the whole raw line becomes the key so the frame still gets a
/// stable fingerprint instead of failing normalization.
fn fingerprint(raw: &str) -> String {
    let cleaned = clean_message(raw);
    let base = if cleaned.contains(':') {
        cleaned
    } else {
        raw.trim().to_string()
    };
    base.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Bounded recency window of message fingerprints, single-writer.
pub struct MessageDeduplicator {
    window: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl MessageDeduplicator {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Returns `true` exactly when this line was not seen within the window,
    /// recording it; the oldest fingerprint is evicted once the bound is
    /// exceeded.
    pub async fn is_unique(&self, raw: &str) -> bool {
        let key = fingerprint(raw);
        let mut window = self.window.lock().await;

        if window.contains(&key) {
            debug!(key = %key, "Duplicate guild line rejected");
            return false;
        }

        window.push_back(key);
        if window.len() > self.capacity {
            window.pop_front();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_then_rejects_duplicate() {
        let dedup = MessageDeduplicator::new(100);

        assert!(dedup.is_unique("Guild > [VIP] PlayerX: hello").await);
        assert!(!dedup.is_unique("Guild > [VIP] PlayerX: hello").await);
    }

    #[tokio::test]
    async fn formatting_variants_share_a_fingerprint() {
        let dedup = MessageDeduplicator::new(100);

        assert!(dedup.is_unique("§aPlayerX: hello §bworld").await);
        // Same line from a different listener, without color codes.
        assert!(!dedup.is_unique("PlayerX: hello world").await);
    }

    #[tokio::test]
    async fn rank_prefix_and_label_are_ignored() {
        let dedup = MessageDeduplicator::new(100);

        assert!(dedup.is_unique("Guild > [MVP+] PlayerX: good luck").await);
        assert!(!dedup.is_unique("[VIP] PlayerX: good luck").await);
        assert!(!dedup.is_unique("playerx:   GOOD   LUCK").await);
    }

    #[tokio::test]
    async fn original_is_accepted_again_after_window_turnover() {
        let dedup = MessageDeduplicator::new(100);

        assert!(dedup.is_unique("PlayerX: original").await);
        for i in 0..100 {
            assert!(dedup.is_unique(&format!("PlayerY: filler {i}")).await);
        }
        // 100 distinct lines evicted the original from the window.
        assert!(dedup.is_unique("PlayerX: original").await);
    }

    #[tokio::test]
    async fn duplicate_within_window_stays_rejected() {
        let dedup = MessageDeduplicator::new(100);

        assert!(dedup.is_unique("PlayerX: original").await);
        for i in 0..50 {
            assert!(dedup.is_unique(&format!("PlayerY: filler {i}")).await);
        }
        assert!(!dedup.is_unique("PlayerX: original").await);
    }

    #[tokio::test]
    async fn line_without_delimiter_falls_back_to_raw() {
        let dedup = MessageDeduplicator::new(100);

        assert!(dedup.is_unique("PlayerX joined the guild").await);
        assert!(!dedup.is_unique("PlayerX  joined   the guild").await);
    }

    #[test]
    fn clean_message_strips_noise() {
        assert_eq!(
            clean_message("Guild > [VIP] §aPlayerX§r: hello ★"),
            "PlayerX: hello"
        );
        assert_eq!(clean_message("plain text"), "plain text");
    }
}
