//! Anti-bot gate: deterministic, pure runtime heuristics deciding whether
//! a discovered URL should be processed at all — honeypot pattern checks
//! plus a per-origin admission budget.

use dashmap::DashMap;
use regex::RegexSet;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

const DEFAULT_SAME_ORIGIN_BUDGET: u64 = 500;

const HONEYPOT_PATTERNS: &[&str] = &[
    r"(?i)/trap/",
    r"(?i)/honeypot",
    r"(?i)/wp-admin/.*action=edit",
    r"(?i)[?&]sessionid=[0-9a-f]{32}",
    r"(?i)/\.\./",
];

#[derive(Debug, Clone)]
pub struct AntiBotConfig {
    /// Maximum URLs admitted from a single origin before the gate starts
    /// rejecting further ones (guards against unbounded same-host crawl
    /// traps, e.g. calendar pages that link to themselves forever).
    pub same_origin_budget: u64,
}

impl Default for AntiBotConfig {
    fn default() -> Self {
        Self {
            same_origin_budget: DEFAULT_SAME_ORIGIN_BUDGET,
        }
    }
}

/// Evaluates lightweight, deterministic signals about a URL before it
/// enters the pipeline. Pure relative to its inputs: the only mutable
/// state is the per-origin counter it increments on each pass.
pub struct AntiBotGate {
    config: AntiBotConfig,
    honeypot_patterns: RegexSet,
    origin_counts: DashMap<String, AtomicU64>,
}

impl AntiBotGate {
    pub fn new(config: AntiBotConfig) -> Self {
        Self {
            config,
            honeypot_patterns: RegexSet::new(HONEYPOT_PATTERNS).expect("static honeypot patterns are valid regex"),
            origin_counts: DashMap::new(),
        }
    }

    /// Whether `url` should be handed to the downloader.
    pub fn should_process(&self, url: &str) -> bool {
        if self.honeypot_patterns.is_match(url) {
            return false;
        }

        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(origin) = parsed.host_str() else {
            return false;
        };

        let counter = self
            .origin_counts
            .entry(origin.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        let seen_so_far = counter.fetch_add(1, Ordering::SeqCst);
        seen_so_far < self.config.same_origin_budget
    }

    /// Current admitted count for `origin`, for diagnostics/tests.
    pub fn origin_count(&self, origin: &str) -> u64 {
        self.origin_counts
            .get(origin)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_known_honeypot_patterns() {
        let gate = AntiBotGate::new(AntiBotConfig::default());
        assert!(!gate.should_process("https://example.test/trap/index.html"));
        assert!(!gate.should_process("https://example.test/wp-admin/post.php?action=edit"));
    }

    #[test]
    fn allows_ordinary_urls() {
        let gate = AntiBotGate::new(AntiBotConfig::default());
        assert!(gate.should_process("https://example.test/articles/2026/07/story"));
    }

    #[test]
    fn enforces_same_origin_budget() {
        let gate = AntiBotGate::new(AntiBotConfig { same_origin_budget: 3 });
        for i in 0..3 {
            assert!(gate.should_process(&format!("https://example.test/page/{i}")));
        }
        assert!(!gate.should_process("https://example.test/page/overflow"));
    }

    #[test]
    fn rejects_unparseable_urls() {
        let gate = AntiBotGate::new(AntiBotConfig::default());
        assert!(!gate.should_process("not a url"));
    }
}
