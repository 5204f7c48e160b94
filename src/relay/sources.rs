use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};

/// The live set of source chats, swapped whole on every update so readers
/// always see a complete snapshot.
#[derive(Debug, Default)]
pub struct SourceChannels {
    current: RwLock<Arc<BTreeSet<i64>>>,
}

impl SourceChannels {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            current: RwLock::new(Arc::new(ids.into_iter().collect())),
        }
    }

    pub fn snapshot(&self) -> Arc<BTreeSet<i64>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn contains(&self, chat_id: i64) -> bool {
        self.snapshot().contains(&chat_id)
    }

    pub fn replace(&self, ids: BTreeSet<i64>) {
        let next = Arc::new(ids);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = next;
    }
}

/// Parse an underscore-separated list of chat IDs, e.g. `-1001_-1002`
pub fn parse_channel_list(raw: &str) -> Result<BTreeSet<i64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("channel list is empty");
    }

    raw.split('_')
        .map(|part| {
            part.trim()
                .parse::<i64>()
                .with_context(|| format!("'{}' is not a valid chat ID", part))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_list() {
        let ids = parse_channel_list("100_200_300").unwrap();
        assert_eq!(ids, BTreeSet::from([100, 200, 300]));
    }

    #[test]
    fn test_parse_negative_ids() {
        let ids = parse_channel_list("-1001234_-1005678").unwrap();
        assert_eq!(ids, BTreeSet::from([-1001234, -1005678]));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_channel_list("").is_err());
        assert!(parse_channel_list("100_abc").is_err());
        assert!(parse_channel_list("100__200").is_err());
    }

    #[test]
    fn test_replace_swaps_snapshot() {
        let sources = SourceChannels::new([1, 2]);
        let before = sources.snapshot();

        sources.replace(BTreeSet::from([3]));

        assert!(sources.contains(3));
        assert!(!sources.contains(1));
        // Earlier snapshots are unaffected.
        assert_eq!(*before, BTreeSet::from([1, 2]));
    }
}
