use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Result;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// What happens to a media group's "forwarded" flag when its send fails
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// The flag stays set; a re-delivered member will not retry the group.
    #[default]
    Keep,
    /// The flag is cleared so a re-delivered member retries the group.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    Forwarded,
    AlreadyForwarded,
}

/// Per-group "already forwarded" flag behind an async lock
type GroupState = Arc<Mutex<bool>>;

/// Forwards each media group at most once, however many of its events arrive.
///
/// Group states are kept in recency order and bounded by `capacity`. Only
/// idle states (nobody holding or waiting on the lock) are evicted.
pub struct MediaGroupDeduplicator {
    groups: DashMap<String, GroupState>,
    recency: StdMutex<VecDeque<String>>,
    capacity: usize,
    policy: FailurePolicy,
}

impl MediaGroupDeduplicator {
    pub fn new(capacity: usize, policy: FailurePolicy) -> Self {
        Self {
            groups: DashMap::new(),
            recency: StdMutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Run `forward` for `group_id` unless the group was already forwarded.
    /// Calls for the same group are serialized; different groups never wait on each other.
    pub async fn run_once<F, Fut>(&self, group_id: &str, forward: F) -> Result<GroupOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let state = self.state(group_id);
        let mut forwarded = state.lock().await;

        if *forwarded {
            debug!("Media group {} already forwarded, skipping", group_id);
            return Ok(GroupOutcome::AlreadyForwarded);
        }
        *forwarded = true;

        if let Err(e) = forward().await {
            if self.policy == FailurePolicy::Retry {
                *forwarded = false;
            }
            return Err(e);
        }

        Ok(GroupOutcome::Forwarded)
    }

    /// Number of group states currently retained
    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.groups.len()
    }

    fn state(&self, group_id: &str) -> GroupState {
        let mut inserted = false;
        let state = self
            .groups
            .entry(group_id.to_string())
            .or_insert_with(|| {
                inserted = true;
                Arc::new(Mutex::new(false))
            })
            .clone();

        if inserted {
            self.track(group_id);
        }
        state
    }

    fn track(&self, group_id: &str) {
        let mut recency = self.recency.lock().unwrap_or_else(|e| e.into_inner());
        recency.push_back(group_id.to_string());

        let mut attempts = recency.len();
        while self.groups.len() > self.capacity && attempts > 0 {
            attempts -= 1;
            let Some(oldest) = recency.pop_front() else {
                break;
            };
            // Anyone holding a clone is inside or queued on the lock.
            let evicted = self
                .groups
                .remove_if(&oldest, |_, state| Arc::strong_count(state) == 1)
                .is_some();
            if evicted {
                debug!("Evicted media group state {}", oldest);
            } else {
                recency.push_back(oldest);
            }
        }
    }
}
