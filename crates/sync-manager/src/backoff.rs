//! Retry scheduling.

use crate::SyncSettings;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use sync_queue::QueuedMutation;

/// Computes the exponential backoff duration for a given retry count.
///
/// `delay = base * 2^(retry_count - 1)`, capped at `max`.
///
/// | Retry Count | Delay (base=2s, max=60s) |
/// |-------------|--------------------------|
/// | 0           | 0                        |
/// | 1           | 2s                       |
/// | 2           | 4s                       |
/// | 3           | 8s                       |
/// | 6+          | 60s                      |
pub fn compute_backoff(retry_count: u32, settings: &SyncSettings) -> chrono::Duration {
    if retry_count == 0 {
        return chrono::Duration::zero();
    }

    let base_ms = settings.base_backoff.as_millis() as u64;
    let max_ms = settings.max_backoff.as_millis() as u64;
    let shift = retry_count.saturating_sub(1);
    let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

    chrono::Duration::milliseconds(delay_ms as i64)
}

/// Earliest instant a further drain cycle has work to do.
///
/// An item can run no earlier than its own `next_attempt_at`, nor earlier
/// than any unsynced, still-eligible item before it on the same resource.
/// Items at max retries are ignored and do not hold back later ones.
/// Resources in `held` wait for an outside decision, not for time, so none
/// of their items count. `pending` must be in ascending id order.
pub fn next_wake(
    pending: &[QueuedMutation],
    held: &HashSet<(String, String)>,
    now: DateTime<Utc>,
    max_retries: u32,
) -> Option<DateTime<Utc>> {
    let mut resource_ready: HashMap<(&str, &str), DateTime<Utc>> = HashMap::new();
    let mut earliest: Option<DateTime<Utc>> = None;

    for item in pending {
        if item.synced || item.retry_count >= max_retries {
            continue;
        }
        if let Some((collection, id)) = item.resource_key() {
            if held.contains(&(collection.to_string(), id.to_string())) {
                continue;
            }
        }
        let own = item.next_attempt_at.unwrap_or(now).max(now);
        let ready = match item.resource_key() {
            Some(key) => {
                let entry = resource_ready.entry(key).or_insert(own);
                *entry = (*entry).max(own);
                *entry
            }
            None => own,
        };
        earliest = Some(earliest.map_or(ready, |e| e.min(ready)));
    }

    earliest
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use sync_queue::{HttpMethod, OperationType};

    fn item(id: i64, target: &str, retry_count: u32, next: Option<DateTime<Utc>>) -> QueuedMutation {
        QueuedMutation {
            id,
            operation_type: OperationType::Update,
            target_collection: "projects".to_string(),
            target_id: Some(target.to_string()),
            endpoint: format!("/projects/{target}"),
            method: HttpMethod::Patch,
            payload: json!({}),
            enqueued_at: Utc::now(),
            synced: false,
            retry_count,
            last_attempt_at: None,
            next_attempt_at: next,
            last_error: None,
            synced_at: None,
        }
    }

    #[test]
    fn compute_backoff_caps_and_grows() {
        let settings = SyncSettings {
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
            ..SyncSettings::default()
        };

        assert_eq!(compute_backoff(0, &settings), chrono::Duration::zero());
        assert_eq!(compute_backoff(1, &settings), chrono::Duration::seconds(2));
        assert_eq!(compute_backoff(2, &settings), chrono::Duration::seconds(4));
        assert_eq!(compute_backoff(3, &settings), chrono::Duration::seconds(8));
        assert_eq!(compute_backoff(4, &settings), chrono::Duration::seconds(10));
        assert_eq!(compute_backoff(40, &settings), chrono::Duration::seconds(10));
        assert_eq!(compute_backoff(u32::MAX, &settings), chrono::Duration::seconds(10));
    }

    #[test]
    fn next_wake_is_none_without_eligible_items() {
        let now = Utc::now();
        assert_eq!(next_wake(&[], &HashSet::new(), now, 3), None);
        assert_eq!(next_wake(&[item(1, "a", 3, None)], &HashSet::new(), now, 3), None);
    }

    #[test]
    fn next_wake_waits_for_earlier_item_on_same_resource() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(4);
        let pending = vec![item(1, "a", 1, Some(later)), item(2, "a", 0, None)];
        assert_eq!(next_wake(&pending, &HashSet::new(), now, 3), Some(later));
    }

    #[test]
    fn next_wake_is_now_for_unblocked_new_item() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(4);
        let pending = vec![item(1, "a", 1, Some(later)), item(2, "b", 0, None)];
        assert_eq!(next_wake(&pending, &HashSet::new(), now, 3), Some(now));
    }

    #[test]
    fn next_wake_skips_held_resources() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(4);
        let held: HashSet<(String, String)> = [("projects".to_string(), "a".to_string())].into();

        let only_held = vec![item(1, "a", 0, None), item(2, "a", 1, Some(later))];
        assert_eq!(next_wake(&only_held, &held, now, 3), None);

        let mixed = vec![item(1, "a", 0, None), item(2, "b", 1, Some(later))];
        assert_eq!(next_wake(&mixed, &held, now, 3), Some(later));
    }

    #[test]
    fn next_wake_ignores_failed_items_ahead() {
        let now = Utc::now();
        let pending = vec![item(1, "a", 3, None), item(2, "a", 0, None)];
        assert_eq!(next_wake(&pending, &HashSet::new(), now, 3), Some(now));
    }
}
