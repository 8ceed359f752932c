//! Pure reconciliation functions.
//!
//! Nothing here touches storage or the network: the sync engine loads the
//! inputs, calls these, and persists the results.

use std::collections::{BTreeMap, HashMap};

use crate::score::{PendingWrite, ScoreKey, ScoreRecord};

/// Pick the record to display for one key under last-write-wins.
///
/// The local record wins only when it is strictly newer than the remote one.
pub fn resolve<'a>(local: &'a ScoreRecord, remote: &'a ScoreRecord) -> &'a ScoreRecord {
  if local.recorded_at > remote.recorded_at { local } else { remote }
}

/// Merge locally cached records with a fresh remote read for the same
/// subjects, producing exactly one record per key.
///
/// Remote records are the base; a local record replaces one only when it is
/// strictly newer, or when the remote set has nothing for that key. Output is
/// ordered by key.
pub fn merge_scores(local: Vec<ScoreRecord>, remote: Vec<ScoreRecord>) -> Vec<ScoreRecord> {
  let mut merged: BTreeMap<ScoreKey, ScoreRecord> =
    remote.into_iter().map(|r| (r.key(), r)).collect();

  for record in local {
    let key = record.key();
    let keep_local = match merged.get(&key) {
      Some(existing) => record.recorded_at > existing.recorded_at,
      None => true,
    };
    if keep_local {
      merged.insert(key, record);
    }
  }

  merged.into_values().collect()
}

/// Collapse queued intents to one per key, keeping the latest `created_at`
/// (ties go to the higher sequence number). Output is in sequence order.
pub fn collapse_pending(pending: &[PendingWrite]) -> Vec<PendingWrite> {
  let mut latest: HashMap<ScoreKey, &PendingWrite> = HashMap::new();

  for item in pending {
    latest
      .entry(item.key())
      .and_modify(|kept| {
        if (item.created_at, item.seq) > (kept.created_at, kept.seq) {
          *kept = item;
        }
      })
      .or_insert(item);
  }

  let mut out: Vec<PendingWrite> = latest.into_values().cloned().collect();
  out.sort_by_key(|p| p.seq);
  out
}
