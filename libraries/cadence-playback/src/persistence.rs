//! Persisted snapshot codec
//!
//! The queue, shuffle history, cursor, seek position and modes are written to
//! a [`KeyValueStore`] in a compact text form:
//!
//! - queue: every entry as `<id>&<host>|`
//! - history: every index as lowercase hex digits, least significant first,
//!   terminated by `;` (`18` -> `"21;"`, `0` -> `"0;"`)
//!
//! Decoding never fails. Malformed queue tokens are skipped, malformed history
//! yields an empty history, and any structural inconsistency discards the
//! offending piece.

use crate::error::StoreError;
use crate::store::KeyValueStore;
use crate::types::{RepeatMode, ShuffleMode, TrackRef};
use std::time::Duration;
use tracing::{debug, warn};

/// Store keys
pub mod keys {
    pub const QUEUE: &str = "queue";
    pub const HISTORY: &str = "history";
    pub const CARD_ID: &str = "cardid";
    pub const CURRENT_POSITION: &str = "curpos";
    pub const SEEK_POSITION: &str = "seekpos";
    pub const REPEAT_MODE: &str = "repeatmode";
    pub const SHUFFLE_MODE: &str = "shufflemode";
}

const ENTRY_SEPARATOR: char = '|';
const FIELD_SEPARATOR: char = '&';
const INDEX_TERMINATOR: char = ';';

/// Engine state as written to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedSnapshot {
    pub queue: Vec<TrackRef>,
    pub history: Vec<usize>,
    pub current: Option<usize>,
    pub seek_position: Duration,
    pub repeat_mode: RepeatMode,
    pub shuffle_mode: ShuffleMode,
    pub card_id: i32,
}

/// Encode queue entries
pub fn encode_queue(entries: &[TrackRef]) -> String {
    let mut out = String::with_capacity(entries.len() * 16);
    for entry in entries {
        out.push_str(&entry.id);
        out.push(FIELD_SEPARATOR);
        out.push_str(&entry.host);
        out.push(ENTRY_SEPARATOR);
    }
    out
}

/// Decode queue entries, skipping malformed tokens
///
/// A token is kept only when it contains `&` with a non-empty id before it
/// and a non-empty host after it. Only the first `&` splits.
pub fn decode_queue(encoded: &str) -> Vec<TrackRef> {
    encoded
        .split(ENTRY_SEPARATOR)
        .filter_map(|token| {
            let (id, host) = token.split_once(FIELD_SEPARATOR)?;
            if id.is_empty() || host.is_empty() {
                return None;
            }
            Some(TrackRef::new(id, host))
        })
        .collect()
}

/// Encode history indices
pub fn encode_history(indices: impl IntoIterator<Item = usize>) -> String {
    let mut out = String::new();
    for mut index in indices {
        loop {
            let digit = u32::try_from(index & 0xf).unwrap_or(0);
            out.push(char::from_digit(digit, 16).unwrap_or('0'));
            index >>= 4;
            if index == 0 {
                break;
            }
        }
        out.push(INDEX_TERMINATOR);
    }
    out
}

/// Decode history indices; `None` if anything is malformed
pub fn decode_history(encoded: &str) -> Option<Vec<usize>> {
    let mut indices = Vec::new();
    let mut value: usize = 0;
    let mut shift: u32 = 0;
    let mut digits = 0;

    for c in encoded.chars() {
        if c == INDEX_TERMINATOR {
            if digits == 0 {
                return None;
            }
            indices.push(value);
            value = 0;
            shift = 0;
            digits = 0;
            continue;
        }

        // Lowercase only
        let digit = match c {
            '0'..='9' | 'a'..='f' => c.to_digit(16)?,
            _ => return None,
        };
        if shift >= usize::BITS {
            return None;
        }
        value |= (digit as usize) << shift;
        shift += 4;
        digits += 1;
    }

    if digits != 0 {
        return None;
    }
    Some(indices)
}

/// Write every key
///
/// History is only written in shuffle modes.
pub fn save_full(
    store: &mut dyn KeyValueStore,
    snapshot: &PersistedSnapshot,
) -> Result<(), StoreError> {
    store.put_string(keys::QUEUE, encode_queue(&snapshot.queue));
    store.put_i32(keys::CARD_ID, snapshot.card_id);
    if snapshot.shuffle_mode != ShuffleMode::None {
        store.put_string(
            keys::HISTORY,
            encode_history(snapshot.history.iter().copied()),
        );
    }
    put_position_and_modes(store, snapshot);
    store.commit()
}

/// Write only the cursor, seek position and modes
pub fn save_partial(
    store: &mut dyn KeyValueStore,
    snapshot: &PersistedSnapshot,
) -> Result<(), StoreError> {
    put_position_and_modes(store, snapshot);
    store.commit()
}

fn put_position_and_modes(store: &mut dyn KeyValueStore, snapshot: &PersistedSnapshot) {
    let current = snapshot
        .current
        .and_then(|c| i32::try_from(c).ok())
        .unwrap_or(-1);
    let seek = i64::try_from(snapshot.seek_position.as_millis()).unwrap_or(i64::MAX);

    store.put_i32(keys::CURRENT_POSITION, current);
    store.put_i64(keys::SEEK_POSITION, seek);
    store.put_i32(keys::REPEAT_MODE, snapshot.repeat_mode.as_i32());
    store.put_i32(keys::SHUFFLE_MODE, snapshot.shuffle_mode.as_i32());
}

/// Read a snapshot back, discarding inconsistent pieces
///
/// - stored card id differs from `card_id`: queue discarded
/// - stored position outside the decoded queue: queue discarded
/// - malformed history, or any index outside the queue: history discarded
pub fn load(store: &dyn KeyValueStore, card_id: i32) -> PersistedSnapshot {
    let stored_card = store.get_i32(keys::CARD_ID).unwrap_or(card_id);
    let mut queue = if stored_card == card_id {
        store
            .get_string(keys::QUEUE)
            .map(|q| decode_queue(&q))
            .unwrap_or_default()
    } else {
        debug!(
            "Stored card id {} does not match {}, dropping queue",
            stored_card, card_id
        );
        Vec::new()
    };

    let position = store.get_i32(keys::CURRENT_POSITION).unwrap_or(0);
    let mut current = usize::try_from(position)
        .ok()
        .filter(|&p| p < queue.len());
    if current.is_none() && !queue.is_empty() {
        warn!(
            "Stored position {} is outside the restored queue of {}, dropping queue",
            position,
            queue.len()
        );
        queue.clear();
    }
    if queue.is_empty() {
        current = None;
    }

    let seek_ms = store.get_i64(keys::SEEK_POSITION).unwrap_or(0).max(0);
    let repeat_mode = RepeatMode::from_i32(store.get_i32(keys::REPEAT_MODE).unwrap_or(0));
    let shuffle_mode = ShuffleMode::from_i32(store.get_i32(keys::SHUFFLE_MODE).unwrap_or(0));

    let history = if shuffle_mode == ShuffleMode::None {
        Vec::new()
    } else {
        restore_history(store.get_string(keys::HISTORY).as_deref(), queue.len())
    };

    PersistedSnapshot {
        queue,
        history,
        current,
        seek_position: Duration::from_millis(seek_ms.unsigned_abs()),
        repeat_mode,
        shuffle_mode,
        card_id,
    }
}

fn restore_history(encoded: Option<&str>, queue_len: usize) -> Vec<usize> {
    let Some(encoded) = encoded else {
        return Vec::new();
    };

    match decode_history(encoded) {
        Some(indices) if indices.iter().all(|&i| i < queue_len) => indices,
        Some(_) => {
            warn!("Stored history references entries outside the queue, dropping it");
            Vec::new()
        }
        None => {
            warn!("Stored history is malformed, dropping it");
            Vec::new()
        }
    }
}
