use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved bucket id for unplaced items.
pub const POOL_BUCKET_ID: &str = "pool";

/// Anything that can sit on a board: member photos and songs both qualify.
pub trait Placeable {
    fn id(&self) -> &str;
    fn display_label(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub id: String,
    pub display_name: String,
    pub color_token: String,
    pub ordinal: i64,
}

#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub item: T,
    pub bucket_id: String,
    pub original_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionToken(pub u64);

#[derive(Debug, Clone)]
struct Selection {
    item_id: String,
    token: SelectionToken,
}

/// Ordered multi-bucket collection plus the two interaction protocols.
///
/// Bucket membership is a field on each entry and within-bucket order is the
/// order of the single entry vector, so "every item in exactly one bucket" is
/// structural: entries are moved, never copied or removed.
#[derive(Debug, Clone)]
pub struct Board<T> {
    buckets: Vec<Bucket>,
    entries: Vec<Entry<T>>,
    drag_mode: bool,
    dragging: Option<String>,
    selection: Option<Selection>,
    next_token: u64,
}

impl<T: Placeable> Board<T> {
    /// Fresh board: all items in the pool, `original_index` from source order.
    pub fn new(buckets: Vec<Bucket>, items: Vec<T>) -> Self {
        let entries = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Entry {
                item,
                bucket_id: POOL_BUCKET_ID.to_string(),
                original_index: i as u32,
            })
            .collect();
        Board {
            buckets,
            entries,
            drag_mode: true,
            dragging: None,
            selection: None,
            next_token: 0,
        }
    }

    pub fn drag_mode(&self) -> bool {
        self.drag_mode
    }

    /// Switching modes clears any pending selection and nothing else.
    pub fn set_drag_mode(&mut self, drag_mode: bool) {
        self.drag_mode = drag_mode;
        self.selection = None;
        self.dragging = None;
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn entries(&self) -> &[Entry<T>] {
        &self.entries
    }

    pub fn selected_item_id(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.item_id.as_str())
    }

    pub fn dragging_item_id(&self) -> Option<&str> {
        self.dragging.as_deref()
    }

    pub fn pool_len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.bucket_id == POOL_BUCKET_ID)
            .count()
    }

    pub fn bucket_entries(&self, bucket_id: &str) -> Vec<&Entry<T>> {
        self.entries
            .iter()
            .filter(|e| e.bucket_id == bucket_id)
            .collect()
    }

    fn entry_index(&self, item_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.item.id() == item_id)
    }

    fn is_bucket(&self, id: &str) -> bool {
        id == POOL_BUCKET_ID || self.buckets.iter().any(|b| b.id == id)
    }

    // ---- Mode A: continuous drag placement ----

    pub fn on_drag_start(&mut self, item_id: &str) {
        if !self.drag_mode {
            return;
        }
        if self.entry_index(item_id).is_some() {
            self.dragging = Some(item_id.to_string());
        }
    }

    /// Reorder within a bucket when hovering another item of the same bucket,
    /// or move to the end of a different bucket when hovering that bucket.
    /// Unknown ids and same-bucket bucket targets are no-ops.
    pub fn on_drag_over(&mut self, item_id: &str, over_target_id: &str) {
        if !self.drag_mode || item_id == over_target_id {
            return;
        }
        let Some(from) = self.entry_index(item_id) else {
            return;
        };

        if let Some(to) = self.entry_index(over_target_id) {
            if self.entries[from].bucket_id != self.entries[to].bucket_id {
                return;
            }
            // Stable splice: the dragged entry takes the target's former slot,
            // landing just before or after it depending on drag direction.
            let e = self.entries.remove(from);
            self.entries.insert(to, e);
            return;
        }

        if self.is_bucket(over_target_id) {
            if self.entries[from].bucket_id == over_target_id {
                return;
            }
            self.move_to_bucket_end(from, over_target_id);
        }
    }

    pub fn on_drag_end(&mut self) {
        // Moves already applied during drag-over stay applied.
        self.dragging = None;
    }

    pub fn on_drag_cancel(&mut self) {
        self.dragging = None;
    }

    // ---- Mode B: select-then-place ----

    /// Toggle selection. Returns the new selection's token so the caller can
    /// schedule an expiry timer; `None` means deselected or no-op.
    pub fn on_item_activate(&mut self, item_id: &str) -> Option<SelectionToken> {
        if self.drag_mode {
            return None;
        }
        self.entry_index(item_id)?;
        if self
            .selection
            .as_ref()
            .is_some_and(|s| s.item_id == item_id)
        {
            self.selection = None;
            return None;
        }
        self.next_token += 1;
        let token = SelectionToken(self.next_token);
        self.selection = Some(Selection {
            item_id: item_id.to_string(),
            token,
        });
        Some(token)
    }

    /// Expiry timer callback. A stale token (selection changed or consumed
    /// since the timer was scheduled) is ignored.
    pub fn on_selection_expired(&mut self, token: SelectionToken) {
        if self.selection.as_ref().is_some_and(|s| s.token == token) {
            self.selection = None;
        }
    }

    /// Place the selected item into `bucket_id`, after the bucket's current
    /// maximum `original_index`, then clear the selection.
    pub fn on_bucket_activate(&mut self, bucket_id: &str) {
        if self.drag_mode || !self.is_bucket(bucket_id) {
            return;
        }
        let Some(selected) = self.selection.as_ref().map(|s| s.item_id.clone()) else {
            return;
        };
        let Some(from) = self.entry_index(&selected) else {
            self.selection = None;
            return;
        };
        if self.entries[from].bucket_id != bucket_id {
            let mut e = self.entries.remove(from);
            e.bucket_id = bucket_id.to_string();
            let after = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, x)| x.bucket_id == bucket_id)
                .max_by_key(|(_, x)| x.original_index)
                .map(|(i, _)| i + 1);
            match after {
                Some(pos) => self.entries.insert(pos, e),
                None => self.entries.push(e),
            }
        }
        self.selection = None;
    }

    /// Mode-independent return-to-pool. Pool order stays ascending by
    /// `original_index` even though bucket order is insertion order.
    pub fn on_item_return_to_pool(&mut self, item_id: &str) {
        let Some(from) = self.entry_index(item_id) else {
            return;
        };
        if self.entries[from].bucket_id == POOL_BUCKET_ID {
            return;
        }
        let mut e = self.entries.remove(from);
        e.bucket_id = POOL_BUCKET_ID.to_string();
        self.insert_into_pool(e);
    }

    fn insert_into_pool(&mut self, e: Entry<T>) {
        let pos = self.entries.iter().position(|x| {
            x.bucket_id == POOL_BUCKET_ID && x.original_index > e.original_index
        });
        match pos {
            Some(p) => self.entries.insert(p, e),
            None => self.entries.push(e),
        }
    }

    fn move_to_bucket_end(&mut self, from: usize, bucket_id: &str) {
        let mut e = self.entries.remove(from);
        e.bucket_id = bucket_id.to_string();
        let last = self
            .entries
            .iter()
            .rposition(|x| x.bucket_id == bucket_id)
            .map(|i| i + 1);
        match last {
            Some(pos) => self.entries.insert(pos, e),
            None => self.entries.push(e),
        }
    }

    // ---- Bucket management ----

    pub fn create_bucket(&mut self, id: String, display_name: String, color_token: String) {
        let ordinal = self.buckets.iter().map(|b| b.ordinal).max().unwrap_or(-1) + 1;
        self.buckets.push(Bucket {
            id,
            display_name,
            color_token,
            ordinal,
        });
    }

    pub fn rename_bucket(&mut self, bucket_id: &str, display_name: &str) {
        if let Some(b) = self.buckets.iter_mut().find(|b| b.id == bucket_id) {
            b.display_name = display_name.to_string();
        }
    }

    pub fn recolor_bucket(&mut self, bucket_id: &str, color_token: &str) {
        if let Some(b) = self.buckets.iter_mut().find(|b| b.id == bucket_id) {
            b.color_token = color_token.to_string();
        }
    }

    /// Reassign ordinals so listed buckets come first in the given order;
    /// unlisted buckets keep their relative order behind them. Ids only ever
    /// move, they are never rewritten.
    pub fn reorder_buckets(&mut self, ordered_ids: &[String]) {
        let mut listed: Vec<Bucket> = Vec::new();
        for id in ordered_ids {
            if let Some(pos) = self.buckets.iter().position(|b| &b.id == id) {
                listed.push(self.buckets.remove(pos));
            }
        }
        listed.append(&mut self.buckets);
        for (i, b) in listed.iter_mut().enumerate() {
            b.ordinal = i as i64;
        }
        self.buckets = listed;
    }

    /// Deleting a bucket returns its items to the pool; items are never lost.
    pub fn delete_bucket(&mut self, bucket_id: &str) {
        if bucket_id == POOL_BUCKET_ID {
            return;
        }
        let Some(pos) = self.buckets.iter().position(|b| b.id == bucket_id) else {
            return;
        };
        self.buckets.remove(pos);
        loop {
            let Some(idx) = self.entries.iter().position(|e| e.bucket_id == bucket_id) else {
                break;
            };
            let mut e = self.entries.remove(idx);
            e.bucket_id = POOL_BUCKET_ID.to_string();
            self.insert_into_pool(e);
        }
    }

    /// Replace buckets wholesale (draft rehydration). Entries left pointing at
    /// a bucket that no longer exists fall back to the pool.
    pub fn replace_buckets(&mut self, buckets: Vec<Bucket>) {
        self.buckets = buckets;
        let known: Vec<String> = self.buckets.iter().map(|b| b.id.clone()).collect();
        for e in &mut self.entries {
            if e.bucket_id != POOL_BUCKET_ID && !known.contains(&e.bucket_id) {
                e.bucket_id = POOL_BUCKET_ID.to_string();
            }
        }
    }

    /// Apply a draft's item-to-bucket mapping. Entries start in source order,
    /// so bucket order after rehydration is catalog order and pool order is
    /// ascending `original_index`, both deterministic.
    pub fn apply_placements(&mut self, placements: &BTreeMap<String, String>) {
        for e in &mut self.entries {
            if let Some(target) = placements.get(e.item.id()) {
                if target != POOL_BUCKET_ID
                    && self.buckets.iter().any(|b| &b.id == target)
                {
                    e.bucket_id = target.clone();
                }
            }
        }
    }

    pub fn item_placements(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|e| (e.item.id().to_string(), e.bucket_id.clone()))
            .collect()
    }

    pub fn completion_percent(&self) -> i64 {
        completion_percent(self.entries.len(), self.entries.len() - self.pool_len())
    }

    // ---- Read-side pool projection ----

    /// Case-insensitive substring filter over the pool only. Never mutates,
    /// never includes bucket-held items.
    pub fn search_pool(&self, query: &str) -> Vec<&Entry<T>> {
        let q = query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.bucket_id == POOL_BUCKET_ID)
            .filter(|e| q.is_empty() || name_matches(e.item.display_label(), &q))
            .collect()
    }
}

pub fn completion_percent(total: usize, placed: usize) -> i64 {
    if total == 0 {
        return 0;
    }
    (100.0 * placed as f64 / total as f64).round() as i64
}

/// Match either the full name, the bare generation label, or the name with its
/// leading generation token stripped, so "gen11" and "alya" both hit
/// "Gen11 Alya Amanda". Token split on space/dash/underscore.
fn name_matches(display_name: &str, query: &str) -> bool {
    let lower = display_name.to_lowercase();
    if lower.contains(query) {
        return true;
    }
    let tokens: Vec<&str> = lower
        .split([' ', '-', '_'])
        .filter(|t| !t.is_empty())
        .collect();
    let Some(first) = tokens.first() else {
        return false;
    };
    let gen_label = first
        .strip_prefix("gen")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()));
    let gen_word = *first == "generation"
        && tokens
            .get(1)
            .is_some_and(|t| t.chars().all(|c| c.is_ascii_digit()));
    let rest_start = if gen_label {
        1
    } else if gen_word {
        2
    } else {
        return false;
    };
    let label = tokens[..rest_start].join(" ");
    let rest = tokens[rest_start..].join(" ");
    label.contains(query) || rest.contains(query)
}
