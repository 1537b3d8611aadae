use crate::board::{self, Bucket, POOL_BUCKET_ID};
use crate::catalog::ContentType;
use chrono::Utc;
use log::warn;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Newest manual drafts kept per content type (and song set).
pub const MAX_MANUAL_DRAFTS: usize = 5;
/// Newest autosaves kept per content type (and song set).
pub const MAX_AUTO_DRAFTS: usize = 3;

/// Persisted snapshot of a board: bucket configuration plus item-to-bucket
/// assignment. Items themselves are rebuilt from the catalog every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: i64,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_key: Option<String>,
    pub buckets: Vec<Bucket>,
    pub item_placements: BTreeMap<String, String>,
    pub title: String,
    pub completion_percent: i64,
    pub saved_at: String,
    pub is_auto_save: bool,
}

pub fn completion_from_placements(placements: &BTreeMap<String, String>) -> i64 {
    let placed = placements.values().filter(|b| *b != POOL_BUCKET_ID).count();
    board::completion_percent(placements.len(), placed)
}

/// Pool-size-based change counter driving autosave. Deliberately coarse: it
/// compares pool cardinality against the last-seen value, so a mutation that
/// leaves pool size unchanged never counts, and any observed difference counts
/// exactly once regardless of magnitude.
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    threshold: u32,
    last_pool_len: usize,
    counter: u32,
}

impl ChangeTracker {
    pub fn new(threshold: u32, initial_pool_len: usize) -> Self {
        ChangeTracker {
            threshold,
            last_pool_len: initial_pool_len,
            counter: 0,
        }
    }

    /// Observe the pool size after a mutation. Returns true when an autosave
    /// is due; the counter resets to zero at that point.
    pub fn observe(&mut self, pool_len: usize) -> bool {
        if pool_len == self.last_pool_len {
            return false;
        }
        self.last_pool_len = pool_len;
        self.counter += 1;
        if self.counter >= self.threshold {
            self.counter = 0;
            return true;
        }
        false
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

fn namespace(is_auto_save: bool) -> &'static str {
    if is_auto_save {
        "autosave"
    } else {
        "manual"
    }
}

fn read_namespace(conn: &Connection, is_auto_save: bool) -> Vec<Draft> {
    let payload: Option<String> = match conn
        .query_row(
            "SELECT payload FROM draft_store WHERE namespace = ?",
            [namespace(is_auto_save)],
            |row| row.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => {
            warn!("draft store read failed, treating as empty: {e}");
            return Vec::new();
        }
    };
    let Some(payload) = payload else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<Draft>>(&payload) {
        Ok(drafts) => drafts,
        Err(e) => {
            warn!("corrupt draft payload in {}, treating as empty: {e}", namespace(is_auto_save));
            Vec::new()
        }
    }
}

fn write_namespace(conn: &Connection, is_auto_save: bool, drafts: &[Draft]) -> anyhow::Result<()> {
    let payload = serde_json::to_string(drafts)?;
    conn.execute(
        "INSERT OR REPLACE INTO draft_store(namespace, payload) VALUES(?, ?)",
        (namespace(is_auto_save), &payload),
    )?;
    Ok(())
}

/// Song drafts are additionally scoped to their song set; everything else is
/// scoped by content type alone.
fn same_scope(d: &Draft, content_type: ContentType, sub_key: Option<&str>) -> bool {
    d.content_type == content_type
        && (content_type != ContentType::Song || d.sub_key.as_deref() == sub_key)
}

/// Prepend a draft to its namespace, truncating same-scope entries to the cap
/// (oldest evicted). Surviving entries keep their positions so the namespace
/// stays most-recent first across scopes; the whole payload is replaced in
/// one write.
pub fn write(conn: &Connection, draft: Draft) -> anyhow::Result<()> {
    let cap = if draft.is_auto_save {
        MAX_AUTO_DRAFTS
    } else {
        MAX_MANUAL_DRAFTS
    };
    let is_auto = draft.is_auto_save;
    let content_type = draft.content_type;
    let sub_key = draft.sub_key.clone();

    let mut kept = read_namespace(conn, is_auto);
    kept.insert(0, draft);
    let mut in_scope = 0usize;
    kept.retain(|d| {
        if !same_scope(d, content_type, sub_key.as_deref()) {
            return true;
        }
        in_scope += 1;
        in_scope <= cap
    });
    write_namespace(conn, is_auto, &kept)
}

/// Most-recent first, filtered by content type and, for song drafts with a
/// sub-selection given, by song set.
pub fn list(
    conn: &Connection,
    content_type: ContentType,
    is_auto_save: bool,
    sub_key: Option<&str>,
) -> Vec<Draft> {
    read_namespace(conn, is_auto_save)
        .into_iter()
        .filter(|d| d.content_type == content_type)
        .filter(|d| {
            content_type != ContentType::Song
                || sub_key.is_none()
                || d.sub_key.as_deref() == sub_key
        })
        .collect()
}

/// Look a draft up by id across both namespaces, manual first.
pub fn get(conn: &Connection, id: i64) -> Option<Draft> {
    read_namespace(conn, false)
        .into_iter()
        .chain(read_namespace(conn, true))
        .find(|d| d.id == id)
}

/// Drop every draft of the given content type from both namespaces.
pub fn clear_all(conn: &Connection, content_type: ContentType) -> anyhow::Result<()> {
    for is_auto in [false, true] {
        let kept: Vec<Draft> = read_namespace(conn, is_auto)
            .into_iter()
            .filter(|d| d.content_type != content_type)
            .collect();
        write_namespace(conn, is_auto, &kept)?;
    }
    Ok(())
}

/// Timestamp-derived id, bumped past any collision so two saves in the same
/// millisecond still get distinct ids.
pub fn next_draft_id(conn: &Connection) -> i64 {
    let taken: Vec<i64> = read_namespace(conn, false)
        .iter()
        .chain(read_namespace(conn, true).iter())
        .map(|d| d.id)
        .collect();
    let mut id = Utc::now().timestamp_millis();
    while taken.contains(&id) {
        id += 1;
    }
    id
}

#[allow(clippy::too_many_arguments)]
pub fn build_draft(
    conn: &Connection,
    content_type: ContentType,
    sub_key: Option<&str>,
    buckets: Vec<Bucket>,
    item_placements: BTreeMap<String, String>,
    title: String,
    is_auto_save: bool,
) -> Draft {
    let completion_percent = completion_from_placements(&item_placements);
    Draft {
        id: next_draft_id(conn),
        content_type,
        sub_key: sub_key.map(str::to_string),
        buckets,
        item_placements,
        title,
        completion_percent,
        saved_at: Utc::now().to_rfc3339(),
        is_auto_save,
    }
}
