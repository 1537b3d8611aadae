use crate::board::{Board, Bucket, Placeable, SelectionToken, POOL_BUCKET_ID};
use crate::catalog::{self, ContentType, ItemKind, SourceItem};
use crate::{db, drafts, raster, votes};
use log::warn;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OkResp {
    id: String,
    ok: bool,
    result: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ErrObj {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ErrResp {
    id: String,
    ok: bool,
    error: ErrObj,
}

/// Live placement session. Items were built from the catalog at start; only
/// their bucket assignments change from here on.
pub struct Session {
    pub content_type: ContentType,
    pub sub_key: Option<String>,
    pub board: Board<SourceItem>,
    pub tracker: drafts::ChangeTracker,
    pub current_draft_id: Option<i64>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<Session>,
}

fn ok(id: String, result: serde_json::Value) -> serde_json::Value {
    json!(OkResp {
        id,
        ok: true,
        result
    })
}

fn err(id: String, code: &str, message: impl Into<String>) -> serde_json::Value {
    json!(ErrResp {
        id,
        ok: false,
        error: ErrObj {
            code: code.into(),
            message: message.into(),
            details: None
        }
    })
}

macro_rules! need_db {
    ($state:expr, $id:expr) => {
        match $state.db.as_ref() {
            Some(conn) => conn,
            None => return err($id, "no_workspace", "select a workspace first"),
        }
    };
}

macro_rules! need_session {
    ($state:expr, $id:expr) => {
        match $state.session.as_mut() {
            Some(s) => s,
            None => return err($id, "no_session", "start a session first"),
        }
    };
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    match req.method.as_str() {
        "health" => ok(
            req.id,
            json!({
                "version": env!("CARGO_PKG_VERSION"),
                "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
            }),
        ),
        "workspace.select" => {
            let Some(path) = req
                .params
                .get("path")
                .and_then(|v| v.as_str())
                .map(PathBuf::from)
            else {
                return err(req.id, "bad_params", "missing params.path");
            };
            match db::open_db(&path) {
                Ok(conn) => {
                    state.workspace = Some(path.clone());
                    state.db = Some(conn);
                    ok(req.id, json!({ "workspacePath": path.to_string_lossy() }))
                }
                Err(e) => err(req.id, "db_open_failed", format!("{e:?}")),
            }
        }

        // ---- Session handoff keys (written by the selection screen) ----
        "handoff.set" => {
            let conn = need_db!(state, req.id);
            let (Some(key), Some(value)) = (
                req.params.get("key").and_then(|v| v.as_str()),
                req.params.get("value").and_then(|v| v.as_str()),
            ) else {
                return err(req.id, "bad_params", "missing key/value");
            };
            if let Err(e) = conn.execute(
                "INSERT OR REPLACE INTO handoff(key, value) VALUES(?, ?)",
                (key, value),
            ) {
                return err(req.id, "db_write_failed", e.to_string());
            }
            ok(req.id, json!({}))
        }
        "handoff.clear" => {
            let conn = need_db!(state, req.id);
            if let Err(e) = conn.execute("DELETE FROM handoff", []) {
                return err(req.id, "db_write_failed", e.to_string());
            }
            ok(req.id, json!({}))
        }

        "catalog.subKeys" => {
            let Some(ct) = req
                .params
                .get("contentType")
                .and_then(|v| v.as_str())
                .and_then(ContentType::parse)
            else {
                return err(req.id, "bad_params", "missing or unknown contentType");
            };
            ok(req.id, json!({ "subKeys": catalog::sub_keys_for(ct) }))
        }

        // ---- Session lifecycle ----
        "session.start" => {
            let conn = need_db!(state, req.id);

            // Explicit params win; otherwise fall back to the handoff keys,
            // which are read once and consumed.
            let mut from_handoff = false;
            let ct_str = match req.params.get("contentType").and_then(|v| v.as_str()) {
                Some(s) => Some(s.to_string()),
                None => {
                    from_handoff = true;
                    handoff_get(conn, "contentType")
                }
            };
            let Some(ct) = ct_str.as_deref().and_then(ContentType::parse) else {
                return err(req.id, "bad_params", "missing or unknown contentType");
            };
            let sub_key = match req.params.get("subKey").and_then(|v| v.as_str()) {
                Some(s) => Some(s.to_string()),
                None if from_handoff => handoff_get(conn, "subKey"),
                None => None,
            };
            let draft_id = match req.params.get("draftId").and_then(|v| v.as_i64()) {
                Some(n) => Some(n),
                None if from_handoff => {
                    handoff_get(conn, "draftId").and_then(|s| s.parse::<i64>().ok())
                }
                None => None,
            };
            if from_handoff {
                if let Err(e) = conn.execute("DELETE FROM handoff", []) {
                    warn!("failed to consume handoff keys: {e}");
                }
            }

            let items = match catalog::items_for(ct, sub_key.as_deref()) {
                Ok(items) => items,
                Err(e) => return err(req.id, "bad_params", e.to_string()),
            };
            let mut board = Board::new(default_buckets(ct), items);

            let mut loaded_draft_id = None;
            if let Some(id) = draft_id {
                match drafts::get(conn, id) {
                    Some(d) if d.content_type == ct => {
                        if !d.buckets.is_empty() {
                            board.replace_buckets(d.buckets.clone());
                        }
                        board.apply_placements(&d.item_placements);
                        loaded_draft_id = Some(id);
                    }
                    Some(d) => warn!(
                        "draft {id} is {}, session is {}; starting fresh",
                        d.content_type.as_str(),
                        ct.as_str()
                    ),
                    None => warn!("draft {id} not found; starting fresh"),
                }
            }

            let tracker = drafts::ChangeTracker::new(ct.autosave_threshold(), board.pool_len());
            let session = Session {
                content_type: ct,
                sub_key,
                board,
                tracker,
                current_draft_id: loaded_draft_id,
            };
            let mut result = board_result(&session, None);
            result["loadedDraftId"] = json!(loaded_draft_id);
            state.session = Some(session);
            ok(req.id, result)
        }
        "session.info" => {
            let session = need_session!(state, req.id);
            let result = board_result(session, None);
            ok(req.id, result)
        }
        "session.setDragMode" => {
            let session = need_session!(state, req.id);
            let Some(drag_mode) = req.params.get("dragMode").and_then(|v| v.as_bool()) else {
                return err(req.id, "bad_params", "missing dragMode");
            };
            session.board.set_drag_mode(drag_mode);
            let result = board_result(session, None);
            ok(req.id, result)
        }

        // ---- Mode A: continuous drag placement ----
        "drag.start" => {
            let session = need_session!(state, req.id);
            let Some(item_id) = req.params.get("itemId").and_then(|v| v.as_str()) else {
                return err(req.id, "bad_params", "missing itemId");
            };
            session.board.on_drag_start(item_id);
            let result = board_result(session, None);
            ok(req.id, result)
        }
        "drag.over" => {
            let conn = need_db!(state, req.id);
            let session = need_session!(state, req.id);
            let (Some(item_id), Some(over_target_id)) = (
                req.params.get("itemId").and_then(|v| v.as_str()),
                req.params.get("overTargetId").and_then(|v| v.as_str()),
            ) else {
                return err(req.id, "bad_params", "missing itemId/overTargetId");
            };
            session.board.on_drag_over(item_id, over_target_id);
            let autosaved = autosave_if_due(conn, session);
            let result = board_result(session, autosaved);
            ok(req.id, result)
        }
        "drag.end" => {
            let session = need_session!(state, req.id);
            session.board.on_drag_end();
            let result = board_result(session, None);
            ok(req.id, result)
        }
        "drag.cancel" => {
            let session = need_session!(state, req.id);
            session.board.on_drag_cancel();
            let result = board_result(session, None);
            ok(req.id, result)
        }

        // ---- Mode B: select-then-place ----
        "item.activate" => {
            let session = need_session!(state, req.id);
            let Some(item_id) = req.params.get("itemId").and_then(|v| v.as_str()) else {
                return err(req.id, "bad_params", "missing itemId");
            };
            let token = session.board.on_item_activate(item_id);
            let mut result = board_result(session, None);
            result["selectionToken"] = json!(token.map(|t| t.0));
            ok(req.id, result)
        }
        "selection.expire" => {
            let session = need_session!(state, req.id);
            let Some(token) = req.params.get("token").and_then(|v| v.as_u64()) else {
                return err(req.id, "bad_params", "missing token");
            };
            session.board.on_selection_expired(SelectionToken(token));
            let result = board_result(session, None);
            ok(req.id, result)
        }
        "bucket.activate" => {
            let conn = need_db!(state, req.id);
            let session = need_session!(state, req.id);
            let Some(bucket_id) = req.params.get("bucketId").and_then(|v| v.as_str()) else {
                return err(req.id, "bad_params", "missing bucketId");
            };
            session.board.on_bucket_activate(bucket_id);
            let autosaved = autosave_if_due(conn, session);
            let result = board_result(session, autosaved);
            ok(req.id, result)
        }
        "item.returnToPool" => {
            let conn = need_db!(state, req.id);
            let session = need_session!(state, req.id);
            let Some(item_id) = req.params.get("itemId").and_then(|v| v.as_str()) else {
                return err(req.id, "bad_params", "missing itemId");
            };
            session.board.on_item_return_to_pool(item_id);
            let autosaved = autosave_if_due(conn, session);
            let result = board_result(session, autosaved);
            ok(req.id, result)
        }

        // ---- Bucket management ----
        "buckets.create" => {
            let session = need_session!(state, req.id);
            let Some(display_name) = req.params.get("displayName").and_then(|v| v.as_str()) else {
                return err(req.id, "bad_params", "missing displayName");
            };
            let color_token = req
                .params
                .get("colorToken")
                .and_then(|v| v.as_str())
                .unwrap_or("gray");
            let bucket_id = Uuid::new_v4().to_string();
            session.board.create_bucket(
                bucket_id.clone(),
                display_name.to_string(),
                color_token.to_string(),
            );
            let mut result = board_result(session, None);
            result["bucketId"] = json!(bucket_id);
            ok(req.id, result)
        }
        "buckets.rename" => {
            let session = need_session!(state, req.id);
            let (Some(bucket_id), Some(display_name)) = (
                req.params.get("bucketId").and_then(|v| v.as_str()),
                req.params.get("displayName").and_then(|v| v.as_str()),
            ) else {
                return err(req.id, "bad_params", "missing bucketId/displayName");
            };
            session.board.rename_bucket(bucket_id, display_name);
            let result = board_result(session, None);
            ok(req.id, result)
        }
        "buckets.recolor" => {
            let session = need_session!(state, req.id);
            let (Some(bucket_id), Some(color_token)) = (
                req.params.get("bucketId").and_then(|v| v.as_str()),
                req.params.get("colorToken").and_then(|v| v.as_str()),
            ) else {
                return err(req.id, "bad_params", "missing bucketId/colorToken");
            };
            session.board.recolor_bucket(bucket_id, color_token);
            let result = board_result(session, None);
            ok(req.id, result)
        }
        "buckets.reorder" => {
            let session = need_session!(state, req.id);
            let Some(ordered) = req.params.get("orderedIds").and_then(|v| v.as_array()) else {
                return err(req.id, "bad_params", "missing orderedIds");
            };
            let ordered_ids: Vec<String> = ordered
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            session.board.reorder_buckets(&ordered_ids);
            let result = board_result(session, None);
            ok(req.id, result)
        }
        "buckets.delete" => {
            let conn = need_db!(state, req.id);
            let session = need_session!(state, req.id);
            let Some(bucket_id) = req.params.get("bucketId").and_then(|v| v.as_str()) else {
                return err(req.id, "bad_params", "missing bucketId");
            };
            session.board.delete_bucket(bucket_id);
            let autosaved = autosave_if_due(conn, session);
            let result = board_result(session, autosaved);
            ok(req.id, result)
        }

        // ---- Read-side pool search ----
        "pool.search" => {
            let session = need_session!(state, req.id);
            let query = req
                .params
                .get("query")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let items: Vec<serde_json::Value> = session
                .board
                .search_pool(query)
                .iter()
                .map(|e| item_json(&e.item, e.original_index))
                .collect();
            ok(req.id, json!({ "items": items }))
        }

        // ---- Drafts ----
        "drafts.save" => {
            let conn = need_db!(state, req.id);
            let session = need_session!(state, req.id);
            let title = req
                .params
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled")
                .to_string();
            let draft = drafts::build_draft(
                conn,
                session.content_type,
                session.sub_key.as_deref(),
                session.board.buckets().to_vec(),
                session.board.item_placements(),
                title,
                false,
            );
            let summary = json!({
                "draftId": draft.id,
                "completionPercent": draft.completion_percent,
                "savedAt": draft.saved_at.clone()
            });
            if let Err(e) = drafts::write(conn, draft) {
                warn!("manual draft save failed: {e}");
                return err(req.id, "save_failed", "could not save draft");
            }
            ok(req.id, summary)
        }
        "drafts.list" => {
            let conn = need_db!(state, req.id);
            let Some(ct) = req
                .params
                .get("contentType")
                .and_then(|v| v.as_str())
                .and_then(ContentType::parse)
            else {
                return err(req.id, "bad_params", "missing or unknown contentType");
            };
            let is_auto = req
                .params
                .get("isAutoSave")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let sub_key = req.params.get("subKey").and_then(|v| v.as_str());
            let listed = drafts::list(conn, ct, is_auto, sub_key);
            ok(req.id, json!({ "drafts": listed }))
        }
        "drafts.get" => {
            let conn = need_db!(state, req.id);
            let Some(id) = req.params.get("id").and_then(|v| v.as_i64()) else {
                return err(req.id, "bad_params", "missing id");
            };
            match drafts::get(conn, id) {
                Some(d) => ok(req.id, json!({ "draft": d })),
                None => err(req.id, "draft_not_found", format!("no draft with id {id}")),
            }
        }
        "drafts.clearAll" => {
            let conn = need_db!(state, req.id);
            let Some(ct) = req
                .params
                .get("contentType")
                .and_then(|v| v.as_str())
                .and_then(ContentType::parse)
            else {
                return err(req.id, "bad_params", "missing or unknown contentType");
            };
            match drafts::clear_all(conn, ct) {
                Ok(()) => ok(req.id, json!({})),
                Err(e) => err(req.id, "db_write_failed", e.to_string()),
            }
        }

        // ---- Vote aggregator ----
        "votes.saveChoices" => {
            let conn = need_db!(state, req.id);
            let choices: Vec<votes::Choice> = match req
                .params
                .get("choices")
                .cloned()
                .map(serde_json::from_value)
            {
                Some(Ok(v)) => v,
                _ => return err(req.id, "bad_params", "missing or malformed choices"),
            };
            match votes::save_choices(conn, &choices) {
                Ok(applied) => ok(req.id, json!({ "applied": applied })),
                Err(e) => {
                    warn!("vote save failed: {e}");
                    err(req.id, "save_failed", "could not save your choices")
                }
            }
        }
        "votes.resultsForPairs" => {
            let conn = need_db!(state, req.id);
            let pairs: Vec<(String, String)> =
                match req.params.get("pairs").cloned().map(serde_json::from_value) {
                    Some(Ok(v)) => v,
                    _ => return err(req.id, "bad_params", "missing or malformed pairs"),
                };
            match votes::results_for_pairs(conn, &pairs) {
                Ok(results) => ok(req.id, json!({ "results": results })),
                Err(e) => err(req.id, "db_query_failed", e.to_string()),
            }
        }

        // ---- Rasterizer call contract ----
        "export.plan" => {
            let session = need_session!(state, req.id);
            let plan = raster::plan_for(session.content_type);
            ok(
                req.id,
                json!({
                    "plan": plan,
                    "failureAdvisory": raster::EXPORT_FAILED_ADVISORY
                }),
            )
        }

        _ => err(
            req.id,
            "not_implemented",
            format!("unknown method: {}", req.method),
        ),
    }
}

fn handoff_get(conn: &Connection, key: &str) -> Option<String> {
    use rusqlite::OptionalExtension;
    conn.query_row("SELECT value FROM handoff WHERE key = ?", [key], |row| {
        row.get(0)
    })
    .optional()
    .ok()
    .flatten()
}

fn default_buckets(content_type: ContentType) -> Vec<Bucket> {
    let defs: &[(&str, &str, &str)] = match content_type {
        ContentType::Member | ContentType::Video | ContentType::Ramadan => &[
            ("tier-s", "S", "red"),
            ("tier-a", "A", "orange"),
            ("tier-b", "B", "yellow"),
            ("tier-c", "C", "green"),
            ("tier-d", "D", "blue"),
        ],
        ContentType::Song | ContentType::Setlist => &[
            ("main-set", "Main set", "purple"),
            ("encore", "Encore", "pink"),
        ],
    };
    defs.iter()
        .enumerate()
        .map(|(i, (id, name, color))| Bucket {
            id: id.to_string(),
            display_name: name.to_string(),
            color_token: color.to_string(),
            ordinal: i as i64,
        })
        .collect()
}

/// Run the autosave check after an engine mutation. A write failure is logged
/// and swallowed; autosave must never interrupt the interaction.
fn autosave_if_due(conn: &Connection, session: &mut Session) -> Option<i64> {
    if !session.tracker.observe(session.board.pool_len()) {
        return None;
    }
    let draft = drafts::build_draft(
        conn,
        session.content_type,
        session.sub_key.as_deref(),
        session.board.buckets().to_vec(),
        session.board.item_placements(),
        "Autosave".to_string(),
        true,
    );
    let id = draft.id;
    match drafts::write(conn, draft) {
        Ok(()) => Some(id),
        Err(e) => {
            warn!("autosave write failed: {e}");
            None
        }
    }
}

fn item_json(item: &SourceItem, original_index: u32) -> serde_json::Value {
    let kind = match &item.kind {
        ItemKind::Image { generation } => json!({ "type": "image", "generation": generation }),
        ItemKind::Song { set } => json!({ "type": "song", "set": set }),
    };
    json!({
        "id": item.id(),
        "displayName": item.display_label(),
        "originalIndex": original_index,
        "kind": kind
    })
}

fn board_result(session: &Session, autosaved_draft_id: Option<i64>) -> serde_json::Value {
    let board = &session.board;
    let pool: Vec<serde_json::Value> = board
        .bucket_entries(POOL_BUCKET_ID)
        .iter()
        .map(|e| item_json(&e.item, e.original_index))
        .collect();
    let buckets: Vec<serde_json::Value> = board
        .buckets()
        .iter()
        .map(|b| {
            let items: Vec<serde_json::Value> = board
                .bucket_entries(&b.id)
                .iter()
                .map(|e| item_json(&e.item, e.original_index))
                .collect();
            json!({
                "id": b.id,
                "displayName": b.display_name,
                "colorToken": b.color_token,
                "ordinal": b.ordinal,
                "items": items
            })
        })
        .collect();
    json!({
        "contentType": session.content_type.as_str(),
        "subKey": session.sub_key,
        "dragMode": board.drag_mode(),
        "selectedItemId": board.selected_item_id(),
        "draggingItemId": board.dragging_item_id(),
        "changeCounter": session.tracker.counter(),
        "completionPercent": board.completion_percent(),
        "totalItems": board.entries().len(),
        "currentDraftId": session.current_draft_id,
        "pool": pool,
        "buckets": buckets,
        "autosavedDraftId": autosaved_draft_id
    })
}
