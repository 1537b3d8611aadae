use log::warn;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// One answered "this or that" round from the voting game.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub option1: String,
    pub option2: String,
    pub chosen_option: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResult {
    pub option1: String,
    pub option2: String,
    pub option1_percent: f64,
    pub option2_percent: f64,
    pub total_votes: i64,
}

/// Rows are keyed by the alphabetically-sorted pair so (a, b) and (b, a)
/// accumulate into the same counters.
pub fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Upsert one increment per choice. A chosen option that matches neither side
/// of its pair is skipped with a warning; the count of applied choices is
/// returned.
pub fn save_choices(conn: &Connection, choices: &[Choice]) -> anyhow::Result<usize> {
    let mut applied = 0;
    for c in choices {
        if c.chosen_option != c.option1 && c.chosen_option != c.option2 {
            warn!(
                "skipping vote: chosen {:?} is neither {:?} nor {:?}",
                c.chosen_option, c.option1, c.option2
            );
            continue;
        }
        let (first, second) = pair_key(&c.option1, &c.option2);
        let (first_inc, second_inc) = if c.chosen_option == first {
            (1, 0)
        } else {
            (0, 1)
        };
        conn.execute(
            "INSERT INTO vote_pairs(first_option, second_option, first_count, second_count)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(first_option, second_option) DO UPDATE SET
               first_count = first_count + excluded.first_count,
               second_count = second_count + excluded.second_count",
            (first, second, first_inc, second_inc),
        )?;
        applied += 1;
    }
    Ok(applied)
}

fn percent(count: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Selection percentages per requested pair, in the caller's orientation.
/// Pairs with no recorded votes come back with zero totals.
pub fn results_for_pairs(
    conn: &Connection,
    pairs: &[(String, String)],
) -> anyhow::Result<Vec<PairResult>> {
    let mut out = Vec::with_capacity(pairs.len());
    for (a, b) in pairs {
        let (first, second) = pair_key(a, b);
        let row: Option<(i64, i64)> = conn
            .query_row(
                "SELECT first_count, second_count FROM vote_pairs
                 WHERE first_option = ? AND second_option = ?",
                (first, second),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (first_count, second_count) = row.unwrap_or((0, 0));
        let total = first_count + second_count;
        let (a_count, b_count) = if a.as_str() == first {
            (first_count, second_count)
        } else {
            (second_count, first_count)
        };
        out.push(PairResult {
            option1: a.clone(),
            option2: b.clone(),
            option1_percent: percent(a_count, total),
            option2_percent: percent(b_count, total),
            total_votes: total,
        });
    }
    Ok(out)
}
