// Ledger CRUD operations
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::db::{DbConnection, DbResult};
use super::models::{Artifact, ArtifactKind, ExperimentParams, ExperimentResult};
use crate::evaluation::{best_of, ResultRecord};

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&row.get::<_, String>(idx)?).map_err(|e| conversion_error(idx, e))
}

fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    row.get::<_, String>(idx)?
        .parse()
        .map_err(|e| conversion_error(idx, e))
}

const EXPERIMENT_COLUMNS: &str = "id, key, test_group, model, segment_window, segment_gap,
     smoothing_window, accuracy, smoothed_accuracy, top_k_accuracy, created_at, updated_at";

fn experiment_from_row(row: &Row<'_>) -> rusqlite::Result<ExperimentResult> {
    Ok(ExperimentResult {
        id: get_uuid(row, 0)?,
        params: ExperimentParams {
            key: row.get(1)?,
            test_group: row.get(2)?,
            model: row.get(3)?,
            segment_window: row.get(4)?,
            segment_gap: row.get(5)?,
            smoothing_window: row.get(6)?,
        },
        accuracy: row.get(7)?,
        smoothed_accuracy: row.get(8)?,
        top_k_accuracy: row.get(9)?,
        created_at: get_time(row, 10)?,
        updated_at: get_time(row, 11)?,
    })
}

// ==================== EXPERIMENT QUERIES ====================

/// Get the stored result for a combination key and test group
pub fn get_result(
    db: &DbConnection,
    key: &str,
    test_group: &str,
) -> DbResult<Option<ExperimentResult>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM experiments WHERE key = ?1 AND test_group = ?2",
        EXPERIMENT_COLUMNS
    ))?;

    match stmt.query_row(params![key, test_group], experiment_from_row) {
        Ok(result) => Ok(Some(result)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Insert or update a result, keeping the best value of each metric
pub fn upsert_result(
    db: &DbConnection,
    params: &ExperimentParams,
    record: &ResultRecord,
) -> DbResult<ExperimentResult> {
    let now = Utc::now();
    let existing = get_result(db, &params.key, &params.test_group)?;

    let result = match existing {
        Some(stored) => ExperimentResult {
            accuracy: best_of(Some(stored.accuracy), record.accuracy),
            smoothed_accuracy: best_of(Some(stored.smoothed_accuracy), record.smoothed_accuracy),
            top_k_accuracy: best_of(Some(stored.top_k_accuracy), record.top_k_accuracy),
            updated_at: now,
            params: params.clone(),
            ..stored
        },
        None => ExperimentResult {
            id: Uuid::new_v4(),
            params: params.clone(),
            accuracy: record.accuracy,
            smoothed_accuracy: record.smoothed_accuracy,
            top_k_accuracy: record.top_k_accuracy,
            created_at: now,
            updated_at: now,
        },
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO experiments (id, key, test_group, model, segment_window, segment_gap,
             smoothing_window, accuracy, smoothed_accuracy, top_k_accuracy, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(key, test_group) DO UPDATE SET
             model = excluded.model,
             accuracy = excluded.accuracy,
             smoothed_accuracy = excluded.smoothed_accuracy,
             top_k_accuracy = excluded.top_k_accuracy,
             updated_at = excluded.updated_at",
        params![
            result.id.to_string(),
            result.params.key,
            result.params.test_group,
            result.params.model,
            result.params.segment_window,
            result.params.segment_gap,
            result.params.smoothing_window,
            result.accuracy,
            result.smoothed_accuracy,
            result.top_k_accuracy,
            result.created_at.to_rfc3339(),
            result.updated_at.to_rfc3339(),
        ],
    )?;

    Ok(result)
}

/// All results, best smoothed accuracy first
pub fn list_results(db: &DbConnection, test_group: Option<&str>) -> DbResult<Vec<ExperimentResult>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM experiments
         WHERE ?1 IS NULL OR test_group = ?1
         ORDER BY smoothed_accuracy DESC, key ASC",
        EXPERIMENT_COLUMNS
    ))?;

    let results = stmt
        .query_map([test_group], experiment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(results)
}

// ==================== ARTIFACT QUERIES ====================

/// Record an artifact, replacing any earlier one of the same kind for the experiment
pub fn create_artifact(
    db: &DbConnection,
    experiment_id: Uuid,
    kind: ArtifactKind,
    path: String,
    sha256: String,
    bytes: i64,
) -> DbResult<Artifact> {
    let artifact = Artifact {
        id: Uuid::new_v4(),
        experiment_id,
        kind,
        path,
        sha256,
        bytes,
    };

    let conn = db.lock();
    let id: String = conn.query_row(
        "INSERT INTO artifacts (id, experiment_id, kind, path, sha256, bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(experiment_id, kind) DO UPDATE SET
            path = excluded.path,
            sha256 = excluded.sha256,
            bytes = excluded.bytes
         RETURNING id",
        params![
            artifact.id.to_string(),
            artifact.experiment_id.to_string(),
            artifact.kind.as_str(),
            artifact.path,
            artifact.sha256,
            artifact.bytes,
        ],
        |row| row.get(0),
    )?;

    Ok(Artifact {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        ..artifact
    })
}

pub fn list_artifacts(db: &DbConnection, experiment_id: &Uuid) -> DbResult<Vec<Artifact>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, experiment_id, kind, path, sha256, bytes
         FROM artifacts WHERE experiment_id = ?1 ORDER BY kind",
    )?;

    let artifacts = stmt
        .query_map([experiment_id.to_string()], |row| {
            let kind: String = row.get(2)?;
            Ok(Artifact {
                id: get_uuid(row, 0)?,
                experiment_id: get_uuid(row, 1)?,
                kind: ArtifactKind::parse(&kind).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        Type::Text,
                        format!("unknown artifact kind '{}'", kind).into(),
                    )
                })?,
                path: row.get(3)?,
                sha256: row.get(4)?,
                bytes: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(artifacts)
}
