//! Work-item store adapter over the store CLI and its `SQLite` database.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::command::Cli;
use super::{DriverFuture, WorkStore, WorkUpdate};
use crate::models::work_item::{WorkFilter, WorkItem, PROJECT_LABEL};
use crate::AppError;

/// Aggregates holding a `tracks` dependency on `?1`, either bare or as the
/// suffix of a namespaced `<prefix>:?1` reference.
///
/// `LIKE` ignores ASCII case in `SQLite`, so the suffix is compared exactly
/// as well.
const TRACKING_QUERY: &str = r"SELECT DISTINCT issue_id FROM dependencies
 WHERE type = 'tracks'
   AND (depends_on_id = ?1
        OR (depends_on_id LIKE ?2 ESCAPE ''
            AND substr(depends_on_id, -length(?1)) = ?1))";

/// Reads and updates items through `<store> show|list|update --json`, and
/// answers tracking queries directly against the store database.
#[derive(Debug, Clone)]
pub struct CliWorkStore {
    cli: Cli,
    database: SqlitePool,
}

impl CliWorkStore {
    /// Adapter using `cli` for item operations and `database` for tracking lookups.
    #[must_use]
    pub fn new(cli: Cli, database: SqlitePool) -> Self {
        Self { cli, database }
    }
}

/// Read-only pool over the store database at `path`.
///
/// No connection is made until the first query, so a town without a store
/// database still starts.
#[must_use]
pub fn open_store_database(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    SqlitePoolOptions::new()
        .max_connections(2)
        .connect_lazy_with(options)
}

/// Aggregates in `pool` linked to `item_id` by a `tracks` dependency.
///
/// # Errors
///
/// Returns `AppError::Store` if the database cannot be opened or queried.
pub async fn tracking_aggregates_in(
    pool: &SqlitePool,
    item_id: &str,
) -> crate::Result<Vec<String>> {
    let namespaced = format!("%:{}", escape_like(item_id));
    let rows: Vec<String> = sqlx::query_scalar(TRACKING_QUERY)
        .bind(item_id)
        .bind(namespaced)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// `raw` with `LIKE` wildcards and the escape character itself escaped by `\`.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn parse_items(raw: &str) -> crate::Result<Vec<WorkItem>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed)
        .map_err(|err| AppError::Store(format!("unexpected store output: {err}")))
}

impl WorkStore for CliWorkStore {
    fn show(&self, id: &str) -> DriverFuture<'_, WorkItem> {
        let id = id.to_owned();
        Box::pin(async move {
            let out = self
                .cli
                .stdout(&["show", &id, "--json"])
                .await
                .map_err(AppError::Store)?;
            parse_items(&out)?
                .into_iter()
                .next()
                .ok_or_else(|| AppError::NotFound(format!("work item {id}")))
        })
    }

    fn list(&self, filter: &WorkFilter) -> DriverFuture<'_, Vec<WorkItem>> {
        let filter = filter.clone();
        Box::pin(async move {
            let mut args = vec!["list".to_owned(), "--json".to_owned()];
            if let Some(issue_type) = &filter.issue_type {
                args.push(format!("--type={issue_type}"));
            }
            if let Some(status) = &filter.status {
                args.push(format!("--status={status}"));
            }
            if let Some(project) = &filter.project {
                args.push(format!("--label={PROJECT_LABEL}{project}"));
            }
            if filter.unassigned {
                args.push("--no-assignee".to_owned());
            }
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            let out = self.cli.stdout(&args).await.map_err(AppError::Store)?;
            // Older store versions ignore --no-assignee.
            Ok(parse_items(&out)?
                .into_iter()
                .filter(|item| filter.matches(item))
                .collect())
        })
    }

    fn update(&self, id: &str, update: &WorkUpdate) -> DriverFuture<'_, ()> {
        let id = id.to_owned();
        let update = update.clone();
        Box::pin(async move {
            let mut args = vec!["update".to_owned(), id];
            if let Some(description) = update.description {
                args.push("--description".to_owned());
                args.push(description);
            }
            if let Some(agent_state) = update.agent_state {
                args.push("--agent-state".to_owned());
                args.push(agent_state);
            }
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            self.cli
                .stdout(&args)
                .await
                .map(|_| ())
                .map_err(AppError::Store)
        })
    }

    fn tracking_aggregates(&self, item_id: &str) -> DriverFuture<'_, Vec<String>> {
        let item_id = item_id.to_owned();
        Box::pin(async move { tracking_aggregates_in(&self.database, &item_id).await })
    }
}
