/// Issues and their satellites
///
/// An issue owns several relationship sets (assignees, labels, blockers and
/// the issues it blocks). Each set is updated by replacement: the existing rows
/// are deleted and the new set is bulk-inserted. The replacement, the issue row
/// write and its activity entry all share one transaction, so readers never
/// observe a half-replaced set.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE issues (
///     id UUID PRIMARY KEY,
///     workspace_id UUID NOT NULL, project_id UUID NOT NULL,
///     name VARCHAR(255) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     priority VARCHAR(30),
///     start_date DATE, target_date DATE,
///     sequence_id INTEGER NOT NULL,
///     sort_order DOUBLE PRECISION NOT NULL DEFAULT 65535,
///     ...
///     UNIQUE (project_id, sequence_id)
/// );
///
/// -- satellites carry workspace_id/project_id redundantly
/// CREATE TABLE issue_assignees (issue_id, assignee_id, UNIQUE (issue_id, assignee_id));
/// CREATE TABLE issue_labels    (issue_id, label_id,    UNIQUE (issue_id, label_id));
/// CREATE TABLE issue_blockers  (block_id, blocked_by_id, UNIQUE (block_id, blocked_by_id));
/// CREATE TABLE issue_links     (issue_id, title, url);
/// CREATE TABLE issue_comments  (issue_id, actor_id, comment);
/// CREATE TABLE issue_activities(issue_id, actor_id, verb, field, old_value, new_value);
/// ```
///
/// # Example
///
/// ```no_run
/// use plane_shared::context::RequestContext;
/// use plane_shared::models::issue::{CreateIssue, Issue, UpdateIssue};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, ws: Uuid, project: Uuid, me: Uuid, alice: Uuid) -> Result<(), sqlx::Error> {
/// let ctx = RequestContext::new(me);
/// let issue = Issue::create(&pool, &ctx, ws, project, CreateIssue {
///     name: "Login page broken".to_string(),
///     assignees_list: Some(vec![me]),
///     ..Default::default()
/// }).await?;
///
/// // Replaces the whole assignee set
/// Issue::update(&pool, &ctx, project, issue.id, UpdateIssue {
///     assignees_list: Some(vec![alice]),
///     ..Default::default()
/// }).await?;
/// # Ok(())
/// # }
/// ```

use super::BULK_CHUNK_SIZE;
use crate::context::RequestContext;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Issue priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuePriority {
    Urgent,
    High,
    Medium,
    Low,
    None,
}

impl IssuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuePriority::Urgent => "urgent",
            IssuePriority::High => "high",
            IssuePriority::Medium => "medium",
            IssuePriority::Low => "low",
            IssuePriority::None => "none",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Issue {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: String,
    pub priority: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,

    /// 1-based counter per project
    pub sequence_id: i32,

    pub sort_order: f64,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Issue with its relationship sets resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueDetail {
    #[serde(flatten)]
    pub issue: Issue,
    pub assignees: Vec<Uuid>,
    pub labels: Vec<Uuid>,

    /// Issues blocking this one
    pub blockers: Vec<Uuid>,

    /// Issues this one blocks
    pub blocks: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateIssue {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub priority: Option<IssuePriority>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub sort_order: Option<f64>,
    pub assignees_list: Option<Vec<Uuid>>,
    pub labels_list: Option<Vec<Uuid>>,
    pub blockers_list: Option<Vec<Uuid>>,
    pub blocks_list: Option<Vec<Uuid>>,
}

/// Partial update; every `Some` list replaces the corresponding set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateIssue {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<IssuePriority>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub sort_order: Option<f64>,
    pub assignees_list: Option<Vec<Uuid>>,
    pub labels_list: Option<Vec<Uuid>>,
    pub blockers_list: Option<Vec<Uuid>>,
    pub blocks_list: Option<Vec<Uuid>>,
}

/// A relationship set keyed by one issue column
#[derive(Debug, Clone, Copy)]
struct SatelliteSet {
    table: &'static str,
    owner_col: &'static str,
    other_col: &'static str,
    field: &'static str,
}

const ASSIGNEES: SatelliteSet = SatelliteSet {
    table: "issue_assignees",
    owner_col: "issue_id",
    other_col: "assignee_id",
    field: "assignees",
};

const LABELS: SatelliteSet = SatelliteSet {
    table: "issue_labels",
    owner_col: "issue_id",
    other_col: "label_id",
    field: "labels",
};

const BLOCKERS: SatelliteSet = SatelliteSet {
    table: "issue_blockers",
    owner_col: "block_id",
    other_col: "blocked_by_id",
    field: "blockers",
};

const BLOCKS: SatelliteSet = SatelliteSet {
    table: "issue_blockers",
    owner_col: "blocked_by_id",
    other_col: "block_id",
    field: "blocks",
};

/// Sorted, de-duplicated copy with the issue itself removed
fn normalize_set(issue_id: Uuid, ids: &[Uuid]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = ids.iter().copied().filter(|id| *id != issue_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

async fn replace_set(
    conn: &mut PgConnection,
    ctx: &RequestContext,
    set: SatelliteSet,
    issue: &Issue,
    ids: &[Uuid],
) -> Result<Vec<Uuid>, sqlx::Error> {
    let delete = format!("DELETE FROM {} WHERE {} = $1", set.table, set.owner_col);
    sqlx::query(&delete)
        .bind(issue.id)
        .execute(&mut *conn)
        .await?;

    let ids = normalize_set(issue.id, ids);
    if ids.is_empty() {
        return Ok(ids);
    }

    let insert = format!(
        "INSERT INTO {} (workspace_id, project_id, {}, {}, created_by) ",
        set.table, set.owner_col, set.other_col
    );
    for chunk in ids.chunks(BULK_CHUNK_SIZE) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(&insert);
        builder.push_values(chunk, |mut row, other| {
            row.push_bind(issue.workspace_id)
                .push_bind(issue.project_id)
                .push_bind(issue.id)
                .push_bind(*other)
                .push_bind(ctx.actor_id);
        });
        builder.push(" ON CONFLICT DO NOTHING");
        builder.build().execute(&mut *conn).await?;
    }

    Ok(ids)
}

async fn read_set(
    executor: impl PgExecutor<'_>,
    set: SatelliteSet,
    issue_id: Uuid,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let select = format!(
        "SELECT {} FROM {} WHERE {} = $1 ORDER BY created_at",
        set.other_col, set.table, set.owner_col
    );
    sqlx::query_scalar::<_, Uuid>(&select)
        .bind(issue_id)
        .fetch_all(executor)
        .await
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Replaces every provided relationship set, recording one activity per set
async fn replace_sets(
    conn: &mut PgConnection,
    ctx: &RequestContext,
    issue: &Issue,
    lists: [(SatelliteSet, Option<&Vec<Uuid>>); 4],
) -> Result<usize, sqlx::Error> {
    let mut replaced = 0;
    for (set, ids) in lists {
        if let Some(ids) = ids {
            let stored = replace_set(&mut *conn, ctx, set, issue, ids).await?;
            IssueActivity::record(
                &mut *conn,
                ctx,
                issue,
                "updated",
                Some(set.field),
                None,
                Some(join_ids(&stored)),
            )
            .await?;
            replaced += 1;
        }
    }
    Ok(replaced)
}

impl Issue {
    /// Creates an issue with its initial relationship sets
    ///
    /// The project row is locked while the next `sequence_id` is computed.
    pub async fn create(
        pool: &PgPool,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        data: CreateIssue,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT id FROM projects WHERE id = $1 FOR UPDATE")
            .bind(project_id)
            .fetch_one(&mut *tx)
            .await?;

        let sequence_id: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM issues WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await?;

        let issue = sqlx::query_as::<_, Issue>(
            r#"
            INSERT INTO issues (workspace_id, project_id, name, description, priority,
                                start_date, target_date, sequence_id, sort_order,
                                created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, 65535), $10, $10)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(project_id)
        .bind(data.name.trim())
        .bind(&data.description)
        .bind(data.priority.map(|p| p.as_str()))
        .bind(data.start_date)
        .bind(data.target_date)
        .bind(sequence_id)
        .bind(data.sort_order)
        .bind(ctx.actor_id)
        .fetch_one(&mut *tx)
        .await?;

        IssueActivity::record(&mut *tx, ctx, &issue, "created", None, None, None).await?;

        for (set, ids) in [
            (ASSIGNEES, data.assignees_list.as_ref()),
            (LABELS, data.labels_list.as_ref()),
            (BLOCKERS, data.blockers_list.as_ref()),
            (BLOCKS, data.blocks_list.as_ref()),
        ] {
            if let Some(ids) = ids {
                replace_set(&mut *tx, ctx, set, &issue, ids).await?;
            }
        }

        tx.commit().await?;

        tracing::debug!(issue_id = %issue.id, sequence_id, "Issue created");

        Ok(issue)
    }

    /// Applies a partial update
    ///
    /// Returns `None` when the issue does not exist in the project.
    pub async fn update(
        pool: &PgPool,
        ctx: &RequestContext,
        project_id: Uuid,
        id: Uuid,
        data: UpdateIssue,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(current) = sqlx::query_as::<_, Issue>(
            "SELECT * FROM issues WHERE project_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(project_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let issue = sqlx::query_as::<_, Issue>(
            r#"
            UPDATE issues
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                priority = COALESCE($4, priority),
                start_date = COALESCE($5, start_date),
                target_date = COALESCE($6, target_date),
                sort_order = COALESCE($7, sort_order),
                updated_by = $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name.as_deref().map(str::trim))
        .bind(data.description.as_deref())
        .bind(data.priority.map(|p| p.as_str()))
        .bind(data.start_date)
        .bind(data.target_date)
        .bind(data.sort_order)
        .bind(ctx.actor_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut recorded = 0;
        for change in field_changes(&current, &issue) {
            IssueActivity::record(
                &mut *tx,
                ctx,
                &issue,
                "updated",
                Some(change.field),
                change.old_value,
                change.new_value,
            )
            .await?;
            recorded += 1;
        }

        recorded += replace_sets(
            &mut *tx,
            ctx,
            &issue,
            [
                (ASSIGNEES, data.assignees_list.as_ref()),
                (LABELS, data.labels_list.as_ref()),
                (BLOCKERS, data.blockers_list.as_ref()),
                (BLOCKS, data.blocks_list.as_ref()),
            ],
        )
        .await?;

        if recorded == 0 {
            IssueActivity::record(&mut *tx, ctx, &issue, "updated", None, None, None).await?;
        }

        tx.commit().await?;

        Ok(Some(issue))
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Issue>("SELECT * FROM issues WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Loads an issue together with its relationship sets
    pub async fn detail(
        pool: &PgPool,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<IssueDetail>, sqlx::Error> {
        let Some(issue) = Self::find(pool, project_id, id).await? else {
            return Ok(None);
        };

        Ok(Some(IssueDetail {
            assignees: read_set(pool, ASSIGNEES, issue.id).await?,
            labels: read_set(pool, LABELS, issue.id).await?,
            blockers: read_set(pool, BLOCKERS, issue.id).await?,
            blocks: read_set(pool, BLOCKS, issue.id).await?,
            issue,
        }))
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Issue>(
            "SELECT * FROM issues WHERE project_id = $1 ORDER BY sequence_id DESC",
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
    }

    /// How many of `ids` are issues of this project
    pub async fn count_in_project(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        ids: &[Uuid],
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM issues WHERE project_id = $1 AND id = ANY($2)",
        )
        .bind(project_id)
        .bind(ids)
        .fetch_one(executor)
        .await
    }

    pub async fn delete(
        executor: impl PgExecutor<'_>,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM issues WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, PartialEq)]
struct FieldChange {
    field: &'static str,
    old_value: Option<String>,
    new_value: Option<String>,
}

fn field_changes(before: &Issue, after: &Issue) -> Vec<FieldChange> {
    fn diff<T: PartialEq + ToString>(
        field: &'static str,
        old: &Option<T>,
        new: &Option<T>,
        out: &mut Vec<FieldChange>,
    ) {
        if old != new {
            out.push(FieldChange {
                field,
                old_value: old.as_ref().map(ToString::to_string),
                new_value: new.as_ref().map(ToString::to_string),
            });
        }
    }

    let mut changes = Vec::new();
    diff(
        "name",
        &Some(before.name.clone()),
        &Some(after.name.clone()),
        &mut changes,
    );
    diff(
        "description",
        &Some(before.description.clone()),
        &Some(after.description.clone()),
        &mut changes,
    );
    diff("priority", &before.priority, &after.priority, &mut changes);
    diff("start_date", &before.start_date, &after.start_date, &mut changes);
    diff("target_date", &before.target_date, &after.target_date, &mut changes);
    changes
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IssueComment {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub issue_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub comment: String,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IssueComment {
    pub async fn create(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        issue: &Issue,
        comment: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, IssueComment>(
            r#"
            INSERT INTO issue_comments (workspace_id, project_id, issue_id, actor_id, comment,
                                        created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $4, $4)
            RETURNING *
            "#,
        )
        .bind(issue.workspace_id)
        .bind(issue.project_id)
        .bind(issue.id)
        .bind(ctx.actor_id)
        .bind(comment)
        .fetch_one(executor)
        .await
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        issue_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, IssueComment>(
            "SELECT * FROM issue_comments WHERE issue_id = $1 ORDER BY created_at",
        )
        .bind(issue_id)
        .fetch_all(executor)
        .await
    }

    pub async fn find(
        executor: impl PgExecutor<'_>,
        issue_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, IssueComment>(
            "SELECT * FROM issue_comments WHERE issue_id = $1 AND id = $2",
        )
        .bind(issue_id)
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn update(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        issue_id: Uuid,
        id: Uuid,
        comment: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, IssueComment>(
            r#"
            UPDATE issue_comments
            SET comment = $3, updated_by = $4, updated_at = NOW()
            WHERE issue_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(issue_id)
        .bind(id)
        .bind(comment)
        .bind(ctx.actor_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete(
        executor: impl PgExecutor<'_>,
        issue_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM issue_comments WHERE issue_id = $1 AND id = $2")
            .bind(issue_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IssueLink {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub issue_id: Uuid,
    pub title: String,
    pub url: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl IssueLink {
    pub async fn create(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        issue: &Issue,
        title: &str,
        url: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, IssueLink>(
            r#"
            INSERT INTO issue_links (workspace_id, project_id, issue_id, title, url, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(issue.workspace_id)
        .bind(issue.project_id)
        .bind(issue.id)
        .bind(title)
        .bind(url)
        .bind(ctx.actor_id)
        .fetch_one(executor)
        .await
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        issue_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, IssueLink>(
            "SELECT * FROM issue_links WHERE issue_id = $1 ORDER BY created_at",
        )
        .bind(issue_id)
        .fetch_all(executor)
        .await
    }

    pub async fn delete(
        executor: impl PgExecutor<'_>,
        issue_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM issue_links WHERE issue_id = $1 AND id = $2")
            .bind(issue_id)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Append-only change log for an issue
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IssueActivity {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub issue_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub verb: String,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IssueActivity {
    pub async fn record(
        executor: impl PgExecutor<'_>,
        ctx: &RequestContext,
        issue: &Issue,
        verb: &str,
        field: Option<&str>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO issue_activities (workspace_id, project_id, issue_id, actor_id, verb,
                                          field, old_value, new_value)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(issue.workspace_id)
        .bind(issue.project_id)
        .bind(issue.id)
        .bind(ctx.actor_id)
        .bind(verb)
        .bind(field)
        .bind(old_value)
        .bind(new_value)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn list(
        executor: impl PgExecutor<'_>,
        issue_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, IssueActivity>(
            "SELECT * FROM issue_activities WHERE issue_id = $1 ORDER BY created_at",
        )
        .bind(issue_id)
        .fetch_all(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> Issue {
        Issue {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "Broken login".to_string(),
            description: String::new(),
            priority: None,
            start_date: None,
            target_date: None,
            sequence_id: 1,
            sort_order: 65535.0,
            created_by: None,
            updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalize_set_dedupes_and_drops_self() {
        let me = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let set = normalize_set(me, &[a, b, a, me]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a));
        assert!(set.contains(&b));
        assert!(!set.contains(&me));
    }

    #[test]
    fn test_blocker_sets_mirror_columns() {
        assert_eq!(BLOCKERS.table, BLOCKS.table);
        assert_eq!(BLOCKERS.owner_col, BLOCKS.other_col);
        assert_eq!(BLOCKERS.other_col, BLOCKS.owner_col);
    }

    #[test]
    fn test_field_changes() {
        let before = issue();
        let mut after = before.clone();
        assert!(field_changes(&before, &after).is_empty());

        after.name = "Login fixed".to_string();
        after.priority = Some("high".to_string());

        let changes = field_changes(&before, &after);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "name");
        assert_eq!(changes[0].old_value.as_deref(), Some("Broken login"));
        assert_eq!(changes[1].field, "priority");
        assert_eq!(changes[1].old_value, None);
        assert_eq!(changes[1].new_value.as_deref(), Some("high"));
    }

    #[test]
    fn test_priority_serde() {
        let p: IssuePriority = serde_json::from_str("\"urgent\"").unwrap();
        assert_eq!(p, IssuePriority::Urgent);
        assert_eq!(p.as_str(), "urgent");
        assert!(serde_json::from_str::<IssuePriority>("\"critical\"").is_err());
    }

    #[test]
    fn test_detail_flattens_issue() {
        let detail = IssueDetail {
            issue: issue(),
            assignees: vec![Uuid::new_v4()],
            labels: vec![],
            blockers: vec![],
            blocks: vec![],
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["name"], "Broken login");
        assert_eq!(json["assignees"].as_array().unwrap().len(), 1);
    }
}
