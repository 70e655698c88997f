/// Integration sync bridge against a live database
///
/// Run with: cargo test --test db_sync_tests -- --ignored

mod common;

use plane_shared::context::RequestContext;
use plane_shared::github::StaticGithubClient;
use plane_shared::models::github::{GithubRepositorySync, NewIssueSync};
use plane_shared::models::issue::{CreateIssue, Issue};
use plane_shared::models::label::Label;
use plane_shared::models::project::ProjectMember;
use plane_shared::models::role::{ProjectRole, WorkspaceRole};
use plane_shared::models::user::User;
use plane_shared::models::workspace::WorkspaceMember;
use plane_shared::sync::{
    RepositorySyncInput, SyncBridge, SyncError, SyncSettings, SYNC_LABEL_COLOR, SYNC_LABEL_NAME,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

fn repo(name: &str, repository_id: i64) -> RepositorySyncInput {
    RepositorySyncInput {
        name: Some(name.to_string()),
        url: Some(format!("https://github.com/acme/{}", name)),
        repository_id: Some(repository_id),
        owner: Some("acme".to_string()),
        config: None,
        credentials: None,
    }
}

async fn issue_in(
    pool: &PgPool,
    ctx: &RequestContext,
    workspace_id: Uuid,
    project_id: Uuid,
    name: &str,
) -> Issue {
    Issue::create(
        pool,
        ctx,
        workspace_id,
        project_id,
        CreateIssue {
            name: name.to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_install_provisions_bot_and_rejects_duplicates() {
    let pool = common::pool().await;
    let owner = common::user(&pool).await;
    let workspace = common::workspace(&pool, &owner).await;
    let ctx = RequestContext::new(owner.id);
    let github = Arc::new(StaticGithubClient::new());
    let bridge = SyncBridge::new(pool.clone(), github.clone(), SyncSettings::default());

    let err = bridge.install(&ctx, workspace.id, "github", None).await.unwrap_err();
    assert!(matches!(err, SyncError::MissingInstallationId));

    let installed = bridge.install(&ctx, workspace.id, "github", Some(77)).await.unwrap();
    assert_eq!(installed.installation_id(), Some(77));
    assert!(installed.metadata["access_tokens_url"].is_string());

    let bot = User::find_by_id(&pool, installed.actor_id).await.unwrap().unwrap();
    assert!(bot.is_bot);
    assert!(bot.is_password_autoset);
    assert_eq!(bot.first_name, "GitHub");
    assert!(bot.email.ends_with("@plane.so"));

    let role = WorkspaceMember::role_of(&pool, workspace.id, bot.id).await.unwrap();
    assert_eq!(role, Some(WorkspaceRole::Admin));

    let err = bridge.install(&ctx, workspace.id, "github", Some(78)).await.unwrap_err();
    assert!(matches!(err, SyncError::AlreadyActive));

    // The duplicate is refused before GitHub is asked about installation 78
    assert_eq!(github.looked_up(), vec![77]);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_bulk_issue_sync_rejects_issues_from_other_projects() {
    let pool = common::pool().await;
    let owner = common::user(&pool).await;
    let workspace = common::workspace(&pool, &owner).await;
    let project = common::project(&pool, &owner, &workspace, "SYN").await;
    let other = common::project(&pool, &owner, &workspace, "OTH").await;
    let ctx = RequestContext::new(owner.id);
    let bridge = SyncBridge::new(pool.clone(), Arc::new(StaticGithubClient::new()), SyncSettings::default());

    let installed = bridge.install(&ctx, workspace.id, "github", Some(5)).await.unwrap();
    let linked = bridge
        .create_repository_sync(&ctx, workspace.id, project.id, installed.id, repo("api", 500))
        .await
        .unwrap();

    let own = issue_in(&pool, &ctx, workspace.id, project.id, "Ours").await;
    let foreign = issue_in(&pool, &ctx, workspace.id, other.id, "Theirs").await;

    let link = |issue: &Issue, number: i64| NewIssueSync {
        issue: issue.id,
        repo_issue_id: number,
        github_issue_id: 700000 + number,
        issue_url: format!("https://github.com/acme/api/issues/{}", number),
    };

    let err = bridge
        .bulk_create_issue_syncs(
            &ctx,
            workspace.id,
            project.id,
            linked.sync.id,
            vec![link(&own, 1), link(&foreign, 2)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::IssueNotFound));

    // Nothing from the rejected batch was written
    assert!(bridge
        .list_issue_syncs(workspace.id, project.id, linked.sync.id)
        .await
        .unwrap()
        .is_empty());

    let created = bridge
        .bulk_create_issue_syncs(&ctx, workspace.id, project.id, linked.sync.id, vec![link(&own, 1)])
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_resync_replaces_repository_and_drops_issue_links() {
    let pool = common::pool().await;
    let owner = common::user(&pool).await;
    let workspace = common::workspace(&pool, &owner).await;
    let project = common::project(&pool, &owner, &workspace, "GH").await;
    let ctx = RequestContext::new(owner.id);
    let bridge = SyncBridge::new(pool.clone(), Arc::new(StaticGithubClient::new()), SyncSettings::default());

    let installed = bridge.install(&ctx, workspace.id, "github", Some(1)).await.unwrap();

    let first = bridge
        .create_repository_sync(&ctx, workspace.id, project.id, installed.id, repo("api", 100))
        .await
        .unwrap();

    let issue = Issue::create(
        &pool,
        &ctx,
        workspace.id,
        project.id,
        CreateIssue {
            name: "Mirror me".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let link = NewIssueSync {
        issue: issue.id,
        repo_issue_id: 12,
        github_issue_id: 900012,
        issue_url: "https://github.com/acme/api/issues/12".to_string(),
    };
    let created = bridge
        .bulk_create_issue_syncs(&ctx, workspace.id, project.id, first.sync.id, vec![link.clone(), link.clone()])
        .await
        .unwrap();
    assert_eq!(created.len(), 1);

    let again = bridge
        .bulk_create_issue_syncs(&ctx, workspace.id, project.id, first.sync.id, vec![link])
        .await
        .unwrap();
    assert!(again.is_empty());

    let second = bridge
        .create_repository_sync(&ctx, workspace.id, project.id, installed.id, repo("web", 200))
        .await
        .unwrap();

    let syncs = bridge.list_repository_syncs(project.id).await.unwrap();
    assert_eq!(syncs.len(), 1);
    assert_eq!(syncs[0].repository.name, "web");
    assert!(GithubRepositorySync::find(&pool, project.id, first.sync.id)
        .await
        .unwrap()
        .is_none());
    assert!(bridge
        .list_issue_syncs(workspace.id, project.id, second.sync.id)
        .await
        .unwrap()
        .is_empty());

    let labels = Label::list(&pool, project.id).await.unwrap();
    let github_labels: Vec<_> = labels.iter().filter(|l| l.name == SYNC_LABEL_NAME).collect();
    assert_eq!(github_labels.len(), 1);
    assert_eq!(github_labels[0].color, SYNC_LABEL_COLOR);
    assert_eq!(second.sync.label_id, Some(github_labels[0].id));

    let role = ProjectMember::role_of(&pool, project.id, installed.actor_id).await.unwrap();
    assert_eq!(role, Some(ProjectRole::Admin));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_uninstall_removes_bot_access() {
    let pool = common::pool().await;
    let owner = common::user(&pool).await;
    let workspace = common::workspace(&pool, &owner).await;
    let project = common::project(&pool, &owner, &workspace, "RM").await;
    let ctx = RequestContext::new(owner.id);
    let github = Arc::new(StaticGithubClient::new());
    let bridge = SyncBridge::new(pool.clone(), github.clone(), SyncSettings::default());

    let installed = bridge.install(&ctx, workspace.id, "github", Some(5)).await.unwrap();
    bridge
        .create_repository_sync(&ctx, workspace.id, project.id, installed.id, repo("svc", 300))
        .await
        .unwrap();

    bridge.uninstall(workspace.id, installed.id).await.unwrap();

    assert_eq!(github.deleted(), vec![5]);
    assert!(bridge.list_repository_syncs(project.id).await.unwrap().is_empty());
    assert!(WorkspaceMember::role_of(&pool, workspace.id, installed.actor_id)
        .await
        .unwrap()
        .is_none());
    assert!(ProjectMember::role_of(&pool, project.id, installed.actor_id)
        .await
        .unwrap()
        .is_none());
    let tokens: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_tokens WHERE id = $1")
        .bind(installed.api_token_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tokens, 0);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_remote_teardown_failure_policy() {
    let pool = common::pool().await;
    let owner = common::user(&pool).await;
    let workspace = common::workspace(&pool, &owner).await;
    let ctx = RequestContext::new(owner.id);

    let strict = SyncBridge::new(
        pool.clone(),
        Arc::new(StaticGithubClient::failing_deletes()),
        SyncSettings {
            strict_remote_teardown: true,
            ..SyncSettings::default()
        },
    );
    let installed = strict.install(&ctx, workspace.id, "github", Some(9)).await.unwrap();
    let err = strict.uninstall(workspace.id, installed.id).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(_)));

    let lenient = SyncBridge::new(
        pool.clone(),
        Arc::new(StaticGithubClient::failing_deletes()),
        SyncSettings::default(),
    );
    lenient.uninstall(workspace.id, installed.id).await.unwrap();

    let err = lenient.uninstall(workspace.id, installed.id).await.unwrap_err();
    assert!(matches!(err, SyncError::WorkspaceIntegrationNotFound));
}
