/// Integration sync bridge
///
/// Installing an integration into a workspace provisions a bot identity that
/// acts on behalf of the provider:
///
/// ```text
///   install    bot user + bot API token + workspace_integrations row
///              + bot workspace membership (Admin)          one transaction
///   resync     drop project's repository + sync, insert repository,
///              get-or-create "GitHub" label, insert sync,
///              bot project membership (Admin)               one transaction
///   uninstall  remote App uninstall, then drop the integration row
///              (cascades syncs), bot token and memberships  one transaction
/// ```
///
/// The bridge only records linkage. Pushing issues or comments to GitHub is
/// done by the caller, which reports the resulting remote ids back through
/// [`SyncBridge::create_issue_sync`] and friends.

use serde::Deserialize;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::{hash_password, random_unusable_password, PasswordError};
use crate::context::RequestContext;
use crate::github::{GithubClient, GithubError};
use crate::models::api_token::{ApiToken, CreateApiToken, TokenUserType};
use crate::models::github::{
    GithubCommentSync, GithubIssueSync, GithubRepository, GithubRepositorySync,
    NewGithubRepository, NewIssueSync, NewRepositorySync, RepositorySyncDetail,
};
use crate::models::integration::{Integration, NewWorkspaceIntegration, WorkspaceIntegration};
use crate::models::is_unique_violation;
use crate::models::issue::{Issue, IssueComment};
use crate::models::label::{CreateLabel, Label};
use crate::models::project::{Project, ProjectMember};
use crate::models::role::{ProjectRole, WorkspaceRole};
use crate::models::user::{CreateUser, User};
use crate::models::workspace::WorkspaceMember;

pub const SYNC_LABEL_NAME: &str = "GitHub";
pub const SYNC_LABEL_COLOR: &str = "#003773";
pub const SYNC_LABEL_DESCRIPTION: &str = "Label to sync Plane issues with GitHub issues";

const WORKSPACE_INTEGRATION_KEY: &str = "workspace_integrations_workspace_integration_key";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Installation ID is required")]
    MissingInstallationId,

    #[error("Integration is already active in the workspace")]
    AlreadyActive,

    #[error("Workspace or Integration not found")]
    IntegrationNotFound,

    #[error("Workspace Integration does not exist")]
    WorkspaceIntegrationNotFound,

    #[error("Name, url, repository_id and owner are required")]
    MissingRepositoryFields,

    #[error("Not a github integration")]
    NotGithub,

    #[error("Project does not exist")]
    ProjectNotFound,

    #[error("Repository sync does not exist")]
    RepositorySyncNotFound,

    #[error("Issue sync does not exist")]
    IssueSyncNotFound,

    #[error("Issue does not exist")]
    IssueNotFound,

    #[error("Comment does not exist")]
    CommentNotFound,

    #[error("Installation metadata is missing {0}")]
    MissingMetadata(&'static str),

    #[error("GitHub request failed: {0}")]
    Remote(#[from] GithubError),

    #[error("Failed to provision bot credentials: {0}")]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Domain used for generated bot addresses
    pub bot_email_domain: String,

    /// Abort uninstall when the remote App uninstall fails
    pub strict_remote_teardown: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            bot_email_domain: "plane.so".to_string(),
            strict_remote_teardown: false,
        }
    }
}

/// Body of a repository sync request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositorySyncInput {
    pub name: Option<String>,
    pub url: Option<String>,
    pub repository_id: Option<i64>,
    pub owner: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub credentials: Option<serde_json::Value>,
}

impl RepositorySyncInput {
    fn into_repository(self) -> Result<(NewGithubRepository, serde_json::Value), SyncError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

        match (&self.name, &self.url, self.repository_id, &self.owner) {
            (name, url, Some(repository_id), owner)
                if present(name) && present(url) && present(owner) && repository_id != 0 =>
            {
                let repository = NewGithubRepository {
                    name: self.name.unwrap_or_default(),
                    url: self.url,
                    config: self.config.unwrap_or_else(|| serde_json::json!({})),
                    repository_id,
                    owner: self.owner.unwrap_or_default(),
                };
                let credentials = self.credentials.unwrap_or_else(|| serde_json::json!({}));
                Ok((repository, credentials))
            }
            _ => Err(SyncError::MissingRepositoryFields),
        }
    }
}

/// Generated address for a bot user
pub fn bot_email(domain: &str) -> String {
    format!("{}@{}", Uuid::new_v4().simple(), domain)
}

pub struct SyncBridge {
    pool: PgPool,
    github: Arc<dyn GithubClient>,
    settings: SyncSettings,
}

impl SyncBridge {
    pub fn new(pool: PgPool, github: Arc<dyn GithubClient>, settings: SyncSettings) -> Self {
        Self {
            pool,
            github,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Installs `provider` into the workspace
    ///
    /// # Errors
    ///
    /// - [`SyncError::MissingInstallationId`] without an installation id
    /// - [`SyncError::IntegrationNotFound`] for an unknown provider
    /// - [`SyncError::AlreadyActive`] when the workspace already has it
    pub async fn install(
        &self,
        ctx: &RequestContext,
        workspace_id: Uuid,
        provider: &str,
        installation_id: Option<i64>,
    ) -> Result<WorkspaceIntegration, SyncError> {
        let installation_id = installation_id.ok_or(SyncError::MissingInstallationId)?;

        let integration = Integration::find_by_provider(&self.pool, provider)
            .await?
            .ok_or(SyncError::IntegrationNotFound)?;

        // The unique key still guards the insert against a concurrent install
        if WorkspaceIntegration::is_installed(&self.pool, workspace_id, integration.id).await? {
            return Err(SyncError::AlreadyActive);
        }

        let (metadata, config) = if integration.is_github() {
            let metadata = self.github.installation_metadata(installation_id).await?;
            (metadata, serde_json::json!({ "installation_id": installation_id }))
        } else {
            (serde_json::json!({}), serde_json::json!({}))
        };

        let password_hash = hash_password(&random_unusable_password())?;

        let mut tx = self.pool.begin().await?;

        let mut bot = CreateUser::new(bot_email(&self.settings.bot_email_domain), password_hash)
            .password_autoset();
        bot.is_bot = true;
        bot.first_name = integration.title.clone();
        bot.avatar = integration.avatar_url.clone().unwrap_or_default();
        let bot = User::create(&mut *tx, bot).await?;

        let (token, _) = ApiToken::create(
            &mut *tx,
            CreateApiToken {
                user_id: bot.id,
                workspace_id: Some(workspace_id),
                label: None,
                user_type: TokenUserType::Bot,
                created_by: Some(ctx.actor_id),
            },
        )
        .await?;

        let installed = WorkspaceIntegration::create(
            &mut *tx,
            NewWorkspaceIntegration {
                workspace_id,
                integration_id: integration.id,
                actor_id: bot.id,
                api_token_id: token.id,
                metadata,
                config,
                created_by: ctx.actor_id,
            },
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e, WORKSPACE_INTEGRATION_KEY) {
                SyncError::AlreadyActive
            } else {
                SyncError::Database(e)
            }
        })?;

        WorkspaceMember::add(&mut *tx, ctx, workspace_id, bot.id, WorkspaceRole::Admin).await?;

        tx.commit().await?;

        info!(
            workspace_id = %workspace_id,
            provider = %provider,
            bot_id = %bot.id,
            "Integration installed"
        );

        Ok(installed)
    }

    /// Removes an installation and everything it provisioned
    pub async fn uninstall(&self, workspace_id: Uuid, id: Uuid) -> Result<(), SyncError> {
        let installed = WorkspaceIntegration::find(&self.pool, workspace_id, id)
            .await?
            .ok_or(SyncError::WorkspaceIntegrationNotFound)?;

        let integration = Integration::find_by_id(&self.pool, installed.integration_id)
            .await?
            .ok_or(SyncError::IntegrationNotFound)?;

        if integration.is_github() {
            if let Some(installation_id) = installed.installation_id() {
                if let Err(e) = self.github.delete_installation(installation_id).await {
                    if self.settings.strict_remote_teardown {
                        return Err(SyncError::Remote(e));
                    }
                    warn!(
                        workspace_id = %workspace_id,
                        installation_id,
                        error = %e,
                        "Remote uninstall failed, removing local installation anyway"
                    );
                }
            }
        }

        let mut tx = self.pool.begin().await?;

        WorkspaceIntegration::delete(&mut *tx, installed.id).await?;
        ApiToken::delete(&mut *tx, installed.api_token_id).await?;
        WorkspaceMember::remove_user(&mut *tx, workspace_id, installed.actor_id).await?;
        ProjectMember::remove_user_from_workspace(&mut *tx, workspace_id, installed.actor_id)
            .await?;

        tx.commit().await?;

        info!(
            workspace_id = %workspace_id,
            workspace_integration_id = %installed.id,
            "Integration uninstalled"
        );

        Ok(())
    }

    /// Links the project to a repository, replacing any previous link
    pub async fn create_repository_sync(
        &self,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        workspace_integration_id: Uuid,
        input: RepositorySyncInput,
    ) -> Result<RepositorySyncDetail, SyncError> {
        let (repository, credentials) = input.into_repository()?;

        let installed = WorkspaceIntegration::find(&self.pool, workspace_id, workspace_integration_id)
            .await?
            .ok_or(SyncError::WorkspaceIntegrationNotFound)?;

        let mut tx = self.pool.begin().await?;

        // Dropping the repositories cascades the old sync and its issue/comment links
        let removed = GithubRepository::delete_for_project(&mut tx, project_id).await?;

        let repository =
            GithubRepository::create(&mut tx, ctx, workspace_id, project_id, repository).await?;

        let label = Label::get_or_create(
            &mut tx,
            ctx,
            workspace_id,
            project_id,
            CreateLabel {
                name: SYNC_LABEL_NAME.to_string(),
                description: SYNC_LABEL_DESCRIPTION.to_string(),
                color: SYNC_LABEL_COLOR.to_string(),
            },
        )
        .await?;

        let sync = GithubRepositorySync::create(
            &mut tx,
            ctx,
            workspace_id,
            project_id,
            NewRepositorySync {
                repository_id: repository.id,
                workspace_integration_id: installed.id,
                actor_id: installed.actor_id,
                credentials,
                label_id: Some(label.id),
            },
        )
        .await?;

        ProjectMember::ensure(
            &mut *tx,
            ctx,
            workspace_id,
            project_id,
            installed.actor_id,
            ProjectRole::Admin,
        )
        .await?;

        tx.commit().await?;

        info!(
            project_id = %project_id,
            repository = %repository.name,
            replaced = removed,
            "Repository sync created"
        );

        Ok(RepositorySyncDetail { sync, repository })
    }

    pub async fn list_repository_syncs(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<RepositorySyncDetail>, SyncError> {
        let mut conn = self.pool.acquire().await?;
        Ok(GithubRepositorySync::list_for_project(&mut conn, project_id).await?)
    }

    async fn repository_sync(
        &self,
        workspace_id: Uuid,
        project_id: Uuid,
        repository_sync_id: Uuid,
    ) -> Result<GithubRepositorySync, SyncError> {
        if !Project::belongs_to(&self.pool, workspace_id, project_id).await? {
            return Err(SyncError::ProjectNotFound);
        }
        GithubRepositorySync::find(&self.pool, project_id, repository_sync_id)
            .await?
            .ok_or(SyncError::RepositorySyncNotFound)
    }

    /// Records issue links in bulk; pairs already linked are skipped
    ///
    /// Every issue must belong to the project, otherwise nothing is written
    /// and [`SyncError::IssueNotFound`] is returned.
    pub async fn bulk_create_issue_syncs(
        &self,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        repository_sync_id: Uuid,
        rows: Vec<NewIssueSync>,
    ) -> Result<Vec<GithubIssueSync>, SyncError> {
        let sync = self
            .repository_sync(workspace_id, project_id, repository_sync_id)
            .await?;

        let issues: Vec<Uuid> = rows
            .iter()
            .map(|row| row.issue)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if Issue::count_in_project(&self.pool, project_id, &issues).await? != issues.len() as i64 {
            return Err(SyncError::IssueNotFound);
        }

        let mut tx = self.pool.begin().await?;
        let created = GithubIssueSync::bulk_create(&mut tx, ctx, &sync, &rows).await?;
        tx.commit().await?;

        info!(
            repository_sync_id = %sync.id,
            requested = rows.len(),
            created = created.len(),
            "Issue syncs recorded"
        );

        Ok(created)
    }

    pub async fn create_issue_sync(
        &self,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        repository_sync_id: Uuid,
        row: NewIssueSync,
    ) -> Result<GithubIssueSync, SyncError> {
        let sync = self
            .repository_sync(workspace_id, project_id, repository_sync_id)
            .await?;

        if Issue::find(&self.pool, project_id, row.issue).await?.is_none() {
            return Err(SyncError::IssueNotFound);
        }

        Ok(GithubIssueSync::create(&self.pool, ctx, &sync, row).await?)
    }

    pub async fn list_issue_syncs(
        &self,
        workspace_id: Uuid,
        project_id: Uuid,
        repository_sync_id: Uuid,
    ) -> Result<Vec<GithubIssueSync>, SyncError> {
        let sync = self
            .repository_sync(workspace_id, project_id, repository_sync_id)
            .await?;
        Ok(GithubIssueSync::list(&self.pool, sync.id).await?)
    }

    pub async fn create_comment_sync(
        &self,
        ctx: &RequestContext,
        workspace_id: Uuid,
        project_id: Uuid,
        repository_sync_id: Uuid,
        issue_sync_id: Uuid,
        comment_id: Uuid,
        repo_comment_id: i64,
    ) -> Result<GithubCommentSync, SyncError> {
        let sync = self
            .repository_sync(workspace_id, project_id, repository_sync_id)
            .await?;

        let issue_sync = GithubIssueSync::find_by_id(&self.pool, sync.id, issue_sync_id)
            .await?
            .ok_or(SyncError::IssueSyncNotFound)?;

        if IssueComment::find(&self.pool, issue_sync.issue_id, comment_id)
            .await?
            .is_none()
        {
            return Err(SyncError::CommentNotFound);
        }

        Ok(GithubCommentSync::create(&self.pool, ctx, &issue_sync, comment_id, repo_comment_id).await?)
    }

    pub async fn list_comment_syncs(
        &self,
        workspace_id: Uuid,
        project_id: Uuid,
        repository_sync_id: Uuid,
        issue_sync_id: Uuid,
    ) -> Result<Vec<GithubCommentSync>, SyncError> {
        let sync = self
            .repository_sync(workspace_id, project_id, repository_sync_id)
            .await?;
        let issue_sync = GithubIssueSync::find_by_id(&self.pool, sync.id, issue_sync_id)
            .await?
            .ok_or(SyncError::IssueSyncNotFound)?;
        Ok(GithubCommentSync::list(&self.pool, issue_sync.id).await?)
    }

    /// One page of repositories the installation can see
    pub async fn repositories(
        &self,
        workspace_id: Uuid,
        workspace_integration_id: Uuid,
        page: u32,
    ) -> Result<serde_json::Value, SyncError> {
        let installed = WorkspaceIntegration::find(&self.pool, workspace_id, workspace_integration_id)
            .await?
            .ok_or(SyncError::WorkspaceIntegrationNotFound)?;

        let integration = Integration::find_by_id(&self.pool, installed.integration_id)
            .await?
            .ok_or(SyncError::IntegrationNotFound)?;
        if !integration.is_github() {
            return Err(SyncError::NotGithub);
        }

        let (access_tokens_url, repositories_url) = remote_urls(&installed.metadata)?;
        Ok(self
            .github
            .list_repositories(access_tokens_url, repositories_url, page.max(1))
            .await?)
    }
}

fn remote_urls(metadata: &serde_json::Value) -> Result<(&str, &str), SyncError> {
    let access_tokens_url = metadata
        .get("access_tokens_url")
        .and_then(|v| v.as_str())
        .ok_or(SyncError::MissingMetadata("access_tokens_url"))?;
    let repositories_url = metadata
        .get("repositories_url")
        .and_then(|v| v.as_str())
        .ok_or(SyncError::MissingMetadata("repositories_url"))?;
    Ok((access_tokens_url, repositories_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> RepositorySyncInput {
        RepositorySyncInput {
            name: Some("plane".to_string()),
            url: Some("https://github.com/makeplane/plane".to_string()),
            repository_id: Some(4242),
            owner: Some("makeplane".to_string()),
            config: None,
            credentials: None,
        }
    }

    #[test]
    fn test_repository_input_complete() {
        let (repo, credentials) = input().into_repository().unwrap();
        assert_eq!(repo.name, "plane");
        assert_eq!(repo.repository_id, 4242);
        assert_eq!(repo.config, serde_json::json!({}));
        assert_eq!(credentials, serde_json::json!({}));
    }

    #[test]
    fn test_repository_input_requires_every_field() {
        let cases = [
            RepositorySyncInput { name: None, ..input() },
            RepositorySyncInput { url: Some("  ".to_string()), ..input() },
            RepositorySyncInput { repository_id: None, ..input() },
            RepositorySyncInput { repository_id: Some(0), ..input() },
            RepositorySyncInput { owner: None, ..input() },
        ];

        for case in cases {
            let err = case.into_repository().unwrap_err();
            assert_eq!(err.to_string(), "Name, url, repository_id and owner are required");
        }
    }

    #[test]
    fn test_bot_email_is_unique_per_call() {
        let a = bot_email("plane.so");
        let b = bot_email("plane.so");
        assert!(a.ends_with("@plane.so"));
        assert_eq!(a.split('@').next().unwrap().len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_remote_urls() {
        let metadata = serde_json::json!({
            "access_tokens_url": "https://api.github.com/app/installations/1/access_tokens",
            "repositories_url": "https://api.github.com/installation/repositories",
        });
        let (tokens, repos) = remote_urls(&metadata).unwrap();
        assert!(tokens.ends_with("access_tokens"));
        assert!(repos.ends_with("repositories"));

        let err = remote_urls(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, SyncError::MissingMetadata("access_tokens_url")));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(SyncError::MissingInstallationId.to_string(), "Installation ID is required");
        assert_eq!(
            SyncError::AlreadyActive.to_string(),
            "Integration is already active in the workspace"
        );
        assert_eq!(SyncError::NotGithub.to_string(), "Not a github integration");
    }
}
