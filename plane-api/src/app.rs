/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use plane_api::{app::AppState, config::Config};
/// use plane_shared::redis::{RedisClient, RedisConfig};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let redis = RedisClient::new(RedisConfig::from_env()?).await?;
/// let state = AppState::new(pool, config, redis)?;
/// let app = plane_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        auth::require_auth,
        permission::{guard, PermissionGuard},
        security::{security_headers, HeaderPolicy},
    },
    routes,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use plane_shared::auth::magic_link::{MagicLinkService, MemoryMagicLinkStore, RedisMagicLinkStore};
use plane_shared::auth::permission::{MembershipLookup, PermissionClass};
use plane_shared::auth::revocation::{
    MemoryTokenRevocations, RedisTokenRevocations, TokenRevocations,
};
use plane_shared::github::{DisabledGithubClient, GithubClient, HttpGithubClient};
use plane_shared::jobs::{JobQueue, MemoryJobQueue, RedisJobQueue, DEFAULT_QUEUE_KEY};
use plane_shared::redis::RedisClient;
use plane_shared::storage::{AssetStorage, LocalAssetStorage, MemoryAssetStorage};
use plane_shared::sync::SyncBridge;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Multipart framing allowance on top of the file size limit
pub(crate) const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state, cloned per request
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub membership: Arc<dyn MembershipLookup>,
    pub magic_links: Arc<MagicLinkService>,
    pub revocations: Arc<dyn TokenRevocations>,
    pub jobs: Arc<dyn JobQueue>,
    pub storage: Arc<dyn AssetStorage>,
    pub sync: Arc<SyncBridge>,

    /// Present when running against Redis; reported by the health check
    pub redis: Option<RedisClient>,
}

impl AppState {
    /// Production wiring: Redis-backed sessions, revocations and job queue
    ///
    /// # Errors
    ///
    /// Fails when GitHub App credentials are present but unusable.
    pub fn new(db: PgPool, config: Config, redis: RedisClient) -> anyhow::Result<Self> {
        let github: Arc<dyn GithubClient> = match config.github_app() {
            Some(app) => Arc::new(HttpGithubClient::new(app)?),
            None => {
                tracing::warn!("GitHub App is not configured, integration calls will fail");
                Arc::new(DisabledGithubClient)
            }
        };

        let jobs: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(redis.clone(), DEFAULT_QUEUE_KEY));
        let magic_links = MagicLinkService::new(
            Arc::new(RedisMagicLinkStore::new(redis.clone())),
            jobs.clone(),
            config.api.web_url.clone(),
        );

        Ok(Self {
            membership: Arc::new(db.clone()),
            magic_links: Arc::new(magic_links),
            revocations: Arc::new(RedisTokenRevocations::new(redis.clone())),
            jobs,
            storage: Arc::new(LocalAssetStorage::new(&config.storage.asset_root)),
            sync: Arc::new(SyncBridge::new(db.clone(), github, config.sync_settings())),
            redis: Some(redis),
            config: Arc::new(config),
            db,
        })
    }

    /// In-process stores for everything except PostgreSQL
    pub fn in_memory(db: PgPool, config: Config, github: Arc<dyn GithubClient>) -> Self {
        let jobs: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());
        Self::with_services(db, config, github, jobs)
    }

    /// In-process stores sharing the given job queue
    pub fn with_services(
        db: PgPool,
        config: Config,
        github: Arc<dyn GithubClient>,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        let magic_links = MagicLinkService::new(
            Arc::new(MemoryMagicLinkStore::new()),
            jobs.clone(),
            config.api.web_url.clone(),
        );

        Self {
            membership: Arc::new(db.clone()),
            magic_links: Arc::new(magic_links),
            revocations: Arc::new(MemoryTokenRevocations::new()),
            jobs,
            storage: Arc::new(MemoryAssetStorage::new()),
            sync: Arc::new(SyncBridge::new(db.clone(), github, config.sync_settings())),
            redis: None,
            config: Arc::new(config),
            db,
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Wraps every route of `router` in one permission class
fn guarded(router: Router<AppState>, state: &AppState, class: PermissionClass) -> Router<AppState> {
    router.route_layer(axum::middleware::from_fn_with_state(
        PermissionGuard::new(state.clone(), class),
        guard,
    ))
}

/// Builds the router
///
/// ```text
/// /health                                   public
/// /v1/sign-in, /v1/magic-*, /v1/token/...   public auth flows
/// /v1/users/me, /v1/api-tokens, ...         authenticated
/// /v1/workspaces/:slug/...                  authenticated + PermissionGuard
/// ```
///
/// Layers, outermost first: security headers, CORS, compression, tracing, then
/// per group authentication and the permission guard.
pub fn build_router(state: AppState) -> Router {
    use routes::{
        api_tokens, assets, auth, cycles, health, integrations, issues, labels, modules, projects,
        users, workspaces,
    };

    let public_routes = Router::new()
        .route("/sign-in", post(auth::sign_in))
        .route("/magic-generate", post(auth::magic_generate))
        .route("/magic-sign-in", post(auth::magic_sign_in))
        .route("/token/refresh", post(auth::refresh_token))
        .route("/email-verify", get(auth::verify_email))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password));

    let account_routes = Router::new()
        .route("/sign-out", post(auth::sign_out))
        .route("/request-email-verify", post(auth::request_email_verify))
        .route("/users/me", get(users::me).patch(users::update_me))
        .route("/users/me/change-password", post(users::change_password))
        .route(
            "/api-tokens",
            get(api_tokens::list_api_tokens).post(api_tokens::create_api_token),
        )
        .route("/api-tokens/:id", axum::routing::delete(api_tokens::delete_api_token))
        .route("/users/file-assets", post(assets::upload_user_asset))
        .route(
            "/users/file-assets/:key",
            get(assets::get_user_asset).delete(assets::delete_user_asset),
        )
        .route("/integrations", get(integrations::list_integrations));

    let workspace_base = Router::new()
        .route(
            "/workspaces",
            get(workspaces::list_workspaces).post(workspaces::create_workspace),
        )
        .route(
            "/workspaces/:slug",
            get(workspaces::get_workspace)
                .patch(workspaces::update_workspace)
                .delete(workspaces::delete_workspace),
        );

    let workspace_admin = Router::new()
        .route(
            "/workspaces/:slug/members",
            get(workspaces::list_members).post(workspaces::add_member),
        )
        .route(
            "/workspaces/:slug/members/:member_id",
            axum::routing::patch(workspaces::update_member).delete(workspaces::remove_member),
        )
        .route(
            "/workspaces/:slug/workspace-integrations",
            get(integrations::list_workspace_integrations),
        )
        .route(
            "/workspaces/:slug/workspace-integrations/:integration",
            post(integrations::install).delete(integrations::uninstall),
        )
        .route(
            "/workspaces/:slug/workspace-integrations/:integration/github-repositories",
            get(integrations::github_repositories),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/workspace-integrations/:integration/github-repository-sync",
            get(integrations::list_repository_syncs).post(integrations::create_repository_sync),
        );

    let workspace_entity = Router::new()
        .route("/workspaces/:slug/file-assets", post(assets::upload_workspace_asset))
        .route(
            "/workspaces/:slug/file-assets/:asset",
            get(assets::get_workspace_asset).delete(assets::delete_workspace_asset),
        );

    let project_base = Router::new()
        .route(
            "/workspaces/:slug/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/workspaces/:slug/projects/:project_id",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/workspaces/:slug/project-identifiers", get(projects::check_identifier));

    let project_member = Router::new()
        .route(
            "/workspaces/:slug/projects/:project_id/members",
            get(projects::list_members).post(projects::add_member),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/members/:member_id",
            axum::routing::patch(projects::update_member).delete(projects::remove_member),
        )
        .route(
            "/workspaces/:slug/project-memberships",
            get(workspaces::my_project_memberships),
        );

    let project_entity = Router::new()
        .route(
            "/workspaces/:slug/projects/:project_id/issues",
            get(issues::list_issues).post(issues::create_issue),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/issues/:issue_id",
            get(issues::get_issue)
                .patch(issues::update_issue)
                .delete(issues::delete_issue),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/issues/:issue_id/activities",
            get(issues::list_activity),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/issues/:issue_id/comments",
            get(issues::list_comments).post(issues::create_comment),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/issues/:issue_id/comments/:comment_id",
            axum::routing::patch(issues::update_comment).delete(issues::delete_comment),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/issues/:issue_id/links",
            get(issues::list_links).post(issues::create_link),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/issues/:issue_id/links/:link_id",
            axum::routing::delete(issues::delete_link),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/labels",
            get(labels::list_labels).post(labels::create_label),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/labels/:label_id",
            get(labels::get_label)
                .patch(labels::update_label)
                .delete(labels::delete_label),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/cycles",
            get(cycles::list_cycles).post(cycles::create_cycle),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/cycles/:cycle_id",
            get(cycles::get_cycle)
                .patch(cycles::update_cycle)
                .delete(cycles::delete_cycle),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/cycles/:cycle_id/cycle-issues",
            get(cycles::list_cycle_issues).post(cycles::add_cycle_issues),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/cycles/:cycle_id/cycle-issues/:id",
            axum::routing::delete(cycles::remove_cycle_issue),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/user-favorite-cycles",
            get(cycles::list_favorites).post(cycles::add_favorite),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/user-favorite-cycles/:cycle_id",
            axum::routing::delete(cycles::remove_favorite),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/modules",
            get(modules::list_modules).post(modules::create_module),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/modules/:module_id",
            get(modules::get_module)
                .patch(modules::update_module)
                .delete(modules::delete_module),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/modules/:module_id/module-issues",
            get(modules::list_module_issues).post(modules::replace_module_issues),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/modules/:module_id/module-issues/:id",
            axum::routing::delete(modules::remove_module_issue),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/github-repository-sync/:repo_sync_id/github-issue-sync",
            get(integrations::list_issue_syncs).post(integrations::create_issue_sync),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/github-repository-sync/:repo_sync_id/bulk-create-github-issue-sync",
            post(integrations::bulk_create_issue_syncs),
        )
        .route(
            "/workspaces/:slug/projects/:project_id/github-repository-sync/:repo_sync_id/github-issue-sync/:issue_sync_id/github-comment-sync",
            get(integrations::list_comment_syncs).post(integrations::create_comment_sync),
        );

    let upload_limit = state.config.storage.max_upload_bytes + MULTIPART_OVERHEAD;

    let authenticated_routes = Router::new()
        .merge(account_routes)
        .merge(guarded(workspace_base, &state, PermissionClass::WorkspaceBase))
        .merge(guarded(workspace_admin, &state, PermissionClass::WorkspaceAdmin))
        .merge(guarded(workspace_entity, &state, PermissionClass::WorkspaceEntity))
        .merge(guarded(project_base, &state, PermissionClass::ProjectBase))
        .merge(guarded(project_member, &state, PermissionClass::ProjectMember))
        .merge(guarded(project_entity, &state, PermissionClass::ProjectEntity))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::max(upload_limit));

    let v1_routes = Router::new()
        .merge(public_routes)
        .merge(authenticated_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(axum::middleware::from_fn_with_state(
            HeaderPolicy {
                hsts: state.config.api.production,
            },
            security_headers,
        ))
        .with_state(state)
}
