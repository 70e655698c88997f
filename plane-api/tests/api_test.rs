/// Router-level tests for the API
///
/// The first group runs without PostgreSQL or Redis: every request either
/// fails or finishes before a query is issued. The `#[ignore]`d group needs
/// `DATABASE_URL` and walks the main flows end to end:
///
/// ```bash
/// DATABASE_URL=postgres://localhost/plane_test cargo test -p plane-api -- --ignored
/// ```

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{json_request, unique_email, TestContext};
use plane_shared::auth::jwt::{create_token, Claims, TokenType};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_missing_credentials_are_rejected() {
    let ctx = TestContext::new();

    let (status, body) = ctx.get("/v1/users/me", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_invalid_jwt_is_rejected() {
    let ctx = TestContext::new();

    let (status, body) = ctx.get("/v1/workspaces", Some("not-a-jwt")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token.");
}

#[tokio::test]
async fn test_refresh_token_cannot_be_used_as_access_token() {
    let ctx = TestContext::new();
    let claims = Claims::new(Uuid::new_v4(), TokenType::Refresh);
    let token = create_token(&claims, ctx.state.jwt_secret()).unwrap();

    let (status, _) = ctx.get("/v1/users/me", Some(&token)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_magic_generate_returns_key_and_mails_code() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .post_json(
            "/v1/magic-generate",
            None,
            json!({ "email": "  Jane@Example.com " }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "magic_jane@example.com");

    let code = ctx.mailed_code().await.expect("code mailed");
    assert_eq!(code.len(), 14);
    assert!(!body.to_string().contains(&code));
}

#[tokio::test]
async fn test_magic_generate_rejects_bad_email() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .post_json("/v1/magic-generate", None, json!({ "email": "nope" }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert!(ctx.jobs.drain().await.is_empty());
}

#[tokio::test]
async fn test_fourth_magic_generate_is_rate_limited() {
    let ctx = TestContext::new();
    let email = unique_email();

    for _ in 0..3 {
        let (status, _) = ctx
            .post_json("/v1/magic-generate", None, json!({ "email": email }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let request = json_request("POST", "/v1/magic-generate", None, json!({ "email": email }));
    let (status, headers, body) = ctx.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(
        body["message"],
        "Max attempts exhausted. Please try again later."
    );
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "600");
    assert_eq!(ctx.jobs.len().await, 3);
}

#[tokio::test]
async fn test_magic_sign_in_with_wrong_code() {
    let ctx = TestContext::new();
    let email = unique_email();

    let (_, body) = ctx
        .post_json("/v1/magic-generate", None, json!({ "email": email }))
        .await;
    let key = body["key"].as_str().unwrap().to_string();

    let (status, body) = ctx
        .post_json(
            "/v1/magic-sign-in",
            None,
            json!({ "key": key, "token": "aaaa-bbbb-cccc" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Your login code was incorrect. Please try again."
    );
}

#[tokio::test]
async fn test_magic_sign_in_with_unknown_key() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .post_json(
            "/v1/magic-sign-in",
            None,
            json!({ "key": "magic_nobody@example.com", "token": "aaaa-bbbb-cccc" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "The magic code/link has expired please try again"
    );
}

#[tokio::test]
async fn test_magic_sign_in_requires_fields() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .post_json("/v1/magic-sign-in", None, json!({ "key": "", "token": "" }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User token and key are required");
}

#[tokio::test]
async fn test_revoked_refresh_token_is_rejected() {
    let ctx = TestContext::new();
    let claims = Claims::new(Uuid::new_v4(), TokenType::Refresh);
    let token = create_token(&claims, ctx.state.jwt_secret()).unwrap();

    ctx.state
        .revocations
        .revoke(claims.jti, Duration::from_secs(60))
        .await
        .unwrap();

    let (status, body) = ctx
        .post_json("/v1/token/refresh", None, json!({ "refresh_token": token }))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token is revoked");
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let ctx = TestContext::new();
    let claims = Claims::new(Uuid::new_v4(), TokenType::Access);
    let token = create_token(&claims, ctx.state.jwt_secret()).unwrap();

    let (status, _) = ctx
        .post_json("/v1/token/refresh", None, json!({ "refresh_token": token }))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_reports_degraded_without_database() {
    let ctx = TestContext::new();

    let (status, body) = ctx.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["redis"], "disabled");
}

#[tokio::test]
async fn test_security_headers_are_set() {
    let ctx = TestContext::new();

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = ctx.send(request).await;

    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
    assert_eq!(headers.get(header::REFERRER_POLICY).unwrap(), "same-origin");
    assert!(headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());
}

// Database-backed flows

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_magic_link_creates_account() {
    let ctx = TestContext::with_database().await.unwrap();
    let email = unique_email();

    let token = ctx.sign_in_with_magic_link(&email).await;
    let (status, body) = ctx.get("/v1/users/me", Some(&token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], email);

    // The session is gone once consumed
    let (status, _) = ctx
        .post_json(
            "/v1/magic-sign-in",
            None,
            json!({ "key": format!("magic_{}", email), "token": "aaaa-bbbb-cccc" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_workspace_project_issue_flow() {
    let ctx = TestContext::with_database().await.unwrap();
    let token = ctx.sign_in_with_magic_link(&unique_email()).await;
    let slug = format!("ws-{}", &Uuid::new_v4().simple().to_string()[..8]);

    let (status, body) = ctx
        .post_json(
            "/v1/workspaces",
            Some(&token),
            json!({ "name": "Acme", "slug": slug }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let (status, project) = ctx
        .post_json(
            &format!("/v1/workspaces/{}/projects", slug),
            Some(&token),
            json!({ "name": "Web", "identifier": " web " }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", project);
    assert_eq!(project["identifier"], "WEB");
    let project_id = project["id"].as_str().unwrap().to_string();

    // Same identifier again is a conflict
    let (status, _) = ctx
        .post_json(
            &format!("/v1/workspaces/{}/projects", slug),
            Some(&token),
            json!({ "name": "Web 2", "identifier": "WEB" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let issues_uri = format!("/v1/workspaces/{}/projects/{}/issues", slug, project_id);
    let (status, first) = ctx
        .post_json(&issues_uri, Some(&token), json!({ "name": "First" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", first);
    let (_, second) = ctx
        .post_json(&issues_uri, Some(&token), json!({ "name": "Second" }))
        .await;
    assert_eq!(first["sequence_id"], 1);
    assert_eq!(second["sequence_id"], 2);

    let (status, list) = ctx.get(&issues_uri, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_outsider_is_forbidden() {
    let ctx = TestContext::with_database().await.unwrap();
    let owner = ctx.sign_in_with_magic_link(&unique_email()).await;
    let outsider = ctx.sign_in_with_magic_link(&unique_email()).await;
    let slug = format!("ws-{}", &Uuid::new_v4().simple().to_string()[..8]);

    let (status, _) = ctx
        .post_json(
            "/v1/workspaces",
            Some(&owner),
            json!({ "name": "Private", "slug": slug }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = ctx
        .get(&format!("/v1/workspaces/{}/projects", slug), Some(&outsider))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["message"],
        "You do not have permission to perform this action."
    );

    // An unknown slug looks the same as a foreign one
    let (status, _) = ctx
        .get("/v1/workspaces/no-such-workspace/projects", Some(&outsider))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_api_token_authenticates() {
    let ctx = TestContext::with_database().await.unwrap();
    let token = ctx.sign_in_with_magic_link(&unique_email()).await;

    let (status, created) = ctx
        .post_json("/v1/api-tokens", Some(&token), json!({ "label": "ci" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let secret = created["secret"].as_str().unwrap().to_string();
    assert!(secret.starts_with("plane_"));

    let (status, _) = ctx.get("/v1/users/me", Some(&secret)).await;
    assert_eq!(status, StatusCode::OK);

    let id = created["id"].as_str().unwrap();
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/api-tokens/{}", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = ctx.send(request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = ctx.get("/v1/users/me", Some(&secret)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

async fn create_workspace(ctx: &TestContext, token: &str) -> String {
    let slug = format!("ws-{}", &Uuid::new_v4().simple().to_string()[..8]);
    let (status, body) = ctx
        .post_json("/v1/workspaces", Some(token), json!({ "name": "Acme", "slug": slug }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    slug
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_oversized_workspace_upload_reports_size_limit() {
    let ctx = TestContext::with_database().await.unwrap();
    let token = ctx.sign_in_with_magic_link(&unique_email()).await;
    let slug = create_workspace(&ctx, &token).await;

    let boundary = "plane-upload";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"asset\"; filename=\"big.bin\"\r\n\r\n"
    )
    .into_bytes();
    body.resize(body.len() + 6 * 1024 * 1024, b'x');
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri(format!("/v1/workspaces/{}/file-assets", slug))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, _, body) = ctx.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["message"], "File size limit is 5MB");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_project_member_cannot_demote_or_remove_admin() {
    let ctx = TestContext::with_database().await.unwrap();
    let admin = ctx.sign_in_with_magic_link(&unique_email()).await;
    let member_email = unique_email();
    let member = ctx.sign_in_with_magic_link(&member_email).await;
    let slug = create_workspace(&ctx, &admin).await;

    let (status, _) = ctx
        .post_json(
            &format!("/v1/workspaces/{}/members", slug),
            Some(&admin),
            json!({ "email": member_email, "role": 10 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, project) = ctx
        .post_json(
            &format!("/v1/workspaces/{}/projects", slug),
            Some(&admin),
            json!({ "name": "Web", "identifier": "WEB" }),
        )
        .await;
    let members_uri = format!(
        "/v1/workspaces/{}/projects/{}/members",
        slug,
        project["id"].as_str().unwrap()
    );

    let (_, me) = ctx.get("/v1/users/me", Some(&member)).await;
    let (status, _) = ctx
        .post_json(
            &members_uri,
            Some(&admin),
            json!({ "member_id": me["id"], "role": 15 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // The creator's row is the only Admin
    let (_, rows) = ctx.get(&members_uri, Some(&admin)).await;
    let admin_row = rows
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["role"] == 20)
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let admin_uri = format!("{}/{}", members_uri, admin_row);

    let (status, _, _) = ctx
        .send(json_request("PATCH", &admin_uri, Some(&member), json!({ "role": 5 })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("DELETE")
        .uri(&admin_uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", member))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = ctx.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, rows) = ctx.get(&members_uri, Some(&admin)).await;
    assert!(rows.as_array().unwrap().iter().any(|row| row["role"] == 20));
}
