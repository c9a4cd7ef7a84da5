//! HTTP surface tests driven through the router with `oneshot`.

mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::{Gateway, ORIGIN, auth0, gateway, okta, query_param};
use fedgate_auth::prelude::*;
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use url::Url;

fn router(gw: &Gateway) -> Router {
    external_login_router(ExternalLoginState::new(
        gw.service.clone(),
        Url::parse(ORIGIN).unwrap(),
    ))
}

async fn get(router: &Router, uri: &str) -> axum::response::Response {
    router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Starts a challenge and returns the callback URI the provider would hit,
/// taken from the `redirect_uri` sent to it.
async fn callback_uri(gw: &Gateway, router: &Router, scheme: &str, claims: Value) -> String {
    let response = get(router, &format!("/auth/external/{scheme}?return_url=/apps")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = Url::parse(response.headers()[header::LOCATION].to_str().unwrap()).unwrap();

    let state = query_param(&location, "state").unwrap();
    let redirect_uri = Url::parse(&query_param(&location, "redirect_uri").unwrap()).unwrap();
    assert_eq!(redirect_uri.origin(), Url::parse(ORIGIN).unwrap().origin());

    let challenge = ChallengeRedirect {
        location,
        state: state.clone(),
    };
    gw.backchannel.issue_code("code-http", &challenge, claims);
    format!("{}?code=code-http&state={state}", redirect_uri.path())
}

#[tokio::test]
async fn test_list_schemes() {
    let gw = gateway(GatewayConfig::default(), vec![okta()]).await;
    let response = get(&router(&gw), "/auth/external").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let schemes = body.as_array().unwrap();
    assert_eq!(schemes.len(), 2);
    assert_eq!(schemes[0]["name"], "Google");
    assert_eq!(schemes[0]["family"], "static");
    assert_eq!(schemes[1]["name"], "okta");
    assert_eq!(schemes[1]["display_name"], "Okta");
    assert_eq!(schemes[1]["family"], "dynamic");
}

#[tokio::test]
async fn test_challenge_redirects_to_provider() {
    let gw = gateway(GatewayConfig::default(), vec![okta()]).await;
    let response = get(&router(&gw), "/auth/external/okta?return_url=/apps").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://okta.example/authorize?"));
    assert!(location.contains("client_id=abc"));
}

#[tokio::test]
async fn test_challenge_rejects_open_redirect() {
    let gw = gateway(GatewayConfig::default(), vec![okta()]).await;
    let response = get(
        &router(&gw),
        "/auth/external/okta?return_url=https%3A%2F%2Fevil.example%2F",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_challenge_unknown_scheme() {
    let gw = gateway(GatewayConfig::default(), vec![okta()]).await;
    let response = get(&router(&gw), "/auth/external/missing").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_callback_auto_provisions() {
    let gw = gateway(GatewayConfig::default(), vec![okta()]).await;
    let router = router(&gw);
    let uri = callback_uri(&gw, &router, "okta", json!({ "sub": "ext-1", "email": "a@b.com" })).await;

    let response = get(&router, &uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["outcome"], "auto_provisioned");
    assert_eq!(body["return_url"], "/apps");
    assert_eq!(gw.identities.len().await, 1);
}

#[tokio::test]
async fn test_callback_served_on_redirect_uri() {
    let gw = gateway(GatewayConfig::default(), vec![okta(), auth0()]).await;
    let router = router(&gw);

    let uri = callback_uri(&gw, &router, "auth0", json!({ "sub": "ext-2" })).await;
    assert!(uri.starts_with("/auth/external/auth0/callback?"));
    assert_eq!(get(&router, &uri).await.status(), StatusCode::OK);

    let uri = callback_uri(&gw, &router, "Google", json!({ "sub": "g-1" })).await;
    assert!(uri.starts_with("/auth/external/Google/callback?"));
    let body = json_body(get(&router, &uri).await).await;
    assert_eq!(body["outcome"], "needs_confirmation");
}

#[tokio::test]
async fn test_callback_path_override_is_routed() {
    let gw = gateway(
        GatewayConfig::default(),
        vec![okta().with_callback_path("/signin-okta")],
    )
    .await;
    let router = router(&gw);

    let uri = callback_uri(&gw, &router, "okta", json!({ "sub": "ext-1" })).await;
    assert!(uri.starts_with("/signin-okta?"));

    let response = get(&router, &uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "auto_provisioned");
    assert_eq!(gw.identities.len().await, 1);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let gw = gateway(
        GatewayConfig::default(),
        vec![okta().with_callback_path("/signin-okta")],
    )
    .await;
    let response = get(&router(&gw), "/signin-nobody?code=c&state=s").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_callback_locked_out_is_forbidden() {
    let gw = gateway(GatewayConfig::default(), vec![okta()]).await;
    let first = gw
        .login("okta", "code-1", json!({ "sub": "ext-1" }))
        .await
        .unwrap();
    gw.identities
        .lock_out(
            &first.session().unwrap().subject,
            OffsetDateTime::now_utc() + Duration::minutes(5),
        )
        .await
        .unwrap();

    let router = router(&gw);
    let uri = callback_uri(&gw, &router, "okta", json!({ "sub": "ext-1" })).await;
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "locked_out");
}

#[tokio::test]
async fn test_callback_denylisted_provider_is_forbidden() {
    let mut config = GatewayConfig::default();
    config.federation = config.federation.with_denied_provider("okta");
    let gw = gateway(config, vec![okta()]).await;

    let router = router(&gw);
    let uri = callback_uri(&gw, &router, "okta", json!({ "sub": "ext-1" })).await;
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "unsupported_provider");
    assert!(gw.identities.is_empty().await);
}

#[tokio::test]
async fn test_callback_provider_error_is_generic() {
    let gw = gateway(GatewayConfig::default(), vec![okta()]).await;
    let response = get(
        &router(&gw),
        "/auth/external/okta/callback?error=access_denied&error_description=secret%20detail&state=x",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["error"], "external_login_failed");
    assert!(!body["error_description"].as_str().unwrap().contains("secret"));
    assert!(gw.identities.is_empty().await);
}

#[tokio::test]
async fn test_confirm_unknown_ticket() {
    let gw = gateway(GatewayConfig::default(), vec![auth0()]).await;
    let response = router(&gw)
        .oneshot(
            Request::post("/auth/external/confirm")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "ticket": "nope", "username": "bea" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_flow_signs_in() {
    let gw = gateway(GatewayConfig::default(), vec![auth0()]).await;
    let router = router(&gw);
    let uri = callback_uri(&gw, &router, "auth0", json!({ "sub": "ext-2", "email": "b@c.com" })).await;

    let body = json_body(get(&router, &uri).await).await;
    assert_eq!(body["outcome"], "needs_confirmation");
    assert_eq!(body["registration"]["email"], "b@c.com");
    let ticket = body["registration"]["ticket"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(
            Request::post("/auth/external/confirm")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "ticket": ticket, "username": "bea" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["outcome"], "signed_in");
    assert_eq!(body["session"]["username"], "bea");
}
