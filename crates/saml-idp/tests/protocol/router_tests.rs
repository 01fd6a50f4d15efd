//! HTTP surface tests through the axum router

#[cfg(test)]
mod tests {
    use super::super::common::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use axum::{Extension, Router};
    use chrono::Duration;
    use saml_idp::bindings::post;
    use saml_idp::{saml_router, Principal};
    use tower::ServiceExt;

    fn principal() -> Principal {
        Principal::new("user-1", "idp-session-1", now() - Duration::minutes(1))
    }

    fn router() -> Router {
        let mut sp = service_provider();
        sp.allow_idp_initiated = true;
        let (state, _, _) = state_with(vec![sp]);
        saml_router(state)
    }

    async fn send(router: Router, request: Request<Body>) -> Response {
        router.oneshot(request).await.unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metadata_is_xml() {
        let response = send(router(), get("/saml/metadata")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/xml; charset=utf-8"
        );
        let body = body_text(response).await;
        assert!(body.contains("IDPSSODescriptor"));
        assert!(body.contains("validUntil=\"2026-03-22T10:00:00Z\""));
    }

    #[tokio::test]
    async fn test_signin_redirects_to_login_then_completes_via_cookie() {
        let router = router();
        let query = redirect_query(&authn_request("_http", now()), Some("rs"));

        let response = send(router.clone(), get(&format!("/saml/signin?{query}"))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://idp.example.com/login?returnUrl="));
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("saml_signin_state="));
        assert!(cookie.contains("HttpOnly"));
        let cookie_pair = cookie.split(';').next().unwrap().to_string();

        let callback = Request::builder()
            .uri("/saml/signin/callback")
            .header(header::COOKIE, &cookie_pair)
            .body(Body::empty())
            .unwrap();
        let response = send(router.clone().layer(Extension(principal())), callback).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(&format!("action=\"{SP_ACS}\"")));
        assert!(html.contains("name=\"SAMLResponse\""));
        assert!(html.contains("name=\"RelayState\" value=\"rs\""));

        // The same StateId cannot be replayed
        let replay = Request::builder()
            .uri("/saml/signin/callback")
            .header(header::COOKIE, &cookie_pair)
            .body(Body::empty())
            .unwrap();
        let response = send(router.layer(Extension(principal())), replay).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_signin_post_binding() {
        let form = format!(
            "SAMLRequest={}&RelayState=abc",
            urlencoding::encode(&post::encode_message(&authn_request("_p", now())))
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/saml/signin")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap();
        let response = send(router().layer(Extension(principal())), request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("SAMLResponse"));
    }

    #[tokio::test]
    async fn test_doctype_is_rejected_with_generic_message() {
        let xml = format!(
            "<!DOCTYPE x [<!ENTITY e \"boom\">]>{}",
            authn_request("_dtd", now())
        );
        let query = redirect_query(&xml, None);
        let response = send(router(), get(&format!("/saml/signin?{query}"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        let message = body["message"].as_str().unwrap();
        assert!(!message.chars().any(|c| c.is_ascii_digit()));
        assert!(!message.contains("DOCTYPE"));
    }

    #[tokio::test]
    async fn test_missing_saml_request() {
        let response = send(router(), get("/saml/signin")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_relay_state_too_long() {
        let long = "r".repeat(81);
        let query = redirect_query(&authn_request("_rs", now()), Some(&long));
        let response = send(router(), get(&format!("/saml/signin?{query}"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_idp_initiated_endpoint() {
        let uri = format!(
            "/saml/idp-initiated?spEntityId={}",
            urlencoding::encode(SP_ENTITY_ID)
        );
        let response = send(router().layer(Extension(principal())), get(&uri)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(router(), get(&uri)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            router().layer(Extension(principal())),
            get("/saml/idp-initiated"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_logout_callback_rules() {
        let response = send(router(), get("/saml/logout/callback")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(router(), get("/saml/logout/callback?logoutId=unknown")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let post = Request::builder()
            .method(Method::POST)
            .uri("/saml/logout/callback?logoutId=x")
            .body(Body::empty())
            .unwrap();
        let response = send(router(), post).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_idp_logout_returns_front_channel_json() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/saml/idp-logout")
            .body(Body::empty())
            .unwrap();
        let response = send(router().layer(Extension(principal())), request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["sessions_ended"], 0);
        assert!(body["front_channel"].as_array().unwrap().is_empty());
    }
}
