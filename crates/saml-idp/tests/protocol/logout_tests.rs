//! Single Logout through the public service API

#[cfg(test)]
mod tests {
    use super::super::common::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use chrono::Duration;
    use saml_idp::bindings::{post, redirect, InboundMessage, OutboundMessage, SAML_REQUEST};
    use saml_idp::error::MessageKind;
    use saml_idp::models::SamlBinding;
    use saml_idp::saml::constants::status;
    use saml_idp::services::SignatureValidator;
    use saml_idp::xml::SecureXmlLoader;
    use saml_idp::{
        LogoutOutcome, Principal, SamlError, ServiceProvider, SigninOutcome, SigninService,
        SingleLogoutService, SloService,
    };

    const OTHER_SP: &str = "https://other.example.com";

    fn with_slo(mut sp: ServiceProvider, binding: SamlBinding) -> ServiceProvider {
        sp.single_logout_service = Some(SingleLogoutService {
            location: format!("{}/saml/slo", sp.entity_id),
            binding,
        });
        sp
    }

    fn principal() -> Principal {
        Principal::new("user-7", "idp-session-7", now() - Duration::minutes(1))
    }

    /// Sign the principal into `entity_id` so an SP session exists
    async fn sign_in(state: &saml_idp::SamlState, entity_id: &str, principal: &Principal) {
        let xml = authn_request("_login", now())
            .replace(SP_ENTITY_ID, entity_id)
            .replace(&format!(" AssertionConsumerServiceURL=\"{entity_id}/saml/acs\""), "");
        let message = InboundMessage::from_query(&redirect_query(&xml, None));
        let outcome = SigninService::new(state)
            .signin(&message, Some(principal))
            .await
            .unwrap();
        assert!(matches!(outcome, SigninOutcome::Respond(_)));
    }

    fn logout_request(session_index: &str, name_id: &str) -> String {
        format!(
            r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_slo1" Version="2.0" IssueInstant="{}" Destination="{IDP_BASE}/saml/logout"><saml:Issuer>{SP_ENTITY_ID}</saml:Issuer><saml:NameID>{name_id}</saml:NameID><samlp:SessionIndex>{session_index}</samlp:SessionIndex></samlp:LogoutRequest>"#,
            now().format("%Y-%m-%dT%H:%M:%SZ")
        )
    }

    fn other_sp() -> ServiceProvider {
        ServiceProvider::new(OTHER_SP, format!("{OTHER_SP}/saml/acs"))
    }

    #[tokio::test]
    async fn test_unknown_session_index_for_known_sp_is_success() {
        let sp = with_slo(service_provider(), SamlBinding::HttpRedirect);
        let (state, _, idp) = state_with(vec![sp]);
        let query = redirect_query(&logout_request("no-such-session", "user-7"), Some("rs"));

        let outcome = SloService::new(&state)
            .sp_initiated_logout(&InboundMessage::from_query(&query))
            .await
            .unwrap();
        let LogoutOutcome::Respond(OutboundMessage::Redirect { location }) = outcome else {
            panic!("expected a redirect LogoutResponse");
        };
        assert!(location.starts_with("https://sp.example.com/saml/slo?SAMLResponse="));

        let query = redirect::RedirectQuery::parse(location.split_once('?').unwrap().1, "SAMLResponse");
        let keys = vec![idp.credentials.certificate().public_key().unwrap()];
        assert_eq!(SignatureValidator::validate_redirect(&query, &keys), Ok(()));
        assert_eq!(query.relay_state_value(), Some("rs"));

        let xml = redirect::decode_message(query.message_value().unwrap(), MessageKind::LogoutRequest)
            .unwrap();
        let response = SecureXmlLoader::new().load(&xml).unwrap();
        assert_eq!(response.local_name(), "LogoutResponse");
        assert_eq!(status_codes(&response).0, status::SUCCESS);
        assert_eq!(response.attr("InResponseTo"), Some("_slo1"));
    }

    #[tokio::test]
    async fn test_sp_initiated_logout_notifies_other_sps() {
        let (state, _, _) = state_with(vec![
            with_slo(service_provider(), SamlBinding::HttpPost),
            with_slo(other_sp(), SamlBinding::HttpRedirect),
        ]);
        let principal = principal();
        sign_in(&state, SP_ENTITY_ID, &principal).await;
        sign_in(&state, OTHER_SP, &principal).await;

        let message = InboundMessage::from_form(
            Some(post::encode_message(&logout_request("idp-session-7", "user-7"))),
            None,
        );
        let service = SloService::new(&state);
        let LogoutOutcome::Pending(pending) = service.sp_initiated_logout(&message).await.unwrap()
        else {
            panic!("expected a deferred logout");
        };
        assert_eq!(pending.front_channel.len(), 1);
        assert_eq!(pending.front_channel[0].sp_entity_id, OTHER_SP);

        let completed = service
            .logout_callback(Some(&pending.logout_id))
            .await
            .unwrap();
        let document = posted_document(&completed);
        assert_eq!(document.local_name(), "LogoutResponse");
        assert_eq!(document.attr("InResponseTo"), Some("_slo1"));

        assert!(matches!(
            service.logout_callback(Some(&pending.logout_id)).await,
            Err(SamlError::LogoutMessageNotFound)
        ));
    }

    #[tokio::test]
    async fn test_mismatched_name_id_is_success_without_ending_sessions() {
        let (state, _, _) = state_with(vec![with_slo(service_provider(), SamlBinding::HttpPost)]);
        let principal = principal();
        sign_in(&state, SP_ENTITY_ID, &principal).await;

        let message = InboundMessage::from_form(
            Some(post::encode_message(&logout_request("idp-session-7", "mallory"))),
            None,
        );
        let outcome = SloService::new(&state)
            .sp_initiated_logout(&message)
            .await
            .unwrap();
        let LogoutOutcome::Respond(outbound) = outcome else {
            panic!("expected an immediate LogoutResponse");
        };
        assert_eq!(status_codes(&posted_document(&outbound)).0, status::SUCCESS);
        assert_eq!(
            state
                .sp_sessions
                .snapshot_for_subject("user-7")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_sp_without_slo_endpoint_gets_requester_error() {
        let (state, _, _) = state_with(vec![service_provider()]);
        let service = SloService::new(&state);
        let post_form = |xml: &str| InboundMessage::from_form(Some(post::encode_message(xml)), None);

        let bad_version = logout_request("s", "user-7").replace("Version=\"2.0\"", "Version=\"1.1\"");
        let unknown_index = logout_request("no-such-session", "user-7");
        for xml in [bad_version, unknown_index] {
            let err = service.sp_initiated_logout(&post_form(&xml)).await.unwrap_err();
            assert!(matches!(&err, SamlError::SingleLogoutNotSupported(sp) if sp == SP_ENTITY_ID));
            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_sp_without_slo_endpoint_keeps_sessions() {
        let (state, _, _) = state_with(vec![service_provider()]);
        let principal = principal();
        sign_in(&state, SP_ENTITY_ID, &principal).await;

        let message = InboundMessage::from_form(
            Some(post::encode_message(&logout_request("idp-session-7", "user-7"))),
            None,
        );
        assert!(matches!(
            SloService::new(&state).sp_initiated_logout(&message).await,
            Err(SamlError::SingleLogoutNotSupported(_))
        ));
        assert_eq!(
            state
                .sp_sessions
                .snapshot_for_subject("user-7")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_idp_initiated_redirect_logout_end_to_end() {
        let (state, _, idp) = state_with(vec![with_slo(service_provider(), SamlBinding::HttpRedirect)]);
        let principal = principal();
        sign_in(&state, SP_ENTITY_ID, &principal).await;

        let result = SloService::new(&state)
            .idp_initiated_logout(Some(&principal))
            .await
            .unwrap();
        assert_eq!(result.sessions_ended, 1);
        assert_eq!(result.front_channel.len(), 1);

        let target = &result.front_channel[0];
        assert_eq!(target.destination, "https://sp.example.com/saml/slo");
        assert!(target.form.is_none());
        let url = target.url.as_deref().unwrap();
        let (base, raw_query) = url.split_once('?').unwrap();
        assert_eq!(base, target.destination);

        let query = redirect::RedirectQuery::parse(raw_query, SAML_REQUEST);
        let keys = vec![idp.credentials.certificate().public_key().unwrap()];
        assert_eq!(SignatureValidator::validate_redirect(&query, &keys), Ok(()));

        let xml = redirect::decode_message(query.message_value().unwrap(), MessageKind::LogoutRequest)
            .unwrap();
        let request = SecureXmlLoader::new().load(&xml).unwrap();
        assert_eq!(request.local_name(), "LogoutRequest");
        assert_eq!(request.child("NameID").unwrap().text(), "user-7");
        assert_eq!(request.child("SessionIndex").unwrap().text(), "idp-session-7");

        // Sessions are gone; a second logout has nothing to notify
        let again = SloService::new(&state)
            .idp_initiated_logout(Some(&principal))
            .await
            .unwrap();
        assert_eq!(again.sessions_ended, 0);
        assert!(again.front_channel.is_empty());
    }
}
