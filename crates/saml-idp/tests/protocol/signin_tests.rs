//! SP- and IdP-initiated sign-in through the public service API

#[cfg(test)]
mod tests {
    use super::super::common::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use chrono::Duration;
    use saml_idp::bindings::{redirect, InboundMessage, OutboundMessage, SAML_REQUEST};
    use saml_idp::saml::constants::{claim_types, status};
    use saml_idp::services::SignatureValidator;
    use saml_idp::xml::{canonicalize, C14nOptions, SecureXmlLoader};
    use saml_idp::{Principal, SamlError, SigninOutcome, SigninService, SigningBehavior};

    // AuthnRequest signed by an independent XML-DSig stack. It uses CRLF line
    // endings and has a line break and a tab inside the ProviderName attribute.
    const EXTERNALLY_SIGNED: &str = include_str!("../fixtures/signed_authn_request_crlf.xml");
    const EXTERNAL_SIGNER_CERTIFICATE: &str =
        include_str!("../fixtures/sp_signing_certificate.pem");
    const EXTERNAL_C14N: &str = include_str!("../fixtures/signed_authn_request_crlf.c14n");
    const EXTERNAL_SIGNED_INFO_C14N: &str =
        include_str!("../fixtures/signed_authn_request_crlf.signed_info.c14n");

    fn principal() -> Principal {
        Principal::new("user-42", "idp-session-1", now() - Duration::minutes(1))
            .with_claim(claim_types::EMAIL, "alice@example.com")
    }

    async fn respond(
        service: &SigninService<'_>,
        message: &InboundMessage,
        principal: Option<&Principal>,
    ) -> OutboundMessage {
        match service.signin(message, principal).await.unwrap() {
            SigninOutcome::Respond(message) => message,
            other => panic!("expected a SAML response, got {other:?}"),
        }
    }

    // ============================================================
    // Timing windows
    // ============================================================

    #[tokio::test]
    async fn test_clock_skew_boundary_is_inclusive() {
        let (state, _, _) = state_with(vec![service_provider()]);
        let service = SigninService::new(&state);
        let principal = principal();

        let at_skew = InboundMessage::from_query(&redirect_query(
            &authn_request("_skew_ok", now() + Duration::minutes(5)),
            None,
        ));
        let document = posted_document(&respond(&service, &at_skew, Some(&principal)).await);
        assert_eq!(status_codes(&document).0, status::SUCCESS);

        let past_skew = InboundMessage::from_query(&redirect_query(
            &authn_request("_skew_bad", now() + Duration::minutes(5) + Duration::seconds(1)),
            None,
        ));
        let document = posted_document(&respond(&service, &past_skew, Some(&principal)).await);
        assert_eq!(status_codes(&document).0, status::REQUESTER);
        assert_eq!(
            status_message(&document).as_deref(),
            Some("IssueInstant is in the future")
        );
        assert!(document.child("Assertion").is_none());
    }

    #[tokio::test]
    async fn test_max_age_boundary_is_inclusive() {
        let (state, _, _) = state_with(vec![service_provider()]);
        let service = SigninService::new(&state);
        let principal = principal();

        let at_limit = InboundMessage::from_query(&redirect_query(
            &authn_request("_age_ok", now() - Duration::minutes(5)),
            None,
        ));
        let document = posted_document(&respond(&service, &at_limit, Some(&principal)).await);
        assert_eq!(status_codes(&document).0, status::SUCCESS);

        let expired = InboundMessage::from_query(&redirect_query(
            &authn_request("_age_bad", now() - Duration::minutes(5) - Duration::seconds(1)),
            None,
        ));
        let document = posted_document(&respond(&service, &expired, Some(&principal)).await);
        assert_eq!(status_codes(&document).0, status::REQUESTER);
        assert_eq!(status_message(&document).as_deref(), Some("Request has expired"));
    }

    // ============================================================
    // Signature policy
    // ============================================================

    #[tokio::test]
    async fn test_required_signature_over_redirect_binding() {
        let sp_keys = KeyPair::generate("sp.example.com");
        let mut sp = service_provider();
        sp.require_signed_authn_requests = true;
        sp.signing_certificates = vec![sp_keys.certificate()];
        let (state, _, _) = state_with(vec![sp]);
        let service = SigninService::new(&state);
        let principal = principal();
        let xml = authn_request("_signed", now());

        let signed = redirect::build_signed_query(SAML_REQUEST, &xml, Some("rs"), &sp_keys.credentials)
            .unwrap();
        let document = posted_document(
            &respond(&service, &InboundMessage::from_query(&signed), Some(&principal)).await,
        );
        assert_eq!(status_codes(&document).0, status::SUCCESS);

        let unsigned = InboundMessage::from_query(&redirect_query(&xml, Some("rs")));
        assert!(matches!(
            service.signin(&unsigned, Some(&principal)).await,
            Err(SamlError::SignatureRejected(_))
        ));

        // Signed by a key the SP never registered
        let stranger = KeyPair::generate("attacker.example.com");
        let forged =
            redirect::build_signed_query(SAML_REQUEST, &xml, Some("rs"), &stranger.credentials)
                .unwrap();
        assert!(matches!(
            service
                .signin(&InboundMessage::from_query(&forged), Some(&principal))
                .await,
            Err(SamlError::SignatureRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_signature_is_checked_before_request_rules() {
        let sp_keys = KeyPair::generate("sp.example.com");
        let mut sp = service_provider();
        sp.require_signed_authn_requests = true;
        sp.signing_certificates = vec![sp_keys.certificate()];
        let (state, _, _) = state_with(vec![sp]);
        let service = SigninService::new(&state);
        let principal = principal();

        // Expired and wrong version: an unsigned copy must not earn a SAML error Response
        let xml = authn_request("_stale", now() - Duration::hours(1))
            .replace(r#"Version="2.0""#, r#"Version="1.1""#);
        let unsigned = InboundMessage::from_query(&redirect_query(&xml, None));
        assert!(matches!(
            service.signin(&unsigned, Some(&principal)).await,
            Err(SamlError::SignatureRejected(_))
        ));

        let signed =
            redirect::build_signed_query(SAML_REQUEST, &xml, None, &sp_keys.credentials).unwrap();
        let document = posted_document(
            &respond(&service, &InboundMessage::from_query(&signed), Some(&principal)).await,
        );
        assert_eq!(status_codes(&document).0, status::VERSION_MISMATCH);
    }

    #[tokio::test]
    async fn test_required_signature_without_certificates() {
        let mut sp = service_provider();
        sp.require_signed_authn_requests = true;
        let (state, _, _) = state_with(vec![sp]);
        let message =
            InboundMessage::from_query(&redirect_query(&authn_request("_r", now()), None));

        assert!(matches!(
            SigninService::new(&state)
                .signin(&message, Some(&principal()))
                .await,
            Err(SamlError::NoValidSigningCertificates(_))
        ));
    }

    #[test]
    fn test_external_canonical_forms_are_reproduced() {
        let document = SecureXmlLoader::new().load(EXTERNALLY_SIGNED).unwrap();
        let signature = document.child("Signature").unwrap();

        let enveloped = C14nOptions {
            exclude: Some(signature),
            ..C14nOptions::default()
        };
        assert_eq!(
            canonicalize(&document, &document, &enveloped).unwrap(),
            EXTERNAL_C14N
        );

        let signed_info = signature.child("SignedInfo").unwrap();
        assert_eq!(
            canonicalize(&document, signed_info, &C14nOptions::default()).unwrap(),
            EXTERNAL_SIGNED_INFO_C14N
        );
    }

    #[tokio::test]
    async fn test_externally_signed_post_request_is_accepted() {
        let mut sp = service_provider();
        sp.require_signed_authn_requests = true;
        sp.signing_certificates = vec![EXTERNAL_SIGNER_CERTIFICATE.to_string()];
        let (state, _, _) = state_with(vec![sp]);
        let service = SigninService::new(&state);
        let post = |xml: &str| InboundMessage::Post {
            message: Some(STANDARD.encode(xml)),
            relay_state: None,
        };

        let document =
            posted_document(&respond(&service, &post(EXTERNALLY_SIGNED), Some(&principal())).await);
        assert_eq!(status_codes(&document).0, status::SUCCESS);
        assert_eq!(document.attr("InResponseTo"), Some("_ext-0f3c"));

        // Normalization does not hide a changed attribute value
        let tampered = EXTERNALLY_SIGNED.replace("Example\r\n\tSP", "Example\r\n\tXP");
        assert_ne!(tampered, EXTERNALLY_SIGNED);
        assert!(matches!(
            service.signin(&post(&tampered), Some(&principal())).await,
            Err(SamlError::SignatureRejected(_))
        ));
    }

    // ============================================================
    // ACS resolution
    // ============================================================

    #[tokio::test]
    async fn test_unregistered_acs_is_never_answered() {
        let (state, _, _) = state_with(vec![service_provider()]);
        let xml = authn_request("_acs", now()).replace(SP_ACS, "https://evil.example.com/acs");
        let message = InboundMessage::from_query(&redirect_query(&xml, None));

        assert!(matches!(
            SigninService::new(&state)
                .signin(&message, Some(&principal()))
                .await,
            Err(SamlError::AcsUrlMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_acs_match_ignores_case_and_trailing_slash() {
        let (state, _, _) = state_with(vec![service_provider()]);
        let xml = authn_request("_acs", now())
            .replace(SP_ACS, "https://SP.example.com/saml/acs/");
        let message = InboundMessage::from_query(&redirect_query(&xml, None));

        let outbound = respond(&SigninService::new(&state), &message, Some(&principal())).await;
        let OutboundMessage::Post { action, .. } = &outbound else {
            panic!("expected POST");
        };
        assert_eq!(action, SP_ACS);
    }

    // ============================================================
    // Response protection
    // ============================================================

    #[tokio::test]
    async fn test_sign_both_places_signatures_after_issuer() {
        let mut sp = service_provider();
        sp.signing_behavior = Some(SigningBehavior::SignBoth);
        let (state, _, idp) = state_with(vec![sp]);
        let message =
            InboundMessage::from_query(&redirect_query(&authn_request("_both", now()), None));

        let document =
            posted_document(&respond(&SigninService::new(&state), &message, Some(&principal())).await);
        let assertion = document.child("Assertion").unwrap();

        assert_eq!(child_names(&document)[..3], ["Issuer", "Signature", "Status"]);
        assert_eq!(child_names(assertion)[..3], ["Issuer", "Signature", "Subject"]);

        for signed in [&document, assertion] {
            let reference = signed
                .child("Signature")
                .and_then(|s| s.child("SignedInfo"))
                .and_then(|si| si.child("Reference"))
                .and_then(|r| r.attr("URI"))
                .unwrap();
            assert_eq!(reference, format!("#{}", signed.attr("ID").unwrap()));
        }

        let keys = vec![idp.credentials.certificate().public_key().unwrap()];
        assert_eq!(SignatureValidator::validate_post(&document, &keys), Ok(()));
        assert_eq!(
            SignatureValidator::validate_enveloped(&document, assertion, &keys),
            Ok(())
        );
    }

    #[tokio::test]
    async fn test_encrypted_assertion_round_trip() {
        let sp_keys = KeyPair::generate("sp-encryption");
        let mut sp = service_provider();
        sp.encryption_certificates = vec![sp_keys.certificate()];
        let (state, _, _) = state_with(vec![sp]);
        let principal = principal()
            .with_claim(claim_types::GIVEN_NAME, "Alice");
        let message =
            InboundMessage::from_query(&redirect_query(&authn_request("_enc", now()), None));

        let document =
            posted_document(&respond(&SigninService::new(&state), &message, Some(&principal)).await);

        assert!(document.child("Assertion").is_none());
        assert_eq!(document.children_named("EncryptedAssertion").count(), 1);
        let encrypted = document.child("EncryptedAssertion").unwrap();
        let data = encrypted.child("EncryptedData").unwrap();
        assert!(data
            .child("KeyInfo")
            .and_then(|k| k.child("EncryptedKey"))
            .is_some());

        let plaintext = decrypt_assertion(encrypted, &sp_keys.key);
        let assertion = SecureXmlLoader::new().load(&plaintext).unwrap();
        assert_eq!(assertion.local_name(), "Assertion");
        // Assertion was signed before encryption
        assert!(assertion.child("Signature").is_some());
        assert_eq!(
            assertion
                .child("Subject")
                .and_then(|s| s.child("NameID"))
                .map(|n| n.text()),
            Some("user-42".to_string())
        );
        assert!(plaintext.contains("Alice"));
    }

    #[tokio::test]
    async fn test_repeated_role_claims_collapse_into_one_attribute() {
        let (state, _, _) = state_with(vec![service_provider()]);
        let principal = principal()
            .with_claim(claim_types::ROLE, "admin")
            .with_claim(claim_types::ROLE, "auditor")
            .with_claim(claim_types::ROLE, "user");
        let message =
            InboundMessage::from_query(&redirect_query(&authn_request("_roles", now()), None));

        let document =
            posted_document(&respond(&SigninService::new(&state), &message, Some(&principal)).await);
        let statement = document
            .child("Assertion")
            .and_then(|a| a.child("AttributeStatement"))
            .unwrap();
        let roles: Vec<_> = statement
            .children_named("Attribute")
            .filter(|a| a.attr("Name") == Some("http://schemas.microsoft.com/ws/2008/06/identity/claims/role"))
            .collect();
        assert_eq!(roles.len(), 1);
        let values: Vec<String> = roles[0]
            .children_named("AttributeValue")
            .map(|v| v.text())
            .collect();
        assert_eq!(values, vec!["admin", "auditor", "user"]);
    }

    // ============================================================
    // Deferred sign-in
    // ============================================================

    #[tokio::test]
    async fn test_state_id_completes_exactly_once() {
        let (state, _, _) = state_with(vec![service_provider()]);
        let service = SigninService::new(&state);
        let message = InboundMessage::from_query(&redirect_query(
            &authn_request("_defer", now()),
            Some("deep/link"),
        ));

        let SigninOutcome::Interaction { location, state_id } =
            service.signin(&message, None).await.unwrap()
        else {
            panic!("expected the login step");
        };
        assert_eq!(
            location,
            format!(
                "{IDP_BASE}/login?returnUrl={}",
                urlencoding::encode(&format!("{IDP_BASE}/saml/signin/callback"))
            )
        );

        let principal = principal();
        let SigninOutcome::Respond(outbound) = service
            .signin_callback(Some(&state_id), Some(&principal), None)
            .await
            .unwrap()
        else {
            panic!("expected a response");
        };
        let OutboundMessage::Post { relay_state, .. } = &outbound else {
            panic!("expected POST");
        };
        assert_eq!(relay_state.as_deref(), Some("deep/link"));
        assert_eq!(posted_document(&outbound).attr("InResponseTo"), Some("_defer"));

        assert!(matches!(
            service
                .signin_callback(Some(&state_id), Some(&principal), None)
                .await,
            Err(SamlError::SigninStateNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_state_is_not_found() {
        let (state, clock, _) = state_with(vec![service_provider()]);
        let service = SigninService::new(&state);
        let message =
            InboundMessage::from_query(&redirect_query(&authn_request("_late", now()), None));
        let SigninOutcome::Interaction { state_id, .. } =
            service.signin(&message, None).await.unwrap()
        else {
            panic!("expected the login step");
        };

        clock.advance(Duration::minutes(11));
        assert!(matches!(
            service
                .signin_callback(Some(&state_id), Some(&principal()), None)
                .await,
            Err(SamlError::SigninStateNotFound)
        ));
    }

    #[tokio::test]
    async fn test_force_authn_requires_fresh_login() {
        let (state, _, _) = state_with(vec![service_provider()]);
        let service = SigninService::new(&state);
        let xml = authn_request("_force", now())
            .replace("Version=\"2.0\"", "Version=\"2.0\" ForceAuthn=\"true\"");
        let message = InboundMessage::from_query(&redirect_query(&xml, None));

        // An existing session is not enough
        let stale = principal();
        let SigninOutcome::Interaction { state_id, .. } =
            service.signin(&message, Some(&stale)).await.unwrap()
        else {
            panic!("expected the login step");
        };
        let SigninOutcome::Respond(outbound) = service
            .signin_callback(Some(&state_id), Some(&stale), None)
            .await
            .unwrap()
        else {
            panic!("expected a response");
        };
        let (_, sub) = status_codes(&posted_document(&outbound));
        assert_eq!(sub.as_deref(), Some(status::AUTHN_FAILED));
    }

    // ============================================================
    // IdP-initiated
    // ============================================================

    #[tokio::test]
    async fn test_idp_initiated_requires_opt_in() {
        let mut allowed = service_provider();
        allowed.allow_idp_initiated = true;
        let (state, _, _) = state_with(vec![allowed]);
        let service = SigninService::new(&state);

        let outbound = service
            .idp_initiated(Some(SP_ENTITY_ID), Some("home"), Some(&principal()))
            .await
            .unwrap();
        let document = posted_document(&outbound);
        assert_eq!(document.attr("InResponseTo"), None);
        assert_eq!(document.attr("Destination"), Some(SP_ACS));

        assert!(matches!(
            service.idp_initiated(None, None, Some(&principal())).await,
            Err(SamlError::MissingParameter("spEntityId"))
        ));

        let (state, _, _) = state_with(vec![service_provider()]);
        assert!(matches!(
            SigninService::new(&state)
                .idp_initiated(Some(SP_ENTITY_ID), None, Some(&principal()))
                .await,
            Err(SamlError::IdpInitiatedNotAllowed(_))
        ));
    }
}
