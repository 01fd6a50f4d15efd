//! SAML Metadata handler

use crate::error::SamlResult;
use crate::services::MetadataGenerator;
use crate::state::SamlState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Return `IdP` metadata XML
pub async fn get_metadata(State(state): State<SamlState>) -> Response {
    match get_metadata_inner(&state).await {
        Ok(xml) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
            xml,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Metadata generation failed");
            e.into_response()
        }
    }
}

async fn get_metadata_inner(state: &SamlState) -> SamlResult<String> {
    let credentials = state.credentials.signing_credentials().await?;
    MetadataGenerator::new(&state.options, Some(&credentials)).generate(state.clock.now())
}
