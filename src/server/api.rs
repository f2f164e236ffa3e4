use crate::config::variant::Features;
use crate::llm::{ LlmError, API_FAILURE_HINT, MISSING_CREDENTIAL_MESSAGE, SETUP_INSTRUCTIONS };
use crate::server::page::render_index;
use crate::server::{ same_origin, AppState };
use axum::{
    body::Bytes,
    extract::{ DefaultBodyLimit, Query, State },
    http::{ HeaderMap, StatusCode },
    response::{ Html, IntoResponse },
    routing::{ get, post },
    Json,
    Router,
};
use serde::{ Deserialize, Serialize };
use log::{ info, warn };

const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub prompt: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub message: String,
    pub result: Option<String>,
    pub hint: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProfileResponse {
    pub variant: String,
    pub title: String,
    pub models: Vec<String>,
    pub default_temperature: f32,
    pub features: Features,
    pub default_system_prompt: Option<String>,
    pub credential_configured: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/profile", get(profile_handler))
        .route(
            "/api/analyze-image",
            post(analyze_image_handler).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES))
        )
}

async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    Html(render_index(&profile_response(&state)))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn profile_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(profile_response(&state))
}

pub(crate) fn profile_response(state: &AppState) -> ProfileResponse {
    let profile = &state.profile;
    ProfileResponse {
        variant: state.variant.to_string(),
        title: profile.title.clone(),
        models: profile.models.clone(),
        default_temperature: profile.default_temperature,
        features: profile.features.clone(),
        default_system_prompt: profile.default_system_prompt.clone(),
        credential_configured: state.agent.is_enabled(),
    }
}

async fn analyze_image_handler(
    State(state): State<AppState>,
    Query(req): Query<AnalyzeRequest>,
    headers: HeaderMap,
    body: Bytes
) -> impl IntoResponse {
    if !same_origin(&headers) {
        warn!("Rejected cross-origin image analysis request");
        return (
            StatusCode::FORBIDDEN,
            Json(AnalyzeResponse {
                success: false,
                message: "Cross-origin requests are not allowed".into(),
                result: None,
                hint: None,
            }),
        ).into_response();
    }

    if !state.profile.features.image_analysis {
        return (
            StatusCode::NOT_FOUND,
            Json(AnalyzeResponse {
                success: false,
                message: "Image analysis is not available in this UI".into(),
                result: None,
                hint: None,
            }),
        ).into_response();
    }

    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(AnalyzeResponse {
                success: false,
                message: "No image was uploaded".into(),
                result: None,
                hint: None,
            }),
        ).into_response();
    }

    let prompt = req.prompt.unwrap_or_default();
    info!("Image analysis requested ({} bytes)", body.len());

    match state.agent.analyze_image(&body, &prompt).await {
        Ok(result) =>
            (
                StatusCode::OK,
                Json(AnalyzeResponse {
                    success: true,
                    message: "Analysis complete".into(),
                    result: Some(result),
                    hint: None,
                }),
            ).into_response(),
        Err(LlmError::MissingCredential) =>
            (
                StatusCode::OK,
                Json(AnalyzeResponse {
                    success: false,
                    message: format!("{} Image analysis is unavailable.", MISSING_CREDENTIAL_MESSAGE),
                    result: None,
                    hint: Some(SETUP_INSTRUCTIONS.into()),
                }),
            ).into_response(),
        Err(e) => {
            warn!("Image analysis failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(AnalyzeResponse {
                    success: false,
                    message: format!("An error occurred during image analysis: {}", e),
                    result: None,
                    hint: Some(API_FAILURE_HINT.into()),
                }),
            ).into_response()
        }
    }
}
