//! HTTP API handlers.
//!
//! Actix routes for narration control: request/stop narration, status
//! snapshots, and downloading generated WAV artifacts.

use actix_web::{HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use narration_player::controller::NarrationController;

/// Shared application state for handlers.
pub struct AppState {
    pub controller: NarrationController,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Narration request payload.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NarrateRequest {
    /// Stable narration identifier (resource or announcement id).
    pub id: String,
    /// Text to read aloud.
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: message.to_string(),
    })
}

/// Basic health check for clients.
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Current controller status snapshot.
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Controller status", body = narration_types::NarrationStatus)
    )
)]
#[get("/status")]
pub async fn status(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.controller.status())
}

/// Request narration of a text under a stable id.
///
/// Re-requesting the currently playing id stops it; a different id stops the
/// active stream and takes over.
#[utoipa::path(
    post,
    path = "/api/narrate",
    request_body = NarrateRequest,
    responses(
        (status = 202, description = "Narration request accepted"),
        (status = 400, description = "Bad request", body = ErrorResponse)
    )
)]
#[post("/narrate")]
pub async fn narrate(state: web::Data<AppState>, body: web::Json<NarrateRequest>) -> impl Responder {
    let id = body.id.trim();
    if id.is_empty() {
        return bad_request("id must not be empty");
    }
    if body.text.trim().is_empty() {
        return bad_request("text must not be empty");
    }
    tracing::info!(id = %id, chars = body.text.len(), "narrate request");
    state.controller.narrate(id, &body.text);
    HttpResponse::Accepted().finish()
}

/// Stop whatever is generating or playing.
#[utoipa::path(
    post,
    path = "/api/stop",
    responses(
        (status = 200, description = "Narration stopped")
    )
)]
#[post("/stop")]
pub async fn stop(state: web::Data<AppState>) -> impl Responder {
    tracing::info!("stop request");
    state.controller.stop();
    HttpResponse::Ok().finish()
}

/// Download the generated WAV artifact for a narration id.
#[utoipa::path(
    get,
    path = "/api/narrations/{id}/audio",
    params(
        ("id" = String, Path, description = "Narration id")
    ),
    responses(
        (status = 200, description = "WAV artifact", body = Vec<u8>, content_type = "audio/wav"),
        (status = 404, description = "No generated audio for this id", body = ErrorResponse)
    )
)]
#[get("/narrations/{id}/audio")]
pub async fn narration_audio(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    match state.controller.clip(&id) {
        Some(clip) => HttpResponse::Ok()
            .content_type("audio/wav")
            .body(clip.wav.clone()),
        None => HttpResponse::NotFound().json(ErrorResponse {
            error: format!("no generated audio for {id}"),
        }),
    }
}
