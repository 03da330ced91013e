use actix_web::{HttpResponse, Responder, get};
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health,
        api::status,
        api::narrate,
        api::stop,
        api::narration_audio,
    ),
    components(
        schemas(
            api::HealthResponse,
            api::NarrateRequest,
            api::ErrorResponse,
            narration_types::NarrationStatus,
            narration_types::NarrationPhase,
            narration_types::NarrationEndReason,
        )
    ),
    tags(
        (name = "narration-server", description = "Read-aloud narration control API")
    )
)]
pub struct ApiDoc;

/// Serve the generated OpenAPI document.
#[get("/openapi.json")]
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}
