//! OpenAPI specification for the yoloc server.

use utoipa::OpenApi;

use yoloc_core::{CheckOutcome, CheckResult, CheckRow, Scorecard};

use crate::routes::{ErrorResponse, InFlightRun, ThreadzResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::api_score,
        crate::routes::healthz,
        crate::routes::threadz,
        crate::routes::openapi_json
    ),
    components(
        schemas(
            Scorecard,
            CheckRow,
            CheckOutcome,
            CheckResult,
            ErrorResponse,
            InFlightRun,
            ThreadzResponse
        )
    ),
    tags(
        (name = "score", description = "Compliance scoring"),
        (name = "system", description = "System endpoints")
    )
)]
/// OpenAPI specification for the yoloc server.
pub struct ApiDoc;
