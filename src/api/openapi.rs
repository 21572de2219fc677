//! OpenAPI document for the trust engine surface.

use utoipa::OpenApi;

use super::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "vigil",
        description = "Session and device trust engine",
        license(name = "BSD-3-Clause")
    ),
    paths(
        handlers::health::health,
        handlers::otp::request_code,
        handlers::otp::redeem_code,
        handlers::session::session,
        handlers::session::refresh,
        handlers::session::revoke,
        handlers::audit::verify,
        handlers::audit::export,
    ),
    components(schemas(
        handlers::types::RequestCodeRequest,
        handlers::types::RedeemRequest,
        handlers::types::RefreshRequest,
        handlers::types::SessionTokens,
        handlers::types::SessionInfo,
        handlers::types::VerifyResponse,
        handlers::types::ErrorBody,
        crate::audit::AuditRecord,
        crate::otp::code::Purpose,
        crate::session::Role,
    ))
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
