/// Authentication Routes
///
/// HTTP adapter over `AuthService`: parses bodies, reads cookies and turns
/// sessions into `Set-Cookie` headers.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{
    AuthService, AuthSession, AuthenticatedUser, CHANGE_PASSWORD_MESSAGE,
    FORGOT_PASSWORD_MESSAGE, RESET_PASSWORD_MESSAGE,
};
use crate::cookies::{CookiePolicy, REFRESH_TOKEN_COOKIE};
use crate::error::{AppError, AuthError};
use crate::models::PublicUser;
use crate::validators::required;

/// Signup / signin request
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// Body of signup and signin responses
#[derive(Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    pub access_token: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl SuccessResponse {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn with_message(message: &'static str) -> Self {
        Self {
            success: true,
            message: Some(message),
        }
    }
}

fn refresh_cookie_value(req: &HttpRequest) -> Option<String> {
    req.cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
}

fn session_response(session: AuthSession, cookies: &CookiePolicy) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(cookies.access_cookie(&session.tokens.access_token))
        .cookie(cookies.refresh_cookie(&session.tokens.refresh_token))
        .json(AuthResponse {
            user: session.user,
            access_token: session.tokens.access_token,
        })
}

/// POST /auth/signup
///
/// # Errors
/// - 400: missing email/password, malformed email, password under 6 characters
/// - 409: email already registered
pub async fn signup(
    body: web::Json<CredentialsRequest>,
    auth: web::Data<AuthService>,
    cookies: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let email = required(&body.email, "email")?;
    let password = required(&body.password, "password")?;

    let session = auth.signup(email, password).await?;
    Ok(session_response(session, &cookies))
}

/// POST /auth/signin
///
/// # Errors
/// - 401: missing credentials, unknown email or wrong password (same
///   message for all three)
pub async fn signin(
    body: web::Json<CredentialsRequest>,
    auth: web::Data<AuthService>,
    cookies: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let (Ok(email), Ok(password)) = (
        required(&body.email, "email"),
        required(&body.password, "password"),
    ) else {
        return Err(AuthError::InvalidCredentials.into());
    };

    let session = auth.signin(email, password).await?;
    Ok(session_response(session, &cookies))
}

/// POST /auth/refresh
///
/// Reads the `refresh_token` cookie and rotates both cookies.
///
/// # Errors
/// - 401: missing, invalid, expired, revoked or wrong-type refresh token
pub async fn refresh(
    req: HttpRequest,
    auth: web::Data<AuthService>,
    cookies: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let presented = refresh_cookie_value(&req);
    let session = auth.refresh(presented.as_deref()).await?;

    Ok(HttpResponse::Ok()
        .cookie(cookies.access_cookie(&session.tokens.access_token))
        .cookie(cookies.refresh_cookie(&session.tokens.refresh_token))
        .json(SuccessResponse::ok()))
}

/// POST /auth/logout
///
/// Always 200; both cookies are cleared whatever state the token is in.
pub async fn logout(
    req: HttpRequest,
    auth: web::Data<AuthService>,
    cookies: web::Data<CookiePolicy>,
) -> HttpResponse {
    let presented = refresh_cookie_value(&req);
    auth.logout(presented.as_deref()).await;

    let [cleared_access, cleared_refresh] = cookies.cleared_cookies();
    HttpResponse::Ok()
        .cookie(cleared_access)
        .cookie(cleared_refresh)
        .json(SuccessResponse::ok())
}

/// GET /auth/me
///
/// **Requires a valid access token** (Bearer header or cookie); the JWT
/// middleware injects the `AuthenticatedUser`.
pub async fn me(
    user: web::ReqData<AuthenticatedUser>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = auth.me(user.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// POST /auth/forgot-password
///
/// Same response whether or not the account exists, and whatever the body.
pub async fn forgot_password(
    body: Option<web::Json<ForgotPasswordRequest>>,
    auth: web::Data<AuthService>,
) -> HttpResponse {
    let email = body.and_then(|b| b.into_inner().email);
    if let Some(email) = email.as_deref().filter(|e| !e.is_empty()) {
        auth.forgot_password(email).await;
    }

    HttpResponse::Ok().json(SuccessResponse::with_message(FORGOT_PASSWORD_MESSAGE))
}

/// POST /auth/reset-password
///
/// # Errors
/// - 400: missing fields, short password, unknown or expired token
pub async fn reset_password(
    body: web::Json<ResetPasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let token = required(&body.token, "token")?;
    let new_password = required(&body.new_password, "newPassword")?;

    auth.reset_password(token, new_password).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::with_message(RESET_PASSWORD_MESSAGE)))
}

/// POST /auth/change-password
///
/// **Requires a valid access token.** The session whose `refresh_token`
/// cookie accompanies the request stays signed in; all others are revoked.
///
/// # Errors
/// - 400: missing fields, short new password, wrong current password
/// - 401: not authenticated
pub async fn change_password(
    req: HttpRequest,
    user: web::ReqData<AuthenticatedUser>,
    body: web::Json<ChangePasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let current_password = required(&body.current_password, "currentPassword")?;
    let new_password = required(&body.new_password, "newPassword")?;
    let presented = refresh_cookie_value(&req);

    auth.change_password(
        user.user_id,
        current_password,
        new_password,
        presented.as_deref(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(SuccessResponse::with_message(CHANGE_PASSWORD_MESSAGE)))
}
