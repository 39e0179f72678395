use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthService, PasswordHasher, RevocationLedger, TokenIssuer};
use crate::configuration::Settings;
use crate::cookies::CookiePolicy;
use crate::email_client::ResetTokenSender;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::repository::{RefreshTokenStore, UserStore};
use crate::routes::{
    change_password, forgot_password, health_check, logout, me, refresh, reset_password, signin,
    signup,
};

/// Wires the auth flows from settings and the chosen stores.
pub fn build_auth_service(
    settings: &Settings,
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    reset_sender: Arc<dyn ResetTokenSender>,
) -> Result<AuthService, AppError> {
    let ledger = RevocationLedger::new(refresh_tokens, settings.jwt.refresh_token_expiry);
    let tokens = TokenIssuer::new(&settings.jwt);
    let hasher = PasswordHasher::new(settings.auth.bcrypt_cost)?;

    Ok(AuthService::new(
        users,
        ledger,
        tokens,
        hasher,
        reset_sender,
        settings.auth.reset_token_expiry,
    ))
}

pub fn cookie_policy(settings: &Settings) -> CookiePolicy {
    CookiePolicy::new(
        settings.application.production,
        settings.jwt.access_token_expiry,
        settings.jwt.refresh_token_expiry,
    )
}

pub fn run(
    listener: TcpListener,
    auth: AuthService,
    cookies: CookiePolicy,
) -> Result<Server, std::io::Error> {
    let tokens = auth.tokens().clone();
    let auth = web::Data::new(auth);
    let cookies = web::Data::new(cookies);

    let server = HttpServer::new(move || {
        // Unparseable or wrongly typed bodies answer with the usual error body
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            AppError::Validation(ValidationError::MalformedBody(err.to_string())).into()
        });

        App::new()
            .wrap(LoggerMiddleware)
            .app_data(json_config)
            .app_data(auth.clone())
            .app_data(cookies.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/signup", web::post().to(signup))
                    .route("/signin", web::post().to(signin))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    .route("/forgot-password", web::post().to(forgot_password))
                    .route("/reset-password", web::post().to(reset_password))
                    // Protected routes (require an access token)
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware::new(tokens.clone()))
                            .route(web::get().to(me)),
                    )
                    .service(
                        web::resource("/change-password")
                            .wrap(JwtMiddleware::new(tokens.clone()))
                            .route(web::post().to(change_password)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
