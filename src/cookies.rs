//! Session cookies
//!
//! Both tokens travel as HttpOnly cookies on `/`. In production they are
//! `Secure` and `SameSite=Strict`; in development `SameSite=Lax` over plain
//! HTTP.

use actix_web::cookie::time::Duration;
use actix_web::cookie::{Cookie, SameSite};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

#[derive(Debug, Clone)]
pub struct CookiePolicy {
    production: bool,
    access_max_age: i64,
    refresh_max_age: i64,
}

impl CookiePolicy {
    /// Max ages are in seconds and should match the token lifetimes.
    pub fn new(production: bool, access_max_age: i64, refresh_max_age: i64) -> Self {
        Self {
            production,
            access_max_age,
            refresh_max_age,
        }
    }

    pub fn access_cookie(&self, token: &str) -> Cookie<'static> {
        self.build(ACCESS_TOKEN_COOKIE, token.to_string(), self.access_max_age)
    }

    pub fn refresh_cookie(&self, token: &str) -> Cookie<'static> {
        self.build(REFRESH_TOKEN_COOKIE, token.to_string(), self.refresh_max_age)
    }

    /// Same attributes as the live cookies, empty value, `Max-Age=0`.
    pub fn cleared_cookies(&self) -> [Cookie<'static>; 2] {
        [
            self.build(ACCESS_TOKEN_COOKIE, String::new(), 0),
            self.build(REFRESH_TOKEN_COOKIE, String::new(), 0),
        ]
    }

    fn build(&self, name: &'static str, value: String, max_age: i64) -> Cookie<'static> {
        let same_site = if self.production {
            SameSite::Strict
        } else {
            SameSite::Lax
        };

        Cookie::build(name, value)
            .path("/")
            .http_only(true)
            .secure(self.production)
            .same_site(same_site)
            .max_age(Duration::seconds(max_age))
            .finish()
    }
}
