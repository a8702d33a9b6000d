use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::errors::AppError;

/// The single user allowed through HTTP Basic auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check an `Authorization` header value.
    pub fn verify(&self, header: &str) -> Result<(), &'static str> {
        let encoded = header
            .strip_prefix("Basic ")
            .ok_or("authorization scheme is not Basic")?;
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| "credentials are not valid base64")?;
        let decoded = String::from_utf8(decoded).map_err(|_| "credentials are not UTF-8")?;
        let (user, pass) = decoded
            .split_once(':')
            .ok_or("credentials are not user:password")?;

        if user == self.username && pass == self.password {
            Ok(())
        } else {
            Err("wrong username or password")
        }
    }
}

pub async fn require_basic_auth(
    State(credentials): State<Arc<Credentials>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AppError::Unauthorized("missing authorization header"))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("authorization header is not ASCII"))?;

    credentials.verify(header).map_err(AppError::Unauthorized)?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(raw: &str) -> String {
        format!("Basic {}", STANDARD.encode(raw))
    }

    #[test]
    fn accepts_matching_credentials() {
        let creds = Credentials::new("admin", "s3cret:with:colons");
        assert!(creds.verify(&basic("admin:s3cret:with:colons")).is_ok());
    }

    #[test]
    fn rejects_everything_else() {
        let creds = Credentials::new("admin", "s3cret");
        for header in [
            basic("admin:wrong"),
            basic("other:s3cret"),
            basic("admins3cret"),
            "Bearer abc".to_owned(),
            "Basic !!!".to_owned(),
        ] {
            assert!(creds.verify(&header).is_err(), "{header}");
        }
    }
}
