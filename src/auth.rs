use crate::error::ApiError;
use crate::schemas::{normalize_email, UserEmail};
use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::num::ParseIntError;

type HmacSha256 = Hmac<Sha256>;

/// Secret the identity hashes are keyed with.
#[derive(Clone)]
pub struct AuthSecret(pub String);

/// The authenticated user performing a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub email: UserEmail,
    pub username: String,
}

#[derive(Deserialize, Debug, Clone)]
struct SignedIdentity {
    auth_date: String,
    email: String,
    username: String,
    hash: String,
}

impl FromRequest for Actor {
    type Error = ApiError;
    type Future = Ready<Result<Actor, ApiError>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        let result = match request.app_data::<web::Data<AuthSecret>>() {
            Some(secret) => check_authorization(request, &secret.0)
                .ok_or_else(|| ApiError::Unauthorized("Invalid or missing identity".to_string())),
            None => {
                tracing::error!("no auth secret configured");
                Err(ApiError::Unauthorized("Authentication unavailable".to_string()))
            }
        };
        ready(result)
    }
}

pub fn check_authorization(request: &HttpRequest, secret: &str) -> Option<Actor> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let identity: SignedIdentity = serde_json::from_str(authorization).ok()?;
    let hash = identity
        .hash
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|n| u8::from_str_radix(&String::from_iter(n), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()?;
    let mut mac = keyed_mac(secret);
    mac.update(signed_content(&identity.auth_date, &identity.email, &identity.username).as_bytes());
    mac.verify_slice(&hash).ok()?;
    Some(Actor {
        email: normalize_email(&identity.email),
        username: identity.username,
    })
}

/// Hex hash a client must send for the given identity.
pub fn sign_identity(secret: &str, auth_date: &str, email: &str, username: &str) -> String {
    let mut mac = keyed_mac(secret);
    mac.update(signed_content(auth_date, email, username).as_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn signed_content(auth_date: &str, email: &str, username: &str) -> String {
    [
        ("auth_date", auth_date),
        ("email", email),
        ("username", username),
    ]
    .iter()
    .map(|(key, value)| format!("{key}={value}"))
    .collect::<Vec<_>>()
    .join("\n")
}

fn keyed_mac(secret: &str) -> HmacSha256 {
    let mut sha256_hasher = Sha256::new();
    sha256_hasher.update(secret.as_bytes());
    let secret_hash = sha256_hasher.finalize();
    HmacSha256::new_from_slice(&secret_hash).expect("HMAC accepts any key length")
}
