use axum::extract::FromRef;
use jsonwebtoken::{decode, DecodingKey, Validation};
use tracing::debug;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

/// Verification half of the operator JWT setup. Tokens are minted elsewhere.
#[derive(Clone)]
pub struct JwtKeys {
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    #[cfg(test)]
    secret: String,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
        } = state.config.jwt.clone();
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            #[cfg(test)]
            secret,
        }
    }
}

impl JwtKeys {
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(operator = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }

    #[cfg(test)]
    pub fn sign(&self, subject: &str) -> anyhow::Result<String> {
        self.sign_with(subject, &self.issuer, 300)
    }

    #[cfg(test)]
    pub fn sign_with(&self, subject: &str, issuer: &str, ttl_secs: i64) -> anyhow::Result<String> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        use time::OffsetDateTime;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now as usize,
            exp: (now + ttl_secs) as usize,
            iss: issuer.to_string(),
            aud: self.audience.clone(),
        };
        let encoding = EncodingKey::from_secret(self.secret.as_bytes());
        Ok(encode(&Header::default(), &claims, &encoding)?)
    }
}
