//! Registration, login and bearer-token authentication.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::access::Principal;
use crate::config::AdminAccount;
use crate::domain::aggregates::{AccessToken, User};
use crate::store::Store;
use crate::{EcommerceError, Result};

pub const USERNAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 8;

/// Argon2id hash with default parameters that no password matches.
const UNKNOWN_USER_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$0At+CaYiHMu++ceIzXB89Q$tvQxoYaXBjlI0cTrL8tClFFaSTl+pYpd89w84ZS97FY";

#[derive(Clone, Debug)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Store>,
    token_ttl: Duration,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, token_ttl: Duration) -> Self {
        Self { store, token_ttl }
    }

    #[instrument(skip(self, registration), fields(username = %registration.username))]
    pub async fn register(&self, registration: Registration) -> Result<User> {
        self.create_user(registration, false).await
    }

    /// Issues a fresh token. Tokens that have already expired are purged in
    /// the same transaction.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken> {
        let rejected = || EcommerceError::Unauthenticated("invalid username or password".into());
        let user = self.store.user_by_username(username).await?;
        // unknown usernames pay for a full verify too
        let stored = user.as_ref().map_or(UNKNOWN_USER_HASH, |u| u.password_hash.as_str()).to_string();
        let provided = password.to_string();
        let verified = tokio::task::spawn_blocking(move || verify_password(&stored, &provided))
            .await
            .map_err(|e| EcommerceError::Internal(format!("password verification task failed: {}", e)))??;
        let user = match user {
            Some(user) if verified => user,
            Some(user) => {
                warn!(user_id = %user.id, "login rejected");
                return Err(rejected());
            }
            None => return Err(rejected()),
        };

        let token = AccessToken::issue(generate_token_string(), user.id, self.token_ttl);
        let mut tx = self.store.begin().await?;
        let purged = tx.purge_expired_tokens(Utc::now()).await?;
        tx.insert_access_token(&token).await?;
        tx.commit().await?;
        info!(user_id = %user.id, purged, "token issued");
        Ok(IssuedToken {
            access_token: token.token,
            token_type: "Bearer",
            expires_in: self.token_ttl.num_seconds(),
            expires_at: token.expires_at,
        })
    }

    /// Resolves a bearer token to the caller it was issued to.
    pub async fn authenticate(&self, token: &str) -> Result<Principal> {
        let rejected = || EcommerceError::Unauthenticated("invalid or expired token".into());
        let token = self.store.access_token(token).await?.filter(|t| !t.is_expired()).ok_or_else(rejected)?;
        let user = self.store.user(token.user_id).await?.ok_or_else(rejected)?;
        Ok(Principal::new(user.id, user.is_staff))
    }

    /// Creates the configured staff account unless it exists already. A
    /// non-staff account under that username is a configuration error.
    #[instrument(skip(self, admin), fields(username = %admin.username))]
    pub async fn ensure_admin(&self, admin: &AdminAccount) -> Result<User> {
        if let Some(existing) = self.store.user_by_username(&admin.username).await? {
            if !existing.is_staff {
                return Err(EcommerceError::Config(format!(
                    "ADMIN_USERNAME {:?} belongs to an existing non-staff account",
                    admin.username
                )));
            }
            return Ok(existing);
        }
        let registration = Registration {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password: admin.password.clone(),
        };
        self.create_user(registration, true).await
    }

    async fn create_user(&self, registration: Registration, staff: bool) -> Result<User> {
        let username = registration.username.trim();
        let len = username.chars().count();
        if len == 0 || len > USERNAME_MAX_LEN {
            return Err(EcommerceError::validation("username", format!("must be 1 to {} characters", USERNAME_MAX_LEN)));
        }
        if registration.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(EcommerceError::validation("password", format!("must be at least {} characters", PASSWORD_MIN_LEN)));
        }

        let password = registration.password;
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| EcommerceError::Internal(format!("password hashing task failed: {}", e)))??;
        let mut user = User::new(username, registration.email.trim(), hash);
        if staff {
            user = user.staff();
        }

        let mut tx = self.store.begin().await?;
        tx.insert_user(&user).await?;
        tx.commit().await?;
        info!(user_id = %user.id, is_staff = user.is_staff, "user registered");
        Ok(user)
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| EcommerceError::Internal(format!("password hashing failed: {}", e)))
}

fn verify_password(stored: &str, provided: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| EcommerceError::Internal(format!("stored password hash unreadable: {}", e)))?;
    match Argon2::default().verify_password(provided.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(EcommerceError::Internal(format!("password verification failed: {}", e))),
    }
}

fn generate_token_string() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;

    let bytes: [u8; 24] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}
