use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use password_hash::PasswordHash;
use scrypt::password_hash::{rand_core::OsRng, PasswordHasher, PasswordVerifier, SaltString};
use scrypt::Scrypt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::{DBService, User};
use crate::error::{AppError, Result};

const TOKEN_VALIDITY_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
}

/// Issues and checks the signed bearer tokens handed out at login.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSigner")
    }
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn issue(&self, user: &User) -> Result<String> {
        let exp = OffsetDateTime::now_utc() + time::Duration::hours(TOKEN_VALIDITY_HOURS);
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            exp: exp.unix_timestamp(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }
}

/// Where the recovery acknowledgment goes. Actual mail dispatch lives outside
/// this service; the default implementation only logs.
#[async_trait]
pub trait RecoveryNotifier {
    async fn send_recovery(&self, email: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl RecoveryNotifier for LogMailer {
    async fn send_recovery(&self, email: &str) -> Result<()> {
        tracing::info!("password recovery requested for {email}");
        Ok(())
    }
}

pub async fn register(db: &DBService, email: &str, password: &str) -> Result<User> {
    if email.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "email and password are required".to_string(),
        ));
    }
    let phc = hash_password(password)?;
    db.create_user(email, &phc).await
}

/// Lookup failure and hash mismatch collapse into the same error so the
/// response can't be used to probe which emails are registered.
pub async fn login(
    db: &DBService,
    signer: &TokenSigner,
    email: &str,
    password: &str,
) -> Result<String> {
    let user = db
        .get_user_by_email(email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(password, &user.password) {
        return Err(AppError::InvalidCredentials);
    }

    tracing::info!("authenticated user {}", user.id);
    signer.issue(&user)
}

pub async fn get_user(db: &DBService, id: &str) -> Result<User> {
    db.get_user(id)
        .await?
        .ok_or(AppError::NotFound { what: "User" })
}

/// The password is rehashed unconditionally.
pub async fn update_user(db: &DBService, id: &str, email: &str, password: &str) -> Result<User> {
    let phc = hash_password(password)?;
    db.update_user(id, email, &phc)
        .await?
        .ok_or(AppError::NotFound { what: "User" })
}

pub async fn recover_password<N: RecoveryNotifier>(
    db: &DBService,
    notifier: &N,
    email: &str,
) -> Result<()> {
    db.get_user_by_email(email)
        .await?
        .ok_or(AppError::NotFound { what: "User" })?;
    notifier.send_recovery(email).await
}

pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let phc = Scrypt
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AppError::PasswordHash(err.to_string()))?;
    Ok(phc.to_string())
}

pub(crate) fn verify_password(password: &str, phc: &str) -> bool {
    let parsed = match PasswordHash::new(phc) {
        Ok(p) => p,
        Err(err) => {
            tracing::error!("invalid phc in DB: {err:?}");
            return false;
        }
    };
    Scrypt.verify_password(password.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_db;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hash_then_verify() {
        let phc = hash_password("hunter2").unwrap();
        assert_ne!(phc, "hunter2");
        assert!(verify_password("hunter2", &phc));
        assert!(!verify_password("hunter3", &phc));
    }

    #[tokio::test]
    async fn register_then_login_issues_a_decodable_token() {
        let db = memory_db().await;
        let signer = TokenSigner::new("secret");

        let user = register(&db, "a@example.com", "hunter2").await.unwrap();
        let token = login(&db, &signer, "a@example.com", "hunter2")
            .await
            .unwrap();

        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "a@example.com");
        assert!(claims.exp > OffsetDateTime::now_utc().unix_timestamp());
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let db = memory_db().await;
        let signer = TokenSigner::new("secret");
        register(&db, "a@example.com", "hunter2").await.unwrap();

        let wrong_password = login(&db, &signer, "a@example.com", "nope")
            .await
            .unwrap_err();
        let unknown_email = login(&db, &signer, "b@example.com", "hunter2")
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, AppError::InvalidCredentials));
        assert!(matches!(unknown_email, AppError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn update_rehashes_the_password() {
        let db = memory_db().await;
        let signer = TokenSigner::new("secret");
        let user = register(&db, "a@example.com", "hunter2").await.unwrap();

        update_user(&db, &user.id, "b@example.com", "hunter3")
            .await
            .unwrap();

        assert!(login(&db, &signer, "b@example.com", "hunter3").await.is_ok());
        assert!(login(&db, &signer, "b@example.com", "hunter2")
            .await
            .is_err());
    }

    #[derive(Default)]
    struct CountingMailer {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl RecoveryNotifier for CountingMailer {
        async fn send_recovery(&self, _email: &str) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn recovery_only_notifies_known_users() {
        let db = memory_db().await;
        let mailer = CountingMailer::default();
        register(&db, "a@example.com", "hunter2").await.unwrap();

        recover_password(&db, &mailer, "a@example.com")
            .await
            .unwrap();
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 1);

        let err = recover_password(&db, &mailer, "b@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { what: "User" }));
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 1);
    }
}
