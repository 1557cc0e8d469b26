use crate::{
    auth::{LogMailer, TokenSigner},
    db::DBService,
    error::Result,
    storage::{S3Storage, StoreConfig},
};

/// Everything the handlers need, built once at startup and injected. No
/// process-wide singletons.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: DBService,
    pub store: S3Storage,
    pub signer: TokenSigner,
    pub mailer: LogMailer,
}

impl AppState {
    pub async fn new(db_path: &str, store_config: StoreConfig, jwt_secret: &str) -> Result<Self> {
        let db = DBService::new(db_path).await?;
        let store = S3Storage::new(store_config).await;

        Ok(Self {
            db,
            store,
            signer: TokenSigner::new(jwt_secret),
            mailer: LogMailer,
        })
    }
}
