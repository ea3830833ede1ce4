use async_trait::async_trait;
use base64::Engine as _;
use rand::RngCore;
use uuid::Uuid;

use crate::application::ports::debugging_key_repository::DebuggingKeyRepository;
use crate::infrastructure::db::PgPool;

pub struct SqlxDebuggingKeyRepository {
    pub pool: PgPool,
}

impl SqlxDebuggingKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn mint_key() -> String {
    let mut buf = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

#[async_trait]
impl DebuggingKeyRepository for SqlxDebuggingKeyRepository {
    async fn get_or_create(&self, tenant_id: Uuid) -> anyhow::Result<String> {
        if let Some(key) = sqlx::query_scalar::<_, String>(
            "SELECT key FROM tenant_debugging_keys WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(key);
        }

        // Two racing callers both insert; the conflict clause keeps whichever
        // row landed first and both read it back.
        let minted = mint_key();
        sqlx::query(
            r#"INSERT INTO tenant_debugging_keys (tenant_id, key)
               VALUES ($1, $2)
               ON CONFLICT (tenant_id) DO NOTHING"#,
        )
        .bind(tenant_id)
        .bind(&minted)
        .execute(&self.pool)
        .await?;

        let key = sqlx::query_scalar::<_, String>(
            "SELECT key FROM tenant_debugging_keys WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(key)
    }
}
