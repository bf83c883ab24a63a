use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatcher::{ProgramStore, UserInfo};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

pub async fn build_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Saved programs and their public links, kept in Postgres.
#[derive(Clone)]
pub struct PgProgramStore {
    pool: PgPool,
}

impl PgProgramStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS programs (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                text TEXT NOT NULL,
                args TEXT,
                run_conf TEXT NOT NULL,
                public_link UUID UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await
        .context("failed to create programs table")?;
        sqlx::query("CREATE INDEX IF NOT EXISTS programs_user_idx ON programs (user_id)")
            .execute(&self.pool)
            .await?;
        info!("program storage ready");
        Ok(())
    }

    async fn load_by(&self, column: &str, value: Uuid) -> anyhow::Result<String> {
        let query = format!(
            "SELECT id, name, text, args, run_conf, public_link FROM programs WHERE {column} = $1"
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("program not found"))?;
        Ok(json!({
            "id": row.get::<Uuid, _>("id"),
            "name": row.get::<String, _>("name"),
            "text": row.get::<String, _>("text"),
            "args": row.get::<Option<String>, _>("args"),
            "runConf": row.get::<String, _>("run_conf"),
            "publicLink": row.get::<Option<Uuid>, _>("public_link"),
        })
        .to_string())
    }
}

fn require_user(user: &UserInfo) -> anyhow::Result<&str> {
    match user.id.as_deref() {
        Some(id) if !id.is_empty() => Ok(id),
        _ => bail!("anonymous users cannot store programs"),
    }
}

fn parse_id(value: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(value.trim()).with_context(|| format!("invalid program id '{value}'"))
}

#[async_trait]
impl ProgramStore for PgProgramStore {
    async fn list_programs(&self, user: &UserInfo) -> anyhow::Result<String> {
        let user_id = require_user(user)?;
        let rows = sqlx::query(
            "SELECT id, name, run_conf, public_link, updated_at FROM programs WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let programs: Vec<_> = rows
            .into_iter()
            .map(|row| {
                let updated: DateTime<Utc> = row.get("updated_at");
                json!({
                    "id": row.get::<Uuid, _>("id"),
                    "name": row.get::<String, _>("name"),
                    "runConf": row.get::<String, _>("run_conf"),
                    "publicLink": row.get::<Option<Uuid>, _>("public_link"),
                    "updatedAt": updated.to_rfc3339(),
                })
            })
            .collect();
        Ok(serde_json::Value::Array(programs).to_string())
    }

    async fn program_text(&self, id: &str) -> anyhow::Result<String> {
        self.load_by("id", parse_id(id)?).await
    }

    async fn program_text_by_public_link(&self, link: &str) -> anyhow::Result<String> {
        self.load_by("public_link", parse_id(link)?).await
    }

    async fn save_program(
        &self,
        user: &UserInfo,
        name: &str,
        text: &str,
        args: Option<&str>,
        run_conf: &str,
    ) -> anyhow::Result<String> {
        let user_id = require_user(user)?;
        let name = name.trim();
        if name.is_empty() {
            bail!("program name must not be empty");
        }
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO programs (id, user_id, name, text, args, run_conf) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(text)
        .bind(args)
        .bind(run_conf)
        .execute(&self.pool)
        .await
        .context("failed to save program")?;
        Ok(json!({ "id": id, "name": name }).to_string())
    }

    async fn update_program(
        &self,
        id: &str,
        text: &str,
        args: Option<&str>,
        run_conf: &str,
    ) -> anyhow::Result<String> {
        let id = parse_id(id)?;
        let result = sqlx::query(
            "UPDATE programs SET text = $2, args = $3, run_conf = $4, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(text)
        .bind(args)
        .bind(run_conf)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            bail!("program not found");
        }
        Ok(json!({ "id": id, "status": "updated" }).to_string())
    }

    async fn delete_program(&self, user: &UserInfo, id: &str) -> anyhow::Result<String> {
        let user_id = require_user(user)?;
        let id = parse_id(id)?;
        let result = sqlx::query("DELETE FROM programs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("program not found");
        }
        Ok(json!({ "id": id, "status": "deleted" }).to_string())
    }

    async fn generate_public_link(&self, id: &str) -> anyhow::Result<String> {
        let id = parse_id(id)?;
        let row = sqlx::query(
            "UPDATE programs SET public_link = COALESCE(public_link, $2) WHERE id = $1 RETURNING public_link",
        )
        .bind(id)
        .bind(Uuid::new_v4())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow!("program not found"))?;
        let link: Option<Uuid> = row.get("public_link");
        Ok(json!({ "id": id, "publicLink": link }).to_string())
    }
}
