use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use gcloud_gax::grpc::Code;
use gcloud_googleapis::spanner::admin::database::v1::{
    CreateDatabaseRequest, GetDatabaseDdlRequest, GetDatabaseRequest, UpdateDatabaseDdlRequest,
};
use gcloud_googleapis::spanner::admin::instance::v1::{
    CreateInstanceRequest, GetInstanceRequest, Instance,
};
use gcloud_spanner::admin::AdminClientConfig;
use gcloud_spanner::admin::client::Client as AdminClient;
use gcloud_spanner::client::{Client, ClientConfig};
use gcloud_spanner::key::Key;
use gcloud_spanner::mutation::{delete, insert_or_update};
use gcloud_spanner::statement::Statement;
use parking_lot::RwLock;

use crate::config::SpannerConfig;
use crate::store::{KvPair, RawKvStore};

const TABLE: &str = "raw_kv";

const CREATE_TABLE_DDL: &str = "CREATE TABLE raw_kv (
    key STRING(MAX) NOT NULL,
    value BYTES(MAX) NOT NULL,
) PRIMARY KEY (key)";

/// Raw key-value store kept in a single Spanner table.
///
/// The gcloud client is already safe for concurrent use; the lock only guards
/// the handle itself so `close` can take it out exactly once.
pub struct SpannerStore {
    client: RwLock<Option<Arc<Client>>>,
    database_path: String,
}

impl SpannerStore {
    /// Connect to the configured database, provisioning it first if needed.
    ///
    /// The gcloud-spanner library picks up `SPANNER_EMULATOR_HOST` on its own,
    /// so the emulator address only affects provisioning and logging here.
    ///
    /// # Arguments
    /// * `config` - Project, instance and database to use
    ///
    /// # Errors
    /// Returns an error if provisioning fails or the data client cannot be created
    pub async fn connect(config: &SpannerConfig) -> Result<Self> {
        provision(config).await?;

        let database_path = config.database_path();
        match &config.emulator_host {
            Some(host) => tracing::info!("Connecting to Spanner emulator at: {}", host),
            None => tracing::info!("Connecting to production Spanner"),
        }

        let client = Client::new(&database_path, ClientConfig::default())
            .await
            .context("Failed to create Spanner client")?;

        tracing::info!("Connected to Spanner database: {}", database_path);

        Ok(Self {
            client: RwLock::new(Some(Arc::new(client))),
            database_path,
        })
    }

    fn client(&self) -> Result<Arc<Client>> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| anyhow!("Spanner client for {} is closed", self.database_path))
    }
}

#[async_trait]
impl RawKvStore for SpannerStore {
    /// Read all `keys` in one single-use read-only transaction
    ///
    /// # Arguments
    /// * `keys` - Keys to look up; unknown keys are simply absent from the result
    ///
    /// # Returns
    /// * `Ok(pairs)` - Rows found, in no particular order
    /// * `Err(_)` - Client closed or Spanner query failed
    async fn batch_get(&self, keys: Vec<String>) -> Result<Vec<KvPair>> {
        let client = self.client()?;
        let requested = keys.len();

        let mut statement =
            Statement::new("SELECT key, value FROM raw_kv WHERE key IN UNNEST(@keys)");
        statement.add_param("keys", &keys);

        let mut tx = client
            .single()
            .await
            .context("Failed to create read transaction")?;
        let mut rows = tx
            .query(statement)
            .await
            .context("Failed to query keys from Spanner")?;

        let mut pairs = Vec::with_capacity(requested);
        while let Some(row) = rows.next().await? {
            let key: String = row.column_by_name("key")?;
            let value: Vec<u8> = row.column_by_name("value")?;
            pairs.push(KvPair { key, value });
        }

        tracing::debug!("Batch get found {} of {} keys", pairs.len(), requested);
        Ok(pairs)
    }

    /// Upsert every pair in one commit
    ///
    /// # Arguments
    /// * `pairs` - Keys and raw value bytes; existing rows are overwritten
    ///
    /// # Errors
    /// Returns an error if the client is closed or the commit fails; nothing is written then
    async fn batch_put(&self, pairs: Vec<KvPair>) -> Result<()> {
        let client = self.client()?;
        let count = pairs.len();

        let mutations = pairs
            .iter()
            .map(|pair| insert_or_update(TABLE, &["key", "value"], &[&pair.key, &pair.value]))
            .collect::<Vec<_>>();

        client
            .apply(mutations)
            .await
            .context("Failed to write keys to Spanner")?;

        tracing::debug!("Batch put wrote {} keys", count);
        Ok(())
    }

    /// Delete every key in one commit. Missing keys are ignored by Spanner.
    ///
    /// # Errors
    /// Returns an error if the client is closed or the commit fails
    async fn batch_delete(&self, keys: Vec<String>) -> Result<()> {
        let client = self.client()?;
        let count = keys.len();

        let key_set: Vec<Key> = keys.iter().map(|k| Key::new(k)).collect();
        client
            .apply(vec![delete(TABLE, key_set)])
            .await
            .context("Failed to delete keys from Spanner")?;

        tracing::debug!("Batch delete removed up to {} keys", count);
        Ok(())
    }

    async fn scan(&self, start_key: &str, limit: usize) -> Result<Vec<KvPair>> {
        let client = self.client()?;

        let mut statement = Statement::new(
            "SELECT key, value FROM raw_kv WHERE key >= @start ORDER BY key LIMIT @limit",
        );
        statement.add_param("start", &start_key.to_string());
        statement.add_param("limit", &i64::try_from(limit).unwrap_or(i64::MAX));

        let mut tx = client
            .single()
            .await
            .context("Failed to create scan transaction")?;
        let mut rows = tx
            .query(statement)
            .await
            .context("Failed to scan keys from Spanner")?;

        let mut pairs = Vec::new();
        while let Some(row) = rows.next().await? {
            let key: String = row.column_by_name("key")?;
            let value: Vec<u8> = row.column_by_name("value")?;
            pairs.push(KvPair { key, value });
        }
        Ok(pairs)
    }

    /// Release the client's session pool
    ///
    /// # Errors
    /// Returns an error if the store was already closed
    async fn close(&self) -> Result<()> {
        let handle = self
            .client
            .write()
            .take()
            .ok_or_else(|| anyhow!("Spanner client for {} already closed", self.database_path))?;

        match Arc::try_unwrap(handle) {
            Ok(client) => {
                client.close().await;
                tracing::info!("Spanner client closed: {}", self.database_path);
            }
            Err(_) => {
                // A request still holds a clone; its drop releases the sessions.
                tracing::warn!(
                    "Spanner client for {} still in use at close",
                    self.database_path
                );
            }
        }
        Ok(())
    }
}

/// Make sure the instance, database and `raw_kv` table exist.
///
/// Intended for zero-setup development against the emulator; against
/// production it only creates what is missing.
///
/// # Arguments
/// * `config` - Spanner resource names; the emulator host selects the instance config
///
/// # Errors
/// Returns an error if a lookup fails for a reason other than `NotFound`, or
/// if any create operation fails
async fn provision(config: &SpannerConfig) -> Result<()> {
    tracing::info!("Checking Spanner resources...");

    let admin = AdminClient::new(AdminClientConfig::default())
        .await
        .context("Failed to create Spanner admin client")?;

    let project_path = format!("projects/{}", config.project);
    let instance_path = format!("{}/instances/{}", project_path, config.instance);
    let database_path = config.database_path();

    ensure_instance(&admin, config, &project_path, &instance_path).await?;
    ensure_database(&admin, config, &instance_path, &database_path).await?;
    ensure_table(&admin, &database_path).await?;

    tracing::info!("Spanner resources ready");
    Ok(())
}

async fn ensure_instance(
    admin: &AdminClient,
    config: &SpannerConfig,
    project_path: &str,
    instance_path: &str,
) -> Result<()> {
    let request = GetInstanceRequest {
        name: instance_path.to_string(),
        field_mask: None,
    };

    match admin.instance().get_instance(request, None).await {
        Ok(_) => Ok(()),
        Err(status) if status.code() == Code::NotFound => {
            tracing::info!("Creating Spanner instance: {}", instance_path);

            let instance_config = match config.emulator_host {
                Some(_) => format!("{}/instanceConfigs/emulator-config", project_path),
                None => format!("{}/instanceConfigs/regional-us-central1", project_path),
            };

            let request = CreateInstanceRequest {
                parent: project_path.to_string(),
                instance_id: config.instance.clone(),
                instance: Some(Instance {
                    name: instance_path.to_string(),
                    config: instance_config,
                    display_name: format!("{} raw kv", config.instance),
                    node_count: 1,
                    ..Default::default()
                }),
            };

            admin
                .instance()
                .create_instance(request, None)
                .await
                .context("Failed to start instance creation")?
                .wait(None)
                .await
                .context("Failed to create instance")?;
            Ok(())
        }
        Err(e) => Err(anyhow!("Failed to look up instance: {}", e.message())),
    }
}

async fn ensure_database(
    admin: &AdminClient,
    config: &SpannerConfig,
    instance_path: &str,
    database_path: &str,
) -> Result<()> {
    let request = GetDatabaseRequest {
        name: database_path.to_string(),
    };

    match admin.database().get_database(request, None).await {
        Ok(_) => Ok(()),
        Err(status) if status.code() == Code::NotFound => {
            tracing::info!("Creating Spanner database: {}", database_path);

            let request = CreateDatabaseRequest {
                parent: instance_path.to_string(),
                create_statement: format!("CREATE DATABASE `{}`", config.database),
                extra_statements: vec![CREATE_TABLE_DDL.to_string()],
                encryption_config: None,
                database_dialect: 1,
                proto_descriptors: vec![],
            };

            admin
                .database()
                .create_database(request, None)
                .await
                .context("Failed to start database creation")?
                .wait(None)
                .await
                .context("Failed to create database")?;
            Ok(())
        }
        Err(e) => Err(anyhow!("Failed to look up database: {}", e.message())),
    }
}

async fn ensure_table(admin: &AdminClient, database_path: &str) -> Result<()> {
    let request = GetDatabaseDdlRequest {
        database: database_path.to_string(),
    };

    let ddl = admin
        .database()
        .get_database_ddl(request, None)
        .await
        .context("Failed to read database DDL")?
        .into_inner();

    if has_raw_kv_table(&ddl.statements) {
        return Ok(());
    }

    tracing::info!("Creating table '{}'", TABLE);
    let request = UpdateDatabaseDdlRequest {
        database: database_path.to_string(),
        statements: vec![CREATE_TABLE_DDL.to_string()],
        operation_id: String::new(),
        proto_descriptors: vec![],
        throughput_mode: false,
    };

    admin
        .database()
        .update_database_ddl(request, None)
        .await
        .context("Failed to start table creation")?
        .wait(None)
        .await
        .context("Failed to create table")?;
    Ok(())
}

fn has_raw_kv_table(statements: &[String]) -> bool {
    statements
        .iter()
        .any(|stmt| stmt.contains("CREATE TABLE raw_kv") || stmt.contains("CREATE TABLE `raw_kv`"))
}
