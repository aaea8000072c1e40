//! pgvector-backed document store using the langchain_postgres table layout.

use anyhow::{Context, Result};
use pgvector::Vector;
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};
use tokio_postgres::types::Json;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::document::{ContentRecord, Metadata, ScoredEntry, StoredEntry};
use crate::embedder::Embedder;
use crate::retry::{CallError, RetryPolicy};

/// Table holding one row per named collection.
pub const COLLECTION_TABLE: &str = "langchain_pg_collection";
/// Table holding one row per stored chunk.
pub const EMBEDDING_TABLE: &str = "langchain_pg_embedding";

/// Storage seam between the pipeline and a concrete similarity index.
pub trait VectorStore {
    /// Embeds and upserts `records` under the matching `ids`; returns rows written.
    fn add_documents(&mut self, records: &[ContentRecord], ids: &[String]) -> Result<usize>;

    /// Returns the `k` entries closest to `query`, nearest first.
    fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<StoredEntry>>;
}

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        anyhow::ensure!(!table.trim().is_empty(), "table name is required");
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Unqualified index name derived from the table, e.g. `public_t_cmetadata_idx`.
    pub fn index_name(&self, suffix: &str) -> String {
        format!(
            "{}_{}_{}_idx",
            sanitize_ident(&self.schema),
            sanitize_ident(&self.table),
            sanitize_ident(suffix)
        )
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// The pair of tables backing every collection.
#[derive(Debug, Clone)]
pub struct StoreTables {
    /// Collection registry table.
    pub collections: TableName,
    /// Chunk/embedding table.
    pub embeddings: TableName,
}

impl StoreTables {
    /// Resolves both tables inside `schema`.
    pub fn in_schema(schema: &str) -> Result<Self> {
        Ok(Self {
            collections: TableName::new(schema, COLLECTION_TABLE)?,
            embeddings: TableName::new(schema, EMBEDDING_TABLE)?,
        })
    }

    fn collection_ddl(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                uuid UUID PRIMARY KEY,
                name VARCHAR NOT NULL UNIQUE,
                cmetadata JSON
            )",
            self.collections.qualified()
        )
    }

    fn embedding_ddl(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR PRIMARY KEY,
                collection_id UUID REFERENCES {}(uuid) ON DELETE CASCADE,
                embedding VECTOR,
                document VARCHAR,
                cmetadata JSONB
            )",
            self.embeddings.qualified(),
            self.collections.qualified()
        )
    }

    fn metadata_index_ddl(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING GIN (cmetadata jsonb_path_ops)",
            quote_ident(&self.embeddings.index_name("cmetadata")),
            self.embeddings.qualified()
        )
    }

    fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, collection_id, embedding, document, cmetadata) \
                VALUES ($1, $2, $3, $4, $5) \
                ON CONFLICT (id) DO UPDATE SET \
                collection_id = EXCLUDED.collection_id, \
                embedding = EXCLUDED.embedding, \
                document = EXCLUDED.document, \
                cmetadata = EXCLUDED.cmetadata",
            self.embeddings.qualified()
        )
    }

    fn search_sql(&self) -> String {
        format!(
            "SELECT id, document, cmetadata, embedding <=> $1 AS distance \
             FROM {} WHERE collection_id = $2 ORDER BY distance ASC LIMIT $3",
            self.embeddings.qualified()
        )
    }
}

/// Blocking pgvector store; owns its embedder and a private runtime for the client.
pub struct PgVectorStore<E: Embedder> {
    // Declared before `runtime` so the client drops while the runtime is alive.
    client: Client,
    runtime: Runtime,
    embedder: E,
    tables: StoreTables,
    collection_id: Uuid,
    collection_name: String,
    insert_batch: usize,
}

impl<E: Embedder> PgVectorStore<E> {
    /// Connects, prepares the schema and resolves the configured collection.
    pub fn connect(settings: &Settings, embedder: E) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start Postgres runtime")?;
        let client = runtime.block_on(open_client(&settings.database_url, settings.retry))?;
        let tables = StoreTables::in_schema(&settings.pg_schema)?;

        runtime.block_on(ensure_schema(&client, &tables))?;
        if settings.pre_delete_collection {
            runtime.block_on(delete_collection(
                &client,
                &tables,
                &settings.collection_name,
            ))?;
        }
        let collection_id = runtime.block_on(get_or_create_collection(
            &client,
            &tables,
            &settings.collection_name,
        ))?;
        info!(
            collection = %settings.collection_name,
            %collection_id,
            table = %tables.embeddings.qualified(),
            "vector store ready"
        );

        Ok(Self {
            client,
            runtime,
            embedder,
            tables,
            collection_id,
            collection_name: settings.collection_name.clone(),
            insert_batch: settings.insert_batch_size.max(1),
        })
    }

    /// Like [`VectorStore::similarity_search`], keeping the cosine distance.
    pub fn similarity_search_with_score(&self, query: &str, k: usize) -> Result<Vec<ScoredEntry>> {
        let embedding = self.embedder.embed_query(query)?;
        let vector = Vector::from(embedding);
        let limit = i64::try_from(k).context("k exceeds i64 range")?;
        let sql = self.tables.search_sql();
        let rows = self
            .runtime
            .block_on(
                self.client
                    .query(sql.as_str(), &[&vector, &self.collection_id, &limit]),
            )
            .context("similarity search failed")?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let content: Option<String> = row.try_get("document")?;
            let metadata: Option<Json<Metadata>> = row.try_get("cmetadata")?;
            let distance: f64 = row.try_get("distance")?;
            entries.push(ScoredEntry {
                entry: StoredEntry {
                    id,
                    content: content.unwrap_or_default(),
                    metadata: metadata.map(|Json(map)| map).unwrap_or_default(),
                },
                distance,
            });
        }
        debug!(k, hits = entries.len(), "similarity search complete");
        Ok(entries)
    }

    fn upsert_batch(&mut self, rows: &[(&String, &ContentRecord, Vec<f32>)]) -> Result<()> {
        let sql = self.tables.upsert_sql();
        let collection_id = self.collection_id;
        let client = &mut self.client;
        self.runtime.block_on(async {
            let transaction = client.transaction().await?;
            let statement = transaction.prepare(&sql).await?;
            for (id, record, embedding) in rows {
                let vector = Vector::from(embedding.clone());
                let metadata = Json(&record.metadata);
                transaction
                    .execute(
                        &statement,
                        &[id, &collection_id, &vector, &record.text, &metadata],
                    )
                    .await
                    .with_context(|| format!("failed to upsert document {id}"))?;
            }
            transaction.commit().await?;
            Ok::<(), anyhow::Error>(())
        })
    }
}

impl<E: Embedder> VectorStore for PgVectorStore<E> {
    fn add_documents(&mut self, records: &[ContentRecord], ids: &[String]) -> Result<usize> {
        anyhow::ensure!(
            records.len() == ids.len(),
            "got {} records but {} ids",
            records.len(),
            ids.len()
        );
        if records.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = records.iter().map(|record| record.text.as_str()).collect();
        let embeddings = self.embedder.embed_documents(&texts)?;
        anyhow::ensure!(
            embeddings.len() == records.len(),
            "embedder returned {} vectors for {} documents",
            embeddings.len(),
            records.len()
        );

        let rows: Vec<_> = ids
            .iter()
            .zip(records)
            .zip(embeddings)
            .map(|((id, record), embedding)| (id, record, embedding))
            .collect();
        let mut stored = 0usize;
        for batch in rows.chunks(self.insert_batch) {
            self.upsert_batch(batch)?;
            stored += batch.len();
            debug!(stored, total = rows.len(), "upserted batch");
        }
        info!(stored, collection = %self.collection_name, "documents stored");
        Ok(stored)
    }

    fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<StoredEntry>> {
        Ok(self
            .similarity_search_with_score(query, k)?
            .into_iter()
            .map(|scored| scored.entry)
            .collect())
    }
}

async fn open_client(database_url: &str, retry: RetryPolicy) -> Result<Client> {
    let config: PgConfig = database_url
        .parse()
        .context("DATABASE_URL is not a valid Postgres connection string")?;
    let redacted = redact_url(database_url);
    let mut attempt = 0usize;
    let (client, connection) = loop {
        attempt += 1;
        let outcome = match config.connect(NoTls).await {
            Ok(pair) => break pair,
            // Server-reported errors carry a SQLSTATE; network failures do not.
            Err(err) if err.code().is_none() => CallError::Transient(err.into()),
            Err(err) => CallError::Fatal(err.into()),
        };
        match outcome {
            CallError::Transient(err) if attempt < retry.max_attempts() => {
                let delay = retry.backoff(attempt);
                warn!(
                    url = %redacted,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Postgres connection failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            CallError::Transient(err) | CallError::Fatal(err) => {
                return Err(err)
                    .with_context(|| format!("failed to connect to Postgres at {redacted}"));
            }
        }
    };
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(error = %err, "postgres connection error");
        }
    });
    info!(url = %redacted, "connected to Postgres");
    Ok(client)
}

async fn ensure_schema(client: &Client, tables: &StoreTables) -> Result<()> {
    client
        .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
        .await
        .context("failed to ensure pgvector extension")?;
    client
        .execute(tables.collection_ddl().as_str(), &[])
        .await
        .context("failed to create collection table")?;
    client
        .execute(tables.embedding_ddl().as_str(), &[])
        .await
        .context("failed to create embedding table")?;
    client
        .execute(tables.metadata_index_ddl().as_str(), &[])
        .await
        .context("failed to ensure cmetadata GIN index")?;
    Ok(())
}

async fn delete_collection(client: &Client, tables: &StoreTables, name: &str) -> Result<()> {
    let sql = format!(
        "DELETE FROM {} WHERE name = $1",
        tables.collections.qualified()
    );
    let removed = client
        .execute(sql.as_str(), &[&name])
        .await
        .with_context(|| format!("failed to delete collection {name}"))?;
    info!(collection = name, removed, "pre-deleted collection");
    Ok(())
}

async fn get_or_create_collection(
    client: &Client,
    tables: &StoreTables,
    name: &str,
) -> Result<Uuid> {
    let insert = format!(
        "INSERT INTO {} (uuid, name, cmetadata) VALUES ($1, $2, $3) \
         ON CONFLICT (name) DO NOTHING",
        tables.collections.qualified()
    );
    let metadata = Json(Value::Object(Default::default()));
    client
        .execute(insert.as_str(), &[&Uuid::new_v4(), &name, &metadata])
        .await
        .with_context(|| format!("failed to register collection {name}"))?;

    let select = format!(
        "SELECT uuid FROM {} WHERE name = $1",
        tables.collections.qualified()
    );
    let row = client
        .query_one(select.as_str(), &[&name])
        .await
        .with_context(|| format!("failed to look up collection {name}"))?;
    Ok(row.try_get("uuid")?)
}

/// Hides the password component of a connection string for logging.
pub fn redact_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let rest = &url[scheme_end + 3..];
        let authority_end = rest.find('/').unwrap_or(rest.len());
        if let Some(at) = rest[..authority_end].rfind('@') {
            let userinfo = &rest[..at];
            if let Some(colon) = userinfo.find(':') {
                return format!(
                    "{}{}:***{}",
                    &url[..scheme_end + 3],
                    &userinfo[..colon],
                    &rest[at..]
                );
            }
        }
        return url.to_string();
    }
    url.split_whitespace()
        .map(|pair| {
            if pair.starts_with("password=") {
                "password=***".to_string()
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
