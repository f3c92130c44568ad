//! Full-scan reader over the source collection.

use mongodb::bson::{doc, Document};
use mongodb::{options::ClientOptions, Client as MongoClient, Collection};
use std::time::Duration;

use crate::error::FetchError;
use crate::record::SourceRecord;
use crate::sync::{FetchBatch, SourceReader};
use crate::SourceOpts;

/// Read side of the pipeline. Owns the client handle to the source store;
/// never writes to it.
pub struct MongoSource {
    collection: Collection<Document>,
}

impl MongoSource {
    /// Build a client for the source store. The MongoDB client connects
    /// lazily, so this validates options but does not touch the network;
    /// unreachable sources surface as per-cycle fetch errors instead.
    pub async fn connect(opts: &SourceOpts) -> anyhow::Result<Self> {
        let mut mongo_options = match ClientOptions::parse(&opts.mongo_uri).await {
            Ok(options) => options,
            Err(e) => {
                tracing::error!("Failed to parse MongoDB connection options: {}", e);
                return Err(e.into());
            }
        };
        // Explicit timeouts so an unreachable source cannot hang a cycle
        mongo_options.connect_timeout = Some(Duration::from_secs(10));
        mongo_options.server_selection_timeout = Some(Duration::from_secs(10));
        mongo_options.app_name = Some("portal-sync".to_string());

        if let Some(credential) = super::credentials::load(&opts.credentials_file) {
            mongo_options.credential = Some(credential);
        }

        let client = MongoClient::with_options(mongo_options)?;
        let collection = client
            .database(&opts.mongo_database)
            .collection::<Document>(&opts.mongo_collection);

        tracing::info!(
            database = %opts.mongo_database,
            collection = %opts.mongo_collection,
            "source reader initialized"
        );
        Ok(Self { collection })
    }
}

#[async_trait::async_trait]
impl SourceReader for MongoSource {
    /// Point-in-time full scan of the pending collection. Every cycle
    /// re-reads the whole working set; idempotent upserts downstream make
    /// that safe. Malformed documents are skipped and counted, while
    /// network and cursor errors abort the whole fetch.
    async fn fetch_all(&self) -> Result<FetchBatch, FetchError> {
        let mut cursor = self.collection.find(doc! {}).await?;

        let mut batch = FetchBatch::default();
        while cursor.advance().await? {
            let document: Document = cursor.deserialize_current()?;
            match SourceRecord::from_document(&document) {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    batch.skipped += 1;
                    tracing::warn!(error = %e, "skipping malformed source document");
                }
            }
        }

        tracing::debug!(
            records = batch.records.len(),
            skipped = batch.skipped,
            "source scan complete"
        );
        Ok(batch)
    }
}
