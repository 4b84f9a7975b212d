//! MongoDB client and collection wrapper
//!
//! Typed collections apply their schema indexes on first use and stamp
//! metadata timestamps on insert.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    options::{IndexOptions, ReturnDocument, UpdateModifications},
    results::{DeleteResult, UpdateResult},
    Client, ClientSession, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::PortalError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, PortalError> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast when the server is unreachable
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| PortalError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| PortalError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, PortalError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Start a session for a multi-document transaction
    pub async fn start_session(&self) -> Result<ClientSession, PortalError> {
        self.client
            .start_session()
            .await
            .map_err(|e| PortalError::Database(format!("Failed to start session: {}", e)))
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, PortalError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), PortalError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| PortalError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, PortalError> {
        stamp(&mut item);

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| PortalError::Database(format!("Insert failed: {}", e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| PortalError::Database("Failed to get inserted ID".into()))
    }

    /// Insert a document inside a transaction
    ///
    /// The `_in` variants return raw driver errors so transaction labels survive.
    pub async fn insert_one_in(
        &self,
        mut item: T,
        session: &mut ClientSession,
    ) -> mongodb::error::Result<()> {
        stamp(&mut item);
        self.inner.insert_one(item).session(session).await?;
        Ok(())
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, PortalError> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| PortalError::Database(format!("Find failed: {}", e)))
    }

    /// Find one document by filter inside a transaction
    pub async fn find_one_in(
        &self,
        filter: Document,
        session: &mut ClientSession,
    ) -> mongodb::error::Result<Option<T>> {
        self.inner.find_one(filter).session(session).await
    }

    /// Find many documents by filter
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, PortalError> {
        use futures_util::StreamExt;

        let cursor = self
            .inner
            .find(filter)
            .await
            .map_err(|e| PortalError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Count documents matching a filter
    pub async fn count(&self, filter: Document) -> Result<u64, PortalError> {
        self.inner
            .count_documents(filter)
            .await
            .map_err(|e| PortalError::Database(format!("Count failed: {}", e)))
    }

    /// Count documents matching a filter inside a transaction
    pub async fn count_in(
        &self,
        filter: Document,
        session: &mut ClientSession,
    ) -> mongodb::error::Result<u64> {
        self.inner.count_documents(filter).session(session).await
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, PortalError> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| PortalError::Database(format!("Update failed: {}", e)))
    }

    /// Update one document inside a transaction
    pub async fn update_one_in(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        session: &mut ClientSession,
    ) -> mongodb::error::Result<UpdateResult> {
        self.inner
            .update_one(filter, update.into())
            .session(session)
            .await
    }

    /// Update every matching document inside a transaction
    pub async fn update_many_in(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        session: &mut ClientSession,
    ) -> mongodb::error::Result<UpdateResult> {
        self.inner
            .update_many(filter, update.into())
            .session(session)
            .await
    }

    /// Atomically update one document and return it as written
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<Option<T>, PortalError> {
        self.inner
            .find_one_and_update(filter, update.into())
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| PortalError::Database(format!("Update failed: {}", e)))
    }

    /// Delete one document
    pub async fn delete_one(&self, filter: Document) -> Result<DeleteResult, PortalError> {
        self.inner
            .delete_one(filter)
            .await
            .map_err(|e| PortalError::Database(format!("Delete failed: {}", e)))
    }
}

fn stamp<T: MutMetadata>(item: &mut T) {
    let now = DateTime::now();
    let metadata = item.mut_metadata();
    metadata.created_at = Some(now);
    metadata.updated_at = Some(now);
}

/// `$set` fragment bumping the update timestamp
pub fn touched() -> Document {
    doc! { "metadata.updated_at": DateTime::now() }
}
