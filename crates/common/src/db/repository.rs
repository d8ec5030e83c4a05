//! Repository pattern for canonical-store operations
//!
//! Provides a clean interface for all data access with proper error
//! handling. Editais support two update paths: a per-chunk partial append
//! (upserting) and a single final commit that consolidates the schema.

use crate::db::models::*;
use crate::errors::Result;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Bson, Document},
    Collection, Database,
};

const EDITAIS: &str = "editais";
const JOB_EXECUTIONS: &str = "job_executions";
const CONVERSATIONS: &str = "conversations";
const USERS: &str = "users";

/// Repository for canonical-store access
#[derive(Clone)]
pub struct Repository {
    db: Database,
}

impl Repository {
    /// Create a new repository over the given database handle
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn editais(&self) -> Collection<EditalDocument> {
        self.db.collection(EDITAIS)
    }

    fn jobs(&self) -> Collection<JobExecution> {
        self.db.collection(JOB_EXECUTIONS)
    }

    fn conversations(&self) -> Collection<Conversation> {
        self.db.collection(CONVERSATIONS)
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the store
    pub async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    // ========================================================================
    // Edital Operations
    // ========================================================================

    /// Create the pending record the first time a PDF is queued for
    /// extraction. Edital ids are deterministic per (source, content-hash),
    /// so reprocessing after a crash lands on the same document; the chunk
    /// arrays reset and the new run rewrites them index by index.
    pub async fn create_pending_edital(
        &self,
        uuid: &str,
        link: &str,
        origem: &str,
        content_hash: &str,
    ) -> Result<()> {
        let now = bson::to_bson(&Utc::now())?;
        self.editais()
            .update_one(
                doc! { "uuid": uuid },
                doc! {
                    "$set": {
                        "link": link,
                        "origem": origem,
                        "extraction_status": "pending",
                        "content_hash": content_hash,
                        "extraction_chunks": [],
                        "raw_failed_chunks": [],
                        "updated_at": now.clone(),
                    },
                    "$setOnInsert": {
                        "uuid": uuid,
                        "created_at": now,
                    },
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    /// Partial append: push one per-chunk extraction and mark in progress.
    /// Upserts so a chunk can never be lost to a missing parent record.
    pub async fn save_partial_extraction(
        &self,
        uuid: &str,
        link: &str,
        chunk: &ExtractionChunk,
    ) -> Result<()> {
        let now = bson::to_bson(&Utc::now())?;
        self.editais()
            .update_one(
                doc! { "uuid": uuid },
                doc! {
                    "$set": {
                        "extraction_status": "in_progress",
                        "updated_at": now.clone(),
                    },
                    "$setOnInsert": {
                        "uuid": uuid,
                        "link": link,
                        "raw_failed_chunks": [],
                        "created_at": now,
                    },
                    "$push": { "extraction_chunks": bson::to_document(chunk)? },
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    /// Record a chunk whose extraction never produced valid JSON
    pub async fn save_failed_chunk(
        &self,
        uuid: &str,
        link: &str,
        failed: &FailedChunk,
    ) -> Result<()> {
        let now = bson::to_bson(&Utc::now())?;
        self.editais()
            .update_one(
                doc! { "uuid": uuid },
                doc! {
                    "$set": {
                        "extraction_status": "in_progress",
                        "updated_at": now.clone(),
                    },
                    "$setOnInsert": {
                        "uuid": uuid,
                        "link": link,
                        "extraction_chunks": [],
                        "created_at": now,
                    },
                    "$push": { "raw_failed_chunks": bson::to_document(failed)? },
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    /// Final commit: store the consolidated schema, copy every non-null
    /// field to the top level (so typed queries never dig into the nested
    /// structure) and set the terminal status.
    pub async fn save_final_extraction(
        &self,
        uuid: &str,
        consolidated: &EditalFields,
        status: ExtractionStatus,
    ) -> Result<()> {
        let mut set_doc = doc! {
            "extraction_status": status.as_str(),
            "consolidated_variables": bson::to_document(consolidated)?,
            "updated_at": bson::to_bson(&Utc::now())?,
        };

        // Top-level copies; link and uuid stay system-owned
        let flat = bson::to_document(consolidated)?;
        for (key, value) in flat {
            if value != Bson::Null && key != "link" && key != "uuid" {
                set_doc.insert(key, value);
            }
        }

        self.editais()
            .update_one(doc! { "uuid": uuid }, doc! { "$set": set_doc })
            .await?;
        Ok(())
    }

    /// Find edital by its system-generated id
    pub async fn find_edital_by_uuid(&self, uuid: &str) -> Result<Option<EditalDocument>> {
        self.editais()
            .find_one(doc! { "uuid": uuid })
            .await
            .map_err(Into::into)
    }

    /// List editais, newest first, optionally filtered by agency tag
    pub async fn list_editais(
        &self,
        origem: Option<&str>,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<EditalDocument>> {
        let filter = match origem {
            Some(tag) => doc! { "origem": tag },
            None => doc! {},
        };

        self.editais()
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .skip(skip)
            .limit(limit)
            .await?
            .try_collect()
            .await
            .map_err(Into::into)
    }

    /// A completed edital for this (source, content-hash) pair, if any.
    /// Used for at-most-once ingestion per content hash.
    pub async fn find_completed_by_content_hash(
        &self,
        origem: &str,
        content_hash: &str,
    ) -> Result<Option<EditalDocument>> {
        self.editais()
            .find_one(doc! {
                "origem": origem,
                "content_hash": content_hash,
                "extraction_status": "completed",
            })
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Job Operations
    // ========================================================================

    /// Persist a freshly created execution
    pub async fn create_job(&self, job: &JobExecution) -> Result<()> {
        self.jobs().insert_one(job).await?;
        Ok(())
    }

    /// Find execution by id
    pub async fn find_job_by_id(&self, id: &str) -> Result<Option<JobExecution>> {
        self.jobs()
            .find_one(doc! { "id": id })
            .await
            .map_err(Into::into)
    }

    /// Write the execution back. Each running job's document is mutated only
    /// by the task driving it, so a whole-document replace is safe.
    pub async fn update_job(&self, job: &JobExecution) -> Result<()> {
        self.jobs()
            .replace_one(doc! { "id": &job.id }, job)
            .await?;
        Ok(())
    }

    /// Execution history, newest first
    pub async fn list_jobs(&self, skip: u64, limit: i64) -> Result<Vec<JobExecution>> {
        self.jobs()
            .find(doc! {})
            .sort(doc! { "created_at": -1 })
            .skip(skip)
            .limit(limit)
            .await?
            .try_collect()
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Conversation Operations
    // ========================================================================

    pub async fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conversations().insert_one(conversation).await?;
        Ok(())
    }

    pub async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.conversations()
            .find_one(doc! { "id": id })
            .await
            .map_err(Into::into)
    }

    pub async fn update_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conversations()
            .replace_one(doc! { "id": &conversation.id }, conversation)
            .await?;
        Ok(())
    }

    /// A user's conversations, most recently active first
    pub async fn list_conversations(
        &self,
        user_id: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<Conversation>> {
        self.conversations()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "updated_at": -1 })
            .skip(skip)
            .limit(limit)
            .await?
            .try_collect()
            .await
            .map_err(Into::into)
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let result = self
            .conversations()
            .delete_one(doc! { "id": id })
            .await?;
        Ok(result.deleted_count > 0)
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.users()
            .find_one(doc! { "email": email, "is_active": true })
            .await
            .map_err(Into::into)
    }

    pub async fn create_user(&self, user: &User) -> Result<()> {
        self.users().insert_one(user).await?;
        Ok(())
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.users()
            .count_documents(Document::new())
            .await
            .map_err(Into::into)
    }
}
