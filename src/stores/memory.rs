//! In-memory stores, for tests and embedding

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;

use super::{
    compile_glob, content_reader, glob_matches, ArtifactReader, ArtifactStore, JobRunRecord,
    ObjectAttrs, RecordError, RecordStore, StorageError,
};

/// Record store backed by a map
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: HashMap<i64, JobRunRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a job-run record
    pub fn insert(&mut self, id: i64, url: impl Into<String>, job_name: impl Into<String>) {
        self.records.insert(
            id,
            JobRunRecord {
                id,
                url: url.into(),
                job_name: job_name.into(),
            },
        );
    }

    /// Builder form of [`MemoryRecordStore::insert`]
    pub fn with_record(mut self, id: i64, url: impl Into<String>, job_name: impl Into<String>) -> Self {
        self.insert(id, url, job_name);
        self
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn job_run(&self, id: i64) -> Result<JobRunRecord, RecordError> {
        self.records.get(&id).cloned().ok_or(RecordError::NotFound(id))
    }
}

#[derive(Debug, Clone)]
struct MemoryObject {
    content: Arc<Vec<u8>>,
    content_type: Option<String>,
}

/// Artifact store backed by a sorted map of object name to bytes
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    objects: BTreeMap<String, MemoryObject>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a plain-text object
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.insert_typed(name, content, None);
    }

    /// Add or replace an object with an explicit content type
    pub fn insert_typed(
        &mut self,
        name: impl Into<String>,
        content: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) {
        self.objects.insert(
            name.into(),
            MemoryObject {
                content: Arc::new(content.into()),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    /// Builder form of [`MemoryArtifactStore::insert`]
    pub fn with_object(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(name, content);
        self
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn list_objects(
        &self,
        prefix: &str,
        match_glob: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObjectAttrs>, StorageError> {
        let pattern = match_glob.map(compile_glob).transpose()?;
        Ok(self
            .objects
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .filter(|(name, _)| pattern.as_ref().map_or(true, |p| glob_matches(p, name)))
            .take(limit)
            .map(|(name, object)| ObjectAttrs {
                name: name.clone(),
                content_type: object.content_type.clone(),
            })
            .collect())
    }

    async fn open_object(&self, attrs: &ObjectAttrs) -> Result<ArtifactReader, StorageError> {
        let object = self
            .objects
            .get(&attrs.name)
            .ok_or_else(|| StorageError::NotFound(attrs.name.clone()))?;
        let bytes = object.content.as_ref().clone();
        Ok(content_reader(Cursor::new(bytes), attrs))
    }
}
