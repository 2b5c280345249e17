//! Sync descriptors: how a collection's rows travel to and from a remote.
//!
//! A descriptor is a plain struct. Each direction is optional, and when
//! present must name exactly one of a handler or a URL; this is checked once
//! by [`SyncDescriptor::new`]. The network protocol behind a URL belongs to
//! the sync layer, not to this crate.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{SyncError, ValidationError, ValidationErrors};
use crate::model::CollectionModel;
use crate::types::Document;

/// Pulls remote rows.
#[async_trait]
pub trait SyncFetch: Send + Sync {
    async fn fetch(&self, params: &Value) -> Result<Vec<Document>, SyncError>;
}

/// Pushes local rows (already in remote shape) and returns the remote ack.
#[async_trait]
pub trait SyncPush: Send + Sync {
    async fn push(&self, params: &Value, rows: &[Document]) -> Result<Value, SyncError>;
}

/// Converts a row between its local and remote shapes.
pub type RowMapFn = dyn Fn(&Document) -> Document + Send + Sync;

#[derive(Clone, Default)]
pub struct SyncDown {
    pub handler: Option<Arc<dyn SyncFetch>>,
    pub url: Option<String>,
}

impl SyncDown {
    pub fn handler(handler: Arc<dyn SyncFetch>) -> Self {
        Self {
            handler: Some(handler),
            url: None,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            handler: None,
            url: Some(url.into()),
        }
    }
}

#[derive(Clone, Default)]
pub struct SyncUp {
    pub handler: Option<Arc<dyn SyncPush>>,
    pub url: Option<String>,
}

impl SyncUp {
    pub fn handler(handler: Arc<dyn SyncPush>) -> Self {
        Self {
            handler: Some(handler),
            url: None,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            handler: None,
            url: Some(url.into()),
        }
    }
}

/// Input to [`SyncDescriptor::new`].
#[derive(Clone)]
pub struct SyncConfig {
    pub model: CollectionModel,
    pub down: Option<SyncDown>,
    pub up: Option<SyncUp>,
    /// Defaults to [`CollectionModel::to_local`].
    pub to_local: Option<Arc<RowMapFn>>,
    /// Defaults to [`CollectionModel::to_remote`].
    pub to_remote: Option<Arc<RowMapFn>>,
}

impl SyncConfig {
    pub fn new(model: CollectionModel) -> Self {
        Self {
            model,
            down: None,
            up: None,
            to_local: None,
            to_remote: None,
        }
    }
}

/// Validated sync configuration for one collection.
#[derive(Clone)]
pub struct SyncDescriptor {
    config: SyncConfig,
}

fn check_direction(
    errors: &mut Vec<ValidationError>,
    path: &str,
    has_handler: bool,
    has_url: bool,
) {
    match (has_handler, has_url) {
        (true, false) | (false, true) => {}
        (true, true) => errors.push(ValidationError::new(
            path,
            "exactly one of handler or url",
            "both",
        )),
        (false, false) => errors.push(ValidationError::new(
            path,
            "exactly one of handler or url",
            "neither",
        )),
    }
}

impl SyncDescriptor {
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let mut errors = Vec::new();
        if let Some(down) = &config.down {
            check_direction(&mut errors, "down", down.handler.is_some(), down.url.is_some());
        }
        if let Some(up) = &config.up {
            check_direction(&mut errors, "up", up.handler.is_some(), up.url.is_some());
        }
        if errors.is_empty() {
            Ok(Self { config })
        } else {
            Err(ValidationErrors(errors).into())
        }
    }

    pub fn model(&self) -> &CollectionModel {
        &self.config.model
    }

    pub fn down_url(&self) -> Option<&str> {
        self.config.down.as_ref().and_then(|d| d.url.as_deref())
    }

    pub fn up_url(&self) -> Option<&str> {
        self.config.up.as_ref().and_then(|u| u.url.as_deref())
    }

    pub fn to_local(&self, remote: &Document) -> Document {
        match &self.config.to_local {
            Some(f) => f(remote),
            None => self.config.model.to_local(remote),
        }
    }

    pub fn to_remote(&self, local: &Document) -> Document {
        match &self.config.to_remote {
            Some(f) => f(local),
            None => self.config.model.to_remote(local),
        }
    }

    /// Fetch remote rows through the down handler, converted to local shape.
    pub async fn fetch(&self, params: &Value) -> Result<Vec<Document>, SyncError> {
        let handler = self
            .config
            .down
            .as_ref()
            .and_then(|d| d.handler.as_ref())
            .ok_or(SyncError::NotConfigured("fetch"))?;
        let rows = handler.fetch(params).await?;
        Ok(rows.iter().map(|r| self.to_local(r)).collect())
    }

    /// Push local rows through the up handler, converted to remote shape.
    pub async fn push(&self, params: &Value, local_rows: &[Document]) -> Result<Value, SyncError> {
        let handler = self
            .config
            .up
            .as_ref()
            .and_then(|u| u.handler.as_ref())
            .ok_or(SyncError::NotConfigured("push"))?;
        let remote: Vec<Document> = local_rows.iter().map(|r| self.to_remote(r)).collect();
        handler.push(params, &remote).await
    }
}

impl std::fmt::Debug for SyncDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDescriptor")
            .field("collection", &self.config.model.name)
            .field("down_url", &self.down_url())
            .field("up_url", &self.up_url())
            .finish_non_exhaustive()
    }
}
