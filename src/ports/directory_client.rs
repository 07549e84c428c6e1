//! Discovery directory client port — the external directory collaborator
//! Discovery calls into to list resources published by an endpoint. Implied
//! but never given a named contract elsewhere; added because Discovery
//! cannot be implemented without naming this seam.

use async_trait::async_trait;

use crate::domain::ResourceType;
use crate::error::CoreError;

/// A resource as reported by the directory, before the core assigns it a
/// lifecycle status.
#[derive(Debug, Clone)]
pub struct DiscoveredResource {
	pub resource_id: String,
	pub organization_id: String,
	pub resource_type: ResourceType,
}

#[async_trait]
pub trait DirectoryClientPort: Send + Sync + 'static {
	async fn list_resources(&self, endpoint: &str) -> Result<Vec<DiscoveredResource>, CoreError>;
}
