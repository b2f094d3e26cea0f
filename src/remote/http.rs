//! HTTP Peer Client
//!
//! Default [`RemotePeerClient`] implementation speaking the peer REST
//! surface over reqwest. Node ids are translated to base URLs by the
//! injected [`NodeResolver`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{NodeResolver, RemoteError, RemotePeerClient, RemoteResult};
use crate::object::Object;

/// HTTP-backed peer client
pub struct HttpPeerClient {
    client: reqwest::Client,
    resolver: Arc<dyn NodeResolver>,
}

impl HttpPeerClient {
    /// Create a client with the given request timeout
    pub fn new(resolver: Arc<dyn NodeResolver>, request_timeout: Duration) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RemoteError::unreachable(format!("client construction: {}", e)))?;

        Ok(Self { client, resolver })
    }

    async fn object_endpoint(&self, node_id: &str, object: &Object) -> RemoteResult<String> {
        let base = self.resolver.resolve(node_id).await?;
        Ok(format!(
            "{}/cluster/objects/{}/{}",
            base.trim_end_matches('/'),
            object.object_type,
            object.id
        ))
    }

    async fn check(response: reqwest::Response) -> RemoteResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::with_status(status.as_u16(), body))
    }

    fn transport(e: reqwest::Error) -> RemoteError {
        match e.status() {
            Some(status) => RemoteError::with_status(status.as_u16(), e.to_string()),
            None => RemoteError::unreachable(e.to_string()),
        }
    }
}

#[async_trait]
impl RemotePeerClient for HttpPeerClient {
    async fn create_object_in_cluster(&self, node_id: &str, object: &Object) -> RemoteResult<()> {
        let base = self.resolver.resolve(node_id).await?;
        let url = format!("{}/cluster/objects", base.trim_end_matches('/'));

        // The destination only needs its own entry from the destination list
        let own_destinations: Vec<_> = object
            .destinations
            .iter()
            .filter(|d| d.node_id == node_id)
            .collect();

        let body = json!({
            "id": object.id,
            "object_type": object.object_type,
            "version": object.version,
            "mime_type": object.mime_type,
            "labels": object.labels,
            "attributes": object.attributes,
            "origin_id": object.origin_id,
            "destinations": own_destinations,
            "created_at": object.created_at,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await
    }

    async fn update_object_metadata_in_cluster(
        &self,
        node_id: &str,
        object: &Object,
    ) -> RemoteResult<()> {
        let url = self.object_endpoint(node_id, object).await?;
        let body = json!({
            "version": object.version,
            "mime_type": object.mime_type,
            "labels": object.labels,
            "attributes": object.attributes,
            "destinations": object.destinations,
        });

        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await
    }

    async fn update_object_data_in_cluster(
        &self,
        node_id: &str,
        object: &Object,
    ) -> RemoteResult<()> {
        let url = self.object_endpoint(node_id, object).await?;
        let body = json!({ "is_data_updated": true });

        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await
    }

    async fn delete_object_in_cluster(&self, node_id: &str, object: &Object) -> RemoteResult<()> {
        let url = self.object_endpoint(node_id, object).await?;

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await
    }

    async fn mark_receival_failed(
        &self,
        from_node_id: &str,
        to_node_id: &str,
        object: &Object,
    ) -> RemoteResult<()> {
        let url = self.object_endpoint(to_node_id, object).await?;
        let body = json!({ "receival_failed_by": from_node_id });

        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await
    }
}
