//! In-process transport wired straight to a [`DisplayServer`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DisplayError, Result};
use crate::server::DisplayServer;
use crate::transport::{ParamValue, Request, Response, Subscription, Transport};

/// Transport that dispatches every call to a shared [`DisplayServer`]
/// without leaving the process.
#[derive(Clone)]
pub struct LoopbackTransport {
    server: Arc<DisplayServer>,
}

impl LoopbackTransport {
    pub fn new(server: Arc<DisplayServer>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Arc<DisplayServer> {
        &self.server
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn call(&self, endpoint: &str, request: Request) -> Result<Response> {
        self.server
            .handle(endpoint, request)
            .map_err(|reason| DisplayError::Rejected {
                endpoint: endpoint.to_string(),
                reason,
            })
    }

    async fn has_endpoint(&self, endpoint: &str) -> Result<bool> {
        Ok(self.server.has_endpoint(endpoint))
    }

    async fn get_param(&self, key: &str) -> Result<Option<ParamValue>> {
        Ok(self.server.get_param(key))
    }

    async fn set_param(&self, key: &str, value: ParamValue) -> Result<()> {
        self.server.set_param(key, value);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let (id, rx) = self.server.broker().subscribe(topic);
        let server = Arc::clone(&self.server);
        let owned = topic.to_string();
        Ok(Subscription::new(topic, rx).on_release(move || server.broker().unsubscribe(&owned, id)))
    }

    async fn publish(&self, topic: &str, data: &str) -> Result<()> {
        self.server.broker().publish(topic, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerOptions;

    #[tokio::test]
    async fn subscription_is_released_on_drop() {
        let server = Arc::new(DisplayServer::new(ServerOptions::default()));
        let transport = LoopbackTransport::new(server.clone());
        let topic = "/display_server/stimulus_mode";

        let mut sub = transport.subscribe(topic).await.unwrap();
        assert_eq!(server.broker().subscriber_count(topic), 1);
        assert!(sub.recv().await.is_some());

        drop(sub);
        assert_eq!(server.broker().subscriber_count(topic), 0);
    }

    #[tokio::test]
    async fn rejected_call_maps_to_error() {
        let server = Arc::new(DisplayServer::new(ServerOptions::default()));
        let transport = LoopbackTransport::new(server);
        let err = transport
            .call("/nowhere/get_display_info", Request::GetDisplayInfo)
            .await
            .unwrap_err();
        assert!(matches!(err, DisplayError::Rejected { .. }));
    }
}
