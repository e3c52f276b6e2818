//! Client construction

use std::sync::Arc;

use tokenbench_core::{ApiKind, CompletionClient, VendorError};
use tracing::info;

use crate::openai::{ClientConfig, OpenAiClient};

/// Build `count` clients for `api`, one per pool slot.
///
/// Clients share HTTP connection pools.
pub fn construct_clients(
    api: ApiKind,
    count: usize,
    config: &ClientConfig,
) -> Result<Vec<Arc<dyn CompletionClient>>, VendorError> {
    if count == 0 {
        return Err(VendorError::Config(
            "at least one client is required".to_string(),
        ));
    }

    let client = match api {
        ApiKind::OpenAi | ApiKind::LiteLlm => OpenAiClient::new(api, config)?,
    };

    info!(api = %api, clients = count, url = client.url(), "Constructed clients");
    Ok((0..count)
        .map(|_| Arc::new(client.clone()) as Arc<dyn CompletionClient>)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_clients() {
        let config = ClientConfig::new("http://localhost:8000/v1");

        let clients = construct_clients(ApiKind::LiteLlm, 4, &config).unwrap();
        assert_eq!(clients.len(), 4);
        assert!(clients.iter().all(|c| c.api() == ApiKind::LiteLlm));
    }

    #[test]
    fn test_construct_clients_errors() {
        let config = ClientConfig::new("http://localhost:8000/v1");
        assert!(matches!(
            construct_clients(ApiKind::OpenAi, 0, &config),
            Err(VendorError::Config(_))
        ));

        let missing = ClientConfig::default();
        assert!(matches!(
            construct_clients(ApiKind::OpenAi, 2, &missing),
            Err(VendorError::Config(_))
        ));
    }
}
