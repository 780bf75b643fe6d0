//! Test utilities and mocks

use mockito::{Server, ServerGuard};

/// Create a mock grid member for testing
pub async fn create_mock_server() -> ServerGuard {
    Server::new_async().await
}

/// Common test utilities
pub mod helpers {
    use super::*;
    use crate::{GridConfig, GridMap};

    /// Setup a map handle pointing to a mock server
    pub async fn setup_test_map() -> (GridMap, ServerGuard) {
        let server = create_mock_server().await;
        let config = GridConfig::new([server.url()]).with_map_name("default");
        let map = GridMap::new(config).unwrap();
        (map, server)
    }

    /// Successful command response body
    pub fn ok_body(payload: serde_json::Value) -> String {
        serde_json::json!({"success": true, "payload": payload, "error": null}).to_string()
    }
}
