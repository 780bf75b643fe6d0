//! HTTP client for a data grid map

use super::{Capabilities, RemoteMap};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Connection parameters for one grid map
#[derive(Clone)]
pub struct GridConfig {
    /// Member addresses, tried in order
    pub addresses: Vec<String>,
    /// Cluster group name (basic auth user)
    pub group_name: String,
    /// Cluster group password; requests are unauthenticated without it
    pub group_password: Option<String>,
    /// Name of the map holding cache entries
    pub map_name: String,
    /// Rounds over the address list before giving up on connect
    pub connection_attempt_limit: u32,
    /// Request timeout
    pub timeout: Duration,
}

impl GridConfig {
    /// Create a new configuration with the given member addresses
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            group_name: "dev".to_string(),
            group_password: None,
            map_name: "map".to_string(),
            connection_attempt_limit: 1,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the cluster group name
    pub fn with_group_name(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = group_name.into();
        self
    }

    /// Set the cluster group password
    pub fn with_group_password(mut self, password: impl Into<String>) -> Self {
        self.group_password = Some(password.into());
        self
    }

    /// Set the map name
    pub fn with_map_name(mut self, map_name: impl Into<String>) -> Self {
        self.map_name = map_name.into();
        self
    }

    /// Set the number of connect rounds
    pub fn with_connection_attempt_limit(mut self, limit: u32) -> Self {
        self.connection_attempt_limit = limit;
        self
    }

    /// Set the timeout for requests
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for GridConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridConfig")
            .field("addresses", &self.addresses)
            .field("group_name", &self.group_name)
            .field(
                "group_password",
                &self.group_password.as_ref().map(|_| "***"),
            )
            .field("map_name", &self.map_name)
            .field("connection_attempt_limit", &self.connection_attempt_limit)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Accept bare `host:port` member addresses
fn parse_address(address: &str) -> Result<Url> {
    let address = address.trim();
    if address.contains("://") {
        Ok(Url::parse(address)?)
    } else {
        Ok(Url::parse(&format!("http://{}", address))?)
    }
}

/// Map handle on a data grid member
///
/// Every operation is one `POST {address}/api/v1/command` request:
/// ```json
/// {
///   "command": "map.get",
///   "request_id": "uuid",
///   "payload": { "map": "default", "key": "..." }
/// }
/// ```
/// Values travel as base64 strings.
#[derive(Debug, Clone)]
pub struct GridMap {
    config: Arc<GridConfig>,
    http_client: Client,
    base_url: Url,
}

impl GridMap {
    /// Create a handle pinned to the first address, without probing it
    pub fn new(config: GridConfig) -> Result<Self> {
        let address = config.addresses.first().ok_or_else(|| {
            CacheError::Configuration("grid map needs at least one address".to_string())
        })?;
        let base_url = parse_address(address)?;
        let http_client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
            base_url,
        })
    }

    /// Create a handle pinned to the first address that answers `grid.ping`
    ///
    /// The address list is walked at most `connection_attempt_limit` times.
    pub async fn connect(config: GridConfig) -> Result<Self> {
        let mut map = Self::new(config)?;
        let addresses = map
            .config
            .addresses
            .iter()
            .map(|address| parse_address(address))
            .collect::<Result<Vec<_>>>()?;
        let rounds = map.config.connection_attempt_limit.max(1);

        let mut last_error = None;
        for round in 1..=rounds {
            for address in &addresses {
                map.base_url = address.clone();
                match map.ping().await {
                    Ok(()) => {
                        info!(
                            "Connected to grid member {} (map '{}')",
                            address, map.config.map_name
                        );
                        return Ok(map);
                    }
                    Err(e) => {
                        warn!(
                            "Grid member {} unreachable (attempt {}/{}): {}",
                            address, round, rounds, e
                        );
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(CacheError::Connection(format!(
            "no grid member answered after {} attempt(s): {}",
            rounds,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Address this handle talks to
    pub fn address(&self) -> &Url {
        &self.base_url
    }

    /// Check that the pinned member answers
    pub async fn ping(&self) -> Result<()> {
        self.send_command("grid.ping", json!({})).await.map(|_| ())
    }

    async fn send_command(&self, command: &str, payload: Value) -> Result<Value> {
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!("{} request_id={}", command, request_id);

        let body = json!({
            "command": command,
            "request_id": request_id,
            "payload": payload,
        });

        let url = self.base_url.join("api/v1/command")?;

        let mut request = self.http_client.post(url).json(&body);
        if let Some(ref password) = self.config.group_password {
            request = request.basic_auth(&self.config.group_name, Some(password));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CacheError::Server(format!("{}: {}", status, error_text)));
        }

        let result: Value = response.json().await?;

        if !result["success"].as_bool().unwrap_or(false) {
            let error_msg = result["error"]
                .as_str()
                .unwrap_or("Unknown error")
                .to_string();
            return Err(CacheError::Server(error_msg));
        }

        Ok(result["payload"].clone())
    }
}

fn encode_value(value: &[u8]) -> String {
    STANDARD.encode(value)
}

fn decode_value(value: &Value) -> Result<Option<Vec<u8>>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => STANDARD
            .decode(text)
            .map(Some)
            .map_err(|e| CacheError::InvalidResponse(format!("value is not base64: {}", e))),
        other => Err(CacheError::InvalidResponse(format!(
            "expected base64 string, got {}",
            other
        ))),
    }
}

fn count_field(response: &Value, field: &str) -> Result<usize> {
    response[field]
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| CacheError::InvalidResponse(format!("missing '{}' count", field)))
}

fn bool_field(response: &Value, field: &str) -> Result<bool> {
    response[field]
        .as_bool()
        .ok_or_else(|| CacheError::InvalidResponse(format!("missing '{}' flag", field)))
}

#[async_trait]
impl RemoteMap for GridMap {
    fn name(&self) -> &str {
        &self.config.map_name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let payload = json!({"map": self.config.map_name, "key": key});
        let response = self.send_command("map.get", payload).await?;
        decode_value(&response["value"])
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<()> {
        let payload = json!({
            "map": self.config.map_name,
            "key": key,
            "value": encode_value(&value),
            "ttl": ttl_secs,
        });
        self.send_command("map.put", payload).await?;
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_secs: Option<u64>,
    ) -> Result<bool> {
        let payload = json!({
            "map": self.config.map_name,
            "key": key,
            "value": encode_value(&value),
            "ttl": ttl_secs,
        });
        let response = self.send_command("map.put_if_absent", payload).await?;
        bool_field(&response, "stored")
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let payload = json!({"map": self.config.map_name, "key": key});
        let response = self.send_command("map.remove", payload).await?;
        bool_field(&response, "removed")
    }

    async fn get_all(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let payload = json!({"map": self.config.map_name, "keys": keys});
        let response = self.send_command("map.get_all", payload).await?;

        let values = response["values"].as_array().ok_or_else(|| {
            CacheError::InvalidResponse("map.get_all: missing 'values'".to_string())
        })?;
        if values.len() != keys.len() {
            return Err(CacheError::InvalidResponse(format!(
                "map.get_all: asked for {} keys, got {} values",
                keys.len(),
                values.len()
            )));
        }
        values.iter().map(decode_value).collect()
    }

    async fn put_all(&self, entries: Vec<(String, Vec<u8>)>, ttl_secs: Option<u64>) -> Result<()> {
        let entries: Vec<Value> = entries
            .iter()
            .map(|(key, value)| json!({"key": key, "value": encode_value(value)}))
            .collect();
        let payload = json!({
            "map": self.config.map_name,
            "entries": entries,
            "ttl": ttl_secs,
        });
        self.send_command("map.put_all", payload).await?;
        Ok(())
    }

    async fn remove_all(&self, keys: &[String]) -> Result<usize> {
        let payload = json!({"map": self.config.map_name, "keys": keys});
        let response = self.send_command("map.remove_all", payload).await?;
        count_field(&response, "removed")
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let payload = json!({"map": self.config.map_name, "prefix": prefix});
        let response = self.send_command("map.keys", payload).await?;
        serde_json::from_value(response["keys"].clone())
            .map_err(|e| CacheError::InvalidResponse(format!("map.keys: {}", e)))
    }

    async fn clear(&self) -> Result<usize> {
        let payload = json!({"map": self.config.map_name});
        let response = self.send_command("map.clear", payload).await?;
        count_field(&response, "removed")
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let payload = json!({"map": self.config.map_name, "key": key, "delta": delta});
        let response = self.send_command("map.incr", payload).await?;
        response["value"]
            .as_i64()
            .ok_or_else(|| CacheError::InvalidResponse("map.incr: missing 'value'".to_string()))
    }
}
