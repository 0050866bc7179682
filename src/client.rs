//! DynamoDB client module.
//!
//! Provides [`DynamoClient`], the [`Store`] implementation over
//! `aws-sdk-dynamodb`, and [`ClientConfig`], which supports multiple
//! credential sources:
//! - Hardcoded credentials
//! - AWS profiles
//! - Environment variables and the default provider chain

use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::Client;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::basic_operations;
use crate::batch_operations;
use crate::errors::{Error, StoreError};
use crate::serialization::Document;
use crate::store::{
    DeleteRequest, Page, QueryRequest, ScanRequest, Store, TableDefinition, TableDescription,
    TransactOperation, UpdateRequest, WriteRequest,
};
use crate::table_operations;
use crate::transaction_operations;

/// Region used when neither the config nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Global shared Tokio runtime.
///
/// A single runtime avoids deadlocks on Windows when multiple clients are
/// created.
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

fn shared_runtime() -> Result<Arc<Runtime>, StoreError> {
    RUNTIME
        .get_or_try_init(|| Runtime::new().map(Arc::new))
        .cloned()
        .map_err(|e| StoreError::Runtime(format!("Failed to create Tokio runtime: {}", e)))
}

/// Connection settings for [`DynamoClient`].
///
/// Credentials are picked in order of priority:
/// 1. Hardcoded credentials (`access_key`, `secret_key`, `session_token`)
/// 2. AWS profile from ~/.aws/credentials
/// 3. The default chain (environment variables, instance profile, etc.)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    pub profile: Option<String>,
    /// Custom endpoint for local testing (DynamoDB Local, localstack, moto).
    pub endpoint_url: Option<String>,
}

impl ClientConfig {
    /// Read settings from the standard AWS environment variables.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            region: var("AWS_REGION").or_else(|| var("AWS_DEFAULT_REGION")),
            access_key: var("AWS_ACCESS_KEY_ID"),
            secret_key: var("AWS_SECRET_ACCESS_KEY"),
            session_token: var("AWS_SESSION_TOKEN"),
            profile: var("AWS_PROFILE"),
            endpoint_url: var("AWS_ENDPOINT_URL"),
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn credentials(mut self, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// The region requests will be sent to.
    pub fn resolved_region(&self) -> String {
        self.region.clone().unwrap_or_else(|| {
            std::env::var("AWS_REGION")
                .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|_| DEFAULT_REGION.to_string())
        })
    }
}

/// DynamoDB-backed [`Store`].
///
/// Every call blocks on the shared runtime, so it must not be used from
/// inside an async context.
///
/// # Examples
///
/// ```no_run
/// use dynamap::{ClientConfig, DynamoClient};
///
/// # fn main() -> dynamap::Result<()> {
/// // Local endpoint (DynamoDB Local, localstack, moto)
/// let client = DynamoClient::new(
///     ClientConfig::default()
///         .region("us-east-1")
///         .credentials("local", "local")
///         .endpoint_url("http://localhost:8000"),
/// )?;
/// client.ping()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DynamoClient {
    client: Client,
    runtime: Arc<Runtime>,
    region: String,
}

impl DynamoClient {
    /// Create a new client from `config`.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let runtime = shared_runtime()?;
        let region = config.resolved_region();
        let client = runtime.block_on(build_client(config));

        tracing::info!(region = %region, "created DynamoDB client");
        Ok(Self {
            client,
            runtime,
            region,
        })
    }

    /// Get the configured AWS region.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Check if the client can connect to DynamoDB.
    ///
    /// Makes a simple ListTables call to verify connectivity.
    pub fn ping(&self) -> Result<(), Error> {
        let client = self.client.clone();
        self.runtime
            .block_on(async { client.list_tables().limit(1).send().await })
            .map_err(|e| crate::errors::map_sdk_error(e, None))?;
        Ok(())
    }

    /// Wait until `table` reports ACTIVE, polling for at most `timeout_seconds` (default 60).
    pub fn wait_for_table_active(&self, table: &str, timeout_seconds: Option<u64>) -> Result<(), Error> {
        Ok(table_operations::wait_for_table_active(
            &self.client,
            &self.runtime,
            table,
            timeout_seconds,
        )?)
    }
}

impl Store for DynamoClient {
    fn put_item(&self, table: &str, item: Document) -> Result<(), StoreError> {
        basic_operations::put_item(&self.client, &self.runtime, table, &item)
    }

    fn get_item(&self, table: &str, key: Document) -> Result<Option<Document>, StoreError> {
        basic_operations::get_item(&self.client, &self.runtime, table, &key)
    }

    fn delete_item(&self, request: DeleteRequest) -> Result<(), StoreError> {
        basic_operations::delete_item(&self.client, &self.runtime, &request)
    }

    fn update_item(&self, request: UpdateRequest) -> Result<Option<Document>, StoreError> {
        basic_operations::update_item(&self.client, &self.runtime, &request)
    }

    fn query(&self, request: &QueryRequest) -> Result<Page, StoreError> {
        basic_operations::query(&self.client, &self.runtime, request)
    }

    fn scan(&self, request: &ScanRequest) -> Result<Page, StoreError> {
        basic_operations::scan(&self.client, &self.runtime, request)
    }

    fn batch_write(&self, table: &str, requests: Vec<WriteRequest>) -> Result<(), StoreError> {
        batch_operations::batch_write(&self.client, &self.runtime, table, requests)
    }

    fn transact_write(&self, operations: &[TransactOperation]) -> Result<(), StoreError> {
        transaction_operations::transact_write(&self.client, &self.runtime, operations)
    }

    fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        table_operations::list_tables(&self.client, &self.runtime)
    }

    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        table_operations::table_exists(&self.client, &self.runtime, table)
    }

    fn describe_table(&self, table: &str) -> Result<TableDescription, StoreError> {
        table_operations::describe_table(&self.client, &self.runtime, table)
    }

    fn create_table(&self, definition: &TableDefinition) -> Result<(), StoreError> {
        table_operations::create_table(&self.client, &self.runtime, definition)
    }

    fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        table_operations::delete_table(&self.client, &self.runtime, table)
    }
}

/// Build the AWS SDK DynamoDB client with the given configuration.
async fn build_client(config: ClientConfig) -> Client {
    let region_provider =
        RegionProviderChain::first_try(config.region.map(aws_sdk_dynamodb::config::Region::new))
            .or_default_provider()
            .or_else(DEFAULT_REGION);

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    // Credentials priority: hardcoded > profile > env/default chain
    if let (Some(ak), Some(sk)) = (config.access_key, config.secret_key) {
        let creds = Credentials::new(ak, sk, config.session_token, None, "dynamap-hardcoded");
        config_loader = config_loader.credentials_provider(creds);
    } else if let Some(profile_name) = config.profile {
        let profile_provider = ProfileFileCredentialsProvider::builder()
            .profile_name(&profile_name)
            .build();
        config_loader = config_loader.credentials_provider(profile_provider);
    }

    let sdk_config = config_loader.load().await;

    let mut dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config);

    if let Some(url) = config.endpoint_url {
        dynamo_config = dynamo_config.endpoint_url(url);
    }

    Client::from_conf(dynamo_config.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::default()
            .region("eu-west-1")
            .credentials("AKIA", "secret")
            .endpoint_url("http://localhost:8000");
        assert_eq!(config.resolved_region(), "eu-west-1");
        assert_eq!(config.access_key.as_deref(), Some("AKIA"));
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:8000"));
        assert!(config.profile.is_none());
    }

    #[test]
    fn test_config_deserializes_partial() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"region": "ap-south-1", "profile": "dev"}"#).unwrap();
        assert_eq!(config.region.as_deref(), Some("ap-south-1"));
        assert_eq!(config.profile.as_deref(), Some("dev"));
        assert!(config.endpoint_url.is_none());
    }
}
