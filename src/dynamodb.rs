//! DynamoDB-backed [`LockStore`].
//!
//! Lock items live in a single table keyed by the configured partition and
//! sort key attributes. Conditions are evaluated server-side:
//!
//! - put: `attribute_not_exists(#pk) OR #exp < :now`
//! - delete: `#owner = :owner`
//!
//! Enable the `expiresAt` attribute as the table's TTL attribute to have
//! DynamoDB purge abandoned leases.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::LockOptions;
use crate::constants::ATTR_EXPIRES_AT;
use crate::constants::ATTR_OWNER_ID;
use crate::error::StoreError;
use crate::store::ConditionalDeleteRequest;
use crate::store::ConditionalPutRequest;
use crate::store::DeleteCondition;
use crate::store::LockStore;
use crate::store::PutCondition;

/// Connection overrides for [`DynamoDbLockStore::new`].
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConnection {
    /// Region override; the SDK config's region is used when unset.
    pub region: Option<String>,
    /// Endpoint override (e.g. a local DynamoDB).
    pub endpoint: Option<String>,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// DynamoDB implementation of [`LockStore`].
#[derive(Debug, Clone)]
pub struct DynamoDbLockStore {
    client: Client,
    table_name: String,
    partition_key_attribute: String,
    sort_key_attribute: String,
}

impl DynamoDbLockStore {
    /// Build a store from shared SDK configuration.
    ///
    /// Inherits the HTTP client, credentials, and retry settings of
    /// `sdk_config`, then applies `connection` overrides.
    pub fn new(sdk_config: &aws_config::SdkConfig, options: &LockOptions, connection: DynamoDbConnection) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region) = connection.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region));
        }
        if let Some(endpoint) = connection.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeout_ms) = connection.timeout_ms {
            let timeout_config = aws_sdk_dynamodb::config::timeout::TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Self::from_client(Client::from_conf(builder.build()), options)
    }

    /// Create from a pre-built client.
    pub fn from_client(client: Client, options: &LockOptions) -> Self {
        Self {
            client,
            table_name: options.table_name.clone(),
            partition_key_attribute: options.partition_key_attribute.clone(),
            sort_key_attribute: options.sort_key_attribute.clone(),
        }
    }

    /// Name of the lock table.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait]
impl LockStore for DynamoDbLockStore {
    async fn conditional_put(
        &self,
        request: ConditionalPutRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let PutCondition::AbsentOrExpired { now_secs } = request.condition;
        let key = request.key.partition.clone();

        let call = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item(&self.partition_key_attribute, AttributeValue::S(request.key.partition))
            .item(&self.sort_key_attribute, AttributeValue::S(request.key.sort))
            .item(ATTR_OWNER_ID, AttributeValue::S(request.record.owner_id))
            .item(ATTR_EXPIRES_AT, AttributeValue::N(request.record.expires_at.to_string()))
            .condition_expression("attribute_not_exists(#pk) OR #exp < :now")
            .expression_attribute_names("#pk", &self.partition_key_attribute)
            .expression_attribute_names("#exp", ATTR_EXPIRES_AT)
            .expression_attribute_values(":now", AttributeValue::N(now_secs.to_string()))
            .send();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            result = call => result,
        };

        result.map(|_| ()).map_err(|err| {
            debug!(key = %key, error = %DisplayErrorContext(&err), "DynamoDB PutItem failed");
            put_error_to_store_error(&key, &err)
        })
    }

    async fn conditional_delete(
        &self,
        request: ConditionalDeleteRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let DeleteCondition::OwnerEquals { owner_id } = request.condition;
        let key = request.key.partition.clone();

        let call = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key(&self.partition_key_attribute, AttributeValue::S(request.key.partition))
            .key(&self.sort_key_attribute, AttributeValue::S(request.key.sort))
            .condition_expression("#owner = :owner")
            .expression_attribute_names("#owner", ATTR_OWNER_ID)
            .expression_attribute_values(":owner", AttributeValue::S(owner_id))
            .send();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            result = call => result,
        };

        result.map(|_| ()).map_err(|err| {
            debug!(key = %key, error = %DisplayErrorContext(&err), "DynamoDB DeleteItem failed");
            delete_error_to_store_error(&key, &err)
        })
    }
}

fn put_error_to_store_error<R>(key: &str, err: &SdkError<PutItemError, R>) -> StoreError
where
    R: std::fmt::Debug,
{
    let detail = format!("DynamoDB PutItem failed: {}", DisplayErrorContext(err));
    match err {
        SdkError::ServiceError(service_err) => match service_err.err() {
            PutItemError::ConditionalCheckFailedException(_) => StoreError::ConditionFailed { key: key.to_string() },
            PutItemError::ProvisionedThroughputExceededException(_) => StoreError::Throttled { reason: detail },
            PutItemError::InternalServerError(_) => StoreError::InternalFault { reason: detail },
            PutItemError::RequestLimitExceeded(_) => StoreError::RateLimited { reason: detail },
            other => store_error_from_code(key, other.code(), detail),
        },
        _ => StoreError::Other { detail },
    }
}

fn delete_error_to_store_error<R>(key: &str, err: &SdkError<DeleteItemError, R>) -> StoreError
where
    R: std::fmt::Debug,
{
    let detail = format!("DynamoDB DeleteItem failed: {}", DisplayErrorContext(err));
    match err {
        SdkError::ServiceError(service_err) => match service_err.err() {
            DeleteItemError::ConditionalCheckFailedException(_) => StoreError::ConditionFailed { key: key.to_string() },
            DeleteItemError::ProvisionedThroughputExceededException(_) => StoreError::Throttled { reason: detail },
            DeleteItemError::InternalServerError(_) => StoreError::InternalFault { reason: detail },
            DeleteItemError::RequestLimitExceeded(_) => StoreError::RateLimited { reason: detail },
            other => store_error_from_code(key, other.code(), detail),
        },
        _ => StoreError::Other { detail },
    }
}

/// Classify a DynamoDB error by its wire error code.
///
/// Covers codes without a modeled variant in the SDK version in use, such as
/// `ThrottlingException`.
fn store_error_from_code(key: &str, code: Option<&str>, detail: String) -> StoreError {
    match code {
        Some("ConditionalCheckFailedException") => StoreError::ConditionFailed { key: key.to_string() },
        Some("ProvisionedThroughputExceededException") | Some("ThrottlingException") => {
            StoreError::Throttled { reason: detail }
        }
        Some("InternalServerError") => StoreError::InternalFault { reason: detail },
        Some("RequestLimitExceeded") => StoreError::RateLimited { reason: detail },
        _ => StoreError::Other { detail },
    }
}
