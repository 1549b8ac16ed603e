//! DynamoDB key-value store implementation.
//!
//! Each logical table maps to a DynamoDB table of the same name with:
//! - PK: `partitionKey` (String)
//! - SK: `sortKey` (String), only in tables with composite keys
//! - `attributes`: the item document as a JSON string
//! - `expirationTime`: expiry in epoch seconds (Number), usable as the TTL attribute.
//!   Sub-second expiries are rounded up to the next second.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType, ReturnValue,
    ScalarAttributeType,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    Item, ItemKey, ItemQuery, Result, ScanFilter, SortKeyCondition, StoreError,
    store::{ItemStream, KeyValueStore, PutCondition, validate_item_key},
};

pub const PARTITION_KEY_ATTRIBUTE: &str = "partitionKey";
pub const SORT_KEY_ATTRIBUTE: &str = "sortKey";
pub const EXPIRATION_TIME_ATTRIBUTE: &str = "expirationTime";
const ATTRIBUTES_ATTRIBUTE: &str = "attributes";

type AttributeMap = HashMap<String, AttributeValue>;

/// Expiry in whole epoch seconds, rounded up so an item never expires
/// earlier than on the other backends.
fn expiration_seconds(expires_at: DateTime<Utc>) -> i64 {
    let seconds = expires_at.timestamp();
    if expires_at.timestamp_subsec_nanos() > 0 {
        seconds + 1
    } else {
        seconds
    }
}

/// DynamoDB implementation of KeyValueStore.
#[derive(Clone)]
pub struct DynamoKeyValueStore {
    client: Client,
}

impl DynamoKeyValueStore {
    /// Create a new DynamoDB store from the ambient AWS configuration.
    ///
    /// `endpoint_url` overrides the service endpoint (local emulators).
    pub async fn new(endpoint_url: Option<&str>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let client = if let Some(endpoint) = endpoint_url {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&config)
        };

        info!(endpoint = ?endpoint_url, "Connected to DynamoDB");

        Self { client }
    }

    /// Wraps an already configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Creates a table with the key schema used by this store.
    ///
    /// An existing table is left untouched.
    pub async fn create_table(&self, table: &str, with_sort_key: bool) -> Result<()> {
        let mut key_schema = vec![key_schema_element(PARTITION_KEY_ATTRIBUTE, KeyType::Hash)?];
        let mut definitions = vec![attribute_definition(PARTITION_KEY_ATTRIBUTE)?];
        if with_sort_key {
            key_schema.push(key_schema_element(SORT_KEY_ATTRIBUTE, KeyType::Range)?);
            definitions.push(attribute_definition(SORT_KEY_ATTRIBUTE)?);
        }

        let result = self
            .client
            .create_table()
            .table_name(table)
            .billing_mode(BillingMode::PayPerRequest)
            .set_key_schema(Some(key_schema))
            .set_attribute_definitions(Some(definitions))
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(table = %table, "Created DynamoDB table");
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_in_use_exception()) =>
            {
                debug!(table = %table, "DynamoDB table already exists");
                Ok(())
            }
            Err(err) => Err(StoreError::Backend(format!(
                "DynamoDB create_table failed: {err}"
            ))),
        }
    }

    fn key_attributes(key: &ItemKey) -> AttributeMap {
        let mut attributes = HashMap::new();
        attributes.insert(
            PARTITION_KEY_ATTRIBUTE.to_string(),
            AttributeValue::S(key.partition_key.clone()),
        );
        if let Some(sort_key) = &key.sort_key {
            attributes.insert(
                SORT_KEY_ATTRIBUTE.to_string(),
                AttributeValue::S(sort_key.clone()),
            );
        }
        attributes
    }

    fn item_to_attributes(item: &Item) -> Result<AttributeMap> {
        let mut attributes = Self::key_attributes(&item.key);
        attributes.insert(
            ATTRIBUTES_ATTRIBUTE.to_string(),
            AttributeValue::S(serde_json::to_string(&item.attributes)?),
        );
        if let Some(expires_at) = item.expires_at {
            attributes.insert(
                EXPIRATION_TIME_ATTRIBUTE.to_string(),
                AttributeValue::N(expiration_seconds(expires_at).to_string()),
            );
        }
        Ok(attributes)
    }

    fn attributes_to_item(attributes: &AttributeMap) -> Result<Item> {
        let partition_key = match attributes.get(PARTITION_KEY_ATTRIBUTE) {
            Some(AttributeValue::S(value)) => value.clone(),
            _ => {
                return Err(StoreError::InvalidItem(format!(
                    "missing {PARTITION_KEY_ATTRIBUTE} attribute"
                )));
            }
        };
        let sort_key = match attributes.get(SORT_KEY_ATTRIBUTE) {
            Some(AttributeValue::S(value)) => Some(value.clone()),
            _ => None,
        };
        let document = match attributes.get(ATTRIBUTES_ATTRIBUTE) {
            Some(AttributeValue::S(value)) => serde_json::from_str(value)?,
            _ => serde_json::Value::Null,
        };
        let expires_at = match attributes.get(EXPIRATION_TIME_ATTRIBUTE) {
            Some(AttributeValue::N(value)) => {
                let seconds = value.parse::<i64>().map_err(|e| {
                    StoreError::InvalidItem(format!("bad {EXPIRATION_TIME_ATTRIBUTE}: {e}"))
                })?;
                DateTime::<Utc>::from_timestamp(seconds, 0)
            }
            _ => None,
        };

        Ok(Item {
            key: ItemKey {
                partition_key,
                sort_key,
            },
            attributes: document,
            expires_at,
        })
    }
}

fn key_schema_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(|e| StoreError::Backend(e.to_string()))
}

fn attribute_definition(name: &str) -> Result<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl KeyValueStore for DynamoKeyValueStore {
    async fn put(&self, table: &str, item: Item, condition: PutCondition) -> Result<()> {
        validate_item_key(table, &item.key)?;

        let mut request = self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(Self::item_to_attributes(&item)?));

        // Expired items may not have been reaped yet; they count as absent.
        if condition == PutCondition::IfAbsent {
            request = request
                .condition_expression(
                    "attribute_not_exists(#pk) OR (attribute_exists(#exp) AND #exp <= :now)",
                )
                .expression_attribute_names("#pk", PARTITION_KEY_ATTRIBUTE)
                .expression_attribute_names("#exp", EXPIRATION_TIME_ATTRIBUTE)
                .expression_attribute_values(
                    ":now",
                    AttributeValue::N(Utc::now().timestamp().to_string()),
                );
        }

        match request.send().await {
            Ok(_) => {
                debug!(table = %table, key = %item.key, "Stored item in DynamoDB");
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Err(StoreError::ConditionFailed {
                    table: table.to_string(),
                    key: item.key,
                })
            }
            Err(err) => Err(StoreError::Backend(format!(
                "DynamoDB put_item failed: {err}"
            ))),
        }
    }

    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Item>> {
        let result = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(Self::key_attributes(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("DynamoDB get_item failed: {e}")))?;

        let now = Utc::now();
        match result.item {
            Some(attributes) => {
                let item = Self::attributes_to_item(&attributes)?;
                Ok(item.is_live_at(now).then_some(item))
            }
            None => Ok(None),
        }
    }

    async fn query(&self, table: &str, query: ItemQuery) -> Result<Vec<Item>> {
        let mut names = HashMap::from([("#pk".to_string(), PARTITION_KEY_ATTRIBUTE.to_string())]);
        let mut values = HashMap::from([(
            ":pk".to_string(),
            AttributeValue::S(query.partition_key.clone()),
        )]);

        let key_condition = match &query.condition {
            SortKeyCondition::Any => "#pk = :pk",
            SortKeyCondition::Equals(value) => {
                values.insert(":sk".to_string(), AttributeValue::S(value.clone()));
                "#pk = :pk AND #sk = :sk"
            }
            SortKeyCondition::BeginsWith(prefix) => {
                values.insert(":sk".to_string(), AttributeValue::S(prefix.clone()));
                "#pk = :pk AND begins_with(#sk, :sk)"
            }
            SortKeyCondition::GreaterThan(bound) => {
                values.insert(":sk".to_string(), AttributeValue::S(bound.clone()));
                "#pk = :pk AND #sk > :sk"
            }
            SortKeyCondition::Between(low, high) => {
                values.insert(":low".to_string(), AttributeValue::S(low.clone()));
                values.insert(":high".to_string(), AttributeValue::S(high.clone()));
                "#pk = :pk AND #sk BETWEEN :low AND :high"
            }
        };
        if query.condition != SortKeyCondition::Any {
            names.insert("#sk".to_string(), SORT_KEY_ATTRIBUTE.to_string());
        }

        let now = Utc::now();
        let mut items = Vec::new();
        let mut start_key: Option<AttributeMap> = None;

        // Expired items are filtered here, so the page limit cannot be pushed
        // down to DynamoDB.
        'pages: loop {
            let output = self
                .client
                .query()
                .table_name(table)
                .key_condition_expression(key_condition)
                .set_expression_attribute_names(Some(names.clone()))
                .set_expression_attribute_values(Some(values.clone()))
                .scan_index_forward(!query.descending)
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| StoreError::Backend(format!("DynamoDB query failed: {e}")))?;

            for attributes in output.items.unwrap_or_default() {
                let item = Self::attributes_to_item(&attributes)?;
                if !item.is_live_at(now) {
                    continue;
                }
                items.push(item);
                if query.limit.is_some_and(|limit| items.len() >= limit) {
                    break 'pages;
                }
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn delete(&self, table: &str, key: &ItemKey) -> Result<bool> {
        let result = self
            .client
            .delete_item()
            .table_name(table)
            .set_key(Some(Self::key_attributes(key)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("DynamoDB delete_item failed: {e}")))?;

        let now = Utc::now();
        match result.attributes {
            Some(attributes) if !attributes.is_empty() => {
                Ok(Self::attributes_to_item(&attributes)?.is_live_at(now))
            }
            _ => Ok(false),
        }
    }

    async fn scan(&self, table: &str, filter: ScanFilter) -> Result<ItemStream> {
        use futures_util::stream;

        let mut names = HashMap::new();
        let mut values = HashMap::new();
        let mut predicates = Vec::new();
        if let Some(prefix) = &filter.partition_key_prefix {
            names.insert("#pk".to_string(), PARTITION_KEY_ATTRIBUTE.to_string());
            values.insert(":pk".to_string(), AttributeValue::S(prefix.clone()));
            predicates.push("begins_with(#pk, :pk)");
        }
        if let Some(prefix) = &filter.sort_key_prefix {
            names.insert("#sk".to_string(), SORT_KEY_ATTRIBUTE.to_string());
            values.insert(":sk".to_string(), AttributeValue::S(prefix.clone()));
            predicates.push("begins_with(#sk, :sk)");
        }
        let filter_expression = (!predicates.is_empty()).then(|| predicates.join(" AND "));

        let now = Utc::now();
        let mut items = Vec::new();
        let mut start_key: Option<AttributeMap> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(table)
                .set_filter_expression(filter_expression.clone())
                .set_expression_attribute_names((!names.is_empty()).then(|| names.clone()))
                .set_expression_attribute_values((!values.is_empty()).then(|| values.clone()))
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| StoreError::Backend(format!("DynamoDB scan failed: {e}")))?;

            for attributes in output.items.unwrap_or_default() {
                let item = Self::attributes_to_item(&attributes)?;
                if item.is_live_at(now) {
                    items.push(item);
                }
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        // Scans come back in hash order.
        items.sort_by(|a, b| a.key.cmp(&b.key));

        debug!(table = %table, count = items.len(), "Scanned DynamoDB table");
        Ok(Box::pin(stream::iter(items.into_iter().map(Ok))))
    }
}
