const ATTR_DEVICE_CODE: &str = "device_code";
const ATTR_USER_CODE: &str = "user_code";
const ATTR_EXPIRE: &str = "expire";
const ATTR_ID_TOKEN: &str = "id_token";
const ATTR_ACCESS_TOKEN: &str = "access_token";
const ATTR_TOKEN_TYPE: &str = "token_type";
const ATTR_TOKEN_EXPIRE: &str = "token_expire";

#[derive(Clone)]
pub struct DeviceTokens {
    pub id_token: secrecy::SecretString,
    pub access_token: secrecy::SecretString,
    pub token_type: String,
    /// Lifetime of the tokens in seconds, as returned by the token endpoint.
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for DeviceTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTokens")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DeviceCodeRecord {
    pub device_code: String,
    pub user_code: String,
    pub expire: i64,
    pub tokens: Option<DeviceTokens>,
}

impl DeviceCodeRecord {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expire <= now
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Rows whose `expire` has passed read as absent; backends may sweep them lazily.
#[async_trait::async_trait]
pub trait DeviceCodeStore: Send + Sync {
    async fn put_pending(&self, record: &DeviceCodeRecord) -> crate::Result<()>;

    async fn find_by_device_code(
        &self,
        device_code: &str,
    ) -> crate::Result<Option<DeviceCodeRecord>>;

    async fn find_by_user_code(&self, user_code: &str) -> crate::Result<Option<DeviceCodeRecord>>;

    /// Stores tokens on a pending row. Returns `false` when the row already carries tokens or
    /// has disappeared.
    async fn attach_tokens(
        &self,
        record: &DeviceCodeRecord,
        tokens: &DeviceTokens,
    ) -> crate::Result<bool>;

    /// Removes a completed row and hands its tokens out. Returns `None` when the row is gone,
    /// expired, or still pending; at most one caller ever receives the tokens.
    async fn claim_tokens(
        &self,
        device_code: &str,
        user_code: &str,
    ) -> crate::Result<Option<DeviceCodeRecord>>;
}

#[async_trait::async_trait]
impl<T: DeviceCodeStore + ?Sized> DeviceCodeStore for std::sync::Arc<T> {
    async fn put_pending(&self, record: &DeviceCodeRecord) -> crate::Result<()> {
        (**self).put_pending(record).await
    }

    async fn find_by_device_code(
        &self,
        device_code: &str,
    ) -> crate::Result<Option<DeviceCodeRecord>> {
        (**self).find_by_device_code(device_code).await
    }

    async fn find_by_user_code(&self, user_code: &str) -> crate::Result<Option<DeviceCodeRecord>> {
        (**self).find_by_user_code(user_code).await
    }

    async fn attach_tokens(
        &self,
        record: &DeviceCodeRecord,
        tokens: &DeviceTokens,
    ) -> crate::Result<bool> {
        (**self).attach_tokens(record, tokens).await
    }

    async fn claim_tokens(
        &self,
        device_code: &str,
        user_code: &str,
    ) -> crate::Result<Option<DeviceCodeRecord>> {
        (**self).claim_tokens(device_code, user_code).await
    }
}

/// Table with `device_code` as partition key, `user_code` as sort key and TTL on `expire`.
#[derive(Debug, Clone)]
pub struct DynamoDbDeviceCodeStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoDbDeviceCodeStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub async fn from_region(region: &str, table_name: impl Into<String>) -> Self {
        let config = crate::client::sdk_config(region).await;
        Self::new(aws_sdk_dynamodb::Client::new(&config), table_name)
    }

    fn item_to_record(
        item: &std::collections::HashMap<String, aws_sdk_dynamodb::types::AttributeValue>,
    ) -> Option<DeviceCodeRecord> {
        let s = |name: &str| item.get(name).and_then(|v| v.as_s().ok()).cloned();
        let n = |name: &str| {
            item.get(name)
                .and_then(|v| v.as_n().ok())
                .and_then(|v| v.parse::<i64>().ok())
        };
        let tokens = match (s(ATTR_ID_TOKEN), s(ATTR_ACCESS_TOKEN), s(ATTR_TOKEN_TYPE)) {
            (Some(id_token), Some(access_token), Some(token_type)) => Some(DeviceTokens {
                id_token: id_token.into(),
                access_token: access_token.into(),
                token_type,
                expires_in: n(ATTR_TOKEN_EXPIRE).and_then(|v| u64::try_from(v).ok()),
            }),
            _ => None,
        };
        Some(DeviceCodeRecord {
            device_code: s(ATTR_DEVICE_CODE)?,
            user_code: s(ATTR_USER_CODE)?,
            expire: n(ATTR_EXPIRE)?,
            tokens,
        })
    }

    fn is_conditional_check_failed<E>(err: &E) -> bool
    where
        E: aws_smithy_types::error::metadata::ProvideErrorMetadata,
    {
        err.code() == Some("ConditionalCheckFailedException")
    }

    fn store_error<E>(context: &str, err: E) -> crate::Error
    where
        E: std::error::Error
            + aws_smithy_types::error::metadata::ProvideErrorMetadata
            + Send
            + Sync
            + 'static,
    {
        crate::client::map_sdk_error!(
            "DynamoDB",
            context,
            err,
            "ResourceNotFoundException" => NotFound,
            "ProvisionedThroughputExceededException" => ResourceExhausted,
            "RequestLimitExceeded" => ResourceExhausted,
            "AccessDeniedException" => PermissionDenied,
        )
    }
}

#[async_trait::async_trait]
impl DeviceCodeStore for DynamoDbDeviceCodeStore {
    async fn put_pending(&self, record: &DeviceCodeRecord) -> crate::Result<()> {
        use aws_sdk_dynamodb::types::AttributeValue;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item(ATTR_DEVICE_CODE, AttributeValue::S(record.device_code.clone()))
            .item(ATTR_USER_CODE, AttributeValue::S(record.user_code.clone()))
            .item(ATTR_EXPIRE, AttributeValue::N(record.expire.to_string()))
            .condition_expression("attribute_not_exists(#dc)")
            .expression_attribute_names("#dc", ATTR_DEVICE_CODE)
            .send()
            .await
            .map_err(|e| Self::store_error("PutItem", e.into_service_error()))?;
        Ok(())
    }

    async fn find_by_device_code(
        &self,
        device_code: &str,
    ) -> crate::Result<Option<DeviceCodeRecord>> {
        use aws_sdk_dynamodb::types::AttributeValue;
        let resp = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("#dc = :dc")
            .expression_attribute_names("#dc", ATTR_DEVICE_CODE)
            .expression_attribute_values(":dc", AttributeValue::S(device_code.to_owned()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| Self::store_error("Query", e.into_service_error()))?;
        let now = now();
        Ok(resp
            .items()
            .iter()
            .filter_map(Self::item_to_record)
            .find(|r| !r.is_expired_at(now)))
    }

    async fn find_by_user_code(&self, user_code: &str) -> crate::Result<Option<DeviceCodeRecord>> {
        use aws_sdk_dynamodb::types::AttributeValue;
        let now = now();
        let mut last_evaluated_key = None;

        loop {
            let mut request = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("#uc = :uc AND #ex > :now")
                .expression_attribute_names("#uc", ATTR_USER_CODE)
                .expression_attribute_names("#ex", ATTR_EXPIRE)
                .expression_attribute_values(":uc", AttributeValue::S(user_code.to_owned()))
                .expression_attribute_values(":now", AttributeValue::N(now.to_string()))
                .consistent_read(true);

            if let Some(key) = last_evaluated_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = request
                .send()
                .await
                .map_err(|e| Self::store_error("Scan", e.into_service_error()))?;

            if let Some(record) = response
                .items()
                .iter()
                .filter_map(Self::item_to_record)
                .find(|r| !r.is_expired_at(now))
            {
                return Ok(Some(record));
            }

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => {
                    last_evaluated_key = Some(key.clone());
                }
                _ => break,
            }
        }
        Ok(None)
    }

    async fn attach_tokens(
        &self,
        record: &DeviceCodeRecord,
        tokens: &DeviceTokens,
    ) -> crate::Result<bool> {
        use aws_sdk_dynamodb::types::AttributeValue;
        use secrecy::ExposeSecret;
        let mut req = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item(ATTR_DEVICE_CODE, AttributeValue::S(record.device_code.clone()))
            .item(ATTR_USER_CODE, AttributeValue::S(record.user_code.clone()))
            .item(ATTR_EXPIRE, AttributeValue::N(record.expire.to_string()))
            .item(
                ATTR_ID_TOKEN,
                AttributeValue::S(tokens.id_token.expose_secret().to_owned()),
            )
            .item(
                ATTR_ACCESS_TOKEN,
                AttributeValue::S(tokens.access_token.expose_secret().to_owned()),
            )
            .item(ATTR_TOKEN_TYPE, AttributeValue::S(tokens.token_type.clone()))
            .condition_expression("attribute_exists(#dc) AND attribute_not_exists(#at)")
            .expression_attribute_names("#dc", ATTR_DEVICE_CODE)
            .expression_attribute_names("#at", ATTR_ACCESS_TOKEN);
        if let Some(e) = tokens.expires_in {
            req = req.item(ATTR_TOKEN_EXPIRE, AttributeValue::N(e.to_string()));
        }
        match req.send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let e = e.into_service_error();
                if Self::is_conditional_check_failed(&e) {
                    tracing::warn!(user_code = %record.user_code, "Device code already completed or gone");
                    return Ok(false);
                }
                Err(Self::store_error("PutItem", e))
            }
        }
    }

    async fn claim_tokens(
        &self,
        device_code: &str,
        user_code: &str,
    ) -> crate::Result<Option<DeviceCodeRecord>> {
        use aws_sdk_dynamodb::types::AttributeValue;
        let resp = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key(ATTR_DEVICE_CODE, AttributeValue::S(device_code.to_owned()))
            .key(ATTR_USER_CODE, AttributeValue::S(user_code.to_owned()))
            .condition_expression("attribute_exists(#at) AND #ex > :now")
            .expression_attribute_names("#at", ATTR_ACCESS_TOKEN)
            .expression_attribute_names("#ex", ATTR_EXPIRE)
            .expression_attribute_values(":now", AttributeValue::N(now().to_string()))
            .return_values(aws_sdk_dynamodb::types::ReturnValue::AllOld)
            .send()
            .await;
        match resp {
            Ok(r) => Ok(r.attributes().and_then(Self::item_to_record)),
            Err(e) => {
                let e = e.into_service_error();
                if Self::is_conditional_check_failed(&e) {
                    return Ok(None);
                }
                Err(Self::store_error("DeleteItem", e))
            }
        }
    }
}

/// Process-local store, keyed by device code.
#[derive(Debug, Default)]
pub struct InMemoryDeviceCodeStore {
    rows: std::sync::Mutex<std::collections::HashMap<String, DeviceCodeRecord>>,
}

impl InMemoryDeviceCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(
        &self,
    ) -> crate::Result<std::sync::MutexGuard<'_, std::collections::HashMap<String, DeviceCodeRecord>>>
    {
        self.rows
            .lock()
            .map_err(|_| crate::Error::StoreError("device code store lock poisoned".to_owned()))
    }
}

#[async_trait::async_trait]
impl DeviceCodeStore for InMemoryDeviceCodeStore {
    async fn put_pending(&self, record: &DeviceCodeRecord) -> crate::Result<()> {
        let mut rows = self.rows()?;
        let now = now();
        rows.retain(|_, r| !r.is_expired_at(now));
        if rows.contains_key(&record.device_code) {
            return Err(crate::Error::StoreError(
                "device code already exists".to_owned(),
            ));
        }
        rows.insert(record.device_code.clone(), record.clone());
        Ok(())
    }

    async fn find_by_device_code(
        &self,
        device_code: &str,
    ) -> crate::Result<Option<DeviceCodeRecord>> {
        let now = now();
        Ok(self
            .rows()?
            .get(device_code)
            .filter(|r| !r.is_expired_at(now))
            .cloned())
    }

    async fn find_by_user_code(&self, user_code: &str) -> crate::Result<Option<DeviceCodeRecord>> {
        let now = now();
        Ok(self
            .rows()?
            .values()
            .find(|r| r.user_code == user_code && !r.is_expired_at(now))
            .cloned())
    }

    async fn attach_tokens(
        &self,
        record: &DeviceCodeRecord,
        tokens: &DeviceTokens,
    ) -> crate::Result<bool> {
        let mut rows = self.rows()?;
        match rows.get_mut(&record.device_code) {
            Some(r) if r.user_code == record.user_code && r.tokens.is_none() => {
                r.tokens = Some(tokens.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_tokens(
        &self,
        device_code: &str,
        user_code: &str,
    ) -> crate::Result<Option<DeviceCodeRecord>> {
        let now = now();
        let mut rows = self.rows()?;
        let claimable = rows.get(device_code).is_some_and(|r| {
            r.user_code == user_code && r.tokens.is_some() && !r.is_expired_at(now)
        });
        if !claimable {
            return Ok(None);
        }
        Ok(rows.remove(device_code))
    }
}
