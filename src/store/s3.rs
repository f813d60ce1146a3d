use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    Client as S3Client,
};
use chrono::Utc;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use super::{
    display_name, parent_prefix, sort_entries, validate_entry_name, ChildPage, EntryKind,
    OrderKey, RemoteEntry, RemoteStore, StoreError,
};
use crate::auth::Credential;

const COPY_SOURCE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'/');
const DEFAULT_REGION: &str = "us-east-1";

/// Bucket-backed store. Folders are common prefixes under a `/` delimiter.
pub struct S3Store {
    client: S3Client,
    bucket: String,
}

impl S3Store {
    pub fn from_credential(credential: &Credential) -> Result<Self, StoreError> {
        if credential.access_key_id.trim().is_empty()
            || credential.secret_access_key.trim().is_empty()
        {
            return Err(StoreError::Unauthorized(
                "Credential keys are missing".to_string(),
            ));
        }

        let region = credential
            .region
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_REGION);

        let credentials = Credentials::new(
            credential.access_key_id.clone(),
            credential.secret_access_key.clone(),
            credential.session_token.clone(),
            None,
            "batchname",
        );

        let mut config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version_latest()
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials);

        if let Some(endpoint) = credential
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            config_builder = config_builder.endpoint_url(endpoint.to_string());
        }

        if matches!(credential.provider.as_str(), "minio" | "custom") {
            config_builder = config_builder.force_path_style(true);
        }

        Ok(Self {
            client: S3Client::from_conf(config_builder.build()),
            bucket: credential.bucket.clone(),
        })
    }
}

fn s3_datetime_to_iso(dt: &aws_sdk_s3::primitives::DateTime) -> Option<String> {
    dt.to_millis()
        .ok()
        .and_then(chrono::DateTime::<Utc>::from_timestamp_millis)
        .map(|value| value.to_rfc3339())
}

fn map_sdk_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match err.code() {
        Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken") => {
            StoreError::Unauthorized(message)
        }
        Some("NoSuchKey" | "NoSuchBucket" | "NotFound") => StoreError::NotFound(message),
        Some("InvalidArgument") if message.contains("continuation") => {
            StoreError::InvalidToken(message)
        }
        _ => StoreError::Request(message),
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    fn label(&self) -> String {
        self.bucket.clone()
    }

    async fn list_children(
        &self,
        folder_id: &str,
        order: OrderKey,
        page_token: Option<&str>,
        page_size: u16,
    ) -> Result<ChildPage, StoreError> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(self.bucket.clone())
            .delimiter("/")
            .max_keys(i32::from(page_size));

        if !folder_id.is_empty() {
            request = request.prefix(folder_id);
        }
        if let Some(token) = page_token {
            request = request.continuation_token(token);
        }

        let output = request.send().await.map_err(map_sdk_error)?;

        let mut entries: Vec<RemoteEntry> = output
            .common_prefixes()
            .iter()
            .filter_map(|prefix| prefix.prefix())
            .map(|prefix| RemoteEntry {
                id: prefix.to_string(),
                name: display_name(prefix).to_string(),
                kind: EntryKind::Folder,
                size: None,
                modified: None,
            })
            .collect();

        entries.extend(
            output
                .contents()
                .iter()
                .filter_map(|item| item.key().map(|key| (key, item)))
                // Zero-byte folder markers list themselves under their own prefix.
                .filter(|(key, _)| *key != folder_id)
                .map(|(key, item)| RemoteEntry {
                    id: key.to_string(),
                    name: display_name(key).to_string(),
                    kind: EntryKind::File,
                    size: Some(item.size().unwrap_or(0).max(0)),
                    modified: item.last_modified().and_then(s3_datetime_to_iso),
                }),
        );

        sort_entries(&mut entries, order);

        let next_page_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        debug!(
            bucket = %self.bucket,
            prefix = folder_id,
            count = entries.len(),
            has_more = next_page_token.is_some(),
            "listed children"
        );

        Ok(ChildPage {
            entries,
            next_page_token,
        })
    }

    async fn rename(
        &self,
        entry_id: &str,
        new_name: &str,
        old_name: &str,
    ) -> Result<RemoteEntry, StoreError> {
        validate_entry_name(new_name)?;
        let new_key = format!("{}{}", parent_prefix(entry_id), new_name);
        if new_key == entry_id {
            return Err(StoreError::Conflict(new_key));
        }

        match self
            .client
            .head_object()
            .bucket(self.bucket.clone())
            .key(new_key.clone())
            .send()
            .await
        {
            Ok(_) => return Err(StoreError::Conflict(new_key)),
            Err(err)
                if err
                    .as_service_error()
                    .map(|service| service.is_not_found())
                    .unwrap_or(false) => {}
            Err(err) => return Err(map_sdk_error(err)),
        }

        let source_key = utf8_percent_encode(entry_id, COPY_SOURCE_ENCODE_SET);
        let copy_source = format!("{}/{}", self.bucket, source_key);

        self.client
            .copy_object()
            .copy_source(copy_source)
            .bucket(self.bucket.clone())
            .key(new_key.clone())
            .send()
            .await
            .map_err(map_sdk_error)?;

        self.client
            .delete_object()
            .bucket(self.bucket.clone())
            .key(entry_id)
            .send()
            .await
            .map_err(map_sdk_error)?;

        debug!(bucket = %self.bucket, from = old_name, to = new_name, "renamed object");

        Ok(RemoteEntry {
            id: new_key,
            name: new_name.to_string(),
            kind: EntryKind::File,
            size: None,
            modified: Some(Utc::now().to_rfc3339()),
        })
    }
}
