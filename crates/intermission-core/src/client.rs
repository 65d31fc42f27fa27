//! HTTP metadata client for Jellyfin-compatible servers

use crate::{host::MetadataService, types::*, Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Fields requested with item lookups
const ITEM_FIELDS: &str =
    "Overview,Taglines,Tags,Genres,Studios,OfficialRating,CommunityRating,MediaStreams,MediaSources";

/// Header carrying the access token
const TOKEN_HEADER: &str = "X-Emby-Token";

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct QueryFilters {
    tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ItemsPage {
    items: Vec<ItemSummary>,
}

/// `MetadataService` backed by the server's REST API
pub struct HttpMetadataService {
    client: Client,
    base: Url,
    server_id: String,
    user_id: String,
    token: Mutex<Option<String>>,
}

impl HttpMetadataService {
    /// Create a client for `server` acting as `user_id`
    pub fn new(server: &str, user_id: impl Into<String>, token: Option<String>) -> Result<Self> {
        let mut base = Url::parse(server)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            server_id: base.host_str().unwrap_or_default().to_string(),
            base,
            user_id: user_id.into(),
            token: Mutex::new(token),
        })
    }

    /// Override the server id used in the scope stamp
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = server_id.into();
        self
    }

    fn token(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn has_token(&self) -> bool {
        self.token().is_some()
    }

    /// Build an absolute endpoint URL from a relative path and query pairs
    pub fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let token = self.token().clone();
        let mut request = self.client.get(url.clone());
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if let Some(err) = status_error(status, url.as_str()) {
            if matches!(err, Error::Unauthorized) {
                self.clear_credentials();
            }
            return Err(err);
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Map a non-success status to the matching error
pub fn status_error(status: StatusCode, url: &str) -> Option<Error> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED => Error::Unauthorized,
        StatusCode::FORBIDDEN => Error::Forbidden(url.to_string()),
        StatusCode::NOT_FOUND => Error::NotFound(url.to_string()),
        other => Error::Http {
            status: other.as_u16(),
            url: url.to_string(),
        },
    })
}

#[async_trait]
impl MetadataService for HttpMetadataService {
    fn scope_stamp(&self) -> ScopeStamp {
        ScopeStamp::new(self.server_id.clone(), self.user_id.clone())
    }

    #[instrument(skip(self), fields(item_id = %id))]
    async fn item(&self, id: &ItemId) -> Result<ItemDetails> {
        let path = format!("Users/{}/Items/{}", self.user_id, id);
        let url = self.endpoint(&path, &[("Fields", ITEM_FIELDS)])?;
        self.get_json(url).await
    }

    async fn sessions(&self) -> Result<Vec<SessionInfo>> {
        let url = self.endpoint("Sessions", &[])?;
        self.get_json(url).await
    }

    #[instrument(skip(self))]
    async fn tag_vocabulary(&self) -> Result<Vec<String>> {
        let url = self.endpoint("Items/Filters", &[("UserId", self.user_id.as_str())])?;
        let filters: QueryFilters = self.get_json(url).await?;
        debug!(tags = filters.tags.len(), "Fetched catalog tags");
        Ok(filters.tags)
    }

    async fn similar_items(&self, id: &ItemId, limit: usize) -> Result<Vec<ItemSummary>> {
        let path = format!("Items/{id}/Similar");
        let limit = limit.to_string();
        let url = self.endpoint(
            &path,
            &[("UserId", self.user_id.as_str()), ("Limit", limit.as_str())],
        )?;
        let page: ItemsPage = self.get_json(url).await?;
        Ok(page.items)
    }

    /// The session playing that media source knows its catalog item
    async fn item_for_media_source(&self, media_source_id: &str) -> Result<Option<ItemId>> {
        let wanted = ItemId::from_guid(media_source_id);
        let sessions = self.sessions().await?;
        Ok(sessions.into_iter().find_map(|session| {
            let source = session.play_state.as_ref()?.media_source_id.as_deref()?;
            if ItemId::from_guid(source) != wanted || wanted.is_none() {
                return None;
            }
            session
                .now_playing_item
                .filter(|item| !item.id.is_empty())
                .map(|item| ItemId::new(item.id))
        }))
    }

    fn clear_credentials(&self) {
        if self.token().take().is_some() {
            warn!("Access token cleared after 401");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> HttpMetadataService {
        HttpMetadataService::new("https://media.example/jellyfin", "user-1", Some("secret".into()))
            .unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = service();
        let url = client
            .endpoint("Users/user-1/Items/abc", &[("Fields", "Tags")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://media.example/jellyfin/Users/user-1/Items/abc?Fields=Tags"
        );

        let url = client.endpoint("/Sessions", &[]).unwrap();
        assert_eq!(url.as_str(), "https://media.example/jellyfin/Sessions");
    }

    #[test]
    fn test_scope_stamp() {
        let client = service();
        assert_eq!(client.scope_stamp(), ScopeStamp::new("media.example", "user-1"));
        let client = client.with_server_id("srv-42");
        assert_eq!(client.scope_stamp().to_string(), "srv-42:user-1");
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::OK, "/x").is_none());
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "/x"),
            Some(Error::Unauthorized)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "/x"),
            Some(Error::Forbidden(_))
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "/x"),
            Some(Error::NotFound(_))
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "/x"),
            Some(Error::Http { status: 502, .. })
        ));
    }

    #[test]
    fn test_clear_credentials() {
        let client = service();
        assert!(client.has_token());
        client.clear_credentials();
        assert!(!client.has_token());
    }

    #[test]
    fn test_invalid_server_url() {
        assert!(matches!(
            HttpMetadataService::new("not a url", "user-1", None),
            Err(Error::Url(_))
        ));
    }
}
