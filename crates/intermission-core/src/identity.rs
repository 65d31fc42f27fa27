//! Item-identity resolution
//!
//! Which catalog item is the bound element playing? Sources are tried in
//! order and the first answer wins:
//!
//! 1. the host's now-playing channel, once stable and not left over from the
//!    previous item,
//! 2. the session listing (this device's session, or the only active one),
//! 3. an id embedded in the element's stream URL.
//!
//! URL-derived ids may be technical media-source ids; those are swapped for
//! the owning catalog item before details are used.

use crate::{
    cache::MetadataCache,
    host::{MediaElement, NowPlaying, NowPlayingSignal},
    types::*,
    Error,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, instrument};
use url::Url;

/// Base used to resolve relative stream URLs
const RELATIVE_BASE: &str = "http://localhost/";

/// Path segments that precede an item id in stream URLs
const ID_SEGMENTS: &[&str] = &["videos", "audio", "items"];

/// Where an identity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    NowPlaying,
    Session,
    StreamUrl,
    /// Only a media-source id was found in the stream URL
    MediaSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub item_id: ItemId,
    pub source: IdentitySource,
}

/// Ids found in a stream URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamIds {
    pub item_id: Option<ItemId>,
    pub media_source_id: Option<ItemId>,
}

/// Extract `ItemId` / `MediaSourceId` query parameters and `/Videos/{id}/...`
/// style path segments. Only GUID-shaped values are accepted.
pub fn parse_stream_url(src: &str) -> Option<StreamIds> {
    let url = match Url::parse(src) {
        Ok(url) => url,
        Err(_) => Url::parse(RELATIVE_BASE).ok()?.join(src).ok()?,
    };

    let mut ids = StreamIds::default();
    for (key, value) in url.query_pairs() {
        if key.eq_ignore_ascii_case("itemid") && ids.item_id.is_none() {
            ids.item_id = ItemId::from_guid(&value);
        } else if key.eq_ignore_ascii_case("mediasourceid") && ids.media_source_id.is_none() {
            ids.media_source_id = ItemId::from_guid(&value);
        }
    }

    if ids.item_id.is_none() {
        if let Some(segments) = url.path_segments() {
            let segments: Vec<&str> = segments.collect();
            ids.item_id = segments.windows(2).find_map(|pair| {
                let marker = pair[0].to_ascii_lowercase();
                if ID_SEGMENTS.contains(&marker.as_str()) {
                    ItemId::from_guid(pair[1])
                } else {
                    None
                }
            });
        }
    }

    (ids.item_id.is_some() || ids.media_source_id.is_some()).then_some(ids)
}

/// Resolves the playing item for a bound element
pub struct IdentityResolver {
    metadata: Arc<MetadataCache>,
    now_playing: Option<Arc<dyn NowPlaying>>,
    device_id: Option<String>,
    debounce: Duration,
    fresh_play_guard: Duration,
}

impl IdentityResolver {
    pub fn new(
        metadata: Arc<MetadataCache>,
        now_playing: Option<Arc<dyn NowPlaying>>,
        device_id: Option<String>,
        debounce: Duration,
        fresh_play_guard: Duration,
    ) -> Self {
        Self {
            metadata,
            now_playing,
            device_id,
            debounce,
            fresh_play_guard,
        }
    }

    /// First identity any source can vouch for. `play_started` is the start of
    /// the current play segment.
    #[instrument(skip_all, fields(element = %element.id()))]
    pub async fn resolve(
        &self,
        element: &dyn MediaElement,
        play_started: Option<Instant>,
    ) -> Option<ResolvedIdentity> {
        if let Some(item_id) = self.from_now_playing(play_started).await {
            debug!(item_id = %item_id, "Identity from now-playing channel");
            return Some(ResolvedIdentity {
                item_id,
                source: IdentitySource::NowPlaying,
            });
        }
        if let Some(item_id) = self.from_sessions().await {
            debug!(item_id = %item_id, "Identity from session listing");
            return Some(ResolvedIdentity {
                item_id,
                source: IdentitySource::Session,
            });
        }
        let ids = element.current_src().as_deref().and_then(parse_stream_url)?;
        let resolved = match (ids.item_id, ids.media_source_id) {
            (Some(item_id), _) => ResolvedIdentity {
                item_id,
                source: IdentitySource::StreamUrl,
            },
            (None, Some(source_id)) => ResolvedIdentity {
                item_id: source_id,
                source: IdentitySource::MediaSource,
            },
            (None, None) => return None,
        };
        debug!(item_id = %resolved.item_id, source = ?resolved.source, "Identity from stream URL");
        Some(resolved)
    }

    /// Fetch details for a resolved identity, substituting the catalog item
    /// when a URL-derived id turns out to be a media-source id
    pub async fn details(&self, identity: &ResolvedIdentity) -> Option<Arc<ItemDetails>> {
        let from_url = matches!(
            identity.source,
            IdentitySource::StreamUrl | IdentitySource::MediaSource
        );

        if identity.source == IdentitySource::MediaSource {
            let item_id = self.substitute(&identity.item_id).await?;
            return self.metadata.item_details(&item_id).await;
        }

        match self.metadata.try_item_details(&identity.item_id).await {
            Ok(details) => Some(details),
            Err(Error::NotFound(_)) if from_url => {
                let item_id = self.substitute(&identity.item_id).await?;
                self.metadata.item_details(&item_id).await
            }
            Err(_) => None,
        }
    }

    async fn substitute(&self, media_source_id: &ItemId) -> Option<ItemId> {
        match self
            .metadata
            .service()
            .item_for_media_source(media_source_id.as_str())
            .await
        {
            Ok(Some(item_id)) => {
                debug!(media_source = %media_source_id, item_id = %item_id, "Substituted catalog item");
                Some(item_id)
            }
            Ok(None) => None,
            Err(err) => {
                debug!(code = err.error_code(), "Media-source lookup failed");
                None
            }
        }
    }

    async fn from_now_playing(&self, play_started: Option<Instant>) -> Option<ItemId> {
        let channel = self.now_playing.as_ref()?;
        let signal = channel.current()?;
        if signal.item_id.as_str().is_empty() {
            return None;
        }

        let age = Instant::now().saturating_duration_since(signal.changed_at);
        let signal = if age < self.debounce {
            time::sleep(self.debounce - age).await;
            let settled = channel.current()?;
            if settled != signal {
                debug!("Now-playing signal still changing");
                return None;
            }
            settled
        } else {
            signal
        };

        self.is_fresh(&signal, play_started).then_some(signal.item_id)
    }

    /// Right after `play`, a signal older than the play start most likely
    /// belongs to the previous item
    fn is_fresh(&self, signal: &NowPlayingSignal, play_started: Option<Instant>) -> bool {
        let Some(started) = play_started else {
            return true;
        };
        let in_guard = Instant::now().saturating_duration_since(started) < self.fresh_play_guard;
        !in_guard || signal.changed_at >= started
    }

    async fn from_sessions(&self) -> Option<ItemId> {
        let sessions = self.metadata.sessions().await;
        let mut playing = sessions.iter().filter(|session| {
            session
                .now_playing_item
                .as_ref()
                .is_some_and(|item| !item.id.is_empty())
        });

        let session = match &self.device_id {
            Some(device_id) => {
                playing.find(|session| session.device_id.as_deref() == Some(device_id.as_str()))
            }
            None => {
                let first = playing.next();
                if playing.next().is_some() {
                    debug!("Several active sessions; session lookup is ambiguous");
                    return None;
                }
                first
            }
        }?;
        session
            .now_playing_item
            .as_ref()
            .map(|item| ItemId::new(item.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
    const SIMPLE: &str = "0f8fad5bd9cb469fa16570867728950e";

    #[test]
    fn test_parse_query_item_id() {
        let ids = parse_stream_url(&format!(
            "https://media.example/Videos/stream.mp4?ItemId={GUID}&Static=true"
        ))
        .unwrap();
        assert_eq!(ids.item_id, Some(ItemId::from(SIMPLE)));
    }

    #[test]
    fn test_parse_path_segment() {
        let ids = parse_stream_url(&format!("/videos/{SIMPLE}/master.m3u8?api_key=x")).unwrap();
        assert_eq!(ids.item_id, Some(ItemId::from(SIMPLE)));
        assert_eq!(ids.media_source_id, None);
    }

    #[test]
    fn test_parse_media_source_only() {
        let ids = parse_stream_url(&format!("/Audio/universal?MediaSourceId={GUID}")).unwrap();
        assert_eq!(ids.item_id, None);
        assert_eq!(ids.media_source_id, Some(ItemId::from(SIMPLE)));
    }

    #[test]
    fn test_parse_rejects_non_guid() {
        assert!(parse_stream_url("/Videos/not-an-id/stream.mp4").is_none());
        assert!(parse_stream_url("blob:https://media.example/1234").is_none());
        assert!(parse_stream_url("").is_none());
    }
}
