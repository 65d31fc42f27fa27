//! Host capabilities
//!
//! The monitor never reaches into ambient page state. Everything it needs from
//! the host (the media elements of the render tree, which of them are
//! previews, what the host thinks is playing, where overlays are drawn, and
//! the metadata service) is injected through the traits in this module.

use crate::{
    overlay::{BadgeContent, OverlayContent},
    scope::ChangeObserver,
    types::*,
    Result,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

/// Playback notifications emitted by a media element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaEvent {
    Play,
    Pause,
    Ended,
    Emptied,
    Abort,
    Stalled,
    Seeking,
    LoadedMetadata,
}

impl MediaEvent {
    /// Every event the monitor listens for on a bound element
    pub const BOUND: [MediaEvent; 8] = [
        MediaEvent::Play,
        MediaEvent::Pause,
        MediaEvent::Ended,
        MediaEvent::Emptied,
        MediaEvent::Abort,
        MediaEvent::Stalled,
        MediaEvent::Seeking,
        MediaEvent::LoadedMetadata,
    ];

    /// Events after which the element has nothing left to show
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MediaEvent::Ended | MediaEvent::Emptied | MediaEvent::Abort | MediaEvent::Stalled
        )
    }
}

impl std::fmt::Display for MediaEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaEvent::Play => "play",
            MediaEvent::Pause => "pause",
            MediaEvent::Ended => "ended",
            MediaEvent::Emptied => "emptied",
            MediaEvent::Abort => "abort",
            MediaEvent::Stalled => "stalled",
            MediaEvent::Seeking => "seeking",
            MediaEvent::LoadedMetadata => "loadedmetadata",
        };
        f.write_str(name)
    }
}

/// Handle of an attached event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Callback invoked by the element for each subscribed event
pub type MediaListener = Arc<dyn Fn(MediaEvent) + Send + Sync>;

/// A host media element. It may be swapped or removed by the host at any time.
pub trait MediaElement: Send + Sync {
    fn id(&self) -> ElementId;
    /// Still attached to the render tree
    fn is_connected(&self) -> bool;
    fn is_paused(&self) -> bool;
    fn is_ended(&self) -> bool;
    /// Playback position in seconds
    fn current_time(&self) -> f64;
    /// Duration in seconds; `None` while unknown or unbounded
    fn duration(&self) -> Option<f64>;
    fn is_muted(&self) -> bool;
    fn is_autoplay(&self) -> bool;
    /// Structural hint: the element sits inside a hub preview container
    fn in_preview_container(&self) -> bool {
        false
    }
    fn current_src(&self) -> Option<String>;
    fn is_picture_in_picture(&self) -> bool {
        false
    }
    fn pause(&self);
    fn play(&self);
    fn add_listener(&self, event: MediaEvent, listener: MediaListener) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
}

pub type SharedElement = Arc<dyn MediaElement>;

/// Enumerates media elements for the host's own render topology
pub trait CandidateSource: Send + Sync {
    /// Media elements in tree order, descending nested documents up to `max_depth`
    fn candidates(&self, max_depth: usize) -> Vec<SharedElement>;

    /// Watch the tree for added or removed media elements.
    /// `None` when the host cannot observe changes; polling covers that case.
    fn observe(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Option<Box<dyn ChangeObserver>>;
}

/// Authoritative preview/trailer detection supplied by the host
pub trait PreviewPredicate: Send + Sync {
    /// `None` when the host does not know; the structural fallback then decides
    fn is_preview(&self, element: &dyn MediaElement) -> Option<bool>;
}

/// What the host's playback channel reports as playing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlayingSignal {
    pub item_id: ItemId,
    /// When the host last changed this value
    pub changed_at: Instant,
}

/// Best-effort "currently playing item" channel of the host
pub trait NowPlaying: Send + Sync {
    fn current(&self) -> Option<NowPlayingSignal>;
}

/// Where the overlay and badge are drawn
pub trait OverlaySurface: Send + Sync {
    fn show_overlay(&self, content: OverlayContent);
    fn hide_overlay(&self);
    fn show_badge(&self, badge: BadgeContent);
    fn hide_badge(&self);
}

/// Read-only content metadata service. Any call may fail, be slow, or never matter.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Identity of the acting server + user
    fn scope_stamp(&self) -> ScopeStamp;

    async fn item(&self, id: &ItemId) -> Result<ItemDetails>;

    async fn sessions(&self) -> Result<Vec<SessionInfo>>;

    /// Catalog-wide tag vocabulary
    async fn tag_vocabulary(&self) -> Result<Vec<String>>;

    async fn similar_items(&self, _id: &ItemId, _limit: usize) -> Result<Vec<ItemSummary>> {
        Ok(Vec::new())
    }

    /// Map a technical media-source id to its catalog item
    async fn item_for_media_source(&self, _media_source_id: &str) -> Result<Option<ItemId>> {
        Ok(None)
    }

    /// Drop stored credentials after the server rejected them
    fn clear_credentials(&self) {}
}

/// Lifecycle notifications forwarded by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Pointer, keyboard or touch input
    UserInput,
    FocusChanged { focused: bool },
    VisibilityChanged { hidden: bool },
    /// Hash or route change
    Navigated,
    EscapePressed,
    OverlayClicked { inside_rail: bool },
}

/// Capabilities handed to [`crate::setup`]
#[derive(Clone)]
pub struct Host {
    pub candidates: Arc<dyn CandidateSource>,
    pub preview: Option<Arc<dyn PreviewPredicate>>,
    pub now_playing: Option<Arc<dyn NowPlaying>>,
    pub surface: Arc<dyn OverlaySurface>,
    pub metadata: Arc<dyn MetadataService>,
}

impl Host {
    pub fn new(
        candidates: Arc<dyn CandidateSource>,
        surface: Arc<dyn OverlaySurface>,
        metadata: Arc<dyn MetadataService>,
    ) -> Self {
        Self {
            candidates,
            preview: None,
            now_playing: None,
            surface,
            metadata,
        }
    }

    pub fn with_preview(mut self, preview: Arc<dyn PreviewPredicate>) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn with_now_playing(mut self, now_playing: Arc<dyn NowPlaying>) -> Self {
        self.now_playing = Some(now_playing);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        let terminal: Vec<_> = MediaEvent::BOUND.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![&MediaEvent::Ended, &MediaEvent::Emptied, &MediaEvent::Abort, &MediaEvent::Stalled]
        );
        assert!(!MediaEvent::Pause.is_terminal());
    }
}
