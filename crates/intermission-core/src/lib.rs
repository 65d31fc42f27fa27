//! Intermission Core - Playback Lifecycle Monitor
//!
//! This crate watches a media element hosted by a web media client and:
//! - shows an information overlay when playback is paused
//! - shows a short "content descriptor" badge shortly after playback starts
//! - auto-pauses playback when nobody seems to be watching (smart pause)
//! - classifies catalog items into content descriptors and age chips
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Intermission Core                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │  Discovery   │  │   Identity   │  │  Descriptor  │           │
//! │  │   & Binder   │  │   Resolver   │  │  Classifier  │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │                              │
//! │                    │   Machine   │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │ Smart Pause  │  │   Overlay   │  │   Metadata   │            │
//! │  │   Policy     │  │  & Badge    │  │    Cache     │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! │                                                                 │
//! │            everything deferred lives in a ResourceScope         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The host supplies its capabilities through [`Host`]; [`setup`] returns a
//! [`Monitor`] whose [`Monitor::destroy`] releases every timer, listener and
//! observer.

pub mod binding;
pub mod cache;
pub mod classifier;
#[cfg(feature = "http")]
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod monitor;
pub mod overlay;
pub mod playback;
pub mod scope;
pub mod smart_pause;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
pub use cache::{MetadataCache, TtlCache};
pub use classifier::{age_chip, normalize_rating, ClassificationResult, Classifier, Descriptor, DescriptorEngine};
#[cfg(feature = "http")]
pub use client::HttpMetadataService;
pub use config::{Labels, MonitorConfig, SmartPauseConfig};
pub use host::{Host, HostEvent, MediaElement, MediaEvent, MetadataService, OverlaySurface};
pub use monitor::{setup, Monitor, MonitorSlot};
pub use overlay::{BadgeContent, OverlayContent};
pub use scope::ResourceScope;
pub use smart_pause::{PolicyDecision, SmartPausePolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at host start-up
pub fn init() {
    tracing::info!(version = VERSION, "Intermission Core initialized");
}
