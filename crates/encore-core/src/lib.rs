//! Encore Core - Music library engine
//!
//! This crate provides the core functionality for the Encore library
//! manager: track registration, playlists with linked-track groups, the
//! playlist dependency graph, clone-group resolution, playback driving,
//! and library persistence.

pub mod clone;
pub mod collection;
pub mod command;
pub mod decoder;
pub mod library;
pub mod mixer;
pub mod output;
pub mod player;
pub mod playlist;
pub mod store;
pub mod track;

pub use clone::{ CloneError, CloneGroup, CloneVariant };
pub use collection::{ Collection, CollectionError };
pub use command::{ command_channel, CommandError, PlaybackCommand };
pub use decoder::SymphoniaTagReader;
pub use mixer::Mixer;
pub use player::{ AudioBackend, PlaybackSession, PlayerError, TrackHook };
pub use playlist::{ Playlist, PlaylistError, PlaylistId, Slot };
pub use track::{ CloneGroupId, NullTagReader, TagReader, Track, TrackId, TrackTags };
