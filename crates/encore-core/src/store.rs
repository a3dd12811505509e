//! Library persistence
//!
//! Serializes the collection as one JSON document with four sections:
//! songs, playlists, playlist dependencies, and clone groups. Load order
//! follows the reference chain (songs first, clone groups last) and a
//! document with dangling references fails as a whole; the caller's
//! current collection is never touched.

use std::fs;
use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };
use thiserror::Error;

use crate::clone::{ CloneGroup, CloneVariant };
use crate::collection::{ Collection, CollectionError };
use crate::playlist::{ Playlist, PlaylistId, Slot };
use crate::track::{ CloneGroupId, TagReader, Track, TrackId };


/// Errors that can occur loading or saving the library document.
#[derive( Debug, Error )]
pub enum StoreError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Invalid library document: {0}" )]
    Json( #[from] serde_json::Error ),

    #[error( "playlist {playlist} references unknown track {track}" )]
    UnknownPlaylistTrack { playlist: PlaylistId, track: TrackId },

    #[error( "dependency entry references unknown playlist {0}" )]
    UnknownPlaylist( PlaylistId ),

    #[error( "clone group {group} references unknown track {track}" )]
    UnknownCloneTrack { group: CloneGroupId, track: TrackId },

    #[error( transparent )]
    Collection( #[from] CollectionError ),
}


#[derive( Debug, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
struct SongRecord {
    id: TrackId,
    path: PathBuf,
    #[serde( default, skip_serializing_if = "Option::is_none" )]
    clone_id: Option<CloneGroupId>,
}


/// A playlist entry is either a plain track id or a nested array of ids
/// (a linked group), preserving slot order.
#[derive( Debug, Serialize, Deserialize )]
#[serde( untagged )]
enum SlotRecord {
    Single( TrackId ),
    Group( Vec<TrackId> ),
}


#[derive( Debug, Serialize, Deserialize )]
struct PlaylistRecord {
    id: PlaylistId,
    name: String,
    songs: Vec<SlotRecord>,
}


#[derive( Debug, Serialize, Deserialize )]
struct DependencyRecord {
    id: PlaylistId,
    upstream: Vec<PlaylistId>,
    downstream: Vec<PlaylistId>,
}


#[derive( Debug, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
struct DistributionRecord {
    song_id: TrackId,
    probability: u32,
}


#[derive( Debug, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
struct CloneGroupRecord {
    id: CloneGroupId,
    song_distributions: Vec<DistributionRecord>,
}


/// The persisted library document.
#[derive( Debug, Default, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
struct Document {
    #[serde( default )]
    songs: Vec<SongRecord>,

    #[serde( default )]
    playlists: Vec<PlaylistRecord>,

    #[serde( default )]
    playlist_dependencies: Vec<DependencyRecord>,

    #[serde( default )]
    cloned_songs: Vec<CloneGroupRecord>,
}


impl Document {
    fn from_collection( collection: &Collection ) -> Self {
        let songs = collection
            .tracks()
            .map( |track| SongRecord {
                id: track.id(),
                path: track.path().to_path_buf(),
                clone_id: track.clone_id(),
            })
            .collect();

        let sorted = collection.playlists_sorted();

        let playlists = sorted
            .iter()
            .map( |playlist| PlaylistRecord {
                id: playlist.id(),
                name: playlist.name().to_string(),
                songs: playlist
                    .slots()
                    .iter()
                    .map( |slot| match slot {
                        Slot::Single( id ) => SlotRecord::Single( *id ),
                        Slot::Group( members ) => SlotRecord::Group( members.clone() ),
                    })
                    .collect(),
            })
            .collect();

        // Dependencies are derived from the live upstream/downstream sets.
        let playlist_dependencies = sorted
            .iter()
            .map( |playlist| DependencyRecord {
                id: playlist.id(),
                upstream: playlist.upstream().iter().copied().collect(),
                downstream: playlist.downstream().iter().copied().collect(),
            })
            .collect();

        let cloned_songs = collection
            .clone_groups()
            .map( |group| CloneGroupRecord {
                id: group.id(),
                song_distributions: group
                    .variants()
                    .iter()
                    .map( |variant| DistributionRecord {
                        song_id: variant.track,
                        probability: variant.weight,
                    })
                    .collect(),
            })
            .collect();

        Self { songs, playlists, playlist_dependencies, cloned_songs }
    }


    fn into_collection( self, reader: &dyn TagReader ) -> Result<Collection, StoreError> {
        let mut collection = Collection::new();

        // Songs first, so everything after can reference them.
        for song in self.songs {
            collection.insert_track( Track::with_id( song.id, song.path, song.clone_id, reader ) );
        }

        for record in self.playlists {
            let mut slots = Vec::with_capacity( record.songs.len() );
            for slot in record.songs {
                match slot {
                    SlotRecord::Single( id ) => {
                        if collection.track( id ).is_none() {
                            return Err( StoreError::UnknownPlaylistTrack {
                                playlist: record.id,
                                track: id,
                            });
                        }
                        slots.push( Slot::Single( id ) );
                    }
                    SlotRecord::Group( members ) => {
                        for id in &members {
                            if collection.track( *id ).is_none() {
                                return Err( StoreError::UnknownPlaylistTrack {
                                    playlist: record.id,
                                    track: *id,
                                });
                            }
                        }
                        slots.push( Slot::Group( members ) );
                    }
                }
            }
            collection.insert_playlist( Playlist::new( record.id, record.name, slots ) )?;
        }

        // Dependencies reference playlists by id; all of them must exist
        // by now.
        for dep in &self.playlist_dependencies {
            if collection.playlist( dep.id ).is_none() {
                return Err( StoreError::UnknownPlaylist( dep.id ) );
            }
            for id in dep.upstream.iter().chain( &dep.downstream ) {
                if collection.playlist( *id ).is_none() {
                    return Err( StoreError::UnknownPlaylist( *id ) );
                }
            }
        }
        for dep in self.playlist_dependencies {
            if let Some( playlist ) = collection.playlist_mut( dep.id ) {
                for id in dep.downstream {
                    playlist.insert_downstream( id );
                }
                for id in dep.upstream {
                    playlist.insert_upstream( id );
                }
            }
        }

        for group in self.cloned_songs {
            let mut variants = Vec::with_capacity( group.song_distributions.len() );
            for dist in group.song_distributions {
                if collection.track( dist.song_id ).is_none() {
                    return Err( StoreError::UnknownCloneTrack {
                        group: group.id,
                        track: dist.song_id,
                    });
                }
                variants.push( CloneVariant { track: dist.song_id, weight: dist.probability } );
            }
            collection.insert_clone_group( CloneGroup::new( group.id, variants ) );
        }

        Ok( collection )
    }
}


/// Loads the library from disk. A missing or empty file is a new, empty
/// library; a malformed document is an error and leaves the caller's
/// state untouched.
pub fn load( path: &Path, reader: &dyn TagReader ) -> Result<Collection, StoreError> {
    if !path.exists() {
        tracing::info!( "No library file at {:?}, starting empty", path );
        return Ok( Collection::new() );
    }

    let contents = fs::read_to_string( path )?;
    if contents.trim().is_empty() {
        return Ok( Collection::new() );
    }

    let document: Document = serde_json::from_str( &contents )?;
    let collection = document.into_collection( reader )?;

    tracing::info!(
        "Loaded {} tracks, {} playlists",
        collection.track_count(),
        collection.playlist_count()
    );
    Ok( collection )
}


/// Saves the library to disk, creating parent directories if needed.
pub fn save( collection: &Collection, path: &Path ) -> Result<(), StoreError> {
    if let Some( parent ) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all( parent )?;
        }
    }

    let document = Document::from_collection( collection );
    let json = serde_json::to_string_pretty( &document )?;
    fs::write( path, json )?;

    tracing::info!( "Saved library to {:?}", path );
    Ok(())
}


#[cfg( test )]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use crate::track::NullTagReader;

    use super::*;


    fn sample_collection() -> ( Collection, Vec<TrackId>, Vec<PlaylistId> ) {
        let mut collection = Collection::new();

        let mut tracks = Vec::new();
        for i in 0..4 {
            let clone_id = if i == 3 { Some( Uuid::new_v4() ) } else { None };
            let track = Track::with_id(
                Uuid::new_v4(),
                PathBuf::from( format!( "/music/{i}.mp3" ) ),
                clone_id,
                &NullTagReader,
            );
            tracks.push( track.id() );
            collection.insert_track( track );
        }

        let mut favorites = Playlist::from_tracks( "favorites", tracks[ ..3 ].to_vec() );
        favorites.link_songs( &[0, 2] ).unwrap();
        let extras = Playlist::from_tracks( "extras", vec![tracks[ 3 ]] );
        let ( fav_id, extras_id ) = ( favorites.id(), extras.id() );
        collection.insert_playlist( favorites ).unwrap();
        collection.insert_playlist( extras ).unwrap();
        assert!( collection.add_downstream_to_playlist( fav_id, extras_id ).unwrap() );

        collection.insert_clone_group( CloneGroup::new(
            Uuid::new_v4(),
            vec![
                CloneVariant { track: tracks[ 0 ], weight: 3 },
                CloneVariant { track: tracks[ 1 ], weight: 0 },
            ],
        ));

        ( collection, tracks, vec![fav_id, extras_id] )
    }


    #[test]
    fn test_round_trip_preserves_sequences_and_edges() {
        let ( collection, _, playlist_ids ) = sample_collection();

        let json = serde_json::to_string_pretty( &Document::from_collection( &collection ) ).unwrap();
        let document: Document = serde_json::from_str( &json ).unwrap();
        let reloaded = document.into_collection( &NullTagReader ).unwrap();

        for id in playlist_ids {
            let before = collection.playlist( id ).unwrap();
            let after = reloaded.playlist( id ).unwrap();

            assert_eq!( before.name(), after.name() );
            assert_eq!( before.slots(), after.slots() );
            assert_eq!( before.upstream(), after.upstream() );
            assert_eq!( before.downstream(), after.downstream() );
            assert_eq!(
                collection.flattened_with_downstream( before ),
                reloaded.flattened_with_downstream( after )
            );
        }

        assert_eq!( collection.track_count(), reloaded.track_count() );
        assert_eq!(
            collection.clone_groups().count(),
            reloaded.clone_groups().count()
        );
    }


    #[test]
    fn test_document_shape_matches_the_settings_format() {
        let ( collection, _, _ ) = sample_collection();
        let json = serde_json::to_string( &Document::from_collection( &collection ) ).unwrap();
        let value: serde_json::Value = serde_json::from_str( &json ).unwrap();

        assert!( value.get( "songs" ).unwrap().is_array() );
        assert!( value.get( "playlists" ).unwrap().is_array() );
        assert!( value.get( "playlistDependencies" ).unwrap().is_array() );
        assert!( value.get( "clonedSongs" ).unwrap().is_array() );

        // Tracks without a clone group must omit the key entirely.
        let songs = value[ "songs" ].as_array().unwrap();
        assert!( songs[ 0 ].get( "cloneId" ).is_none() );
        assert!( songs[ 3 ].get( "cloneId" ).is_some() );

        // Linked groups serialize as nested id arrays among plain ids.
        let favorites = value[ "playlists" ]
            .as_array()
            .unwrap()
            .iter()
            .find( |p| p[ "name" ] == "favorites" )
            .unwrap();
        let slots = favorites[ "songs" ].as_array().unwrap();
        assert!( slots.iter().any( |s| s.is_string() ) );
        assert!( slots.iter().any( |s| s.is_array() ) );

        let clone = &value[ "clonedSongs" ].as_array().unwrap()[ 0 ];
        let dist = &clone[ "songDistributions" ].as_array().unwrap()[ 0 ];
        assert!( dist.get( "songId" ).is_some() );
        assert!( dist.get( "probability" ).is_some() );
    }


    #[test]
    fn test_dangling_playlist_track_fails_the_load() {
        let document = Document {
            playlists: vec![PlaylistRecord {
                id: Uuid::new_v4(),
                name: "broken".into(),
                songs: vec![SlotRecord::Single( Uuid::new_v4() )],
            }],
            ..Default::default()
        };

        assert!( matches!(
            document.into_collection( &NullTagReader ),
            Err( StoreError::UnknownPlaylistTrack { .. } )
        ));
    }


    #[test]
    fn test_dependency_on_unknown_playlist_fails_the_load() {
        let id = Uuid::new_v4();
        let document = Document {
            playlists: vec![PlaylistRecord { id, name: "p".into(), songs: Vec::new() }],
            playlist_dependencies: vec![DependencyRecord {
                id,
                upstream: Vec::new(),
                downstream: vec![Uuid::new_v4()],
            }],
            ..Default::default()
        };

        assert!( matches!(
            document.into_collection( &NullTagReader ),
            Err( StoreError::UnknownPlaylist( _ ) )
        ));
    }


    #[test]
    fn test_missing_file_loads_empty() {
        let path = std::env::temp_dir().join( format!( "encore-store-{}.json", Uuid::new_v4() ) );
        let collection = load( &path, &NullTagReader ).unwrap();
        assert_eq!( collection.track_count(), 0 );
        assert_eq!( collection.playlist_count(), 0 );
    }


    #[test]
    fn test_save_then_load_round_trips_on_disk() {
        let ( collection, _, playlist_ids ) = sample_collection();
        let path = std::env::temp_dir().join( format!( "encore-store-{}.json", Uuid::new_v4() ) );

        save( &collection, &path ).unwrap();
        let reloaded = load( &path, &NullTagReader ).unwrap();

        for id in playlist_ids {
            assert_eq!(
                collection.playlist( id ).unwrap().slots(),
                reloaded.playlist( id ).unwrap().slots()
            );
        }

        std::fs::remove_file( &path ).unwrap();
    }
}
