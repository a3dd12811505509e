//! Music collection
//!
//! The owning registry for tracks, playlists, and clone groups. Every
//! cross-entity operation lives here: path registration with dedup,
//! playlist lifecycle (unique names, auto-delete-on-empty), and the
//! upstream/downstream dependency graph with its disjointness invariant.

use std::collections::{ BTreeMap, HashMap, HashSet };
use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::clone::CloneGroup;
use crate::library::{ self, LibraryError };
use crate::playlist::{ Playlist, PlaylistError, PlaylistId, Slot };
use crate::track::{ CloneGroupId, TagReader, Track, TrackId };


/// Errors that can occur with collection operations.
#[derive( Debug, Error )]
pub enum CollectionError {
    /// Recoverable user mistake: playlist names are unique.
    #[error( "a playlist named \"{0}\" already exists" )]
    DuplicateName( String ),

    /// Logic error: the caller holds an id the registry doesn't know.
    #[error( "playlist {0} does not exist" )]
    UnknownPlaylist( PlaylistId ),

    #[error( transparent )]
    Playlist( #[from] PlaylistError ),

    #[error( transparent )]
    Library( #[from] LibraryError ),
}


/// The in-memory music library: tracks, playlists, and clone groups.
#[derive( Debug, Default )]
pub struct Collection {
    tracks: HashMap<TrackId, Track>,
    // Registration order, for stable listings and save output.
    track_order: Vec<TrackId>,
    // Absolute paths already registered, to reject duplicates.
    paths: HashSet<PathBuf>,
    playlists: HashMap<PlaylistId, Playlist>,
    playlist_names: HashSet<String>,
    clone_groups: BTreeMap<CloneGroupId, CloneGroup>,
}


impl Collection {
    pub fn new() -> Self {
        Self::default()
    }


    // ---- tracks ----------------------------------------------------------

    pub fn track( &self, id: TrackId ) -> Option<&Track> {
        self.tracks.get( &id )
    }


    /// All tracks in registration order.
    pub fn tracks( &self ) -> impl Iterator<Item = &Track> {
        self.track_order.iter().filter_map( |id| self.tracks.get( id ) )
    }


    pub fn track_count( &self ) -> usize {
        self.track_order.len()
    }


    /// Registers the audio files at `path`: the file itself, or the
    /// immediate entries of a directory. Files whose absolute path is
    /// already registered are skipped. Returns the newly added track ids.
    pub fn add_songs_from_path(
        &mut self,
        path: &Path,
        reader: &dyn TagReader,
    ) -> Result<Vec<TrackId>, CollectionError> {
        let mut added = Vec::new();

        for file in library::collect_audio_files( path )? {
            let absolute = std::fs::canonicalize( &file ).unwrap_or( file );
            if self.paths.contains( &absolute ) {
                tracing::debug!( "Already registered, skipping: {:?}", absolute );
                continue;
            }

            let track = Track::new( absolute, None, reader );
            tracing::info!( "Registered {:?}", track.path() );
            added.push( track.id() );
            self.insert_track( track );
        }

        Ok( added )
    }


    /// Inserts a fully formed track record (loading persisted state).
    pub(crate) fn insert_track( &mut self, track: Track ) {
        self.paths.insert( track.path().to_path_buf() );
        self.track_order.push( track.id() );
        self.tracks.insert( track.id(), track );
    }


    // ---- playlists -------------------------------------------------------

    pub fn playlist( &self, id: PlaylistId ) -> Option<&Playlist> {
        self.playlists.get( &id )
    }


    pub fn playlist_mut( &mut self, id: PlaylistId ) -> Option<&mut Playlist> {
        self.playlists.get_mut( &id )
    }


    /// All playlists, sorted by display name.
    pub fn playlists_sorted( &self ) -> Vec<&Playlist> {
        let mut playlists: Vec<&Playlist> = self.playlists.values().collect();
        playlists.sort_by( |a, b| a.name().cmp( b.name() ) );
        playlists
    }


    pub fn playlist_count( &self ) -> usize {
        self.playlists.len()
    }


    pub fn has_playlist( &self, name: &str ) -> bool {
        self.playlist_names.contains( name )
    }


    /// Creates a playlist of single-track slots. Empty playlists are
    /// valid at creation time.
    pub fn create_playlist(
        &mut self,
        name: &str,
        tracks: Vec<TrackId>,
    ) -> Result<PlaylistId, CollectionError> {
        let playlist = Playlist::from_tracks( name, tracks );
        let id = playlist.id();
        self.insert_playlist( playlist )?;
        tracing::info!( "Created playlist \"{}\"", name );
        Ok( id )
    }


    /// Inserts a fully formed playlist (creation or persisted state).
    pub(crate) fn insert_playlist( &mut self, playlist: Playlist ) -> Result<(), CollectionError> {
        if self.playlist_names.contains( playlist.name() ) {
            return Err( CollectionError::DuplicateName( playlist.name().to_string() ) );
        }
        self.playlist_names.insert( playlist.name().to_string() );
        self.playlists.insert( playlist.id(), playlist );
        Ok(())
    }


    pub fn rename_playlist( &mut self, id: PlaylistId, new_name: &str ) -> Result<(), CollectionError> {
        let old_name = self
            .playlists
            .get( &id )
            .ok_or( CollectionError::UnknownPlaylist( id ) )?
            .name()
            .to_string();
        if old_name == new_name {
            return Ok(());
        }
        if self.playlist_names.contains( new_name ) {
            return Err( CollectionError::DuplicateName( new_name.to_string() ) );
        }

        self.playlist_names.remove( &old_name );
        self.playlist_names.insert( new_name.to_string() );
        if let Some( playlist ) = self.playlists.get_mut( &id ) {
            playlist.set_name( new_name.to_string() );
        }

        tracing::info!( "Renamed playlist \"{}\" to \"{}\"", old_name, new_name );
        Ok(())
    }


    /// Deletes a playlist and strips its id from every other playlist's
    /// upstream/downstream sets, so the registry never carries dangling
    /// edges. Deleting an unknown id is a logic error.
    pub fn delete_playlist( &mut self, id: PlaylistId ) -> Result<(), CollectionError> {
        let playlist = self
            .playlists
            .remove( &id )
            .ok_or( CollectionError::UnknownPlaylist( id ) )?;
        self.playlist_names.remove( playlist.name() );

        for other in self.playlists.values_mut() {
            other.remove_edges_to( id );
        }

        tracing::info!( "Deleted playlist \"{}\"", playlist.name() );
        Ok(())
    }


    /// Removes the track at `flat_idx` of the playlist's flattened view.
    ///
    /// A playlist whose last track is removed is deleted outright; the
    /// second element of the result reports whether that happened.
    pub fn remove_song_from_playlist(
        &mut self,
        id: PlaylistId,
        flat_idx: usize,
    ) -> Result<( TrackId, bool ), CollectionError> {
        let playlist = self
            .playlists
            .get_mut( &id )
            .ok_or( CollectionError::UnknownPlaylist( id ) )?;
        let removed = playlist.remove_song( flat_idx )?;

        let emptied = playlist.is_empty();
        if emptied {
            self.delete_playlist( id )?;
        }

        Ok(( removed, emptied ))
    }


    // ---- dependency graph ------------------------------------------------

    /// A candidate may join either side of a playlist's relation only if it
    /// is on neither side already and is not the playlist itself.
    pub fn validate_for_stream( &self, playlist: &Playlist, candidate: PlaylistId ) -> bool {
        candidate != playlist.id()
            && !playlist.downstream().contains( &candidate )
            && !playlist.upstream().contains( &candidate )
    }


    /// Adds `downstream` (and, eagerly, all of its existing downstream
    /// playlists) as direct downstream entries of `playlist`.
    ///
    /// Every id in the chain is validated against `playlist` before any
    /// edge is committed; a single conflict fails the whole operation and
    /// leaves both playlists untouched.
    pub fn add_downstream_to_playlist(
        &mut self,
        playlist: PlaylistId,
        downstream: PlaylistId,
    ) -> Result<bool, CollectionError> {
        let ids_to_add = {
            let target = self
                .playlists
                .get( &playlist )
                .ok_or( CollectionError::UnknownPlaylist( playlist ) )?;
            let candidate = self
                .playlists
                .get( &downstream )
                .ok_or( CollectionError::UnknownPlaylist( downstream ) )?;

            if !self.validate_for_stream( target, downstream ) {
                return Ok( false );
            }

            let mut ids = vec![downstream];
            for &id in candidate.downstream() {
                if !self.validate_for_stream( target, id ) {
                    return Ok( false );
                }
                ids.push( id );
            }
            ids
        };

        if let Some( target ) = self.playlists.get_mut( &playlist ) {
            for id in ids_to_add {
                target.insert_downstream( id );
            }
        }

        tracing::debug!( "Playlist {} gained downstream {}", playlist, downstream );
        Ok( true )
    }


    /// Mirror of [`Self::add_downstream_to_playlist`] for the upstream
    /// side: `upstream` and all of its existing upstream playlists become
    /// direct upstream entries of `playlist`.
    pub fn add_upstream_to_playlist(
        &mut self,
        playlist: PlaylistId,
        upstream: PlaylistId,
    ) -> Result<bool, CollectionError> {
        let ids_to_add = {
            let target = self
                .playlists
                .get( &playlist )
                .ok_or( CollectionError::UnknownPlaylist( playlist ) )?;
            let candidate = self
                .playlists
                .get( &upstream )
                .ok_or( CollectionError::UnknownPlaylist( upstream ) )?;

            if !self.validate_for_stream( target, upstream ) {
                return Ok( false );
            }

            let mut ids = vec![upstream];
            for &id in candidate.upstream() {
                if !self.validate_for_stream( target, id ) {
                    return Ok( false );
                }
                ids.push( id );
            }
            ids
        };

        if let Some( target ) = self.playlists.get_mut( &playlist ) {
            for id in ids_to_add {
                target.insert_upstream( id );
            }
        }

        tracing::debug!( "Playlist {} gained upstream {}", playlist, upstream );
        Ok( true )
    }


    // ---- playback views --------------------------------------------------

    /// The playlist's flattened sequence followed by each immediate
    /// downstream playlist's flattened slot list, in downstream-set
    /// iteration order. Downstream playlists are expanded one level only;
    /// their own downstream chains are not followed.
    pub fn flattened_with_downstream( &self, playlist: &Playlist ) -> Vec<TrackId> {
        let mut songs = playlist.flattened_songs();
        for id in playlist.downstream() {
            if let Some( downstream ) = self.playlists.get( id ) {
                songs.extend( downstream.flattened_songs() );
            }
        }
        songs
    }


    /// The slot pool a shuffle pass permutes: the playlist's own top-level
    /// slots plus each immediate downstream playlist's top-level slots,
    /// not pre-flattened, so linked groups stay atomic.
    pub fn shuffle_pool( &self, playlist: &Playlist ) -> Vec<Slot> {
        let mut slots = playlist.slots().to_vec();
        for id in playlist.downstream() {
            if let Some( downstream ) = self.playlists.get( id ) {
                slots.extend_from_slice( downstream.slots() );
            }
        }
        slots
    }


    // ---- clone groups ----------------------------------------------------

    pub fn clone_group( &self, id: CloneGroupId ) -> Option<&CloneGroup> {
        self.clone_groups.get( &id )
    }


    pub fn clone_groups( &self ) -> impl Iterator<Item = &CloneGroup> {
        self.clone_groups.values()
    }


    pub(crate) fn insert_clone_group( &mut self, group: CloneGroup ) {
        self.clone_groups.insert( group.id(), group );
    }
}


#[cfg( test )]
mod tests {
    use std::fs;

    use uuid::Uuid;

    use crate::track::NullTagReader;

    use super::*;


    fn collection_with_playlists( names: &[&str] ) -> ( Collection, Vec<PlaylistId> ) {
        let mut collection = Collection::new();
        let ids = names
            .iter()
            .map( |name| collection.create_playlist( name, Vec::new() ).unwrap() )
            .collect();
        ( collection, ids )
    }


    #[test]
    fn test_duplicate_playlist_name_is_rejected() {
        let ( mut collection, _ ) = collection_with_playlists( &["mix"] );
        assert!( matches!(
            collection.create_playlist( "mix", Vec::new() ),
            Err( CollectionError::DuplicateName( _ ) )
        ));
    }


    #[test]
    fn test_rename_checks_uniqueness() {
        let ( mut collection, ids ) = collection_with_playlists( &["a", "b"] );
        assert!( matches!(
            collection.rename_playlist( ids[ 0 ], "b" ),
            Err( CollectionError::DuplicateName( _ ) )
        ));

        collection.rename_playlist( ids[ 0 ], "c" ).unwrap();
        assert!( collection.has_playlist( "c" ) );
        assert!( !collection.has_playlist( "a" ) );
    }


    #[test]
    fn test_downstream_conflict_fails_atomically() {
        let ( mut collection, ids ) = collection_with_playlists( &["p", "d"] );
        let ( p, d ) = ( ids[ 0 ], ids[ 1 ] );

        // d is upstream of p, so it cannot also become downstream.
        assert!( collection.add_upstream_to_playlist( p, d ).unwrap() );
        assert!( !collection.add_downstream_to_playlist( p, d ).unwrap() );

        let playlist = collection.playlist( p ).unwrap();
        assert!( playlist.downstream().is_empty() );
        assert_eq!( playlist.upstream().len(), 1 );
    }


    #[test]
    fn test_transitive_conflict_commits_nothing() {
        let ( mut collection, ids ) = collection_with_playlists( &["p", "d", "e"] );
        let ( p, d, e ) = ( ids[ 0 ], ids[ 1 ], ids[ 2 ] );

        // d's downstream set contains e, and e is already upstream of p:
        // adding d must fail without committing d either.
        assert!( collection.add_downstream_to_playlist( d, e ).unwrap() );
        assert!( collection.add_upstream_to_playlist( p, e ).unwrap() );

        assert!( !collection.add_downstream_to_playlist( p, d ).unwrap() );
        assert!( collection.playlist( p ).unwrap().downstream().is_empty() );
    }


    #[test]
    fn test_downstream_flattens_one_transitive_level() {
        let ( mut collection, ids ) = collection_with_playlists( &["p", "d", "e"] );
        let ( p, d, e ) = ( ids[ 0 ], ids[ 1 ], ids[ 2 ] );

        assert!( collection.add_downstream_to_playlist( d, e ).unwrap() );
        assert!( collection.add_downstream_to_playlist( p, d ).unwrap() );

        let downstream = collection.playlist( p ).unwrap().downstream();
        assert!( downstream.contains( &d ) );
        assert!( downstream.contains( &e ) );
        assert_eq!( downstream.len(), 2 );
    }


    #[test]
    fn test_upstream_insertion_mutates_state() {
        let ( mut collection, ids ) = collection_with_playlists( &["p", "u", "v"] );
        let ( p, u, v ) = ( ids[ 0 ], ids[ 1 ], ids[ 2 ] );

        assert!( collection.add_upstream_to_playlist( u, v ).unwrap() );
        assert!( collection.add_upstream_to_playlist( p, u ).unwrap() );

        let upstream = collection.playlist( p ).unwrap().upstream();
        assert!( upstream.contains( &u ) );
        assert!( upstream.contains( &v ) );
    }


    #[test]
    fn test_self_loop_is_rejected() {
        let ( mut collection, ids ) = collection_with_playlists( &["p"] );
        assert!( !collection.add_downstream_to_playlist( ids[ 0 ], ids[ 0 ] ).unwrap() );
        assert!( !collection.add_upstream_to_playlist( ids[ 0 ], ids[ 0 ] ).unwrap() );
    }


    #[test]
    fn test_unknown_playlist_is_a_logic_error() {
        let ( mut collection, ids ) = collection_with_playlists( &["p"] );
        assert!( matches!(
            collection.add_downstream_to_playlist( ids[ 0 ], Uuid::new_v4() ),
            Err( CollectionError::UnknownPlaylist( _ ) )
        ));
        assert!( matches!(
            collection.delete_playlist( Uuid::new_v4() ),
            Err( CollectionError::UnknownPlaylist( _ ) )
        ));
    }


    #[test]
    fn test_delete_strips_edges_from_other_playlists() {
        let ( mut collection, ids ) = collection_with_playlists( &["p", "d"] );
        let ( p, d ) = ( ids[ 0 ], ids[ 1 ] );

        assert!( collection.add_downstream_to_playlist( p, d ).unwrap() );
        collection.delete_playlist( d ).unwrap();

        assert!( collection.playlist( p ).unwrap().downstream().is_empty() );
    }


    #[test]
    fn test_removing_last_track_deletes_the_playlist() {
        let mut collection = Collection::new();
        let track = Uuid::new_v4();
        let playlist = Playlist::from_tracks( "solo", vec![track] );
        let id = playlist.id();
        collection.insert_playlist( playlist ).unwrap();

        let ( removed, deleted ) = collection.remove_song_from_playlist( id, 0 ).unwrap();

        assert_eq!( removed, track );
        assert!( deleted );
        assert!( collection.playlist( id ).is_none() );
        assert!( !collection.has_playlist( "solo" ) );
    }


    #[test]
    fn test_flattened_with_downstream_is_one_level_deep() {
        let mut collection = Collection::new();
        let ( a, b, c ) = ( Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4() );

        let upstream = Playlist::from_tracks( "up", vec![a] );
        let middle = Playlist::from_tracks( "mid", vec![b] );
        let deep = Playlist::from_tracks( "deep", vec![c] );
        let ( up_id, mid_id, deep_id ) = ( upstream.id(), middle.id(), deep.id() );

        collection.insert_playlist( upstream ).unwrap();
        collection.insert_playlist( middle ).unwrap();
        collection.insert_playlist( deep ).unwrap();

        // mid -> deep exists before up -> mid, so up's eager flattening
        // already carries deep; the per-call expansion itself must not
        // recurse past the direct downstream slot lists.
        assert!( collection.add_downstream_to_playlist( mid_id, deep_id ).unwrap() );

        let mid = collection.playlist( mid_id ).unwrap();
        let flattened = collection.flattened_with_downstream( mid );
        assert_eq!( flattened, vec![b, c] );

        assert!( collection.add_downstream_to_playlist( up_id, mid_id ).unwrap() );
        let up = collection.playlist( up_id ).unwrap();
        let mut expected = vec![a];
        // Downstream-set iteration order.
        for id in up.downstream() {
            expected.extend( collection.playlist( *id ).unwrap().flattened_songs() );
        }
        assert_eq!( collection.flattened_with_downstream( up ), expected );
    }


    #[test]
    fn test_path_registration_dedupes() {
        let dir = std::env::temp_dir().join( format!( "encore-collection-{}", Uuid::new_v4() ) );
        fs::create_dir_all( &dir ).unwrap();
        fs::write( dir.join( "one.mp3" ), b"" ).unwrap();
        fs::write( dir.join( "two.mp3" ), b"" ).unwrap();

        let mut collection = Collection::new();
        let first = collection.add_songs_from_path( &dir, &NullTagReader ).unwrap();
        assert_eq!( first.len(), 2 );

        let second = collection.add_songs_from_path( &dir, &NullTagReader ).unwrap();
        assert!( second.is_empty() );
        assert_eq!( collection.track_count(), 2 );

        fs::remove_dir_all( &dir ).unwrap();
    }
}
