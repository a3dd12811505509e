//! Playlists
//!
//! A playlist is an ordered list of slots. A slot is either a single track
//! or a linked group of tracks that always plays back to back. Membership
//! is mirrored in a per-track occurrence count so containment checks stay
//! O(1) even with tracks nested inside linked groups.

use std::collections::{ BTreeSet, HashMap };
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };

use thiserror::Error;
use uuid::Uuid;

use crate::track::TrackId;


/// Stable identifier of a playlist.
pub type PlaylistId = Uuid;


/// Errors that can occur with playlist operations.
#[derive( Debug, Error )]
pub enum PlaylistError {
    /// Bookkeeping invariant violation: the membership map has no entry for
    /// a track that was just removed from a slot.
    #[error( "track {0} is not tracked by the playlist's membership map" )]
    UntrackedSong( TrackId ),

    #[error( "song index {0} is out of range" )]
    IndexOutOfRange( usize ),

    #[error( "linking requires at least two distinct single-track slots" )]
    NotEnoughLinks,

    #[error( "slot {0} is already part of a linked group" )]
    AlreadyLinked( usize ),
}


/// One positional entry in a playlist.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum Slot {
    /// A single track.
    Single( TrackId ),

    /// A linked group: ≥ 2 tracks that always play consecutively, in
    /// stored order.
    Group( Vec<TrackId> ),
}


impl Slot {
    /// Number of tracks in this slot.
    pub fn len( &self ) -> usize {
        match self {
            Slot::Single( _ ) => 1,
            Slot::Group( members ) => members.len(),
        }
    }


    /// Iterates the track ids in this slot, in stored order.
    pub fn track_ids( &self ) -> impl Iterator<Item = TrackId> + '_ {
        match self {
            Slot::Single( id ) => std::slice::from_ref( id ).iter().copied(),
            Slot::Group( members ) => members.iter().copied(),
        }
    }
}


/// Where a flattened index landed inside the slot list.
enum RemoveTarget {
    Single( usize ),
    GroupMember( usize, usize ),
}


/// An ordered collection of single-track and linked-group slots.
#[derive( Debug )]
pub struct Playlist {
    id: PlaylistId,
    name: String,
    slots: Vec<Slot>,
    // Occurrences per track across all slots, group members included.
    song_counts: HashMap<TrackId, usize>,
    // Transient playback flag, shared with the playback driver.
    playing: Arc<AtomicBool>,
    upstream: BTreeSet<PlaylistId>,
    downstream: BTreeSet<PlaylistId>,
}


impl Playlist {
    /// Creates a playlist from an existing slot list (loading persisted
    /// state). Membership counts are derived from the slots.
    pub fn new( id: PlaylistId, name: impl Into<String>, slots: Vec<Slot> ) -> Self {
        let mut song_counts = HashMap::new();
        for slot in &slots {
            for track in slot.track_ids() {
                *song_counts.entry( track ).or_insert( 0 ) += 1;
            }
        }

        Self {
            id,
            name: name.into(),
            slots,
            song_counts,
            playing: Arc::new( AtomicBool::new( false ) ),
            upstream: BTreeSet::new(),
            downstream: BTreeSet::new(),
        }
    }


    /// Creates a playlist of single-track slots with a fresh identifier.
    pub fn from_tracks( name: impl Into<String>, tracks: Vec<TrackId> ) -> Self {
        let slots = tracks.into_iter().map( Slot::Single ).collect();
        Self::new( Uuid::new_v4(), name, slots )
    }


    pub fn id( &self ) -> PlaylistId {
        self.id
    }


    pub fn name( &self ) -> &str {
        &self.name
    }


    pub(crate) fn set_name( &mut self, name: String ) {
        self.name = name;
    }


    pub fn slots( &self ) -> &[Slot] {
        &self.slots
    }


    /// True when the playlist has no slots left.
    pub fn is_empty( &self ) -> bool {
        self.slots.is_empty()
    }


    /// Number of tracks in the flattened view.
    pub fn song_total( &self ) -> usize {
        self.slots.iter().map( Slot::len ).sum()
    }


    /// O(1) containment check, counting tracks inside linked groups.
    pub fn contains_song( &self, track: TrackId ) -> bool {
        self.song_counts.contains_key( &track )
    }


    /// Occurrence count for a track across all slots.
    pub fn song_count( &self, track: TrackId ) -> usize {
        self.song_counts.get( &track ).copied().unwrap_or( 0 )
    }


    /// Appends a single-track slot. Duplicate checking is the caller's
    /// responsibility; the same track may occupy several slots.
    pub fn add_song( &mut self, track: TrackId ) {
        self.slots.push( Slot::Single( track ) );
        *self.song_counts.entry( track ).or_insert( 0 ) += 1;
    }


    /// Removes the track at `flat_idx` in the flattened view.
    ///
    /// If the removal leaves a linked group with exactly one member, the
    /// group slot is replaced in place by a plain single-track slot.
    pub fn remove_song( &mut self, flat_idx: usize ) -> Result<TrackId, PlaylistError> {
        let mut pos = 0;
        let mut target = None;

        for ( slot_idx, slot ) in self.slots.iter().enumerate() {
            match slot {
                Slot::Single( _ ) => {
                    if pos == flat_idx {
                        target = Some( RemoveTarget::Single( slot_idx ) );
                        break;
                    }
                    pos += 1;
                }
                Slot::Group( members ) => {
                    if flat_idx < pos + members.len() {
                        target = Some( RemoveTarget::GroupMember( slot_idx, flat_idx - pos ) );
                        break;
                    }
                    pos += members.len();
                }
            }
        }

        let removed = match target {
            Some( RemoveTarget::Single( slot_idx ) ) => {
                match self.slots.remove( slot_idx ) {
                    Slot::Single( id ) => id,
                    Slot::Group( _ ) => unreachable!(),
                }
            }
            Some( RemoveTarget::GroupMember( slot_idx, member_idx ) ) => {
                let ( id, collapse ) = match self.slots.get_mut( slot_idx ) {
                    Some( Slot::Group( members ) ) => {
                        let id = members.remove( member_idx );
                        ( id, ( members.len() == 1 ).then( || members[ 0 ] ) )
                    }
                    _ => unreachable!(),
                };
                // A "group" of one is not a valid linked group.
                if let Some( only ) = collapse {
                    self.slots[ slot_idx ] = Slot::Single( only );
                }
                id
            }
            None => return Err( PlaylistError::IndexOutOfRange( flat_idx ) ),
        };

        self.remove_from_counts( removed )?;
        Ok( removed )
    }


    /// Top-level slot indices that can still be linked, i.e. single-track
    /// slots. Already-linked slots are excluded.
    pub fn linkable_songs( &self ) -> Vec<( TrackId, usize )> {
        self.slots
            .iter()
            .enumerate()
            .filter_map( |( idx, slot )| match slot {
                Slot::Single( id ) => Some(( *id, idx )),
                Slot::Group( _ ) => None,
            })
            .collect()
    }


    /// Links ≥ 2 single-track slots into one linked group.
    ///
    /// Indices refer to the top-level slot list. Members are collected in
    /// their stored slot order regardless of the order the indices were
    /// supplied in, and the original slots are removed highest-first so
    /// earlier removals don't shift later indices.
    pub fn link_songs( &mut self, indices: &[usize] ) -> Result<(), PlaylistError> {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() < 2 {
            return Err( PlaylistError::NotEnoughLinks );
        }

        for &idx in &sorted {
            match self.slots.get( idx ) {
                Some( Slot::Single( _ ) ) => {}
                Some( Slot::Group( _ ) ) => return Err( PlaylistError::AlreadyLinked( idx ) ),
                None => return Err( PlaylistError::IndexOutOfRange( idx ) ),
            }
        }

        let members: Vec<TrackId> = sorted
            .iter()
            .map( |&idx| match self.slots[ idx ] {
                Slot::Single( id ) => id,
                Slot::Group( _ ) => unreachable!(),
            })
            .collect();

        self.slots.push( Slot::Group( members ) );

        for &idx in sorted.iter().rev() {
            self.slots.remove( idx );
        }

        Ok(())
    }


    /// The ordered track sequence with every linked group expanded in
    /// place.
    pub fn flattened_songs( &self ) -> Vec<TrackId> {
        self.slots.iter().flat_map( Slot::track_ids ).collect()
    }


    /// Shared playback flag. The playback driver sets it for the duration
    /// of a pass; clearing it externally stops the pass at the next track
    /// boundary.
    pub fn playing_flag( &self ) -> Arc<AtomicBool> {
        Arc::clone( &self.playing )
    }


    pub fn is_playing( &self ) -> bool {
        self.playing.load( Ordering::Relaxed )
    }


    pub fn upstream( &self ) -> &BTreeSet<PlaylistId> {
        &self.upstream
    }


    pub fn downstream( &self ) -> &BTreeSet<PlaylistId> {
        &self.downstream
    }


    // Edge commits go through the owning collection, which validates the
    // disjointness invariant first.
    pub(crate) fn insert_upstream( &mut self, id: PlaylistId ) {
        self.upstream.insert( id );
    }


    pub(crate) fn insert_downstream( &mut self, id: PlaylistId ) {
        self.downstream.insert( id );
    }


    pub(crate) fn remove_edges_to( &mut self, id: PlaylistId ) {
        self.upstream.remove( &id );
        self.downstream.remove( &id );
    }


    fn remove_from_counts( &mut self, track: TrackId ) -> Result<(), PlaylistError> {
        match self.song_counts.get_mut( &track ) {
            Some( count ) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.song_counts.remove( &track );
                }
                Ok(())
            }
            _ => Err( PlaylistError::UntrackedSong( track ) ),
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn ids( n: usize ) -> Vec<TrackId> {
        ( 0..n ).map( |_| Uuid::new_v4() ).collect()
    }


    fn counts_match_slots( playlist: &Playlist ) -> bool {
        let mut expected: HashMap<TrackId, usize> = HashMap::new();
        for slot in playlist.slots() {
            for track in slot.track_ids() {
                *expected.entry( track ).or_insert( 0 ) += 1;
            }
        }
        expected == playlist.song_counts
    }


    #[test]
    fn test_counts_track_every_mutation() {
        let tracks = ids( 4 );
        let mut playlist = Playlist::from_tracks( "mix", tracks.clone() );
        assert!( counts_match_slots( &playlist ) );

        playlist.add_song( tracks[ 0 ] );
        assert_eq!( playlist.song_count( tracks[ 0 ] ), 2 );
        assert!( counts_match_slots( &playlist ) );

        playlist.link_songs( &[1, 2] ).unwrap();
        assert!( counts_match_slots( &playlist ) );

        playlist.remove_song( 0 ).unwrap();
        assert!( counts_match_slots( &playlist ) );

        playlist.remove_song( 1 ).unwrap();
        assert!( counts_match_slots( &playlist ) );
    }


    #[test]
    fn test_contains_counts_group_members() {
        let tracks = ids( 3 );
        let mut playlist = Playlist::from_tracks( "mix", tracks.clone() );
        playlist.link_songs( &[0, 2] ).unwrap();

        for track in &tracks {
            assert!( playlist.contains_song( *track ) );
        }
        assert!( !playlist.contains_song( Uuid::new_v4() ) );
    }


    #[test]
    fn test_link_preserves_slot_order() {
        let tracks = ids( 5 );
        let mut playlist = Playlist::from_tracks( "mix", tracks.clone() );
        let before = playlist.flattened_songs();

        // Indices supplied out of order: members must still follow the
        // stored slot order.
        playlist.link_songs( &[3, 1] ).unwrap();

        assert_eq!( playlist.slots().len(), 4 );
        assert_eq!(
            playlist.slots().last(),
            Some( &Slot::Group( vec![tracks[ 1 ], tracks[ 3 ]] ) )
        );

        let mut after = playlist.flattened_songs();
        after.sort();
        let mut expected = before;
        expected.sort();
        assert_eq!( after, expected );
    }


    #[test]
    fn test_link_rejects_groups_and_short_lists() {
        let tracks = ids( 4 );
        let mut playlist = Playlist::from_tracks( "mix", tracks );
        playlist.link_songs( &[0, 1] ).unwrap();

        assert!( matches!(
            playlist.link_songs( &[2] ),
            Err( PlaylistError::NotEnoughLinks )
        ));
        assert!( matches!(
            playlist.link_songs( &[1, 1] ),
            Err( PlaylistError::NotEnoughLinks )
        ));
        // Slot 2 is now the appended group.
        assert!( matches!(
            playlist.link_songs( &[0, 2] ),
            Err( PlaylistError::AlreadyLinked( 2 ) )
        ));
    }


    #[test]
    fn test_remove_by_flattened_index_reaches_group_members() {
        let tracks = ids( 4 );
        let mut playlist = Playlist::from_tracks( "mix", tracks.clone() );
        playlist.link_songs( &[1, 2] ).unwrap();
        // Slots: [t0, t3, (t1 t2)] — flattened: [t0, t3, t1, t2].

        let removed = playlist.remove_song( 2 ).unwrap();
        assert_eq!( removed, tracks[ 1 ] );
        assert_eq!( playlist.flattened_songs(), vec![tracks[ 0 ], tracks[ 3 ], tracks[ 2 ]] );
    }


    #[test]
    fn test_removing_second_to_last_member_collapses_group() {
        let tracks = ids( 2 );
        let mut playlist = Playlist::from_tracks( "pair", tracks.clone() );
        playlist.link_songs( &[0, 1] ).unwrap();
        assert_eq!( playlist.slots().len(), 1 );

        playlist.remove_song( 0 ).unwrap();

        assert_eq!( playlist.slots(), &[Slot::Single( tracks[ 1 ] )] );
    }


    #[test]
    fn test_remove_out_of_range() {
        let mut playlist = Playlist::from_tracks( "mix", ids( 2 ) );
        assert!( matches!(
            playlist.remove_song( 2 ),
            Err( PlaylistError::IndexOutOfRange( 2 ) )
        ));
    }


    #[test]
    fn test_untracked_decrement_is_an_invariant_violation() {
        let track = Uuid::new_v4();
        let mut playlist = Playlist::from_tracks( "mix", vec![track] );
        // Corrupt the bookkeeping the way a buggy caller would.
        playlist.song_counts.clear();

        assert!( matches!(
            playlist.remove_song( 0 ),
            Err( PlaylistError::UntrackedSong( t ) ) if t == track
        ));
    }


    #[test]
    fn test_linkable_songs_skips_groups() {
        let tracks = ids( 4 );
        let mut playlist = Playlist::from_tracks( "mix", tracks.clone() );
        playlist.link_songs( &[0, 1] ).unwrap();
        // Slots: [t2, t3, (t0 t1)].

        let linkable = playlist.linkable_songs();
        assert_eq!( linkable, vec![( tracks[ 2 ], 0 ), ( tracks[ 3 ], 1 )] );
    }
}
