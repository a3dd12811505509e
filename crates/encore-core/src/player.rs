//! Playback session driver
//!
//! Drives sequential and shuffled playback passes over a playlist's
//! flattened graph, consuming an external play/stop/is-playing capability.
//! While a track is in progress the driver polls the control channel with
//! a blocking-with-timeout receive and executes at most one queued command
//! per poll; commands run to completion before the next poll.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::mpsc::{ Receiver, RecvTimeoutError };
use std::thread;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

use crate::clone::CloneError;
use crate::collection::Collection;
use crate::command::PlaybackCommand;
use crate::playlist::{ Playlist, Slot };
use crate::track::{ Track, TrackId };


/// Interval at which the driver polls the control channel while a track
/// is in progress.
pub const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis( 100 );


/// Errors that can occur during playback.
#[derive( Debug, Error )]
pub enum PlayerError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Audio output error: {0}" )]
    Output( String ),

    #[error( "unknown track: {0}" )]
    UnknownTrack( TrackId ),

    #[error( transparent )]
    Clone( #[from] CloneError ),
}


/// External playback capability: start a file, stop it, ask whether it is
/// still sounding.
pub trait AudioBackend {
    fn play( &mut self, path: &Path ) -> Result<(), PlayerError>;

    fn stop( &mut self );

    fn is_playing( &self ) -> bool;
}


/// Callback invoked with each track as its playback starts.
pub type TrackHook = Box<dyn FnMut( &Track )>;


/// One playback session: a backend, the receiving end of the control
/// channel, and an optional per-track hook scoped to this session.
pub struct PlaybackSession<B: AudioBackend> {
    backend: B,
    commands: Receiver<PlaybackCommand>,
    rng: SmallRng,
    poll_interval: Duration,
    track_hook: Option<TrackHook>,
}


impl<B: AudioBackend> PlaybackSession<B> {
    pub fn new( backend: B, commands: Receiver<PlaybackCommand> ) -> Self {
        Self {
            backend,
            commands,
            rng: SmallRng::from_entropy(),
            poll_interval: COMMAND_POLL_INTERVAL,
            track_hook: None,
        }
    }


    /// Attaches the per-track callback for this session. It is invoked
    /// freshly with every track of every pass and dropped with the
    /// session.
    pub fn set_track_hook( &mut self, hook: TrackHook ) {
        self.track_hook = Some( hook );
    }


    pub fn clear_track_hook( &mut self ) {
        self.track_hook = None;
    }


    /// Plays a single track to completion.
    pub fn play_song( &mut self, collection: &Collection, track: TrackId ) -> Result<(), PlayerError> {
        let playing = Arc::new( AtomicBool::new( true ) );
        let result = self.play_one( collection, track, &playing );
        playing.store( false, Ordering::Relaxed );
        result
    }


    /// Sequential pass: the playlist's flattened sequence including one
    /// level of downstream playlists, strictly in order.
    ///
    /// The playlist need not live in the collection; ad-hoc lists (like an
    /// all-songs listing) play the same way.
    pub fn play_playlist( &mut self, collection: &Collection, playlist: &Playlist ) -> Result<(), PlayerError> {
        let sequence = collection.flattened_with_downstream( playlist );

        tracing::info!( "Playing playlist \"{}\" ({} tracks)", playlist.name(), sequence.len() );

        let playing = playlist.playing_flag();
        playing.store( true, Ordering::Relaxed );
        let result = self.run_sequence( collection, &sequence, &playing );
        playing.store( false, Ordering::Relaxed );
        result
    }


    /// Shuffled pass: a uniform random permutation of the playlist's own
    /// top-level slots plus each immediate downstream playlist's slots.
    /// Linked groups move as atomic units and play through in stored
    /// order.
    pub fn shuffle_playlist( &mut self, collection: &Collection, playlist: &Playlist ) -> Result<(), PlayerError> {
        let mut slots = collection.shuffle_pool( playlist );
        slots.shuffle( &mut self.rng );

        tracing::info!( "Shuffling playlist \"{}\" ({} slots)", playlist.name(), slots.len() );

        let playing = playlist.playing_flag();
        playing.store( true, Ordering::Relaxed );
        let result = self.run_slots( collection, &slots, &playing );
        playing.store( false, Ordering::Relaxed );
        result
    }


    fn run_sequence(
        &mut self,
        collection: &Collection,
        sequence: &[TrackId],
        playing: &Arc<AtomicBool>,
    ) -> Result<(), PlayerError> {
        for &track in sequence {
            if !playing.load( Ordering::Relaxed ) {
                break;
            }
            self.poll_pending( playing );
            if !playing.load( Ordering::Relaxed ) {
                break;
            }
            self.play_one( collection, track, playing )?;
        }
        Ok(())
    }


    fn run_slots(
        &mut self,
        collection: &Collection,
        slots: &[Slot],
        playing: &Arc<AtomicBool>,
    ) -> Result<(), PlayerError> {
        'slots: for slot in slots {
            for track in slot.track_ids() {
                if !playing.load( Ordering::Relaxed ) {
                    break 'slots;
                }
                self.poll_pending( playing );
                if !playing.load( Ordering::Relaxed ) {
                    break 'slots;
                }
                self.play_one( collection, track, playing )?;
            }
        }
        Ok(())
    }


    /// Plays one track fully: resolves clone-bearing tracks, starts the
    /// backend, invokes the session hook, then polls the control channel
    /// until the backend reports the track over.
    fn play_one(
        &mut self,
        collection: &Collection,
        track: TrackId,
        playing: &Arc<AtomicBool>,
    ) -> Result<(), PlayerError> {
        let record = self.resolve( collection, track )?;
        tracing::info!( "Now playing {:?}", record.path() );

        self.backend.play( record.path() )?;
        if let Some( hook ) = self.track_hook.as_mut() {
            hook( record );
        }

        while self.backend.is_playing() {
            self.poll_blocking( playing );
        }

        Ok(())
    }


    /// Resolves a clone-bearing track to one weighted-drawn variant.
    fn resolve<'a>(
        &mut self,
        collection: &'a Collection,
        track: TrackId,
    ) -> Result<&'a Track, PlayerError> {
        let record = collection
            .track( track )
            .ok_or( PlayerError::UnknownTrack( track ) )?;

        if let Some( clone_id ) = record.clone_id() {
            if let Some( group ) = collection.clone_group( clone_id ) {
                let chosen = group.song_to_play( &mut self.rng )?;
                return collection
                    .track( chosen )
                    .ok_or( PlayerError::UnknownTrack( chosen ) );
            }
        }

        Ok( record )
    }


    /// One non-blocking poll, used at track boundaries.
    fn poll_pending( &mut self, playing: &Arc<AtomicBool> ) {
        if let Ok( command ) = self.commands.try_recv() {
            self.apply( command, playing );
        }
    }


    /// One blocking-with-timeout poll, used while a track is in progress.
    fn poll_blocking( &mut self, playing: &Arc<AtomicBool> ) {
        match self.commands.recv_timeout( self.poll_interval ) {
            Ok( command ) => self.apply( command, playing ),
            Err( RecvTimeoutError::Timeout ) => {}
            Err( RecvTimeoutError::Disconnected ) => {
                // No control producer; keep pacing on the poll interval.
                thread::sleep( self.poll_interval );
            }
        }
    }


    fn apply( &mut self, command: PlaybackCommand, playing: &Arc<AtomicBool> ) {
        match command {
            PlaybackCommand::Skip => {
                tracing::debug!( "Skip: stopping current track" );
                self.backend.stop();
            }
            PlaybackCommand::Stop => {
                tracing::debug!( "Stop: ending playback pass" );
                // The pass flag must clear before the track stops, so the
                // track-stop trigger cannot start another track the caller
                // believes has already stopped.
                playing.store( false, Ordering::Relaxed );
                self.backend.stop();
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use uuid::Uuid;

    use crate::command::command_channel;
    use crate::playlist::PlaylistId;
    use crate::track::NullTagReader;

    use super::*;


    /// Backend whose tracks end instantly unless `hold` is set, recording
    /// every path it was asked to play.
    struct FakeBackend {
        played: Arc<Mutex<Vec<PathBuf>>>,
        hold: bool,
        playing: bool,
        // Set when stop() finds the observed pass flag already cleared.
        flag_probe: Option<( Arc<AtomicBool>, Arc<AtomicBool> )>,
    }

    impl FakeBackend {
        fn instant( played: Arc<Mutex<Vec<PathBuf>>> ) -> Self {
            Self { played, hold: false, playing: false, flag_probe: None }
        }


        fn holding( played: Arc<Mutex<Vec<PathBuf>>> ) -> Self {
            Self { played, hold: true, playing: false, flag_probe: None }
        }
    }

    impl AudioBackend for FakeBackend {
        fn play( &mut self, path: &Path ) -> Result<(), PlayerError> {
            self.played.lock().unwrap().push( path.to_path_buf() );
            self.playing = self.hold;
            Ok(())
        }


        fn stop( &mut self ) {
            if let Some(( ref flag, ref cleared_first )) = self.flag_probe {
                if !flag.load( Ordering::Relaxed ) {
                    cleared_first.store( true, Ordering::Relaxed );
                }
            }
            self.playing = false;
        }


        fn is_playing( &self ) -> bool {
            self.playing
        }
    }


    fn collection_with_tracks( n: usize ) -> ( Collection, Vec<TrackId> ) {
        let mut collection = Collection::new();
        let mut ids = Vec::new();
        for i in 0..n {
            let track = Track::new( PathBuf::from( format!( "/music/{i}.mp3" ) ), None, &NullTagReader );
            ids.push( track.id() );
            collection.insert_track( track );
        }
        ( collection, ids )
    }


    fn insert_playlist( collection: &mut Collection, name: &str, tracks: Vec<TrackId> ) -> PlaylistId {
        let playlist = Playlist::from_tracks( name, tracks );
        let id = playlist.id();
        collection.insert_playlist( playlist ).unwrap();
        id
    }


    #[test]
    fn test_sequential_pass_follows_flattened_order() {
        let ( mut collection, tracks ) = collection_with_tracks( 3 );
        let id = insert_playlist( &mut collection, "mix", tracks.clone() );
        collection
            .playlist_mut( id )
            .unwrap()
            .link_songs( &[0, 1] )
            .unwrap();
        // Slots: [t2, (t0 t1)] — flattened: [t2, t0, t1].

        let played = Arc::new( Mutex::new( Vec::new() ) );
        let ( _tx, rx ) = command_channel();
        let mut session = PlaybackSession::new( FakeBackend::instant( Arc::clone( &played ) ), rx );

        session.play_playlist( &collection, collection.playlist( id ).unwrap() ).unwrap();

        let expected: Vec<PathBuf> = [tracks[ 2 ], tracks[ 0 ], tracks[ 1 ]]
            .iter()
            .map( |t| collection.track( *t ).unwrap().path().to_path_buf() )
            .collect();
        assert_eq!( *played.lock().unwrap(), expected );
        assert!( !collection.playlist( id ).unwrap().is_playing() );
    }


    #[test]
    fn test_sequential_pass_appends_downstream_tracks() {
        let ( mut collection, tracks ) = collection_with_tracks( 2 );
        let up = insert_playlist( &mut collection, "up", vec![tracks[ 0 ]] );
        let down = insert_playlist( &mut collection, "down", vec![tracks[ 1 ]] );
        assert!( collection.add_downstream_to_playlist( up, down ).unwrap() );

        let played = Arc::new( Mutex::new( Vec::new() ) );
        let ( _tx, rx ) = command_channel();
        let mut session = PlaybackSession::new( FakeBackend::instant( Arc::clone( &played ) ), rx );

        session.play_playlist( &collection, collection.playlist( up ).unwrap() ).unwrap();

        assert_eq!( played.lock().unwrap().len(), 2 );
        assert_eq!(
            played.lock().unwrap()[ 0 ],
            collection.track( tracks[ 0 ] ).unwrap().path()
        );
    }


    #[test]
    fn test_clearing_the_flag_stops_before_the_next_track() {
        let ( mut collection, tracks ) = collection_with_tracks( 4 );
        let id = insert_playlist( &mut collection, "mix", tracks );
        let flag = collection.playlist( id ).unwrap().playing_flag();

        let played = Arc::new( Mutex::new( Vec::new() ) );
        let ( _tx, rx ) = command_channel();
        let mut session = PlaybackSession::new( FakeBackend::instant( Arc::clone( &played ) ), rx );

        // The hook runs as the first track starts; clearing the flag there
        // must stop the shuffled pass before a second track plays.
        let hook_flag = Arc::clone( &flag );
        session.set_track_hook( Box::new( move |_track| {
            hook_flag.store( false, Ordering::Relaxed );
        }));

        session.shuffle_playlist( &collection, collection.playlist( id ).unwrap() ).unwrap();

        assert_eq!( played.lock().unwrap().len(), 1 );
    }


    #[test]
    fn test_queued_stop_prevents_any_track() {
        let ( mut collection, tracks ) = collection_with_tracks( 2 );
        let id = insert_playlist( &mut collection, "mix", tracks );

        let played = Arc::new( Mutex::new( Vec::new() ) );
        let ( tx, rx ) = command_channel();
        tx.send( PlaybackCommand::Stop ).unwrap();

        let mut session = PlaybackSession::new( FakeBackend::instant( Arc::clone( &played ) ), rx );
        session.play_playlist( &collection, collection.playlist( id ).unwrap() ).unwrap();

        assert!( played.lock().unwrap().is_empty() );
    }


    #[test]
    fn test_skip_ends_the_track_and_the_pass_advances() {
        let ( mut collection, tracks ) = collection_with_tracks( 2 );
        let id = insert_playlist( &mut collection, "mix", tracks );

        let played = Arc::new( Mutex::new( Vec::new() ) );
        let ( tx, rx ) = command_channel();
        let mut session = PlaybackSession::new( FakeBackend::holding( Arc::clone( &played ) ), rx );
        session.poll_interval = Duration::from_millis( 5 );

        // Feed skips until the session drops the receiver.
        let feeder = thread::spawn( move || {
            while tx.send( PlaybackCommand::Skip ).is_ok() {
                thread::sleep( Duration::from_millis( 2 ) );
            }
        });

        session.play_playlist( &collection, collection.playlist( id ).unwrap() ).unwrap();
        assert_eq!( played.lock().unwrap().len(), 2 );

        drop( session );
        feeder.join().unwrap();
    }


    #[test]
    fn test_stop_clears_the_flag_before_stopping_the_track() {
        let ( mut collection, tracks ) = collection_with_tracks( 2 );
        let id = insert_playlist( &mut collection, "mix", tracks );
        let flag = collection.playlist( id ).unwrap().playing_flag();
        let cleared_first = Arc::new( AtomicBool::new( false ) );

        let played = Arc::new( Mutex::new( Vec::new() ) );
        let ( tx, rx ) = command_channel();
        let mut backend = FakeBackend::holding( Arc::clone( &played ) );
        backend.flag_probe = Some(( Arc::clone( &flag ), Arc::clone( &cleared_first ) ));

        let mut session = PlaybackSession::new( backend, rx );
        session.poll_interval = Duration::from_millis( 5 );

        // The stop must land while the first track is in progress, not at
        // the boundary before it.
        let feeder = thread::spawn( move || {
            thread::sleep( Duration::from_millis( 20 ) );
            let _ = tx.send( PlaybackCommand::Stop );
        });

        session.play_playlist( &collection, collection.playlist( id ).unwrap() ).unwrap();
        feeder.join().unwrap();

        assert_eq!( played.lock().unwrap().len(), 1 );
        assert!( cleared_first.load( Ordering::Relaxed ) );
    }


    #[test]
    fn test_clone_bearing_track_resolves_to_a_variant() {
        use crate::clone::{ CloneGroup, CloneVariant };

        let mut collection = Collection::new();
        let clone_id = Uuid::new_v4();

        let logical = Track::new( PathBuf::from( "/music/logical.mp3" ), Some( clone_id ), &NullTagReader );
        let variant = Track::new( PathBuf::from( "/music/variant.mp3" ), None, &NullTagReader );
        let ( logical_id, variant_id ) = ( logical.id(), variant.id() );
        collection.insert_track( logical );
        collection.insert_track( variant );
        collection.insert_clone_group( CloneGroup::new(
            clone_id,
            vec![CloneVariant { track: variant_id, weight: 1 }],
        ));

        let played = Arc::new( Mutex::new( Vec::new() ) );
        let ( _tx, rx ) = command_channel();
        let mut session = PlaybackSession::new( FakeBackend::instant( Arc::clone( &played ) ), rx );

        session.play_song( &collection, logical_id ).unwrap();

        assert_eq!( *played.lock().unwrap(), vec![PathBuf::from( "/music/variant.mp3" )] );
    }
}
