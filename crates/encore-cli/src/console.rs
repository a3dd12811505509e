//! Playback console
//!
//! Runs playback passes while a second thread forwards typed control
//! commands into the bounded command channel. The playback driver polls
//! that channel; this module owns the stdin side and the user-facing
//! now-playing output.

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::mpsc::SyncSender;
use std::thread;

use anyhow::Result;

use encore_core::{
    command_channel, Collection, Mixer, PlaybackCommand, PlaybackSession, Playlist, Track, TrackId,
};

use crate::menu::{ read_line, Menu };


/// What a playback session is asked to play.
enum Target<'a> {
    Song( TrackId ),
    Playlist( &'a Playlist, bool ),
}


/// Shows every song and playlist and plays the selection.
///
/// Playlists are listed after the songs, starting with a synthetic
/// "All Songs" playlist over the whole library. An `S` prefix on a
/// playlist selection shuffles it; single songs cannot be shuffled.
pub fn play_menu( collection: &Collection ) -> Result<()> {
    let tracks: Vec<&Track> = collection.tracks().collect();
    if tracks.is_empty() {
        println!( "There are no songs :(" );
        return Ok(());
    }

    println!( "All playable mp3 files:" );
    for ( idx, track ) in tracks.iter().enumerate() {
        println!( "{}: {}", idx + 1, track.song_name() );
    }
    println!();

    let all_songs = Playlist::from_tracks(
        "All Songs",
        tracks.iter().map( |track| track.id() ).collect(),
    );
    let playlists = collection.playlists_sorted();

    println!( "All playlists:" );
    println!( "(S){}: {}", tracks.len() + 1, all_songs.name() );
    for ( idx, playlist ) in playlists.iter().enumerate() {
        println!( "(S){}: {}", tracks.len() + idx + 2, playlist.name() );
    }
    println!();

    println!( "Please enter the number of the song or playlist you would like to play." );
    println!( "For playlists, prefix your selection with 'S' to shuffle." );
    let selection = read_line( "Selection: " )?;

    let ( shuffle, number ) = match selection.strip_prefix( 's' ).or_else( || selection.strip_prefix( 'S' ) ) {
        Some( rest ) => ( true, rest ),
        None => ( false, selection.as_str() ),
    };

    let index = match number.parse::<usize>() {
        Ok( n ) if n >= 1 => n - 1,
        _ => {
            println!( "Invalid option!" );
            return Ok(());
        }
    };

    if index < tracks.len() {
        // Can't shuffle an individual song.
        if shuffle {
            println!( "Invalid option!" );
            return Ok(());
        }
        return run_session( collection, Target::Song( tracks[ index ].id() ) );
    }

    let playlist_index = index - tracks.len();
    let playlist = if playlist_index == 0 {
        &all_songs
    } else {
        match playlists.get( playlist_index - 1 ) {
            Some( playlist ) => *playlist,
            None => {
                println!( "Invalid option!" );
                return Ok(());
            }
        }
    };

    println!( "Now playing playlist: {}", playlist.name() );
    run_session( collection, Target::Playlist( playlist, shuffle ) )
}


fn run_session( collection: &Collection, target: Target<'_> ) -> Result<()> {
    let ( tx, rx ) = command_channel();
    let active = Arc::new( AtomicBool::new( true ) );

    let input_active = Arc::clone( &active );
    let input = thread::spawn( move || control_loop( tx, input_active ) );

    let commands: &[PlaybackCommand] = match &target {
        Target::Song( _ ) => &[PlaybackCommand::Stop],
        Target::Playlist( .. ) => &[PlaybackCommand::Skip, PlaybackCommand::Stop],
    };
    let banner = playback_menu( commands );

    let mut session = PlaybackSession::new( Mixer::new(), rx );
    session.set_track_hook( Box::new( move |track: &Track| {
        println!( "Now playing: {}", track.display_title() );
        banner.print();
    }));

    let outcome = match target {
        Target::Song( id ) => session.play_song( collection, id ),
        Target::Playlist( playlist, false ) => session.play_playlist( collection, playlist ),
        Target::Playlist( playlist, true ) => session.shuffle_playlist( collection, playlist ),
    };

    // Unblock the input thread: it exits after the next line once the
    // session is over.
    active.store( false, Ordering::Relaxed );
    println!( "Playback finished. Press Enter to return to the menu." );
    drop( session );
    let _ = input.join();

    outcome?;
    Ok(())
}


fn playback_menu( commands: &[PlaybackCommand] ) -> Menu {
    let mut menu = Menu::new( "Playback commands:" );
    for command in commands {
        menu = menu.option( command.symbol(), command.description() );
    }
    menu
}


/// The control input loop: reads lines, parses command tokens, and queues
/// them for the playback driver. A full queue drops the command rather
/// than blocking the loop.
fn control_loop( commands: SyncSender<PlaybackCommand>, active: Arc<AtomicBool> ) {
    loop {
        let line = match read_line( "Enter command: " ) {
            Ok( line ) => line,
            Err( _ ) => break,
        };
        if !active.load( Ordering::Relaxed ) {
            break;
        }
        if line.is_empty() {
            continue;
        }

        match line.parse::<PlaybackCommand>() {
            Ok( command ) => {
                let _ = commands.try_send( command );
            }
            Err( e ) => println!( "{}", e ),
        }
    }
}
