//! Playback control commands
//!
//! Control tokens the input loop can queue while a track or playlist is
//! playing, and the bounded channel that carries them to the playback
//! driver.

use std::str::FromStr;
use std::sync::mpsc::{ self, Receiver, SyncSender };

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),
}


/// A queued playback control command.
///
/// `Skip` ends the current track; the playback pass advances to the next
/// one. `Stop` ends the whole pass: the pass flag is cleared first, then
/// the current track is stopped.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum PlaybackCommand {
    Skip,
    Stop,
}


impl FromStr for PlaybackCommand {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok( PlaybackCommand::Skip ),
            "stop" => Ok( PlaybackCommand::Stop ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


impl PlaybackCommand {
    /// Menu symbol for this command.
    pub fn symbol( &self ) -> &'static str {
        match self {
            PlaybackCommand::Skip => "SKIP",
            PlaybackCommand::Stop => "STOP",
        }
    }


    /// Returns a brief description of the command for menu text.
    pub fn description( &self ) -> &'static str {
        match self {
            PlaybackCommand::Skip => "Skip the current song",
            PlaybackCommand::Stop => "Stop playing",
        }
    }
}


/// Depth of the control queue. Commands beyond this are dropped by the
/// producer rather than blocking the input loop.
const COMMAND_QUEUE_DEPTH: usize = 8;


/// Creates the bounded single-producer/single-consumer control channel
/// between the input loop and the playback driver.
pub fn command_channel() -> ( SyncSender<PlaybackCommand>, Receiver<PlaybackCommand> ) {
    mpsc::sync_channel( COMMAND_QUEUE_DEPTH )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_skip() {
        let cmd: PlaybackCommand = "skip".parse().unwrap();
        assert_eq!( cmd, PlaybackCommand::Skip );
    }


    #[test]
    fn test_parse_is_case_insensitive() {
        let cmd: PlaybackCommand = " STOP ".parse().unwrap();
        assert_eq!( cmd, PlaybackCommand::Stop );
    }


    #[test]
    fn test_parse_unknown() {
        let result = "pause".parse::<PlaybackCommand>();
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }
}
