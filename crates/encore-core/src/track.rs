//! Track records
//!
//! A track is one registered audio file. Its identifier is stable for the
//! lifetime of the library; display metadata comes from an external tag
//! reader and falls back to the file name.

use std::path::{ Path, PathBuf };

use uuid::Uuid;


/// Stable identifier of a registered track.
pub type TrackId = Uuid;

/// Identifier of a clone group (one logical song, several files).
pub type CloneGroupId = Uuid;


/// Display metadata read from an audio file's tags.
#[derive( Debug, Clone, Default )]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
}


/// External capability that reads display tags from an audio file.
pub trait TagReader {
    fn read_tags( &self, path: &Path ) -> TrackTags;
}


/// Tag reader that reads nothing. Used when loading a library without
/// touching the files, and in tests.
#[derive( Debug, Default )]
pub struct NullTagReader;


impl TagReader for NullTagReader {
    fn read_tags( &self, _path: &Path ) -> TrackTags {
        TrackTags::default()
    }
}


/// One registered audio file.
#[derive( Debug, Clone )]
pub struct Track {
    id: TrackId,
    path: PathBuf,
    clone_id: Option<CloneGroupId>,
    tags: TrackTags,
}


impl Track {
    /// Creates a track with a freshly generated identifier.
    pub fn new( path: PathBuf, clone_id: Option<CloneGroupId>, reader: &dyn TagReader ) -> Self {
        Self::with_id( Uuid::new_v4(), path, clone_id, reader )
    }


    /// Creates a track with a known identifier (loading persisted state).
    pub fn with_id(
        id: TrackId,
        path: PathBuf,
        clone_id: Option<CloneGroupId>,
        reader: &dyn TagReader,
    ) -> Self {
        let tags = reader.read_tags( &path );
        Self { id, path, clone_id, tags }
    }


    pub fn id( &self ) -> TrackId {
        self.id
    }


    pub fn path( &self ) -> &Path {
        &self.path
    }


    pub fn clone_id( &self ) -> Option<CloneGroupId> {
        self.clone_id
    }


    /// File name component of the track's path.
    pub fn file_name( &self ) -> Option<&str> {
        self.path.file_name().and_then( |n| n.to_str() )
    }


    /// Song name: tag title, else file name, else "Unknown".
    pub fn song_name( &self ) -> &str {
        if let Some( ref title ) = self.tags.title {
            return title;
        }
        self.file_name().unwrap_or( "Unknown" )
    }


    /// Artist: tag artist, else "Unknown".
    pub fn artist( &self ) -> &str {
        self.tags.artist.as_deref().unwrap_or( "Unknown" )
    }


    /// Full display title, e.g. `Blue in Green by Miles Davis`.
    pub fn display_title( &self ) -> String {
        format!( "{} by {}", self.song_name(), self.artist() )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    struct FixedTags( TrackTags );

    impl TagReader for FixedTags {
        fn read_tags( &self, _path: &Path ) -> TrackTags {
            self.0.clone()
        }
    }


    #[test]
    fn test_song_name_prefers_title() {
        let reader = FixedTags( TrackTags {
            title: Some( "Blue in Green".into() ),
            artist: Some( "Miles Davis".into() ),
        });
        let track = Track::new( PathBuf::from( "/music/05.mp3" ), None, &reader );
        assert_eq!( track.song_name(), "Blue in Green" );
        assert_eq!( track.display_title(), "Blue in Green by Miles Davis" );
    }


    #[test]
    fn test_song_name_falls_back_to_file_name() {
        let track = Track::new( PathBuf::from( "/music/05.mp3" ), None, &NullTagReader );
        assert_eq!( track.song_name(), "05.mp3" );
        assert_eq!( track.artist(), "Unknown" );
        assert_eq!( track.display_title(), "05.mp3 by Unknown" );
    }
}
