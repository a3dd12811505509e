//! Library scanning
//!
//! Discovers audio files to register: a single file, or the immediate
//! entries of a directory. Scanning is deliberately shallow; nested
//! directories are added one at a time.

use std::path::{ Path, PathBuf };

use thiserror::Error;


/// Recognized audio file extensions.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "wma", "aiff", "alac",
];


/// Errors that can occur during library scanning.
#[derive( Debug, Error )]
pub enum LibraryError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),
}


/// Checks if a file has a recognized audio extension.
pub fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


/// Collects the audio files at `path`.
///
/// A file is returned as-is when it has a recognized extension. A directory
/// is scanned one level deep: immediate file entries only, no recursion.
/// Results are sorted so registration order is stable across runs.
pub fn collect_audio_files( path: &Path ) -> Result<Vec<PathBuf>, LibraryError> {
    if !path.exists() {
        return Err( LibraryError::NotFound( path.to_path_buf() ) );
    }

    if path.is_file() {
        if is_audio_file( path ) {
            return Ok( vec![path.to_path_buf()] );
        }
        return Ok( Vec::new() );
    }

    tracing::info!( "Scanning: {:?}", path );

    let mut files = Vec::new();
    for entry in std::fs::read_dir( path )?.flatten() {
        let entry_path = entry.path();
        if entry_path.is_file() && is_audio_file( &entry_path ) {
            files.push( entry_path );
        }
    }
    files.sort();

    tracing::info!( "Found {} audio files", files.len() );
    Ok( files )
}


#[cfg( test )]
mod tests {
    use std::fs;

    use uuid::Uuid;

    use super::*;


    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join( format!( "encore-library-{}", Uuid::new_v4() ) );
        fs::create_dir_all( &dir ).unwrap();
        dir
    }


    #[test]
    fn test_is_audio_file_by_extension() {
        assert!( is_audio_file( Path::new( "a.mp3" ) ) );
        assert!( is_audio_file( Path::new( "a.FLAC" ) ) );
        assert!( !is_audio_file( Path::new( "a.txt" ) ) );
        assert!( !is_audio_file( Path::new( "mp3" ) ) );
    }


    #[test]
    fn test_shallow_scan_skips_subdirectories() {
        let dir = scratch_dir();
        fs::write( dir.join( "one.mp3" ), b"" ).unwrap();
        fs::write( dir.join( "two.ogg" ), b"" ).unwrap();
        fs::write( dir.join( "notes.txt" ), b"" ).unwrap();
        fs::create_dir( dir.join( "nested" ) ).unwrap();
        fs::write( dir.join( "nested" ).join( "three.mp3" ), b"" ).unwrap();

        let files = collect_audio_files( &dir ).unwrap();

        assert_eq!( files, vec![dir.join( "one.mp3" ), dir.join( "two.ogg" )] );
        fs::remove_dir_all( &dir ).unwrap();
    }


    #[test]
    fn test_single_file_must_be_audio() {
        let dir = scratch_dir();
        let audio = dir.join( "song.mp3" );
        let text = dir.join( "notes.txt" );
        fs::write( &audio, b"" ).unwrap();
        fs::write( &text, b"" ).unwrap();

        assert_eq!( collect_audio_files( &audio ).unwrap(), vec![audio] );
        assert!( collect_audio_files( &text ).unwrap().is_empty() );
        fs::remove_dir_all( &dir ).unwrap();
    }


    #[test]
    fn test_missing_path_is_not_found() {
        let missing = std::env::temp_dir().join( format!( "encore-missing-{}", Uuid::new_v4() ) );
        assert!( matches!(
            collect_audio_files( &missing ),
            Err( LibraryError::NotFound( _ ) )
        ));
    }
}
