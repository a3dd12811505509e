//! Encore CLI - console music library manager

mod cli;
mod console;
mod editor;
mod menu;

use std::path::PathBuf;

use anyhow::{ Context, Result };
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use encore_core::{ store, Collection, CollectionError, SymphoniaTagReader, TagReader };

use cli::Args;
use menu::Menu;


/// Resolves the library file: CLI override, else the config directory,
/// else the working directory.
fn library_path( args: &Args ) -> PathBuf {
    if let Some( ref path ) = args.library {
        return path.clone();
    }

    dirs::config_dir()
        .map( |dir| dir.join( "encore" ).join( "library.json" ) )
        .unwrap_or_else( || PathBuf::from( "encore.library.json" ) )
}


fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else( |_| "encore=warn".into() ),
        )
        .with( tracing_subscriber::fmt::layer() )
        .init();

    let args = Args::parse();
    let path = library_path( &args );
    let reader = SymphoniaTagReader;

    let mut collection = store::load( &path, &reader )
        .with_context( || format!( "failed to load library from {:?}", path ) )?;
    info!(
        "Library ready: {} tracks, {} playlists",
        collection.track_count(),
        collection.playlist_count()
    );

    let main_menu = Menu::new( "What would you like to do?" )
        .option( "PLAY", "View a list of all songs and select one to play." )
        .option( "ADD", "Provide the path of a directory or file to add to the music library." )
        .option( "LIST", "Create/edit playlist." )
        .option( "EXIT", "Close the application." );

    loop {
        match main_menu.choose()?.as_str() {
            "PLAY" => console::play_menu( &collection )?,
            "ADD" => add_songs_menu( &mut collection, &reader )?,
            "LIST" => editor::playlist_menu( &mut collection )?,
            _ => break,
        }
    }

    store::save( &collection, &path )
        .with_context( || format!( "failed to save library to {:?}", path ) )?;
    Ok(())
}


fn add_songs_menu( collection: &mut Collection, reader: &dyn TagReader ) -> Result<()> {
    let input = menu::read_line(
        "Provide a path to a song or directory you would like to add to the song database: ",
    )?;
    if input.is_empty() {
        return Ok(());
    }

    match collection.add_songs_from_path( &PathBuf::from( input ), reader ) {
        Ok( added ) => {
            for id in &added {
                if let Some( track ) = collection.track( *id ) {
                    println!( "Found and adding {}...", track.display_title() );
                }
            }
            let noun = if added.len() == 1 { "song" } else { "songs" };
            println!( "{} new {} added.", added.len(), noun );
            println!();
        }
        // Bad paths are user input, not failures.
        Err( CollectionError::Library( e ) ) => println!( "Error adding song path: {}", e ),
        Err( e ) => return Err( e.into() ),
    }

    Ok(())
}
