//! Playlist create/edit menus
//!
//! The LIST branch of the main menu: creating playlists, editing them
//! (rename, add/remove/link songs, dependency edges), and deleting them.
//! Every invalid selection re-prompts; only bookkeeping violations bubble
//! up as errors.

use std::io;

use anyhow::Result;

use encore_core::{ Collection, CollectionError, Playlist, PlaylistId, Track, TrackId };

use crate::menu::{ confirm, read_line, Menu };


/// Which side of the dependency relation an edge is added to.
enum Direction {
    Downstream,
    Upstream,
}


/// The playlist submenu: CREATE / EDIT / DELETE / BACK.
pub fn playlist_menu( collection: &mut Collection ) -> Result<()> {
    let menu = Menu::new( "What would you like to do?" )
        .option( "CREATE", "Create a new playlist." )
        .option( "EDIT", "Edit playlist." )
        .option( "DELETE", "Delete playlist." )
        .option( "BACK", "Back to main menu." );

    loop {
        match menu.choose()?.as_str() {
            "CREATE" => create_playlist_menu( collection )?,
            "EDIT" => edit_playlist_menu( collection )?,
            "DELETE" => delete_playlist_menu( collection )?,
            _ => break,
        }
    }

    Ok(())
}


fn create_playlist_menu( collection: &mut Collection ) -> Result<()> {
    if collection.track_count() == 0 {
        println!( "There are no playable songs. Please add songs via the main menu first." );
        return Ok(());
    }

    let name = loop {
        let name = read_line( "Enter name for new playlist: " )?;
        if name.is_empty() {
            continue;
        }
        if collection.has_playlist( &name ) {
            println!( "Playlist already exists!" );
            continue;
        }
        break name;
    };

    let picked = pick_songs(
        collection,
        "Create a playlist from the playable songs:",
        |track, picked| {
            if picked.contains( &track.id() ) {
                println!( "This song has already been added to the new playlist!" );
                return false;
            }
            true
        },
    )?;

    collection.create_playlist( &name, picked )?;
    println!( "Playlist \"{}\" has been created!", name );
    Ok(())
}


fn edit_playlist_menu( collection: &mut Collection ) -> Result<()> {
    let Some( id ) = choose_playlist( collection, "edit" )? else {
        return Ok(());
    };

    // Editing stops as soon as the playlist empties out (it has been
    // auto-deleted at that point).
    loop {
        let Some( playlist ) = collection.playlist( id ) else {
            break;
        };
        let name = playlist.name().to_string();

        let menu = Menu::new( format!( "What would you like to do with \"{}\"?", name ) )
            .option( "RENAME", "Rename playlist." )
            .option( "ADD", "Add songs" )
            .option( "ADDPLAY", "Add songs from playlist" )
            .option( "ADDDOWN", "Add downstream playlist" )
            .option( "ADDUP", "Add upstream playlist" )
            .option( "REMOVE", "Remove songs" )
            .option( "LINK", "Link songs so that they always play back to back during shuffle." )
            .option( "BACK", "Back to main menu." );

        match menu.choose()?.as_str() {
            "RENAME" => rename_playlist( collection, id )?,
            "ADD" => add_songs_to_playlist( collection, id )?,
            "ADDPLAY" => add_songs_from_playlist( collection, id )?,
            "ADDDOWN" => add_dependency( collection, id, Direction::Downstream )?,
            "ADDUP" => add_dependency( collection, id, Direction::Upstream )?,
            "REMOVE" => remove_songs_from_playlist( collection, id )?,
            "LINK" => link_songs_menu( collection, id )?,
            _ => break,
        }
    }

    Ok(())
}


fn delete_playlist_menu( collection: &mut Collection ) -> Result<()> {
    let Some( id ) = choose_playlist( collection, "delete" )? else {
        return Ok(());
    };

    let name = match collection.playlist( id ) {
        Some( playlist ) => playlist.name().to_string(),
        None => return Ok(()),
    };
    collection.delete_playlist( id )?;
    println!( "Playlist \"{}\" has been deleted!", name );
    Ok(())
}


fn rename_playlist( collection: &mut Collection, id: PlaylistId ) -> Result<()> {
    let old_name = match collection.playlist( id ) {
        Some( playlist ) => playlist.name().to_string(),
        None => return Ok(()),
    };

    let new_name = read_line( &format!( "Enter the new name for the \"{}\" playlist: ", old_name ) )?;
    if new_name.is_empty() {
        return Ok(());
    }

    match collection.rename_playlist( id, &new_name ) {
        Ok(()) => println!( "Playlist \"{}\" has been renamed to \"{}\"!", old_name, new_name ),
        Err( CollectionError::DuplicateName( name ) ) => {
            println!( "A playlist named \"{}\" already exists!", name );
        }
        Err( e ) => return Err( e.into() ),
    }
    Ok(())
}


fn add_songs_to_playlist( collection: &mut Collection, id: PlaylistId ) -> Result<()> {
    if collection.track_count() == 0 {
        println!( "There are no playable songs. Please add songs via the main menu first." );
        return Ok(());
    }

    let ( name, picked ) = {
        let Some( playlist ) = collection.playlist( id ) else {
            return Ok(());
        };

        let prompt = format!( "Add songs to playlist \"{}\":", playlist.name() );
        let picked = pick_songs( collection, &prompt, |track, picked| {
            if playlist.contains_song( track.id() ) {
                println!( "This song already exists in the playlist!" );
                return false;
            }
            if picked.contains( &track.id() ) {
                println!( "This song has already been selected to be added to the playlist!" );
                return false;
            }
            true
        })?;

        ( playlist.name().to_string(), picked )
    };

    if let Some( playlist ) = collection.playlist_mut( id ) {
        let count = picked.len();
        for track in picked {
            playlist.add_song( track );
        }
        if count > 0 {
            println!( "Added {} songs to \"{}\"!", count, name );
        }
    }
    Ok(())
}


fn add_songs_from_playlist( collection: &mut Collection, id: PlaylistId ) -> Result<()> {
    let target_name = match collection.playlist( id ) {
        Some( playlist ) => playlist.name().to_string(),
        None => return Ok(()),
    };

    let prompt = format!(
        "Select another playlist. All of the songs from that playlist will be added to {}",
        target_name
    );
    let Some( source_id ) = choose_other_playlist( collection, id, &prompt )? else {
        return Ok(());
    };

    // Titles come first; the mutable borrow below would block the lookup.
    let additions: Vec<( TrackId, String )> = {
        let Some( source ) = collection.playlist( source_id ) else {
            return Ok(());
        };
        collection
            .flattened_with_downstream( source )
            .into_iter()
            .map( |track| {
                let title = collection
                    .track( track )
                    .map( Track::display_title )
                    .unwrap_or_else( || track.to_string() );
                ( track, title )
            })
            .collect()
    };

    if let Some( target ) = collection.playlist_mut( id ) {
        for ( track, title ) in additions {
            target.add_song( track );
            println!( "Added {} to {}!", title, target_name );
        }
    }
    Ok(())
}


fn add_dependency( collection: &mut Collection, id: PlaylistId, direction: Direction ) -> Result<()> {
    let target_name = match collection.playlist( id ) {
        Some( playlist ) => playlist.name().to_string(),
        None => return Ok(()),
    };

    let side = match direction {
        Direction::Downstream => "downstream",
        Direction::Upstream => "upstream",
    };
    let prompt = format!(
        "Select another playlist. That playlist will be added as an {} playlist to {}",
        side, target_name
    );
    let Some( other ) = choose_other_playlist( collection, id, &prompt )? else {
        return Ok(());
    };
    let other_name = match collection.playlist( other ) {
        Some( playlist ) => playlist.name().to_string(),
        None => return Ok(()),
    };

    let added = match direction {
        Direction::Downstream => collection.add_downstream_to_playlist( id, other )?,
        Direction::Upstream => collection.add_upstream_to_playlist( id, other )?,
    };

    if added {
        println!( "Added {} as an {} playlist to {}!", other_name, side, target_name );
    } else {
        println!( "Failed to add {} as an {} playlist to {}!", other_name, side, target_name );
    }
    Ok(())
}


fn remove_songs_from_playlist( collection: &mut Collection, id: PlaylistId ) -> Result<()> {
    loop {
        let ( name, titles ) = {
            let Some( playlist ) = collection.playlist( id ) else {
                break;
            };
            let titles: Vec<String> = playlist
                .flattened_songs()
                .iter()
                .map( |track| {
                    collection
                        .track( *track )
                        .map( |t| t.song_name().to_string() )
                        .unwrap_or_else( || track.to_string() )
                })
                .collect();
            ( playlist.name().to_string(), titles )
        };
        if titles.is_empty() {
            break;
        }

        for ( idx, title ) in titles.iter().enumerate() {
            println!( "{}: {}", idx + 1, title );
        }
        let option = read_line(
            "Please enter the number of the song you would like to remove from the playlist or STOP to stop removing songs: ",
        )?;
        if option.eq_ignore_ascii_case( "stop" ) {
            break;
        }

        match option.parse::<usize>() {
            Ok( n ) if ( 1..=titles.len() ).contains( &n ) => {
                let ( _, deleted ) = collection.remove_song_from_playlist( id, n - 1 )?;
                println!( "{} has been removed from {}!", titles[ n - 1 ], name );
                if deleted {
                    println!(
                        "All songs have been removed from \"{}\"! \"{}\" has been deleted!",
                        name, name
                    );
                    break;
                }
            }
            _ => println!( "Invalid selection!" ),
        }
    }

    Ok(())
}


fn link_songs_menu( collection: &mut Collection, id: PlaylistId ) -> Result<()> {
    // (title, top-level slot index) of every still-linkable song.
    let mut linkable: Vec<( String, usize )> = {
        let Some( playlist ) = collection.playlist( id ) else {
            return Ok(());
        };
        playlist
            .linkable_songs()
            .into_iter()
            .map( |( track, slot_idx )| {
                let title = collection
                    .track( track )
                    .map( |t| t.song_name().to_string() )
                    .unwrap_or_else( || track.to_string() );
                ( title, slot_idx )
            })
            .collect()
    };

    if linkable.len() <= 1 {
        println!( "There are not enough songs to link. Please add songs via the main menu first." );
        return Ok(());
    }

    println!();
    println!( "Choose songs to link:" );

    let mut selected_indices: Vec<usize> = Vec::new();
    let mut selected_titles: Vec<String> = Vec::new();

    loop {
        println!();
        println!( "Songs in playlist:" );
        for ( idx, ( title, _ ) ) in linkable.iter().enumerate() {
            println!( "{}: {}", idx + 1, title );
        }
        println!();
        if !selected_titles.is_empty() {
            println!( "Songs already in link: [{}]", selected_titles.join( ", " ) );
        }

        let option = read_line(
            "Please enter the number of the song you would like to link or STOP to stop linking songs: ",
        )?;
        if option.eq_ignore_ascii_case( "stop" ) {
            break;
        }

        match option.parse::<usize>() {
            Ok( n ) if ( 1..=linkable.len() ).contains( &n ) => {
                let ( title, slot_idx ) = linkable.remove( n - 1 );
                selected_indices.push( slot_idx );
                selected_titles.push( title );
            }
            _ => println!( "Invalid option!" ),
        }
    }

    if selected_indices.len() > 1 {
        if let Some( playlist ) = collection.playlist_mut( id ) {
            playlist.link_songs( &selected_indices )?;
            println!( "Linked {} songs!", selected_indices.len() );
        }
    }
    Ok(())
}


/// Lists playlists and reads a selection; `None` when there are none or
/// the input is invalid.
fn choose_playlist( collection: &Collection, action: &str ) -> io::Result<Option<PlaylistId>> {
    let playlists = collection.playlists_sorted();
    if playlists.is_empty() {
        println!( "There are no playlists." );
        return Ok( None );
    }

    println!( "Playlists:" );
    for ( idx, playlist ) in playlists.iter().enumerate() {
        println!( "{} - {}", idx + 1, playlist.name() );
    }
    println!();

    let option = read_line( &format!(
        "Please enter the number of the playlist you would like to {}: ",
        action
    ))?;
    match option.parse::<usize>() {
        Ok( n ) if ( 1..=playlists.len() ).contains( &n ) => Ok( Some( playlists[ n - 1 ].id() ) ),
        _ => {
            println!( "Invalid selection!" );
            Ok( None )
        }
    }
}


/// Lists every playlist except `current` and reads a selection or CANCEL.
fn choose_other_playlist(
    collection: &Collection,
    current: PlaylistId,
    prompt: &str,
) -> io::Result<Option<PlaylistId>> {
    println!( "{}", prompt );
    println!();
    println!( "Playlists:" );

    let candidates: Vec<&Playlist> = collection
        .playlists_sorted()
        .into_iter()
        .filter( |playlist| playlist.id() != current )
        .collect();
    for ( idx, playlist ) in candidates.iter().enumerate() {
        println!( "{} - {}", idx + 1, playlist.name() );
    }
    println!();

    loop {
        let selection = read_line( "Enter the number of playlist or CANCEL: " )?;
        if selection.eq_ignore_ascii_case( "cancel" ) {
            return Ok( None );
        }
        match selection.parse::<usize>() {
            Ok( n ) if ( 1..=candidates.len() ).contains( &n ) => {
                return Ok( Some( candidates[ n - 1 ].id() ) );
            }
            _ => println!( "Invalid selection!" ),
        }
    }
}


/// Shows the song list repeatedly and collects picks until STOP. A pick
/// `validate` rejects can still go in after an explicit confirmation.
fn pick_songs(
    collection: &Collection,
    prompt: &str,
    mut validate: impl FnMut( &Track, &[TrackId] ) -> bool,
) -> io::Result<Vec<TrackId>> {
    let tracks: Vec<&Track> = collection.tracks().collect();
    let mut picked: Vec<TrackId> = Vec::new();

    println!();
    println!( "{}", prompt );

    loop {
        println!();
        println!( "All playable songs:" );
        for ( idx, track ) in tracks.iter().enumerate() {
            println!( "{}: {}", idx + 1, track.song_name() );
        }
        println!();

        let option = read_line(
            "Please enter the number of the song you would like to add or STOP to stop adding songs: ",
        )?;
        if option.eq_ignore_ascii_case( "stop" ) {
            break;
        }

        match option.parse::<usize>() {
            Ok( n ) if ( 1..=tracks.len() ).contains( &n ) => {
                let track = tracks[ n - 1 ];
                if validate( track, &picked ) || confirm( "Would you still like to add the song?" )? {
                    picked.push( track.id() );
                }
            }
            _ => println!( "Invalid option!" ),
        }
    }

    Ok( picked )
}
