//! Command-line argument parsing for Encore.

use std::path::PathBuf;

use clap::Parser;


/// Encore - a console music library manager.
#[derive( Parser, Debug )]
#[command( name = "encore" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Library file to use instead of the default location.
    #[arg( short, long )]
    pub library: Option<PathBuf>,
}
