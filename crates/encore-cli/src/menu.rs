//! Console menus
//!
//! Symbol-driven menus: print the prompt and the option list, read a
//! line, re-prompt until a known symbol comes in. Bad input never crashes
//! the process; it just asks again.

use std::io::{ self, BufRead, Write };


/// One selectable menu entry.
pub struct MenuOption {
    pub symbol: &'static str,
    pub description: String,
}


/// A prompt plus its ordered options.
pub struct Menu {
    prompt: String,
    options: Vec<MenuOption>,
}


impl Menu {
    pub fn new( prompt: impl Into<String> ) -> Self {
        Self { prompt: prompt.into(), options: Vec::new() }
    }


    /// Appends an option; builder style.
    pub fn option( mut self, symbol: &'static str, description: impl Into<String> ) -> Self {
        self.options.push( MenuOption { symbol, description: description.into() } );
        self
    }


    /// Prints the prompt and the option list.
    pub fn print( &self ) {
        println!( "{}", self.prompt );
        println!();
        for option in &self.options {
            println!( "{} - {}", option.symbol, option.description );
        }
        println!();
    }


    /// Prints the menu and reads selections until one matches an option
    /// symbol. Returns the symbol, uppercased.
    pub fn choose( &self ) -> io::Result<String> {
        loop {
            self.print();
            let symbol = read_line( "Enter menu option: " )?.to_uppercase();
            if self.options.iter().any( |option| option.symbol == symbol ) {
                return Ok( symbol );
            }
            println!( "Invalid option!" );
        }
    }
}


/// Prints `prompt` without a newline and reads one trimmed line from
/// stdin.
pub fn read_line( prompt: &str ) -> io::Result<String> {
    print!( "{}", prompt );
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line( &mut line )?;
    Ok( line.trim().to_string() )
}


/// Asks a yes/no question until one of the two answers comes in.
pub fn confirm( prompt: &str ) -> io::Result<bool> {
    loop {
        let answer = read_line( &format!( "{} (yes/no): ", prompt ) )?.to_lowercase();
        match answer.as_str() {
            "yes" => return Ok( true ),
            "no" => return Ok( false ),
            _ => {}
        }
    }
}
