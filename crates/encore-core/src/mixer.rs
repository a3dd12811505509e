//! Concrete playback backend
//!
//! Wires the decoder to the audio output on a worker thread and exposes
//! the play/stop/is-playing surface the playback driver consumes. One
//! track sounds at a time; starting a new one stops the previous one.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread;
use std::time::Duration;

use crate::decoder::Decoder;
use crate::output::{ AudioOutput, SampleQueue };
use crate::player::{ AudioBackend, PlayerError };


/// State of the track currently sounding.
struct ActiveTrack {
    stop_flag: Arc<AtomicBool>,
    // Set by the decode thread once the track has fully drained or failed.
    done: Arc<AtomicBool>,
    queue: Arc<SampleQueue>,
    thread: Option<thread::JoinHandle<()>>,
    // Held for its Drop impl, which tears the cpal stream down.
    _output: AudioOutput,
}


/// Plays one audio file at a time through the system output device.
#[derive( Default )]
pub struct Mixer {
    current: Option<ActiveTrack>,
}


impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }


    fn decode_loop(
        mut decoder: Decoder,
        queue: Arc<SampleQueue>,
        stop_flag: Arc<AtomicBool>,
        done: Arc<AtomicBool>,
    ) {
        // Keep about 50ms decoded ahead of the callback.
        let high_water = decoder.sample_rate() as usize * decoder.channels() / 20;

        loop {
            if stop_flag.load( Ordering::Relaxed ) {
                break;
            }

            if queue.len() > high_water {
                thread::sleep( Duration::from_millis( 5 ) );
                continue;
            }

            match decoder.decode_next() {
                Ok( Some( samples ) ) => {
                    let mut offset = 0;
                    while offset < samples.len() && !stop_flag.load( Ordering::Relaxed ) {
                        let pushed = queue.push( &samples[ offset.. ] );
                        offset += pushed;
                        if pushed == 0 {
                            thread::sleep( Duration::from_millis( 5 ) );
                        }
                    }
                }
                Ok( None ) => {
                    // EOF: let the buffered tail drain before reporting
                    // the track over.
                    while !queue.is_empty() && !stop_flag.load( Ordering::Relaxed ) {
                        thread::sleep( Duration::from_millis( 10 ) );
                    }
                    break;
                }
                Err( e ) => {
                    tracing::error!( "Decode error: {}", e );
                    break;
                }
            }
        }

        done.store( true, Ordering::Relaxed );
        tracing::debug!( "Decode loop: exiting" );
    }
}


impl AudioBackend for Mixer {
    fn play( &mut self, path: &Path ) -> Result<(), PlayerError> {
        self.stop();

        let decoder = Decoder::open( path )
            .map_err( |e| PlayerError::FileOpen( e.to_string() ) )?;
        let ( output, queue ) = AudioOutput::new( decoder.sample_rate(), decoder.channels() as u16 )
            .map_err( |e| PlayerError::Output( e.to_string() ) )?;
        output.start().map_err( |e| PlayerError::Output( e.to_string() ) )?;

        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let done = Arc::new( AtomicBool::new( false ) );

        let thread_queue = Arc::clone( &queue );
        let thread_stop = Arc::clone( &stop_flag );
        let thread_done = Arc::clone( &done );
        let thread = thread::spawn( move || {
            Self::decode_loop( decoder, thread_queue, thread_stop, thread_done );
        });

        self.current = Some( ActiveTrack {
            stop_flag,
            done,
            queue,
            thread: Some( thread ),
            _output: output,
        });

        Ok(())
    }


    fn stop( &mut self ) {
        if let Some( mut active ) = self.current.take() {
            active.stop_flag.store( true, Ordering::Relaxed );
            active.queue.clear();

            if let Some( thread ) = active.thread.take() {
                let _ = thread.join();
            }
            // The cpal stream stops when _output drops here.
        }
    }


    fn is_playing( &self ) -> bool {
        self.current
            .as_ref()
            .map( |active| !active.done.load( Ordering::Relaxed ) )
            .unwrap_or( false )
    }
}


impl Drop for Mixer {
    fn drop( &mut self ) {
        self.stop();
    }
}
