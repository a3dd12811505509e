//! Audio output via cpal
//!
//! Sends decoded PCM samples to the system audio device through a shared
//! bounded queue between the decode thread and the audio callback.

use std::collections::VecDeque;
use std::sync::{ Arc, Mutex };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to start stream: {0}" )]
    StartStream( String ),
}


/// Bounded sample queue between producer (decode thread) and consumer
/// (audio callback). Remixes frames when the device channel count differs
/// from the source.
pub struct SampleQueue {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    source_channels: usize,
    output_channels: usize,
}


impl SampleQueue {
    fn new( capacity: usize, source_channels: usize, output_channels: usize ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            source_channels,
            output_channels,
        }
    }


    /// Pushes samples to the queue. Returns how many were accepted.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.buffer.lock().unwrap();
        let available = self.capacity.saturating_sub( buf.len() );
        let to_push = samples.len().min( available );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Fills `output` from the queue, remixing between channel counts and
    /// padding with silence when the queue runs dry.
    pub fn pop_into( &self, output: &mut [f32] ) {
        let mut buf = self.buffer.lock().unwrap();
        let src_ch = self.source_channels;
        let out_ch = self.output_channels;
        let mut written = 0;

        if src_ch == out_ch {
            while written < output.len() {
                match buf.pop_front() {
                    Some( sample ) => {
                        output[ written ] = sample;
                        written += 1;
                    }
                    None => break,
                }
            }
        } else {
            let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
            for frame in 0..frames {
                // Average the source frame down to one value, then fan it
                // out across the output channels. Covers the mono/stereo
                // pairs this library actually produces.
                let mut sum = 0.0;
                for _ in 0..src_ch {
                    sum += buf.pop_front().unwrap_or( 0.0 );
                }
                let sample = sum / src_ch as f32;
                for ch in 0..out_ch {
                    output[ frame * out_ch + ch ] = sample;
                }
            }
            written = frames * out_ch;
        }

        for sample in output[ written.. ].iter_mut() {
            *sample = 0.0;
        }
    }


    /// Number of samples currently queued.
    pub fn len( &self ) -> usize {
        self.buffer.lock().unwrap().len()
    }


    pub fn is_empty( &self ) -> bool {
        self.buffer.lock().unwrap().is_empty()
    }


    pub fn clear( &self ) {
        self.buffer.lock().unwrap().clear();
    }
}


/// Audio output handler.
/// Not Send/Sync because of cpal::Stream; stays on the thread that
/// created it. Dropping it stops the stream.
pub struct AudioOutput {
    stream: cpal::Stream,
}


impl AudioOutput {
    /// Opens the default output device at the source's sample rate and
    /// returns the output plus the shared queue to feed it.
    ///
    /// Config negotiation prefers a matching channel count, then any
    /// config covering the source rate, then the device default with a
    /// warning (playback speed may be off at that point).
    pub fn new(
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( Self, Arc<SampleQueue> ), OutputError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let covers_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate
                && source_sample_rate <= c.max_sample_rate().0
        };

        let config = supported
            .iter()
            .find( |c| c.channels() == source_channels && covers_rate( c ) )
            .or_else( || supported.iter().find( |c| covers_rate( c ) ) )
            .map( |c| {
                c.clone()
                    .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                    .config()
            });

        let config = match config {
            Some( config ) => config,
            None => {
                let default_config = device
                    .default_output_config()
                    .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?;
                tracing::warn!(
                    "Sample rate mismatch: file is {} Hz, device defaults to {} Hz",
                    source_sample_rate,
                    default_config.sample_rate().0
                );
                default_config.config()
            }
        };

        tracing::debug!(
            "Audio output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // Roughly half a second of audio.
        let capacity = source_sample_rate as usize * source_channels as usize / 2;
        let queue = Arc::new( SampleQueue::new(
            capacity,
            source_channels as usize,
            config.channels as usize,
        ));
        let callback_queue = Arc::clone( &queue );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_queue.pop_into( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok(( Self { stream }, queue ))
    }


    /// Starts audio output.
    pub fn start( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::StartStream( e.to_string() ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_queue_respects_capacity() {
        let queue = SampleQueue::new( 4, 2, 2 );
        assert_eq!( queue.push( &[0.1, 0.2, 0.3] ), 3 );
        assert_eq!( queue.push( &[0.4, 0.5] ), 1 );
        assert_eq!( queue.len(), 4 );
    }


    #[test]
    fn test_pop_pads_with_silence() {
        let queue = SampleQueue::new( 8, 2, 2 );
        queue.push( &[0.5, 0.5] );

        let mut out = [1.0_f32; 4];
        queue.pop_into( &mut out );

        assert_eq!( out, [0.5, 0.5, 0.0, 0.0] );
        assert!( queue.is_empty() );
    }


    #[test]
    fn test_mono_source_fans_out_to_stereo() {
        let queue = SampleQueue::new( 8, 1, 2 );
        queue.push( &[0.25, 0.75] );

        let mut out = [0.0_f32; 4];
        queue.pop_into( &mut out );

        assert_eq!( out, [0.25, 0.25, 0.75, 0.75] );
    }


    #[test]
    fn test_stereo_source_averages_to_mono() {
        let queue = SampleQueue::new( 8, 2, 1 );
        queue.push( &[0.2, 0.4] );

        let mut out = [0.0_f32; 1];
        queue.pop_into( &mut out );

        assert!( ( out[ 0 ] - 0.3 ).abs() < 1e-6 );
    }
}
