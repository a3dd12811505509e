//! Audio decoding and tag probing via Symphonia
//!
//! Decodes audio files into interleaved f32 samples and reads the display
//! tags the console shows (title and artist).

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::formats::{ FormatOptions, FormatReader };
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{ MetadataOptions, StandardTagKey, Tag };
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::track::{ TagReader, TrackTags };


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),
}


/// Audio decoder wrapper around Symphonia.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    sample_buf: Option<SampleBuffer<f32>>,
}


impl Decoder {
    /// Opens an audio file for decoding.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let mss = MediaSourceStream::new( Box::new( file ), Default::default() );

        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| DecoderError::UnsupportedFormat )?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or( 44100 );
        let channels = track.codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );

        let decoder = symphonia::default::get_codecs()
            .make( &track.codec_params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        tracing::debug!( "Opened audio: {} Hz, {} channels", sample_rate, channels );

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            sample_buf: None,
        })
    }


    /// Returns the sample rate of the audio.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// Returns the number of channels.
    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Decodes the next packet and returns interleaved f32 samples.
    ///
    /// Returns None when EOF is reached.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( symphonia::core::errors::Error::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None );
                }
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                // Decode errors are recoverable, skip this packet.
                Err( symphonia::core::errors::Error::DecodeError( _ ) ) => continue,
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();

            if self.sample_buf.as_ref().map( |b| b.capacity() < num_frames ).unwrap_or( true ) {
                self.sample_buf = Some( SampleBuffer::new( num_frames as u64, spec ) );
            }

            let sample_buf = self.sample_buf.as_mut().unwrap();
            sample_buf.copy_interleaved_ref( decoded );

            return Ok( Some( sample_buf.samples().to_vec() ) );
        }
    }
}


/// Reads the display tags of an audio file without decoding it.
///
/// Failures are logged and fall back to empty tags; a file with unreadable
/// metadata is still playable.
pub fn read_tags( path: &Path ) -> TrackTags {
    let mut tags = TrackTags::default();

    let file = match File::open( path ) {
        Ok( f ) => f,
        Err( e ) => {
            tracing::warn!( "Failed to open {:?} for tag probing: {}", path, e );
            return tags;
        }
    };

    let mss = MediaSourceStream::new( Box::new( file ), Default::default() );
    let mut hint = Hint::new();
    if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
        hint.with_extension( ext );
    }

    let mut probed = match symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) {
        Ok( probed ) => probed,
        Err( _ ) => {
            tracing::debug!( "No readable metadata in {:?}", path );
            return tags;
        }
    };

    // ID3-style tags land in the probe metadata; container-level tags come
    // from the format reader.
    if let Some( metadata ) = probed.metadata.get() {
        if let Some( revision ) = metadata.current() {
            collect_tags( &mut tags, revision.tags() );
        }
    }
    if tags.title.is_none() || tags.artist.is_none() {
        if let Some( revision ) = probed.format.metadata().current() {
            collect_tags( &mut tags, revision.tags() );
        }
    }

    tags
}


fn collect_tags( tags: &mut TrackTags, entries: &[Tag] ) {
    for entry in entries {
        match entry.std_key {
            Some( StandardTagKey::TrackTitle ) if tags.title.is_none() => {
                tags.title = Some( entry.value.to_string() );
            }
            Some( StandardTagKey::Artist ) if tags.artist.is_none() => {
                tags.artist = Some( entry.value.to_string() );
            }
            _ => {}
        }
    }
}


/// Tag reader backed by Symphonia's metadata probe.
#[derive( Debug, Default )]
pub struct SymphoniaTagReader;


impl TagReader for SymphoniaTagReader {
    fn read_tags( &self, path: &Path ) -> TrackTags {
        read_tags( path )
    }
}
