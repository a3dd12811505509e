//! Clone groups
//!
//! A clone group is one logical song backed by several interchangeable
//! files. At play time a single variant is drawn at random, weight
//! proportional.

use rand::distributions::{ Distribution, WeightedError, WeightedIndex };
use rand::Rng;
use thiserror::Error;

use crate::track::{ CloneGroupId, TrackId };


/// Errors that can occur when resolving a clone group.
#[derive( Debug, Error )]
pub enum CloneError {
    #[error( "clone group {0} is empty" )]
    Empty( CloneGroupId ),

    #[error( "clone group {0} has no variant with a positive weight" )]
    NoPositiveWeight( CloneGroupId ),
}


/// One physical file within a clone group, with its selection weight.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct CloneVariant {
    pub track: TrackId,
    pub weight: u32,
}


/// One logical song with several weighted physical variants.
#[derive( Debug, Clone )]
pub struct CloneGroup {
    id: CloneGroupId,
    variants: Vec<CloneVariant>,
}


impl CloneGroup {
    pub fn new( id: CloneGroupId, variants: Vec<CloneVariant> ) -> Self {
        Self { id, variants }
    }


    pub fn id( &self ) -> CloneGroupId {
        self.id
    }


    pub fn variants( &self ) -> &[CloneVariant] {
        &self.variants
    }


    /// Draws the track to play, weight proportional.
    ///
    /// A variant with weight zero is never selected. A group whose weights
    /// are all zero is a caller error, not a valid distribution.
    pub fn song_to_play( &self, rng: &mut impl Rng ) -> Result<TrackId, CloneError> {
        let dist = WeightedIndex::new( self.variants.iter().map( |v| v.weight ) )
            .map_err( |e| match e {
                WeightedError::NoItem => CloneError::Empty( self.id ),
                _ => CloneError::NoPositiveWeight( self.id ),
            })?;

        Ok( self.variants[ dist.sample( rng ) ].track )
    }
}


#[cfg( test )]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    use super::*;


    fn group_with_weights( weights: &[u32] ) -> ( CloneGroup, Vec<TrackId> ) {
        let tracks: Vec<TrackId> = weights.iter().map( |_| Uuid::new_v4() ).collect();
        let variants = tracks
            .iter()
            .zip( weights )
            .map( |( track, weight )| CloneVariant { track: *track, weight: *weight } )
            .collect();
        ( CloneGroup::new( Uuid::new_v4(), variants ), tracks )
    }


    #[test]
    fn test_zero_weight_never_selected() {
        let ( group, tracks ) = group_with_weights( &[0, 5, 5] );
        let mut rng = SmallRng::seed_from_u64( 7 );

        let mut picks = [0usize; 3];
        for _ in 0..10_000 {
            let chosen = group.song_to_play( &mut rng ).unwrap();
            let idx = tracks.iter().position( |t| *t == chosen ).unwrap();
            picks[ idx ] += 1;
        }

        assert_eq!( picks[ 0 ], 0 );
        // Equal weights should land within 10% of an even split.
        assert!( picks[ 1 ] > 4_500 && picks[ 1 ] < 5_500, "picks: {:?}", picks );
        assert!( picks[ 2 ] > 4_500 && picks[ 2 ] < 5_500, "picks: {:?}", picks );
    }


    #[test]
    fn test_all_zero_weights_is_an_error() {
        let ( group, _ ) = group_with_weights( &[0, 0] );
        let mut rng = SmallRng::seed_from_u64( 7 );
        assert!( matches!(
            group.song_to_play( &mut rng ),
            Err( CloneError::NoPositiveWeight( _ ) )
        ));
    }


    #[test]
    fn test_empty_group_is_an_error() {
        let group = CloneGroup::new( Uuid::new_v4(), Vec::new() );
        let mut rng = SmallRng::seed_from_u64( 7 );
        assert!( matches!( group.song_to_play( &mut rng ), Err( CloneError::Empty( _ ) ) ) );
    }
}
