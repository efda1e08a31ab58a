//! Album metadata lookup

pub mod gnudb;
pub mod musicbrainz;
pub mod resolver;

pub use gnudb::{CddbLookup, DiscData, GnudbClient};
pub use musicbrainz::{AlbumCandidate, MbError, MbRelease, MusicBrainzClient, ReleaseLookup};
pub use resolver::{MetadataResolver, ResolvedBy, Resolution};
