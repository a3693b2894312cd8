//! Matching side of the SCF matcher: the feature engine adapter, the pairwise
//! tile comparison with its area gate, verification against the reference
//! templates, and correspondence output.

pub mod brute_force;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod keyfile;
pub mod pairwise;
pub mod reference;
pub mod remap;
pub mod sift_command;
pub mod verifier;

pub use brute_force::{BruteForceMatcher, MatcherParams};
pub use emitter::CorrespondenceEmitter;
pub use engine::ExternalEngine;
pub use error::{MatchError, MatchResult};
pub use pairwise::{MatchReport, PairwiseMatcher};
pub use reference::{ReferenceSet, REFERENCE_COUNT};
pub use remap::IndexRemap;
pub use sift_command::SiftCommand;
pub use verifier::{ReferenceVerifier, Verification};
