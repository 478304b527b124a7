//! Decoding of sensor output
//!
//! - `keymap` turns key events back into characters
//! - `line` parses typed lines into readings
//! - `binary` decodes raw reports with ranked candidate layouts

mod binary;
pub mod keymap;
mod line;

pub use binary::{
    default_candidates, BinaryDecoder, CandidateAttempt, CandidateDecoding, DecodeFailure,
    DecodedReport, FieldEncoding, FieldSpec,
};
pub use keymap::{KeyOutput, KeyTranslator};
pub use line::{LineEvent, LineParser};
