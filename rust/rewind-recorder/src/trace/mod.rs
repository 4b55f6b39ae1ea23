//! Log encoding: record format, encoder, output sink and verifier.

pub mod encoder;
pub mod record;
pub mod sink;
pub mod verify;
