//! # impro-types
//!
//! Shared type definitions for the impro workspace.
//! This crate contains the data structures used across impro-audio,
//! impro-core and impro-ui: keys and their pitch sets, note events, the
//! chord token codec, the chord aggregator and the engine configuration.

pub mod chord;
pub mod config;
pub mod event;
pub mod music;
pub mod token;

pub use chord::ChordAggregator;
pub use config::EngineConfig;
pub use event::{NoteEvent, NoteEventKind, MAX_VELOCITY};
pub use music::{Key, Mode, PitchClass, PitchSet, KEY_COUNT, MAX_PITCH};
pub use token::{decode_token, decode_token_into, encode_token, encode_token_into, EMPTY_CHORD_TOKEN};
