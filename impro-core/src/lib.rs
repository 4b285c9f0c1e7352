//! # impro-core
//!
//! Host plumbing for the impro engine: configuration, MIDI I/O, model
//! files and the processing thread. Independent of any front end.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use impro_core::config::Config;
//! use impro_core::midi::{MidiInputManager, MidiOutputManager};
//! use impro_core::session::{Session, SessionConfig};
//!
//! // 1. Engine settings from config.toml
//! let config = Config::load();
//! let (handle, engine) = impro_audio::create_engine(&config.engine());
//!
//! // 2. MIDI ports
//! let mut input = MidiInputManager::new();
//! input.connect(0)?;
//! let output = MidiOutputManager::connect(0, config.midi_channel())?;
//!
//! // 3. Start processing; control the engine through `handle`
//! let session = Session::start(
//!     engine,
//!     Some(input.receiver()),
//!     Box::new(output),
//!     SessionConfig { sample_rate: config.sample_rate(), block_size: config.block_size() },
//! )?;
//! handle.set_generating(true);
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: embedded `config.toml` merged with the user's override
//! - [`midi`]: `midir` input/output managers and raw message parsing
//! - [`model_file`]: atomic save, load and listing of model blobs
//! - [`paths`]: model and log file locations
//! - [`session`]: the processing thread that runs the engine block by block

pub mod config;
pub mod midi;
pub mod model_file;
pub mod paths;
pub mod session;
