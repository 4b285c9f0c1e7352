//! Line-oriented control console.

use std::path::PathBuf;
use std::time::Duration;

use impro_audio::{EngineFeedback, EngineHandle};
use impro_core::model_file::{list_models, load_model, resolve_model_path, save_model};
use impro_types::{NoteEvent, MAX_PITCH, MAX_VELOCITY};

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_MODEL_NAME: &str = "model";

pub const HELP: &str = "\
commands:
  learn on|off       learn from incoming notes
  gen on|off         generate notes from the model
  random <0-100>     randomness in percent
  reset              clear the model and key
  save [name|path]   save the model
  load <name|path>   load a model
  models             list saved models
  key                show the current key
  stats              engine status and fault counters
  note <pitch> [vel] play a note into the engine
  off <pitch>        release a note
  help               this text
  quit               exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Learn(bool),
    Generate(bool),
    /// 0.0-1.0
    Randomness(f32),
    Reset,
    Save(Option<String>),
    Load(String),
    Models,
    Key,
    Stats,
    Note { pitch: u8, velocity: u8 },
    Off { pitch: u8 },
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let command = match verb.to_ascii_lowercase().as_str() {
        "learn" => Command::Learn(parse_switch(arg)?),
        "gen" | "generate" => Command::Generate(parse_switch(arg)?),
        "random" | "randomness" => {
            let percent: f32 = arg
                .ok_or("random needs a value 0-100")?
                .parse()
                .map_err(|_| "random needs a value 0-100".to_string())?;
            if !(0.0..=100.0).contains(&percent) {
                return Err("random needs a value 0-100".to_string());
            }
            Command::Randomness(percent / 100.0)
        }
        "reset" => Command::Reset,
        "save" => Command::Save(arg.map(str::to_string)),
        "load" => Command::Load(arg.ok_or("load needs a model name or path")?.to_string()),
        "models" | "ls" => Command::Models,
        "key" => Command::Key,
        "stats" | "status" => Command::Stats,
        "note" => {
            let pitch = parse_pitch(arg)?;
            let velocity = match words.next() {
                Some(v) => v
                    .parse::<u8>()
                    .ok()
                    .filter(|v| (1..=MAX_VELOCITY).contains(v))
                    .ok_or("velocity must be 1-127")?,
                None => 100,
            };
            Command::Note { pitch, velocity }
        }
        "off" => Command::Off {
            pitch: parse_pitch(arg)?,
        },
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };
    Ok(Some(command))
}

fn parse_switch(arg: Option<&str>) -> Result<bool, String> {
    match arg.map(str::to_ascii_lowercase).as_deref() {
        Some("on") | Some("1") | Some("true") => Ok(true),
        Some("off") | Some("0") | Some("false") => Ok(false),
        _ => Err("expected on or off".to_string()),
    }
}

fn parse_pitch(arg: Option<&str>) -> Result<u8, String> {
    arg.and_then(|p| p.parse::<u8>().ok())
        .filter(|&p| p <= MAX_PITCH)
        .ok_or_else(|| "pitch must be 0-127".to_string())
}

pub enum Outcome {
    Continue(Option<String>),
    Quit,
}

pub struct Console {
    handle: EngineHandle,
    models_dir: PathBuf,
}

impl Console {
    pub fn new(handle: EngineHandle, models_dir: PathBuf) -> Self {
        Self { handle, models_dir }
    }

    #[cfg(test)]
    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    pub fn execute(&mut self, command: Command) -> Result<Outcome, String> {
        let message = match command {
            Command::Learn(on) => {
                self.handle.set_learning(on);
                format!("learning {}", on_off(on))
            }
            Command::Generate(on) => {
                self.handle.set_generating(on);
                format!("generating {}", on_off(on))
            }
            Command::Randomness(randomness) => {
                self.handle.set_randomness(randomness);
                format!("randomness {:.0}%", self.handle.randomness() * 100.0)
            }
            Command::Reset => {
                self.handle.reset()?;
                "model reset".to_string()
            }
            Command::Save(name) => {
                let name = name.as_deref().unwrap_or(DEFAULT_MODEL_NAME);
                let path = resolve_model_path(name, &self.models_dir);
                let state = self.handle.snapshot(SNAPSHOT_TIMEOUT)?;
                save_model(&path, &state.export()).map_err(|e| format!("save {}: {}", path.display(), e))?;
                format!("saved {}", path.display())
            }
            Command::Load(name) => {
                let path = resolve_model_path(&name, &self.models_dir);
                let blob = load_model(&path).map_err(|e| format!("load {}: {}", path.display(), e))?;
                self.handle.load_blob(&blob)?;
                format!("loaded {}", path.display())
            }
            Command::Models => {
                let models = list_models(&self.models_dir).map_err(|e| e.to_string())?;
                if models.is_empty() {
                    format!("no models in {}", self.models_dir.display())
                } else {
                    models
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Command::Key => match self.handle.status().key {
                Some(key) => format!("key: {}", key),
                None => "key: (none yet)".to_string(),
            },
            Command::Stats => self.stats(),
            Command::Note { pitch, velocity } => {
                self.handle.inject_note(NoteEvent::note_on(pitch, velocity, 0))?;
                return Ok(Outcome::Continue(None));
            }
            Command::Off { pitch } => {
                self.handle.inject_note(NoteEvent::note_off(pitch, 0))?;
                return Ok(Outcome::Continue(None));
            }
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Continue(Some(message)))
    }

    /// Key changes reported since the last call, one line each.
    pub fn key_changes(&mut self) -> Vec<String> {
        self.handle
            .drain_feedback()
            .into_iter()
            .filter_map(|msg| match msg {
                EngineFeedback::KeyChanged { key: Some(_), name } => Some(format!("key changed: {}", name)),
                EngineFeedback::KeyChanged { key: None, .. } => Some("key cleared".to_string()),
                _ => None,
            })
            .collect()
    }

    fn stats(&mut self) -> String {
        let status = self.handle.status();
        let counters = self.handle.counters();
        let [pitch, ioi, duration, velocity] = status.chain_tokens;
        format!(
            "clock {} | learning {} | generating {} | randomness {:.0}%\n\
             key {} | bootstrapped {} | sounding {}\n\
             tokens: pitch {} ioi {} duration {} velocity {}\n\
             faults: malformed {} clamped-ioi {} invalid {} dropped-feedback {} dropped-commands {}",
            status.clock,
            on_off(self.handle.learning()),
            on_off(self.handle.generating()),
            self.handle.randomness() * 100.0,
            status.key.map(|k| k.name()).unwrap_or("-"),
            status.bootstrapped,
            status.pending_note_offs,
            pitch,
            ioi,
            duration,
            velocity,
            counters.malformed_tokens,
            counters.clamped_iois,
            counters.invalid_events,
            counters.dropped_feedback,
            counters.dropped_commands,
        )
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impro_audio::create_engine;
    use impro_core::midi::NoteSink;
    use impro_core::session::{Session, SessionConfig};
    use impro_types::EngineConfig;
    use tempfile::TempDir;

    struct Discard;

    impl NoteSink for Discard {
        fn send(&mut self, _events: &[NoteEvent]) {}
    }

    fn message(outcome: Outcome) -> Option<String> {
        match outcome {
            Outcome::Continue(message) => message,
            Outcome::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn parses_switches() {
        assert_eq!(parse_command("learn on"), Ok(Some(Command::Learn(true))));
        assert_eq!(parse_command("  GEN off "), Ok(Some(Command::Generate(false))));
        assert!(parse_command("learn maybe").is_err());
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn parses_randomness_percent() {
        assert_eq!(parse_command("random 25"), Ok(Some(Command::Randomness(0.25))));
        assert!(parse_command("random 101").is_err());
        assert!(parse_command("random").is_err());
    }

    #[test]
    fn parses_notes() {
        assert_eq!(
            parse_command("note 60"),
            Ok(Some(Command::Note {
                pitch: 60,
                velocity: 100
            }))
        );
        assert_eq!(
            parse_command("note 64 30"),
            Ok(Some(Command::Note {
                pitch: 64,
                velocity: 30
            }))
        );
        assert!(parse_command("note 128").is_err());
        assert!(parse_command("note 60 0").is_err());
        assert_eq!(parse_command("off 60"), Ok(Some(Command::Off { pitch: 60 })));
    }

    #[test]
    fn parses_files_and_misc() {
        assert_eq!(parse_command("save"), Ok(Some(Command::Save(None))));
        assert_eq!(parse_command("save jazz"), Ok(Some(Command::Save(Some("jazz".into())))));
        assert_eq!(parse_command("load jazz"), Ok(Some(Command::Load("jazz".into()))));
        assert!(parse_command("load").is_err());
        assert_eq!(parse_command("q"), Ok(Some(Command::Quit)));
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn toggles_reach_the_engine() {
        let dir = TempDir::new().unwrap();
        let (handle, _engine) = create_engine(&EngineConfig::default());
        let mut console = Console::new(handle, dir.path().to_path_buf());
        let reply = message(console.execute(Command::Learn(true)).unwrap());
        assert_eq!(reply.as_deref(), Some("learning on"));
        assert!(console.handle().learning());
        console.execute(Command::Randomness(0.5)).unwrap();
        assert_eq!(console.handle().randomness(), 0.5);
    }

    #[test]
    fn save_and_load_through_files() {
        let dir = TempDir::new().unwrap();
        let (handle, engine) = create_engine(&EngineConfig {
            learning: true,
            ..Default::default()
        });
        let _session = Session::start(
            engine,
            None,
            Box::new(Discard),
            SessionConfig {
                sample_rate: 48_000,
                block_size: 256,
            },
        )
        .unwrap();
        let mut console = Console::new(handle, dir.path().to_path_buf());

        let reply = message(console.execute(Command::Save(Some("first".into()))).unwrap()).unwrap();
        assert!(reply.starts_with("saved"));
        let saved = dir.path().join("first.txt");
        assert!(saved.exists());
        let blob = std::fs::read_to_string(&saved).unwrap();
        assert!(blob.starts_with("#PITCH#"));

        let listing = message(console.execute(Command::Models).unwrap()).unwrap();
        assert!(listing.contains("first.txt"));

        let reply = message(console.execute(Command::Load("first".into())).unwrap()).unwrap();
        assert!(reply.starts_with("loaded"));
        assert!(console.execute(Command::Load("missing".into())).is_err());
    }
}
