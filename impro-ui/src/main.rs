mod console;

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::Path;

use impro_core::config::Config;
use impro_core::midi::{self, MidiInputManager, MidiOutputManager, NoteSink};
use impro_core::model_file::load_model;
use impro_core::paths;
use impro_core::session::{Session, SessionConfig};
use impro_types::NoteEvent;

use console::{parse_command, Console, Outcome};

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = paths::log_file();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create(std::env::temp_dir().join("impro.log"))) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("impro: logging disabled, cannot create log file: {}", e);
            return;
        }
    };

    if let Err(e) = WriteLogger::init(log_level, Config::default(), log_file) {
        eprintln!("impro: failed to initialize logger: {}", e);
        return;
    }

    log::info!("impro starting (log level: {:?})", log_level);
}

/// Sink used when no output port is connected: generated notes only reach the log.
struct LogSink;

impl NoteSink for LogSink {
    fn send(&mut self, events: &[NoteEvent]) {
        for event in events {
            log::debug!(target: "midi", "out {:?}", event);
        }
    }
}

fn print_ports() {
    println!("MIDI inputs:");
    for port in midi::list_input_ports() {
        println!("  {}: {}", port.index, port.name);
    }
    println!("MIDI outputs:");
    for port in midi::list_output_ports() {
        println!("  {}: {}", port.index, port.name);
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn port_index(args: &[String], flag: &str) -> Option<usize> {
    let value = flag_value(args, flag)?;
    match value.parse() {
        Ok(index) => Some(index),
        Err(_) => {
            eprintln!("{} expects a port number, got '{}'", flag, value);
            None
        }
    }
}

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    if args.iter().any(|a| a == "--list-ports") {
        print_ports();
        return Ok(());
    }

    let config = Config::load();
    let (handle, engine) = impro_audio::create_engine(&config.engine());

    if let Some(path) = flag_value(&args, "--load") {
        match load_model(Path::new(path)).map_err(|e| e.to_string()).and_then(|blob| handle.load_blob(&blob)) {
            Ok(()) => println!("loaded {}", path),
            Err(e) => eprintln!("could not load {}: {}", path, e),
        }
    }

    let mut input = MidiInputManager::new();
    if let Some(index) = port_index(&args, "--in") {
        match input.connect(index) {
            Ok(()) => println!("input: {}", input.connected_port_name().unwrap_or("?")),
            Err(e) => eprintln!("input port {}: {}", index, e),
        }
    }

    let sink: Box<dyn NoteSink> = match port_index(&args, "--out") {
        Some(index) => match MidiOutputManager::connect(index, config.midi_channel()) {
            Ok(output) => {
                println!("output: {} (channel {})", output.port_name(), config.midi_channel());
                Box::new(output)
            }
            Err(e) => {
                eprintln!("output port {}: {}", index, e);
                Box::new(LogSink)
            }
        },
        None => Box::new(LogSink),
    };

    let session_config = SessionConfig {
        sample_rate: config.sample_rate(),
        block_size: config.block_size(),
    };
    let input_rx = input.is_connected().then(|| input.receiver());
    let mut session = Session::start(engine, input_rx, sink, session_config)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let models_dir = paths::models_dir(config.model_dir().as_deref());
    let mut console = Console::new(handle, models_dir);
    println!("impro ready, 'help' lists commands");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        for change in console.key_changes() {
            println!("{}", change);
        }
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        match console.execute(command) {
            Ok(Outcome::Continue(Some(message))) => println!("{}", message),
            Ok(Outcome::Continue(None)) => {}
            Ok(Outcome::Quit) => break,
            Err(e) => {
                log::warn!("command failed: {}", e);
                println!("error: {}", e);
            }
        }
        stdout.flush()?;
    }

    session.stop();
    input.disconnect();
    log::info!("impro exiting");
    Ok(())
}
