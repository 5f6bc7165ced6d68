//! Interactive console for the demo host.
//!
//! A rustyline REPL runs on its own thread and hands lines to the tick loop
//! over a channel, so console commands and engine ticks never race: both are
//! handled on the same task.

use anyhow::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::debug;

use midimap::config::ControllerConfig;
use midimap::mapper::MidiMapper;
use midimap::mapping::MessageKind;
use midimap::param::{BindingTarget, ParamProvider, ParamRegistry};

pub enum Outcome {
    Continue,
    Quit,
}

/// Start the console reader thread. The receiver yields one line per
/// command; it closes when the user hits EOF.
pub fn spawn_console() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                debug!("console unavailable: {}", e);
                return;
            }
        };
        loop {
            match editor.readline("midimap> ") {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(&line);
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    debug!("console read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Run one console command against the session.
pub async fn handle(
    line: &str,
    mapper: &mut MidiMapper,
    params: &ParamRegistry,
    config: &mut ControllerConfig,
    config_path: &str,
) -> Outcome {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let rest: Vec<&str> = words.collect();

    match command {
        "help" | "?" => print_help(),
        "quit" | "exit" => return Outcome::Quit,

        "status" => {
            let connected = if mapper.connected() {
                "connected".green()
            } else {
                "disconnected".red()
            };
            println!(
                "controller {} | page {} | bind mode {} | {} mappings",
                connected,
                mapper.active_page(),
                if mapper.bind_mode() { "on".yellow() } else { "off".normal() },
                mapper.entries().len(),
            );
            if !mapper.last_input().is_empty() {
                println!("last input: {}", mapper.last_input());
            }
        }

        "page" => match rest.first().and_then(|w| w.parse::<usize>().ok()) {
            Some(page) => mapper.set_page(page),
            None => eprintln!("{}", "usage: page <index>".red()),
        },

        "params" => {
            for path in params.paths() {
                if let Some(param) = params.find(&path) {
                    println!(
                        "  {:30} {:>8.3}  (norm {:.3})",
                        path.cyan(),
                        param.raw_value(),
                        param.normalized_value(),
                    );
                }
            }
        }

        "maps" => {
            if mapper.entries().is_empty() {
                println!("(no mappings)");
            }
            for (i, entry) in mapper.entries().iter().enumerate() {
                println!("  [{}] {}", i, entry);
            }
        }

        "bind" => match rest.first() {
            Some(&"on") => mapper.set_bind_mode(true),
            Some(&"off") => mapper.set_bind_mode(false),
            _ => eprintln!("{}", "usage: bind on|off".red()),
        },

        // Arm the next touched control: "target synth/cutoff", "target hover",
        // "target hotbind2".
        "target" => match rest.first() {
            Some(spec) => match BindingTarget::from_spec(spec).resolve(params) {
                Some(handle) => {
                    println!("next touched control binds {}", handle.path().cyan());
                    mapper.set_bind_target(Some(handle));
                }
                None => eprintln!("{}", format!("no parameter matches '{}'", spec).red()),
            },
            None => mapper.set_bind_target(None),
        },

        "hover" => match rest.first() {
            Some(path) => match params.find(path) {
                Some(handle) => params.set_hovered(Some(handle)),
                None => eprintln!("{}", format!("unknown parameter '{}'", path).red()),
            },
            None => params.set_hovered(None),
        },

        "hot" => match (
            rest.first().and_then(|w| w.parse::<u8>().ok()),
            rest.get(1),
        ) {
            (Some(slot), Some(path)) => match params.find(path) {
                Some(handle) => params.set_hot_bind(slot, Some(handle)),
                None => eprintln!("{}", format!("unknown parameter '{}'", path).red()),
            },
            _ => eprintln!("{}", "usage: hot <slot> <path>".red()),
        },

        "add" => match (rest.first(), rest.get(1), rest.get(2)) {
            (Some(kind), Some(control), Some(spec)) => {
                let kind = MessageKind::from_name(kind).unwrap_or_default();
                match control.parse::<u8>() {
                    Ok(control) => {
                        let idx = mapper.add_mapping(
                            kind,
                            control,
                            None,
                            BindingTarget::from_spec(spec),
                        );
                        println!("added [{}] {}", idx, mapper.entries()[idx]);
                    }
                    Err(_) => eprintln!("{}", "control must be 0-127".red()),
                }
            }
            _ => eprintln!("{}", "usage: add control|note|program|pitchbend <num> <path>".red()),
        },

        "remove" => match rest.first().and_then(|w| w.parse::<usize>().ok()) {
            Some(idx) => {
                if mapper.remove_mapping(idx) {
                    println!("removed [{}]", idx);
                } else {
                    eprintln!("{}", "no such mapping".red());
                }
            }
            None => eprintln!("{}", "usage: remove <index>".red()),
        },

        "copy" => match rest.first().and_then(|w| w.parse::<usize>().ok()) {
            Some(idx) => match mapper.copy_mapping(idx) {
                Some(copy) => println!("copied [{}] to [{}]", idx, copy),
                None => eprintln!("{}", "no such mapping".red()),
            },
            None => eprintln!("{}", "usage: copy <index>".red()),
        },

        // Drive a parameter from the console to watch feedback move.
        "set" => match (rest.first(), rest.get(1).and_then(|w| w.parse::<f32>().ok())) {
            (Some(path), Some(value)) => match params.find(path) {
                Some(param) => param.set_normalized(value),
                None => eprintln!("{}", format!("unknown parameter '{}'", path).red()),
            },
            _ => eprintln!("{}", "usage: set <path> <normalized 0-1>".red()),
        },

        "fine" => mapper.set_fine_adjust(rest.first() == Some(&"on")),
        "twoway" => mapper.set_two_way(rest.first() != Some(&"off")),
        "resync" => mapper.resync_two_way(),

        "save" => {
            let path = rest.first().copied().unwrap_or(config_path);
            if let Err(e) = save(mapper, config, path).await {
                eprintln!("{}", format!("save failed: {:#}", e).red());
            } else {
                println!("saved {} mappings to {}", mapper.entries().len(), path.cyan());
            }
        }

        _ => eprintln!("{}", format!("unknown command '{}' (try help)", command).red()),
    }

    Outcome::Continue
}

async fn save(mapper: &MidiMapper, config: &mut ControllerConfig, path: &str) -> Result<()> {
    config.connections = mapper.export_mappings();
    config.save(path).await
}

fn print_help() {
    println!("{}", "commands:".bold());
    for (cmd, what) in [
        ("status", "connection, page, bind mode"),
        ("page <n>", "switch the active page"),
        ("params", "list host parameters"),
        ("maps", "list mapping entries"),
        ("bind on|off", "toggle bind-capture mode"),
        ("target <path>", "arm the next touched control (also hover / hotbindN)"),
        ("hover <path>", "mark a parameter as hovered"),
        ("hot <slot> <path>", "fill a hot-bind slot"),
        ("add <type> <num> <path>", "add a mapping manually"),
        ("remove <n> / copy <n>", "drop or duplicate a mapping"),
        ("set <path> <0-1>", "move a parameter, watch the feedback"),
        ("fine on|off", "hold the fine-adjust modifier"),
        ("twoway on|off / resync", "feedback controls"),
        ("save [path]", "write the mapping file"),
        ("quit", "zero outputs and exit"),
    ] {
        println!("  {:28} {}", cmd.cyan(), what);
    }
}
