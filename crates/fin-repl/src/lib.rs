//! fin REPL: an interactive shell over one kernel.
//!
//! Each command maps onto one kernel operation:
//!
//! - Filesystem: `ls`, `mkdir`, `rm`, `mv`, `cat`, `write`, `append`
//! - Devices and mounts: `mkfs`, `mount`, `umount`, `mounts`
//! - Signals: `listen`, `ignore`, `fire`, `pull`, `clear`
//!
//! Object ids are plain numbers. The demo resolver treats every non-zero id
//! as an object that sends signals and accepts hooks; id 0 is the shell's own
//! computer.

pub mod config;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use fin_kernel::signal::{Capabilities, Mechanism, ObjectId, PullTimeout, SenderHub, Signal};
use fin_kernel::vfs::{FileMode, VfsPath};
use fin_kernel::KernelSystem;

pub use config::{ReplConfig, load_config};

/// Object id of the shell's own computer.
pub const SHELL_IDENTITY: ObjectId = ObjectId(0);

/// Capability lookup used by the shell: every id except the shell's own.
fn demo_capabilities(id: ObjectId) -> Option<Capabilities> {
    (id != SHELL_IDENTITY).then_some(Capabilities::new(true, true))
}

/// REPL state: one kernel plus the hub standing in for the network.
pub struct Repl {
    kernel: KernelSystem,
    hub: Arc<SenderHub>,
    runtime: tokio::runtime::Runtime,
    exit: bool,
}

impl Repl {
    /// Boot a kernel with `config`.
    pub fn new(config: ReplConfig) -> Result<Self> {
        let hub = Arc::new(SenderHub::new());
        let kernel = KernelSystem::new(
            config.kernel,
            SHELL_IDENTITY,
            hub.clone(),
            Arc::new(demo_capabilities),
        )
        .context("Failed to boot kernel")?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("Failed to create runtime")?;
        Ok(Self {
            kernel,
            hub,
            runtime,
            exit: false,
        })
    }

    pub fn kernel(&self) -> &KernelSystem {
        &self.kernel
    }

    pub fn hub(&self) -> &Arc<SenderHub> {
        &self.hub
    }

    /// True once `exit` was entered.
    pub fn should_exit(&self) -> bool {
        self.exit
    }

    /// Process a single line of input.
    pub fn process_line(&mut self, line: &str) -> Result<Option<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let (command, rest) = split_word(trimmed);
        let args: Vec<&str> = rest.split_whitespace().collect();
        let fs = self.kernel.filesystem();

        match command {
            "help" | "?" => Ok(Some(HELP_TEXT.trim_end().to_string())),
            "exit" | "quit" => {
                self.exit = true;
                Ok(None)
            }

            "ls" => {
                let path = args.first().copied().unwrap_or("/");
                let base = VfsPath::parse(path)?;
                let lines: Vec<String> = fs
                    .children(path)?
                    .into_iter()
                    .map(|name| {
                        let full = base.join(&name).to_string();
                        if fs.is_dir(&full) { format!("{}/", name) } else { name }
                    })
                    .collect();
                Ok(Some(lines.join("\n")))
            }
            "mkdir" => {
                let (recursive, path) = flag_and_path(&args, "-p", "mkdir [-p] <path>")?;
                fs.create_dir(path, recursive)?;
                Ok(None)
            }
            "rm" => {
                let (recursive, path) = flag_and_path(&args, "-r", "rm [-r] <path>")?;
                fs.remove(path, recursive)?;
                Ok(None)
            }
            "mv" => {
                let [from, to] = args[..] else {
                    bail!("usage: mv <from> <to>");
                };
                fs.rename(from, to)?;
                Ok(None)
            }
            "cat" => {
                let [path] = args[..] else {
                    bail!("usage: cat <path>");
                };
                let data = fs.read_file(path)?;
                Ok(Some(String::from_utf8_lossy(&data).into_owned()))
            }
            "write" | "append" => {
                let (path, text) = split_word(rest);
                if path.is_empty() {
                    bail!("usage: {} <path> <text>", command);
                }
                let mode = if command == "write" { FileMode::Write } else { FileMode::Append };
                let mut stream = fs.open(path, mode)?;
                stream.write(text.as_bytes())?;
                stream.write(b"\n")?;
                stream.close()?;
                Ok(None)
            }

            "mkfs" => {
                let [tag, name] = args[..] else {
                    bail!("usage: mkfs <type> <name>");
                };
                self.kernel.make_device(tag, name)?;
                Ok(Some(format!("created /dev/{}", name)))
            }
            "mount" => {
                let [device, point] = args[..] else {
                    bail!("usage: mount <device path> <mount point>");
                };
                fs.mount(device, point)?;
                Ok(None)
            }
            "umount" => {
                let [point] = args[..] else {
                    bail!("usage: umount <mount point>");
                };
                fs.unmount(point)?;
                Ok(None)
            }
            "mounts" => {
                let lines: Vec<String> = fs
                    .mounts()
                    .into_iter()
                    .map(|m| {
                        let ro = if m.read_only { " (ro)" } else { "" };
                        format!("{:<12} {}{}", m.path.to_string(), m.device_type, ro)
                    })
                    .collect();
                Ok(Some(lines.join("\n")))
            }

            "listen" => {
                if args.is_empty() {
                    bail!("usage: listen <id>...");
                }
                for id in parse_ids(&args)? {
                    self.kernel.network().listen(id)?;
                }
                Ok(None)
            }
            "ignore" => {
                if args == ["--all"] {
                    let count = self.kernel.network().ignore_all();
                    return Ok(Some(format!("ignored {} sender(s)", count)));
                }
                if args.is_empty() {
                    bail!("usage: ignore <id>... | ignore --all");
                }
                for id in parse_ids(&args)? {
                    self.kernel.network().ignore(id);
                }
                Ok(None)
            }
            "fire" => {
                let (mechanism, args) = match args.first() {
                    Some(&"--hook") => (Mechanism::Hook, &args[1..]),
                    _ => (Mechanism::Signal, &args[..]),
                };
                let [id, name, values @ ..] = args else {
                    bail!("usage: fire [--hook] <id> <name> [json args...]");
                };
                let sender = parse_id(id)?;
                let args = values.iter().map(|v| parse_arg(v)).collect();
                let signal = Signal::new(*name, sender).with_args(args);
                let delivered = self.hub.fire(mechanism, signal);
                Ok(Some(format!("delivered to {} listener(s)", delivered)))
            }
            "pull" => {
                let secs = match args.first() {
                    Some(raw) => Some(
                        raw.parse::<f64>()
                            .with_context(|| format!("invalid timeout '{}'", raw))?,
                    ),
                    None => None,
                };
                let timeout = PullTimeout::from_secs(secs)?;
                let network = self.kernel.network().clone();
                if timeout == PullTimeout::Indefinite && network.pending() == 0 {
                    bail!("nothing queued; an indefinite pull would never resume here");
                }
                match self.runtime.block_on(network.pull_async(timeout))? {
                    Some(signal) => Ok(Some(format_signal(&signal))),
                    None => Ok(Some("(no signal)".to_string())),
                }
            }
            "clear" => {
                let dropped = self.kernel.network().clear();
                Ok(Some(format!("dropped {} signal(s)", dropped)))
            }
            "senders" => {
                let senders: Vec<String> = self
                    .kernel
                    .network()
                    .senders()
                    .into_iter()
                    .map(|id| id.to_string())
                    .collect();
                Ok(Some(senders.join(" ")))
            }

            _ => Ok(Some(format!(
                "Unknown command: {}\nType help for available commands.",
                command
            ))),
        }
    }
}

/// First whitespace-delimited word and the rest of the line.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(idx) => (&input[..idx], input[idx..].trim_start()),
        None => (input, ""),
    }
}

fn flag_and_path<'a>(args: &[&'a str], flag: &str, usage: &str) -> Result<(bool, &'a str)> {
    match args {
        [path] => Ok((false, path)),
        [f, path] if *f == flag => Ok((true, path)),
        _ => bail!("usage: {}", usage),
    }
}

fn parse_id(raw: &str) -> Result<ObjectId> {
    let raw = raw.trim_start_matches('#');
    let id = raw
        .parse::<u64>()
        .with_context(|| format!("invalid object id '{}'", raw))?;
    Ok(ObjectId(id))
}

fn parse_ids(raw: &[&str]) -> Result<Vec<ObjectId>> {
    raw.iter().map(|r| parse_id(r)).collect()
}

/// JSON if it parses, otherwise the raw word as a string.
fn parse_arg(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn format_signal(signal: &Signal) -> String {
    let args: Vec<String> = signal.args.iter().map(|v| v.to_string()).collect();
    if args.is_empty() {
        format!("{} from {}", signal.name, signal.sender)
    } else {
        format!("{} from {}: {}", signal.name, signal.sender, args.join(" "))
    }
}

const HELP_TEXT: &str = r#"
fin shell

Filesystem:
  ls [path]                 List a directory (dirs end in /)
  mkdir [-p] <path>         Create a directory
  rm [-r] <path>            Remove a file or directory
  mv <from> <to>            Move within one device
  cat <path>                Print a file
  write <path> <text>       Replace a file with a line of text
  append <path> <text>      Append a line of text

Devices:
  mkfs tmpfs <name>         Create an in-memory device as /dev/<name>
  mount <device> <point>    Mount a device, e.g. mount /dev/disk /mnt
  umount <point>            Unmount
  mounts                    List mount points

Signals:
  listen <id>...            Listen to objects
  ignore <id>... | --all    Stop listening
  senders                   Objects listened to
  fire [--hook] <id> <name> [args...]
                            Fire a signal from an object
  pull [timeout]            Take the next signal (0 polls)
  clear                     Drop queued signals

  help                      This text
  exit                      Leave the shell
"#;

/// Run the REPL.
pub fn run(config: ReplConfig) -> Result<()> {
    println!("fin v{}", env!("CARGO_PKG_VERSION"));
    println!("Type help for commands, exit to leave.\n");

    let history = config.history.then(crate::config::history_path);
    let mut repl = Repl::new(config)?;
    let mut rl = DefaultEditor::new().context("Failed to create editor")?;
    if let Some(path) = &history {
        if rl.load_history(path).is_err() {
            tracing::debug!(path = %path.display(), "repl: no history yet");
        }
    }

    let prompt = format!("{}> ", repl.kernel().name());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match repl.process_line(&line) {
                    Ok(Some(output)) if !output.is_empty() => println!("{}", output),
                    Ok(_) => {}
                    Err(e) => eprintln!("Error: {:#}", e),
                }
                if repl.should_exit() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = rl.save_history(path) {
            tracing::warn!(path = %path.display(), error = %e, "repl: failed to save history");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_word() {
        assert_eq!(split_word("write /f hello  world"), ("write", "/f hello  world"));
        assert_eq!(split_word("ls"), ("ls", ""));
        assert_eq!(split_word("  cat   /x"), ("cat", "/x"));
    }

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("42"), serde_json::json!(42));
        assert_eq!(parse_arg("true"), serde_json::json!(true));
        assert_eq!(parse_arg("hello"), serde_json::json!("hello"));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("#7").unwrap(), ObjectId(7));
        assert!(parse_id("seven").is_err());
    }
}
