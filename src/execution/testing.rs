//! Scripted stand-ins for external tools, the host filesystem and time.

use super::host::HostFs;
use super::retry::Clock;
use super::{CommandRunner, ToolCommand, ToolOutput};
use crate::disk::error::DiskResult;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Rule {
    prefix: Vec<String>,
    responses: VecDeque<ToolOutput>,
}

/// Replays canned output for commands matching a word prefix. The longest
/// matching prefix wins; a rule's last response repeats once its queue drains.
/// Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<ToolCommand>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, prefix: &[&str], output: ToolOutput) -> &Self {
        self.on_sequence(prefix, vec![output])
    }

    pub fn on_sequence(&self, prefix: &[&str], outputs: Vec<ToolOutput>) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            responses: outputs.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(ToolCommand::display)
            .collect()
    }

    pub fn commands(&self) -> Vec<ToolCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether any recorded command starts with `prefix`.
    pub fn invoked(&self, prefix: &[&str]) -> bool {
        self.commands().iter().any(|c| starts_with(c, prefix))
    }
}

fn words(command: &ToolCommand) -> Vec<&str> {
    std::iter::once(command.program.as_str())
        .chain(command.args.iter().map(String::as_str))
        .collect()
}

fn starts_with<S: AsRef<str>>(command: &ToolCommand, prefix: &[S]) -> bool {
    let words = words(command);
    prefix.len() <= words.len() && prefix.iter().zip(&words).all(|(p, w)| p.as_ref() == *w)
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &ToolCommand) -> DiskResult<ToolOutput> {
        self.calls.lock().unwrap().push(command.clone());

        let mut rules = self.rules.lock().unwrap();
        let best = rules
            .iter_mut()
            .filter(|rule| starts_with(command, &rule.prefix))
            .max_by_key(|rule| rule.prefix.len());

        let output = match best {
            Some(rule) if rule.responses.len() > 1 => rule.responses.pop_front().unwrap_or_default(),
            Some(rule) => rule.responses.front().cloned().unwrap_or_default(),
            None => ToolOutput::success(""),
        };
        Ok(output)
    }
}

/// In-memory host: a set of existing paths, some of which are block devices.
/// Paths registered with `appear_after` only show up after being probed a
/// number of times, imitating udev creating nodes late.
#[derive(Default)]
pub struct FakeHost {
    paths: Mutex<HashSet<PathBuf>>,
    block_devices: Mutex<HashSet<PathBuf>>,
    pending: Mutex<HashMap<PathBuf, u32>>,
    created_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(self, path: &str) -> Self {
        self.paths.lock().unwrap().insert(PathBuf::from(path));
        self
    }

    pub fn with_block_device(self, path: &str) -> Self {
        self.block_devices.lock().unwrap().insert(PathBuf::from(path));
        self.with_path(path)
    }

    pub fn appear_after(self, path: &str, probes: u32) -> Self {
        self.pending
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), probes);
        self.block_devices.lock().unwrap().insert(PathBuf::from(path));
        self
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        self.created_dirs.lock().unwrap().clone()
    }
}

impl HostFs for FakeHost {
    fn exists(&self, path: &Path) -> bool {
        let mut pending = self.pending.lock().unwrap();
        let ready = match pending.get_mut(path) {
            Some(0) => true,
            Some(remaining) => {
                *remaining -= 1;
                return false;
            }
            None => false,
        };
        if ready {
            pending.remove(path);
            self.paths.lock().unwrap().insert(path.to_path_buf());
        }
        self.paths.lock().unwrap().contains(path)
    }

    fn is_block_device(&self, path: &Path) -> bool {
        self.exists(path) && self.block_devices.lock().unwrap().contains(path)
    }

    fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        self.created_dirs.lock().unwrap().push(path.to_path_buf());
        self.paths.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }
}

/// Virtual clock: `sleep` advances time instantly.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }
}
