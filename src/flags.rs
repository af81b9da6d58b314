// Per-file compiler flags
//
// Looked up in order: compile_commands.json at the project root,
// compile_flags.txt at the project root, `indexing.compiler_flags` from the
// configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;

pub const COMPILE_COMMANDS: &str = "compile_commands.json";
pub const COMPILE_FLAGS: &str = "compile_flags.txt";

/// Flags that take their value as the next argument and name a directory
const DIRECTORY_FLAGS: &[&str] = &["-I", "-iquote", "-isystem", "-idirafter"];

#[derive(Debug, Deserialize)]
struct CompileCommand {
    directory: PathBuf,
    file: PathBuf,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    #[serde(default)]
    command: Option<String>,
}

/// Compiler flags for every source file of a project
#[derive(Debug, Clone, Default)]
pub struct CompilationDatabase {
    per_file: HashMap<PathBuf, Vec<String>>,
    fallback: Vec<String>,
}

impl CompilationDatabase {
    /// Load whatever flag sources exist under `root`
    pub fn load(root: &Path, config: &Config) -> Self {
        let mut database = Self {
            per_file: HashMap::new(),
            fallback: config.indexing.compiler_flags.clone(),
        };

        let commands_path = root.join(COMPILE_COMMANDS);
        if commands_path.exists() {
            match Self::read_compile_commands(&commands_path) {
                Ok(per_file) => {
                    info!("Loaded flags for {} files from {}", per_file.len(), commands_path.display());
                    database.per_file = per_file;
                }
                Err(e) => warn!("Ignoring {}: {:#}", commands_path.display(), e),
            }
        }

        let flags_path = root.join(COMPILE_FLAGS);
        if flags_path.exists() {
            match std::fs::read_to_string(&flags_path) {
                Ok(content) => {
                    database.fallback = parse_compile_flags(&content, root);
                    debug!("Loaded {} default flags from {}", database.fallback.len(), flags_path.display());
                }
                Err(e) => warn!("Ignoring {}: {}", flags_path.display(), e),
            }
        }

        database
    }

    fn read_compile_commands(path: &Path) -> Result<HashMap<PathBuf, Vec<String>>> {
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        parse_compile_commands(&content)
    }

    /// Flags to parse `path` with
    pub fn flags_for(&self, path: &Path) -> Vec<String> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.per_file
            .get(&key)
            .or_else(|| self.per_file.get(path))
            .unwrap_or(&self.fallback)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.per_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_file.is_empty()
    }
}

/// Parse the body of a compile_commands.json
pub fn parse_compile_commands(content: &str) -> Result<HashMap<PathBuf, Vec<String>>> {
    let commands: Vec<CompileCommand> =
        serde_json::from_str(content).context("Invalid compilation database")?;

    let mut per_file = HashMap::new();
    for entry in commands {
        let arguments = match (entry.arguments, entry.command) {
            (Some(arguments), _) => arguments,
            (None, Some(command)) => match shlex::split(&command) {
                Some(arguments) => arguments,
                None => {
                    warn!("Unbalanced quoting in command for {}", entry.file.display());
                    continue;
                }
            },
            (None, None) => continue,
        };

        let file = entry.directory.join(&entry.file);
        let file = file.canonicalize().unwrap_or(file);
        let flags = normalize_arguments(&arguments, &entry.directory, &entry.file);
        per_file.insert(file, flags);
    }

    Ok(per_file)
}

/// Parse compile_flags.txt: one flag per line
pub fn parse_compile_flags(content: &str, root: &Path) -> Vec<String> {
    let lines: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    absolutize(&lines, root)
}

/// Drop the compiler, output and input arguments and make directory flags
/// absolute against `directory`
fn normalize_arguments(arguments: &[String], directory: &Path, file: &Path) -> Vec<String> {
    let mut kept = Vec::new();
    let mut iter = arguments.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" => {}
            "-o" => {
                iter.next();
            }
            _ if arg.starts_with("-o") && arg.len() > 2 && !arg.starts_with("-objc") => {}
            _ if Path::new(arg) == file || directory.join(arg) == directory.join(file) => {}
            _ => kept.push(arg.clone()),
        }
    }

    absolutize(&kept, directory)
}

fn absolutize(flags: &[String], base: &Path) -> Vec<String> {
    let mut out = Vec::with_capacity(flags.len());
    let mut iter = flags.iter();

    while let Some(flag) = iter.next() {
        if DIRECTORY_FLAGS.contains(&flag.as_str()) {
            out.push(flag.clone());
            if let Some(dir) = iter.next() {
                out.push(join(base, dir));
            }
            continue;
        }

        let joined = DIRECTORY_FLAGS.iter().find_map(|prefix| {
            flag.strip_prefix(prefix)
                .filter(|dir| !dir.is_empty())
                .map(|dir| format!("{}{}", prefix, join(base, dir)))
        });
        out.push(joined.unwrap_or_else(|| flag.clone()));
    }

    out
}

fn join(base: &Path, dir: &str) -> String {
    base.join(dir).to_string_lossy().into_owned()
}
