//! Security screen applied to shell commands before they run.
//!
//! Substring patterns catch constructs that are dangerous wherever they
//! appear. Program checks look at every simple command in the line after
//! stripping wrappers such as `sudo`, `env` and `nohup`, so paths, quoting
//! and option flags do not hide what is being run. Scripts handed to
//! `bash -c`, `su -c` or `eval` are screened the same way.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;

const BLOCKED_PATTERNS: &[(&str, &str)] = &[
    (
        r"(?::|\b\w+)\s*\(\s*\)\s*\{\s*(?::|\w+)\s*\|\s*(?::|\w+)\s*&\s*\}",
        "fork bomb",
    ),
    (
        r"\b(?:mkfs(?:\.\w+)?|mke2fs|mkswap|wipefs|newfs(?:_\w+)?)\b",
        "filesystem format utility",
    ),
    (
        r"\bdiskutil\s+(?:erase\w*|zeroDisk|randomDisk|secureErase|partitionDisk)\b",
        "filesystem format utility",
    ),
    (
        r"\bdd\b[^;&|]*\bof=/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk|rdisk)",
        "raw write to a disk device",
    ),
    (
        r">\s*/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk|rdisk)",
        "redirection onto a disk device",
    ),
];

const ROOT_DELETION: &str = "recursive deletion of the filesystem root";
const POWER_CONTROL: &str = "system shutdown or reboot";

const POWER_PROGRAMS: &[&str] = &["shutdown", "halt", "reboot", "poweroff"];

/// Full-screen editors, pagers and process monitors. They wait on a TTY the
/// session never provides.
const INTERACTIVE_PROGRAMS: &[&str] = &[
    "vi", "vim", "nvim", "nano", "emacs", "pico", "joe", "less", "more", "most", "man", "top",
    "htop", "btop", "atop",
];

/// Reserved words that can precede a command without changing what runs.
pub(crate) const SHELL_KEYWORDS: &[&str] = &[
    "!", "{", "}", "if", "then", "else", "elif", "do", "while", "until",
];

/// Programs that run their arguments as a command, with their options that
/// take a separate value.
const WRAPPERS: &[(&str, &[&str])] = &[
    ("sudo", &["-u", "-g", "-h", "-p", "-C", "-D", "-r", "-t", "-U", "-T"]),
    ("doas", &["-u", "-C"]),
    ("env", &["-u", "-C", "--unset", "--chdir"]),
    ("nohup", &[]),
    ("exec", &["-a"]),
    ("command", &[]),
    ("builtin", &[]),
    ("nice", &["-n", "--adjustment"]),
    ("time", &["-f", "-o", "--format", "--output"]),
    ("timeout", &["-s", "-k", "--signal", "--kill-after"]),
    ("stdbuf", &["-i", "-o", "-e"]),
    ("ionice", &["-c", "-n", "-p"]),
    ("setsid", &[]),
];

const SHELLS: &[&str] = &["sh", "bash", "dash", "zsh", "ksh", "su"];

const MAX_NESTING: usize = 4;

static COMPILED_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    BLOCKED_PATTERNS
        .iter()
        .filter_map(|(pattern, reason)| Regex::new(pattern).ok().map(|re| (re, *reason)))
        .collect()
});

static REDIRECTION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\d*(?:<<<|<<|<>|<&|<|>>|>&|>\||>|&>>|&>)").ok());

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedCommand {
    pub reason: String,
}

impl BlockedCommand {
    fn pattern(reason: &str) -> Self {
        Self {
            reason: format!("command matches a blocked pattern ({reason})"),
        }
    }
}

impl fmt::Display for BlockedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Reject destructive or interactive commands.
pub fn screen(command: &str) -> Result<(), BlockedCommand> {
    screen_nested(command, 0)
}

fn screen_nested(command: &str, depth: usize) -> Result<(), BlockedCommand> {
    for (re, reason) in COMPILED_PATTERNS.iter() {
        if re.is_match(command) {
            return Err(BlockedCommand::pattern(reason));
        }
    }

    for (index, words) in simple_commands(command).iter().enumerate() {
        let Some((program, args)) = program_and_args(words) else {
            continue;
        };

        if let Some(reason) = dangerous_program(&program, args) {
            return Err(BlockedCommand::pattern(reason));
        }

        if index == 0 && INTERACTIVE_PROGRAMS.contains(&program.as_str()) {
            return Err(BlockedCommand {
                reason: format!("interactive program '{program}' is not supported"),
            });
        }

        if let Some(script) = nested_script(&program, args) {
            if depth >= MAX_NESTING {
                return Err(BlockedCommand {
                    reason: "command nests shells too deeply to screen".to_string(),
                });
            }
            screen_nested(&script, depth + 1)?;
        }
    }

    Ok(())
}

/// Split a command line into the words of each simple command.
///
/// Breaks on unquoted `;`, `&`, `|` and newlines, and on parentheses and
/// backticks outside single quotes so substitutions are screened as
/// commands of their own.
pub(crate) fn simple_commands(command: &str) -> Vec<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut single = false;
    let mut double = false;
    let mut escaped = false;

    for ch in command.chars() {
        if escaped {
            escaped = false;
            current.push(ch);
            continue;
        }
        match ch {
            '\\' if !single => {
                escaped = true;
                current.push(ch);
            }
            '\'' if !double => {
                single = !single;
                current.push(ch);
            }
            '"' if !single => {
                double = !double;
                current.push(ch);
            }
            '(' | ')' | '`' if !single => segments.push(std::mem::take(&mut current)),
            ';' | '&' | '|' | '\n' if !single && !double => {
                segments.push(std::mem::take(&mut current))
            }
            _ => current.push(ch),
        }
    }
    segments.push(current);

    segments
        .iter()
        .map(|segment| split_words(segment))
        .filter(|words| !words.is_empty())
        .collect()
}

fn split_words(segment: &str) -> Vec<String> {
    shlex::split(segment).unwrap_or_else(|| {
        segment
            .split_whitespace()
            .map(|word| word.trim_matches(|c: char| c == '"' || c == '\'').to_string())
            .collect()
    })
}

/// The program a simple command runs (basename) and its arguments, looking
/// through keywords, assignments, redirections and wrapper programs.
fn program_and_args(words: &[String]) -> Option<(String, &[String])> {
    let mut i = 0;
    while let Some(word) = words.get(i) {
        if SHELL_KEYWORDS.contains(&word.as_str()) || is_assignment(word) {
            i += 1;
            continue;
        }
        if let Some(width) = redirection_width(word) {
            i += width;
            continue;
        }

        let name = basename(word);
        let Some((wrapper, value_options)) = WRAPPERS.iter().find(|(w, _)| *w == name) else {
            return Some((name, &words[i + 1..]));
        };
        i = skip_options(words, i + 1, value_options, *wrapper == "env");
        if *wrapper == "timeout" {
            i += 1;
        }
    }
    None
}

fn skip_options(words: &[String], mut i: usize, value_options: &[&str], assignments: bool) -> usize {
    while let Some(word) = words.get(i) {
        if word == "--" {
            return i + 1;
        }
        if word.starts_with('-') && word.len() > 1 {
            i += if value_options.contains(&word.as_str()) { 2 } else { 1 };
        } else if assignments && is_assignment(word) {
            i += 1;
        } else {
            break;
        }
    }
    i
}

/// Words consumed by a leading redirection: 2 when the target is a separate
/// word, 1 when it is attached.
fn redirection_width(word: &str) -> Option<usize> {
    let operator = REDIRECTION.as_ref()?.find(word)?;
    Some(if operator.end() == word.len() { 2 } else { 1 })
}

fn dangerous_program(program: &str, args: &[String]) -> Option<&'static str> {
    match program {
        p if POWER_PROGRAMS.contains(&p) => Some(POWER_CONTROL),
        "systemctl" => args
            .iter()
            .any(|arg| matches!(arg.as_str(), "poweroff" | "reboot" | "halt" | "kexec"))
            .then_some(POWER_CONTROL),
        "init" | "telinit" => args
            .iter()
            .find(|arg| !arg.starts_with('-'))
            .filter(|level| matches!(level.as_str(), "0" | "6"))
            .map(|_| POWER_CONTROL),
        "rm" => deletes_root(args).then_some(ROOT_DELETION),
        _ => None,
    }
}

fn deletes_root(args: &[String]) -> bool {
    let mut recursive = false;
    let mut options_done = false;
    let mut targets = Vec::new();

    for arg in args {
        if !options_done && arg == "--" {
            options_done = true;
        } else if !options_done && arg.starts_with("--") {
            recursive |= arg == "--recursive";
        } else if !options_done && arg.starts_with('-') && arg.len() > 1 {
            recursive |= arg.contains(|c: char| c == 'r' || c == 'R');
        } else {
            targets.push(arg.as_str());
        }
    }

    recursive && targets.into_iter().any(is_root_target)
}

/// `/`, `//`, `/.`, `/usr/..`, `/*` and the like.
fn is_root_target(target: &str) -> bool {
    if !target.starts_with('/') {
        return false;
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in target.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.is_empty() || parts == ["*"]
}

/// Script text a shell, `su` or `eval` would run.
fn nested_script(program: &str, args: &[String]) -> Option<String> {
    if program == "eval" {
        return Some(args.join(" "));
    }
    if !SHELLS.contains(&program) {
        return None;
    }

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(script) = arg.strip_prefix("--command=") {
            return Some(script.to_string());
        }
        if arg == "--command" {
            return iter.next().cloned();
        }
        if arg == "-o" || arg == "+o" {
            iter.next();
        } else if arg.starts_with('-') && !arg.starts_with("--") && arg.contains('c') {
            return iter.next().cloned();
        } else if !arg.starts_with('-') && !arg.starts_with('+') {
            break;
        }
    }
    None
}

pub(crate) fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_assignment(word: &str) -> bool {
    word.split_once('=').is_some_and(|(key, _)| is_identifier(key))
}

fn basename(word: &str) -> String {
    Path::new(word)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| word.to_string())
}
