//! Interactive stdin commands.

/// A command typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start playback.
    Start,
    /// Stop playback and release the player.
    Stop,
    /// Retry immediately with a fresh retry budget.
    Retry,
    /// Toggle between playing and paused.
    TogglePause,
    /// Switch to the named quality.
    Quality(String),
    /// Simulate the host app moving to the background.
    Background,
    /// Simulate the host app returning to the foreground.
    Foreground,
    /// Print the current session snapshot.
    Status,
    /// Print the command list.
    Help,
    /// Exit the player.
    Quit,
}

/// Command list printed on startup and by `help`.
pub const HELP: &str = "\
commands:
  start            start playback
  stop             stop playback
  retry            retry now (resets the retry budget)
  pause            toggle play/pause
  quality <name>   switch quality
  bg | fg          simulate the app going to background / foreground
  status           print the current session snapshot
  quit             exit";

impl Command {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();

        let command = match (verb.to_ascii_lowercase().as_str(), arg) {
            ("start" | "play", None) => Self::Start,
            ("stop", None) => Self::Stop,
            ("retry", None) => Self::Retry,
            ("pause" | "p", None) => Self::TogglePause,
            ("quality" | "q", Some(name)) => Self::Quality(name.to_string()),
            ("quality" | "q", None) => return Err("usage: quality <name>".to_string()),
            ("bg" | "background", None) => Self::Background,
            ("fg" | "foreground", None) => Self::Foreground,
            ("status" | "s", None) => Self::Status,
            ("help" | "?", None) => Self::Help,
            ("quit" | "exit", None) => Self::Quit,
            (other, _) => return Err(format!("unknown command '{}' (try 'help')", other)),
        };

        if words.next().is_some() {
            return Err(format!("too many arguments for '{}'", verb));
        }
        Ok(Some(command))
    }
}
