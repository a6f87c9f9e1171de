use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rustyline::error::ReadlineError;
use rustyline::{Config, Editor, Result};
use tracing::debug;

/// Source of answers typed at a prompt
pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> Result<String>;
}

impl LineReader for Editor<()> {
    fn read_line(&mut self, prompt: &str) -> Result<String> {
        self.readline(prompt)
    }
}

pub fn generate_prompt(turns: usize) -> String {
    if turns == 0 {
        "> ".to_string()
    } else {
        format!("[{}] > ", turns)
    }
}

/// Location of the line editor history, if a home directory exists
pub fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".chatui_history"))
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(rustyline::CompletionType::List)
        .build();
    let mut editor = Editor::with_config(config)?;
    if let Some(path) = history_path() {
        if let Err(e) = load_history(&mut editor, &path) {
            debug!("Could not load line history from {}: {}", path.display(), e);
        }
    }
    Ok(editor)
}

fn load_history(editor: &mut Editor<()>, path: &Path) -> Result<()> {
    match editor.load_history(path) {
        // missing on first run
        Err(ReadlineError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
