pub mod conversation_state;
pub mod prompt;

use std::io::Write;
use std::process::ExitCode;

use color_print::cwriteln;
use conversation_state::{Conversation, Role};
use eyre::Result;
use prompt::{LineReader, generate_prompt};
use tracing::{debug, error};

use crate::openai_client::CompletionClient;

const WELCOME_TEXT: &str = "
Hi, I'm chatui. Ask me anything.

When the model offers several answers you pick the one to keep.

/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
chatui

/clear        Clear the conversation history
/history      Show the recorded turns
/model        Show the model in use
/help         Show this help dialogue
/quit         Quit the application
";

/// Parses the user's answer to the candidate menu.
/// A blank answer takes the first candidate.
pub fn select_candidate(answer: &str, count: usize) -> Option<usize> {
    let answer = answer.trim();
    if answer.is_empty() {
        return (count > 0).then_some(0);
    }
    match answer.parse::<usize>() {
        Ok(n) if n >= 1 && n <= count => Some(n - 1),
        _ => None,
    }
}

pub struct ChatContext<C> {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    conversation: Conversation<C>,
}

impl<C: CompletionClient> ChatContext<C> {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        conversation: Conversation<C>,
    ) -> Self {
        Self {
            output,
            input,
            interactive,
            conversation,
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        // Handle non-interactive mode (single query)
        if let Some(input) = self.input.take() {
            let ok = self.handle_input(&input, None).await?;
            return Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE });
        }

        if self.interactive {
            self.print_welcome()?;
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    fn print_welcome(&mut self) -> Result<()> {
        writeln!(self.output, "{}", WELCOME_TEXT)?;
        Ok(())
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let prompt_text = generate_prompt(self.conversation.messages().len());
            let readline = rl.readline(&prompt_text);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    if line.trim() == "/quit" {
                        break;
                    }

                    let reader: &mut dyn LineReader = &mut rl;
                    if let Err(e) = self.handle_input(&line, Some(reader)).await {
                        writeln!(self.output, "Error: {}", e)?;
                    }
                }
                Err(e) => {
                    debug!("Leaving interactive loop: {}", e);
                    break;
                }
            }
        }

        if let Some(path) = prompt::history_path() {
            if let Err(e) = rl.save_history(&path) {
                debug!("Could not save line history to {}: {}", path.display(), e);
            }
        }

        Ok(())
    }

    /// Returns `false` when a chat turn failed.
    async fn handle_input(
        &mut self,
        input: &str,
        reader: Option<&mut dyn LineReader>,
    ) -> Result<bool> {
        match input.trim() {
            "/help" => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            "/clear" => {
                self.conversation.clear();
                writeln!(self.output, "Conversation cleared.")?;
            }
            "/history" => {
                self.print_history()?;
            }
            "/model" => {
                writeln!(self.output, "Model: {}", self.conversation.model())?;
            }
            _ => return self.process_chat_input(input, reader).await,
        }

        Ok(true)
    }

    fn print_history(&mut self) -> Result<()> {
        if self.conversation.messages().is_empty() {
            writeln!(self.output, "No messages yet.")?;
            return Ok(());
        }
        for message in self.conversation.messages() {
            match message.role {
                Role::User => cwriteln!(self.output, "<cyan>you</>: {}", message.content)?,
                Role::Assistant => {
                    cwriteln!(self.output, "<green>assistant</>: {}", message.content)?
                }
            }
        }
        Ok(())
    }

    async fn process_chat_input(
        &mut self,
        input: &str,
        reader: Option<&mut dyn LineReader>,
    ) -> Result<bool> {
        let candidates = match self.conversation.send(input).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(kind = ?e.kind, status = ?e.status, "Completion request failed");
                cwriteln!(self.output, "<red>Request failed</> ({:?}): {}", e.kind, e.message)?;
                self.print_turn_kept()?;
                return Ok(false);
            }
        };

        let chosen = match candidates.len() {
            0 => {
                writeln!(self.output, "The model returned no answers; nothing was recorded.")?;
                return Ok(true);
            }
            1 => 0,
            _ => {
                for (i, candidate) in candidates.iter().enumerate() {
                    cwriteln!(self.output, "<bold>[{}]</> {}\n", i + 1, candidate)?;
                }
                let picked = match reader {
                    Some(reader) => self.ask_for_choice(reader, candidates.len())?,
                    None => Some(0),
                };
                match picked {
                    Some(index) => index,
                    None => {
                        writeln!(self.output, "No answer was picked.")?;
                        self.print_turn_kept()?;
                        return Ok(false);
                    }
                }
            }
        };

        if candidates.len() == 1 {
            writeln!(self.output, "{}", candidates[chosen])?;
        } else {
            writeln!(self.output, "Keeping answer {}.", chosen + 1)?;
        }
        self.conversation.pick_response(&candidates[chosen]);

        Ok(true)
    }

    fn print_turn_kept(&mut self) -> Result<()> {
        writeln!(
            self.output,
            "Your message is kept in the history. Use /clear to start over."
        )?;
        Ok(())
    }

    /// `None` when the prompt was interrupted or closed.
    fn ask_for_choice(
        &mut self,
        reader: &mut dyn LineReader,
        count: usize,
    ) -> Result<Option<usize>> {
        let prompt_text = format!("Pick an answer [1-{}, default 1]: ", count);
        loop {
            let answer = match reader.read_line(&prompt_text) {
                Ok(answer) => answer,
                Err(e) => {
                    debug!("Candidate prompt ended: {}", e);
                    return Ok(None);
                }
            };
            match select_candidate(&answer, count) {
                Some(index) => return Ok(Some(index)),
                None => writeln!(self.output, "Please enter a number between 1 and {}.", count)?,
            }
        }
    }
}
