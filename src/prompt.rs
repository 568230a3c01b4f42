//! Password acquisition: the prompter capability and the confirm-twice protocol.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use zeroize::Zeroizing;

use crate::constants::*;
use crate::error::KeyError;
use crate::types::Address;

/// Source of interactive answers. The terminal in production, a script in tests.
pub trait PasswordSource {
    /// Reads a secret without echo.
    fn password(&mut self, prompt: &str) -> Result<Zeroizing<String>, KeyError>;

    /// Reads one visible line.
    fn line(&mut self, prompt: &str) -> Result<String, KeyError>;
}

/// Reads from the controlling terminal via `rpassword`.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl PasswordSource for TerminalPrompter {
    fn password(&mut self, prompt: &str) -> Result<Zeroizing<String>, KeyError> {
        rpassword::prompt_password(prompt).map(Zeroizing::new).map_err(|e| KeyError::Prompt(format!("failed to read password: {e}")))
    }

    fn line(&mut self, prompt: &str) -> Result<String, KeyError> {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim().to_string())
    }
}

/// Replays canned answers in order and records every prompt shown.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { answers: answers.into_iter().map(Into::into).collect(), prompts: Vec::new() }
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next(&mut self, prompt: &str) -> Result<String, KeyError> {
        self.prompts.push(prompt.to_string());
        self.answers.pop_front().ok_or_else(|| KeyError::Prompt("no scripted answer left".to_string()))
    }
}

impl PasswordSource for ScriptedPrompter {
    fn password(&mut self, prompt: &str) -> Result<Zeroizing<String>, KeyError> {
        self.next(prompt).map(Zeroizing::new)
    }

    fn line(&mut self, prompt: &str) -> Result<String, KeyError> {
        self.next(prompt)
    }
}

/// Prompts twice and repeats until both entries are equal.
pub fn create_password(source: &mut dyn PasswordSource, out: &mut dyn Write, prompt: &str) -> Result<Zeroizing<String>, KeyError> {
    loop {
        let password = source.password(prompt)?;
        let confirm = source.password(CONFIRM_PROMPT)?;
        if *password == *confirm {
            return Ok(password);
        }
        writeln!(out, "Passwords were different. Try again.")?;
    }
}

/// Like [`create_password`], then asks for a hint unless `have_hint` already knows this password.
pub fn create_password_with_hint(
    source: &mut dyn PasswordSource,
    out: &mut dyn Write,
    prompt: &str,
    have_hint: &dyn Fn(&str) -> bool,
) -> Result<(Zeroizing<String>, String), KeyError> {
    let password = create_password(source, out, prompt)?;
    let hint = if have_hint(&password) { String::new() } else { source.line(HINT_PROMPT)? };
    Ok((password, hint))
}

/// Single prompt for the password of an existing account.
pub fn account_password(source: &mut dyn PasswordSource, address: &Address, details: Option<&(String, String)>) -> Result<Zeroizing<String>, KeyError> {
    let (name, hint) = details.map(|(n, h)| (n.as_str(), h.as_str())).unwrap_or(("", ""));
    source.password(&format!("Enter password for address {name} ({}; hint:{hint}): ", address.abridged()))
}
