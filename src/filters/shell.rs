use std::io::Write;
use std::process::{Command, Stdio};

use crate::errors::{PlanetError, PlanetResult};
use crate::filters::Filter;

/// Pipes the serialized entry through an external command: the entry goes
/// to stdin, stdout replaces it. Empty stdout rejects the entry.
pub struct ShellFilter {
    command: String,
    args: Vec<String>,
}

impl ShellFilter {
    pub fn new(command: String, args: Vec<String>) -> Self {
        Self { command, args }
    }

    fn failure(&self, reason: impl ToString) -> PlanetError {
        PlanetError::Filter {
            name: self.command.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Filter for ShellFilter {
    fn name(&self) -> &str {
        &self.command
    }

    fn apply(&self, entry: &str) -> PlanetResult<String> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.failure("stdin unavailable"))?;
        let input = entry.to_string();
        // Feed stdin from another thread so a chatty child cannot deadlock us.
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output().map_err(|e| self.failure(e))?;
        match writer.join() {
            Ok(Ok(())) => {}
            // The command may legitimately stop reading early.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(self.failure(e)),
            Err(_) => return Err(self.failure("stdin writer panicked")),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!("{}: {}", output.status, stderr.trim())));
        }

        String::from_utf8(output.stdout).map_err(|e| self.failure(e))
    }
}
