//! Operator interaction: yes/no confirmations and startup prompts.
use std::io::{BufRead, Write};

/// Something that can answer a yes/no question on the operator's behalf.
pub trait Operator {
    fn confirm(&mut self, question: &str) -> bool;
}

/// Prompts on a writer and reads answers from a line reader (usually the
/// terminal).
pub struct TerminalOperator<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `message` and read one trimmed line. `None` on EOF or I/O error.
    pub fn ask(&mut self, message: &str) -> Option<String> {
        write!(self.output, "{message}").ok()?;
        self.output.flush().ok()?;
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    /// Ask until a non-empty answer arrives.
    pub fn ask_required(&mut self, message: &str, retry_message: &str) -> Option<String> {
        let mut answer = self.ask(message)?;
        while answer.is_empty() {
            answer = self.ask(retry_message)?;
        }
        Some(answer)
    }

    /// Ask with a default used for an empty answer (or EOF).
    pub fn ask_with_default(&mut self, message: &str, default: &str) -> String {
        match self.ask(message) {
            Some(answer) if !answer.is_empty() => answer,
            _ => default.to_string(),
        }
    }

    /// Ask for a strictly positive number of seconds.
    pub fn ask_interval(&mut self, message: &str, default: f64) -> f64 {
        loop {
            let Some(answer) = self.ask(message) else {
                return default;
            };
            if answer.is_empty() {
                return default;
            }
            match answer.parse::<f64>() {
                Ok(value) if value > 0.0 && value.is_finite() => return value,
                Ok(_) => {
                    let _ = writeln!(self.output, "Delay must be a positive number!");
                }
                Err(_) => {
                    let _ = writeln!(self.output, "Please enter a valid number!");
                }
            }
        }
    }
}

impl<R: BufRead, W: Write> Operator for TerminalOperator<R, W> {
    fn confirm(&mut self, question: &str) -> bool {
        loop {
            let Some(answer) = self.ask(&format!("{question} [y/n]: ")) else {
                return false;
            };
            match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => {
                    let _ = writeln!(self.output, "Please answer y or n.");
                }
            }
        }
    }
}
