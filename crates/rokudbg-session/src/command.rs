//! Operator command parsing.

/// One line of operator input, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Stop,
    Continue,
    Threads,
    /// Show one thread from the last listing
    Thread(usize),
    /// Request a stack trace; `None` means the thread that caused the stop
    Stacktrace(Option<u32>),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  s, stop            stop all threads
  c, continue        resume execution
  t, threads         list threads (while stopped)
  thread N           show thread N from the last listing
  bt, stacktrace [N] stack trace of thread N (while stopped)
  q, quit, exit      end the session
  ?, help            this text";

impl OperatorCommand {
    /// Parses a line. Case and surrounding whitespace are ignored.
    pub fn parse(line: &str) -> Self {
        let line = line.trim().to_lowercase();
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Self::Empty;
        };
        let arg = words.next();
        if words.next().is_some() {
            return Self::Unknown(line);
        }

        match (head, arg) {
            ("s" | "stop", None) => Self::Stop,
            ("c" | "continue", None) => Self::Continue,
            ("t" | "threads", None) => Self::Threads,
            ("thread", Some(n)) => match n.parse() {
                Ok(index) => Self::Thread(index),
                Err(_) => Self::Unknown(line),
            },
            ("bt" | "stacktrace", None) => Self::Stacktrace(None),
            ("bt" | "stacktrace", Some(n)) => match n.parse() {
                Ok(index) => Self::Stacktrace(Some(index)),
                Err(_) => Self::Unknown(line),
            },
            ("q" | "quit" | "exit", None) => Self::Quit,
            ("?" | "help", None) => Self::Help,
            _ => Self::Unknown(line),
        }
    }
}
