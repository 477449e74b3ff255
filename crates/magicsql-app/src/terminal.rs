//! Terminal presentation: a line-based chat REPL.
//!
//! Commands: `/reset` (or `/clear`) starts over, `/quit` (or EOF) exits,
//! `/help` lists commands.

use std::io::Write;

use async_trait::async_trait;
use magicsql_chat::Presentation;
use magicsql_core::QueryResult;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

const THINKING: &str = "Thinking...";
const HELP: &str = "Commands: /reset (or /clear) clears the conversation, /quit exits.";

pub struct TerminalPresentation<R, W> {
    lines: LinesStream<R>,
    out: W,
    show_sql: bool,
    reset_pending: bool,
    thinking: bool,
    /// Answer text already printed from streamed fragments.
    streamed: Option<String>,
}

impl TerminalPresentation<BufReader<Stdin>, std::io::Stdout> {
    /// Presentation bound to the process stdin and stdout.
    pub fn stdio(show_sql: bool) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), std::io::stdout(), show_sql)
    }
}

impl<R, W> TerminalPresentation<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    pub fn new(input: R, out: W, show_sql: bool) -> Self {
        Self {
            lines: LinesStream::new(input.lines()),
            out,
            show_sql,
            reset_pending: false,
            thinking: false,
            streamed: None,
        }
    }

    #[cfg(test)]
    fn into_writer(self) -> W {
        self.out
    }

    fn clear_thinking(&mut self) {
        if self.thinking {
            let _ = write!(self.out, "\r{}\r", " ".repeat(THINKING.len()));
            self.thinking = false;
        }
    }

    fn prompt(&mut self) {
        let _ = write!(self.out, "you> ");
        let _ = self.out.flush();
    }
}

#[async_trait]
impl<R, W> Presentation for TerminalPresentation<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    fn render_user_turn(&mut self, _text: &str) {
        // Already echoed by the terminal as the user typed it.
    }

    fn render_assistant_turn(&mut self, text: &str) {
        self.clear_thinking();
        match self.streamed.take() {
            // The stream was the start of this answer: finish the line.
            Some(shown) if text.starts_with(shown.as_str()) => {
                let _ = writeln!(self.out, "{}", &text[shown.len()..]);
            }
            // The answer replaced what was streamed (e.g. a failed summary).
            Some(_) => {
                let _ = writeln!(self.out);
                let _ = writeln!(self.out, "magicsql> {}", text);
            }
            None => {
                let _ = writeln!(self.out, "magicsql> {}", text);
            }
        }
        let _ = self.out.flush();
    }

    fn render_fragment(&mut self, fragment: &str) {
        self.clear_thinking();
        let shown = self.streamed.get_or_insert_with(|| {
            let _ = write!(self.out, "magicsql> ");
            String::new()
        });
        shown.push_str(fragment);
        let _ = write!(self.out, "{}", fragment);
        let _ = self.out.flush();
    }

    fn render_thinking_indicator(&mut self, on: bool) {
        if on && !self.thinking && self.streamed.is_none() {
            let _ = write!(self.out, "{}", THINKING);
            let _ = self.out.flush();
            self.thinking = true;
        } else if !on {
            self.clear_thinking();
        }
    }

    async fn on_user_input(&mut self) -> Option<String> {
        self.prompt();
        let line = match self.lines.next().await {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Failed to read input");
                return None;
            }
            None => return None,
        };

        match line.trim() {
            "/quit" | "/exit" => None,
            "/reset" | "/clear" => {
                self.reset_pending = true;
                Some(String::new())
            }
            "/help" => {
                let _ = writeln!(self.out, "{}", HELP);
                Some(String::new())
            }
            _ => Some(line),
        }
    }

    fn on_reset_requested(&mut self) -> bool {
        std::mem::take(&mut self.reset_pending)
    }

    fn render_trace(&mut self, result: &QueryResult) {
        if !self.show_sql {
            return;
        }
        if let Some(ref sql) = result.executed_sql {
            let _ = writeln!(self.out, "  SQL: {}", sql.replace('\n', " "));
        }
        if let Some(ref rows) = result.raw_rows {
            let _ = writeln!(
                self.out,
                "  rows: {}{}",
                rows.len(),
                if rows.truncated { " (truncated)" } else { "" }
            );
        }
        let _ = self.out.flush();
    }
}
