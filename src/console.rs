use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

pub type SharedConsole = Arc<Mutex<Console>>;

/// Line-oriented operator input plus the writer prompts go to.
///
/// The session loop and the approval gate read through the same buffered
/// reader so neither one swallows input meant for the other.
pub struct Console {
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    writer: Box<dyn Write + Send>,
}

impl Console {
    pub fn new(
        reader: impl AsyncBufRead + Unpin + Send + 'static,
        writer: impl Write + Send + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), std::io::stdout())
    }

    pub fn shared(self) -> SharedConsole {
        Arc::new(Mutex::new(self))
    }

    /// Next line without its terminator; `None` at end of input.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    pub fn write_line(&mut self, text: &str) {
        let _ = writeln!(self.writer, "{text}");
        let _ = self.writer.flush();
    }

    pub fn write(&mut self, text: &str) {
        let _ = write!(self.writer, "{text}");
        let _ = self.writer.flush();
    }

    pub async fn prompt(&mut self, prompt: &str) -> std::io::Result<Option<String>> {
        self.write(prompt);
        self.read_line().await
    }
}

/// A `Write` handle into a shared byte buffer; lets tests inspect what a
/// boxed writer produced.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut buf) => buf.extend_from_slice(data),
            Err(poisoned) => poisoned.into_inner().extend_from_slice(data),
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_line_strips_terminators_and_reports_eof() {
        let input: &[u8] = b"first\r\nsecond\n";
        let mut console = Console::new(input, Vec::new());
        assert_eq!(console.read_line().await.expect("read"), Some("first".to_string()));
        assert_eq!(console.read_line().await.expect("read"), Some("second".to_string()));
        assert_eq!(console.read_line().await.expect("read"), None);
    }

    #[tokio::test]
    async fn test_prompt_writes_before_reading() {
        let capture = CaptureBuffer::new();
        let input: &[u8] = b"y\n";
        let mut console = Console::new(input, capture.clone());
        let answer = console.prompt("Proceed? ").await.expect("prompt");
        assert_eq!(answer.as_deref(), Some("y"));
        assert_eq!(capture.contents(), "Proceed? ");
    }
}
