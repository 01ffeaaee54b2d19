//! Subprocess output draining.
//!
//! Every stream of a spawned interpreter gets its own task that reads it to
//! end-of-stream. Without that, a chatty `install.packages` fills the OS pipe
//! buffer and the child blocks forever. Captured text is only handed out after
//! the task has been joined.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Marker preceding the R install location in `reg query` output.
const INSTALL_PATH_MARKER: &str = "InstallPath";
/// Registry value type printed between the value name and its data.
const REG_SZ_MARKER: &str = "REG_SZ";

/// Drains one stream, optionally keeping what it read.
#[derive(Debug)]
pub struct StreamCapture {
    task: JoinHandle<String>,
}

impl StreamCapture {
    /// Start draining `stream` on its own task.
    ///
    /// With `capture` set every line is appended to the buffer prefixed with a
    /// newline, so `a`, `b`, `c` become `"\na\nb\nc"`.
    pub fn spawn<R>(stream: R, capture: bool) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut out = String::new();
            drain_lines(stream, |line| {
                if capture {
                    out.push('\n');
                    out.push_str(line);
                }
            })
            .await;
            out
        });
        Self { task }
    }

    /// Stop draining without waiting for end-of-stream.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for end-of-stream and return the captured text.
    pub async fn finish(self) -> String {
        match self.task.await {
            Ok(text) => text,
            Err(e) => {
                warn!("Output drain task failed: {}", e);
                String::new()
            }
        }
    }
}

/// Drains one stream of `reg query` output looking for the R install path.
#[derive(Debug)]
pub struct RegistryCapture {
    task: JoinHandle<Option<String>>,
}

impl RegistryCapture {
    pub fn spawn<R>(stream: R, capture: bool) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut install_path = None;
            drain_lines(stream, |line| {
                if capture {
                    if let Some(path) = parse_install_path(line) {
                        install_path = Some(path);
                    }
                }
            })
            .await;
            install_path
        });
        Self { task }
    }

    /// Wait for end-of-stream and return the last install path seen.
    pub async fn finish(self) -> Option<String> {
        match self.task.await {
            Ok(path) => path,
            Err(e) => {
                warn!("Registry drain task failed: {}", e);
                None
            }
        }
    }
}

/// Both drains of a child whose stdout and stderr were piped.
#[derive(Debug)]
pub struct ChildOutput {
    stdout: Option<StreamCapture>,
    stderr: Option<StreamCapture>,
}

impl ChildOutput {
    /// Take the child's pipes and start draining them.
    pub fn capture(child: &mut Child, capture: bool) -> Self {
        Self {
            stdout: child
                .stdout
                .take()
                .map(|stream| StreamCapture::spawn(stream, capture)),
            stderr: child
                .stderr
                .take()
                .map(|stream| StreamCapture::spawn(stream, capture)),
        }
    }

    /// Stop both drains. A detached daemon may hold the pipes open forever.
    pub fn abort(&self) {
        for capture in [&self.stdout, &self.stderr].into_iter().flatten() {
            capture.abort();
        }
    }

    /// Join both drains; stdout text comes first.
    pub async fn finish(self) -> String {
        let mut text = match self.stdout {
            Some(capture) => capture.finish().await,
            None => String::new(),
        };
        if let Some(capture) = self.stderr {
            text.push_str(&capture.finish().await);
        }
        text
    }
}

/// Read `stream` line by line until it ends or fails, then drop it.
///
/// Lines are decoded lossily: interpreters echo paths in the system codepage,
/// and one stray byte must not cost the lines after it.
async fn drain_lines<R, F>(stream: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => on_line(&String::from_utf8_lossy(trim_line_ending(&buf))),
            Err(e) => {
                debug!("Stopped reading subprocess output: {}", e);
                break;
            }
        }
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Extract the value of an `InstallPath` registry line.
///
/// `    InstallPath    REG_SZ    C:\Program Files\R\R-4.3.1` yields the
/// directory; a line without `REG_SZ` yields whatever follows the name.
pub fn parse_install_path(line: &str) -> Option<String> {
    let start = line.find(INSTALL_PATH_MARKER)?;
    let rest = line[start + INSTALL_PATH_MARKER.len()..].trim();
    let value = match rest.find(REG_SZ_MARKER) {
        Some(j) => rest[j + REG_SZ_MARKER.len()..].trim(),
        None => rest,
    };
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    #[tokio::test]
    async fn test_capture_prefixes_each_line() {
        let stream = Cursor::new(b"a\nb\nc\n".to_vec());
        let text = StreamCapture::spawn(stream, true).finish().await;
        assert_eq!(text, "\na\nb\nc");
    }

    #[tokio::test]
    async fn test_capture_without_trailing_newline() {
        let stream = Cursor::new(b"a\nb\nc".to_vec());
        let text = StreamCapture::spawn(stream, true).finish().await;
        assert_eq!(text, "\na\nb\nc");
    }

    #[tokio::test]
    async fn test_capture_disabled_discards_text() {
        let stream = Cursor::new(b"[1] TRUE\nmore output\n".to_vec());
        let text = StreamCapture::spawn(stream, false).finish().await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let text = StreamCapture::spawn(Cursor::new(Vec::new()), true)
            .finish()
            .await;
        assert_eq!(text, "");
    }

    /// Yields one line, then fails.
    struct FailingReader {
        sent: bool,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "pipe closed",
                )))
            } else {
                self.sent = true;
                buf.put_slice(b"first\n");
                Poll::Ready(Ok(()))
            }
        }
    }

    #[tokio::test]
    async fn test_read_error_keeps_partial_text() {
        let text = StreamCapture::spawn(FailingReader { sent: false }, true)
            .finish()
            .await;
        assert_eq!(text, "\nfirst");
    }

    #[tokio::test]
    async fn test_capture_survives_invalid_utf8() {
        let stream =
            Cursor::new(b"> is.element(lib.loc='C:/Users/Jos\xe9')\r\n[1] TRUE\r\n".to_vec());
        let text = StreamCapture::spawn(stream, true).finish().await;
        assert!(text.contains("[1] TRUE"), "{:?}", text);
        assert!(text.starts_with("\n> is.element(lib.loc='C:/Users/Jos\u{FFFD}')"));
        assert!(!text.contains('\r'));
    }

    #[tokio::test]
    async fn test_registry_capture_survives_invalid_utf8() {
        let output = b"    InstallPath    REG_SZ    C:\\Users\\Jos\xe9\\R\r\n".to_vec();
        let path = RegistryCapture::spawn(Cursor::new(output), true)
            .finish()
            .await;
        assert_eq!(path.as_deref(), Some("C:\\Users\\Jos\u{FFFD}\\R"));
    }

    #[test]
    fn test_parse_install_path() {
        let line = r"    InstallPath    REG_SZ    C:\Program Files\R\R-4.3.1";
        assert_eq!(
            parse_install_path(line),
            Some(r"C:\Program Files\R\R-4.3.1".to_string())
        );
        assert_eq!(parse_install_path("    Current Version    REG_SZ    4.3.1"), None);
    }

    #[tokio::test]
    async fn test_registry_capture_finds_path() {
        let output = concat!(
            "\r\n",
            "HKEY_LOCAL_MACHINE\\SOFTWARE\\R-core\\R\r\n",
            "    InstallPath    REG_SZ    C:\\Program Files\\R\\R-4.3.1\r\n",
            "\r\n",
        );
        let path = RegistryCapture::spawn(Cursor::new(output.as_bytes().to_vec()), true)
            .finish()
            .await;
        assert_eq!(path.as_deref(), Some(r"C:\Program Files\R\R-4.3.1"));
    }

    #[tokio::test]
    async fn test_registry_capture_disabled() {
        let output = b"    InstallPath    REG_SZ    C:\\R\n".to_vec();
        let path = RegistryCapture::spawn(Cursor::new(output), false)
            .finish()
            .await;
        assert_eq!(path, None);
    }
}
