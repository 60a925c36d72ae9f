//! Control-channel command/response codec.
//!
//! Replies are a 3-digit code followed by text. Multi-line replies open with `NNN-` and run
//! until a line starting with `NNN `.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::ftp::error::{FtpError, FtpResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpResponse {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpResponse {
    /// 1xx: more replies follow.
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx: the server wants another command (e.g. PASS after USER).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Reply text without the code prefixes, lines joined by newlines.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.get(4..).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct ControlChannel<S> {
    stream: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ControlChannel<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    pub async fn send_command(&mut self, cmd: &str) -> FtpResult<()> {
        let line = format!("{}\r\n", cmd);
        let writer = self.stream.get_mut();
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        if cmd.starts_with("PASS ") {
            tracing::trace!(">>> PASS ***");
        } else {
            tracing::trace!(">>> {}", cmd);
        }
        Ok(())
    }

    async fn read_line(&mut self) -> FtpResult<String> {
        let mut buf = String::new();
        let n = self.stream.read_line(&mut buf).await?;
        if n == 0 {
            return Err(FtpError::Disconnected);
        }
        Ok(buf.trim_end_matches(['\r', '\n']).to_string())
    }

    pub async fn read_response(&mut self) -> FtpResult<FtpResponse> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;
        let mut lines = vec![first.clone()];

        if first.as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{} ", code);
            loop {
                let next = self.read_line().await?;
                let done = next.starts_with(&terminator) || next == code.to_string();
                lines.push(next);
                if done {
                    break;
                }
            }
        }

        let resp = FtpResponse { code, lines };
        tracing::trace!("<<< {} {}", resp.code, resp.lines.last().map(String::as_str).unwrap_or_default());
        Ok(resp)
    }

    pub async fn execute(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        self.send_command(cmd).await?;
        self.read_response().await
    }
}

fn parse_code(line: &str) -> FtpResult<u16> {
    let digits = line.get(..3).filter(|d| d.bytes().all(|b| b.is_ascii_digit()));
    match digits {
        Some(d) if line.len() == 3 || matches!(line.as_bytes()[3], b' ' | b'-') => d
            .parse()
            .map_err(|_| FtpError::Protocol(line.to_string())),
        _ => Err(FtpError::Protocol(format!("bad reply line '{}'", line))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_single_and_multi_line_replies() {
        let mock = Builder::new()
            .read(b"220-Welcome\r\n220-line two\r\n220 ready\r\n")
            .write(b"USER anonymous\r\n")
            .read(b"331 Password required\r\n")
            .build();
        let mut channel = ControlChannel::new(mock);

        let banner = channel.read_response().await.unwrap();
        assert_eq!(banner.code, 220);
        assert_eq!(banner.lines.len(), 3);
        assert_eq!(banner.text(), "Welcome\nline two\nready");

        let reply = channel.execute("USER anonymous").await.unwrap();
        assert!(reply.is_intermediate());
    }

    #[tokio::test]
    async fn test_garbage_is_protocol_error() {
        let mock = Builder::new().read(b"hello there\r\n").build();
        let mut channel = ControlChannel::new(mock);
        assert!(matches!(channel.read_response().await, Err(FtpError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_eof_is_disconnect() {
        let mock = Builder::new().build();
        let mut channel = ControlChannel::new(mock);
        assert!(matches!(channel.read_response().await, Err(FtpError::Disconnected)));
    }

    #[test]
    fn test_reply_classes() {
        let r = |code| FtpResponse {
            code,
            lines: vec![format!("{} x", code)],
        };
        assert!(r(150).is_preliminary());
        assert!(r(226).is_success());
        assert!(r(331).is_intermediate());
        assert!(!r(530).is_success());
    }
}
