use std::ffi::{OsStr, OsString};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;

use crate::error::{BackendError, Result};

/// One invocation of an external inference tool.
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append `flag value`.
    pub fn opt(self, flag: &str, value: impl AsRef<OsStr>) -> Self {
        self.arg(flag).arg(value)
    }

    pub fn stdin_bytes(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Zero disables the timeout.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    fn tool_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .unwrap_or(&self.program)
            .to_string_lossy()
            .into_owned()
    }

    /// Run to completion and return captured stdout.
    pub fn run(self) -> Result<Vec<u8>> {
        let tool = self.tool_name();
        debug!(tool = %tool, args = ?self.args, "spawning backend tool");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        // Drain both pipes off-thread so a chatty tool cannot fill them and stall.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // Fed off-thread too, so a tool that never reads stdin cannot outlive the timeout.
        let feeder = match (self.stdin, child.stdin.take()) {
            (Some(data), Some(pipe)) => Some(feed(pipe, data)),
            _ => None,
        };

        let status = match self.timeout {
            Some(limit) => match child.wait_timeout(limit)? {
                Some(status) => status,
                None => {
                    kill(&mut child);
                    return Err(BackendError::TimedOut {
                        tool,
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait()?,
        };

        let stdout = join(stdout);
        let stderr = join(stderr);
        if let Some(feeder) = feeder {
            // A tool may exit without reading its input; its status says more than EPIPE.
            match feeder.join() {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
                _ => {}
            }
        }

        if status.success() {
            Ok(stdout)
        } else {
            Err(BackendError::ToolFailed {
                tool,
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            })
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn feed(mut pipe: ChildStdin, data: Vec<u8>) -> JoinHandle<std::io::Result<()>> {
    // The pipe is dropped when the thread ends, closing the child's stdin.
    thread::spawn(move || pipe.write_all(&data))
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Resolve an executable the way a shell would.
///
/// Names containing a path separator are taken as paths; bare names are
/// searched for on `PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout() {
        let out = ToolCommand::new("sh").opt("-c", "printf hello").run().unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_pipes_stdin() {
        let out = ToolCommand::new("cat").stdin_bytes("spoken text").run().unwrap();
        assert_eq!(out, b"spoken text");
    }

    #[test]
    fn test_failure_reports_stderr() {
        let err = ToolCommand::new("sh")
            .opt("-c", "echo model missing >&2; exit 3")
            .run()
            .unwrap_err();
        match err {
            BackendError::ToolFailed { tool, stderr, .. } => {
                assert_eq!(tool, "sh");
                assert_eq!(stderr, "model missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timeout_kills_child() {
        let err = ToolCommand::new("sleep")
            .arg("5")
            .timeout_secs(1)
            .run()
            .unwrap_err();
        assert!(matches!(err, BackendError::TimedOut { secs: 1, .. }));
    }

    #[test]
    fn test_timeout_applies_while_stdin_is_unread() {
        let start = std::time::Instant::now();
        let err = ToolCommand::new("sleep")
            .arg("4")
            .stdin_bytes(vec![b'x'; 1 << 20])
            .timeout_secs(1)
            .run()
            .unwrap_err();
        assert!(matches!(err, BackendError::TimedOut { secs: 1, .. }));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_unread_stdin_is_not_an_error() {
        let out = ToolCommand::new("sh")
            .opt("-c", "printf done")
            .stdin_bytes(vec![b'x'; 1 << 20])
            .run()
            .unwrap();
        assert_eq!(out, b"done");
    }

    #[test]
    fn test_missing_binary() {
        let err = ToolCommand::new("studiod-no-such-tool").run().unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }

    #[test]
    fn test_find_executable() {
        assert!(find_executable("sh").is_some());
        assert!(find_executable("studiod-no-such-tool").is_none());
        assert!(find_executable("").is_none());
        assert_eq!(find_executable("/bin/sh"), Some(PathBuf::from("/bin/sh")));
    }
}
