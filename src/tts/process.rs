use std::io::{self, Write};
use std::process::{Command, Output, Stdio};

/// Spawn `command`, feed `input` on stdin and wait for it to exit.
///
/// A child that exits without reading all of its input closes the pipe early;
/// that is not an error here, so the exit status and stderr still reach the
/// caller and the child is always reaped.
pub fn run_with_stdin(command: &mut Command, input: &[u8]) -> io::Result<Output> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(input) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!("Child closed stdin before reading all input");
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }
    }

    child.wait_with_output()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_input_reaches_child() {
        let output = run_with_stdin(&mut Command::new("cat"), b"hello").unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn test_early_exit_keeps_status_and_stderr() {
        let input = vec![b'x'; 4 * 1024 * 1024];
        let output = run_with_stdin(
            Command::new("sh").args(["-c", "echo 'bad voice' >&2; exit 3"]),
            &input,
        )
        .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "bad voice");
    }
}
