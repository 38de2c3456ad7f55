use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use crossbeam_channel::Sender;
use log::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub captured_output: String,
}

impl ExecutionResult {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            captured_output: message,
        }
    }
}

pub trait ProcessRunner {
    /// Runs `argv` in `workdir`, handing each output line to `sink` as it arrives.
    ///
    /// A program that cannot be started is a failed result, not an error.
    fn run(&self, argv: &[String], workdir: &Path, sink: &mut dyn FnMut(&str)) -> ExecutionResult;

    /// Runs a short diagnostic command. Returns stdout on success and stderr on failure.
    fn run_capturing(&self, argv: &[String], workdir: &Path) -> (bool, String);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, argv: &[String], workdir: &Path, sink: &mut dyn FnMut(&str)) -> ExecutionResult {
        let Some((program, args)) = argv.split_first() else {
            return ExecutionResult::failed("empty command".to_string());
        };
        debug!("running `{}` in {}", argv.join(" "), workdir.display());

        let mut child = match Command::new(program)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                return ExecutionResult::failed(format!("failed to start {program}: {err}"));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        let mut captured = String::new();
        thread::scope(|scope| {
            if let Some(stdout) = stdout {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(stdout, &tx));
            }
            if let Some(stderr) = stderr {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(stderr, &tx));
            }
            drop(tx);

            for line in rx {
                sink(&line);
                captured.push_str(&line);
                captured.push('\n');
            }
        });

        let success = match child.wait() {
            Ok(status) => status.code() == Some(0),
            Err(err) => {
                debug!("failed waiting for {program}: {err}");
                false
            }
        };
        ExecutionResult {
            success,
            captured_output: captured,
        }
    }

    fn run_capturing(&self, argv: &[String], workdir: &Path) -> (bool, String) {
        let Some((program, args)) = argv.split_first() else {
            return (false, "empty command".to_string());
        };

        let output = match Command::new(program)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(err) => return (false, format!("failed to start {program}: {err}")),
        };

        if output.status.code() == Some(0) {
            (true, trim_trailing_newline(&output.stdout))
        } else {
            (false, trim_trailing_newline(&output.stderr))
        }
    }
}

fn forward_lines(reader: impl Read, tx: &Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if tx.send(line.to_string()).is_err() {
                    break;
                }
            }
        }
    }
}

fn trim_trailing_newline(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}
