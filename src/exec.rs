//! External-program handler.
//!
//! [`CommandHandler`] pipes the image through a program: payload on stdin,
//! result on stdout. Arguments may contain `{key}` placeholders which are
//! replaced by the request's parameter values, so one handler can serve
//! `convert - -resize {width}x{height} -` for any size.
//!
//! The program runs under a deadline (the handler's own timeout, or the
//! request's deadline if that comes first). A program still running at the
//! deadline is killed and the request fails with [`ImageError::Timeout`].

use crate::cancel::CancelToken;
use crate::error::{Error, ImageError, Result};
use crate::image::Image;
use crate::params::Params;
use crate::server::Handler;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct CommandHandler {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    format: Option<String>,
}

impl CommandHandler {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            format: None,
        }
    }

    /// Tag the output with `format` instead of the input's format.
    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    fn expand_args(&self, params: &Params) -> Result<Vec<String>> {
        self.args.iter().map(|arg| expand(arg, params)).collect()
    }
}

/// Replace every `{key}` in `arg` with `params[key]`.
fn expand(arg: &str, params: &Params) -> Result<String> {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let key = &rest[open + 1..open + len];
        out.push_str(&params.get(key)?.to_string());
        rest = &rest[open + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn join<T>(handle: JoinHandle<std::io::Result<T>>, what: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| Error::Internal(format!("{what} thread panicked")))?
        .map_err(Error::from)
}

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("kill failed: {e}");
    }
    if let Err(e) = child.wait() {
        warn!(pid = child.id(), "failed to reap killed command: {e}");
    }
}

impl Handler for CommandHandler {
    fn handle(&self, image: Image, params: &Params, cancel: &CancelToken) -> Result<Image> {
        let args = self.expand_args(params)?;
        cancel.check()?;
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ImageError::Exec(format!("{}: {e}", self.program)))?;

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            kill(&mut child);
            return Err(Error::Internal("child pipes were not captured".into()));
        };
        let input = image.clone();
        let writer = thread::spawn(move || {
            // A program that exits without reading closes the pipe early.
            match stdin.write_all(input.data()) {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        });
        let stdout = drain(stdout);
        let stderr = drain(stderr);

        let started = Instant::now();
        let deadline = match cancel.deadline() {
            Some(d) => d.min(started + self.timeout),
            None => started + self.timeout,
        };
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            let now = Instant::now();
            if now >= deadline {
                kill(&mut child);
                let elapsed = now - started;
                warn!(program = %self.program, ?elapsed, "external command timed out");
                return Err(ImageError::Timeout(elapsed).into());
            }
            if cancel.is_cancelled() {
                kill(&mut child);
                return Err(Error::Cancelled);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        };

        join(writer, "stdin")?;
        let output = join(stdout, "stdout")?;
        let errors = join(stderr, "stderr")?;
        if !status.success() {
            let message = String::from_utf8_lossy(&errors);
            return Err(ImageError::Exec(format!(
                "{} {status}: {}",
                self.program,
                message.trim()
            ))
            .into());
        }
        debug!(
            program = %self.program,
            bytes = output.len(),
            elapsed = ?started.elapsed(),
            "external command done"
        );
        let format = self.format.as_deref().unwrap_or(image.format());
        Ok(Image::new(format, output))
    }
}
