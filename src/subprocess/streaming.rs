//! Incremental subprocess output
//!
//! [`SubprocessExecutor::execute_streaming`] yields chunks of stdout and
//! stderr as they arrive instead of buffering to completion. The deadline is
//! enforced at the consumption point, so a slow consumer counts against it.
//! The child is spawned with `kill_on_drop`, so abandoning the stream
//! terminates the process rather than leaking it.

use async_stream::try_stream;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::ClaudeError;
use crate::subprocess::executor::{ExecOptions, SubprocessExecutor, terminate_child};
use crate::types::{StreamChunk, StreamSource};

enum Next {
    Chunk(Option<StreamChunk>),
    Exited(std::io::Result<std::process::ExitStatus>),
    Timeout,
    Cancelled,
}

impl SubprocessExecutor {
    /// Run a command, yielding output chunks as they are produced.
    ///
    /// Chunks from stdout and stderr are multiplexed in arrival order, each
    /// tagged with its source. After both pipes close, a non-zero exit status
    /// surfaces as a final error item.
    pub fn execute_streaming(
        &self,
        argv: Vec<String>,
        opts: ExecOptions,
    ) -> impl Stream<Item = crate::error::Result<StreamChunk>> + Send + 'static {
        let this = self.clone();
        try_stream! {
            let command_line = this.validate(&argv)?;
            let timeout = opts.timeout.unwrap_or(this.config.default_timeout);
            let buffer_size = this.config.stream_buffer_size;
            let deadline = tokio::time::Instant::now() + timeout;

            log::debug!("Streaming `{command_line}` with timeout {timeout:?}");

            let mut child = this.spawn(&argv, &opts)?;

            // Stdin is fed from its own task so a blocked pipe write stays
            // under the deadline instead of stalling the stream before the
            // first chunk.
            if let Some(input) = opts.input.clone() {
                if let Some(mut stdin) = child.stdin.take() {
                    tokio::spawn(async move {
                        if let Err(err) = stdin.write_all(input.as_bytes()).await {
                            log::debug!("stdin write ended early: {err}");
                        }
                        let _ = stdin.shutdown().await;
                    });
                }
            }

            let (tx, mut rx) = mpsc::channel::<StreamChunk>(32);
            if let Some(stdout) = child.stdout.take() {
                tokio::spawn(pump(stdout, StreamSource::Stdout, tx.clone(), buffer_size));
            }
            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(pump(stderr, StreamSource::Stderr, tx.clone(), buffer_size));
            }
            drop(tx);

            let guard = this.registry.register();
            let cancelled = guard.token();

            loop {
                let next = tokio::select! {
                    chunk = rx.recv() => Next::Chunk(chunk),
                    () = tokio::time::sleep_until(deadline) => Next::Timeout,
                    () = cancelled.cancelled() => Next::Cancelled,
                };
                match next {
                    Next::Chunk(Some(chunk)) => yield chunk,
                    Next::Chunk(None) => break,
                    Next::Exited(_) => unreachable!(),
                    Next::Timeout => {
                        log::warn!("`{command_line}` exceeded {timeout:?} mid-stream, terminating");
                        terminate_child(&mut child).await;
                        Err(ClaudeError::timeout(command_line.clone(), timeout))?
                    }
                    Next::Cancelled => {
                        terminate_child(&mut child).await;
                        Err(ClaudeError::connection(format!(
                            "`{command_line}` cancelled during shutdown"
                        )))?
                    }
                }
            }

            let exit = tokio::select! {
                status = child.wait() => Next::Exited(status),
                () = tokio::time::sleep_until(deadline) => Next::Timeout,
            };
            let status = match exit {
                Next::Exited(status) => status?,
                _ => {
                    terminate_child(&mut child).await;
                    Err(ClaudeError::timeout(command_line.clone(), timeout))?;
                    unreachable!()
                }
            };
            drop(guard);

            if !status.success() {
                let exit_code = status.code().unwrap_or(-1);
                Err(ClaudeError::process(
                    command_line,
                    exit_code,
                    String::new(),
                    String::new(),
                ))?;
            }
        }
    }
}

async fn pump(
    mut pipe: impl AsyncRead + Unpin,
    source: StreamSource,
    tx: mpsc::Sender<StreamChunk>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = StreamChunk::new(
                    String::from_utf8_lossy(&buf[..n]).into_owned(),
                    source,
                );
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::config::ClaudeConfig;

    fn executor() -> SubprocessExecutor {
        SubprocessExecutor::new(Arc::new(ClaudeConfig::default()))
    }

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn yields_chunks_from_both_sources() {
        let exec = executor();
        let stream = exec.execute_streaming(
            args(&["sh", "-c", "echo out; echo err >&2"]),
            ExecOptions::default(),
        );
        let chunks: Vec<_> = stream.collect().await;

        let mut stdout = String::new();
        let mut stderr = String::new();
        for chunk in chunks {
            let chunk = chunk.unwrap();
            match chunk.source {
                StreamSource::Stdout => stdout.push_str(&chunk.content),
                StreamSource::Stderr => stderr.push_str(&chunk.content),
            }
        }
        assert_eq!(stdout.trim(), "out");
        assert_eq!(stderr.trim(), "err");
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_after_output() {
        let exec = executor();
        let stream = exec.execute_streaming(
            args(&["sh", "-c", "echo partial; exit 7"]),
            ExecOptions::default(),
        );
        let items: Vec<_> = stream.collect().await;

        let text: String = items
            .iter()
            .filter_map(|item| item.as_ref().ok())
            .map(|chunk| chunk.content.clone())
            .collect();
        assert!(text.contains("partial"));

        match items.last().unwrap() {
            Err(ClaudeError::Process { exit_code, .. }) => assert_eq!(*exit_code, 7),
            other => panic!("expected trailing Process error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_ends_stream_with_error() {
        let exec = executor();
        let stream = exec.execute_streaming(
            args(&["sh", "-c", "echo first; sleep 30"]),
            ExecOptions::with_timeout(Duration::from_millis(200)),
        );
        let items: Vec<_> = stream.collect().await;

        assert!(matches!(
            items.last().unwrap(),
            Err(ClaudeError::Timeout { .. })
        ));
        assert_eq!(exec.active_processes(), 0);
    }

    #[tokio::test]
    async fn rejected_command_fails_before_spawn() {
        let config = ClaudeConfig::builder()
            .allowed_commands(vec!["claude".to_string()])
            .build();
        let exec = SubprocessExecutor::new(Arc::new(config));
        let mut stream =
            Box::pin(exec.execute_streaming(args(&["echo", "no"]), ExecOptions::default()));
        match stream.next().await {
            Some(Err(ClaudeError::CommandRejected(_))) => {}
            other => panic!("expected CommandRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stdin_input_streams_back_out() {
        let exec = executor();
        let input = "z".repeat(256 * 1024);
        let opts = ExecOptions {
            input: Some(input.clone()),
            ..ExecOptions::default()
        };
        let stream = exec.execute_streaming(args(&["cat"]), opts);
        let total: usize = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|chunk| chunk.unwrap().content.len())
            .sum();
        assert_eq!(total, input.len());
    }

    #[tokio::test]
    async fn dropping_the_stream_terminates_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ticks");
        let script = format!(
            "while true; do date >> {}; echo tick; sleep 0.05; done",
            marker.display()
        );

        let exec = executor();
        let mut stream =
            Box::pin(exec.execute_streaming(args(&["sh", "-c", &script]), ExecOptions::default()));
        let first = stream.next().await.unwrap().unwrap();
        assert!(first.content.contains("tick"));

        drop(stream);
        assert_eq!(exec.active_processes(), 0);

        // The child must stop producing once the stream is gone.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let size_after_drop = std::fs::metadata(&marker).unwrap().len();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let size_later = std::fs::metadata(&marker).unwrap().len();
        assert_eq!(size_after_drop, size_later);
    }
}
