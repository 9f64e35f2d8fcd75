//! Child-process-backed PCM audio extractor.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PER_READ_TIMEOUT: Duration = Duration::from_secs(30);
const EMPTY_READ_SLEEP: Duration = Duration::from_millis(100);
const MAX_CONSECUTIVE_EMPTY_READS: u32 = 10;
const MAX_RETRIES: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const CHILD_KILL_GRACE: Duration = Duration::from_secs(2);

/// Observable counters for test scaffolding and diagnostics.
#[derive(Default)]
pub struct AudioStats {
    pub bytes_read: AtomicU64,
    pub consecutive_failures: AtomicU32,
    pub running: AtomicBool,
}

/// Produces a finite-or-long-lived sequence of PCM chunks from an HLS URL by
/// supervising an FFmpeg-like decoder child process.
pub struct AudioExtractor {
    ffmpeg_path: String,
    hls_url: String,
    sample_rate: u32,
    chunk_size: usize,
}

impl AudioExtractor {
    pub fn new(ffmpeg_path: impl Into<String>, hls_url: impl Into<String>, sample_rate: u32, chunk_size: usize) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            hls_url: hls_url.into(),
            sample_rate,
            chunk_size,
        }
    }

    /// Spawns the supervising task. Returns a receiver yielding PCM chunks
    /// and a shared stats handle; the sequence ends (channel closes) when
    /// the child exits cleanly, retries are exhausted, or `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> (mpsc::Receiver<Bytes>, Arc<AudioStats>) {
        let stats = Arc::new(AudioStats::default());
        let (tx, rx) = mpsc::channel(4);
        let task_stats = stats.clone();
        tokio::spawn(async move {
            task_stats.running.store(true, Ordering::SeqCst);
            self.run(tx, cancel, &task_stats).await;
            task_stats.running.store(false, Ordering::SeqCst);
        });
        (rx, stats)
    }

    async fn run(&self, tx: mpsc::Sender<Bytes>, cancel: CancellationToken, stats: &AudioStats) {
        let mut backoff = BASE_BACKOFF;
        let mut consecutive_failures = 0u32;

        loop {
            if cancel.is_cancelled() {
                return;
            }

            let mut child = match self.spawn_child() {
                Ok(child) => child,
                Err(err) => {
                    warn!(error = %err, "failed to spawn decoder process");
                    consecutive_failures += 1;
                    stats
                        .consecutive_failures
                        .store(consecutive_failures, Ordering::SeqCst);
                    if consecutive_failures >= MAX_RETRIES {
                        return;
                    }
                    if Self::sleep_or_cancelled(backoff, &cancel).await {
                        return;
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(Self::drain_stderr(stderr));
            }

            let mut stdout = match child.stdout.take() {
                Some(stdout) => stdout,
                None => {
                    warn!("decoder process had no stdout pipe");
                    Self::terminate(&mut child).await;
                    return;
                }
            };

            let mut empty_reads = 0u32;
            let mut had_success_this_attempt = false;
            let mut buf = vec![0u8; self.chunk_size];

            'reading: loop {
                let read_result = tokio::select! {
                    _ = cancel.cancelled() => {
                        Self::terminate(&mut child).await;
                        return;
                    }
                    result = tokio::time::timeout(PER_READ_TIMEOUT, stdout.read(&mut buf)) => result,
                };

                match read_result {
                    Err(_timeout) => {
                        warn!("decoder read timed out, restarting");
                        break 'reading;
                    }
                    Ok(Err(err)) => {
                        warn!(error = %err, "decoder read failed, restarting");
                        break 'reading;
                    }
                    Ok(Ok(0)) => {
                        empty_reads += 1;
                        if let Ok(Some(status)) = child.try_wait() {
                            if status.success() {
                                debug!("decoder exited cleanly, ending stream");
                                Self::terminate(&mut child).await;
                                return;
                            }
                            warn!(?status, "decoder exited with a failure status, restarting");
                            break 'reading;
                        }
                        if empty_reads >= MAX_CONSECUTIVE_EMPTY_READS {
                            debug!("decoder stream ended (empty-read threshold)");
                            Self::terminate(&mut child).await;
                            return;
                        }
                        if Self::sleep_or_cancelled(EMPTY_READ_SLEEP, &cancel).await {
                            Self::terminate(&mut child).await;
                            return;
                        }
                    }
                    Ok(Ok(n)) => {
                        empty_reads = 0;
                        had_success_this_attempt = true;
                        backoff = BASE_BACKOFF;
                        consecutive_failures = 0;
                        stats.consecutive_failures.store(0, Ordering::SeqCst);
                        stats.bytes_read.fetch_add(n as u64, Ordering::SeqCst);
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            Self::terminate(&mut child).await;
                            return;
                        }
                    }
                }
            }

            Self::terminate(&mut child).await;

            if !had_success_this_attempt {
                consecutive_failures += 1;
            }
            stats
                .consecutive_failures
                .store(consecutive_failures, Ordering::SeqCst);
            if consecutive_failures >= MAX_RETRIES {
                info!("giving up after {MAX_RETRIES} consecutive failures");
                return;
            }
            if Self::sleep_or_cancelled(backoff, &cancel).await {
                return;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Logs the decoder's stderr line by line until the pipe closes.
    /// Diagnostics only - never feeds back into retry decisions.
    async fn drain_stderr(stderr: tokio::process::ChildStderr) {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(decoder_stderr = %line, "decoder diagnostic output"),
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "failed reading decoder stderr");
                    break;
                }
            }
        }
    }

    fn spawn_child(&self) -> std::io::Result<Child> {
        let mut cmd = process_utils::tokio_command(&self.ffmpeg_path);
        cmd.args([
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "5",
            "-i",
            &self.hls_url,
            "-f",
            "s16le",
            "-acodec",
            "pcm_s16le",
            "-ac",
            "1",
            "-ar",
            &self.sample_rate.to_string(),
            "-",
        ])
        .env("LC_ALL", "C")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
        cmd.spawn()
    }

    /// Graceful-terminate (`q` on stdin, as FFmpeg understands), then kill
    /// after a grace period, then await - the cleanup guarantee required on
    /// every exit path.
    async fn terminate(child: &mut Child) {
        use tokio::io::AsyncWriteExt;

        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.flush().await;
            let _ = stdin.shutdown().await;
        }
        if tokio::time::timeout(CHILD_KILL_GRACE, child.wait())
            .await
            .is_err()
        {
            warn!("decoder did not exit in time; killing process");
            let _ = child.kill().await;
        }
        let _ = child.wait().await;
    }

    /// Sleeps for `duration` unless cancellation fires first; returns
    /// whether cancellation won the race.
    async fn sleep_or_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = BASE_BACKOFF;
        for _ in 0..10 {
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        assert_eq!(backoff, MAX_BACKOFF);
    }

    #[tokio::test]
    async fn sleep_returns_true_on_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cancelled = AudioExtractor::sleep_or_cancelled(Duration::from_secs(5), &cancel).await;
        assert!(cancelled);
    }

    #[tokio::test]
    async fn nonzero_exit_status_restarts_instead_of_ending_silently() {
        // `false` ignores every argument it's handed and exits 1 immediately,
        // standing in for a decoder that crashed mid-stream.
        let extractor = AudioExtractor::new("false", "ignored", 16_000, 64);
        let cancel = CancellationToken::new();
        let (mut rx, stats) = extractor.spawn(cancel.clone());

        // Give the first attempt time to spawn, observe the empty read and
        // the nonzero exit status, and enter the backoff sleep ahead of a
        // restart; then cancel to stop before the 5-retry ceiling.
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();

        assert!(rx.recv().await.is_none());
        assert!(stats.consecutive_failures.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn clean_exit_ends_stream_without_counting_as_a_failure() {
        // `true` ignores every argument and exits 0 immediately, standing in
        // for a decoder that finished its input cleanly.
        let extractor = AudioExtractor::new("true", "ignored", 16_000, 64);
        let cancel = CancellationToken::new();
        let (mut rx, stats) = extractor.spawn(cancel);

        assert!(rx.recv().await.is_none());
        assert_eq!(stats.consecutive_failures.load(Ordering::SeqCst), 0);
    }
}
