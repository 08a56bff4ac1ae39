use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dao::factory::Factory;
use crate::dao::log_item::LogItem;
use crate::dao::log_options::LogOptions;
use crate::error::DaoError;

const LOG_CHANNEL_CAPACITY: usize = 256;

/// Entries from one log source, in arrival order.
///
/// The sequence ends when the source closes, fails (after a single error
/// entry) or its session is cancelled.
pub struct LogStream {
    source: String,
    rx: mpsc::Receiver<LogItem>,
}

impl LogStream {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Stream for LogStream {
    type Item = LogItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Starts a task that follows one container and feeds its own channel.
pub(crate) fn tail_container(
    factory: Arc<dyn Factory>,
    opts: LogOptions,
    cancel: CancellationToken,
) -> LogStream {
    let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
    let source = opts.info();
    tokio::spawn(pump(factory, opts, cancel, tx));
    LogStream { source, rx }
}

/// A stream for a source that could not be resolved: one error entry, then
/// closed. Nothing is spawned.
pub(crate) fn failed_stream(opts: &LogOptions, error: &DaoError) -> LogStream {
    let (tx, rx) = mpsc::channel(1);
    let _ = tx.try_send(opts.to_err_log_item(error));
    LogStream {
        source: opts.info(),
        rx,
    }
}

async fn pump(
    factory: Arc<dyn Factory>,
    opts: LogOptions,
    cancel: CancellationToken,
    tx: mpsc::Sender<LogItem>,
) {
    let source = opts.info();
    let params = opts.to_fetch_params();
    let opened = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(source = %source, "log stream cancelled before open");
            return;
        }
        opened = factory.stream_logs(&opts.path, &params) => opened,
    };

    let mut lines = match opened {
        Ok(lines) => lines,
        Err(error) => {
            warn!(source = %source, error = %error, "log stream failed to open");
            fail(&opts, &source, error, &tx).await;
            return;
        }
    };
    debug!(source = %source, follow = params.follow, "log stream opened");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = lines.next() => next,
        };

        match next {
            Some(Ok(line)) => {
                let item = opts.to_log_item(line.into_bytes());
                if item.is_empty() {
                    continue;
                }
                let delivered = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    sent = tx.send(item) => sent.is_ok(),
                };
                if !delivered {
                    break;
                }
            }
            Some(Err(error)) => {
                warn!(source = %source, error = %error, "log stream interrupted");
                fail(&opts, &source, error, &tx).await;
                break;
            }
            None => break,
        }
    }

    debug!(source = %source, "log stream closed");
}

async fn fail(
    opts: &LogOptions,
    source: &str,
    error: anyhow::Error,
    tx: &mpsc::Sender<LogItem>,
) {
    let failure = DaoError::StreamFailure {
        source_id: source.to_string(),
        reason: format!("{error:#}"),
    };
    let _ = tx.send(opts.to_err_log_item(&failure)).await;
}
