use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::time::{self, Duration};
use tracing::{trace, warn};

use crate::network::transport::Transport;
use crate::AppResult;

const DIAL_RETRY_STEP: Duration = Duration::from_secs(1);
const DIAL_RETRY_MAX: Duration = Duration::from_secs(3);

pub type DialCallback = Arc<dyn Fn() -> BoxFuture<'static, AppResult<Transport>> + Send + Sync>;
pub type TransportCallback = Arc<dyn Fn(Transport) -> BoxFuture<'static, ()> + Send + Sync>;
pub type CancelCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Cancellable outbound dial loop.
///
/// Dial failures retry with linear backoff, capped at the larger of the
/// retry ceiling and the hard timeout. When a timeout is set and exceeded,
/// the cancel callback fires instead of retrying forever. After a
/// successful dial the established transport is handed to the connection
/// callback and the loop parks on the retry signal: `close(true)` dials
/// again, `close(false)` ends the loop for good.
pub struct Connector {
    addr: String,
    close_tx: async_channel::Sender<bool>,
    close_rx: async_channel::Receiver<bool>,
    working: AtomicBool,
}

impl Connector {
    pub fn new(addr: impl Into<String>) -> Connector {
        let (close_tx, close_rx) = async_channel::bounded(1);
        Connector {
            addr: addr.into(),
            close_tx,
            close_rx,
            working: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::Acquire)
    }

    /// Delivers the retry signal the dial loop is parked on.
    pub async fn close(&self, retry: bool) {
        let _ = self.close_tx.send(retry).await;
    }

    pub async fn run(
        &self,
        timeout: Duration,
        dial: DialCallback,
        conn_callback: TransportCallback,
        cancel_callback: Option<CancelCallback>,
    ) {
        if self.working.swap(true, Ordering::AcqRel) {
            return;
        }

        let max_delay = DIAL_RETRY_MAX.max(timeout);
        let mut delay = Duration::ZERO;

        loop {
            match dial().await {
                Err(e) => {
                    delay += DIAL_RETRY_STEP;
                    if !timeout.is_zero() && delay > timeout {
                        if let Some(cancel_callback) = &cancel_callback {
                            cancel_callback().await;
                        }
                        break;
                    }
                    if delay > max_delay {
                        delay = max_delay;
                    }
                    warn!(
                        "connecting to {} error: {}, retrying in {:?}",
                        self.addr, e, delay
                    );
                    time::sleep(delay).await;
                }
                Ok(transport) => {
                    conn_callback(transport).await;

                    let retry = self.close_rx.recv().await.unwrap_or(false);
                    if !retry {
                        break;
                    }
                    delay = Duration::ZERO;
                    trace!("reconnecting to {}", self.addr);
                }
            }
        }

        self.working.store(false, Ordering::Release);
    }
}
