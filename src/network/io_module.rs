// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use bytes::BytesMut;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace, warn};

use crate::network::transport::{Transport, TransportReader, TransportWriter};
use crate::network::Connection;
use crate::protocol::{Codec, Packet, TransportKind};
use crate::utils::SequenceGenerator;
use crate::{AppError, AppResult};

const READ_BUFFER_SIZE: usize = 8 * 1024;
const WRITE_BUFFER_SIZE: usize = 8 * 1024;

type SharedCodec = Arc<Mutex<Option<Box<dyn Codec>>>>;
type PendingTable = Arc<DashMap<u64, oneshot::Sender<Option<Packet>>>>;

/// Per-connection concurrency engine.
///
/// One reader task and one writer task per connection. The bounded outbound
/// queue is the sole backpressure mechanism: a slow peer makes producers
/// block on the enqueue rather than grow memory. `write_await` correlates a
/// request with its response through the pending table, keyed by the
/// sequence number stamped onto the outgoing packet.
///
/// Teardown is driven exclusively from `Connection::close`: the outbound
/// queue and the read cancellation token are each closed at most once, and
/// every still-pending await is force-completed with `None`.
pub struct IoModule {
    codec: SharedCodec,
    write_tx: async_channel::Sender<Packet>,
    write_rx: async_channel::Receiver<Packet>,
    read_close: CancellationToken,
    pending: PendingTable,
    sequence: SequenceGenerator,
}

impl IoModule {
    pub fn new(max_queue_size: usize) -> IoModule {
        let (write_tx, write_rx) = async_channel::bounded(max_queue_size);
        IoModule {
            codec: Arc::new(Mutex::new(None)),
            write_tx,
            write_rx,
            read_close: CancellationToken::new(),
            pending: Arc::new(DashMap::new()),
            sequence: SequenceGenerator::new(),
        }
    }

    /// Binds (or hot-swaps) the codec. Swapping under the shared lock is
    /// atomic for both I/O directions, so an in-band handshake can change
    /// framing between packets.
    pub fn update_codec(&self, mut codec: Box<dyn Codec>, kind: TransportKind) -> bool {
        if !codec.init(kind) {
            error!("codec init failed for {:?} transport", kind);
            return false;
        }
        *self.codec.lock() = Some(codec);
        true
    }

    pub(crate) fn start(&self, conn: Weak<Connection>, transport: Transport) {
        let (reader, writer) = transport.into_split();
        tokio::spawn(read_loop(
            conn.clone(),
            self.codec.clone(),
            self.pending.clone(),
            self.read_close.clone(),
            reader,
        ));
        tokio::spawn(write_loop(
            conn,
            self.codec.clone(),
            self.write_rx.clone(),
            writer,
        ));
    }

    /// Fire-and-forget write. Blocks while the outbound queue is full;
    /// silently drops the packet once the connection is torn down.
    pub async fn write(&self, packet: Packet) {
        if self.write_tx.send(packet).await.is_err() {
            trace!("write queue closed, packet dropped");
        }
    }

    /// Request/response write. Stamps a fresh sequence number, registers a
    /// completion slot, and enqueues through the normal outbound queue.
    ///
    /// Resolves with `Some(response)` when the reader matches a packet to
    /// this sequence, or `None` when the request could not be sent or the
    /// connection was torn down first. There is no built-in timeout; a
    /// caller wanting a bounded wait races this future against a timer.
    pub async fn write_await(&self, mut packet: Packet) -> AppResult<Option<Packet>> {
        let sequence = self.sequence.next();
        packet.set_sequence(sequence);

        let (done_tx, done_rx) = oneshot::channel();
        self.pending.insert(sequence, done_tx);

        if let Err(e) = self.write_tx.send(packet).await {
            warn!("enqueue of request {} failed: {}", sequence, e);
            if let Some((_, done_tx)) = self.pending.remove(&sequence) {
                let _ = done_tx.send(None);
            }
        }

        Ok(done_rx.await.unwrap_or(None))
    }

    /// Signals both I/O tasks to stop: the writer drains what is already
    /// queued and exits, the reader exits on its next iteration. Both
    /// signals are idempotent; closure is driven only from the connection's
    /// single atomically-guarded close path.
    pub fn on_connection_lost(&self) {
        self.write_tx.close();
        self.read_close.cancel();
    }
}

fn flush_pending(pending: &PendingTable) {
    let sequences: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for sequence in sequences {
        if let Some((_, done_tx)) = pending.remove(&sequence) {
            let _ = done_tx.send(None);
        }
    }
}

fn decode_next(codec: &SharedCodec, buffer: &mut BytesMut) -> AppResult<Option<Packet>> {
    let mut guard = codec.lock();
    match guard.as_mut() {
        Some(codec) => codec.decode(buffer),
        None => Err(AppError::CodecNotBound),
    }
}

fn encode_packet(codec: &SharedCodec, packet: &Packet, buffer: &mut BytesMut) -> AppResult<()> {
    let mut guard = codec.lock();
    match guard.as_mut() {
        Some(codec) => codec.encode(packet, buffer),
        None => Err(AppError::CodecNotBound),
    }
}

async fn read_loop(
    conn: Weak<Connection>,
    codec: SharedCodec,
    pending: PendingTable,
    read_close: CancellationToken,
    mut reader: TransportReader,
) {
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);

    'quit: loop {
        // drain every complete packet already buffered before reading more
        loop {
            let decoded = match std::panic::catch_unwind(AssertUnwindSafe(|| {
                decode_next(&codec, &mut buffer)
            })) {
                Ok(decoded) => decoded,
                Err(_) => {
                    error!("codec panicked while decoding");
                    break 'quit;
                }
            };
            match decoded {
                Ok(Some(packet)) => {
                    let sequence = packet.sequence();
                    if let Some((_, done_tx)) = pending.remove(&sequence) {
                        // response to an outstanding await, not a message
                        let _ = done_tx.send(Some(packet));
                        continue;
                    }
                    let Some(conn) = conn.upgrade() else {
                        break 'quit;
                    };
                    let dispatched =
                        tokio::spawn(async move { conn.read_packet(packet).await }).await;
                    if let Err(e) = dispatched {
                        if e.is_panic() {
                            error!("message handler panicked: {:?}", e);
                        }
                        break 'quit;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("decode error: {}", e);
                    break 'quit;
                }
            }
        }

        tokio::select! {
            _ = read_close.cancelled() => break 'quit,
            chunk = reader.read_chunk(&mut buffer) => match chunk {
                Ok(0) => {
                    if !buffer.is_empty() {
                        error!("connection reset by peer mid packet");
                    }
                    break 'quit;
                }
                Ok(_) => {}
                Err(e) => {
                    if !matches!(e, AppError::ConnClosed) {
                        error!("read error: {}", e);
                    }
                    break 'quit;
                }
            },
        }
    }

    // unblock every caller still waiting on a response, then close
    flush_pending(&pending);
    if let Some(conn) = conn.upgrade() {
        conn.close().await;
    }
}

async fn write_loop(
    conn: Weak<Connection>,
    codec: SharedCodec,
    write_rx: async_channel::Receiver<Packet>,
    mut writer: TransportWriter,
) {
    let mut buffer = BytesMut::with_capacity(WRITE_BUFFER_SIZE);

    while let Ok(packet) = write_rx.recv().await {
        buffer.clear();
        let encoded = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            encode_packet(&codec, &packet, &mut buffer)
        })) {
            Ok(encoded) => encoded,
            Err(_) => {
                error!("codec panicked while encoding");
                break;
            }
        };
        if let Err(e) = encoded {
            error!("encode error: {}", e);
            break;
        }
        if let Err(e) = writer.write_chunk(&buffer).await {
            error!("write error: {}", e);
            break;
        }

        // flush per burst: only once the queue is observed empty
        if write_rx.is_empty() {
            if let Err(e) = writer.flush().await {
                error!("flush error: {}", e);
                break;
            }
            if let Some(conn) = conn.upgrade() {
                let completed =
                    tokio::spawn(async move { conn.write_complete().await }).await;
                if let Err(e) = completed {
                    if e.is_panic() {
                        error!("write complete handler panicked: {:?}", e);
                    }
                    break;
                }
            }
        }
    }
}
