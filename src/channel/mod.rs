//! HCI command/event transaction layer.
//!
//! [`CommandChannel`] serializes commands onto the controller one at a time,
//! correlates command-status/command-complete events back to the issuing
//! caller, and routes unsolicited events to registered handlers. All
//! protocol work happens on a single spawned I/O task; callers only touch
//! two short-held locks (the submission FIFO and the handler table) and
//! receive results through their [`Dispatcher`].
//!
//! Known gaps, kept deliberately:
//! - there is no deadline on the in-flight command. A controller that never
//!   answers wedges the queue permanently.
//! - a command whose transport write fails is dropped without invoking
//!   either callback.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::ChannelError;
use crate::protocol::consts::{EVT_COMMAND_COMPLETE, EVT_COMMAND_STATUS, EVT_LE_META};
use crate::protocol::{CommandPacket, EventPacket, StatusCode};

/// Identifies one command/response exchange on a channel. Monotonically
/// increasing per channel instance; wraps rather than faulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Identifies a registered unsolicited-event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandlerId(u64);

type StatusCallback = Box<dyn FnOnce(TransactionId, StatusCode) + Send + 'static>;
type CompleteCallback = Box<dyn FnOnce(TransactionId, EventPacket) + Send + 'static>;
type EventCallback = Arc<dyn Fn(EventPacket) + Send + Sync + 'static>;

/// A submitted command waiting its turn at the head of the FIFO.
struct QueuedCommand {
    id: TransactionId,
    opcode: u16,
    bytes: Vec<u8>,
    complete_event: u8,
    status_cb: Option<StatusCallback>,
    complete_cb: Option<CompleteCallback>,
    dispatcher: Dispatcher,
}

/// Bookkeeping for the single in-flight command. At most one exists at any
/// time; it lives in the I/O task and nowhere else.
struct PendingTransaction {
    id: TransactionId,
    opcode: u16,
    complete_event: u8,
    status_cb: Option<StatusCallback>,
    complete_cb: Option<CompleteCallback>,
    dispatcher: Dispatcher,
}

#[derive(Clone)]
struct HandlerEntry {
    id: EventHandlerId,
    callback: EventCallback,
    dispatcher: Dispatcher,
}

#[derive(Default)]
struct HandlerTable {
    by_code: HashMap<u8, HandlerEntry>,
    by_subevent: HashMap<u8, HandlerEntry>,
}

struct Shared {
    queue: Mutex<VecDeque<QueuedCommand>>,
    handlers: Mutex<HandlerTable>,
    next_txn: AtomicU64,
    next_handler: AtomicU64,
    wake: mpsc::UnboundedSender<()>,
    shutdown: AtomicBool,
    outgoing: mpsc::Sender<Vec<u8>>,
}

/// Caller-facing handle to the transaction layer. Cheap to clone; all
/// clones drive the same queue and I/O task.
#[derive(Clone)]
pub struct CommandChannel {
    shared: Arc<Shared>,
}

impl CommandChannel {
    /// Build a channel over a transport split: decoded incoming events and
    /// a sink for encoded outgoing command packets (the tuple
    /// `HciSocket::into_split` produces). Spawns the I/O task.
    pub fn new(events: mpsc::Receiver<EventPacket>, outgoing: mpsc::Sender<Vec<u8>>) -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            handlers: Mutex::new(HandlerTable::default()),
            next_txn: AtomicU64::new(1),
            next_handler: AtomicU64::new(1),
            wake: wake_tx,
            shutdown: AtomicBool::new(false),
            outgoing,
        });
        tokio::spawn(run_loop(shared.clone(), events, wake_rx));
        Self { shared }
    }

    /// Submit a command. The command is encoded now, appended to the FIFO,
    /// and written to the controller once every earlier command has
    /// completed. Returns immediately.
    ///
    /// `complete_event` is the event code that finishes this transaction
    /// (command-complete for most commands, command-status for commands
    /// whose only synchronous answer is a status). `on_status` fires if an
    /// intermediate command-status event arrives first; a failure status
    /// retires the transaction and `on_complete` never runs. Both callbacks
    /// are posted to `dispatcher`, never invoked inline.
    pub fn send_command<S, C>(
        &self,
        packet: CommandPacket,
        complete_event: u8,
        dispatcher: &Dispatcher,
        on_status: S,
        on_complete: C,
    ) -> Result<TransactionId, ChannelError>
    where
        S: FnOnce(TransactionId, StatusCode) + Send + 'static,
        C: FnOnce(TransactionId, EventPacket) + Send + 'static,
    {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(ChannelError::ShutDown);
        }
        let bytes = packet.to_bytes()?;
        let id = TransactionId(self.shared.next_txn.fetch_add(1, Ordering::Relaxed));
        let command = QueuedCommand {
            id,
            opcode: packet.opcode(),
            bytes,
            complete_event,
            status_cb: Some(Box::new(on_status)),
            complete_cb: Some(Box::new(on_complete)),
            dispatcher: dispatcher.clone(),
        };
        self.shared.queue.lock().unwrap().push_back(command);
        let _ = self.shared.wake.send(());
        Ok(id)
    }

    /// Submit a command finished by a plain command-complete event.
    /// Intermediate status failures are logged.
    pub fn send_command_complete<C>(
        &self,
        packet: CommandPacket,
        dispatcher: &Dispatcher,
        on_complete: C,
    ) -> Result<TransactionId, ChannelError>
    where
        C: FnOnce(TransactionId, EventPacket) + Send + 'static,
    {
        self.send_command(
            packet,
            EVT_COMMAND_COMPLETE,
            dispatcher,
            |id, status| {
                if !status.is_success() {
                    warn!("{} rejected by controller: {}", id, status);
                }
            },
            on_complete,
        )
    }

    /// Register a handler for an unsolicited event code. Rejects the codes
    /// owned by command transactions (command complete, command status, LE
    /// meta) and any code that already has a handler.
    pub fn add_event_handler<F>(
        &self,
        event_code: u8,
        dispatcher: &Dispatcher,
        callback: F,
    ) -> Result<EventHandlerId, ChannelError>
    where
        F: Fn(EventPacket) + Send + Sync + 'static,
    {
        if matches!(
            event_code,
            EVT_COMMAND_COMPLETE | EVT_COMMAND_STATUS | EVT_LE_META
        ) {
            return Err(ChannelError::ReservedEventCode(event_code));
        }
        let mut handlers = self.shared.handlers.lock().unwrap();
        if handlers.by_code.contains_key(&event_code) {
            return Err(ChannelError::DuplicateHandler);
        }
        let id = EventHandlerId(self.shared.next_handler.fetch_add(1, Ordering::Relaxed));
        handlers.by_code.insert(
            event_code,
            HandlerEntry {
                id,
                callback: Arc::new(callback),
                dispatcher: dispatcher.clone(),
            },
        );
        Ok(id)
    }

    /// Register a handler for an LE-meta subevent code (a namespace
    /// separate from plain event codes). Subevent 0 does not exist.
    pub fn add_le_meta_handler<F>(
        &self,
        subevent_code: u8,
        dispatcher: &Dispatcher,
        callback: F,
    ) -> Result<EventHandlerId, ChannelError>
    where
        F: Fn(EventPacket) + Send + Sync + 'static,
    {
        if subevent_code == 0 {
            return Err(ChannelError::InvalidSubeventCode);
        }
        let mut handlers = self.shared.handlers.lock().unwrap();
        if handlers.by_subevent.contains_key(&subevent_code) {
            return Err(ChannelError::DuplicateHandler);
        }
        let id = EventHandlerId(self.shared.next_handler.fetch_add(1, Ordering::Relaxed));
        handlers.by_subevent.insert(
            subevent_code,
            HandlerEntry {
                id,
                callback: Arc::new(callback),
                dispatcher: dispatcher.clone(),
            },
        );
        Ok(id)
    }

    /// Unregister a handler. No-op if the id is unknown. Safe to call from
    /// inside a handler callback; dispatch never holds the table lock while
    /// running callbacks.
    pub fn remove_event_handler(&self, id: EventHandlerId) {
        let mut handlers = self.shared.handlers.lock().unwrap();
        handlers.by_code.retain(|_, entry| entry.id != id);
        handlers.by_subevent.retain(|_, entry| entry.id != id);
    }

    /// Stop the I/O task, drop the in-flight transaction and every queued
    /// command without invoking callbacks, and release the transport once
    /// the last handle is gone. Further submissions fail with
    /// [`ChannelError::ShutDown`].
    pub fn shut_down(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.queue.lock().unwrap().clear();
        let _ = self.shared.wake.send(());
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<EventPacket>,
    mut wake: mpsc::UnboundedReceiver<()>,
) {
    let mut pending: Option<PendingTransaction> = None;

    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        tokio::select! {
            _ = wake.recv() => {
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                try_send_next(&shared, &mut pending);
            }
            event = events.recv() => match event {
                Some(event) => handle_event(&shared, &mut pending, event),
                None => {
                    info!("Transport closed, stopping command channel");
                    break;
                }
            }
        }
    }

    let queued = shared.queue.lock().unwrap().len();
    if pending.is_some() || queued > 0 {
        debug!(
            "Channel stopping with {} in flight and {} queued (no callbacks fired)",
            usize::from(pending.is_some()),
            queued
        );
    }
}

/// Drain step: if nothing is in flight, pop the FIFO head and write it to
/// the transport. Installs the popped command as the pending transaction
/// only when the write is accepted; on write failure the command is
/// dropped, callbacks and all.
fn try_send_next(shared: &Arc<Shared>, pending: &mut Option<PendingTransaction>) {
    if pending.is_some() {
        return;
    }
    let command = shared.queue.lock().unwrap().pop_front();
    let Some(command) = command else {
        return;
    };
    let QueuedCommand {
        id,
        opcode,
        bytes,
        complete_event,
        status_cb,
        complete_cb,
        dispatcher,
    } = command;
    match shared.outgoing.try_send(bytes) {
        Ok(()) => {
            debug!("{} sent (opcode 0x{:04X})", id, opcode);
            *pending = Some(PendingTransaction {
                id,
                opcode,
                complete_event,
                status_cb,
                complete_cb,
                dispatcher,
            });
        }
        Err(e) => {
            // The command is gone and neither callback will fire.
            warn!("Transport write failed, dropping {} (opcode 0x{:04X}): {}", id, opcode, e);
        }
    }
}

fn handle_event(
    shared: &Arc<Shared>,
    pending: &mut Option<PendingTransaction>,
    event: EventPacket,
) {
    let code = event.code();

    if let Some(p) = pending.as_ref() {
        // Completion of the in-flight transaction?
        if code == p.complete_event {
            match embedded_opcode(&event) {
                Ok(Some(opcode)) if opcode != p.opcode => {
                    warn!(
                        "Completion event 0x{:02X} names opcode 0x{:04X}, expected 0x{:04X}; \
                         discarding",
                        code, opcode, p.opcode
                    );
                    return;
                }
                Err(e) => {
                    warn!("Discarding malformed completion event: {}", e);
                    return;
                }
                Ok(_) => {}
            }
            let p = pending.take().expect("pending checked above");
            let id = p.id;
            debug!("{} complete (event 0x{:02X})", id, code);
            if let Some(complete) = p.complete_cb {
                if !p.dispatcher.post(move || complete(id, event)) {
                    warn!("Dispatcher gone, dropping completion for {}", id);
                }
            }
            try_send_next(shared, pending);
            return;
        }

        // Intermediate command-status for the in-flight transaction?
        if code == EVT_COMMAND_STATUS {
            let status = match event.to_command_status() {
                Ok(status) => status,
                Err(e) => {
                    warn!("Discarding malformed command-status event: {}", e);
                    return;
                }
            };
            if status.opcode != p.opcode {
                warn!(
                    "Command-status for opcode 0x{:04X} while 0x{:04X} is in flight; discarding",
                    status.opcode, p.opcode
                );
                return;
            }
            let p = pending.as_mut().expect("pending checked above");
            let id = p.id;
            if let Some(cb) = p.status_cb.take() {
                let reported = status.status;
                if !p.dispatcher.post(move || cb(id, reported)) {
                    warn!("Dispatcher gone, dropping status for {}", id);
                }
            }
            if status.status.is_success() {
                // The real completion event is still to come.
                return;
            }
            debug!("{} failed at status stage: {}", id, status.status);
            *pending = None;
            try_send_next(shared, pending);
            return;
        }
    }

    dispatch_unsolicited(shared, event);
}

/// Opcode embedded in a completion-shaped event, when that shape carries
/// one. Custom completion codes carry none and match on event code alone.
fn embedded_opcode(event: &EventPacket) -> Result<Option<u16>, crate::error::PacketError> {
    match event.code() {
        EVT_COMMAND_COMPLETE => Ok(Some(event.to_command_complete()?.opcode)),
        EVT_COMMAND_STATUS => Ok(Some(event.to_command_status()?.opcode)),
        _ => Ok(None),
    }
}

fn dispatch_unsolicited(shared: &Arc<Shared>, event: EventPacket) {
    let entry = {
        let handlers = shared.handlers.lock().unwrap();
        if event.code() == EVT_LE_META {
            event
                .le_meta_subevent()
                .and_then(|sub| handlers.by_subevent.get(&sub).cloned())
        } else {
            handlers.by_code.get(&event.code()).cloned()
        }
    };
    match entry {
        Some(handler) => {
            let callback = handler.callback;
            if !handler.dispatcher.post(move || callback(event)) {
                warn!("Dispatcher gone, dropping event for handler {:?}", handler.id);
            }
        }
        None => debug!("Unhandled event: {}", event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::consts::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);
    const LONG: Duration = Duration::from_secs(2);

    fn test_channel() -> (
        CommandChannel,
        mpsc::Sender<EventPacket>,
        mpsc::Receiver<Vec<u8>>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::channel(16);
        (CommandChannel::new(event_rx, out_tx), event_tx, out_rx)
    }

    fn opcode_of(bytes: &[u8]) -> u16 {
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn command_complete(opcode: u16) -> EventPacket {
        let [lo, hi] = opcode.to_le_bytes();
        EventPacket::new(EVT_COMMAND_COMPLETE, vec![0x01, lo, hi, STATUS_SUCCESS])
    }

    fn command_status(status: u8, opcode: u16) -> EventPacket {
        let [lo, hi] = opcode.to_le_bytes();
        EventPacket::new(EVT_COMMAND_STATUS, vec![status, 0x01, lo, hi])
    }

    #[tokio::test]
    async fn test_commands_sent_one_at_a_time_in_order() {
        let (channel, event_tx, mut out_rx) = test_channel();
        let dispatcher = Dispatcher::spawned();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let opcodes = [0x1001u16, 0x1002, 0x1003];
        let mut ids = Vec::new();
        for &opcode in &opcodes {
            let done_tx = done_tx.clone();
            let id = channel
                .send_command_complete(CommandPacket::new(opcode), &dispatcher, move |id, _| {
                    let _ = done_tx.send(id);
                })
                .unwrap();
            ids.push(id);
        }

        for (i, &opcode) in opcodes.iter().enumerate() {
            let bytes = timeout(LONG, out_rx.recv()).await.unwrap().unwrap();
            assert_eq!(opcode_of(&bytes), opcode);
            // Nothing else reaches the transport until this one completes.
            assert!(timeout(SHORT, out_rx.recv()).await.is_err());
            event_tx.send(command_complete(opcode)).await.unwrap();
            let done = timeout(LONG, done_rx.recv()).await.unwrap().unwrap();
            assert_eq!(done, ids[i]);
        }
    }

    #[tokio::test]
    async fn test_status_fires_before_complete() {
        let (channel, event_tx, mut out_rx) = test_channel();
        let dispatcher = Dispatcher::spawned();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let status_tx = result_tx.clone();
        let complete_tx = result_tx.clone();
        let id = channel
            .send_command(
                CommandPacket::new(0x1234),
                0xAA,
                &dispatcher,
                move |id, status| {
                    let _ = status_tx.send(("status", id, status.is_success()));
                },
                move |id, _event| {
                    let _ = complete_tx.send(("complete", id, true));
                },
            )
            .unwrap();

        let bytes = timeout(LONG, out_rx.recv()).await.unwrap().unwrap();
        assert_eq!(opcode_of(&bytes), 0x1234);

        // Success status: transaction stays pending, no completion yet.
        event_tx
            .send(command_status(STATUS_SUCCESS, 0x1234))
            .await
            .unwrap();
        let (kind, got_id, ok) = timeout(LONG, result_rx.recv()).await.unwrap().unwrap();
        assert_eq!((kind, got_id, ok), ("status", id, true));
        assert!(timeout(SHORT, result_rx.recv()).await.is_err());

        // The matching completion event finishes it.
        event_tx
            .send(EventPacket::new(0xAA, vec![0x00]))
            .await
            .unwrap();
        let (kind, got_id, _) = timeout(LONG, result_rx.recv()).await.unwrap().unwrap();
        assert_eq!((kind, got_id), ("complete", id));
    }

    #[tokio::test]
    async fn test_status_failure_retires_without_complete() {
        let (channel, event_tx, mut out_rx) = test_channel();
        let dispatcher = Dispatcher::spawned();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let status_tx = result_tx.clone();
        let complete_tx = result_tx.clone();
        channel
            .send_command(
                CommandPacket::new(0x0428),
                0xAA,
                &dispatcher,
                move |id, status| {
                    let _ = status_tx.send(("status", id, status.is_success()));
                },
                move |id, _event| {
                    let _ = complete_tx.send(("complete", id, true));
                },
            )
            .unwrap();
        let next_tx = result_tx.clone();
        channel
            .send_command_complete(CommandPacket::new(0x1002), &dispatcher, move |id, _| {
                let _ = next_tx.send(("next", id, true));
            })
            .unwrap();

        let bytes = timeout(LONG, out_rx.recv()).await.unwrap().unwrap();
        assert_eq!(opcode_of(&bytes), 0x0428);

        event_tx
            .send(command_status(STATUS_REJECTED_LIMITED_RESOURCES, 0x0428))
            .await
            .unwrap();

        let (kind, _, ok) = timeout(LONG, result_rx.recv()).await.unwrap().unwrap();
        assert_eq!((kind, ok), ("status", false));

        // The failed command never completes; the next one is written.
        let bytes = timeout(LONG, out_rx.recv()).await.unwrap().unwrap();
        assert_eq!(opcode_of(&bytes), 0x1002);
        event_tx.send(command_complete(0x1002)).await.unwrap();
        let (kind, _, _) = timeout(LONG, result_rx.recv()).await.unwrap().unwrap();
        assert_eq!(kind, "next");
        assert!(timeout(SHORT, result_rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_mismatched_complete_leaves_transaction_pending() {
        let (channel, event_tx, mut out_rx) = test_channel();
        let dispatcher = Dispatcher::spawned();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        channel
            .send_command_complete(CommandPacket::new(0x1009), &dispatcher, move |id, _| {
                let _ = done_tx.send(id);
            })
            .unwrap();
        timeout(LONG, out_rx.recv()).await.unwrap().unwrap();

        // Completion naming a different opcode is protocol noise.
        event_tx.send(command_complete(0x0C03)).await.unwrap();
        assert!(timeout(SHORT, done_rx.recv()).await.is_err());

        event_tx.send(command_complete(0x1009)).await.unwrap();
        assert!(timeout(LONG, done_rx.recv()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_handler_registration_is_exclusive() {
        let (channel, _event_tx, _out_rx) = test_channel();
        let dispatcher = Dispatcher::spawned();

        let first = channel
            .add_event_handler(0x4F, &dispatcher, |_| {})
            .unwrap();
        assert!(matches!(
            channel.add_event_handler(0x4F, &dispatcher, |_| {}),
            Err(ChannelError::DuplicateHandler)
        ));

        channel.remove_event_handler(first);
        channel
            .add_event_handler(0x4F, &dispatcher, |_| {})
            .unwrap();
    }

    #[tokio::test]
    async fn test_reserved_codes_rejected() {
        let (channel, _event_tx, _out_rx) = test_channel();
        let dispatcher = Dispatcher::spawned();

        for code in [EVT_COMMAND_COMPLETE, EVT_COMMAND_STATUS, EVT_LE_META] {
            assert!(matches!(
                channel.add_event_handler(code, &dispatcher, |_| {}),
                Err(ChannelError::ReservedEventCode(_))
            ));
        }
        assert!(matches!(
            channel.add_le_meta_handler(0, &dispatcher, |_| {}),
            Err(ChannelError::InvalidSubeventCode)
        ));
    }

    #[tokio::test]
    async fn test_unsolicited_events_routed_to_handlers() {
        let (channel, event_tx, _out_rx) = test_channel();
        let dispatcher = Dispatcher::spawned();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let plain_tx = seen_tx.clone();
        channel
            .add_event_handler(0x4F, &dispatcher, move |event| {
                let _ = plain_tx.send(("plain", event.code()));
            })
            .unwrap();
        let meta_tx = seen_tx.clone();
        channel
            .add_le_meta_handler(0x0A, &dispatcher, move |event| {
                let _ = meta_tx.send(("meta", event.le_meta_subevent().unwrap_or(0)));
            })
            .unwrap();

        event_tx
            .send(EventPacket::new(0x4F, vec![0x01]))
            .await
            .unwrap();
        assert_eq!(
            timeout(LONG, seen_rx.recv()).await.unwrap().unwrap(),
            ("plain", 0x4F)
        );

        event_tx
            .send(EventPacket::new(EVT_LE_META, vec![0x0A, 0x00]))
            .await
            .unwrap();
        assert_eq!(
            timeout(LONG, seen_rx.recv()).await.unwrap().unwrap(),
            ("meta", 0x0A)
        );

        // No handler for this one; silently discarded.
        event_tx
            .send(EventPacket::new(0x50, vec![]))
            .await
            .unwrap();
        assert!(timeout(SHORT, seen_rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_drops_work_without_callbacks() {
        let (channel, _event_tx, mut out_rx) = test_channel();
        let dispatcher = Dispatcher::spawned();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let first_tx = done_tx.clone();
        channel
            .send_command_complete(CommandPacket::new(0x1001), &dispatcher, move |id, _| {
                let _ = first_tx.send(id);
            })
            .unwrap();
        timeout(LONG, out_rx.recv()).await.unwrap().unwrap();
        let second_tx = done_tx.clone();
        channel
            .send_command_complete(CommandPacket::new(0x1002), &dispatcher, move |id, _| {
                let _ = second_tx.send(id);
            })
            .unwrap();

        channel.shut_down();
        assert!(timeout(SHORT, done_rx.recv()).await.is_err());
        assert!(matches!(
            channel.send_command_complete(CommandPacket::new(0x1003), &dispatcher, |_, _| {}),
            Err(ChannelError::ShutDown)
        ));
    }
}
