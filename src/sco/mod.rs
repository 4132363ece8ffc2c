//! SCO/eSCO link negotiation for one peer, built on [`CommandChannel`].
//!
//! A [`ScoManager`] registers for the connection-request and synchronous-
//! connection-complete events at construction and drives link setup through
//! the same command queue as everything else. One request may be queued and
//! one in progress at a time; queueing a new request replaces a queued one
//! and supersedes an in-progress responder that is still waiting for its
//! peer. Responder requests walk their candidate parameter sets in order,
//! retrying on each failed completion until the controller accepts one or
//! the list runs out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use crate::channel::{CommandChannel, EventHandlerId};
use crate::dispatch::Dispatcher;
use crate::error::{ChannelError, ScoError};
use crate::protocol::consts::{
    EVT_COMMAND_STATUS, EVT_CONNECTION_REQUEST, EVT_SYNC_CONNECTION_COMPLETE,
    OP_ACCEPT_SYNC_CONNECTION, OP_REJECT_SYNC_CONNECTION, OP_SETUP_SYNC_CONNECTION,
    REJECT_REASON_LIMITED_RESOURCES, STATUS_UNSPECIFIED_ERROR,
};
use crate::protocol::{
    CommandPacket, DeviceAddress, EventPacket, LinkType, StatusCode, SyncConnectionParams,
};

/// Identifies one negotiation request. Monotonically increasing per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScoRequestId(u64);

/// Successful outcome of a negotiation: the established link and the index
/// of the candidate parameter set the controller accepted.
#[derive(Debug, Clone)]
pub struct ScoCompleted {
    pub connection: ScoConnection,
    pub candidate_index: usize,
}

pub type ScoResult = Result<ScoCompleted, ScoError>;

type ScoCallback = Box<dyn FnOnce(ScoResult) + Send + 'static>;

/// An established synchronous link. Clones share the same underlying state;
/// the manager keeps one clone registered by connection handle until
/// teardown.
#[derive(Clone)]
pub struct ScoConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    handle: u16,
    peer: DeviceAddress,
    link_type: LinkType,
    params: SyncConnectionParams,
    open: AtomicBool,
}

impl ScoConnection {
    fn new(handle: u16, peer: DeviceAddress, link_type: LinkType, params: SyncConnectionParams) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                handle,
                peer,
                link_type,
                params,
                open: AtomicBool::new(true),
            }),
        }
    }

    pub fn handle(&self) -> u16 {
        self.inner.handle
    }

    pub fn peer(&self) -> DeviceAddress {
        self.inner.peer
    }

    pub fn link_type(&self) -> LinkType {
        self.inner.link_type
    }

    /// The candidate parameter set the link was established with.
    pub fn params(&self) -> &SyncConnectionParams {
        &self.inner.params
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Mark the link closed. Idempotent.
    pub fn close(&self) {
        if self.inner.open.swap(false, Ordering::AcqRel) {
            debug!(
                "SCO connection 0x{:04X} to {} closed",
                self.inner.handle, self.inner.peer
            );
        }
    }
}

impl std::fmt::Debug for ScoConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoConnection")
            .field("handle", &self.inner.handle)
            .field("peer", &self.inner.peer)
            .field("link_type", &self.inner.link_type)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Cancels the request it was returned for. Cancelling a queued request
/// removes it and fires its callback with [`ScoError::Canceled`]. An
/// in-progress request can only be cancelled while it is a responder that
/// has not yet seen its peer's connection request; once a command is on the
/// wire the cancel is a no-op.
pub struct ScoRequestHandle {
    id: ScoRequestId,
    inner: Weak<Inner>,
}

impl ScoRequestHandle {
    pub fn cancel(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.cancel_request(self.id);
        }
    }

    fn detached(id: ScoRequestId) -> Self {
        Self {
            id,
            inner: Weak::new(),
        }
    }
}

struct ScoRequest {
    id: ScoRequestId,
    initiator: bool,
    received_request: bool,
    candidates: Vec<SyncConnectionParams>,
    current: usize,
    callback: Option<ScoCallback>,
}

#[derive(Default)]
struct State {
    queued: Option<ScoRequest>,
    in_progress: Option<ScoRequest>,
    connections: HashMap<u16, ScoConnection>,
    torn_down: bool,
}

struct Inner {
    channel: CommandChannel,
    dispatcher: Dispatcher,
    peer: DeviceAddress,
    acl_handle: u16,
    state: Mutex<State>,
    next_request: AtomicU64,
    handler_ids: Mutex<Vec<EventHandlerId>>,
}

/// Negotiates SCO/eSCO links with a single peer over an established ACL
/// connection. Dropping the manager (or calling [`ScoManager::shut_down`])
/// unregisters its event handlers, closes every live connection, and
/// completes outstanding requests with [`ScoError::Canceled`].
pub struct ScoManager {
    inner: Arc<Inner>,
}

impl ScoManager {
    /// Build a manager for `peer` and register its two event handlers on
    /// the channel. Fails if another handler already owns either event code.
    pub fn new(
        channel: CommandChannel,
        peer: DeviceAddress,
        acl_handle: u16,
        dispatcher: Dispatcher,
    ) -> Result<Self, ChannelError> {
        let inner = Arc::new(Inner {
            channel,
            dispatcher,
            peer,
            acl_handle,
            state: Mutex::new(State::default()),
            next_request: AtomicU64::new(1),
            handler_ids: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        let request_handler = inner.channel.add_event_handler(
            EVT_CONNECTION_REQUEST,
            &inner.dispatcher,
            move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_connection_request(event);
                }
            },
        )?;

        let weak = Arc::downgrade(&inner);
        let complete_handler = match inner.channel.add_event_handler(
            EVT_SYNC_CONNECTION_COMPLETE,
            &inner.dispatcher,
            move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_sync_connection_complete(event);
                }
            },
        ) {
            Ok(id) => id,
            Err(e) => {
                inner.channel.remove_event_handler(request_handler);
                return Err(e);
            }
        };

        inner
            .handler_ids
            .lock()
            .unwrap()
            .extend([request_handler, complete_handler]);
        Ok(Self { inner })
    }

    /// Initiate a link to the peer, trying `candidates` in order. The
    /// callback fires exactly once with the outcome.
    pub fn open_connection<F>(
        &self,
        candidates: Vec<SyncConnectionParams>,
        callback: F,
    ) -> ScoRequestHandle
    where
        F: FnOnce(ScoResult) + Send + 'static,
    {
        self.inner.queue_request(true, candidates, Box::new(callback))
    }

    /// Wait for the peer to request a link and accept it with the first
    /// compatible candidate, walking forward on each failure. The callback
    /// fires exactly once with the outcome.
    pub fn accept_connection<F>(
        &self,
        candidates: Vec<SyncConnectionParams>,
        callback: F,
    ) -> ScoRequestHandle
    where
        F: FnOnce(ScoResult) + Send + 'static,
    {
        self.inner.queue_request(false, candidates, Box::new(callback))
    }

    /// Tear down: unregister handlers, close live connections, complete the
    /// queued and in-progress requests with `Canceled`. Idempotent.
    pub fn shut_down(&self) {
        self.inner.shut_down();
    }
}

impl Drop for ScoManager {
    fn drop(&mut self) {
        self.inner.shut_down();
    }
}

impl Inner {
    fn queue_request(
        self: &Arc<Self>,
        initiator: bool,
        candidates: Vec<SyncConnectionParams>,
        callback: ScoCallback,
    ) -> ScoRequestHandle {
        if candidates.is_empty() {
            callback(Err(ScoError::InvalidParameters));
            return ScoRequestHandle::detached(ScoRequestId(0));
        }

        let id = ScoRequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        let replaced = {
            let mut state = self.state.lock().unwrap();
            if state.torn_down {
                drop(state);
                callback(Err(ScoError::Canceled));
                return ScoRequestHandle::detached(id);
            }
            let replaced = state
                .queued
                .take()
                .and_then(|mut old| old.callback.take());
            state.queued = Some(ScoRequest {
                id,
                initiator,
                received_request: false,
                candidates,
                current: 0,
                callback: Some(callback),
            });
            replaced
        };
        if let Some(cb) = replaced {
            debug!("Replacing queued SCO request");
            self.post_result(cb, Err(ScoError::Canceled));
        }
        self.try_create_next_connection();
        ScoRequestHandle {
            id,
            inner: Arc::downgrade(self),
        }
    }

    /// Promote the queued request once nothing (that matters) is in
    /// progress. A responder still idling for its peer is superseded by a
    /// newly queued request.
    fn try_create_next_connection(self: &Arc<Self>) {
        let (superseded, setup) = {
            let mut state = self.state.lock().unwrap();
            let mut superseded = None;
            if state.queued.is_some() {
                let idle_responder = state
                    .in_progress
                    .as_ref()
                    .is_some_and(|r| !r.initiator && !r.received_request);
                if idle_responder {
                    if let Some(mut old) = state.in_progress.take() {
                        superseded = old.callback.take();
                    }
                }
            }
            let mut setup = None;
            if state.in_progress.is_none() {
                if let Some(request) = state.queued.take() {
                    if request.initiator {
                        setup = Some((request.id, self.setup_command(&request.candidates[0])));
                    }
                    debug!(
                        "SCO request now in progress ({})",
                        if request.initiator { "initiator" } else { "responder" }
                    );
                    state.in_progress = Some(request);
                }
            }
            (superseded, setup)
        };

        if let Some(cb) = superseded {
            debug!("Superseding idle responder request");
            self.post_result(cb, Err(ScoError::Canceled));
        }
        if let Some((id, packet)) = setup {
            self.send_negotiation_command(packet, id);
        }
    }

    /// Peer asked for a connection. Accept with the next compatible
    /// candidate if a responder request is waiting; otherwise reject.
    fn on_connection_request(self: &Arc<Self>, event: EventPacket) {
        let request = match event.to_connection_request() {
            Ok(request) => request,
            Err(e) => {
                warn!("Discarding malformed connection-request event: {}", e);
                return;
            }
        };
        if request.addr != self.peer {
            debug!("Ignoring connection request from {}", request.addr);
            return;
        }
        if !request.link_type.is_synchronous() {
            debug!("Ignoring {} connection request", request.link_type);
            return;
        }

        enum Disposition {
            Accept(ScoRequestId, SyncConnectionParams),
            Reject,
            Ignore,
        }

        let disposition = {
            let mut state = self.state.lock().unwrap();
            match state.in_progress.as_mut() {
                Some(in_progress) if !in_progress.initiator && in_progress.received_request => {
                    // Our accept is already with the controller.
                    debug!("Already responding to a peer request; ignoring");
                    Disposition::Ignore
                }
                Some(in_progress) if !in_progress.initiator => {
                    let compatible = (in_progress.current..in_progress.candidates.len()).find(
                        |&i| in_progress.candidates[i].supports_link_type(request.link_type),
                    );
                    match compatible {
                        Some(index) => {
                            in_progress.current = index;
                            in_progress.received_request = true;
                            Disposition::Accept(
                                in_progress.id,
                                in_progress.candidates[index].clone(),
                            )
                        }
                        None => {
                            // Reject, and let the completion event the
                            // controller still sends finish the request.
                            info!(
                                "No candidate supports a {} link; rejecting peer request",
                                request.link_type
                            );
                            Disposition::Reject
                        }
                    }
                }
                _ => {
                    debug!("Not accepting connections; rejecting peer request");
                    Disposition::Reject
                }
            }
        };

        match disposition {
            Disposition::Accept(id, params) => {
                info!("Accepting {} request from {}", request.link_type, request.addr);
                self.send_negotiation_command(self.accept_command(&params), id);
            }
            Disposition::Reject => self.send_reject(),
            Disposition::Ignore => {}
        }
    }

    /// The controller finished (or failed) a synchronous link setup.
    fn on_sync_connection_complete(self: &Arc<Self>, event: EventPacket) {
        let complete = match event.to_sync_connection_complete() {
            Ok(complete) => complete,
            Err(e) => {
                warn!("Discarding malformed synchronous-connection-complete event: {}", e);
                return;
            }
        };
        if complete.addr != self.peer {
            debug!("Ignoring synchronous connection complete for {}", complete.addr);
            return;
        }

        let finished = {
            let mut state = self.state.lock().unwrap();
            let Some(in_progress) = state.in_progress.as_ref() else {
                debug!("Synchronous connection complete with no request in progress");
                return;
            };

            if !complete.status.is_success() {
                let exhausted = in_progress.current + 1 >= in_progress.candidates.len();
                if in_progress.initiator {
                    self.take_in_progress(&mut state, Err(ScoError::Failed(complete.status)))
                } else if exhausted {
                    self.take_in_progress(
                        &mut state,
                        Err(ScoError::ParametersRejected(complete.status)),
                    )
                } else if state.queued.is_some() {
                    // A replacement is waiting; stop retrying.
                    self.take_in_progress(&mut state, Err(ScoError::Canceled))
                } else {
                    let in_progress = state.in_progress.as_mut().expect("checked above");
                    in_progress.current += 1;
                    in_progress.received_request = false;
                    debug!(
                        "Candidate rejected ({}), waiting to retry with candidate {}",
                        complete.status, in_progress.current
                    );
                    return;
                }
            } else {
                let link_type = match complete.link_type {
                    Ok(link_type) if link_type.is_synchronous() => link_type,
                    _ => {
                        warn!("Synchronous connection complete with invalid link type");
                        let failed = Err(ScoError::Failed(StatusCode(STATUS_UNSPECIFIED_ERROR)));
                        let finished = self.take_in_progress(&mut state, failed);
                        drop(state);
                        if let Some((cb, result)) = finished {
                            self.post_result(cb, result);
                        }
                        self.try_create_next_connection();
                        return;
                    }
                };
                let index = in_progress.current;
                let params = in_progress.candidates[index].clone();
                let connection =
                    ScoConnection::new(complete.handle, self.peer, link_type, params);
                state
                    .connections
                    .insert(complete.handle, connection.clone());
                info!(
                    "{} connection 0x{:04X} established with {} (candidate {})",
                    link_type, complete.handle, self.peer, index
                );
                self.take_in_progress(
                    &mut state,
                    Ok(ScoCompleted {
                        connection,
                        candidate_index: index,
                    }),
                )
            }
        };

        if let Some((cb, result)) = finished {
            self.post_result(cb, result);
        }
        self.try_create_next_connection();
    }

    /// Clear the in-progress slot and hand back its callback with the
    /// result to deliver. State is cleared before anyone can observe the
    /// callback, so a callback that queues or cancels sees a clean slot.
    fn take_in_progress(
        &self,
        state: &mut State,
        result: ScoResult,
    ) -> Option<(ScoCallback, ScoResult)> {
        let mut request = state.in_progress.take()?;
        request.callback.take().map(|cb| (cb, result))
    }

    fn complete_in_progress(self: &Arc<Self>, id: ScoRequestId, result: ScoResult) {
        let finished = {
            let mut state = self.state.lock().unwrap();
            if state.in_progress.as_ref().map(|r| r.id) == Some(id) {
                self.take_in_progress(&mut state, result)
            } else {
                None
            }
        };
        if let Some((cb, result)) = finished {
            self.post_result(cb, result);
        }
        self.try_create_next_connection();
    }

    fn cancel_request(self: &Arc<Self>, id: ScoRequestId) {
        let cancelled = {
            let mut state = self.state.lock().unwrap();
            if state.queued.as_ref().map(|r| r.id) == Some(id) {
                state.queued.take().and_then(|mut r| r.callback.take())
            } else if state.in_progress.as_ref().is_some_and(|r| {
                r.id == id && !r.initiator && !r.received_request
            }) {
                state.in_progress.take().and_then(|mut r| r.callback.take())
            } else {
                // Initiated or already-responding requests cannot be
                // aborted mid-flight.
                None
            }
        };
        if let Some(cb) = cancelled {
            debug!("SCO request cancelled");
            self.post_result(cb, Err(ScoError::Canceled));
            self.try_create_next_connection();
        }
    }

    fn shut_down(self: &Arc<Self>) {
        let (callbacks, connections) = {
            let mut state = self.state.lock().unwrap();
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            let mut callbacks = Vec::new();
            if let Some(mut queued) = state.queued.take() {
                callbacks.extend(queued.callback.take());
            }
            if let Some(mut in_progress) = state.in_progress.take() {
                callbacks.extend(in_progress.callback.take());
            }
            let connections: Vec<ScoConnection> =
                state.connections.drain().map(|(_, c)| c).collect();
            (callbacks, connections)
        };

        let handler_ids: Vec<EventHandlerId> =
            self.handler_ids.lock().unwrap().drain(..).collect();
        for id in handler_ids {
            self.channel.remove_event_handler(id);
        }
        for connection in connections {
            connection.close();
        }
        for cb in callbacks {
            self.post_result(cb, Err(ScoError::Canceled));
        }
    }

    fn post_result(&self, cb: ScoCallback, result: ScoResult) {
        if !self.dispatcher.post(move || cb(result)) {
            warn!("Dispatcher gone, dropping SCO result");
        }
    }

    /// Submit a negotiation command whose completion is its command-status
    /// event; a failure status fails the whole request.
    fn send_negotiation_command(self: &Arc<Self>, packet: CommandPacket, request: ScoRequestId) {
        let weak = Arc::downgrade(self);
        let sent = self.channel.send_command(
            packet,
            EVT_COMMAND_STATUS,
            &self.dispatcher,
            |_, _| {},
            move |_id, event| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match event.to_command_status() {
                    Ok(status) if !status.status.is_success() => {
                        warn!("Negotiation command refused: {}", status.status);
                        inner.complete_in_progress(request, Err(ScoError::Failed(status.status)));
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Malformed command-status completion: {}", e),
                }
            },
        );
        if let Err(e) = sent {
            warn!("Failed to submit negotiation command: {}", e);
            self.complete_in_progress(request, Err(ScoError::Canceled));
        }
    }

    fn send_reject(self: &Arc<Self>) {
        let sent = self.channel.send_command(
            self.reject_command(),
            EVT_COMMAND_STATUS,
            &self.dispatcher,
            |_, _| {},
            |_id, event| {
                if let Ok(status) = event.to_command_status() {
                    if !status.status.is_success() {
                        warn!("Reject command refused: {}", status.status);
                    }
                }
            },
        );
        if let Err(e) = sent {
            warn!("Failed to submit reject command: {}", e);
        }
    }

    fn setup_command(&self, params: &SyncConnectionParams) -> CommandPacket {
        let mut payload = Vec::with_capacity(17);
        payload.extend_from_slice(&self.acl_handle.to_le_bytes());
        params.encode_into(&mut payload);
        CommandPacket::with_payload(OP_SETUP_SYNC_CONNECTION, payload)
    }

    fn accept_command(&self, params: &SyncConnectionParams) -> CommandPacket {
        let mut payload = Vec::with_capacity(21);
        payload.extend_from_slice(&self.peer.to_wire());
        params.encode_into(&mut payload);
        CommandPacket::with_payload(OP_ACCEPT_SYNC_CONNECTION, payload)
    }

    fn reject_command(&self) -> CommandPacket {
        let mut payload = Vec::with_capacity(7);
        payload.extend_from_slice(&self.peer.to_wire());
        payload.push(REJECT_REASON_LIMITED_RESOURCES);
        CommandPacket::with_payload(OP_REJECT_SYNC_CONNECTION, payload)
    }
}
