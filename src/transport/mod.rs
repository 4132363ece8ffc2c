use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::protocol::consts::{H4_ACL_DATA, H4_COMMAND, H4_EVENT, H4_SCO_DATA};
use crate::protocol::EventPacket;

// Bluetooth socket constants (from Linux kernel headers)
const AF_BLUETOOTH: libc::c_int = 31;
const BTPROTO_HCI: libc::c_int = 1;
const HCI_CHANNEL_USER: libc::c_ushort = 1;

/// sockaddr_hci — HCI socket address (from <bluetooth/hci.h>)
#[repr(C)]
struct SockaddrHci {
    hci_family: libc::c_ushort,
    hci_dev: libc::c_ushort,
    hci_channel: libc::c_ushort,
}

/// Exclusive user-channel connection to a local HCI controller.
///
/// The user channel hands the whole controller to one process: the kernel
/// stack is bypassed, and every packet read or written carries a 1-byte
/// packet-type indicator followed by the raw HCI packet. The adapter must
/// be down (no bluetoothd attached) for the bind to succeed.
pub struct HciSocket {
    fd: Arc<AsyncFd<OwnedFd>>,
    dev: u16,
}

impl HciSocket {
    /// Open the user channel for adapter `hci<dev>`.
    pub async fn open(dev: u16) -> Result<Self> {
        info!("Opening HCI user channel on hci{}", dev);

        let raw_fd = tokio::task::spawn_blocking(move || -> Result<OwnedFd> {
            unsafe {
                let fd = libc::socket(
                    AF_BLUETOOTH,
                    libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                    BTPROTO_HCI,
                );
                if fd < 0 {
                    anyhow::bail!(
                        "Failed to create HCI socket: {}",
                        std::io::Error::last_os_error()
                    );
                }

                let addr = SockaddrHci {
                    hci_family: AF_BLUETOOTH as libc::c_ushort,
                    hci_dev: dev as libc::c_ushort,
                    hci_channel: HCI_CHANNEL_USER,
                };
                let ret = libc::bind(
                    fd,
                    &addr as *const _ as *const libc::sockaddr,
                    std::mem::size_of::<SockaddrHci>() as libc::socklen_t,
                );
                if ret < 0 {
                    let err = std::io::Error::last_os_error();
                    libc::close(fd);
                    anyhow::bail!("HCI user-channel bind failed (is hci{} down?): {}", dev, err);
                }

                // Non-blocking for tokio async I/O
                let flags = libc::fcntl(fd, libc::F_GETFL);
                libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);

                Ok(OwnedFd::from_raw_fd(fd))
            }
        })
        .await
        .context("spawn_blocking panicked")?
        .context("HCI user channel open")?;

        let async_fd = AsyncFd::new(raw_fd)?;
        info!("HCI user channel open on hci{}", dev);
        Ok(Self {
            fd: Arc::new(async_fd),
            dev,
        })
    }

    pub fn dev(&self) -> u16 {
        self.dev
    }

    /// Split into read/write tasks. Returns a receiver for decoded incoming
    /// events and a sender for encoded outgoing command packets (opcode +
    /// length + parameters; the H4 indicator is prefixed here).
    pub fn into_split(
        self,
    ) -> (
        mpsc::Receiver<EventPacket>,
        mpsc::Sender<Vec<u8>>,
        tokio::task::JoinHandle<()>,
        tokio::task::JoinHandle<()>,
    ) {
        let (incoming_tx, incoming_rx) = mpsc::channel::<EventPacket>(64);
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Vec<u8>>(32);

        let read_fd = self.fd.clone();
        let write_fd = self.fd;

        let read_task = tokio::spawn(recv_loop(read_fd, incoming_tx));
        let write_task = tokio::spawn(send_loop(write_fd, outgoing_rx));

        (incoming_rx, outgoing_tx, read_task, write_task)
    }
}

/// Receive one HCI packet (the raw socket preserves packet boundaries).
async fn recv_packet(fd: &AsyncFd<OwnedFd>, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        let mut guard = fd.readable().await?;
        match guard.try_io(|inner| {
            let n = unsafe {
                libc::recv(
                    inner.get_ref().as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                )
            };
            if n < 0 {
                Err(std::io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        }) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

/// Send one HCI packet.
async fn send_packet(fd: &AsyncFd<OwnedFd>, data: &[u8]) -> std::io::Result<()> {
    loop {
        let mut guard = fd.writable().await?;
        match guard.try_io(|inner| {
            let n = unsafe {
                libc::send(
                    inner.get_ref().as_raw_fd(),
                    data.as_ptr() as *const libc::c_void,
                    data.len(),
                    0,
                )
            };
            if n < 0 {
                Err(std::io::Error::last_os_error())
            } else {
                Ok(())
            }
        }) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

/// Read loop: deframe H4 packets, decode events, forward them. Malformed
/// frames and non-event traffic are dropped with a diagnostic.
async fn recv_loop(fd: Arc<AsyncFd<OwnedFd>>, tx: mpsc::Sender<EventPacket>) {
    let mut buf = [0u8; 1024];

    loop {
        match recv_packet(&fd, &mut buf).await {
            Ok(0) => {
                info!("HCI socket closed (EOF)");
                return;
            }
            Ok(n) => {
                let data = &buf[..n];
                match data[0] {
                    H4_EVENT => match EventPacket::from_bytes(&data[1..]) {
                        Ok(evt) => {
                            debug!("RX: {}", evt);
                            if tx.send(evt).await.is_err() {
                                info!("Event channel closed, stopping recv loop");
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("Dropping malformed event frame ({} bytes): {}", n, e);
                        }
                    },
                    H4_ACL_DATA | H4_SCO_DATA => {
                        debug!("Ignoring data packet ({} bytes)", n);
                    }
                    other => {
                        warn!("Unknown H4 packet type 0x{:02X}, dropping", other);
                    }
                }
            }
            Err(e) => {
                error!("HCI read error: {}", e);
                return;
            }
        }
    }
}

/// Write loop: prefix the H4 command indicator and push packets to the
/// controller.
async fn send_loop(fd: Arc<AsyncFd<OwnedFd>>, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(bytes) = rx.recv().await {
        let mut framed = Vec::with_capacity(1 + bytes.len());
        framed.push(H4_COMMAND);
        framed.extend_from_slice(&bytes);
        debug!("TX: {} bytes", framed.len());
        if let Err(e) = send_packet(&fd, &framed).await {
            error!("HCI write error: {}", e);
            return;
        }
    }
    info!("Outgoing channel closed, stopping send loop");
}
