//! Discovery manager: registered services, discovered peers, callbacks, and
//! the background receive loop gluing them together.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::identity::Md5Hash;
use crate::protocol::{MessageType, ServiceIdentifier, CHIRP_PORT};
use crate::socket::{BroadcastReceiver, BroadcastSender, Datagram};
use crate::wire::Message;

/// A service this process hosts and announces.
///
/// Ordered by identifier, then port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisteredService {
    pub identifier: ServiceIdentifier,
    pub port: u16,
}

/// A service some peer in the group announced and has not withdrawn.
///
/// `address` is carried for connecting but excluded from ordering, equality
/// and hashing: a peer that re-appears under a new IP is the same logical
/// peer.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveredService {
    pub address: Ipv4Addr,
    pub name_hash: Md5Hash,
    pub identifier: ServiceIdentifier,
    pub port: u16,
}

impl DiscoveredService {
    fn key(&self) -> (Md5Hash, ServiceIdentifier, u16) {
        (self.name_hash, self.identifier, self.port)
    }
}

impl PartialEq for DiscoveredService {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for DiscoveredService {}

impl PartialOrd for DiscoveredService {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DiscoveredService {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for DiscoveredService {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Discovery callback: receives the event snapshot and `departed == true`
/// when the service went away. Each invocation runs on its own detached
/// blocking task, so a callback may block without stalling the receive loop.
///
/// The `Arc` pointer is the registration identity: registering a clone of an
/// already-registered handle is a no-op, while two separate `Arc`s wrapping
/// the same function are two registrations.
pub type DiscoverCallback = Arc<dyn Fn(DiscoveredService, bool) + Send + Sync>;

/// Per-process CHIRP discovery engine.
///
/// Owns the broadcast sender and receiver, the registered and discovered
/// service sets, and the callback registry. `start` spawns the background
/// receive loop; `shutdown` stops it and withdraws every registered service.
pub struct Manager {
    inner: Arc<Inner>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    run_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    sender: BroadcastSender,
    receiver: BroadcastReceiver,
    group_hash: Md5Hash,
    name_hash: Md5Hash,
    registered: Mutex<BTreeSet<RegisteredService>>,
    discovered: Mutex<BTreeSet<DiscoveredService>>,
    callbacks: Mutex<Vec<DiscoverCallback>>,
}

impl Manager {
    /// Bind both sockets on the CHIRP port and derive the group and name
    /// fingerprints. Must run within a tokio runtime; bind failures surface
    /// here.
    pub async fn new(
        brd_address: Ipv4Addr,
        any_address: Ipv4Addr,
        group: &str,
        name: &str,
    ) -> io::Result<Self> {
        Self::with_port(brd_address, any_address, group, name, CHIRP_PORT).await
    }

    async fn with_port(
        brd_address: Ipv4Addr,
        any_address: Ipv4Addr,
        group: &str,
        name: &str,
        port: u16,
    ) -> io::Result<Self> {
        let receiver = BroadcastReceiver::bind(any_address, port).await?;
        let sender = BroadcastSender::new(brd_address, port).await?;
        let (stop_tx, stop_rx) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                sender,
                receiver,
                group_hash: Md5Hash::of(group),
                name_hash: Md5Hash::of(name),
                registered: Mutex::new(BTreeSet::new()),
                discovered: Mutex::new(BTreeSet::new()),
                callbacks: Mutex::new(Vec::new()),
            }),
            stop_tx,
            stop_rx,
            run_task: parking_lot::Mutex::new(None),
        })
    }

    /// Fingerprint of the group name this manager filters on.
    pub fn group_hash(&self) -> Md5Hash {
        self.inner.group_hash
    }

    /// Fingerprint of this process's instance name.
    pub fn name_hash(&self) -> Md5Hash {
        self.inner.name_hash
    }

    /// Spawn the background receive loop. A no-op while the loop is running.
    pub fn start(&self) {
        let mut task = self.run_task.lock();
        if task.is_some() {
            return;
        }
        *task = Some(tokio::spawn(run_loop(
            self.inner.clone(),
            self.stop_rx.clone(),
        )));
    }

    /// Insert a service. Iff newly inserted, an OFFER broadcast is submitted
    /// before this returns. Returns whether it was newly inserted.
    pub async fn register_service(&self, service: RegisteredService) -> bool {
        let inserted = self.inner.registered.lock().await.insert(service);
        if inserted {
            self.inner
                .send_message(MessageType::Offer, service.identifier, service.port)
                .await;
        }
        inserted
    }

    /// Remove a service. Iff removed, a LEAVING broadcast is submitted before
    /// this returns. Returns whether it was present.
    pub async fn unregister_service(&self, service: RegisteredService) -> bool {
        let removed = self.inner.registered.lock().await.remove(&service);
        if removed {
            self.inner
                .send_message(MessageType::Leaving, service.identifier, service.port)
                .await;
        }
        removed
    }

    /// Broadcast a LEAVING for every registered service, then clear the set.
    pub async fn unregister_all_services(&self) {
        let drained = std::mem::take(&mut *self.inner.registered.lock().await);
        for service in drained {
            self.inner
                .send_message(MessageType::Leaving, service.identifier, service.port)
                .await;
        }
    }

    /// Snapshot of the registered services.
    pub async fn get_registered_services(&self) -> BTreeSet<RegisteredService> {
        self.inner.registered.lock().await.clone()
    }

    /// Snapshot of the currently discovered services.
    pub async fn get_discovered_services(&self) -> BTreeSet<DiscoveredService> {
        self.inner.discovered.lock().await.clone()
    }

    /// Add a callback registration. Returns `false` if this exact handle is
    /// already registered.
    pub async fn register_callback(&self, callback: DiscoverCallback) -> bool {
        let mut callbacks = self.inner.callbacks.lock().await;
        if callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            return false;
        }
        callbacks.push(callback);
        true
    }

    /// Remove a callback registration. Returns whether it was present.
    pub async fn unregister_callback(&self, callback: &DiscoverCallback) -> bool {
        let mut callbacks = self.inner.callbacks.lock().await;
        let before = callbacks.len();
        callbacks.retain(|c| !Arc::ptr_eq(c, callback));
        callbacks.len() < before
    }

    pub async fn unregister_all_callbacks(&self) {
        self.inner.callbacks.lock().await.clear();
    }

    /// Broadcast a REQUEST asking peers to re-announce services of a kind.
    pub async fn send_request(&self, identifier: ServiceIdentifier) {
        self.inner
            .send_message(MessageType::Request, identifier, 0)
            .await;
    }

    /// Stop the receive loop, wait for it to exit, then withdraw every still
    /// registered service with a LEAVING broadcast. Sockets close when the
    /// manager is dropped.
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        let task = self.run_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "receive loop task failed");
            }
        }
        self.unregister_all_services().await;
        info!(name = %self.inner.name_hash, "chirp manager shut down");
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        // Backstop when shutdown() was never called.
        if let Some(task) = self.run_task.lock().take() {
            task.abort();
        }
    }
}

impl Inner {
    async fn send_message(&self, kind: MessageType, identifier: ServiceIdentifier, port: u16) {
        let msg = Message {
            kind,
            group_hash: self.group_hash,
            name_hash: self.name_hash,
            identifier,
            port,
        };
        if let Err(e) = self.sender.send(&msg.assemble()).await {
            // Lossy announcement: peers that missed it catch up via REQUEST.
            warn!(error = %e, kind = %kind, "broadcast failed");
        }
    }

    async fn handle_datagram(&self, datagram: &Datagram) {
        let msg = match Message::parse(&datagram.content) {
            Ok(msg) => msg,
            Err(e) => {
                trace!(source = %datagram.source, error = %e, "dropping undecodable datagram");
                return;
            }
        };
        if msg.group_hash != self.group_hash {
            trace!(group = %msg.group_hash, "dropping foreign-group message");
            return;
        }
        if msg.name_hash == self.name_hash {
            trace!("dropping own echo");
            return;
        }

        let service = DiscoveredService {
            address: datagram.source,
            name_hash: msg.name_hash,
            identifier: msg.identifier,
            port: msg.port,
        };

        match msg.kind {
            MessageType::Request => {
                let matching: Vec<RegisteredService> = {
                    let registered = self.registered.lock().await;
                    registered
                        .iter()
                        .copied()
                        .filter(|s| s.identifier == msg.identifier)
                        .collect()
                };
                for service in matching {
                    self.send_message(MessageType::Offer, service.identifier, service.port)
                        .await;
                }
            }
            MessageType::Offer => {
                let inserted = self.discovered.lock().await.insert(service);
                if inserted {
                    debug!(
                        peer = %service.name_hash,
                        identifier = %service.identifier,
                        port = service.port,
                        address = %service.address,
                        "service discovered"
                    );
                    self.dispatch_callbacks(service, false).await;
                }
            }
            MessageType::Leaving => {
                let removed = self.discovered.lock().await.remove(&service);
                if removed {
                    debug!(
                        peer = %service.name_hash,
                        identifier = %service.identifier,
                        port = service.port,
                        "service departed"
                    );
                    self.dispatch_callbacks(service, true).await;
                }
            }
        }
    }

    async fn dispatch_callbacks(&self, service: DiscoveredService, departed: bool) {
        // Clone the registry so no lock is held while callbacks run.
        let callbacks = self.callbacks.lock().await.clone();
        for callback in callbacks {
            tokio::task::spawn_blocking(move || callback(service, departed));
        }
    }
}

async fn run_loop(inner: Arc<Inner>, mut stop_rx: watch::Receiver<bool>) {
    loop {
        let datagram = tokio::select! {
            _ = stop_rx.changed() => break,
            result = inner.receiver.recv() => match result {
                Ok(datagram) => datagram,
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, "receive hiccup");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "receive failed, stopping discovery loop");
                    break;
                }
            },
        };
        inner.handle_datagram(&datagram).await;
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::ConnectionReset
    )
}
