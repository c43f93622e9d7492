//! Connection lifecycle, fan-out of outgoing messages and the receive
//! pipeline.
//!
//! The [`Coordinator`] owns the listening socket, at most one outbound
//! connect attempt, the connected peers and the dispatch worker. All of that
//! lives behind one lock together with the [`ConnectionState`], so a state
//! and the set of peers it describes always change together.
//!
//! Workers never call back into the coordinator while it may be locked:
//! read loops report a lost peer on a channel that a supervisor task drains,
//! and the game's events reach the network through a separate bridge task.

use crate::config::PeerConfig;
use crate::connection::{InboundFrame, PeerConnection};
use crate::dispatch::Dispatcher;
use crate::error::NetError;
use crate::events::{ConnectionState, GameEvent, PeerInfo, UiEvent};
use crate::service::GameService;
use crate::transport::{self, Discovery};
use log::{debug, error, info, trace, warn};
use shared::codec::{decode_payload, encode};
use shared::{ByteBufferPool, Message, MessageBody, PeerAddress, WireError};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};

/// The inbound queue and the single worker draining it.
struct Pipeline {
    inbound: mpsc::UnboundedSender<InboundFrame>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    peers: Vec<Arc<PeerConnection>>,
    discovered: Vec<PeerInfo>,
    listen_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
    connect_task: Option<JoinHandle<()>>,
    discovery_task: Option<JoinHandle<()>>,
    pipeline: Option<Pipeline>,
}

impl Inner {
    fn is_known(&self, address: &PeerAddress) -> bool {
        self.peers.iter().any(|peer| peer.address() == address)
    }

    fn cancel_connect(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
    }

    fn cancel_discovery(&mut self) {
        if let Some(task) = self.discovery_task.take() {
            task.abort();
        }
    }
}

pub struct Coordinator {
    local: PeerInfo,
    listen: String,
    game: Arc<GameService>,
    dispatcher: Dispatcher,
    discovery: Arc<dyn Discovery>,
    pool: Arc<ByteBufferPool>,
    ui: mpsc::UnboundedSender<UiEvent>,
    lost_tx: mpsc::UnboundedSender<PeerAddress>,
    inner: Mutex<Inner>,
}

impl Coordinator {
    /// Creates the coordinator and starts its supervisor and event bridge.
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &PeerConfig,
        game: Arc<GameService>,
        game_events: mpsc::UnboundedReceiver<GameEvent>,
        discovery: Arc<dyn Discovery>,
        ui: mpsc::UnboundedSender<UiEvent>,
    ) -> Arc<Self> {
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let coordinator = Arc::new(Self {
            local: config.local.clone(),
            listen: config.listen.clone(),
            dispatcher: Dispatcher::new(Arc::clone(&game), ui.clone()),
            game,
            discovery,
            pool: Arc::new(ByteBufferPool::new()),
            ui,
            lost_tx,
            inner: Mutex::new(Inner::default()),
        });

        tokio::spawn(supervise(Arc::downgrade(&coordinator), lost_rx));
        tokio::spawn(bridge(Arc::downgrade(&coordinator), game_events));
        coordinator
    }

    pub fn local(&self) -> &PeerInfo {
        &self.local
    }

    pub fn game(&self) -> &Arc<GameService> {
        &self.game
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Addresses of the connected peers, in connection order.
    pub async fn peers(&self) -> Vec<PeerInfo> {
        let inner = self.inner.lock().await;
        inner.peers.iter().map(|peer| peer.info().clone()).collect()
    }

    /// Peers found by discovery, or the players that joined this host.
    pub async fn discovered(&self) -> Vec<PeerInfo> {
        self.inner.lock().await.discovered.clone()
    }

    pub async fn listen_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().await.listen_addr
    }

    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state != state {
            info!("Connection state {} -> {}", inner.state, state);
        }
        inner.state = state;
        let _ = self.ui.send(UiEvent::StateChanged(state));
    }

    fn ensure_pipeline(
        self: &Arc<Self>,
        inner: &mut Inner,
    ) -> mpsc::UnboundedSender<InboundFrame> {
        if let Some(pipeline) = &inner.pipeline {
            if !pipeline.worker.is_finished() {
                return pipeline.inbound.clone();
            }
        }
        let (inbound, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_pipeline(Arc::downgrade(self), rx));
        inner.pipeline = Some(Pipeline {
            inbound: inbound.clone(),
            worker,
        });
        inbound
    }

    /// Drops every connection and starts accepting players as the host.
    pub async fn start_hosting(self: &Arc<Self>) -> Result<SocketAddr, NetError> {
        let mut inner = self.inner.lock().await;
        inner.cancel_connect();
        inner.cancel_discovery();
        let peers: Vec<_> = inner.peers.drain(..).collect();
        for peer in peers {
            peer.cancel().await;
        }
        inner.discovered.clear();
        self.dispatcher.pause().reset();
        self.game.set_host(true);
        self.ensure_pipeline(&mut inner);

        let running = inner
            .accept_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false);
        let addr = match (running, inner.listen_addr) {
            (true, Some(addr)) => addr,
            _ => {
                let listener = transport::bind(&self.listen).await?;
                let addr = listener.local_addr()?;
                inner.accept_task = Some(tokio::spawn(accept_loop(
                    Arc::downgrade(self),
                    listener,
                    self.local.clone(),
                )));
                inner.listen_addr = Some(addr);
                addr
            }
        };
        self.set_state(&mut inner, ConnectionState::Listening);
        Ok(addr)
    }

    /// Starts connecting to the host at `address`.
    pub async fn connect_to(self: &Arc<Self>, address: PeerAddress) {
        let mut inner = self.inner.lock().await;
        inner.cancel_discovery();
        if inner.state == ConnectionState::Connecting {
            inner.cancel_connect();
        }
        self.game.set_host(false);
        self.ensure_pipeline(&mut inner);
        self.set_state(&mut inner, ConnectionState::Connecting);

        info!("Connecting to {}", address);
        let coordinator = Arc::downgrade(self);
        let local = self.local.clone();
        inner.connect_task = Some(tokio::spawn(async move {
            let result = transport::connect(&address, &local).await;
            let Some(coordinator) = coordinator.upgrade() else {
                return;
            };
            match result {
                Ok((stream, remote)) => coordinator.outbound_connected(stream, remote).await,
                Err(e) => coordinator.connect_failed(&address, e).await,
            }
        }));
    }

    async fn outbound_connected<S>(self: &Arc<Self>, stream: S, remote: PeerInfo)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Connecting {
            debug!("Dropping late connection to {}", remote.address);
            return;
        }
        inner.connect_task = None;
        self.promote(&mut inner, stream, remote);
    }

    async fn connect_failed(&self, address: &PeerAddress, e: NetError) {
        warn!("Connecting to {} failed: {}", address, e);
        let mut inner = self.inner.lock().await;
        inner.connect_task = None;
        self.set_state(&mut inner, ConnectionState::None);
        let _ = self.ui.send(UiEvent::ConnectFailed(address.to_string()));
    }

    /// Takes over a stream accepted by the listener, unless it duplicates a
    /// peer we already have.
    pub async fn accepted<S>(self: &Arc<Self>, stream: S, remote: PeerInfo)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        let take = match inner.state {
            ConnectionState::Listening | ConnectionState::Connecting => true,
            ConnectionState::None | ConnectionState::Connected => {
                !inner.is_known(&remote.address)
            }
            ConnectionState::Discovering => false,
        };
        if take {
            self.promote(&mut inner, stream, remote);
        } else {
            info!("Closing extra connection from {}", remote.address);
        }
    }

    fn promote<S>(self: &Arc<Self>, inner: &mut Inner, stream: S, remote: PeerInfo)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let inbound = self.ensure_pipeline(inner);
        let peer = PeerConnection::spawn(
            stream,
            remote.clone(),
            inbound,
            self.lost_tx.clone(),
            Arc::clone(&self.pool),
        );
        inner.peers.push(peer);
        info!("Connected to {} ({})", remote.name, remote.address);

        if self.game.is_host() {
            if !inner.discovered.contains(&remote) {
                inner.discovered.push(remote.clone());
            }
            let _ = self.ui.send(UiEvent::PeerDiscovered(remote));
        } else {
            let _ = self.ui.send(UiEvent::ServerConnected(remote));
        }
        self.set_state(inner, ConnectionState::Connected);
    }

    /// Closes the listening socket. Connected peers stay.
    pub async fn stop_accepting(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.accept_task.take() {
            task.abort();
            info!("Stopped accepting players");
        }
        inner.listen_addr = None;
    }

    /// Tears everything down and returns to [`ConnectionState::None`].
    pub async fn stop_all(&self) {
        let (peers, pipeline) = {
            let mut inner = self.inner.lock().await;
            inner.cancel_connect();
            inner.cancel_discovery();
            if let Some(task) = inner.accept_task.take() {
                task.abort();
            }
            inner.listen_addr = None;
            let peers: Vec<_> = inner.peers.drain(..).collect();
            let pipeline = inner.pipeline.take();
            self.set_state(&mut inner, ConnectionState::None);
            (peers, pipeline)
        };
        for peer in peers {
            peer.cancel().await;
        }
        if let Some(pipeline) = pipeline {
            pipeline.worker.abort();
        }
        info!("All connections stopped");
    }

    /// Sends `message` to the connected peers in connection order.
    ///
    /// Unless `broadcast` is set the peer the message originates from is
    /// skipped. A `StartGame` message is rewritten for every recipient with
    /// its own player number. Nothing is sent unless the state is
    /// [`ConnectionState::Connected`], and the remaining peers are skipped
    /// once it no longer is.
    pub async fn send(&self, message: &Message, broadcast: bool) {
        let peers = {
            let inner = self.inner.lock().await;
            if inner.state != ConnectionState::Connected {
                debug!("Not connected, dropping {:?}", message.kind());
                return;
            }
            inner.peers.clone()
        };
        let player_count = peers.len() + 1;

        let shared_frame = match &message.body {
            MessageBody::StartGame { .. } => None,
            _ => match encode(message) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    error!("Failed to encode {:?}: {}", message.kind(), e);
                    return;
                }
            },
        };

        for (index, peer) in peers.iter().enumerate() {
            if self.state().await != ConnectionState::Connected {
                debug!("Connection state changed, dropping rest of {:?}", message.kind());
                break;
            }
            if peer.is_closed() || (!broadcast && peer.address() == &message.origin) {
                continue;
            }
            let frame = match &shared_frame {
                Some(frame) => frame.clone(),
                None => match encode(&personalize(message, index, player_count)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to encode start for {}: {}", peer.address(), e);
                        continue;
                    }
                },
            };
            trace!("Sending {} bytes to {}", frame.len(), peer.address());
            if let Err(e) = peer.write(&frame).await {
                warn!("Write to {} failed: {}", peer.address(), e);
                let _ = self.lost_tx.send(peer.address().clone());
            }
        }
    }

    /// Host side of starting a game: closes the lobby, tells every peer its
    /// player number and starts the local game. Returns the player count.
    pub async fn start_game(self: &Arc<Self>) -> u32 {
        self.stop_accepting().await;
        let player_count = self.inner.lock().await.peers.len() as u32 + 1;
        self.send(&Message::start_game(self.local.address.clone(), 0, 0), true)
            .await;
        self.game.init_new_game(true, 0, player_count).await;
        info!("Started a game for {} players", player_count);
        player_count
    }

    /// Looks for nearby peers until the discovery source runs dry.
    pub async fn start_discovery(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        inner.cancel_discovery();
        inner.discovered.clear();
        self.set_state(&mut inner, ConnectionState::Discovering);

        let (found_tx, mut found_rx) = mpsc::unbounded_channel();
        let search = self.discovery.start(found_tx);
        let coordinator = Arc::downgrade(self);
        inner.discovery_task = Some(tokio::spawn(async move {
            while let Some(peer) = found_rx.recv().await {
                match coordinator.upgrade() {
                    Some(coordinator) => coordinator.peer_found(peer).await,
                    None => break,
                }
            }
            search.abort();
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.discovery_finished().await;
            }
        }));
    }

    pub async fn cancel_discovery(&self) {
        let mut inner = self.inner.lock().await;
        inner.cancel_discovery();
        if inner.state == ConnectionState::Discovering {
            self.set_state(&mut inner, ConnectionState::None);
        }
    }

    async fn peer_found(&self, peer: PeerInfo) {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Discovering || inner.discovered.contains(&peer) {
            return;
        }
        debug!("Discovered {} ({})", peer.name, peer.address);
        inner.discovered.push(peer.clone());
        let _ = self.ui.send(UiEvent::PeerDiscovered(peer));
    }

    async fn discovery_finished(&self) {
        let mut inner = self.inner.lock().await;
        inner.discovery_task = None;
        if inner.state == ConnectionState::Discovering {
            self.set_state(&mut inner, ConnectionState::None);
        }
        let _ = self.ui.send(UiEvent::DiscoveryFinished);
    }

    /// A peer's stream failed: report it, resume the game and tear down every
    /// connection.
    async fn connection_lost(&self, address: PeerAddress) {
        let info = {
            let mut inner = self.inner.lock().await;
            let Some(peer) = inner.peers.iter().find(|p| p.address() == &address) else {
                debug!("Ignoring loss of unknown peer {}", address);
                return;
            };
            let info = peer.info().clone();
            inner.discovered.retain(|known| known.address != address);
            info
        };
        warn!("Connection to {} was lost", address);

        self.game.unpause_silently().await;
        self.dispatcher.pause().reset();
        let _ = self.ui.send(UiEvent::PeerLost(info));
        let _ = self.ui.send(UiEvent::Toast("Connection was lost".to_string()));
        self.stop_all().await;
    }

    /// Turns a game event into the message the other peers need.
    async fn publish(&self, event: GameEvent) {
        let me = self.local.address.clone();
        match event {
            GameEvent::ShapeChanged(shape) => self.send(&Message::shape(me, shape), false).await,
            GameEvent::WallChanged { docked_by, wall } => {
                self.send(&Message::wall(docked_by, wall), true).await
            }
            GameEvent::ScoreChanged(points) => {
                self.send(&Message::points(me, points), true).await
            }
            GameEvent::GameOver => self.send(&Message::game_over(me), true).await,
            GameEvent::PauseChanged(true) => {
                if self.game.is_host() {
                    self.dispatcher.pause().request();
                }
                self.send(&Message::pause(me), false).await
            }
            GameEvent::PauseChanged(false) => {
                if self.game.is_host() {
                    self.dispatcher.pause().release();
                }
                self.send(&Message::resume(me), false).await
            }
        }
    }
}

/// Copy of `message` addressed to the peer at `index`. Only `StartGame`
/// changes: peers are numbered from 1, the host being player 0.
pub fn personalize(message: &Message, index: usize, player_count: usize) -> Message {
    match message.body {
        MessageBody::StartGame { .. } => Message::start_game(
            message.origin.clone(),
            index as u32 + 1,
            player_count as u32,
        ),
        _ => message.clone(),
    }
}

/// Accepts streams until the listener fails. Each hello runs on its own task
/// so a silent peer cannot hold up the others; dropping the loop aborts the
/// hellos still in flight.
async fn accept_loop(
    coordinator: Weak<Coordinator>,
    listener: tokio::net::TcpListener,
    local: PeerInfo,
) {
    let mut greetings = JoinSet::new();
    loop {
        tokio::select! {
            incoming = transport::accept(&listener) => {
                let (stream, addr) = match incoming {
                    Ok(incoming) => incoming,
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        break;
                    }
                };
                let local = local.clone();
                greetings.spawn(async move { (addr, transport::greet(stream, &local).await) });
            }
            Some(done) = greetings.join_next(), if !greetings.is_empty() => {
                let Ok((addr, greeted)) = done else {
                    continue;
                };
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                match greeted {
                    Ok((stream, remote)) => coordinator.accepted(stream, remote).await,
                    Err(e) => warn!("Rejected incoming connection from {}: {}", addr, e),
                }
            }
        }
    }
}

/// The dispatch worker: decodes frames in arrival order, applies them and
/// relays what the host has to forward.
async fn run_pipeline(
    coordinator: Weak<Coordinator>,
    mut inbound: mpsc::UnboundedReceiver<InboundFrame>,
) {
    while let Some(frame) = inbound.recv().await {
        let Some(coordinator) = coordinator.upgrade() else {
            break;
        };
        let decoded = decode_payload(&frame.payload);
        coordinator.pool.recycle(frame.payload);

        match decoded {
            Ok(message) => {
                if let Some(relay) = coordinator.dispatcher.process(message).await {
                    coordinator.send(&relay, false).await;
                }
            }
            Err(WireError::UnknownKind(kind)) => {
                warn!("Dropping message of unknown kind {} from {}", kind, frame.from);
            }
            Err(e) => {
                warn!("Bad frame from {}: {}", frame.from, e);
                let _ = coordinator.lost_tx.send(frame.from);
            }
        }
    }
    debug!("Dispatch worker stopped");
}

async fn supervise(
    coordinator: Weak<Coordinator>,
    mut lost: mpsc::UnboundedReceiver<PeerAddress>,
) {
    while let Some(address) = lost.recv().await {
        match coordinator.upgrade() {
            Some(coordinator) => coordinator.connection_lost(address).await,
            None => break,
        }
    }
}

async fn bridge(coordinator: Weak<Coordinator>, mut events: mpsc::UnboundedReceiver<GameEvent>) {
    while let Some(event) = events.recv().await {
        match coordinator.upgrade() {
            Some(coordinator) => coordinator.publish(event).await,
            None => break,
        }
    }
}
