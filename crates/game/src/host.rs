use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::level::{Level, LevelError};
use crate::net::connection::Connection;
use crate::net::discovery::DiscoveryBeacon;
use crate::net::protocol::{
    DEFAULT_PORT, MAX_PACKET_SIZE, Message, PLAYER_STATS_FREQUENCY, SERVER_UPDATE_FREQUENCY,
};
use crate::player::LeaveReason;
use crate::session::{Client, ClientState, GameSession};

/// Endpoints the listener will track at once, including ones that have not
/// finished their handshake.
const MAX_TRACKED_ENDPOINTS: usize = 32;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: io::Error,
    },
    #[error("level rejected: {0}")]
    Level(#[from] LevelError),
    #[error("the server is already running")]
    AlreadyRunning,
    #[error("failed to spawn the server thread: {0}")]
    Spawn(io::Error),
    #[error("the server thread panicked")]
    Panicked,
}

#[derive(Debug, Clone, Copy)]
pub enum HostCommand {
    AddBot,
    RemoveBot,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub tick_rate: u32,
    pub enable_discovery: bool,
    pub level: Option<Level>,
    pub initial_bots: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Skirmish Server".to_owned(),
            bind_addr: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            tick_rate: SERVER_UPDATE_FREQUENCY,
            enable_discovery: true,
            level: None,
            initial_bots: 0,
        }
    }
}

/// The listener, the client collection and the fixed-step loop. One tick
/// pumps the socket, dispatches per client, advances the session and flushes
/// every outgoing queue.
pub struct Server {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    session: GameSession,
    clients: Vec<Client>,
    discovery: Option<DiscoveryBeacon>,
    commands_tx: Sender<HostCommand>,
    commands_rx: Receiver<HostCommand>,
    recv_buf: Box<[u8; 2048]>,
    tick_duration: Duration,
    dt: f32,
    accumulator: Duration,
    last_tick_time: Instant,
    stats_elapsed: f32,
}

impl Server {
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let level = config.level.unwrap_or_else(Level::arena);
        if level.player_starts().is_empty() {
            return Err(ServerError::Level(LevelError::NoPlayerStarts));
        }

        let addr = SocketAddr::new(config.bind_addr, config.port);
        let socket = UdpSocket::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let mut session = GameSession::new(level);
        for _ in 0..config.initial_bots {
            session.add_bot();
        }
        // Nothing listens yet; joins land in snapshots.
        session.drain_broadcasts();

        let discovery = config
            .enable_discovery
            .then(|| DiscoveryBeacon::new(&config.name, local_addr.port()));

        let tick_rate = config.tick_rate.max(1);
        let (commands_tx, commands_rx) = channel();
        log::info!("server \"{}\" listening on {}", config.name, local_addr);

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            session,
            clients: Vec::new(),
            discovery,
            commands_tx,
            commands_rx,
            recv_buf: Box::new([0u8; 2048]),
            tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
            dt: 1.0 / tick_rate as f32,
            accumulator: Duration::ZERO,
            last_tick_time: Instant::now(),
            stats_elapsed: 0.0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn command_sender(&self) -> Sender<HostCommand> {
        self.commands_tx.clone()
    }

    /// Drive the fixed-step loop until cancelled, then shut down.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            self.tick_once();
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown();
    }

    /// Advance real time and run as many fixed ticks as it covers.
    pub fn tick_once(&mut self) {
        let now = Instant::now();
        self.accumulator += now - self.last_tick_time;
        self.last_tick_time = now;

        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            let dt = self.dt;
            self.tick(dt);
        }
    }

    /// One fixed tick: bot commands, discovery, socket pump, dropped-client
    /// sweep, per-client dispatch and respawn, the simulation step, stats,
    /// broadcast distribution and the flush.
    pub fn tick(&mut self, dt: f32) {
        self.drain_commands();

        if let Some(discovery) = self.discovery.as_mut() {
            discovery.send_discovery(dt);
        }

        self.pump_network();
        self.sweep_dropped();

        for client in &mut self.clients {
            client.dispatch(&mut self.session);
        }
        for client in &mut self.clients {
            client.update(&mut self.session, dt);
        }

        self.session.update(dt);

        self.stats_elapsed += dt;
        let stats_interval = 1.0 / PLAYER_STATS_FREQUENCY;
        if self.stats_elapsed >= stats_interval {
            self.stats_elapsed -= stats_interval;
            for client in &self.clients {
                if client.state() == ClientState::Synced {
                    if let Some(player) = client.player() {
                        self.session
                            .set_player_ping(player, client.connection().ping_ms());
                    }
                }
            }
            self.session.broadcast_player_stats();
        }

        let broadcasts = self.session.drain_broadcasts();
        if !broadcasts.is_empty() {
            for client in &mut self.clients {
                if client.is_broadcast_eligible() {
                    for message in &broadcasts {
                        client.connection_mut().enqueue(Arc::clone(message));
                    }
                }
            }
        }

        for client in &mut self.clients {
            client.connection_mut().flush();
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands_rx.try_recv() {
            match command {
                HostCommand::AddBot => {
                    self.session.add_bot();
                }
                HostCommand::RemoveBot => {
                    self.session.remove_bot();
                }
            }
        }
    }

    /// Read the listener dry, routing each datagram to its endpoint's
    /// connection and accepting unknown endpoints as fresh clients.
    fn pump_network(&mut self) {
        loop {
            match self.socket.recv_from(&mut self.recv_buf[..]) {
                Ok((size, addr)) => {
                    if size > MAX_PACKET_SIZE {
                        log::debug!("oversize datagram ({size} bytes) from {addr}");
                        continue;
                    }
                    let index = self
                        .clients
                        .iter()
                        .position(|c| c.connection().remote() == addr);
                    match index {
                        Some(index) => {
                            self.clients[index]
                                .connection_mut()
                                .receive_datagram(&self.recv_buf[..size]);
                        }
                        None => {
                            if self.clients.len() >= MAX_TRACKED_ENDPOINTS {
                                log::warn!("ignoring endpoint {addr}: connection table full");
                                continue;
                            }
                            log::info!("new endpoint {addr}");
                            let mut client =
                                Client::new(Connection::new(Arc::clone(&self.socket), addr));
                            client
                                .connection_mut()
                                .receive_datagram(&self.recv_buf[..size]);
                            self.clients.push(client);
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("listener receive failed: {e}");
                    break;
                }
            }
        }
    }

    /// Remove clients whose connection is gone and retire their players. The
    /// leave reason recorded during dispatch wins over the default.
    fn sweep_dropped(&mut self) {
        let mut index = 0;
        while index < self.clients.len() {
            if !self.clients[index].connection().is_dropped() {
                index += 1;
                continue;
            }
            let client = self.clients.swap_remove(index);
            log::info!("removing client {}", client.connection().remote());
            if let Some(player) = client.player() {
                let reason = match self.session.player(player).map(|p| p.leave_reason) {
                    Some(LeaveReason::Unknown) | None => LeaveReason::ConnectionDropped,
                    Some(reason) => reason,
                };
                self.session.remove_player(player, reason);
            }
        }
    }

    fn shutdown(&mut self) {
        log::info!("server shutting down");
        for client in &mut self.clients {
            client.connection_mut().enqueue(Arc::new(Message::Disconnect));
            client.connection_mut().flush();
        }
        self.clients.clear();
        self.session.dispose();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Owns the server thread: binds on start, cancels and joins on stop, and
/// forwards bot commands into the tick loop.
pub struct ServerHost {
    state: HostState,
    running: Arc<AtomicBool>,
    commands: Option<Sender<HostCommand>>,
    thread: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl ServerHost {
    pub fn new() -> Self {
        Self {
            state: HostState::Stopped,
            running: Arc::new(AtomicBool::new(false)),
            commands: None,
            thread: None,
            local_addr: None,
        }
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn start(&mut self, config: ServerConfig) -> Result<SocketAddr, ServerError> {
        if self.state != HostState::Stopped {
            return Err(ServerError::AlreadyRunning);
        }
        self.state = HostState::Starting;

        let mut server = match Server::bind(config) {
            Ok(server) => server,
            Err(e) => {
                self.state = HostState::Stopped;
                return Err(e);
            }
        };
        let addr = server.local_addr();
        let commands = server.command_sender();

        self.running = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&self.running);
        let thread = std::thread::Builder::new()
            .name("server".to_owned())
            .spawn(move || server.run(&running));
        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                self.state = HostState::Stopped;
                return Err(ServerError::Spawn(e));
            }
        };

        self.thread = Some(thread);
        self.commands = Some(commands);
        self.local_addr = Some(addr);
        self.state = HostState::Running;
        Ok(addr)
    }

    pub fn stop(&mut self) -> Result<(), ServerError> {
        if self.state != HostState::Running {
            return Ok(());
        }
        self.state = HostState::Stopping;
        self.running.store(false, Ordering::SeqCst);

        let result = match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ServerError::Panicked),
            None => Ok(()),
        };
        self.commands = None;
        self.local_addr = None;
        self.state = HostState::Stopped;
        result
    }

    /// Surface a server-thread fault without blocking.
    pub fn check_for_errors(&mut self) -> Result<(), ServerError> {
        if self.state == HostState::Running
            && self.thread.as_ref().is_some_and(|t| t.is_finished())
        {
            let thread = self.thread.take().expect("checked above");
            self.commands = None;
            self.local_addr = None;
            self.state = HostState::Stopped;
            return thread.join().map_err(|_| ServerError::Panicked);
        }
        Ok(())
    }

    pub fn add_bot(&self) {
        if let Some(commands) = &self.commands {
            let _ = commands.send(HostCommand::AddBot);
        }
    }

    pub fn remove_bot(&self) {
        if let Some(commands) = &self.commands {
            let _ = commands.send(HostCommand::RemoveBot);
        }
    }
}

impl Default for ServerHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ServerHost {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
