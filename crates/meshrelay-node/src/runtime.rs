//! The production event loop: one task, `tokio::select!`, no shared-state
//! locking.
//!
//! Every peer connection the reference node juggles independently here
//! shares a single task, so there is never a `connections: Arc<Mutex<_>>`
//! to contend on — the [`MeshEngine`] and [`PeerTable`] are owned outright
//! by this loop and only ever touched from here. The one piece of state
//! that must still be reachable from *outside* this task's exclusive
//! borrow is the socket itself: each accepted connection's [`TcpStream`] is
//! wrapped in an `Arc` so a read-readiness future can be built fresh each
//! iteration (via `Arc::clone`) without holding a borrow of [`PeerTable`]
//! across the `.await` inside `tokio::select!` — the other arms of that
//! same `select!` (accepting a new peer, handling a line of stdin) need a
//! `&mut` borrow of the table at the same time, and `tokio::select!` does
//! not drop a non-winning branch's future until the winning arm's body has
//! finished running.

#![allow(clippy::print_stdout, clippy::print_stderr, reason = "this module is the node's interactive console")]

use std::io::{self, IsTerminal as _, Write as _};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt as _;
use meshrelay_core::{Environment, KeyStore, MeshAction, MeshConfig, MeshEngine, MeshStats, PeerTable};
use meshrelay_crypto::{derive_mesh_key, Identity, NONCE_LEN};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::error::NodeError;
use crate::transport::{send_packet, PeerReadBuffer};

/// Fixed service identifier every node hashes to derive the shared mesh
/// broadcast key. Not a secret — just the namespace this mesh relay's
/// traffic lives in, analogous to a protocol version string.
const SERVICE_ID: &str = "f47ac10b-58cc-4372-a567-0e02b2c3d479:meshrelay/v1";

const PRUNE_INTERVAL: Duration = Duration::from_secs(10);
const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Runtime configuration for one node, assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address to bind the TCP listener to (`host:port`).
    pub listen_addr: String,
    /// Addresses of peers to dial at startup.
    pub connect_peers: Vec<String>,
    /// Display name; falls back to a hex prefix of the node's public key.
    pub name: Option<String>,
    /// TTL stamped on locally-originated packets.
    pub ttl: u8,
    /// Whether this node relays packets it did not originate.
    pub relay_enabled: bool,
    /// Whether to print a stats line on [`STATS_INTERVAL`].
    pub print_stats: bool,
}

struct Peer {
    stream: Arc<TcpStream>,
    read_buf: PeerReadBuffer,
}

/// Run a node until it is asked to shut down (ctrl-c, SIGTERM, or `/quit`).
///
/// # Errors
///
/// Returns [`NodeError::Config`] if `config.listen_addr` cannot be bound, or
/// [`NodeError::Transport`] if the listener itself fails irrecoverably.
pub async fn run<E: Environment>(env: E, key_store: &dyn KeyStore, config: NodeConfig) -> Result<(), NodeError> {
    let identity = load_or_create_identity(&env, key_store);
    let name = config.name.clone().unwrap_or_else(|| default_name(&identity));

    let mesh_config = MeshConfig { default_ttl: config.ttl, relay_enabled: config.relay_enabled, ..MeshConfig::default() };
    let mut engine = MeshEngine::new(derive_mesh_key(SERVICE_ID), mesh_config);
    let mut peers: PeerTable<Peer> = PeerTable::new();

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|err| NodeError::Config(format!("failed to bind {}: {err}", config.listen_addr)))?;

    if io::stdout().is_terminal() {
        print_banner();
    }
    println!("[meshrelay] node {name} ready on {}", config.listen_addr);
    println!(
        "[meshrelay] relay: {} | peers to dial: {}",
        if config.relay_enabled { "ON" } else { "OFF" },
        config.connect_peers.len()
    );
    println!("[meshrelay] type a message and press Enter to broadcast.");
    println!("[meshrelay] commands: /peers /stats /quit\n");
    prompt();

    for addr in &config.connect_peers {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                let now = env.wall_clock_secs();
                if peers.insert(Peer { stream: Arc::new(stream), read_buf: PeerReadBuffer::new() }, addr.clone(), now).is_none() {
                    tracing::warn!("peer table full, dropping connection to {addr}");
                }
            },
            Err(err) => tracing::warn!("failed to connect to peer {addr}: {err}"),
        }
    }

    let mut prune_tick = tokio::time::interval(PRUNE_INTERVAL);
    let mut stats_tick = tokio::time::interval(STATS_INTERVAL);
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|err| NodeError::Config(format!("failed to install SIGTERM handler: {err}")))?;

    loop {
        let readiness = peers
            .iter()
            .map(|(index, slot)| {
                let stream = Arc::clone(&slot.handle.stream);
                async move {
                    stream.readable().await.ok();
                    index
                }
            })
            .collect::<FuturesUnordered<_>>();
        tokio::pin!(readiness);

        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                println!("\n[meshrelay] shutting down...");
                break;
            }

            _ = sigterm.recv() => {
                println!("\n[meshrelay] received SIGTERM, shutting down...");
                break;
            }

            line = stdin_lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_stdin_line(&line, &env, &mut engine, &mut peers, &name).await {
                            break;
                        }
                    },
                    Ok(None) | Err(_) => break,
                }
            }

            accepted = listener.accept() => {
                if let Ok((stream, addr)) = accepted {
                    accept_peer(stream, addr.to_string(), &env, &mut peers);
                }
            }

            Some(index) = readiness.next() => {
                handle_peer_readable(index, &env, &mut engine, &mut peers).await;
            }

            _ = prune_tick.tick() => {
                engine.prune_seen(env.wall_clock_secs());
            }

            _ = stats_tick.tick(), if config.print_stats => {
                print_stats(&name, engine.stats(), peers.active_count());
            }
        }
    }

    Ok(())
}

fn load_or_create_identity<E: Environment>(env: &E, key_store: &dyn KeyStore) -> Identity {
    if let Some((signing_seed, box_seed)) = key_store.load() {
        return Identity::from_parts(signing_seed, box_seed);
    }

    let mut seed = [0u8; 64];
    env.random_bytes(&mut seed);
    let identity = Identity::from_seed(seed);
    key_store.save(identity.signing_seed(), identity.box_seed());
    identity
}

fn default_name(identity: &Identity) -> String {
    let key = identity.verifying_key_bytes();
    key[..4].iter().map(|b| format!("{b:02x}")).collect()
}

fn accept_peer<E: Environment>(stream: TcpStream, addr: String, env: &E, peers: &mut PeerTable<Peer>) {
    if !peers.has_capacity() {
        tracing::warn!("peer table full, rejecting connection from {addr}");
        return;
    }
    let now = env.wall_clock_secs();
    let peer = Peer { stream: Arc::new(stream), read_buf: PeerReadBuffer::new() };
    peers.insert(peer, addr.clone(), now);
    tracing::info!("accepted connection from {addr}");
}

async fn handle_peer_readable<E: Environment>(index: usize, env: &E, engine: &mut MeshEngine, peers: &mut PeerTable<Peer>) {
    let Some(slot) = peers.get_mut(index) else { return };
    let stream = Arc::clone(&slot.handle.stream);
    let frames = slot.handle.read_buf.try_poll(&stream);

    match frames {
        Ok(frames) => {
            // A single readiness wakeup can hand back several coalesced
            // frames (a peer relaying a burst of packets back to back);
            // every one of them must be processed now, not just the first,
            // or the rest sit buffered until unrelated traffic arrives.
            if !frames.is_empty() {
                peers.touch(index, env.wall_clock_secs());
            }
            for raw in frames {
                let actions = engine.receive(&raw, index, env.wall_clock_secs());
                execute_actions(actions, peers).await;
            }
        },
        Err(err) => {
            let peer_name = peers.get(index).map_or("?", |s| s.name.as_str()).to_string();
            tracing::warn!("peer {peer_name} disconnected: {err}");
            peers.remove(index);
        },
    }
}

/// Handle one line of stdin input. Returns `false` if the node should shut
/// down (`/quit` or `/q`), `true` otherwise.
async fn handle_stdin_line<E: Environment>(line: &str, env: &E, engine: &mut MeshEngine, peers: &mut PeerTable<Peer>, name: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        prompt();
        return true;
    }

    match line {
        "/quit" | "/q" => {
            println!("[meshrelay] goodbye, {name}.");
            return false;
        },
        "/peers" => {
            print_peers(peers, env.wall_clock_secs());
            prompt();
        },
        "/stats" => {
            print_stats(name, engine.stats(), peers.active_count());
            prompt();
        },
        message => {
            let mut nonce = [0u8; NONCE_LEN];
            env.random_bytes(&mut nonce);
            let mut random_id = [0u8; 8];
            env.random_bytes(&mut random_id);

            match engine.send(message.as_bytes(), env.wall_clock_secs(), nonce, random_id) {
                Ok(actions) => execute_actions(actions, peers).await,
                Err(err) => eprintln!("[meshrelay] message rejected: {err}"),
            }
            prompt();
        },
    }
    true
}

async fn execute_actions(actions: Vec<MeshAction>, peers: &mut PeerTable<Peer>) {
    for action in actions {
        match action {
            MeshAction::Broadcast { wire, except } => {
                broadcast(&wire, except, peers).await;
            },
            MeshAction::Deliver { plaintext, hops } => {
                let text = String::from_utf8_lossy(&plaintext);
                println!("\n[mesh] {text} ({hops} hop{})", if hops == 1 { "" } else { "s" });
                prompt();
            },
            MeshAction::Log { level, message } => log_action(level, &message),
        }
    }
}

async fn broadcast(wire: &[u8], except: Option<usize>, peers: &mut PeerTable<Peer>) {
    let mut dead = Vec::new();
    for (index, slot) in peers.iter() {
        if Some(index) == except {
            continue;
        }
        if let Err(err) = send_packet(&slot.handle.stream, wire).await {
            tracing::warn!("failed to write to peer {}: {err}", slot.name);
            dead.push(index);
        }
    }
    for index in dead {
        peers.remove(index);
    }
}

fn log_action(level: meshrelay_core::mesh::LogLevel, message: &str) {
    use meshrelay_core::mesh::LogLevel;
    match level {
        LogLevel::Debug => tracing::debug!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Warn => tracing::warn!("{message}"),
    }
}

fn print_peers(peers: &PeerTable<Peer>, now: u64) {
    println!("\n[peers]");
    let mut count = 0;
    for (_, slot) in peers.iter() {
        let ago = now.saturating_sub(slot.last_seen);
        println!("  {} (last seen {ago}s ago)", slot.name);
        count += 1;
    }
    if count == 0 {
        println!("  (no peers connected)");
    }
    println!();
}

fn print_stats(name: &str, stats: MeshStats, active_peers: usize) {
    println!("\n[stats] node: {name}");
    println!(
        "[stats] sent: {} | received: {} | relayed: {} | dropped: {}",
        stats.packets_sent, stats.packets_received, stats.packets_relayed, stats.packets_dropped
    );
    println!("[stats] peers: {active_peers} active\n");
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

fn print_banner() {
    println!(
        "\n  ╦  ╦┌─┐─┐ ┬╔═╗┌─┐┌┐┌┌┐┌┌─┐┌─┐┌┬┐\n  ╚╗╔╝├┤ ┌┴┬┘║  │ │││││││├┤ │   │ \n   ╚╝ └─┘┴ └─╚═╝└─┘┘└┘┘└┘└─┘└─┘ ┴ \n  Free mesh. No tower. No ISP. No permission.\n"
    );
}

#[cfg(test)]
mod tests {
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    async fn loopback_peer() -> (Peer, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let (accepted, connected) = tokio::join!(listener.accept(), TcpStream::connect(addr));
        let (stream, _) = accepted.expect("accept");
        let other_end = connected.expect("connect");
        (Peer { stream: Arc::new(stream), read_buf: PeerReadBuffer::new() }, other_end)
    }

    /// S6 — a peer killed mid-session fails its next write; `broadcast` must
    /// invalidate that slot and continue delivering to every peer that is
    /// still healthy, rather than aborting the whole fan-out.
    #[tokio::test]
    async fn broadcast_drops_a_dead_peer_and_still_reaches_the_healthy_one() {
        let mut peers: PeerTable<Peer> = PeerTable::new();

        let (dead_peer, dead_other_end) = loopback_peer().await;
        let (healthy_peer, healthy_other_end) = loopback_peer().await;

        let dead_index = peers.insert(dead_peer, "dead".to_string(), 0).expect("room for a peer");
        let healthy_index = peers.insert(healthy_peer, "healthy".to_string(), 0).expect("room for a peer");

        // Close the far end so the next write to `dead_peer`'s socket fails.
        // A fully-dropped (not just shutdown-for-write) peer socket answers
        // further data with a reset, not a silent half-close, so the next
        // write on a loopback pair observes the failure promptly.
        drop(dead_other_end);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let wire = vec![0xABu8; 16];
        broadcast(&wire, None, &mut peers).await;

        assert!(peers.get(dead_index).is_none(), "the peer whose write failed must be removed");
        assert!(peers.get(healthy_index).is_some(), "a healthy peer must survive a sibling's failure");

        let mut read_buf = PeerReadBuffer::new();
        let received = loop {
            healthy_other_end.readable().await.expect("data is waiting");
            let frames = read_buf.try_poll(&healthy_other_end).expect("well-formed frame");
            if let Some(frame) = frames.into_iter().next() {
                break frame;
            }
        };
        assert_eq!(received, wire, "the healthy peer must still receive the broadcast");
    }
}
