//! Integration tests for networked multiplayer components
//!
//! These tests run real peers against each other over loopback TCP and check
//! what each of them ends up seeing.

use peer::{ConnectionState, Coordinator, GameService, PeerConfig, PeerInfo, StaticDiscovery, UiEvent};
use shared::codec::{decode, encode, encode_payload, frame_bytes};
use shared::{Message, MessageBody, PeerAddress, Shape, ShapeType, WireError, COLS, ROWS};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

struct Node {
    coordinator: Arc<Coordinator>,
    game: Arc<GameService>,
    ui: mpsc::UnboundedReceiver<UiEvent>,
}

fn node(id: &str, is_host: bool) -> Node {
    let mut config = PeerConfig::local("127.0.0.1:0", id);
    config.local = PeerInfo::new(id, id);
    let (ui_tx, ui) = mpsc::unbounded_channel();
    let (game, events) = GameService::new(config.local.address.clone(), 40, Some(11), ui_tx.clone());
    game.set_host(is_host);
    let coordinator = Coordinator::new(
        &config,
        Arc::clone(&game),
        events,
        Arc::new(StaticDiscovery::default()),
        ui_tx,
    );
    Node {
        coordinator,
        game,
        ui,
    }
}

async fn wait_for(
    ui: &mut mpsc::UnboundedReceiver<UiEvent>,
    wanted: impl Fn(&UiEvent) -> bool,
) -> UiEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            match ui.recv().await {
                Some(event) if wanted(&event) => return event,
                Some(_) => continue,
                None => panic!("ui channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for ui event")
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let reached = timeout(Duration::from_secs(5), async {
        while !check().await {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {}", what);
}

/// Starts a host, lets every client join and starts a game for all of them.
async fn start_session(clients: &[&str]) -> (Node, Vec<Node>) {
    let mut host = node("host", true);
    let addr = host.coordinator.start_hosting().await.unwrap();

    let mut joined = Vec::new();
    for id in clients {
        let mut client = node(id, false);
        client
            .coordinator
            .connect_to(PeerAddress::from(addr.to_string()))
            .await;
        wait_for(&mut client.ui, |e| matches!(e, UiEvent::ServerConnected(_))).await;
        wait_for(&mut host.ui, |e| matches!(e, UiEvent::PeerDiscovered(_))).await;
        joined.push(client);
    }

    let player_count = host.coordinator.start_game().await;
    assert_eq!(player_count, clients.len() as u32 + 1);
    for client in &mut joined {
        let start = wait_for(&mut client.ui, |e| matches!(e, UiEvent::StartGame { .. })).await;
        let UiEvent::StartGame {
            player_number,
            player_count,
        } = start
        else {
            unreachable!()
        };
        client
            .game
            .init_new_game(true, player_number, player_count)
            .await;
    }
    (host, joined)
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// Tests that clients are numbered in the order they joined
    #[tokio::test]
    async fn test_clients_get_their_player_numbers() {
        let (host, clients) = start_session(&["alice", "bob"]).await;

        let host_view = host.game.view().await.unwrap();
        assert_eq!(host_view.player_number, 0);
        assert_eq!(host_view.player_count, 3);
        for (index, client) in clients.iter().enumerate() {
            let view = client.game.view().await.unwrap();
            assert_eq!(view.player_number, index as u32 + 1);
            assert_eq!(view.player_count, 3);
            assert_eq!(client.coordinator.state().await, ConnectionState::Connected);
        }
        assert_eq!(host.coordinator.listen_addr().await, None);
    }

    /// Tests that a client losing the host goes back to idle
    #[tokio::test]
    async fn test_client_sees_host_leave() {
        let (host, mut clients) = start_session(&["alice"]).await;
        let mut client = clients.remove(0);

        host.coordinator.stop_all().await;
        let lost = wait_for(&mut client.ui, |e| matches!(e, UiEvent::PeerLost(_))).await;
        assert_eq!(lost, UiEvent::PeerLost(PeerInfo::new("host", "host")));
        wait_for(&mut client.ui, |e| *e == UiEvent::Toast("Connection was lost".into())).await;
        wait_for(&mut client.ui, |e| {
            *e == UiEvent::StateChanged(ConnectionState::None)
        })
        .await;
        assert!(client.coordinator.peers().await.is_empty());
    }
}

/// REPLICATION TESTS
mod replication_tests {
    use super::*;

    /// Tests that rows cleared by the host show up on the client with the
    /// same wall and score
    #[tokio::test]
    async fn test_cleared_rows_replicate_to_client() {
        let (host, mut clients) = start_session(&["alice"]).await;
        let client = clients.remove(0);

        host.game
            .with_state(|game| {
                for row in [ROWS - 2, ROWS - 1] {
                    for col in 1..COLS {
                        game.wall_mut().set_cell(col, row, ShapeType::L.id());
                    }
                }
                let mut bar = Shape::new(ShapeType::I, 0, ROWS as i32 - 4);
                bar.rotate();
                game.place_my_shape(bar);
            })
            .await
            .unwrap();
        host.game.tick().await;

        let host_view = host.game.view().await.unwrap();
        assert_eq!(host_view.points, 10);
        assert_eq!(host_view.rows, 2);
        assert!(host_view.wall.is_occupied(0, ROWS - 1));
        assert!(host_view.wall.is_occupied(0, ROWS - 2));
        assert!(!host_view.wall.is_occupied(1, ROWS - 1));
        let expected = host_view.wall.snapshot();

        let game = Arc::clone(&client.game);
        eventually("client to mirror the host wall", || {
            let game = Arc::clone(&game);
            let expected = expected.clone();
            async move {
                game.tick().await;
                let view = game.view().await.unwrap();
                view.wall.snapshot() == expected && view.points == 10
            }
        })
        .await;
    }

    /// Tests that the host learns where each client's shape is
    #[tokio::test]
    async fn test_host_tracks_client_shapes() {
        let (host, clients) = start_session(&["alice", "bob"]).await;

        let game = Arc::clone(&host.game);
        eventually("host to see both client shapes", || {
            let game = Arc::clone(&game);
            async move {
                game.tick().await;
                game.view().await.unwrap().other_shapes.len() == 2
            }
        })
        .await;

        let view = host.game.view().await.unwrap();
        let ids: Vec<&str> = view.other_shapes.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);
        for client in &clients {
            let spawned = client.game.view().await.unwrap().my_shape;
            assert!(spawned.x >= 0 && spawned.x < COLS as i32);
        }
    }
}

/// PAUSE CONSENSUS TESTS
mod pause_tests {
    use super::*;

    /// Tests that a player pausing an already paused game is not counted
    #[tokio::test]
    async fn test_pause_while_paused_is_not_counted() {
        let (host, clients) = start_session(&["alice", "bob"]).await;
        let (alice, bob) = (&clients[0], &clients[1]);

        alice.game.set_paused(true).await;
        paused_until(&bob.game, "bob to follow alice's pause", true).await;
        bob.game.set_paused(true).await;
        host.game.set_paused(true).await;
        pending_until(&host.coordinator, "alice's pause", 1).await;

        alice.game.set_paused(false).await;
        paused_until(&host.game, "host to resume", false).await;
        paused_until(&bob.game, "bob to follow the resume", false).await;
        assert_eq!(host.coordinator.dispatcher().pause().pending(), 0);
    }

    /// Tests that the game only resumes once every pausing player resumed
    async fn pending_until(host: &Arc<Coordinator>, what: &str, wanted: u32) {
        let host = Arc::clone(host);
        eventually(what, move || {
            let pending = host.dispatcher().pause().pending();
            async move { pending == wanted }
        })
        .await;
    }

    async fn paused_until(game: &Arc<GameService>, what: &str, wanted: bool) {
        let game = Arc::clone(game);
        eventually(what, move || {
            let game = Arc::clone(&game);
            async move { game.is_paused().await == wanted }
        })
        .await;
    }

    #[tokio::test]
    async fn test_resume_waits_for_every_pause() {
        let (host, clients) = start_session(&["alice", "bob"]).await;
        let (alice, bob) = (&clients[0], &clients[1]);

        tokio::join!(alice.game.set_paused(true), bob.game.set_paused(true));
        pending_until(&host.coordinator, "two pause requests", 2).await;
        assert!(host.game.is_paused().await);

        alice.game.set_paused(false).await;
        pending_until(&host.coordinator, "alice's resume to arrive", 1).await;
        assert!(host.game.is_paused().await);
        assert!(bob.game.is_paused().await);

        bob.game.set_paused(false).await;
        paused_until(&host.game, "host to resume", false).await;
        assert_eq!(host.coordinator.dispatcher().pause().pending(), 0);
        assert!(!alice.game.is_paused().await);
    }
}

/// WIRE FORMAT TESTS
mod wire_tests {
    use super::*;

    /// Tests that a full wall survives a frame round trip
    #[test]
    fn test_wall_frame_roundtrip() {
        let mut wall = shared::Wall::new();
        wall.set_cell(3, ROWS - 1, ShapeType::T.id());
        let message = Message::wall(PeerAddress::from("host"), wall.snapshot());

        let frame = encode(&message).unwrap();
        assert_eq!(
            u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize,
            frame.len() - 4
        );
        assert_eq!(decode(&frame).unwrap(), message);
    }

    /// Tests rejection of frames that are cut short
    #[test]
    fn test_short_frames_are_malformed() {
        assert!(matches!(decode(&[0, 0, 0]), Err(WireError::MalformedFrame(_))));

        let frame = encode(&Message::points(PeerAddress::from("host"), 7)).unwrap();
        let truncated = &frame[..frame.len() - 1];
        assert!(matches!(decode(truncated), Err(WireError::MalformedFrame(_))));
    }

    /// Tests that an unknown message kind is told apart from garbage
    #[test]
    fn test_unknown_kind_is_reported() {
        let mut payload = encode_payload(&Message::resume(PeerAddress::from("a"))).unwrap();
        let at = payload.len() - 4;
        payload[at..].copy_from_slice(&42u32.to_le_bytes());

        assert!(matches!(
            decode(&frame_bytes(&payload)),
            Err(WireError::UnknownKind(42))
        ));
        assert_eq!(
            decode(&encode(&Message::resume(PeerAddress::from("a"))).unwrap())
                .unwrap()
                .body,
            MessageBody::ResumeGame
        );
    }
}
