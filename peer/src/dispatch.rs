//! Routing of decoded messages and the host's relay decision.

use crate::events::UiEvent;
use crate::service::GameService;
use log::{debug, trace};
use shared::{Message, MessageBody};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Count of outstanding pause requests seen by the host.
///
/// Every pause, local or remote, adds one and every resume takes one away;
/// the game only resumes for everyone once the count is back at zero.
#[derive(Debug, Default)]
pub struct PauseConsensus {
    pending: AtomicU32,
}

impl PauseConsensus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Withdraws one request. Returns whether none are left.
    pub fn release(&self) -> bool {
        let previous = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        previous <= 1
    }

    pub fn reset(&self) {
        self.pending.store(0, Ordering::Release);
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }
}

/// Applies incoming messages to the local game and decides what the host
/// forwards.
pub struct Dispatcher {
    game: Arc<GameService>,
    ui: mpsc::UnboundedSender<UiEvent>,
    pause: PauseConsensus,
}

impl Dispatcher {
    pub fn new(game: Arc<GameService>, ui: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self {
            game,
            ui,
            pause: PauseConsensus::new(),
        }
    }

    pub fn pause(&self) -> &PauseConsensus {
        &self.pause
    }

    /// Handles one message and returns it back if it has to be relayed to
    /// the other peers.
    pub async fn process(&self, message: Message) -> Option<Message> {
        let is_host = self.game.is_host();
        trace!("Dispatching {:?} from {}", message.kind(), message.origin);

        match &message.body {
            MessageBody::PauseGame => {
                if is_host {
                    self.pause.request();
                }
                self.game.handle_incoming_pause().await;
            }
            MessageBody::ResumeGame => {
                if is_host && !self.pause.release() {
                    debug!(
                        "Resume from {} leaves {} pause requests",
                        message.origin,
                        self.pause.pending()
                    );
                    return None;
                }
                self.game.handle_incoming_resume().await;
            }
            MessageBody::StartGame {
                player_number,
                player_count,
            } => {
                let _ = self.ui.send(UiEvent::StartGame {
                    player_number: *player_number,
                    player_count: *player_count,
                });
            }
            _ => self.game.deliver(message.clone()),
        }

        (is_host && &message.origin != self.game.id()).then_some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::GameEvent;
    use shared::{PeerAddress, Shape, ShapeType};

    fn dispatcher(is_host: bool) -> (
        Dispatcher,
        Arc<GameService>,
        mpsc::UnboundedReceiver<UiEvent>,
        mpsc::UnboundedReceiver<GameEvent>,
    ) {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (game, events) =
            GameService::new(PeerAddress::from("host"), 40, Some(1), ui_tx.clone());
        game.set_host(is_host);
        (Dispatcher::new(Arc::clone(&game), ui_tx), game, ui_rx, events)
    }

    #[test]
    fn test_pause_consensus_counts() {
        let pause = PauseConsensus::new();
        pause.request();
        pause.request();
        assert_eq!(pause.pending(), 2);
        assert!(!pause.release());
        assert!(pause.release());
        assert!(pause.release());
        assert_eq!(pause.pending(), 0);
        pause.request();
        pause.reset();
        assert_eq!(pause.pending(), 0);
    }

    #[tokio::test]
    async fn test_host_needs_as_many_resumes_as_pauses() {
        let (dispatcher, game, mut ui, _events) = dispatcher(true);
        game.init_new_game(true, 0, 3).await;
        let alice = PeerAddress::from("alice");
        let bob = PeerAddress::from("bob");

        assert!(dispatcher.process(Message::pause(alice.clone())).await.is_some());
        assert!(dispatcher.process(Message::pause(bob.clone())).await.is_some());
        assert!(game.is_paused().await);

        assert!(dispatcher.process(Message::resume(alice)).await.is_none());
        assert!(game.is_paused().await);

        let relayed = dispatcher.process(Message::resume(bob.clone())).await;
        assert_eq!(relayed, Some(Message::resume(bob)));
        assert!(!game.is_paused().await);

        let mut seen = Vec::new();
        while let Ok(event) = ui.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                UiEvent::PauseRequested,
                UiEvent::PauseRequested,
                UiEvent::ResumeRequested
            ]
        );
    }

    #[tokio::test]
    async fn test_client_resumes_immediately_and_never_relays() {
        let (dispatcher, game, _ui, _events) = dispatcher(false);
        game.init_new_game(true, 1, 2).await;
        let host = PeerAddress::from("other-host");

        assert!(dispatcher.process(Message::pause(host.clone())).await.is_none());
        assert!(game.is_paused().await);
        assert!(dispatcher.process(Message::resume(host.clone())).await.is_none());
        assert!(!game.is_paused().await);
        assert!(dispatcher
            .process(Message::points(host, 10))
            .await
            .is_none());
        assert_eq!(dispatcher.pause().pending(), 0);
    }

    #[tokio::test]
    async fn test_host_relays_shapes_from_others() {
        let (dispatcher, game, _ui, _events) = dispatcher(true);
        game.init_new_game(true, 0, 2).await;
        let client = PeerAddress::from("client");
        let message = Message::shape(client.clone(), Shape::new(ShapeType::S, 5, 2).snapshot());

        assert_eq!(dispatcher.process(message.clone()).await, Some(message));
        game.tick().await;
        let view = game.view().await.unwrap();
        assert_eq!(view.other_shapes.len(), 1);
        assert_eq!(view.other_shapes[0].0, client);
    }

    #[tokio::test]
    async fn test_host_does_not_relay_own_messages() {
        let (dispatcher, game, _ui, _events) = dispatcher(true);
        game.init_new_game(true, 0, 2).await;
        let own = Message::points(PeerAddress::from("host"), 5);
        assert!(dispatcher.process(own).await.is_none());
    }

    #[tokio::test]
    async fn test_start_game_goes_to_ui() {
        let (dispatcher, _game, mut ui, _events) = dispatcher(false);
        let start = Message::start_game(PeerAddress::from("other-host"), 2, 3);
        assert!(dispatcher.process(start).await.is_none());
        assert_eq!(
            ui.recv().await,
            Some(UiEvent::StartGame {
                player_number: 2,
                player_count: 3
            })
        );
    }
}
