//! Integration tests for the room system: real actors, real channels.

use std::sync::Arc;
use std::time::Duration;

use taleroom_protocol::{
    BuzzerPhase, Channel, CharacterId, ConnectionStatus, ErrorKind, GameMode, PlayerId, RoomCode, RoomState,
    Selection, ServerEvent,
};
use taleroom_room::{
    close_empty_rooms, Catalog, PlayerSender, RegistryConfig, RoomConfig, RoomError, RoomHandle, RoomOutbound,
    RoomRegistry, RoomRequest,
};
use taleroom_transport::ConnectionId;
use tokio::sync::mpsc;

// =========================================================================
// Fixtures
// =========================================================================

fn catalog() -> Catalog {
    let characters = serde_json::json!(["wizard_1", "knight_1", "rogue_1", "bard_1"]);
    serde_json::from_value(serde_json::json!({
        "characters": {
            "turn-based-story": characters,
            "turn-based-quiz": characters,
            "buzzer-quiz": characters,
            "shared-lobby": characters,
        },
        "questions": [
            { "id": "q1", "prompt": "2+2?", "options": ["3", "4"], "correct": 1 },
            { "id": "q2", "prompt": "Capital of Italy?", "options": ["Paris", "Rome"], "correct": 1 },
        ],
        "story": [
            { "id": "gate", "prompt": "A locked gate.", "choices": ["Climb", "Knock"],
              "consequences": ["You slip over.", "A guard answers."] },
            { "id": "hall", "prompt": "A dark hall.", "choices": ["Light a torch"],
              "consequences": ["Shadows flee."] },
            { "id": "tower", "prompt": "A tall tower.", "choices": ["Climb"],
              "consequences": ["Wind howls."] },
        ],
    }))
    .unwrap()
}

fn registry_with(room_config: RoomConfig, config: RegistryConfig) -> RoomRegistry {
    RoomRegistry::new(room_config, config, Arc::new(catalog()))
}

fn registry() -> RoomRegistry {
    registry_with(RoomConfig::default(), RegistryConfig::default())
}

/// One player on one connection, with the receiving end of its events.
struct Client {
    id: PlayerId,
    conn: ConnectionId,
    rx: mpsc::UnboundedReceiver<RoomOutbound>,
}

impl Client {
    fn new(id: &str, conn: u64) -> (Self, PlayerSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self {
            id: PlayerId::new(id).unwrap(),
            conn: ConnectionId::new(conn),
            rx,
        };
        (client, tx)
    }

    async fn join(room: &RoomHandle, id: &str, conn: u64) -> Self {
        let (client, tx) = Self::new(id, conn);
        room.join(client.id.clone(), id.to_uppercase(), client.conn, tx)
            .await
            .unwrap();
        client
    }

    async fn send(&self, room: &RoomHandle, request: RoomRequest) -> Result<(), RoomError> {
        room.request(self.id.clone(), self.conn, request).await
    }

    fn drain(&mut self) -> Vec<RoomOutbound> {
        let mut out = Vec::new();
        while let Ok(o) = self.rx.try_recv() {
            out.push(o);
        }
        out
    }

    fn events(&mut self) -> Vec<ServerEvent> {
        self.drain().into_iter().map(|o| o.event).collect()
    }
}

fn pid(s: &str) -> PlayerId {
    PlayerId::new(s).unwrap()
}

/// Round-trips a command so everything queued before it, timers
/// included, has been applied.
async fn settle(room: &RoomHandle) {
    room.info().await.unwrap();
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_joiner_gets_snapshot_others_get_notice() {
    let mut reg = registry();
    let room = reg.create_room(GameMode::SharedLobby, None).unwrap();

    let mut a = Client::join(&room, "a", 1).await;
    let (mut b, tx) = Client::new("b", 2);
    let snapshot = room.join(b.id.clone(), "Bo", b.conn, tx).await.unwrap();

    assert_eq!(snapshot.players.len(), 2);
    assert_eq!(snapshot.host().unwrap().id, pid("a"));

    let b_events = b.drain();
    assert_eq!(b_events.len(), 1);
    assert_eq!(b_events[0].room, *room.code());
    assert!(matches!(&b_events[0].event, ServerEvent::RoomJoined { snapshot: s } if *s == snapshot));

    let a_events = a.events();
    assert!(a_events.iter().any(|e| matches!(e,
        ServerEvent::PlayerJoined { player } if player.id == pid("b") && !player.is_host)));
}

#[tokio::test]
async fn test_full_room_rejects_fifth_player() {
    let mut reg = registry();
    let room = reg.create_room(GameMode::SharedLobby, Some(4)).unwrap();
    for (i, id) in ["a", "b", "c", "d"].into_iter().enumerate() {
        Client::join(&room, id, i as u64).await;
    }

    let (e, tx) = Client::new("e", 9);
    let err = room.join(e.id.clone(), "E", e.conn, tx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RoomFull);
    assert_eq!(room.info().await.unwrap().player_count, 4);
}

#[tokio::test]
async fn test_join_after_start_is_refused() {
    let mut reg = registry();
    let room = reg.create_room(GameMode::BuzzerQuiz, None).unwrap();
    let a = Client::join(&room, "a", 1).await;
    a.send(&room, RoomRequest::StartGame).await.unwrap();

    let (b, tx) = Client::new("b", 2);
    let err = room.join(b.id.clone(), "B", b.conn, tx).await.unwrap_err();
    assert_eq!(err, RoomError::GameAlreadyInProgress(room.code().clone()));
}

#[tokio::test]
async fn test_newer_connection_replaces_older() {
    let mut reg = registry();
    let room = reg.create_room(GameMode::SharedLobby, None).unwrap();
    let mut first = Client::join(&room, "a", 1).await;
    first.drain();

    let second = Client::join(&room, "a", 2).await;
    let events = first.events();
    assert_eq!(events, vec![ServerEvent::SessionReplaced]);

    // The stale connection no longer speaks for the player.
    let err = first.send(&room, RoomRequest::RequestSnapshot).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionReplaced);
    second.send(&room, RoomRequest::RequestSnapshot).await.unwrap();

    let info = room.info().await.unwrap();
    assert_eq!((info.player_count, info.connected_count), (1, 1));
}

// =========================================================================
// Characters
// =========================================================================

#[tokio::test]
async fn test_concurrent_character_selection_has_one_winner() {
    let mut reg = registry();
    let room = reg.create_room(GameMode::TurnBasedStory, None).unwrap();
    let mut a = Client::join(&room, "a", 1).await;
    let mut b = Client::join(&room, "b", 2).await;
    a.drain();
    b.drain();

    let wizard = CharacterId::new("wizard_1").unwrap();
    let (ra, rb) = tokio::join!(
        a.send(&room, RoomRequest::SelectCharacter(wizard.clone())),
        b.send(&room, RoomRequest::SelectCharacter(wizard.clone())),
    );

    let (winner, loser) = match (&ra, &rb) {
        (Ok(()), Err(e)) => (pid("a"), e),
        (Err(e), Ok(())) => (pid("b"), e),
        other => panic!("expected exactly one success, got {other:?}"),
    };
    assert_eq!(*loser, RoomError::CharacterUnavailable(wizard.clone()));

    let snapshot = room.snapshot().await.unwrap();
    assert_eq!(snapshot.characters.len(), 1);
    assert_eq!(snapshot.characters[&wizard], winner);
    assert!(!snapshot.available_characters.contains(&wizard));

    // Both saw exactly one selection.
    for client in [&mut a, &mut b] {
        let selected: Vec<_> = client
            .events()
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::CharacterSelected { .. }))
            .collect();
        assert_eq!(selected.len(), 1);
    }
}

// =========================================================================
// Buzzer
// =========================================================================

async fn buzzer_room(reg: &mut RoomRegistry) -> (RoomHandle, Client, Client) {
    let room = reg.create_room(GameMode::BuzzerQuiz, None).unwrap();
    let mut a = Client::join(&room, "a", 1).await;
    let mut b = Client::join(&room, "b", 2).await;
    a.send(&room, RoomRequest::StartGame).await.unwrap();
    a.drain();
    b.drain();
    (room, a, b)
}

#[tokio::test]
async fn test_second_press_finds_buzzer_held() {
    let mut reg = registry();
    let (room, mut a, mut b) = buzzer_room(&mut reg).await;

    a.send(&room, RoomRequest::PressBuzzer).await.unwrap();
    let err = a.send(&room, RoomRequest::PressBuzzer).await.unwrap_err();
    assert_eq!(err, RoomError::BuzzerAlreadyHeld);
    let err = b.send(&room, RoomRequest::PressBuzzer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BuzzerAlreadyHeld);

    // One lock announced to everyone, nothing for the refused presses.
    for client in [&mut a, &mut b] {
        let events = client.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0],
            ServerEvent::BuzzerLocked { player_id, window_ms: 2000 } if *player_id == pid("a")));
    }
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_buzzer_reopens_after_window() {
    let mut reg = registry();
    let (room, mut a, _b) = buzzer_room(&mut reg).await;

    a.send(&room, RoomRequest::PressBuzzer).await.unwrap();
    a.drain();

    tokio::time::advance(Duration::from_millis(1999)).await;
    settle(&room).await;
    assert!(a.events().is_empty());

    tokio::time::advance(Duration::from_millis(1)).await;
    settle(&room).await;
    assert_eq!(a.events(), vec![ServerEvent::BuzzerTimeout { player_id: pid("a") }]);

    let snapshot = room.snapshot().await.unwrap();
    let buzzer = snapshot.session.unwrap().buzzer.unwrap();
    assert_eq!(buzzer.phase, BuzzerPhase::Open);
    assert_eq!(buzzer.holder, None);

    let err = a.send(&room, RoomRequest::SubmitBuzzerAnswer(1)).await.unwrap_err();
    assert_eq!(err, RoomError::AnswerWindowClosed);
}

#[tokio::test]
async fn test_buzzer_round_to_finish() {
    let mut reg = registry();
    let (room, a, mut b) = buzzer_room(&mut reg).await;

    for option in [1, 0] {
        b.send(&room, RoomRequest::PressBuzzer).await.unwrap();
        b.send(&room, RoomRequest::SubmitBuzzerAnswer(option)).await.unwrap();
        a.send(&room, RoomRequest::NextQuestion).await.unwrap();
    }

    let events = b.events();
    assert!(matches!(events.last(),
        Some(ServerEvent::GameFinished { winner: Some(w), scores }) if *w == pid("b") && scores[&pid("b")] == 1));
    assert_eq!(room.info().await.unwrap().state, RoomState::Finished);

    a.send(&room, RoomRequest::ReturnToLobby).await.unwrap();
    let snapshot = room.snapshot().await.unwrap();
    assert_eq!(snapshot.state, RoomState::Waiting);
    assert!(snapshot.session.is_none());
}

// =========================================================================
// Turns and reconnection
// =========================================================================

async fn story_room(reg: &mut RoomRegistry) -> (RoomHandle, Client, Client, Client) {
    let room = reg.create_room(GameMode::TurnBasedStory, None).unwrap();
    let a = Client::join(&room, "a", 1).await;
    let b = Client::join(&room, "b", 2).await;
    let c = Client::join(&room, "c", 3).await;
    a.send(&room, RoomRequest::StartGame).await.unwrap();
    (room, a, b, c)
}

fn choose(option: usize) -> RoomRequest {
    RoomRequest::SubmitChoice { item_id: None, selection: Selection::Option(option) }
}

async fn turn_player(room: &RoomHandle) -> Option<PlayerId> {
    room.snapshot().await.unwrap().session.and_then(|s| s.turn_player)
}

#[tokio::test]
async fn test_out_of_turn_choice_is_refused() {
    let mut reg = registry();
    let (room, _a, b, _c) = story_room(&mut reg).await;
    let err = b.send(&room, choose(0)).await.unwrap_err();
    assert_eq!(err, RoomError::NotYourTurn(pid("b")));
    assert_eq!(turn_player(&room).await, Some(pid("a")));
}

#[tokio::test(start_paused = true)]
async fn test_turn_passes_on_when_holder_drops() {
    let mut reg = registry();
    let (room, a, b, mut c) = story_room(&mut reg).await;

    a.send(&room, choose(0)).await.unwrap();
    assert_eq!(turn_player(&room).await, Some(pid("b")));
    c.drain();

    room.disconnect(b.id.clone(), b.conn).await.unwrap();
    settle(&room).await;
    // Nobody waits on a dropped player.
    assert_eq!(turn_player(&room).await, Some(pid("c")));
    let snapshot = room.snapshot().await.unwrap();
    assert_eq!(snapshot.player(&pid("b")).unwrap().status, ConnectionStatus::Disconnected);
    assert!(c.events().iter().any(|e| matches!(e,
        ServerEvent::TurnChanged { player_id: Some(p), .. } if *p == pid("c"))));

    c.send(&room, choose(0)).await.unwrap();
    assert_eq!(turn_player(&room).await, Some(pid("a")));

    tokio::time::advance(Duration::from_secs(30)).await;
    settle(&room).await;
    assert!(c.events().contains(&ServerEvent::PlayerLeft { player_id: pid("b") }));
    assert_eq!(turn_player(&room).await, Some(pid("a")));
}

#[tokio::test(start_paused = true)]
async fn test_host_dropping_hands_over_until_return() {
    let mut reg = registry();
    let room = reg.create_room(GameMode::BuzzerQuiz, None).unwrap();
    let a = Client::join(&room, "a", 1).await;
    let mut b = Client::join(&room, "b", 2).await;
    b.drain();

    room.disconnect(a.id.clone(), a.conn).await.unwrap();
    settle(&room).await;
    assert!(b.events().contains(&ServerEvent::HostChanged { player_id: pid("b") }));
    b.send(&room, RoomRequest::StartGame).await.unwrap();

    let _a2 = Client::join(&room, "a", 10).await;
    assert_eq!(room.snapshot().await.unwrap().host().unwrap().id, pid("a"));
    assert!(b.events().contains(&ServerEvent::HostChanged { player_id: pid("a") }));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_keeps_everything() {
    let mut reg = registry();
    let (room, a, b, mut c) = story_room(&mut reg).await;
    a.send(&room, choose(1)).await.unwrap();
    b.send(&room, RoomRequest::SelectCharacter(CharacterId::new("rogue_1").unwrap()))
        .await
        .unwrap();

    room.disconnect(b.id.clone(), b.conn).await.unwrap();
    settle(&room).await;
    tokio::time::advance(Duration::from_secs(20)).await;
    c.drain();

    let mut b2 = Client::join(&room, "b", 20).await;
    let snapshot = match b2.events().as_slice() {
        [ServerEvent::RoomJoined { snapshot }] => snapshot.clone(),
        other => panic!("expected room-joined, got {other:?}"),
    };
    let session = snapshot.session.as_ref().unwrap();
    assert_eq!(session.turn_player, Some(pid("c")));
    assert_eq!(session.story_progress.len(), 1);
    assert_eq!(snapshot.player(&pid("b")).unwrap().character.as_ref().map(|c| c.as_str()), Some("rogue_1"));
    assert_eq!(snapshot.player(&pid("b")).unwrap().join_order, 1);
    assert!(c.events().contains(&ServerEvent::PlayerReconnected { player_id: pid("b") }));

    // The cancelled grace never fires.
    tokio::time::advance(Duration::from_secs(30)).await;
    settle(&room).await;
    assert_eq!(room.info().await.unwrap().player_count, 3);
    assert_eq!(b2.send(&room, choose(0)).await.unwrap_err(), RoomError::NotYourTurn(pid("b")));
}

#[tokio::test]
async fn test_host_leaving_migrates_host() {
    let mut reg = registry();
    let room = reg.create_room(GameMode::SharedLobby, None).unwrap();
    let a = Client::join(&room, "a", 1).await;
    let mut b = Client::join(&room, "b", 2).await;
    b.drain();

    room.leave(a.id.clone(), a.conn).await.unwrap();
    let events = b.events();
    assert!(events.contains(&ServerEvent::PlayerLeft { player_id: pid("a") }));
    assert!(events.contains(&ServerEvent::HostChanged { player_id: pid("b") }));
    assert_eq!(room.snapshot().await.unwrap().host().unwrap().id, pid("b"));

    b.send(&room, RoomRequest::StartGame).await.unwrap();
}

// =========================================================================
// Movement
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_movement_is_relayed_once_per_tick_to_others() {
    let mut reg = registry();
    let room = reg.create_room(GameMode::SharedLobby, None).unwrap();
    let mut a = Client::join(&room, "a", 1).await;
    let mut b = Client::join(&room, "b", 2).await;
    a.drain();
    b.drain();

    for x in [1.0, 2.0, 3.0] {
        a.send(
            &room,
            RoomRequest::Move { x, y: 0.5, facing: Default::default(), action: "walk".into() },
        )
        .await
        .unwrap();
    }
    tokio::time::advance(Duration::from_millis(50)).await;
    settle(&room).await;

    assert!(a.drain().is_empty());
    let relayed = b.drain();
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].channel, Channel::Unreliable);
    let ServerEvent::PlayerMovement { update } = &relayed[0].event else {
        panic!("expected movement, got {:?}", relayed[0].event);
    };
    assert_eq!((update.player.clone(), update.x, update.seq), (pid("a"), 3.0, 1));
}

// =========================================================================
// Registry lifecycle
// =========================================================================

#[tokio::test]
async fn test_shutdown_closes_room_for_everyone() {
    let mut reg = registry();
    let room = reg.create_room(GameMode::SharedLobby, None).unwrap();
    let mut a = Client::join(&room, "a", 1).await;
    a.drain();

    room.shutdown("maintenance").await.unwrap();
    let closed = a.rx.recv().await.unwrap();
    assert_eq!(closed.event, ServerEvent::RoomClosed { reason: "maintenance".into() });
    // The actor is gone; the channel closes after the last event.
    assert!(a.rx.recv().await.is_none());
    assert!(matches!(room.info().await, Err(RoomError::Unavailable(_))));
}

/// Closes empty rooms and drops them from the registry, the way the
/// engine's reaper does.
async fn reap(reg: &mut RoomRegistry, grace: Duration) -> Vec<RoomCode> {
    let closed = close_empty_rooms(reg.handles(), grace).await;
    for code in &closed {
        reg.remove(code);
    }
    closed
}

#[tokio::test(start_paused = true)]
async fn test_reaper_removes_rooms_nobody_is_in() {
    let room_config = RoomConfig {
        reconnect_grace: Duration::from_secs(600),
        ..RoomConfig::default()
    };
    let config = RegistryConfig {
        empty_room_grace: Duration::from_secs(60),
        ..RegistryConfig::default()
    };
    let mut reg = registry_with(room_config, config);
    let idle = reg.create_room(GameMode::SharedLobby, None).unwrap();
    let busy = reg.create_room(GameMode::SharedLobby, None).unwrap();
    let gone = Client::join(&idle, "a", 1).await;
    let _stays = Client::join(&busy, "b", 2).await;

    idle.disconnect(gone.id.clone(), gone.conn).await.unwrap();
    settle(&idle).await;
    assert!(reap(&mut reg, Duration::from_secs(60)).await.is_empty());

    tokio::time::advance(Duration::from_secs(61)).await;
    let reaped = reap(&mut reg, Duration::from_secs(60)).await;
    assert_eq!(reaped, vec![idle.code().clone()]);
    assert_eq!(reg.room_count(), 1);
    assert!(reg.find(busy.code()).is_ok());
    assert_eq!(reg.find(idle.code()).unwrap_err().kind(), ErrorKind::RoomNotFound);
}

#[tokio::test]
async fn test_last_player_leaving_abandons_room() {
    let mut reg = registry();
    let room = reg.create_room(GameMode::TurnBasedQuiz, Some(1)).unwrap();
    let a = Client::join(&room, "a", 1).await;
    room.leave(a.id.clone(), a.conn).await.unwrap();

    assert_eq!(room.info().await.unwrap().state, RoomState::Abandoned);
    assert_eq!(reap(&mut reg, RegistryConfig::default().empty_room_grace).await, vec![room.code().clone()]);
    assert_eq!(reg.room_count(), 0);
}
