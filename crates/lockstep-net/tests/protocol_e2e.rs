//! End-to-end protocol test: a `ServerController` and a `ClientController`
//! wired together over an in-memory channel, exercising command
//! propagation, rebroadcast-as-authoritative, and periodic hash-check
//! agreement without any real transport.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use lockstep_ecs::component::{ComponentKind, Position, Velocity};
use lockstep_ecs::manager::Manager;
use lockstep_net::config::ControllerConfig;
use lockstep_net::controller::{ClientController, ServerController};
use lockstep_net::session::{PlayerId, Session, SessionEvent};
use lockstep_sim::command::{Command, CommandPayload};
use lockstep_sim::systems::register_reference_systems;
use lockstep_sim::tss::{Tss, TssState};

fn apply(command: &Command, manager: &mut Manager) {
    match &command.payload {
        CommandPayload::SpawnEntity { position, velocity } => {
            let entity = manager.add_entity();
            manager.add_component(entity, ComponentKind::Position(Position { x: position.0, y: position.1 }));
            manager.add_component(entity, ComponentKind::Velocity(Velocity { dx: velocity.0, dy: velocity.1 }));
        }
        CommandPayload::SetVelocity { .. } | CommandPayload::SetPosition { .. } | CommandPayload::RemoveEntity { .. } => {}
    }
}

fn fresh_manager() -> Manager {
    let mut manager = Manager::new();
    register_reference_systems(&mut manager);
    manager
}

/// An in-memory `Session` that hands everything it sends straight to a
/// peer's inbox, simulating a zero-latency reliable channel between
/// exactly two controllers.
struct ChannelSession {
    local: PlayerId,
    own_inbox: Rc<RefCell<VecDeque<SessionEvent>>>,
    peer_inbox: Rc<RefCell<VecDeque<SessionEvent>>>,
}

impl Session for ChannelSession {
    fn local_player(&self) -> Option<PlayerId> {
        Some(self.local)
    }

    fn poll_events(&mut self) -> Vec<SessionEvent> {
        self.own_inbox.borrow_mut().drain(..).collect()
    }

    fn send_to(&mut self, _player: PlayerId, bytes: &[u8]) {
        self.peer_inbox.borrow_mut().push_back(SessionEvent::Data { from: self.local, bytes: bytes.to_vec() });
    }

    fn broadcast(&mut self, bytes: &[u8]) {
        self.peer_inbox.borrow_mut().push_back(SessionEvent::Data { from: self.local, bytes: bytes.to_vec() });
    }

    fn disconnect(&mut self, _player: PlayerId) {}

    fn leave(&mut self) {}
}

#[test]
fn command_propagates_and_trailing_hashes_agree() {
    let server_inbox = Rc::new(RefCell::new(VecDeque::new()));
    let client_inbox = Rc::new(RefCell::new(VecDeque::new()));

    let server_session = ChannelSession { local: PlayerId(0), own_inbox: server_inbox.clone(), peer_inbox: client_inbox.clone() };
    let client_session = ChannelSession { local: PlayerId(1), own_inbox: client_inbox, peer_inbox: server_inbox };

    // A short hash interval so the test doesn't need hundreds of ticks to
    // observe a `HashCheck` exchange agree.
    let config = ControllerConfig { hash_interval_frames: 5, ..ControllerConfig::default() };
    let dt = config.target_elapsed_ms();

    let mut server = ServerController::new(server_session, Tss::new(vec![0, 3], fresh_manager, apply), config.clone());
    let mut client = ClientController::new(client_session, Tss::new(vec![0, 3], fresh_manager, apply), config, 1);

    for tick in 0..60 {
        server.update(dt);
        client.update(dt);

        if tick == 2 {
            client.push_local_command(CommandPayload::SpawnEntity { position: (1.0, 2.0), velocity: (0.0, 0.0) });
        }
    }

    assert_eq!(client.tss().state(), TssState::Ready, "hash mismatch must not have invalidated the client");
    assert_eq!(
        client.tss().trailing().manager().component_count(),
        server.tss().trailing().manager().component_count(),
        "client and server trailing states must agree on how many components the spawned entity produced"
    );
    assert!(client.tss().trailing().manager().component_count() > 0, "the spawned entity's components must have reached the trailing state");
}
