//! A player's session walks through connect/disconnect/reconnect/abandon,
//! rejecting the transitions the state machine forbids. Sessions are scoped
//! per match, so the same player can be in different states in two matches
//! at once.

use forge_engine::prelude::*;

#[test]
fn session_state_machine_follows_the_legal_path() {
    let container = ContainerManager::new();
    container.start().unwrap();
    container.create_match("M1", vec![], vec![], MatchConfig::default()).unwrap();
    container.players.create_player("P1", "Player One").unwrap();

    container.connect("M1", "P1").unwrap();
    assert_eq!(container.session_state("M1", "P1").unwrap(), SessionState::Connected);

    container.disconnect("M1", "P1").unwrap();
    assert_eq!(container.session_state("M1", "P1").unwrap(), SessionState::Disconnected);

    container.reconnect("M1", "P1").unwrap();
    assert_eq!(container.session_state("M1", "P1").unwrap(), SessionState::Connected);

    let err = container.connect("M1", "P1").unwrap_err();
    assert_eq!(err.kind(), "Conflict");

    container.abandon("M1", "P1").unwrap();
    assert_eq!(container.session_state("M1", "P1").unwrap(), SessionState::Abandoned);

    let err = container.reconnect("M1", "P1").unwrap_err();
    assert_eq!(err.kind(), "InvalidState");
}

#[test]
fn sessions_are_independent_across_matches() {
    let container = ContainerManager::new();
    container.start().unwrap();
    container.create_match("M1", vec![], vec![], MatchConfig::default()).unwrap();
    container.create_match("M2", vec![], vec![], MatchConfig::default()).unwrap();
    container.players.create_player("P1", "Player One").unwrap();

    container.connect("M1", "P1").unwrap();
    container.connect("M2", "P1").unwrap();
    container.disconnect("M2", "P1").unwrap();

    assert_eq!(container.session_state("M1", "P1").unwrap(), SessionState::Connected);
    assert_eq!(container.session_state("M2", "P1").unwrap(), SessionState::Disconnected);
}

#[test]
fn connect_rejects_nonexistent_match() {
    let container = ContainerManager::new();
    container.start().unwrap();
    container.players.create_player("P1", "Player One").unwrap();

    let err = container.connect("ghost", "P1").unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}
