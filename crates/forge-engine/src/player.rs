//! Player identity and connection-session state machine.

use std::collections::HashMap;
use std::sync::RwLock;

use forge_ecs::entity::EntityId;

use crate::error::EngineError;

/// A session's lifecycle state. `Abandoned` is terminal: once reached, no
/// further transition is observable for that `(match, player)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SessionState {
    Absent,
    Connected,
    Disconnected,
    Abandoned,
}

struct PlayerRecord {
    display_name: String,
    /// The entity (if any) an OWNER component points at to mark something
    /// as belonging to this player, used by per-player snapshot filtering.
    owned_entity: Option<EntityId>,
}

/// Tracks known players and their per-match session state.
///
/// Player identity (create/delete) is container-global, but a session is
/// scoped to one `(match, player)` pair: the same player can be `Connected`
/// in one match and `Disconnected` or `Absent` in another at the same time.
/// Deleting a player drops every session it holds, across every match.
///
/// This registry has no visibility into which matches actually exist --
/// that check is [`crate::container::ContainerManager`]'s job, since it's
/// the one holding both registries.
pub struct PlayerRegistry {
    players: RwLock<HashMap<String, PlayerRecord>>,
    sessions: RwLock<HashMap<(String, String), SessionState>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self { players: RwLock::new(HashMap::new()), sessions: RwLock::new(HashMap::new()) }
    }

    /// Total known players, regardless of session state.
    pub fn count(&self) -> usize {
        self.players.read().expect("player registry lock poisoned").len()
    }

    /// Sessions currently `Connected`, across every match.
    pub fn connected_count(&self) -> usize {
        self.sessions
            .read()
            .expect("session map lock poisoned")
            .values()
            .filter(|s| **s == SessionState::Connected)
            .count()
    }

    pub fn create_player(&self, player_id: &str, display_name: impl Into<String>) -> Result<(), EngineError> {
        let mut players = self.players.write().expect("player registry lock poisoned");
        if players.contains_key(player_id) {
            return Err(EngineError::Conflict {
                detail: format!("player '{player_id}' already exists"),
            });
        }
        players.insert(player_id.to_owned(), PlayerRecord { display_name: display_name.into(), owned_entity: None });
        Ok(())
    }

    /// Record which entity the OWNER component should point at to mark
    /// something as belonging to `player_id`. Overwrites any prior binding.
    pub fn bind_entity(&self, player_id: &str, entity: EntityId) -> Result<(), EngineError> {
        let mut players = self.players.write().expect("player registry lock poisoned");
        let record = players
            .get_mut(player_id)
            .ok_or_else(|| EngineError::NotFound { detail: format!("player '{player_id}' does not exist") })?;
        record.owned_entity = Some(entity);
        Ok(())
    }

    pub fn owned_entity(&self, player_id: &str) -> Result<Option<EntityId>, EngineError> {
        self.players
            .read()
            .expect("player registry lock poisoned")
            .get(player_id)
            .map(|r| r.owned_entity)
            .ok_or_else(|| EngineError::NotFound { detail: format!("player '{player_id}' does not exist") })
    }

    /// Delete a player and every session it holds, in every match.
    pub fn delete_player(&self, player_id: &str) -> Result<(), EngineError> {
        self.players
            .write()
            .expect("player registry lock poisoned")
            .remove(player_id)
            .map(|_| {
                self.sessions.write().expect("session map lock poisoned").retain(|(_, p), _| p != player_id);
            })
            .ok_or_else(|| EngineError::NotFound { detail: format!("player '{player_id}' does not exist") })
    }

    pub fn exists(&self, player_id: &str) -> bool {
        self.players.read().expect("player registry lock poisoned").contains_key(player_id)
    }

    pub fn display_name(&self, player_id: &str) -> Result<String, EngineError> {
        self.players
            .read()
            .expect("player registry lock poisoned")
            .get(player_id)
            .map(|r| r.display_name.clone())
            .ok_or_else(|| EngineError::NotFound { detail: format!("player '{player_id}' does not exist") })
    }

    /// The session state of `(match_id, player_id)`. A player with no
    /// session recorded for that match is `Absent`, not an error -- only an
    /// unknown player is.
    pub fn session_state(&self, match_id: &str, player_id: &str) -> Result<SessionState, EngineError> {
        self.ensure_player(player_id)?;
        Ok(self.session_of(match_id, player_id))
    }

    fn ensure_player(&self, player_id: &str) -> Result<(), EngineError> {
        if self.players.read().expect("player registry lock poisoned").contains_key(player_id) {
            Ok(())
        } else {
            Err(EngineError::NotFound { detail: format!("player '{player_id}' does not exist") })
        }
    }

    fn session_of(&self, match_id: &str, player_id: &str) -> SessionState {
        self.sessions
            .read()
            .expect("session map lock poisoned")
            .get(&session_key(match_id, player_id))
            .copied()
            .unwrap_or(SessionState::Absent)
    }

    fn with_session(
        &self,
        match_id: &str,
        player_id: &str,
        f: impl FnOnce(SessionState) -> Result<SessionState, EngineError>,
    ) -> Result<(), EngineError> {
        self.ensure_player(player_id)?;
        let next = f(self.session_of(match_id, player_id))?;
        self.sessions.write().expect("session map lock poisoned").insert(session_key(match_id, player_id), next);
        Ok(())
    }

    /// Open a session for `(match_id, player_id)`. Only legal from `Absent`:
    /// a pair that already has a session (in any other state, including
    /// `Connected`) gets `Conflict`, not a silent no-op -- unlike the other
    /// transitions this one does not collapse into connect.
    pub fn connect(&self, match_id: &str, player_id: &str) -> Result<(), EngineError> {
        self.with_session(match_id, player_id, |current| {
            if current != SessionState::Absent {
                return Err(EngineError::Conflict {
                    detail: format!(
                        "player '{player_id}' already has a session in match '{match_id}' ({current:?})"
                    ),
                });
            }
            Ok(SessionState::Connected)
        })
    }

    /// Legal only from `Connected`. Same-state (already `Disconnected`) is
    /// idempotent; anything else is `InvalidState`.
    pub fn disconnect(&self, match_id: &str, player_id: &str) -> Result<(), EngineError> {
        self.with_session(match_id, player_id, |current| match current {
            SessionState::Disconnected => Ok(SessionState::Disconnected),
            SessionState::Connected => Ok(SessionState::Disconnected),
            other => Err(illegal(match_id, player_id, other, SessionState::Disconnected)),
        })
    }

    /// Requires the previous state to be `Disconnected`; already-`Connected`
    /// is idempotent. Anything else (never connected, or abandoned) is
    /// `InvalidState`.
    pub fn reconnect(&self, match_id: &str, player_id: &str) -> Result<(), EngineError> {
        self.with_session(match_id, player_id, |current| match current {
            SessionState::Connected => Ok(SessionState::Connected),
            SessionState::Disconnected => Ok(SessionState::Connected),
            other => Err(illegal(match_id, player_id, other, SessionState::Connected)),
        })
    }

    /// Terminal: legal from `Connected` or `Disconnected`. Already-`Abandoned`
    /// is idempotent so repeated abandon calls stay safe; a session that was
    /// never connected is `InvalidState`.
    pub fn abandon(&self, match_id: &str, player_id: &str) -> Result<(), EngineError> {
        self.with_session(match_id, player_id, |current| match current {
            SessionState::Abandoned => Ok(SessionState::Abandoned),
            SessionState::Connected | SessionState::Disconnected => Ok(SessionState::Abandoned),
            other => Err(illegal(match_id, player_id, other, SessionState::Abandoned)),
        })
    }
}

fn session_key(match_id: &str, player_id: &str) -> (String, String) {
    (match_id.to_owned(), player_id.to_owned())
}

fn illegal(match_id: &str, player_id: &str, from: SessionState, to: SessionState) -> EngineError {
    EngineError::InvalidState {
        detail: format!("illegal session transition for '{player_id}' in match '{match_id}': {from:?} -> {to:?}"),
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_connect_then_disconnect_then_reconnect() {
        let registry = PlayerRegistry::new();
        registry.create_player("p1", "Alice").unwrap();
        assert_eq!(registry.session_state("m1", "p1").unwrap(), SessionState::Absent);

        registry.connect("m1", "p1").unwrap();
        registry.disconnect("m1", "p1").unwrap();
        registry.reconnect("m1", "p1").unwrap();
        assert_eq!(registry.session_state("m1", "p1").unwrap(), SessionState::Connected);
    }

    #[test]
    fn second_connect_is_conflict() {
        let registry = PlayerRegistry::new();
        registry.create_player("p1", "Alice").unwrap();
        registry.connect("m1", "p1").unwrap();
        let err = registry.connect("m1", "p1").unwrap_err();
        assert_eq!(err.kind(), "Conflict");
    }

    #[test]
    fn sessions_are_independent_per_match() {
        let registry = PlayerRegistry::new();
        registry.create_player("p1", "Alice").unwrap();
        registry.connect("m1", "p1").unwrap();
        registry.connect("m2", "p1").unwrap();
        registry.disconnect("m2", "p1").unwrap();

        assert_eq!(registry.session_state("m1", "p1").unwrap(), SessionState::Connected);
        assert_eq!(registry.session_state("m2", "p1").unwrap(), SessionState::Disconnected);
    }

    #[test]
    fn repeated_disconnect_and_abandon_are_idempotent() {
        let registry = PlayerRegistry::new();
        registry.create_player("p1", "Alice").unwrap();
        registry.connect("m1", "p1").unwrap();
        registry.disconnect("m1", "p1").unwrap();
        registry.disconnect("m1", "p1").unwrap();
        registry.abandon("m1", "p1").unwrap();
        registry.abandon("m1", "p1").unwrap();
        assert_eq!(registry.session_state("m1", "p1").unwrap(), SessionState::Abandoned);
    }

    #[test]
    fn abandon_is_terminal() {
        let registry = PlayerRegistry::new();
        registry.create_player("p1", "Alice").unwrap();
        registry.connect("m1", "p1").unwrap();
        registry.abandon("m1", "p1").unwrap();

        assert!(registry.reconnect("m1", "p1").is_err());
        assert!(registry.disconnect("m1", "p1").is_err());
    }

    #[test]
    fn illegal_source_rejected() {
        let registry = PlayerRegistry::new();
        registry.create_player("p1", "Alice").unwrap();
        // Cannot disconnect, reconnect, or abandon a session that never connected.
        assert!(registry.disconnect("m1", "p1").is_err());
        assert!(registry.reconnect("m1", "p1").is_err());
        assert!(registry.abandon("m1", "p1").is_err());
    }

    #[test]
    fn duplicate_player_rejected() {
        let registry = PlayerRegistry::new();
        registry.create_player("p1", "Alice").unwrap();
        let err = registry.create_player("p1", "Alice again").unwrap_err();
        assert_eq!(err.kind(), "Conflict");
    }

    #[test]
    fn bind_entity_roundtrips() {
        let registry = PlayerRegistry::new();
        registry.create_player("p1", "Alice").unwrap();
        assert_eq!(registry.owned_entity("p1").unwrap(), None);
        registry.bind_entity("p1", EntityId::new(42)).unwrap();
        assert_eq!(registry.owned_entity("p1").unwrap(), Some(EntityId::new(42)));
    }

    #[test]
    fn delete_missing_player_not_found() {
        let registry = PlayerRegistry::new();
        let err = registry.delete_player("ghost").unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn delete_player_drops_sessions_in_every_match() {
        let registry = PlayerRegistry::new();
        registry.create_player("p1", "Alice").unwrap();
        registry.connect("m1", "p1").unwrap();
        registry.connect("m2", "p1").unwrap();
        registry.delete_player("p1").unwrap();

        registry.create_player("p1", "Alice").unwrap();
        assert_eq!(registry.session_state("m1", "p1").unwrap(), SessionState::Absent);
        assert_eq!(registry.session_state("m2", "p1").unwrap(), SessionState::Absent);
    }
}
