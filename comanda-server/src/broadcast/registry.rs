//! Session registry - live view of client connections
//!
//! A session is one user in one role on one connection; its connection id is
//! the recipient id the event store keys streams by. Sessions survive
//! disconnects (the offline queue replays into them) until explicitly
//! removed.

use dashmap::DashMap;
use serde::Serialize;
use shared::Role;

/// One registered client session
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub connection_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub role: Role,
    pub connected: bool,
    /// Registration timestamp (Unix milliseconds)
    pub connected_at: i64,
    /// Times this session came back after a disconnect
    pub reconnects: u32,
}

/// Connection bookkeeping keyed by connection id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a new session, connected
    pub fn register(
        &self,
        connection_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        role: Role,
    ) {
        let connection_id = connection_id.into();
        let session = Session {
            connection_id: connection_id.clone(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            role,
            connected: true,
            connected_at: chrono::Utc::now().timestamp_millis(),
            reconnects: 0,
        };
        tracing::info!(connection = %connection_id, role = %role, "Session registered");
        self.sessions.insert(connection_id, session);
    }

    /// Flag the session disconnected; its queues stay alive for replay
    pub fn mark_disconnected(&self, connection_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(connection_id) {
            session.connected = false;
            tracing::info!(connection = %connection_id, "Session disconnected");
        }
    }

    /// Flag the session connected again, counting the reconnect
    pub fn mark_connected(&self, connection_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(connection_id) {
            if !session.connected {
                session.connected = true;
                session.reconnects += 1;
                tracing::info!(
                    connection = %connection_id,
                    reconnects = session.reconnects,
                    "Session reconnected"
                );
            }
        }
    }

    /// Remove the session entirely
    pub fn remove(&self, connection_id: &str) -> Option<Session> {
        self.sessions.remove(connection_id).map(|(_, s)| s)
    }

    pub fn get(&self, connection_id: &str) -> Option<Session> {
        self.sessions.get(connection_id).map(|s| s.clone())
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.sessions
            .get(connection_id)
            .map(|s| s.connected)
            .unwrap_or(false)
    }

    /// All sessions in the tenant whose role matches the target set
    ///
    /// `None` matches every role. Disconnected sessions are included - the
    /// offline queue covers them until they reconnect or are removed.
    pub fn recipients(&self, tenant_id: &str, roles: Option<&[Role]>) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|s| s.tenant_id == tenant_id)
            .filter(|s| roles.is_none_or(|roles| roles.contains(&s.role)))
            .map(|s| s.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_resolution_by_role() {
        let registry = SessionRegistry::new();
        registry.register("c1", "t1", "u1", Role::Cameriere);
        registry.register("c2", "t1", "u2", Role::Prepara);
        registry.register("c3", "t2", "u3", Role::Prepara);

        let prepara = registry.recipients("t1", Some(&[Role::Prepara]));
        assert_eq!(prepara.len(), 1);
        assert_eq!(prepara[0].connection_id, "c2");

        // None matches every role, tenant-scoped
        assert_eq!(registry.recipients("t1", None).len(), 2);
        assert_eq!(registry.recipients("t3", None).len(), 0);
    }

    #[test]
    fn test_disconnected_sessions_remain_recipients() {
        let registry = SessionRegistry::new();
        registry.register("c1", "t1", "u1", Role::Cassa);
        registry.mark_disconnected("c1");

        assert!(!registry.is_connected("c1"));
        assert_eq!(registry.recipients("t1", Some(&[Role::Cassa])).len(), 1);
    }

    #[test]
    fn test_reconnect_counting() {
        let registry = SessionRegistry::new();
        registry.register("c1", "t1", "u1", Role::Cassa);
        registry.mark_disconnected("c1");
        registry.mark_connected("c1");
        // Reconnecting while connected is not a reconnect
        registry.mark_connected("c1");

        assert_eq!(registry.get("c1").unwrap().reconnects, 1);
    }
}
