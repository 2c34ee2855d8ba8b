//! Login bookkeeping: who is connected under which name, who may join.

use std::collections::{HashMap, HashSet};

use classic_shared::config::ServerConfig;

use crate::session::{LoginHost, ServerIdentity, SessionId};

/// Verifies the credential a peer presents at identification.
pub trait Authenticator: Send {
    fn authenticate(&self, name: &str, credential: &str) -> bool;
}

/// Accepts everyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAuthenticator;

impl Authenticator for OpenAuthenticator {
    fn authenticate(&self, _name: &str, _credential: &str) -> bool {
        true
    }
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Name directory plus the allow-list, operator list and capacity limit.
pub struct Lobby {
    identity: ServerIdentity,
    names: HashMap<String, SessionId>,
    operators: HashSet<String>,
    whitelist: Option<HashSet<String>>,
    max_players: usize,
    authenticator: Box<dyn Authenticator>,
}

impl Lobby {
    pub fn new(cfg: &ServerConfig) -> Self {
        Self {
            identity: ServerIdentity {
                name: cfg.server_name.clone(),
                motd: cfg.motd.clone(),
            },
            names: HashMap::new(),
            operators: cfg.operators.iter().map(|n| key(n)).collect(),
            whitelist: cfg
                .whitelist_enabled
                .then(|| cfg.whitelist.iter().map(|n| key(n)).collect()),
            max_players: cfg.max_players,
            authenticator: Box::new(OpenAuthenticator),
        }
    }

    pub fn set_authenticator(&mut self, authenticator: Box<dyn Authenticator>) {
        self.authenticator = authenticator;
    }

    /// Frees whatever name `session` holds.
    pub fn release(&mut self, session: SessionId) -> Option<String> {
        let name = self
            .names
            .iter()
            .find(|(_, id)| **id == session)
            .map(|(name, _)| name.clone())?;
        self.names.remove(&name);
        Some(name)
    }

    pub fn find(&self, name: &str) -> Option<SessionId> {
        self.names.get(&key(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl LoginHost for Lobby {
    fn is_name_taken(&self, name: &str) -> bool {
        self.names.contains_key(&key(name))
    }

    fn authenticate(&self, name: &str, credential: &str) -> bool {
        self.authenticator.authenticate(name, credential)
    }

    fn is_allowed(&self, name: &str) -> bool {
        self.whitelist
            .as_ref()
            .map_or(true, |list| list.contains(&key(name)))
    }

    fn has_capacity(&self) -> bool {
        self.names.len() < self.max_players
    }

    fn reserve_name(&mut self, name: &str, session: SessionId) {
        self.names.insert(key(name), session);
    }

    fn is_operator(&self, name: &str) -> bool {
        self.operators.contains(&key(name))
    }

    fn identity(&self) -> &ServerIdentity {
        &self.identity
    }
}
