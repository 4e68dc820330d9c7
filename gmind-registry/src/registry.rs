use actix::{prelude::*, MailboxError};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use gmind_model::{ClientId, GreenhouseId};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no subscribers tracked for greenhouse {0}")]
    NotSubscribed(GreenhouseId),
    #[error("Actix mailbox Error")]
    MailError(#[from] MailboxError),
}

/// [`SessionRegistry`] owns the connected-client set and the
/// greenhouse subscription index. It is the only holder of this
/// state; every mutation goes through its actor mailbox, so
/// arbitrary interleaving of connect/disconnect/subscribe traffic
/// from request handlers is safe without any locking at the call
/// sites.
pub struct SessionRegistry {
    /// Clients with a live session, added on connect
    connected: HashSet<ClientId>,
    /// Greenhouse -> subscriber set. An entry is pruned when its
    /// last subscriber leaves, so "tracked but empty" never exists
    subscriptions: HashMap<GreenhouseId, HashSet<ClientId>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            connected: HashSet::new(),
            subscriptions: HashMap::new(),
        }
    }

    /// Idempotent; reconnecting an already-connected client is a no-op
    pub(crate) fn connect(&mut self, client: ClientId) {
        self.connected.insert(client);
    }

    /// Removes the client from the connected set and cascades into
    /// every greenhouse's subscriber set, so no dangling
    /// subscription survives the disconnect
    pub(crate) fn disconnect(&mut self, client: &ClientId) {
        self.connected.remove(client);
        self.unsubscribe_all(client);
    }

    pub(crate) fn is_connected(&self, client: &ClientId) -> bool {
        self.connected.contains(client)
    }

    /// Additive: earlier subscriptions of the client are untouched.
    /// Duplicate (client, greenhouse) pairs collapse into one entry
    pub(crate) fn subscribe(&mut self, client: ClientId, greenhouse: GreenhouseId) {
        self.subscriptions.entry(greenhouse).or_default().insert(client);
    }

    /// Errs when the greenhouse has no tracked subscribers at all; a
    /// tracked greenhouse that doesn't contain this client is a
    /// silent no-op
    pub(crate) fn unsubscribe(
        &mut self,
        client: &ClientId,
        greenhouse: &GreenhouseId,
    ) -> Result<(), RegistryError> {
        if let Some(subs) = self.subscriptions.get_mut(greenhouse) {
            subs.remove(client);
            if subs.is_empty() {
                self.subscriptions.remove(greenhouse);
            }
            Ok(())
        } else {
            Err(RegistryError::NotSubscribed(greenhouse.clone()))
        }
    }

    /// Always succeeds, whether or not the client holds any
    /// subscriptions
    pub(crate) fn unsubscribe_all(&mut self, client: &ClientId) {
        self.subscriptions.retain(|_, subs| {
            subs.remove(client);
            !subs.is_empty()
        });
    }

    /// Owned snapshot of the subscriber set; empty for unknown
    /// greenhouses, never an error
    pub(crate) fn subscribers_of(&self, greenhouse: &GreenhouseId) -> Vec<ClientId> {
        self.subscriptions
            .get(greenhouse)
            .map(|subs| subs.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Actor for SessionRegistry {
    type Context = Context<Self>;
}

/// Register a client session. Sent by the gateway when a socket
/// connection is authenticated
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub client: ClientId,
}

impl Handler<Connect> for SessionRegistry {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Self::Context) -> Self::Result {
        log::debug!("client {} connected", msg.client);
        self.connect(msg.client);
    }
}

/// Drop a client session and cascade its subscriptions away
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub client: ClientId,
}

impl Handler<Disconnect> for SessionRegistry {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) -> Self::Result {
        log::debug!("client {} disconnected", msg.client);
        self.disconnect(&msg.client);
    }
}

#[derive(Message)]
#[rtype(result = "IsConnectedResponse")]
pub struct IsConnected {
    pub client: ClientId,
}
type IsConnectedResponse = Result<bool, RegistryError>;

impl Handler<IsConnected> for SessionRegistry {
    type Result = IsConnectedResponse;

    fn handle(&mut self, msg: IsConnected, _ctx: &mut Self::Context) -> Self::Result {
        Ok(self.is_connected(&msg.client))
    }
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Subscribe {
    pub client: ClientId,
    pub greenhouse: GreenhouseId,
}

impl Handler<Subscribe> for SessionRegistry {
    type Result = ();

    fn handle(&mut self, msg: Subscribe, _ctx: &mut Self::Context) -> Self::Result {
        log::debug!(
            "client {} subscribed to greenhouse {}",
            msg.client,
            msg.greenhouse
        );
        self.subscribe(msg.client, msg.greenhouse);
    }
}

#[derive(Message)]
#[rtype(result = "UnsubscribeResponse")]
pub struct Unsubscribe {
    pub client: ClientId,
    pub greenhouse: GreenhouseId,
}
type UnsubscribeResponse = Result<(), RegistryError>;

impl Handler<Unsubscribe> for SessionRegistry {
    type Result = UnsubscribeResponse;

    fn handle(&mut self, msg: Unsubscribe, _ctx: &mut Self::Context) -> Self::Result {
        self.unsubscribe(&msg.client, &msg.greenhouse)
    }
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct UnsubscribeAll {
    pub client: ClientId,
}

impl Handler<UnsubscribeAll> for SessionRegistry {
    type Result = ();

    fn handle(&mut self, msg: UnsubscribeAll, _ctx: &mut Self::Context) -> Self::Result {
        self.unsubscribe_all(&msg.client);
    }
}

/// Snapshot of the subscriber set for one greenhouse, used by the
/// [`Broadcaster`](crate::Broadcaster) to resolve fan-out targets
#[derive(Message)]
#[rtype(result = "SubscribersOfResponse")]
pub struct SubscribersOf {
    pub greenhouse: GreenhouseId,
}
type SubscribersOfResponse = Result<Vec<ClientId>, RegistryError>;

impl Handler<SubscribersOf> for SessionRegistry {
    type Result = SubscribersOfResponse;

    fn handle(&mut self, msg: SubscribersOf, _ctx: &mut Self::Context) -> Self::Result {
        Ok(self.subscribers_of(&msg.greenhouse))
    }
}
