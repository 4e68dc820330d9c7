//! The `gmind-registry` crate defines the live-update layer of the
//! greenhouse-minder backend. It tracks which mobile clients are
//! currently connected, which greenhouses each client is subscribed
//! to, and fans greenhouse state changes out to exactly the
//! subscribed clients.
//!
//! The crate is composed of an [`actix::Actor`], [`SessionRegistry`],
//! that owns all registry state, plus a thin surface object,
//! [`GreenhouseSessions`], that request handlers hold on to. All
//! mutation flows through the actor mailbox, which serializes
//! concurrent connect/disconnect/subscribe traffic; readers get owned
//! snapshots so iteration never races a mutation. Responsibilities:
//!
//! 1. Track connected clients, cascading a disconnect into removal
//!    from every greenhouse's subscriber set before the call returns
//! 2. Maintain the greenhouse -> subscribers index with additive
//!    subscribe semantics and an explicit unsubscribe-all used by the
//!    replace-all protocol surface
//! 3. Fan out [`GreenhouseSnapshot`] payloads via the
//!    [`Broadcaster`], delivering through a [`ClientChannel`]
//!    capability so the registry itself never performs transport I/O.
//!    Per-client failures are contained and collected into a
//!    [`FanoutReport`], never raised to the publisher
//!
//! # Examples
//! ```rust,no_run
//! #[actix::main]
//! async fn main() -> Result<(), gmind_registry::RegistryError> {
//!     let sessions = gmind_registry::GreenhouseSessions::start(
//!         tokio::time::Duration::from_secs(2),
//!     );
//!
//!     let mut updates = sessions.connect("client-a".to_string()).await?;
//!     sessions
//!         .set_subscriptions(&"client-a".to_string(), vec!["gh-1".to_string()])
//!         .await?;
//!
//!     tokio::spawn(async move {
//!         while let Some(snapshot) = updates.recv().await {
//!             log::info!("update for {}", snapshot.greenhouse);
//!         }
//!     });
//!     Ok(())
//! }
//! ```

mod broadcast;
mod channel;
mod registry;
mod session;

pub use broadcast::{Broadcaster, FanoutReport};
pub use channel::{ChannelError, ClientChannel, ClientMailboxes};
pub use registry::{
    Connect, Disconnect, IsConnected, RegistryError, SessionRegistry, Subscribe, SubscribersOf,
    Unsubscribe, UnsubscribeAll,
};
pub use session::GreenhouseSessions;

pub use gmind_model::{ClientId, GreenhouseId, GreenhouseSnapshot};
