//! `CardroomServer` builder and server loop.
//!
//! This is the entry point for running a card room server. It ties
//! together all the layers: transport → protocol → session → room.

use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use cardroom_protocol::JsonCodec;
use cardroom_room::{NoopHooks, RoomConfig, RoomHooks, RoomManager};
use cardroom_session::{Authenticator, TokenTable};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::websocket::WebSocketListener;
use crate::CardroomError;

/// Address used when the builder isn't given one.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:2567";

/// Shared server state passed to each connection handler task.
///
/// The room manager sits behind a `Mutex` so that join-or-create is a
/// single step: two connections can never both claim the last seat of
/// the same room.
pub(crate) struct ServerState<A: Authenticator, H: RoomHooks + Default> {
    pub(crate) rooms: Mutex<RoomManager<H>>,
    pub(crate) auth: A,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a card room server.
///
/// # Example
///
/// ```rust,no_run
/// use cardroom::prelude::*;
///
/// # async fn run() -> Result<(), CardroomError> {
/// let auth = TokenTable::new().with_token("dev", "alice");
/// let server = CardroomServer::builder()
///     .bind("0.0.0.0:2567")
///     .build(auth)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct CardroomServerBuilder<H: RoomHooks + Default = NoopHooks> {
    bind_addr: String,
    room_config: RoomConfig,
    _hooks: PhantomData<fn() -> H>,
}

impl CardroomServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            room_config: RoomConfig::default(),
            _hooks: PhantomData,
        }
    }
}

impl<H: RoomHooks + Default> CardroomServerBuilder<H> {
    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the configuration every new room starts from.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Selects the game hooks each new room runs.
    pub fn hooks<H2: RoomHooks + Default>(self) -> CardroomServerBuilder<H2> {
        CardroomServerBuilder {
            bind_addr: self.bind_addr,
            room_config: self.room_config,
            _hooks: PhantomData,
        }
    }

    /// Binds the listener and returns a server ready to [`run`](CardroomServer::run).
    ///
    /// # Errors
    /// [`CardroomError::Transport`] if the address can't be bound.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<CardroomServer<A, H>, CardroomError> {
        let listener = WebSocketListener::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            rooms: Mutex::new(RoomManager::new(self.room_config)),
            auth,
            codec: JsonCodec,
        });

        Ok(CardroomServer { listener, state })
    }
}

impl Default for CardroomServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound card room server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CardroomServer<A: Authenticator, H: RoomHooks + Default = NoopHooks> {
    listener: WebSocketListener,
    state: Arc<ServerState<A, H>>,
}

impl CardroomServer<TokenTable> {
    /// Creates a new builder. The authenticator type is chosen later, by
    /// [`CardroomServerBuilder::build`].
    pub fn builder() -> CardroomServerBuilder {
        CardroomServerBuilder::new()
    }
}

impl<A, H> CardroomServer<A, H>
where
    A: Authenticator,
    H: RoomHooks + Default,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, CardroomError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming TCP connections and spawns a handler task for
    /// each; the WebSocket upgrade happens inside that task. Runs until the
    /// process is terminated.
    pub async fn run(self) -> Result<(), CardroomError> {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "cardroom server running");

        loop {
            match self.listener.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(pending, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
