//! Corner provider served over protocol 5
//!
//! Built as a protocol 6 low-level server and downgraded, the way protocol
//! 5 clients see it.

use crate::backend::Backend;
use crate::tf6::{echo::EchoHandler, user, CornerProviderHandler};
use plugkit::{DowngradeServer, LowLevelServer};
use std::sync::Arc;

pub fn server(backend: Arc<Backend>) -> LowLevelServer {
    LowLevelServer::new(Arc::new(CornerProviderHandler::new(backend)))
        .resource("tf5_user", Arc::new(user::UserHandler::new("tf5_user")))
        .resource("tf5_echo", Arc::new(EchoHandler))
        .data_source("tf5_user", Arc::new(user::UserDataHandler))
}

/// The protocol 5 view of [`server`].
pub fn downgraded(backend: Arc<Backend>) -> DowngradeServer {
    DowngradeServer::new(Arc::new(server(backend)))
}
