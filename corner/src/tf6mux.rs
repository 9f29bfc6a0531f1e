//! Two low-level servers behind one multiplexer

use crate::backend::Backend;
use crate::tf6::{user, CornerProviderHandler};
use plugkit::{LowLevelServer, MuxServer};
use std::sync::Arc;

fn child(backend: Arc<Backend>, type_name: &str) -> LowLevelServer {
    LowLevelServer::new(Arc::new(CornerProviderHandler::new(backend)))
        .resource(type_name, Arc::new(user::UserHandler::new(type_name)))
}

pub async fn server(backend: Arc<Backend>) -> plugkit::Result<MuxServer> {
    MuxServer::new(vec![
        Arc::new(child(backend.clone(), "tf6mux_user1")),
        Arc::new(child(backend, "tf6mux_user2")),
    ])
    .await
}
