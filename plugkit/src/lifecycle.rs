//! Ephemeral resource lifecycle
//!
//! Every successful open registers an instance and hands the engine a
//! private envelope naming it. Renew and close find the instance through
//! that envelope, so they are checked against the instance state:
//!
//! ```text
//!   open ──► Open ──renew──► Open
//!              │
//!            close
//!              ▼
//!           Closing ──► (removed)
//! ```
//!
//! Renewals of one instance are serialized by the instance lock.

use crate::error::PlugkitError;
use crate::lowlevel::{
    Call, CloseRequest, EphemeralHandler, OpenRequest, OpenResponse, RenewRequest, RenewResponse,
};
use crate::types::{Diagnostics, PrivateStateData};
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

const INSTANCE_KEY: &str = "instance";
const PROVIDER_KEY: &str = "provider";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Open,
    Closing,
    Closed,
}

#[derive(Debug)]
struct Instance {
    type_name: String,
    state: InstanceState,
    renew_at: Option<DateTime<Utc>>,
    renewals: u32,
}

/// Registry of open ephemeral resource instances.
#[derive(Default)]
pub struct EphemeralLifecycle {
    instances: RwLock<HashMap<Uuid, Arc<Mutex<Instance>>>>,
}

/// Private data split into the instance id and the handler's own bytes.
struct Envelope {
    id: Option<Uuid>,
    private: Vec<u8>,
}

impl Envelope {
    fn seal(id: Uuid, private: Vec<u8>) -> crate::error::Result<Vec<u8>> {
        let mut data = PrivateStateData::new();
        data.set_key(INSTANCE_KEY, id.to_string().into_bytes());
        data.set_key(PROVIDER_KEY, private);
        data.encode()
    }

    /// Bytes that do not carry an envelope are passed to the handler as-is.
    fn open(bytes: Vec<u8>) -> Self {
        let Ok(data) = PrivateStateData::decode(&bytes) else {
            return Self {
                id: None,
                private: bytes,
            };
        };
        let id = data
            .get_key(INSTANCE_KEY)
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .and_then(|raw| Uuid::parse_str(raw).ok());
        match id {
            Some(id) => Self {
                id: Some(id),
                private: data.get_key(PROVIDER_KEY).map(<[u8]>::to_vec).unwrap_or_default(),
            },
            None => Self {
                id: None,
                private: bytes,
            },
        }
    }
}

impl EphemeralLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new instance. A configuration with any unknown value in it
    /// cannot be opened.
    pub async fn open(
        &self,
        handler: &dyn EphemeralHandler,
        call: &Call,
        type_name: &str,
        config: Value,
    ) -> OpenResponse {
        if !config.is_wholly_known() {
            return OpenResponse {
                result: Value::null(handler.schema().ty()),
                renew_at: None,
                private: Vec::new(),
                diagnostics: Diagnostics::from(
                    PlugkitError::UnknownValue(format!(
                        "the configuration of ephemeral resource {} is not wholly known",
                        type_name
                    ))
                    .into_diagnostic(),
                ),
                deferred: None,
            };
        }

        let mut response = handler.open(call, OpenRequest { config }).await;
        if response.diagnostics.has_errors() {
            debug!(type_name = %type_name, "ephemeral resource open failed");
            return response;
        }

        let id = Uuid::new_v4();
        match Envelope::seal(id, std::mem::take(&mut response.private)) {
            Ok(private) => response.private = private,
            Err(e) => {
                response.diagnostics.push(e.into_diagnostic());
                return response;
            }
        }
        self.instances.write().await.insert(
            id,
            Arc::new(Mutex::new(Instance {
                type_name: type_name.to_string(),
                state: InstanceState::Open,
                renew_at: response.renew_at,
                renewals: 0,
            })),
        );
        debug!(type_name = %type_name, instance = %id, "ephemeral resource opened");
        response
    }

    pub async fn renew(
        &self,
        handler: &dyn EphemeralHandler,
        call: &Call,
        type_name: &str,
        private: Vec<u8>,
    ) -> RenewResponse {
        let envelope = Envelope::open(private);
        let Some(id) = envelope.id else {
            return handler
                .renew(
                    call,
                    RenewRequest {
                        private: envelope.private,
                    },
                )
                .await;
        };
        let Some(instance) = self.instances.read().await.get(&id).cloned() else {
            warn!(type_name = %type_name, instance = %id, "renew of untracked instance");
            let mut diagnostics = Diagnostics::new();
            diagnostics.add_error(
                "Ephemeral Resource Not Open",
                format!(
                    "Renew was called for an instance of {} that is closed or was opened by another provider process.",
                    type_name
                ),
            );
            return RenewResponse {
                diagnostics,
                ..Default::default()
            };
        };

        let mut instance = instance.lock().await;
        let mut diagnostics = Diagnostics::new();
        if instance.state != InstanceState::Open {
            diagnostics.add_error(
                "Ephemeral Resource Not Open",
                format!(
                    "Renew was called for an instance of {} that is {:?}.",
                    instance.type_name, instance.state
                ),
            );
            return RenewResponse {
                diagnostics,
                ..Default::default()
            };
        }

        let mut response = handler
            .renew(
                call,
                RenewRequest {
                    private: envelope.private,
                },
            )
            .await;
        if let (Some(previous), Some(next)) = (instance.renew_at, response.renew_at) {
            if next <= previous {
                response.diagnostics.add_error(
                    "Invalid Renewal Deadline",
                    format!(
                        "The renewal deadline {} must be later than the previous deadline {}.",
                        next.to_rfc3339(),
                        previous.to_rfc3339()
                    ),
                );
            }
        }
        if response.diagnostics.has_errors() {
            return response;
        }

        instance.renewals += 1;
        instance.renew_at = response.renew_at;
        match Envelope::seal(id, std::mem::take(&mut response.private)) {
            Ok(private) => response.private = private,
            Err(e) => response.diagnostics.push(e.into_diagnostic()),
        }
        debug!(
            type_name = %type_name,
            instance = %id,
            renewals = instance.renewals,
            "ephemeral resource renewed"
        );
        response
    }

    /// Closes an instance. The instance is released whatever the handler
    /// reports.
    pub async fn close(
        &self,
        handler: &dyn EphemeralHandler,
        call: &Call,
        type_name: &str,
        private: Vec<u8>,
    ) -> Diagnostics {
        let envelope = Envelope::open(private);
        let instance = match envelope.id {
            Some(id) => self.instances.read().await.get(&id).cloned(),
            None => None,
        };

        let diagnostics = match instance {
            Some(instance) => {
                let mut guard = instance.lock().await;
                if guard.state != InstanceState::Open {
                    let mut diagnostics = Diagnostics::new();
                    diagnostics.add_error(
                        "Ephemeral Resource Not Open",
                        format!(
                            "Close was called for an instance of {} that is {:?}.",
                            guard.type_name, guard.state
                        ),
                    );
                    return diagnostics;
                }
                guard.state = InstanceState::Closing;
                let diagnostics = handler
                    .close(
                        call,
                        CloseRequest {
                            private: envelope.private,
                        },
                    )
                    .await;
                guard.state = InstanceState::Closed;
                diagnostics
            }
            None if envelope.id.is_some() => {
                debug!(type_name = %type_name, "close of untracked instance ignored");
                Diagnostics::new()
            }
            None => {
                handler
                    .close(
                        call,
                        CloseRequest {
                            private: envelope.private,
                        },
                    )
                    .await
            }
        };

        if let Some(id) = envelope.id {
            self.instances.write().await.remove(&id);
            debug!(type_name = %type_name, instance = %id, "ephemeral resource closed");
        }
        diagnostics
    }

    /// State of the instance named by an envelope, if it is still tracked.
    pub async fn state(&self, private: &[u8]) -> Option<InstanceState> {
        let id = Envelope::open(private.to_vec()).id?;
        let instance = self.instances.read().await.get(&id).cloned()?;
        let state = instance.lock().await.state;
        Some(state)
    }

    pub async fn open_count(&self) -> usize {
        self.instances.read().await.len()
    }
}
