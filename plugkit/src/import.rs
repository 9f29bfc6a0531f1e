//! Import helpers for simplifying resource import implementations
//!
//! The framework reads every imported resource afterwards, so a helper only
//! needs to fill in what the read needs to find the remote object.

use crate::context::Context;
use crate::resource::{ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource};
use crate::types::{AttributePath, PrivateStateData};
use crate::value::Value;

/// Sets the import ID to a specific attribute in state
///
/// This is useful for simple resources where the import ID maps directly to
/// a single attribute in the resource state.
///
/// Example: ID "user-123" -> state.id = "user-123"
pub fn import_state_passthrough_id(
    _ctx: &Context,
    attr_path: AttributePath,
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    let mut state = Value::null_object(&request.state_type);
    if let Err(e) = state.set_path(&attr_path, Value::from(request.id.as_str())) {
        response.diagnostics.add_attribute_error(
            attr_path.clone(),
            "Failed to set import ID",
            format!("Could not set attribute {} to {:?}: {}", attr_path, request.id, e),
        );
        return;
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
        private: PrivateStateData::new(),
        identity: request.identity.clone(),
    });
}

/// Copies an identity attribute into state, falling back to the import ID
/// when the engine supplied no identity.
pub fn import_state_passthrough_with_identity(
    ctx: &Context,
    state_attr_path: AttributePath,
    identity_attr_path: AttributePath,
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    let Some(identity) = &request.identity else {
        import_state_passthrough_id(ctx, state_attr_path, request, response);
        return;
    };

    let value = match identity.get_path(&identity_attr_path) {
        Some(value) if !value.is_null() => value.clone(),
        _ => {
            response.diagnostics.add_attribute_error(
                identity_attr_path.clone(),
                "Failed to read identity value",
                format!("Identity attribute {} is not set", identity_attr_path),
            );
            return;
        }
    };

    let mut state = Value::null_object(&request.state_type);
    if let Err(e) = state.set_path(&state_attr_path, value) {
        response.diagnostics.add_attribute_error(
            state_attr_path.clone(),
            "Failed to copy identity value",
            format!(
                "Could not copy identity {} to state {}: {}",
                identity_attr_path, state_attr_path, e
            ),
        );
        return;
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
        private: PrivateStateData::new(),
        identity: Some(identity.clone()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientCapabilities;
    use crate::value::Type;

    fn request(identity: Option<Value>) -> ImportResourceStateRequest {
        ImportResourceStateRequest {
            type_name: "corner_user".to_string(),
            id: "jdoe".to_string(),
            client_capabilities: ClientCapabilities::default(),
            identity,
            state_type: Type::object([("email", Type::String), ("name", Type::String)]),
        }
    }

    #[test]
    fn passthrough_id_sets_attribute_and_nulls_the_rest() {
        let mut response = ImportResourceStateResponse::default();
        import_state_passthrough_id(
            &Context::new(),
            AttributePath::new("email"),
            &request(None),
            &mut response,
        );

        assert!(response.diagnostics.is_empty());
        let state = &response.imported_resources[0].state;
        assert_eq!(state.get_attr("email"), Some(&Value::from("jdoe")));
        assert_eq!(state.get_attr("name"), Some(&Value::null(Type::String)));
    }

    #[test]
    fn passthrough_identity_prefers_identity_over_id() {
        let identity = Value::object([("email", Value::from("jdoe@example.com"))]);
        let mut response = ImportResourceStateResponse::default();
        import_state_passthrough_with_identity(
            &Context::new(),
            AttributePath::new("email"),
            AttributePath::new("email"),
            &request(Some(identity.clone())),
            &mut response,
        );

        let imported = &response.imported_resources[0];
        assert_eq!(
            imported.state.get_attr("email"),
            Some(&Value::from("jdoe@example.com"))
        );
        assert_eq!(imported.identity, Some(identity));
    }

    #[test]
    fn unknown_attribute_path_is_reported() {
        let mut response = ImportResourceStateResponse::default();
        import_state_passthrough_id(
            &Context::new(),
            AttributePath::new("missing"),
            &request(None),
            &mut response,
        );
        assert!(response.diagnostics.has_errors());
        assert!(response.imported_resources.is_empty());
    }
}
