#![allow(clippy::disallowed_methods)]

mod support;

use corner::backend::User;
use corner::{Backend, CornerProvider};
use plugkit::types::{AttributePath, DeferredReason};
use plugkit::{Type, Value};
use std::sync::Arc;
use support::{summaries, Engine};

async fn engine(backend: Arc<Backend>) -> Engine {
    let server = plugkit::framework::server(CornerProvider::new(backend))
        .await
        .unwrap();
    let engine = Engine::start(Arc::new(server)).await;
    let configured = engine.configure(engine.provider_config(&[])).await;
    assert!(configured.diagnostics.is_empty(), "{:?}", configured.diagnostics);
    engine
}

fn tuple() -> Value {
    Value::tuple(vec![
        Value::from("hey"),
        Value::from("there"),
        Value::from("tuple"),
    ])
}

#[tokio::test]
async fn dynamic_tuple_survives_round_trip() {
    let engine = engine(Arc::new(Backend::new())).await;
    let config = engine.resource_config("framework_dynamic", &[("dyn", tuple())]);

    let plan = engine.plan("framework_dynamic", None, &config).await;
    assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);
    let planned = plan.planned.get_attr("dyn").unwrap();
    assert_eq!(
        planned.ty(),
        Type::tuple(vec![Type::String, Type::String, Type::String])
    );

    let created = engine
        .apply("framework_dynamic", None, &config, &plan)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.state.get_attr("dyn"), Some(&tuple()));

    let second = engine.plan("framework_dynamic", Some(&created), &config).await;
    assert!(second.diagnostics.is_empty());
    assert_eq!(second.planned, created.state);
    assert!(second.requires_replace.is_empty());
}

#[tokio::test]
async fn write_only_value_is_not_persisted() {
    let engine = engine(Arc::new(Backend::new())).await;
    let config = engine.resource_config(
        "framework_write_only",
        &[("writeonly_password", Value::from("fakepassword"))],
    );

    let created = engine.create("framework_write_only", config).await.unwrap();
    assert_eq!(
        created.state.get_attr("writeonly_password"),
        Some(&Value::null(Type::String))
    );
}

#[tokio::test]
async fn write_only_rejected_for_clients_without_support() {
    let mut engine = engine(Arc::new(Backend::new())).await;
    engine.capabilities.write_only_attributes_allowed = false;
    let config = engine.resource_config(
        "framework_write_only",
        &[("writeonly_password", Value::from("fakepassword"))],
    );

    let diagnostics = engine.validate("framework_write_only", &config).await;
    assert_eq!(
        summaries(&diagnostics),
        vec!["Write-only Attribute Not Allowed".to_string()]
    );
}

#[tokio::test]
async fn dynamic_computed_changes_type_on_update() {
    let engine = engine(Arc::new(Backend::new())).await;
    let created = engine
        .create(
            "framework_dynamic_computed",
            engine.resource_config("framework_dynamic_computed", &[("trigger", Value::from("a"))]),
        )
        .await
        .unwrap();
    assert_eq!(created.state.get_attr("dynamic_computed"), Some(&Value::from(true)));

    let config =
        engine.resource_config("framework_dynamic_computed", &[("trigger", Value::from("b"))]);
    let plan = engine
        .plan("framework_dynamic_computed", Some(&created), &config)
        .await;
    assert_eq!(
        plan.planned.get_attr("dynamic_computed"),
        Some(&Value::unknown(Type::Dynamic))
    );

    let updated = engine
        .apply("framework_dynamic_computed", Some(&created), &config, &plan)
        .await
        .unwrap()
        .unwrap();
    let value = updated.state.get_attr("dynamic_computed").unwrap();
    assert_eq!(value, &Value::from(200_i64));
    assert_eq!(value.ty(), Type::Number);
}

#[tokio::test]
async fn random_string_state_moves_without_diff() {
    let engine = engine(Arc::new(Backend::new())).await;
    let moved = engine
        .move_state(
            "registry.terraform.io/hashicorp/random",
            "random_string",
            2,
            r#"{"id":"abc","length":3,"result":"abc","special":true}"#,
            "framework_moved_random_string",
        )
        .await
        .unwrap();
    assert_eq!(
        moved.state.get_attr("moved_random_string"),
        Some(&Value::from("abc"))
    );

    let config = engine.resource_config("framework_moved_random_string", &[]);
    let plan = engine
        .plan("framework_moved_random_string", Some(&moved), &config)
        .await;
    assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);
    assert_eq!(plan.planned, moved.state);
}

#[tokio::test]
async fn moves_from_other_types_are_not_claimed() {
    let engine = engine(Arc::new(Backend::new())).await;
    let err = engine
        .move_state(
            "registry.terraform.io/hashicorp/random",
            "random_password",
            2,
            r#"{"id":"abc","length":3,"result":"abc"}"#,
            "framework_moved_random_string",
        )
        .await
        .unwrap_err();
    assert!(err.has_errors());
}

#[tokio::test]
async fn required_on_create_only_binds_creation() {
    let engine = engine(Arc::new(Backend::new())).await;
    let missing = engine
        .create(
            "framework_required_on_create",
            engine.resource_config("framework_required_on_create", &[]),
        )
        .await
        .unwrap_err();
    assert_eq!(
        summaries(&missing),
        vec!["Missing Configuration for Required Attribute".to_string()]
    );

    let created = engine
        .create(
            "framework_required_on_create",
            engine.resource_config(
                "framework_required_on_create",
                &[("initial_password", Value::from("secret"))],
            ),
        )
        .await
        .unwrap();
    let updated = engine
        .update(
            &created,
            engine.resource_config(
                "framework_required_on_create",
                &[("name", Value::from("renamed"))],
            ),
        )
        .await
        .unwrap();
    assert_eq!(updated.state.get_attr("name"), Some(&Value::from("renamed")));
    assert_eq!(updated.state.get_attr("id"), created.state.get_attr("id"));
}

fn user_config(engine: &Engine, email: &str, name: &str, age: i64) -> Value {
    engine.resource_config(
        "framework_user",
        &[
            ("email", Value::from(email)),
            ("name", Value::from(name)),
            ("age", Value::from(age)),
        ],
    )
}

#[tokio::test]
async fn user_lifecycle_goes_through_backend() {
    let backend = Arc::new(Backend::new());
    let engine = engine(backend.clone()).await;

    let created = engine
        .create("framework_user", user_config(&engine, "ada@example.com", "Ada", 36))
        .await
        .unwrap();
    assert_eq!(
        created.state.get_attr("id"),
        Some(&Value::from("ada@example.com"))
    );
    assert_eq!(
        backend.read_user("ada@example.com").await,
        Some(User {
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            age: 36,
        })
    );

    let updated = engine
        .update(&created, user_config(&engine, "ada@example.com", "Ada L.", 37))
        .await
        .unwrap();
    assert_eq!(updated.state.get_attr("name"), Some(&Value::from("Ada L.")));

    let replace = engine
        .plan(
            "framework_user",
            Some(&updated),
            &user_config(&engine, "ada@example.org", "Ada L.", 37),
        )
        .await;
    assert_eq!(replace.requires_replace, vec![AttributePath::new("email")]);

    engine.destroy(&updated).await.unwrap();
    assert_eq!(backend.read_user("ada@example.com").await, None);
    assert!(engine.read(&updated).await.unwrap().is_none());
}

#[tokio::test]
async fn user_validation_reports_attribute_errors() {
    let engine = engine(Arc::new(Backend::new())).await;
    let diagnostics = engine
        .validate("framework_user", &user_config(&engine, "not-an-email", "", 200))
        .await;
    let paths: Vec<_> = diagnostics
        .errors()
        .filter_map(|d| d.attribute.clone())
        .collect();
    assert!(paths.contains(&AttributePath::new("email")));
    assert!(paths.contains(&AttributePath::new("name")));
    assert!(paths.contains(&AttributePath::new("age")));
}

#[tokio::test]
async fn user_import_reads_back_from_backend() {
    let backend = Arc::new(Backend::new());
    backend
        .create_user(User {
            email: "grace@example.com".to_string(),
            name: "Grace".to_string(),
            age: 45,
        })
        .await
        .unwrap();
    let engine = engine(backend).await;

    let imported = engine
        .import("framework_user", "grace@example.com", None)
        .await
        .unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].state.get_attr("name"), Some(&Value::from("Grace")));
    assert_eq!(imported[0].state.get_attr("age"), Some(&Value::from(45_i64)));

    let missing = engine
        .import("framework_user", "nobody@example.com", None)
        .await
        .unwrap_err();
    assert_eq!(
        summaries(&missing),
        vec!["Cannot import non-existent remote object".to_string()]
    );
}

#[tokio::test]
async fn user_data_source_reads_existing_user() {
    let backend = Arc::new(Backend::new());
    backend
        .create_user(User {
            email: "linus@example.com".to_string(),
            name: "Linus".to_string(),
            age: 30,
        })
        .await
        .unwrap();
    let engine = engine(backend).await;

    let state = engine
        .read_data(
            "framework_user",
            Value::object([
                ("email", Value::from("linus@example.com")),
                ("name", Value::null(Type::String)),
                ("age", Value::null(Type::Number)),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(state.get_attr("name"), Some(&Value::from("Linus")));

    let missing = engine
        .read_data(
            "framework_user",
            Value::object([
                ("email", Value::from("nobody@example.com")),
                ("name", Value::null(Type::String)),
                ("age", Value::null(Type::Number)),
            ]),
        )
        .await
        .unwrap_err();
    assert_eq!(summaries(&missing), vec!["User not found".to_string()]);
}

#[tokio::test]
async fn identity_import_restores_state() {
    let engine = engine(Arc::new(Backend::new())).await;
    let created = engine
        .create(
            "framework_identity",
            engine.resource_config("framework_identity", &[("name", Value::from("alpha"))]),
        )
        .await
        .unwrap();
    let id = created.state.get_attr("id").unwrap().clone();
    assert_eq!(
        created.identity,
        Some(Value::object([("id", id.clone())]))
    );

    let imported = engine
        .import(
            "framework_identity",
            "",
            Some(Value::object([("id", id.clone())])),
        )
        .await
        .unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].state.get_attr("id"), Some(&id));
    assert_eq!(imported[0].state.get_attr("name"), Some(&Value::from("alpha")));
    assert_eq!(imported[0].identity, created.identity);
}

#[tokio::test]
async fn identity_survives_in_place_update() {
    let engine = engine(Arc::new(Backend::new())).await;
    let created = engine
        .create(
            "framework_identity",
            engine.resource_config("framework_identity", &[("name", Value::from("alpha"))]),
        )
        .await
        .unwrap();

    let updated = engine
        .update(
            &created,
            engine.resource_config("framework_identity", &[("name", Value::from("beta"))]),
        )
        .await
        .unwrap();
    assert_eq!(updated.state.get_attr("id"), created.state.get_attr("id"));
    assert_eq!(updated.state.get_attr("name"), Some(&Value::from("beta")));
    assert_eq!(updated.identity, created.identity);
}

#[tokio::test]
async fn float32_values_settle_without_drift() {
    let engine = engine(Arc::new(Backend::new())).await;
    let number: Value = "1.1".parse().unwrap();
    let config = engine.resource_config("framework_float32", &[("number", number)]);

    let created = engine.create("framework_float32", config.clone()).await.unwrap();
    let plan = engine.plan("framework_float32", Some(&created), &config).await;
    assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);
    assert_eq!(plan.planned, created.state);
}

#[tokio::test]
async fn ip_addresses_compare_canonically() {
    let engine = engine(Arc::new(Backend::new())).await;
    let addresses = |items: &[&str]| {
        Value::set(
            Type::String,
            items.iter().map(|a| Value::from(*a)).collect(),
        )
    };
    let config = engine.resource_config(
        "framework_ip_set",
        &[("addresses", addresses(&["0:0:0:0:0:0:0:1", "10.0.0.1"]))],
    );

    let created = engine.create("framework_ip_set", config.clone()).await.unwrap();
    let plan = engine.plan("framework_ip_set", Some(&created), &config).await;
    assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);
    assert_eq!(plan.planned, created.state);

    let invalid = engine
        .validate(
            "framework_ip_set",
            &engine.resource_config("framework_ip_set", &[("addresses", addresses(&["nope"]))]),
        )
        .await;
    assert_eq!(summaries(&invalid), vec!["Invalid IP Address Value".to_string()]);
}

#[tokio::test]
async fn unknown_config_is_deferred_when_allowed() {
    let server = plugkit::framework::server(CornerProvider::default())
        .await
        .unwrap();
    let engine = Engine::start(Arc::new(server)).await.with_deferral();
    engine.configure(engine.provider_config(&[])).await;
    let config = engine.resource_config(
        "framework_deferred",
        &[("name", Value::unknown(Type::String))],
    );

    let plan = engine.plan("framework_deferred", None, &config).await;
    assert!(!plan.diagnostics.has_errors());
    assert_eq!(
        plan.deferred.map(|d| d.reason),
        Some(DeferredReason::ResourceConfigUnknown)
    );
}

#[tokio::test]
async fn unknown_provider_config_defers_every_plan() {
    let server = plugkit::framework::server(CornerProvider::default())
        .await
        .unwrap();
    let engine = Engine::start(Arc::new(server)).await.with_deferral();
    let configured = engine
        .configure(engine.provider_config(&[("renew_interval", Value::unknown(Type::String))]))
        .await;
    assert!(!configured.diagnostics.has_errors());

    let config = engine.resource_config("framework_deferred", &[("name", Value::from("x"))]);
    let plan = engine.plan("framework_deferred", None, &config).await;
    assert_eq!(
        plan.deferred.map(|d| d.reason),
        Some(DeferredReason::ProviderConfigUnknown)
    );
}

#[tokio::test]
async fn unknown_provider_config_fails_without_deferral() {
    let server = plugkit::framework::server(CornerProvider::default())
        .await
        .unwrap();
    let engine = Engine::start(Arc::new(server)).await;
    let configured = engine
        .configure(engine.provider_config(&[("renew_interval", Value::unknown(Type::String))]))
        .await;
    assert_eq!(
        summaries(&configured.diagnostics),
        vec!["Unknown Provider Configuration".to_string()]
    );
}

#[tokio::test]
async fn create_timeout_cancels_slow_create() {
    let engine = engine(Arc::new(Backend::new())).await;
    let config = engine.resource_config(
        "framework_timeouts",
        &[
            ("create_duration", Value::from("5s")),
            (
                "timeouts",
                Value::object([
                    ("create", Value::from("50ms")),
                    ("delete", Value::null(Type::String)),
                ]),
            ),
        ],
    );

    let started = std::time::Instant::now();
    let err = engine.create("framework_timeouts", config).await.unwrap_err();
    assert!(err.has_errors());
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}
