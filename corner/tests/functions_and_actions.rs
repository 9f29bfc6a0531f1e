#![allow(clippy::disallowed_methods)]

mod support;

use corner::backend::Event;
use corner::{Backend, CornerProvider};
use plugkit::{Type, Value};
use std::sync::Arc;
use support::{summaries, Engine};

async fn engine(backend: Arc<Backend>) -> Engine {
    let server = plugkit::framework::server(CornerProvider::new(backend))
        .await
        .unwrap();
    let engine = Engine::start(Arc::new(server)).await;
    engine.configure(engine.provider_config(&[])).await;
    engine
}

fn result(engine: &Engine, name: &str, response: plugkit::protocol::CallFunctionResponse) -> Value {
    assert_eq!(response.error, None);
    response
        .result
        .unwrap()
        .decode(&engine.function_return_type(name))
        .unwrap()
}

#[tokio::test]
async fn bool_function_echoes() {
    let engine = engine(Arc::new(Backend::new())).await;
    let response = engine.call("bool", vec![Value::from(true)]).await;
    assert_eq!(result(&engine, "bool", response), Value::from(true));
}

#[tokio::test]
async fn concat_takes_a_variadic_tail() {
    let engine = engine(Arc::new(Backend::new())).await;
    let response = engine
        .call(
            "concat",
            vec![Value::from("-"), Value::from("a"), Value::from("b"), Value::from("c")],
        )
        .await;
    assert_eq!(result(&engine, "concat", response), Value::from("a-b-c"));

    let response = engine.call("concat", vec![Value::from("-")]).await;
    assert_eq!(result(&engine, "concat", response), Value::from(""));
}

#[tokio::test]
async fn null_argument_is_rejected_for_strict_parameters() {
    let engine = engine(Arc::new(Backend::new())).await;
    let response = engine.call("bool", vec![Value::null(Type::Bool)]).await;
    let error = response.error.unwrap();
    assert_eq!(error.function_argument, Some(0));
}

#[tokio::test]
async fn float32_function_rounds_through_single_precision() {
    let engine = engine(Arc::new(Backend::new())).await;
    let response = engine.call("float32", vec!["0.5".parse().unwrap()]).await;
    assert_eq!(
        result(&engine, "float32", response),
        "0.5".parse::<Value>().unwrap()
    );

    let response = engine.call("float32", vec!["1e40".parse().unwrap()]).await;
    assert_eq!(response.error.unwrap().function_argument, Some(0));
}

#[tokio::test]
async fn notify_reports_progress_in_order() {
    let backend = Arc::new(Backend::new());
    let engine = engine(backend.clone()).await;
    let outcome = engine
        .invoke(
            "framework_notify",
            Value::object([
                ("message", Value::from("deploying")),
                ("steps", Value::from(2_i64)),
            ]),
        )
        .await;

    assert!(outcome.completed);
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    assert_eq!(
        outcome.progress,
        vec!["deploying (1/2)".to_string(), "deploying (2/2)".to_string()]
    );
    assert_eq!(
        backend.events().await,
        vec![
            Event::Progress("deploying (1/2)".to_string()),
            Event::Progress("deploying (2/2)".to_string()),
        ]
    );
}

#[tokio::test]
async fn notify_defaults_its_step_count() {
    let engine = engine(Arc::new(Backend::new())).await;
    let outcome = engine
        .invoke(
            "framework_notify",
            Value::object([
                ("message", Value::from("hi")),
                ("steps", Value::null(Type::Number)),
            ]),
        )
        .await;
    assert_eq!(outcome.progress.len(), 3);
}

#[tokio::test]
async fn notify_rejects_blank_message() {
    let engine = engine(Arc::new(Backend::new())).await;
    let outcome = engine
        .invoke(
            "framework_notify",
            Value::object([
                ("message", Value::from("  ")),
                ("steps", Value::null(Type::Number)),
            ]),
        )
        .await;
    assert!(!outcome.completed);
    assert_eq!(summaries(&outcome.diagnostics), vec!["Empty Message".to_string()]);
}
