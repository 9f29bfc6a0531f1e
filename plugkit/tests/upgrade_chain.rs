#![allow(clippy::disallowed_methods)]

use plugkit::framework::UpgradeChain;
use plugkit::protocol::RawState;
use plugkit::{Type, Value};
use proptest::prelude::*;

const CURRENT: i64 = 4;

fn history_type() -> Type {
    Type::object([("history", Type::list(Type::String))])
}

fn history(entries: &[String]) -> Value {
    Value::object([(
        "history",
        Value::list(
            Type::String,
            entries.iter().map(|e| Value::string(e.clone())).collect(),
        ),
    )])
}

fn entries(value: &Value) -> Vec<String> {
    value
        .get_attr("history")
        .and_then(Value::elements)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Every step appends the version it upgraded from.
fn chain() -> UpgradeChain {
    (0..CURRENT).fold(UpgradeChain::new(), |chain, version| {
        chain.step(version, history_type(), move |value| {
            let mut seen = entries(&value);
            seen.push(format!("v{}", version));
            Ok(history(&seen))
        })
    })
}

proptest! {
    #[test]
    fn running_in_pieces_matches_running_at_once(
        (a, b, c) in (0..=CURRENT, 0..=CURRENT, 0..=CURRENT).prop_map(|(x, y, z)| {
            let mut v = [x, y, z];
            v.sort();
            (v[0], v[1], v[2])
        })
    ) {
        let chain = chain();
        let start = history(&[]);
        let whole = chain.run(start.clone(), a, c).unwrap();
        let first = chain.run(start, a, b).unwrap();
        let pieces = chain.run(first, b, c).unwrap();
        prop_assert_eq!(&pieces, &whole);

        let expected: Vec<String> = (a..c).map(|v| format!("v{}", v)).collect();
        prop_assert_eq!(entries(&whole), expected);
    }
}

#[test]
fn stored_state_is_upgraded_to_the_current_version() {
    let raw = RawState {
        json: Some(br#"{"history":["initial"],"retired":true}"#.to_vec()),
        ..Default::default()
    };
    let upgraded = chain()
        .upgrade(&raw, 1, CURRENT, &history_type())
        .unwrap();
    assert_eq!(entries(&upgraded), vec!["initial", "v1", "v2", "v3"]);
}

#[test]
fn missing_step_is_reported() {
    let chain = UpgradeChain::new().step(0, history_type(), |v| Ok(v));
    let errors = chain.run(history(&[]), 0, 2).unwrap_err();
    assert_eq!(
        errors.errors().next().unwrap().summary,
        "Missing State Upgrader"
    );
}
