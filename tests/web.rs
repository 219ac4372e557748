//! 浏览器端 JSON 桥接测试。
#![cfg(target_arch = "wasm32")]

use serde_json::Value;
use wasm_bindgen_test::*;

use tower_clash::GameEngine;

wasm_bindgen_test_configure!(run_in_browser);

fn engine() -> GameEngine {
    GameEngine::new(None, r#"["Ada", "Bo"]"#, 1, Some(42)).expect("bundled rules start a game")
}

#[wasm_bindgen_test]
fn new_game_deals_starting_hands() {
    let engine = engine();
    let state: Value = serde_json::from_str(&engine.state_json().expect("state serialises"))
        .expect("valid json");
    assert_eq!(state["players"][0]["hand"].as_array().map(Vec::len), Some(6));
    assert_eq!(state["phase"], "AwaitingDraw");
}

#[wasm_bindgen_test]
fn turn_round_trip_reports_events() {
    let mut engine = engine();
    let begun: Value =
        serde_json::from_str(&engine.begin_turn().expect("draw")).expect("valid json");
    assert_eq!(begun["events"][0]["type"], "TurnStarted");

    let ended: Value = serde_json::from_str(&engine.end_turn().expect("end")).expect("valid json");
    assert!(ended["events"]
        .as_array()
        .expect("events array")
        .iter()
        .any(|event| event["type"] == "TurnEnded"));
    assert_eq!(engine.current_player(), 1);
}

#[wasm_bindgen_test]
fn rejected_actions_surface_as_errors() {
    let mut engine = engine();
    assert!(engine.end_turn().is_err());
    assert!(GameEngine::new(None, r#"["Solo"]"#, 1, None).is_err());
}

#[wasm_bindgen_test]
fn ai_move_applies_a_decision() {
    let mut engine = engine();
    engine.begin_turn().expect("draw");
    let response: Value = serde_json::from_str(
        &engine
            .ai_move(0, Some("normal".into()), None)
            .expect("ai move"),
    )
    .expect("valid json");
    assert!(response["decision"]["action"].is_object());
    assert!(response["applied"].is_object());
}
