pub mod ai;
pub mod game;
pub mod utils;

use gloo_timers::future::TimeoutFuture;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{AiAgent, AiConfig, AiDecision, AiDifficulty, AiReason, AiStrategy};
pub use game::{
    classify, Card, ComboKind, CommandAction, ConfigError, GameAction, GameEvent, GameState,
    IntegrityError, PlayComboAction, Player, PlayerId, PublicDiamond, Rank, RuleEngine, RuleError,
    RuleResolution, RulesConfig, SkipCycleAction, Suit, SwapAction, TurnPhase,
};
use utils::{console_log, console_warn, set_panic_hook};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error<E: Serialize + std::fmt::Display>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn make_resolution_json(resolution: &RuleResolution) -> Result<String, JsValue> {
    serde_json::to_string(resolution).map_err(serde_to_js_error)
}

fn build_config(difficulty: Option<&str>, strategy: Option<&str>) -> AiConfig {
    let diff = difficulty
        .and_then(|value| AiDifficulty::from_str(value).ok())
        .unwrap_or(AiDifficulty::Normal);
    let mut config = AiConfig::from_difficulty(diff);
    if let Some(strategy) = strategy.and_then(|value| AiStrategy::from_str(value).ok()) {
        config = config.with_strategy(strategy);
    }
    config
}

fn load_rules(rules_json: Option<String>) -> Result<RulesConfig, JsValue> {
    match rules_json {
        Some(json) => RulesConfig::from_json(&json).map_err(to_js_error),
        None => RulesConfig::bundled().map_err(to_js_error),
    }
}

#[derive(Serialize)]
struct SkipCycleResponse {
    resolution: RuleResolution,
    discarded: Card,
    #[serde(skip_serializing_if = "Option::is_none")]
    drawn: Option<Card>,
    may_repeat: bool,
}

#[derive(Serialize)]
struct AiMoveResponse {
    decision: AiDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<RuleResolution>,
}

/// 前端持有的一局游戏：规则引擎加上当前状态。
#[wasm_bindgen]
pub struct GameEngine {
    engine: RuleEngine,
    state: GameState,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(
        rules_json: Option<String>,
        names_json: &str,
        deck_copies: u8,
        seed: Option<u64>,
    ) -> Result<GameEngine, JsValue> {
        let rules = load_rules(rules_json)?;
        let names: Vec<String> = serde_json::from_str(names_json).map_err(serde_to_js_error)?;
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let mut engine = RuleEngine::with_rng(rules, rng);
        let state = engine
            .start_game(&names, deck_copies)
            .map_err(to_js_error)?;
        console_log(&format!(
            "Tower Clash 对局已创建：{} 名玩家，{} 张牌",
            names.len(),
            state.expected_cards
        ));
        Ok(GameEngine { engine, state })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    /// 载入外部状态，载入前先做完整性校验。
    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        state
            .integrity_check()
            .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
        self.state = state;
        Ok(())
    }

    pub fn winner(&self) -> Option<u8> {
        self.state.winner
    }

    pub fn current_player(&self) -> u8 {
        self.state.current_player_id()
    }

    pub fn begin_turn(&mut self) -> Result<String, JsValue> {
        let events = self
            .engine
            .begin_turn(&mut self.state)
            .map_err(to_js_error)?;
        self.resolution_json(events)
    }

    pub fn play_combo_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: PlayComboAction =
            serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        self.apply_and_resolve(GameAction::PlayCombo { action })
    }

    pub fn command_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: CommandAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        self.apply_and_resolve(GameAction::Command { action })
    }

    pub fn swap_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: SwapAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        self.apply_and_resolve(GameAction::Swap { action })
    }

    pub fn skip_cycle_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: SkipCycleAction =
            serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let outcome = self
            .engine
            .skip_cycle(&mut self.state, action)
            .map_err(to_js_error)?;
        let response = SkipCycleResponse {
            resolution: RuleResolution::new(self.state.clone(), outcome.events),
            discarded: outcome.discarded,
            drawn: outcome.drawn,
            may_repeat: outcome.may_repeat,
        };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    pub fn claim_jackpot(&mut self, player_id: u8) -> Result<String, JsValue> {
        self.apply_and_resolve(GameAction::Jackpot { player_id })
    }

    pub fn end_turn(&mut self) -> Result<String, JsValue> {
        self.apply_and_resolve(GameAction::EndTurn)
    }

    pub fn apply_action_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: GameAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        self.apply_and_resolve(action)
    }

    pub fn ai_move(
        &mut self,
        player_id: u8,
        difficulty: Option<String>,
        strategy: Option<String>,
    ) -> Result<String, JsValue> {
        let config = build_config(difficulty.as_deref(), strategy.as_deref());
        let mut agent = AiAgent::new(config);
        let decision = agent.decide_action(&self.engine, &self.state, player_id);

        let applied = match decision.action.clone() {
            Some(action) => {
                let events = self
                    .engine
                    .apply(&mut self.state, action)
                    .map_err(to_js_error)?;
                Some(RuleResolution::new(self.state.clone(), events))
            }
            None => None,
        };

        let response = AiMoveResponse { decision, applied };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    pub fn think_ai(
        &self,
        player_id: u8,
        difficulty: Option<String>,
        strategy: Option<String>,
        delay_ms: Option<u32>,
    ) -> Promise {
        let state = self.state.clone();
        let rules = self.engine.rules().clone();
        let config = build_config(difficulty.as_deref(), strategy.as_deref());
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let engine = RuleEngine::from_config(rules);
            let mut agent = AiAgent::new(config);
            let decision = agent.decide_action(&engine, &state, player_id);
            let json = serde_json::to_string(&decision).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }

    fn resolution_json(&self, events: Vec<GameEvent>) -> Result<String, JsValue> {
        let resolution = RuleResolution::new(self.state.clone(), events);
        if let Some(winner) = resolution.winner {
            console_log(&format!("玩家 {winner} 获胜"));
        }
        make_resolution_json(&resolution)
    }

    fn apply_and_resolve(&mut self, action: GameAction) -> Result<String, JsValue> {
        match self.engine.apply(&mut self.state, action) {
            Ok(events) => self.resolution_json(events),
            Err(error) => {
                console_warn(&error.to_string());
                Err(to_js_error(error))
            }
        }
    }
}

/// 返回内置的标准规则。
#[wasm_bindgen(js_name = "defaultRules")]
pub fn default_rules() -> Result<JsValue, JsValue> {
    let rules = RulesConfig::bundled().map_err(to_js_error)?;
    to_value(&rules).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "parseRules")]
pub fn parse_rules(json: &str) -> Result<JsValue, JsValue> {
    let rules = RulesConfig::from_json(json).map_err(to_js_error)?;
    to_value(&rules).map_err(JsValue::from)
}

/// 判断一组牌构成哪种连招，不成立时返回 null。
#[wasm_bindgen(js_name = "classifyCards")]
pub fn classify_cards(cards: JsValue) -> Result<JsValue, JsValue> {
    let cards: Vec<Card> = from_value(cards).map_err(JsValue::from)?;
    to_value(&classify(&cards)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}
