//! The `category` query parameter: engine selection and ranking weights,
//! serialized as JSON and base64 encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use searchbot_core::config::EngineConfig;
use serde_json::{json, Map, Value};

/// Engine selection and scoring document sent with every search
pub fn category_json(engines: &[EngineConfig]) -> Value {
    let mut selection = Map::new();
    let mut weights = Map::new();

    for engine in engines {
        selection.insert(
            engine.name.clone(),
            json!({
                "enabled": engine.enabled,
                "required": engine.required,
                "requiredbyorigin": engine.required_by_origin,
                "preferred": engine.preferred,
                "preferredbyorigin": engine.preferred_by_origin,
            }),
        );
        weights.insert(
            engine.name.clone(),
            json!({
                "mul": engine.weight,
                "add": engine.offset,
            }),
        );
    }

    json!({
        "engines": selection,
        "ranking": {
            "rankexp": 0.5,
            "rankmul": 1,
            "rankconst": 0,
            "rankscoremul": 1,
            "rankscoreadd": 0,
            "timesreturnedmul": 1,
            "timesreturnedadd": 0,
            "timesreturnedscoremul": 1,
            "timesreturnedscoreadd": 0,
            "engines": weights,
        },
        "timings": {
            "preferredtimeout": "500",
            "hardtimeout": "1500",
        },
    })
}

/// Base64 of [`category_json`]
pub fn build_category(engines: &[EngineConfig]) -> String {
    STANDARD.encode(category_json(engines).to_string())
}
