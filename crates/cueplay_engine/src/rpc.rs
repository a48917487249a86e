// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON request dispatch.
//!
//! A request names a command and carries its arguments as a JSON object.
//! Mutating commands go through [`Engine::execute`]; a few read-only queries
//! are answered directly.

use crate::commands::Command;
use crate::engine::Engine;
use crate::error::EngineError;
use cueplay_timeline::{GroupId, RundownId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Read-only queries understood next to [`Command::NAMES`]
pub const QUERIES: &[&str] = &["get_playhead", "get_rundown", "get_project", "get_app_data"];

/// Errors returned to RPC callers
#[derive(Debug, Error)]
pub enum RpcError {
    /// No command or query with this name
    #[error("Unknown command \"{0}\"")]
    UnknownCommand(String),

    /// Arguments did not match the command
    #[error("Invalid arguments for \"{command}\": {source}")]
    InvalidArgs {
        /// Command name
        command: String,
        /// Decoding error
        source: serde_json::Error,
    },

    /// The engine rejected the command
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// One line of input
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    /// Echoed back in the response
    #[serde(default)]
    pub id: Value,
    /// Command or query name
    pub command: String,
    /// Arguments object
    #[serde(default)]
    pub args: Value,
}

/// One line of output
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    /// Id of the request
    pub id: Value,
    /// Result value, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message when the request failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Response to `request` from the dispatch outcome
    pub fn new(request: &Request, outcome: Result<Option<Value>, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self {
                id: request.id.clone(),
                result,
                error: None,
            },
            Err(err) => Self {
                id: request.id.clone(),
                result: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupArgs {
    rundown_id: RundownId,
    group_id: GroupId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RundownArgs {
    rundown_id: RundownId,
}

fn parse<T: serde::de::DeserializeOwned>(name: &str, args: Value) -> Result<T, RpcError> {
    serde_json::from_value(args).map_err(|source| RpcError::InvalidArgs {
        command: name.to_string(),
        source,
    })
}

fn to_value(value: impl Serialize) -> Result<Option<Value>, RpcError> {
    Ok(Some(serde_json::to_value(value).map_err(EngineError::from)?))
}

/// Run the command or query `name` with `args`
pub fn dispatch(engine: &mut Engine, name: &str, args: Value) -> Result<Option<Value>, RpcError> {
    match name {
        "get_playhead" => {
            let args: GroupArgs = parse(name, args)?;
            to_value(engine.playhead(&args.rundown_id, &args.group_id)?)
        }
        "get_rundown" => {
            let args: RundownArgs = parse(name, args)?;
            to_value(engine.storage().rundown(&args.rundown_id)?)
        }
        "get_project" => to_value(engine.storage().project()),
        "get_app_data" => to_value(engine.app_data()),
        _ if Command::NAMES.contains(&name) => {
            let command: Command = parse(name, command_value(name, args))?;
            tracing::debug!("Dispatching {name}");
            Ok(engine.execute(command)?)
        }
        _ => Err(RpcError::UnknownCommand(name.to_string())),
    }
}

/// Wire form of a command; unit commands carry no `args`
fn command_value(name: &str, args: Value) -> Value {
    let empty = match &args {
        Value::Null => true,
        Value::Object(map) => map.is_empty() && matches!(name, "stop_all" | "undo" | "redo"),
        _ => false,
    };
    if empty {
        serde_json::json!({ "command": name })
    } else {
        serde_json::json!({ "command": name, "args": args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::device::TimelineOutput;
    use crate::notify::Broadcaster;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine() -> Engine {
        Engine::new(
            Arc::new(MemoryStorage::default()),
            Arc::new(Broadcaster::new(Duration::from_millis(20), 4)),
            Arc::new(TimelineOutput::new()),
            Arc::new(ManualClock::new(1000)),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_commands_and_queries() {
        let mut engine = engine();
        let id = dispatch(
            &mut engine,
            "new_rundown",
            json!({ "rundownId": "show", "name": "Show" }),
        )
        .unwrap();
        assert_eq!(id, Some(json!("show")));

        let created = dispatch(
            &mut engine,
            "new_part",
            json!({ "rundownId": "show", "part": { "id": "a", "name": "A", "duration": 500 } }),
        )
        .unwrap()
        .unwrap();
        assert_eq!(created["partId"], json!("a"));

        dispatch(
            &mut engine,
            "play_part",
            json!({ "rundownId": "show", "groupId": created["groupId"], "partId": "a" }),
        )
        .unwrap();
        let playhead = dispatch(
            &mut engine,
            "get_playhead",
            json!({ "rundownId": "show", "groupId": created["groupId"] }),
        )
        .unwrap()
        .unwrap();
        assert_eq!(playhead["playheads"]["a"]["offset"], json!(0));

        let app_data = dispatch(&mut engine, "get_app_data", Value::Null).unwrap().unwrap();
        assert_eq!(app_data["canUndo"], json!(true));
        dispatch(&mut engine, "undo", json!({})).unwrap();

        let rundown = dispatch(&mut engine, "get_rundown", json!({ "rundownId": "show" }))
            .unwrap()
            .unwrap();
        assert_eq!(rundown["groups"], json!([]));
    }

    #[test]
    fn test_errors() {
        let mut engine = engine();
        assert!(matches!(
            dispatch(&mut engine, "launch", Value::Null),
            Err(RpcError::UnknownCommand(_))
        ));
        assert!(matches!(
            dispatch(&mut engine, "play_part", json!({ "rundownId": 3 })),
            Err(RpcError::InvalidArgs { .. })
        ));
        assert!(matches!(
            dispatch(&mut engine, "get_rundown", json!({ "rundownId": "missing" })),
            Err(RpcError::Engine(EngineError::RundownNotFound(_)))
        ));
    }

    #[test]
    fn test_response_carries_error() {
        let request: Request =
            serde_json::from_str(r#"{"id": 7, "command": "redo"}"#).unwrap();
        let mut engine = engine();
        let outcome = dispatch(&mut engine, &request.command, request.args.clone());
        let response = serde_json::to_value(Response::new(&request, outcome)).unwrap();
        assert_eq!(response["id"], json!(7));
        assert!(response["error"].as_str().unwrap().contains("redo"));
    }
}
