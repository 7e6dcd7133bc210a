// Command bridge: invoke a single store operation by name with a JSON payload

use crate::error::StoreError;
use crate::models::{NewLabel, NewTask, TaskPatch};
use crate::store::Store;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

/// Operations reachable through the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetTasks,
    GetTask,
    AddTask,
    UpdateTask,
    MarkCompleted,
    DeleteTask,
    AddLabel,
    GetLabel,
    GetLabels,
    DeleteLabel,
    LinkTaskLabel,
    GetTaskLabels,
    ClearTaskLabels,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::GetTasks,
        Command::GetTask,
        Command::AddTask,
        Command::UpdateTask,
        Command::MarkCompleted,
        Command::DeleteTask,
        Command::AddLabel,
        Command::GetLabel,
        Command::GetLabels,
        Command::DeleteLabel,
        Command::LinkTaskLabel,
        Command::GetTaskLabels,
        Command::ClearTaskLabels,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::GetTasks => "get_tasks",
            Command::GetTask => "get_task",
            Command::AddTask => "add_task",
            Command::UpdateTask => "update_task",
            Command::MarkCompleted => "mark_completed",
            Command::DeleteTask => "delete_task",
            Command::AddLabel => "add_label",
            Command::GetLabel => "get_label",
            Command::GetLabels => "get_labels",
            Command::DeleteLabel => "delete_label",
            Command::LinkTaskLabel => "link_task_label",
            Command::GetTaskLabels => "get_task_labels",
            Command::ClearTaskLabels => "clear_task_labels",
        }
    }
}

impl FromStr for Command {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, BridgeError> {
        Command::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| BridgeError::UnknownCommand(s.to_string()))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure of a bridged command
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Invalid payload for {command}: {source}")]
    InvalidPayload {
        command: Command,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize result of {command}: {source}")]
    Serialize {
        command: Command,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0:#}")]
    Config(eyre::Report),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BridgeError {
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::UnknownCommand(_) => "UNKNOWN_COMMAND",
            BridgeError::InvalidJson(_) | BridgeError::InvalidPayload { .. } => "INVALID_VALUE",
            BridgeError::Serialize { .. } => "SERIALIZE_ERROR",
            BridgeError::Config(_) => "INVALID_CONFIG",
            BridgeError::Store(e) => e.code().as_str(),
        }
    }

    /// Render as `{"error": {"code": .., "message": ..}}`
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct IdPayload {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TaskIdPayload {
    task_id: i64,
}

#[derive(Debug, Deserialize)]
struct LinkPayload {
    task_id: i64,
    label_id: i64,
}

#[derive(Debug, Deserialize)]
struct UpdatePayload {
    id: i64,
    #[serde(default)]
    updates: TaskPatch,
}

/// Parse the raw payload text handed to the bridge
pub fn parse_payload(raw: &str) -> Result<Value, BridgeError> {
    serde_json::from_str(raw).map_err(BridgeError::InvalidJson)
}

fn payload<T: DeserializeOwned>(command: Command, value: Value) -> Result<T, BridgeError> {
    serde_json::from_value(value).map_err(|source| BridgeError::InvalidPayload { command, source })
}

fn ok() -> Value {
    json!({ "ok": true })
}

/// Run one named command against the store and return its JSON result
pub fn dispatch(store: &mut Store, command: &str, args: Value) -> Result<Value, BridgeError> {
    let command: Command = command.parse()?;
    let started = Instant::now();

    let result = run(store, command, args);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => debug!(%command, elapsed_ms, "Command executed"),
        Err(e) => warn!(%command, elapsed_ms, code = e.code(), error = %e, "Command failed"),
    }
    result
}

fn run(store: &mut Store, command: Command, args: Value) -> Result<Value, BridgeError> {
    let value = match command {
        Command::GetTasks => serde_json::to_value(store.get_all_tasks()?),
        Command::GetTask => {
            let p: IdPayload = payload(command, args)?;
            serde_json::to_value(store.get_task(p.id)?)
        }
        Command::AddTask => {
            let new_task: NewTask = payload(command, args)?;
            Ok(json!({ "id": store.add_task(&new_task)? }))
        }
        Command::UpdateTask => {
            let p: UpdatePayload = payload(command, args)?;
            store.update_task(p.id, &p.updates)?;
            Ok(ok())
        }
        Command::MarkCompleted => {
            let p: IdPayload = payload(command, args)?;
            store.mark_completed(p.id)?;
            Ok(ok())
        }
        Command::DeleteTask => {
            let p: IdPayload = payload(command, args)?;
            store.delete_task(p.id)?;
            Ok(ok())
        }
        Command::AddLabel => {
            let new_label: NewLabel = payload(command, args)?;
            Ok(json!({ "id": store.add_label(&new_label)? }))
        }
        Command::GetLabel => {
            let p: IdPayload = payload(command, args)?;
            serde_json::to_value(store.get_label(p.id)?)
        }
        Command::GetLabels => serde_json::to_value(store.get_all_labels()?),
        Command::DeleteLabel => {
            let p: IdPayload = payload(command, args)?;
            store.delete_label(p.id)?;
            Ok(ok())
        }
        Command::LinkTaskLabel => {
            let p: LinkPayload = payload(command, args)?;
            store.link_task_label(p.task_id, p.label_id)?;
            Ok(ok())
        }
        Command::GetTaskLabels => {
            let p: TaskIdPayload = payload(command, args)?;
            serde_json::to_value(store.get_task_labels(p.task_id)?)
        }
        Command::ClearTaskLabels => {
            let p: TaskIdPayload = payload(command, args)?;
            Ok(json!({ "removed": store.clear_task_labels(p.task_id)? }))
        }
    };

    value.map_err(|source| BridgeError::Serialize { command, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn test_command_names_round_trip() {
        for command in Command::ALL {
            assert_eq!(command.name().parse::<Command>().unwrap(), command);
        }
    }

    #[test]
    fn test_unknown_command() {
        let mut store = store();
        let err = dispatch(&mut store, "drop_everything", json!({})).unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_COMMAND");
    }

    #[test]
    fn test_add_and_get_tasks() {
        let mut store = store();

        let result = dispatch(
            &mut store,
            "add_task",
            json!({"title": "Buy milk", "category": "Home", "priority": "1"}),
        )
        .unwrap();
        let id = result["id"].as_i64().unwrap();

        let tasks = dispatch(&mut store, "get_tasks", json!({})).unwrap();
        let tasks = tasks.as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["id"], json!(id));
        assert_eq!(tasks[0]["title"], json!("Buy milk"));
        assert_eq!(tasks[0]["completed"], json!(false));
        assert_eq!(tasks[0]["priority"], json!("1"));
    }

    #[test]
    fn test_add_task_errors_carry_store_codes() {
        let mut store = store();

        let err = dispatch(&mut store, "add_task", json!({"title": null})).unwrap_err();
        assert_eq!(err.code(), "INVALID_TITLE");

        let err = dispatch(&mut store, "add_task", json!({"title": "  "})).unwrap_err();
        assert_eq!(err.code(), "EMPTY_TITLE");

        let err = dispatch(&mut store, "add_task", json!({"title": "X", "priority": "99"})).unwrap_err();
        assert_eq!(err.code(), "INVALID_PRIORITY");
    }

    #[test]
    fn test_malformed_payload() {
        let mut store = store();

        let err = dispatch(&mut store, "get_task", json!({"id": "seven"})).unwrap_err();
        assert_eq!(err.code(), "INVALID_VALUE");

        let err = dispatch(&mut store, "link_task_label", json!({"task_id": 1})).unwrap_err();
        assert_eq!(err.code(), "INVALID_VALUE");
    }

    #[test]
    fn test_update_task() {
        let mut store = store();
        let id = dispatch(&mut store, "add_task", json!({"title": "Draft"})).unwrap()["id"]
            .as_i64()
            .unwrap();

        let result = dispatch(
            &mut store,
            "update_task",
            json!({"id": id, "updates": {"title": "Final", "completed": true, "bogus": 1}}),
        )
        .unwrap();
        assert_eq!(result, json!({"ok": true}));

        let task = dispatch(&mut store, "get_task", json!({"id": id})).unwrap();
        assert_eq!(task["title"], json!("Final"));
        assert_eq!(task["completed"], json!(true));

        let err = dispatch(&mut store, "update_task", json!({"id": id})).unwrap_err();
        assert_eq!(err.code(), "NO_UPDATES");

        let err = dispatch(&mut store, "update_task", json!({"id": id, "updates": {"completed": "yes"}})).unwrap_err();
        assert_eq!(err.code(), "INVALID_VALUE");
    }

    #[test]
    fn test_label_flow() {
        let mut store = store();

        let task = dispatch(&mut store, "add_task", json!({"title": "A"})).unwrap()["id"]
            .as_i64()
            .unwrap();
        let label = dispatch(&mut store, "add_label", json!({"name": "work", "color": "#123456"})).unwrap()["id"]
            .as_i64()
            .unwrap();

        dispatch(&mut store, "link_task_label", json!({"task_id": task, "label_id": label})).unwrap();
        let err = dispatch(&mut store, "link_task_label", json!({"task_id": task, "label_id": label})).unwrap_err();
        assert_eq!(err.code(), "LINK_EXISTS");

        let labels = dispatch(&mut store, "get_task_labels", json!({"task_id": task})).unwrap();
        assert_eq!(labels, json!([{"id": label, "name": "work", "color": "#123456"}]));

        let cleared = dispatch(&mut store, "clear_task_labels", json!({"task_id": task})).unwrap();
        assert_eq!(cleared, json!({"removed": 1}));

        dispatch(&mut store, "delete_label", json!({"id": label})).unwrap();
        let err = dispatch(&mut store, "get_label", json!({"id": label})).unwrap_err();
        assert_eq!(err.code(), "LABEL_NOT_FOUND");

        assert_eq!(dispatch(&mut store, "get_labels", json!({})).unwrap(), json!([]));
    }

    #[test]
    fn test_mark_completed_and_delete() {
        let mut store = store();
        let id = dispatch(&mut store, "add_task", json!({"title": "Done soon"})).unwrap()["id"]
            .as_i64()
            .unwrap();

        dispatch(&mut store, "mark_completed", json!({"id": id})).unwrap();
        assert_eq!(dispatch(&mut store, "get_task", json!({"id": id})).unwrap()["completed"], json!(true));

        dispatch(&mut store, "delete_task", json!({"id": id})).unwrap();
        let err = dispatch(&mut store, "delete_task", json!({"id": id})).unwrap_err();
        assert_eq!(err.code(), "TASK_NOT_FOUND");
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload(r#"{"id": 3}"#).unwrap(), json!({"id": 3}));

        for raw in ["{", "not json", "", "{'id': 1}"] {
            let err = parse_payload(raw).unwrap_err();
            assert_eq!(err.code(), "INVALID_VALUE", "payload {:?}", raw);
            assert_eq!(err.to_json()["error"]["code"], json!("INVALID_VALUE"));
        }
    }

    #[test]
    fn test_config_error_renders_as_json() {
        let temp = tempfile::TempDir::new().unwrap();
        let report = crate::Config::load(temp.path().join("missing.yml")).unwrap_err();

        let err = BridgeError::Config(report);
        assert_eq!(err.code(), "INVALID_CONFIG");

        let rendered = err.to_json();
        assert_eq!(rendered["error"]["code"], json!("INVALID_CONFIG"));
        assert!(rendered["error"]["message"].as_str().unwrap().contains("missing.yml"));
    }

    #[test]
    fn test_serialize_failure_code() {
        let source = serde_json::from_str::<Value>("{").unwrap_err();
        let err = BridgeError::Serialize {
            command: Command::GetTasks,
            source,
        };
        assert_eq!(err.code(), "SERIALIZE_ERROR");
        assert!(err.to_string().starts_with("Failed to serialize result of get_tasks"));
    }

    #[test]
    fn test_error_json_shape() {
        let err = BridgeError::from(StoreError::TaskNotFound(9999));
        assert_eq!(
            err.to_json(),
            json!({"error": {"code": "TASK_NOT_FOUND", "message": "Task 9999 not found"}})
        );
    }
}
