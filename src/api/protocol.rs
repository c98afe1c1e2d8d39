/*!
 * Unit Wire Protocol
 *
 * Execution units post three kinds of messages:
 * - a JSON object with `command` and `id`: a request, answered with
 *   `{"<id>": body}`
 * - a string starting with the TTY prefix: standard output
 * - a string starting with `exited`: termination, as `exited:<code>`
 *
 * Anything else is reported as unexpected and ignored by the kernel.
 */

use super::request::Request;
use crate::core::limits::{EXIT_MESSAGE, TTY_PREFIX};
use crate::core::types::{ExitCode, Pgid, Pid};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Request id chosen by the unit; echoed back as the reply key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Num(i64),
    Text(String),
}

impl RequestId {
    /// Key of the reply object
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Num(n) => write!(f, "{}", n),
            RequestId::Text(s) => f.write_str(s),
        }
    }
}

/// Requests a unit may issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UnitCommand {
    Spawn {
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        envs: Vec<String>,
        #[serde(default)]
        cwd: String,
        /// Inline manifest; units send it as `nmf`
        #[serde(default, alias = "nmf", skip_serializing_if = "Option::is_none")]
        manifest: Option<Value>,
    },
    Wait {
        pid: Pid,
        #[serde(default)]
        options: u32,
    },
    Getpgid {
        #[serde(default, deserialize_with = "lenient_int")]
        pid: Option<Pid>,
    },
    Setpgid {
        #[serde(default, deserialize_with = "lenient_int")]
        pid: Option<Pid>,
        #[serde(default, deserialize_with = "lenient_int")]
        pgid: Option<Pgid>,
    },
    Getsid {
        #[serde(default, deserialize_with = "lenient_int")]
        pid: Option<Pid>,
    },
    Setsid,
    Pipe,
}

impl UnitCommand {
    pub fn into_request(self) -> Request {
        match self {
            UnitCommand::Spawn {
                args,
                envs,
                cwd,
                manifest,
            } => Request::Spawn {
                argv: args,
                envs,
                cwd,
                manifest,
            },
            UnitCommand::Wait { pid, options } => Request::Wait { pid, options },
            UnitCommand::Getpgid { pid } => Request::GetPgid { pid },
            UnitCommand::Setpgid { pid, pgid } => Request::SetPgid { pid, pgid },
            UnitCommand::Getsid { pid } => Request::GetSid { pid },
            UnitCommand::Setsid => Request::SetSid,
            UnitCommand::Pipe => Request::Pipe,
        }
    }
}

/// A decoded unit message
#[derive(Debug, Clone, PartialEq)]
pub enum UnitInbound {
    Request { id: RequestId, command: UnitCommand },
    Stdout(String),
    Exited(ExitCode),
    Unexpected(Value),
}

/// Decode a message posted by a unit
pub fn decode(payload: Value) -> UnitInbound {
    if payload.get("command").is_some() {
        let id = payload
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<RequestId>(id).ok());
        return match (id, serde_json::from_value::<UnitCommand>(payload.clone())) {
            (Some(id), Ok(command)) => UnitInbound::Request { id, command },
            _ => UnitInbound::Unexpected(payload),
        };
    }

    if let Some(text) = payload.as_str() {
        if let Some(out) = text.strip_prefix(TTY_PREFIX) {
            return UnitInbound::Stdout(out.to_string());
        }
        if text.starts_with(EXIT_MESSAGE) {
            let code = text
                .split(':')
                .nth(1)
                .and_then(parse_leading_int)
                .unwrap_or(0);
            return UnitInbound::Exited(code);
        }
    }
    UnitInbound::Unexpected(payload)
}

/// Integer prefix of `text`, ignoring leading whitespace (`" 7abc"` is 7)
pub fn parse_leading_int(text: &str) -> Option<i32> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    let value: i64 = digits[..end].parse().ok()?;
    let value = if negative { -value } else { value };
    i32::try_from(value).ok()
}

/// Accepts numbers and numeric strings; anything unusable (or zero) is `None`
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Some(Value::String(s)) => parse_leading_int(&s),
        _ => None,
    };
    Ok(parsed.filter(|n| *n != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_requests() {
        let inbound = decode(json!({"command": "wait", "id": 3, "pid": -1, "options": 1}));
        assert_eq!(
            inbound,
            UnitInbound::Request {
                id: RequestId::Num(3),
                command: UnitCommand::Wait { pid: -1, options: 1 }
            }
        );

        let inbound = decode(json!({"command": "setpgid", "id": "a", "pid": "5", "pgid": null}));
        assert_eq!(
            inbound,
            UnitInbound::Request {
                id: RequestId::Text("a".to_string()),
                command: UnitCommand::Setpgid { pid: Some(5), pgid: None }
            }
        );
    }

    #[test]
    fn spawn_takes_inline_manifest_as_nmf() {
        let nmf = json!({"program": {"x86-64": {"url": "sh.nexe"}}});
        let inbound = decode(json!({
            "command": "spawn",
            "id": 9,
            "args": ["sh"],
            "nmf": nmf.clone(),
        }));
        let UnitInbound::Request { command, .. } = inbound else {
            panic!("expected a request, got {:?}", inbound);
        };
        assert_eq!(
            command,
            UnitCommand::Spawn {
                args: vec!["sh".to_string()],
                envs: vec![],
                cwd: String::new(),
                manifest: Some(nmf),
            }
        );
    }

    #[test]
    fn unknown_commands_and_missing_ids_are_unexpected() {
        assert!(matches!(
            decode(json!({"command": "fork", "id": 1})),
            UnitInbound::Unexpected(_)
        ));
        assert!(matches!(
            decode(json!({"command": "setsid"})),
            UnitInbound::Unexpected(_)
        ));
        assert!(matches!(decode(json!(42)), UnitInbound::Unexpected(_)));
        assert!(matches!(decode(json!("hello")), UnitInbound::Unexpected(_)));
    }

    #[test]
    fn decodes_stdout_and_exit_strings() {
        assert_eq!(
            decode(json!("proc_ttyhello\n")),
            UnitInbound::Stdout("hello\n".to_string())
        );
        assert_eq!(decode(json!("exited:7")), UnitInbound::Exited(7));
        assert_eq!(decode(json!("exited:-2")), UnitInbound::Exited(-2));
        assert_eq!(decode(json!("exited:abc")), UnitInbound::Exited(0));
        assert_eq!(decode(json!("exited")), UnitInbound::Exited(0));
    }

    #[test]
    fn leading_int_parse() {
        assert_eq!(parse_leading_int("12abc"), Some(12));
        assert_eq!(parse_leading_int("  -4"), Some(-4));
        assert_eq!(parse_leading_int("x1"), None);
        assert_eq!(parse_leading_int("99999999999"), None);
    }

    #[test]
    fn request_id_is_reply_key() {
        assert_eq!(RequestId::Num(12).key(), "12");
        assert_eq!(RequestId::Text("r1".to_string()).key(), "r1");
    }
}
