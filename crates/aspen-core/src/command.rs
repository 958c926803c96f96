//! MDM command and command-report types.

use crate::{Enrollment, ParseError};

/// An MDM command targeting enrollments.
///
/// The plist bytes are opaque to the server apart from the UUID and
/// request type extracted at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Globally unique command identifier.
    pub command_uuid: String,
    /// The command's RequestType (e.g. "DeviceInformation").
    pub request_type: String,
    /// Raw command plist, returned verbatim to polling devices.
    pub raw: Vec<u8>,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommandEnvelope {
    #[serde(rename = "CommandUUID")]
    command_uuid: String,
    command: CommandBody,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommandBody {
    request_type: String,
}

impl Command {
    /// Parse a raw command plist, extracting UUID and request type.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let envelope: CommandEnvelope =
            plist::from_bytes(raw).map_err(|e| ParseError::new(raw, e))?;
        Ok(Self {
            command_uuid: envelope.command_uuid,
            request_type: envelope.command.request_type,
            raw: raw.to_vec(),
        })
    }

    /// Build a minimal command plist for the given request type with a
    /// fresh UUID.
    pub fn new(request_type: &str) -> Self {
        let envelope = CommandEnvelope {
            command_uuid: uuid::Uuid::new_v4().to_string(),
            command: CommandBody {
                request_type: request_type.to_string(),
            },
        };
        let mut raw = Vec::new();
        plist::to_writer_xml(&mut raw, &envelope)
            .unwrap_or_else(|e| unreachable!("command envelope serialization: {e}"));
        Self {
            command_uuid: envelope.command_uuid,
            request_type: envelope.command.request_type,
            raw,
        }
    }
}

/// Command execution status reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CommandStatus {
    /// Executed successfully.
    Acknowledged,
    /// Failed.
    Error,
    /// Malformed command.
    CommandFormatError,
    /// Device busy; eligible for redelivery.
    NotNow,
    /// Idle poll, no command result attached.
    Idle,
}

impl CommandStatus {
    /// Terminal statuses take a command out of the queue permanently.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Acknowledged | Self::Error | Self::CommandFormatError)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Acknowledged => "Acknowledged",
            Self::Error => "Error",
            Self::CommandFormatError => "CommandFormatError",
            Self::NotNow => "NotNow",
            Self::Idle => "Idle",
        };
        f.write_str(s)
    }
}

/// Command results report from a device poll.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandResults {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// UUID of the command being reported; empty on idle polls.
    #[serde(default, rename = "CommandUUID")]
    pub command_uuid: String,

    /// Execution status.
    pub status: CommandStatus,

    /// Error chain for failed commands.
    #[serde(default)]
    pub error_chain: Vec<ErrorChainItem>,

    /// Raw report for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// One entry of a device-reported error chain.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorChainItem {
    pub error_code: i64,

    pub error_domain: String,

    #[serde(default)]
    pub localized_description: Option<String>,

    #[serde(default, rename = "USEnglishDescription")]
    pub us_english_description: Option<String>,
}

/// Parse a command-results report from plist bytes, retaining the raw
/// body.
pub fn parse_command_results(data: &[u8]) -> Result<CommandResults, ParseError> {
    let mut results: CommandResults =
        plist::from_bytes(data).map_err(|e| ParseError::new(data, e))?;
    results.raw = data.to_vec();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_roundtrip() {
        let cmd = Command::new("DeviceInformation");
        let parsed = Command::parse(&cmd.raw).unwrap();
        assert_eq!(parsed, cmd);
        assert_eq!(parsed.request_type, "DeviceInformation");
    }

    #[test]
    fn distinct_uuids() {
        assert_ne!(
            Command::new("DeviceLock").command_uuid,
            Command::new("DeviceLock").command_uuid
        );
    }

    #[test]
    fn parse_idle_results() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>UDID</key>
    <string>AAA</string>
    <key>Status</key>
    <string>Idle</string>
</dict>
</plist>"#;
        let results = parse_command_results(xml.as_bytes()).unwrap();
        assert_eq!(results.status, CommandStatus::Idle);
        assert!(results.command_uuid.is_empty());
        assert_eq!(results.raw, xml.as_bytes());
    }

    #[test]
    fn terminal_statuses() {
        assert!(CommandStatus::Acknowledged.is_terminal());
        assert!(CommandStatus::Error.is_terminal());
        assert!(CommandStatus::CommandFormatError.is_terminal());
        assert!(!CommandStatus::NotNow.is_terminal());
        assert!(!CommandStatus::Idle.is_terminal());
    }
}
