use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// `type` of every command envelope.
pub const ENVELOPE_TYPE_CMD: &str = "cmd";
/// Switch the rig's video encoding. Args: `{"format": "MJPEG" | "YUV422"}`.
pub const CMD_CHANGE_FORMAT: &str = "change_format";
/// Ask the rig to shut down. Args: `{}`.
pub const CMD_SHUTDOWN: &str = "shutdown";

/// Command message exchanged on the control channel.
///
/// Serializes as `{"type":"cmd","command":"<name>","args":{...}}`, in that
/// field order. `command` and `args` are not interpreted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    #[serde(default = "empty_args")]
    pub args: Value,
}

/// Encodings the rig can stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VideoFormat {
    #[serde(rename = "MJPEG")]
    Mjpeg,
    #[serde(rename = "YUV422")]
    Yuv422,
}

impl VideoFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mjpeg => "MJPEG",
            Self::Yuv422 => "YUV422",
        }
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MJPEG" => Ok(Self::Mjpeg),
            "YUV422" => Ok(Self::Yuv422),
            other => Err(format!("unknown video format {other:?} (expected MJPEG or YUV422)")),
        }
    }
}

impl ControlEnvelope {
    /// Create a command envelope. `Value::Null` args become `{}`.
    pub fn command(name: impl Into<String>, args: Value) -> Self {
        Self {
            kind: ENVELOPE_TYPE_CMD.to_string(),
            command: name.into(),
            args: if args.is_null() { empty_args() } else { args },
        }
    }

    /// Create a `change_format` command.
    pub fn change_format(format: VideoFormat) -> Self {
        Self::command(CMD_CHANGE_FORMAT, json!({ "format": format }))
    }

    /// Create a `shutdown` command.
    pub fn shutdown() -> Self {
        Self::command(CMD_SHUTDOWN, empty_args())
    }

    /// True when `type` is `"cmd"`.
    pub fn is_command(&self) -> bool {
        self.kind == ENVELOPE_TYPE_CMD
    }

    /// Compact JSON text of this envelope.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse an envelope from JSON text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

fn empty_args() -> Value {
    Value::Object(Map::new())
}
