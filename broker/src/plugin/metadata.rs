//! Plugin Descriptor and Metadata Types
//!
//! Each plugin directory carries a `plugin.yaml` descriptor. Loading runs in
//! two phases: the file is first parsed into the loosely-typed
//! [`RawPluginDescriptor`] (every field optional), then
//! [`PluginMetadata::from_raw`] validates it and fills defaults explicitly.
//!
//! Rich UI field metadata for credentials and settings is derived from the
//! bare key lists at load time when the descriptor does not spell it out,
//! and cached on the metadata record.
//!
//! # Example descriptor
//! ```yaml
//! name: "Matrix"
//! protocol: "matrix"
//! version: "1.2.0"
//! executable:
//!   type: "node"
//!   command: ["node", "dist/index.js"]
//!   working_directory: "."
//! grpc:
//!   port: 50052
//!   health_check_timeout: 5
//!   startup_timeout: 30
//! capabilities:
//!   video_codecs: ["VP8", "H264"]
//!   audio_codecs: ["OPUS"]
//!   supported_resolutions:
//!     - { width: 1280, height: 720, framerate: 30 }
//!   webrtc_support: true
//!   features: ["encryption"]
//! required_credentials: ["homeserver", "user_id", "access_token"]
//! optional_settings: ["room_prefix"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{PluginError, PluginResult};

/// Name of the descriptor file inside each plugin directory
pub const DESCRIPTOR_FILE: &str = "plugin.yaml";

/// Upper bound for descriptor timeouts, in seconds
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Substrings that mark a credential key as secret
const SECRET_WORDS: [&str; 4] = ["password", "token", "secret", "key"];

// =============================================================================
// Typed metadata
// =============================================================================

/// Kind of executable a plugin ships as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutableKind {
    Node,
    Python,
    Binary,
}

/// How to launch the plugin process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableConfig {
    #[serde(rename = "type")]
    pub kind: ExecutableKind,
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// Working directory relative to the plugin directory
    pub working_directory: String,
}

/// Plugin gRPC endpoint settings
///
/// `port` is only a placeholder: the supervisor rewrites it with a freshly
/// allocated port on every launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcConfig {
    pub port: u16,
    /// Seconds; scales the number of startup health probes
    pub health_check_timeout: u64,
    /// Seconds; bound for callers waiting on a concurrent start
    pub startup_timeout: u64,
}

impl RpcConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout)
    }
}

/// Video resolution advertised by a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

/// Media capabilities advertised by a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilitiesConfig {
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
    pub supported_resolutions: Vec<ResolutionConfig>,
    /// Whether peer-to-peer media is supported
    pub webrtc_support: bool,
    pub features: Vec<String>,
}

/// UI field kind for a credential or setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    #[default]
    String,
    Password,
    Url,
    Integer,
    Boolean,
    Select,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "STRING"),
            FieldType::Password => write!(f, "PASSWORD"),
            FieldType::Url => write!(f, "URL"),
            FieldType::Integer => write!(f, "INTEGER"),
            FieldType::Boolean => write!(f, "BOOLEAN"),
            FieldType::Select => write!(f, "SELECT"),
        }
    }
}

/// Credential or setting field with UI metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDefinition {
    pub key: String,
    pub display_name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    pub default_value: String,
    /// Whether the UI must mask the value
    pub sensitive: bool,
    /// Choices for `SELECT` fields
    pub allowed_values: Vec<String>,
    pub placeholder: String,
    pub validation_pattern: String,
}

/// Strongly typed plugin metadata, immutable after load except for the
/// launch-time port rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginMetadata {
    pub name: String,
    /// Unique key of the plugin
    pub protocol: String,
    pub version: String,
    pub description: String,
    pub executable: ExecutableConfig,
    pub grpc: RpcConfig,
    pub capabilities: CapabilitiesConfig,
    pub required_credentials: Vec<String>,
    pub optional_settings: Vec<String>,
    pub credential_fields: Vec<FieldDefinition>,
    pub setting_fields: Vec<FieldDefinition>,
}

// =============================================================================
// Raw descriptor (phase one)
// =============================================================================

/// Descriptor as written on disk, before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPluginDescriptor {
    pub name: Option<String>,
    pub protocol: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub executable: Option<RawExecutable>,
    pub grpc: Option<RawRpc>,
    pub capabilities: Option<RawCapabilities>,
    pub required_credentials: Option<Vec<String>>,
    pub optional_settings: Option<Vec<String>>,
    pub credential_fields: Option<Vec<RawFieldDefinition>>,
    pub setting_fields: Option<Vec<RawFieldDefinition>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawExecutable {
    #[serde(rename = "type")]
    pub kind: Option<ExecutableKind>,
    pub command: Option<Vec<String>>,
    pub working_directory: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRpc {
    pub port: Option<u16>,
    pub health_check_timeout: Option<u64>,
    pub startup_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCapabilities {
    pub video_codecs: Option<Vec<String>>,
    pub audio_codecs: Option<Vec<String>>,
    pub supported_resolutions: Option<Vec<ResolutionConfig>>,
    pub webrtc_support: Option<bool>,
    pub features: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFieldDefinition {
    pub key: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub required: Option<bool>,
    pub default_value: Option<String>,
    pub sensitive: Option<bool>,
    pub allowed_values: Option<Vec<String>>,
    pub placeholder: Option<String>,
    pub validation_pattern: Option<String>,
}

// =============================================================================
// Validation (phase two)
// =============================================================================

fn required<T>(value: Option<T>, field: &str) -> PluginResult<T> {
    value.ok_or_else(|| PluginError::InvalidMetadata(format!("missing field `{field}`")))
}

fn bounded_timeout(seconds: u64, field: &str) -> PluginResult<u64> {
    if seconds > MAX_TIMEOUT_SECS {
        return Err(PluginError::InvalidMetadata(format!(
            "`{field}` must be at most {MAX_TIMEOUT_SECS} seconds, got {seconds}"
        )));
    }
    Ok(seconds)
}

impl PluginMetadata {
    /// Read and validate a descriptor file
    pub fn load(path: &Path) -> PluginResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| PluginError::DescriptorIo {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&contents)
    }

    /// Parse and validate descriptor text
    pub fn parse(contents: &str) -> PluginResult<Self> {
        let raw: RawPluginDescriptor = serde_yaml::from_str(contents)
            .map_err(|e| PluginError::InvalidMetadata(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Validate a raw descriptor and fill every default
    pub fn from_raw(raw: RawPluginDescriptor) -> PluginResult<Self> {
        let name = required(raw.name, "name")?;
        let protocol = required(raw.protocol, "protocol")?;
        if protocol.trim().is_empty() {
            return Err(PluginError::InvalidMetadata(
                "`protocol` must not be empty".to_string(),
            ));
        }

        let exec = required(raw.executable, "executable")?;
        let command = required(exec.command, "executable.command")?;
        if command.is_empty() {
            return Err(PluginError::InvalidMetadata(
                "`executable.command` must not be empty".to_string(),
            ));
        }
        let executable = ExecutableConfig {
            kind: required(exec.kind, "executable.type")?,
            command,
            working_directory: exec.working_directory.unwrap_or_else(|| ".".to_string()),
        };

        let rpc = required(raw.grpc, "grpc")?;
        let grpc = RpcConfig {
            port: required(rpc.port, "grpc.port")?,
            health_check_timeout: bounded_timeout(
                rpc.health_check_timeout.unwrap_or(5),
                "grpc.health_check_timeout",
            )?,
            startup_timeout: bounded_timeout(
                rpc.startup_timeout.unwrap_or(30),
                "grpc.startup_timeout",
            )?,
        };

        let caps = required(raw.capabilities, "capabilities")?;
        let capabilities = CapabilitiesConfig {
            video_codecs: required(caps.video_codecs, "capabilities.video_codecs")?,
            audio_codecs: required(caps.audio_codecs, "capabilities.audio_codecs")?,
            supported_resolutions: required(
                caps.supported_resolutions,
                "capabilities.supported_resolutions",
            )?,
            webrtc_support: required(caps.webrtc_support, "capabilities.webrtc_support")?,
            features: caps.features.unwrap_or_default(),
        };

        let required_credentials = raw.required_credentials.unwrap_or_default();
        let optional_settings = raw.optional_settings.unwrap_or_default();

        let mut credential_fields = convert_fields(raw.credential_fields.unwrap_or_default())?;
        if credential_fields.is_empty() {
            credential_fields = derive_credential_fields(&required_credentials);
        }
        let mut setting_fields = convert_fields(raw.setting_fields.unwrap_or_default())?;
        if setting_fields.is_empty() {
            setting_fields = derive_setting_fields(&optional_settings);
        }

        Ok(Self {
            name,
            protocol,
            version: raw.version.unwrap_or_else(|| "1.0.0".to_string()),
            description: raw.description.unwrap_or_default(),
            executable,
            grpc,
            capabilities,
            required_credentials,
            optional_settings,
            credential_fields,
            setting_fields,
        })
    }

    /// Required credential keys absent from `credentials`
    pub fn missing_credentials<'a, I>(&self, provided: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String> + Clone,
    {
        self.required_credentials
            .iter()
            .filter(|key| !provided.clone().into_iter().any(|p| p == *key))
            .cloned()
            .collect()
    }
}

fn convert_fields(raw: Vec<RawFieldDefinition>) -> PluginResult<Vec<FieldDefinition>> {
    raw.into_iter()
        .map(|field| {
            let key = required(field.key, "field.key")?;
            Ok(FieldDefinition {
                display_name: field.display_name.unwrap_or_else(|| humanize_key(&key)),
                description: field.description.unwrap_or_default(),
                field_type: field.field_type.unwrap_or_default(),
                required: field.required.unwrap_or(false),
                default_value: field.default_value.unwrap_or_default(),
                sensitive: field.sensitive.unwrap_or(false),
                allowed_values: field.allowed_values.unwrap_or_default(),
                placeholder: field.placeholder.unwrap_or_default(),
                validation_pattern: field.validation_pattern.unwrap_or_default(),
                key,
            })
        })
        .collect()
}

// =============================================================================
// Field inference
// =============================================================================

/// Whether a key name denotes a secret value
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SECRET_WORDS.iter().any(|word| lower.contains(word))
}

/// Field kind for a declared credential key
pub fn infer_field_type(key: &str) -> FieldType {
    if is_sensitive_key(key) {
        FieldType::Password
    } else {
        FieldType::String
    }
}

/// `access_token` -> `Access Token`
pub fn humanize_key(key: &str) -> String {
    key.replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Build credential field definitions from bare keys
pub fn derive_credential_fields(keys: &[String]) -> Vec<FieldDefinition> {
    keys.iter()
        .map(|key| FieldDefinition {
            key: key.clone(),
            display_name: humanize_key(key),
            description: format!("Enter your {}", key.replace('_', " ")),
            field_type: infer_field_type(key),
            required: true,
            default_value: String::new(),
            sensitive: is_sensitive_key(key),
            allowed_values: Vec::new(),
            placeholder: String::new(),
            validation_pattern: String::new(),
        })
        .collect()
}

/// Build setting field definitions from bare keys
pub fn derive_setting_fields(keys: &[String]) -> Vec<FieldDefinition> {
    keys.iter()
        .map(|key| FieldDefinition {
            key: key.clone(),
            display_name: humanize_key(key),
            description: format!("Configure {}", key.replace('_', " ")),
            field_type: FieldType::String,
            required: false,
            default_value: String::new(),
            sensitive: false,
            allowed_values: Vec::new(),
            placeholder: String::new(),
            validation_pattern: String::new(),
        })
        .collect()
}
