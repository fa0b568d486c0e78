//! Plugin RPC Proxy
//!
//! Thin forwarding layer over the supervisor. Every operation makes sure the
//! target plugin is up, forwards one RPC under the configured budget and
//! folds any failure into `false` / `None` after logging it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, info, warn};

use call_assist_plugin_api::{
    CallEndRequest, CallEndResponse, CallStartRequest, CallStartResponse, PluginConfig,
};

use super::client::with_timeout;
use super::lifecycle::PluginConfiguration;
use super::metadata::FieldDefinition;
use super::supervisor::PluginSupervisor;
use crate::errors::PluginError;

/// Capability summary exposed to configuration UIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaCapabilities {
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
    pub webrtc_support: bool,
    pub features: Vec<String>,
}

/// Account form description for one protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolSchema {
    pub protocol: String,
    pub display_name: String,
    pub description: String,
    pub credential_fields: Vec<FieldDefinition>,
    pub setting_fields: Vec<FieldDefinition>,
    pub example_account_ids: Vec<String>,
    pub capabilities: SchemaCapabilities,
}

/// Forwards account and call requests to plugin processes
#[derive(Clone)]
pub struct PluginProxy {
    supervisor: Arc<PluginSupervisor>,
}

impl PluginProxy {
    pub fn new(supervisor: Arc<PluginSupervisor>) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &Arc<PluginSupervisor> {
        &self.supervisor
    }

    /// Initialize an account with credentials only
    pub async fn initialize_account(
        &self,
        protocol: &str,
        account_id: &str,
        display_name: &str,
        credentials: HashMap<String, String>,
    ) -> bool {
        self.initialize_account_with_settings(
            protocol,
            account_id,
            display_name,
            credentials,
            HashMap::new(),
        )
        .await
    }

    /// Initialize an account with credentials and optional settings
    ///
    /// The plugin is brought up first; missing required credentials then
    /// fail without any RPC. A positive acknowledgement is cached as the
    /// plugin's configuration record.
    pub async fn initialize_account_with_settings(
        &self,
        protocol: &str,
        account_id: &str,
        display_name: &str,
        credentials: HashMap<String, String>,
        settings: HashMap<String, String>,
    ) -> bool {
        let Some(metadata) = self.supervisor.plugin_info(protocol) else {
            error!(protocol = %protocol, "Unknown protocol");
            return false;
        };

        if !self.supervisor.ensure_running(protocol).await {
            return false;
        }

        let missing = metadata.missing_credentials(credentials.keys());
        if !missing.is_empty() {
            error!(
                protocol = %protocol,
                error = %PluginError::MissingCredentials(missing),
                "Refusing to initialize account"
            );
            return false;
        }
        let Some(client) = self.supervisor.client(protocol) else {
            return false;
        };

        let config = PluginConfig {
            protocol: protocol.to_string(),
            account_id: account_id.to_string(),
            display_name: display_name.to_string(),
            credentials: credentials.clone(),
            settings: settings.clone(),
        };

        let budget = self.supervisor.config().rpc_timeout;
        match with_timeout(budget, client.initialize(config)).await {
            Ok(status) if status.initialized => {
                let initialized_at = OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .unwrap_or_default();
                self.supervisor.record_configuration(PluginConfiguration {
                    protocol: protocol.to_string(),
                    account_id: account_id.to_string(),
                    display_name: display_name.to_string(),
                    credentials,
                    settings,
                    initialized_at,
                });
                info!(protocol = %protocol, account_id = %account_id, "Account initialized");
                true
            }
            Ok(status) => {
                warn!(
                    protocol = %protocol,
                    account_id = %account_id,
                    message = %status.message,
                    "Plugin rejected account initialization"
                );
                false
            }
            Err(e) => {
                error!(protocol = %protocol, account_id = %account_id, error = %e, "Account initialization failed");
                false
            }
        }
    }

    /// Forward a call start; `None` on any failure
    pub async fn start_call(
        &self,
        protocol: &str,
        request: CallStartRequest,
    ) -> Option<CallStartResponse> {
        if !self.supervisor.ensure_running(protocol).await {
            return None;
        }
        let client = self.supervisor.client(protocol)?;

        let call_id = request.call_id.clone();
        let budget = self.supervisor.config().rpc_timeout;
        match with_timeout(budget, client.start_call(request)).await {
            Ok(response) => Some(response),
            Err(e) => {
                error!(protocol = %protocol, call_id = %call_id, error = %e, "Failed to start call");
                None
            }
        }
    }

    /// Forward a call end to an already running plugin; `None` on any failure
    pub async fn end_call(&self, protocol: &str, request: CallEndRequest) -> Option<CallEndResponse> {
        let client = self.supervisor.client(protocol)?;

        let call_id = request.call_id.clone();
        let budget = self.supervisor.config().rpc_timeout;
        match with_timeout(budget, client.end_call(request)).await {
            Ok(response) => Some(response),
            Err(e) => {
                error!(protocol = %protocol, call_id = %call_id, error = %e, "Failed to end call");
                None
            }
        }
    }

    /// Configuration form schema for every registered protocol
    pub fn protocol_schemas(&self) -> BTreeMap<String, ProtocolSchema> {
        self.supervisor
            .all_metadata()
            .into_iter()
            .map(|metadata| {
                let protocol = metadata.protocol.clone();
                let schema = ProtocolSchema {
                    example_account_ids: vec![
                        format!("user@{protocol}.example.com"),
                        "example_user".to_string(),
                    ],
                    protocol: protocol.clone(),
                    display_name: metadata.name,
                    description: metadata.description,
                    credential_fields: metadata.credential_fields,
                    setting_fields: metadata.setting_fields,
                    capabilities: SchemaCapabilities {
                        video_codecs: metadata.capabilities.video_codecs,
                        audio_codecs: metadata.capabilities.audio_codecs,
                        webrtc_support: metadata.capabilities.webrtc_support,
                        features: metadata.capabilities.features,
                    },
                };
                (protocol, schema)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupervisorConfig;
    use crate::errors::PluginResult;
    use crate::plugin::client::{PluginClient, PluginConnector};
    use crate::plugin::lifecycle::PluginInstance;
    use crate::plugin::metadata::{FieldType, PluginMetadata};

    struct NeverConnect;

    impl PluginConnector for NeverConnect {
        fn connect(&self, _port: u16) -> PluginResult<Arc<dyn PluginClient>> {
            Err(PluginError::ConnectionFailed("test".to_string()))
        }
    }

    fn proxy_with(protocol: &str, extra: &str) -> PluginProxy {
        let supervisor = Arc::new(PluginSupervisor::new(
            SupervisorConfig::default(),
            Arc::new(NeverConnect),
        ));
        let metadata = PluginMetadata::parse(&format!(
            r#"
name: "Demo"
protocol: "{protocol}"
description: "Demo protocol"
executable:
  type: "binary"
  command: ["./missing-binary"]
grpc:
  port: 50052
capabilities:
  video_codecs: ["H264"]
  audio_codecs: ["OPUS"]
  supported_resolutions: []
  webrtc_support: true
  features: ["encryption"]
{extra}
"#
        ))
        .unwrap();
        supervisor.register(PluginInstance::new(metadata, "/nonexistent"));
        PluginProxy::new(supervisor)
    }

    #[tokio::test]
    async fn test_unreachable_plugin_fails_initialize() {
        let proxy = proxy_with("demo", "required_credentials: [\"token\"]");

        let mut credentials = HashMap::new();
        credentials.insert("token".to_string(), "x".to_string());
        let ok = proxy
            .initialize_account("demo", "me", "Me", credentials)
            .await;

        assert!(!ok);
        assert_eq!(
            proxy.supervisor().plugin_state("demo"),
            Some(crate::plugin::PluginState::Error)
        );
        assert!(proxy.supervisor().plugin_configuration("demo").is_none());
    }

    #[tokio::test]
    async fn test_unknown_protocol_is_false_or_none() {
        let proxy = proxy_with("demo", "");

        assert!(
            !proxy
                .initialize_account("other", "me", "Me", HashMap::new())
                .await
        );
        assert!(
            proxy
                .end_call("other", CallEndRequest::default())
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_end_call_requires_running_plugin() {
        let proxy = proxy_with("demo", "");
        let request = CallEndRequest {
            call_id: "call_1".to_string(),
            reason: "done".to_string(),
        };
        assert!(proxy.end_call("demo", request).await.is_none());
    }

    #[test]
    fn test_protocol_schemas() {
        let proxy = proxy_with(
            "demo",
            "required_credentials: [\"api_key\"]\noptional_settings: [\"room\"]",
        );

        let schemas = proxy.protocol_schemas();
        let schema = &schemas["demo"];

        assert_eq!(schema.display_name, "Demo");
        assert_eq!(schema.description, "Demo protocol");
        assert_eq!(
            schema.example_account_ids,
            vec!["user@demo.example.com", "example_user"]
        );
        assert_eq!(schema.credential_fields[0].field_type, FieldType::Password);
        assert_eq!(schema.setting_fields[0].key, "room");
        assert_eq!(schema.capabilities.features, vec!["encryption"]);
        assert!(schema.capabilities.webrtc_support);
    }
}
