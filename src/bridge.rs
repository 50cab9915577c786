//! Command surface exposed to the scripting layer.
//!
//! Actions arrive by name with JSON arguments and leave as a wire status
//! map, a scanned string, or an `{code, name, message}` error payload.

use crate::error::{Result, ScannerError};
use crate::platform::CameraFacing;
use crate::session::CameraSession;
use crate::status::{ErrorPayload, StatusSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerCommand {
    Prepare,
    Scan,
    CancelScan,
    Show,
    Hide,
    PausePreview,
    ResumePreview,
    EnableLight,
    DisableLight,
    UseCamera(CameraFacing),
    OpenSettings,
    GetStatus,
    Destroy,
}

impl ScannerCommand {
    /// Parse an action name and its arguments
    pub fn parse(action: &str, args: &[Value]) -> Result<Self> {
        let command = match action {
            "prepare" => ScannerCommand::Prepare,
            "scan" => ScannerCommand::Scan,
            "cancelScan" => ScannerCommand::CancelScan,
            "show" => ScannerCommand::Show,
            "hide" => ScannerCommand::Hide,
            "pausePreview" => ScannerCommand::PausePreview,
            "resumePreview" => ScannerCommand::ResumePreview,
            "enableLight" => ScannerCommand::EnableLight,
            "disableLight" => ScannerCommand::DisableLight,
            "useCamera" => ScannerCommand::UseCamera(parse_facing(args.first())?),
            "openSettings" => ScannerCommand::OpenSettings,
            "getStatus" => ScannerCommand::GetStatus,
            "destroy" => ScannerCommand::Destroy,
            other => {
                return Err(ScannerError::unexpected(format!(
                    "Unknown action: {}",
                    other
                )))
            }
        };
        Ok(command)
    }

    pub fn action(&self) -> &'static str {
        match self {
            ScannerCommand::Prepare => "prepare",
            ScannerCommand::Scan => "scan",
            ScannerCommand::CancelScan => "cancelScan",
            ScannerCommand::Show => "show",
            ScannerCommand::Hide => "hide",
            ScannerCommand::PausePreview => "pausePreview",
            ScannerCommand::ResumePreview => "resumePreview",
            ScannerCommand::EnableLight => "enableLight",
            ScannerCommand::DisableLight => "disableLight",
            ScannerCommand::UseCamera(_) => "useCamera",
            ScannerCommand::OpenSettings => "openSettings",
            ScannerCommand::GetStatus => "getStatus",
            ScannerCommand::Destroy => "destroy",
        }
    }
}

fn parse_facing(arg: Option<&Value>) -> Result<CameraFacing> {
    let index = match arg {
        Some(Value::Number(number)) => number.as_u64(),
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    index
        .and_then(CameraFacing::from_index)
        .ok_or_else(|| ScannerError::unexpected("useCamera expects 0 (back) or 1 (front)"))
}

impl fmt::Display for ScannerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerCommand::UseCamera(facing) => write!(f, "useCamera({})", facing.index()),
            other => f.write_str(other.action()),
        }
    }
}

/// `action` or `action=arg` as written on a command line
impl FromStr for ScannerCommand {
    type Err = ScannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((action, arg)) => ScannerCommand::parse(action, &[Value::String(arg.to_string())]),
            None => ScannerCommand::parse(s, &[]),
        }
    }
}

/// What the caller receives for one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeReply {
    Status { status: BTreeMap<String, String> },
    Scanned { value: String },
    Error { error: ErrorPayload },
}

impl BridgeReply {
    pub fn status(status: &StatusSnapshot) -> Self {
        BridgeReply::Status {
            status: status.to_wire(),
        }
    }

    pub fn error(error: &ScannerError) -> Self {
        BridgeReply::Error {
            error: ErrorPayload::from(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, BridgeReply::Error { .. })
    }
}

/// Runs commands against one session
#[derive(Clone)]
pub struct ScannerBridge {
    session: CameraSession,
}

impl ScannerBridge {
    pub fn new(session: CameraSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &CameraSession {
        &self.session
    }

    /// Parse and run one action
    pub async fn execute_action(&self, action: &str, args: &[Value]) -> BridgeReply {
        match ScannerCommand::parse(action, args) {
            Ok(command) => self.execute(command).await,
            Err(e) => BridgeReply::error(&e),
        }
    }

    pub async fn execute(&self, command: ScannerCommand) -> BridgeReply {
        debug!("Executing {}", command);
        let session = &self.session;

        let result = match command {
            ScannerCommand::Scan => {
                return match session.scan().await {
                    Ok(value) => BridgeReply::Scanned { value },
                    Err(e) => BridgeReply::error(&e),
                };
            }
            ScannerCommand::GetStatus => Ok(session.get_status().await),
            ScannerCommand::Prepare => session.prepare().await,
            ScannerCommand::CancelScan => session.cancel_scan().await,
            ScannerCommand::Show => session.show().await,
            ScannerCommand::Hide => session.hide().await,
            ScannerCommand::PausePreview => session.pause_preview().await,
            ScannerCommand::ResumePreview => session.resume_preview().await,
            ScannerCommand::EnableLight => session.enable_light().await,
            ScannerCommand::DisableLight => session.disable_light().await,
            ScannerCommand::UseCamera(facing) => session.use_camera(facing).await,
            ScannerCommand::OpenSettings => session.open_settings().await,
            ScannerCommand::Destroy => session.destroy().await,
        };

        match result {
            Ok(status) => BridgeReply::status(&status),
            Err(e) => BridgeReply::error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FallbackEngineFactory;
    use crate::error::ErrorKind;
    use crate::platform::simulated::{
        SimulatedCamera, SimulatedDecoder, SimulatedPermissions, SimulatedServices,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn create_bridge(camera: Arc<SimulatedCamera>) -> ScannerBridge {
        let session = CameraSession::builder()
            .camera(camera)
            .permissions(Arc::new(SimulatedPermissions::granted()))
            .services(Arc::new(SimulatedServices::new(false)))
            .fallback_engine(Arc::new(FallbackEngineFactory::new(Arc::new(
                SimulatedDecoder::new("fallback"),
            ))))
            .build()
            .unwrap();
        ScannerBridge::new(session)
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            ScannerCommand::parse("cancelScan", &[]).unwrap(),
            ScannerCommand::CancelScan
        );
        assert_eq!(
            ScannerCommand::parse("useCamera", &[json!(1)]).unwrap(),
            ScannerCommand::UseCamera(CameraFacing::Front)
        );
        assert_eq!(
            ScannerCommand::parse("useCamera", &[json!("0")]).unwrap(),
            ScannerCommand::UseCamera(CameraFacing::Back)
        );
        assert!(ScannerCommand::parse("useCamera", &[json!(2)]).is_err());
        assert!(ScannerCommand::parse("useCamera", &[]).is_err());
        assert!(ScannerCommand::parse("selfDestruct", &[]).is_err());

        let command: ScannerCommand = "useCamera=1".parse().unwrap();
        assert_eq!(command.to_string(), "useCamera(1)");
        assert_eq!("getStatus".parse::<ScannerCommand>().unwrap().action(), "getStatus");
    }

    #[tokio::test]
    async fn test_status_reply_uses_wire_format() {
        let bridge = create_bridge(Arc::new(SimulatedCamera::standard()));

        let reply = bridge.execute_action("prepare", &[]).await;
        let BridgeReply::Status { status } = &reply else {
            panic!("expected status reply, got {:?}", reply);
        };
        assert_eq!(status["prepared"], "1");
        assert_eq!(status["authorized"], "1");

        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["status"]["currentCamera"], "0");
    }

    #[tokio::test]
    async fn test_error_reply_carries_code() {
        let bridge = create_bridge(Arc::new(SimulatedCamera::back_only()));

        let reply = bridge.execute_action("useCamera", &[json!(1)]).await;
        assert!(reply.is_error());
        let BridgeReply::Error { error } = reply else {
            panic!("expected error reply");
        };
        assert_eq!(error.code, 4);
        assert_eq!(error.kind(), Some(ErrorKind::FrontCameraUnavailable));

        let reply = bridge.execute_action("explode", &[]).await;
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"]["code"], 0);
    }

    #[tokio::test]
    async fn test_scan_reply() {
        let camera = Arc::new(SimulatedCamera::standard());
        let bridge = create_bridge(camera.clone());

        let runner = bridge.clone();
        let mut scan = tokio::spawn(async move { runner.execute(ScannerCommand::Scan).await });

        let reply = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                camera.present("bridge-value");
                tokio::select! {
                    reply = &mut scan => return reply.unwrap(),
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(
            reply,
            BridgeReply::Scanned {
                value: "bridge-value".to_string()
            }
        );
    }
}
