use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;
use crate::control::rpc::{RpcError, RpcRequest, RpcResponse};
use crate::playback::{ControlCall, JourneyHandle};

/// Control calls a client may make
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMethod {
    StartJourney,
    StopJourney,
    ResetJourney,
    ContinueJourney,
    SetReplaySpeed,
    GetJourneyStatus,
}

/// Dispatch table from wire names to methods
const METHODS: &[(&str, ControlMethod)] = &[
    ("startJourney", ControlMethod::StartJourney),
    ("stopJourney", ControlMethod::StopJourney),
    ("resetJourney", ControlMethod::ResetJourney),
    ("continueJourney", ControlMethod::ContinueJourney),
    ("setReplaySpeed", ControlMethod::SetReplaySpeed),
    ("getJourneyStatus", ControlMethod::GetJourneyStatus),
];

impl ControlMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        METHODS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, method)| *method)
    }

    pub fn name(self) -> &'static str {
        METHODS
            .iter()
            .find(|(_, method)| *method == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartParams {
    delay_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SpeedParams {
    speed: f64,
}

/// Decode named (or positional) params; absent params count as `{}`
fn decode<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = match params {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(params) => params,
    };
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// Maps control calls onto the journey
#[derive(Clone)]
pub struct ControlSurface {
    journey: JourneyHandle,
}

impl ControlSurface {
    pub fn new(journey: JourneyHandle) -> Self {
        Self { journey }
    }

    /// Run a named call and return its result value
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let method =
            ControlMethod::from_name(method).ok_or_else(|| RpcError::method_not_found(method))?;
        debug!("Dispatching {}", method.name());

        let call = match method {
            ControlMethod::StartJourney => {
                let params: StartParams = decode(params)?;
                ControlCall::Start {
                    delay_seconds: params.delay_seconds,
                }
            }
            ControlMethod::StopJourney => ControlCall::Stop,
            ControlMethod::ResetJourney => ControlCall::Reset,
            ControlMethod::ContinueJourney => ControlCall::Resume,
            ControlMethod::SetReplaySpeed => {
                let params: SpeedParams = decode(params)?;
                ControlCall::SetSpeed {
                    speed: params.speed,
                }
            }
            ControlMethod::GetJourneyStatus => {
                let status = self.journey.status().await?;
                return serde_json::to_value(status).map_err(|e| RpcError::internal(e.to_string()));
            }
        };

        let message = self.journey.control(call).await?;
        Ok(Value::String(message.to_string()))
    }

    /// Handle one text frame; `None` means nothing is sent back
    pub async fn handle_text(&self, text: &str) -> Option<RpcResponse> {
        let request = match RpcRequest::parse(text) {
            Ok(request) => request,
            Err(response) => return Some(response),
        };

        let notification = request.is_notification();
        let result = self.call(&request.method, request.params).await;
        if let Err(e) = &result {
            debug!("Call {} failed: {}", request.method, e);
        }
        if notification {
            return None;
        }

        let id = request.id.unwrap_or(Value::Null);
        Some(match result {
            Ok(value) => RpcResponse::success(id, value),
            Err(error) => RpcResponse::failure(id, error),
        })
    }
}
