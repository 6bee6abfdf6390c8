use finance_ledger_lib::{
    apply_embedded_migrations, dispatch, init_tracing, AppConfig, ApiError, Method,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::{info, warn};

const SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Deserialize)]
struct AdapterRequest {
    schema_version: u64,
    case: Option<AdapterCaseMeta>,
    endpoint: AdapterEndpoint,
    #[serde(default)]
    query: Value,
    #[serde(default)]
    dataset: AdapterDataset,
}

#[derive(Debug, Deserialize)]
struct AdapterCaseMeta {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdapterEndpoint {
    path: Option<String>,
    method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AdapterDataset {
    db_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct AdapterErrorBody {
    category: String,
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum AdapterResponse {
    #[serde(rename = "success")]
    Success { payload: Value },
    #[serde(rename = "error")]
    Error { error: AdapterErrorBody },
}

#[derive(Debug)]
enum AdapterFailure {
    Protocol(String),
    Api(ApiError),
}

impl AdapterFailure {
    fn into_response(self) -> AdapterResponse {
        let (category, message, error_type) = match self {
            Self::Protocol(message) => ("ADAPTER_PROTOCOL_ERROR", message, "AdapterError"),
            Self::Api(err) => (err.category(), err.to_string(), "ApiError"),
        };
        AdapterResponse::Error {
            error: AdapterErrorBody {
                category: category.to_string(),
                message,
                error_type: error_type.to_string(),
            },
        }
    }
}

fn parse_bool_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn read_stdin_request() -> Result<AdapterRequest, AdapterFailure> {
    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .map_err(|e| AdapterFailure::Protocol(format!("read stdin failed: {e}")))?;
    if raw.trim().is_empty() {
        return Err(AdapterFailure::Protocol("empty stdin request".to_string()));
    }
    let value = serde_json::from_str::<Value>(&raw)
        .map_err(|e| AdapterFailure::Protocol(format!("invalid JSON request: {e}")))?;
    serde_json::from_value::<AdapterRequest>(value)
        .map_err(|e| AdapterFailure::Protocol(format!("request root invalid: {e}")))
}

fn handle(req: AdapterRequest, config: &AppConfig) -> Result<Value, AdapterFailure> {
    if req.schema_version != SCHEMA_VERSION {
        return Err(AdapterFailure::Protocol(format!(
            "unsupported schema_version: {}",
            req.schema_version
        )));
    }
    let path = req
        .endpoint
        .path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AdapterFailure::Protocol("request.endpoint.path missing".to_string()))?;
    let method = Method::parse(req.endpoint.method.as_deref()).map_err(AdapterFailure::Api)?;
    let db_path = req
        .dataset
        .db_path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config.db_path.clone());

    if let Some(case_id) = req.case.as_ref().and_then(|c| c.id.as_deref()) {
        info!(case = case_id, "adapter case");
    }
    info!(
        method = method.as_str(),
        endpoint = path,
        db = %db_path.to_string_lossy(),
        "adapter request"
    );

    apply_embedded_migrations(&db_path).map_err(|e| AdapterFailure::Api(e.into()))?;
    dispatch(method, path, req.query, &db_path).map_err(AdapterFailure::Api)
}

fn main() {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let pretty = parse_bool_flag(&args, "--pretty");

    let config = AppConfig::from_env();
    init_tracing(&config);

    let resp = match read_stdin_request().and_then(|req| handle(req, &config)) {
        Ok(payload) => AdapterResponse::Success { payload },
        Err(failure) => {
            let resp = failure.into_response();
            if let AdapterResponse::Error { error } = &resp {
                warn!(category = %error.category, message = %error.message, "request rejected");
            }
            resp
        }
    };

    let out = if pretty {
        serde_json::to_string_pretty(&resp)
    } else {
        serde_json::to_string(&resp)
    }
    .unwrap_or_else(|e| {
        json!({
            "status": "error",
            "error": {
                "category": "ADAPTER_PROTOCOL_ERROR",
                "message": format!("serialize response failed: {e}"),
                "type": "SerializeError",
            }
        })
        .to_string()
    });

    print!("{out}");
}
