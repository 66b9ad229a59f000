use crate::rpc::{
    jsonrpc::{self, JsonRpcResponse, INVALID_REQUEST},
    router::{Router, RpcRequest},
};
use eyre::Context as _;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader},
    sync::mpsc,
};
use tracing::{debug, error, info, warn};

pub const MAX_JSONRPC_LINE_BYTES: usize = 1_000_000;

/// One line on stdin: a JSON-RPC request plus the caller's origin and the
/// entry point it is addressed to.
#[derive(Debug, Deserialize)]
struct Envelope {
    jsonrpc: String,
    id: Value,
    #[serde(default)]
    origin: String,
    #[serde(default)]
    handler: Option<String>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    Keyring,
    Rpc,
}

impl Handler {
    fn parse(raw: Option<&str>) -> Option<Self> {
        match raw? {
            "keyring" => Some(Self::Keyring),
            "rpc" => Some(Self::Rpc),
            _ => None,
        }
    }
}

async fn write_frame<W, T>(out: &mut W, v: &T) -> eyre::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin + Send,
    T: serde::Serialize + Sync,
{
    out.write_all(format!("{}\n", serde_json::to_string(v)?).as_bytes())
        .await?;
    out.flush().await?;
    Ok(())
}

/// Parse and validate one line. `None` means the line is skipped.
fn parse_line(line: &str) -> Option<Result<Envelope, JsonRpcResponse>> {
    if line.trim().is_empty() {
        return None;
    }
    let env: Envelope = match serde_json::from_str(line) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "invalid request line");
            return None;
        }
    };
    if env.jsonrpc != "2.0" {
        return Some(Err(jsonrpc::err(env.id, INVALID_REQUEST, "invalid jsonrpc version")));
    }
    Some(Ok(env))
}

/// Route one request. Fatal keyring errors come back as `Err` and end the session.
async fn dispatch(router: &Router, env: Envelope) -> eyre::Result<JsonRpcResponse> {
    let Envelope {
        id,
        origin,
        handler,
        method,
        params,
        ..
    } = env;
    let Some(handler) = Handler::parse(handler.as_deref()) else {
        return Ok(jsonrpc::err(
            id,
            INVALID_REQUEST,
            format!("unknown handler {handler:?}; expected \"keyring\" or \"rpc\""),
        ));
    };
    let request = RpcRequest::new(method, params);
    let res = match handler {
        Handler::Keyring => router.handle_keyring_request(&origin, request).await,
        Handler::Rpc => router.handle_rpc_request(&origin, request).await,
    };
    match res {
        Ok(result) => Ok(jsonrpc::ok(id, result)),
        Err(e) if e.is_fatal() => {
            error!(error = %e, "fatal keyring error");
            Err(eyre::Report::new(e).wrap_err("request handling aborted"))
        }
        Err(e) => Ok(jsonrpc::keyring_err(id, e)),
    }
}

/// Serve line-delimited requests on stdin until EOF, answering on stdout.
///
/// Every request runs on its own task, so responses may come back out of
/// order and a request that has started always runs to completion even when
/// stdin closes underneath it.
pub async fn run_stdio(router: Router) -> eyre::Result<()> {
    let router = Arc::new(router);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();
    let (tx, mut rx) = mpsc::unbounded_channel::<eyre::Result<JsonRpcResponse>>();

    let mut reading = true;
    let mut in_flight = 0_usize;
    info!("keyring server ready");

    while reading || in_flight > 0 {
        tokio::select! {
            line = lines.next_line(), if reading => {
                let Some(line) = line.context("read stdin")? else {
                    debug!(in_flight, "stdin closed");
                    reading = false;
                    continue;
                };
                if line.len() > MAX_JSONRPC_LINE_BYTES {
                    warn!(bytes = line.len(), "request line too large; closing session");
                    reading = false;
                    continue;
                }
                match parse_line(&line) {
                    Some(Ok(env)) => {
                        in_flight += 1;
                        let router = Arc::clone(&router);
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let resp = dispatch(&router, env).await;
                            // The receiver only goes away once the session has failed.
                            drop(tx.send(resp));
                        });
                    }
                    Some(Err(resp)) => write_frame(&mut out, &resp).await?,
                    None => {}
                }
            }
            Some(resp) = rx.recv() => {
                in_flight = in_flight.saturating_sub(1);
                write_frame(&mut out, &resp?).await?;
            }
        }
    }

    if let Ok(router) = Arc::try_unwrap(router) {
        router.into_context().shutdown();
    }
    info!("keyring server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bootstrap::KeyringContext,
        config::RequestPolicy,
        errors::KeyringError,
        keyring::KeyringSettings,
        permissions::{PermissionGate, HOST_ORIGIN},
        state_store::{MemoryStateStore, StateStore},
    };
    use serde_json::json;
    use std::time::Duration;

    fn router(gate: PermissionGate) -> Router {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let settings = KeyringSettings {
            request_policy: RequestPolicy::AutoReject,
            storage_timeout: Duration::from_secs(5),
        };
        Router::new(gate, KeyringContext::new(store, settings))
    }

    fn envelope(v: &Value) -> eyre::Result<Envelope> {
        match parse_line(&v.to_string()) {
            Some(Ok(env)) => Ok(env),
            other => eyre::bail!("expected a request, got {other:?}"),
        }
    }

    #[test]
    fn garbage_and_blank_lines_are_skipped() {
        assert!(parse_line("").is_none(), "blank line");
        assert!(parse_line("{ nope").is_none(), "broken json");
        assert!(parse_line(r#"{"jsonrpc":"2.0","id":1}"#).is_none(), "no method");
    }

    #[test]
    fn wrong_version_is_an_invalid_request() -> eyre::Result<()> {
        let Some(Err(resp)) =
            parse_line(r#"{"jsonrpc":"1.0","id":7,"handler":"keyring","method":"x"}"#)
        else {
            eyre::bail!("expected an error response");
        };
        let v = serde_json::to_value(resp)?;
        assert_eq!(v["id"], json!(7));
        assert_eq!(v["error"]["code"], json!(INVALID_REQUEST));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_handler_is_an_invalid_request() -> eyre::Result<()> {
        let r = router(PermissionGate::new(Ok("https://app.example".into())));
        let env = envelope(&json!({
            "jsonrpc": "2.0", "id": 1, "origin": HOST_ORIGIN, "method": "keyring_listAccounts"
        }))?;
        let v = serde_json::to_value(dispatch(&r, env).await?)?;
        assert_eq!(v["error"]["code"], json!(INVALID_REQUEST));
        Ok(())
    }

    #[tokio::test]
    async fn keyring_errors_are_answered() -> eyre::Result<()> {
        let r = router(PermissionGate::new(Ok("https://app.example".into())));
        let env = envelope(&json!({
            "jsonrpc": "2.0", "id": "x", "origin": "https://evil.example",
            "handler": "keyring", "method": "keyring_listAccounts"
        }))?;
        let v = serde_json::to_value(dispatch(&r, env).await?)?;
        assert_eq!(v["id"], json!("x"));
        assert_eq!(v["error"]["kind"], json!("PermissionDenied"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_configuration_ends_the_session() -> eyre::Result<()> {
        let r = router(PermissionGate::new(Err(KeyringError::ConfigurationMissing(
            "dapp_origin_development is not set (development mode)".into(),
        ))));
        let env = envelope(&json!({
            "jsonrpc": "2.0", "id": 2, "origin": "https://app.example",
            "handler": "rpc", "method": "keyring_listAccounts"
        }))?;
        assert!(dispatch(&r, env).await.is_err(), "configuration errors are not answered");
        Ok(())
    }
}
