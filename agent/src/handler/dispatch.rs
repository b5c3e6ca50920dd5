use std::sync::Arc;

use dirbridge_core::mutators::OrganizeType;
use dirbridge_core::report::OperationResponse;
use dirbridge_core::supervisor::{Connector, SshConnector};
use dirbridge_core::{CoreError, OperatorContext};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::protocol::errors;
use crate::protocol::messages::{JsonRpcErrorResponse, JsonRpcRequest, JsonRpcResponse};
use crate::protocol::methods::{
    BatchDeleteParams, CompareParams, ConnectParams, DescribeHistoryParams, HistoryKeyParams,
    InitializeParams, InitializeResult, OrganizeParams, PathParams, RenameParams, TreeParams,
    WriteParams, METHODS,
};

/// The agent's protocol version.
const AGENT_PROTOCOL_VERSION: &str = "0.1.0";

/// Dispatcher handles incoming JSON-RPC requests and routes them
/// to the operator context.
///
/// Core calls block on disk or network I/O, so each one runs on the
/// blocking pool.
pub struct Dispatcher<C: Connector = SshConnector> {
    context: Arc<OperatorContext<C>>,
    initialized: bool,
}

/// The result of dispatching a request: either a success or error response.
pub enum DispatchResult {
    Success(JsonRpcResponse),
    Error(JsonRpcErrorResponse),
}

impl DispatchResult {
    /// Serialize the result to a JSON `Value`.
    pub fn to_json(&self) -> Value {
        let value = match self {
            Self::Success(resp) => serde_json::to_value(resp),
            Self::Error(resp) => serde_json::to_value(resp),
        };
        value.unwrap_or_else(|e| {
            error!("Failed to serialize response: {e}");
            json!({
                "jsonrpc": "2.0",
                "error": {"code": errors::INTERNAL_ERROR, "message": "Failed to serialize response"},
                "id": Value::Null,
            })
        })
    }

    fn response(id: Value, response: OperationResponse) -> Self {
        match serde_json::to_value(&response) {
            Ok(result) => Self::Success(JsonRpcResponse::new(id, result)),
            Err(e) => Self::Error(JsonRpcErrorResponse::new(
                id,
                errors::INTERNAL_ERROR,
                format!("Failed to serialize result: {e}"),
            )),
        }
    }
}

fn parse_params<T: DeserializeOwned>(request: &JsonRpcRequest) -> Result<T, DispatchResult> {
    serde_json::from_value(request.params.clone()).map_err(|e| {
        DispatchResult::Error(
            JsonRpcErrorResponse::new(
                request.id.clone(),
                errors::INVALID_PARAMS,
                format!("Invalid {} params: {e}", request.method),
            )
            .with_data(json!({"method": request.method})),
        )
    })
}

fn unit_response(result: Result<(), CoreError>, message: String) -> OperationResponse {
    match result {
        Ok(()) => OperationResponse::ok(message),
        Err(e) => OperationResponse::from_error(&e),
    }
}

fn batch_response(result: Result<dirbridge_core::report::BatchReport, CoreError>) -> OperationResponse {
    match result {
        Ok(report) => report.into(),
        Err(e) => OperationResponse::from_error(&e),
    }
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(context: Arc<OperatorContext<C>>) -> Self {
        Self {
            context,
            initialized: false,
        }
    }

    /// Dispatch a parsed JSON-RPC request to the appropriate handler.
    pub async fn dispatch(&mut self, request: JsonRpcRequest) -> DispatchResult {
        let method = request.method.as_str();

        debug!("Dispatching method: {}", method);

        // The `initialize` method is always allowed
        if method == "initialize" {
            return self.handle_initialize(request);
        }

        if !self.initialized {
            return DispatchResult::Error(JsonRpcErrorResponse::new(
                request.id,
                errors::NOT_INITIALIZED,
                "Agent not initialized, call 'initialize' first",
            ));
        }

        match method {
            "connection.connect" => self.handle_connect(request).await,
            "connection.disconnect" => {
                self.run(request.id, |ctx| {
                    ctx.disconnect();
                    OperationResponse::ok("Disconnected")
                })
                .await
            }
            "connection.status" => {
                self.run(request.id, |ctx| {
                    let report = ctx.status();
                    let message = if report.healthy {
                        "Connection is healthy"
                    } else {
                        "Connection is not healthy"
                    };
                    OperationResponse::ok(message).with_payload(&report)
                })
                .await
            }
            "connection.history" => {
                self.run(request.id, |ctx| {
                    let entries = ctx.history();
                    OperationResponse::ok(format!("{} recent connection(s)", entries.len()))
                        .with_payload(&entries)
                })
                .await
            }
            "connection.history.remove" => self.handle_history_remove(request).await,
            "connection.history.describe" => self.handle_history_describe(request).await,
            "config.get" => {
                self.run(request.id, |ctx| {
                    OperationResponse::ok("Client configuration").with_payload(&ctx.client_config())
                })
                .await
            }
            "fs.browse" => self.handle_browse(request).await,
            "fs.read" => self.handle_read(request).await,
            "fs.write" => self.handle_write(request).await,
            "fs.delete" => self.handle_delete(request).await,
            "fs.batch_delete" => self.handle_batch_delete(request).await,
            "compare.run" => self.handle_compare(request).await,
            "rename.batch" => self.handle_rename(request).await,
            "organize.run" => self.handle_organize(request).await,
            "tree.print" => self.handle_tree(request).await,
            _ => {
                warn!("Unknown method: {}", method);
                DispatchResult::Error(JsonRpcErrorResponse::new(
                    request.id.clone(),
                    errors::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                ))
            }
        }
    }

    /// Run `f` against the context on the blocking pool.
    async fn run<F>(&self, id: Value, f: F) -> DispatchResult
    where
        F: FnOnce(&OperatorContext<C>) -> OperationResponse + Send + 'static,
    {
        let context = Arc::clone(&self.context);
        match tokio::task::spawn_blocking(move || f(&context)).await {
            Ok(response) => DispatchResult::response(id, response),
            Err(e) => {
                error!("Blocking task failed: {e}");
                DispatchResult::Error(JsonRpcErrorResponse::new(
                    id,
                    errors::INTERNAL_ERROR,
                    format!("Internal error: {e}"),
                ))
            }
        }
    }

    fn handle_initialize(&mut self, request: JsonRpcRequest) -> DispatchResult {
        let params: InitializeParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };

        // Version negotiation: we only support major version 0
        let major = params
            .protocol_version
            .split('.')
            .next()
            .and_then(|s| s.parse::<u32>().ok());

        if major != Some(0) {
            return DispatchResult::Error(JsonRpcErrorResponse::new(
                request.id,
                errors::VERSION_NOT_SUPPORTED,
                format!(
                    "Unsupported protocol version: {} (agent supports 0.x)",
                    params.protocol_version
                ),
            ));
        }

        self.initialized = true;
        debug!(
            "Initialized by {} {}",
            params.client, params.client_version
        );

        let result = InitializeResult {
            protocol_version: AGENT_PROTOCOL_VERSION.to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            methods: METHODS.iter().map(|m| m.to_string()).collect(),
        };
        match serde_json::to_value(result) {
            Ok(value) => DispatchResult::Success(JsonRpcResponse::new(request.id, value)),
            Err(e) => DispatchResult::Error(JsonRpcErrorResponse::new(
                request.id,
                errors::INTERNAL_ERROR,
                format!("Failed to serialize result: {e}"),
            )),
        }
    }

    async fn handle_connect(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: ConnectParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            let ssh = params.ssh_config();
            let target = format!("{}@{}:{}", ssh.username, ssh.host, ssh.port);
            OperationResponse::from_result(ctx.connect(ssh, &params.description), |_| {
                format!("Connected to {target}")
            })
        })
        .await
    }

    async fn handle_history_remove(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: HistoryKeyParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            let result = ctx.remove_history(&params.key);
            unit_response(result, format!("Removed {} from history", params.key))
        })
        .await
    }

    async fn handle_history_describe(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: DescribeHistoryParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            let result = ctx.describe_history(&params.key, &params.description);
            unit_response(result, format!("Updated description of {}", params.key))
        })
        .await
    }

    async fn handle_read(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: PathParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| match ctx.read_text(params.mode, &params.path) {
            Ok(content) => OperationResponse::ok(format!("Loaded {}", params.path))
                .with_payload(&json!({"path": params.path, "content": content})),
            Err(e) => OperationResponse::from_error(&e),
        })
        .await
    }

    async fn handle_browse(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: PathParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            OperationResponse::from_result(ctx.browse(params.mode, &params.path), |entries| {
                format!("{} entries in {}", entries.len(), params.path)
            })
        })
        .await
    }

    async fn handle_write(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: WriteParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            let result = ctx.write_file(params.mode, &params.path, params.content.as_bytes());
            OperationResponse::from_result(result, |outcome| {
                format!("Wrote {} bytes to {}", outcome.bytes_written, params.path)
            })
        })
        .await
    }

    async fn handle_delete(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: PathParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            let result = ctx.delete(params.mode, &params.path);
            unit_response(result, format!("Deleted {}", params.path))
        })
        .await
    }

    async fn handle_batch_delete(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: BatchDeleteParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            batch_response(ctx.batch_delete(params.mode, &params.paths))
        })
        .await
    }

    async fn handle_compare(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: CompareParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            let result = ctx.compare(
                params.source_mode,
                &params.path_a,
                params.target_mode,
                &params.path_b,
                params.similarity_threshold,
            );
            OperationResponse::from_result(result, |report| report.message.clone())
        })
        .await
    }

    async fn handle_rename(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: RenameParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            batch_response(ctx.rename(params.mode, &params.path, &params.request))
        })
        .await
    }

    async fn handle_organize(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: OrganizeParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            let result = params
                .organize_type
                .parse::<OrganizeType>()
                .and_then(|kind| ctx.organize(params.mode, &params.path, kind));
            batch_response(result)
        })
        .await
    }

    async fn handle_tree(&self, request: JsonRpcRequest) -> DispatchResult {
        let params: TreeParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        self.run(request.id, move |ctx| {
            let result = ctx.tree(params.mode, &params.path, &params.options());
            OperationResponse::from_result(result, |tree| {
                format!("{} directories, {} files", tree.directories, tree.files)
            })
        })
        .await
    }
}
