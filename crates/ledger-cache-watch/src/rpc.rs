//! JSON-RPC chain provider: HTTP for reads and log scans, WebSocket for
//! `eth_subscribe`.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use ledger_cache_core::{LedgerEvent, duration_ms};
use ledger_cache_store::{TaskHandle, shutdown_requested};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::provider::{ChainProvider, Subscription};

mod abi {
    alloy_sol_types::sol! {
        event Transfer(address indexed from, address indexed to, address indexed token, uint256 amount);
        event Deposit(address indexed user, address indexed token, uint256 amount);
        event Withdraw(address indexed user, address indexed token, uint256 amount);

        interface IERC20 {
            function balanceOf(address account) external view returns (uint256);
            function allowance(address owner, address spender) external view returns (uint256);
        }
    }
}

/// Buffered events between the WebSocket reader and the watcher.
const EVENT_BUFFER: usize = 256;

/// Request id used for `eth_subscribe` on a fresh connection.
const SUBSCRIBE_ID: u64 = 1;

/// Topic0 of the three ledger events.
pub fn event_topics() -> [B256; 3] {
    [
        abi::Transfer::SIGNATURE_HASH,
        abi::Deposit::SIGNATURE_HASH,
        abi::Withdraw::SIGNATURE_HASH,
    ]
}

/// Decodes a raw log into a ledger event. Unknown topics yield `None`.
pub fn decode_log(topics: &[B256], data: &[u8]) -> Result<Option<LedgerEvent>, ProviderError> {
    let Some(topic0) = topics.first() else {
        return Ok(None);
    };
    let decode_err = |e: alloy_sol_types::Error| ProviderError::decode(e.to_string());

    let event = if *topic0 == abi::Transfer::SIGNATURE_HASH {
        let e = abi::Transfer::decode_raw_log(topics.iter().copied(), data).map_err(decode_err)?;
        LedgerEvent::transfer(
            &e.from.to_string(),
            &e.to.to_string(),
            &e.token.to_string(),
            e.amount.to_string(),
        )
    } else if *topic0 == abi::Deposit::SIGNATURE_HASH {
        let e = abi::Deposit::decode_raw_log(topics.iter().copied(), data).map_err(decode_err)?;
        LedgerEvent::deposit(&e.user.to_string(), &e.token.to_string(), e.amount.to_string())
    } else if *topic0 == abi::Withdraw::SIGNATURE_HASH {
        let e = abi::Withdraw::decode_raw_log(topics.iter().copied(), data).map_err(decode_err)?;
        LedgerEvent::withdraw(&e.user.to_string(), &e.token.to_string(), e.amount.to_string())
    } else {
        return Ok(None);
    };

    Ok(Some(event))
}

fn parse_address(address: &str) -> Result<Address, ProviderError> {
    Address::from_str(address.trim()).map_err(|_| ProviderError::InvalidAddress(address.to_string()))
}

fn parse_quantity(hex: &str) -> Result<u64, ProviderError> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::decode(format!("invalid quantity '{}': {}", hex, e)))
}

fn parse_word(bytes: &Bytes) -> Result<U256, ProviderError> {
    if bytes.len() < 32 {
        return Err(ProviderError::decode(format!(
            "expected a 32-byte word, got {} bytes",
            bytes.len()
        )));
    }
    Ok(U256::from_be_slice(&bytes[..32]))
}

/// Configuration for [`JsonRpcProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcConfig {
    /// HTTP JSON-RPC endpoint.
    http_url: String,

    /// WebSocket endpoint for push subscriptions (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ws_url: Option<String>,

    /// Address of the ledger contract whose events are watched.
    contract: String,

    /// Timeout for each request.
    #[serde(default = "default_request_timeout", with = "duration_ms")]
    request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl RpcConfig {
    pub fn new(http_url: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            http_url: http_url.into(),
            ws_url: None,
            contract: contract.into(),
            request_timeout: default_request_timeout(),
        }
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = Some(ws_url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    pub fn ws_url(&self) -> Option<&str> {
        self.ws_url.as_deref()
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    #[serde(default)]
    id: Option<Value>,
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    topics: Vec<B256>,
    data: Bytes,
}

impl RpcLog {
    fn decode(&self) -> Result<Option<LedgerEvent>, ProviderError> {
        decode_log(&self.topics, &self.data)
    }
}

/// Ledger contract access over JSON-RPC.
#[derive(Debug)]
pub struct JsonRpcProvider {
    client: reqwest::Client,
    config: RpcConfig,
    contract: Address,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    /// Creates a provider. Fails if the contract address is malformed.
    pub fn new(config: RpcConfig) -> Result<Self, ProviderError> {
        let contract = parse_address(config.contract())?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            config,
            contract,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    fn timeout_error(&self) -> ProviderError {
        ProviderError::Timeout {
            seconds: self.config.request_timeout().as_secs(),
        }
    }

    fn map_http_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            self.timeout_error()
        } else {
            ProviderError::transport(e.to_string())
        }
    }

    /// Performs one JSON-RPC call over HTTP.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .client
            .post(self.config.http_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?
            .error_for_status()
            .map_err(|e| self.map_http_error(e))?
            .json()
            .await
            .map_err(|e| ProviderError::decode(e.to_string()))?;

        match (response.result, response.error) {
            (_, Some(error)) => Err(ProviderError::rpc(method, error.code, error.message)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(ProviderError::decode(format!("{} returned no result", method))),
        }
    }

    fn log_filter(&self) -> Value {
        json!({
            "address": self.contract,
            "topics": [event_topics()],
        })
    }

    /// Whether code is deployed at `address` (`eth_getCode`).
    pub async fn code_at(&self, address: &str) -> Result<bool, ProviderError> {
        let address = parse_address(address)?;
        let code: Bytes = self.call("eth_getCode", json!([address, "latest"])).await?;
        Ok(!code.is_empty())
    }

    async fn erc20_call(&self, token: &str, data: Vec<u8>) -> Result<U256, ProviderError> {
        let token = parse_address(token)?;
        let result: Bytes = self
            .call(
                "eth_call",
                json!([{ "to": token, "data": Bytes::from(data) }, "latest"]),
            )
            .await?;
        parse_word(&result)
    }

    /// ERC-20 `balanceOf(owner)` on `token`, as a decimal string.
    pub async fn erc20_balance_of(&self, token: &str, owner: &str) -> Result<String, ProviderError> {
        let call = abi::IERC20::balanceOfCall {
            account: parse_address(owner)?,
        };
        let balance = self.erc20_call(token, call.abi_encode()).await?;
        Ok(balance.to_string())
    }

    /// ERC-20 `allowance(owner, spender)` on `token`, as a decimal string.
    pub async fn erc20_allowance(
        &self,
        token: &str,
        owner: &str,
        spender: &str,
    ) -> Result<String, ProviderError> {
        let call = abi::IERC20::allowanceCall {
            owner: parse_address(owner)?,
            spender: parse_address(spender)?,
        };
        let allowance = self.erc20_call(token, call.abi_encode()).await?;
        Ok(allowance.to_string())
    }
}

#[async_trait]
impl ChainProvider for JsonRpcProvider {
    fn name(&self) -> &str {
        "json-rpc"
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        let block: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&block)
    }

    async fn logs(&self, from: u64, to: u64) -> Result<Vec<LedgerEvent>, ProviderError> {
        let mut filter = self.log_filter();
        filter["fromBlock"] = json!(format!("0x{:x}", from));
        filter["toBlock"] = json!(format!("0x{:x}", to));

        let logs: Vec<RpcLog> = self.call("eth_getLogs", json!([filter])).await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match log.decode() {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {},
                Err(e) => warn!(error = %e, "Skipping undecodable ledger log"),
            }
        }
        debug!(from = from, to = to, events = events.len(), "Scanned ledger logs");
        Ok(events)
    }

    async fn subscribe(&self) -> Result<Subscription, ProviderError> {
        let Some(ws_url) = self.config.ws_url() else {
            return Err(ProviderError::Unsupported("subscribe"));
        };
        let timeout = self.config.request_timeout();

        let (stream, _) = tokio::time::timeout(timeout, connect_async(ws_url))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| ProviderError::transport(e.to_string()))?;
        let (mut write, mut read) = stream.split();

        let request = json!({
            "jsonrpc": "2.0",
            "id": SUBSCRIBE_ID,
            "method": "eth_subscribe",
            "params": ["logs", self.log_filter()],
        });
        write
            .send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        let subscription_id = tokio::time::timeout(timeout, await_confirmation(&mut read))
            .await
            .map_err(|_| self.timeout_error())??;
        info!(subscription = %subscription_id, "Ledger event subscription confirmed");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = TaskHandle::spawn("ws-reader", move |shutdown_rx| {
            read_events(write, read, subscription_id, tx, shutdown_rx)
        });

        Ok(Subscription::new(rx, reader))
    }
}

/// Waits for the `eth_subscribe` response and returns the subscription id.
async fn await_confirmation<S>(read: &mut S) -> Result<String, ProviderError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = read.next().await {
        let message = message.map_err(|e| ProviderError::transport(e.to_string()))?;
        let Message::Text(text) = message else {
            continue;
        };

        let response: RpcResponse<String> = match serde_json::from_str(&text) {
            Ok(response) => response,
            Err(_) => continue,
        };
        if response.id != Some(json!(SUBSCRIBE_ID)) {
            continue;
        }

        return match (response.result, response.error) {
            (_, Some(error)) => Err(ProviderError::rpc("eth_subscribe", error.code, error.message)),
            (Some(id), None) => Ok(id),
            (None, None) => Err(ProviderError::decode("eth_subscribe returned no id")),
        };
    }

    Err(ProviderError::transport(
        "connection closed before subscription was confirmed",
    ))
}

#[derive(Debug, Deserialize)]
struct Notification {
    params: NotificationParams,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    subscription: String,
    result: RpcLog,
}

/// Forwards decoded events until shutdown, disconnect, or the receiver goes away.
async fn read_events<W, R>(
    mut write: W,
    mut read: R,
    subscription_id: String,
    tx: mpsc::Sender<LedgerEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    W: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown_rx) => {
                let unsubscribe = json!({
                    "jsonrpc": "2.0",
                    "id": SUBSCRIBE_ID + 1,
                    "method": "eth_unsubscribe",
                    "params": [subscription_id],
                });
                let _ = write.send(Message::Text(unsubscribe.to_string().into())).await;
                let _ = write.close().await;
                debug!("Ledger event subscription closed");
                return;
            }
            message = read.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket closed by server");
                        return;
                    },
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        return;
                    },
                    Some(Ok(_)) => continue,
                };

                let notification: Notification = match serde_json::from_str(&text) {
                    Ok(notification) => notification,
                    Err(_) => continue,
                };
                if notification.params.subscription != subscription_id {
                    continue;
                }

                match notification.params.result.decode() {
                    Ok(Some(event)) => {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    },
                    Ok(None) => {},
                    Err(e) => warn!(error = %e, "Skipping undecodable ledger log"),
                }
            }
        }
    }
}
