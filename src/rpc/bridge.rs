// src/rpc/bridge.rs

//! Production binding of [`RemotePrimitives`] to a remote-API bridge.
//!
//! The bridge listens on `NODE:PORT` and speaks newline-delimited JSON: one
//! request object per primitive call, answered by exactly one response
//! object carrying the call's status code and results.
//!
//! ```text
//! -> {"id":3,"call":"T32_Cmd","args":["AREA.Select ABCDEFGH"]}
//! <- {"id":3,"status":0}
//! ```
//!
//! `T32_Init` opens the TCP connection and `T32_Exit` closes it. Transport
//! faults are reported with the table's negative codes so they classify as
//! communication errors.
//!
//! This wire format is specific to t32ctl. No TRACE32 PowerView instance
//! speaks it natively; it needs a bridge process that forwards each request
//! to the vendor remote API library and writes back the result. Talking to
//! the engine's own `RCL=NETASSIST` port directly requires another
//! [`Connector`] implementation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::rpc::{AddressWidth, CallFuture, ConfigKey, Connector, DeviceKind, RemotePrimitives};
use crate::status::codes::{
    T32_ERR_COM_PARA_FAIL, T32_ERR_COM_RECEIVE_FAIL, T32_ERR_COM_SEQ_FAIL,
    T32_ERR_COM_TRANSMIT_FAIL,
};

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    call: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Response {
    id: u64,
    status: i32,
    #[serde(default)]
    text: String,
    #[serde(default)]
    tag: u32,
    #[serde(default)]
    kinds: u16,
    #[serde(default)]
    state: i32,
    #[serde(default)]
    data: Vec<u8>,
}

/// Connector for [`BridgeApi`] handles.
#[derive(Debug, Clone, Default)]
pub struct BridgeConnector;

impl Connector for BridgeConnector {
    type Api = BridgeApi;

    fn open(&self) -> BridgeApi {
        BridgeApi::default()
    }
}

#[derive(Debug)]
pub struct BridgeApi {
    node: String,
    port: u16,
    packlen: Option<u32>,
    timeout: Option<Duration>,
    stream: Option<BufReader<TcpStream>>,
    next_id: u64,
}

impl Default for BridgeApi {
    fn default() -> Self {
        Self {
            node: "localhost".to_string(),
            port: 20000,
            packlen: None,
            timeout: None,
            stream: None,
            next_id: 1,
        }
    }
}

impl BridgeApi {
    fn apply_config(&mut self, key: ConfigKey, value: &str) -> i32 {
        let value = value.trim();
        match key {
            ConfigKey::Node => {
                if value.is_empty() {
                    return T32_ERR_COM_PARA_FAIL;
                }
                self.node = value.to_string();
            }
            ConfigKey::Port => match value.parse() {
                Ok(port) => self.port = port,
                Err(_) => return T32_ERR_COM_PARA_FAIL,
            },
            ConfigKey::PackLen => match value.parse() {
                Ok(packlen) => self.packlen = Some(packlen),
                Err(_) => return T32_ERR_COM_PARA_FAIL,
            },
            ConfigKey::Timeout => match value.parse() {
                Ok(secs) => self.timeout = Some(Duration::from_secs(secs)),
                Err(_) => return T32_ERR_COM_PARA_FAIL,
            },
            // Only meaningful for UDP links; accepted for compatibility.
            ConfigKey::HostPort => {}
        }
        0
    }

    async fn connect(&mut self) -> i32 {
        let addr = (self.node.as_str(), self.port);
        let stream = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, TcpStream::connect(addr)).await {
                Ok(result) => result,
                Err(_) => return T32_ERR_COM_TRANSMIT_FAIL,
            },
            None => TcpStream::connect(addr).await,
        };
        match stream {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                self.stream = Some(BufReader::new(stream));
                0
            }
            Err(err) => {
                debug!(node = %self.node, port = self.port, error = %err, "bridge connect failed");
                T32_ERR_COM_TRANSMIT_FAIL
            }
        }
    }

    async fn call(&mut self, call: &str, args: Vec<Value>) -> Response {
        match self.roundtrip(call, args).await {
            Ok(response) => response,
            Err(status) => Response {
                status,
                ..Response::default()
            },
        }
    }

    async fn roundtrip(&mut self, call: &str, args: Vec<Value>) -> Result<Response, i32> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_string(&Request { id, call, args })
            .map_err(|_| T32_ERR_COM_PARA_FAIL)?;
        line.push('\n');

        let limit = self.timeout;
        let Some(stream) = self.stream.as_mut() else {
            return Err(T32_ERR_COM_SEQ_FAIL);
        };
        trace!(call, id, "bridge request");

        let exchange = async {
            stream
                .get_mut()
                .write_all(line.as_bytes())
                .await
                .map_err(|_| T32_ERR_COM_TRANSMIT_FAIL)?;
            let mut reply = String::new();
            let n = stream
                .read_line(&mut reply)
                .await
                .map_err(|_| T32_ERR_COM_RECEIVE_FAIL)?;
            if n == 0 {
                return Err(T32_ERR_COM_RECEIVE_FAIL);
            }
            Ok::<_, i32>(reply)
        };
        let reply = match limit {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| T32_ERR_COM_RECEIVE_FAIL)??,
            None => exchange.await?,
        };

        let response: Response =
            serde_json::from_str(reply.trim()).map_err(|_| T32_ERR_COM_RECEIVE_FAIL)?;
        if response.id != id {
            return Err(T32_ERR_COM_SEQ_FAIL);
        }
        Ok(response)
    }

    async fn simple(&mut self, call: &str, args: Vec<Value>) -> i32 {
        self.call(call, args).await.status
    }
}

impl RemotePrimitives for BridgeApi {
    fn config<'a>(&'a mut self, key: ConfigKey, value: &'a str) -> CallFuture<'a, i32> {
        Box::pin(async move { self.apply_config(key, value) })
    }

    fn init(&mut self) -> CallFuture<'_, i32> {
        Box::pin(async move {
            if self.stream.is_none() {
                let status = self.connect().await;
                if status != 0 {
                    return status;
                }
            }
            let args = match self.packlen {
                Some(packlen) => vec![json!(packlen)],
                None => Vec::new(),
            };
            let status = self.simple("T32_Init", args).await;
            if status != 0 {
                self.stream = None;
            }
            status
        })
    }

    fn attach(&mut self, device: DeviceKind) -> CallFuture<'_, i32> {
        Box::pin(async move { self.simple("T32_Attach", vec![json!(device.code())]).await })
    }

    fn exit(&mut self) -> CallFuture<'_, i32> {
        Box::pin(async move {
            if self.stream.is_none() {
                return 0;
            }
            let status = self.simple("T32_Exit", Vec::new()).await;
            self.stream = None;
            status
        })
    }

    fn ping(&mut self) -> CallFuture<'_, i32> {
        Box::pin(async move { self.simple("T32_Ping", Vec::new()).await })
    }

    fn nop(&mut self) -> CallFuture<'_, i32> {
        Box::pin(async move { self.simple("T32_Nop", Vec::new()).await })
    }

    fn cmd<'a>(&'a mut self, text: &'a str) -> CallFuture<'a, i32> {
        Box::pin(async move { self.simple("T32_Cmd", vec![json!(text)]).await })
    }

    fn execute_command<'a>(
        &'a mut self,
        text: &'a str,
        capacity: usize,
    ) -> CallFuture<'a, (i32, String)> {
        Box::pin(async move {
            let response = self
                .call("T32_ExecuteCommand", vec![json!(text), json!(capacity)])
                .await;
            (response.status, response.text)
        })
    }

    fn execute_function<'a>(
        &'a mut self,
        expression: &'a str,
        capacity: usize,
    ) -> CallFuture<'a, (i32, String, u32)> {
        Box::pin(async move {
            let response = self
                .call(
                    "T32_ExecuteFunction",
                    vec![json!(expression), json!(capacity)],
                )
                .await;
            (response.status, response.text, response.tag)
        })
    }

    fn get_message_string(&mut self) -> CallFuture<'_, (i32, String, u16)> {
        Box::pin(async move {
            let response = self.call("T32_GetMessageString", Vec::new()).await;
            (response.status, response.text, response.kinds)
        })
    }

    fn get_practice_state(&mut self) -> CallFuture<'_, (i32, i32)> {
        Box::pin(async move {
            let response = self.call("T32_GetPracticeState", Vec::new()).await;
            (response.status, response.state)
        })
    }

    fn terminate(&mut self, exit_code: i32) -> CallFuture<'_, i32> {
        Box::pin(async move { self.simple("T32_Terminate", vec![json!(exit_code)]).await })
    }

    fn stop(&mut self) -> CallFuture<'_, i32> {
        Box::pin(async move { self.simple("T32_Stop", Vec::new()).await })
    }

    fn read_memory(
        &mut self,
        address: u64,
        width: AddressWidth,
        len: usize,
    ) -> CallFuture<'_, (i32, Vec<u8>)> {
        Box::pin(async move {
            let response = self
                .call(
                    "T32_ReadMemory",
                    vec![json!(address), json!(width.bits()), json!(len)],
                )
                .await;
            (response.status, response.data)
        })
    }

    fn write_memory<'a>(
        &'a mut self,
        address: u64,
        width: AddressWidth,
        data: &'a [u8],
    ) -> CallFuture<'a, i32> {
        Box::pin(async move {
            self.simple(
                "T32_WriteMemory",
                vec![json!(address), json!(width.bits()), json!(data)],
            )
            .await
        })
    }
}
