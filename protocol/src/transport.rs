//! 传输层抽象
//!
//! 提供 Connector/Connection/Listener traits 使会话层与具体传输实现解耦。
//!
//! 帧格式：`[版本 u8][长度 u32 大端][bincode 消息体]`

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{ProtocolError, Result};
use crate::constants::{CONNECT_TIMEOUT, DEFAULT_PORT, MAX_FRAME_SIZE, PROTOCOL_VERSION};
use crate::piece::Color;

/// 网络配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// 主机执哪一方（加入方执另一方）
    pub host_color: Color,
}

impl NetworkConfig {
    /// `host:port` 形式的地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            host_color: Color::White,
        }
    }
}

/// 连接抽象 trait（核心抽象，用于业务层）
#[async_trait]
pub trait Connection: Send + Sync {
    /// 发送消息
    async fn send<M: Serialize + Send + Sync>(&mut self, msg: &M) -> Result<()>;

    /// 接收消息
    async fn recv<M: DeserializeOwned>(&mut self) -> Result<M>;

    /// 关闭连接
    async fn close(&mut self) -> Result<()>;

    /// 获取远端地址
    fn peer_addr(&self) -> Option<String>;
}

/// 连接器 trait（客户端使用）
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    /// 建立连接
    async fn connect(&self, addr: &str) -> Result<Self::Conn>;
}

/// 监听器 trait（服务端使用）
#[async_trait]
pub trait Listener: Send + Sync + Sized {
    type Conn: Connection;

    /// 绑定地址
    async fn bind(addr: &str) -> Result<Self>;

    /// 接受连接
    async fn accept(&mut self) -> Result<Self::Conn>;

    /// 获取本地地址
    fn local_addr(&self) -> Option<String>;
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 连接器
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)?
            .map_err(ProtocolError::Io)?;

        TcpConnection::from_stream(stream)
    }
}

/// TCP 连接
pub struct TcpConnection {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    peer_addr: Option<String>,
}

impl TcpConnection {
    /// 从 TcpStream 创建（服务端使用）
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok().map(|a| a.to_string());
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
            peer_addr,
        })
    }

    /// 分离读写端
    pub fn split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send<M: Serialize + Send + Sync>(&mut self, msg: &M) -> Result<()> {
        self.writer.write_frame(msg).await
    }

    async fn recv<M: DeserializeOwned>(&mut self) -> Result<M> {
        self.reader.read_frame().await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }

    fn peer_addr(&self) -> Option<String> {
        self.peer_addr.clone()
    }
}

/// TCP 监听器
pub struct TcpListener {
    listener: tokio::net::TcpListener,
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpConnection;

    async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(ProtocolError::Io)?;
        Ok(Self { listener })
    }

    async fn accept(&mut self) -> Result<Self::Conn> {
        let (stream, _addr) = self.listener.accept().await.map_err(ProtocolError::Io)?;
        TcpConnection::from_stream(stream)
    }

    fn local_addr(&self) -> Option<String> {
        self.listener.local_addr().ok().map(|a| a.to_string())
    }
}

// ============================================================================
// 帧编解码
// ============================================================================

/// 帧头大小: 1 字节版本 + 4 字节长度
const HEADER_SIZE: usize = 5;

/// 对端关闭或重置连接都视为连接丢失
fn read_error(e: std::io::Error) -> ProtocolError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted => ProtocolError::ConnectionLost,
        _ => ProtocolError::Io(e),
    }
}

/// 帧读取器
pub struct FrameReader<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    /// 创建新的帧读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// 读取并解码一帧消息
    pub async fn read_frame<M: DeserializeOwned>(&mut self) -> Result<M> {
        // 读取帧头
        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header).await.map_err(read_error)?;

        // 解析版本号
        let version = header[0];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: version,
            });
        }

        // 解析长度（大端序）
        let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;

        // 检查帧大小
        if length > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }

        // 读取消息体
        if self.buffer.len() < length {
            self.buffer.resize(length, 0);
        }
        self.reader
            .read_exact(&mut self.buffer[..length])
            .await
            .map_err(read_error)?;

        // 反序列化
        bincode::deserialize(&self.buffer[..length])
            .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }

    /// 接收消息（read_frame 的别名）
    pub async fn recv<M: DeserializeOwned>(&mut self) -> Result<M> {
        self.read_frame().await
    }
}

/// 帧写入器
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    /// 创建新的帧写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 编码并写入一帧消息
    pub async fn write_frame<M: Serialize>(&mut self, msg: &M) -> Result<()> {
        // 序列化消息
        let payload = bincode::serialize(msg)?;

        // 检查大小
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        // 构造帧头
        let length = payload.len() as u32;
        let mut header = [0u8; HEADER_SIZE];
        header[0] = PROTOCOL_VERSION;
        header[1..5].copy_from_slice(&length.to_be_bytes());

        // 写入帧头和消息体
        self.writer.write_all(&header).await?;
        self.writer.write_all(&payload).await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// 发送消息（write_frame 的别名）
    pub async fn send<M: Serialize>(&mut self, msg: &M) -> Result<()> {
        self.write_frame(msg).await
    }

    /// 关闭写方向，对端随后读到 EOF
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// 获取底层写入端
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SessionMessage;

    #[tokio::test]
    async fn test_tcp_connection() {
        // 启动监听
        let mut listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // 客户端连接
        let client_handle = tokio::spawn(async move {
            let connector = TcpConnector;
            let mut conn = connector.connect(&addr).await.unwrap();

            conn.send(&SessionMessage::Hello { version: 1 }).await.unwrap();

            let msg: SessionMessage = conn.recv().await.unwrap();
            assert_eq!(
                msg,
                SessionMessage::Welcome {
                    version: 1,
                    color: Color::Black
                }
            );
        });

        // 服务端接受连接
        let mut conn = listener.accept().await.unwrap();
        assert!(conn.peer_addr().is_some());

        let msg: SessionMessage = conn.recv().await.unwrap();
        assert_eq!(msg, SessionMessage::Hello { version: 1 });

        conn.send(&SessionMessage::Welcome {
            version: 1,
            color: Color::Black,
        })
        .await
        .unwrap();

        client_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_frame_header_layout() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        writer.send(&SessionMessage::Start).await.unwrap();
        drop(writer);

        let mut raw = Vec::new();
        let mut server = server;
        server.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw, vec![PROTOCOL_VERSION, 0, 0, 0, 4, 3, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_version_mismatch_frame() {
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(&[PROTOCOL_VERSION + 1, 0, 0, 0, 4, 3, 0, 0, 0])
            .await
            .unwrap();

        let mut reader = FrameReader::new(server);
        let result: Result<SessionMessage> = reader.recv().await;
        assert!(matches!(
            result,
            Err(ProtocolError::VersionMismatch { actual, .. }) if actual == PROTOCOL_VERSION + 1
        ));
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(&[PROTOCOL_VERSION, 0, 0, 0, 4, 99, 0, 0, 0])
            .await
            .unwrap();

        let mut reader = FrameReader::new(server);
        let result: Result<SessionMessage> = reader.recv().await;
        assert!(matches!(result, Err(ProtocolError::MalformedMessage(_))));
    }

    #[tokio::test]
    async fn test_frame_too_large() {
        let (mut client, server) = tokio::io::duplex(1024);
        let length = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        let mut header = vec![PROTOCOL_VERSION];
        header.extend_from_slice(&length);
        client.write_all(&header).await.unwrap();

        let mut reader = FrameReader::new(server);
        let result: Result<SessionMessage> = reader.recv().await;
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_eof_is_connection_lost() {
        let (client, server) = tokio::io::duplex(1024);
        drop(client);

        let mut reader = FrameReader::new(server);
        let result: Result<SessionMessage> = reader.recv().await;
        assert!(matches!(result, Err(ProtocolError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_close_is_seen_as_connection_lost() {
        let mut listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut conn = TcpConnector.connect(&addr).await.unwrap();
            conn.send(&SessionMessage::Resign).await.unwrap();
            conn.close().await.unwrap();
            // 只关闭写方向，仍能收到对端的回复
            conn.recv::<SessionMessage>().await.unwrap()
        });

        let mut server = listener.accept().await.unwrap();
        let first: SessionMessage = server.recv().await.unwrap();
        assert_eq!(first, SessionMessage::Resign);
        let next: Result<SessionMessage> = server.recv().await;
        assert!(matches!(next, Err(ProtocolError::ConnectionLost)));

        server.send(&SessionMessage::PeerLeft).await.unwrap();
        assert_eq!(client.await.unwrap(), SessionMessage::PeerLeft);
    }

    #[test]
    fn test_network_config_default() {
        let config = NetworkConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:5555");
        assert_eq!(config.host_color, Color::White);
    }
}
