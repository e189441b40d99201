//! 联机会话
//!
//! 主机和加入方各自持有一份完整棋局。走子方在本地校验后发送走法，
//! 接收方重新在自己的合法走法列表中匹配并核对走后指纹，任何不一致都会结束会话。

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::classify::GameStatus;
use crate::constants::{HANDSHAKE_TIMEOUT, PROTOCOL_VERSION};
use crate::error::{ChessError, ProtocolError, Result};
use crate::game::Game;
use crate::message::{DesyncReason, PeerRole, RejectReason, SessionMessage, WireMove};
use crate::moves::Move;
use crate::piece::Color;
use crate::transport::{
    Connection, Connector, FrameWriter, Listener, NetworkConfig, TcpConnection, TcpConnector,
    TcpListener,
};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// 棋局按规则结束
    Finished(GameStatus),
    Resigned { by: Color },
    Desynchronized(DesyncReason),
    ConnectionLost,
}

impl SessionStatus {
    pub fn is_over(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

// ============================================================================
// 握手（主机、中继和加入方共用）
// ============================================================================

/// 接受方：读取 Hello 并检查协议版本，不一致时回复 Reject
pub async fn accept_hello<C: Connection>(conn: &mut C) -> Result<()> {
    let actual = match conn.recv::<SessionMessage>().await {
        Ok(SessionMessage::Hello { version }) => version,
        Ok(_) => {
            return Err(ProtocolError::UnexpectedMessage { expected: "Hello" });
        }
        // 帧头版本就不一致
        Err(ProtocolError::VersionMismatch { actual, .. }) => actual,
        Err(e) => return Err(e),
    };

    if actual != PROTOCOL_VERSION {
        let reason = RejectReason::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual,
        };
        // 对端可能已经断开，回复失败不影响结果
        let _ = conn.send(&SessionMessage::Reject { reason }).await;
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual,
        });
    }

    Ok(())
}

/// 接受方：告知对端执哪一方并开始对局
pub async fn welcome<C: Connection>(conn: &mut C, color: Color) -> Result<()> {
    conn.send(&SessionMessage::Welcome {
        version: PROTOCOL_VERSION,
        color,
    })
    .await?;
    conn.send(&SessionMessage::Start).await
}

/// 加入方：发送 Hello，等待分配颜色和开始信号
pub async fn joiner_handshake<C: Connection>(conn: &mut C) -> Result<Color> {
    conn.send(&SessionMessage::Hello {
        version: PROTOCOL_VERSION,
    })
    .await?;

    let color = match conn.recv::<SessionMessage>().await? {
        SessionMessage::Welcome { version, color } => {
            if version != PROTOCOL_VERSION {
                return Err(ProtocolError::VersionMismatch {
                    expected: PROTOCOL_VERSION,
                    actual: version,
                });
            }
            color
        }
        SessionMessage::Reject { reason } => return Err(reject_error(reason)),
        _ => return Err(ProtocolError::UnexpectedMessage { expected: "Welcome" }),
    };

    match conn.recv::<SessionMessage>().await? {
        SessionMessage::Start => Ok(color),
        _ => Err(ProtocolError::UnexpectedMessage { expected: "Start" }),
    }
}

fn reject_error(reason: RejectReason) -> ProtocolError {
    match reason {
        RejectReason::VersionMismatch { expected, actual } => {
            ProtocolError::VersionMismatch { expected, actual }
        }
        RejectReason::ServerFull => ProtocolError::ServerFull,
    }
}

// ============================================================================
// 主机监听
// ============================================================================

/// 主机监听器：接受一个加入方并建立会话
pub struct HostListener {
    listener: TcpListener,
    host_color: Color,
}

impl HostListener {
    /// 绑定地址
    pub async fn bind(addr: &str, host_color: Color) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = ?listener.local_addr(), %host_color, "host listening");
        Ok(Self {
            listener,
            host_color,
        })
    }

    pub fn local_addr(&self) -> Option<String> {
        self.listener.local_addr()
    }

    /// 等待加入方连接并完成握手
    pub async fn accept(&mut self) -> Result<Session> {
        let mut conn = self.listener.accept().await?;
        let peer = conn.peer_addr();
        info!(peer = ?peer, "peer connected");

        timeout(HANDSHAKE_TIMEOUT, accept_hello(&mut conn))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)??;
        welcome(&mut conn, self.host_color.opponent()).await?;

        Ok(Session::start(conn, self.host_color, PeerRole::Host))
    }
}

// ============================================================================
// 会话
// ============================================================================

/// 联机会话
pub struct Session {
    game: Game,
    local_color: Color,
    role: PeerRole,
    status: SessionStatus,
    peer_addr: Option<String>,
    writer: FrameWriter<OwnedWriteHalf>,
    inbox: mpsc::UnboundedReceiver<Result<SessionMessage>>,
    reader_task: JoinHandle<()>,
}

impl Session {
    /// 连接主机
    pub async fn join(addr: &str) -> Result<Session> {
        let mut conn = TcpConnector.connect(addr).await?;
        let color = joiner_handshake(&mut conn).await?;
        Ok(Session::start(conn, color, PeerRole::Joiner))
    }

    /// 按角色建立会话：主机在配置地址上等待一个加入方，加入方连接配置地址
    pub async fn connect(role: PeerRole, config: &NetworkConfig) -> Result<Session> {
        match role {
            PeerRole::Host => {
                let mut listener = HostListener::bind(&config.addr(), config.host_color).await?;
                listener.accept().await
            }
            PeerRole::Joiner => Session::join(&config.addr()).await,
        }
    }

    fn start(conn: TcpConnection, local_color: Color, role: PeerRole) -> Self {
        let peer_addr = conn.peer_addr();
        let (mut reader, writer) = conn.split();
        let (tx, inbox) = mpsc::unbounded_channel();

        // 后台读取，接收不会阻塞发送
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.recv::<SessionMessage>().await {
                    Ok(msg) => {
                        if tx.send(Ok(msg)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        info!(?role, %local_color, peer = ?peer_addr, "session started");

        Self {
            game: Game::new(),
            local_color,
            role,
            status: SessionStatus::Active,
            peer_addr,
            writer,
            inbox,
            reader_task,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn local_color(&self) -> Color {
        self.local_color
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }

    /// 是否轮到本地走棋
    pub fn is_local_turn(&self) -> bool {
        self.game.state().side_to_move == self.local_color
    }

    /// 本地走棋：校验、应用并发送给对端
    pub async fn send_local_move(&mut self, mv: &Move) -> Result<GameStatus> {
        self.ensure_active()?;
        if !self.is_local_turn() {
            return Err(ChessError::NotYourTurn.into());
        }

        let status = self.game.play(mv)?;
        let msg = SessionMessage::Move {
            mv: WireMove::from(mv),
            fingerprint: self.game.fingerprint(),
        };
        if let Err(e) = self.writer.send(&msg).await {
            warn!(error = %e, "failed to send move");
            self.status = SessionStatus::ConnectionLost;
            return Err(ProtocolError::ConnectionLost);
        }
        debug!(mv = %mv, ?status, "local move sent");

        if status.is_terminal() {
            self.status = SessionStatus::Finished(status);
        }
        Ok(status)
    }

    /// 非阻塞地检查对端走法，没有新消息时返回 None
    pub async fn poll_remote_move(&mut self) -> Result<Option<Move>> {
        self.ensure_active()?;
        match self.inbox.try_recv() {
            Ok(item) => self.handle_incoming(item).await.map(Some),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(self.connection_lost()),
        }
    }

    /// 等待对端的下一步
    pub async fn recv_remote_move(&mut self) -> Result<Move> {
        self.ensure_active()?;
        match self.inbox.recv().await {
            Some(item) => self.handle_incoming(item).await,
            None => Err(self.connection_lost()),
        }
    }

    /// 认输
    pub async fn resign(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = SessionStatus::Resigned {
            by: self.local_color,
        };
        info!(color = %self.local_color, "resigned");
        self.writer.send(&SessionMessage::Resign).await
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status.is_over() {
            Err(ProtocolError::SessionOver)
        } else {
            Ok(())
        }
    }

    fn connection_lost(&mut self) -> ProtocolError {
        info!(peer = ?self.peer_addr, "connection lost");
        self.status = SessionStatus::ConnectionLost;
        ProtocolError::ConnectionLost
    }

    async fn handle_incoming(&mut self, item: Result<SessionMessage>) -> Result<Move> {
        let msg = match item {
            Ok(msg) => msg,
            Err(ProtocolError::ConnectionLost) | Err(ProtocolError::Io(_)) => {
                return Err(self.connection_lost());
            }
            Err(e) => {
                warn!(error = %e, "undecodable message from peer");
                return Err(self.desync(DesyncReason::MalformedMessage).await);
            }
        };

        match msg {
            SessionMessage::Move { mv, fingerprint } => {
                self.apply_remote(mv, fingerprint).await
            }
            SessionMessage::Resign => {
                let color = self.local_color.opponent();
                info!(%color, "peer resigned");
                self.status = SessionStatus::Resigned { by: color };
                Err(ProtocolError::PeerResigned { color })
            }
            SessionMessage::DesyncReport { reason } => {
                warn!(%reason, "peer reported desync");
                self.status = SessionStatus::Desynchronized(reason);
                Err(ProtocolError::Desynchronized(reason))
            }
            SessionMessage::PeerLeft => Err(self.connection_lost()),
            other => {
                warn!(kind = other.kind(), "unexpected message during game");
                Err(self.desync(DesyncReason::UnexpectedMessage).await)
            }
        }
    }

    async fn apply_remote(&mut self, wire: WireMove, fingerprint: u64) -> Result<Move> {
        if self.is_local_turn() {
            return Err(self.desync(DesyncReason::OutOfTurn).await);
        }

        let legal = self.game.legal_moves();
        let Some(mv) = wire.resolve(&legal) else {
            warn!(mv = %wire, "remote move is not legal locally");
            return Err(self.desync(DesyncReason::IllegalMove).await);
        };

        let status = match self.game.play(&mv) {
            Ok(status) => status,
            Err(_) => return Err(self.desync(DesyncReason::IllegalMove).await),
        };
        if self.game.fingerprint() != fingerprint {
            return Err(self.desync(DesyncReason::FingerprintMismatch).await);
        }
        debug!(mv = %mv, ?status, "remote move applied");

        if status.is_terminal() {
            self.status = SessionStatus::Finished(status);
        }
        Ok(mv)
    }

    /// 进入不同步状态并通知对端
    async fn desync(&mut self, reason: DesyncReason) -> ProtocolError {
        warn!(%reason, peer = ?self.peer_addr, "session desynchronized");
        self.status = SessionStatus::Desynchronized(reason);
        let _ = self
            .writer
            .send(&SessionMessage::DesyncReport { reason })
            .await;
        ProtocolError::Desynchronized(reason)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
