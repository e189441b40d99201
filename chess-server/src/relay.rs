//! 中继服务器
//!
//! 中继本身不下棋：它按到达顺序把两个加入方配成一局，先到的执白，
//! 然后在两端之间转发消息。每一步在转发前都用自己的棋局副本做与对端相同的校验。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use protocol::{
    accept_hello, welcome, Color, Connection, DesyncReason, FrameWriter, Game, GameStatus,
    Listener, ProtocolError, RejectReason, Result, SessionMessage, TcpConnection, TcpListener,
};

use crate::config::RelayConfig;

/// 当前连接数，可以从其它任务读取
#[derive(Debug, Clone, Default)]
pub struct PeerCount(Arc<AtomicUsize>);

impl PeerCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// 登记一个连接，返回登记后的连接数
    fn register(&self) -> (PeerGuard, usize) {
        let count = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        (PeerGuard(self.0.clone()), count)
    }
}

/// 随连接一起移动，连接结束时自动注销
struct PeerGuard(Arc<AtomicUsize>);

impl Drop for PeerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 完成握手、等待配对的连接
struct ReadyPeer {
    conn: TcpConnection,
    addr: Option<String>,
    guard: PeerGuard,
}

/// 一局的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// 棋局按规则结束
    Finished(GameStatus),
    Resigned { by: Color },
    /// by 为违规或报告不同步的一方
    Desynchronized { by: Color, reason: DesyncReason },
    /// 一方断开
    PeerLeft { color: Color },
}

/// 中继服务器
pub struct Relay {
    listener: TcpListener,
    config: RelayConfig,
    peers: PeerCount,
}

impl Relay {
    /// 绑定配置中的地址
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind).await?;
        info!(addr = ?listener.local_addr(), max_peers = config.max_peers, "relay listening");
        Ok(Self {
            listener,
            config,
            peers: PeerCount::default(),
        })
    }

    pub fn local_addr(&self) -> Option<String> {
        self.listener.local_addr()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.get()
    }

    /// 连接数的共享句柄，run 之后仍可读取
    pub fn peers(&self) -> PeerCount {
        self.peers.clone()
    }

    /// 持续接受连接，握手和对局都在独立任务中进行
    pub async fn run(mut self) -> Result<()> {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        tokio::spawn(pair_peers(ready_rx));

        loop {
            let mut conn = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            };
            let addr = conn.peer_addr();
            let (guard, count) = self.peers.register();

            let limit = self.config.handshake_timeout();
            if count > self.config.max_peers {
                info!(peer = ?addr, count, "server full, rejecting");
                tokio::spawn(async move {
                    // 先读掉 Hello，再回复
                    let _ = timeout(limit, conn.recv::<SessionMessage>()).await;
                    let _ = conn
                        .send(&SessionMessage::Reject {
                            reason: RejectReason::ServerFull,
                        })
                        .await;
                    let _ = conn.close().await;
                    drop(guard);
                });
                continue;
            }
            info!(peer = ?addr, peers = count, "peer connected");

            let ready_tx = ready_tx.clone();
            tokio::spawn(async move {
                match timeout(limit, accept_hello(&mut conn)).await {
                    Ok(Ok(())) => {
                        let _ = ready_tx.send(ReadyPeer { conn, addr, guard });
                    }
                    Ok(Err(e)) => {
                        info!(peer = ?addr, error = %e, "handshake failed");
                        let _ = conn.close().await;
                    }
                    Err(_) => info!(peer = ?addr, "handshake timed out"),
                }
            });
        }
    }
}

/// 配对循环中的事件
enum PairEvent {
    Ready(Option<ReadyPeer>),
    /// 等待中的一方断开或发来了不该发的消息
    WaitingLeft,
}

/// 按到达顺序两两配对
async fn pair_peers(mut ready: mpsc::UnboundedReceiver<ReadyPeer>) {
    let mut waiting: Option<ReadyPeer> = None;

    loop {
        // 等待对手期间对方不应发送任何消息，任何读取结果都视为离开
        let event = match waiting.as_mut() {
            None => PairEvent::Ready(ready.recv().await),
            Some(white) => tokio::select! {
                peer = ready.recv() => PairEvent::Ready(peer),
                _ = white.conn.recv::<SessionMessage>() => PairEvent::WaitingLeft,
            },
        };

        let mut peer = match event {
            PairEvent::Ready(Some(peer)) => peer,
            PairEvent::Ready(None) => break,
            PairEvent::WaitingLeft => {
                if let Some(left) = waiting.take() {
                    info!(peer = ?left.addr, "waiting peer left");
                }
                continue;
            }
        };

        let Some(mut white) = waiting.take() else {
            debug!(peer = ?peer.addr, "peer waiting for opponent");
            waiting = Some(peer);
            continue;
        };

        // 等待中的一方可能已经离开
        if let Err(e) = welcome(&mut white.conn, Color::White).await {
            info!(peer = ?white.addr, error = %e, "waiting peer left before pairing");
            waiting = Some(peer);
            continue;
        }
        if let Err(e) = welcome(&mut peer.conn, Color::Black).await {
            info!(peer = ?peer.addr, error = %e, "peer left during pairing");
            let _ = white.conn.send(&SessionMessage::PeerLeft).await;
            continue;
        }

        info!(white = ?white.addr, black = ?peer.addr, "match started");
        tokio::spawn(async move {
            let outcome = run_match(white, peer).await;
            debug!(?outcome, "match ended");
        });
    }
}

/// 一局中一方的读写端
struct Seat {
    addr: Option<String>,
    writer: FrameWriter<OwnedWriteHalf>,
    inbox: mpsc::UnboundedReceiver<Result<SessionMessage>>,
    reader_task: JoinHandle<()>,
    _guard: PeerGuard,
}

impl Seat {
    fn new(peer: ReadyPeer) -> Self {
        let (mut reader, writer) = peer.conn.split();
        let (tx, inbox) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            loop {
                let item = reader.recv::<SessionMessage>().await;
                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    break;
                }
            }
        });

        Self {
            addr: peer.addr,
            writer,
            inbox,
            reader_task,
            _guard: peer.guard,
        }
    }

    async fn send(&mut self, msg: &SessionMessage) {
        if let Err(e) = self.writer.send(msg).await {
            debug!(peer = ?self.addr, error = %e, kind = msg.kind(), "send failed");
        }
    }
}

impl Drop for Seat {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// 转发一局棋直到结束
async fn run_match(white: ReadyPeer, black: ReadyPeer) -> MatchOutcome {
    let mut sides = [Seat::new(white), Seat::new(black)];
    let mut game = Game::new();

    loop {
        let (color, item) = {
            let [white, black] = &mut sides;
            tokio::select! {
                item = white.inbox.recv() => (Color::White, item),
                item = black.inbox.recv() => (Color::Black, item),
            }
        };
        let mover = color.index();
        let other = color.opponent().index();

        let msg = match item {
            Some(Ok(msg)) => msg,
            Some(Err(ProtocolError::ConnectionLost)) | Some(Err(ProtocolError::Io(_))) | None => {
                info!(%color, peer = ?sides[mover].addr, "peer left the match");
                sides[other].send(&SessionMessage::PeerLeft).await;
                return MatchOutcome::PeerLeft { color };
            }
            Some(Err(e)) => {
                warn!(%color, error = %e, "undecodable message");
                return desync(&mut sides, color, DesyncReason::MalformedMessage).await;
            }
        };

        match msg {
            SessionMessage::Move { mv, fingerprint } => {
                if game.state().side_to_move != color {
                    return desync(&mut sides, color, DesyncReason::OutOfTurn).await;
                }
                let Some(resolved) = mv.resolve(&game.legal_moves()) else {
                    warn!(%color, mv = %mv, "illegal move");
                    return desync(&mut sides, color, DesyncReason::IllegalMove).await;
                };
                let status = match game.play(&resolved) {
                    Ok(status) => status,
                    Err(_) => return desync(&mut sides, color, DesyncReason::IllegalMove).await,
                };
                if game.fingerprint() != fingerprint {
                    return desync(&mut sides, color, DesyncReason::FingerprintMismatch).await;
                }

                debug!(%color, mv = %resolved, ?status, "move relayed");
                sides[other]
                    .send(&SessionMessage::Move { mv, fingerprint })
                    .await;
                if status.is_terminal() {
                    return MatchOutcome::Finished(status);
                }
            }
            SessionMessage::Resign => {
                sides[other].send(&SessionMessage::Resign).await;
                return MatchOutcome::Resigned { by: color };
            }
            SessionMessage::DesyncReport { reason } => {
                warn!(%color, %reason, "peer reported desync");
                sides[other].send(&SessionMessage::DesyncReport { reason }).await;
                return MatchOutcome::Desynchronized { by: color, reason };
            }
            other_msg => {
                warn!(%color, kind = other_msg.kind(), "unexpected message during match");
                return desync(&mut sides, color, DesyncReason::UnexpectedMessage).await;
            }
        }
    }
}

/// 通知双方不同步并结束本局
async fn desync(sides: &mut [Seat; 2], by: Color, reason: DesyncReason) -> MatchOutcome {
    warn!(%by, %reason, "match desynchronized");
    for side in sides.iter_mut() {
        side.send(&SessionMessage::DesyncReport { reason }).await;
    }
    MatchOutcome::Desynchronized { by, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{
        joiner_handshake, Connector, Move, Session, SessionStatus, SpecialMove, Square,
        TcpConnector, WireMove,
    };

    fn sq(s: &str) -> Square {
        s.parse().unwrap()
    }

    fn test_config(max_peers: usize) -> RelayConfig {
        RelayConfig {
            bind: "127.0.0.1:0".to_string(),
            max_peers,
            handshake_timeout_secs: 5,
        }
    }

    async fn start_relay(max_peers: usize) -> (String, PeerCount) {
        let relay = Relay::bind(test_config(max_peers)).await.unwrap();
        let addr = relay.local_addr().unwrap();
        let peers = relay.peers();
        tokio::spawn(relay.run());
        (addr, peers)
    }

    /// 两个会话通过中继配对，按颜色返回 (白, 黑)
    async fn relayed_pair(addr: &str) -> (Session, Session) {
        let (a, b) = tokio::join!(Session::join(addr), Session::join(addr));
        let (a, b) = (a.unwrap(), b.unwrap());
        if a.local_color() == Color::White {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// 手动控制的加入方
    async fn raw_peer(addr: &str) -> (TcpConnection, Color) {
        let mut conn = TcpConnector.connect(addr).await.unwrap();
        let color = joiner_handshake(&mut conn).await.unwrap();
        (conn, color)
    }

    fn legal(session: &Session, from: &str, to: &str) -> Move {
        session.game().find_move(sq(from), sq(to), None).unwrap()
    }

    #[tokio::test]
    async fn test_relay_full_game() {
        let (addr, peers) = start_relay(8).await;
        let (mut white, mut black) = relayed_pair(&addr).await;
        assert_eq!(black.local_color(), Color::Black);
        assert_eq!(peers.get(), 2);

        let moves = [("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")];
        for (ply, (from, to)) in moves.iter().enumerate() {
            let (mover, receiver) = if ply % 2 == 0 {
                (&mut white, &mut black)
            } else {
                (&mut black, &mut white)
            };
            let mv = legal(mover, from, to);
            mover.send_local_move(&mv).await.unwrap();
            assert_eq!(receiver.recv_remote_move().await.unwrap(), mv);
        }

        let mate = SessionStatus::Finished(GameStatus::Checkmate {
            winner: Color::Black,
        });
        assert_eq!(white.status(), mate);
        assert_eq!(black.status(), mate);
        assert_eq!(white.game().fingerprint(), black.game().fingerprint());
    }

    #[tokio::test]
    async fn test_relay_forwards_resign() {
        let (addr, _peers) = start_relay(8).await;
        let (mut white, mut black) = relayed_pair(&addr).await;

        white.resign().await.unwrap();
        assert!(matches!(
            black.recv_remote_move().await,
            Err(ProtocolError::PeerResigned {
                color: Color::White
            })
        ));
        assert_eq!(
            black.status(),
            SessionStatus::Resigned { by: Color::White }
        );
    }

    #[tokio::test]
    async fn test_relay_rejects_injected_move() {
        let (addr, _peers) = start_relay(8).await;

        let (session, (mut conn, raw_color)) = tokio::join!(Session::join(&addr), raw_peer(&addr));
        let mut session = session.unwrap();
        assert_eq!(session.local_color(), raw_color.opponent());

        // 兵不能一次走三格
        let (from, to) = if raw_color == Color::White {
            ("e2", "e5")
        } else {
            ("e7", "e4")
        };
        let injected = SessionMessage::Move {
            mv: WireMove {
                from: sq(from),
                to: sq(to),
                special: SpecialMove::Normal,
            },
            fingerprint: 0,
        };
        conn.send(&injected).await.unwrap();

        let expected = if raw_color == Color::White {
            DesyncReason::IllegalMove
        } else {
            DesyncReason::OutOfTurn
        };
        assert!(matches!(
            session.recv_remote_move().await,
            Err(ProtocolError::Desynchronized(reason)) if reason == expected
        ));
        assert_eq!(session.status(), SessionStatus::Desynchronized(expected));

        // 违规一方也收到通知
        let report: SessionMessage = conn.recv().await.unwrap();
        assert_eq!(report, SessionMessage::DesyncReport { reason: expected });
    }

    #[tokio::test]
    async fn test_relay_rejects_bad_fingerprint() {
        let (addr, _peers) = start_relay(8).await;
        let (session, (mut conn, raw_color)) = tokio::join!(Session::join(&addr), raw_peer(&addr));
        let mut session = session.unwrap();

        // 手动控制的一方走一步合法的棋，但指纹是错的
        let (from, to) = if raw_color == Color::White {
            ("e2", "e4")
        } else {
            let mv = legal(&session, "e2", "e4");
            session.send_local_move(&mv).await.unwrap();
            let forwarded: SessionMessage = conn.recv().await.unwrap();
            assert!(matches!(forwarded, SessionMessage::Move { .. }));
            ("e7", "e5")
        };
        let forged = SessionMessage::Move {
            mv: WireMove {
                from: sq(from),
                to: sq(to),
                special: SpecialMove::DoublePawnPush,
            },
            fingerprint: 0,
        };
        conn.send(&forged).await.unwrap();

        assert!(matches!(
            session.recv_remote_move().await,
            Err(ProtocolError::Desynchronized(DesyncReason::FingerprintMismatch))
        ));
    }

    #[tokio::test]
    async fn test_relay_peer_left() {
        let (addr, _peers) = start_relay(8).await;
        let (white, mut black) = relayed_pair(&addr).await;

        drop(white);
        assert!(matches!(
            black.recv_remote_move().await,
            Err(ProtocolError::ConnectionLost)
        ));
        assert_eq!(black.status(), SessionStatus::ConnectionLost);
    }

    #[tokio::test]
    async fn test_relay_server_full() {
        let (addr, peers) = start_relay(1).await;

        let first_addr = addr.clone();
        let _first = tokio::spawn(async move { Session::join(&first_addr).await });
        while peers.get() < 1 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert!(matches!(
            Session::join(&addr).await,
            Err(ProtocolError::ServerFull)
        ));
    }

    async fn wait_for_peers(peers: &PeerCount, expected: usize) {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while peers.get() != expected {
            assert!(tokio::time::Instant::now() < deadline, "peer count stuck at {}", peers.get());
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_waiting_peer_leaving_frees_its_slot() {
        let (addr, peers) = start_relay(2).await;

        let mut conn = TcpConnector.connect(&addr).await.unwrap();
        conn.send(&SessionMessage::Hello {
            version: protocol::PROTOCOL_VERSION,
        })
        .await
        .unwrap();
        wait_for_peers(&peers, 1).await;

        drop(conn);
        wait_for_peers(&peers, 0).await;

        // 离开的一方不会被配给下一位到达者
        let (white, black) = relayed_pair(&addr).await;
        assert_eq!(white.local_color(), Color::White);
        assert_eq!(black.local_color(), Color::Black);
        assert_eq!(peers.get(), 2);
    }

    #[tokio::test]
    async fn test_relay_version_mismatch() {
        let (addr, _peers) = start_relay(8).await;

        let mut conn = TcpConnector.connect(&addr).await.unwrap();
        conn.send(&SessionMessage::Hello { version: 99 }).await.unwrap();
        let reply: SessionMessage = conn.recv().await.unwrap();
        assert_eq!(
            reply,
            SessionMessage::Reject {
                reason: RejectReason::VersionMismatch {
                    expected: protocol::PROTOCOL_VERSION,
                    actual: 99,
                }
            }
        );
    }
}
