use std::fs;
use std::io::{IoSlice, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::socket::{send, sendmsg, ControlMessage, MsgFlags};
use tracing::{debug, info, warn};

use framering_core::error::{Result, TransportError};
use framering_core::wire::{HandshakeHeader, ACK_READY, FD_SENTINEL};

/// 控制通道服务端
///
/// 一个 well-known 路径上的 Unix Socket 监听端点。
/// 监听端点常驻非阻塞模式，由 ticker 线程周期性 try_accept；
/// 同一时刻最多一个消费者会话。
#[derive(Debug)]
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// 建立监听端点
    ///
    /// 1. 清掉上次运行残留的 socket 文件
    /// 2. bind + listen
    /// 3. 放开权限位 —— 消费者进程不必与生产者同特权
    /// 4. 切非阻塞，accept 走轮询
    pub fn bind<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            fs::remove_file(&path)?;
            debug!(path = %path.display(), "Removed stale control socket");
        }

        let listener = UnixListener::bind(&path)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o777))?;
        listener.set_nonblocking(true)?;

        info!(path = %path.display(), "Control channel listening");
        Ok(Self { listener, path })
    }

    /// 非阻塞 accept：没有等待中的消费者时返回 None
    pub fn try_accept(&self) -> Result<Option<UnixStream>> {
        match self.listener.accept() {
            Ok((stream, _)) => Ok(Some(stream)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "Control socket cleanup failed: {e}");
        }
    }
}

/// 对一个刚 accept 的连接执行完整握手
///
/// 握手不在性能路径上，切回阻塞语义更简单；但 ack 读加超时，
/// 防止一个假死的消费者挂住 ticker 线程。任何一步失败都整体放弃会话。
/// 成功后连接切回非阻塞，供每帧 notify/drain 使用。
pub fn perform_handshake(
    stream: &mut UnixStream,
    header: &HandshakeHeader,
    slot_fds: &[RawFd],
    ack_timeout: Duration,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(ack_timeout))?;

    // 1. 元数据头
    send_all(stream, &header.encode())?;

    // 2. 逐个传递 slot 描述符 (SCM_RIGHTS)
    for (index, fd) in slot_fds.iter().enumerate() {
        send_slot_fd(stream, *fd).map_err(|e| {
            TransportError::Handshake(format!("Descriptor {index} transfer failed: {e}"))
        })?;
    }

    // 3. 等待确认字节
    let mut ack = [0u8; 1];
    stream
        .read_exact(&mut ack)
        .map_err(|e| TransportError::Handshake(format!("Ack read failed: {e}")))?;
    if ack[0] != ACK_READY {
        return Err(TransportError::Handshake(format!(
            "Bad ack byte: 0x{:02X}",
            ack[0]
        )));
    }

    // 4. 进入帧通知阶段
    stream.set_read_timeout(None)?;
    stream.set_nonblocking(true)?;

    info!(slots = slot_fds.len(), "Consumer handshake complete");
    Ok(())
}

/// 阻塞写完整个缓冲
/// 不用 std 的 write_all：宿主进程未必忽略 SIGPIPE，所有出站字节都走 MSG_NOSIGNAL
fn send_all(stream: &UnixStream, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        let n = send(stream.as_raw_fd(), bytes, MsgFlags::MSG_NOSIGNAL)
            .map_err(std::io::Error::from)?;
        if n == 0 {
            return Err(std::io::Error::other("peer stopped accepting bytes").into());
        }
        bytes = &bytes[n..];
    }
    Ok(())
}

fn send_slot_fd(stream: &UnixStream, fd: RawFd) -> std::io::Result<()> {
    let payload = [FD_SENTINEL];
    let iov = [IoSlice::new(&payload)];
    let fds = [fd];
    let cmsg = [ControlMessage::ScmRights(&fds)];

    let sent = sendmsg::<()>(
        stream.as_raw_fd(),
        &iov,
        &cmsg,
        MsgFlags::MSG_NOSIGNAL,
        None,
    )?;

    if sent != payload.len() {
        return Err(std::io::Error::other("short descriptor send"));
    }
    Ok(())
}
