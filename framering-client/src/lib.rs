// 消费者侧协议实现：连接、握手、slot 映射、每帧 notify/release 循环
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

use std::io::{IoSliceMut, Read, Write};
use std::num::NonZeroUsize;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags};
use tracing::{debug, info};

use framering_core::error::{Result, TransportError};
use framering_core::wire::{HandshakeHeader, ACK_READY, HEADER_LEN};

/// 消费者收到的一个 slot：生产者的 memfd + 本进程的只读映射
///
/// 【约定】只读是协议约定，不是硬保证 —— 这边拿到的 fd 本身可写。
#[derive(Debug)]
struct MappedSlot {
    _memfd: OwnedFd,
    ptr: *mut libc::c_void,
    len: usize,
}

unsafe impl Send for MappedSlot {}

impl Drop for MappedSlot {
    fn drop(&mut self) {
        let _ = unsafe { munmap(self.ptr, self.len) };
    }
}

/// 环形缓冲消费端
///
/// `connect` 完成整个握手：读元数据头、接收每个 slot 的描述符、
/// 映射、回 ack。之后循环 `next_frame` / `slot` / `release`。
///
/// 注意一致性契约：生产者不等 release 就可能复写 slot，
/// 读得太慢会看到撕裂帧 —— 这是设计接受的代价，换取采集端永不阻塞。
#[derive(Debug)]
pub struct RingConsumer {
    stream: UnixStream,
    header: HandshakeHeader,
    slots: Vec<MappedSlot>,
}

impl RingConsumer {
    /// 连接生产者并完成握手
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut stream = UnixStream::connect(path.as_ref())?;

        // 1. 元数据头
        let mut raw = [0u8; HEADER_LEN];
        stream.read_exact(&mut raw)?;
        let header = HandshakeHeader::decode(&raw)?;
        debug!(
            slots = header.slot_count,
            width = header.width,
            height = header.height,
            frame_size = header.frame_size,
            "Received transport header"
        );

        // 2. 逐个接收 slot 描述符并映射
        let frame_size = header.frame_size as usize;
        let mut slots = Vec::with_capacity(header.slot_count as usize);
        for index in 0..header.slot_count {
            let memfd = recv_slot_fd(&stream).map_err(|e| {
                TransportError::Handshake(format!("Descriptor {index} receive failed: {e}"))
            })?;
            slots.push(map_slot(memfd, frame_size)?);
        }

        // 3. 确认握手完成，生产者随后开始发 slot 索引
        stream.write_all(&[ACK_READY])?;

        info!(
            slots = slots.len(),
            frame_size, "Consumer attached to frame ring"
        );
        Ok(Self {
            stream,
            header,
            slots,
        })
    }

    pub fn header(&self) -> &HandshakeHeader {
        &self.header
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// 等待下一帧通知，返回携带新数据的 slot 索引
    pub fn next_frame(&mut self, timeout: Option<Duration>) -> Result<u8> {
        self.stream.set_read_timeout(timeout)?;

        let mut byte = [0u8; 1];
        self.stream.read_exact(&mut byte).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::Disconnected("producer closed the control channel".into())
            } else {
                TransportError::Io(e)
            }
        })?;

        let index = byte[0];
        if index as usize >= self.slots.len() {
            return Err(TransportError::Handshake(format!(
                "Notification index {index} out of range (ring depth {})",
                self.slots.len()
            )));
        }
        Ok(index)
    }

    /// 某个 slot 的完整内容视图
    pub fn slot(&self, index: u8) -> Result<&[u8]> {
        let slot = self.slots.get(index as usize).ok_or_else(|| {
            TransportError::RingNotReady(format!("slot {index} not mapped"))
        })?;
        // 底层页由生产者并发复写，撕裂可能；按字节读取本身安全
        Ok(unsafe { std::slice::from_raw_parts(slot.ptr as *const u8, slot.len) })
    }

    /// 告知生产者一个 slot 已读完。内容不被解析，一个字节即可。
    pub fn release(&mut self) -> Result<()> {
        self.stream.write_all(&[b'R'])?;
        Ok(())
    }
}

fn recv_slot_fd(stream: &UnixStream) -> std::io::Result<OwnedFd> {
    let mut payload = [0u8; 1];
    let mut iov = [IoSliceMut::new(&mut payload)];
    let mut cmsg_buf = nix::cmsg_space!([RawFd; 1]);

    let msg = recvmsg::<()>(
        stream.as_raw_fd(),
        &mut iov,
        Some(&mut cmsg_buf),
        MsgFlags::empty(),
    )?;

    if msg.bytes == 0 {
        return Err(std::io::Error::other("producer closed during handshake"));
    }

    for cmsg in msg.cmsgs() {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            if let Some(fd) = fds.first() {
                return Ok(unsafe { OwnedFd::from_raw_fd(*fd) });
            }
        }
    }
    Err(std::io::Error::other("no descriptor in control message"))
}

fn map_slot(memfd: OwnedFd, len: usize) -> Result<MappedSlot> {
    let len_nz = NonZeroUsize::new(len).ok_or_else(|| {
        TransportError::Handshake("zero frame size in header".into())
    })?;

    let ptr = unsafe {
        mmap(
            None,
            len_nz,
            ProtFlags::PROT_READ,
            MapFlags::MAP_SHARED,
            Some(&memfd),
            0,
        )
    }
    .map_err(|e| TransportError::Handshake(format!("slot mmap: {e}")))?;

    Ok(MappedSlot {
        _memfd: memfd,
        ptr,
        len,
    })
}
