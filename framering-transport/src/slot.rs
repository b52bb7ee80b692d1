use std::ffi::CString;
use std::num::NonZeroUsize;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::ptr;

use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use nix::unistd::ftruncate;
use tracing::warn;

use framering_core::error::{Result, TransportError};

/// 一个 slot：匿名 memfd + 生产者侧的读写映射
///
/// fd 在握手时通过 SCM_RIGHTS 交给消费者，底层内存页因此跨进程共享；
/// 消费者按约定只读，这边不做任何强制。
#[derive(Debug)]
pub struct Slot {
    memfd: OwnedFd,
    ptr: *mut libc::c_void,
    len: usize,
}

// ptr 只在持有状态锁时访问，映射本身进程级存活
unsafe impl Send for Slot {}

impl Slot {
    fn create(index: usize, size: usize) -> Result<Self> {
        let setup_err = |reason: String| TransportError::SlotSetup { index, reason };

        let size_nz = NonZeroUsize::new(size)
            .ok_or_else(|| setup_err("slot size must be non-zero".into()))?;

        let name = CString::new(format!("framering-slot-{index}"))
            .map_err(|e| setup_err(e.to_string()))?;

        let memfd = memfd_create(&name, MemFdCreateFlag::MFD_CLOEXEC)
            .map_err(|e| setup_err(format!("memfd_create: {e}")))?;

        ftruncate(&memfd, size as libc::off_t)
            .map_err(|e| setup_err(format!("ftruncate to {size}: {e}")))?;

        let ptr = unsafe {
            mmap(
                None,
                size_nz,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                Some(&memfd),
                0,
            )
        }
        .map_err(|e| setup_err(format!("mmap {size} bytes: {e}")))?;

        Ok(Self {
            memfd,
            ptr,
            len: size,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 握手时传给 sendmsg 的描述符；所有权仍在 Slot 手里，别关它
    pub fn raw_fd(&self) -> RawFd {
        self.memfd.as_raw_fd()
    }

    /// 把一段平面数据写入 slot 内偏移处
    pub fn write_at(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len())
            .ok_or(TransportError::SlotOverflow {
                required: usize::MAX,
                capacity: self.len,
            })?;
        if end > self.len {
            return Err(TransportError::SlotOverflow {
                required: end,
                capacity: self.len,
            });
        }

        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                (self.ptr as *mut u8).add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    /// 读回 slot 内容 (调试与测试用；生产路径只写不读)
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        match offset.checked_add(out.len()) {
            Some(end) if end <= self.len => {}
            _ => {
                return Err(TransportError::SlotOverflow {
                    required: offset.saturating_add(out.len()),
                    capacity: self.len,
                })
            }
        }

        unsafe {
            ptr::copy_nonoverlapping(
                (self.ptr as *const u8).add(offset),
                out.as_mut_ptr(),
                out.len(),
            );
        }
        Ok(())
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // 正常情况下 Ring 活到进程退出，这里只是收尾卫生
        let _ = unsafe { munmap(self.ptr, self.len) };
    }
}

/// 一次性分配整个 Ring
///
/// Best-effort 策略：任何一个 slot 失败就停在那里，返回已经建好的部分。
/// 半满的 Ring 好过反复重试一个不太可能恢复的资源；
/// 下游索引前必须检查实际长度。
pub fn allocate_ring(slot_size: usize, count: usize) -> Vec<Slot> {
    let mut ring = Vec::with_capacity(count);
    for index in 0..count {
        match Slot::create(index, slot_size) {
            Ok(slot) => ring.push(slot),
            Err(e) => {
                warn!(
                    index,
                    count, slot_size, "Ring allocation stopped early: {e}"
                );
                break;
            }
        }
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_slots_share_requested_size() {
        let ring = allocate_ring(4096, 3);
        assert_eq!(ring.len(), 3);
        assert!(ring.iter().all(|s| s.len() == 4096));
    }

    #[test]
    fn write_then_read_roundtrip() {
        let ring = allocate_ring(64, 1);
        let slot = &ring[0];

        slot.write_at(10, b"frame-bytes").unwrap();

        let mut out = [0u8; 11];
        slot.read_at(10, &mut out).unwrap();
        assert_eq!(&out, b"frame-bytes");
    }

    #[test]
    fn write_past_capacity_is_rejected() {
        let ring = allocate_ring(16, 1);
        let err = ring[0].write_at(10, &[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            TransportError::SlotOverflow {
                required: 20,
                capacity: 16
            }
        ));
    }

    #[test]
    fn impossible_size_degrades_to_empty_ring() {
        // mmap 不可能满足的尺寸：期待空 Ring 而不是 panic 或 Err
        let ring = allocate_ring(usize::MAX / 4, 2);
        assert!(ring.len() < 2);
    }

    #[test]
    fn zero_size_degrades_to_empty_ring() {
        assert!(allocate_ring(0, 4).is_empty());
    }
}
