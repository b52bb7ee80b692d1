//! 合成帧生产者演示
//!
//! 模拟一个相机回调：按 60fps 生成 NV12 测试图案，喂给共享内存传输。
//! 另开终端跑 `cargo run --example consumer_dump -p framering-client` 观察消费端。
//!
//! ```bash
//! cargo run --example synthetic_producer
//! ```

use std::time::Duration;

use anyhow::Result;
use framering_core::pixel_format::FourCC;
use framering_core::prelude::*;
use framering_transport::ShmTransport;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = TransportConfig::new()
        .socket_path("/tmp/framering-demo.sock")
        .slot_count(4)
        .min_interval(Duration::from_millis(33)) // 传输层封顶 ~30fps
        .stats_interval(Duration::from_secs(2));

    let mut transport = ShmTransport::new(config)?;

    let y_len = (WIDTH * HEIGHT) as usize;
    let uv_len = y_len / 2;
    let mut y_plane = vec![0u8; y_len];
    let mut uv_plane = vec![128u8; uv_len];

    println!("Producing {WIDTH}x{HEIGHT} NV12 frames, Ctrl-C to stop...");

    let mut sequence = 0u64;
    loop {
        render_pattern(&mut y_plane, &mut uv_plane, sequence);

        transport.on_frame(
            FrameView::new(
                WIDTH,
                HEIGHT,
                FourCC::NV12.into(),
                [Some(&y_plane[..]), Some(&uv_plane[..]), None],
            )
            .with_sequence(sequence),
        );

        sequence += 1;
        // 帧源自身 60fps，一半会被传输层限速丢掉
        std::thread::sleep(Duration::from_millis(16));
    }
}

/// 滚动渐变 + 帧号条纹，肉眼即可确认帧在动
fn render_pattern(y: &mut [u8], uv: &mut [u8], sequence: u64) {
    let phase = (sequence % 256) as u8;
    for (row, chunk) in y.chunks_mut(WIDTH as usize).enumerate() {
        let base = phase.wrapping_add(row as u8);
        for (col, px) in chunk.iter_mut().enumerate() {
            *px = base.wrapping_add(col as u8);
        }
    }
    uv.fill(128u8.wrapping_add(phase / 4));
}
