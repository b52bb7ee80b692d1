//! 消费端演示：连接生产者，打印每帧的 slot 索引与校验和
//!
//! 先跑 `cargo run --example synthetic_producer -p framering-transport`，
//! 再在另一个终端执行：
//!
//! ```bash
//! cargo run --example consumer_dump
//! ```

use std::time::{Duration, Instant};

use anyhow::Result;
use framering_client::RingConsumer;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut consumer = RingConsumer::connect("/tmp/framering-demo.sock")?;
    let header = *consumer.header();
    println!(
        "Attached: {}x{} format=0x{:08X} slots={} frame_size={}",
        header.width, header.height, header.format_code, header.slot_count, header.frame_size
    );

    let mut frames = 0u64;
    let started = Instant::now();

    loop {
        let index = consumer.next_frame(Some(Duration::from_secs(5)))?;
        let data = consumer.slot(index)?;

        // 简单校验和，顺便证明页真的共享了
        let checksum: u32 = data.iter().map(|b| *b as u32).sum();
        frames += 1;

        if frames % 30 == 0 {
            let fps = frames as f64 / started.elapsed().as_secs_f64();
            println!("slot={index} checksum=0x{checksum:08X} frames={frames} fps={fps:.1}");
        }

        consumer.release()?;
    }
}
