//! 读取手与关节状态
//!
//! ```bash
//! cargo run --example read_state
//! ```

use anyhow::Result;
use dexhand_sdk::{DEFAULT_TIMEOUT, Hand, HandOptions, data};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let hand = Hand::open(HandOptions::default())?;

    let temperature = hand.read::<data::hand::Temperature>(DEFAULT_TIMEOUT)?;
    let voltage = hand.read::<data::hand::InputVoltage>(DEFAULT_TIMEOUT)?;
    println!("hand: {temperature:.1} C, {voltage:.2} V");

    // 广播读取全部关节位置，再逐关节取缓存值
    hand.read_joint::<data::joint::ActualPosition>(DEFAULT_TIMEOUT)?;
    for finger in 0..5 {
        let finger_scope = hand.finger(finger)?;
        let positions: Vec<String> = (0..4)
            .map(|joint| {
                let value = finger_scope
                    .joint(joint)
                    .unwrap()
                    .get::<data::joint::ActualPosition>();
                format!("{value:+.4}")
            })
            .collect();
        println!("F{finger}: {}", positions.join("  "));
    }

    Ok(())
}
