//! 实时正弦波控制
//!
//! 附着滤波实时控制器，让全部关节跟随一条低频正弦轨迹。
//!
//! ```bash
//! cargo run --example realtime_wave
//! ```

use std::time::{Duration, Instant};

use anyhow::Result;
use dexhand_sdk::{DEFAULT_TIMEOUT, Hand, HandOptions, LowPass, data};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let hand = Hand::open(HandOptions::default())?;
    hand.write_joint::<data::joint::Enabled>(true, DEFAULT_TIMEOUT)?;

    let controller = hand.realtime_controller(true, LowPass::new(10.0))?;

    let begin = Instant::now();
    while begin.elapsed() < Duration::from_secs(10) {
        let phase = begin.elapsed().as_secs_f64() * std::f64::consts::TAU * 0.2;
        let target = 0.3 * (1.0 - phase.cos());
        controller.set_joint_target_position([[target; 4]; 5])?;

        std::thread::sleep(Duration::from_millis(10));
    }

    let actual = controller.get_joint_actual_position()?;
    println!("final thumb J1: {:+.4} rad", actual[0][0]);

    controller.close()?;
    hand.write_joint::<data::joint::Enabled>(false, DEFAULT_TIMEOUT)?;
    Ok(())
}
