use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use talava_avatar::config::Config;
use talava_avatar::receiver::LandmarkReceiver;
use talava_avatar::retarget::Retargeter;
use talava_avatar::rig::{Rig, Skeleton};
use talava_avatar::vmc::VmcClient;

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);

    log::info!("talava-avatar {}", env!("GIT_VERSION"));
    log::info!("Receiver: {}", config.receiver.addr());
    log::info!("Target FPS: {}", config.app.target_fps);

    let running = Arc::new(AtomicBool::new(true));
    let running_ref = running.clone();
    ctrlc::set_handler(move || {
        log::info!("Shutdown requested");
        running_ref.store(false, Ordering::SeqCst);
    })?;

    let mut receiver = LandmarkReceiver::start(&config.receiver)?;
    let mut retargeter = Retargeter::new(&config.retarget);
    let mut rig = Rig::new();

    let vmc = if config.vmc.enabled {
        let client = VmcClient::new(&config.vmc.addr)?;
        log::info!("VMC output: {}", config.vmc.addr);
        Some(client)
    } else {
        None
    };

    let frame_duration = Duration::from_secs_f64(1.0 / config.app.target_fps.max(1) as f64);
    let status_interval = Duration::from_secs(config.app.status_interval_secs.max(1));
    let started = Instant::now();

    // ステータス集計
    let mut tick_count = 0u32;
    let mut last_pose_version = 0u64;
    let mut new_frames = 0u32;
    let mut status_timer = Instant::now();
    let mut last_tick = Instant::now();

    while running.load(Ordering::SeqCst) {
        let loop_start = Instant::now();
        let dt = loop_start.duration_since(last_tick).as_secs_f32();
        last_tick = loop_start;

        let snapshot = receiver.snapshot();
        if snapshot.pose.version != last_pose_version {
            last_pose_version = snapshot.pose.version;
            new_frames += 1;
        }

        let report = retargeter.update(&snapshot, &mut rig, dt);
        tick_count += 1;

        if let Some(ref client) = vmc {
            if let Err(e) = client.send(&rig, started.elapsed().as_secs_f32()) {
                log::warn!("VMC send failed: {}", e);
            }
        }

        if status_timer.elapsed() >= status_interval {
            let secs = status_timer.elapsed().as_secs_f32();
            let stats = receiver.stats();
            let root = rig.root_position();
            log::info!(
                "tick {:.1}/s | pose {:.1}/s v{} age {:?} vis {:.2} | hand v{} | bones {}/{} | root ({:.2}, {:.2}, {:.2}) | datagrams {} bad {} bind fails {}",
                tick_count as f32 / secs,
                new_frames as f32 / secs,
                snapshot.pose.version,
                snapshot.pose.age().map(|a| a.as_millis()),
                snapshot.pose.landmarks.average_visibility().unwrap_or(0.0),
                snapshot.hand.version,
                report.applied.len(),
                report.applied.len() + report.skipped.len(),
                root.x,
                root.y,
                root.z,
                stats.datagrams,
                stats.decode_errors,
                stats.bind_errors,
            );
            tick_count = 0;
            new_frames = 0;
            status_timer = Instant::now();
        }

        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    receiver.stop();
    log::info!("Bye");
    Ok(())
}
