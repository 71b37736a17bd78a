use anyhow::Result;
use std::io::{self, Write};
use std::net::UdpSocket;
use std::time::Duration;

use talava_avatar::config::Config;
use talava_avatar::landmark::{HandIndex, Landmark, LandmarkSet};
use talava_avatar::protocol::Frame;
use talava_avatar::retarget::t_pose;

const CONFIG_PATH: &str = "config.toml";

/// 手のひらを開いた右手（画像座標）
fn open_hand() -> LandmarkSet {
    (0..HandIndex::COUNT)
        .map(|i| {
            let finger = i.saturating_sub(1) / 4;
            let joint = i.saturating_sub(1) % 4;
            let x = 0.20 - finger as f32 * 0.02;
            let y = if i == 0 { 0.40 } else { 0.36 - joint as f32 * 0.02 };
            Landmark::position_only(x, y, 0.0)
        })
        .collect::<Vec<_>>()
        .into()
}

/// 腰ごと左右に dx ずらしたTポーズ
fn swayed(dx: f32) -> LandmarkSet {
    let mut pose = t_pose();
    for lm in pose.landmarks.iter_mut() {
        lm.x += dx;
    }
    pose
}

fn send(socket: &UdpSocket, target: &str, frame: &Frame) -> Result<()> {
    let data = frame.encode()?;
    socket.send_to(&data, target)?;
    println!("{} ({} landmarks, {} bytes) を送信しました", frame.kind().as_str(), frame.landmarks().len(), data.len());
    Ok(())
}

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{}", config.receiver.port));

    println!("=== Talava Avatar - Landmark Sender ===");
    println!("送信先: {}", target);
    println!();
    println!("コマンド:");
    println!("  p             - Tポーズを送信");
    println!("  h             - 手のフレームを送信");
    println!("  l             - 旧形式（type なし）のポーズを送信");
    println!("  b             - 壊れたパケットを送信");
    println!("  t             - テスト送信 (腰を左右に揺らす)");
    println!("  q             - 終了");
    println!();

    let socket = UdpSocket::bind("0.0.0.0:0")?;

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();

        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "p" => send(&socket, &target, &Frame::Pose(t_pose()))?,
            "h" => send(&socket, &target, &Frame::Hand(open_hand()))?,
            "l" => {
                let points: Vec<serde_json::Value> = t_pose()
                    .landmarks
                    .iter()
                    .map(|lm| serde_json::json!({"x": lm.x, "y": lm.y, "z": lm.z, "visibility": lm.visibility}))
                    .collect();
                let data = serde_json::to_vec(&serde_json::json!({ "landmarks": points }))?;
                socket.send_to(&data, &target)?;
                println!("旧形式 ({} bytes) を送信しました", data.len());
            }
            "b" => {
                socket.send_to(b"{\"type\": \"pose\", \"landmarks\": [", &target)?;
                println!("壊れたパケットを送信しました");
            }
            "t" => {
                println!("テスト送信中...");
                for i in 0..40 {
                    let dx = (i as f32 * 0.3).sin() * 0.1;
                    let data = Frame::Pose(swayed(dx)).encode()?;
                    socket.send_to(&data, &target)?;
                    std::thread::sleep(Duration::from_millis(33));
                }
                println!("テスト完了");
            }
            "q" => {
                println!("終了します");
                break;
            }
            _ => {
                println!("不明なコマンド: {}", parts[0]);
            }
        }
    }

    Ok(())
}
