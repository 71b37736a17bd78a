use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub retarget: RetargetConfig,
    #[serde(default)]
    pub vmc: VmcConfig,
}

/// ランドマーク受信ソケット
#[derive(Debug, Deserialize, Clone)]
pub struct ReceiverConfig {
    /// バインドするアドレス
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// UDPポート（0 ならOSが割り当て）
    #[serde(default = "default_port")]
    pub port: u16,
    /// 停止時にスレッド終了を待つ上限（ミリ秒）
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    /// 受信バッファ（1データグラムの最大サイズ）
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// ホストのティックループ
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// ステータスログの間隔（秒）
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetargetConfig {
    /// 目標回転へ寄せる速さ（1/秒）
    #[serde(default = "default_smoothing_rate")]
    pub smoothing_rate: f32,
    /// 腰の水平移動のスケール（正規化座標 → ワールド）
    #[serde(default = "default_world_scale")]
    pub world_scale: f32,
    /// 頭ピッチのゲイン（ラジアン / 正規化座標）
    #[serde(default = "default_head_pitch_gain")]
    pub head_pitch_gain: f32,
    /// 可視性ゲートの閾値
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
    /// 画像座標（Y下向き）を Y上向きに反転する
    #[serde(default = "default_flip_y")]
    pub flip_y: bool,
    /// 手首以外の全ボーンにも可視性ゲートをかける
    #[serde(default)]
    pub gate_all_bones: bool,
    /// レストポーズ補正の上書き: ボーン名 → オイラー角（度）[x, y, z]
    #[serde(default)]
    pub corrections: BTreeMap<String, [f32; 3]>,
}

/// VMCプロトコル（OSC）での転送先
#[derive(Debug, Deserialize, Clone)]
pub struct VmcConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_vmc_addr")]
    pub addr: String,
}

fn default_bind_addr() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 5052 }
fn default_join_timeout_ms() -> u64 { 500 }
fn default_buffer_size() -> usize { 65536 }
fn default_target_fps() -> u32 { 60 }
fn default_status_interval_secs() -> u64 { 5 }
fn default_smoothing_rate() -> f32 { 10.0 }
fn default_world_scale() -> f32 { 1.0 }
fn default_head_pitch_gain() -> f32 { 4.0 }
fn default_visibility_threshold() -> f32 { 0.5 }
fn default_flip_y() -> bool { true }
fn default_vmc_addr() -> String { crate::vmc::VMC_DEFAULT_ADDR.to_string() }

impl ReceiverConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            join_timeout_ms: default_join_timeout_ms(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            smoothing_rate: default_smoothing_rate(),
            world_scale: default_world_scale(),
            head_pitch_gain: default_head_pitch_gain(),
            visibility_threshold: default_visibility_threshold(),
            flip_y: default_flip_y(),
            gate_all_bones: false,
            corrections: BTreeMap::new(),
        }
    }
}

impl Default for VmcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_vmc_addr(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// 読めなければ既定値で起動する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("{} not found, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{:#}; using defaults", e);
                Self::default()
            }
        }
    }
}
