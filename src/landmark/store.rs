use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::point::LandmarkSet;
use crate::protocol::{Frame, FrameKind};

/// 1種類のフレームの最新値を保持するスロット
#[derive(Debug, Clone)]
pub struct SlotSnapshot {
    pub landmarks: Arc<LandmarkSet>,
    /// 置き換えごとに +1。未受信なら 0
    pub version: u64,
    pub updated_at: Option<Instant>,
}

impl SlotSnapshot {
    fn empty() -> Self {
        Self {
            landmarks: Arc::new(LandmarkSet::default()),
            version: 0,
            updated_at: None,
        }
    }

    /// 最後の更新からの経過時間。未受信なら None
    pub fn age(&self) -> Option<Duration> {
        self.updated_at.map(|t| t.elapsed())
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

/// ティックごとに取得するポーズ・手のスナップショット
#[derive(Debug, Clone)]
pub struct LandmarkSnapshot {
    pub pose: SlotSnapshot,
    pub hand: SlotSnapshot,
}

/// 受信スレッドとリターゲットの間で共有される最新ランドマーク
///
/// ポーズと手は別々のロックを持つ。手の更新がポーズの読み出しを
/// 待たせることはなく、その逆も同じ。ロック中は `Arc` の差し替えと
/// 複製だけを行う。
#[derive(Debug)]
pub struct LandmarkStore {
    pose: Mutex<SlotSnapshot>,
    hand: Mutex<SlotSnapshot>,
}

impl LandmarkStore {
    pub fn new() -> Self {
        Self {
            pose: Mutex::new(SlotSnapshot::empty()),
            hand: Mutex::new(SlotSnapshot::empty()),
        }
    }

    fn slot(&self, kind: FrameKind) -> &Mutex<SlotSnapshot> {
        match kind {
            FrameKind::Pose => &self.pose,
            FrameKind::Hand => &self.hand,
        }
    }

    /// スロットの内容を丸ごと置き換える。新しいバージョン番号を返す
    pub fn replace(&self, kind: FrameKind, landmarks: LandmarkSet) -> u64 {
        // Arc の確保はロックの外で行う
        let landmarks = Arc::new(landmarks);
        let now = Instant::now();
        let mut slot = self.slot(kind).lock();
        slot.landmarks = landmarks;
        slot.version += 1;
        slot.updated_at = Some(now);
        slot.version
    }

    /// デコード済みフレームを対応するスロットへ公開する
    pub fn publish(&self, frame: Frame) -> u64 {
        let kind = frame.kind();
        self.replace(kind, frame.into_landmarks())
    }

    pub fn pose(&self) -> SlotSnapshot {
        self.pose.lock().clone()
    }

    pub fn hand(&self) -> SlotSnapshot {
        self.hand.lock().clone()
    }

    /// 両スロットの最新値。各スロットはそれぞれのロック下で複製される
    pub fn snapshot(&self) -> LandmarkSnapshot {
        LandmarkSnapshot {
            pose: self.pose(),
            hand: self.hand(),
        }
    }
}

impl Default for LandmarkStore {
    fn default() -> Self {
        Self::new()
    }
}
