use nalgebra::Vector3;

use super::index::PoseIndex;

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// 正規化X座標（プロデューサー定義の空間）
    pub x: f32,
    /// 正規化Y座標（画像下向きが正）
    pub y: f32,
    /// 相対奥行き
    pub z: f32,
    /// 可視性 (0.0〜1.0)。手のランドマークは持たない
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: Some(visibility),
        }
    }

    /// 可視性を持たない位置のみのランドマーク（手）
    pub fn position_only(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    /// 可視性が閾値以上か。可視性を持たない点は常に true
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility.map_or(true, |v| v >= threshold)
    }

    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            visibility: Some(0.0),
        }
    }
}

/// インデックスでアクセスするランドマーク列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    pub landmarks: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }

    pub fn pose(&self, index: PoseIndex) -> Option<&Landmark> {
        self.get(index as usize)
    }

    /// 全インデックスが存在するか
    pub fn has_all(&self, indices: &[usize]) -> bool {
        indices.iter().all(|&i| i < self.landmarks.len())
    }

    /// 全インデックスが存在し、可視性が閾値以上か
    pub fn all_visible(&self, indices: &[usize], threshold: f32) -> bool {
        indices
            .iter()
            .all(|&i| self.get(i).is_some_and(|lm| lm.is_visible(threshold)))
    }

    /// 全ランドマークの平均可視性（可視性なしの点は除く）
    pub fn average_visibility(&self) -> Option<f32> {
        let values: Vec<f32> = self.landmarks.iter().filter_map(|l| l.visibility).collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

impl From<Vec<Landmark>> for LandmarkSet {
    fn from(landmarks: Vec<Landmark>) -> Self {
        Self::new(landmarks)
    }
}
