//! UDP wire format for producer → receiver landmark frames.
//!
//! Every datagram is one UTF-8 JSON document. Four producer revisions are
//! accepted:
//!
//! ```text
//! {"type":"pose","landmarks":[{"x":..,"y":..,"z":..,"visibility":..}, ...]}
//! {"type":"hand","hand_landmarks":[{"x":..,"y":..,"z":..}, ...]}
//! {"landmarks":[...]}                                    (untagged, pose only)
//! {"pose_landmarks":[...],"hand_landmarks":[[...],[...]]} (bundle)
//! {"landmarks":[{"type":"pose",..},{"type":"hand",..}]}   (per-point tags)
//! ```
//!
//! Unknown fields are ignored, absent numbers decode as zero and absent
//! arrays as empty sets. A tagged frame only reads the arrays its tag uses,
//! so a stray `hand_landmarks` on a pose frame does not fail the decode.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::landmark::{Landmark, LandmarkSet};

pub const TYPE_POSE: &str = "pose";
pub const TYPE_HAND: &str = "hand";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing frame type")]
    MissingType,
    #[error("unknown frame type {0:?}")]
    UnknownType(String),
    #[error("payload carries {0} frames, expected one")]
    MultipleFrames(usize),
    #[error("payload carries no pose or hand landmarks")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Pose,
    Hand,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Pose => TYPE_POSE,
            FrameKind::Hand => TYPE_HAND,
        }
    }
}

/// 1データグラムから得られるフレーム
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Pose(LandmarkSet),
    Hand(LandmarkSet),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Pose(_) => FrameKind::Pose,
            Frame::Hand(_) => FrameKind::Hand,
        }
    }

    pub fn landmarks(&self) -> &LandmarkSet {
        match self {
            Frame::Pose(set) | Frame::Hand(set) => set,
        }
    }

    pub fn into_landmarks(self) -> LandmarkSet {
        match self {
            Frame::Pose(set) | Frame::Hand(set) => set,
        }
    }

    /// タグ付き形式へエンコード
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Frame::Pose(set) => serde_json::to_vec(&OutgoingPose {
                kind: TYPE_POSE,
                landmarks: set
                    .landmarks
                    .iter()
                    .map(|l| OutgoingPosePoint {
                        x: l.x,
                        y: l.y,
                        z: l.z,
                        visibility: l.visibility.unwrap_or(0.0),
                    })
                    .collect(),
            }),
            Frame::Hand(set) => serde_json::to_vec(&OutgoingHand {
                kind: TYPE_HAND,
                hand_landmarks: set
                    .landmarks
                    .iter()
                    .map(|l| OutgoingHandPoint {
                        x: l.x,
                        y: l.y,
                        z: l.z,
                    })
                    .collect(),
            }),
        }
    }
}

// --- Inbound wire types ---

#[derive(Debug, Deserialize)]
struct WireLandmark {
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    z: f32,
    #[serde(default)]
    visibility: Option<f32>,
    /// per-point tag (bundled revision only)
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl WireLandmark {
    fn into_pose(self) -> Landmark {
        Landmark::new(self.x, self.y, self.z, self.visibility.unwrap_or(0.0))
    }

    fn into_hand(self) -> Landmark {
        Landmark::position_only(self.x, self.y, self.z)
    }
}

/// `hand_landmarks` は1手分の配列、または手ごとの配列の配列
///
/// `[[]]` を点1つの Flat と読まないよう PerHand を先に試す。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireHands {
    PerHand(Vec<Vec<WireLandmark>>),
    Flat(Vec<WireLandmark>),
}

impl WireHands {
    /// 複数の手は受信順に連結する
    fn into_set(self) -> LandmarkSet {
        let points: Vec<Landmark> = match self {
            WireHands::Flat(points) => points.into_iter().map(WireLandmark::into_hand).collect(),
            WireHands::PerHand(hands) => hands
                .into_iter()
                .flatten()
                .map(WireLandmark::into_hand)
                .collect(),
        };
        LandmarkSet::new(points)
    }
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    landmarks: Option<Value>,
    #[serde(default)]
    pose_landmarks: Option<Value>,
    #[serde(default)]
    hand_landmarks: Option<Value>,
}

/// フィールドを使うときだけ型付きで読む
fn field<T: DeserializeOwned>(value: Option<Value>) -> Result<Option<T>, DecodeError> {
    Ok(value.map(serde_json::from_value).transpose()?)
}

// --- Outbound wire types ---

#[derive(Serialize)]
struct OutgoingPosePoint {
    x: f32,
    y: f32,
    z: f32,
    visibility: f32,
}

#[derive(Serialize)]
struct OutgoingHandPoint {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Serialize)]
struct OutgoingPose {
    #[serde(rename = "type")]
    kind: &'static str,
    landmarks: Vec<OutgoingPosePoint>,
}

#[derive(Serialize)]
struct OutgoingHand {
    #[serde(rename = "type")]
    kind: &'static str,
    hand_landmarks: Vec<OutgoingHandPoint>,
}

// --- Decoding ---

fn pose_set(points: Vec<WireLandmark>) -> LandmarkSet {
    LandmarkSet::new(points.into_iter().map(WireLandmark::into_pose).collect())
}

/// ペイロードを1フレームとしてデコードする
pub fn decode_frame(payload: &[u8]) -> Result<Frame, DecodeError> {
    let mut frames = decode_frames(payload)?;
    if frames.len() != 1 {
        return Err(DecodeError::MultipleFrames(frames.len()));
    }
    frames.pop().ok_or(DecodeError::Empty)
}

/// ペイロードに含まれる全フレームをデコードする（受信ループ用）
pub fn decode_frames(payload: &[u8]) -> Result<Vec<Frame>, DecodeError> {
    let msg: WireMessage = serde_json::from_slice(payload)?;

    match msg.kind.as_deref() {
        Some(TYPE_POSE) => {
            let points = match msg.landmarks {
                Some(points) => field::<Vec<WireLandmark>>(Some(points))?,
                None => field::<Vec<WireLandmark>>(msg.pose_landmarks)?,
            }
            .unwrap_or_default();
            Ok(vec![Frame::Pose(pose_set(points))])
        }
        Some(TYPE_HAND) => {
            let hands = match msg.hand_landmarks {
                Some(hands) => field::<WireHands>(Some(hands))?,
                None => field::<Vec<WireLandmark>>(msg.landmarks)?.map(WireHands::Flat),
            };
            let set = hands.map_or_else(LandmarkSet::default, WireHands::into_set);
            Ok(vec![Frame::Hand(set)])
        }
        Some(other) => Err(DecodeError::UnknownType(other.to_string())),
        None => decode_untagged(msg),
    }
}

fn decode_untagged(msg: WireMessage) -> Result<Vec<Frame>, DecodeError> {
    if msg.pose_landmarks.is_some() || msg.hand_landmarks.is_some() {
        let mut frames = Vec::with_capacity(2);
        if let Some(points) = field::<Vec<WireLandmark>>(msg.pose_landmarks)? {
            frames.push(Frame::Pose(pose_set(points)));
        }
        if let Some(hands) = field::<WireHands>(msg.hand_landmarks)? {
            frames.push(Frame::Hand(hands.into_set()));
        }
        return Ok(frames);
    }

    let Some(points) = field::<Vec<WireLandmark>>(msg.landmarks)? else {
        return Err(DecodeError::MissingType);
    };

    if points.iter().all(|p| p.kind.is_none()) {
        // 最初期のリビジョン: タグなし = ポーズ
        return Ok(vec![Frame::Pose(pose_set(points))]);
    }

    split_tagged_points(points)
}

/// 点ごとのタグでポーズと手に振り分ける。顔の点は捨てる
fn split_tagged_points(points: Vec<WireLandmark>) -> Result<Vec<Frame>, DecodeError> {
    let mut pose = Vec::new();
    let mut hand = Vec::new();
    let mut dropped = 0usize;

    for point in points {
        match point.kind.as_deref() {
            None | Some(TYPE_POSE) => pose.push(point.into_pose()),
            Some(TYPE_HAND) => hand.push(point.into_hand()),
            Some(_) => dropped += 1,
        }
    }
    if dropped > 0 {
        log::trace!("Dropped {} landmarks with unsupported tags", dropped);
    }

    let mut frames = Vec::with_capacity(2);
    if !pose.is_empty() {
        frames.push(Frame::Pose(LandmarkSet::new(pose)));
    }
    if !hand.is_empty() {
        frames.push(Frame::Hand(LandmarkSet::new(hand)));
    }
    if frames.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pose() {
        let payload = br#"{"type":"pose","landmarks":[
            {"x":0.1,"y":0.2,"z":0.3,"visibility":0.9},
            {"x":0.4,"y":0.5,"z":0.6,"visibility":0.1}]}"#;
        let frame = decode_frame(payload).unwrap();
        assert_eq!(frame.kind(), FrameKind::Pose);
        let set = frame.landmarks();
        assert_eq!(set.len(), 2);
        assert_eq!(set.landmarks[0], Landmark::new(0.1, 0.2, 0.3, 0.9));
        assert_eq!(set.landmarks[1].visibility, Some(0.1));
    }

    #[test]
    fn test_decode_hand() {
        let payload = br#"{"type":"hand","hand_landmarks":[{"x":0.1,"y":0.2,"z":0.3}]}"#;
        let frame = decode_frame(payload).unwrap();
        assert_eq!(frame.kind(), FrameKind::Hand);
        assert_eq!(
            frame.landmarks().landmarks[0],
            Landmark::position_only(0.1, 0.2, 0.3)
        );
    }

    #[test]
    fn test_decode_is_idempotent() {
        let payload = br#"{"type":"pose","landmarks":[{"x":0.25,"y":0.5,"z":-0.1,"visibility":0.75}]}"#;
        let a = decode_frame(payload).unwrap();
        let b = decode_frame(payload).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_numbers_default_to_zero() {
        let payload = br#"{"type":"pose","landmarks":[{"x":0.5}]}"#;
        let frame = decode_frame(payload).unwrap();
        assert_eq!(frame.landmarks().landmarks[0], Landmark::new(0.5, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_missing_array_is_empty() {
        let frame = decode_frame(br#"{"type":"pose"}"#).unwrap();
        assert_eq!(frame, Frame::Pose(LandmarkSet::default()));

        let frame = decode_frame(br#"{"type":"hand","hand_landmarks":null}"#).unwrap();
        assert_eq!(frame, Frame::Hand(LandmarkSet::default()));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let payload = br#"{"type":"pose","seq":17,"camera":{"id":2},
            "landmarks":[{"x":1,"y":2,"z":3,"visibility":1,"presence":0.4}]}"#;
        let frame = decode_frame(payload).unwrap();
        assert_eq!(frame.landmarks().landmarks[0], Landmark::new(1.0, 2.0, 3.0, 1.0));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = decode_frame(br#"{"type":"unknown"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownType(ref t) if t == "unknown"));
    }

    #[test]
    fn test_missing_type_without_payload_rejected() {
        let err = decode_frame(br#"{"seq":1}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingType));
    }

    #[test]
    fn test_truncated_json_rejected() {
        let err = decode_frame(br#"{"type":"pose","landmarks":[{"x":0.1,"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = decode_frame(&[0x7b, 0xff, 0xfe, 0x7d]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_legacy_untagged_pose() {
        let payload = br#"{"landmarks":[{"x":0.1,"y":0.2,"z":0.3,"visibility":0.9}]}"#;
        let frame = decode_frame(payload).unwrap();
        assert_eq!(frame.kind(), FrameKind::Pose);
        assert_eq!(frame.landmarks().len(), 1);
    }

    #[test]
    fn test_bundle_with_multiple_hands() {
        let payload = br#"{
            "pose_landmarks":[{"x":0.5,"y":0.5,"z":0.0,"visibility":1.0}],
            "hand_landmarks":[[{"x":0.1,"y":0.1,"z":0.0}],[{"x":0.9,"y":0.9,"z":0.0}]]}"#;
        let frames = decode_frames(payload).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind(), FrameKind::Pose);
        assert_eq!(frames[1].kind(), FrameKind::Hand);
        let hands = frames[1].landmarks();
        assert_eq!(hands.len(), 2);
        assert_eq!(hands.landmarks[1].x, 0.9);

        let err = decode_frame(payload).unwrap_err();
        assert!(matches!(err, DecodeError::MultipleFrames(2)));
    }

    #[test]
    fn test_bundle_hands_only() {
        let payload = br#"{"hand_landmarks":[[{"x":0.1,"y":0.2,"z":0.3}]]}"#;
        let frame = decode_frame(payload).unwrap();
        assert_eq!(frame.kind(), FrameKind::Hand);
    }

    #[test]
    fn test_empty_nested_hand_is_empty_set() {
        let frame = decode_frame(br#"{"type":"hand","hand_landmarks":[[]]}"#).unwrap();
        assert_eq!(frame.kind(), FrameKind::Hand);
        assert!(frame.landmarks().is_empty());

        let frames = decode_frames(br#"{"pose_landmarks":[],"hand_landmarks":[[],[]]}"#).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].landmarks().is_empty());
    }

    #[test]
    fn test_flat_hand_still_accepted() {
        let frame =
            decode_frame(br#"{"type":"hand","hand_landmarks":[{"x":0.1},{"x":0.2}]}"#).unwrap();
        assert_eq!(frame.landmarks().len(), 2);
        assert_eq!(frame.landmarks().landmarks[1].x, 0.2);
    }

    #[test]
    fn test_pose_ignores_bad_hand_field() {
        let payload = br#"{"type":"pose","landmarks":[{"x":0.3,"visibility":0.8}],
            "hand_landmarks":"not an array"}"#;
        let frame = decode_frame(payload).unwrap();
        assert_eq!(frame, Frame::Pose(LandmarkSet::new(vec![Landmark::new(0.3, 0.0, 0.0, 0.8)])));

        let payload = br#"{"type":"hand","hand_landmarks":[{"x":0.1}],"pose_landmarks":7}"#;
        assert_eq!(decode_frame(payload).unwrap().landmarks().len(), 1);
    }

    #[test]
    fn test_bad_array_on_used_field_rejected() {
        assert!(matches!(
            decode_frame(br#"{"type":"pose","landmarks":{"x":1}}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_frames(br#"{"pose_landmarks":[],"hand_landmarks":"junk"}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_per_point_tags_split() {
        let payload = br#"{"landmarks":[
            {"type":"pose","x":0.1,"y":0.1,"z":0.0,"visibility":0.9},
            {"type":"pose","x":0.2,"y":0.2,"z":0.0,"visibility":0.9},
            {"type":"hand","x":0.3,"y":0.3,"z":0.0},
            {"type":"face","x":0.4,"y":0.4,"z":0.0}]}"#;
        let frames = decode_frames(payload).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].landmarks().len(), 2);
        assert_eq!(frames[1].landmarks().len(), 1);
        assert_eq!(frames[1].landmarks().landmarks[0].visibility, None);
    }

    #[test]
    fn test_per_point_tags_face_only() {
        let payload = br#"{"landmarks":[{"type":"face","x":0.4,"y":0.4,"z":0.0}]}"#;
        assert!(matches!(decode_frames(payload), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_encode_then_decode_pose() {
        let frame = Frame::Pose(LandmarkSet::new(vec![
            Landmark::new(0.5, 0.25, -0.125, 0.75),
            Landmark::new(0.0, 1.0, 0.0, 1.0),
        ]));
        let bytes = frame.encode().unwrap();
        assert_eq!(decode_frame(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_encode_hand_omits_visibility() {
        let frame = Frame::Hand(LandmarkSet::new(vec![Landmark::position_only(0.5, 0.5, 0.0)]));
        let text = String::from_utf8(frame.encode().unwrap()).unwrap();
        assert!(text.contains(r#""type":"hand""#));
        assert!(!text.contains("visibility"));
    }
}
