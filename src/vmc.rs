use anyhow::Result;
use nalgebra::{UnitQuaternion, Vector3};
use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use std::net::UdpSocket;

use crate::rig::{Bone, Rig, Skeleton};

/// VMCプロトコル受信側（VSeeFace 等）のデフォルトアドレス
pub const VMC_DEFAULT_ADDR: &str = "127.0.0.1:39539";

/// OSC の「即時」タイムタグ
const IMMEDIATE: OscTime = OscTime {
    seconds: 0,
    fractional: 1,
};

fn transform_args(name: &str, position: &Vector3<f32>, rotation: &UnitQuaternion<f32>) -> Vec<OscType> {
    let q = rotation.coords;
    vec![
        OscType::String(name.to_string()),
        OscType::Float(position.x),
        OscType::Float(position.y),
        OscType::Float(position.z),
        OscType::Float(q.x),
        OscType::Float(q.y),
        OscType::Float(q.z),
        OscType::Float(q.w),
    ]
}

/// ルート位置・回転
/// 引数: "root", x, y, z, qx, qy, qz, qw
pub fn build_root_message(position: &Vector3<f32>, rotation: &UnitQuaternion<f32>) -> OscMessage {
    OscMessage {
        addr: "/VMC/Ext/Root/Pos".to_string(),
        args: transform_args("root", position, rotation),
    }
}

/// ボーンのローカル回転。位置はヒューマノイドでは使われないので 0
pub fn build_bone_message(bone: Bone, rotation: &UnitQuaternion<f32>) -> OscMessage {
    OscMessage {
        addr: "/VMC/Ext/Bone/Pos".to_string(),
        args: transform_args(bone.name(), &Vector3::zeros(), rotation),
    }
}

/// 1フレーム分（ルート + 全ボーン + 送信時刻）をまとめたバンドル
pub fn build_frame_bundle(rig: &Rig, time: f32) -> OscBundle {
    let mut content = Vec::with_capacity(Bone::COUNT + 2);
    content.push(OscPacket::Message(build_root_message(
        &rig.root_position(),
        &UnitQuaternion::identity(),
    )));
    for (bone, rotation) in rig.bones() {
        content.push(OscPacket::Message(build_bone_message(bone, &rotation)));
    }
    content.push(OscPacket::Message(OscMessage {
        addr: "/VMC/Ext/T".to_string(),
        args: vec![OscType::Float(time)],
    }));
    OscBundle {
        timetag: IMMEDIATE,
        content,
    }
}

pub fn encode_bundle(bundle: &OscBundle) -> Result<Vec<u8>> {
    let packet = OscPacket::Bundle(bundle.clone());
    let encoded = encoder::encode(&packet)?;
    Ok(encoded)
}

/// VMCクライアント
pub struct VmcClient {
    socket: UdpSocket,
    target_addr: String,
}

impl VmcClient {
    pub fn new(target_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
        })
    }

    /// リグの現在姿勢を送信
    pub fn send(&self, rig: &Rig, time: f32) -> Result<()> {
        let data = encode_bundle(&build_frame_bundle(rig, time))?;
        self.socket.send_to(&data, &self.target_addr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_root_message() {
        let msg = build_root_message(&Vector3::new(1.0, 2.0, 3.0), &UnitQuaternion::identity());
        assert_eq!(msg.addr, "/VMC/Ext/Root/Pos");
        // 引数: name, x, y, z, qx, qy, qz, qw
        assert_eq!(msg.args.len(), 8);
        assert_eq!(msg.args[0], OscType::String("root".to_string()));
        assert_eq!(msg.args[1], OscType::Float(1.0));
        assert_eq!(msg.args[3], OscType::Float(3.0));
        assert_eq!(msg.args[7], OscType::Float(1.0));
    }

    #[test]
    fn test_build_bone_message_uses_unity_name() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::PI);
        let msg = build_bone_message(Bone::LeftUpperArm, &q);
        assert_eq!(msg.addr, "/VMC/Ext/Bone/Pos");
        assert_eq!(msg.args[0], OscType::String("LeftUpperArm".to_string()));
        // position は 0
        assert_eq!(msg.args[1], OscType::Float(0.0));
        match msg.args[5] {
            OscType::Float(qy) => assert!((qy.abs() - 1.0).abs() < 1e-6),
            ref other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_frame_bundle_layout() {
        let mut rig = Rig::new();
        rig.set_root_position(Vector3::new(0.5, 0.0, 0.0));
        let bundle = build_frame_bundle(&rig, 1.5);
        assert_eq!(bundle.timetag, IMMEDIATE);
        assert_eq!(bundle.content.len(), Bone::COUNT + 2);
        match &bundle.content[0] {
            OscPacket::Message(m) => {
                assert_eq!(m.addr, "/VMC/Ext/Root/Pos");
                assert_eq!(m.args[1], OscType::Float(0.5));
            }
            other => panic!("unexpected {:?}", other),
        }
        match bundle.content.last() {
            Some(OscPacket::Message(m)) => assert_eq!(m.args, vec![OscType::Float(1.5)]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_encode_bundle() {
        let encoded = encode_bundle(&build_frame_bundle(&Rig::new(), 0.0)).unwrap();
        assert!(encoded.starts_with(b"#bundle\0"));
    }

    #[test]
    fn test_send_to_local_socket() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = VmcClient::new(&listener.local_addr().unwrap().to_string()).unwrap();
        client.send(&Rig::new(), 0.0).unwrap();

        let mut buf = [0u8; 4096];
        let len = listener.recv(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        match packet {
            OscPacket::Bundle(b) => assert_eq!(b.content.len(), Bone::COUNT + 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
