//! Test data builders for creating test objects

use canvis_rs::catalog::{InMemoryCatalog, MessageDef, NodeDef, SignalDef};
use canvis_rs::{Direction, RawFrame};

/// Builder for creating test RawFrames
pub struct FrameBuilder {
    id: u32,
    data: Vec<u8>,
    direction: Direction,
    extended: bool,
}

impl FrameBuilder {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            data: vec![0u8; 8],
            direction: Direction::Rx,
            extended: false,
        }
    }

    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    pub fn tx(mut self) -> Self {
        self.direction = Direction::Tx;
        self
    }

    pub fn extended(mut self) -> Self {
        self.extended = true;
        self
    }

    pub fn build(self) -> RawFrame {
        let frame = RawFrame::new(self.id, self.data).with_direction(self.direction);
        if self.extended {
            frame.extended()
        } else {
            frame
        }
    }
}

/// A small vehicle catalog shared by the integration tests
///
/// - `Engine_Data` (0x200): `EngineSpeed` (16 bit, 0.25 rpm/bit), `CoolantTemp`
///   (8 bit, offset -40), `GearState` (4 bit value table)
/// - `Brake_Status` (0x1F0): `BrakePressure` (16 bit)
/// - `Body_Cmd` (0x300): `Speed` (8 bit, 0..=200), `Mode` (4 bit)
pub fn vehicle_catalog() -> InMemoryCatalog {
    InMemoryCatalog::default()
        .with_message(
            MessageDef::new("Engine_Data", 0x200, 8)
                .with_sender("EngineECU")
                .with_signal(SignalDef::new("EngineSpeed", 0, 16).scaled(0.25, 0.0).unit("rpm"))
                .with_signal(SignalDef::new("CoolantTemp", 16, 8).scaled(1.0, -40.0).unit("degC"))
                .with_signal(
                    SignalDef::new("GearState", 24, 4)
                        .choice(0, "Park")
                        .choice(1, "Reverse")
                        .choice(2, "Neutral")
                        .choice(3, "Drive"),
                ),
        )
        .with_message(
            MessageDef::new("Brake_Status", 0x1F0, 2)
                .with_sender("BrakeECU")
                .with_signal(SignalDef::new("BrakePressure", 0, 16).unit("bar")),
        )
        .with_message(
            MessageDef::new("Body_Cmd", 0x300, 2)
                .with_signal(SignalDef::new("Speed", 0, 8).bounds(0.0, 200.0))
                .with_signal(SignalDef::new("Mode", 8, 4)),
        )
        .with_node(NodeDef::new("EngineECU").with_comment("Powertrain controller"))
        .with_node(NodeDef::new("BrakeECU"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvis_rs::Catalog;

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::new(0x123).data(&[1, 2]).tx().extended().build();
        assert_eq!(frame.id, 0x123);
        assert_eq!(frame.data, vec![1, 2]);
        assert_eq!(frame.direction, Direction::Tx);
        assert!(frame.is_extended);
    }

    #[test]
    fn test_vehicle_catalog() {
        let catalog = vehicle_catalog();
        assert_eq!(catalog.messages().len(), 3);
        assert_eq!(catalog.message_name(0x1F0).as_deref(), Some("Brake_Status"));
    }
}
