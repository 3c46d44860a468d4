//! Wire protocol: frame codec and control/property bit layouts (spec §4.1,
//! §6.2).

pub mod codec;
pub mod control;

pub use codec::{decode, ClientFrame, EncodeSink, FrameWriter};
pub use control::{InboundControl, OutboundControl, PropertyByte, PropertyGroup};
