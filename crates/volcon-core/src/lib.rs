pub mod errors;
pub mod ids;
pub mod messages;
pub mod volume;

pub use errors::{DecodeError, DispatchError, PendingError};
pub use ids::{ConnectionId, CorrelationId, DeviceId};
pub use messages::{decode_command, decode_reply, Action, Command, CommandFrame, DeviceReply, DeviceState};
pub use volume::{Volume, VolumeDelta, VolumeError};
