//! Well-known topics and message type tags
//!
//! Topic traffic uses the `msg` type tag. Frames that carry no topic are
//! routed by their type tag instead (see [`Envelope::route`]).
//!
//! [`Envelope::route`]: crate::Envelope::route

/// Message type tags carried in the `type` field of an envelope
pub mod kind {
    /// Topic traffic in either direction
    pub const MSG: &str = "msg";
    /// Ask the robot to start forwarding a topic
    pub const SUBSCRIBE: &str = "subscribe";
    /// Ask the robot to stop forwarding a topic
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    /// Full list of active device errors
    pub const ERRORS: &str = "errors";
    /// A device error was raised
    pub const ADD_ERROR: &str = "add_error";
    /// A device error was cleared
    pub const RM_ERROR: &str = "rm_error";
    /// Keepalive from either side
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Low-level robot state (IMU, motors, battery)
pub const LOW_STATE: &str = "rt/lf/lowstate";

/// Sport-mode state (body pose, velocity, gait)
pub const SPORT_MODE_STATE: &str = "rt/lf/sportmodestate";

/// Sport API requests
pub const SPORT_REQUEST: &str = "rt/api/sport/request";

/// Sport API responses
pub const SPORT_RESPONSE: &str = "rt/api/sport/response";

/// Returns true when `topic` names robot-side topic traffic that the robot
/// only forwards after an explicit subscribe notice.
pub fn is_robot_topic(topic: &str) -> bool {
    topic.starts_with("rt/")
}
