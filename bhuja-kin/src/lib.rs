//! BhujaKin - kinematics for the rover's two-segment arm
//!
//! Converts a requested Cartesian hand position into the three joint angles
//! (base yaw, shoulder, elbow) that minimize end-effector distance error, or
//! reports the target as out of reach. Pure synchronous CPU work with no
//! shared state: safe to call from any thread, bounded wall-clock time by the
//! configured search iteration count.

pub mod error;
pub mod solver;

pub use error::{Error, Result};
pub use solver::{ArmSolver, JointAngles, base_yaw};
