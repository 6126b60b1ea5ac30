//! Loopback link demo - both link roles in one process, 10 second soak
//!
//! Demo sequence:
//! 1. Start the robot role (LinkServer) on a loopback port
//! 2. Connect the operator role (LinkClient)
//! 3. Drive: send motor commands and an arm target from the operator
//! 4. Stream: push synthetic video frames and telemetry from the robot
//! 5. Edit settings on the operator and watch ground truth follow
//!
//! Run with:
//! ```sh
//! RUST_LOG=info cargo run --example loopback_demo
//! ```

use setu_link::config::{DeliveryConfig, LinkConfig, NetworkConfig};
use setu_link::protocol::messages::{
    ArmPosition, Message, MotorState, RobotStatus, SettingsUpdate, VideoFrame, TAG_ARM_POSITION,
    TAG_MOTOR_STATE, TAG_ROBOT_STATUS, TAG_SETTINGS, TAG_VIDEO_FRAME,
};
use setu_link::protocol::timestamp_ms;
use setu_link::session::{ClientEvents, Dispatcher, LinkClient, LinkServer, ServerEvents};
use setu_link::settings::{Settings, SharedSettings};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("=== SetuLink Loopback Demo (10s) ===");

    // === 1. Robot role ===
    let mut config = LinkConfig::rover_defaults();
    config.network.bind_address = "127.0.0.1:0".to_string();
    config.network.reconnect_backoff_secs = 1;

    let arm_solver = bhuja_kin::ArmSolver::new(0.15, 0.15, 40)?;
    let robot_dispatcher = Dispatcher::new()
        .on(TAG_MOTOR_STATE, |message| {
            if let Message::Motor(state) = message {
                log::info!(
                    "robot: motor duty L({}/{}) R({}/{})",
                    state.left_forward,
                    state.left_backward,
                    state.right_forward,
                    state.right_backward
                );
            }
        })
        .on(TAG_ARM_POSITION, move |message| {
            if let Message::Arm(position) = message {
                match arm_solver.solve([position.x, position.y, position.z], 0.005) {
                    Some(angles) => log::info!(
                        "robot: arm target solved: yaw={:.3} shoulder={:.3} elbow={:.3}",
                        angles.base_yaw,
                        angles.shoulder,
                        angles.elbow
                    ),
                    None => log::warn!("robot: arm target out of reach"),
                }
            }
        });

    let server = LinkServer::start(
        &config,
        robot_dispatcher,
        Arc::new(SharedSettings::new(Settings::default())),
        ServerEvents::default(),
    )?;
    config.network.server_address = server.local_addr().to_string();
    log::info!("robot: listening on {}", server.local_addr());

    // === 2. Operator role ===
    let frames_seen = Arc::new(AtomicU64::new(0));
    let frames_seen_clone = Arc::clone(&frames_seen);
    let perceived = Arc::new(SharedSettings::default());
    let perceived_clone = Arc::clone(&perceived);

    let operator_dispatcher = Dispatcher::new()
        .on(TAG_VIDEO_FRAME, move |message| {
            if let Message::Video(frame) = message {
                frames_seen_clone.fetch_add(1, Ordering::Relaxed);
                log::debug!("operator: video frame, {} bytes", frame.jpeg.len());
            }
        })
        .on(TAG_ROBOT_STATUS, |message| {
            if let Message::Status(status) = message {
                log::info!(
                    "operator: battery {}% (companion {}%)",
                    status.primary_battery,
                    status.companion_battery
                );
            }
        })
        .on(TAG_SETTINGS, move |message| {
            if let Message::Settings(update) = message {
                perceived_clone.apply(&update.settings);
                log::info!("operator: perceived settings now {:?}", update.settings);
            }
        });

    let client = LinkClient::connect(config, operator_dispatcher, ClientEvents::default());

    while !server.is_client_connected() {
        thread::sleep(Duration::from_millis(10));
    }
    log::info!("link established");

    // === 3. Drive ===
    client.enqueue_strict(Message::Motor(MotorState {
        timestamp_ms: timestamp_ms(),
        left_forward: 200,
        left_backward: 0,
        right_forward: 200,
        right_backward: 0,
    }));
    client.enqueue_strict(Message::Arm(ArmPosition {
        timestamp_ms: timestamp_ms(),
        x: 0.15,
        y: 0.0,
        z: 0.1,
    }));

    // === 4. Stream ===
    for sequence in 0..20u8 {
        server.enqueue_droppable(Message::Video(VideoFrame {
            timestamp_ms: timestamp_ms(),
            jpeg: vec![sequence; 4096],
        }));
        thread::sleep(Duration::from_millis(50));
    }
    server.enqueue_strict(Message::Status(RobotStatus {
        timestamp_ms: timestamp_ms(),
        companion_battery: 88,
        primary_battery: 76,
    }));

    // === 5. Settings edit from the operator ===
    perceived.set_headlight_on(true);
    client.enqueue_strict(Message::Settings(SettingsUpdate {
        timestamp_ms: timestamp_ms(),
        settings: perceived.snapshot(),
    }));

    thread::sleep(Duration::from_secs(1));
    log::info!(
        "ground truth headlight: {}, video frames seen: {}",
        server.settings().headlight_on(),
        frames_seen.load(Ordering::Relaxed)
    );

    // Orderly teardown
    client.kill();
    client.await_termination();
    server.kill();
    server.await_termination();

    log::info!("demo complete");
    Ok(())
}
