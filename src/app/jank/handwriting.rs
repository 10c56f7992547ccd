use tracing::info;

use crate::app::adb::device::DeviceDriver;
use crate::app::config::HandwritingSettings;
use crate::app::error::AppError;
use crate::app::jank::harness::{JankTest, StepContext};

/// Expected window-animation frame count shared by both handwriting tests.
pub const WFM_EXPECTED_FRAMES: u64 = 10;

/// Puts the device in the known baseline: awake, handwriting IME selected.
/// Runs before each test; a failure here aborts the test.
pub fn set_up(
    device: &dyn DeviceDriver,
    settings: &HandwritingSettings,
    trace_id: &str,
) -> Result<(), AppError> {
    device.wake_up(trace_id)?;
    device.select_ime(&settings.ime_component, trace_id)?;
    info!(trace_id = %trace_id, serial = %device.serial(), ime = %settings.ime_component, "handwriting IME active");
    Ok(())
}

/// Jank when handwriting opens from the remote-input entry point: launch the
/// remote-input activity, then tap the IME button.
pub fn open_from_remote_input(settings: &HandwritingSettings) -> JankTest {
    let activity = settings.remote_input_activity.clone();
    let (button_x, button_y) = (settings.ime_button_x, settings.ime_button_y);
    JankTest {
        name: "open_handwriting_from_remote_input",
        expected_frames: WFM_EXPECTED_FRAMES,
        before: Box::new(move |ctx: &StepContext| {
            ctx.device.press_home(ctx.trace_id)?;
            ctx.device.launch_activity(&activity, ctx.trace_id)
        }),
        body: Box::new(move |ctx: &StepContext| ctx.device.tap(button_x, button_y, ctx.trace_id)),
        after_loop: Box::new(|ctx: &StepContext| ctx.device.press_back(ctx.trace_id)),
        after_test: Box::new(|ctx: &StepContext| ctx.device.press_home(ctx.trace_id)),
    }
}

/// Jank when handwriting opens from an input box: launch the input-box
/// activity, then tap the box itself.
pub fn open_from_input_box(settings: &HandwritingSettings) -> JankTest {
    let activity = settings.input_box_activity.clone();
    let (tap_x, tap_y) = (settings.screen_tap_x, settings.screen_tap_y);
    JankTest {
        name: "open_handwriting_from_input_box",
        expected_frames: WFM_EXPECTED_FRAMES,
        before: Box::new(move |ctx: &StepContext| {
            ctx.device.press_home(ctx.trace_id)?;
            ctx.device.launch_activity(&activity, ctx.trace_id)
        }),
        body: Box::new(move |ctx: &StepContext| ctx.device.tap(tap_x, tap_y, ctx.trace_id)),
        after_loop: Box::new(|ctx: &StepContext| ctx.device.press_back(ctx.trace_id)),
        after_test: Box::new(|ctx: &StepContext| ctx.device.press_home(ctx.trace_id)),
    }
}

pub fn suite(settings: &HandwritingSettings) -> Vec<JankTest> {
    vec![open_from_remote_input(settings), open_from_input_box(settings)]
}
