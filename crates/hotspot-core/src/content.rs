//! Control page rendering
//!
//! Only [`INFO_PATH`] has content. Every other path renders nothing, which the
//! connection turns into a redirect back to the control page.

use crate::buffer::FixedBuffer;
use crate::device::{Board, OutputPin, TemperatureSensor};
use crate::Result;
use log::info;

/// Path of the control page
pub const INFO_PATH: &str = "/info";

/// Query key that drives the output
pub const LED_PARAM: &str = "led";

/// Requested output state, parsed from a `led=<integer>` query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedCommand {
    pub on: bool,
}

impl LedCommand {
    /// Match `led=<integer>`.
    ///
    /// `1` turns the output on and any other integer turns it off. Text after
    /// the integer is ignored; a non-numeric value does not match.
    pub fn parse(query: &str) -> Option<Self> {
        let (key, value) = query.split_once('=')?;
        if key != LED_PARAM {
            return None;
        }

        let digits_start = usize::from(value.starts_with(['-', '+']));
        let digits_len = value[digits_start..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        if digits_len == 0 {
            return None;
        }

        let number = &value[..digits_start + digits_len];
        // Overflowing integers are still integers, just not 1
        let on = number.parse::<i64>().map(|n| n == 1).unwrap_or(false);
        Some(Self { on })
    }
}

/// Outcome of rendering one request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rendered {
    /// Body bytes written; zero means redirect
    pub body_length: usize,
    /// Output state after the request
    pub output: bool,
    /// Reading embedded in the page, when a page was rendered
    pub temperature: Option<f32>,
}

/// Whether `path` is the control page
#[inline]
pub fn is_info_path(path: &[u8]) -> bool {
    path == INFO_PATH.as_bytes()
}

/// Text slots that depend on the output state
struct StateView {
    color: &'static str,
    label: &'static str,
    action_label: &'static str,
    action_color: &'static str,
    next: u8,
}

impl StateView {
    fn for_output(on: bool) -> Self {
        if on {
            Self {
                color: "green",
                label: "ON",
                action_label: "Turn off",
                action_color: "red",
                next: 0,
            }
        } else {
            Self {
                color: "red",
                label: "OFF",
                action_label: "Turn on",
                action_color: "green",
                next: 1,
            }
        }
    }
}

fn state_name(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// Render the response body for `path` and `query` into `body`.
///
/// Applies an `led=` command when it changes the output, then reads the
/// sensor once. Fails with `BufferTooSmall` if the page does not fit.
pub fn render<S, O, const N: usize>(
    board: &mut Board<S, O>,
    path: &[u8],
    query: Option<&str>,
    body: &mut FixedBuffer<N>,
) -> Result<Rendered>
where
    S: TemperatureSensor,
    O: OutputPin,
{
    if !is_info_path(path) {
        body.clear();
        return Ok(Rendered {
            body_length: 0,
            output: board.output.output(),
            temperature: None,
        });
    }

    let pin = board.output.pin_id();
    let mut output = board.output.output();

    if let Some(command) = query.and_then(LedCommand::parse) {
        if command.on != output {
            board.output.set_output(command.on);
            output = command.on;
            info!("[LED_CTRL] LED on GPIO{}: {} (via web)", pin, state_name(output));
        } else {
            info!("[LED_CTRL] LED on GPIO{} already {} (web request)", pin, state_name(output));
        }
    }
    info!("[LED_STATUS] LED state for page: {}", state_name(output));

    let temperature = board.sensor.read_temperature();
    info!("[TEMP_READ] Temperature for page: {:.2} C", temperature);

    let view = StateView::for_output(output);
    let body_length = body.format(format_args!(
        "<html><body style=\"font-family: sans-serif; text-align: center;\">\
         <h1>Pico W Control</h1>\
         <div style=\"margin-bottom: 20px;\">\
         <h2>LED (GPIO {pin})</h2>\
         <p style=\"font-size: 1.2em;\">The LED is currently: \
         <span style=\"font-weight: bold; color: {color};\">{label}</span></p>\
         <p><a href=\"{action}?{LED_PARAM}={next}\" style=\"display: inline-block; padding: 10px 20px; \
         color: white; background-color: {action_color}; text-decoration: none; border-radius: 5px;\">\
         {action_label} the LED</a></p>\
         </div>\
         <div style=\"margin-top: 20px; padding-top: 20px; border-top: 1px solid #ccc;\">\
         <h2>Internal Temperature</h2>\
         <p style=\"font-size: 1.2em;\">RP2040 temperature: \
         <span style=\"font-weight: bold; color: #337ab7;\">{temperature:.2} &deg;C</span></p>\
         </div>\
         </body></html>",
        color = view.color,
        label = view.label,
        action = INFO_PATH,
        next = view.next,
        action_color = view.action_color,
        action_label = view.action_label,
    ))?;

    Ok(Rendered {
        body_length,
        output,
        temperature: Some(temperature),
    })
}
