//! Log-only stand-ins for the display and audio, for running without a screen.

use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::animation::Frame;
use crate::animation::Point;
use crate::app::Renderer;
use crate::app::SoundPlayer;
use crate::engine::SpaceState;
use crate::integrations::feed::Snapshot;

/// Map center as (longitude, latitude)
const MAP_CENTER: (f64, f64) = (5.24791, 52.1372954);

/// Degrees spanned by the full map width and height
const MAP_SCALE: (f64, f64) = (3.85422677912357, 4.353798024388546);

/// Renderer that logs what a screen would show
pub struct HeadlessRenderer {
    width: u32,
    height: u32,
    last_phrase: Option<usize>,
    local_state: Option<SpaceState>,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            last_phrase: None,
            local_state: None,
        }
    }
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new(1080, 1920)
    }
}

impl Renderer for HeadlessRenderer {
    fn present(&mut self, frame: &Frame) {
        if frame.phrase != self.last_phrase {
            debug!("Now showing phrase {:?}", frame.phrase);
            self.last_phrase = frame.phrase;
        }
        trace!("Frame: {:?}", frame);
        if let Some(beacon) = &frame.beacon {
            trace!("Beacon at {:?} in {:?}", beacon.position, beacon.color.rgb());
        }
    }

    fn show_snapshot(&mut self, snapshot: &Snapshot) {
        for space in &snapshot.spaces {
            info!(
                "{} - Lat: {}, Lon: {}, State: {}",
                space.name, space.latitude, space.longitude, space.state
            );
        }
    }

    fn show_local_state(&mut self, state: SpaceState) {
        if self.local_state.replace(state) != Some(state) {
            info!("Local location: State: {}", state);
        }
    }

    fn project(&self, latitude: f64, longitude: f64) -> Option<Point> {
        let (width, height) = (f64::from(self.width), f64::from(self.height));
        let x = width / 2.0 + (longitude - MAP_CENTER.0) / MAP_SCALE.0 * width;
        let y = height / 2.0 - (latitude - MAP_CENTER.1) / MAP_SCALE.1 * height;

        ((0.0..width).contains(&x) && (0.0..height).contains(&y)).then(|| (x as i32, y as i32))
    }
}

/// Sound player that logs cues instead of playing them
#[derive(Default)]
pub struct HeadlessSoundPlayer;

impl SoundPlayer for HeadlessSoundPlayer {
    fn play(&mut self, sound: &str) {
        info!("Playing sound {}", sound);
    }
}
