//! The frame-paced host loop tying the animation and the feed to the display.

use std::future::Future;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;

use crate::animation::AnimationSequencer;
use crate::animation::Frame;
use crate::animation::Point;
use crate::engine::SpaceState;
use crate::integrations::feed::AsyncDataRefresher;
use crate::integrations::feed::Snapshot;
use crate::integrations::feed::UpdateOutcome;

/// Display side of the installation
pub trait Renderer: Send {
    /// Draw one frame of the animation
    fn present(&mut self, frame: &Frame);

    /// A new set of remote locations is available
    fn show_snapshot(&mut self, snapshot: &Snapshot);

    /// Live status of the local location, which overrides whatever the feed
    /// says about it
    fn show_local_state(&mut self, state: SpaceState);

    /// Screen position of a geographic coordinate, if it is on the map
    fn project(&self, latitude: f64, longitude: f64) -> Option<Point>;
}

/// Audio side of the installation
pub trait SoundPlayer: Send {
    fn play(&mut self, sound: &str);
}

/// Runs once per frame: status changes, animation tick, feed check
pub struct HostLoop {
    sequencer: AnimationSequencer,
    refresher: AsyncDataRefresher,
    states: mpsc::UnboundedReceiver<SpaceState>,
    renderer: Box<dyn Renderer>,
    sounds: Box<dyn SoundPlayer>,
    local_name: String,
    frame_period: Duration,
}

impl HostLoop {
    pub fn new(
        sequencer: AnimationSequencer,
        refresher: AsyncDataRefresher,
        states: mpsc::UnboundedReceiver<SpaceState>,
        renderer: Box<dyn Renderer>,
        sounds: Box<dyn SoundPlayer>,
        local_name: String,
        frame_rate: u32,
    ) -> Self {
        Self {
            sequencer,
            refresher,
            states,
            renderer,
            sounds,
            local_name,
            frame_period: Duration::from_secs(1) / frame_rate.max(1),
        }
    }

    pub fn sequencer(&self) -> &AnimationSequencer {
        &self.sequencer
    }

    /// Block until the first feed fetch has completed
    pub async fn wait_for_feed(&mut self) {
        info!("Waiting for initial feed data");
        let outcome = self.refresher.update(true).await;
        self.apply_feed(outcome);
    }

    fn apply_feed(&mut self, outcome: UpdateOutcome) {
        let UpdateOutcome::Updated(snapshot) = outcome else {
            return;
        };

        debug!("Showing {} locations", snapshot.spaces.len());
        self.renderer.show_snapshot(&snapshot);
        self.renderer.show_local_state(self.sequencer.state());

        let position = snapshot
            .find(&self.local_name)
            .and_then(|local| self.renderer.project(local.latitude, local.longitude));
        if let Some(position) = position {
            self.sequencer.set_hotel_coordinates(position);
        }
    }

    /// Render a single frame at `now`
    pub async fn frame(&mut self, now: Instant) {
        while let Ok(state) = self.states.try_recv() {
            self.sequencer.set_state(state, now);
            self.renderer.show_local_state(state);
        }

        let frame = self.sequencer.tick(now);
        for sound in &frame.sounds {
            self.sounds.play(sound);
        }
        self.renderer.present(&frame);

        let outcome = self.refresher.update(false).await;
        self.apply_feed(outcome);
    }

    /// Render frames until `shutdown` resolves. Late frames are dropped
    /// rather than bunched up.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.frame_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Entering main loop at {:?} per frame", self.frame_period);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                tick = interval.tick() => self.frame(tick.into_std()).await,
            }
        }
        info!("Main loop stopped");
    }

    /// Stop the feed refresher
    pub async fn shutdown(self) {
        self.refresher.stop().await;
    }
}
