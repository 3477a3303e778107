//! Desktop platform on cpal.
//!
//! One output stream per graph mixes a music voice and a narration voice. Sources are
//! local paths or HTTP(S) URLs, decoded with symphonia and resampled with rubato to
//! the device rate. All outcomes arrive on the event channel returned by
//! [`CpalPlatform::new`], to be fed into the session.

mod decode;
mod device;
mod element;
mod http_stream;
mod mixer;
mod output;
mod queue;
mod resample;

use class_audio_types::StreamRole;
use crossbeam_channel::{Receiver, Sender, unbounded};

pub use device::{DeviceInfo, list_devices};
pub use element::CpalElement;
pub use output::CpalGraph;

use crate::config::PlaybackConfig;
use crate::error::PlatformError;
use crate::platform::{AudioPlatform, PlatformEvent};

/// Device selection and stage tuning for [`CpalPlatform`].
#[derive(Clone, Debug, Default)]
pub struct BackendOptions {
    /// Substring of the output device name; the host default when unset.
    pub device: Option<String>,
    /// Preferred output rate; the device's highest rate when unset.
    pub target_rate: Option<u32>,
    pub playback: PlaybackConfig,
}

pub struct CpalPlatform {
    options: BackendOptions,
    events: Sender<PlatformEvent>,
}

impl CpalPlatform {
    /// Create the platform and the channel its events arrive on.
    pub fn new(options: BackendOptions) -> (Self, Receiver<PlatformEvent>) {
        let (events, rx) = unbounded();
        (Self { options, events }, rx)
    }
}

impl AudioPlatform for CpalPlatform {
    type Graph = CpalGraph;
    type Element = CpalElement;

    fn create_graph(&mut self) -> Result<CpalGraph, PlatformError> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.options.device.as_deref())
            .map_err(|e| PlatformError::Unavailable(format!("{e:#}")))?;
        CpalGraph::open(
            device,
            self.options.target_rate,
            self.options.playback.refill_max_frames,
            self.events.clone(),
        )
        .map_err(|e| PlatformError::Unavailable(format!("{e:#}")))
    }

    fn create_element(
        &mut self,
        graph: &mut CpalGraph,
        role: StreamRole,
    ) -> Result<CpalElement, PlatformError> {
        if !graph.bind(role) {
            return Err(PlatformError::Refused(format!(
                "{role} path already has an element"
            )));
        }
        Ok(CpalElement::new(
            role,
            graph.mixer().clone(),
            self.options.playback.clone(),
        ))
    }
}
