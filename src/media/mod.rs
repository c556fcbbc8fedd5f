//! External media collaborators: recorder, player, prober and encoder.

pub mod exec;
pub mod mock;
pub mod player;
pub mod probe;
pub mod recorder;

pub use exec::{CommandExecutor, SystemCommandExecutor};
pub use player::{
    ExitWaiter, MplayerLauncher, PlaybackRequest, PlayerClient, PlayerControl, PlayerLauncher,
    PlayerSession,
};
pub use probe::{Encoder, MediaProber, Prober, SoxReverseEncoder, SoxiProber, WavProber};
pub use recorder::{Recorder, RecordingProcess, SoxRecorder};

use crate::config::ToolsConfig;
use std::sync::Arc;

/// The set of tools a transport session drives.
#[derive(Clone)]
pub struct MediaTools {
    pub recorder: Arc<dyn Recorder>,
    pub player: Arc<dyn PlayerLauncher>,
    pub prober: Arc<dyn Prober>,
    pub encoder: Arc<dyn Encoder>,
}

impl MediaTools {
    /// Real programs as configured.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            recorder: Arc::new(SoxRecorder::new(&tools.recorder)),
            player: Arc::new(MplayerLauncher::new(
                &tools.player,
                tools.player_args.clone(),
            )),
            prober: Arc::new(MediaProber::new(
                SoxiProber::new(SystemCommandExecutor::new(), &tools.prober),
                tools.native_wav_probe,
            )),
            encoder: Arc::new(SoxReverseEncoder::new(
                SystemCommandExecutor::new(),
                &tools.encoder,
            )),
        }
    }

    /// Programs that must be on PATH for the configured tools, with availability.
    pub fn check(tools: &ToolsConfig) -> Vec<(String, bool)> {
        [&tools.recorder, &tools.player, &tools.prober, &tools.encoder]
            .into_iter()
            .map(|program| (program.clone(), exec::is_available(program)))
            .collect()
    }
}
