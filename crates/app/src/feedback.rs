use engine::{HapticCue, UiFeedback};
use tracing::{debug, warn};

/// Headless host: cues and alerts only reach the log. Failed requests
/// carry the alert text in their response body instead.
pub struct LogFeedback;

impl UiFeedback for LogFeedback {
    fn haptic(&self, cue: HapticCue) {
        debug!(?cue, "Haptic");
    }

    fn alert(&self, title: &str, message: &str) {
        warn!(title, "Alert: {}", message);
    }
}
